//! AMF Context Management
//!
//! UE, RAN UE and session arenas keyed by pool ID, the SUPI and temporary
//! identifier indices, and the per-UE connection state derived from them.
//! The context is owned by the event loop and passed by reference into every
//! procedure; nothing in here is global.

use std::collections::HashMap;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::config::AmfConfig;
use crate::pending::PendingTransferStore;
use crate::sbi_path::{ClientRegistry, NfUri};
use crate::timer::TimerManager;

pub const OGS_INVALID_POOL_ID: u64 = 0;
/// Unassigned PDU session identity
pub const OGS_NAS_PDU_SESSION_IDENTITY_UNASSIGNED: u8 = 0;
pub const OGS_NAS_KSI_NO_KEY_IS_AVAILABLE: u8 = 7;
pub const OGS_SHA256_DIGEST_SIZE: usize = 32;
/// Slice differentiator value meaning "no SD"
pub const OGS_S_NSSAI_NO_SD_VALUE: u32 = 0xffffff;
/// Maximum number of sessions per UE
pub const OGS_MAX_NUM_OF_SESS: usize = 16;

// ============================================================================
// Basic Types
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct PlmnId {
    pub mcc1: u8,
    pub mcc2: u8,
    pub mcc3: u8,
    pub mnc1: u8,
    pub mnc2: u8,
    /// 0xf for a 2-digit MNC
    pub mnc3: u8,
}

impl PlmnId {
    pub fn new(mcc: &str, mnc: &str) -> Self {
        let digits = |s: &str| -> Vec<u8> { s.bytes().filter(u8::is_ascii_digit).map(|b| b - b'0').collect() };
        let (mcc, mnc) = (digits(mcc), digits(mnc));
        let digit = |v: &[u8], i: usize, missing: u8| v.get(i).copied().unwrap_or(missing);

        Self {
            mcc1: digit(&mcc, 0, 0),
            mcc2: digit(&mcc, 1, 0),
            mcc3: digit(&mcc, 2, 0),
            mnc1: digit(&mnc, 0, 0),
            mnc2: digit(&mnc, 1, 0),
            mnc3: digit(&mnc, 2, 0xf),
        }
    }

    pub fn mcc_string(&self) -> String {
        format!("{}{}{}", self.mcc1, self.mcc2, self.mcc3)
    }

    /// MNC as a 2- or 3-digit string
    pub fn mnc_string(&self) -> String {
        if self.mnc3 == 0xf {
            format!("{}{}", self.mnc1, self.mnc2)
        } else {
            format!("{}{}{}", self.mnc1, self.mnc2, self.mnc3)
        }
    }
}

/// AMF region (8 bits), set (10 bits) and pointer (6 bits)
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct AmfId {
    pub region: u8,
    pub set: u16,
    pub pointer: u8,
}

impl AmfId {
    /// 24-bit packed value
    pub fn as_u32(&self) -> u32 {
        ((self.region as u32) << 16) | (((self.set as u32) & 0x3ff) << 6) | ((self.pointer as u32) & 0x3f)
    }
}

/// GUAMI (Globally Unique AMF Identifier)
#[derive(Debug, Clone, Default)]
pub struct Guami {
    pub plmn_id: PlmnId,
    pub amf_id: AmfId,
}

/// 5GS TAI (Tracking Area Identity)
#[derive(Debug, Clone, Default)]
pub struct Tai5gs {
    pub plmn_id: PlmnId,
    /// TAC (24 bits)
    pub tac: u32,
}

/// S-NSSAI (Single Network Slice Selection Assistance Information)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SNssai {
    pub sst: u8,
    pub sd: Option<u32>,
}

impl SNssai {
    /// SD as the 6-digit hex string used on the SBI
    pub fn sd_string(&self) -> Option<String> {
        match self.sd {
            Some(sd) if sd != OGS_S_NSSAI_NO_SD_VALUE => Some(format!("{:06x}", sd)),
            _ => None,
        }
    }
}

/// Allowed slice with its home-network mapping
#[derive(Debug, Clone, Default)]
pub struct AllowedSlice {
    /// Serving-network S-NSSAI
    pub s_nssai: SNssai,
    /// Home-network S-NSSAI (roaming only)
    pub mapped_hplmn: Option<SNssai>,
}

/// Bitrate in bits per second, 0 means unlimited
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Bitrate {
    pub downlink: u64,
    pub uplink: u64,
}

/// Parse an SBI bitrate string such as "1 Gbps" or "512.5 Kbps" into bps
pub fn bitrate_from_string(value: &str) -> Option<u64> {
    let (number, unit) = value.trim().split_once(' ')?;
    let number: f64 = number.parse().ok()?;
    if !number.is_finite() || number < 0.0 {
        return None;
    }

    let multiplier: f64 = match unit.trim() {
        "bps" => 1.0,
        "Kbps" => 1e3,
        "Mbps" => 1e6,
        "Gbps" => 1e9,
        "Tbps" => 1e12,
        _ => return None,
    };

    Some((number * multiplier).round() as u64)
}

/// Format a bitrate (bps) as the Kbps string used on the SBI
pub fn bitrate_to_kbps_string(bitrate: u64) -> String {
    format!("{} Kbps", bitrate / 1000)
}

/// UE security capability (IE contents after the length octet)
#[derive(Debug, Clone, Default)]
pub struct UeSecurityCapability {
    /// Number of valid octets
    pub length: u8,
    /// 5G-EA, 5G-IA, EEA, EIA and spare octets
    pub octets: [u8; 8],
}

impl UeSecurityCapability {
    /// Build from the mandatory NR octets
    pub fn new(nr_ea: u8, nr_ia: u8) -> Self {
        let mut octets = [0u8; 8];
        octets[0] = nr_ea;
        octets[1] = nr_ia;
        Self { length: 2, octets }
    }

    /// Valid octets
    pub fn as_bytes(&self) -> &[u8] {
        let len = (self.length as usize).min(self.octets.len());
        &self.octets[..len]
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Guti5gs {
    pub plmn_id: PlmnId,
    pub amf_id: AmfId,
    pub tmsi: u32,
}

impl Guti5gs {
    /// Temporary UE context identifier ("5g-guti-<mcc><mnc><amf-id><tmsi>")
    pub fn to_ue_context_id(&self) -> String {
        format!(
            "5g-guti-{}{}{:06x}{:08x}",
            self.plmn_id.mcc_string(),
            self.plmn_id.mnc_string(),
            self.amf_id.as_u32(),
            self.tmsi
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RatType {
    #[default]
    Nr,
    Eutra,
    Wlan,
    Virtual,
    Nbiot,
    Wireline,
    WirelineCable,
    WirelineBbf,
    LteM,
    NrU,
    EutraU,
    TrustedN3ga,
    TrustedWlan,
    Utra,
    Gera,
    NrLeo,
    NrMeo,
    NrGeo,
    NrOtherSat,
    NrRedcap,
}

impl RatType {
    /// SBI string form
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Nr => "NR",
            Self::Eutra => "EUTRA",
            Self::Wlan => "WLAN",
            Self::Virtual => "VIRTUAL",
            Self::Nbiot => "NBIOT",
            Self::Wireline => "WIRELINE",
            Self::WirelineCable => "WIRELINE_CABLE",
            Self::WirelineBbf => "WIRELINE_BBF",
            Self::LteM => "LTE-M",
            Self::NrU => "NR_U",
            Self::EutraU => "EUTRA_U",
            Self::TrustedN3ga => "TRUSTED_N3GA",
            Self::TrustedWlan => "TRUSTED_WLAN",
            Self::Utra => "UTRA",
            Self::Gera => "GERA",
            Self::NrLeo => "NR_LEO",
            Self::NrMeo => "NR_MEO",
            Self::NrGeo => "NR_GEO",
            Self::NrOtherSat => "NR_OTHER_SAT",
            Self::NrRedcap => "NR_REDCAP",
        }
    }

    /// Parse the SBI string form
    pub fn from_sbi_str(value: &str) -> Option<Self> {
        let rat = match value {
            "NR" => Self::Nr,
            "EUTRA" => Self::Eutra,
            "WLAN" => Self::Wlan,
            "VIRTUAL" => Self::Virtual,
            "NBIOT" => Self::Nbiot,
            "WIRELINE" => Self::Wireline,
            "WIRELINE_CABLE" => Self::WirelineCable,
            "WIRELINE_BBF" => Self::WirelineBbf,
            "LTE-M" => Self::LteM,
            "NR_U" => Self::NrU,
            "EUTRA_U" => Self::EutraU,
            "TRUSTED_N3GA" => Self::TrustedN3ga,
            "TRUSTED_WLAN" => Self::TrustedWlan,
            "UTRA" => Self::Utra,
            "GERA" => Self::Gera,
            "NR_LEO" => Self::NrLeo,
            "NR_MEO" => Self::NrMeo,
            "NR_GEO" => Self::NrGeo,
            "NR_OTHER_SAT" => Self::NrOtherSat,
            "NR_REDCAP" => Self::NrRedcap,
            _ => return None,
        };
        Some(rat)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthResult {
    #[default]
    Success,
    Failure,
    Synch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AccessType {
    #[default]
    #[serde(rename = "3GPP_ACCESS")]
    ThreeGppAccess,
    #[serde(rename = "NON_3GPP_ACCESS")]
    NonThreeGppAccess,
}

impl AccessType {
    /// SBI string form
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ThreeGppAccess => "3GPP_ACCESS",
            Self::NonThreeGppAccess => "NON_3GPP_ACCESS",
        }
    }
}

/// Connection management state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmState {
    /// No NG signalling connection
    Idle,
    /// NG signalling connection established
    Connected,
}

/// Network-initiated deregistration state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeregistrationState {
    /// Deregistration request sent to the UE
    NetworkInitiatedExplicit,
    /// UE unreachable; implicit cleanup of sessions is not driven yet
    NetworkInitiatedImplicitIncomplete,
}

/// Resource status reported by the SMF
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResourceStatus {
    #[default]
    Unknown,
    Released,
    Unchanged,
    Transferred,
    Updated,
    AltAnchorSmf,
}

/// NAS key set identifier
#[derive(Debug, Clone, Copy, Default)]
pub struct NasKeySet {
    pub tsc: u8,
    pub ksi: u8,
}

#[derive(Debug, Clone, Default)]
pub struct GmmCapability {
    pub lte_positioning_protocol_capability: bool,
    pub ho_attach: bool,
    pub s1_mode: bool,
}

#[derive(Debug, Clone, Default)]
pub struct PolicyAssociation {
    pub resource_uri: Option<String>,
    pub id: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct DataChangeSubscription {
    pub resource_uri: Option<String>,
    pub id: Option<String>,
}

// ============================================================================
// RanUe - NG signalling connection of a UE
// ============================================================================

#[derive(Debug, Clone)]
pub struct RanUe {
    pub id: u64,
    pub ran_ue_ngap_id: u64,
    /// Assigned by the AMF
    pub amf_ue_ngap_id: u64,
    pub gnb_id: u64,
    /// RAT type of the serving cell
    pub rat_type: RatType,
    /// Set once per leg; later setups use PDU Session Resource Setup
    pub initial_context_setup_request_sent: bool,
    pub initial_context_setup_response_received: bool,
    pub amf_ue_id: u64,
}

impl RanUe {
    pub fn new(id: u64, gnb_id: u64, ran_ue_ngap_id: u64, amf_ue_ngap_id: u64) -> Self {
        Self {
            id,
            ran_ue_ngap_id,
            amf_ue_ngap_id,
            gnb_id,
            rat_type: RatType::Nr,
            initial_context_setup_request_sent: false,
            initial_context_setup_response_received: false,
            amf_ue_id: OGS_INVALID_POOL_ID,
        }
    }
}

// ============================================================================
// AmfUe - AMF UE Context
// ============================================================================

#[derive(Debug, Clone)]
pub struct AmfUe {
    pub id: u64,
    pub supi: Option<String>,
    pub pei: Option<String>,
    /// Current 5G-GUTI
    pub current_guti: Option<Guti5gs>,
    /// Last TAI reported for this UE
    pub nr_tai: Tai5gs,
    /// Access type of the registration
    pub access_type: AccessType,

    pub auth_result: AuthResult,
    pub security_context_available: bool,
    pub nas: NasKeySet,
    pub kamf: [u8; OGS_SHA256_DIGEST_SIZE],
    pub dl_count: u32,
    pub ul_count: u32,
    /// Selected ciphering algorithm (NEA id)
    pub selected_enc_algorithm: u8,
    /// Selected integrity algorithm (NIA id)
    pub selected_int_algorithm: u8,
    pub ue_security_capability: UeSecurityCapability,
    pub gmm_capability: GmmCapability,

    pub allowed_nssai: Vec<AllowedSlice>,
    /// Subscribed UE AMBR
    pub ue_ambr: Bitrate,
    /// RAT restrictions from access and mobility subscription data
    pub rat_restrictions: Vec<RatType>,

    /// AM policy association with the PCF
    pub policy_association: PolicyAssociation,
    /// PCF NF instance serving this UE
    pub pcf_nf_instance_id: Option<String>,
    /// SDM data change subscription with the UDM
    pub data_change_subscription: DataChangeSubscription,

    /// Network-initiated deregistration in progress
    pub network_deregistration: Option<DeregistrationState>,

    /// Paging message kept for T3513 retransmission
    pub t3513_buf: Option<Bytes>,
    /// Deregistration request kept for T3522 retransmission
    pub t3522_buf: Option<Bytes>,

    pub ran_ue_id: u64,
    /// Sessions in creation order
    pub sess_ids: Vec<u64>,
}

impl AmfUe {
    pub fn new(id: u64) -> Self {
        Self {
            id,
            supi: None,
            pei: None,
            current_guti: None,
            nr_tai: Tai5gs::default(),
            access_type: AccessType::ThreeGppAccess,
            auth_result: AuthResult::Failure,
            security_context_available: false,
            nas: NasKeySet {
                tsc: 0,
                ksi: OGS_NAS_KSI_NO_KEY_IS_AVAILABLE,
            },
            kamf: [0u8; OGS_SHA256_DIGEST_SIZE],
            dl_count: 0,
            ul_count: 0,
            selected_enc_algorithm: 0,
            selected_int_algorithm: 0,
            ue_security_capability: UeSecurityCapability::default(),
            gmm_capability: GmmCapability::default(),
            allowed_nssai: Vec::new(),
            ue_ambr: Bitrate::default(),
            rat_restrictions: Vec::new(),
            policy_association: PolicyAssociation::default(),
            pcf_nf_instance_id: None,
            data_change_subscription: DataChangeSubscription::default(),
            network_deregistration: None,
            t3513_buf: None,
            t3522_buf: None,
            ran_ue_id: OGS_INVALID_POOL_ID,
            sess_ids: Vec::new(),
        }
    }

    /// SUPI for log prefixes
    pub fn supi_str(&self) -> &str {
        self.supi.as_deref().unwrap_or("Unknown")
    }

    /// Keys usable for a context transfer
    pub fn security_context_is_valid(&self) -> bool {
        self.security_context_available && self.nas.ksi != OGS_NAS_KSI_NO_KEY_IS_AVAILABLE
    }

    /// Check if the given RAT is excluded by the subscription
    pub fn is_rat_restricted(&self, rat_type: RatType) -> bool {
        self.rat_restrictions.contains(&rat_type)
    }
}

// ============================================================================
// AmfSess - AMF Session Context
// ============================================================================

/// 5GSM message types that can be held back on a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum GsmMessageType {
    PduSessionModificationCommand = 0xcb,
    PduSessionReleaseCommand = 0xd3,
}

/// 5GSM message waiting for the security context
#[derive(Debug, Clone)]
pub struct GsmMessage {
    pub message_type: GsmMessageType,
    pub n1buf: Option<Bytes>,
    pub n2buf: Bytes,
}

#[derive(Debug, Clone)]
pub struct AmfSess {
    pub id: u64,
    pub psi: u8,
    pub amf_ue_id: u64,
    pub s_nssai: SNssai,
    /// Home-network S-NSSAI
    pub mapped_hplmn: Option<SNssai>,
    pub dnn: Option<String>,
    pub access_type: AccessType,
    pub sm_context_resource_uri: Option<String>,
    pub sm_context_ref: Option<String>,
    /// Resource status reported by the SMF
    pub resource_status: ResourceStatus,
    pub n1_released: bool,
    pub n2_released: bool,
    /// Establishment accept held until the SM context exists in the SMF
    pub pdu_session_establishment_accept: Option<Bytes>,
    /// 5GSM message held until the context setup completes
    pub gsm_message: Option<GsmMessage>,
}

impl AmfSess {
    pub fn new(id: u64, amf_ue_id: u64, psi: u8) -> Self {
        Self {
            id,
            psi,
            amf_ue_id,
            s_nssai: SNssai::default(),
            mapped_hplmn: None,
            dnn: None,
            access_type: AccessType::ThreeGppAccess,
            sm_context_resource_uri: None,
            sm_context_ref: None,
            resource_status: ResourceStatus::Unknown,
            n1_released: false,
            n2_released: false,
            pdu_session_establishment_accept: None,
            gsm_message: None,
        }
    }

    pub fn session_context_in_smf(&self) -> bool {
        self.sm_context_ref.is_some()
    }

    pub fn store_session_context(&mut self, resource_uri: &str, context_ref: &str) {
        self.sm_context_resource_uri = Some(resource_uri.to_string());
        self.sm_context_ref = Some(context_ref.to_string());
    }

    /// Store 5GSM message, replacing any earlier one
    pub fn store_5gsm_message(&mut self, message_type: GsmMessageType, n1buf: Option<Bytes>, n2buf: Bytes) {
        if let Some(old) = self.gsm_message.replace(GsmMessage { message_type, n1buf, n2buf }) {
            log::debug!("[psi={}] 5GSM message {:?} superseded", self.psi, old.message_type);
        }
    }

    pub fn clear_5gsm_message(&mut self) {
        self.gsm_message = None;
    }
}

// ============================================================================
// AmfContext
// ============================================================================

#[derive(Debug)]
pub struct AmfContext {
    pub served_guami: Guami,
    /// Own SBI server URI (used to build callback locations)
    pub nf_uri: NfUri,

    /// Deferred N1/N2 transfers waiting for paging
    pub pending: PendingTransferStore,
    pub timers: TimerManager,
    /// SBI clients towards notification targets
    pub clients: ClientRegistry,

    amf_ue_list: HashMap<u64, AmfUe>,
    ran_ue_list: HashMap<u64, RanUe>,
    sess_list: HashMap<u64, AmfSess>,

    supi_hash: HashMap<String, u64>,
    /// Temporary identifier hash (5g-guti string -> pool ID)
    guti_ue_hash: HashMap<String, u64>,

    next_amf_ue_id: u64,
    next_ran_ue_id: u64,
    next_sess_id: u64,
    next_amf_ue_ngap_id: u64,

    max_num_of_ue: usize,
    max_num_of_ran_ue: usize,
}

impl AmfContext {
    pub fn new() -> Self {
        Self::from_config(&AmfConfig::default())
    }

    /// Create a new AMF context from configuration
    pub fn from_config(config: &AmfConfig) -> Self {
        Self {
            served_guami: config.guami(),
            nf_uri: config.sbi.server.nf_uri(),
            pending: PendingTransferStore::new(),
            timers: TimerManager::with_configs(config.time.timer_configs()),
            clients: ClientRegistry::new(config.sbi.max_clients),
            amf_ue_list: HashMap::new(),
            ran_ue_list: HashMap::new(),
            sess_list: HashMap::new(),
            supi_hash: HashMap::new(),
            guti_ue_hash: HashMap::new(),
            next_amf_ue_id: 1,
            next_ran_ue_id: 1,
            next_sess_id: 1,
            next_amf_ue_ngap_id: 1,
            max_num_of_ue: config.max.ue,
            max_num_of_ran_ue: config.max.ue * 2,
        }
    }

    // ========================================================================
    // RAN UE Management
    // ========================================================================

    pub fn ran_ue_add(&mut self, gnb_id: u64, ran_ue_ngap_id: u64) -> Option<u64> {
        if self.ran_ue_list.len() >= self.max_num_of_ran_ue {
            log::error!("Maximum number of RAN UEs [{}] reached", self.max_num_of_ran_ue);
            return None;
        }

        let id = self.next_ran_ue_id;
        self.next_ran_ue_id += 1;
        let amf_ue_ngap_id = self.next_amf_ue_ngap_id;
        self.next_amf_ue_ngap_id += 1;

        self.ran_ue_list
            .insert(id, RanUe::new(id, gnb_id, ran_ue_ngap_id, amf_ue_ngap_id));

        log::debug!(
            "RAN UE added (id={}, ran_ue_ngap_id={}, amf_ue_ngap_id={})",
            id, ran_ue_ngap_id, amf_ue_ngap_id
        );
        Some(id)
    }

    /// Remove a RAN UE, leaving its AMF UE in CM-IDLE
    pub fn ran_ue_remove(&mut self, id: u64) -> Option<RanUe> {
        let ran_ue = self.ran_ue_list.remove(&id)?;
        if let Some(amf_ue) = self.amf_ue_list.get_mut(&ran_ue.amf_ue_id) {
            if amf_ue.ran_ue_id == id {
                amf_ue.ran_ue_id = OGS_INVALID_POOL_ID;
            }
        }

        log::debug!(
            "RAN UE removed (id={}, ran_ue_ngap_id={}, amf_ue_ngap_id={})",
            id, ran_ue.ran_ue_ngap_id, ran_ue.amf_ue_ngap_id
        );
        Some(ran_ue)
    }

    pub fn ran_ue(&self, id: u64) -> Option<&RanUe> {
        self.ran_ue_list.get(&id)
    }

    pub fn ran_ue_mut(&mut self, id: u64) -> Option<&mut RanUe> {
        self.ran_ue_list.get_mut(&id)
    }

    pub fn ran_ue_count(&self) -> usize {
        self.ran_ue_list.len()
    }

    // ========================================================================
    // AMF UE Management
    // ========================================================================

    pub fn amf_ue_add(&mut self) -> Option<u64> {
        if self.amf_ue_list.len() >= self.max_num_of_ue {
            log::error!("Maximum number of UEs [{}] reached", self.max_num_of_ue);
            return None;
        }

        let id = self.next_amf_ue_id;
        self.next_amf_ue_id += 1;
        self.amf_ue_list.insert(id, AmfUe::new(id));

        log::debug!("AMF UE added (id={})", id);
        Some(id)
    }

    /// Remove an AMF UE together with its sessions, pending transfer and timers
    pub fn amf_ue_remove(&mut self, id: u64) -> Option<AmfUe> {
        let amf_ue = self.amf_ue_list.remove(&id)?;

        if let Some(ref supi) = amf_ue.supi {
            self.supi_hash.remove(supi);
        }
        if let Some(ref guti) = amf_ue.current_guti {
            self.guti_ue_hash.remove(&guti.to_ue_context_id());
        }
        for sess_id in &amf_ue.sess_ids {
            self.sess_list.remove(sess_id);
        }
        if let Some(ran_ue) = self.ran_ue_list.get_mut(&amf_ue.ran_ue_id) {
            ran_ue.amf_ue_id = OGS_INVALID_POOL_ID;
        }
        self.pending.clear(id);
        self.timers.stop_all_ue_timers(id);

        log::debug!("[{}] AMF UE removed (id={})", amf_ue.supi_str(), id);
        Some(amf_ue)
    }

    pub fn amf_ue(&self, id: u64) -> Option<&AmfUe> {
        self.amf_ue_list.get(&id)
    }

    pub fn amf_ue_mut(&mut self, id: u64) -> Option<&mut AmfUe> {
        self.amf_ue_list.get_mut(&id)
    }

    pub fn amf_ue_find_by_supi(&self, supi: &str) -> Option<u64> {
        self.supi_hash.get(supi).copied()
    }

    /// Find AMF UE by UE context ID (SUPI or 5G-GUTI form)
    pub fn amf_ue_find_by_ue_context_id(&self, ue_context_id: &str) -> Option<u64> {
        if ue_context_id.starts_with("5g-guti-") {
            self.guti_ue_hash.get(ue_context_id).copied()
        } else {
            self.amf_ue_find_by_supi(ue_context_id)
        }
    }

    pub fn amf_ue_set_supi(&mut self, id: u64, supi: &str) -> bool {
        let Some(amf_ue) = self.amf_ue_list.get_mut(&id) else {
            return false;
        };
        if let Some(ref old_supi) = amf_ue.supi {
            self.supi_hash.remove(old_supi);
        }
        amf_ue.supi = Some(supi.to_string());
        self.supi_hash.insert(supi.to_string(), id);
        true
    }

    pub fn amf_ue_set_guti(&mut self, id: u64, guti: Guti5gs) -> bool {
        let Some(amf_ue) = self.amf_ue_list.get_mut(&id) else {
            return false;
        };
        if let Some(ref old_guti) = amf_ue.current_guti {
            self.guti_ue_hash.remove(&old_guti.to_ue_context_id());
        }
        self.guti_ue_hash.insert(guti.to_ue_context_id(), id);
        amf_ue.current_guti = Some(guti);
        true
    }

    pub fn amf_ue_count(&self) -> usize {
        self.amf_ue_list.len()
    }

    // ========================================================================
    // Connection state
    // ========================================================================

    /// Associate AMF UE with RAN UE (UE enters CM-CONNECTED)
    pub fn amf_ue_associate_ran_ue(&mut self, amf_ue_id: u64, ran_ue_id: u64) -> bool {
        let (Some(amf_ue), Some(ran_ue)) = (
            self.amf_ue_list.get_mut(&amf_ue_id),
            self.ran_ue_list.get_mut(&ran_ue_id),
        ) else {
            return false;
        };
        amf_ue.ran_ue_id = ran_ue_id;
        ran_ue.amf_ue_id = amf_ue_id;
        true
    }

    /// Deassociate AMF UE from its RAN UE (UE enters CM-IDLE)
    pub fn amf_ue_deassociate_ran_ue(&mut self, amf_ue_id: u64) {
        let Some(amf_ue) = self.amf_ue_list.get_mut(&amf_ue_id) else {
            return;
        };
        let ran_ue_id = std::mem::replace(&mut amf_ue.ran_ue_id, OGS_INVALID_POOL_ID);
        if let Some(ran_ue) = self.ran_ue_list.get_mut(&ran_ue_id) {
            ran_ue.amf_ue_id = OGS_INVALID_POOL_ID;
        }
    }

    /// RAN UE currently serving the AMF UE
    pub fn ran_ue_of(&self, amf_ue_id: u64) -> Option<&RanUe> {
        let amf_ue = self.amf_ue_list.get(&amf_ue_id)?;
        self.ran_ue_list.get(&amf_ue.ran_ue_id)
    }

    /// CM state of the AMF UE
    pub fn cm_state(&self, amf_ue_id: u64) -> CmState {
        if self.ran_ue_of(amf_ue_id).is_some() {
            CmState::Connected
        } else {
            CmState::Idle
        }
    }

    /// Security context valid and initial context setup answered on the current leg
    pub fn context_setup_established(&self, amf_ue_id: u64) -> bool {
        let Some(amf_ue) = self.amf_ue_list.get(&amf_ue_id) else {
            return false;
        };
        amf_ue.security_context_is_valid()
            && self
                .ran_ue_list
                .get(&amf_ue.ran_ue_id)
                .map(|ran_ue| ran_ue.initial_context_setup_response_received)
                .unwrap_or(false)
    }

    /// Drop the NG context of a UE that moved to another AMF
    pub fn amf_ue_clear_ng_context(&mut self, amf_ue_id: u64) {
        let ran_ue_id = match self.amf_ue_list.get(&amf_ue_id) {
            Some(amf_ue) => amf_ue.ran_ue_id,
            None => return,
        };
        self.amf_ue_deassociate_ran_ue(amf_ue_id);
        self.ran_ue_remove(ran_ue_id);
    }

    // ========================================================================
    // Session Management
    // ========================================================================

    pub fn sess_add(&mut self, amf_ue_id: u64, psi: u8) -> Option<u64> {
        if psi == OGS_NAS_PDU_SESSION_IDENTITY_UNASSIGNED {
            log::error!("[ue_id={}] PSI unassigned", amf_ue_id);
            return None;
        }
        if self.sess_find_by_psi(amf_ue_id, psi).is_some() {
            log::error!("[ue_id={}, psi={}] Session already exists", amf_ue_id, psi);
            return None;
        }

        let amf_ue = self.amf_ue_list.get_mut(&amf_ue_id)?;
        if amf_ue.sess_ids.len() >= OGS_MAX_NUM_OF_SESS {
            log::error!("[ue_id={}] Maximum number of sessions [{}] reached", amf_ue_id, OGS_MAX_NUM_OF_SESS);
            return None;
        }

        let id = self.next_sess_id;
        self.next_sess_id += 1;
        amf_ue.sess_ids.push(id);
        self.sess_list.insert(id, AmfSess::new(id, amf_ue_id, psi));

        log::debug!("[ue_id={}, psi={}] AMF session added (id={})", amf_ue_id, psi, id);
        Some(id)
    }

    pub fn sess_remove(&mut self, id: u64) -> Option<AmfSess> {
        let sess = self.sess_list.remove(&id)?;
        if let Some(amf_ue) = self.amf_ue_list.get_mut(&sess.amf_ue_id) {
            amf_ue.sess_ids.retain(|sess_id| *sess_id != id);
        }
        self.pending.clear_for_sess(sess.amf_ue_id, id);

        log::debug!(
            "[ue_id={}, psi={}] AMF session removed (id={})",
            sess.amf_ue_id, sess.psi, id
        );
        Some(sess)
    }

    pub fn sess(&self, id: u64) -> Option<&AmfSess> {
        self.sess_list.get(&id)
    }

    pub fn sess_mut(&mut self, id: u64) -> Option<&mut AmfSess> {
        self.sess_list.get_mut(&id)
    }

    pub fn sess_find_by_psi(&self, amf_ue_id: u64, psi: u8) -> Option<u64> {
        let amf_ue = self.amf_ue_list.get(&amf_ue_id)?;
        amf_ue
            .sess_ids
            .iter()
            .copied()
            .find(|id| self.sess_list.get(id).map(|sess| sess.psi) == Some(psi))
    }

    /// Sessions of an AMF UE in creation order
    pub fn sess_list_for_ue(&self, amf_ue_id: u64) -> Vec<&AmfSess> {
        let Some(amf_ue) = self.amf_ue_list.get(&amf_ue_id) else {
            return Vec::new();
        };
        amf_ue
            .sess_ids
            .iter()
            .filter_map(|id| self.sess_list.get(id))
            .collect()
    }

    pub fn sess_count(&self) -> usize {
        self.sess_list.len()
    }
}

impl Default for AmfContext {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Tests
// ============================================================================
