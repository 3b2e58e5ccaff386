//! Namf service-interface documents
//!
//! JSON bodies exchanged on the Namf_Communication and Namf_Callback
//! services, plus the request/response envelope the event loop passes to the
//! handlers. Field names follow the wire (camelCase).

use std::collections::HashMap;

use bytes::Bytes;
use hyper::{Method, StatusCode};
use serde::{Deserialize, Serialize};

use crate::context::{AccessType, ResourceStatus};

// ============================================================================
// Request / Response envelope
// ============================================================================

/// Inbound SBI request, already split into path components
#[derive(Debug, Clone)]
pub struct NamfRequest {
    /// HTTP method
    pub method: Method,
    /// Service name (`namf-comm`, `namf-callback`)
    pub service: String,
    /// Path components after the API version (`ue-contexts`, `{supi}`, ...)
    pub components: Vec<String>,
    /// JSON body
    pub body: Option<serde_json::Value>,
    /// Multipart binary parts keyed by Content-ID
    pub parts: HashMap<String, Bytes>,
}

impl NamfRequest {
    /// Create a request from a path such as `/namf-comm/v1/ue-contexts/imsi-1/n1-n2-messages`
    pub fn new(method: Method, path: &str) -> Self {
        let mut segments = path.split('/').filter(|c| !c.is_empty());
        let service = segments.next().unwrap_or_default().to_string();
        let components = segments.skip(1).map(str::to_string).collect();
        Self {
            method,
            service,
            components,
            body: None,
            parts: HashMap::new(),
        }
    }

    /// Attach a JSON body
    pub fn with_json<T: Serialize>(mut self, body: &T) -> serde_json::Result<Self> {
        self.body = Some(serde_json::to_value(body)?);
        Ok(self)
    }

    /// Attach a binary part
    pub fn with_part(mut self, content_id: &str, data: Bytes) -> Self {
        self.parts.insert(content_id.to_string(), data);
        self
    }

    /// Path component at `index`
    pub fn component(&self, index: usize) -> Option<&str> {
        self.components.get(index).map(String::as_str)
    }

    /// Remove and return the binary part referenced by a content ID
    pub fn take_part(&mut self, content_id: &str) -> Option<Bytes> {
        self.parts.remove(content_id)
    }
}

/// Outbound SBI response
#[derive(Debug, Clone, PartialEq)]
pub struct NamfResponse {
    /// HTTP status
    pub status: StatusCode,
    /// Location header
    pub location: Option<String>,
    /// JSON body
    pub body: Option<serde_json::Value>,
}

impl NamfResponse {
    /// Response without a body
    pub fn with_status(status: StatusCode) -> Self {
        Self {
            status,
            location: None,
            body: None,
        }
    }

    /// Response with a JSON body
    pub fn with_json<T: Serialize>(status: StatusCode, body: &T) -> Self {
        match serde_json::to_value(body) {
            Ok(value) => Self {
                status,
                location: None,
                body: Some(value),
            },
            Err(e) => {
                log::error!("Failed to encode response body: {}", e);
                Self::with_status(StatusCode::INTERNAL_SERVER_ERROR)
            }
        }
    }

    /// Set the Location header
    pub fn with_location(mut self, location: String) -> Self {
        self.location = Some(location);
        self
    }

    /// Decode the JSON body
    pub fn json<T: for<'de> Deserialize<'de>>(&self) -> Option<T> {
        self.body
            .as_ref()
            .and_then(|body| serde_json::from_value(body.clone()).ok())
    }
}

/// Problem details (RFC 7807)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProblemDetails {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl ProblemDetails {
    pub fn with_status(status: u16) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn with_title(mut self, title: &str) -> Self {
        self.title = Some(title.to_string());
        self
    }

    pub fn with_detail(mut self, detail: &str) -> Self {
        self.detail = Some(detail.to_string());
        self
    }
}

// ============================================================================
// Common types
// ============================================================================

/// S-NSSAI on the wire
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snssai {
    pub sst: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sd: Option<String>,
}

impl From<&crate::context::SNssai> for Snssai {
    fn from(s_nssai: &crate::context::SNssai) -> Self {
        Self {
            sst: s_nssai.sst,
            sd: s_nssai.sd_string(),
        }
    }
}

/// Aggregate bitrate
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ambr {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uplink: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub downlink: Option<String>,
}

/// Reference to a multipart binary part
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefToBinaryData {
    pub content_id: String,
}

// ============================================================================
// N1N2MessageTransfer
// ============================================================================

/// N1 message class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum N1MessageClass {
    #[serde(rename = "5GMM")]
    FiveGmm,
    Sm,
    Lpp,
    Sms,
    Updp,
    Lcs,
}

/// N2 information class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum N2InformationClass {
    Sm,
    Nrppa,
    Pws,
    PwsBcal,
    PwsRf,
    Ran,
    V2x,
    Prose,
}

/// NGAP IE carried in an N2 SM information container
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NgapIeType {
    PduResSetupReq,
    PduResRelCmd,
    PduResModReq,
    HandoverCmd,
    HandoverRequiredAck,
    HandoverPrepFail,
    SrcToTarContainer,
    TarToSrcContainer,
    PduResNotify,
    PduResModInd,
    PduResSetupRsp,
    PduResModRsp,
    PduResRelRsp,
}

/// N1 message container
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct N1MessageContainer {
    pub n1_message_class: N1MessageClass,
    pub n1_message_content: Option<RefToBinaryData>,
}

/// N2 content
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct N2InfoContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ngap_ie_type: Option<NgapIeType>,
    pub ngap_data: Option<RefToBinaryData>,
}

/// N2 SM information
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct N2SmInformation {
    pub pdu_session_id: u8,
    pub n2_info_content: Option<N2InfoContent>,
}

/// N2 information container
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct N2InfoContainer {
    pub n2_information_class: N2InformationClass,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sm_info: Option<N2SmInformation>,
}

/// N1N2MessageTransferReqData
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct N1N2MessageTransferReqData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub n1_message_container: Option<N1MessageContainer>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub n2_info_container: Option<N2InfoContainer>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_ind: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pdu_session_id: Option<u8>,
    #[serde(
        rename = "n1n2FailureTxfNotifURI",
        skip_serializing_if = "Option::is_none"
    )]
    pub n1n2_failure_txf_notif_uri: Option<String>,
}

/// N1N2 message transfer cause
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum N1N2MessageTransferCause {
    AttemptingToReachUe,
    N1N2TransferInitiated,
    WaitingForAsynchronousTransfer,
    UeNotResponding,
    N1MsgNotTransferred,
    N2MsgNotTransferred,
    UeNotReachableForSession,
    TemporaryRejectRegistrationOngoing,
    TemporaryRejectHandoverOngoing,
}

impl N1N2MessageTransferCause {
    /// Wire form
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AttemptingToReachUe => "ATTEMPTING_TO_REACH_UE",
            Self::N1N2TransferInitiated => "N1_N2_TRANSFER_INITIATED",
            Self::WaitingForAsynchronousTransfer => "WAITING_FOR_ASYNCHRONOUS_TRANSFER",
            Self::UeNotResponding => "UE_NOT_RESPONDING",
            Self::N1MsgNotTransferred => "N1_MSG_NOT_TRANSFERRED",
            Self::N2MsgNotTransferred => "N2_MSG_NOT_TRANSFERRED",
            Self::UeNotReachableForSession => "UE_NOT_REACHABLE_FOR_SESSION",
            Self::TemporaryRejectRegistrationOngoing => "TEMPORARY_REJECT_REGISTRATION_ONGOING",
            Self::TemporaryRejectHandoverOngoing => "TEMPORARY_REJECT_HANDOVER_ONGOING",
        }
    }
}

/// N1N2MessageTransferRspData
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct N1N2MessageTransferRspData {
    pub cause: N1N2MessageTransferCause,
}

/// N1N2MsgTxfrFailureNotification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct N1N2MsgTxfrFailureNotification {
    pub cause: N1N2MessageTransferCause,
    pub n1n2_msg_data_uri: String,
}

// ============================================================================
// SmContextStatusNotification
// ============================================================================

/// Resource status on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResourceStatusModel {
    Released,
    Unchanged,
    Transferred,
    Updated,
    AltAnchorSmf,
}

impl From<ResourceStatusModel> for ResourceStatus {
    fn from(status: ResourceStatusModel) -> Self {
        match status {
            ResourceStatusModel::Released => ResourceStatus::Released,
            ResourceStatusModel::Unchanged => ResourceStatus::Unchanged,
            ResourceStatusModel::Transferred => ResourceStatus::Transferred,
            ResourceStatusModel::Updated => ResourceStatus::Updated,
            ResourceStatusModel::AltAnchorSmf => ResourceStatus::AltAnchorSmf,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusInfo {
    pub resource_status: ResourceStatusModel,
}

/// SmContextStatusNotification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SmContextStatusNotification {
    pub status_info: Option<StatusInfo>,
}

// ============================================================================
// DeregistrationData
// ============================================================================

/// Deregistration reason
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeregistrationReason {
    #[serde(rename = "UE_INITIAL_REGISTRATION")]
    UeInitialRegistration,
    #[serde(rename = "UE_REGISTRATION_AREA_CHANGE")]
    UeRegistrationAreaChange,
    #[serde(rename = "SUBSCRIPTION_WITHDRAWN")]
    SubscriptionWithdrawn,
    #[serde(rename = "5GS_TO_EPS_MOBILITY")]
    FiveGsToEpsMobility,
    #[serde(rename = "5GS_TO_EPS_MOBILITY_UE_INITIAL_REGISTRATION")]
    FiveGsToEpsMobilityUeInitialRegistration,
    #[serde(rename = "REREGISTRATION_REQUIRED")]
    ReregistrationRequired,
    #[serde(rename = "SMF_CONTEXT_TRANSFERRED")]
    SmfContextTransferred,
}

/// DeregistrationData
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeregistrationData {
    pub dereg_reason: Option<DeregistrationReason>,
    pub access_type: AccessType,
}

// ============================================================================
// ModificationNotification
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeType {
    Add,
    Move,
    Remove,
    Replace,
}

/// One JSON-patch-like change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeItem {
    pub op: ChangeType,
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub orig_value: Option<serde_json::Value>,
    #[serde(default)]
    pub new_value: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotifyItem {
    pub resource_id: String,
    pub changes: Vec<ChangeItem>,
}

/// ModificationNotification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModificationNotification {
    pub notify_items: Vec<NotifyItem>,
}

// ============================================================================
// UEContextTransfer
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransferReason {
    InitReg,
    MobiReg,
    MobiRegUeValidated,
}

/// UeContextTransferReqData
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UeContextTransferReqData {
    pub reason: TransferReason,
    pub access_type: AccessType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScType {
    Native,
    Mapped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NgKsi {
    pub tsc: ScType,
    pub ksi: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum KeyAmfType {
    Kamf,
    KamfPrime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyAmf {
    pub key_type: KeyAmfType,
    pub key_val: String,
}

/// Security anchor function data
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeafData {
    pub ng_ksi: NgKsi,
    pub key_amf: KeyAmf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NasSecurityMode {
    pub integrity_algorithm: String,
    pub ciphering_algorithm: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NssaiMapping {
    pub mapped_snssai: Snssai,
    pub h_snssai: Snssai,
}

/// MM context of one access
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MmContext {
    pub access_type: AccessType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nas_security_mode: Option<NasSecurityMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nas_downlink_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nas_uplink_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ue_security_capability: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed_nssai: Vec<Snssai>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub nssai_mapping_list: Vec<NssaiMapping>,
}

/// Session summary handed to the target AMF
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PduSessionContext {
    pub pdu_session_id: u8,
    pub sm_context_ref: Option<String>,
    #[serde(rename = "sNssai")]
    pub s_nssai: Snssai,
    pub dnn: Option<String>,
    pub access_type: AccessType,
}

/// UE context snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UeContext {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supi: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supi_unauth_ind: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pei: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub_ue_ambr: Option<Ambr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seaf_data: Option<SeafData>,
    #[serde(rename = "5gMmCapability", skip_serializing_if = "Option::is_none")]
    pub five_g_mm_capability: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pcf_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mm_context_list: Vec<MmContext>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_context_list: Option<Vec<PduSessionContext>>,
}

/// UeContextTransferRspData
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UeContextTransferRspData {
    pub ue_context: UeContext,
}

// ============================================================================
// RegistrationStatusUpdate
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UeContextTransferStatus {
    Transferred,
    NotTransferred,
}

/// UeRegStatusUpdateReqData
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UeRegStatusUpdateReqData {
    pub transfer_status: Option<UeContextTransferStatus>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub to_release_session_list: Vec<u8>,
}

/// UeRegStatusUpdateRspData
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UeRegStatusUpdateRspData {
    pub reg_status_transfer_complete: bool,
}
