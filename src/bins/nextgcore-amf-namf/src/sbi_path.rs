//! AMF SBI Path Functions
//!
//! Client registry for notification targets, callback location URIs, and the
//! outbound SBI requests issued by the Namf procedures.

use std::collections::HashMap;
use std::net::IpAddr;

use thiserror::Error;
use tokio::sync::mpsc;

use crate::context::{AmfSess, AmfUe, DeregistrationState};
use crate::error::{SendError, SendResult};
use crate::models::N1N2MessageTransferCause;

// ============================================================================
// Constants
// ============================================================================

/// SBI service names
pub mod service_name {
    pub const NAMF_COMM: &str = "namf-comm";
    pub const NAMF_CALLBACK: &str = "namf-callback";
    pub const NUDM_SDM: &str = "nudm-sdm";
    pub const NSMF_PDUSESSION: &str = "nsmf-pdusession";
    pub const NPCF_AM_POLICY_CONTROL: &str = "npcf-am-policy-control";
}

/// SBI API versions
pub mod api_version {
    pub const V1: &str = "v1";
    pub const V2: &str = "v2";
}

/// SBI resource names
pub mod resource_name {
    pub const UE_CONTEXTS: &str = "ue-contexts";
    pub const N1_N2_MESSAGES: &str = "n1-n2-messages";
    pub const SM_CONTEXT_STATUS: &str = "sm-context-status";
    pub const DEREG_NOTIFY: &str = "dereg-notify";
    pub const SDMSUBSCRIPTION_NOTIFY: &str = "sdmsubscription-notify";
    pub const TRANSFER: &str = "transfer";
    pub const TRANSFER_UPDATE: &str = "transfer-update";
    pub const AM_DATA: &str = "am-data";
}

/// Default HTTP port
pub const HTTP_PORT: u16 = 80;
/// Default HTTPS port
pub const HTTPS_PORT: u16 = 443;

// ============================================================================
// SBI Error Types
// ============================================================================

/// Notification target resolution errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SbiError {
    /// URI does not parse
    #[error("Invalid URI: {0}")]
    InvalidUri(String),

    /// Scheme other than http/https
    #[error("Unsupported URI scheme: {0}")]
    UnsupportedScheme(String),

    /// No authority in the URI
    #[error("No host in URI: {0}")]
    NoHost(String),

    /// Client registry is full
    #[error("Maximum number of SBI clients [{0}] reached")]
    ClientLimit(usize),
}

// ============================================================================
// URIs
// ============================================================================

/// URI scheme
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UriScheme {
    Http,
    Https,
}

impl UriScheme {
    /// Scheme string
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Https => "https",
        }
    }

    /// Default port of the scheme
    pub fn default_port(&self) -> u16 {
        match self {
            Self::Http => HTTP_PORT,
            Self::Https => HTTPS_PORT,
        }
    }
}

/// Own SBI server URI
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NfUri {
    pub scheme: UriScheme,
    pub host: String,
    pub port: u16,
}

impl NfUri {
    /// Create a server URI
    pub fn new(scheme: UriScheme, host: &str, port: u16) -> Self {
        Self {
            scheme,
            host: host.to_string(),
            port,
        }
    }

    /// "scheme://host[:port]", the port omitted when it is the scheme default
    pub fn base_uri(&self) -> String {
        let host = match self.host.parse::<IpAddr>() {
            Ok(IpAddr::V6(_)) => format!("[{}]", self.host),
            _ => self.host.clone(),
        };
        if self.port == self.scheme.default_port() {
            format!("{}://{}", self.scheme.as_str(), host)
        } else {
            format!("{}://{}:{}", self.scheme.as_str(), host, self.port)
        }
    }
}

/// Location of a UE's N1/N2 message transfer resource
pub fn n1n2_message_location(nf_uri: &NfUri, supi: &str, sm_context_ref: Option<&str>) -> String {
    let mut location = format!(
        "{}/{}/{}/{}/{}/{}",
        nf_uri.base_uri(),
        service_name::NAMF_COMM,
        api_version::V1,
        resource_name::UE_CONTEXTS,
        supi,
        resource_name::N1_N2_MESSAGES
    );
    if let Some(sm_context_ref) = sm_context_ref {
        location.push('/');
        location.push_str(sm_context_ref);
    }
    location
}

// ============================================================================
// Client registry
// ============================================================================

/// Client lookup key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientKey {
    pub scheme: UriScheme,
    pub host: String,
    pub port: u16,
}

impl ClientKey {
    /// Parse the authority of a notification URI
    pub fn from_uri(uri: &str) -> Result<Self, SbiError> {
        let parsed: hyper::Uri = uri
            .parse()
            .map_err(|_| SbiError::InvalidUri(uri.to_string()))?;

        let scheme = match parsed.scheme_str() {
            Some("http") => UriScheme::Http,
            Some("https") => UriScheme::Https,
            Some(other) => return Err(SbiError::UnsupportedScheme(other.to_string())),
            None => return Err(SbiError::InvalidUri(uri.to_string())),
        };
        let host = parsed
            .host()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| SbiError::NoHost(uri.to_string()))?
            .trim_start_matches('[')
            .trim_end_matches(']')
            .to_string();
        let port = parsed.port_u16().unwrap_or(scheme.default_port());

        Ok(Self { scheme, host, port })
    }
}

/// SBI client towards a peer
#[derive(Debug, Clone)]
pub struct SbiClient {
    pub id: u64,
    pub key: ClientKey,
    /// Resolved address when the host is a literal IP
    pub addr: Option<IpAddr>,
}

/// SBI clients keyed by scheme, host and port
#[derive(Debug)]
pub struct ClientRegistry {
    clients: HashMap<ClientKey, SbiClient>,
    max_clients: usize,
    next_id: u64,
}

impl ClientRegistry {
    /// Create an empty registry
    pub fn new(max_clients: usize) -> Self {
        Self {
            clients: HashMap::new(),
            max_clients,
            next_id: 1,
        }
    }

    /// Find a client
    pub fn find(&self, key: &ClientKey) -> Option<&SbiClient> {
        self.clients.get(key)
    }

    /// Add a client
    pub fn add(&mut self, key: ClientKey) -> Result<&SbiClient, SbiError> {
        if self.clients.len() >= self.max_clients {
            log::error!("Maximum number of SBI clients [{}] reached", self.max_clients);
            return Err(SbiError::ClientLimit(self.max_clients));
        }

        let id = self.next_id;
        self.next_id += 1;
        let addr = key.host.parse::<IpAddr>().ok();
        log::debug!(
            "SBI client added [{}://{}:{}] (id={})",
            key.scheme.as_str(), key.host, key.port, id
        );
        Ok(self
            .clients
            .entry(key.clone())
            .or_insert(SbiClient { id, key, addr }))
    }

    /// Find or add the client serving a notification URI
    pub fn find_or_add_by_uri(&mut self, uri: &str) -> Result<ClientKey, SbiError> {
        let key = ClientKey::from_uri(uri)?;
        if self.find(&key).is_none() {
            self.add(key.clone())?;
        }
        Ok(key)
    }

    /// Drop a client nothing refers to any more
    pub fn remove(&mut self, key: &ClientKey) -> Option<SbiClient> {
        let client = self.clients.remove(key)?;
        log::debug!(
            "SBI client removed [{}://{}:{}] (id={})",
            key.scheme.as_str(), key.host, key.port, client.id
        );
        Some(client)
    }

    /// Number of clients
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

// ============================================================================
// Outbound SBI requests
// ============================================================================

/// SBI service type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SbiServiceType {
    NudmSdm,
    NpcfAmPolicyControl,
    NsmfPdusession,
    NamfCallback,
}

impl SbiServiceType {
    /// Get service name
    pub fn service_name(&self) -> &'static str {
        match self {
            Self::NudmSdm => service_name::NUDM_SDM,
            Self::NpcfAmPolicyControl => service_name::NPCF_AM_POLICY_CONTROL,
            Self::NsmfPdusession => service_name::NSMF_PDUSESSION,
            Self::NamfCallback => service_name::NAMF_CALLBACK,
        }
    }
}

/// Request issued towards a peer NF
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SbiRequest {
    /// Nudm_SDM_Unsubscribe
    UdmSdmSubscriptionDelete {
        supi: String,
        subscription_id: String,
        state: Option<DeregistrationState>,
    },
    /// Npcf_AMPolicyControl_Delete
    PcfAmPolicyControlDelete {
        supi: String,
        association_id: String,
        state: Option<DeregistrationState>,
    },
    /// Nsmf_PDUSession_ReleaseSMContext
    SmfReleaseSmContext {
        supi: String,
        psi: u8,
        sm_context_ref: String,
    },
    /// N1N2MessageTransferFailureNotification callback
    N1N2TransferFailureNotify {
        client: ClientKey,
        uri: String,
        /// Location of the failed N1/N2 message transfer
        location: String,
        cause: N1N2MessageTransferCause,
    },
}

impl SbiRequest {
    /// Service the request belongs to
    pub fn service_type(&self) -> SbiServiceType {
        match self {
            Self::UdmSdmSubscriptionDelete { .. } => SbiServiceType::NudmSdm,
            Self::PcfAmPolicyControlDelete { .. } => SbiServiceType::NpcfAmPolicyControl,
            Self::SmfReleaseSmContext { .. } => SbiServiceType::NsmfPdusession,
            Self::N1N2TransferFailureNotify { .. } => SbiServiceType::NamfCallback,
        }
    }
}

/// Outbound SBI transport with NF discovery
pub trait SbiSender {
    fn discover_and_send(&mut self, request: SbiRequest) -> SendResult<()>;
}

/// [`SbiSender`] forwarding to the SBI client task
#[derive(Debug, Clone)]
pub struct ChannelSbiSender {
    tx: mpsc::UnboundedSender<SbiRequest>,
}

impl ChannelSbiSender {
    pub fn new(tx: mpsc::UnboundedSender<SbiRequest>) -> Self {
        Self { tx }
    }
}

impl SbiSender for ChannelSbiSender {
    fn discover_and_send(&mut self, request: SbiRequest) -> SendResult<()> {
        self.tx
            .send(request)
            .map_err(|e| SendError::TransportClosed(format!("SBI {}", e.0.service_type().service_name())))
    }
}

/// Cancel the UDM SDM subscription if any, else delete the AM policy association
///
/// Returns the service the request went to.
pub fn amf_ue_sbi_unsubscribe(
    sbi: &mut dyn SbiSender,
    amf_ue: &AmfUe,
    state: Option<DeregistrationState>,
) -> SendResult<Option<SbiServiceType>> {
    let supi = amf_ue.supi_str().to_string();

    let request = if let Some(ref id) = amf_ue.data_change_subscription.id {
        SbiRequest::UdmSdmSubscriptionDelete {
            supi,
            subscription_id: id.clone(),
            state,
        }
    } else if let Some(ref id) = amf_ue.policy_association.id {
        SbiRequest::PcfAmPolicyControlDelete {
            supi,
            association_id: id.clone(),
            state,
        }
    } else {
        return Ok(None);
    };

    let service_type = request.service_type();
    log::debug!("[{}] Send {}", amf_ue.supi_str(), service_type.service_name());
    sbi.discover_and_send(request)?;
    Ok(Some(service_type))
}

/// Ask the SMF to release a session's SM context
pub fn amf_sbi_send_release_session(
    sbi: &mut dyn SbiSender,
    amf_ue: &AmfUe,
    sess: &AmfSess,
) -> SendResult<bool> {
    let Some(ref sm_context_ref) = sess.sm_context_ref else {
        return Ok(false);
    };
    log::debug!("[{}:{}] Send release session", amf_ue.supi_str(), sess.psi);
    sbi.discover_and_send(SbiRequest::SmfReleaseSmContext {
        supi: amf_ue.supi_str().to_string(),
        psi: sess.psi,
        sm_context_ref: sm_context_ref.clone(),
    })?;
    Ok(true)
}

// ============================================================================
// Tests
// ============================================================================
