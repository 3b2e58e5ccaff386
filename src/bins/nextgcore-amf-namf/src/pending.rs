//! Pending N1/N2 transfers
//!
//! A UE in CM-IDLE cannot receive the payload of an N1N2MessageTransfer, so
//! the transfer is parked here while the UE is paged. At most one transfer is
//! pending per UE; a newer request overwrites the older one.

use std::collections::HashMap;

use bytes::Bytes;

use crate::sbi_path::ClientKey;

/// Payload to deliver once the UE answers paging
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeferredTransfer {
    /// PDU session resource setup, N1 already wrapped in a DL NAS transport
    SessionSetup { n1buf: Option<Bytes>, n2buf: Bytes },
    /// PDU session modification command
    SessionModify { n1buf: Bytes, n2buf: Bytes },
    /// PDU session release command
    SessionRelease { n1buf: Option<Bytes>, n2buf: Bytes },
}

impl DeferredTransfer {
    /// Name for logs
    pub fn name(&self) -> &'static str {
        match self {
            Self::SessionSetup { .. } => "PDU_RES_SETUP_REQ",
            Self::SessionModify { .. } => "PDU_RES_MOD_REQ",
            Self::SessionRelease { .. } => "PDU_RES_REL_CMD",
        }
    }
}

/// Where to report that the UE could not be reached
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureNotifTarget {
    /// n1n2FailureTxfNotifURI
    pub uri: String,
    /// Client resolved from the URI
    pub client: ClientKey,
}

/// Transfer parked while paging
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingTransfer {
    /// Session the transfer belongs to
    pub sess_id: u64,
    /// PDU session identity
    pub psi: u8,
    /// Location returned to the SMF
    pub location: String,
    /// Failure notification target
    pub failure_notif: Option<FailureNotifTarget>,
    /// Payload
    pub transfer: DeferredTransfer,
}

/// Pending transfers keyed by AMF UE ID
#[derive(Debug, Default)]
pub struct PendingTransferStore {
    records: HashMap<u64, PendingTransfer>,
}

impl PendingTransferStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Park a transfer, returning the one it replaced
    pub fn store(&mut self, amf_ue_id: u64, record: PendingTransfer) -> Option<PendingTransfer> {
        let previous = self.records.insert(amf_ue_id, record);
        if let Some(ref previous) = previous {
            log::warn!(
                "[ue_id={}, psi={}] Pending {} overwritten",
                amf_ue_id,
                previous.psi,
                previous.transfer.name()
            );
        }
        previous
    }

    /// Pending transfer of a UE
    pub fn get(&self, amf_ue_id: u64) -> Option<&PendingTransfer> {
        self.records.get(&amf_ue_id)
    }

    /// Remove and return the pending transfer of a UE
    pub fn take(&mut self, amf_ue_id: u64) -> Option<PendingTransfer> {
        self.records.remove(&amf_ue_id)
    }

    /// Drop the pending transfer of a UE
    pub fn clear(&mut self, amf_ue_id: u64) {
        if self.records.remove(&amf_ue_id).is_some() {
            log::debug!("[ue_id={}] Pending transfer cleared", amf_ue_id);
        }
    }

    /// Drop the pending transfer of a UE if it belongs to the session
    pub fn clear_for_sess(&mut self, amf_ue_id: u64, sess_id: u64) {
        if self.records.get(&amf_ue_id).map(|r| r.sess_id) == Some(sess_id) {
            self.clear(amf_ue_id);
        }
    }

    /// Number of pending transfers
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(sess_id: u64, psi: u8) -> PendingTransfer {
        PendingTransfer {
            sess_id,
            psi,
            location: format!("http://amf/n1-n2-messages/{psi}"),
            failure_notif: None,
            transfer: DeferredTransfer::SessionRelease {
                n1buf: None,
                n2buf: Bytes::from_static(&[0x01]),
            },
        }
    }

    #[test]
    fn test_store_overwrites() {
        let mut store = PendingTransferStore::new();
        assert!(store.store(1, record(10, 1)).is_none());

        let previous = store.store(1, record(11, 2)).unwrap();
        assert_eq!(previous.psi, 1);
        assert_eq!(store.len(), 1);
        assert_eq!(store.get(1).unwrap().psi, 2);
    }

    #[test]
    fn test_clear_for_sess_only_matching() {
        let mut store = PendingTransferStore::new();
        store.store(1, record(10, 1));

        store.clear_for_sess(1, 99);
        assert!(store.get(1).is_some());

        store.clear_for_sess(1, 10);
        assert!(store.is_empty());
    }

    #[test]
    fn test_take() {
        let mut store = PendingTransferStore::new();
        store.store(1, record(10, 1));
        assert_eq!(store.take(1).unwrap().sess_id, 10);
        assert!(store.take(1).is_none());
    }
}
