//! NGAP Path
//!
//! Hand-off of encoded NGAP messages to the transport serving the gNBs. The
//! SCTP association handling lives behind [`RanSender`]; the daemon forwards
//! everything over a channel with [`ChannelRanSender`].

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::context::{AmfUe, RanUe};
use crate::error::{SendError, SendResult};
use crate::ngap_build;

/// Message queued towards the NGAP transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NgapOutbound {
    /// UE-associated message on the radio leg
    ToRanUe {
        gnb_id: u64,
        amf_ue_ngap_id: u64,
        ran_ue_ngap_id: u64,
        pkbuf: Bytes,
    },
    /// Paging towards every gNB serving the UE's tracking area
    Paging { amf_ue_id: u64, pkbuf: Bytes },
}

/// Outbound NGAP transport
pub trait RanSender {
    /// Send a UE-associated message on the radio leg
    fn send_to_ran_ue(&mut self, ran_ue: &RanUe, pkbuf: Bytes) -> SendResult<()>;

    /// Broadcast paging for an idle UE
    fn send_paging(&mut self, amf_ue: &AmfUe, pkbuf: Bytes) -> SendResult<()>;
}

/// [`RanSender`] forwarding to the NGAP transport task
#[derive(Debug, Clone)]
pub struct ChannelRanSender {
    tx: mpsc::UnboundedSender<NgapOutbound>,
}

impl ChannelRanSender {
    pub fn new(tx: mpsc::UnboundedSender<NgapOutbound>) -> Self {
        Self { tx }
    }
}

impl RanSender for ChannelRanSender {
    fn send_to_ran_ue(&mut self, ran_ue: &RanUe, pkbuf: Bytes) -> SendResult<()> {
        self.tx
            .send(NgapOutbound::ToRanUe {
                gnb_id: ran_ue.gnb_id,
                amf_ue_ngap_id: ran_ue.amf_ue_ngap_id,
                ran_ue_ngap_id: ran_ue.ran_ue_ngap_id,
                pkbuf,
            })
            .map_err(|_| SendError::TransportClosed("NGAP".to_string()))
    }

    fn send_paging(&mut self, amf_ue: &AmfUe, pkbuf: Bytes) -> SendResult<()> {
        self.tx
            .send(NgapOutbound::Paging {
                amf_ue_id: amf_ue.id,
                pkbuf,
            })
            .map_err(|_| SendError::TransportClosed("NGAP".to_string()))
    }
}

// ============================================================================
// NGAP Path Functions
// ============================================================================

/// Send an NGAP message to the radio leg
pub fn ngap_send_to_ran_ue(ran: &mut dyn RanSender, ran_ue: &RanUe, pkbuf: Bytes) -> SendResult<()> {
    log::debug!(
        "Send NGAP [RAN_UE_NGAP_ID:{} AMF_UE_NGAP_ID:{}] ({} bytes)",
        ran_ue.ran_ue_ngap_id,
        ran_ue.amf_ue_ngap_id,
        pkbuf.len()
    );
    ran.send_to_ran_ue(ran_ue, pkbuf)
}

/// Wrap a NAS PDU in a Downlink NAS Transport and send it
pub fn ngap_send_downlink_nas_transport(
    ran: &mut dyn RanSender,
    ran_ue: &RanUe,
    nas_pdu: &[u8],
) -> SendResult<()> {
    let ngapbuf = ngap_build::build_downlink_nas_transport(ran_ue, nas_pdu);
    ngap_send_to_ran_ue(ran, ran_ue, ngapbuf)
}

/// Send the UE Context Modification Request carrying the cached policy
pub fn ngap_send_ue_context_modification_request(
    ran: &mut dyn RanSender,
    ran_ue: &RanUe,
    amf_ue: &AmfUe,
) -> SendResult<()> {
    log::debug!("[{}] UE context modification request", amf_ue.supi_str());
    let ngapbuf = ngap_build::build_ue_context_modification_request(ran_ue, amf_ue);
    ngap_send_to_ran_ue(ran, ran_ue, ngapbuf)
}
