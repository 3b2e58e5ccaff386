//! Namf_Communication N1N2MessageTransfer
//!
//! The SMF hands the AMF an N1 (5GSM) and/or N2 (NGAP SM) payload for one PDU
//! session. The NGAP IE type of the N2 part selects the procedure; the UE's
//! CM state selects between sending now, holding the payload until the
//! context setup completes, and paging the UE.

use bytes::Bytes;
use hyper::StatusCode;

use crate::context::{AmfContext, CmState, GsmMessageType};
use crate::error::{NamfHandlerError, NamfHandlerResult};
use crate::event::AmfPeers;
use crate::metrics::GlobalMetric;
use crate::models::{N1N2MessageTransferCause, NgapIeType};
use crate::nas_path;
use crate::paging;
use crate::pending::DeferredTransfer;

/// Procedure selected by the N2 content
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferKind {
    /// PDU Session Resource Setup Request
    SessionSetup,
    /// PDU Session Resource Modify Request
    SessionModify,
    /// PDU Session Resource Release Command
    SessionRelease,
    /// No N2 content: the SMF rejected the establishment
    SessionReject,
    /// Any other NGAP IE type
    Unrecognized(NgapIeType),
}

impl TransferKind {
    pub fn classify(ngap_ie_type: Option<NgapIeType>) -> Self {
        match ngap_ie_type {
            None => Self::SessionReject,
            Some(NgapIeType::PduResSetupReq) => Self::SessionSetup,
            Some(NgapIeType::PduResModReq) => Self::SessionModify,
            Some(NgapIeType::PduResRelCmd) => Self::SessionRelease,
            Some(other) => Self::Unrecognized(other),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::SessionSetup => "PDU_RES_SETUP_REQ",
            Self::SessionModify => "PDU_RES_MOD_REQ",
            Self::SessionRelease => "PDU_RES_REL_CMD",
            Self::SessionReject => "N1_ONLY",
            Self::Unrecognized(_) => "UNRECOGNIZED",
        }
    }
}

/// Decoded N1N2MessageTransfer request
#[derive(Debug, Clone)]
pub struct TransferRequest {
    pub sess_id: u64,
    pub kind: TransferKind,
    /// 5GSM message
    pub n1buf: Option<Bytes>,
    /// NGAP SM information
    pub n2buf: Option<Bytes>,
    pub skip_ind: bool,
    pub failure_notif_uri: Option<String>,
}

/// Result reported back to the SMF
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferOutcome {
    pub status: StatusCode,
    pub cause: N1N2MessageTransferCause,
    /// Set when the UE is being paged
    pub location: Option<String>,
}

impl TransferOutcome {
    fn initiated() -> Self {
        Self {
            status: StatusCode::OK,
            cause: N1N2MessageTransferCause::N1N2TransferInitiated,
            location: None,
        }
    }

    fn attempting_to_reach_ue(location: String) -> Self {
        Self {
            status: StatusCode::ACCEPTED,
            cause: N1N2MessageTransferCause::AttemptingToReachUe,
            location: Some(location),
        }
    }
}

/// Dispatch an N1N2MessageTransfer to its procedure
pub fn amf_n1n2_message_transfer(
    ctx: &mut AmfContext,
    peers: &mut AmfPeers<'_>,
    request: TransferRequest,
) -> NamfHandlerResult<TransferOutcome> {
    let sess = ctx
        .sess(request.sess_id)
        .ok_or_else(|| NamfHandlerError::NotFound("No Session Context".to_string()))?;
    let amf_ue_id = sess.amf_ue_id;
    let psi = sess.psi;
    let supi = ctx
        .amf_ue(amf_ue_id)
        .map(|amf_ue| amf_ue.supi_str().to_string())
        .ok_or_else(|| NamfHandlerError::NotFound("No UE Context".to_string()))?;

    log::debug!("[{}:{}] N1N2MessageTransfer [{}]", supi, psi, request.kind.name());

    match request.kind {
        TransferKind::SessionSetup => session_setup(ctx, peers, request, &supi, psi),
        TransferKind::SessionModify => session_modify(ctx, peers, request, &supi, psi),
        TransferKind::SessionRelease => session_release(ctx, peers, request, &supi, psi),
        TransferKind::SessionReject => session_reject(ctx, peers, request, &supi, psi),
        TransferKind::Unrecognized(ngap_ie_type) => {
            log::error!("[{}:{}] Not implemented ngapIeType[{:?}]", supi, psi, ngap_ie_type);
            panic!("unexpected NGAP IE type {:?} in N1N2MessageTransfer", ngap_ie_type);
        }
    }
}

fn session_setup(
    ctx: &mut AmfContext,
    peers: &mut AmfPeers<'_>,
    request: TransferRequest,
    supi: &str,
    psi: u8,
) -> NamfHandlerResult<TransferOutcome> {
    let Some(n2buf) = request.n2buf else {
        log::error!("[{}:{}] No N2 SM Content", supi, psi);
        return Err(NamfHandlerError::BadRequest("No N2 SM Content".to_string()));
    };
    let gmmbuf = request
        .n1buf
        .map(|n1buf| nas_path::gmm_build_n1_sm_transport(psi, &n1buf));
    let amf_ue_id = amf_ue_of(ctx, request.sess_id)?;

    match ctx.cm_state(amf_ue_id) {
        CmState::Connected => {
            nas_path::nas_send_pdu_session_setup_request(ctx, peers.ran, request.sess_id, gmmbuf, n2buf)?;
            Ok(TransferOutcome::initiated())
        }
        CmState::Idle => {
            let Some(uri) = request.failure_notif_uri.as_deref() else {
                log::error!("[{}:{}] No n1-n2-failure-notification-uri", supi, psi);
                return Err(NamfHandlerError::BadRequest(
                    "No n1n2FailureTxfNotifURI".to_string(),
                ));
            };
            let location = paging::amf_paging_start(
                ctx,
                peers,
                request.sess_id,
                DeferredTransfer::SessionSetup { n1buf: gmmbuf, n2buf },
                Some(uri),
            )?;
            Ok(TransferOutcome::attempting_to_reach_ue(location))
        }
    }
}

fn session_modify(
    ctx: &mut AmfContext,
    peers: &mut AmfPeers<'_>,
    request: TransferRequest,
    supi: &str,
    psi: u8,
) -> NamfHandlerResult<TransferOutcome> {
    let Some(n1buf) = request.n1buf else {
        log::error!("[{}:{}] No N1 SM Content", supi, psi);
        return Err(NamfHandlerError::BadRequest("No N1 SM Content".to_string()));
    };
    let Some(n2buf) = request.n2buf else {
        log::error!("[{}:{}] No N2 SM Content", supi, psi);
        return Err(NamfHandlerError::BadRequest("No N2 SM Content".to_string()));
    };
    let amf_ue_id = amf_ue_of(ctx, request.sess_id)?;

    match ctx.cm_state(amf_ue_id) {
        CmState::Idle => {
            let location = paging::amf_paging_start(
                ctx,
                peers,
                request.sess_id,
                DeferredTransfer::SessionModify { n1buf, n2buf },
                request.failure_notif_uri.as_deref(),
            )?;
            Ok(TransferOutcome::attempting_to_reach_ue(location))
        }
        CmState::Connected if ctx.context_setup_established(amf_ue_id) => {
            nas_path::nas_send_pdu_session_modification_command(
                ctx,
                peers.ran,
                request.sess_id,
                &n1buf,
                &n2buf,
            )?;
            Ok(TransferOutcome::initiated())
        }
        CmState::Connected => {
            log::warn!("[{}:{}] Context setup not completed, holding modification", supi, psi);
            store_5gsm_message(
                ctx,
                request.sess_id,
                GsmMessageType::PduSessionModificationCommand,
                Some(n1buf),
                n2buf,
            )?;
            Ok(TransferOutcome::initiated())
        }
    }
}

fn session_release(
    ctx: &mut AmfContext,
    peers: &mut AmfPeers<'_>,
    request: TransferRequest,
    supi: &str,
    psi: u8,
) -> NamfHandlerResult<TransferOutcome> {
    let Some(n2buf) = request.n2buf else {
        log::error!("[{}:{}] No N2 SM Content", supi, psi);
        return Err(NamfHandlerError::BadRequest("No N2 SM Content".to_string()));
    };
    let n1buf = request.n1buf;
    let amf_ue_id = amf_ue_of(ctx, request.sess_id)?;

    match ctx.cm_state(amf_ue_id) {
        CmState::Idle if request.skip_ind => {
            log::debug!("[{}:{}] Skip indication, UE not paged", supi, psi);
            Ok(TransferOutcome {
                status: StatusCode::OK,
                cause: N1N2MessageTransferCause::N1MsgNotTransferred,
                location: None,
            })
        }
        CmState::Idle => {
            let location = paging::amf_paging_start(
                ctx,
                peers,
                request.sess_id,
                DeferredTransfer::SessionRelease { n1buf, n2buf },
                request.failure_notif_uri.as_deref(),
            )?;
            Ok(TransferOutcome::attempting_to_reach_ue(location))
        }
        CmState::Connected if ctx.context_setup_established(amf_ue_id) => {
            nas_path::nas_send_pdu_session_release_command(
                ctx,
                peers.ran,
                request.sess_id,
                n1buf.as_deref(),
                &n2buf,
            )?;
            Ok(TransferOutcome::initiated())
        }
        CmState::Connected => {
            log::warn!("[{}:{}] Context setup not completed, holding release", supi, psi);
            store_5gsm_message(
                ctx,
                request.sess_id,
                GsmMessageType::PduSessionReleaseCommand,
                n1buf,
                n2buf,
            )?;
            Ok(TransferOutcome::initiated())
        }
    }
}

fn session_reject(
    ctx: &mut AmfContext,
    peers: &mut AmfPeers<'_>,
    request: TransferRequest,
    supi: &str,
    psi: u8,
) -> NamfHandlerResult<TransferOutcome> {
    let Some(n1buf) = request.n1buf else {
        log::error!("[{}:{}] No N1 SM Content", supi, psi);
        return Err(NamfHandlerError::BadRequest("No N1 SM Content".to_string()));
    };

    log::info!("[{}:{}] PDU session establishment reject", supi, psi);
    nas_path::nas_send_gsm_reject(ctx, peers.ran, request.sess_id, &n1buf)?;

    if ctx.sess_remove(request.sess_id).is_some() {
        peers.metrics.dec(GlobalMetric::AmfSession);
    }
    Ok(TransferOutcome::initiated())
}

fn amf_ue_of(ctx: &AmfContext, sess_id: u64) -> NamfHandlerResult<u64> {
    ctx.sess(sess_id)
        .map(|sess| sess.amf_ue_id)
        .ok_or_else(|| NamfHandlerError::NotFound("No Session Context".to_string()))
}

fn store_5gsm_message(
    ctx: &mut AmfContext,
    sess_id: u64,
    message_type: GsmMessageType,
    n1buf: Option<Bytes>,
    n2buf: Bytes,
) -> NamfHandlerResult<()> {
    let sess = ctx
        .sess_mut(sess_id)
        .ok_or_else(|| NamfHandlerError::NotFound("No Session Context".to_string()))?;
    sess.store_5gsm_message(message_type, n1buf, n2buf);
    Ok(())
}
