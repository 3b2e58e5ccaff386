//! Network-triggered service request
//!
//! A transfer for a CM-IDLE UE is parked in the pending-transfer store and
//! the UE is paged. T3513 drives paging retransmission; when the UE comes
//! back the parked payload is delivered, and when it never does the SMF is
//! told through the failure notification URI it supplied.

use crate::context::{AmfContext, CmState};
use crate::error::{NamfHandlerResult, SendError, SendResult};
use crate::event::AmfPeers;
use crate::metrics::GlobalMetric;
use crate::models::N1N2MessageTransferCause;
use crate::nas_path;
use crate::ngap_build;
use crate::pending::{DeferredTransfer, FailureNotifTarget, PendingTransfer};
use crate::sbi_path::{self, ClientKey, SbiRequest};
use crate::timer::{AmfTimerId, TimerExpiry};

/// Park a transfer for an idle UE and page it
///
/// Returns the Location of the UE's N1/N2 message resource. Nothing is stored
/// when the failure notification target cannot be resolved or the paging
/// cannot be sent.
pub fn amf_paging_start(
    ctx: &mut AmfContext,
    peers: &mut AmfPeers<'_>,
    sess_id: u64,
    transfer: DeferredTransfer,
    failure_notif_uri: Option<&str>,
) -> NamfHandlerResult<String> {
    let sess = ctx.sess(sess_id).ok_or(SendError::ContextGone("Session"))?;
    let amf_ue_id = sess.amf_ue_id;
    let psi = sess.psi;
    let sm_context_ref = sess.sm_context_ref.clone();
    let amf_ue = ctx.amf_ue(amf_ue_id).ok_or(SendError::ContextGone("UE"))?;
    debug_assert_eq!(ctx.cm_state(amf_ue_id), CmState::Idle);

    let pkbuf = ngap_build::build_paging(amf_ue).ok_or(SendError::Build("Paging"))?;
    let supi = amf_ue.supi_str().to_string();

    let mut client_added = false;
    let failure_notif = match failure_notif_uri {
        Some(uri) => {
            let client = ClientKey::from_uri(uri).map_err(|e| {
                log::error!("[{}:{}] Invalid URI [{}]: {}", supi, psi, uri, e);
                e
            })?;
            if ctx.clients.find(&client).is_none() {
                ctx.clients.add(client.clone())?;
                client_added = true;
            }
            Some(FailureNotifTarget {
                uri: uri.to_string(),
                client,
            })
        }
        None => None,
    };

    let location = sbi_path::n1n2_message_location(&ctx.nf_uri, &supi, sm_context_ref.as_deref());

    let amf_ue = ctx.amf_ue(amf_ue_id).ok_or(SendError::ContextGone("UE"))?;
    if let Err(e) = peers.ran.send_paging(amf_ue, pkbuf.clone()) {
        log::error!("[{}:{}] Paging not sent: {}", supi, psi, e);
        if let (true, Some(target)) = (client_added, failure_notif.as_ref()) {
            ctx.clients.remove(&target.client);
        }
        return Err(e.into());
    }

    log::info!("[{}:{}] Paging for {}", supi, psi, transfer.name());
    ctx.pending.store(
        amf_ue_id,
        PendingTransfer {
            sess_id,
            psi,
            location: location.clone(),
            failure_notif,
            transfer,
        },
    );
    if let Some(amf_ue) = ctx.amf_ue_mut(amf_ue_id) {
        amf_ue.t3513_buf = Some(pkbuf);
    }
    ctx.timers.start_ue_timer(AmfTimerId::T3513, amf_ue_id);
    peers.metrics.inc(GlobalMetric::MmPaging5gReq);

    Ok(location)
}

/// The paged UE has an NG signalling connection again
///
/// Returns `true` when a parked transfer was handed on.
pub fn amf_paging_success(
    ctx: &mut AmfContext,
    peers: &mut AmfPeers<'_>,
    amf_ue_id: u64,
) -> SendResult<bool> {
    let paging_in_progress = ctx.timers.is_running(AmfTimerId::T3513, amf_ue_id);
    ctx.timers.stop_ue_timer(AmfTimerId::T3513, amf_ue_id);
    if let Some(amf_ue) = ctx.amf_ue_mut(amf_ue_id) {
        amf_ue.t3513_buf = None;
    }

    let Some(record) = ctx.pending.take(amf_ue_id) else {
        return Ok(false);
    };
    if paging_in_progress {
        peers.metrics.inc(GlobalMetric::MmPaging5gSucc);
    }

    let sess_id = record.sess_id;
    if ctx.sess(sess_id).is_none() {
        log::warn!("[ue_id={}, psi={}] Session removed while paging", amf_ue_id, record.psi);
        return Ok(false);
    }
    log::debug!("[ue_id={}, psi={}] Deliver {}", amf_ue_id, record.psi, record.transfer.name());

    match record.transfer {
        DeferredTransfer::SessionSetup { n1buf, n2buf } => {
            nas_path::nas_send_pdu_session_setup_request(ctx, peers.ran, sess_id, n1buf, n2buf)?;
        }
        DeferredTransfer::SessionModify { n1buf, n2buf } => {
            if ctx.context_setup_established(amf_ue_id) {
                nas_path::nas_send_pdu_session_modification_command(ctx, peers.ran, sess_id, &n1buf, &n2buf)?;
            } else if let Some(sess) = ctx.sess_mut(sess_id) {
                sess.store_5gsm_message(
                    crate::context::GsmMessageType::PduSessionModificationCommand,
                    Some(n1buf),
                    n2buf,
                );
            }
        }
        DeferredTransfer::SessionRelease { n1buf, n2buf } => {
            if ctx.context_setup_established(amf_ue_id) {
                nas_path::nas_send_pdu_session_release_command(
                    ctx,
                    peers.ran,
                    sess_id,
                    n1buf.as_deref(),
                    &n2buf,
                )?;
            } else if let Some(sess) = ctx.sess_mut(sess_id) {
                sess.store_5gsm_message(
                    crate::context::GsmMessageType::PduSessionReleaseCommand,
                    n1buf,
                    n2buf,
                );
            }
        }
    }
    Ok(true)
}

/// T3513 expired
pub fn amf_paging_timeout(
    ctx: &mut AmfContext,
    peers: &mut AmfPeers<'_>,
    amf_ue_id: u64,
    generation: u64,
) -> SendResult<()> {
    let Some(expiry) = ctx.timers.expire(AmfTimerId::T3513, amf_ue_id, generation) else {
        return Ok(());
    };

    match expiry {
        TimerExpiry::Retry(count) => {
            let amf_ue = ctx.amf_ue(amf_ue_id).ok_or(SendError::ContextGone("UE"))?;
            let Some(pkbuf) = amf_ue.t3513_buf.clone() else {
                ctx.timers.stop_ue_timer(AmfTimerId::T3513, amf_ue_id);
                return Ok(());
            };
            log::warn!("[{}] Paging retransmission #{}", amf_ue.supi_str(), count);
            peers.ran.send_paging(amf_ue, pkbuf)?;
            peers.metrics.inc(GlobalMetric::MmPaging5gReq);
        }
        TimerExpiry::Exhausted => {
            let supi = ctx
                .amf_ue(amf_ue_id)
                .map(|amf_ue| amf_ue.supi_str().to_string())
                .unwrap_or_default();
            log::warn!("[{}] Paging failed, UE not responding", supi);

            if let Some(amf_ue) = ctx.amf_ue_mut(amf_ue_id) {
                amf_ue.t3513_buf = None;
            }
            let Some(record) = ctx.pending.take(amf_ue_id) else {
                return Ok(());
            };
            if let Some(target) = record.failure_notif {
                log::debug!("[{}:{}] N1N2 transfer failure notification", supi, record.psi);
                peers.sbi.discover_and_send(SbiRequest::N1N2TransferFailureNotify {
                    client: target.client,
                    uri: target.uri,
                    location: record.location,
                    cause: N1N2MessageTransferCause::UeNotResponding,
                })?;
            }
        }
    }
    Ok(())
}
