//! Network-initiated deregistration (Nudm_UECM_DeregistrationNotification)
//!
//! A connected UE is sent a Deregistration Request guarded by T3522. An idle
//! UE cannot be reached over NAS; it is marked for implicit deregistration,
//! which is not driven any further yet. Either way the UDM SDM subscription,
//! or failing that the AM policy association, is cancelled.

use crate::context::{AccessType, AmfContext, CmState, DeregistrationState};
use crate::error::{NamfHandlerError, NamfHandlerResult, SendError, SendResult};
use crate::event::AmfPeers;
use crate::gmm_build::GmmCause;
use crate::models::{DeregistrationData, DeregistrationReason};
use crate::nas_path;
use crate::sbi_path;
use crate::timer::{AmfTimerId, TimerExpiry};

/// Handle a deregistration notification for a UE
pub fn amf_dereg_notify(
    ctx: &mut AmfContext,
    peers: &mut AmfPeers<'_>,
    amf_ue_id: u64,
    data: &DeregistrationData,
) -> NamfHandlerResult<DeregistrationState> {
    let supi = ctx
        .amf_ue(amf_ue_id)
        .map(|amf_ue| amf_ue.supi_str().to_string())
        .ok_or_else(|| NamfHandlerError::NotFound("No UE Context".to_string()))?;

    let Some(reason) = data.dereg_reason else {
        log::error!("[{}] No Deregistraion Reason", supi);
        return Err(NamfHandlerError::BadRequest("No Deregistration Reason".to_string()));
    };
    if data.access_type != AccessType::ThreeGppAccess {
        log::error!("[{}] Deregistration access type not 3GPP", supi);
        return Err(NamfHandlerError::BadRequest(
            "Deregistration access type not 3GPP".to_string(),
        ));
    }

    log::info!(
        "Deregistration notify reason: {}:{:?}:{}",
        supi,
        reason,
        data.access_type.as_str()
    );

    let state = match ctx.cm_state(amf_ue_id) {
        CmState::Connected => {
            nas_path::nas_send_de_registration_request(
                ctx,
                peers.ran,
                amf_ue_id,
                reason == DeregistrationReason::ReregistrationRequired,
                Some(GmmCause::FiveGsServicesNotAllowed),
            )?;
            DeregistrationState::NetworkInitiatedExplicit
        }
        CmState::Idle => {
            log::error!("[{}] Not implemented : Use Implicit De-registration", supi);
            DeregistrationState::NetworkInitiatedImplicitIncomplete
        }
    };

    let amf_ue = ctx
        .amf_ue_mut(amf_ue_id)
        .ok_or_else(|| NamfHandlerError::NotFound("No UE Context".to_string()))?;
    amf_ue.network_deregistration = Some(state);
    sbi_path::amf_ue_sbi_unsubscribe(peers.sbi, amf_ue, Some(state))?;

    Ok(state)
}

/// T3522 expired
pub fn amf_t3522_expiry(
    ctx: &mut AmfContext,
    peers: &mut AmfPeers<'_>,
    amf_ue_id: u64,
    generation: u64,
) -> SendResult<()> {
    let Some(expiry) = ctx.timers.expire(AmfTimerId::T3522, amf_ue_id, generation) else {
        return Ok(());
    };

    match expiry {
        TimerExpiry::Retry(count) => {
            log::warn!("[ue_id={}] T3522 retransmission #{}", amf_ue_id, count);
            match nas_path::nas_resend_de_registration_request(ctx, peers.ran, amf_ue_id) {
                Err(SendError::RanUeGone(_)) => {
                    log::warn!("[ue_id={}] NG context has already been removed", amf_ue_id);
                    ctx.timers.stop_ue_timer(AmfTimerId::T3522, amf_ue_id);
                    Ok(())
                }
                other => other,
            }
        }
        TimerExpiry::Exhausted => {
            log::warn!("[ue_id={}] De-registration request retransmissions exhausted", amf_ue_id);
            if let Some(amf_ue) = ctx.amf_ue_mut(amf_ue_id) {
                amf_ue.t3522_buf = None;
            }
            Ok(())
        }
    }
}
