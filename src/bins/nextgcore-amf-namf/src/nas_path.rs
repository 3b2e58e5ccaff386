//! NAS Path
//!
//! Wraps 5GSM payloads from the SMF into 5GMM envelopes and hands them to the
//! radio leg, choosing the NGAP procedure that carries them.

use bytes::Bytes;

use crate::context::{AmfContext, GsmMessageType};
use crate::error::{SendError, SendResult};
use crate::gmm_build::{self, payload_container_type, GmmCause};
use crate::ngap_build;
use crate::ngap_path::{self, RanSender};
use crate::timer::AmfTimerId;

/// Wrap an N1 SM container in a DL NAS Transport
pub fn gmm_build_n1_sm_transport(psi: u8, n1buf: &[u8]) -> Bytes {
    gmm_build::build_dl_nas_transport(
        psi,
        payload_container_type::N1_SM_INFORMATION,
        n1buf,
        None,
        None,
    )
}

/// Send a PDU session resource setup to a connected UE
///
/// The first setup on a radio leg goes out as Initial Context Setup, every
/// later one as PDU Session Resource Setup. If the SMF has not confirmed the
/// SM context yet the message is held on the session until it does.
pub fn nas_send_pdu_session_setup_request(
    ctx: &mut AmfContext,
    ran: &mut dyn RanSender,
    sess_id: u64,
    gmmbuf: Option<Bytes>,
    n2buf: Bytes,
) -> SendResult<()> {
    let sess = ctx.sess(sess_id).ok_or(SendError::ContextGone("Session"))?;
    let amf_ue_id = sess.amf_ue_id;
    let amf_ue = ctx.amf_ue(amf_ue_id).ok_or(SendError::ContextGone("UE"))?;
    let ran_ue = ctx.ran_ue_of(amf_ue_id).ok_or(SendError::RanUeGone(amf_ue_id))?;

    let initial_context_setup = !ran_ue.initial_context_setup_request_sent;
    let ngapbuf = if initial_context_setup {
        ngap_build::build_initial_context_setup_request(
            ran_ue,
            amf_ue,
            &ctx.served_guami,
            sess,
            gmmbuf.as_deref(),
            &n2buf,
        )
    } else {
        ngap_build::build_pdu_session_resource_setup_request(ran_ue, sess, gmmbuf.as_deref(), &n2buf)
    };
    log::debug!(
        "[{}:{}] {}",
        amf_ue.supi_str(),
        sess.psi,
        if initial_context_setup {
            "Initial context setup request"
        } else {
            "PDU session resource setup request"
        }
    );

    let ran_ue_id = ran_ue.id;
    let in_smf = sess.session_context_in_smf();
    if let Some(ran_ue) = ctx.ran_ue_mut(ran_ue_id) {
        ran_ue.initial_context_setup_request_sent = true;
    }

    if !in_smf {
        let sess = ctx.sess_mut(sess_id).ok_or(SendError::ContextGone("Session"))?;
        if sess.pdu_session_establishment_accept.replace(ngapbuf).is_some() {
            log::warn!("[psi={}] Held establishment accept superseded", sess.psi);
        }
        log::debug!("[psi={}] SM context not created yet, holding setup request", sess.psi);
        return Ok(());
    }

    let ran_ue = ctx.ran_ue(ran_ue_id).ok_or(SendError::RanUeGone(amf_ue_id))?;
    ngap_path::ngap_send_to_ran_ue(ran, ran_ue, ngapbuf)
}

/// Flush the setup request held until the SM context was created
pub fn nas_send_held_establishment_accept(
    ctx: &mut AmfContext,
    ran: &mut dyn RanSender,
    sess_id: u64,
) -> SendResult<bool> {
    let sess = ctx.sess_mut(sess_id).ok_or(SendError::ContextGone("Session"))?;
    let amf_ue_id = sess.amf_ue_id;
    let Some(ngapbuf) = sess.pdu_session_establishment_accept.take() else {
        return Ok(false);
    };

    let Some(ran_ue) = ctx.ran_ue_of(amf_ue_id) else {
        log::warn!("[ue_id={}] NG context has already been removed", amf_ue_id);
        return Ok(false);
    };
    ngap_path::ngap_send_to_ran_ue(ran, ran_ue, ngapbuf)?;
    Ok(true)
}

/// Send a PDU Session Modification Command
pub fn nas_send_pdu_session_modification_command(
    ctx: &AmfContext,
    ran: &mut dyn RanSender,
    sess_id: u64,
    n1buf: &[u8],
    n2buf: &[u8],
) -> SendResult<()> {
    let sess = ctx.sess(sess_id).ok_or(SendError::ContextGone("Session"))?;
    let ran_ue = ctx
        .ran_ue_of(sess.amf_ue_id)
        .ok_or(SendError::RanUeGone(sess.amf_ue_id))?;

    let gmmbuf = gmm_build_n1_sm_transport(sess.psi, n1buf);
    let ngapbuf = ngap_build::build_pdu_session_resource_modify_request(ran_ue, sess, &gmmbuf, n2buf);
    log::debug!("[psi={}] PDU session modification command", sess.psi);
    ngap_path::ngap_send_to_ran_ue(ran, ran_ue, ngapbuf)
}

/// Send a PDU Session Release Command
pub fn nas_send_pdu_session_release_command(
    ctx: &AmfContext,
    ran: &mut dyn RanSender,
    sess_id: u64,
    n1buf: Option<&[u8]>,
    n2buf: &[u8],
) -> SendResult<()> {
    let sess = ctx.sess(sess_id).ok_or(SendError::ContextGone("Session"))?;
    let ran_ue = ctx
        .ran_ue_of(sess.amf_ue_id)
        .ok_or(SendError::RanUeGone(sess.amf_ue_id))?;

    let gmmbuf = n1buf.map(|n1buf| gmm_build_n1_sm_transport(sess.psi, n1buf));
    let ngapbuf =
        ngap_build::build_pdu_session_resource_release_command(ran_ue, sess, gmmbuf.as_deref(), n2buf);
    log::debug!("[psi={}] PDU session release command", sess.psi);
    ngap_path::ngap_send_to_ran_ue(ran, ran_ue, ngapbuf)
}

/// Send a 5GSM message held until the context setup completed
pub fn nas_send_stored_5gsm_message(
    ctx: &mut AmfContext,
    ran: &mut dyn RanSender,
    sess_id: u64,
) -> SendResult<bool> {
    let Some(message) = ctx.sess_mut(sess_id).and_then(|sess| sess.gsm_message.take()) else {
        return Ok(false);
    };

    match message.message_type {
        GsmMessageType::PduSessionModificationCommand => {
            let n1buf = message.n1buf.unwrap_or_default();
            nas_send_pdu_session_modification_command(ctx, ran, sess_id, &n1buf, &message.n2buf)?;
        }
        GsmMessageType::PduSessionReleaseCommand => {
            nas_send_pdu_session_release_command(
                ctx,
                ran,
                sess_id,
                message.n1buf.as_deref(),
                &message.n2buf,
            )?;
        }
    }
    Ok(true)
}

/// Send a 5GSM reject to the UE in a DL NAS Transport
///
/// Returns `false` when the UE has no radio leg to carry it.
pub fn nas_send_gsm_reject(
    ctx: &AmfContext,
    ran: &mut dyn RanSender,
    sess_id: u64,
    n1buf: &[u8],
) -> SendResult<bool> {
    let sess = ctx.sess(sess_id).ok_or(SendError::ContextGone("Session"))?;
    let Some(ran_ue) = ctx.ran_ue_of(sess.amf_ue_id) else {
        log::warn!("[psi={}] NG context has already been removed", sess.psi);
        return Ok(false);
    };

    let gmmbuf = gmm_build_n1_sm_transport(sess.psi, n1buf);
    log::debug!("[psi={}] 5GSM reject", sess.psi);
    ngap_path::ngap_send_downlink_nas_transport(ran, ran_ue, &gmmbuf)?;
    Ok(true)
}

/// Send a network-initiated Deregistration Request and start T3522
pub fn nas_send_de_registration_request(
    ctx: &mut AmfContext,
    ran: &mut dyn RanSender,
    amf_ue_id: u64,
    re_registration_required: bool,
    gmm_cause: Option<GmmCause>,
) -> SendResult<()> {
    let amf_ue = ctx.amf_ue(amf_ue_id).ok_or(SendError::ContextGone("UE"))?;
    let ran_ue = ctx.ran_ue_of(amf_ue_id).ok_or(SendError::RanUeGone(amf_ue_id))?;

    let gmmbuf = gmm_build::build_deregistration_request(amf_ue, re_registration_required, gmm_cause);
    log::debug!("[{}] De-registration request", amf_ue.supi_str());
    ngap_path::ngap_send_downlink_nas_transport(ran, ran_ue, &gmmbuf)?;

    if let Some(amf_ue) = ctx.amf_ue_mut(amf_ue_id) {
        amf_ue.t3522_buf = Some(gmmbuf);
    }
    ctx.timers.start_ue_timer(AmfTimerId::T3522, amf_ue_id);
    Ok(())
}

/// Retransmit the Deregistration Request on T3522 expiry
pub fn nas_resend_de_registration_request(
    ctx: &AmfContext,
    ran: &mut dyn RanSender,
    amf_ue_id: u64,
) -> SendResult<()> {
    let amf_ue = ctx.amf_ue(amf_ue_id).ok_or(SendError::ContextGone("UE"))?;
    let gmmbuf = amf_ue.t3522_buf.clone().ok_or(SendError::Build("De-registration request"))?;
    let ran_ue = ctx.ran_ue_of(amf_ue_id).ok_or(SendError::RanUeGone(amf_ue_id))?;
    log::debug!("[{}] Retransmit de-registration request", amf_ue.supi_str());
    ngap_path::ngap_send_downlink_nas_transport(ran, ran_ue, &gmmbuf)
}
