//! Namf_Communication UEContextTransfer and RegistrationStatusUpdate
//!
//! A new AMF pulls the UE context during mobility registration, then reports
//! whether it took the UE over. Once transferred, the old AMF releases the
//! sessions the new AMF could not keep and drops its NG context.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

use crate::context::{bitrate_to_kbps_string, AmfContext, AmfUe, AuthResult, GmmCapability};
use crate::error::{NamfHandlerError, NamfHandlerResult};
use crate::event::AmfPeers;
use crate::metrics::GlobalMetric;
use crate::models::{
    Ambr, KeyAmf, KeyAmfType, MmContext, NasSecurityMode, NgKsi, NssaiMapping, PduSessionContext,
    ScType, SeafData, Snssai, TransferReason, UeContext, UeContextTransferReqData,
    UeContextTransferRspData, UeContextTransferStatus, UeRegStatusUpdateReqData,
    UeRegStatusUpdateRspData,
};
use crate::sbi_path;

/// UE security capability IEI
const UE_SECURITY_CAPABILITY_TYPE: u8 = 0x2e;
/// 5GMM capability IEI
const GMM_CAPABILITY_TYPE: u8 = 0x10;
/// 5GMM capability contents length
const GMM_CAPABILITY_LENGTH: u8 = 1;

fn find_ue_by_context_id(ctx: &AmfContext, ue_context_id: Option<&str>) -> NamfHandlerResult<u64> {
    let Some(ue_context_id) = ue_context_id else {
        log::error!("No UE context ID");
        return Err(NamfHandlerError::BadRequest("No UE context ID".to_string()));
    };
    ctx.amf_ue_find_by_ue_context_id(ue_context_id).ok_or_else(|| {
        log::error!("Cannot find UE context [{}]", ue_context_id);
        NamfHandlerError::NotFound("Context not found".to_string())
    })
}

// ============================================================================
// UEContextTransfer
// ============================================================================

/// Build the UE context snapshot for `ue-contexts/{ueContextId}/transfer`
pub fn amf_ue_context_transfer(
    ctx: &AmfContext,
    ue_context_id: Option<&str>,
    req: &UeContextTransferReqData,
) -> NamfHandlerResult<UeContextTransferRspData> {
    let amf_ue_id = find_ue_by_context_id(ctx, ue_context_id)?;
    let amf_ue = ctx
        .amf_ue(amf_ue_id)
        .ok_or_else(|| NamfHandlerError::NotFound("Context not found".to_string()))?;

    log::debug!("[{}] UE context transfer ({:?})", amf_ue.supi_str(), req.reason);

    let mut ue_context = UeContext {
        supi: amf_ue.supi.clone(),
        supi_unauth_ind: (amf_ue.auth_result != AuthResult::Success).then_some(true),
        pei: amf_ue.pei.clone(),
        sub_ue_ambr: sub_ue_ambr(amf_ue),
        seaf_data: seaf_data(amf_ue),
        five_g_mm_capability: Some(gmm_capability_base64(&amf_ue.gmm_capability)),
        pcf_id: amf_ue.pcf_nf_instance_id.clone(),
        mm_context_list: vec![mm_context(amf_ue)],
        session_context_list: None,
    };
    if ue_context.pcf_id.is_none() {
        log::warn!("[{}] No PCF NF Instance", amf_ue.supi_str());
    }

    // TODO: add ueRadioCapability once the UE radio capability info is kept
    if req.reason == TransferReason::MobiReg {
        ue_context.session_context_list = Some(
            ctx.sess_list_for_ue(amf_ue_id)
                .into_iter()
                .map(|sess| PduSessionContext {
                    pdu_session_id: sess.psi,
                    sm_context_ref: sess.sm_context_ref.clone(),
                    s_nssai: Snssai::from(&sess.s_nssai),
                    dnn: sess.dnn.clone(),
                    access_type: sess.access_type,
                })
                .collect(),
        );
    }

    Ok(UeContextTransferRspData { ue_context })
}

fn sub_ue_ambr(amf_ue: &AmfUe) -> Option<Ambr> {
    let ambr = Ambr {
        uplink: (amf_ue.ue_ambr.uplink > 0).then(|| bitrate_to_kbps_string(amf_ue.ue_ambr.uplink)),
        downlink: (amf_ue.ue_ambr.downlink > 0)
            .then(|| bitrate_to_kbps_string(amf_ue.ue_ambr.downlink)),
    };
    (ambr.uplink.is_some() || ambr.downlink.is_some()).then_some(ambr)
}

fn seaf_data(amf_ue: &AmfUe) -> Option<SeafData> {
    if amf_ue.nas.ksi == 0 || amf_ue.nas.tsc == 0 {
        return None;
    }
    Some(SeafData {
        ng_ksi: NgKsi {
            tsc: sc_type(amf_ue.nas.tsc),
            ksi: amf_ue.nas.ksi,
        },
        key_amf: KeyAmf {
            key_type: KeyAmfType::Kamf,
            key_val: hex::encode(amf_ue.kamf),
        },
    })
}

fn sc_type(tsc: u8) -> ScType {
    match tsc {
        0 => ScType::Native,
        _ => ScType::Mapped,
    }
}

fn gmm_capability_base64(capability: &GmmCapability) -> String {
    let mut bits = 0u8;
    if capability.s1_mode {
        bits |= 0x01;
    }
    if capability.ho_attach {
        bits |= 0x02;
    }
    if capability.lte_positioning_protocol_capability {
        bits |= 0x04;
    }
    BASE64.encode([GMM_CAPABILITY_TYPE, GMM_CAPABILITY_LENGTH, bits])
}

fn mm_context(amf_ue: &AmfUe) -> MmContext {
    let nas_security_mode = (amf_ue.selected_enc_algorithm != 0
        && amf_ue.selected_int_algorithm != 0)
        .then(|| NasSecurityMode {
            integrity_algorithm: format!("NIA{}", amf_ue.selected_int_algorithm),
            ciphering_algorithm: format!("NEA{}", amf_ue.selected_enc_algorithm),
        });

    let capability = amf_ue.ue_security_capability.as_bytes();
    let ue_security_capability = (!capability.is_empty()).then(|| {
        let mut ie = Vec::with_capacity(capability.len() + 2);
        ie.push(UE_SECURITY_CAPABILITY_TYPE);
        ie.push(capability.len() as u8);
        ie.extend_from_slice(capability);
        BASE64.encode(ie)
    });

    MmContext {
        access_type: amf_ue.access_type,
        nas_security_mode,
        nas_downlink_count: (amf_ue.dl_count > 0).then_some(amf_ue.dl_count),
        nas_uplink_count: (amf_ue.ul_count > 0).then_some(amf_ue.ul_count),
        ue_security_capability,
        allowed_nssai: amf_ue
            .allowed_nssai
            .iter()
            .map(|allowed| Snssai::from(&allowed.s_nssai))
            .collect(),
        nssai_mapping_list: amf_ue
            .allowed_nssai
            .iter()
            .map(|allowed| NssaiMapping {
                mapped_snssai: Snssai::from(&allowed.s_nssai),
                h_snssai: Snssai::from(allowed.mapped_hplmn.as_ref().unwrap_or(&allowed.s_nssai)),
            })
            .collect(),
    }
}

// ============================================================================
// RegistrationStatusUpdate
// ============================================================================

/// Handle `ue-contexts/{ueContextId}/transfer-update`
pub fn amf_registration_status_update(
    ctx: &mut AmfContext,
    peers: &mut AmfPeers<'_>,
    ue_context_id: Option<&str>,
    req: &UeRegStatusUpdateReqData,
) -> NamfHandlerResult<UeRegStatusUpdateRspData> {
    let amf_ue_id = find_ue_by_context_id(ctx, ue_context_id)?;
    let supi = ctx
        .amf_ue(amf_ue_id)
        .map(|amf_ue| amf_ue.supi_str().to_string())
        .unwrap_or_default();

    let transferred = match req.transfer_status {
        Some(UeContextTransferStatus::Transferred) => true,
        Some(UeContextTransferStatus::NotTransferred) => false,
        None => {
            log::error!("[{}] No transfer status", supi);
            return Err(NamfHandlerError::BadRequest("No transfer status".to_string()));
        }
    };

    if !transferred {
        log::info!("[{}] UE context not transferred", supi);
        return Ok(UeRegStatusUpdateRspData {
            reg_status_transfer_complete: false,
        });
    }

    let mut complete = true;
    for &psi in &req.to_release_session_list {
        let sess = ctx.sess_find_by_psi(amf_ue_id, psi).and_then(|id| ctx.sess(id));
        let (Some(amf_ue), Some(sess)) = (ctx.amf_ue(amf_ue_id), sess) else {
            log::error!("[{}:{}] No session to release", supi, psi);
            complete = false;
            continue;
        };
        if !sess.session_context_in_smf() {
            log::error!("[{}:{}] Session context not in SMF", supi, psi);
            complete = false;
            continue;
        }
        sbi_path::amf_sbi_send_release_session(peers.sbi, amf_ue, sess)?;
    }

    amf_ue_clear_transferred(ctx, peers, amf_ue_id);
    log::info!("[{}] UE context transferred", supi);

    Ok(UeRegStatusUpdateRspData {
        reg_status_transfer_complete: complete,
    })
}

/// Drop everything tying a transferred UE to this AMF
fn amf_ue_clear_transferred(ctx: &mut AmfContext, peers: &mut AmfPeers<'_>, amf_ue_id: u64) {
    if ctx.ran_ue_of(amf_ue_id).is_some() {
        ctx.amf_ue_clear_ng_context(amf_ue_id);
        peers.metrics.dec(GlobalMetric::RanUe);
    }

    ctx.pending.clear(amf_ue_id);
    ctx.timers.stop_all_ue_timers(amf_ue_id);

    let sess_ids = match ctx.amf_ue_mut(amf_ue_id) {
        Some(amf_ue) => {
            amf_ue.t3513_buf = None;
            amf_ue.t3522_buf = None;
            amf_ue.sess_ids.clone()
        }
        None => return,
    };
    for sess_id in sess_ids {
        if let Some(sess) = ctx.sess_mut(sess_id) {
            sess.pdu_session_establishment_accept = None;
            sess.clear_5gsm_message();
        }
    }
}
