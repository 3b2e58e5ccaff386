//! Namf request routing
//!
//! Entry point for the Namf_Communication and Namf_Callback requests served
//! by the AMF. Each route decodes its JSON body, resolves the UE and session,
//! calls the procedure and renders the result, or the error as
//! ProblemDetails, into a [`NamfResponse`].

use hyper::{Method, StatusCode};
use serde::de::DeserializeOwned;

use crate::context::{AmfContext, OGS_NAS_PDU_SESSION_IDENTITY_UNASSIGNED};
use crate::deregistration;
use crate::error::{NamfHandlerError, NamfHandlerResult};
use crate::event::AmfPeers;
use crate::models::{
    DeregistrationData, ModificationNotification, N1N2MessageTransferReqData,
    N1N2MessageTransferRspData, NamfRequest, NamfResponse, SmContextStatusNotification,
    UeContextTransferReqData, UeRegStatusUpdateReqData,
};
use crate::n1n2_transfer::{self, TransferKind, TransferRequest};
use crate::release::{self, ReleaseInput};
use crate::sbi_path::{resource_name, service_name};
use crate::sdm_change;
use crate::ue_context_transfer;

/// Handle one Namf request
pub fn amf_namf_handle(
    ctx: &mut AmfContext,
    peers: &mut AmfPeers<'_>,
    request: NamfRequest,
) -> NamfResponse {
    let result = match request.service.as_str() {
        service_name::NAMF_COMM => handle_comm_request(ctx, peers, request),
        service_name::NAMF_CALLBACK => handle_callback_request(ctx, peers, request),
        other => {
            log::error!("Invalid API name [{}]", other);
            Err(NamfHandlerError::BadRequest(format!("Invalid API name: {}", other)))
        }
    };

    result.unwrap_or_else(|e| {
        log::error!("Namf request failed: {}", e);
        NamfResponse::with_json(e.status(), &e.problem_details())
    })
}

fn parse_body<T: DeserializeOwned>(request: &NamfRequest, name: &str) -> NamfHandlerResult<T> {
    let Some(body) = request.body.clone() else {
        log::error!("No {}", name);
        return Err(NamfHandlerError::BadRequest(format!("No {}", name)));
    };
    serde_json::from_value(body).map_err(|e| {
        log::error!("Cannot parse {}: {}", name, e);
        NamfHandlerError::BadRequest(format!("Cannot parse {}", name))
    })
}

fn require_post(request: &NamfRequest) -> NamfHandlerResult<()> {
    if request.method != Method::POST {
        log::error!("Invalid HTTP method [{}]", request.method);
        return Err(NamfHandlerError::MethodNotAllowed(request.method.to_string()));
    }
    Ok(())
}

fn invalid_resource(request: &NamfRequest, index: usize) -> NamfHandlerError {
    let name = request.component(index).unwrap_or_default();
    log::error!("Invalid resource name [{}]", name);
    NamfHandlerError::BadRequest(format!("Invalid resource name [{}]", name))
}

// ============================================================================
// namf-comm
// ============================================================================

fn handle_comm_request(
    ctx: &mut AmfContext,
    peers: &mut AmfPeers<'_>,
    request: NamfRequest,
) -> NamfHandlerResult<NamfResponse> {
    if request.component(0) != Some(resource_name::UE_CONTEXTS) {
        return Err(invalid_resource(&request, 0));
    }

    match request.component(2) {
        Some(resource_name::N1_N2_MESSAGES) => {
            require_post(&request)?;
            handle_n1_n2_message_transfer(ctx, peers, request)
        }
        Some(resource_name::TRANSFER) => {
            require_post(&request)?;
            let req: UeContextTransferReqData = parse_body(&request, "UeContextTransferReqData")?;
            let rsp = ue_context_transfer::amf_ue_context_transfer(ctx, request.component(1), &req)?;
            Ok(NamfResponse::with_json(StatusCode::OK, &rsp))
        }
        Some(resource_name::TRANSFER_UPDATE) => {
            require_post(&request)?;
            let req: UeRegStatusUpdateReqData = parse_body(&request, "UeRegStatusUpdateReqData")?;
            let rsp = ue_context_transfer::amf_registration_status_update(
                ctx,
                peers,
                request.component(1),
                &req,
            )?;
            Ok(NamfResponse::with_json(StatusCode::OK, &rsp))
        }
        _ => Err(invalid_resource(&request, 2)),
    }
}

fn handle_n1_n2_message_transfer(
    ctx: &mut AmfContext,
    peers: &mut AmfPeers<'_>,
    mut request: NamfRequest,
) -> NamfHandlerResult<NamfResponse> {
    let req: N1N2MessageTransferReqData = parse_body(&request, "N1N2MessageTransferReqData")?;

    let ue_context_id = request.component(1).unwrap_or_default().to_string();
    let amf_ue_id = ctx.amf_ue_find_by_ue_context_id(&ue_context_id).ok_or_else(|| {
        log::error!("No UE context [{}]", ue_context_id);
        NamfHandlerError::NotFound("No UE context".to_string())
    })?;

    let sm_info = req
        .n2_info_container
        .as_ref()
        .map(|container| {
            container.sm_info.as_ref().ok_or_else(|| {
                log::error!("[{}] No smInfo", ue_context_id);
                NamfHandlerError::BadRequest("No smInfo".to_string())
            })
        })
        .transpose()?;

    let psi = req
        .pdu_session_id
        .or(sm_info.map(|sm_info| sm_info.pdu_session_id))
        .filter(|&psi| psi != OGS_NAS_PDU_SESSION_IDENTITY_UNASSIGNED)
        .ok_or_else(|| {
            log::error!("[{}] No PDU Session Identity", ue_context_id);
            NamfHandlerError::BadRequest("No PDU Session Identity".to_string())
        })?;
    let sess_id = ctx.sess_find_by_psi(amf_ue_id, psi).ok_or_else(|| {
        log::error!("[{}:{}] No PDU Session Context", ue_context_id, psi);
        NamfHandlerError::NotFound("No PDU Session Context".to_string())
    })?;

    let n1buf = match req.n1_message_container {
        Some(ref container) => {
            let content_id = container
                .n1_message_content
                .as_ref()
                .map(|content| content.content_id.as_str())
                .ok_or_else(|| {
                    log::error!("[{}:{}] No n1MessageContent", ue_context_id, psi);
                    NamfHandlerError::BadRequest("No n1MessageContent".to_string())
                })?;
            let part = request.take_part(content_id).ok_or_else(|| {
                log::error!("[{}:{}] No N1 SM Content", ue_context_id, psi);
                NamfHandlerError::BadRequest("No N1 SM Content".to_string())
            })?;
            Some(part)
        }
        None => None,
    };

    let (kind, n2buf) = match sm_info {
        Some(sm_info) => {
            let content = sm_info.n2_info_content.as_ref().ok_or_else(|| {
                log::error!("[{}:{}] No n2InfoContent", ue_context_id, psi);
                NamfHandlerError::BadRequest("No n2InfoContent".to_string())
            })?;
            let ngap_ie_type = content.ngap_ie_type.ok_or_else(|| {
                log::error!("[{}:{}] No ngapIeType", ue_context_id, psi);
                NamfHandlerError::BadRequest("No ngapIeType".to_string())
            })?;
            let content_id = content
                .ngap_data
                .as_ref()
                .map(|data| data.content_id.as_str())
                .ok_or_else(|| {
                    log::error!("[{}:{}] No ngapData", ue_context_id, psi);
                    NamfHandlerError::BadRequest("No ngapData".to_string())
                })?;
            let part = request.take_part(content_id).ok_or_else(|| {
                log::error!("[{}:{}] No N2 SM Content", ue_context_id, psi);
                NamfHandlerError::BadRequest("No N2 SM Content".to_string())
            })?;
            (TransferKind::classify(Some(ngap_ie_type)), Some(part))
        }
        None => (TransferKind::classify(None), None),
    };

    let outcome = n1n2_transfer::amf_n1n2_message_transfer(
        ctx,
        peers,
        TransferRequest {
            sess_id,
            kind,
            n1buf,
            n2buf,
            skip_ind: req.skip_ind.unwrap_or(false),
            failure_notif_uri: req.n1n2_failure_txf_notif_uri,
        },
    )?;

    let response = NamfResponse::with_json(
        outcome.status,
        &N1N2MessageTransferRspData {
            cause: outcome.cause,
        },
    );
    Ok(match outcome.location {
        Some(location) => response.with_location(location),
        None => response,
    })
}

// ============================================================================
// namf-callback
// ============================================================================

fn handle_callback_request(
    ctx: &mut AmfContext,
    peers: &mut AmfPeers<'_>,
    request: NamfRequest,
) -> NamfHandlerResult<NamfResponse> {
    match request.component(1) {
        Some(resource_name::SM_CONTEXT_STATUS) => {
            require_post(&request)?;
            handle_sm_context_status(ctx, peers, &request)
        }
        Some(resource_name::DEREG_NOTIFY) => {
            require_post(&request)?;
            let data: DeregistrationData = parse_body(&request, "DeregistrationData")?;
            let amf_ue_id = find_ue_by_supi(ctx, request.component(0))?;
            deregistration::amf_dereg_notify(ctx, peers, amf_ue_id, &data)?;
            Ok(NamfResponse::with_status(StatusCode::NO_CONTENT))
        }
        Some(resource_name::SDMSUBSCRIPTION_NOTIFY) => {
            require_post(&request)?;
            let notification: ModificationNotification =
                parse_body(&request, "ModificationNotification")?;
            sdm_change::amf_sdm_data_change_notify(ctx, peers, &notification)?;
            Ok(NamfResponse::with_status(StatusCode::NO_CONTENT))
        }
        _ => Err(invalid_resource(&request, 1)),
    }
}

fn find_ue_by_supi(ctx: &AmfContext, supi: Option<&str>) -> NamfHandlerResult<u64> {
    let Some(supi) = supi else {
        log::error!("No SUPI");
        return Err(NamfHandlerError::BadRequest("No SUPI".to_string()));
    };
    ctx.amf_ue_find_by_supi(supi).ok_or_else(|| {
        log::warn!("Cannot find SUPI [{}]", supi);
        NamfHandlerError::NotFound(format!("Cannot find SUPI [{}]", supi))
    })
}

fn handle_sm_context_status(
    ctx: &mut AmfContext,
    peers: &mut AmfPeers<'_>,
    request: &NamfRequest,
) -> NamfHandlerResult<NamfResponse> {
    let supi = request.component(0).unwrap_or_default();
    let psi = request
        .component(2)
        .and_then(|psi| psi.parse::<u8>().ok())
        .filter(|&psi| psi != OGS_NAS_PDU_SESSION_IDENTITY_UNASSIGNED)
        .ok_or_else(|| {
            log::error!("[{}] PDU Session Identity is unassigned", supi);
            NamfHandlerError::BadRequest("PDU Session Identity is unassigned".to_string())
        })?;

    let notification: SmContextStatusNotification =
        parse_body(request, "SmContextStatusNotification")?;
    let status_info = notification.status_info.ok_or_else(|| {
        log::error!("[{}:{}] No StatusInfo", supi, psi);
        NamfHandlerError::BadRequest("No StatusInfo".to_string())
    })?;

    let amf_ue_id = find_ue_by_supi(ctx, request.component(0))?;
    let sess_id = ctx.sess_find_by_psi(amf_ue_id, psi).ok_or_else(|| {
        log::warn!("[{}] Cannot find session [{}]", supi, psi);
        NamfHandlerError::NotFound(format!("Cannot find session [{}]", psi))
    })?;

    log::debug!(
        "[{}:{}] SM context status [{:?}]",
        supi,
        psi,
        status_info.resource_status
    );
    release::amf_sess_release_input(
        ctx,
        peers.metrics,
        sess_id,
        ReleaseInput::ResourceStatus(status_info.resource_status.into()),
    );

    Ok(NamfResponse::with_status(StatusCode::NO_CONTENT))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ResourceStatus;
    use crate::event::tests::{
        add_test_sess, add_test_ue, connect_test_ue, RecordingRan, RecordingSbi,
    };
    use crate::metrics::AmfMetrics;
    use crate::models::{N1N2MessageTransferCause, ProblemDetails};
    use bytes::Bytes;
    use serde_json::json;

    const SUPI: &str = "imsi-001010000000001";

    fn handle(ctx: &mut AmfContext, request: NamfRequest) -> (NamfResponse, RecordingRan, RecordingSbi) {
        let (mut ran, mut sbi, metrics) = (RecordingRan::default(), RecordingSbi::default(), AmfMetrics::new());
        let response = {
            let mut peers = AmfPeers::new(&mut ran, &mut sbi, &metrics);
            amf_namf_handle(ctx, &mut peers, request)
        };
        (response, ran, sbi)
    }

    fn json_request(method: Method, path: &str, body: serde_json::Value) -> NamfRequest {
        let mut request = NamfRequest::new(method, path);
        request.body = Some(body);
        request
    }

    fn n1n2_path() -> String {
        format!("/namf-comm/v1/ue-contexts/{}/n1-n2-messages", SUPI)
    }

    fn setup_body(psi: u8) -> serde_json::Value {
        json!({
            "n2InfoContainer": {
                "n2InformationClass": "SM",
                "smInfo": {
                    "pduSessionId": psi,
                    "n2InfoContent": {
                        "ngapIeType": "PDU_RES_SETUP_REQ",
                        "ngapData": { "contentId": "n2msg" }
                    }
                }
            },
            "n1n2FailureTxfNotifURI": "http://10.0.0.4:7777/nsmf-callback/v1/n1n2-failure"
        })
    }

    #[test]
    fn test_n1n2_connected_setup() {
        let mut ctx = AmfContext::new();
        let ue = add_test_ue(&mut ctx, SUPI);
        add_test_sess(&mut ctx, ue, 5);
        connect_test_ue(&mut ctx, ue);

        let request = json_request(Method::POST, &n1n2_path(), setup_body(5))
            .with_part("n2msg", Bytes::from_static(b"\x00\x01"));
        let (response, ran, _) = handle(&mut ctx, request);

        assert_eq!(response.status, StatusCode::OK);
        assert!(response.location.is_none());
        let rsp: N1N2MessageTransferRspData = response.json().unwrap();
        assert_eq!(rsp.cause, N1N2MessageTransferCause::N1N2TransferInitiated);
        assert_eq!(ran.sent.len(), 1);
    }

    #[test]
    fn test_n1n2_idle_setup_pages() {
        let mut ctx = AmfContext::new();
        let ue = add_test_ue(&mut ctx, SUPI);
        add_test_sess(&mut ctx, ue, 5);

        let request = json_request(Method::POST, &n1n2_path(), setup_body(5))
            .with_part("n2msg", Bytes::from_static(b"\x00\x01"));
        let (response, _, _) = handle(&mut ctx, request);

        assert_eq!(response.status, StatusCode::ACCEPTED);
        assert!(response.location.is_some());
        let rsp: N1N2MessageTransferRspData = response.json().unwrap();
        assert_eq!(rsp.cause, N1N2MessageTransferCause::AttemptingToReachUe);
        assert!(ctx.pending.get(ue).is_some());
    }

    #[test]
    fn test_n1n2_errors() {
        let mut ctx = AmfContext::new();
        let ue = add_test_ue(&mut ctx, SUPI);
        add_test_sess(&mut ctx, ue, 5);

        // missing binary part
        let (response, _, _) = handle(&mut ctx, json_request(Method::POST, &n1n2_path(), setup_body(5)));
        assert_eq!(response.status, StatusCode::BAD_REQUEST);
        let problem: ProblemDetails = response.json().unwrap();
        assert_eq!(problem.status, Some(400));
        assert_eq!(problem.detail.as_deref(), Some("No N2 SM Content"));

        // unknown session
        let request = json_request(Method::POST, &n1n2_path(), setup_body(6))
            .with_part("n2msg", Bytes::from_static(b"\x00\x01"));
        let (response, _, _) = handle(&mut ctx, request);
        assert_eq!(response.status, StatusCode::NOT_FOUND);

        // unknown UE
        let request = json_request(
            Method::POST,
            "/namf-comm/v1/ue-contexts/imsi-001010000000099/n1-n2-messages",
            setup_body(5),
        );
        let (response, _, _) = handle(&mut ctx, request);
        assert_eq!(response.status, StatusCode::NOT_FOUND);

        // no PSI anywhere
        let (response, _, _) = handle(&mut ctx, json_request(Method::POST, &n1n2_path(), json!({})));
        assert_eq!(response.status, StatusCode::BAD_REQUEST);

        // wrong method
        let (response, _, _) = handle(&mut ctx, json_request(Method::GET, &n1n2_path(), setup_body(5)));
        assert_eq!(response.status, StatusCode::METHOD_NOT_ALLOWED);
    }

    #[test]
    fn test_n1n2_reject_removes_session() {
        let mut ctx = AmfContext::new();
        let ue = add_test_ue(&mut ctx, SUPI);
        let sess = add_test_sess(&mut ctx, ue, 5);
        connect_test_ue(&mut ctx, ue);

        let body = json!({
            "pduSessionId": 5,
            "n1MessageContainer": {
                "n1MessageClass": "SM",
                "n1MessageContent": { "contentId": "n1msg" }
            }
        });
        let request = json_request(Method::POST, &n1n2_path(), body)
            .with_part("n1msg", Bytes::from_static(b"\x2e\x05\x01\xc3\x1a"));
        let (response, ran, _) = handle(&mut ctx, request);

        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(ran.sent.len(), 1);
        assert!(ctx.sess(sess).is_none());
    }

    #[test]
    fn test_sm_context_status() {
        let mut ctx = AmfContext::new();
        let ue = add_test_ue(&mut ctx, SUPI);
        let sess = add_test_sess(&mut ctx, ue, 5);
        let body = json!({ "statusInfo": { "resourceStatus": "RELEASED" } });

        let path = format!("/namf-callback/v1/{}/sm-context-status/5", SUPI);
        let (response, _, _) = handle(&mut ctx, json_request(Method::POST, &path, body.clone()));
        assert_eq!(response.status, StatusCode::NO_CONTENT);
        assert_eq!(ctx.sess(sess).unwrap().resource_status, ResourceStatus::Released);

        let path = format!("/namf-callback/v1/{}/sm-context-status/0", SUPI);
        let (response, _, _) = handle(&mut ctx, json_request(Method::POST, &path, body.clone()));
        assert_eq!(response.status, StatusCode::BAD_REQUEST);

        let path = format!("/namf-callback/v1/{}/sm-context-status/6", SUPI);
        let (response, _, _) = handle(&mut ctx, json_request(Method::POST, &path, body));
        assert_eq!(response.status, StatusCode::NOT_FOUND);

        let path = format!("/namf-callback/v1/{}/sm-context-status/5", SUPI);
        let (response, _, _) = handle(&mut ctx, json_request(Method::POST, &path, json!({})));
        assert_eq!(response.status, StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_dereg_notify_routes() {
        let mut ctx = AmfContext::new();
        let ue = add_test_ue(&mut ctx, SUPI);
        connect_test_ue(&mut ctx, ue);

        let path = format!("/namf-callback/v1/{}/dereg-notify", SUPI);
        let body = json!({ "deregReason": "SUBSCRIPTION_WITHDRAWN", "accessType": "3GPP_ACCESS" });
        let (response, ran, _) = handle(&mut ctx, json_request(Method::POST, &path, body));
        assert_eq!(response.status, StatusCode::NO_CONTENT);
        assert_eq!(ran.sent.len(), 1);

        let body = json!({ "accessType": "3GPP_ACCESS" });
        let (response, _, _) = handle(&mut ctx, json_request(Method::POST, &path, body));
        assert_eq!(response.status, StatusCode::BAD_REQUEST);

        let path = "/namf-callback/v1/imsi-001010000000099/dereg-notify";
        let body = json!({ "deregReason": "SUBSCRIPTION_WITHDRAWN", "accessType": "3GPP_ACCESS" });
        let (response, _, _) = handle(&mut ctx, json_request(Method::POST, path, body));
        assert_eq!(response.status, StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_sdm_notify_routes() {
        let mut ctx = AmfContext::new();
        let ue = add_test_ue(&mut ctx, SUPI);
        connect_test_ue(&mut ctx, ue);

        let path = format!("/namf-callback/v1/{}/sdmsubscription-notify", SUPI);
        let body = json!({
            "notifyItems": [{
                "resourceId": format!("{}/am-data", SUPI),
                "changes": [{ "op": "ADD", "path": "/ratRestrictions/-", "newValue": "EUTRA" }]
            }]
        });
        let (response, _, _) = handle(&mut ctx, json_request(Method::POST, &path, body));
        assert_eq!(response.status, StatusCode::NO_CONTENT);
        assert_eq!(
            ctx.amf_ue(ue).unwrap().rat_restrictions,
            vec![crate::context::RatType::Eutra]
        );

        let body = json!({
            "notifyItems": [{
                "resourceId": format!("{}/am-data", SUPI),
                "changes": [{ "op": "ADD", "path": "/ratRestrictions/5", "newValue": "NR" }]
            }]
        });
        let (response, _, _) = handle(&mut ctx, json_request(Method::POST, &path, body));
        assert_eq!(response.status, StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_context_transfer_routes() {
        let mut ctx = AmfContext::new();
        let ue = add_test_ue(&mut ctx, SUPI);
        add_test_sess(&mut ctx, ue, 1);

        let path = format!("/namf-comm/v1/ue-contexts/{}/transfer", SUPI);
        let body = json!({ "reason": "MOBI_REG", "accessType": "3GPP_ACCESS" });
        let (response, _, _) = handle(&mut ctx, json_request(Method::POST, &path, body));
        assert_eq!(response.status, StatusCode::OK);
        let body = response.body.unwrap();
        assert_eq!(body["ueContext"]["supi"], SUPI);
        assert_eq!(body["ueContext"]["sessionContextList"][0]["pduSessionId"], 1);

        let path = format!("/namf-comm/v1/ue-contexts/{}/transfer-update", SUPI);
        let body = json!({ "transferStatus": "TRANSFERRED", "toReleaseSessionList": [1] });
        let (response, _, sbi) = handle(&mut ctx, json_request(Method::POST, &path, body));
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.body.unwrap()["regStatusTransferComplete"], true);
        assert_eq!(sbi.sent.len(), 1);
    }

    #[test]
    fn test_unknown_routes() {
        let mut ctx = AmfContext::new();
        add_test_ue(&mut ctx, SUPI);

        let (response, _, _) = handle(&mut ctx, NamfRequest::new(Method::POST, "/namf-evts/v1/subscriptions"));
        assert_eq!(response.status, StatusCode::BAD_REQUEST);

        let path = format!("/namf-comm/v1/ue-contexts/{}/assign-ebi", SUPI);
        let (response, _, _) = handle(&mut ctx, NamfRequest::new(Method::POST, &path));
        assert_eq!(response.status, StatusCode::BAD_REQUEST);

        let path = format!("/namf-callback/v1/{}/am-policy-notify", SUPI);
        let (response, _, _) = handle(&mut ctx, NamfRequest::new(Method::POST, &path));
        assert_eq!(response.status, StatusCode::BAD_REQUEST);
    }
}
