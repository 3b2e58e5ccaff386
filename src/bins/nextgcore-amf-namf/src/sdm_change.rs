//! Subscriber data change notification (Nudm_SDM_Notification)
//!
//! The UDM reports changes to the access and mobility subscription data as a
//! list of JSON-patch-like change items. The AMF keeps the RAT restrictions
//! and the subscribed UE-AMBR from that document; every other field is
//! ignored. Once the cache is updated the UE is either deregistered (its
//! current RAT is now restricted) or the gNB is told about the new AMBR.

use serde_json::Value;
use thiserror::Error;

use crate::context::{self, AmfContext, Bitrate, DeregistrationState, RatType};
use crate::error::{NamfHandlerError, NamfHandlerResult};
use crate::event::AmfPeers;
use crate::models::{ChangeItem, ChangeType, ModificationNotification};
use crate::nas_path;
use crate::ngap_path;
use crate::sbi_path::{self, resource_name};

const PATH_RAT_RESTRICTIONS: &str = "/ratRestrictions";
const PATH_RAT_RESTRICTIONS_PREFIX: &str = "/ratRestrictions/";
const PATH_SUBSCRIBED_UE_AMBR: &str = "/subscribedUeAmbr";
const PATH_SUBSCRIBED_UE_AMBR_UPLINK: &str = "/subscribedUeAmbr/uplink";
const PATH_SUBSCRIBED_UE_AMBR_DOWNLINK: &str = "/subscribedUeAmbr/downlink";
const APPEND_MARKER: &str = "-";

/// Subscriber data change failure
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SdmChangeError {
    #[error("[{0}] No UeId")]
    NoUeId(String),

    #[error("Cannot find SUPI [{0}]")]
    UeNotFound(String),

    #[error("[{0}] No Resource Name")]
    NoResourceName(String),

    #[error("Unknown Resource Name: [{0}]")]
    UnknownResource(String),

    #[error("No path in change item")]
    NoPath,

    #[error("Invalid type of {0}")]
    InvalidType(&'static str),

    #[error("Unknown RAT type [{0}]")]
    UnknownRatType(String),

    #[error("Invalid RAT restriction index [{0}]")]
    IndexOutOfRange(String),

    #[error("Invalid bitrate [{0}]")]
    InvalidBitrate(String),
}

/// Working copy of the cached access and mobility policy fields
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AmPolicyCache {
    pub rat_restrictions: Vec<RatType>,
    pub ue_ambr: Bitrate,
    pub ambr_changed: bool,
}

impl AmPolicyCache {
    pub fn new(rat_restrictions: Vec<RatType>, ue_ambr: Bitrate) -> Self {
        Self {
            rat_restrictions,
            ue_ambr,
            ambr_changed: false,
        }
    }
}

/// What the AMF did after applying a UE's changes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SdmChangeAction {
    /// No NG context: implicit deregistration, not driven yet
    ImplicitDeregistration,
    /// Current RAT now restricted: network-initiated deregistration
    ExplicitDeregistration,
    /// UE Context Modification Request sent with the new AMBR
    UeContextModification,
    NoAction,
}

// ============================================================================
// Change item application
// ============================================================================

/// Apply one change item to the cache
pub fn apply_change_item(cache: &mut AmPolicyCache, item: &ChangeItem) -> Result<(), SdmChangeError> {
    let path = item.path.as_deref().ok_or(SdmChangeError::NoPath)?;

    if path.is_empty() && matches!(item.op, ChangeType::Add | ChangeType::Replace) {
        match item.new_value {
            Some(Value::Object(_)) => {}
            _ => return Err(SdmChangeError::InvalidType("am-data")),
        }
    }

    update_rat_restrictions(cache, item.op, path, item.new_value.as_ref())?;
    update_ambr(cache, item.op, path, item.new_value.as_ref())
}

fn update_rat_restrictions(
    cache: &mut AmPolicyCache,
    op: ChangeType,
    path: &str,
    value: Option<&Value>,
) -> Result<(), SdmChangeError> {
    let restrictions = &mut cache.rat_restrictions;

    match op {
        ChangeType::Add | ChangeType::Replace => {
            if path.is_empty() {
                if let Some(list) = value.and_then(|v| v.get("ratRestrictions")) {
                    *restrictions = rat_restriction_list(list)?;
                }
            } else if path == PATH_RAT_RESTRICTIONS {
                *restrictions = rat_restriction_list(value.unwrap_or(&Value::Null))?;
            } else if let Some(index) = path.strip_prefix(PATH_RAT_RESTRICTIONS_PREFIX) {
                let rat_type = rat_restriction(value.unwrap_or(&Value::Null))?;
                let i = restriction_index(index, restrictions.len())?;
                if op == ChangeType::Replace && i < restrictions.len() {
                    restrictions[i] = rat_type;
                } else if i <= restrictions.len() {
                    restrictions.insert(i, rat_type);
                } else {
                    log::error!("Can't add RAT restriction to invalid index [{}]", index);
                    return Err(SdmChangeError::IndexOutOfRange(index.to_string()));
                }
            }
        }
        ChangeType::Remove => {
            if path.is_empty() || path == PATH_RAT_RESTRICTIONS {
                restrictions.clear();
            } else if let Some(index) = path.strip_prefix(PATH_RAT_RESTRICTIONS_PREFIX) {
                let i = restriction_index(index, restrictions.len())?;
                if i >= restrictions.len() {
                    log::error!("Can't remove RAT restriction at invalid index [{}]", index);
                    return Err(SdmChangeError::IndexOutOfRange(index.to_string()));
                }
                restrictions.remove(i);
            }
        }
        ChangeType::Move => {}
    }
    Ok(())
}

fn restriction_index(index: &str, len: usize) -> Result<usize, SdmChangeError> {
    if index == APPEND_MARKER {
        return Ok(len);
    }
    index
        .parse::<usize>()
        .map_err(|_| SdmChangeError::IndexOutOfRange(index.to_string()))
}

fn rat_restriction_list(value: &Value) -> Result<Vec<RatType>, SdmChangeError> {
    let Value::Array(items) = value else {
        log::error!("Invalid type of ratRestrictions");
        return Err(SdmChangeError::InvalidType("ratRestrictions"));
    };
    items.iter().map(rat_restriction).collect()
}

fn rat_restriction(value: &Value) -> Result<RatType, SdmChangeError> {
    let name = value
        .as_str()
        .ok_or(SdmChangeError::InvalidType("ratRestrictions"))?;
    RatType::from_sbi_str(name).ok_or_else(|| SdmChangeError::UnknownRatType(name.to_string()))
}

fn update_ambr(
    cache: &mut AmPolicyCache,
    op: ChangeType,
    path: &str,
    value: Option<&Value>,
) -> Result<(), SdmChangeError> {
    match op {
        ChangeType::Add | ChangeType::Replace => {
            if path.is_empty() {
                let ambr = value.and_then(|v| v.get("subscribedUeAmbr"));
                set_ambr(cache, ambr)?;
            } else if path == PATH_SUBSCRIBED_UE_AMBR {
                set_ambr(cache, value)?;
            } else if path == PATH_SUBSCRIBED_UE_AMBR_UPLINK {
                cache.ue_ambr.uplink = bitrate(value)?;
                cache.ambr_changed = true;
            } else if path == PATH_SUBSCRIBED_UE_AMBR_DOWNLINK {
                cache.ue_ambr.downlink = bitrate(value)?;
                cache.ambr_changed = true;
            }
        }
        ChangeType::Remove => {
            if path == PATH_SUBSCRIBED_UE_AMBR {
                set_ambr(cache, None)?;
            } else if path == PATH_SUBSCRIBED_UE_AMBR_UPLINK {
                cache.ue_ambr.uplink = 0;
                cache.ambr_changed = true;
            } else if path == PATH_SUBSCRIBED_UE_AMBR_DOWNLINK {
                cache.ue_ambr.downlink = 0;
                cache.ambr_changed = true;
            }
        }
        ChangeType::Move => {}
    }
    Ok(())
}

/// A missing or null AMBR means unlimited (0) in both directions
fn set_ambr(cache: &mut AmPolicyCache, value: Option<&Value>) -> Result<(), SdmChangeError> {
    match value {
        None | Some(Value::Null) => cache.ue_ambr = Bitrate::default(),
        Some(Value::Object(ambr)) => {
            cache.ue_ambr = Bitrate {
                uplink: bitrate(ambr.get("uplink"))?,
                downlink: bitrate(ambr.get("downlink"))?,
            };
        }
        Some(_) => {
            log::error!("Invalid type of subscribedUeAmbr");
            return Err(SdmChangeError::InvalidType("subscribedUeAmbr"));
        }
    }
    cache.ambr_changed = true;
    Ok(())
}

fn bitrate(value: Option<&Value>) -> Result<u64, SdmChangeError> {
    let Some(Value::String(value)) = value else {
        log::error!("Invalid type of subscribedUeAmbr");
        return Err(SdmChangeError::InvalidType("subscribedUeAmbr"));
    };
    context::bitrate_from_string(value).ok_or_else(|| SdmChangeError::InvalidBitrate(value.clone()))
}

// ============================================================================
// Notification handling
// ============================================================================

/// Apply a ModificationNotification and run the follow-on for every UE it touched
///
/// Nothing is committed unless every item of every UE applies cleanly. Once
/// committed, every UE's follow-on runs; the first follow-on failure is returned.
pub fn amf_sdm_data_change_notify(
    ctx: &mut AmfContext,
    peers: &mut AmfPeers<'_>,
    notification: &ModificationNotification,
) -> NamfHandlerResult<Vec<(u64, SdmChangeAction)>> {
    let mut working: Vec<(u64, AmPolicyCache)> = Vec::new();

    for item in &notification.notify_items {
        let mut segments = item.resource_id.split('/').filter(|s| !s.is_empty());

        let ueid = segments.next().ok_or_else(|| {
            log::error!("[{}] No UeId", item.resource_id);
            SdmChangeError::NoUeId(item.resource_id.clone())
        })?;
        let amf_ue_id = ctx.amf_ue_find_by_supi(ueid).ok_or_else(|| {
            log::error!("Cannot find SUPI [{}]", ueid);
            SdmChangeError::UeNotFound(ueid.to_string())
        })?;
        let res_name = segments.next().ok_or_else(|| {
            log::error!("[{}] No Resource Name", item.resource_id);
            SdmChangeError::NoResourceName(item.resource_id.clone())
        })?;
        if res_name != resource_name::AM_DATA {
            log::error!("Unknown Resource Name: [{}]", res_name);
            return Err(SdmChangeError::UnknownResource(res_name.to_string()).into());
        }

        let pos = match working.iter().position(|(id, _)| *id == amf_ue_id) {
            Some(pos) => pos,
            None => {
                let amf_ue = ctx
                    .amf_ue(amf_ue_id)
                    .ok_or_else(|| SdmChangeError::UeNotFound(ueid.to_string()))?;
                working.push((
                    amf_ue_id,
                    AmPolicyCache::new(amf_ue.rat_restrictions.clone(), amf_ue.ue_ambr),
                ));
                working.len() - 1
            }
        };
        for change in &item.changes {
            apply_change_item(&mut working[pos].1, change)?;
        }
    }

    let mut follow_ons = Vec::with_capacity(working.len());
    for (amf_ue_id, cache) in working {
        if let Some(amf_ue) = ctx.amf_ue_mut(amf_ue_id) {
            amf_ue.rat_restrictions = cache.rat_restrictions;
            amf_ue.ue_ambr = cache.ue_ambr;
        }
        follow_ons.push((amf_ue_id, cache.ambr_changed));
    }

    // Every UE keeps its new cache even if another UE's follow-on fails
    let mut actions = Vec::with_capacity(follow_ons.len());
    let mut first_error = None;
    for (amf_ue_id, ambr_changed) in follow_ons {
        match amf_sdm_change_follow_on(ctx, peers, amf_ue_id, ambr_changed) {
            Ok(action) => actions.push((amf_ue_id, action)),
            Err(e) => {
                log::error!("[ue_id={}] Subscription change follow-on failed: {}", amf_ue_id, e);
                first_error.get_or_insert(e);
            }
        }
    }
    match first_error {
        Some(e) => Err(e),
        None => Ok(actions),
    }
}

fn amf_sdm_change_follow_on(
    ctx: &mut AmfContext,
    peers: &mut AmfPeers<'_>,
    amf_ue_id: u64,
    ambr_changed: bool,
) -> NamfHandlerResult<SdmChangeAction> {
    let amf_ue = ctx
        .amf_ue(amf_ue_id)
        .ok_or_else(|| NamfHandlerError::NotFound("No UE Context".to_string()))?;
    let supi = amf_ue.supi_str().to_string();

    let Some(ran_ue) = ctx.ran_ue_of(amf_ue_id) else {
        log::error!("[{}] NG context has already been removed", supi);
        log::error!("[{}] Not implemented : Use Implicit De-registration", supi);
        if let Some(amf_ue) = ctx.amf_ue_mut(amf_ue_id) {
            amf_ue.network_deregistration = Some(DeregistrationState::NetworkInitiatedImplicitIncomplete);
        }
        return Ok(SdmChangeAction::ImplicitDeregistration);
    };

    if amf_ue.is_rat_restricted(ran_ue.rat_type) {
        log::info!("[{}] RAT [{}] restricted, de-registering", supi, ran_ue.rat_type.as_str());
        nas_path::nas_send_de_registration_request(ctx, peers.ran, amf_ue_id, true, None)?;

        let state = DeregistrationState::NetworkInitiatedExplicit;
        let amf_ue = ctx
            .amf_ue_mut(amf_ue_id)
            .ok_or_else(|| NamfHandlerError::NotFound("No UE Context".to_string()))?;
        amf_ue.network_deregistration = Some(state);
        sbi_path::amf_ue_sbi_unsubscribe(peers.sbi, amf_ue, Some(state))?;
        return Ok(SdmChangeAction::ExplicitDeregistration);
    }

    if ambr_changed {
        log::debug!("[{}] UE-AMBR changed", supi);
        ngap_path::ngap_send_ue_context_modification_request(peers.ran, ran_ue, amf_ue)?;
        return Ok(SdmChangeAction::UeContextModification);
    }

    Ok(SdmChangeAction::NoAction)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::event::tests::{add_test_ue, connect_test_ue, RecordingRan, RecordingSbi};
    use crate::metrics::AmfMetrics;
    use crate::models::NotifyItem;
    use crate::ngap_path::NgapOutbound;
    use crate::sbi_path::SbiRequest;

    fn item(op: ChangeType, path: &str, new_value: Option<Value>) -> ChangeItem {
        ChangeItem {
            op,
            path: Some(path.to_string()),
            from: None,
            orig_value: None,
            new_value,
        }
    }

    fn apply(cache: &mut AmPolicyCache, items: &[ChangeItem]) -> Result<(), SdmChangeError> {
        items.iter().try_for_each(|i| apply_change_item(cache, i))
    }

    #[test]
    fn test_whole_document_then_append() {
        let mut cache = AmPolicyCache::default();
        apply(
            &mut cache,
            &[
                item(ChangeType::Replace, "", Some(json!({"ratRestrictions": ["NR", "EUTRA"]}))),
                item(ChangeType::Add, "/ratRestrictions/-", Some(json!("WLAN"))),
            ],
        )
        .unwrap();
        assert_eq!(cache.rat_restrictions, vec![RatType::Nr, RatType::Eutra, RatType::Wlan]);
    }

    #[test]
    fn test_append_then_whole_document() {
        let mut cache = AmPolicyCache::default();
        apply(
            &mut cache,
            &[
                item(ChangeType::Add, "/ratRestrictions/-", Some(json!("WLAN"))),
                item(ChangeType::Replace, "", Some(json!({"ratRestrictions": ["NR", "EUTRA"]}))),
            ],
        )
        .unwrap();
        assert_eq!(cache.rat_restrictions, vec![RatType::Nr, RatType::Eutra]);
    }

    #[test]
    fn test_add_out_of_range() {
        let mut cache = AmPolicyCache::new(vec![RatType::Nr, RatType::Eutra], Bitrate::default());
        let err = apply_change_item(&mut cache, &item(ChangeType::Add, "/ratRestrictions/5", Some(json!("WLAN"))))
            .unwrap_err();
        assert_eq!(err, SdmChangeError::IndexOutOfRange("5".to_string()));
        assert_eq!(cache.rat_restrictions, vec![RatType::Nr, RatType::Eutra]);
    }

    #[test]
    fn test_insert_replace_remove_by_index() {
        let mut cache = AmPolicyCache::new(vec![RatType::Nr, RatType::Eutra], Bitrate::default());

        apply_change_item(&mut cache, &item(ChangeType::Add, "/ratRestrictions/0", Some(json!("WLAN")))).unwrap();
        assert_eq!(cache.rat_restrictions, vec![RatType::Wlan, RatType::Nr, RatType::Eutra]);

        apply_change_item(&mut cache, &item(ChangeType::Replace, "/ratRestrictions/1", Some(json!("NBIOT")))).unwrap();
        assert_eq!(cache.rat_restrictions, vec![RatType::Wlan, RatType::Nbiot, RatType::Eutra]);

        apply_change_item(&mut cache, &item(ChangeType::Remove, "/ratRestrictions/2", None)).unwrap();
        assert_eq!(cache.rat_restrictions, vec![RatType::Wlan, RatType::Nbiot]);

        let err = apply_change_item(&mut cache, &item(ChangeType::Remove, "/ratRestrictions/2", None)).unwrap_err();
        assert!(matches!(err, SdmChangeError::IndexOutOfRange(_)));
    }

    #[test]
    fn test_remove_whole_document_clears_restrictions() {
        let mut cache = AmPolicyCache::new(vec![RatType::Nr], Bitrate { downlink: 1, uplink: 1 });
        apply_change_item(&mut cache, &item(ChangeType::Remove, "", None)).unwrap();
        assert!(cache.rat_restrictions.is_empty());
        assert!(!cache.ambr_changed);
    }

    #[test]
    fn test_unknown_rat_type() {
        let mut cache = AmPolicyCache::default();
        let err = apply_change_item(&mut cache, &item(ChangeType::Replace, "/ratRestrictions", Some(json!(["6G"]))))
            .unwrap_err();
        assert_eq!(err, SdmChangeError::UnknownRatType("6G".to_string()));
    }

    #[test]
    fn test_ambr_updates() {
        let mut cache = AmPolicyCache::default();
        apply_change_item(
            &mut cache,
            &item(
                ChangeType::Replace,
                "/subscribedUeAmbr",
                Some(json!({"uplink": "1 Gbps", "downlink": "2 Gbps"})),
            ),
        )
        .unwrap();
        assert_eq!(
            cache.ue_ambr,
            Bitrate {
                downlink: 2_000_000_000,
                uplink: 1_000_000_000
            }
        );
        assert!(cache.ambr_changed);

        apply_change_item(&mut cache, &item(ChangeType::Replace, "/subscribedUeAmbr/uplink", Some(json!("512 Kbps"))))
            .unwrap();
        assert_eq!(cache.ue_ambr.uplink, 512_000);

        apply_change_item(&mut cache, &item(ChangeType::Remove, "/subscribedUeAmbr", None)).unwrap();
        assert_eq!(cache.ue_ambr, Bitrate::default());
    }

    #[test]
    fn test_whole_document_without_ambr_resets_it() {
        let mut cache = AmPolicyCache::new(Vec::new(), Bitrate { downlink: 10, uplink: 10 });
        apply_change_item(&mut cache, &item(ChangeType::Replace, "", Some(json!({"ratRestrictions": []})))).unwrap();
        assert_eq!(cache.ue_ambr, Bitrate::default());
        assert!(cache.ambr_changed);
    }

    #[test]
    fn test_whole_document_must_be_object() {
        let mut cache = AmPolicyCache::default();
        let err = apply_change_item(&mut cache, &item(ChangeType::Replace, "", Some(json!("am-data")))).unwrap_err();
        assert_eq!(err, SdmChangeError::InvalidType("am-data"));
    }

    #[test]
    fn test_unknown_path_is_ignored() {
        let mut cache = AmPolicyCache::new(vec![RatType::Nr], Bitrate::default());
        apply_change_item(&mut cache, &item(ChangeType::Replace, "/gpsis", Some(json!(["msisdn-1"])))).unwrap();
        assert_eq!(cache, AmPolicyCache::new(vec![RatType::Nr], Bitrate::default()));
    }

    fn notification(resource_id: &str, changes: Vec<ChangeItem>) -> ModificationNotification {
        ModificationNotification {
            notify_items: vec![NotifyItem {
                resource_id: resource_id.to_string(),
                changes,
            }],
        }
    }

    #[test]
    fn test_notify_restricted_rat_deregisters() {
        let mut ctx = AmfContext::new();
        let (mut ran, mut sbi, metrics) = (RecordingRan::default(), RecordingSbi::default(), AmfMetrics::new());
        let ue = add_test_ue(&mut ctx, "imsi-001010000000001");
        connect_test_ue(&mut ctx, ue);
        ctx.amf_ue_mut(ue).unwrap().data_change_subscription.id = Some("sdm-1".to_string());

        let actions = {
            let mut peers = AmfPeers::new(&mut ran, &mut sbi, &metrics);
            amf_sdm_data_change_notify(
                &mut ctx,
                &mut peers,
                &notification(
                    "imsi-001010000000001/am-data",
                    vec![item(ChangeType::Add, "/ratRestrictions/-", Some(json!("NR")))],
                ),
            )
            .unwrap()
        };

        assert_eq!(actions, vec![(ue, SdmChangeAction::ExplicitDeregistration)]);
        assert_eq!(
            ctx.amf_ue(ue).unwrap().network_deregistration,
            Some(DeregistrationState::NetworkInitiatedExplicit)
        );
        assert_eq!(ran.sent.len(), 1);
        assert!(matches!(sbi.sent[..], [SbiRequest::UdmSdmSubscriptionDelete { .. }]));
    }

    #[test]
    fn test_notify_ambr_change_modifies_ue_context() {
        let mut ctx = AmfContext::new();
        let (mut ran, mut sbi, metrics) = (RecordingRan::default(), RecordingSbi::default(), AmfMetrics::new());
        let ue = add_test_ue(&mut ctx, "imsi-001010000000001");
        connect_test_ue(&mut ctx, ue);

        let actions = {
            let mut peers = AmfPeers::new(&mut ran, &mut sbi, &metrics);
            amf_sdm_data_change_notify(
                &mut ctx,
                &mut peers,
                &notification(
                    "/imsi-001010000000001/am-data",
                    vec![item(ChangeType::Replace, "/subscribedUeAmbr/downlink", Some(json!("100 Mbps")))],
                ),
            )
            .unwrap()
        };

        assert_eq!(actions, vec![(ue, SdmChangeAction::UeContextModification)]);
        assert_eq!(ctx.amf_ue(ue).unwrap().ue_ambr.downlink, 100_000_000);
        match &ran.sent[..] {
            [NgapOutbound::ToRanUe { pkbuf, .. }] => assert_eq!(
                (pkbuf[0] as u16) << 8 | pkbuf[1] as u16,
                crate::ngap_build::procedure_code::UE_CONTEXT_MODIFICATION
            ),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_notify_idle_ue_is_implicit() {
        let mut ctx = AmfContext::new();
        let (mut ran, mut sbi, metrics) = (RecordingRan::default(), RecordingSbi::default(), AmfMetrics::new());
        let ue = add_test_ue(&mut ctx, "imsi-001010000000001");

        let actions = {
            let mut peers = AmfPeers::new(&mut ran, &mut sbi, &metrics);
            amf_sdm_data_change_notify(
                &mut ctx,
                &mut peers,
                &notification(
                    "imsi-001010000000001/am-data",
                    vec![item(ChangeType::Add, "/ratRestrictions/-", Some(json!("NR")))],
                ),
            )
            .unwrap()
        };

        assert_eq!(actions, vec![(ue, SdmChangeAction::ImplicitDeregistration)]);
        assert_eq!(ctx.amf_ue(ue).unwrap().rat_restrictions, vec![RatType::Nr]);
        assert!(ran.sent.is_empty());
    }

    #[test]
    fn test_notify_failure_commits_nothing() {
        let mut ctx = AmfContext::new();
        let (mut ran, mut sbi, metrics) = (RecordingRan::default(), RecordingSbi::default(), AmfMetrics::new());
        let ue = add_test_ue(&mut ctx, "imsi-001010000000001");
        connect_test_ue(&mut ctx, ue);

        let err = {
            let mut peers = AmfPeers::new(&mut ran, &mut sbi, &metrics);
            amf_sdm_data_change_notify(
                &mut ctx,
                &mut peers,
                &notification(
                    "imsi-001010000000001/am-data",
                    vec![
                        item(ChangeType::Add, "/ratRestrictions/-", Some(json!("EUTRA"))),
                        item(ChangeType::Add, "/ratRestrictions/7", Some(json!("NR"))),
                    ],
                ),
            )
            .unwrap_err()
        };

        assert_eq!(err.status(), hyper::StatusCode::BAD_REQUEST);
        assert!(ctx.amf_ue(ue).unwrap().rat_restrictions.is_empty());
        assert!(ran.sent.is_empty());
    }

    #[test]
    fn test_notify_follow_on_failure_keeps_every_ue_committed() {
        let mut ctx = AmfContext::new();
        let (mut ran, mut sbi, metrics) = (RecordingRan::default(), RecordingSbi::default(), AmfMetrics::new());
        let ue1 = add_test_ue(&mut ctx, "imsi-001010000000001");
        let ue2 = add_test_ue(&mut ctx, "imsi-001010000000002");
        connect_test_ue(&mut ctx, ue1);
        connect_test_ue(&mut ctx, ue2);
        ran.closed = true;

        let downlink = || vec![item(ChangeType::Replace, "/subscribedUeAmbr/downlink", Some(json!("100 Mbps")))];
        let notification = ModificationNotification {
            notify_items: vec![
                NotifyItem {
                    resource_id: "imsi-001010000000001/am-data".to_string(),
                    changes: downlink(),
                },
                NotifyItem {
                    resource_id: "imsi-001010000000002/am-data".to_string(),
                    changes: downlink(),
                },
            ],
        };

        let err = {
            let mut peers = AmfPeers::new(&mut ran, &mut sbi, &metrics);
            amf_sdm_data_change_notify(&mut ctx, &mut peers, &notification).unwrap_err()
        };

        assert_eq!(err.status(), hyper::StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(ctx.amf_ue(ue1).unwrap().ue_ambr.downlink, 100_000_000);
        assert_eq!(ctx.amf_ue(ue2).unwrap().ue_ambr.downlink, 100_000_000);
        assert!(ran.sent.is_empty());
    }

    #[test]
    fn test_notify_errors() {
        let mut ctx = AmfContext::new();
        let (mut ran, mut sbi, metrics) = (RecordingRan::default(), RecordingSbi::default(), AmfMetrics::new());
        add_test_ue(&mut ctx, "imsi-001010000000001");
        let mut peers = AmfPeers::new(&mut ran, &mut sbi, &metrics);

        let err = amf_sdm_data_change_notify(&mut ctx, &mut peers, &notification("imsi-999/am-data", vec![]))
            .unwrap_err();
        assert_eq!(err.status(), hyper::StatusCode::NOT_FOUND);

        let err = amf_sdm_data_change_notify(
            &mut ctx,
            &mut peers,
            &notification("imsi-001010000000001/smf-select-data", vec![]),
        )
        .unwrap_err();
        assert_eq!(
            err,
            NamfHandlerError::SdmChange(SdmChangeError::UnknownResource("smf-select-data".to_string()))
        );

        let err = amf_sdm_data_change_notify(&mut ctx, &mut peers, &notification("imsi-001010000000001", vec![]))
            .unwrap_err();
        assert_eq!(err.status(), hyper::StatusCode::BAD_REQUEST);
    }
}
