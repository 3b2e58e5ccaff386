//! Property-Based Tests for the Namf procedures
//!
//! Release completion over arbitrary input orders, paging of idle UEs for
//! every deferrable transfer, the per-leg initial context setup flag and the
//! RAT restriction index bounds.

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use hyper::StatusCode;
    use proptest::prelude::*;

    use crate::context::{AmfContext, Bitrate, RatType, ResourceStatus};
    use crate::event::tests::{add_test_sess, add_test_ue, connect_test_ue, RecordingRan, RecordingSbi};
    use crate::event::AmfPeers;
    use crate::metrics::AmfMetrics;
    use crate::models::{ChangeItem, ChangeType, N1N2MessageTransferCause};
    use crate::n1n2_transfer::{amf_n1n2_message_transfer, TransferKind, TransferRequest};
    use crate::ngap_build::procedure_code;
    use crate::ngap_path::NgapOutbound;
    use crate::release::{amf_sess_release_input, ReleaseInput};
    use crate::sdm_change::{apply_change_item, AmPolicyCache};

    const SUPI: &str = "imsi-001010000000001";

    // ========================================================================
    // Strategies for generating test data
    // ========================================================================

    fn arb_release_input() -> impl Strategy<Value = ReleaseInput> {
        prop_oneof![
            Just(ReleaseInput::N1Released),
            Just(ReleaseInput::N2Released),
            Just(ReleaseInput::ResourceStatus(ResourceStatus::Released)),
            Just(ReleaseInput::ResourceStatus(ResourceStatus::Unchanged)),
            Just(ReleaseInput::ResourceStatus(ResourceStatus::Updated)),
        ]
    }

    fn arb_deferrable_kind() -> impl Strategy<Value = TransferKind> {
        prop_oneof![
            Just(TransferKind::SessionSetup),
            Just(TransferKind::SessionModify),
            Just(TransferKind::SessionRelease),
        ]
    }

    fn arb_rat_type() -> impl Strategy<Value = RatType> {
        prop_oneof![
            Just(RatType::Nr),
            Just(RatType::Eutra),
            Just(RatType::Wlan),
            Just(RatType::Virtual),
            Just(RatType::Nbiot),
        ]
    }

    fn procedure_code_of(message: &NgapOutbound) -> Option<u16> {
        match message {
            NgapOutbound::ToRanUe { pkbuf, .. } => Some((pkbuf[0] as u16) << 8 | pkbuf[1] as u16),
            NgapOutbound::Paging { .. } => None,
        }
    }

    fn rat_item(op: ChangeType, index: usize, rat_type: RatType) -> ChangeItem {
        ChangeItem {
            op,
            path: Some(format!("/ratRestrictions/{}", index)),
            from: None,
            orig_value: None,
            new_value: Some(serde_json::Value::String(rat_type.as_str().to_string())),
        }
    }

    // ========================================================================
    // Release completion
    // ========================================================================

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        /// Teardown fires exactly once, on the first input that completes
        /// N1 + N2 + RELEASED, whatever the arrival order
        #[test]
        fn prop_release_fires_once(inputs in prop::collection::vec(arb_release_input(), 1..12)) {
            let mut ctx = AmfContext::new();
            let metrics = AmfMetrics::new();
            let ue = add_test_ue(&mut ctx, SUPI);
            let sess = add_test_sess(&mut ctx, ue, 5);

            let (mut n1, mut n2, mut status) = (false, false, ResourceStatus::Unknown);
            let mut expected = None;
            for (i, input) in inputs.iter().enumerate() {
                match input {
                    ReleaseInput::N1Released => n1 = true,
                    ReleaseInput::N2Released => n2 = true,
                    ReleaseInput::ResourceStatus(s) => status = *s,
                }
                if n1 && n2 && status == ResourceStatus::Released {
                    expected = Some(i);
                    break;
                }
            }

            let mut fired = Vec::new();
            for (i, input) in inputs.iter().enumerate() {
                if amf_sess_release_input(&mut ctx, &metrics, sess, *input) {
                    fired.push(i);
                }
            }

            prop_assert_eq!(fired, expected.into_iter().collect::<Vec<_>>());
            prop_assert_eq!(ctx.sess(sess).is_none(), expected.is_some());
        }
    }

    // ========================================================================
    // Idle deferral
    // ========================================================================

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(50))]

        /// An idle UE is always paged and the payload parked, never sent
        #[test]
        fn prop_idle_ue_is_paged(kind in arb_deferrable_kind(), psi in 1u8..16, with_n1 in any::<bool>()) {
            let mut ctx = AmfContext::new();
            let (mut ran, mut sbi, metrics) = (RecordingRan::default(), RecordingSbi::default(), AmfMetrics::new());
            let ue = add_test_ue(&mut ctx, SUPI);
            let sess = add_test_sess(&mut ctx, ue, psi);

            let n1buf = (with_n1 || kind == TransferKind::SessionModify)
                .then(|| Bytes::from_static(b"\x2e\x05\x01\xcb"));
            let outcome = {
                let mut peers = AmfPeers::new(&mut ran, &mut sbi, &metrics);
                amf_n1n2_message_transfer(
                    &mut ctx,
                    &mut peers,
                    TransferRequest {
                        sess_id: sess,
                        kind,
                        n1buf,
                        n2buf: Some(Bytes::from_static(b"\x00\x01\x02")),
                        skip_ind: false,
                        failure_notif_uri: Some("http://10.0.0.4:7777/nsmf-callback/v1/n1n2-failure".to_string()),
                    },
                )
                .unwrap()
            };

            prop_assert_eq!(outcome.status, StatusCode::ACCEPTED);
            prop_assert_eq!(outcome.cause, N1N2MessageTransferCause::AttemptingToReachUe);
            prop_assert_eq!(ctx.pending.get(ue).map(|record| record.sess_id), Some(sess));
            prop_assert!(ran.sent.iter().all(|m| matches!(m, NgapOutbound::Paging { .. })), "expected only Paging messages to be sent");
            prop_assert!(ctx.amf_ue(ue).unwrap().t3513_buf.is_some());
        }
    }

    // ========================================================================
    // Initial context setup flag
    // ========================================================================

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(50))]

        /// Only the first setup on a radio leg is an Initial Context Setup
        #[test]
        fn prop_initial_context_setup_once_per_leg(order in prop::collection::vec(0usize..3, 1..8)) {
            let mut ctx = AmfContext::new();
            let (mut ran, mut sbi, metrics) = (RecordingRan::default(), RecordingSbi::default(), AmfMetrics::new());
            let ue = add_test_ue(&mut ctx, SUPI);
            let sessions: Vec<u64> = (1..=3).map(|psi| add_test_sess(&mut ctx, ue, psi)).collect();
            connect_test_ue(&mut ctx, ue);

            {
                let mut peers = AmfPeers::new(&mut ran, &mut sbi, &metrics);
                for &i in &order {
                    amf_n1n2_message_transfer(
                        &mut ctx,
                        &mut peers,
                        TransferRequest {
                            sess_id: sessions[i],
                            kind: TransferKind::SessionSetup,
                            n1buf: None,
                            n2buf: Some(Bytes::from_static(b"\x00\x01\x02")),
                            skip_ind: false,
                            failure_notif_uri: None,
                        },
                    )
                    .unwrap();
                }
            }

            let codes: Vec<Option<u16>> = ran.sent.iter().map(procedure_code_of).collect();
            prop_assert_eq!(codes.len(), order.len());
            prop_assert_eq!(codes[0], Some(procedure_code::INITIAL_CONTEXT_SETUP));
            for code in &codes[1..] {
                prop_assert_eq!(*code, Some(procedure_code::PDU_SESSION_RESOURCE_SETUP));
            }
        }
    }

    // ========================================================================
    // RAT restriction index bounds
    // ========================================================================

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        /// ADD accepts 0..=len, REMOVE 0..len; a rejected item leaves the list untouched
        #[test]
        fn prop_rat_restriction_index_bounds(
            list in prop::collection::vec(arb_rat_type(), 0..5),
            index in 0usize..8,
            rat_type in arb_rat_type(),
            remove in any::<bool>(),
        ) {
            let mut cache = AmPolicyCache::new(list.clone(), Bitrate::default());
            let op = if remove { ChangeType::Remove } else { ChangeType::Add };
            let result = apply_change_item(&mut cache, &rat_item(op, index, rat_type));

            let in_bounds = if remove { index < list.len() } else { index <= list.len() };
            prop_assert_eq!(result.is_ok(), in_bounds);

            if !in_bounds {
                prop_assert_eq!(cache.rat_restrictions, list);
            } else if remove {
                let mut expected = list.clone();
                expected.remove(index);
                prop_assert_eq!(cache.rat_restrictions, expected);
            } else {
                let mut expected = list.clone();
                expected.insert(index, rat_type);
                prop_assert_eq!(cache.rat_restrictions, expected);
            }
        }
    }
}
