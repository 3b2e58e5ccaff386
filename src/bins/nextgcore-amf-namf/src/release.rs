//! PDU session release
//!
//! The radio leg (PDU Session Resource Release Response), the UE (PDU Session
//! Release Complete) and the SMF (SM context status notification) report
//! their part of a release independently and in any order. The session is
//! torn down once all three agree, and only once.

use crate::context::{AmfContext, ResourceStatus};
use crate::metrics::{AmfMetrics, GlobalMetric};

/// Input to the release check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseInput {
    /// SMF reported a resource status
    ResourceStatus(ResourceStatus),
    /// UE confirmed the release over N1
    N1Released,
    /// gNB confirmed the release over N2
    N2Released,
}

/// Record one release input and tear the session down if it completes the release
///
/// Returns `true` when this input removed the session.
pub fn amf_sess_release_input(
    ctx: &mut AmfContext,
    metrics: &AmfMetrics,
    sess_id: u64,
    input: ReleaseInput,
) -> bool {
    let Some(sess) = ctx.sess_mut(sess_id) else {
        log::warn!("[sess_id={}] Session already removed, {:?} ignored", sess_id, input);
        return false;
    };

    match input {
        ReleaseInput::ResourceStatus(status) => sess.resource_status = status,
        ReleaseInput::N1Released => sess.n1_released = true,
        ReleaseInput::N2Released => sess.n2_released = true,
    }

    log::info!(
        "[ue_id={}, psi={}][{}:{}:{:?}] Release input {:?}",
        sess.amf_ue_id,
        sess.psi,
        sess.n1_released,
        sess.n2_released,
        sess.resource_status,
        input
    );

    if !(sess.n1_released && sess.n2_released && sess.resource_status == ResourceStatus::Released) {
        return false;
    }

    amf_sess_release_teardown(ctx, metrics, sess_id)
}

/// Remove a released session
fn amf_sess_release_teardown(ctx: &mut AmfContext, metrics: &AmfMetrics, sess_id: u64) -> bool {
    let Some(sess) = ctx.sess_remove(sess_id) else {
        return false;
    };
    metrics.dec(GlobalMetric::AmfSession);

    let supi = ctx
        .amf_ue(sess.amf_ue_id)
        .map(|amf_ue| amf_ue.supi_str().to_string())
        .unwrap_or_default();
    log::info!("[{}:{}] SM context released", supi, sess.psi);
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (AmfContext, AmfMetrics, u64, u64) {
        let mut ctx = AmfContext::new();
        let metrics = AmfMetrics::new();
        let ue = ctx.amf_ue_add().unwrap();
        ctx.amf_ue_set_supi(ue, "imsi-001010000000001");
        let sess = ctx.sess_add(ue, 5).unwrap();
        metrics.inc(GlobalMetric::AmfSession);
        (ctx, metrics, ue, sess)
    }

    #[test]
    fn test_status_before_flags_is_not_lost() {
        let (mut ctx, metrics, _, sess) = setup();

        assert!(!amf_sess_release_input(
            &mut ctx,
            &metrics,
            sess,
            ReleaseInput::ResourceStatus(ResourceStatus::Released)
        ));
        assert!(!amf_sess_release_input(&mut ctx, &metrics, sess, ReleaseInput::N2Released));
        assert!(ctx.sess(sess).is_some());

        assert!(amf_sess_release_input(&mut ctx, &metrics, sess, ReleaseInput::N1Released));
        assert!(ctx.sess(sess).is_none());
        assert_eq!(metrics.get(GlobalMetric::AmfSession), 0);
    }

    #[test]
    fn test_other_status_does_not_release() {
        let (mut ctx, metrics, _, sess) = setup();

        amf_sess_release_input(&mut ctx, &metrics, sess, ReleaseInput::N1Released);
        amf_sess_release_input(&mut ctx, &metrics, sess, ReleaseInput::N2Released);
        assert!(!amf_sess_release_input(
            &mut ctx,
            &metrics,
            sess,
            ReleaseInput::ResourceStatus(ResourceStatus::Updated)
        ));
        assert!(ctx.sess(sess).is_some());
    }

    #[test]
    fn test_fires_once() {
        let (mut ctx, metrics, ue, sess) = setup();

        amf_sess_release_input(&mut ctx, &metrics, sess, ReleaseInput::N1Released);
        amf_sess_release_input(&mut ctx, &metrics, sess, ReleaseInput::N2Released);
        assert!(amf_sess_release_input(
            &mut ctx,
            &metrics,
            sess,
            ReleaseInput::ResourceStatus(ResourceStatus::Released)
        ));
        assert!(!amf_sess_release_input(
            &mut ctx,
            &metrics,
            sess,
            ReleaseInput::ResourceStatus(ResourceStatus::Released)
        ));
        assert!(ctx.amf_ue(ue).unwrap().sess_ids.is_empty());
    }
}
