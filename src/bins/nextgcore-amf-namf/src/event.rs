//! AMF Event Loop
//!
//! A single task owns the [`AmfContext`] and processes every inbound event to
//! completion before taking the next one, so per-UE state never interleaves.
//! Timers are armed by spawning sleeps that post [`AmfEvent::Timer`] back
//! into the same queue.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};

use crate::context::{AmfContext, RatType};
use crate::deregistration;
use crate::metrics::{AmfMetrics, GlobalMetric};
use crate::models::{NamfRequest, NamfResponse};
use crate::namf_handler;
use crate::nas_path;
use crate::ngap_path::RanSender;
use crate::paging;
use crate::release::{self, ReleaseInput};
use crate::sbi_path::SbiSender;
use crate::timer::AmfTimerId;

/// Outbound collaborators handed to every procedure
pub struct AmfPeers<'a> {
    /// Radio-signalling transport
    pub ran: &'a mut dyn RanSender,
    /// Service-interface transport
    pub sbi: &'a mut dyn SbiSender,
    /// Metrics sink
    pub metrics: &'a AmfMetrics,
}

impl<'a> AmfPeers<'a> {
    pub fn new(
        ran: &'a mut dyn RanSender,
        sbi: &'a mut dyn SbiSender,
        metrics: &'a AmfMetrics,
    ) -> Self {
        Self { ran, sbi, metrics }
    }
}

/// Event processed by the AMF event loop
#[derive(Debug)]
pub enum AmfEvent {
    /// Inbound Namf request
    Sbi {
        request: NamfRequest,
        responder: Option<oneshot::Sender<NamfResponse>>,
    },
    /// UE timer expiry
    Timer {
        timer_id: AmfTimerId,
        amf_ue_id: u64,
        generation: u64,
    },
    /// The UE established an NG signalling connection
    RanUeConnected {
        amf_ue_id: u64,
        gnb_id: u64,
        ran_ue_ngap_id: u64,
        rat_type: RatType,
    },
    /// The UE's NG signalling connection was released
    RanUeReleased { amf_ue_id: u64 },
    /// Initial Context Setup Response received
    ContextSetupEstablished { amf_ue_id: u64 },
    /// Nsmf_PDUSession_CreateSMContext answered
    SmContextCreated {
        amf_ue_id: u64,
        psi: u8,
        resource_uri: String,
        sm_context_ref: String,
    },
    /// PDU Session Release Complete received
    N1Released { amf_ue_id: u64, psi: u8 },
    /// PDU Session Resource Release Response received
    N2Released { amf_ue_id: u64, psi: u8 },
    /// Stop the loop
    Shutdown,
}

impl AmfEvent {
    /// Get the name of the event
    pub fn name(&self) -> &'static str {
        match self {
            AmfEvent::Sbi { .. } => "AMF_EVENT_SBI_SERVER",
            AmfEvent::Timer { .. } => "AMF_EVENT_5GMM_TIMER",
            AmfEvent::RanUeConnected { .. } => "AMF_EVENT_RAN_UE_CONNECTED",
            AmfEvent::RanUeReleased { .. } => "AMF_EVENT_RAN_UE_RELEASED",
            AmfEvent::ContextSetupEstablished { .. } => "AMF_EVENT_CONTEXT_SETUP_ESTABLISHED",
            AmfEvent::SmContextCreated { .. } => "AMF_EVENT_SM_CONTEXT_CREATED",
            AmfEvent::N1Released { .. } => "AMF_EVENT_N1_RELEASED",
            AmfEvent::N2Released { .. } => "AMF_EVENT_N2_RELEASED",
            AmfEvent::Shutdown => "AMF_EVENT_SHUTDOWN",
        }
    }
}

/// AMF event loop
pub struct AmfEventLoop {
    ctx: AmfContext,
    ran: Box<dyn RanSender + Send>,
    sbi: Box<dyn SbiSender + Send>,
    metrics: Arc<AmfMetrics>,
    tx: mpsc::UnboundedSender<AmfEvent>,
    rx: mpsc::UnboundedReceiver<AmfEvent>,
}

impl AmfEventLoop {
    pub fn new(
        ctx: AmfContext,
        ran: Box<dyn RanSender + Send>,
        sbi: Box<dyn SbiSender + Send>,
        metrics: Arc<AmfMetrics>,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            ctx,
            ran,
            sbi,
            metrics,
            tx,
            rx,
        }
    }

    /// Handle for posting events into the loop
    pub fn sender(&self) -> mpsc::UnboundedSender<AmfEvent> {
        self.tx.clone()
    }

    pub fn context(&self) -> &AmfContext {
        &self.ctx
    }

    pub fn context_mut(&mut self) -> &mut AmfContext {
        &mut self.ctx
    }

    /// Process events until [`AmfEvent::Shutdown`]
    pub async fn run(mut self) -> AmfContext {
        log::info!("AMF event loop started");
        while let Some(event) = self.rx.recv().await {
            if !self.handle_event(event) {
                break;
            }
            self.arm_timers();
        }
        log::info!("AMF event loop stopped");
        self.ctx
    }

    /// Process one event. Returns `false` once the loop should stop.
    pub fn handle_event(&mut self, event: AmfEvent) -> bool {
        log::trace!("{}", event.name());

        let ctx = &mut self.ctx;
        let mut peers = AmfPeers {
            ran: self.ran.as_mut(),
            sbi: self.sbi.as_mut(),
            metrics: &self.metrics,
        };

        match event {
            AmfEvent::Sbi { request, responder } => {
                let response = namf_handler::amf_namf_handle(ctx, &mut peers, request);
                if let Some(responder) = responder {
                    if responder.send(response).is_err() {
                        log::warn!("SBI response stream closed");
                    }
                }
            }
            AmfEvent::Timer {
                timer_id,
                amf_ue_id,
                generation,
            } => {
                let result = match timer_id {
                    AmfTimerId::T3513 => {
                        paging::amf_paging_timeout(ctx, &mut peers, amf_ue_id, generation)
                    }
                    AmfTimerId::T3522 => {
                        deregistration::amf_t3522_expiry(ctx, &mut peers, amf_ue_id, generation)
                    }
                };
                if let Err(e) = result {
                    log::error!("[ue_id={}] {} expiry failed: {}", amf_ue_id, timer_id.name(), e);
                }
            }
            AmfEvent::RanUeConnected {
                amf_ue_id,
                gnb_id,
                ran_ue_ngap_id,
                rat_type,
            } => amf_ue_connected(ctx, &mut peers, amf_ue_id, gnb_id, ran_ue_ngap_id, rat_type),
            AmfEvent::RanUeReleased { amf_ue_id } => {
                if let Some(ran_ue_id) = ctx.ran_ue_of(amf_ue_id).map(|ran_ue| ran_ue.id) {
                    ctx.amf_ue_deassociate_ran_ue(amf_ue_id);
                    ctx.ran_ue_remove(ran_ue_id);
                    peers.metrics.dec(GlobalMetric::RanUe);
                }
            }
            AmfEvent::ContextSetupEstablished { amf_ue_id } => {
                amf_ue_context_setup_established(ctx, &mut peers, amf_ue_id)
            }
            AmfEvent::SmContextCreated {
                amf_ue_id,
                psi,
                resource_uri,
                sm_context_ref,
            } => {
                let Some(sess_id) = ctx.sess_find_by_psi(amf_ue_id, psi) else {
                    log::warn!("[ue_id={}, psi={}] No session for SM context", amf_ue_id, psi);
                    return true;
                };
                if let Some(sess) = ctx.sess_mut(sess_id) {
                    sess.store_session_context(&resource_uri, &sm_context_ref);
                }
                if let Err(e) = nas_path::nas_send_held_establishment_accept(ctx, peers.ran, sess_id) {
                    log::error!("[ue_id={}, psi={}] {}", amf_ue_id, psi, e);
                }
            }
            AmfEvent::N1Released { amf_ue_id, psi } => {
                if let Some(sess_id) = ctx.sess_find_by_psi(amf_ue_id, psi) {
                    release::amf_sess_release_input(ctx, peers.metrics, sess_id, ReleaseInput::N1Released);
                }
            }
            AmfEvent::N2Released { amf_ue_id, psi } => {
                if let Some(sess_id) = ctx.sess_find_by_psi(amf_ue_id, psi) {
                    release::amf_sess_release_input(ctx, peers.metrics, sess_id, ReleaseInput::N2Released);
                }
            }
            AmfEvent::Shutdown => return false,
        }
        true
    }

    fn arm_timers(&mut self) {
        for timer in self.ctx.timers.take_scheduled() {
            let tx = self.tx.clone();
            tokio::spawn(async move {
                tokio::time::sleep(timer.duration).await;
                let _ = tx.send(AmfEvent::Timer {
                    timer_id: timer.timer_id,
                    amf_ue_id: timer.amf_ue_id,
                    generation: timer.generation,
                });
            });
        }
    }
}

fn amf_ue_connected(
    ctx: &mut AmfContext,
    peers: &mut AmfPeers<'_>,
    amf_ue_id: u64,
    gnb_id: u64,
    ran_ue_ngap_id: u64,
    rat_type: RatType,
) {
    if ctx.amf_ue(amf_ue_id).is_none() {
        log::warn!("[ue_id={}] Unknown UE", amf_ue_id);
        return;
    }
    let Some(ran_ue_id) = ctx.ran_ue_add(gnb_id, ran_ue_ngap_id) else {
        return;
    };
    if let Some(old_ran_ue_id) = ctx.ran_ue_of(amf_ue_id).map(|ran_ue| ran_ue.id) {
        log::warn!("[ue_id={}] Implicit NG release", amf_ue_id);
        ctx.ran_ue_remove(old_ran_ue_id);
        peers.metrics.dec(GlobalMetric::RanUe);
    }
    if let Some(ran_ue) = ctx.ran_ue_mut(ran_ue_id) {
        ran_ue.rat_type = rat_type;
    }
    ctx.amf_ue_associate_ran_ue(amf_ue_id, ran_ue_id);
    peers.metrics.inc(GlobalMetric::RanUe);

    if let Err(e) = paging::amf_paging_success(ctx, peers, amf_ue_id) {
        log::error!("[ue_id={}] Paging completion failed: {}", amf_ue_id, e);
    }
}

pub(crate) fn amf_ue_context_setup_established(ctx: &mut AmfContext, peers: &mut AmfPeers<'_>, amf_ue_id: u64) {
    let Some(ran_ue_id) = ctx.ran_ue_of(amf_ue_id).map(|ran_ue| ran_ue.id) else {
        log::warn!("[ue_id={}] NG context has already been removed", amf_ue_id);
        return;
    };
    if let Some(ran_ue) = ctx.ran_ue_mut(ran_ue_id) {
        ran_ue.initial_context_setup_response_received = true;
    }
    if !ctx.context_setup_established(amf_ue_id) {
        return;
    }

    let sess_ids = ctx
        .amf_ue(amf_ue_id)
        .map(|amf_ue| amf_ue.sess_ids.clone())
        .unwrap_or_default();
    for sess_id in sess_ids {
        if let Err(e) = nas_path::nas_send_stored_5gsm_message(ctx, peers.ran, sess_id) {
            log::error!("[ue_id={}] Stored 5GSM message not sent: {}", amf_ue_id, e);
        }
    }
}
