//! NextGCore AMF Namf daemon
//!
//! Owns the AMF context in a single event loop and forwards outbound NGAP and
//! SBI traffic to the transport tasks.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tokio::sync::mpsc;

use nextgcore_amf_namf::config::AmfConfig;
use nextgcore_amf_namf::context::AmfContext;
use nextgcore_amf_namf::event::{AmfEvent, AmfEventLoop};
use nextgcore_amf_namf::metrics::AmfMetrics;
use nextgcore_amf_namf::ngap_path::{ChannelRanSender, NgapOutbound};
use nextgcore_amf_namf::sbi_path::{ChannelSbiSender, SbiRequest};

/// NextGCore AMF - Namf mobility and session orchestration
#[derive(Parser, Debug)]
#[command(name = "nextgcore-amf-namf")]
#[command(author = "NextGCore")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "5G Core AMF Namf_Communication service")]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "/etc/nextgcore/amf.yaml")]
    config: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Disable color output
    #[arg(long)]
    no_color: bool,
}

fn init_logging(args: &Args) {
    let log_level = match args.log_level.to_lowercase().as_str() {
        "trace" => log::LevelFilter::Trace,
        "debug" => log::LevelFilter::Debug,
        "info" => log::LevelFilter::Info,
        "warn" => log::LevelFilter::Warn,
        "error" => log::LevelFilter::Error,
        _ => log::LevelFilter::Info,
    };

    let write_style = if args.no_color {
        env_logger::WriteStyle::Never
    } else {
        env_logger::WriteStyle::Auto
    };

    env_logger::Builder::new()
        .filter_level(log_level)
        .write_style(write_style)
        .format_timestamp_millis()
        .init();
}

/// Drain the NGAP queue until the event loop drops its sender
async fn ngap_transport(mut rx: mpsc::UnboundedReceiver<NgapOutbound>) {
    while let Some(message) = rx.recv().await {
        match message {
            NgapOutbound::ToRanUe {
                gnb_id,
                amf_ue_ngap_id,
                ran_ue_ngap_id,
                pkbuf,
            } => log::debug!(
                "NGAP -> gNB[{}] AMF_UE_NGAP_ID[{}] RAN_UE_NGAP_ID[{}] {} bytes",
                gnb_id,
                amf_ue_ngap_id,
                ran_ue_ngap_id,
                pkbuf.len()
            ),
            NgapOutbound::Paging { amf_ue_id, pkbuf } => {
                log::debug!("NGAP Paging [ue_id={}] {} bytes", amf_ue_id, pkbuf.len())
            }
        }
    }
}

/// Drain the SBI client queue until the event loop drops its sender
async fn sbi_transport(mut rx: mpsc::UnboundedReceiver<SbiRequest>) {
    while let Some(request) = rx.recv().await {
        log::debug!("SBI -> {} {:?}", request.service_type().service_name(), request);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args);

    log::info!("NextGCore AMF Namf v{}", env!("CARGO_PKG_VERSION"));
    log::info!("Configuration: {}", args.config);

    let config = AmfConfig::load(&args.config)?;
    let ctx = AmfContext::from_config(&config);
    let metrics = Arc::new(AmfMetrics::new());

    let (ngap_tx, ngap_rx) = mpsc::unbounded_channel();
    let (sbi_tx, sbi_rx) = mpsc::unbounded_channel();
    let ngap_task = tokio::spawn(ngap_transport(ngap_rx));
    let sbi_task = tokio::spawn(sbi_transport(sbi_rx));

    let event_loop = AmfEventLoop::new(
        ctx,
        Box::new(ChannelRanSender::new(ngap_tx)),
        Box::new(ChannelSbiSender::new(sbi_tx)),
        Arc::clone(&metrics),
    );
    let event_tx = event_loop.sender();

    let running = Arc::new(AtomicBool::new(true));
    {
        let running = Arc::clone(&running);
        ctrlc::set_handler(move || {
            log::info!("Received shutdown signal");
            running.store(false, Ordering::SeqCst);
        })?;
    }
    tokio::spawn(async move {
        while running.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        if event_tx.send(AmfEvent::Shutdown).is_err() {
            log::warn!("Event loop already stopped");
        }
    });

    let ctx = event_loop.run().await;
    log::info!(
        "AMF stopped with {} UE(s), {} session(s)",
        ctx.amf_ue_count(),
        ctx.sess_count()
    );
    log::debug!("{}", metrics.export_prometheus());

    // The loop dropped its senders on return, so both queues drain and close
    ngap_task.await?;
    sbi_task.await?;

    log::info!("NextGCore AMF Namf terminated");
    Ok(())
}
