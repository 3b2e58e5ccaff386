//! AMF Metrics
//!
//! Fire-and-forget counters and gauges for the Namf procedures. Updates
//! never fail and never block the caller.

use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};

/// Metrics the Namf procedures touch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GlobalMetric {
    /// Gauge: UEs with an NG radio leg
    RanUe,
    /// Gauge: PDU sessions held by the AMF
    AmfSession,
    /// Counter: paging procedures started
    MmPaging5gReq,
    /// Counter: paging procedures answered by the UE
    MmPaging5gSucc,
}

impl GlobalMetric {
    const ALL: [GlobalMetric; 4] = [
        GlobalMetric::RanUe,
        GlobalMetric::AmfSession,
        GlobalMetric::MmPaging5gReq,
        GlobalMetric::MmPaging5gSucc,
    ];

    fn slot(self) -> usize {
        self as usize
    }

    /// Exported metric name
    pub fn name(&self) -> &'static str {
        match self {
            Self::RanUe => "ran_ue",
            Self::AmfSession => "amf_session",
            Self::MmPaging5gReq => "fivegs_amffunction_mm_paging5greq",
            Self::MmPaging5gSucc => "fivegs_amffunction_mm_paging5gsucc",
        }
    }

    fn help(&self) -> &'static str {
        match self {
            Self::RanUe => "RAN UEs",
            Self::AmfSession => "AMF Sessions",
            Self::MmPaging5gReq => "Number of 5G paging procedures initiated at the AMF",
            Self::MmPaging5gSucc => "Number of successful 5G paging procedures initiated at the AMF",
        }
    }

    pub fn is_gauge(&self) -> bool {
        matches!(self, Self::RanUe | Self::AmfSession)
    }
}

/// Shared metric store, one atomic slot per [`GlobalMetric`]
#[derive(Default)]
pub struct AmfMetrics {
    values: [AtomicU64; GlobalMetric::ALL.len()],
}

impl std::fmt::Debug for AmfMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map()
            .entries(GlobalMetric::ALL.iter().map(|m| (m.name(), self.get(*m))))
            .finish()
    }
}

impl AmfMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc(&self, metric: GlobalMetric) {
        self.values[metric.slot()].fetch_add(1, Ordering::Relaxed);
    }

    /// Gauges never go below zero
    pub fn dec(&self, metric: GlobalMetric) {
        let _ = self.values[metric.slot()].fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| {
            Some(v.saturating_sub(1))
        });
    }

    pub fn set(&self, metric: GlobalMetric, value: u64) {
        self.values[metric.slot()].store(value, Ordering::Relaxed);
    }

    pub fn get(&self, metric: GlobalMetric) -> u64 {
        self.values[metric.slot()].load(Ordering::Relaxed)
    }

    /// Prometheus text exposition of every metric
    pub fn export_prometheus(&self) -> String {
        let mut out = String::new();
        for metric in GlobalMetric::ALL {
            let kind = if metric.is_gauge() { "gauge" } else { "counter" };
            let _ = writeln!(out, "# HELP {} {}", metric.name(), metric.help());
            let _ = writeln!(out, "# TYPE {} {}", metric.name(), kind);
            let _ = writeln!(out, "{} {}", metric.name(), self.get(metric));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_gauge_saturates() {
        let metrics = AmfMetrics::new();
        metrics.inc(GlobalMetric::AmfSession);
        metrics.inc(GlobalMetric::AmfSession);
        metrics.dec(GlobalMetric::AmfSession);
        assert_eq!(metrics.get(GlobalMetric::AmfSession), 1);

        metrics.dec(GlobalMetric::AmfSession);
        metrics.dec(GlobalMetric::AmfSession);
        assert_eq!(metrics.get(GlobalMetric::AmfSession), 0);
    }

    #[test]
    fn test_metrics_are_independent() {
        let metrics = AmfMetrics::new();
        metrics.set(GlobalMetric::RanUe, 3);
        metrics.inc(GlobalMetric::MmPaging5gReq);
        assert_eq!(metrics.get(GlobalMetric::RanUe), 3);
        assert_eq!(metrics.get(GlobalMetric::MmPaging5gReq), 1);
        assert_eq!(metrics.get(GlobalMetric::MmPaging5gSucc), 0);
        assert_eq!(metrics.get(GlobalMetric::AmfSession), 0);
    }

    #[test]
    fn test_export_prometheus() {
        let metrics = AmfMetrics::new();
        metrics.inc(GlobalMetric::MmPaging5gReq);

        let output = metrics.export_prometheus();
        assert!(output.contains("# TYPE fivegs_amffunction_mm_paging5greq counter"));
        assert!(output.contains("fivegs_amffunction_mm_paging5greq 1\n"));
        assert!(output.contains("# TYPE ran_ue gauge"));
        assert!(output.contains("amf_session 0\n"));
    }
}
