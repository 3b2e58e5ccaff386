//! AMF Timer Management
//!
//! Per-UE GMM timers. The manager only does the bookkeeping: every start or
//! retry queues a [`ScheduledTimer`] that the event loop turns into a tokio
//! sleep, and the expiry comes back through [`TimerManager::expire`] tagged
//! with the generation it was scheduled under. Expiries of stopped or
//! restarted timers are stale and ignored.

use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AmfTimerId {
    /// Guards a paging attempt
    T3513,
    /// Guards a network-initiated deregistration request
    T3522,
}

impl AmfTimerId {
    pub fn name(&self) -> &'static str {
        match self {
            Self::T3513 => "AMF_TIMER_T3513",
            Self::T3522 => "AMF_TIMER_T3522",
        }
    }
}

// ============================================================================
// Timer Configuration
// ============================================================================

/// Duration and retransmission budget of one timer; a disabled timer never starts
#[derive(Debug, Clone, Default)]
pub struct TimerConfig {
    pub enabled: bool,
    pub max_count: u32,
    pub duration: Duration,
}

impl TimerConfig {
    pub fn new(max_count: u32, duration_secs: u64) -> Self {
        Self {
            enabled: true,
            max_count,
            duration: Duration::from_secs(duration_secs),
        }
    }
}

/// Paging and deregistration timer settings
#[derive(Debug, Clone)]
pub struct AmfTimerConfigs {
    pub t3513: TimerConfig,
    pub t3522: TimerConfig,
}

impl Default for AmfTimerConfigs {
    fn default() -> Self {
        Self {
            t3513: TimerConfig::new(2, 2),
            t3522: TimerConfig::new(4, 3),
        }
    }
}

impl AmfTimerConfigs {
    pub fn get(&self, timer_id: AmfTimerId) -> &TimerConfig {
        match timer_id {
            AmfTimerId::T3513 => &self.t3513,
            AmfTimerId::T3522 => &self.t3522,
        }
    }
}

#[derive(Debug, Clone)]
struct RunningTimer {
    timer_id: AmfTimerId,
    amf_ue_id: u64,
    retry_count: u32,
    /// Only an expiry carrying this generation counts
    generation: u64,
}

/// Timer that the event loop has to arm
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledTimer {
    pub timer_id: AmfTimerId,
    pub amf_ue_id: u64,
    pub generation: u64,
    pub duration: Duration,
}

/// Outcome of a timer expiry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerExpiry {
    /// Timer re-armed, retransmission number `n` is due
    Retry(u32),
    /// Maximum retries reached, timer stopped
    Exhausted,
}

// ============================================================================
// Timer Manager
// ============================================================================

/// Bookkeeping for every running UE timer
#[derive(Debug, Default)]
pub struct TimerManager {
    pub configs: AmfTimerConfigs,
    active_timers: Vec<RunningTimer>,
    scheduled: Vec<ScheduledTimer>,
    next_generation: u64,
}

impl TimerManager {
    pub fn new() -> Self {
        Self::with_configs(AmfTimerConfigs::default())
    }

    pub fn with_configs(configs: AmfTimerConfigs) -> Self {
        Self {
            configs,
            active_timers: Vec::new(),
            scheduled: Vec::new(),
            next_generation: 1,
        }
    }

    fn schedule(&mut self, timer_id: AmfTimerId, amf_ue_id: u64) -> u64 {
        let generation = self.next_generation;
        self.next_generation += 1;
        self.scheduled.push(ScheduledTimer {
            timer_id,
            amf_ue_id,
            generation,
            duration: self.configs.get(timer_id).duration,
        });
        generation
    }

    /// Restarting resets the retry count and invalidates the pending expiry
    pub fn start_ue_timer(&mut self, timer_id: AmfTimerId, amf_ue_id: u64) -> bool {
        let config = self.configs.get(timer_id);
        if !config.enabled {
            log::warn!("[{}] {} not configured, not started", amf_ue_id, timer_id.name());
            return false;
        }
        let duration = config.duration;

        self.active_timers
            .retain(|t| !(t.timer_id == timer_id && t.amf_ue_id == amf_ue_id));
        let generation = self.schedule(timer_id, amf_ue_id);
        self.active_timers.push(RunningTimer {
            timer_id,
            amf_ue_id,
            retry_count: 0,
            generation,
        });

        log::debug!("[{}] {} armed for {:?}", amf_ue_id, timer_id.name(), duration);
        true
    }

    pub fn stop_ue_timer(&mut self, timer_id: AmfTimerId, amf_ue_id: u64) {
        let before = self.active_timers.len();
        self.active_timers
            .retain(|t| !(t.timer_id == timer_id && t.amf_ue_id == amf_ue_id));
        if self.active_timers.len() != before {
            log::debug!("[{}] {} stopped", amf_ue_id, timer_id.name());
        }
    }

    /// Used when the UE context goes away
    pub fn stop_all_ue_timers(&mut self, amf_ue_id: u64) {
        self.active_timers.retain(|t| t.amf_ue_id != amf_ue_id);
        log::debug!("[{amf_ue_id}] All timers stopped");
    }

    /// Check whether a timer is running for UE
    pub fn is_running(&self, timer_id: AmfTimerId, amf_ue_id: u64) -> bool {
        self.active_timers
            .iter()
            .any(|t| t.timer_id == timer_id && t.amf_ue_id == amf_ue_id)
    }

    /// Handle an expiry delivered by the event loop
    ///
    /// Returns `None` for stale expiries.
    pub fn expire(
        &mut self,
        timer_id: AmfTimerId,
        amf_ue_id: u64,
        generation: u64,
    ) -> Option<TimerExpiry> {
        let max_count = self.configs.get(timer_id).max_count;
        let pos = self.active_timers.iter().position(|t| {
            t.timer_id == timer_id && t.amf_ue_id == amf_ue_id && t.generation == generation
        })?;

        if self.active_timers[pos].retry_count >= max_count {
            self.active_timers.remove(pos);
            log::debug!("[{}] {} retransmissions exhausted", amf_ue_id, timer_id.name());
            return Some(TimerExpiry::Exhausted);
        }

        let generation = self.schedule(timer_id, amf_ue_id);
        let timer = &mut self.active_timers[pos];
        timer.retry_count += 1;
        timer.generation = generation;
        Some(TimerExpiry::Retry(timer.retry_count))
    }

    /// Timers queued since the last call, for the event loop to arm
    pub fn take_scheduled(&mut self) -> Vec<ScheduledTimer> {
        std::mem::take(&mut self.scheduled)
    }

    pub fn active_timer_count(&self) -> usize {
        self.active_timers.len()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paging_and_dereg_defaults() {
        let configs = AmfTimerConfigs::default();
        assert_eq!(configs.t3513.max_count, 2);
        assert_eq!(configs.t3513.duration, Duration::from_secs(2));
        assert_eq!(configs.t3522.max_count, 4);
        assert_eq!(configs.t3522.duration, Duration::from_secs(3));
    }

    #[test]
    fn test_disabled_timer_does_not_start() {
        let mut configs = AmfTimerConfigs::default();
        configs.t3522 = TimerConfig::default();
        let mut manager = TimerManager::with_configs(configs);
        assert!(!manager.start_ue_timer(AmfTimerId::T3522, 1));
        assert!(manager.take_scheduled().is_empty());
    }

    #[test]
    fn test_timer_manager_start_stop() {
        let mut manager = TimerManager::new();

        assert!(manager.start_ue_timer(AmfTimerId::T3513, 100));
        assert_eq!(manager.active_timer_count(), 1);
        assert!(manager.is_running(AmfTimerId::T3513, 100));

        manager.stop_ue_timer(AmfTimerId::T3513, 100);
        assert_eq!(manager.active_timer_count(), 0);
    }

    #[test]
    fn test_timer_manager_restart_replaces() {
        let mut manager = TimerManager::new();
        manager.start_ue_timer(AmfTimerId::T3513, 100);
        manager.start_ue_timer(AmfTimerId::T3513, 100);
        assert_eq!(manager.active_timer_count(), 1);
        assert_eq!(manager.take_scheduled().len(), 2);
    }

    #[test]
    fn test_timer_manager_stop_all() {
        let mut manager = TimerManager::new();

        manager.start_ue_timer(AmfTimerId::T3513, 100);
        manager.start_ue_timer(AmfTimerId::T3522, 100);
        manager.start_ue_timer(AmfTimerId::T3513, 200);
        assert_eq!(manager.active_timer_count(), 3);

        manager.stop_all_ue_timers(100);
        assert_eq!(manager.active_timer_count(), 1);
    }

    #[test]
    fn test_timer_expiry_retries_then_exhausts() {
        let mut manager = TimerManager::new();
        manager.start_ue_timer(AmfTimerId::T3513, 7);

        let mut scheduled = manager.take_scheduled();
        assert_eq!(scheduled.len(), 1);

        for n in 1..=2 {
            let gen = scheduled[0].generation;
            assert_eq!(manager.expire(AmfTimerId::T3513, 7, gen), Some(TimerExpiry::Retry(n)));
            scheduled = manager.take_scheduled();
            assert_eq!(scheduled.len(), 1);
        }

        let gen = scheduled[0].generation;
        assert_eq!(manager.expire(AmfTimerId::T3513, 7, gen), Some(TimerExpiry::Exhausted));
        assert!(!manager.is_running(AmfTimerId::T3513, 7));
    }

    #[test]
    fn test_stale_expiry_ignored() {
        let mut manager = TimerManager::new();
        manager.start_ue_timer(AmfTimerId::T3513, 7);
        let gen = manager.take_scheduled()[0].generation;

        manager.stop_ue_timer(AmfTimerId::T3513, 7);
        assert_eq!(manager.expire(AmfTimerId::T3513, 7, gen), None);

        manager.start_ue_timer(AmfTimerId::T3513, 7);
        assert_eq!(manager.expire(AmfTimerId::T3513, 7, gen), None);
    }
}
