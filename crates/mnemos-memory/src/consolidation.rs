//! Consolidation gate and the background scheduler task.

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use parking_lot::Mutex;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use uuid::Uuid;

/// Whether a consolidation run is in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsolidationState {
    Idle,
    Consolidating,
}

/// What asked for a consolidation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsolidationTrigger {
    /// A fragment was just stored.
    Store,
    /// The periodic scheduler ticked.
    Background,
    /// An explicit `consolidate` call.
    Manual,
}

/// Result of a consolidation attempt that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsolidationOutcome {
    /// A new solution record was stored.
    Consolidated {
        solution_id: Uuid,
        fragment_count: usize,
    },
    /// Too few fragments to consolidate.
    NothingToDo { fragments: usize },
    /// Another run holds the gate.
    InFlight,
    /// The synthesis text was already stored under this id.
    Duplicate { existing_id: Uuid },
}

#[derive(Debug)]
struct GateState {
    state: ConsolidationState,
    last_attempt: Option<Instant>,
    last_attempt_at: Option<DateTime<Utc>>,
    runs: u64,
}

/// Single gate shared by every consolidation trigger.
///
/// At most one run is in flight. The returned [`ConsolidationPermit`] puts
/// the gate back to idle and stamps the attempt time when dropped, whatever
/// happened to the run.
#[derive(Debug, Clone)]
pub struct ConsolidationCoordinator {
    gate: Arc<Mutex<GateState>>,
}

impl Default for ConsolidationCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl ConsolidationCoordinator {
    pub fn new() -> Self {
        Self {
            gate: Arc::new(Mutex::new(GateState {
                state: ConsolidationState::Idle,
                last_attempt: None,
                last_attempt_at: None,
                runs: 0,
            })),
        }
    }

    /// Enter the gate for an automatic trigger.
    ///
    /// `fragment_count` runs inside the gate's critical section, so the count
    /// read, the cooldown check and the state change cannot interleave with a
    /// competing trigger.
    pub fn try_begin(
        &self,
        trigger: ConsolidationTrigger,
        threshold: usize,
        cooldown: Duration,
        fragment_count: impl FnOnce() -> usize,
    ) -> Option<ConsolidationPermit> {
        let mut gate = self.gate.lock();
        if gate.state == ConsolidationState::Consolidating {
            debug!("consolidation already in flight (trigger={trigger:?})");
            return None;
        }
        let fragments = fragment_count();
        if fragments < threshold {
            return None;
        }
        if let Some(last) = gate.last_attempt
            && last.elapsed() < cooldown
        {
            debug!(
                "consolidation cooling down (trigger={:?}, fragments={}, remaining={:?})",
                trigger,
                fragments,
                cooldown.saturating_sub(last.elapsed())
            );
            return None;
        }
        gate.state = ConsolidationState::Consolidating;
        info!(
            "consolidation triggered (trigger={:?}, fragments={})",
            trigger, fragments
        );
        Some(self.permit(trigger))
    }

    /// Enter the gate for a manual run; ignores threshold and cooldown.
    pub fn begin_manual(&self) -> Option<ConsolidationPermit> {
        let mut gate = self.gate.lock();
        if gate.state == ConsolidationState::Consolidating {
            return None;
        }
        gate.state = ConsolidationState::Consolidating;
        Some(self.permit(ConsolidationTrigger::Manual))
    }

    pub fn state(&self) -> ConsolidationState {
        self.gate.lock().state
    }

    /// Wall-clock time the last attempt finished.
    pub fn last_attempt(&self) -> Option<DateTime<Utc>> {
        self.gate.lock().last_attempt_at
    }

    /// Runs that stored a new solution.
    pub fn runs(&self) -> u64 {
        self.gate.lock().runs
    }

    fn permit(&self, trigger: ConsolidationTrigger) -> ConsolidationPermit {
        ConsolidationPermit {
            gate: self.gate.clone(),
            trigger,
            consolidated: false,
        }
    }
}

/// Proof that the holder owns the consolidation gate.
#[derive(Debug)]
pub struct ConsolidationPermit {
    gate: Arc<Mutex<GateState>>,
    trigger: ConsolidationTrigger,
    consolidated: bool,
}

impl ConsolidationPermit {
    pub fn trigger(&self) -> ConsolidationTrigger {
        self.trigger
    }

    /// Count this run as having produced a solution.
    pub fn mark_consolidated(&mut self) {
        self.consolidated = true;
    }
}

impl Drop for ConsolidationPermit {
    fn drop(&mut self) {
        let mut gate = self.gate.lock();
        gate.state = ConsolidationState::Idle;
        gate.last_attempt = Some(Instant::now());
        gate.last_attempt_at = Some(Utc::now());
        if self.consolidated {
            gate.runs += 1;
        }
    }
}

/// Handle to a running periodic task.
#[derive(Debug)]
pub(crate) struct BackgroundTask {
    stop: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl BackgroundTask {
    /// Run `tick` every `period` until stopped or until `tick` returns false.
    /// The first tick fires one full period after spawning.
    pub(crate) fn spawn<F, Fut>(name: String, period: Duration, mut tick: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = bool> + Send + 'static,
    {
        let (stop, mut stopped) = watch::channel(false);
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!("background consolidation started (namespace={name}, interval={period:?})");
            loop {
                tokio::select! {
                    _ = stopped.changed() => break,
                    _ = interval.tick() => {
                        if !tick().await {
                            break;
                        }
                    }
                }
            }
            info!("background consolidation stopped (namespace={name})");
        });
        Self { stop, handle }
    }

    pub(crate) fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }

    /// Signal the task and wait up to `timeout` for it, aborting it afterwards.
    pub(crate) async fn stop(self, timeout: Duration) {
        let _ = self.stop.send(true);
        let mut handle = self.handle;
        if tokio::time::timeout(timeout, &mut handle).await.is_err() {
            warn!("background consolidation did not stop in {timeout:?}, aborting");
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{BackgroundTask, ConsolidationCoordinator, ConsolidationState, ConsolidationTrigger};
    use pretty_assertions::assert_eq;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    const STORE: ConsolidationTrigger = ConsolidationTrigger::Store;

    #[test]
    fn threshold_gates_automatic_runs() {
        let coordinator = ConsolidationCoordinator::new();
        assert!(coordinator.try_begin(STORE, 10, Duration::ZERO, || 9).is_none());
        let permit = coordinator.try_begin(STORE, 10, Duration::ZERO, || 10);
        assert!(permit.is_some());
        assert_eq!(coordinator.state(), ConsolidationState::Consolidating);
    }

    #[test]
    fn only_one_permit_at_a_time() {
        let coordinator = ConsolidationCoordinator::new();
        let permit = coordinator.begin_manual().expect("permit");
        assert!(coordinator.begin_manual().is_none());
        assert!(coordinator.try_begin(STORE, 0, Duration::ZERO, || 5).is_none());
        drop(permit);
        assert_eq!(coordinator.state(), ConsolidationState::Idle);
        assert!(coordinator.last_attempt().is_some());
        assert!(coordinator.begin_manual().is_some());
    }

    #[test]
    fn cooldown_blocks_until_elapsed() {
        let coordinator = ConsolidationCoordinator::new();
        drop(coordinator.try_begin(STORE, 1, Duration::from_secs(600), || 3));
        assert!(
            coordinator
                .try_begin(STORE, 1, Duration::from_secs(600), || 3)
                .is_none()
        );
        assert!(coordinator.try_begin(STORE, 1, Duration::ZERO, || 3).is_some());
    }

    #[test]
    fn runs_count_only_marked_permits() {
        let coordinator = ConsolidationCoordinator::new();
        drop(coordinator.begin_manual());
        let mut permit = coordinator.begin_manual().expect("permit");
        permit.mark_consolidated();
        drop(permit);
        assert_eq!(coordinator.runs(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn background_task_ticks_and_stops() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = ticks.clone();
        let task = BackgroundTask::spawn("test".to_string(), Duration::from_secs(10), move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                true
            }
        });
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 0);
        tokio::time::sleep(Duration::from_secs(21)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 2);
        assert!(task.is_running());
        task.stop(Duration::from_secs(5)).await;
    }
}
