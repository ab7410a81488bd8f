//! ==============================================================================
//! scheduler.rs - periodic snapshot refresh
//! ==============================================================================
//!
//! purpose:
//!     explicit STOPPED / RUNNING state machine around a tokio interval. each
//!     tick asks the controller for a full pull; the controller drops the tick
//!     if a pull is still outstanding, so slow networks never build a backlog.
//!
//! cancellation:
//!     stop() aborts the timer task only. a pull already spawned by a tick is a
//!     separate task and still resolves and applies its result.
//!
//! relationships:
//!     - drives: controller.rs (Controller::refresh with RefreshTrigger::Tick)
//!     - toggled by: console.rs (auto-refresh button), main.rs (startup)
//!
//! ==============================================================================

use crate::activity::Severity;
use crate::controller::{Controller, RefreshOutcome, RefreshTrigger};

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Stopped,
    Running,
}

#[derive(Clone)]
pub struct RefreshScheduler {
    controller: Controller,
    interval: Duration,
    timer: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl RefreshScheduler {
    pub fn new(controller: Controller, interval: Duration) -> Self {
        Self {
            controller,
            interval: interval.max(Duration::from_millis(1)),
            timer: Arc::new(Mutex::new(None)),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub async fn state(&self) -> SchedulerState {
        match self.timer.lock().await.as_ref() {
            Some(_) => SchedulerState::Running,
            None => SchedulerState::Stopped,
        }
    }

    pub async fn is_running(&self) -> bool {
        self.state().await == SchedulerState::Running
    }

    /// STOPPED -> RUNNING; no-op when already running
    pub async fn start(&self) {
        let mut timer = self.timer.lock().await;
        if timer.is_some() {
            return;
        }

        let controller = self.controller.clone();
        let period = self.interval;
        *timer = Some(tokio::spawn(async move {
            // first tick one period from now; the initial load already happened
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                spawn_pull(&controller);
            }
        }));
        drop(timer);

        tracing::info!("auto-refresh started ({}s interval)", self.interval.as_secs());
        self.controller
            .note(
                Severity::Info,
                format!("Auto-refresh started ({} second interval)", self.interval.as_secs()),
            )
            .await;
    }

    /// RUNNING -> STOPPED; outstanding pulls still complete
    pub async fn stop(&self) {
        let Some(handle) = self.timer.lock().await.take() else {
            return;
        };
        handle.abort();

        tracing::info!("auto-refresh stopped");
        self.controller.note(Severity::Info, "Auto-refresh stopped").await;
    }

    /// flip state, returns whether auto-refresh is now running
    pub async fn toggle(&self) -> bool {
        if self.is_running().await {
            self.stop().await;
            false
        } else {
            self.start().await;
            true
        }
    }

    /// one timer tick: spawn a pull detached from the timer task
    #[cfg(test)]
    pub fn tick(&self) -> JoinHandle<RefreshOutcome> {
        spawn_pull(&self.controller)
    }
}

fn spawn_pull(controller: &Controller) -> JoinHandle<RefreshOutcome> {
    let controller = controller.clone();
    tokio::spawn(async move { controller.refresh(RefreshTrigger::Tick).await })
}
