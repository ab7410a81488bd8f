//! ==============================================================================
//! controller.rs - pin-state reconciliation and optimistic edits
//! ==============================================================================
//!
//! purpose:
//!     owns the two independent stores (snapshot, pending edits) plus the
//!     operator feedback (activity log, banner), and drives the three paths:
//!
//!         read path:   refresh pull -> snapshot.replace_all -> views
//!         edit path:   operator edit -> pending edits -> views
//!         commit path: configure/write/read -> service -> snapshot.update_one
//!                      (+ pending edit cleared on configure success)
//!
//! invariants:
//!     - a refresh never touches pending edits. only a successful configure or
//!       an operator revert removes one.
//!     - a pull that went out before an action result was merged never
//!       overwrites that pin: both orderings converge on the action's result.
//!     - pins that are not controllable never accept edits or actions, and no
//!       request is sent for them.
//!     - results are applied under a single write-lock acquisition taken after
//!       the network leg, so nothing observes a half-applied result. no lock is
//!       held across a request.
//!     - at most one full pull is in flight. a pull requested meanwhile is
//!       dropped, not queued.
//!
//! relationships:
//!     - uses: service.rs (PinService), reconcile.rs, snapshot.rs, pending.rs,
//!       activity.rs
//!     - used by: scheduler.rs (refresh ticks), console.rs (operator intents)
//!
//! ==============================================================================

use crate::activity::{ActivityEntry, ActivityLog, BannerState, Severity, StatusBanner};
use crate::domain::{Direction, GpioInfo, Level, Pin, Position};
use crate::error::ControlError;
use crate::pending::{EditOutcome, PendingEditTracker};
use crate::reconcile::{reconcile, reconcile_all, EffectiveView};
use crate::service::{ActionReply, PinService};
use crate::snapshot::PinSnapshotStore;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, RwLock};
use tokio::time::Instant;

/// tunables taken from configuration
#[derive(Debug, Clone)]
pub struct ControllerOptions {
    pub log_capacity: usize,
    pub banner_ttl: Duration,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self {
            log_capacity: crate::activity::DEFAULT_CAPACITY,
            banner_ttl: crate::activity::DEFAULT_BANNER_TTL,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshTrigger {
    /// first pull at startup
    Initial,
    /// scheduler tick
    Tick,
    /// operator pressed refresh
    Manual,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// snapshot replaced with this many pins
    Applied(usize),
    /// another pull was in flight
    Skipped,
    Failed(ControlError),
}

/// commit actions against one pin
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinAction {
    Configure(Direction),
    Write(Level),
    Read,
}

impl PinAction {
    fn progress(self, position: Position) -> String {
        match self {
            PinAction::Configure(direction) => format!("Setting up pin {} as {}...", position, direction),
            PinAction::Write(level) => format!("Writing {} to pin {}...", level, position),
            PinAction::Read => format!("Reading pin {}...", position),
        }
    }

    fn verb(self) -> &'static str {
        match self {
            PinAction::Configure(_) => "setup",
            PinAction::Write(_) => "write",
            PinAction::Read => "read",
        }
    }

    fn transport_context(self, position: Position) -> String {
        match self {
            PinAction::Configure(_) => format!("Error setting up pin {}", position),
            PinAction::Write(_) => format!("Error writing to pin {}", position),
            PinAction::Read => format!("Error reading pin {}", position),
        }
    }
}

struct ControllerState {
    snapshot: PinSnapshotStore,
    edits: PendingEditTracker,
    log: ActivityLog,
    banner: StatusBanner,
}

impl ControllerState {
    fn notify(&mut self, severity: Severity, log: String, banner: String) {
        self.log.push(severity, log);
        self.banner.show(banner, Some(severity), Instant::now());
    }

    fn fail(&mut self, log: String, error: &ControlError) {
        self.notify(Severity::Error, log, format!("Error: {}", error));
    }
}

/// resets the in-flight flag when the pull finishes, however it finishes
struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    fn try_begin(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| InFlight(flag))
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// clone-able handle to the shared controller state
#[derive(Clone)]
pub struct Controller {
    service: Arc<dyn PinService>,
    state: Arc<RwLock<ControllerState>>,
    refresh_in_flight: Arc<AtomicBool>,
    revision: Arc<watch::Sender<u64>>,
}

impl Controller {
    pub fn new(service: Arc<dyn PinService>, options: ControllerOptions) -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            service,
            state: Arc::new(RwLock::new(ControllerState {
                snapshot: PinSnapshotStore::new(),
                edits: PendingEditTracker::new(),
                log: ActivityLog::new(options.log_capacity),
                banner: StatusBanner::new(options.banner_ttl),
            })),
            refresh_in_flight: Arc::new(AtomicBool::new(false)),
            revision: Arc::new(revision),
        }
    }

    /// revision counter, bumped after every state change
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    pub fn revision(&self) -> u64 {
        *self.revision.borrow()
    }

    fn changed(&self) {
        self.revision.send_modify(|r| *r = r.wrapping_add(1));
    }

    // --------------------------------------------------------------------------
    // read path
    // --------------------------------------------------------------------------

    /// initial load of the header
    pub async fn load(&self) -> RefreshOutcome {
        self.refresh(RefreshTrigger::Initial).await
    }

    /// pull a full snapshot unless one is already in flight
    pub async fn refresh(&self, trigger: RefreshTrigger) -> RefreshOutcome {
        let Some(_in_flight) = InFlight::try_begin(&self.refresh_in_flight) else {
            tracing::debug!("refresh ({:?}) dropped: pull already in flight", trigger);
            return RefreshOutcome::Skipped;
        };

        let pulled_at = {
            let mut state = self.state.write().await;
            if trigger == RefreshTrigger::Manual {
                state.banner.show("Refreshing pin states...", None, Instant::now());
            }
            state.snapshot.epoch()
        };
        if trigger == RefreshTrigger::Manual {
            self.changed();
        }

        let result = self.service.fetch_pins().await;

        let mut state = self.state.write().await;
        let outcome = match result {
            Ok(pins) => {
                if !state.snapshot.is_empty() && !state.snapshot.same_positions(&pins) {
                    tracing::warn!("pin set changed between pulls ({} -> {} pins)", state.snapshot.len(), pins.len());
                }
                let count = pins.len();
                let kept = state.snapshot.replace_since(pins, pulled_at);
                if !kept.is_empty() {
                    tracing::debug!("pull predates action results for pins {:?}, kept those", kept);
                }
                match trigger {
                    RefreshTrigger::Initial => {
                        tracing::info!("loaded {} pins", count);
                        state.log.push(Severity::Success, "Pins loaded successfully");
                    }
                    RefreshTrigger::Manual => {
                        state.banner.show("Pin states refreshed", Some(Severity::Success), Instant::now());
                    }
                    RefreshTrigger::Tick => tracing::debug!("refreshed {} pins", count),
                }
                RefreshOutcome::Applied(count)
            }
            Err(e) => {
                tracing::warn!("pin pull failed: {}", e);
                state.fail(format!("Error loading pins: {}", e), &e);
                RefreshOutcome::Failed(e)
            }
        };
        drop(state);
        self.changed();
        outcome
    }

    pub async fn views(&self) -> Vec<EffectiveView> {
        let state = self.state.read().await;
        reconcile_all(&state.snapshot, &state.edits)
    }

    pub async fn view(&self, position: Position) -> Option<EffectiveView> {
        let state = self.state.read().await;
        state
            .snapshot
            .get(position)
            .map(|pin| reconcile(pin, state.edits.get(position)))
    }

    pub async fn pins(&self) -> Vec<Pin> {
        self.state.read().await.snapshot.iter().cloned().collect()
    }

    #[cfg(test)]
    pub async fn pin(&self, position: Position) -> Option<Pin> {
        self.state.read().await.snapshot.get(position).cloned()
    }

    #[cfg(test)]
    pub async fn pending(&self, position: Position) -> Option<Direction> {
        self.state.read().await.edits.get(position)
    }

    /// number of uncommitted edits
    pub async fn pending_count(&self) -> usize {
        self.state.read().await.edits.len()
    }

    // --------------------------------------------------------------------------
    // edit path
    // --------------------------------------------------------------------------

    /// operator picked `direction` for `position` without committing it
    pub async fn edit_direction(&self, position: Position, direction: Direction) -> Result<EditOutcome, ControlError> {
        let mut state = self.state.write().await;
        let checked = Self::controllable(&state.snapshot, position).map(|pin| pin.direction.unwrap_or(Direction::Input));
        let server_direction = match checked {
            Ok(direction) => direction,
            Err(e) => {
                state.fail(e.to_string(), &e);
                drop(state);
                self.changed();
                return Err(e);
            }
        };

        let outcome = state.edits.set(position, direction, server_direction);
        tracing::debug!("pin {} edit {} -> {:?}", position, direction, outcome);
        drop(state);
        self.changed();
        Ok(outcome)
    }

    // --------------------------------------------------------------------------
    // commit path (action dispatcher)
    // --------------------------------------------------------------------------

    pub async fn configure(&self, position: Position, direction: Direction) -> Result<ActionReply, ControlError> {
        self.dispatch(position, PinAction::Configure(direction)).await
    }

    pub async fn write(&self, position: Position, level: Level) -> Result<ActionReply, ControlError> {
        self.dispatch(position, PinAction::Write(level)).await
    }

    pub async fn read(&self, position: Position) -> Result<ActionReply, ControlError> {
        self.dispatch(position, PinAction::Read).await
    }

    /// commit whatever direction the pin currently displays
    pub async fn apply(&self, position: Position) -> Result<ActionReply, ControlError> {
        let direction = self
            .view(position)
            .await
            .map(|view| view.displayed_direction)
            .unwrap_or(Direction::Input);
        self.configure(position, direction).await
    }

    pub async fn dispatch(&self, position: Position, action: PinAction) -> Result<ActionReply, ControlError> {
        {
            let mut state = self.state.write().await;
            let checked = Self::controllable(&state.snapshot, position).map(|_| ());
            if let Err(e) = checked {
                tracing::warn!("pin {} {} refused locally: {}", position, action.verb(), e);
                state.fail(e.to_string(), &e);
                drop(state);
                self.changed();
                return Err(e);
            }
            state.banner.show(action.progress(position), None, Instant::now());
        }
        self.changed();
        tracing::info!("pin {} {} -> {:?}", position, action.verb(), action);

        let result = match action {
            PinAction::Configure(direction) => self.service.setup(position, direction).await,
            PinAction::Write(level) => self.service.write(position, level).await,
            PinAction::Read => self.service.read(position).await,
        };

        let mut state = self.state.write().await;
        let outcome = match result {
            Ok(reply) if reply.success => {
                Self::merge(&mut state, position, action, &reply);
                Ok(reply)
            }
            Ok(reply) => {
                tracing::warn!("pin {} {} rejected: {}", position, action.verb(), reply.message);
                let e = ControlError::Rejected {
                    position,
                    message: reply.message,
                };
                state.fail(format!("Pin {} {} failed: {}", position, action.verb(), e), &e);
                Err(e)
            }
            Err(e) => {
                tracing::warn!("pin {} {} failed: {}", position, action.verb(), e);
                state.fail(format!("{}: {}", action.transport_context(position), e), &e);
                Err(e)
            }
        };
        drop(state);
        self.changed();
        outcome
    }

    /// apply a successful reply: one step, under the caller's write lock
    fn merge(state: &mut ControllerState, position: Position, action: PinAction, reply: &ActionReply) {
        if let PinAction::Configure(_) = action {
            state.edits.clear(position);
        }

        match (&reply.pin, action) {
            (Some(pin), _) => {
                state.snapshot.update_one(position, pin.clone());
            }
            (None, PinAction::Read) => {
                if let (Some(level), Some(pin)) = (reply.level, state.snapshot.get_mut(position)) {
                    pin.level = level;
                }
            }
            (None, _) => tracing::debug!("pin {} reply carried no pin_info", position),
        }

        match action {
            PinAction::Read => {
                let level = reply
                    .level
                    .or_else(|| state.snapshot.get(position).map(|p| p.level))
                    .unwrap_or_default();
                state.log.push(Severity::Info, format!("Pin {}: {} - {}", position, reply.message, level));
                state.banner.show(format!("Pin {} is {}", position, level), Some(Severity::Success), Instant::now());
            }
            _ => state.notify(
                Severity::Success,
                format!("Pin {}: {}", position, reply.message),
                reply.message.clone(),
            ),
        }
    }

    fn controllable(snapshot: &PinSnapshotStore, position: Position) -> Result<&Pin, ControlError> {
        let pin = snapshot.get(position).ok_or_else(|| ControlError::LocalValidation {
            position,
            reason: format!("Pin {} is not on the loaded header", position),
        })?;
        if !pin.controllable() {
            return Err(ControlError::LocalValidation {
                position,
                reason: format!("Pin {} is not controllable", position),
            });
        }
        Ok(pin)
    }

    // --------------------------------------------------------------------------
    // operator feedback
    // --------------------------------------------------------------------------

    pub async fn note(&self, severity: Severity, message: impl Into<String>) {
        self.state.write().await.log.push(severity, message);
        self.changed();
    }

    pub async fn activity(&self) -> Vec<ActivityEntry> {
        self.state.read().await.log.entries().cloned().collect()
    }

    pub async fn clear_log(&self) {
        self.state.write().await.log.clear();
        self.changed();
    }

    pub async fn banner(&self) -> BannerState {
        self.state.read().await.banner.state(Instant::now())
    }

    /// time until the banner falls back to idle, None when already idle
    pub async fn banner_remaining(&self) -> Option<Duration> {
        self.state.read().await.banner.remaining(Instant::now())
    }

    pub async fn gpio_info(&self) -> Result<GpioInfo, ControlError> {
        self.service.gpio_info().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::fixtures::{ground, gpio, pos, unconfigured};
    use crate::reconcile::ButtonStyle;
    use crate::service::mock::MockPinService;

    async fn controller_with(mock: &MockPinService) -> Controller {
        let controller = Controller::new(Arc::new(mock.clone()), ControllerOptions::default());
        assert_eq!(controller.load().await, RefreshOutcome::Applied(mock_len(mock).await));
        controller
    }

    async fn mock_len(mock: &MockPinService) -> usize {
        mock.fetch_pins().await.map(|p| p.len()).unwrap_or(0)
    }

    fn board() -> MockPinService {
        MockPinService::with_pins([
            ground(6),
            gpio(7, Direction::Input, Level::Low),
            unconfigured(9),
            gpio(15, Direction::Output, Level::Low),
        ])
    }

    async fn last_log(controller: &Controller) -> String {
        controller.activity().await.last().map(|e| e.message.clone()).unwrap_or_default()
    }

    #[tokio::test]
    async fn load_logs_success() {
        let mock = board();
        let controller = controller_with(&mock).await;
        assert_eq!(controller.views().await.len(), 4);
        assert_eq!(last_log(&controller).await, "Pins loaded successfully");
    }

    #[tokio::test]
    async fn load_failure_is_reported_not_fatal() {
        let mock = board();
        mock.set_offline(true);
        let controller = Controller::new(Arc::new(mock.clone()), ControllerOptions::default());

        let outcome = controller.load().await;
        assert!(matches!(outcome, RefreshOutcome::Failed(ControlError::Transport { .. })));
        assert_eq!(last_log(&controller).await, "Error loading pins: connection refused");
        assert_eq!(controller.banner().await.message, "Error: connection refused");
        assert!(controller.views().await.is_empty());
    }

    #[tokio::test]
    async fn edit_then_revert() {
        let mock = board();
        let controller = controller_with(&mock).await;

        let outcome = controller.edit_direction(pos(7), Direction::Output).await.unwrap();
        assert_eq!(outcome, EditOutcome::Recorded);
        let view = controller.view(pos(7)).await.unwrap();
        assert_eq!(view.displayed_direction, Direction::Output);
        assert!(view.has_pending_change);
        assert_eq!(view.commit_label, "Apply Change");

        let outcome = controller.edit_direction(pos(7), Direction::Input).await.unwrap();
        assert_eq!(outcome, EditOutcome::Reverted);
        assert_eq!(controller.pending(pos(7)).await, None);
        let view = controller.view(pos(7)).await.unwrap();
        assert!(!view.has_pending_change);
        assert_eq!(view.commit_label, "Setup");
    }

    #[tokio::test]
    async fn no_op_edit_is_dropped() {
        let mock = board();
        let controller = controller_with(&mock).await;

        controller.edit_direction(pos(15), Direction::Output).await.unwrap();
        assert_eq!(controller.pending(pos(15)).await, None);
        assert!(!controller.view(pos(15)).await.unwrap().has_pending_change);
    }

    #[tokio::test]
    async fn refresh_preserves_pending_edit() {
        let mock = board();
        let controller = controller_with(&mock).await;
        controller.edit_direction(pos(7), Direction::Output).await.unwrap();

        mock.edit_pin(pos(7), |pin| pin.level = Level::High);
        assert_eq!(controller.refresh(RefreshTrigger::Tick).await, RefreshOutcome::Applied(4));

        assert_eq!(controller.pending(pos(7)).await, Some(Direction::Output));
        let view = controller.view(pos(7)).await.unwrap();
        assert_eq!(view.status_text(), "INPUT - HIGH (→OUTPUT)");
        assert_eq!(view.displayed_direction, Direction::Output);
    }

    #[tokio::test]
    async fn configure_success_clears_edit_and_merges_pin() {
        let mock = board();
        let controller = controller_with(&mock).await;
        controller.edit_direction(pos(7), Direction::Output).await.unwrap();

        let reply = controller.configure(pos(7), Direction::Output).await.unwrap();
        assert!(reply.success);

        assert_eq!(controller.pending(pos(7)).await, None);
        let view = controller.view(pos(7)).await.unwrap();
        assert_eq!(view.status_text(), "OUTPUT - LOW");
        assert_eq!(view.commit_label, "Setup");
        assert_eq!(view.commit_style, ButtonStyle::Primary);
        assert_eq!(last_log(&controller).await, "Pin 7: Pin 7 configured as OUTPUT");
        assert_eq!(controller.banner().await.message, "Pin 7 configured as OUTPUT");
    }

    #[tokio::test]
    async fn configure_success_clears_edit_whatever_was_pending() {
        let mock = board();
        let controller = controller_with(&mock).await;
        controller.edit_direction(pos(7), Direction::Output).await.unwrap();

        controller.configure(pos(7), Direction::Input).await.unwrap();
        assert_eq!(controller.pending(pos(7)).await, None);
    }

    #[tokio::test]
    async fn apply_commits_displayed_direction() {
        let mock = board();
        let controller = controller_with(&mock).await;
        controller.edit_direction(pos(7), Direction::Output).await.unwrap();

        controller.apply(pos(7)).await.unwrap();
        assert_eq!(controller.pin(pos(7)).await.and_then(|p| p.direction), Some(Direction::Output));
    }

    #[tokio::test]
    async fn non_controllable_pin_never_reaches_service() {
        let mock = board();
        let controller = controller_with(&mock).await;

        for action in [PinAction::Configure(Direction::Output), PinAction::Write(Level::High), PinAction::Read] {
            let err = controller.dispatch(pos(9), action).await.unwrap_err();
            assert!(err.is_local(), "{:?} should fail locally", action);
        }
        assert!(controller.dispatch(pos(6), PinAction::Read).await.unwrap_err().is_local());
        assert!(controller.edit_direction(pos(9), Direction::Output).await.unwrap_err().is_local());

        assert_eq!(mock.action_count(), 0);
        assert_eq!(controller.pending(pos(9)).await, None);
        assert_eq!(last_log(&controller).await, "Pin 9 is not controllable");
        assert_eq!(controller.banner().await.message, "Error: Pin 9 is not controllable");
    }

    #[tokio::test]
    async fn unknown_pin_is_refused_locally() {
        let mock = board();
        let controller = controller_with(&mock).await;
        let err = controller.read(pos(40)).await.unwrap_err();
        assert!(matches!(err, ControlError::LocalValidation { .. }));
        assert_eq!(mock.action_count(), 0);
    }

    #[tokio::test]
    async fn rejection_keeps_edit_and_snapshot() {
        let mock = board();
        let controller = controller_with(&mock).await;
        controller.edit_direction(pos(7), Direction::Output).await.unwrap();
        mock.reject_next("GPIO busy");

        let err = controller.configure(pos(7), Direction::Output).await.unwrap_err();
        assert_eq!(
            err,
            ControlError::Rejected {
                position: pos(7),
                message: "GPIO busy".to_string()
            }
        );
        assert_eq!(controller.pending(pos(7)).await, Some(Direction::Output));
        assert_eq!(controller.pin(pos(7)).await.and_then(|p| p.direction), Some(Direction::Input));
        assert_eq!(last_log(&controller).await, "Pin 7 setup failed: GPIO busy");
        let banner = controller.banner().await;
        assert_eq!(banner.message, "Error: GPIO busy");
        assert_eq!(banner.severity, Some(Severity::Error));
    }

    #[tokio::test]
    async fn transport_failure_keeps_edit() {
        let mock = board();
        let controller = controller_with(&mock).await;
        controller.edit_direction(pos(7), Direction::Output).await.unwrap();
        mock.set_offline(true);

        let err = controller.configure(pos(7), Direction::Output).await.unwrap_err();
        assert!(matches!(err, ControlError::Transport { .. }));
        assert_eq!(controller.pending(pos(7)).await, Some(Direction::Output));
        assert_eq!(last_log(&controller).await, "Error setting up pin 7: connection refused");
    }

    #[tokio::test]
    async fn write_requires_output_on_the_service_side() {
        let mock = board();
        let controller = controller_with(&mock).await;

        let err = controller.write(pos(7), Level::High).await.unwrap_err();
        assert!(matches!(err, ControlError::Rejected { .. }));
        assert_eq!(mock.action_count(), 1);

        controller.write(pos(15), Level::High).await.unwrap();
        assert_eq!(controller.view(pos(15)).await.unwrap().status_text(), "OUTPUT - HIGH");
        assert_eq!(last_log(&controller).await, "Pin 15: Pin 15 set to HIGH");
    }

    #[tokio::test]
    async fn read_merges_pin_and_leaves_edits() {
        let mock = board();
        let controller = controller_with(&mock).await;
        controller.edit_direction(pos(7), Direction::Output).await.unwrap();
        mock.edit_pin(pos(7), |pin| pin.level = Level::High);

        controller.read(pos(7)).await.unwrap();

        assert_eq!(controller.pending(pos(7)).await, Some(Direction::Output));
        assert_eq!(controller.view(pos(7)).await.unwrap().status_text(), "INPUT - HIGH (→OUTPUT)");
        assert_eq!(last_log(&controller).await, "Pin 7: Pin 7 state read - HIGH");
        assert_eq!(controller.banner().await.message, "Pin 7 is HIGH");
    }

    #[tokio::test]
    async fn overlapping_pull_is_dropped() {
        let mock = board();
        let controller = controller_with(&mock).await;
        let pulls_before = mock.pull_count();
        mock.hold_pulls();

        let first = tokio::spawn({
            let controller = controller.clone();
            async move { controller.refresh(RefreshTrigger::Tick).await }
        });
        while mock.pull_count() == pulls_before {
            tokio::task::yield_now().await;
        }

        assert_eq!(controller.refresh(RefreshTrigger::Tick).await, RefreshOutcome::Skipped);
        assert_eq!(controller.refresh(RefreshTrigger::Manual).await, RefreshOutcome::Skipped);
        assert_eq!(mock.pull_count(), pulls_before + 1);

        mock.release_pulls(1);
        assert_eq!(first.await.unwrap(), RefreshOutcome::Applied(4));

        mock.release_pulls(1);
        assert_eq!(controller.refresh(RefreshTrigger::Tick).await, RefreshOutcome::Applied(4));
    }

    #[tokio::test]
    async fn commit_and_refresh_converge_in_either_order() {
        // refresh lands first, then the commit
        let mock_a = board();
        let a = controller_with(&mock_a).await;
        a.edit_direction(pos(7), Direction::Output).await.unwrap();
        a.refresh(RefreshTrigger::Tick).await;
        a.configure(pos(7), Direction::Output).await.unwrap();

        // commit lands while the pull is held open, pull answers afterwards
        let mock_b = board();
        let b = controller_with(&mock_b).await;
        b.edit_direction(pos(7), Direction::Output).await.unwrap();
        mock_b.hold_pulls();
        let pulls_before = mock_b.pull_count();
        let pull = tokio::spawn({
            let b = b.clone();
            async move { b.refresh(RefreshTrigger::Tick).await }
        });
        while mock_b.pull_count() == pulls_before {
            tokio::task::yield_now().await;
        }
        b.configure(pos(7), Direction::Output).await.unwrap();
        mock_b.release_pulls(1);
        pull.await.unwrap();

        assert_eq!(a.views().await, b.views().await);
        assert_eq!(b.pending(pos(7)).await, None);
        assert_eq!(b.view(pos(7)).await.unwrap().status_text(), "OUTPUT - LOW");
    }

    #[tokio::test]
    async fn pull_sent_before_commit_does_not_undo_it() {
        let mock = board();
        let controller = controller_with(&mock).await;
        controller.edit_direction(pos(7), Direction::Output).await.unwrap();
        mock.edit_pin(pos(15), |pin| pin.level = Level::High);

        // the pull reads the board now, before the commit reaches it
        mock.hold_pulls();
        let pulls_before = mock.pull_count();
        let pull = tokio::spawn({
            let controller = controller.clone();
            async move { controller.refresh(RefreshTrigger::Tick).await }
        });
        while mock.pull_count() == pulls_before {
            tokio::task::yield_now().await;
        }

        controller.configure(pos(7), Direction::Output).await.unwrap();
        assert_eq!(controller.view(pos(7)).await.unwrap().status_text(), "OUTPUT - LOW");

        mock.release_pulls(1);
        assert_eq!(pull.await.unwrap(), RefreshOutcome::Applied(4));

        let view = controller.view(pos(7)).await.unwrap();
        assert_eq!(view.status_text(), "OUTPUT - LOW");
        assert_eq!(view.commit_label, "Setup");
        assert!(!view.has_pending_change);
        // the rest of the stale pull still applies
        assert_eq!(controller.pin(pos(15)).await.map(|p| p.level), Some(Level::High));

        // choosing what the hardware already has is not a change
        assert_eq!(
            controller.edit_direction(pos(7), Direction::Output).await.unwrap(),
            EditOutcome::Reverted
        );
        assert!(!controller.view(pos(7)).await.unwrap().has_pending_change);

        // a pull sent after the commit is taken as is
        mock.release_pulls(1);
        assert_eq!(controller.refresh(RefreshTrigger::Tick).await, RefreshOutcome::Applied(4));
        assert_eq!(controller.view(pos(7)).await.unwrap().status_text(), "OUTPUT - LOW");
    }

    #[tokio::test]
    async fn read_without_pin_info_patches_level() {
        let mock = board();
        let controller = controller_with(&mock).await;
        controller.edit_direction(pos(7), Direction::Output).await.unwrap();
        mock.edit_pin(pos(7), |pin| pin.level = Level::High);
        mock.omit_pin_info(true);

        let reply = controller.read(pos(7)).await.unwrap();
        assert!(reply.pin.is_none());
        assert_eq!(reply.level, Some(Level::High));

        assert_eq!(controller.pin(pos(7)).await.map(|p| p.level), Some(Level::High));
        assert_eq!(controller.pending(pos(7)).await, Some(Direction::Output));
        assert_eq!(controller.view(pos(7)).await.unwrap().status_text(), "INPUT - HIGH (→OUTPUT)");
        assert_eq!(controller.banner().await.message, "Pin 7 is HIGH");
    }

    #[tokio::test]
    async fn configure_without_pin_info_clears_edit_only() {
        let mock = board();
        let controller = controller_with(&mock).await;
        controller.edit_direction(pos(7), Direction::Output).await.unwrap();
        mock.omit_pin_info(true);

        let reply = controller.configure(pos(7), Direction::Output).await.unwrap();
        assert!(reply.pin.is_none());

        assert_eq!(controller.pending(pos(7)).await, None);
        assert_eq!(controller.pin(pos(7)).await.and_then(|p| p.direction), Some(Direction::Input));
        assert_eq!(controller.view(pos(7)).await.unwrap().status_text(), "INPUT - LOW");
        assert_eq!(last_log(&controller).await, "Pin 7: Pin 7 configured as OUTPUT");

        // the next pull brings the service's direction in
        controller.refresh(RefreshTrigger::Tick).await;
        assert_eq!(controller.view(pos(7)).await.unwrap().status_text(), "OUTPUT - LOW");
    }

    #[tokio::test]
    async fn pending_count_tracks_edits() {
        let mock = board();
        let controller = controller_with(&mock).await;
        controller.edit_direction(pos(7), Direction::Output).await.unwrap();
        controller.edit_direction(pos(15), Direction::Input).await.unwrap();
        assert_eq!(controller.pending_count().await, 2);

        controller.configure(pos(15), Direction::Input).await.unwrap();
        assert_eq!(controller.pending_count().await, 1);
    }

    #[tokio::test]
    async fn manual_refresh_updates_banner() {
        let mock = board();
        let controller = controller_with(&mock).await;
        controller.refresh(RefreshTrigger::Manual).await;
        assert_eq!(controller.banner().await.message, "Pin states refreshed");
    }

    #[tokio::test]
    async fn state_changes_bump_revision() {
        let mock = board();
        let controller = controller_with(&mock).await;
        let mut rx = controller.subscribe();
        rx.borrow_and_update();

        controller.edit_direction(pos(7), Direction::Output).await.unwrap();
        assert!(rx.has_changed().unwrap());
        rx.borrow_and_update();

        controller.clear_log().await;
        assert!(rx.has_changed().unwrap());
        assert_eq!(last_log(&controller).await, "Log cleared");
    }

    #[tokio::test]
    async fn gpio_info_passes_through() {
        let mock = board();
        let controller = controller_with(&mock).await;
        let info = controller.gpio_info().await.unwrap();
        assert_eq!(info.controllable_pins, 2);
    }
}
