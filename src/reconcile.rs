//! ==============================================================================
//! reconcile.rs - effective view of a pin
//! ==============================================================================
//!
//! purpose:
//!     merges the last snapshot of a pin with the operator's pending edit (if
//!     any) into the single view the console renders.
//!
//! properties:
//!     - pure: the view depends on (snapshot, pending edit) and nothing else.
//!     - deterministic: same inputs, equal output, so it is safe to re-derive
//!       every view on every refresh tick.
//!
//! relationships:
//!     - reads: snapshot.rs (PinSnapshotStore), pending.rs (PendingEditTracker)
//!     - used by: controller.rs (views), console.rs (rendering)
//!
//! ==============================================================================

use crate::domain::{Direction, Level, Pin, Position};
use crate::pending::PendingEditTracker;
use crate::snapshot::PinSnapshotStore;
use serde::Serialize;
use std::fmt;

pub const LABEL_SETUP: &str = "Setup";
pub const LABEL_APPLY: &str = "Apply Change";
pub const NOT_CONFIGURED: &str = "Not configured in device tree";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ButtonStyle {
    Primary,
    Warning,
    Secondary,
}

impl ButtonStyle {
    pub fn css_class(self) -> &'static str {
        match self {
            ButtonStyle::Primary => "btn-primary",
            ButtonStyle::Warning => "btn-warning",
            ButtonStyle::Secondary => "btn-secondary",
        }
    }
}

/// status line under the pin header
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PinStatus {
    /// non-gpio or unaddressable pins
    Blank,
    /// addressable line the board has not enabled
    NotConfigured,
    State {
        server_direction: Direction,
        level: Level,
        /// shown only when it differs from `server_direction`
        pending: Option<Direction>,
    },
}

impl fmt::Display for PinStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PinStatus::Blank => Ok(()),
            PinStatus::NotConfigured => f.write_str(NOT_CONFIGURED),
            PinStatus::State { server_direction, level, pending } => {
                write!(f, "{} - {}", server_direction, level)?;
                if let Some(desired) = pending {
                    write!(f, " (→{})", desired)?;
                }
                Ok(())
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EffectiveView {
    pub position: Position,
    pub displayed_direction: Direction,
    pub has_pending_change: bool,
    pub commit_label: &'static str,
    pub commit_style: ButtonStyle,
    pub controls_enabled: bool,
    pub status: PinStatus,
}

impl EffectiveView {
    /// e.g. "INPUT - HIGH (→OUTPUT)"; empty for blank status
    pub fn status_text(&self) -> String {
        self.status.to_string()
    }
}

/// compute the view of `pin` given its pending edit
pub fn reconcile(pin: &Pin, pending: Option<Direction>) -> EffectiveView {
    let server_direction = pin.direction.unwrap_or(Direction::Input);

    if !pin.controllable() {
        let status = if pin.has_control_number && !pin.is_configured {
            PinStatus::NotConfigured
        } else {
            PinStatus::Blank
        };
        return EffectiveView {
            position: pin.position,
            displayed_direction: server_direction,
            has_pending_change: false,
            commit_label: LABEL_SETUP,
            commit_style: ButtonStyle::Secondary,
            controls_enabled: false,
            status,
        };
    }

    let displayed_direction = pending.unwrap_or(server_direction);
    // an edit left equal to a direction the service changed to on its own
    // renders as no change
    let pending_change = pending.filter(|desired| *desired != server_direction);
    let has_pending_change = pending_change.is_some();

    EffectiveView {
        position: pin.position,
        displayed_direction,
        has_pending_change,
        commit_label: if has_pending_change { LABEL_APPLY } else { LABEL_SETUP },
        commit_style: if has_pending_change { ButtonStyle::Warning } else { ButtonStyle::Primary },
        controls_enabled: true,
        status: PinStatus::State {
            server_direction,
            level: pin.level,
            pending: pending_change,
        },
    }
}

/// views for every pin in the snapshot, in header order
pub fn reconcile_all(snapshot: &PinSnapshotStore, edits: &PendingEditTracker) -> Vec<EffectiveView> {
    snapshot
        .iter()
        .map(|pin| reconcile(pin, edits.get(pin.position)))
        .collect()
}
