//! Input model: modifier keys, pointer buttons, wheel deltas, and what the
//! pointer was over when it went down.
//!
//! The host translates raw DOM events into these types. The helpers at the
//! bottom decide what a wheel notch means for the active placement (rotate
//! the preview or zoom the scene) without touching session state.

#[cfg(test)]
#[path = "input_test.rs"]
mod input_test;

use serde::{Deserialize, Serialize};

use crate::consts::{ROTATION_FINE_STEP_DEG, ROTATION_STEP_DEG, ZOOM_STEP};

/// Keyboard/mouse modifier keys held during an event.
#[allow(clippy::struct_excessive_bools)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Modifiers {
    /// Shift key is held. Rotates on wheel; keeps placing on click.
    pub shift: bool,
    /// Ctrl key is held. Fine rotation step together with shift.
    pub ctrl: bool,
    /// Alt / Option key is held.
    pub alt: bool,
    /// Meta / Command key is held. Same as ctrl.
    pub meta: bool,
}

impl Modifiers {
    /// Whether the rotate-on-wheel modifier is held.
    #[must_use]
    pub fn rotate(self) -> bool {
        self.shift
    }

    /// Whether the secondary (fine step) modifier is held.
    #[must_use]
    pub fn fine(self) -> bool {
        self.ctrl || self.meta
    }

    /// Whether the click should keep the session active regardless of sticky mode.
    #[must_use]
    pub fn keep_placing(self) -> bool {
        self.shift
    }
}

/// Mouse button identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Button {
    /// Left mouse button (or single-finger tap).
    Primary,
    /// Middle mouse button (scroll wheel click).
    Middle,
    /// Right mouse button (or two-finger tap).
    Secondary,
}

/// A keyboard key, holding the key name as reported by the browser (e.g. `"Escape"`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Key(pub String);

impl Key {
    #[must_use]
    pub fn is_escape(&self) -> bool {
        matches!(self.0.as_str(), "Escape" | "Esc")
    }
}

/// Wheel / trackpad scroll delta.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct WheelDelta {
    /// Horizontal scroll amount in pixels.
    pub dx: f64,
    /// Vertical scroll amount in pixels (positive = down).
    pub dy: f64,
}

/// What the pointer was over when the primary button went down.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PointerTarget {
    /// The scene canvas.
    Scene,
    /// A bindable world entity element (sidebar row, entity sheet).
    Entity { entity_id: String },
    /// Anything else (toolbars, dialogs). Ignored.
    Other,
}

// =============================================================================
// WHEEL
// =============================================================================

/// What a wheel notch should do while a placement is active.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WheelIntent {
    /// Rotate the pending preview by this many degrees.
    Rotate(f64),
    /// Zoom the scene to this absolute scale.
    Zoom(f64),
    /// Nothing to do.
    None,
}

/// Step sizes for wheel input.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WheelSteps {
    /// Rotation per notch with the rotate modifier, in degrees.
    pub rotate_deg: f64,
    /// Rotation per notch with the fine modifier as well, in degrees.
    pub rotate_fine_deg: f64,
    /// Multiplicative zoom factor per plain notch.
    pub zoom: f64,
}

impl Default for WheelSteps {
    fn default() -> Self {
        Self { rotate_deg: ROTATION_STEP_DEG, rotate_fine_deg: ROTATION_FINE_STEP_DEG, zoom: ZOOM_STEP }
    }
}

/// Map a wheel event to a placement intent.
#[must_use]
pub fn wheel_intent(delta: WheelDelta, modifiers: Modifiers, current_scale: f64, steps: WheelSteps) -> WheelIntent {
    let amount = if delta.dy.abs() >= delta.dx.abs() { delta.dy } else { delta.dx };
    if amount == 0.0 || !amount.is_finite() {
        return WheelIntent::None;
    }
    if modifiers.rotate() {
        let step = if modifiers.fine() { steps.rotate_fine_deg } else { steps.rotate_deg };
        return WheelIntent::Rotate(step * amount.signum());
    }
    let factor = if amount < 0.0 { steps.zoom } else { 1.0 / steps.zoom };
    WheelIntent::Zoom(current_scale * factor)
}

/// Wrap degrees into `[0, 360)`.
#[must_use]
pub fn normalize_degrees_360(deg: f64) -> f64 {
    if !deg.is_finite() {
        return 0.0;
    }
    let wrapped = deg.rem_euclid(360.0);
    if wrapped >= 360.0 { 0.0 } else { wrapped }
}
