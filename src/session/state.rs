//! Session state types and the pure rules that derive them.

#[cfg(test)]
#[path = "state_test.rs"]
mod state_test;

use std::collections::HashMap;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::collab::Orientation;
use crate::entry::PlacementEntry;
use crate::hp::{HpMode, HpParams};
use crate::input::normalize_degrees_360;
use crate::matcher::RankedCandidate;
use crate::scene::{Footprint, Point};

/// Lifecycle phase of the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    #[default]
    Idle,
    Active,
    Committing,
}

/// Whether a session places one entry or cycles through a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlacementMode {
    Single,
    Random,
}

/// Options for `start` and `update_entries`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StartOptions {
    /// Stay active after each commit.
    pub sticky: bool,
    /// Use random mode even for a single entry.
    pub force_random: bool,
}

// =============================================================================
// TRANSFORM
// =============================================================================

/// User rotation and mirror settings. Persist across sessions.
#[allow(clippy::struct_excessive_bools)]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransformSettings {
    pub rotation_base_deg: f64,
    /// Half-width of the random rotation spread around the base.
    pub rotation_random_strength_deg: f64,
    /// Randomize rotation for each placement.
    pub rotation_enabled: bool,
    pub mirror_h: bool,
    pub mirror_v: bool,
    pub mirror_random_h: bool,
    pub mirror_random_v: bool,
}

impl Default for TransformSettings {
    fn default() -> Self {
        Self {
            rotation_base_deg: 0.0,
            rotation_random_strength_deg: 180.0,
            rotation_enabled: false,
            mirror_h: false,
            mirror_v: false,
            mirror_random_h: false,
            mirror_random_v: false,
        }
    }
}

/// Preview values for the next commit.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PendingTransform {
    pub rotation_deg: f64,
    pub mirror_h: bool,
    pub mirror_v: bool,
    /// Last pointer position, in screen space.
    pub screen: Option<Point>,
    /// World position the next commit lands on, snapped when grid snap is on.
    pub world: Option<Point>,
    /// Where the preview is drawn, in screen space.
    pub preview: Option<Point>,
}

impl PendingTransform {
    /// Roll the next preview from `settings`. Only fields whose random toggle
    /// is on vary; the rest take the fixed setting. Pointer state carries over
    /// from `previous`.
    #[must_use]
    pub fn generate<R: Rng + ?Sized>(settings: &TransformSettings, previous: Option<&Self>, rng: &mut R) -> Self {
        let strength = settings.rotation_random_strength_deg.abs();
        let rotation = if settings.rotation_enabled && strength > 0.0 {
            settings.rotation_base_deg + rng.random_range(-strength..=strength)
        } else {
            settings.rotation_base_deg
        };
        let mirror_h = if settings.mirror_random_h { rng.random_bool(0.5) } else { settings.mirror_h };
        let mirror_v = if settings.mirror_random_v { rng.random_bool(0.5) } else { settings.mirror_v };
        Self {
            rotation_deg: normalize_degrees_360(rotation),
            mirror_h,
            mirror_v,
            screen: previous.and_then(|p| p.screen),
            world: previous.and_then(|p| p.world),
            preview: previous.and_then(|p| p.preview),
        }
    }

    #[must_use]
    pub fn orientation(&self) -> Orientation {
        Orientation { rotation_deg: self.rotation_deg, mirror_h: self.mirror_h, mirror_v: self.mirror_v }
    }
}

// =============================================================================
// BINDING
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BindingMode {
    /// Create a new backing entity for each placement.
    #[default]
    New,
    /// Attach placements to an existing entity.
    Entity,
}

/// Which entity placements bind to.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Binding {
    pub mode: BindingMode,
    /// Candidate id when `mode == Entity`.
    pub entity_ref: Option<String>,
    /// Instances share live data with the entity. Only meaningful for `Entity`.
    pub linked: bool,
    /// The user chose this binding; auto-select leaves it alone.
    pub manual: bool,
    /// Write the asset and name onto the entity template before placing.
    pub write_template: bool,
}

impl Binding {
    pub fn create_new(&mut self) {
        self.mode = BindingMode::New;
        self.entity_ref = None;
    }

    pub fn bind(&mut self, candidate_id: &str) {
        self.mode = BindingMode::Entity;
        self.entity_ref = Some(candidate_id.to_string());
    }

    /// Candidate id when bound to an entity.
    #[must_use]
    pub fn target(&self) -> Option<&str> {
        match self.mode {
            BindingMode::Entity => self.entity_ref.as_deref(),
            BindingMode::New => None,
        }
    }
}

/// Label overrides. Persist across sessions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Naming {
    pub name_override: Option<String>,
    /// Append " N" to each label, counting per label within a session.
    pub auto_number: bool,
}

impl Naming {
    /// Label base: the override when set, else `fallback`.
    #[must_use]
    pub fn base<'a>(&'a self, fallback: &'a str) -> &'a str {
        match self.name_override.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => name,
            _ => fallback,
        }
    }
}

/// Per-label placement counters for auto-numbering.
#[derive(Debug, Clone, Default)]
pub struct LabelCounter {
    counts: HashMap<String, u32>,
}

impl LabelCounter {
    /// The label the next placement of `base` would get, and its number.
    #[must_use]
    pub fn peek(&self, base: &str, auto_number: bool) -> (String, Option<u32>) {
        if !auto_number {
            return (base.to_string(), None);
        }
        let n = self.counts.get(base).copied().unwrap_or(0) + 1;
        (format!("{base} {n}"), Some(n))
    }

    /// Record that placement `n` of `base` succeeded.
    pub fn record(&mut self, base: &str, n: u32) {
        let slot = self.counts.entry(base.to_string()).or_insert(0);
        *slot = (*slot).max(n);
    }
}

// =============================================================================
// SESSION
// =============================================================================

/// The live session. Exists only while the phase is not idle, so the pending
/// transform is always defined when a session is.
#[derive(Debug, Clone)]
pub struct PlacementSession {
    pub token: u64,
    pub phase: Phase,
    pub mode: PlacementMode,
    pub sticky: bool,
    pub pool: Vec<PlacementEntry>,
    pub current: PlacementEntry,
    pub pending: PendingTransform,
    /// Sequence number of the latest commit issued in this session.
    pub commit_seq: u64,
    /// The in-flight commit should keep the session active.
    pub keep_after_commit: bool,
    pub placed: u32,
    pub labels: LabelCounter,
}

impl PlacementSession {
    #[must_use]
    pub fn footprint(&self) -> Footprint {
        Footprint { width: self.current.grid_width, height: self.current.grid_height }
    }
}

// =============================================================================
// SNAPSHOT
// =============================================================================

/// Binding state for toolbars.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BindingView {
    #[serde(flatten)]
    pub binding: Binding,
    /// Label of the bound candidate.
    pub label: Option<String>,
    pub query: Option<String>,
    pub options: Vec<RankedCandidate>,
}

/// HP state for toolbars.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HpView {
    pub mode: HpMode,
    pub params: HpParams,
    /// Inline validation message for the current input.
    pub validation: Option<String>,
}

/// Read-only view of the controller for rendering.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UiSnapshot {
    pub session: u64,
    pub phase: Phase,
    pub mode: Option<PlacementMode>,
    pub sticky: bool,
    pub current: Option<PlacementEntry>,
    pub pool_size: usize,
    pub pending: Option<PendingTransform>,
    pub transform: TransformSettings,
    pub binding: BindingView,
    pub hp: HpView,
    pub naming: Naming,
    pub grid_snap: bool,
    pub placed: u32,
    pub hints: Vec<&'static str>,
}

/// Key hints for the current phase.
#[must_use]
pub fn hints_for(phase: Phase, mode: Option<PlacementMode>) -> Vec<&'static str> {
    match phase {
        Phase::Idle => Vec::new(),
        Phase::Committing => vec!["Placing..."],
        Phase::Active => {
            let mut hints = vec!["Click to place", "Shift+click to keep placing", "Shift+wheel to rotate", "Esc to cancel"];
            if mode == Some(PlacementMode::Random) {
                hints.insert(1, "Each placement picks a new asset");
            }
            hints
        }
    }
}
