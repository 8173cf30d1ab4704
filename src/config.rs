//! Placement engine configuration from `STAMP_*` environment variables.

#[cfg(test)]
#[path = "config_test.rs"]
mod config_test;

use std::time::Duration;

use crate::consts::{
    AUTO_SELECT_MIN_SCORE, DEFAULT_ENTITY_REFRESH_DEBOUNCE_MS, DEFAULT_MATCH_OPTION_LIMIT, DEFAULT_PREFETCH_COUNT,
    ROTATION_FINE_STEP_DEG, ROTATION_STEP_DEG, ZOOM_STEP,
};
use crate::input::WheelSteps;
use crate::system::GameSystem;

/// Tunables for one placement controller.
#[derive(Debug, Clone, PartialEq)]
pub struct PlacementConfig {
    /// Look-ahead depth of the random-pool prefetch queue.
    pub prefetch_count: usize,
    /// Minimum score for binding the top match automatically.
    pub auto_select_min_score: f64,
    /// Ranked binding options kept in the UI snapshot.
    pub match_option_limit: usize,
    /// Coalescing window for entity-store change notifications.
    pub entity_refresh_debounce: Duration,
    pub game_system: GameSystem,
    pub grid_snap: bool,
    pub rotation_step_deg: f64,
    pub rotation_fine_step_deg: f64,
    pub zoom_step: f64,
}

impl Default for PlacementConfig {
    fn default() -> Self {
        Self {
            prefetch_count: DEFAULT_PREFETCH_COUNT,
            auto_select_min_score: AUTO_SELECT_MIN_SCORE,
            match_option_limit: DEFAULT_MATCH_OPTION_LIMIT,
            entity_refresh_debounce: Duration::from_millis(DEFAULT_ENTITY_REFRESH_DEBOUNCE_MS),
            game_system: GameSystem::Generic,
            grid_snap: true,
            rotation_step_deg: ROTATION_STEP_DEG,
            rotation_fine_step_deg: ROTATION_FINE_STEP_DEG,
            zoom_step: ZOOM_STEP,
        }
    }
}

impl PlacementConfig {
    #[must_use]
    pub fn from_env() -> Self {
        let debounce_ms = env_parse("STAMP_ENTITY_REFRESH_DEBOUNCE_MS", DEFAULT_ENTITY_REFRESH_DEBOUNCE_MS);
        let game_system = match std::env::var("STAMP_GAME_SYSTEM") {
            Ok(id) => GameSystem::from_id(&id),
            Err(_) => GameSystem::Generic,
        };

        Self {
            prefetch_count: env_parse("STAMP_PREFETCH_COUNT", DEFAULT_PREFETCH_COUNT).max(1),
            auto_select_min_score: env_parse("STAMP_AUTO_SELECT_MIN_SCORE", AUTO_SELECT_MIN_SCORE),
            match_option_limit: env_parse("STAMP_MATCH_OPTION_LIMIT", DEFAULT_MATCH_OPTION_LIMIT),
            entity_refresh_debounce: Duration::from_millis(debounce_ms),
            game_system,
            grid_snap: env_parse("STAMP_GRID_SNAP", true),
            rotation_step_deg: env_parse_positive("STAMP_ROTATION_STEP_DEG", ROTATION_STEP_DEG),
            rotation_fine_step_deg: env_parse_positive("STAMP_ROTATION_FINE_STEP_DEG", ROTATION_FINE_STEP_DEG),
            zoom_step: env_parse_positive("STAMP_ZOOM_STEP", ZOOM_STEP),
        }
    }

    #[must_use]
    pub fn wheel_steps(&self) -> WheelSteps {
        WheelSteps {
            rotate_deg: self.rotation_step_deg,
            rotate_fine_deg: self.rotation_fine_step_deg,
            zoom: self.zoom_step,
        }
    }
}

/// Parse an environment variable, falling back to `default` when it is unset
/// or does not parse.
pub(crate) fn env_parse<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    match std::env::var(key) {
        Ok(raw) => match raw.trim().parse::<T>() {
            Ok(v) => v,
            Err(_) => default,
        },
        Err(_) => default,
    }
}

fn env_parse_positive(key: &str, default: f64) -> f64 {
    let value = env_parse(key, default);
    if value.is_finite() && value > 0.0 { value } else { default }
}
