use super::*;

// =============================================================================
// env_parse: env manipulation requires unsafe in edition 2024. Each test uses
// its own keys so parallel tests do not race.
// =============================================================================

#[test]
fn env_parse_missing_returns_default() {
    let val: usize = env_parse("__STAMP_TEST_MISSING__", 42);
    assert_eq!(val, 42);
}

#[test]
fn env_parse_present_valid() {
    unsafe { std::env::set_var("__STAMP_TEST_VALID__", " 99 ") };
    let val: usize = env_parse("__STAMP_TEST_VALID__", 0);
    assert_eq!(val, 99);
    unsafe { std::env::remove_var("__STAMP_TEST_VALID__") };
}

#[test]
fn env_parse_present_invalid_returns_default() {
    unsafe { std::env::set_var("__STAMP_TEST_INVALID__", "notanumber") };
    let val: usize = env_parse("__STAMP_TEST_INVALID__", 7);
    assert_eq!(val, 7);
    unsafe { std::env::remove_var("__STAMP_TEST_INVALID__") };
}

#[test]
fn env_parse_positive_rejects_zero_and_negative() {
    unsafe {
        std::env::set_var("__STAMP_TEST_ZERO__", "0");
        std::env::set_var("__STAMP_TEST_NEG__", "-3.5");
        std::env::set_var("__STAMP_TEST_POS__", "7.5");
    }
    assert!((env_parse_positive("__STAMP_TEST_ZERO__", 15.0) - 15.0).abs() < f64::EPSILON);
    assert!((env_parse_positive("__STAMP_TEST_NEG__", 15.0) - 15.0).abs() < f64::EPSILON);
    assert!((env_parse_positive("__STAMP_TEST_POS__", 15.0) - 7.5).abs() < f64::EPSILON);
    unsafe {
        std::env::remove_var("__STAMP_TEST_ZERO__");
        std::env::remove_var("__STAMP_TEST_NEG__");
        std::env::remove_var("__STAMP_TEST_POS__");
    }
}

// =============================================================================
// PlacementConfig
// =============================================================================

#[test]
fn defaults_match_constants() {
    let config = PlacementConfig::default();
    assert_eq!(config.prefetch_count, DEFAULT_PREFETCH_COUNT);
    assert!((config.auto_select_min_score - AUTO_SELECT_MIN_SCORE).abs() < f64::EPSILON);
    assert_eq!(config.match_option_limit, DEFAULT_MATCH_OPTION_LIMIT);
    assert_eq!(config.entity_refresh_debounce, Duration::from_millis(DEFAULT_ENTITY_REFRESH_DEBOUNCE_MS));
    assert_eq!(config.game_system, GameSystem::Generic);
    assert!(config.grid_snap);
    assert_eq!(config.wheel_steps(), WheelSteps::default());
}

#[test]
fn from_env_reads_overrides() {
    unsafe {
        std::env::set_var("STAMP_PREFETCH_COUNT", "0");
        std::env::set_var("STAMP_GAME_SYSTEM", "dnd5e");
        std::env::set_var("STAMP_GRID_SNAP", "false");
        std::env::set_var("STAMP_ENTITY_REFRESH_DEBOUNCE_MS", "40");
    }
    let config = PlacementConfig::from_env();
    assert_eq!(config.prefetch_count, 1);
    assert_eq!(config.game_system, GameSystem::Dnd5e);
    assert!(!config.grid_snap);
    assert_eq!(config.entity_refresh_debounce, Duration::from_millis(40));
    unsafe {
        std::env::remove_var("STAMP_PREFETCH_COUNT");
        std::env::remove_var("STAMP_GAME_SYSTEM");
        std::env::remove_var("STAMP_GRID_SNAP");
        std::env::remove_var("STAMP_ENTITY_REFRESH_DEBOUNCE_MS");
    }
}
