//! Shared numeric constants for the placement engine.
//!
//! The match scores were tuned by hand against real asset libraries. Keep them
//! as named values so they can be adjusted without re-deriving the ranking.

// ── Entity matching ─────────────────────────────────────────────

/// Normalized query equals the candidate's normalized name.
pub const SCORE_EXACT: f64 = 50.0;

/// Candidate name starts with the query.
pub const SCORE_CANDIDATE_STARTS_WITH_QUERY: f64 = 20.0;

/// Query starts with the candidate name.
pub const SCORE_QUERY_STARTS_WITH_CANDIDATE: f64 = 12.0;

/// Query appears anywhere inside the candidate name.
pub const SCORE_SUBSTRING: f64 = 10.0;

/// Minimum normalized length before containment checks apply.
pub const MIN_CONTAINMENT_LEN: usize = 3;

/// Per query token found in the candidate's token set.
pub const SCORE_TOKEN_HIT: f64 = 12.0;

/// Per query token found only as a substring of the candidate name.
pub const SCORE_TOKEN_PARTIAL: f64 = 6.0;

/// Every query token was found in the candidate's token set.
pub const SCORE_ALL_TOKENS: f64 = 8.0;

/// Penalty per token of count difference between query and candidate.
pub const TOKEN_COUNT_PENALTY: f64 = 1.5;

/// Already-loaded world entities beat compendium imports on ties.
pub const SCORE_WORLD_BONUS: f64 = 2.0;

/// Query appears in the candidate's folder or pack label.
pub const SCORE_SOURCE_LABEL: f64 = 4.0;

/// Minimum score for the top candidate to be bound automatically.
pub const AUTO_SELECT_MIN_SCORE: f64 = 35.0;

// ── Input ───────────────────────────────────────────────────────

/// Rotation step for modifier + wheel, in degrees.
pub const ROTATION_STEP_DEG: f64 = 15.0;

/// Rotation step when the secondary modifier is also held, in degrees.
pub const ROTATION_FINE_STEP_DEG: f64 = 5.0;

/// Multiplicative zoom factor per plain wheel notch.
pub const ZOOM_STEP: f64 = 1.1;

// ── Health points ───────────────────────────────────────────────

/// Upper bound for percentage HP jitter.
pub const HP_PERCENT_MAX: f64 = 500.0;

// ── Session ─────────────────────────────────────────────────────

/// Default look-ahead depth for the random pool.
pub const DEFAULT_PREFETCH_COUNT: usize = 3;

/// Default number of ranked binding options kept in the UI snapshot.
pub const DEFAULT_MATCH_OPTION_LIMIT: usize = 25;

/// Default coalescing window for entity-store change notifications.
pub const DEFAULT_ENTITY_REFRESH_DEBOUNCE_MS: u64 = 250;

/// Capacity of the session command channel.
pub const COMMAND_CHANNEL_CAPACITY: usize = 256;

/// Capacity of the session event broadcast channel.
pub const EVENT_CHANNEL_CAPACITY: usize = 128;
