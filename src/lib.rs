//! Token placement session engine.
//!
//! Stamps a chosen asset onto a 2-D scene, one instance per click: live
//! preview with grid snapping and randomized rotation/mirroring, a look-ahead
//! download cache for cycling through a random pool, fuzzy matching that binds
//! placements to existing entities, and HP overrides derived at commit time.
//! Rendering, the scene's coordinate system, downloads, and entity storage
//! belong to the host and are reached through the traits in [`collab`].
//!
//! ## Module layout
//!
//! | Module | Role |
//! |--------|------|
//! | [`session`] | Controller task, commit pipeline, and session state |
//! | [`entry`] | Canonical placement entries and identity keys |
//! | [`prefetch`] | Look-ahead download cache for random pools |
//! | [`matcher`] | Tokenizer and fuzzy ranking of bindable entities |
//! | [`hp`] | HP override modes and resolution |
//! | [`dice`] | Built-in dice-formula evaluator |
//! | [`system`] | Per-game-system HP paths and size categories |
//! | [`input`] | Pointer, wheel, and key input types |
//! | [`scene`] | Scene seam and a camera-backed grid scene |
//! | [`collab`] | Collaborator traits consumed by the engine |
//! | [`content`] | HTTP content service with an on-disk cache |
//! | [`memory`] | In-memory collaborators for replays and tests |
//! | [`events`] | Session events, notices, and the shared context |
//! | [`config`] | `STAMP_*` environment configuration |
//! | [`error`] | Error enums and stable error codes |
//! | [`consts`] | Scoring weights and default tunables |

pub mod collab;
pub mod config;
pub mod consts;
pub mod content;
pub mod dice;
pub mod entry;
pub mod error;
pub mod events;
pub mod hp;
pub mod input;
pub mod matcher;
pub mod memory;
pub mod prefetch;
pub mod scene;
pub mod session;
pub mod system;
