//! Session events and the shared session context.
//!
//! ARCHITECTURE
//! ============
//! Owners observe a placement controller through a `broadcast` subscription of
//! `SessionEvent`s instead of registering callbacks. State the host needs to
//! read synchronously (is a session active, should entity hover highlights be
//! suppressed) lives in `SessionContext`, shared by `Arc` and written only by
//! the controller task.

#[cfg(test)]
#[path = "events_test.rs"]
mod events_test;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::error::ErrorCode;
use crate::hp::HpOverride;
use crate::session::PlacementMode;

/// Why a session was cancelled. Recorded for observability only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CancelReason {
    User,
    Esc,
    Restart,
    Error,
    CanvasTeardown,
}

/// How a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "reason", rename_all = "snake_case")]
pub enum EndReason {
    /// Non-sticky session placed its instance.
    Completed,
    Cancelled(CancelReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Info,
    Warn,
    Error,
}

/// A user-facing message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub code: String,
    pub message: String,
}

impl Notice {
    #[must_use]
    pub fn new(level: NoticeLevel, code: &str, message: impl Into<String>) -> Self {
        Self { level, code: code.to_string(), message: message.into() }
    }

    /// Notice for an error, carrying its code.
    #[must_use]
    pub fn from_error(level: NoticeLevel, err: &dyn ErrorCode) -> Self {
        Self::new(level, err.error_code(), err.to_string())
    }
}

/// Everything a controller reports to its subscribers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    Started {
        session: u64,
        mode: PlacementMode,
        pool_size: usize,
    },
    EntryChanged {
        session: u64,
        identity: String,
    },
    Committed {
        session: u64,
        commit: u64,
        identity: String,
        label: String,
        entity_id: String,
        instance_id: String,
        hp: Option<HpOverride>,
    },
    Notice(Notice),
    Ended {
        session: u64,
        reason: EndReason,
    },
}

// =============================================================================
// CONTEXT
// =============================================================================

/// State shared between a controller, its commit jobs, and the host.
#[derive(Debug, Default)]
pub struct SessionContext {
    /// Token of the live session; 0 when idle.
    current: AtomicU64,
    formula_warned: AtomicBool,
}

impl SessionContext {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `token` as the live session and re-arm one-shot warnings.
    pub(crate) fn begin(&self, token: u64) {
        self.formula_warned.store(false, Ordering::SeqCst);
        self.current.store(token, Ordering::SeqCst);
    }

    pub(crate) fn end(&self) {
        self.current.store(0, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.current.load(Ordering::SeqCst) != 0
    }

    /// Whether `token` is still the live session.
    #[must_use]
    pub fn is_current(&self, token: u64) -> bool {
        token != 0 && self.current.load(Ordering::SeqCst) == token
    }

    /// Entity hover highlights are suppressed while a placement is live.
    #[must_use]
    pub fn hover_suppressed(&self) -> bool {
        self.is_active()
    }

    /// Returns true the first time it is called in a session.
    pub(crate) fn take_formula_warning(&self) -> bool {
        !self.formula_warned.swap(true, Ordering::SeqCst)
    }
}
