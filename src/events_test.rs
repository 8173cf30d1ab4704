use super::*;
use crate::error::HpError;

#[test]
fn context_tracks_current_token() {
    let ctx = SessionContext::new();
    assert!(!ctx.is_active());
    assert!(!ctx.is_current(0));

    ctx.begin(3);
    assert!(ctx.is_active());
    assert!(ctx.hover_suppressed());
    assert!(ctx.is_current(3));
    assert!(!ctx.is_current(2));

    ctx.end();
    assert!(!ctx.is_current(3));
    assert!(!ctx.hover_suppressed());
}

#[test]
fn formula_warning_fires_once_per_session() {
    let ctx = SessionContext::new();
    ctx.begin(1);
    assert!(ctx.take_formula_warning());
    assert!(!ctx.take_formula_warning());
    ctx.begin(2);
    assert!(ctx.take_formula_warning());
}

#[test]
fn cancel_reasons_serialize_kebab_case() {
    let json = serde_json::to_string(&CancelReason::CanvasTeardown).unwrap();
    assert_eq!(json, r#""canvas-teardown""#);
    let ended = serde_json::to_value(EndReason::Cancelled(CancelReason::Esc)).unwrap();
    assert_eq!(ended, serde_json::json!({"type": "cancelled", "reason": "esc"}));
}

#[test]
fn notice_from_error_carries_code() {
    let notice = Notice::from_error(NoticeLevel::Warn, &HpError::InvalidStatic("abc".into()));
    assert_eq!(notice.code, "E_HP_STATIC");
    assert!(notice.message.contains("abc"));
}
