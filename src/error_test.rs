use super::*;

#[test]
fn import_failure_is_not_fatal() {
    let failure = CommitFailure::Import(EntityError::Import { id: "x".into(), message: "gone".into() });
    assert!(!failure.fatal());
    assert!(failure.retryable());
    assert_eq!(failure.error_code(), "E_IMPORT");
}

#[test]
fn download_and_factory_failures_are_fatal() {
    let download = CommitFailure::from(ContentError::AuthRequired("goblin.webp".into()));
    assert!(download.fatal());
    assert_eq!(download.error_code(), "E_DOWNLOAD");
    assert!(!download.retryable());

    let factory = CommitFailure::Factory(EntityError::Write("denied".into()));
    assert!(factory.fatal());
    assert_eq!(factory.error_code(), "E_FACTORY");
}

#[test]
fn server_status_is_retryable() {
    let err = ContentError::Status { status: 503, url: "https://cdn/x".into() };
    assert!(err.retryable());
    let err = ContentError::Status { status: 404, url: "https://cdn/x".into() };
    assert!(!err.retryable());
}

#[test]
fn hp_error_messages_mention_input() {
    let err = HpError::InvalidStatic("abc".into());
    assert!(err.to_string().contains("abc"));
    assert_eq!(err.error_code(), "E_HP_STATIC");
}

#[test]
fn formula_error_converts_into_hp_error() {
    let err: HpError = FormulaError::Empty.into();
    assert_eq!(err, HpError::Formula(FormulaError::Empty));
}
