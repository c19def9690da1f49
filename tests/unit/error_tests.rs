//! Unit tests for `AppError` display format and conversions.

use fleet_warden::AppError;

#[test]
fn display_uses_lowercase_category_prefix() {
    let cases = [
        (AppError::Config("x".into()), "config: x"),
        (AppError::State("x".into()), "state: x"),
        (AppError::Session("x".into()), "session: x"),
        (AppError::Store("x".into()), "store: x"),
        (AppError::Mail("x".into()), "mail: x"),
        (AppError::Identity("x".into()), "identity: x"),
        (AppError::Precondition("x".into()), "precondition: x"),
        (AppError::Feed("x".into()), "feed: x"),
        (AppError::NotFound("x".into()), "not found: x"),
        (AppError::Io("x".into()), "io: x"),
    ];
    for (err, expected) in cases {
        assert_eq!(err.to_string(), expected);
    }
}

#[test]
fn io_error_converts_to_io_variant() {
    let err: AppError = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied").into();
    assert!(matches!(err, AppError::Io(ref msg) if msg == "denied"));
}

#[test]
fn toml_error_converts_to_config_variant() {
    let parse: Result<toml::Value, _> = toml::from_str("= broken");
    let err: AppError = parse.expect_err("invalid toml").into();
    assert!(err.to_string().starts_with("config: invalid config:"));
}

#[test]
fn json_error_converts_to_io_variant() {
    let parse: Result<serde_json::Value, _> = serde_json::from_str("{");
    let err: AppError = parse.expect_err("invalid json").into();
    assert!(err.to_string().starts_with("io: invalid json:"));
}

#[test]
fn implements_std_error() {
    fn assert_error<E: std::error::Error>(_: &E) {}
    assert_error(&AppError::Session("gone".into()));
}
