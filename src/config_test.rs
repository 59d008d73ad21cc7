use super::*;

#[test]
fn env_parse_missing_returns_default() {
    let val: usize = env_parse("__FRONTSEAT_TEST_MISSING__", 42);
    assert_eq!(val, 42);
}

#[test]
fn env_parse_present_valid() {
    unsafe { std::env::set_var("__FRONTSEAT_TEST_VALID__", "99") };
    let val: usize = env_parse("__FRONTSEAT_TEST_VALID__", 0);
    assert_eq!(val, 99);
    unsafe { std::env::remove_var("__FRONTSEAT_TEST_VALID__") };
}

#[test]
fn env_parse_present_invalid_returns_default() {
    unsafe { std::env::set_var("__FRONTSEAT_TEST_INVALID__", "notanumber") };
    let val: f64 = env_parse("__FRONTSEAT_TEST_INVALID__", 5.0);
    assert!((val - 5.0).abs() < f64::EPSILON);
    unsafe { std::env::remove_var("__FRONTSEAT_TEST_INVALID__") };
}

#[test]
fn default_config_uses_memory_store() {
    let config = Config::default();
    assert_eq!(config.port, 3000);
    assert!(config.database_url.is_none());
    assert_eq!(config.default_diagram_id, "1");
    assert_eq!(config.client_channel_capacity, 256);
}
