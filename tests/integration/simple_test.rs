//! Smoke test to verify basic integration test infrastructure works
//! before anything that needs a real Postgres connection runs.

#[tokio::test]
async fn test_basic_infrastructure() {
    assert_eq!(2 + 2, 4);

    tokio::time::sleep(tokio::time::Duration::from_millis(1)).await;

    let _env_test = std::env::var("HOME").unwrap_or_default();

    println!("integration test infrastructure is working");
}

#[tokio::test]
async fn test_config_loading() {
    use crate::common::TestConfig;

    let config = TestConfig::from_env();
    assert!(!config.database_url.is_empty());

    println!("configuration loading works");
}

mod common;
