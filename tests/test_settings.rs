//! Integration tests for configuration loading.
//!
//! Tests verify that the layered settings resolve to a runnable
//! synchronizer configuration.

use chain_history_sdk::settings::Settings;

/// Test that the synchronization settings resolve to usable values
#[test]
fn test_sync_settings_are_usable() {
    let settings = Settings::new().expect("Failed to load settings");

    assert!(
        settings.sync.max_concurrent_jobs > 0,
        "Queue ceiling must be positive"
    );
    assert!(
        settings.sync.max_concurrent_jobs <= 100,
        "Queue ceiling should be reasonable (<= 100)"
    );
    assert!(
        settings.sync.safe_block_refresh_interval_seconds > 0,
        "Safe block refresh interval must be positive"
    );
    assert!(
        settings.sync.block_timestamp_step_seconds >= 3600,
        "Block target step should be at least an hour"
    );
}

/// Test that the configured history floor sits on the hour grid
#[test]
fn test_min_timestamp_is_hour_aligned() {
    let settings = Settings::new().expect("Failed to load settings");
    assert_eq!(
        settings.sync.min_timestamp.timestamp() % 3600,
        0,
        "Price history is keyed at hour granularity"
    );
}

/// Test that the tracked token list converts into domain tokens
#[test]
fn test_tokens_resolve_to_domain_shape() {
    let settings = Settings::new().expect("Failed to load settings");
    let tokens = settings.tokens();

    assert_eq!(tokens.len(), settings.tokens.len());
    for token in &tokens {
        assert!(!token.coingecko_id.is_empty(), "Token key must be set");
        assert!(!token.symbol.is_empty(), "Token symbol must be set");
    }
}
