//! The shipped configuration file must load and map onto client configs.

use bitvavo_stream::AppConfig;
use bitvavo_ws::ChannelName;
use tokio_test::assert_ok;

fn default_config_path() -> String {
    format!("{}/../../config/default.toml", env!("CARGO_MANIFEST_DIR"))
}

#[test]
fn test_default_config_file_loads() {
    let config = assert_ok!(AppConfig::from_file(&default_config_path()));

    assert!(!config.streams.is_empty());
    assert!(!config.has_private_streams());
    assert!(config.http.is_none());

    let channels: Vec<ChannelName> = config.streams.iter().map(|s| s.channel).collect();
    assert!(channels.contains(&ChannelName::Ticker));
    assert!(channels.contains(&ChannelName::Candles));

    let ws = config.ws_config(None);
    assert_ok!(ws.validate());
    assert_eq!(ws.buffer_size, 50);
}

#[test]
fn test_missing_file_is_config_error() {
    let err = AppConfig::from_file("/nonexistent/bitvavo.toml").unwrap_err();
    assert!(matches!(err, bitvavo_stream::AppError::Config(_)));
}

#[tokio::test]
async fn test_application_starts_without_subscriptions() {
    let config = AppConfig::from_file(&default_config_path()).unwrap();
    let app = bitvavo_stream::Application::new(config).unwrap();

    // Nothing is subscribed until the application runs.
    let counts = app.client().subscription_counts();
    assert!(counts.iter().all(|(_, n)| *n == 0));
}
