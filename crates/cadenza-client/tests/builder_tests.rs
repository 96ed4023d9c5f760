//! Public-surface checks that need no live node.

use cadenza_client::prelude::*;
use cadenza_client::Manager;

fn noop_transfer(_payload: serde_json::Value) {}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("cadenza_client=debug")
        .try_init();
}

#[test]
fn build_requires_a_transfer_callback() {
    init_tracing();
    let result = Manager::builder().node(NodeConfig::default()).build();
    assert!(matches!(result, Err(ClientError::MissingTransfer)));
}

#[test]
fn build_yields_manager_and_receiver() {
    let (manager, rx) = Manager::builder()
        .transfer(noop_transfer)
        .client_name("it-tests")
        .shard_count(2)
        .build()
        .unwrap();
    drop(rx);
    assert!(manager.nodes().is_empty(), "no nodes before start");
}

#[test]
fn start_validates_the_bot_id() {
    let (manager, _rx) = Manager::builder().transfer(noop_transfer).build().unwrap();

    assert!(matches!(manager.start(""), Err(ClientError::MissingBotId)));
    assert!(matches!(
        manager.start("bot@example"),
        Err(ClientError::InvalidBotId(_))
    ));
}

#[test]
fn create_without_nodes_reports_no_nodes_available() {
    let (manager, _rx) = Manager::builder().transfer(noop_transfer).build().unwrap();

    let result = manager.create(PlayerOptions::new("1", "100"));
    assert!(matches!(result, Err(ClientError::NoNodesAvailable)));
}

#[test]
fn missing_players_are_reported_by_guild() {
    let (manager, _rx) = Manager::builder().transfer(noop_transfer).build().unwrap();

    match manager.player("12345") {
        Err(ClientError::PlayerNotFound(guild)) => assert_eq!(guild, "12345"),
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("unexpected player"),
    }
}

#[test]
fn node_config_defaults_match_the_common_node_setup() {
    let config = NodeConfig::default();
    assert_eq!(config.host, "localhost");
    assert_eq!(config.port, 2333);
    assert!(!config.secure);
    assert_eq!(config.resume_timeout, 60);
    assert!(config.resume_key.is_none());
}
