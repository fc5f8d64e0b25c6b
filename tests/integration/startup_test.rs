// tests/integration/startup_test.rs

use super::test_helpers::{init_tracing, new_clerk};
use cortado::client::{FailoverPolicy, ReplicaGroup};
use cortado::config::{ClusterConfig, Config};
use cortado::core::CortadoError;
use cortado::core::protocol::Encoding;
use cortado::server;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};

async fn free_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

async fn config_for(members: &[&str], announce_ip: &str) -> Config {
    let mut config = Config {
        binary_port: free_port().await,
        json_port: free_port().await,
        ..Config::default()
    };
    config.cluster = ClusterConfig {
        members: members.iter().map(|m| m.to_string()).collect(),
        storage_ports: vec![5432; members.len()],
        replication_ports: vec![9001; members.len()],
        use_coordinator: false,
        announce_ip: Some(announce_ip.to_string()),
    };
    config
}

#[tokio::test]
async fn test_address_missing_from_members_is_fatal() {
    init_tracing();
    let config = config_for(&["10.255.0.1", "10.255.0.2"], "127.0.0.1").await;
    let binary_port = config.binary_port;

    let err = server::run(config).await.unwrap_err();
    let cause = err.downcast_ref::<CortadoError>();
    assert!(
        matches!(cause, Some(CortadoError::Configuration(_))),
        "{err:#}"
    );
    assert!(TcpStream::connect(("127.0.0.1", binary_port)).await.is_err());
}

#[tokio::test]
async fn test_member_node_serves_on_resolved_address() {
    init_tracing();
    let config = config_for(&["10.255.0.1", "127.0.0.1"], "127.0.0.1").await;
    let binary_addr = format!("127.0.0.1:{}", config.binary_port);
    let json_addr = format!("127.0.0.1:{}", config.json_port);
    let server = tokio::spawn(server::run(config));

    let mut ready = false;
    for _ in 0..100 {
        if TcpStream::connect(&json_addr).await.is_ok() {
            ready = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(ready, "server never started listening");

    let clerk = new_clerk(Encoding::Binary, FailoverPolicy::ConnectOnly);
    let handle = clerk
        .open_connection(&ReplicaGroup::new([binary_addr]))
        .await
        .unwrap();
    assert_eq!(handle.client_id, clerk.client_id());

    server.abort();
}
