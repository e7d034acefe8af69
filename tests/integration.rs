//! Integration tests for miniblob

use miniblob::common::{Error, FatId, ObjectId, SyncPolicy, VolumeId};
use miniblob::coordinator::http::{self as coord_http, CoordState};
use miniblob::coordinator::liveness::{HeartbeatSettings, LivenessMonitor};
use miniblob::coordinator::{Directory, DirectoryClient, ServerState};
use miniblob::gateway::http::{self as gateway_http, GatewayState, GatewayWriteResponse};
use miniblob::volume::heartbeat::serve_heartbeats;
use miniblob::volume::http::{self as volume_http, VolumeState};
use miniblob::volume::{identity, Store};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpListener;

#[test]
fn test_volume_persistence() {
    let dir = TempDir::new().unwrap();
    let volume_id = VolumeId::generate();

    // Write data
    let (id1, id2) = {
        let store = Store::open(dir.path(), volume_id, SyncPolicy::Always).unwrap();
        (
            store.write(b"value1").unwrap(),
            store.write(b"value2").unwrap(),
        )
    };

    // Reopen and verify
    let store = Store::open(dir.path(), volume_id, SyncPolicy::Always).unwrap();
    assert_eq!(store.read(&id1).unwrap(), b"value1");
    assert_eq!(store.read(&id2).unwrap(), b"value2");
    assert_eq!(store.stats().unwrap().needles, 2);
}

#[test]
fn test_store_and_directory_end_to_end() {
    let dir = TempDir::new().unwrap();
    let volume_id = identity::load_or_create(dir.path()).unwrap();
    let store = Store::open(dir.path(), volume_id, SyncPolicy::Never).unwrap();

    let directory = Directory::default();
    directory.register_volume(volume_id, "volume-1:8080").unwrap();

    let (assigned, address) = directory.assign_volume().unwrap();
    assert_eq!(assigned, volume_id);
    assert_eq!(address, "volume-1:8080");

    let object = store.write(b"hello").unwrap();
    let fat_id = FatId::new(assigned, object);
    let parsed: FatId = fat_id.to_string().parse().unwrap();
    assert_eq!(parsed, fat_id);

    assert_eq!(
        directory.get_volume_location(&parsed.volume).unwrap(),
        "volume-1:8080"
    );
    assert_eq!(store.read(&parsed.object).unwrap(), b"hello");
    assert!(matches!(
        store.read(&ObjectId::generate()),
        Err(Error::NotFound(_))
    ));
}

async fn serve(router: axum::Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    tokio::spawn(async move { axum::serve(listener, router).await.unwrap() });
    addr
}

#[tokio::test]
async fn test_gateway_write_read_over_http() {
    // Directory with a real liveness monitor
    let directory = Arc::new(Directory::default());
    let liveness = Arc::new(LivenessMonitor::new(
        directory.clone(),
        HeartbeatSettings {
            interval: Duration::from_millis(50),
            io_timeout: Duration::from_secs(1),
        },
    ));
    let coord_addr = serve(coord_http::create_router(CoordState {
        directory: directory.clone(),
        liveness,
    }))
    .await;
    let coord_url = format!("http://{}", coord_addr);

    // Storage server: HTTP API plus heartbeat responder
    let dir = TempDir::new().unwrap();
    let volume_id = identity::load_or_create(dir.path()).unwrap();
    let store = Arc::new(Store::open(dir.path(), volume_id, SyncPolicy::Never).unwrap());
    let volume_addr = serve(volume_http::create_router(
        VolumeState { store },
        1024 * 1024,
    ))
    .await;
    let hb_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let hb_addr = hb_listener.local_addr().unwrap().to_string();
    tokio::spawn(serve_heartbeats(hb_listener));

    let client = DirectoryClient::new(coord_url.clone(), Duration::from_secs(5)).unwrap();
    client
        .register_volume(volume_id, &volume_addr, Some(hb_addr.as_str()))
        .await
        .unwrap();
    assert_eq!(directory.state(&volume_id).unwrap(), ServerState::Alive);
    assert_eq!(client.get_volume_location(&volume_id).await.unwrap(), volume_addr);

    // Gateway
    let gateway_addr = serve(gateway_http::create_router(
        GatewayState {
            directory: client,
            http: reqwest::Client::new(),
        },
        1024 * 1024,
    ))
    .await;

    let http = reqwest::Client::new();
    let response = http
        .post(format!("http://{}/write", gateway_addr))
        .body("hello")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::CREATED);
    let written: GatewayWriteResponse = response.json().await.unwrap();
    let fat_id: FatId = written.id.parse().unwrap();
    assert_eq!(fat_id.volume, volume_id);

    let response = http
        .get(format!("http://{}/read/{}", gateway_addr, fat_id))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    assert_eq!(
        response.headers()["content-type"],
        "application/octet-stream"
    );
    assert_eq!(&response.bytes().await.unwrap()[..], b"hello");

    // Unknown object on a known volume
    let missing = FatId::new(volume_id, ObjectId::generate());
    let response = http
        .get(format!("http://{}/read/{}", gateway_addr, missing))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::NOT_FOUND);

    // Malformed id
    let response = http
        .get(format!("http://{}/read/not-a-fat-id", gateway_addr))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_registration_fails_without_heartbeat_responder() {
    let directory = Arc::new(Directory::default());
    let liveness = Arc::new(LivenessMonitor::new(
        directory.clone(),
        HeartbeatSettings {
            interval: Duration::from_millis(50),
            io_timeout: Duration::from_millis(500),
        },
    ));
    let coord_addr = serve(coord_http::create_router(CoordState {
        directory: directory.clone(),
        liveness,
    }))
    .await;

    // bound then dropped: nothing listens there any more
    let unused = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let hb_addr = unused.local_addr().unwrap().to_string();
    drop(unused);

    let client =
        DirectoryClient::new(format!("http://{}", coord_addr), Duration::from_secs(5)).unwrap();
    let err = client
        .register_volume(VolumeId::generate(), "127.0.0.1:1", Some(hb_addr.as_str()))
        .await
        .unwrap_err();
    assert!(err.is_retryable());
    assert!(directory.servers().unwrap().is_empty());
    assert!(matches!(
        client.assign_volume().await,
        Err(Error::Unavailable(_))
    ));
}
