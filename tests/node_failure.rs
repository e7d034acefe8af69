//! Storage server failure and recovery as seen by the liveness monitor

use miniblob::common::protocol::{read_frame, write_frame, Frame, STATUS_OK};
use miniblob::common::{Error, VolumeId};
use miniblob::coordinator::liveness::{HeartbeatSettings, LivenessMonitor, ServerMonitor};
use miniblob::coordinator::{Directory, ServerState};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

fn fast() -> HeartbeatSettings {
    HeartbeatSettings {
        interval: Duration::from_millis(30),
        io_timeout: Duration::from_millis(500),
    }
}

/// Heartbeat responder that hangs up on every frame while `healthy` is false
async fn flaky_responder(healthy: Arc<AtomicBool>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    tokio::spawn(async move {
        loop {
            let (mut conn, _) = listener.accept().await.unwrap();
            let healthy = healthy.clone();
            tokio::spawn(async move {
                while read_frame(&mut conn).await.is_ok() {
                    if !healthy.load(Ordering::SeqCst) {
                        return;
                    }
                    if write_frame(&mut conn, &Frame::success(STATUS_OK))
                        .await
                        .is_err()
                    {
                        return;
                    }
                }
            });
        }
    });
    addr
}

#[tokio::test]
async fn test_node_failure_and_recovery() {
    let directory = Arc::new(Directory::default());
    let healthy = Arc::new(AtomicBool::new(true));
    let hb = flaky_responder(healthy.clone()).await;
    let v = VolumeId::generate();

    let mut monitor = ServerMonitor::new(v, "volume:1".into(), hb, directory.clone(), fast());
    monitor.register().await.unwrap();
    assert_eq!(directory.assign_volume().unwrap().0, v);

    // server stops answering: one missed ping is enough
    healthy.store(false, Ordering::SeqCst);
    assert_eq!(monitor.step().await, ServerState::Dead);
    assert!(matches!(
        directory.assign_volume(),
        Err(Error::Unavailable(_))
    ));
    // reads still resolve the address
    assert_eq!(directory.get_volume_location(&v).unwrap(), "volume:1");

    // re-registration keeps failing while the server is down
    assert_eq!(monitor.step().await, ServerState::Dead);
    assert_eq!(monitor.step().await, ServerState::Dead);
    assert_eq!(directory.state(&v).unwrap(), ServerState::Dead);

    // server comes back
    healthy.store(true, Ordering::SeqCst);
    assert_eq!(monitor.step().await, ServerState::Alive);
    assert_eq!(directory.assign_volume().unwrap().0, v);
    assert_eq!(monitor.step().await, ServerState::Alive);
}

async fn wait_for_state(directory: &Directory, v: &VolumeId, want: ServerState) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while directory.state(v).unwrap() != want {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("volume never became {}", want));
}

#[tokio::test]
async fn test_background_loop_tracks_liveness() {
    let directory = Arc::new(Directory::default());
    let liveness = LivenessMonitor::new(directory.clone(), fast());
    let healthy_flag = Arc::new(AtomicBool::new(true));
    let flaky_flag = Arc::new(AtomicBool::new(true));

    let healthy = VolumeId::generate();
    let flaky = VolumeId::generate();
    liveness
        .register(healthy, "volume:1".into(), flaky_responder(healthy_flag).await)
        .await
        .unwrap();
    liveness
        .register(flaky, "volume:2".into(), flaky_responder(flaky_flag.clone()).await)
        .await
        .unwrap();
    assert_eq!(liveness.monitored(), 2);

    flaky_flag.store(false, Ordering::SeqCst);
    wait_for_state(&directory, &flaky, ServerState::Dead).await;
    for _ in 0..20 {
        assert_eq!(directory.assign_volume().unwrap().0, healthy);
    }

    flaky_flag.store(true, Ordering::SeqCst);
    wait_for_state(&directory, &flaky, ServerState::Alive).await;
    assert_eq!(directory.state(&healthy).unwrap(), ServerState::Alive);

    liveness.shutdown();
    assert_eq!(liveness.monitored(), 0);
}

/// Answers the handshake, then reads pings forever without replying
async fn silent_responder() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    tokio::spawn(async move {
        loop {
            let (mut conn, _) = listener.accept().await.unwrap();
            tokio::spawn(async move {
                if read_frame(&mut conn).await.is_err() {
                    return;
                }
                if write_frame(&mut conn, &Frame::success(STATUS_OK))
                    .await
                    .is_err()
                {
                    return;
                }
                while read_frame(&mut conn).await.is_ok() {}
            });
        }
    });
    addr
}

#[tokio::test]
async fn test_unanswered_ping_times_out() {
    let directory = Arc::new(Directory::default());
    let settings = HeartbeatSettings {
        interval: Duration::from_millis(30),
        io_timeout: Duration::from_millis(200),
    };
    let v = VolumeId::generate();

    let mut monitor = ServerMonitor::new(
        v,
        "volume:1".into(),
        silent_responder().await,
        directory.clone(),
        settings,
    );
    monitor.register().await.unwrap();

    let started = tokio::time::Instant::now();
    let state = tokio::time::timeout(Duration::from_secs(2), monitor.step())
        .await
        .expect("a silent peer must not block the monitor");
    let elapsed = started.elapsed();

    assert_eq!(state, ServerState::Dead);
    assert!(elapsed >= settings.io_timeout);
    assert!(elapsed < settings.io_timeout * 5);
    assert_eq!(directory.state(&v).unwrap(), ServerState::Dead);
}
