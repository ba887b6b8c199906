//! Loopback tests for the channel layer and the link facade
//!
//! These run a [`FakeDrone`] on `127.0.0.1` and drive real UDP sockets, so
//! they exercise binding, the receive loops and dispatch end to end.

use super::*;
use crate::test_utils::{FakeDrone, sample_telemetry, synthetic_video};
use crate::types::{Command, EventKind, UpdateRate};
use crate::{DroneLink, LinkError};
use futures::{FutureExt, StreamExt};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;

const WAIT: Duration = Duration::from_secs(2);

#[tokio::test]
async fn telemetry_channel_emits_one_frame_per_datagram() {
    let _ = tracing_subscriber::fmt::try_init();

    let drone = FakeDrone::start().await;
    let config = drone.link_config(500);
    let bus = Arc::new(crate::bus::EventBus::default());
    let (tx, mut rx) = mpsc::unbounded_channel();
    bus.subscribe(EventKind::Telemetry, move |event| {
        let _ = tx.send(event.as_telemetry().cloned());
    });

    let channel = TelemetryChannel::bind(&config.telemetry).await.unwrap();
    let addr = channel.local_addr().unwrap();
    let cancel = CancellationToken::new();
    let handle = channel.spawn(Arc::clone(&bus), cancel.clone());

    drone.push(addr, sample_telemetry()).await;
    drone.push(addr, b"pitch:-7;roll:abc;bat:85;").await;

    let first = tokio::time::timeout(WAIT, rx.recv()).await.unwrap().unwrap().unwrap();
    assert_eq!(first.yaw(), Some(-45.0));
    assert!(!first.contains("mpry"));

    let second = tokio::time::timeout(WAIT, rx.recv()).await.unwrap().unwrap().unwrap();
    assert_eq!(second.len(), 2);
    assert_eq!(second.pitch(), Some(-7.0));

    cancel.cancel();
    handle.await.unwrap();
}

#[tokio::test]
async fn video_channel_reassembles_datagrams() {
    let drone = FakeDrone::start().await;
    let config = drone.link_config(500);
    let bus = Arc::new(crate::bus::EventBus::default());
    let mut frames = Box::pin(bus.video_stream());

    let channel = VideoChannel::bind(&config.video).await.unwrap();
    let addr = channel.local_addr().unwrap();
    let cancel = CancellationToken::new();
    let handle = channel.spawn(Arc::clone(&bus), cancel.clone());

    // Four groups of three units close three frames; the last group stays buffered
    for datagram in synthetic_video(4, 3, 2) {
        drone.push(addr, &datagram).await;
        // Loopback can still reorder under load without a little pacing
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    for expected in 0..3u64 {
        let frame = tokio::time::timeout(WAIT, frames.next()).await.unwrap().unwrap();
        assert_eq!(frame.sequence, expected);
        assert_eq!(frame.nal_units().count(), 3);
    }
    assert_eq!(frames.next().now_or_never(), None);

    cancel.cancel();
    handle.await.unwrap();
}

#[tokio::test]
async fn bind_conflict_is_reported() {
    let drone = FakeDrone::start().await;
    let mut config = drone.link_config(500);
    let first = TelemetryChannel::bind(&config.telemetry).await.unwrap();
    config.telemetry.bind = first.local_addr().unwrap();

    match TelemetryChannel::bind(&config.telemetry).await {
        Err(LinkError::Bind { channel, .. }) => assert_eq!(channel, crate::ChannelKind::Telemetry),
        Err(other) => panic!("expected Bind error, got {other:?}"),
        Ok(_) => panic!("second bind on the same port should fail"),
    }
}

#[tokio::test]
async fn link_start_handshakes_then_dispatches() {
    let _ = tracing_subscriber::fmt::try_init();

    let drone = FakeDrone::start().await;
    let link = DroneLink::new(drone.link_config(500));

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    link.on_telemetry(move |frame| sink.lock().unwrap().push(frame.battery()));

    link.start().await.unwrap();
    assert!(link.is_running());
    assert_eq!(drone.received(), vec!["command".to_string(), "streamon".to_string()]);

    let telemetry = link.local_addr(crate::ChannelKind::Telemetry).unwrap();
    drone.push(telemetry, b"bat:64;").await;

    tokio::time::timeout(WAIT, async {
        while seen.lock().unwrap().is_empty() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("telemetry handler should fire");
    assert_eq!(*seen.lock().unwrap(), vec![Some(64.0)]);

    let reply = link.send("takeoff").await.unwrap();
    assert!(reply.is_ok());
    info!("Drone accepted takeoff");

    link.stop().await;
    assert!(!link.is_running());
    assert_eq!(link.handler_count(EventKind::Telemetry), 0);
}

#[tokio::test]
async fn link_start_fails_when_drone_is_silent() {
    let drone = FakeDrone::start().await;
    drone.stay_silent("command");
    let link = DroneLink::new(drone.link_config(100));

    match link.start().await {
        Err(LinkError::Handshake { step, source }) => {
            assert_eq!(step, "command");
            assert!(matches!(*source, LinkError::Timeout { .. }));
        }
        other => panic!("expected handshake failure, got {other:?}"),
    }
    assert!(!link.is_running());
    assert!(matches!(link.send(Command::land()).await, Err(LinkError::NotStarted)));

    // Partial start leaves nothing behind; stop is still fine
    link.stop().await;
    link.stop().await;
}

#[tokio::test]
async fn link_start_fails_on_rejected_streamon() {
    let drone = FakeDrone::start().await;
    drone.reply_with("streamon", "error");
    let link = DroneLink::new(drone.link_config(500));

    let err = link.start().await.unwrap_err();
    match err {
        LinkError::Handshake { step, source } => {
            assert_eq!(step, "streamon");
            assert!(matches!(*source, LinkError::Rejected { .. }));
        }
        other => panic!("expected handshake failure, got {other:?}"),
    }
    assert!(!link.is_running());
}

#[tokio::test]
async fn stop_on_a_fresh_link_is_a_no_op() {
    let drone = FakeDrone::start().await;
    let link = DroneLink::new(drone.link_config(500));
    link.on_video(|_| {});

    link.stop().await;
    link.stop().await;

    assert!(!link.is_running());
    assert_eq!(link.handler_count(EventKind::Video), 0);
    assert!(drone.received().is_empty());
    assert!(matches!(link.send(Command::takeoff()).await, Err(LinkError::NotStarted)));

    // A stopped-before-started link can still come up
    link.start().await.unwrap();
    assert!(link.is_running());
    link.stop().await;
}

#[tokio::test]
async fn link_can_restart_after_stop() {
    let drone = FakeDrone::start().await;
    let link = DroneLink::new(drone.link_config(500));

    link.start().await.unwrap();
    link.start().await.unwrap();
    link.stop().await;
    link.start().await.unwrap();
    assert!(link.is_running());
    assert_eq!(drone.received().len(), 4);
    link.stop().await;
}

#[tokio::test]
async fn stop_during_start_aborts_the_handshake() {
    let drone = FakeDrone::start().await;
    drone.stay_silent("command");
    let link = Arc::new(DroneLink::new(drone.link_config(10_000)));

    let starting = {
        let link = Arc::clone(&link);
        tokio::spawn(async move { link.start().await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    tokio::time::timeout(WAIT, link.stop()).await.expect("stop should not wait for the timeout");
    let result = tokio::time::timeout(WAIT, starting).await.unwrap().unwrap();
    assert!(matches!(result, Err(LinkError::Handshake { .. })), "got {result:?}");
    assert!(!link.is_running());
}

#[tokio::test]
async fn throttled_stream_keeps_latest_frame() {
    let drone = FakeDrone::start().await;
    let link = DroneLink::connect(drone.link_config(500)).await.unwrap();
    let mut frames = Box::pin(link.telemetry_stream(UpdateRate::Max(5)));
    let telemetry = link.local_addr(crate::ChannelKind::Telemetry).unwrap();

    drone.push(telemetry, b"h:1;").await;
    let first = tokio::time::timeout(WAIT, frames.next()).await.unwrap().unwrap();
    assert_eq!(first.height(), Some(1.0));

    for h in 2..=6 {
        drone.push(telemetry, format!("h:{h};").as_bytes()).await;
    }
    tokio::time::sleep(Duration::from_millis(50)).await;

    let next = tokio::time::timeout(WAIT, frames.next()).await.unwrap().unwrap();
    assert_eq!(next.height(), Some(6.0));

    link.stop().await;
}
