//! Relay routing scenarios driven through the hub's public API.

use nami_relay::common::config::RelaySettings;
use nami_relay::common::messages::{Ack, AckStatus, BitmapFrame, Envelope, Payload};
use nami_relay::server::{PeerHints, RelayHub, Role, RouteOutcome};
use tokio::sync::mpsc::Receiver;

const IDENTIFY: &str = r#"{"type":"identify","client":"ESP32"}"#;

fn hub() -> RelayHub {
    RelayHub::new(RelaySettings::default())
}

fn browser() -> PeerHints {
    PeerHints::user_agent("Mozilla/5.0 (Macintosh; Intel Mac OS X 14_0) Safari/605.1.15")
}

fn device() -> PeerHints {
    PeerHints::user_agent("arduino-WebSocket-Client")
}

fn drain(rx: &mut Receiver<Payload>) -> Vec<Payload> {
    let mut out = Vec::new();
    while let Ok(payload) = rx.try_recv() {
        out.push(payload);
    }
    out
}

fn ack(payload: &Payload) -> Ack {
    serde_json::from_str(&payload.as_text()).expect("ack envelope")
}

#[tokio::test]
async fn test_web_hello_reaches_device_and_acks_success() {
    let hub = hub();
    let (a, role_a, mut rx_a) = hub.connect(&browser()).await;
    let (_b, role_b, mut rx_b) = hub.connect(&device()).await;
    assert_eq!((role_a, role_b), (Role::Web, Role::Device));

    let outcome = hub.route(&a, Payload::from("hello")).await;

    assert_eq!(outcome, RouteOutcome::ForwardedToDevices(1));
    assert_eq!(drain(&mut rx_b), vec![Payload::from("hello")]);
    let acks = drain(&mut rx_a);
    assert_eq!(acks.len(), 1);
    assert_eq!(ack(&acks[0]).status, AckStatus::Success);
}

#[tokio::test]
async fn test_web_message_without_devices_is_lost_with_one_error_ack() {
    let hub = hub();
    let (a, _, mut rx_a) = hub.connect(&browser()).await;
    let (_other_web, _, mut rx_other) = hub.connect(&browser()).await;

    let outcome = hub.route(&a, Payload::from("anyone there?")).await;

    assert_eq!(outcome, RouteOutcome::NoDevices);
    let acks = drain(&mut rx_a);
    assert_eq!(acks.len(), 1);
    assert_eq!(ack(&acks[0]).status, AckStatus::Error);
    assert!(drain(&mut rx_other).is_empty());

    // A device that shows up later gets nothing from before
    let (_late, _, mut rx_late) = hub.connect(&device()).await;
    assert!(drain(&mut rx_late).is_empty());
}

#[tokio::test]
async fn test_web_message_reaches_every_open_device() {
    let hub = hub();
    let (a, _, mut rx_a) = hub.connect(&browser()).await;
    let (_d1, _, mut rx_d1) = hub.connect(&device()).await;
    let (_d2, _, mut rx_d2) = hub.connect(&device()).await;
    let (_d3, _, rx_d3) = hub.connect(&device()).await;
    // d3's writer is gone but it has not been unregistered yet
    drop(rx_d3);

    let outcome = hub.route(&a, Payload::from("draw")).await;

    assert_eq!(outcome, RouteOutcome::ForwardedToDevices(2));
    assert_eq!(drain(&mut rx_d1), vec![Payload::from("draw")]);
    assert_eq!(drain(&mut rx_d2), vec![Payload::from("draw")]);
    assert_eq!(drain(&mut rx_a).len(), 1);
}

#[tokio::test]
async fn test_only_closed_devices_counts_as_no_devices() {
    let hub = hub();
    let (a, _, mut rx_a) = hub.connect(&browser()).await;
    let (_d, _, rx_d) = hub.connect(&device()).await;
    drop(rx_d);

    assert_eq!(hub.route(&a, Payload::from("x")).await, RouteOutcome::NoDevices);
    assert_eq!(ack(&drain(&mut rx_a)[0]).status, AckStatus::Error);
}

#[tokio::test]
async fn test_stalled_device_stops_counting_as_delivered() {
    let hub = RelayHub::new(RelaySettings {
        outbound_capacity: 3,
        ..RelaySettings::default()
    });
    let (web, _, mut rx_web) = hub.connect(&browser()).await;
    let (_stalled, _, mut rx_stalled) = hub.connect(&device()).await;
    let (_healthy, _, mut rx_healthy) = hub.connect(&device()).await;

    // The stalled device never reads; its queue takes three frames
    for i in 0..3 {
        assert_eq!(
            hub.route(&web, Payload::from(format!("frame {}", i))).await,
            RouteOutcome::ForwardedToDevices(2)
        );
        assert_eq!(drain(&mut rx_healthy).len(), 1);
        assert_eq!(ack(&drain(&mut rx_web)[0]).status, AckStatus::Success);
    }

    // Full queue: dropped for the stalled device only
    assert_eq!(
        hub.route(&web, Payload::from("overflow")).await,
        RouteOutcome::ForwardedToDevices(1)
    );
    assert_eq!(drain(&mut rx_healthy), vec![Payload::from("overflow")]);
    drain(&mut rx_web);

    // With only the stalled device left, nothing is delivered
    drop(rx_healthy);
    assert_eq!(
        hub.route(&web, Payload::from("lost")).await,
        RouteOutcome::NoDevices
    );
    assert_eq!(ack(&drain(&mut rx_web)[0]).status, AckStatus::Error);

    let queued = drain(&mut rx_stalled);
    assert_eq!(queued.len(), 3);
    assert_eq!(queued[0], Payload::from("frame 0"));

    // Once it reads again it is a recipient again
    assert_eq!(
        hub.route(&web, Payload::from("resumed")).await,
        RouteOutcome::ForwardedToDevices(1)
    );
    assert_eq!(drain(&mut rx_stalled), vec![Payload::from("resumed")]);
}

#[tokio::test]
async fn test_identify_twice_moves_exactly_once() {
    let hub = hub();
    let (a, _, mut rx_a) = hub.connect(&browser()).await;
    let (_w, _, mut rx_w) = hub.connect(&browser()).await;
    assert_eq!(hub.counts().await, (2, 0));

    assert_eq!(
        hub.route(&a, Payload::from(IDENTIFY)).await,
        RouteOutcome::Identified
    );
    assert_eq!(hub.counts().await, (1, 1));
    assert_eq!(hub.role_of(&a).await, Some(Role::Device));

    assert_eq!(
        hub.route(&a, Payload::from(IDENTIFY)).await,
        RouteOutcome::AlreadyDevice
    );
    assert_eq!(hub.counts().await, (1, 1));

    // Identify messages are consumed: no acks, no forwards
    assert!(drain(&mut rx_a).is_empty());
    assert!(drain(&mut rx_w).is_empty());
}

#[tokio::test]
async fn test_identified_device_receives_web_traffic() {
    let hub = hub();
    let (web, _, mut rx_web) = hub.connect(&browser()).await;
    let (board, _, mut rx_board) = hub.connect(&PeerHints::default()).await;
    hub.route(&board, Payload::from(IDENTIFY)).await;

    hub.route(&web, Payload::from("after identify")).await;
    assert_eq!(drain(&mut rx_board), vec![Payload::from("after identify")]);
    assert_eq!(ack(&drain(&mut rx_web)[0]).status, AckStatus::Success);

    // And its own messages now go to web peers wrapped
    hub.route(&board, Payload::from("pong")).await;
    let wrapped: Envelope = serde_json::from_str(&drain(&mut rx_web)[0].as_text()).unwrap();
    assert_eq!(
        wrapped,
        Envelope::Device {
            message: "pong".to_string()
        }
    );
}

#[tokio::test]
async fn test_malformed_json_is_passed_through() {
    let hub = hub();
    let (web, _, _rx_web) = hub.connect(&browser()).await;
    let (_d, _, mut rx_d) = hub.connect(&device()).await;

    let broken = r#"{"type":"identify","client":"ESP32""#;
    assert_eq!(
        hub.route(&web, Payload::from(broken)).await,
        RouteOutcome::ForwardedToDevices(1)
    );
    assert_eq!(drain(&mut rx_d), vec![Payload::from(broken)]);
    assert_eq!(hub.counts().await, (1, 1));
}

#[tokio::test]
async fn test_binary_frames_are_forwarded_verbatim() {
    let hub = hub();
    let (web, _, _rx_web) = hub.connect(&browser()).await;
    let (_d, _, mut rx_d) = hub.connect(&device()).await;

    let frame = Payload::Binary(vec![0x00, 0xFF, 0x10]);
    hub.route(&web, frame.clone()).await;

    assert_eq!(drain(&mut rx_d), vec![frame]);
}

#[tokio::test]
async fn test_bitmap_broadcast_reaches_devices_only() {
    let hub = hub();
    let (_web, _, mut rx_web) = hub.connect(&browser()).await;

    let push = Envelope::BitmapPush {
        data: BitmapFrame {
            id: 25,
            name: "pikachu".to_string(),
            width: 8,
            height: 2,
            bitmap_data: vec![0x18, 0x3C],
        },
    };
    assert!(!hub.broadcast_to_devices(&push).await.unwrap());

    let (_d1, _, mut rx_d1) = hub.connect(&device()).await;
    let (_d2, _, mut rx_d2) = hub.connect(&device()).await;
    assert!(hub.broadcast_to_devices(&push).await.unwrap());

    for rx in [&mut rx_d1, &mut rx_d2] {
        let received = drain(rx);
        assert_eq!(received.len(), 1);
        let envelope: Envelope = serde_json::from_str(&received[0].as_text()).unwrap();
        assert_eq!(envelope, push);
    }
    assert!(drain(&mut rx_web).is_empty());
}

#[tokio::test]
async fn test_disconnect_releases_membership() {
    let hub = hub();
    let (web, _, _rx_web) = hub.connect(&browser()).await;
    let (dev, _, _rx_dev) = hub.connect(&device()).await;

    assert_eq!(hub.disconnect(&dev).await, Some(Role::Device));
    assert_eq!(hub.disconnect(&dev).await, None);
    assert_eq!(hub.counts().await, (1, 0));
    assert_eq!(hub.route(&web, Payload::from("x")).await, RouteOutcome::NoDevices);

    hub.disconnect(&web).await;
    assert_eq!(hub.counts().await, (0, 0));
}

#[tokio::test]
async fn test_concurrent_connections_share_one_registry() {
    let hub = std::sync::Arc::new(hub());

    let handles: Vec<_> = (0..32)
        .map(|i| {
            let hub = std::sync::Arc::clone(&hub);
            tokio::spawn(async move {
                let hints = if i % 2 == 0 { device() } else { browser() };
                let (id, _, rx) = hub.connect(&hints).await;
                hub.route(&id, Payload::from("noise")).await;
                if i % 4 == 0 {
                    hub.disconnect(&id).await;
                }
                (id, rx)
            })
        })
        .collect();

    let mut live = Vec::new();
    for handle in handles {
        live.push(handle.await.unwrap());
    }

    // 16 devices, 8 of them disconnected; 16 web peers
    assert_eq!(hub.counts().await, (16, 8));
    drop(live);
}
