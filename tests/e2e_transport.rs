//! End-to-end transport tests.
//!
//! These tests count the datagrams a peer actually receives, so they catch
//! retry loops that send more (or fewer) packets than the policy allows.

mod support;

use std::net::Ipv4Addr;
use std::time::Duration;

use drcom::{DrcomError, RetryPolicy, Transport};
use support::MockServer;

async fn transport() -> Transport {
    Transport::bind((Ipv4Addr::LOCALHOST, 0).into()).await.unwrap()
}

#[tokio::test]
async fn test_silent_peer_gets_max_attempts() {
    let server = MockServer::start().await;
    server.update(|s| s.silent = true);
    let transport = transport().await;
    let policy = RetryPolicy::new(3, Duration::from_millis(100));

    let err = transport
        .send_and_receive(&[0x01, 0x02, 0x00, 0x00, 0x0a], server.addr(), &policy)
        .await
        .unwrap_err();

    match err {
        DrcomError::TransportTimeout {
            attempts,
            interrupted,
            last_packet,
        } => {
            assert_eq!(attempts, 3);
            assert!(!interrupted);
            assert_eq!(last_packet, vec![0x01, 0x02, 0x00, 0x00, 0x0a]);
        },
        other => panic!("Expected timeout, got {other:?}"),
    }
    assert_eq!(server.count(), 3);

    let stats = transport.stats();
    assert_eq!(stats.sent(), 3);
    assert_eq!(stats.timeouts(), 3);
    assert_eq!(stats.received(), 0);
}

#[tokio::test]
async fn test_responsive_peer_gets_one_datagram() {
    let server = MockServer::start().await;
    let transport = transport().await;
    let policy = RetryPolicy::new(3, Duration::from_millis(500));

    let (reply, source) = transport
        .send_and_receive(&[0x01, 0x02, 0x34, 0x12, 0x0a], server.addr(), &policy)
        .await
        .unwrap();

    assert_eq!(source, server.addr());
    assert_eq!(&reply[..4], &[0x02, 0x02, 0x34, 0x12]);
    assert_eq!(server.count(), 1);
    assert_eq!(transport.stats().sent(), 1);
    assert_eq!(transport.stats().received(), 1);
}

#[tokio::test]
async fn test_interrupt_stops_retrying() {
    let server = MockServer::start().await;
    server.update(|s| s.silent = true);
    let transport = transport().await;
    let interrupt = transport.interrupt();
    let policy = RetryPolicy::new(10, Duration::from_secs(5));

    let raiser = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        interrupt.set();
    });

    let started = std::time::Instant::now();
    let err = transport
        .send_and_receive(&[0xff], server.addr(), &policy)
        .await
        .unwrap_err();
    raiser.await.unwrap();

    assert!(matches!(
        err,
        DrcomError::TransportTimeout {
            attempts: 1,
            interrupted: true,
            ..
        }
    ));
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(server.count(), 1);
}
