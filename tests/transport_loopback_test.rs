//! Integration tests for the WebSocket transport over the loopback facility.

use bytes::Bytes;
use r0n_ws_transport::completion::{ActionWaiter, CompletionWaiter};
use r0n_ws_transport::config::{CloseStatusCheck, TransportConfig};
use r0n_ws_transport::context::{CancelReason, Context};
use r0n_ws_transport::native::{LoopbackNative, NativeErrorCode, NativeWebSocketApi};
use r0n_ws_transport::websocket::{
    ErrorKind, FrameType, TransportError, TransportState, WebSocketTransport,
};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Two upgraded transports connected to each other.
struct Pair {
    native: LoopbackNative,
    client: Arc<WebSocketTransport>,
    server: Arc<WebSocketTransport>,
}

fn pair_with(config: TransportConfig) -> Pair {
    let native = LoopbackNative::new().unwrap();
    let (client_request, server_request) = native.connect_pair();
    let facility: Arc<dyn NativeWebSocketApi> = Arc::new(native.clone());

    let client = Arc::new(WebSocketTransport::new(
        Arc::clone(&facility),
        config.clone(),
    ));
    let server = Arc::new(WebSocketTransport::new(facility, config));
    client.upgrade(client_request).unwrap();
    server.upgrade(server_request).unwrap();

    Pair {
        native,
        client,
        server,
    }
}

fn pair() -> Pair {
    pair_with(TransportConfig::default())
}

fn timeout() -> Context {
    Context::new().with_timeout(Duration::from_secs(10))
}

#[test]
fn test_text_message_round_trip() {
    let pair = pair();
    let context = timeout();

    pair.client
        .send(FrameType::Text, "hello", &context)
        .unwrap();
    let frame = pair.server.receive(&context).unwrap();

    assert_eq!(frame.frame_type, FrameType::Text);
    assert_eq!(&frame.payload[..], b"hello");
    assert_eq!(pair.client.stats().snapshot().bytes_sent, 5);
    assert_eq!(pair.server.stats().snapshot().bytes_received, 5);
}

#[test]
fn test_large_message_arrives_as_fragments() {
    let pair = pair();
    let context = timeout();
    let payload: Vec<u8> = (0..300u32).map(|i| i as u8).collect();

    pair.client
        .send(FrameType::Binary, payload.clone(), &context)
        .unwrap();

    let mut frames = Vec::new();
    loop {
        let frame = pair.server.receive(&context).unwrap();
        let done = !frame.frame_type.is_fragment();
        frames.push(frame);
        if done {
            break;
        }
    }

    let kinds: Vec<FrameType> = frames.iter().map(|f| f.frame_type).collect();
    assert_eq!(
        kinds,
        vec![
            FrameType::BinaryFragment,
            FrameType::BinaryFragment,
            FrameType::Binary
        ]
    );
    let lengths: Vec<usize> = frames.iter().map(|f| f.len()).collect();
    assert_eq!(lengths, vec![128, 128, 44]);

    let reassembled: Vec<u8> = frames
        .iter()
        .flat_map(|f| f.payload.iter().copied())
        .collect();
    assert_eq!(reassembled, payload);
}

#[test]
fn test_fragments_sent_by_caller_keep_their_kind() {
    let pair = pair();
    let context = timeout();

    pair.client
        .send(FrameType::TextFragment, "hel", &context)
        .unwrap();
    pair.client.send(FrameType::Text, "lo", &context).unwrap();

    let first = pair.server.receive(&context).unwrap();
    let second = pair.server.receive(&context).unwrap();
    assert_eq!(first.frame_type, FrameType::TextFragment);
    assert_eq!(second.frame_type, FrameType::Text);
}

#[test]
fn test_duplex_send_while_receive_is_blocked() {
    let pair = pair();

    let receiver = {
        let server = Arc::clone(&pair.server);
        thread::spawn(move || server.receive(&timeout()))
    };
    thread::sleep(Duration::from_millis(50));

    // The server's receive lock is held; its send path stays free.
    pair.server
        .send(FrameType::Text, "from-server", &timeout())
        .unwrap();
    let frame = pair.client.receive(&timeout()).unwrap();
    assert_eq!(&frame.payload[..], b"from-server");

    pair.client
        .send(FrameType::Text, "from-client", &timeout())
        .unwrap();
    let frame = receiver.join().unwrap().unwrap();
    assert_eq!(&frame.payload[..], b"from-client");
}

#[test]
fn test_concurrent_senders_deliver_every_frame() {
    let pair = pair();
    let senders: Vec<_> = (0..4u8)
        .map(|id| {
            let client = Arc::clone(&pair.client);
            thread::spawn(move || {
                for seq in 0..10u8 {
                    client
                        .send(FrameType::Binary, vec![id, seq], &timeout())
                        .unwrap();
                }
            })
        })
        .collect();
    for sender in senders {
        sender.join().unwrap();
    }

    let mut last_seq = [None::<u8>; 4];
    for _ in 0..40 {
        let frame = pair.server.receive(&timeout()).unwrap();
        let (id, seq) = (frame.payload[0] as usize, frame.payload[1]);
        if let Some(previous) = last_seq[id] {
            assert!(seq > previous, "frames from one sender reordered");
        }
        last_seq[id] = Some(seq);
    }
    assert_eq!(pair.server.stats().snapshot().frames_received, 40);
}

#[test]
fn test_receive_times_out_without_data() {
    let pair = pair();
    let context = Context::new().with_timeout(Duration::from_millis(30));

    let err = pair.client.receive(&context).unwrap_err();
    assert!(matches!(
        err,
        TransportError::Cancelled {
            operation: "receive",
            reason: CancelReason::DeadlineExceeded,
        }
    ));
    assert_eq!(err.kind(), ErrorKind::Cancelled);
}

#[test]
fn test_cancel_unblocks_receive() {
    let pair = pair();
    let context = Context::new();

    let receiver = {
        let client = Arc::clone(&pair.client);
        let context = context.clone();
        thread::spawn(move || client.receive(&context))
    };
    thread::sleep(Duration::from_millis(50));
    context.cancel();

    let err = receiver.join().unwrap().unwrap_err();
    assert!(err.is_cancelled());
}

#[test]
fn test_two_phase_close_handshake() {
    let pair = pair();

    let responder = {
        let server = Arc::clone(&pair.server);
        thread::spawn(move || {
            let context = timeout();
            let frame = server.receive(&context).unwrap();
            assert!(frame.is_close());
            let info = server.query_close_info(&context).unwrap();
            server
                .native_close_socket(info.status_code, &info.reason, &context)
                .unwrap();
            info
        })
    };

    let info = pair
        .client
        .native_close_socket(1000, "bye", &timeout())
        .unwrap();
    let seen_by_server = responder.join().unwrap();

    assert_eq!(seen_by_server.status_code, 1000);
    assert_eq!(seen_by_server.reason, "bye");
    assert_eq!(info.status_code, 1000);
    assert_eq!(info.reason, "bye");
    assert_eq!(pair.client.state(), TransportState::Open);
    assert_eq!(pair.server.stats().snapshot().closes_received, 1);
}

#[test]
fn test_close_status_mismatch_is_protocol_fault() {
    let pair = pair();

    let responder = {
        let server = Arc::clone(&pair.server);
        thread::spawn(move || {
            let context = timeout();
            server.receive(&context).unwrap();
            server.native_close_socket(1001, "", &context)
        })
    };

    let err = pair
        .client
        .native_close_socket(1000, "", &timeout())
        .unwrap_err();
    assert!(matches!(
        err,
        TransportError::CloseStatusMismatch {
            expected: 1000,
            received: 1001,
        }
    ));

    // The server sent 1001 but received the client's 1000.
    let server_err = responder.join().unwrap().unwrap_err();
    assert!(matches!(
        server_err,
        TransportError::CloseStatusMismatch {
            expected: 1001,
            received: 1000,
        }
    ));
}

#[test]
fn test_advisory_close_check_accepts_mismatch() {
    let pair = pair_with(TransportConfig {
        close_status_check: CloseStatusCheck::Advisory,
        ..TransportConfig::default()
    });

    let responder = {
        let server = Arc::clone(&pair.server);
        thread::spawn(move || {
            let context = timeout();
            server.receive(&context).unwrap();
            server.native_close_socket(1001, "going away", &context)
        })
    };

    let info = pair
        .client
        .native_close_socket(1000, "", &timeout())
        .unwrap();
    assert_eq!(info.status_code, 1001);
    assert_eq!(info.reason, "going away");
    responder.join().unwrap().unwrap();
}

#[test]
fn test_close_releases_handle_once() {
    let pair = pair();
    assert_eq!(pair.native.live_sockets(), 2);

    pair.client.close();
    pair.client.close();
    assert_eq!(pair.client.state(), TransportState::Closed);
    assert_eq!(pair.native.live_sockets(), 1);

    let err = pair
        .client
        .send(FrameType::Binary, Bytes::from_static(b"x"), &timeout())
        .unwrap_err();
    assert!(matches!(
        err,
        TransportError::InvalidState {
            current: TransportState::Closed,
            ..
        }
    ));
}

#[test]
fn test_peer_release_fails_pending_receive() {
    let pair = pair();

    let receiver = {
        let server = Arc::clone(&pair.server);
        thread::spawn(move || server.receive(&timeout()))
    };
    thread::sleep(Duration::from_millis(50));
    pair.client.close();

    let err = receiver.join().unwrap().unwrap_err();
    assert_eq!(err.native_code(), Some(NativeErrorCode::CONNECTION_ERROR));
    assert_eq!(pair.server.stats().snapshot().native_errors, 1);
}

#[test]
fn test_close_cancels_own_pending_receive() {
    let pair = pair();

    let receiver = {
        let client = Arc::clone(&pair.client);
        thread::spawn(move || client.receive(&timeout()))
    };
    thread::sleep(Duration::from_millis(50));
    pair.client.close();

    let err = receiver.join().unwrap().unwrap_err();
    assert_eq!(err.native_code(), Some(NativeErrorCode::OPERATION_CANCELLED));
}

#[test]
fn test_drop_releases_socket() {
    let pair = pair();
    let Pair {
        native,
        client,
        server,
    } = pair;

    drop(client);
    drop(server);
    assert_eq!(native.live_sockets(), 0);
}

#[test]
fn test_shared_waiter_refuses_second_transport() {
    let native = LoopbackNative::new().unwrap();
    let (client_request, server_request) = native.connect_pair();
    let facility: Arc<dyn NativeWebSocketApi> = Arc::new(native.clone());
    let waiter = Arc::new(ActionWaiter::new(
        Arc::clone(&facility),
        Duration::from_millis(5),
    ));

    let client = WebSocketTransport::with_waiter(
        Arc::clone(&facility),
        Arc::clone(&waiter) as Arc<dyn CompletionWaiter>,
        TransportConfig::default(),
    );
    let server = WebSocketTransport::with_waiter(facility, waiter, TransportConfig::default());
    client.upgrade(client_request).unwrap();

    let err = server.upgrade(server_request).unwrap_err();
    assert!(matches!(err, TransportError::Upgrade { .. }));
    assert_eq!(server.state(), TransportState::Closed);
    assert_eq!(native.live_sockets(), 1);

    // The bound transport still completes its own close.
    client.close();
    assert_eq!(client.state(), TransportState::Closed);
    assert_eq!(native.live_sockets(), 0);
}

#[test]
fn test_cancelled_close_after_failed_close_reports_cancellation() {
    let pair = pair();
    pair.server.close();

    let err = pair
        .client
        .native_close_socket(1000, "bye", &timeout())
        .unwrap_err();
    assert_eq!(err.native_code(), Some(NativeErrorCode::CONNECTION_ERROR));

    let context = Context::new();
    context.cancel();
    let err = pair
        .client
        .native_close_socket(1000, "bye", &context)
        .unwrap_err();
    assert!(err.is_cancelled());
    assert_eq!(err.native_code(), None);
}
