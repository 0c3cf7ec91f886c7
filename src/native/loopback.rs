//! In-process native facility connecting pairs of sockets.
//!
//! Both ends of a pair live in the same process. Operations are queued
//! against shared state and their completions are delivered, in issue order,
//! by a dedicated dispatcher thread, so callers observe the same threading as
//! with a real completion-port style facility.

use super::{
    BufferType, Completion, CompletionSink, CompletionStatus, NativeCloseStatus,
    NativeErrorCode, NativeWebSocketApi, RawSocket, ReceiveBuffer, RequestHandle,
};
use bytes::Bytes;
use std::collections::{HashMap, VecDeque};
use std::io;
use std::num::NonZeroU64;
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex};
use std::thread;
use tracing::{debug, trace};

/// A completion waiting to be handed to its sink.
struct Dispatch {
    sink: Arc<dyn CompletionSink>,
    socket: RawSocket,
    completion: Completion,
}

/// A frame queued at the receiving end.
#[derive(Debug)]
enum InboundFrame {
    Data {
        buffer_type: BufferType,
        payload: Bytes,
    },
    Close {
        status: u16,
        reason: Bytes,
    },
}

/// One end of a socket pair.
struct Endpoint {
    peer: RawSocket,
    sink: Option<Arc<dyn CompletionSink>>,
    notifications: bool,
    inbound: VecDeque<InboundFrame>,
    pending_receive: Option<ReceiveBuffer>,
    pending_close: bool,
    close_sent: bool,
    close_received: Option<NativeCloseStatus>,
}

impl Endpoint {
    fn new(peer: RawSocket) -> Self {
        Self {
            peer,
            sink: None,
            notifications: false,
            inbound: VecDeque::new(),
            pending_receive: None,
            pending_close: false,
            close_sent: false,
            close_received: None,
        }
    }
}

#[derive(Default)]
struct LoopbackState {
    next_handle: u64,
    requests: HashMap<RequestHandle, RawSocket>,
    sockets: HashMap<RawSocket, Endpoint>,
}

impl LoopbackState {
    fn allocate(&mut self) -> NonZeroU64 {
        let handle = NonZeroU64::MIN.saturating_add(self.next_handle);
        self.next_handle += 1;
        handle
    }

    fn upgraded(&mut self, socket: RawSocket) -> Result<&mut Endpoint, NativeErrorCode> {
        match self.sockets.get_mut(&socket) {
            Some(endpoint) if endpoint.sink.is_some() => Ok(endpoint),
            _ => Err(NativeErrorCode::INVALID_HANDLE),
        }
    }

    fn post(&self, socket: RawSocket, completion: Completion, outbox: &mut Vec<Dispatch>) {
        let Some(endpoint) = self.sockets.get(&socket) else {
            return;
        };
        Self::post_to(endpoint, socket, completion, outbox);
    }

    fn post_to(
        endpoint: &Endpoint,
        socket: RawSocket,
        completion: Completion,
        outbox: &mut Vec<Dispatch>,
    ) {
        match &endpoint.sink {
            Some(sink) if endpoint.notifications => outbox.push(Dispatch {
                sink: Arc::clone(sink),
                socket,
                completion,
            }),
            _ => trace!(
                socket = %socket,
                status = %completion.status,
                "Dropping completion for socket without notifications"
            ),
        }
    }

    /// Satisfy whatever the endpoint is waiting on from its inbound queue.
    fn deliver(&mut self, socket: RawSocket, outbox: &mut Vec<Dispatch>) {
        let peer_alive = match self.sockets.get(&socket) {
            Some(endpoint) => self.sockets.contains_key(&endpoint.peer),
            None => return,
        };
        let Some(endpoint) = self.sockets.get_mut(&socket) else {
            return;
        };

        if let Some(buffer) = endpoint.pending_receive.take() {
            let completion = match endpoint.inbound.front_mut() {
                None if peer_alive => {
                    endpoint.pending_receive = Some(buffer);
                    None
                },
                None => Some(Completion::failed(
                    CompletionStatus::ReadComplete,
                    NativeErrorCode::CONNECTION_ERROR,
                )),
                Some(InboundFrame::Data {
                    buffer_type,
                    payload,
                }) => {
                    if payload.len() <= buffer.capacity() {
                        let kind = *buffer_type;
                        let n = buffer.fill(payload);
                        endpoint.inbound.pop_front();
                        Some(Completion::read(n, kind.as_raw()))
                    } else {
                        let chunk = payload.split_to(buffer.capacity());
                        let n = buffer.fill(&chunk);
                        Some(Completion::read(n, buffer_type.as_fragment().as_raw()))
                    }
                },
                Some(InboundFrame::Close { .. }) => {
                    if let Some(InboundFrame::Close { status, reason }) =
                        endpoint.inbound.pop_front()
                    {
                        endpoint.close_received = Some(NativeCloseStatus {
                            status,
                            reason: reason.to_vec(),
                        });
                    }
                    Some(Completion::read(0, BufferType::Close.as_raw()))
                },
            };
            if let Some(completion) = completion {
                Self::post_to(endpoint, socket, completion, outbox);
            }
        }

        if endpoint.pending_close && endpoint.close_received.is_none() {
            let close_at = endpoint
                .inbound
                .iter()
                .position(|frame| matches!(frame, InboundFrame::Close { .. }));
            if let Some(index) = close_at {
                let drained: Vec<InboundFrame> = endpoint.inbound.drain(..=index).collect();
                if let Some(InboundFrame::Close { status, reason }) = drained.into_iter().last() {
                    endpoint.close_received = Some(NativeCloseStatus {
                        status,
                        reason: reason.to_vec(),
                    });
                }
            } else if !peer_alive {
                endpoint.pending_close = false;
                Self::post_to(
                    endpoint,
                    socket,
                    Completion::failed(
                        CompletionStatus::CloseComplete,
                        NativeErrorCode::CONNECTION_ERROR,
                    ),
                    outbox,
                );
            }
        }

        if endpoint.pending_close && endpoint.close_received.is_some() {
            endpoint.pending_close = false;
            Self::post_to(
                endpoint,
                socket,
                Completion::success(CompletionStatus::CloseComplete),
                outbox,
            );
        }
    }
}

struct Shared {
    state: Mutex<LoopbackState>,
    dispatch: Mutex<Sender<Dispatch>>,
}

impl Shared {
    fn lock(&self) -> std::sync::MutexGuard<'_, LoopbackState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn flush(&self, outbox: Vec<Dispatch>) {
        if outbox.is_empty() {
            return;
        }
        let sender = self.dispatch.lock().unwrap_or_else(|e| e.into_inner());
        for dispatch in outbox {
            if sender.send(dispatch).is_err() {
                debug!("Completion dispatcher has stopped");
                return;
            }
        }
    }
}

/// In-process native facility.
///
/// Cloning yields another handle to the same facility.
#[derive(Clone)]
pub struct LoopbackNative {
    shared: Arc<Shared>,
}

impl LoopbackNative {
    /// Create a facility and start its completion dispatcher thread.
    ///
    /// # Errors
    ///
    /// Returns an error if the dispatcher thread cannot be spawned.
    pub fn new() -> io::Result<Self> {
        let (tx, rx) = mpsc::channel::<Dispatch>();
        thread::Builder::new()
            .name("loopback-completions".to_string())
            .spawn(move || {
                for dispatch in rx {
                    dispatch
                        .sink
                        .on_completion(dispatch.socket, dispatch.completion);
                }
                trace!("Loopback completion dispatcher exiting");
            })?;

        Ok(Self {
            shared: Arc::new(Shared {
                state: Mutex::new(LoopbackState::default()),
                dispatch: Mutex::new(tx),
            }),
        })
    }

    /// Create two upgraded HTTP requests whose sockets are connected to each
    /// other.
    #[must_use]
    pub fn connect_pair(&self) -> (RequestHandle, RequestHandle) {
        let mut state = self.shared.lock();

        let req_a = RequestHandle::from(state.allocate());
        let req_b = RequestHandle::from(state.allocate());
        let sock_a = RawSocket::from(state.allocate());
        let sock_b = RawSocket::from(state.allocate());

        state.requests.insert(req_a, sock_a);
        state.requests.insert(req_b, sock_b);
        state.sockets.insert(sock_a, Endpoint::new(sock_b));
        state.sockets.insert(sock_b, Endpoint::new(sock_a));

        debug!(socket_a = %sock_a, socket_b = %sock_b, "Connected loopback pair");
        (req_a, req_b)
    }

    /// Number of socket handles not yet released.
    #[must_use]
    pub fn live_sockets(&self) -> usize {
        self.shared
            .lock()
            .sockets
            .values()
            .filter(|endpoint| endpoint.sink.is_some())
            .count()
    }
}

impl NativeWebSocketApi for LoopbackNative {
    fn complete_upgrade(
        &self,
        request: RequestHandle,
        sink: Arc<dyn CompletionSink>,
    ) -> Result<RawSocket, NativeErrorCode> {
        let mut state = self.shared.lock();
        let socket = *state
            .requests
            .get(&request)
            .ok_or(NativeErrorCode::INVALID_HANDLE)?;
        let endpoint = state
            .sockets
            .get_mut(&socket)
            .ok_or(NativeErrorCode::INVALID_HANDLE)?;
        if endpoint.sink.is_some() {
            return Err(NativeErrorCode::INVALID_OPERATION);
        }
        endpoint.sink = Some(sink);
        Ok(socket)
    }

    fn set_status_callback(&self, socket: RawSocket) -> Result<(), NativeErrorCode> {
        let mut state = self.shared.lock();
        state.upgraded(socket)?.notifications = true;
        Ok(())
    }

    fn send(
        &self,
        socket: RawSocket,
        buffer_type: BufferType,
        data: Bytes,
    ) -> Result<(), NativeErrorCode> {
        if buffer_type == BufferType::Close {
            return Err(NativeErrorCode::INVALID_OPERATION);
        }

        let mut outbox = Vec::new();
        {
            let mut state = self.shared.lock();
            let endpoint = state.upgraded(socket)?;
            if endpoint.close_sent {
                return Err(NativeErrorCode::INVALID_OPERATION);
            }
            let peer = endpoint.peer;
            let len = data.len();

            let peer_endpoint = state
                .sockets
                .get_mut(&peer)
                .ok_or(NativeErrorCode::CONNECTION_ERROR)?;
            peer_endpoint.inbound.push_back(InboundFrame::Data {
                buffer_type,
                payload: data,
            });
            state.deliver(peer, &mut outbox);
            state.post(socket, Completion::write(len), &mut outbox);
        }
        self.shared.flush(outbox);
        Ok(())
    }

    fn receive(&self, socket: RawSocket, buffer: ReceiveBuffer) -> Result<(), NativeErrorCode> {
        let mut outbox = Vec::new();
        let truncated = {
            let mut state = self.shared.lock();
            let endpoint = state.upgraded(socket)?;
            if endpoint.pending_receive.is_some() {
                return Err(NativeErrorCode::INVALID_OPERATION);
            }
            let truncated = matches!(
                endpoint.inbound.front(),
                Some(InboundFrame::Data { payload, .. }) if payload.len() > buffer.capacity()
            );
            endpoint.pending_receive = Some(buffer);
            state.deliver(socket, &mut outbox);
            truncated
        };
        self.shared.flush(outbox);

        if truncated {
            Err(NativeErrorCode::INSUFFICIENT_BUFFER)
        } else {
            Ok(())
        }
    }

    fn close(
        &self,
        socket: RawSocket,
        status: u16,
        reason: Option<Bytes>,
    ) -> Result<(), NativeErrorCode> {
        let mut outbox = Vec::new();
        {
            let mut state = self.shared.lock();
            let endpoint = state.upgraded(socket)?;
            if endpoint.close_sent {
                return Err(NativeErrorCode::INVALID_OPERATION);
            }
            endpoint.close_sent = true;
            endpoint.pending_close = true;
            let peer = endpoint.peer;

            if let Some(peer_endpoint) = state.sockets.get_mut(&peer) {
                peer_endpoint.inbound.push_back(InboundFrame::Close {
                    status,
                    reason: reason.unwrap_or_default(),
                });
                state.deliver(peer, &mut outbox);
            }
            state.deliver(socket, &mut outbox);
        }
        self.shared.flush(outbox);
        Ok(())
    }

    fn query_close_status(&self, socket: RawSocket) -> Result<NativeCloseStatus, NativeErrorCode> {
        let mut state = self.shared.lock();
        state
            .upgraded(socket)?
            .close_received
            .clone()
            .ok_or(NativeErrorCode::INVALID_OPERATION)
    }

    fn close_handle(&self, socket: RawSocket) {
        let mut outbox = Vec::new();
        {
            let mut state = self.shared.lock();
            let Some(endpoint) = state.sockets.remove(&socket) else {
                return;
            };

            if endpoint.pending_receive.is_some() {
                LoopbackState::post_to(
                    &endpoint,
                    socket,
                    Completion::failed(
                        CompletionStatus::ReadComplete,
                        NativeErrorCode::OPERATION_CANCELLED,
                    ),
                    &mut outbox,
                );
            }
            if endpoint.pending_close {
                LoopbackState::post_to(
                    &endpoint,
                    socket,
                    Completion::failed(
                        CompletionStatus::CloseComplete,
                        NativeErrorCode::OPERATION_CANCELLED,
                    ),
                    &mut outbox,
                );
            }
            LoopbackState::post_to(
                &endpoint,
                socket,
                Completion::success(CompletionStatus::HandleClosing),
                &mut outbox,
            );

            state.requests.retain(|_, s| *s != socket);
            state.deliver(endpoint.peer, &mut outbox);
            debug!(socket = %socket, "Loopback socket released");
        }
        self.shared.flush(outbox);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc::Receiver;
    use std::time::Duration;

    /// Sink forwarding completions to a channel.
    struct ChannelSink(Mutex<Sender<(RawSocket, Completion)>>);

    impl CompletionSink for ChannelSink {
        fn on_completion(&self, socket: RawSocket, completion: Completion) {
            let _ = self.0.lock().unwrap().send((socket, completion));
        }
    }

    fn sink() -> (Arc<dyn CompletionSink>, Receiver<(RawSocket, Completion)>) {
        let (tx, rx) = mpsc::channel();
        (Arc::new(ChannelSink(Mutex::new(tx))), rx)
    }

    fn next(rx: &Receiver<(RawSocket, Completion)>) -> Completion {
        rx.recv_timeout(Duration::from_secs(5)).unwrap().1
    }

    fn upgraded_pair(
        native: &LoopbackNative,
    ) -> (
        (RawSocket, Receiver<(RawSocket, Completion)>),
        (RawSocket, Receiver<(RawSocket, Completion)>),
    ) {
        let (req_a, req_b) = native.connect_pair();
        let (sink_a, rx_a) = sink();
        let (sink_b, rx_b) = sink();
        let a = native.complete_upgrade(req_a, sink_a).unwrap();
        let b = native.complete_upgrade(req_b, sink_b).unwrap();
        native.set_status_callback(a).unwrap();
        native.set_status_callback(b).unwrap();
        ((a, rx_a), (b, rx_b))
    }

    #[test]
    fn test_upgrade_twice_rejected() {
        let native = LoopbackNative::new().unwrap();
        let (req_a, _) = native.connect_pair();
        let (sink_a, _rx) = sink();
        native.complete_upgrade(req_a, Arc::clone(&sink_a)).unwrap();
        assert_eq!(
            native.complete_upgrade(req_a, sink_a).unwrap_err(),
            NativeErrorCode::INVALID_OPERATION
        );
    }

    #[test]
    fn test_send_then_receive() {
        let native = LoopbackNative::new().unwrap();
        let ((a, rx_a), (b, rx_b)) = upgraded_pair(&native);

        native
            .send(a, BufferType::Utf8Message, Bytes::from_static(b"hi"))
            .unwrap();
        assert_eq!(next(&rx_a), Completion::write(2));

        let buffer = ReceiveBuffer::with_capacity(16);
        native.receive(b, buffer.clone()).unwrap();
        let completion = next(&rx_b);
        assert_eq!(completion.status, CompletionStatus::ReadComplete);
        assert_eq!(completion.buffer_type, BufferType::Utf8Message.as_raw());
        assert_eq!(&buffer.take_prefix(completion.bytes_transferred)[..], b"hi");
    }

    #[test]
    fn test_oversized_message_is_fragmented() {
        let native = LoopbackNative::new().unwrap();
        let ((a, _rx_a), (b, rx_b)) = upgraded_pair(&native);

        native
            .send(a, BufferType::BinaryMessage, Bytes::from(vec![7u8; 10]))
            .unwrap();

        let first = ReceiveBuffer::with_capacity(4);
        assert_eq!(
            native.receive(b, first).unwrap_err(),
            NativeErrorCode::INSUFFICIENT_BUFFER
        );
        let completion = next(&rx_b);
        assert_eq!(completion.bytes_transferred, 4);
        assert_eq!(completion.buffer_type, BufferType::BinaryFragment.as_raw());

        native.receive(b, ReceiveBuffer::with_capacity(4)).unwrap_err();
        assert_eq!(next(&rx_b).bytes_transferred, 4);

        native.receive(b, ReceiveBuffer::with_capacity(4)).unwrap();
        let last = next(&rx_b);
        assert_eq!(last.bytes_transferred, 2);
        assert_eq!(last.buffer_type, BufferType::BinaryMessage.as_raw());
    }

    #[test]
    fn test_second_receive_rejected() {
        let native = LoopbackNative::new().unwrap();
        let ((_a, _rx_a), (b, _rx_b)) = upgraded_pair(&native);

        native.receive(b, ReceiveBuffer::with_capacity(8)).unwrap();
        assert_eq!(
            native.receive(b, ReceiveBuffer::with_capacity(8)).unwrap_err(),
            NativeErrorCode::INVALID_OPERATION
        );
    }

    #[test]
    fn test_close_handshake() {
        let native = LoopbackNative::new().unwrap();
        let ((a, rx_a), (b, rx_b)) = upgraded_pair(&native);

        native
            .close(a, 1000, Some(Bytes::from_static(b"bye")))
            .unwrap();

        native.receive(b, ReceiveBuffer::with_capacity(8)).unwrap();
        let read = next(&rx_b);
        assert_eq!(read.buffer_type, BufferType::Close.as_raw());
        assert_eq!(native.query_close_status(b).unwrap().status, 1000);

        native.close(b, 1000, None).unwrap();
        assert_eq!(
            next(&rx_b),
            Completion::success(CompletionStatus::CloseComplete)
        );
        assert_eq!(
            next(&rx_a),
            Completion::success(CompletionStatus::CloseComplete)
        );

        let status = native.query_close_status(a).unwrap();
        assert_eq!(status.status, 1000);
        assert!(status.reason.is_empty());
    }

    #[test]
    fn test_query_before_close_is_invalid() {
        let native = LoopbackNative::new().unwrap();
        let ((a, _rx_a), _) = upgraded_pair(&native);
        assert_eq!(
            native.query_close_status(a).unwrap_err(),
            NativeErrorCode::INVALID_OPERATION
        );
    }

    #[test]
    fn test_close_handle_cancels_pending() {
        let native = LoopbackNative::new().unwrap();
        let ((a, rx_a), (b, rx_b)) = upgraded_pair(&native);

        native.receive(a, ReceiveBuffer::with_capacity(8)).unwrap();
        native.receive(b, ReceiveBuffer::with_capacity(8)).unwrap();
        assert_eq!(native.live_sockets(), 2);

        native.close_handle(a);
        assert_eq!(
            next(&rx_a),
            Completion::failed(
                CompletionStatus::ReadComplete,
                NativeErrorCode::OPERATION_CANCELLED
            )
        );
        assert_eq!(
            next(&rx_a),
            Completion::success(CompletionStatus::HandleClosing)
        );
        assert_eq!(
            next(&rx_b),
            Completion::failed(
                CompletionStatus::ReadComplete,
                NativeErrorCode::CONNECTION_ERROR
            )
        );
        assert_eq!(native.live_sockets(), 1);
        assert_eq!(
            native
                .send(a, BufferType::BinaryMessage, Bytes::new())
                .unwrap_err(),
            NativeErrorCode::INVALID_HANDLE
        );
    }
}
