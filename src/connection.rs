//! The per-connection send/receive state machine.
//!
//! One reader task and one writer task are spawned per connection, sharing
//! a [`SharedState`] behind a `tokio::sync::Mutex`. The lock is never held
//! across an I/O call — callers re-acquire it from each task after a read
//! or write completes.

use std::collections::VecDeque;
use std::sync::Arc;

use tokio::io::{split, AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::{oneshot, Mutex, Notify};

use crate::config::WebSocketConfig;
use crate::error::{Error, Result};
use crate::frame::{Frame, OpCode, Role};
use crate::message::{self, Assembler, AssemblerEvent};

struct OutboundMessage {
    id: u64,
    frames: VecDeque<Frame>,
    completion: Option<oneshot::Sender<Result<()>>>,
}

struct PendingReceiver {
    id: u64,
    tx: oneshot::Sender<Result<Vec<u8>>>,
}

struct SharedState {
    outbound: VecDeque<OutboundMessage>,
    receivers: VecDeque<PendingReceiver>,
    closed: bool,
    next_id: u64,
}

impl SharedState {
    fn new() -> Self {
        Self {
            outbound: VecDeque::new(),
            receivers: VecDeque::new(),
            closed: false,
            next_id: 0,
        }
    }
}

/// A live, handshake-complete WebSocket connection. Cheap to clone; all
/// clones share the same reader/writer tasks and queues.
#[derive(Clone)]
pub struct Connection {
    state: Arc<Mutex<SharedState>>,
    notify: Arc<Notify>,
    fragsize: usize,
}

impl Connection {
    /// Split `stream` and spawn the reader/writer tasks for it. `role`
    /// determines masking direction: a listener reads masked frames and
    /// writes unmasked ones; a dialer is the mirror image.
    pub fn spawn<S>(stream: S, role: Role, config: WebSocketConfig) -> Connection
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let (read_half, write_half) = split(stream);
        let state = Arc::new(Mutex::new(SharedState::new()));
        let notify = Arc::new(Notify::new());

        tokio::spawn(reader_loop(
            read_half,
            role,
            config.maxframe,
            state.clone(),
            notify.clone(),
        ));
        tokio::spawn(writer_loop(write_half, role, state.clone(), notify.clone()));

        Connection {
            state,
            notify,
            fragsize: config.fragsize,
        }
    }

    /// Enqueue `payload` for transmission and wait for it to be fully
    /// written. Fails with [`Error::Closed`] if the connection is already
    /// closed, or becomes closed before the send completes.
    pub async fn send(&self, payload: Vec<u8>) -> Result<()> {
        self.send_inner(None, payload, None).await
    }

    /// Like [`Connection::send`], but a header block is prepended to the
    /// payload before fragmenting rather than sent as its own frame.
    pub async fn send_with_header(&self, header: &[u8], payload: Vec<u8>) -> Result<()> {
        self.send_inner(Some(header), payload, None).await
    }

    /// Like [`Connection::send`], but resolves early with [`Error::Closed`]
    /// if `cancel` fires before the write completes. The message remains
    /// queued if it had already reached the tx slot; otherwise it is
    /// removed.
    pub async fn send_cancellable(
        &self,
        payload: Vec<u8>,
        cancel: oneshot::Receiver<()>,
    ) -> Result<()> {
        self.send_inner(None, payload, Some(cancel)).await
    }

    async fn send_inner(
        &self,
        header: Option<&[u8]>,
        payload: Vec<u8>,
        cancel: Option<oneshot::Receiver<()>>,
    ) -> Result<()> {
        let frames = message::split_into_frames(header, &payload, self.fragsize);
        let (tx, rx) = oneshot::channel();
        let id = {
            let mut st = self.state.lock().await;
            if st.closed {
                return Err(Error::Closed);
            }
            let id = st.next_id;
            st.next_id += 1;
            st.outbound.push_back(OutboundMessage {
                id,
                frames: frames.into(),
                completion: Some(tx),
            });
            id
        };
        self.notify.notify_one();

        match cancel {
            None => rx.await.map_err(|_| Error::Closed)?,
            Some(cancel_rx) => {
                tokio::select! {
                    res = rx => res.map_err(|_| Error::Closed)?,
                    _ = cancel_rx => {
                        self.cancel_send(id).await;
                        Err(Error::Closed)
                    }
                }
            }
        }
    }

    /// Remove a queued send by id, if it is still fully queued (not yet
    /// mid-write), completing its caller with [`Error::Closed`]. A no-op if
    /// the message already completed or is not found.
    pub async fn cancel_send(&self, id: u64) {
        let mut st = self.state.lock().await;
        if let Some(msg) = take_by_id(&mut st, id) {
            if let Some(tx) = msg.completion {
                let _ = tx.send(Err(Error::Closed));
            }
        }
    }

    /// Wait for the next fully-assembled inbound message.
    pub async fn recv(&self) -> Result<Vec<u8>> {
        self.recv_inner(None).await
    }

    /// Like [`Connection::recv`], but resolves early with
    /// [`Error::Closed`] if `cancel` fires before a message arrives.
    pub async fn recv_cancellable(&self, cancel: oneshot::Receiver<()>) -> Result<Vec<u8>> {
        self.recv_inner(Some(cancel)).await
    }

    async fn recv_inner(&self, cancel: Option<oneshot::Receiver<()>>) -> Result<Vec<u8>> {
        let (tx, rx) = oneshot::channel();
        let id = {
            let mut st = self.state.lock().await;
            if st.closed {
                return Err(Error::Closed);
            }
            let id = st.next_id;
            st.next_id += 1;
            st.receivers.push_back(PendingReceiver { id, tx });
            id
        };

        match cancel {
            None => rx.await.map_err(|_| Error::Closed)?,
            Some(cancel_rx) => {
                tokio::select! {
                    res = rx => res.map_err(|_| Error::Closed)?,
                    _ = cancel_rx => {
                        self.cancel_recv(id).await;
                        Err(Error::Closed)
                    }
                }
            }
        }
    }

    /// Remove a queued receiver by id, completing it with
    /// [`Error::Closed`]. A no-op if already delivered or not found.
    pub async fn cancel_recv(&self, id: u64) {
        let mut st = self.state.lock().await;
        if let Some(pos) = st.receivers.iter().position(|r| r.id == id) {
            if let Some(pending) = st.receivers.remove(pos) {
                let _ = pending.tx.send(Err(Error::Closed));
            }
        }
    }

    /// Initiate the close handshake with the given status code. Idempotent:
    /// calling this twice (or racing with a peer-initiated close) drains the
    /// outbound queue on the second call.
    pub async fn close(&self, code: u16) {
        do_close(&self.state, &self.notify, Some(code)).await;
    }

    pub async fn is_closed(&self) -> bool {
        self.state.lock().await.closed
    }
}

/// The shared two-phase close drain: always drop queued receivers with
/// `CLOSED`; on the first call, mark closed and optionally enqueue a close
/// frame; on a second call (we already closed, or the peer raced us),
/// additionally drain and fail the outbound queue.
async fn do_close(state: &Arc<Mutex<SharedState>>, notify: &Arc<Notify>, send_frame: Option<u16>) {
    let mut st = state.lock().await;
    while let Some(pending) = st.receivers.pop_front() {
        let _ = pending.tx.send(Err(Error::Closed));
    }

    if !st.closed {
        st.closed = true;
        if let Some(code) = send_frame {
            st.outbound.push_front(OutboundMessage {
                id: st.next_id,
                frames: VecDeque::from([Frame::close(code)]),
                completion: None,
            });
            st.next_id += 1;
        }
    } else {
        while let Some(msg) = st.outbound.pop_front() {
            if let Some(tx) = msg.completion {
                let _ = tx.send(Err(Error::Closed));
            }
        }
    }
    drop(st);
    notify.notify_one();
}

async fn push_control_frame(state: &Arc<Mutex<SharedState>>, notify: &Arc<Notify>, frame: Frame) {
    let mut st = state.lock().await;
    if st.closed {
        return;
    }
    st.outbound.push_front(OutboundMessage {
        id: st.next_id,
        frames: VecDeque::from([frame]),
        completion: None,
    });
    st.next_id += 1;
    drop(st);
    notify.notify_one();
}

async fn reader_loop<R>(
    mut read_half: R,
    role: Role,
    max_payload: usize,
    state: Arc<Mutex<SharedState>>,
    notify: Arc<Notify>,
) where
    R: AsyncRead + Unpin,
{
    let mut assembler = Assembler::new();
    loop {
        let frame = match Frame::read(&mut read_half, role, max_payload).await {
            Ok(frame) => frame,
            Err(Error::Invalid(_)) => {
                do_close(&state, &notify, Some(1009)).await;
                break;
            }
            Err(Error::Unsupported) => {
                do_close(&state, &notify, Some(1003)).await;
                break;
            }
            Err(Error::Proto) => {
                do_close(&state, &notify, Some(1002)).await;
                break;
            }
            Err(_) => {
                // Underlying I/O error (or peer closed the socket outright):
                // nothing left to write a close frame onto.
                do_close(&state, &notify, None).await;
                break;
            }
        };

        match assembler.feed(frame) {
            AssemblerEvent::Pending => continue,
            AssemblerEvent::Message(payload) => {
                let delivered = {
                    let mut st = state.lock().await;
                    match st.receivers.pop_front() {
                        Some(pending) => {
                            let _ = pending.tx.send(Ok(payload));
                            true
                        }
                        None => false,
                    }
                };
                if !delivered {
                    do_close(&state, &notify, Some(1001)).await;
                    break;
                }
            }
            AssemblerEvent::SendPong(payload) => {
                if let Ok(pong) = Frame::control(OpCode::Pong, payload) {
                    push_control_frame(&state, &notify, pong).await;
                }
            }
            AssemblerEvent::PeerClosed => {
                do_close(&state, &notify, None).await;
                break;
            }
            AssemblerEvent::ProtocolError(code) => {
                do_close(&state, &notify, Some(code)).await;
                break;
            }
        }
    }
}

/// Dequeue the next frame to write off the head message, identified by
/// `id` rather than queue position — `push_control_frame`/`do_close` can
/// `push_front` a control or close frame onto this same queue while the
/// lock is released for the write below, shoving the in-flight message
/// away from the front. The completion path must look the message back up
/// by this id, not by popping whatever is now at the front.
fn pop_next_frame(st: &mut SharedState) -> Option<(u64, Frame, bool)> {
    let msg = st.outbound.front_mut()?;
    let id = msg.id;
    let frame = msg.frames.pop_front()?;
    let is_last = msg.frames.is_empty();
    Some((id, frame, is_last))
}

/// Remove the outbound message with the given id, wherever it now sits in
/// the queue, and return it. A no-op (`None`) if it was already removed by
/// a concurrent `cancel_send`/`do_close` while the write was in flight.
fn take_by_id(st: &mut SharedState, id: u64) -> Option<OutboundMessage> {
    let pos = st.outbound.iter().position(|m| m.id == id)?;
    st.outbound.remove(pos)
}

async fn writer_loop<W>(
    mut write_half: W,
    role: Role,
    state: Arc<Mutex<SharedState>>,
    notify: Arc<Notify>,
) where
    W: AsyncWrite + Unpin,
{
    loop {
        let next = {
            let mut st = state.lock().await;
            pop_next_frame(&mut st)
        };

        let (msg_id, frame, is_last) = match next {
            Some(triple) => triple,
            None => {
                let st = state.lock().await;
                if st.closed && st.outbound.is_empty() {
                    break;
                }
                drop(st);
                notify.notified().await;
                continue;
            }
        };

        let is_close = frame.opcode == OpCode::Close;
        match frame.write(role, &mut write_half).await {
            Ok(()) => {
                if is_last {
                    let mut st = state.lock().await;
                    if let Some(msg) = take_by_id(&mut st, msg_id) {
                        if let Some(tx) = msg.completion {
                            let _ = tx.send(Ok(()));
                        }
                    }
                }
                if is_close {
                    let _ = write_half.shutdown().await;
                    break;
                }
            }
            Err(e) => {
                let mut st = state.lock().await;
                st.closed = true;
                if let Some(msg) = take_by_id(&mut st, msg_id) {
                    if let Some(tx) = msg.completion {
                        let _ = tx.send(Err(e));
                    }
                }
                while let Some(msg) = st.outbound.pop_front() {
                    if let Some(tx) = msg.completion {
                        let _ = tx.send(Err(Error::Closed));
                    }
                }
                break;
            }
        }
    }
}
