//! In-process transport.
//!
//! [`pair`] returns the local [`MemConnection`] (what a session runs on) and
//! the remote [`MemPeer`] (what a test or the CLI loopback drives). Channels
//! are bounded `tokio::io::duplex` pipes, so transport backpressure is real.

use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt, DuplexStream, ReadBuf};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use crate::error::{Result, TransportError};
use crate::traits::{BidiChannel, Connection, Listener, RecvChannel, SendChannel};

/// Bytes a channel buffers before the writer has to wait for the reader.
const CHANNEL_BUFFER: usize = 64 * 1024;

/// First-write-wins application error code shared by both ends of a channel.
#[derive(Debug)]
struct Signal {
    tx: watch::Sender<Option<u32>>,
}

impl Signal {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            tx: watch::channel(None).0,
        })
    }

    fn raise(&self, code: u32) {
        self.tx.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(code);
            true
        });
    }

    fn get(&self) -> Option<u32> {
        *self.tx.borrow()
    }

    async fn wait(&self) -> u32 {
        let mut rx = self.tx.subscribe();
        // `self` owns the sender, so the channel cannot close under us.
        let code = match rx.wait_for(Option::is_some).await {
            Ok(code) => (*code).unwrap_or_default(),
            Err(_) => 0,
        };
        code
    }
}

#[derive(Debug)]
struct ConnState {
    closed: CancellationToken,
    close_info: Mutex<Option<(u32, String)>>,
    bandwidth: watch::Sender<Option<u64>>,
    bandwidth_history: Mutex<Vec<u64>>,
}

impl ConnState {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            closed: CancellationToken::new(),
            close_info: Mutex::new(None),
            bandwidth: watch::channel(None).0,
            bandwidth_history: Mutex::new(Vec::new()),
        })
    }

    fn close(&self, code: u32, reason: &str) {
        {
            let mut info = self.close_info.lock().unwrap_or_else(PoisonError::into_inner);
            if info.is_none() {
                *info = Some((code, reason.to_string()));
            }
        }
        self.closed.cancel();
    }

    fn close_info(&self) -> Option<(u32, String)> {
        self.close_info
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn closed_error(&self) -> TransportError {
        match self.close_info() {
            Some((code, reason)) => TransportError::ConnectionClosed { code, reason },
            None => TransportError::Closed,
        }
    }
}

/// State shared by both ends of a channel opened by the connection.
#[derive(Debug)]
struct SendState {
    priority: AtomicI32,
    finished: AtomicBool,
    reset: Arc<Signal>,
    stop: Arc<Signal>,
}

impl SendState {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            priority: AtomicI32::new(0),
            finished: AtomicBool::new(false),
            reset: Signal::new(),
            stop: Signal::new(),
        })
    }
}

/// Create a connected local/remote pair.
pub fn pair() -> (MemConnection, MemPeer) {
    let state = ConnState::new();
    let (bi_tx, bi_rx) = mpsc::unbounded_channel();
    let (uni_tx, uni_rx) = mpsc::unbounded_channel();
    let (out_tx, out_rx) = mpsc::unbounded_channel();

    let conn = MemConnection {
        state: Arc::clone(&state),
        incoming_bi: tokio::sync::Mutex::new(bi_rx),
        incoming_uni: tokio::sync::Mutex::new(uni_rx),
        outgoing_uni: out_tx,
    };
    let peer = MemPeer {
        state,
        bi_tx,
        uni_tx,
        incoming: out_rx,
    };
    (conn, peer)
}

/// Create a listener and a connector that feeds it fresh connections.
pub fn listener() -> (MemListener, MemConnector) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        MemListener {
            incoming: tokio::sync::Mutex::new(rx),
        },
        MemConnector { tx },
    )
}

/// Local end of an in-memory connection.
#[derive(Debug)]
pub struct MemConnection {
    state: Arc<ConnState>,
    incoming_bi: tokio::sync::Mutex<mpsc::UnboundedReceiver<MemBidi>>,
    incoming_uni: tokio::sync::Mutex<mpsc::UnboundedReceiver<MemRecv>>,
    outgoing_uni: mpsc::UnboundedSender<MemIncoming>,
}

impl Connection for MemConnection {
    type Bidi = MemBidi;
    type Recv = MemRecv;
    type Send = MemSend;

    async fn accept_bi(&self) -> Result<MemBidi> {
        let mut incoming = self.incoming_bi.lock().await;
        tokio::select! {
            biased;
            _ = self.state.closed.cancelled() => Err(self.state.closed_error()),
            channel = incoming.recv() => channel.ok_or_else(|| self.state.closed_error()),
        }
    }

    async fn accept_uni(&self) -> Result<MemRecv> {
        let mut incoming = self.incoming_uni.lock().await;
        tokio::select! {
            biased;
            _ = self.state.closed.cancelled() => Err(self.state.closed_error()),
            channel = incoming.recv() => channel.ok_or_else(|| self.state.closed_error()),
        }
    }

    async fn open_uni(&self) -> Result<Option<MemSend>> {
        if self.state.closed.is_cancelled() {
            return Err(self.state.closed_error());
        }

        let (local, remote) = tokio::io::duplex(CHANNEL_BUFFER);
        let state = SendState::new();
        self.outgoing_uni
            .send(MemIncoming {
                stream: remote,
                state: Arc::clone(&state),
            })
            .map_err(|_| self.state.closed_error())?;

        Ok(Some(MemSend {
            stream: Some(local),
            state,
        }))
    }

    fn set_max_bandwidth(&self, bits_per_second: u64) {
        self.state
            .bandwidth_history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(bits_per_second);
        self.state.bandwidth.send_replace(Some(bits_per_second));
    }

    fn close(&self, code: u32, reason: &str) {
        tracing::debug!(code, reason, "closing in-memory connection");
        self.state.close(code, reason);
    }
}

/// Send-only channel opened by a [`MemConnection`].
#[derive(Debug)]
pub struct MemSend {
    stream: Option<DuplexStream>,
    state: Arc<SendState>,
}

impl SendChannel for MemSend {
    fn set_priority(&mut self, priority: i32) {
        self.state.priority.store(priority, Ordering::Release);
    }

    async fn write_all(&mut self, buf: &[u8]) -> Result<()> {
        if let Some(code) = self.state.stop.get() {
            return Err(TransportError::Stopped(code));
        }
        let stream = self.stream.as_mut().ok_or(TransportError::Closed)?;
        let result = stream.write_all(buf).await;
        result.map_err(|err| match self.state.stop.get() {
            Some(code) => TransportError::Stopped(code),
            None => TransportError::Io(err),
        })
    }

    async fn finish(&mut self) -> Result<()> {
        let mut stream = self.stream.take().ok_or(TransportError::Closed)?;
        self.state.finished.store(true, Ordering::Release);
        stream.shutdown().await?;
        Ok(())
    }

    fn reset(&mut self, code: u32) {
        self.state.reset.raise(code);
        self.stream = None;
    }
}

/// Receive-only channel opened by the peer.
#[derive(Debug)]
pub struct MemRecv {
    stream: DuplexStream,
    stop: Arc<Signal>,
}

impl AsyncRead for MemRecv {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.stream).poll_read(cx, buf)
    }
}

impl RecvChannel for MemRecv {
    fn stop(&mut self, code: u32) {
        self.stop.raise(code);
    }
}

/// Bidirectional channel opened by the peer.
#[derive(Debug)]
pub struct MemBidi {
    _stream: DuplexStream,
    stop: Arc<Signal>,
}

impl BidiChannel for MemBidi {
    fn stop(&mut self, code: u32) {
        self.stop.raise(code);
    }
}

/// Remote end of an in-memory connection.
#[derive(Debug)]
pub struct MemPeer {
    state: Arc<ConnState>,
    bi_tx: mpsc::UnboundedSender<MemBidi>,
    uni_tx: mpsc::UnboundedSender<MemRecv>,
    incoming: mpsc::UnboundedReceiver<MemIncoming>,
}

impl MemPeer {
    /// Open a unidirectional channel toward the connection.
    pub fn open_uni(&self) -> Result<MemUniSender> {
        let (local, remote) = tokio::io::duplex(CHANNEL_BUFFER);
        let stop = Signal::new();
        self.uni_tx
            .send(MemRecv {
                stream: remote,
                stop: Arc::clone(&stop),
            })
            .map_err(|_| self.state.closed_error())?;
        Ok(MemUniSender {
            stream: local,
            stop,
        })
    }

    /// Open a bidirectional channel toward the connection.
    pub fn open_bi(&self) -> Result<MemBidiPeer> {
        let (local, remote) = tokio::io::duplex(CHANNEL_BUFFER);
        let stop = Signal::new();
        self.bi_tx
            .send(MemBidi {
                _stream: remote,
                stop: Arc::clone(&stop),
            })
            .map_err(|_| self.state.closed_error())?;
        Ok(MemBidiPeer {
            _stream: local,
            stop,
        })
    }

    /// Wait for the connection to open a unidirectional channel.
    pub async fn accept_uni(&mut self) -> Result<MemIncoming> {
        tokio::select! {
            biased;
            channel = self.incoming.recv() => channel.ok_or_else(|| self.state.closed_error()),
            _ = self.state.closed.cancelled() => Err(self.state.closed_error()),
        }
    }

    /// Latest bandwidth ceiling applied by the connection.
    pub fn max_bandwidth(&self) -> Option<u64> {
        *self.state.bandwidth.borrow()
    }

    /// Every bandwidth ceiling applied, in call order.
    pub fn bandwidth_history(&self) -> Vec<u64> {
        self.state
            .bandwidth_history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Wait until the connection's bandwidth ceiling equals `bits_per_second`.
    pub async fn wait_max_bandwidth(&self, bits_per_second: u64) {
        let mut rx = self.state.bandwidth.subscribe();
        let _ = rx.wait_for(|current| *current == Some(bits_per_second)).await;
    }

    /// Close the connection from the remote side.
    pub fn close(&self, code: u32, reason: &str) {
        self.state.close(code, reason);
    }

    /// Wait for the connection to close and return its code and reason.
    pub async fn closed(&self) -> (u32, String) {
        self.state.closed.cancelled().await;
        self.state.close_info().unwrap_or((0, String::new()))
    }

    /// Close code and reason, if the connection has been closed.
    pub fn close_info(&self) -> Option<(u32, String)> {
        self.state.close_info()
    }
}

/// Peer-side writer for a channel the peer opened.
#[derive(Debug)]
pub struct MemUniSender {
    stream: DuplexStream,
    stop: Arc<Signal>,
}

impl MemUniSender {
    /// Write the whole buffer.
    pub async fn write_all(&mut self, buf: &[u8]) -> Result<()> {
        let result = self.stream.write_all(buf).await;
        result.map_err(|err| match self.stop.get() {
            Some(code) => TransportError::Stopped(code),
            None => TransportError::Io(err),
        })
    }

    /// Finish the channel; the connection reads a clean end.
    pub async fn finish(mut self) -> Result<()> {
        self.stream.shutdown().await?;
        Ok(())
    }

    /// Stop code set by the connection, if any.
    pub fn stop_code(&self) -> Option<u32> {
        self.stop.get()
    }

    /// Wait for the connection to stop reading this channel.
    pub async fn stopped(&self) -> u32 {
        self.stop.wait().await
    }
}

/// Peer-side handle for a bidirectional channel the peer opened.
#[derive(Debug)]
pub struct MemBidiPeer {
    _stream: DuplexStream,
    stop: Arc<Signal>,
}

impl MemBidiPeer {
    /// Stop code set by the connection, if any.
    pub fn stop_code(&self) -> Option<u32> {
        self.stop.get()
    }

    /// Wait for the connection to cancel the read side.
    pub async fn stopped(&self) -> u32 {
        self.stop.wait().await
    }
}

/// Peer-side reader for a channel the connection opened.
#[derive(Debug)]
pub struct MemIncoming {
    stream: DuplexStream,
    state: Arc<SendState>,
}

impl MemIncoming {
    /// Priority the connection assigned to this channel.
    pub fn priority(&self) -> i32 {
        self.state.priority.load(Ordering::Acquire)
    }

    /// Read until the channel ends.
    ///
    /// Fails with [`TransportError::Reset`] when the sender reset the channel
    /// and with [`TransportError::Closed`] when it vanished without finishing.
    pub async fn read_to_end(&mut self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.stream.read_to_end(&mut buf).await?;
        if let Some(code) = self.state.reset.get() {
            return Err(TransportError::Reset(code));
        }
        if !self.state.finished.load(Ordering::Acquire) {
            return Err(TransportError::Closed);
        }
        Ok(buf)
    }

    /// Stop reading; further writes by the connection fail.
    pub fn stop(self, code: u32) {
        self.state.stop.raise(code);
    }
}

/// [`Listener`] fed by a [`MemConnector`].
#[derive(Debug)]
pub struct MemListener {
    incoming: tokio::sync::Mutex<mpsc::UnboundedReceiver<MemConnection>>,
}

impl Listener for MemListener {
    type Conn = MemConnection;

    async fn accept(&self) -> Result<MemConnection> {
        self.incoming
            .lock()
            .await
            .recv()
            .await
            .ok_or(TransportError::Closed)
    }
}

/// Dials a [`MemListener`].
#[derive(Debug, Clone)]
pub struct MemConnector {
    tx: mpsc::UnboundedSender<MemConnection>,
}

impl MemConnector {
    /// Hand a fresh connection to the listener and return its remote end.
    pub fn connect(&self) -> Result<MemPeer> {
        let (conn, peer) = pair();
        self.tx.send(conn).map_err(|_| TransportError::Closed)?;
        Ok(peer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn peer_uni_channel_reaches_connection() {
        let (conn, peer) = pair();

        let mut sender = peer.open_uni().unwrap();
        sender.write_all(b"hello").await.unwrap();
        sender.finish().await.unwrap();

        let mut recv = conn.accept_uni().await.unwrap();
        let mut buf = Vec::new();
        recv.read_to_end(&mut buf).await.unwrap();
        assert_eq!(buf, b"hello");
    }

    #[tokio::test]
    async fn stop_is_visible_to_peer() {
        let (conn, peer) = pair();

        let sender = peer.open_uni().unwrap();
        let mut recv = conn.accept_uni().await.unwrap();
        recv.stop(7);

        assert_eq!(sender.stopped().await, 7);
        assert_eq!(sender.stop_code(), Some(7));
    }

    #[tokio::test]
    async fn stopped_waits_for_a_later_stop() {
        let (conn, peer) = pair();

        let sender = peer.open_uni().unwrap();
        let waiter = tokio::spawn(async move { sender.stopped().await });
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        let mut recv = conn.accept_uni().await.unwrap();
        recv.stop(4);
        assert_eq!(waiter.await.unwrap(), 4);
    }

    #[tokio::test]
    async fn bidi_stop_is_visible_to_peer() {
        let (conn, peer) = pair();

        let bidi = peer.open_bi().unwrap();
        let mut accepted = conn.accept_bi().await.unwrap();
        accepted.stop(1);

        assert_eq!(bidi.stopped().await, 1);
    }

    #[tokio::test]
    async fn opened_channel_carries_priority_and_data() {
        let (conn, mut peer) = pair();

        let mut send = conn.open_uni().await.unwrap().unwrap();
        send.set_priority(i32::MAX);
        send.write_all(b"init").await.unwrap();
        send.finish().await.unwrap();

        let mut incoming = peer.accept_uni().await.unwrap();
        assert_eq!(incoming.read_to_end().await.unwrap(), b"init");
        assert_eq!(incoming.priority(), i32::MAX);
    }

    #[tokio::test]
    async fn reset_is_reported_to_reader() {
        let (conn, mut peer) = pair();

        let mut send = conn.open_uni().await.unwrap().unwrap();
        send.write_all(b"partial").await.unwrap();
        send.reset(3);

        let mut incoming = peer.accept_uni().await.unwrap();
        let err = incoming.read_to_end().await.unwrap_err();
        assert!(matches!(err, TransportError::Reset(3)));
    }

    #[tokio::test]
    async fn write_after_peer_stop_fails() {
        let (conn, mut peer) = pair();

        let mut send = conn.open_uni().await.unwrap().unwrap();
        let incoming = peer.accept_uni().await.unwrap();
        incoming.stop(9);

        let err = send.write_all(b"late").await.unwrap_err();
        assert!(matches!(err, TransportError::Stopped(9)));
    }

    #[tokio::test]
    async fn bandwidth_is_recorded() {
        let (conn, peer) = pair();

        conn.set_max_bandwidth(1_000);
        conn.set_max_bandwidth(500_000);

        peer.wait_max_bandwidth(500_000).await;
        assert_eq!(peer.max_bandwidth(), Some(500_000));
        assert_eq!(peer.bandwidth_history(), vec![1_000, 500_000]);
    }

    #[tokio::test]
    async fn close_fails_pending_accepts() {
        let (conn, peer) = pair();

        let accept = tokio::spawn(async move {
            let result = conn.accept_uni().await;
            (conn, result)
        });
        peer.close(0, "done");

        let (_conn, result) = accept.await.unwrap();
        match result {
            Err(TransportError::ConnectionClosed { code, reason }) => {
                assert_eq!(code, 0);
                assert_eq!(reason, "done");
            }
            other => panic!("unexpected accept result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn dropped_peer_ends_accepts() {
        let (conn, peer) = pair();
        drop(peer);

        assert!(matches!(
            conn.accept_bi().await,
            Err(TransportError::Closed)
        ));
    }

    #[tokio::test]
    async fn connector_feeds_listener() {
        let (listener, connector) = listener();

        let peer = connector.connect().unwrap();
        let conn = listener.accept().await.unwrap();
        conn.close(1, "bye");

        assert_eq!(peer.closed().await, (1, "bye".to_string()));
    }
}
