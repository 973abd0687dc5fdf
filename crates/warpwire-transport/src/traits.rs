use std::future::Future;

use tokio::io::AsyncRead;

use crate::error::Result;

/// One established connection to a client.
///
/// Implementations must tolerate concurrent use: the session accepts
/// channels, opens channels and adjusts bandwidth from separate tasks.
pub trait Connection: Send + Sync + 'static {
    /// Bidirectional channel opened by the peer.
    type Bidi: BidiChannel;
    /// Receive-only channel opened by the peer.
    type Recv: RecvChannel;
    /// Send-only channel opened by this side.
    type Send: SendChannel;

    /// Wait for the peer to open a bidirectional channel.
    fn accept_bi(&self) -> impl Future<Output = Result<Self::Bidi>> + Send;

    /// Wait for the peer to open a unidirectional channel.
    fn accept_uni(&self) -> impl Future<Output = Result<Self::Recv>> + Send;

    /// Open a unidirectional channel, waiting for flow-control credit if needed.
    ///
    /// `Ok(None)` means the transport produced neither a channel nor an
    /// error. Callers treat it as fatal.
    fn open_uni(&self) -> impl Future<Output = Result<Option<Self::Send>>> + Send;

    /// Set the connection's maximum send rate in bits per second.
    fn set_max_bandwidth(&self, bits_per_second: u64);

    /// Close the connection with an application error code and reason.
    fn close(&self, code: u32, reason: &str);
}

/// Read side of a channel opened by the peer.
pub trait RecvChannel: AsyncRead + Unpin + Send + 'static {
    /// Abandon the channel, asking the peer to stop sending.
    fn stop(&mut self, code: u32);
}

/// Write side of a channel opened by this side.
pub trait SendChannel: Send + 'static {
    /// Set the transmission priority. Higher values are sent first.
    fn set_priority(&mut self, priority: i32);

    /// Write the whole buffer, waiting on transport backpressure.
    fn write_all(&mut self, buf: &[u8]) -> impl Future<Output = Result<()>> + Send;

    /// Finish the channel cleanly once all written data is delivered.
    fn finish(&mut self) -> impl Future<Output = Result<()>> + Send;

    /// Abandon unsent data and reset the channel.
    fn reset(&mut self, code: u32);
}

/// Bidirectional channel opened by the peer.
pub trait BidiChannel: Send + 'static {
    /// Cancel the read side with an application error code.
    fn stop(&mut self, code: u32);
}

/// Source of upgraded connections, one per client.
pub trait Listener: Send + Sync + 'static {
    type Conn: Connection;

    /// Wait for the next connection.
    fn accept(&self) -> impl Future<Output = Result<Self::Conn>> + Send;
}
