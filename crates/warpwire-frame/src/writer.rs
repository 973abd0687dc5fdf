use bytes::{Bytes, BytesMut};
use tokio::sync::{mpsc, oneshot};
use warpwire_transport::SendChannel;

use crate::error::{FrameError, Result};
use crate::message::Message;

enum Op {
    Priority(i32),
    Write(Bytes),
    Finish(oneshot::Sender<Result<()>>),
}

/// Buffered writer for one outbound channel.
///
/// Writes are queued and return immediately; the paired [`Drain`] task moves
/// them onto the channel in order, absorbing transport backpressure. The
/// drain must be spawned for anything to be sent.
///
/// Dropping a writer that was neither closed nor cancelled cancels it with
/// the code given to [`ChannelWriter::new`].
pub struct ChannelWriter {
    ops: mpsc::UnboundedSender<Op>,
    cancel: Option<oneshot::Sender<u32>>,
    cancel_code: u32,
}

/// Background task that drains a [`ChannelWriter`]'s queue.
pub struct Drain<S> {
    channel: S,
    ops: mpsc::UnboundedReceiver<Op>,
    cancel: oneshot::Receiver<u32>,
    cancel_code: u32,
}

impl ChannelWriter {
    /// Wrap a channel. `cancel_code` is used when the writer is dropped open.
    pub fn new<S: SendChannel>(channel: S, cancel_code: u32) -> (Self, Drain<S>) {
        let (ops_tx, ops_rx) = mpsc::unbounded_channel();
        let (cancel_tx, cancel_rx) = oneshot::channel();
        let writer = Self {
            ops: ops_tx,
            cancel: Some(cancel_tx),
            cancel_code,
        };
        let drain = Drain {
            channel,
            ops: ops_rx,
            cancel: cancel_rx,
            cancel_code,
        };
        (writer, drain)
    }

    /// Set the channel's transmission priority.
    ///
    /// Applied in queue order, so calling this before any write guarantees
    /// no bytes leave at the old priority.
    pub fn set_priority(&mut self, priority: i32) {
        // A dead drain surfaces on the next write or close.
        let _ = self.enqueue(Op::Priority(priority));
    }

    /// Queue a message as a complete `warp` atom.
    pub fn write_message(&mut self, msg: &Message) -> Result<()> {
        let mut buf = BytesMut::new();
        msg.encode_atom(&mut buf)?;
        self.enqueue(Op::Write(buf.freeze()))
    }

    /// Queue raw bytes without an atom header.
    pub fn write(&mut self, data: impl Into<Bytes>) -> Result<usize> {
        let data = data.into();
        let len = data.len();
        self.enqueue(Op::Write(data))?;
        Ok(len)
    }

    /// Flush everything queued and finish the channel.
    ///
    /// Waits until the drain has written all data and the transport has
    /// accepted the finish.
    pub async fn close(&mut self) -> Result<()> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.enqueue(Op::Finish(ack_tx))?;
        let result = ack_rx.await.map_err(|_| FrameError::WriterClosed);
        // The drain has exited either way; there is nothing left to cancel.
        self.cancel = None;
        result?
    }

    /// Abandon queued data and reset the channel with `code`.
    pub fn cancel(&mut self, code: u32) {
        if let Some(cancel) = self.cancel.take() {
            tracing::debug!(code, "cancelling channel writer");
            let _ = cancel.send(code);
        }
    }

    /// Whether the writer still accepts data.
    pub fn is_open(&self) -> bool {
        self.cancel.is_some()
    }

    fn enqueue(&mut self, op: Op) -> Result<()> {
        if self.cancel.is_none() {
            return Err(FrameError::WriterClosed);
        }
        self.ops.send(op).map_err(|_| FrameError::WriterClosed)
    }
}

impl Drop for ChannelWriter {
    fn drop(&mut self) {
        let code = self.cancel_code;
        self.cancel(code);
    }
}

impl<S: SendChannel> Drain<S> {
    /// Write queued operations until the writer closes or cancels.
    ///
    /// Returns the transport error if a write fails; the channel is reset
    /// with the cancel code first. A finish failure is reported to the
    /// closing writer instead.
    pub async fn run(mut self) -> Result<()> {
        loop {
            let op = tokio::select! {
                biased;
                code = &mut self.cancel => {
                    self.abandon(code.ok());
                    return Ok(());
                }
                op = self.ops.recv() => op,
            };

            match op {
                Some(Op::Priority(priority)) => self.channel.set_priority(priority),
                Some(Op::Write(buf)) => {
                    let result = tokio::select! {
                        biased;
                        code = &mut self.cancel => {
                            self.abandon(code.ok());
                            return Ok(());
                        }
                        result = self.channel.write_all(&buf) => result,
                    };
                    if let Err(err) = result {
                        self.channel.reset(self.cancel_code);
                        return Err(err.into());
                    }
                }
                Some(Op::Finish(ack)) => {
                    let result = tokio::select! {
                        biased;
                        code = &mut self.cancel => {
                            self.abandon(code.ok());
                            Err(FrameError::WriterClosed)
                        }
                        result = self.channel.finish() => result.map_err(FrameError::from),
                    };
                    let _ = ack.send(result);
                    return Ok(());
                }
                None => {
                    self.abandon(None);
                    return Ok(());
                }
            }
        }
    }

    fn abandon(&mut self, code: Option<u32>) {
        let code = code.unwrap_or(self.cancel_code);
        self.channel.reset(code);
    }
}
