//! Atom framing and control messages for warp channels.
//!
//! Every control message on a one-way channel is framed as an atom:
//! - A 4-byte big-endian size, header included (8..=42069)
//! - A 4-byte ASCII type tag, always `warp`
//! - A JSON payload of `size - 8` bytes
//!
//! Outbound channels go through a [`ChannelWriter`], which queues writes for
//! a background [`Drain`] task so producers never wait on the transport.

pub mod codec;
pub mod error;
pub mod message;
pub mod reader;
pub mod writer;

pub use codec::{
    decode_atom, decode_header, encode_atom, Atom, AtomCodec, ATOM_TYPE, HEADER_SIZE,
    MAX_ATOM_SIZE,
};
pub use error::{FrameError, Result};
pub use message::{Message, MessageDebug, MessageInit};
pub use reader::AtomReader;
pub use writer::{ChannelWriter, Drain};
