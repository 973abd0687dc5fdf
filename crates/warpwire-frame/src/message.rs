use bytes::BytesMut;
use serde::{Deserialize, Serialize};

use crate::codec::{encode_atom, ATOM_TYPE};
use crate::error::Result;

/// Control message carried in the payload of a `warp` atom.
///
/// Both branches are optional and independent; a message with neither is a
/// no-op.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Announces which init payload follows on this channel.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub init: Option<MessageInit>,

    /// Asks the sender to adjust its bandwidth ceiling.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debug: Option<MessageDebug>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageInit {
    pub id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageDebug {
    /// Bits per second.
    pub max_bitrate: u64,
}

impl Message {
    /// An `init` announcement for the given id.
    pub fn init(id: impl Into<String>) -> Self {
        Self {
            init: Some(MessageInit { id: id.into() }),
            debug: None,
        }
    }

    /// A bandwidth hint.
    pub fn debug(max_bitrate: u64) -> Self {
        Self {
            init: None,
            debug: Some(MessageDebug { max_bitrate }),
        }
    }

    /// Parse a JSON payload.
    pub fn from_json(payload: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(payload)?)
    }

    /// Serialize to a JSON payload.
    pub fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Append this message as a complete `warp` atom.
    pub fn encode_atom(&self, dst: &mut BytesMut) -> Result<()> {
        let payload = self.to_json()?;
        encode_atom(ATOM_TYPE, &payload, dst)
    }
}
