// src/domain/message.rs

//! Opaque message payload.

use std::sync::Arc;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::Result;

/// The unit carried end-to-end between producers and consumers.
///
/// Drivers never interpret the payload. The optional `channel` records the
/// broker channel a message arrived on; on publish, `None` means the
/// driver's configured channel.
///
/// # Examples
///
/// ```
/// # use brokerutil::Message;
/// let msg = Message::from("ping");
/// assert_eq!(msg.as_str(), Some("ping"));
/// assert!(msg.channel.is_none());
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    // ---
    /// Broker channel (topic) name, if known.
    pub channel: Option<Arc<str>>,

    /// Opaque payload bytes.
    pub payload: Bytes,
}

impl Message {
    // ---
    /// Create a message with the given payload and no channel.
    pub fn new(payload: impl Into<Bytes>) -> Self {
        Self {
            channel: None,
            payload: payload.into(),
        }
    }

    /// Set the channel this message is addressed to.
    pub fn with_channel(mut self, channel: impl Into<Arc<str>>) -> Self {
        self.channel = Some(channel.into());
        self
    }

    /// Encode `value` as a JSON payload.
    pub fn json<T: Serialize>(value: &T) -> Result<Self> {
        Ok(Self::new(serde_json::to_vec(value)?))
    }

    /// Decode the payload as JSON.
    pub fn decode_json<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_slice(&self.payload)?)
    }

    /// Payload as UTF-8 text, if it is valid UTF-8.
    pub fn as_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.payload).ok()
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

impl From<&'static str> for Message {
    fn from(value: &'static str) -> Self {
        Message::new(Bytes::from_static(value.as_bytes()))
    }
}

impl From<String> for Message {
    fn from(value: String) -> Self {
        Message::new(value)
    }
}

impl From<Vec<u8>> for Message {
    fn from(value: Vec<u8>) -> Self {
        Message::new(value)
    }
}

impl From<Bytes> for Message {
    fn from(value: Bytes) -> Self {
        Message::new(value)
    }
}
