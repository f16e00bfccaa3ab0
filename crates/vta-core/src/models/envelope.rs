//! Transport message envelope

use bytes::Bytes;

/// One opaque datagram worth of already-encoded data
///
/// Immutable once built. Direction is not recorded here; inbound and outbound
/// envelopes live in separate queues.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    payload: Bytes,
}

impl Envelope {
    pub fn new(payload: impl Into<Bytes>) -> Self {
        Self {
            payload: payload.into(),
        }
    }

    /// Build an envelope by copying a byte slice
    pub fn copy_from_slice(data: &[u8]) -> Self {
        Self {
            payload: Bytes::copy_from_slice(data),
        }
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    pub fn into_payload(self) -> Bytes {
        self.payload
    }
}

impl From<Vec<u8>> for Envelope {
    fn from(data: Vec<u8>) -> Self {
        Self::new(data)
    }
}

impl AsRef<[u8]> for Envelope {
    fn as_ref(&self) -> &[u8] {
        &self.payload
    }
}
