//! Length-prefixed bincode framing for `tokio_util::codec::Framed`.
//!
//! ```text
//! length: u32 BE (4) | body: bincode (length bytes)
//! ```

use std::marker::PhantomData;

use bytes::{Buf, BufMut, BytesMut};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::DisplayError;
use crate::net::wire::{ClientFrame, ServerFrame};

/// Largest accepted frame body.
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

const LENGTH_SIZE: usize = 4;

/// Decodes `D` frames and encodes `E` frames.
pub struct WireCodec<D, E> {
    _marker: PhantomData<fn() -> (D, E)>,
}

/// Codec used by [`RemoteTransport`](crate::net::RemoteTransport).
pub type ClientCodec = WireCodec<ServerFrame, ClientFrame>;

/// Codec used by [`serve`](crate::net::serve).
pub type ServerCodec = WireCodec<ClientFrame, ServerFrame>;

impl<D, E> WireCodec<D, E> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<D, E> Default for WireCodec<D, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D: DeserializeOwned, E> tokio_util::codec::Decoder for WireCodec<D, E> {
    type Item = D;
    type Error = DisplayError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < LENGTH_SIZE {
            return Ok(None);
        }

        let mut len_bytes = [0u8; LENGTH_SIZE];
        len_bytes.copy_from_slice(&src[..LENGTH_SIZE]);
        let len = u32::from_be_bytes(len_bytes) as usize;
        if len > MAX_FRAME_SIZE {
            return Err(DisplayError::FrameTooLarge {
                size: len,
                max: MAX_FRAME_SIZE,
            });
        }

        if src.len() < LENGTH_SIZE + len {
            src.reserve(LENGTH_SIZE + len - src.len());
            return Ok(None);
        }

        src.advance(LENGTH_SIZE);
        let body = src.split_to(len);
        Ok(Some(bincode::deserialize(&body)?))
    }
}

impl<D, E: Serialize> tokio_util::codec::Encoder<E> for WireCodec<D, E> {
    type Error = DisplayError;

    fn encode(&mut self, item: E, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let body = bincode::serialize(&item)?;
        if body.len() > MAX_FRAME_SIZE {
            return Err(DisplayError::FrameTooLarge {
                size: body.len(),
                max: MAX_FRAME_SIZE,
            });
        }
        dst.reserve(LENGTH_SIZE + body.len());
        dst.put_u32(body.len() as u32);
        dst.extend_from_slice(&body);
        Ok(())
    }
}

// ── Tests ────────────────────────────────────────────────────────
