// src/core/protocol/binary.rs

//! The compact encoding: a 4-byte big-endian length prefix followed by a `bincode` payload.

use super::MAX_FRAME_SIZE;
use crate::core::CortadoError;
use bincode::config;
use bytes::{Buf, BufMut, BytesMut};
use std::marker::PhantomData;
use tokio_util::codec::{Decoder, Encoder};

const LENGTH_PREFIX: usize = 4;

/// Decodes `In` messages and encodes anything `bincode` can encode.
///
/// Servers use `BinaryCodec<Request>`, clients use `BinaryCodec<Response>`.
#[derive(Debug)]
pub struct BinaryCodec<In> {
    _marker: PhantomData<fn() -> In>,
}

impl<In> BinaryCodec<In> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<In> Default for BinaryCodec<In> {
    fn default() -> Self {
        Self::new()
    }
}

impl<In, Out> Encoder<Out> for BinaryCodec<In>
where
    Out: bincode::Encode,
{
    type Error = CortadoError;

    fn encode(&mut self, item: Out, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let payload = bincode::encode_to_vec(&item, config::standard())?;
        if payload.len() > MAX_FRAME_SIZE {
            return Err(CortadoError::Protocol(format!(
                "frame of {} bytes exceeds the {MAX_FRAME_SIZE} byte limit",
                payload.len()
            )));
        }
        dst.reserve(LENGTH_PREFIX + payload.len());
        dst.put_u32(payload.len() as u32);
        dst.extend_from_slice(&payload);
        Ok(())
    }
}

impl<In> Decoder for BinaryCodec<In>
where
    In: bincode::Decode<()>,
{
    type Item = In;
    type Error = CortadoError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < LENGTH_PREFIX {
            return Ok(None);
        }

        let mut prefix = [0u8; LENGTH_PREFIX];
        prefix.copy_from_slice(&src[..LENGTH_PREFIX]);
        let len = u32::from_be_bytes(prefix) as usize;
        if len > MAX_FRAME_SIZE {
            return Err(CortadoError::Protocol(format!(
                "frame of {len} bytes exceeds the {MAX_FRAME_SIZE} byte limit"
            )));
        }

        if src.len() < LENGTH_PREFIX + len {
            src.reserve(LENGTH_PREFIX + len - src.len());
            return Ok(None);
        }

        src.advance(LENGTH_PREFIX);
        let payload = src.split_to(len);
        let (item, consumed) = bincode::decode_from_slice::<In, _>(&payload, config::standard())?;
        if consumed != len {
            return Err(CortadoError::Protocol(format!(
                "frame declared {len} bytes but message used {consumed}"
            )));
        }
        Ok(Some(item))
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(buf)? {
            Some(frame) => Ok(Some(frame)),
            None if buf.is_empty() => Ok(None),
            None => Err(CortadoError::IncompleteData),
        }
    }
}
