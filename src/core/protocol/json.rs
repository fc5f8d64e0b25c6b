// src/core/protocol/json.rs

//! The self-describing encoding: one JSON document per `\n`-terminated line.

use super::MAX_FRAME_SIZE;
use crate::core::CortadoError;
use bytes::{BufMut, BytesMut};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::marker::PhantomData;
use tokio_util::codec::{Decoder, Encoder};

#[derive(Debug)]
pub struct JsonCodec<In> {
    /// How far into the buffer has already been scanned for a newline.
    next_index: usize,
    _marker: PhantomData<fn() -> In>,
}

impl<In> JsonCodec<In> {
    pub fn new() -> Self {
        Self {
            next_index: 0,
            _marker: PhantomData,
        }
    }
}

impl<In> Default for JsonCodec<In> {
    fn default() -> Self {
        Self::new()
    }
}

impl<In, Out> Encoder<Out> for JsonCodec<In>
where
    Out: Serialize,
{
    type Error = CortadoError;

    fn encode(&mut self, item: Out, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let line = serde_json::to_vec(&item)?;
        if line.len() > MAX_FRAME_SIZE {
            return Err(CortadoError::Protocol(format!(
                "document of {} bytes exceeds the {MAX_FRAME_SIZE} byte limit",
                line.len()
            )));
        }
        dst.reserve(line.len() + 1);
        dst.extend_from_slice(&line);
        dst.put_u8(b'\n');
        Ok(())
    }
}

impl<In> Decoder for JsonCodec<In>
where
    In: DeserializeOwned,
{
    type Item = In;
    type Error = CortadoError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            let Some(offset) = src[self.next_index..].iter().position(|b| *b == b'\n') else {
                if src.len() > MAX_FRAME_SIZE {
                    return Err(CortadoError::Protocol(format!(
                        "line exceeds the {MAX_FRAME_SIZE} byte limit"
                    )));
                }
                self.next_index = src.len();
                return Ok(None);
            };

            let line = src.split_to(self.next_index + offset + 1);
            self.next_index = 0;
            let body = &line[..line.len() - 1];

            // Blank lines carry nothing; skip them.
            if body.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            return Ok(Some(serde_json::from_slice(body)?));
        }
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(buf)? {
            Some(frame) => Ok(Some(frame)),
            None if buf.iter().all(u8::is_ascii_whitespace) => {
                buf.clear();
                self.next_index = 0;
                Ok(None)
            }
            None => Err(CortadoError::IncompleteData),
        }
    }
}
