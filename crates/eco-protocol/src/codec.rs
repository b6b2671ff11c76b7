//! Tokio codecs for request and packet frames

use bytes::{Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::ProtocolError;
use crate::frame::{put_length, take_length, RequestFrame};

/// Codec for route-addressed request frames
///
/// The daemon decodes exactly one of these at the start of every
/// connection; the client encodes it.
#[derive(Debug, Default)]
pub struct RequestCodec {
    /// Body length already read from the stream (if any)
    pending_length: Option<usize>,
}

impl RequestCodec {
    /// Create a new codec
    pub fn new() -> Self {
        Self {
            pending_length: None,
        }
    }
}

impl Decoder for RequestCodec {
    type Item = RequestFrame;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let len = match self.pending_length.take() {
            Some(len) => len,
            None => match take_length(src)? {
                Some(len) => len,
                None => return Ok(None),
            },
        };

        if len == 0 {
            return Err(ProtocolError::EmptyFrame);
        }

        if src.len() < len {
            self.pending_length = Some(len);
            src.reserve(len - src.len());
            return Ok(None);
        }

        let body = src.split_to(len).freeze();
        RequestFrame::decode_body(body).map(Some)
    }
}

impl Encoder<RequestFrame> for RequestCodec {
    type Error = ProtocolError;

    fn encode(&mut self, frame: RequestFrame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        frame.encode(dst)
    }
}

/// Codec for length-prefixed packets with no route
///
/// Used for responses and for every streamed update after the request.
/// A zero-length packet is valid and decodes to an empty payload.
#[derive(Debug, Default)]
pub struct PacketCodec {
    pending_length: Option<usize>,
}

impl PacketCodec {
    /// Create a new codec
    pub fn new() -> Self {
        Self {
            pending_length: None,
        }
    }
}

impl Decoder for PacketCodec {
    type Item = Bytes;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let len = match self.pending_length.take() {
            Some(len) => len,
            None => match take_length(src)? {
                Some(len) => len,
                None => return Ok(None),
            },
        };

        if src.len() < len {
            self.pending_length = Some(len);
            src.reserve(len - src.len());
            return Ok(None);
        }

        Ok(Some(src.split_to(len).freeze()))
    }
}

impl Encoder<Bytes> for PacketCodec {
    type Error = ProtocolError;

    fn encode(&mut self, payload: Bytes, dst: &mut BytesMut) -> Result<(), Self::Error> {
        put_length(dst, payload.len())?;
        dst.extend_from_slice(&payload);
        Ok(())
    }
}
