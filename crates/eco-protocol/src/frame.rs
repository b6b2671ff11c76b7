//! Frame layout encoding/decoding
//!
//! Every frame starts with a 4-byte big-endian length prefix.
//!
//! Request frames (client to daemon):
//! - total_length: 4 bytes (u32, big-endian), counts everything after the prefix
//! - route_length: 1 byte (u8)
//! - route: `route_length` bytes of UTF-8
//! - payload: the remaining `total_length - 1 - route_length` bytes
//!
//! Packet frames (daemon to client, and streamed updates) carry no route,
//! since the route is fixed for the lifetime of the connection:
//! - payload_length: 4 bytes (u32, big-endian)
//! - payload: `payload_length` bytes

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::ProtocolError;

/// Size of the length prefix in bytes
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Maximum frame body size (16MB)
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Maximum route name length, limited by the 8-bit length field
pub const MAX_ROUTE_LEN: usize = u8::MAX as usize;

/// A request frame: a route name followed by an opaque payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestFrame {
    /// Route this request is addressed to
    pub route: String,
    /// Encoded request payload, possibly empty
    pub payload: Bytes,
}

impl RequestFrame {
    /// Create a new request frame
    pub fn new(route: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            route: route.into(),
            payload: payload.into(),
        }
    }

    /// Length of the frame body (everything after the length prefix)
    pub fn body_len(&self) -> usize {
        1 + self.route.len() + self.payload.len()
    }

    /// Encode the full frame, including the length prefix
    pub fn encode(&self, dst: &mut BytesMut) -> Result<(), ProtocolError> {
        let route_len = self.route.len();
        if route_len > MAX_ROUTE_LEN {
            return Err(ProtocolError::RouteTooLong(route_len));
        }

        let body_len = self.body_len();
        check_size(body_len)?;

        dst.reserve(LENGTH_PREFIX_SIZE + body_len);
        dst.put_u32(body_len as u32);
        dst.put_u8(route_len as u8);
        dst.extend_from_slice(self.route.as_bytes());
        dst.extend_from_slice(&self.payload);
        Ok(())
    }

    /// Decode a frame body (the bytes after the length prefix)
    pub fn decode_body(mut body: Bytes) -> Result<Self, ProtocolError> {
        if body.is_empty() {
            return Err(ProtocolError::EmptyFrame);
        }

        let frame_len = body.len();
        let route_len = body.get_u8() as usize;
        if route_len > body.len() {
            return Err(ProtocolError::TruncatedRoute {
                route_len,
                frame_len,
            });
        }

        let route_bytes = body.split_to(route_len);
        let route = std::str::from_utf8(&route_bytes)
            .map_err(|_| ProtocolError::InvalidRouteName)?
            .to_string();

        Ok(Self {
            route,
            payload: body,
        })
    }
}

/// Write a length prefix for a body of `len` bytes
pub fn put_length(dst: &mut BytesMut, len: usize) -> Result<(), ProtocolError> {
    check_size(len)?;
    dst.reserve(LENGTH_PREFIX_SIZE + len);
    dst.put_u32(len as u32);
    Ok(())
}

/// Read a length prefix from the buffer
///
/// Returns None if there aren't enough bytes in the buffer.
/// Returns Err if the advertised length exceeds [`MAX_FRAME_SIZE`].
pub fn take_length(src: &mut BytesMut) -> Result<Option<usize>, ProtocolError> {
    if src.len() < LENGTH_PREFIX_SIZE {
        return Ok(None);
    }

    let len = src.get_u32() as usize;
    check_size(len)?;
    Ok(Some(len))
}

fn check_size(len: usize) -> Result<(), ProtocolError> {
    if len > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge {
            size: len,
            max: MAX_FRAME_SIZE,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_layout() {
        let frame = RequestFrame::new("sync", Bytes::from_static(&[0xAA, 0xBB]));

        let mut buf = BytesMut::new();
        frame.encode(&mut buf).unwrap();

        // 1 (route len) + 4 (route) + 2 (payload)
        assert_eq!(
            &buf[..],
            &[0, 0, 0, 7, 4, b's', b'y', b'n', b'c', 0xAA, 0xBB][..]
        );
    }

    #[test]
    fn test_route_too_long() {
        let frame = RequestFrame::new("r".repeat(256), Bytes::new());
        let mut buf = BytesMut::new();
        assert!(matches!(
            frame.encode(&mut buf),
            Err(ProtocolError::RouteTooLong(256))
        ));
    }

    #[test]
    fn test_decode_body_truncated_route() {
        let body = Bytes::from_static(&[9, b'a', b'b']);
        assert!(matches!(
            RequestFrame::decode_body(body),
            Err(ProtocolError::TruncatedRoute {
                route_len: 9,
                frame_len: 3
            })
        ));
    }

    #[test]
    fn test_decode_empty_body() {
        assert!(matches!(
            RequestFrame::decode_body(Bytes::new()),
            Err(ProtocolError::EmptyFrame)
        ));
    }

    #[test]
    fn test_take_length_insufficient_bytes() {
        let mut buf = BytesMut::from(&[0u8; 3][..]);
        assert!(take_length(&mut buf).unwrap().is_none());
        assert_eq!(buf.len(), 3);
    }

    #[test]
    fn test_take_length_too_large() {
        let mut buf = BytesMut::from(&[0xFF, 0xFF, 0xFF, 0xFF][..]);
        assert!(matches!(
            take_length(&mut buf),
            Err(ProtocolError::FrameTooLarge { .. })
        ));
    }
}
