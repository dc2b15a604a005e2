//! Frame encoding, decoding, and stream reassembly

use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};

use crate::constants::{MsgType, HEADER_LEN, LENGTH_PREFIX_LEN, MAX_PAYLOAD_LEN};
use crate::error::{ProtocolError, Result};
use crate::header::MessageHeader;

/// A complete wire frame: header plus payload bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub header: MessageHeader,
    pub payload: Vec<u8>,
}

impl Frame {
    /// Create a frame for the given type, request id, and payload.
    pub fn new(msg_type: MsgType, req_id: u64, payload: Vec<u8>) -> Self {
        Self {
            header: MessageHeader::new(msg_type, req_id, payload.len() as u32),
            payload,
        }
    }

    /// Encode as a datagram: `[header][payload]`.
    ///
    /// Used by the tagged-message transport, where each send already
    /// transfers exactly one delimited message.
    pub fn encode_datagram(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(HEADER_LEN + self.payload.len());
        buf.extend_from_slice(&self.header.encode());
        buf.extend_from_slice(&self.payload);
        buf
    }

    /// Encode for a byte stream: `[total:u32][header][payload]` where
    /// `total` covers header + payload.
    pub fn encode_stream(&self) -> Vec<u8> {
        let total = (HEADER_LEN + self.payload.len()) as u32;
        let mut buf = Vec::with_capacity(LENGTH_PREFIX_LEN + total as usize);
        buf.write_u32::<LittleEndian>(total).unwrap();
        buf.extend_from_slice(&self.header.encode());
        buf.extend_from_slice(&self.payload);
        buf
    }

    /// Decode a datagram produced by [`Frame::encode_datagram`].
    pub fn decode_datagram(data: &[u8]) -> Result<Self> {
        let header = MessageHeader::decode(data)?;
        let carried = data.len() - HEADER_LEN;
        if header.payload_len as usize != carried {
            return Err(ProtocolError::LengthMismatch {
                declared: header.payload_len as usize,
                carried,
            });
        }
        Ok(Self {
            header,
            payload: data[HEADER_LEN..].to_vec(),
        })
    }

    /// Pop one complete frame off the front of a stream receive buffer.
    ///
    /// Returns `Ok(None)` when the buffer does not yet hold a complete
    /// frame. On success the consumed bytes are erased from the front
    /// of the buffer; the buffer is only ever consumed in whole-frame
    /// increments.
    pub fn extract(buf: &mut Vec<u8>) -> Result<Option<Self>> {
        if buf.len() < LENGTH_PREFIX_LEN {
            return Ok(None);
        }

        let total = LittleEndian::read_u32(&buf[..LENGTH_PREFIX_LEN]) as usize;
        if total < HEADER_LEN {
            return Err(ProtocolError::FrameTooShort {
                total,
                header: HEADER_LEN,
            });
        }
        if total > (HEADER_LEN + MAX_PAYLOAD_LEN as usize) {
            return Err(ProtocolError::PayloadTooLarge {
                len: (total - HEADER_LEN) as u32,
                max: MAX_PAYLOAD_LEN,
            });
        }
        if buf.len() < LENGTH_PREFIX_LEN + total {
            return Ok(None);
        }

        let header = MessageHeader::decode(&buf[LENGTH_PREFIX_LEN..LENGTH_PREFIX_LEN + total])?;
        let carried = total - HEADER_LEN;
        if header.payload_len as usize != carried {
            return Err(ProtocolError::LengthMismatch {
                declared: header.payload_len as usize,
                carried,
            });
        }

        let payload_start = LENGTH_PREFIX_LEN + HEADER_LEN;
        let payload = buf[payload_start..payload_start + carried].to_vec();
        buf.drain(..LENGTH_PREFIX_LEN + total);

        Ok(Some(Self { header, payload }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_datagram_roundtrip() {
        let frame = Frame::new(MsgType::ResponseChunk, 7, b"hello".to_vec());
        let encoded = frame.encode_datagram();
        let decoded = Frame::decode_datagram(&encoded).unwrap();
        assert_eq!(decoded, frame);
    }

    #[test]
    fn test_datagram_empty_payload() {
        let frame = Frame::new(MsgType::ResponseDone, 9, Vec::new());
        let decoded = Frame::decode_datagram(&frame.encode_datagram()).unwrap();
        assert_eq!(decoded.header.payload_len, 0);
        assert!(decoded.payload.is_empty());
    }

    #[test]
    fn test_datagram_length_mismatch() {
        let frame = Frame::new(MsgType::ResponseChunk, 7, b"hello".to_vec());
        let mut encoded = frame.encode_datagram();
        encoded.push(0xAA);
        assert!(matches!(
            Frame::decode_datagram(&encoded),
            Err(ProtocolError::LengthMismatch { .. })
        ));
    }

    #[test]
    fn test_extract_whole_frame() {
        let frame = Frame::new(MsgType::RequestInfer, 42, b"payload".to_vec());
        let mut buf = frame.encode_stream();
        let extracted = Frame::extract(&mut buf).unwrap().unwrap();
        assert_eq!(extracted, frame);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_extract_is_chunk_boundary_independent() {
        // Feed the encoded frame one byte at a time; it must come out
        // whole exactly once, regardless of arrival boundaries.
        let frame = Frame::new(MsgType::RequestInfer, 3, vec![0xAB; 300]);
        let encoded = frame.encode_stream();

        let mut buf = Vec::new();
        let mut extracted = None;
        for (i, b) in encoded.iter().enumerate() {
            buf.push(*b);
            match Frame::extract(&mut buf).unwrap() {
                Some(f) => {
                    assert_eq!(i, encoded.len() - 1, "frame completed early");
                    extracted = Some(f);
                }
                None => assert!(i < encoded.len() - 1, "frame never completed"),
            }
        }
        assert_eq!(extracted.unwrap(), frame);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_extract_multiple_frames_back_to_back() {
        let a = Frame::new(MsgType::ResponseChunk, 1, b"aa".to_vec());
        let b = Frame::new(MsgType::ResponseDone, 1, Vec::new());
        let mut buf = a.encode_stream();
        buf.extend_from_slice(&b.encode_stream());

        assert_eq!(Frame::extract(&mut buf).unwrap().unwrap(), a);
        assert_eq!(Frame::extract(&mut buf).unwrap().unwrap(), b);
        assert_eq!(Frame::extract(&mut buf).unwrap(), None);
    }

    #[test]
    fn test_extract_bad_magic_is_error() {
        let frame = Frame::new(MsgType::ResponseChunk, 5, b"x".to_vec());
        let mut buf = frame.encode_stream();
        buf[LENGTH_PREFIX_LEN] ^= 0xFF;
        assert!(matches!(
            Frame::extract(&mut buf),
            Err(ProtocolError::InvalidMagic)
        ));
    }

    #[test]
    fn test_extract_undersized_total_is_error() {
        let mut buf = vec![0u8; 8];
        LittleEndian::write_u32(&mut buf[..4], (HEADER_LEN - 1) as u32);
        assert!(matches!(
            Frame::extract(&mut buf),
            Err(ProtocolError::FrameTooShort { .. })
        ));
    }

    #[test]
    fn test_extract_inconsistent_length_is_error() {
        let frame = Frame::new(MsgType::ResponseChunk, 5, b"abcd".to_vec());
        let mut buf = frame.encode_stream();
        // Shrink the declared payload length without touching the total.
        let len_off = LENGTH_PREFIX_LEN + HEADER_LEN - 4;
        LittleEndian::write_u32(&mut buf[len_off..len_off + 4], 2);
        assert!(matches!(
            Frame::extract(&mut buf),
            Err(ProtocolError::LengthMismatch { .. })
        ));
    }

    #[test]
    fn test_extract_large_payload() {
        let frame = Frame::new(MsgType::ResponseChunk, 11, vec![0x5A; 2 * 1024 * 1024]);
        let mut buf = frame.encode_stream();
        let extracted = Frame::extract(&mut buf).unwrap().unwrap();
        assert_eq!(extracted.payload.len(), 2 * 1024 * 1024);
        assert_eq!(extracted, frame);
    }
}
