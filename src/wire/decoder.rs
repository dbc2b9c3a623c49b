//! Binary frame decoding.
//!
//! Wire format: `magic(4B) | type(u32 BE) | dataLen(u32 BE) | payload`.
//! The payload's fields are NUL-separated; the final field (if any) is the
//! opaque "data" field and may itself contain NUL bytes.

use bytes::{Buf, Bytes};
use tokio_util::codec;

use super::catalog;
use super::command::{Command, Magic};
use crate::error::ProtocolError;

const HEADER_LEN: usize = 12;

#[derive(Debug, Default)]
pub struct Decoder;

impl codec::Decoder for Decoder {
    type Item = Command;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut bytes::BytesMut) -> Result<Option<Command>, ProtocolError> {
        if src.len() < HEADER_LEN {
            return Ok(None);
        }

        let magic_bytes: [u8; 4] = src[0..4].try_into().unwrap();
        let magic = Magic::from_bytes(magic_bytes).ok_or(ProtocolError::BadMagic(magic_bytes))?;
        let code = u32::from_be_bytes(src[4..8].try_into().unwrap());
        let data_len = u32::from_be_bytes(src[8..12].try_into().unwrap()) as usize;

        if src.len() < HEADER_LEN + data_len {
            // Reserve up to 16 KiB to cut down on reallocations while the
            // rest of the payload trickles in; a claimed length far bigger
            // than that shouldn't make us grab memory for bytes we haven't
            // actually received yet.
            let needed = HEADER_LEN + data_len - src.len();
            src.reserve(needed.min(16_384));
            return Ok(None);
        }

        let kind = catalog::by_code(code).ok_or(ProtocolError::UnknownCode(code))?;

        src.advance(HEADER_LEN);
        let payload = src.split_to(data_len).freeze();

        let fields = split_fields(&payload, kind.fields.len())?;

        Ok(Some(Command::from_decoded(magic, kind, fields)))
    }
}

fn split_fields(payload: &Bytes, n: usize) -> Result<Vec<Bytes>, ProtocolError> {
    if n == 0 {
        return if payload.is_empty() {
            Ok(Vec::new())
        } else {
            Err(ProtocolError::TruncatedPayload { expected_fields: 0, got: 1 })
        };
    }

    let mut fields = Vec::with_capacity(n);
    let mut rest = payload.clone();
    for _ in 0..n - 1 {
        match rest.iter().position(|&b| b == 0) {
            Some(idx) => {
                fields.push(rest.split_to(idx));
                rest.advance(1); // discard the NUL separator
            },
            None => {
                return Err(ProtocolError::TruncatedPayload {
                    expected_fields: n,
                    got: fields.len() + 1,
                });
            },
        }
    }
    fields.push(rest);

    Ok(fields)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_util::codec::Decoder as _;

    fn frame(magic: &[u8; 4], code: u32, payload: &[u8]) -> bytes::BytesMut {
        let mut buf = bytes::BytesMut::new();
        buf.extend_from_slice(magic);
        buf.extend_from_slice(&code.to_be_bytes());
        buf.extend_from_slice(&(payload.len() as u32).to_be_bytes());
        buf.extend_from_slice(payload);
        buf
    }

    #[test]
    fn decodes_multi_field_command() {
        let mut buf = frame(b"\x00REQ", 7, b"reverse\x00u-1\x00hello");
        let mut d = Decoder;
        let cmd = d.decode(&mut buf).unwrap().unwrap();
        assert_eq!(cmd.name(), "SUBMIT_JOB");
        assert_eq!(cmd.field_str("function_name").unwrap(), "reverse");
        assert_eq!(cmd.field_str("id").unwrap(), "u-1");
        assert_eq!(cmd.field("data").unwrap().as_ref(), b"hello");
        assert!(buf.is_empty());
    }

    #[test]
    fn preserves_embedded_nul_in_data_field() {
        let mut buf = frame(b"\x00REQ", 7, b"f\x00u\x00a\x00b");
        let mut d = Decoder;
        let cmd = d.decode(&mut buf).unwrap().unwrap();
        assert_eq!(cmd.field("data").unwrap().as_ref(), b"a\x00b");
    }

    #[test]
    fn zero_field_command_has_empty_payload() {
        let mut buf = frame(b"\x00REQ", 9, b"");
        let mut d = Decoder;
        let cmd = d.decode(&mut buf).unwrap().unwrap();
        assert_eq!(cmd.name(), "GRAB_JOB");
    }

    #[test]
    fn waits_for_full_header() {
        let mut buf = bytes::BytesMut::from(&b"\x00REQ\x00\x00\x00"[..]);
        let mut d = Decoder;
        assert!(d.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn waits_for_full_payload() {
        let full = frame(b"\x00REQ", 7, b"f\x00u\x00data");
        let mut buf = bytes::BytesMut::from(&full[..full.len() - 2]);
        let mut d = Decoder;
        assert!(d.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn rejects_unknown_magic() {
        let mut buf = frame(b"\x00XYZ", 7, b"");
        let mut d = Decoder;
        assert!(matches!(d.decode(&mut buf), Err(ProtocolError::BadMagic(_))));
    }

    #[test]
    fn rejects_unknown_code() {
        let mut buf = frame(b"\x00REQ", 999, b"");
        let mut d = Decoder;
        assert!(matches!(d.decode(&mut buf), Err(ProtocolError::UnknownCode(999))));
    }

    #[test]
    fn rejects_too_few_fields() {
        let mut buf = frame(b"\x00REQ", 7, b"onlyone");
        let mut d = Decoder;
        assert!(matches!(
            d.decode(&mut buf),
            Err(ProtocolError::TruncatedPayload { expected_fields: 3, got: 1 })
        ));
    }
}
