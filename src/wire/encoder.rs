use bytes::BufMut;
use tokio_util::codec;

use super::command::Command;
use crate::error::ProtocolError;

/// Encodes a [`Command`] back onto the wire. Field presence was already
/// validated at construction time (`Command::create`/`from_decoded`), so
/// encoding itself never produces `Err`; the error type only exists to
/// satisfy `tokio_util::codec::Encoder`'s `From<io::Error>` bound so that
/// [`super::Codec`] can share one error type across both directions.
#[derive(Debug, Default)]
pub struct Encoder;

impl codec::Encoder<Command> for Encoder {
    type Error = ProtocolError;

    fn encode(&mut self, item: Command, dst: &mut bytes::BytesMut) -> Result<(), ProtocolError> {
        let fields = item.ordered_fields();
        let payload_len: usize = fields.iter().map(|f| f.len()).sum::<usize>()
            + fields.len().saturating_sub(1);

        dst.reserve(12 + payload_len);
        dst.put_slice(&item.magic.bytes());
        dst.put_u32(item.kind.code);
        dst.put_u32(payload_len as u32);

        for (i, field) in fields.iter().enumerate() {
            if i > 0 {
                dst.put_u8(0);
            }
            dst.put_slice(field);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::command::{request, s, Magic};
    use bytes::Bytes;
    use tokio_util::codec::{Decoder as _, Encoder as _};

    #[test]
    fn round_trips_every_catalog_entry() {
        use crate::wire::catalog::CATALOG;
        use crate::wire::decoder::Decoder;
        use std::collections::BTreeMap;

        for kind in CATALOG {
            let mut args: BTreeMap<&str, Bytes> = BTreeMap::new();
            for field in kind.fields {
                let value = if field.is_data {
                    Bytes::from_static(b"payload\x00with-nul")
                } else {
                    s(format!("v-{}", field.name))
                };
                args.insert(field.name, value);
            }
            let cmd = Command::create(kind.name, Magic::Request, args).unwrap();

            let mut buf = bytes::BytesMut::new();
            Encoder.encode(cmd.clone(), &mut buf).unwrap();

            let decoded = Decoder.decode(&mut buf).unwrap().unwrap();
            assert_eq!(decoded.name(), cmd.name());
            for field in kind.fields {
                assert_eq!(decoded.field(field.name), cmd.field(field.name));
            }
            assert!(buf.is_empty(), "{}: decoder left unconsumed bytes", kind.name);
        }
    }

    #[test]
    fn zero_field_command_encodes_empty_payload() {
        let cmd = request("GRAB_JOB", &[]);
        let mut buf = bytes::BytesMut::new();
        Encoder.encode(cmd, &mut buf).unwrap();
        assert_eq!(&buf[..], b"\x00REQ\x00\x00\x00\x09\x00\x00\x00\x00");
    }
}
