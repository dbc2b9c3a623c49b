use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{self, Framed};

use command::Command;

pub mod catalog;
pub mod command;
pub mod decoder;
pub mod encoder;

pub use command::Magic;

/// Wraps a byte stream in the Gearman binary [`Codec`].
pub fn framed<T: AsyncRead + AsyncWrite>(stream: T) -> Framed<T, Codec> {
    Framed::new(stream, Codec::default())
}

/// Combines the decoder and encoder halves into a single
/// `tokio_util::codec` implementation, in the same shape as a split
/// read/write codec pair.
#[derive(Default)]
pub struct Codec {
    d: decoder::Decoder,
    e: encoder::Encoder,
}

impl codec::Decoder for Codec {
    type Item = Command;
    type Error = crate::error::ProtocolError;

    fn decode(&mut self, src: &mut bytes::BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        self.d.decode(src)
    }
}

impl codec::Encoder<Command> for Codec {
    type Error = crate::error::ProtocolError;

    fn encode(&mut self, item: Command, dst: &mut bytes::BytesMut) -> Result<(), Self::Error> {
        self.e.encode(item, dst)
    }
}
