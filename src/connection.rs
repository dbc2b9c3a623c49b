//! Owns one byte stream plus the framing codec, and gates the readable
//! side of the connection on whether there is pending work.

use futures::SinkExt;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio_stream::StreamExt;
use tokio_util::codec::Framed;

use crate::error::ProtocolError;
use crate::wire::command::Command;
use crate::wire::{self, Codec};

/// A connection owns exactly one transport; it is not shared outside the
/// engine task that drives it.
pub(crate) struct Connection<T> {
    framed: Framed<T, Codec>,
    paused: bool,
}

impl<T: AsyncRead + AsyncWrite + Unpin> Connection<T> {
    pub(crate) fn new(stream: T) -> Self {
        Connection { framed: wire::framed(stream), paused: false }
    }

    /// Enqueues `cmd` for transmission and flushes it before returning.
    /// Calls are serialized by the owning engine task, so write order
    /// matches call order.
    pub(crate) async fn send(&mut self, cmd: Command) -> Result<(), ProtocolError> {
        self.framed.send(cmd).await
    }

    /// Reads the next decoded command, or waits forever while the gate says
    /// paused. Returns `None` on clean end-of-stream.
    pub(crate) async fn recv_gated(&mut self) -> Option<Result<Command, ProtocolError>> {
        if self.paused {
            std::future::pending::<()>().await;
            unreachable!("pending future never resolves");
        }
        self.framed.next().await
    }

    pub(crate) fn pause(&mut self) {
        self.paused = true;
    }

    pub(crate) fn resume(&mut self) {
        self.paused = false;
    }

    pub(crate) fn is_paused(&self) -> bool {
        self.paused
    }

    pub(crate) async fn shutdown(&mut self) -> std::io::Result<()> {
        self.framed.get_mut().shutdown().await
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::time::Duration;

    use bytes::BytesMut;
    use tokio_test::io::Builder;
    use tokio_util::codec::Encoder as _;

    use super::*;
    use crate::wire::command::{request, s, Magic};
    use crate::wire::encoder::Encoder as WireEncoder;

    fn encode(cmd: Command) -> Vec<u8> {
        let mut buf = BytesMut::new();
        WireEncoder.encode(cmd, &mut buf).unwrap();
        buf.to_vec()
    }

    #[tokio::test]
    async fn paused_connection_never_yields_a_decoded_command() {
        let echo_res =
            Command::create("ECHO_RES", Magic::Response, BTreeMap::from([("data", s("pong"))])).unwrap();
        let bytes = encode(echo_res);

        let mock = Builder::new().read(&bytes).build();
        let mut conn = Connection::new(mock);

        conn.pause();
        let timed_out = tokio::time::timeout(Duration::from_millis(20), conn.recv_gated()).await;
        assert!(timed_out.is_err(), "a paused connection must not poll the reader");

        conn.resume();
        let cmd = conn.recv_gated().await.unwrap().unwrap();
        assert_eq!(cmd.name(), "ECHO_RES");
    }

    #[tokio::test]
    async fn send_writes_the_encoded_frame() {
        let req = request("ECHO_REQ", &[("data", s("ping"))]);
        let expected = encode(req.clone());

        let mock = Builder::new().write(&expected).build();
        let mut conn = Connection::new(mock);
        conn.send(req).await.unwrap();
    }
}
