//! Byte framer: turns a stream of bytes into [`Packet`]s and serializes
//! outgoing action requests.
//!
//! Implemented as a `tokio_util::codec::{Decoder, Encoder}` pair rather than
//! a hand-rolled buffer scanner, since `tokio-util`'s `codec` feature is
//! already part of this workspace's dependency surface and `Framed<TcpStream,
//! _>` is the idiomatic way this ecosystem turns a socket into a packet
//! stream (see `services/receiver`'s dependency on `tokio-util/codec`).

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::action::OutgoingRequest;
use crate::error::AmiError;
use crate::packet::Packet;

const TERMINATOR: &[u8] = b"\r\n\r\n";

#[derive(Debug, Default)]
pub struct AmiCodec;

impl Decoder for AmiCodec {
    type Item = Packet;
    type Error = AmiError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Packet>, AmiError> {
        let Some(pos) = find_terminator(src) else {
            return Ok(None);
        };
        // `pos` is the index of the first byte of `\r\n\r\n`; the packet
        // body is everything before it (the blank-line terminator itself
        // carries no information).
        let packet_bytes = src.split_to(pos);
        src.advance(TERMINATOR.len());
        Ok(Some(Packet::parse(&packet_bytes)))
    }
}

fn find_terminator(src: &BytesMut) -> Option<usize> {
    src.windows(TERMINATOR.len())
        .position(|w| w == TERMINATOR)
}

impl Encoder<OutgoingRequest> for AmiCodec {
    type Error = AmiError;

    fn encode(&mut self, req: OutgoingRequest, dst: &mut BytesMut) -> Result<(), AmiError> {
        validate_value(&req.action)?;
        dst.put_slice(b"Action: ");
        dst.put_slice(req.action.as_bytes());
        dst.put_slice(b"\r\n");
        for (name, value) in &req.headers {
            validate_value(value)?;
            dst.put_slice(name.as_bytes());
            dst.put_slice(b": ");
            dst.put_slice(value.as_bytes());
            dst.put_slice(b"\r\n");
        }
        dst.put_slice(b"\r\n");
        Ok(())
    }
}

fn validate_value(v: &str) -> Result<(), AmiError> {
    if v.contains('\r') || v.contains('\n') {
        return Err(AmiError::Validation(format!(
            "header value must not contain CR/LF: {v:?}"
        )));
    }
    Ok(())
}
