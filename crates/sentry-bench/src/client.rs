//! Minimal lookup client: one persistent connection, one request in flight.

use std::io;
use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

use sentry_core::error::{Result, SentryError};
use sentry_core::protocol::{
    decode_response, encode_request, split_frame, LookupFrame, ResultFrame, ServerFrame,
};

/// Upper bound for a single response body.
const MAX_RESPONSE_BYTES: usize = 64 * 1024;

pub struct LookupClient {
    stream: TcpStream,
    inbuf: BytesMut,
    outbuf: BytesMut,
    next_seq: u32,
}

impl LookupClient {
    pub async fn connect(addr: &str, limit: Duration) -> Result<Self> {
        let stream = match timeout(limit, TcpStream::connect(addr)).await {
            Ok(res) => res?,
            Err(_) => {
                return Err(SentryError::Io(io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("connect to {addr} timed out"),
                )))
            }
        };
        let _ = stream.set_nodelay(true);

        Ok(Self {
            stream,
            inbuf: BytesMut::with_capacity(1024),
            outbuf: BytesMut::with_capacity(256),
            next_seq: 0,
        })
    }

    /// One round trip bounded by `limit`. After an error the connection is in
    /// an unknown state and should be dropped.
    pub async fn lookup(&mut self, key: &str, limit: Duration) -> Result<ResultFrame> {
        let seq = self.next_seq;
        self.next_seq = self.next_seq.wrapping_add(1);

        self.outbuf.clear();
        encode_request(&LookupFrame { seq: Some(seq), key: key.to_owned() }, &mut self.outbuf);

        match timeout(limit, self.round_trip(seq)).await {
            Ok(res) => res,
            Err(_) => Err(SentryError::LookupTimeout),
        }
    }

    async fn round_trip(&mut self, seq: u32) -> Result<ResultFrame> {
        self.stream.write_all(&self.outbuf).await?;

        loop {
            if let Some(body) = split_frame(&mut self.inbuf, MAX_RESPONSE_BYTES)? {
                return match decode_response(body)? {
                    ServerFrame::Result(r) if r.seq == Some(seq) => Ok(r),
                    ServerFrame::Result(r) => Err(SentryError::Protocol(format!(
                        "response seq {:?} does not match request {seq}",
                        r.seq
                    ))),
                    ServerFrame::Error(e) => Err(SentryError::Protocol(format!(
                        "server rejected request ({}): {}",
                        e.kind.as_str(),
                        e.message
                    ))),
                };
            }

            if self.stream.read_buf(&mut self.inbuf).await? == 0 {
                return Err(SentryError::Io(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "server closed the connection",
                )));
            }
        }
    }
}
