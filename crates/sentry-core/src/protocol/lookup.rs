//! Lookup request/response bodies (panic-free).
//!
//! Common header: `v:u8 | op:u8 | flags:u8 | [seq:u32 LE]`.
//! - LOOKUP (`0x01`): key bytes (UTF-8, non-empty) follow the header.
//! - RESULT (`0x81`): `status:u8 | source:u8 | decision:u8 | payload bytes`.
//! - ERROR  (`0xFF`): `kind:u8 | message bytes`.

use std::fmt;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::Serialize;

use crate::error::{ErrorKind, Result, SentryError};
use crate::protocol::frame::put_frame;

/// Protocol version.
pub const VERSION: u8 = 1;

pub const OP_LOOKUP: u8 = 0x01;
pub const OP_RESULT: u8 = 0x81;
pub const OP_ERROR: u8 = 0xFF;

/// Header flag: seq (u32) is present.
pub const FLAG_SEQ_PRESENT: u8 = 0x01;

const STATUS_FOUND: u8 = 0;
const STATUS_NOT_FOUND: u8 = 1;

/// Outcome of a lookup.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Allow,
    Block,
    /// Answer with another name (destination).
    Redirect(String),
    /// Arbitrary value mapped to the key.
    Value(String),
}

impl Decision {
    pub fn code(&self) -> u8 {
        match self {
            Decision::Allow => 0,
            Decision::Block => 1,
            Decision::Redirect(_) => 2,
            Decision::Value(_) => 3,
        }
    }

    /// Short label used for metrics and reports.
    pub fn label(&self) -> &'static str {
        match self {
            Decision::Allow => "allow",
            Decision::Block => "block",
            Decision::Redirect(_) => "redirect",
            Decision::Value(_) => "value",
        }
    }

    pub fn payload(&self) -> &str {
        match self {
            Decision::Allow | Decision::Block => "",
            Decision::Redirect(s) | Decision::Value(s) => s,
        }
    }

    /// Rebuild a decision from its wire code and payload.
    pub fn from_parts(code: u8, payload: String) -> Result<Self> {
        match code {
            0 => Ok(Decision::Allow),
            1 => Ok(Decision::Block),
            2 if payload.is_empty() => {
                Err(SentryError::Protocol("redirect without destination".into()))
            }
            2 => Ok(Decision::Redirect(payload)),
            3 => Ok(Decision::Value(payload)),
            other => Err(SentryError::Protocol(format!("unknown decision code: {other}"))),
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decision::Allow | Decision::Block => f.write_str(self.label()),
            Decision::Redirect(dst) => write!(f, "redirect {dst}"),
            Decision::Value(v) => write!(f, "value {v}"),
        }
    }
}

/// Where a result came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    Cache,
    Store,
    Default,
}

impl Source {
    pub fn code(self) -> u8 {
        match self {
            Source::Cache => 0,
            Source::Store => 1,
            Source::Default => 2,
        }
    }

    pub fn from_code(code: u8) -> Result<Self> {
        match code {
            0 => Ok(Source::Cache),
            1 => Ok(Source::Store),
            2 => Ok(Source::Default),
            other => Err(SentryError::Protocol(format!("unknown source code: {other}"))),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Source::Cache => "cache",
            Source::Store => "store",
            Source::Default => "default",
        }
    }
}

/// Client -> server lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupFrame {
    /// Optional request id echoed back in the response.
    pub seq: Option<u32>,
    pub key: String,
}

/// Successful lookup answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultFrame {
    pub seq: Option<u32>,
    /// `false` when the default decision was applied (not-found).
    pub found: bool,
    pub source: Source,
    pub decision: Decision,
}

/// Error sent right before the server closes a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorFrame {
    pub seq: Option<u32>,
    pub kind: ErrorKind,
    pub message: String,
}

/// Server -> client frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerFrame {
    Result(ResultFrame),
    Error(ErrorFrame),
}

impl ServerFrame {
    pub fn seq(&self) -> Option<u32> {
        match self {
            ServerFrame::Result(r) => r.seq,
            ServerFrame::Error(e) => e.seq,
        }
    }
}

struct Header {
    op: u8,
    seq: Option<u32>,
}

fn decode_header(buf: &mut Bytes) -> Result<Header> {
    // Minimum header: v, op, flags
    if buf.remaining() < 3 {
        return Err(SentryError::Protocol("frame too short".into()));
    }

    let v = buf.get_u8();
    if v != VERSION {
        return Err(SentryError::UnsupportedVersion(v));
    }

    let op = buf.get_u8();
    let flags = buf.get_u8();

    let seq = if (flags & FLAG_SEQ_PRESENT) != 0 {
        if buf.remaining() < 4 {
            return Err(SentryError::Protocol("seq flag set but missing u32".into()));
        }
        Some(buf.get_u32_le())
    } else {
        None
    };

    Ok(Header { op, seq })
}

fn put_header(dst: &mut Vec<u8>, op: u8, seq: Option<u32>) {
    dst.put_u8(VERSION);
    dst.put_u8(op);
    match seq {
        Some(seq) => {
            dst.put_u8(FLAG_SEQ_PRESENT);
            dst.put_u32_le(seq);
        }
        None => dst.put_u8(0),
    }
}

fn utf8(buf: Bytes, what: &str) -> Result<String> {
    String::from_utf8(buf.to_vec())
        .map_err(|_| SentryError::Protocol(format!("{what} is not valid utf-8")))
}

/// Decode a lookup request body.
pub fn decode_request(mut buf: Bytes) -> Result<LookupFrame> {
    let header = decode_header(&mut buf)?;
    if header.op != OP_LOOKUP {
        return Err(SentryError::Protocol(format!("unexpected opcode: {:#04x}", header.op)));
    }

    let key = utf8(buf.copy_to_bytes(buf.remaining()), "key")?;
    if key.is_empty() {
        return Err(SentryError::Protocol("empty key".into()));
    }

    Ok(LookupFrame { seq: header.seq, key })
}

/// Decode a server response body.
pub fn decode_response(mut buf: Bytes) -> Result<ServerFrame> {
    let header = decode_header(&mut buf)?;
    match header.op {
        OP_RESULT => {
            if buf.remaining() < 3 {
                return Err(SentryError::Protocol("result frame too short".into()));
            }
            let found = match buf.get_u8() {
                STATUS_FOUND => true,
                STATUS_NOT_FOUND => false,
                other => {
                    return Err(SentryError::Protocol(format!("unknown status: {other}")));
                }
            };
            let source = Source::from_code(buf.get_u8())?;
            let code = buf.get_u8();
            let payload = utf8(buf.copy_to_bytes(buf.remaining()), "payload")?;
            Ok(ServerFrame::Result(ResultFrame {
                seq: header.seq,
                found,
                source,
                decision: Decision::from_parts(code, payload)?,
            }))
        }
        OP_ERROR => {
            if buf.remaining() < 1 {
                return Err(SentryError::Protocol("error frame too short".into()));
            }
            let kind = ErrorKind::from_code(buf.get_u8());
            let message = String::from_utf8_lossy(&buf).into_owned();
            Ok(ServerFrame::Error(ErrorFrame { seq: header.seq, kind, message }))
        }
        other => Err(SentryError::Protocol(format!("unexpected opcode: {other:#04x}"))),
    }
}

/// Append a framed lookup request to `dst`.
pub fn encode_request(frame: &LookupFrame, dst: &mut BytesMut) {
    let mut body = Vec::with_capacity(7 + frame.key.len());
    put_header(&mut body, OP_LOOKUP, frame.seq);
    body.put_slice(frame.key.as_bytes());
    put_frame(dst, &body);
}

/// Append a framed server response to `dst`.
pub fn encode_response(frame: &ServerFrame, dst: &mut BytesMut) {
    let mut body = Vec::with_capacity(32);
    match frame {
        ServerFrame::Result(r) => {
            put_header(&mut body, OP_RESULT, r.seq);
            body.put_u8(if r.found { STATUS_FOUND } else { STATUS_NOT_FOUND });
            body.put_u8(r.source.code());
            body.put_u8(r.decision.code());
            body.put_slice(r.decision.payload().as_bytes());
        }
        ServerFrame::Error(e) => {
            put_header(&mut body, OP_ERROR, e.seq);
            body.put_u8(e.kind.code());
            body.put_slice(e.message.as_bytes());
        }
    }
    put_frame(dst, &body);
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::protocol::frame::split_frame;

    fn body_of(dst: &mut BytesMut) -> Bytes {
        split_frame(dst, 1024).unwrap().unwrap()
    }

    #[test]
    fn request_keeps_seq_and_key() {
        let mut buf = BytesMut::new();
        encode_request(&LookupFrame { seq: Some(7), key: "example.com".into() }, &mut buf);
        let req = decode_request(body_of(&mut buf)).unwrap();
        assert_eq!(req.seq, Some(7));
        assert_eq!(req.key, "example.com");
    }

    #[test]
    fn redirect_result_carries_destination() {
        let mut buf = BytesMut::new();
        let frame = ServerFrame::Result(ResultFrame {
            seq: None,
            found: true,
            source: Source::Store,
            decision: Decision::Redirect("nytimes.com.".into()),
        });
        encode_response(&frame, &mut buf);
        assert_eq!(decode_response(body_of(&mut buf)).unwrap(), frame);
    }

    #[test]
    fn response_opcode_is_not_a_request() {
        let mut buf = BytesMut::new();
        encode_response(
            &ServerFrame::Error(ErrorFrame {
                seq: None,
                kind: ErrorKind::Protocol,
                message: "bad".into(),
            }),
            &mut buf,
        );
        let err = decode_request(body_of(&mut buf)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Protocol);
    }
}
