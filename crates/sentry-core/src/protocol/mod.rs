//! Sentry wire protocol.
//!
//! - `frame`: little-endian `u32` length prefix, so requests can be pipelined
//!   over one persistent connection.
//! - `lookup`: request/result/error bodies carried inside a frame.
//!
//! All parsers are panic-free: malformed input surfaces as `SentryError`
//! instead of panicking or indexing raw buffers, so one hostile client can only
//! ever take down its own session.

pub mod frame;
pub mod lookup;

pub use frame::{put_frame, split_frame, LEN_PREFIX};
pub use lookup::{
    decode_request, decode_response, encode_request, encode_response, Decision, ErrorFrame,
    LookupFrame, ResultFrame, ServerFrame, Source,
};
