//! Lookup request vector tests.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use bytes::Bytes;

use sentry_core::protocol::decode_request;

use vector_loader::load;

#[test]
fn request_vectors() {
    let files = [
        "lookup_min.json",
        "lookup_seq.json",
        "lookup_bad_version.json",
        "lookup_seq_missing_u32.json",
        "lookup_too_short.json",
        "lookup_empty_key.json",
        "lookup_bad_utf8.json",
        "lookup_wrong_op.json",
    ];

    for f in files {
        let v = load(f);
        let res = decode_request(Bytes::from(v.frame.decode()));

        if let Some(err) = v.expect_error {
            let e = res.expect_err("expected error");
            assert_eq!(e.kind().as_str(), err.code, "vector={}", v.description);
            continue;
        }

        let frame = res.expect("expected ok frame");
        let ex = v.expect.expect("missing expect block");

        assert_eq!(frame.key, ex["key"].as_str().unwrap(), "vector={}", v.description);
        if ex["seq"].is_null() {
            assert!(frame.seq.is_none(), "vector={}", v.description);
        } else {
            assert_eq!(frame.seq.unwrap() as u64, ex["seq"].as_u64().unwrap(), "vector={}", v.description);
        }
    }
}
