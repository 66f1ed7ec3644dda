//! Tests for batch envelope decoding: whole-batch semantics, entry
//! attribution in parse errors, and request-context metadata capture.

use serde_json::{json, Value};
use tagrpc::handlers::user::{user_router, UserStore};
use tagrpc::{decode_batch, ParseError, Router};

use tracing_util::TestTracing;

fn envelope(request: Value) -> Value {
    json!({
        "request": request,
        "traceId": "141a0064253a35087384a181e9f098e8",
        "spanId": "061da88e65550525",
        "sampled": true,
        "headers": {}
    })
}

fn router() -> Router {
    user_router(&UserStore::seeded()).expect("build router")
}

#[test]
fn test_decode_captures_request_context() {
    let _tracing = TestTracing::init();
    let raw = json!([{
        "request": {"_tag": "UserById", "id": "1"},
        "traceId": "0af7651916cd43dd8448eb211c80319c",
        "spanId": "b7ad6b7169203331",
        "sampled": false,
        "headers": {"X-Caller": "web", "Accept": "application/json"}
    }]);

    let entries = decode_batch(&router(), &raw).expect("batch decodes");
    assert_eq!(entries.len(), 1);
    let ctx = &entries[0].ctx;
    assert_eq!(ctx.index, 0);
    assert_eq!(ctx.tag.as_ref(), "UserById");
    assert_eq!(ctx.trace_id, "0af7651916cd43dd8448eb211c80319c");
    assert_eq!(ctx.span_id, "b7ad6b7169203331");
    assert!(!ctx.sampled);
    // header lookup is case-insensitive
    assert_eq!(ctx.get_header("x-caller"), Some("web"));
    assert_eq!(ctx.get_header("ACCEPT"), Some("application/json"));
    assert_eq!(ctx.get_header("missing"), None);
}

#[test]
fn test_decode_accepts_missing_headers_field() {
    let _tracing = TestTracing::init();
    let raw = json!([{
        "request": {"_tag": "UserList"},
        "traceId": "t",
        "spanId": "s",
        "sampled": true
    }]);
    let entries = decode_batch(&router(), &raw).expect("headers default to empty");
    assert!(entries[0].ctx.headers.is_empty());
}

#[test]
fn test_non_array_batch_is_rejected() {
    let _tracing = TestTracing::init();
    let raw = envelope(json!({"_tag": "UserList"}));
    assert!(matches!(
        decode_batch(&router(), &raw),
        Err(ParseError::NotABatch)
    ));
}

#[test]
fn test_missing_tag_names_the_entry() {
    let _tracing = TestTracing::init();
    let raw = json!([
        envelope(json!({"_tag": "UserList"})),
        envelope(json!({"id": "1"})),
    ]);
    assert!(matches!(
        decode_batch(&router(), &raw),
        Err(ParseError::MissingTag { index: 1 })
    ));
}

#[test]
fn test_unknown_tag_rejects_whole_batch() {
    let _tracing = TestTracing::init();
    let raw = json!([
        envelope(json!({"_tag": "UserList"})),
        envelope(json!({"_tag": "UserDelete", "id": "1"})),
    ]);
    match decode_batch(&router(), &raw) {
        Err(ParseError::UnknownTag { index, tag }) => {
            assert_eq!(index, 1);
            assert_eq!(tag, "UserDelete");
        }
        Err(other) => panic!("expected UnknownTag, got {other:?}"),
        Ok(_) => panic!("expected UnknownTag, got a decoded batch"),
    }
}

#[test]
fn test_invalid_payload_rejects_whole_batch() {
    let _tracing = TestTracing::init();
    let raw = json!([envelope(json!({"_tag": "UserCreate"}))]);
    match decode_batch(&router(), &raw) {
        Err(ParseError::InvalidPayload { index, tag, .. }) => {
            assert_eq!(index, 0);
            assert_eq!(tag, "UserCreate");
        }
        Err(other) => panic!("expected InvalidPayload, got {other:?}"),
        Ok(_) => panic!("expected InvalidPayload, got a decoded batch"),
    }
}

#[test]
fn test_malformed_envelope_names_the_entry() {
    let _tracing = TestTracing::init();
    let raw = json!([
        envelope(json!({"_tag": "UserList"})),
        {"request": {"_tag": "UserList"}, "spanId": "s", "sampled": true}
    ]);
    assert!(matches!(
        decode_batch(&router(), &raw),
        Err(ParseError::MalformedEnvelope { index: 1, .. })
    ));
}
