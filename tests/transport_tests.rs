//! Tests for the transport boundary adapter: request body in, wire response
//! value out, with outcomes order-correlated by batch index.

use serde_json::{json, Value};
use tagrpc::handlers::user::{user_router, UserStore};
use tagrpc::transport::handle_batch;
use tagrpc::{Dispatcher, Exit, ParseError, RuntimeConfig};

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

fn dispatcher(store: &UserStore) -> Dispatcher {
    Dispatcher::with_config(
        user_router(store).expect("build router"),
        RuntimeConfig::default(),
    )
}

#[test]
fn test_single_entry_batch_collapses_to_the_sole_outcome() {
    let _tracing = TestTracing::init();
    let store = UserStore::seeded();
    let body = serde_json::to_vec(&json!([envelope(json!({"_tag": "UserList"}))]))
        .expect("serialize body");

    let response = handle_batch(&dispatcher(&store), &body).expect("batch handled");
    assert_eq!(
        response,
        json!({
            "_tag": "Success",
            "value": [
                {"id": "1", "name": "Alice"},
                {"id": "2", "name": "Bob"}
            ]
        })
    );
}

#[test]
fn test_multi_entry_batch_is_order_correlated_by_index() {
    let _tracing = TestTracing::init();
    let store = UserStore::seeded();
    let body = serde_json::to_vec(&json!([
        envelope(json!({"_tag": "UserById", "id": "99"})),
        envelope(json!({"_tag": "UserById", "id": "2"})),
    ]))
    .expect("serialize body");

    let response = handle_batch(&dispatcher(&store), &body).expect("batch handled");
    assert_eq!(
        response,
        json!([
            {"_tag": "Failure", "cause": {"_tag": "Fail", "error": "User not found: 99"}},
            {"_tag": "Success", "value": {"id": "2", "name": "Bob"}}
        ])
    );
}

#[test]
fn test_stream_entry_contributes_a_concatenated_exit_array() {
    let _tracing = TestTracing::init();
    let store = UserStore::seeded();
    let body = serde_json::to_vec(&json!([
        envelope(json!({"_tag": "UserWatch"})),
        envelope(json!({"_tag": "UserById", "id": "1"})),
    ]))
    .expect("serialize body");

    let response = handle_batch(&dispatcher(&store), &body).expect("batch handled");
    let slots = response.as_array().expect("array response");
    assert_eq!(slots.len(), 2);

    let exits: Vec<Exit> =
        serde_json::from_value(slots[0].clone()).expect("stream slot decodes as exits");
    assert_eq!(exits.len(), 3);
    assert!(exits[0].is_success());
    assert!(exits[1].is_success());
    assert!(exits[2].is_stream_end());

    assert_eq!(
        slots[1],
        json!({"_tag": "Success", "value": {"id": "1", "name": "Alice"}})
    );
}

#[test]
fn test_malformed_body_is_rejected_wholesale() {
    let _tracing = TestTracing::init();
    let store = UserStore::seeded();
    let result = handle_batch(&dispatcher(&store), b"not json at all");
    assert!(matches!(result, Err(ParseError::Malformed(_))));
}

#[test]
fn test_decode_error_reaches_the_transport_caller() {
    let _tracing = TestTracing::init();
    let store = UserStore::seeded();
    let body = serde_json::to_vec(&json!([envelope(json!({"_tag": "Bogus"}))]))
        .expect("serialize body");
    let result = handle_batch(&dispatcher(&store), &body);
    assert!(matches!(
        result,
        Err(ParseError::UnknownTag { index: 0, .. })
    ));
}

#[test]
fn test_response_round_trips_through_the_exit_schema() {
    let _tracing = TestTracing::init();
    let store = UserStore::seeded();
    let body = serde_json::to_vec(&json!([envelope(json!({"_tag": "UserById", "id": "1"}))]))
        .expect("serialize body");

    let response = handle_batch(&dispatcher(&store), &body).expect("batch handled");
    let exit: Exit = serde_json::from_value(response).expect("decodes as an exit");
    let user: Result<tagrpc::handlers::user::User, String> =
        exit.into_result().expect("declared outcome");
    assert_eq!(user.expect("lookup succeeds").name, "Alice");
}
