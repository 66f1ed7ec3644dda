//! Tests for stream handler dispatch: per-element chunks, the terminal
//! stream-end chunk, failure causes as chunks, and isolation from sibling
//! entries.

use serde_json::{json, Value};
use tagrpc::handlers::user::{user_router, User, UserStore};
use tagrpc::router::{StreamRpc, StreamSink};
use tagrpc::schema::RequestContext;
use tagrpc::{
    Chunk, Dispatcher, Exit, HandlerDescriptor, Outcome, Router, RuntimeConfig,
};

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

fn chunks_for(results: &[tagrpc::IndexedResult], index: usize) -> Vec<Chunk> {
    results
        .iter()
        .filter(|r| r.index == index)
        .map(|r| r.outcome.as_chunk().expect("stream outcome").clone())
        .collect()
}

#[test]
fn test_stream_emits_one_chunk_per_element_then_stream_end() {
    let _tracing = TestTracing::init();
    let store = UserStore::seeded();
    let dispatcher = Dispatcher::with_config(
        user_router(&store).expect("build router"),
        RuntimeConfig::default(),
    );

    let raw = json!([envelope(json!({"_tag": "UserWatch"}))]);
    let results = dispatcher.dispatch(&raw).expect("batch decodes").collect_all();

    // two elements plus the terminal chunk, in element order
    let chunks = chunks_for(&results, 0);
    assert_eq!(chunks.len(), 3);

    let names: Vec<String> = chunks[..2]
        .iter()
        .map(|chunk| {
            assert_eq!(chunk.len(), 1);
            let user: Result<User, String> =
                chunk[0].clone().into_result().expect("declared outcome");
            user.expect("stream element").name
        })
        .collect();
    assert_eq!(names, vec!["Alice", "Bob"]);

    assert_eq!(chunks[2].len(), 1);
    assert!(chunks[2][0].is_stream_end());
}

struct Flaky {
    store: UserStore,
}

impl StreamRpc for Flaky {
    const TAG: &'static str = "Flaky";
    type Payload = Value;
    type Success = User;
    type Error = String;

    fn stream(
        &self,
        _payload: Value,
        _ctx: &RequestContext,
        sink: &mut StreamSink<'_, User>,
    ) -> Result<(), String> {
        let mut users = self.store.find_many().into_iter();
        if let Some(first) = users.next() {
            sink.push(first);
        }
        Err("stream source went away".to_string())
    }
}

#[test]
fn test_stream_failure_is_encoded_as_a_chunk_and_contained() {
    let _tracing = TestTracing::init();
    let store = UserStore::seeded();
    let router = user_router(&store)
        .expect("build router")
        .merge(
            Router::make([HandlerDescriptor::stream(Flaky {
                store: store.clone(),
            })])
            .expect("build flaky router"),
        )
        .expect("merge routers");
    let dispatcher = Dispatcher::with_config(router, RuntimeConfig::default());

    let raw = json!([
        envelope(json!({"_tag": "Flaky"})),
        envelope(json!({"_tag": "UserList"})),
    ]);
    let results = dispatcher.dispatch(&raw).expect("batch decodes").collect_all();

    // one element chunk, then the failure cause as the final chunk; no
    // stream-end marker after a failure
    let chunks = chunks_for(&results, 0);
    assert_eq!(chunks.len(), 2);
    let element: Result<User, String> =
        chunks[0][0].clone().into_result().expect("declared outcome");
    assert_eq!(element.expect("first element").name, "Alice");
    let failure: Result<User, String> =
        chunks[1][0].clone().into_result().expect("declared outcome");
    assert_eq!(failure, Err("stream source went away".to_string()));

    // the sibling effect entry is unaffected
    let sibling = results
        .iter()
        .find(|r| r.index == 1)
        .expect("sibling result");
    assert!(matches!(
        sibling.outcome.as_exit(),
        Some(Exit::Success { .. })
    ));
}

#[test]
fn test_mixed_batch_keeps_effect_and_stream_outcomes_apart() {
    let _tracing = TestTracing::init();
    let store = UserStore::seeded();
    let dispatcher = Dispatcher::with_config(
        user_router(&store).expect("build router"),
        RuntimeConfig::default(),
    );

    let raw = json!([
        envelope(json!({"_tag": "UserList"})),
        envelope(json!({"_tag": "UserWatch"})),
    ]);
    let results = dispatcher.dispatch(&raw).expect("batch decodes").collect_all();

    let effect: Vec<_> = results.iter().filter(|r| r.index == 0).collect();
    assert_eq!(effect.len(), 1);
    assert!(matches!(effect[0].outcome, Outcome::Exit(_)));

    let stream: Vec<_> = results.iter().filter(|r| r.index == 1).collect();
    assert_eq!(stream.len(), 3);
    assert!(stream
        .iter()
        .all(|r| matches!(r.outcome, Outcome::Chunk(_))));
}
