use crate::exit::{Chunk, Exit};
use crate::ids::BatchId;
use crate::router::{HandlerKind, PreparedCall, Router};
use crate::runtime_config::RuntimeConfig;
use crate::schema::{decode_batch, BatchEntry, ParseError};
use may::coroutine;
use may::sync::mpsc;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, error, info, info_span, warn};

/// Encoded outcome of one handler invocation step.
///
/// Effect entries produce exactly one `Exit`; stream entries produce a run
/// of `Chunk`s closed by the terminal stream-end chunk. On the wire an exit
/// is a tagged object and a chunk is an array of exits, so the untagged
/// union is unambiguous.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Outcome {
    Exit(Exit),
    Chunk(Chunk),
}

impl Outcome {
    #[must_use]
    pub fn as_exit(&self) -> Option<&Exit> {
        match self {
            Outcome::Exit(exit) => Some(exit),
            Outcome::Chunk(_) => None,
        }
    }

    #[must_use]
    pub fn as_chunk(&self) -> Option<&Chunk> {
        match self {
            Outcome::Chunk(chunk) => Some(chunk),
            Outcome::Exit(_) => None,
        }
    }
}

/// An encoded outcome tagged with its originating batch index.
///
/// Indices are assigned by position during decode and never reused; every
/// batch entry produces at least one indexed result before the batch
/// terminates. Serializes as the two-element array `[index, outcome]`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(from = "(usize, Outcome)")]
pub struct IndexedResult {
    pub index: usize,
    pub outcome: Outcome,
}

impl From<(usize, Outcome)> for IndexedResult {
    fn from((index, outcome): (usize, Outcome)) -> Self {
        IndexedResult { index, outcome }
    }
}

impl Serialize for IndexedResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        (self.index, &self.outcome).serialize(serializer)
    }
}

/// Internal channel item. `End` is the batch-level end marker: emitted
/// exactly once, after all entry tasks have joined, and never delivered to
/// the caller.
enum BatchItem {
    Result(IndexedResult),
    End,
}

/// Consumer side of a batch's result channel.
///
/// Yields indexed results in arrival order (not submission order) until the
/// end marker is observed; the marker itself is stripped. Once exhausted,
/// further calls return `None`.
pub struct BatchReceiver {
    rx: mpsc::Receiver<BatchItem>,
    done: bool,
}

impl BatchReceiver {
    /// Block until the next result arrives, or until the batch terminates.
    pub fn recv(&mut self) -> Option<IndexedResult> {
        if self.done {
            return None;
        }
        match self.rx.recv() {
            Ok(BatchItem::Result(result)) => Some(result),
            Ok(BatchItem::End) | Err(_) => {
                self.done = true;
                None
            }
        }
    }

    /// Drain the channel into a vector. The reference integration path
    /// collects everything and, for single-request batches, extracts the
    /// sole entry directly.
    #[must_use]
    pub fn collect_all(mut self) -> Vec<IndexedResult> {
        let mut results = Vec::new();
        while let Some(result) = self.recv() {
            results.push(result);
        }
        results
    }
}

impl Iterator for BatchReceiver {
    type Item = IndexedResult;

    fn next(&mut self) -> Option<IndexedResult> {
        self.recv()
    }
}

/// Executes decoded batches against an immutable router.
///
/// Owns the lifetime of each per-batch result channel: the channel is
/// created at batch start and closed via the end marker once all entry
/// tasks finish, regardless of their individual outcomes.
#[derive(Clone)]
pub struct Dispatcher {
    router: Arc<Router>,
    config: RuntimeConfig,
}

impl Dispatcher {
    /// Create a dispatcher with configuration loaded from the environment.
    #[must_use]
    pub fn new(router: Router) -> Self {
        Self::with_config(router, RuntimeConfig::from_env())
    }

    #[must_use]
    pub fn with_config(router: Router, config: RuntimeConfig) -> Self {
        Dispatcher {
            router: Arc::new(router),
            config,
        }
    }

    #[must_use]
    pub fn router(&self) -> &Router {
        &self.router
    }

    /// Decode and execute one batch, returning the live result channel.
    ///
    /// Returns as soon as the fan-out is launched; results stream through
    /// the receiver as handlers produce them.
    ///
    /// # Errors
    ///
    /// Fails with a [`ParseError`] if the batch cannot be decoded as a
    /// whole; no handler runs in that case.
    pub fn dispatch(&self, raw: &Value) -> Result<BatchReceiver, ParseError> {
        let batch_id = BatchId::new();
        let entries = match decode_batch(&self.router, raw) {
            Ok(entries) => entries,
            Err(err) => {
                warn!(batch_id = %batch_id, error = %err, "Batch rejected during decode");
                return Err(err);
            }
        };
        info!(
            batch_id = %batch_id,
            entries = entries.len(),
            workers = self.config.dispatch_workers,
            "Batch dispatched"
        );
        Ok(self.run(batch_id, entries))
    }

    fn run(&self, batch_id: BatchId, entries: Vec<BatchEntry>) -> BatchReceiver {
        let (tx, rx) = mpsc::channel::<BatchItem>();
        let stack_size = self.config.stack_size;
        let workers = self.config.dispatch_workers;

        // The supervisor joins the whole fan-out before emitting the end
        // marker. Channel sends from entry coroutines happen-before their
        // join, so the marker is always the last item observed.
        //
        // SAFETY: may::coroutine::Builder::spawn() is unsafe per the may
        // runtime. The closure is Send + 'static and owns everything it
        // touches; entry failures are reported over the channel, never by
        // unwinding out of the coroutine.
        let spawned = unsafe {
            coroutine::Builder::new()
                .stack_size(stack_size)
                .spawn(move || {
                    if workers == 0 {
                        fan_out_unbounded(batch_id, entries, &tx, stack_size);
                    } else {
                        fan_out_bounded(batch_id, entries, &tx, stack_size, workers);
                    }
                    debug!(batch_id = %batch_id, "End marker emitted");
                    let _ = tx.send(BatchItem::End);
                })
        };

        if let Err(err) = spawned {
            // The channel senders died with the failed spawn; the receiver
            // observes a closed channel and terminates empty.
            error!(
                batch_id = %batch_id,
                error = %err,
                "Failed to spawn batch supervisor coroutine - CRITICAL"
            );
        }

        BatchReceiver { rx, done: false }
    }
}

impl Router {
    /// Expose this router as a single invocation entry point for transport
    /// adapters: raw batch in, live result channel out.
    #[must_use]
    pub fn to_handler(
        self,
        config: RuntimeConfig,
    ) -> impl Fn(&Value) -> Result<BatchReceiver, ParseError> {
        let dispatcher = Dispatcher::with_config(self, config);
        move |raw| dispatcher.dispatch(raw)
    }
}

/// Reference fan-out: one coroutine per entry, no caller-imposed limit.
fn fan_out_unbounded(
    batch_id: BatchId,
    entries: Vec<BatchEntry>,
    tx: &mpsc::Sender<BatchItem>,
    stack_size: usize,
) {
    let mut handles = Vec::with_capacity(entries.len());
    for entry in entries {
        let index = entry.ctx.index;
        let kind = entry.call.kind();
        let entry_tx = tx.clone();
        // SAFETY: as above; the entry coroutine owns its BatchEntry and a
        // cloned channel sender, both Send + 'static.
        let spawned = unsafe {
            coroutine::Builder::new()
                .stack_size(stack_size)
                .spawn(move || run_entry(batch_id, entry, &entry_tx))
        };
        match spawned {
            Ok(handle) => handles.push(handle),
            Err(err) => {
                error!(
                    batch_id = %batch_id,
                    index,
                    error = %err,
                    "Failed to spawn entry coroutine - reporting defect for entry"
                );
                let _ = tx.send(BatchItem::Result(spawn_defect(index, kind, &err)));
            }
        }
    }
    for handle in handles {
        let _ = handle.join();
    }
}

/// Capped fan-out: entries partitioned round-robin across a fixed number of
/// worker coroutines, bounding resource usage under large batches.
fn fan_out_bounded(
    batch_id: BatchId,
    entries: Vec<BatchEntry>,
    tx: &mpsc::Sender<BatchItem>,
    stack_size: usize,
    workers: usize,
) {
    if entries.is_empty() {
        return;
    }
    let worker_count = workers.min(entries.len());
    let mut queues: Vec<Vec<BatchEntry>> = (0..worker_count).map(|_| Vec::new()).collect();
    for (i, entry) in entries.into_iter().enumerate() {
        queues[i % worker_count].push(entry);
    }

    let mut handles = Vec::with_capacity(worker_count);
    for queue in queues {
        let worker_tx = tx.clone();
        // SAFETY: as above.
        let spawned = unsafe {
            coroutine::Builder::new()
                .stack_size(stack_size)
                .spawn(move || {
                    for entry in queue {
                        run_entry(batch_id, entry, &worker_tx);
                    }
                })
        };
        match spawned {
            Ok(handle) => handles.push(handle),
            Err(err) => {
                error!(
                    batch_id = %batch_id,
                    error = %err,
                    "Failed to spawn dispatch worker coroutine - CRITICAL"
                );
            }
        }
    }
    for handle in handles {
        let _ = handle.join();
    }
}

/// Execute one batch entry and push its result(s).
///
/// Runs inside a tracing span labeled with the request tag and the
/// originating trace/span identifiers, so handler-side logs stay correlated
/// with the client. Panics are caught and encoded as defect outcomes; an
/// entry can never take down a sibling.
fn run_entry(batch_id: BatchId, entry: BatchEntry, tx: &mpsc::Sender<BatchItem>) {
    let BatchEntry { ctx, call } = entry;
    let span = info_span!(
        "rpc.dispatch",
        batch_id = %batch_id,
        tag = %ctx.tag,
        index = ctx.index,
        trace_id = %ctx.trace_id,
        span_id = %ctx.span_id,
        sampled = ctx.sampled,
    );
    let _guard = span.enter();
    let index = ctx.index;

    match call {
        PreparedCall::Effect(invoke) => {
            debug!("Effect handler invocation start");
            let exit = match catch_unwind(AssertUnwindSafe(|| invoke(&ctx))) {
                Ok(exit) => exit,
                Err(panic) => {
                    let message = panic_message(&*panic);
                    error!(panic = %message, "Handler panicked - encoding defect");
                    Exit::die(Value::String(message))
                }
            };
            let success = exit.is_success();
            let _ = tx.send(BatchItem::Result(IndexedResult {
                index,
                outcome: Outcome::Exit(exit),
            }));
            info!(success, "Effect handler invocation complete");
        }
        PreparedCall::Stream(drive) => {
            debug!("Stream handler invocation start");
            let mut pushed = 0usize;
            let result = {
                let mut push = |chunk: Chunk| {
                    pushed += 1;
                    let _ = tx.send(BatchItem::Result(IndexedResult {
                        index,
                        outcome: Outcome::Chunk(chunk),
                    }));
                };
                catch_unwind(AssertUnwindSafe(|| drive(&ctx, &mut push)))
            };
            if let Err(panic) = result {
                let message = panic_message(&*panic);
                error!(panic = %message, "Stream handler panicked - encoding defect chunk");
                pushed += 1;
                let _ = tx.send(BatchItem::Result(IndexedResult {
                    index,
                    outcome: Outcome::Chunk(vec![Exit::die(Value::String(message))]),
                }));
            }
            info!(chunks = pushed, "Stream handler invocation complete");
        }
    }
}

fn spawn_defect(index: usize, kind: HandlerKind, err: &std::io::Error) -> IndexedResult {
    let exit = Exit::die(Value::String(format!("failed to spawn dispatch task: {err}")));
    let outcome = match kind {
        HandlerKind::Effect => Outcome::Exit(exit),
        HandlerKind::Stream => Outcome::Chunk(vec![exit]),
    };
    IndexedResult { index, outcome }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "handler panicked".to_string()
    }
}
