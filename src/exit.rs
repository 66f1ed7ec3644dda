//! # Exit Encoding Module
//!
//! Wire encoding for per-request outcomes. Every handler invocation ends in
//! an [`Exit`]: either a success value or a failure [`Cause`]. Stream
//! handlers produce a sequence of exits wrapped in [`Chunk`]s, closed by a
//! terminal empty-cause chunk.
//!
//! ## Wire Shape
//!
//! Exits are tagged JSON objects:
//!
//! ```text
//! {"_tag": "Success", "value": ...}
//! {"_tag": "Failure", "cause": {"_tag": "Fail", "error": ...}}
//! {"_tag": "Failure", "cause": {"_tag": "Die", "defect": ...}}
//! {"_tag": "Failure", "cause": {"_tag": "Empty"}}
//! ```
//!
//! `Fail` carries a declared, typed handler error. `Die` carries a defect:
//! an outcome that failed its own schema, or a panicking handler. `Empty`
//! never surfaces from an effect handler; a one-element chunk holding the
//! empty-cause exit marks the end of a stream handler's element sequence.
//!
//! Encoding is schema-driven through `Serialize` and symmetric with batch
//! decoding: `decode(encode(x)) == x` for every well-formed value.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::error;

/// Failure cause carried by a failed [`Exit`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "_tag")]
pub enum Cause {
    /// No cause at all. Reserved for the stream-end sentinel chunk.
    Empty,
    /// A declared error surfaced by the handler, encoded with the tag's
    /// error schema.
    Fail { error: Value },
    /// A programming defect: panic, or an outcome that did not match its
    /// declared schema.
    Die { defect: Value },
}

/// Terminal outcome of a single handler invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "_tag")]
pub enum Exit {
    Success { value: Value },
    Failure { cause: Cause },
}

/// One encoded stream emission: a run of exits pushed together. Effect
/// handlers never produce chunks; stream handlers push one-element chunks
/// per element and a final [`Exit::stream_end`] chunk.
pub type Chunk = Vec<Exit>;

impl Exit {
    #[must_use]
    pub fn succeed(value: Value) -> Self {
        Exit::Success { value }
    }

    #[must_use]
    pub fn fail(error: Value) -> Self {
        Exit::Failure {
            cause: Cause::Fail { error },
        }
    }

    #[must_use]
    pub fn die(defect: Value) -> Self {
        Exit::Failure {
            cause: Cause::Die { defect },
        }
    }

    /// The empty-cause exit closing a stream's element sequence. Internal to
    /// one request's stream, distinct from the batch-level end marker.
    #[must_use]
    pub fn stream_end() -> Self {
        Exit::Failure {
            cause: Cause::Empty,
        }
    }

    #[must_use]
    pub fn is_stream_end(&self) -> bool {
        matches!(
            self,
            Exit::Failure {
                cause: Cause::Empty
            }
        )
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Exit::Success { .. })
    }

    /// Decode this exit back into the typed result it was encoded from.
    ///
    /// Symmetric with [`encode_success`]/[`encode_failure`]: for every
    /// well-formed `x`, `Exit::into_result(encode(x)) == Ok(x)`.
    ///
    /// # Errors
    ///
    /// Returns an error if the value does not match the requested schema, or
    /// if the exit carries a defect or empty cause (neither belongs to a
    /// declared success/error pair).
    pub fn into_result<T, E>(self) -> Result<Result<T, E>, serde_json::Error>
    where
        T: DeserializeOwned,
        E: DeserializeOwned,
    {
        match self {
            Exit::Success { value } => serde_json::from_value(value).map(Ok),
            Exit::Failure {
                cause: Cause::Fail { error },
            } => serde_json::from_value(error).map(Err),
            Exit::Failure { cause } => Err(serde::de::Error::custom(format!(
                "exit carries no declared outcome: {cause:?}"
            ))),
        }
    }
}

/// Encode a handler's success value with the tag's success schema.
///
/// A value that fails serialization is a programming defect, not a declared
/// error: it is logged with full cause and downgraded to a `Die` exit so the
/// batch keeps flowing.
pub fn encode_success<T: Serialize>(tag: &str, value: &T) -> Exit {
    match serde_json::to_value(value) {
        Ok(value) => Exit::succeed(value),
        Err(err) => defect(tag, "success", &err),
    }
}

/// Encode a handler's declared error with the tag's error schema.
pub fn encode_failure<E: Serialize>(tag: &str, error: &E) -> Exit {
    match serde_json::to_value(error) {
        Ok(error) => Exit::fail(error),
        Err(err) => defect(tag, "error", &err),
    }
}

fn defect(tag: &str, schema: &str, err: &serde_json::Error) -> Exit {
    error!(
        tag = %tag,
        schema = %schema,
        error = %err,
        "Handler outcome does not match its declared schema - encoding defect"
    );
    Exit::die(Value::String(format!(
        "outcome failed {schema} schema for `{tag}`: {err}"
    )))
}

/// Uninhabited error type for requests whose error schema declares that no
/// failure is expected.
#[derive(Debug, Clone, Copy, Serialize)]
pub enum Never {}
