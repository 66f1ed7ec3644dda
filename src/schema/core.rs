use crate::router::{PreparedCall, Router};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use smallvec::SmallVec;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Maximum inline transport headers before heap allocation.
/// Most envelopes carry only a handful of forwarded headers.
pub const MAX_INLINE_HEADERS: usize = 16;

/// Stack-allocated header storage for the decode hot path.
///
/// Header names use `Arc<str>` so repeated names (content-type,
/// authorization) clone with an atomic increment instead of a string copy.
pub type HeaderVec = SmallVec<[(Arc<str>, String); MAX_INLINE_HEADERS]>;

/// Raw request envelope as received from the transport layer.
///
/// The `request` object holds the `_tag` discriminator alongside the payload
/// fields; the remaining fields are observability metadata originating from
/// the client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    pub request: Value,
    pub trace_id: String,
    pub span_id: String,
    pub sampled: bool,
    #[serde(default)]
    pub headers: serde_json::Map<String, Value>,
}

/// Structured reason a batch was rejected during decode.
///
/// Every variant except [`ParseError::NotABatch`] and
/// [`ParseError::Malformed`] names the offending entry index; the whole
/// batch is rejected either way and no handler executes.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("malformed batch body: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("batch must be a JSON array of request envelopes")]
    NotABatch,
    #[error("entry {index}: malformed envelope: {source}")]
    MalformedEnvelope {
        index: usize,
        source: serde_json::Error,
    },
    #[error("entry {index}: request is missing a `_tag` discriminator")]
    MissingTag { index: usize },
    #[error("entry {index}: unrecognized request tag `{tag}`")]
    UnknownTag { index: usize, tag: String },
    #[error("entry {index}: invalid `{tag}` payload: {source}")]
    InvalidPayload {
        index: usize,
        tag: String,
        source: serde_json::Error,
    },
}

/// Request-scoped context handed to handlers alongside the decoded payload.
///
/// Carries the originating trace identifiers and transport headers so
/// observability continuity with the client survives the dispatch fan-out.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Position of this entry within the submitted batch.
    pub index: usize,
    /// Request tag resolved during decode.
    pub tag: Arc<str>,
    /// Trace id propagated from the client.
    pub trace_id: String,
    /// Span id propagated from the client.
    pub span_id: String,
    /// Client-side sampling decision.
    pub sampled: bool,
    /// Transport headers forwarded with the envelope.
    pub headers: HeaderVec,
}

impl RequestContext {
    /// Get a transport header by name (case-insensitive per RFC 7230).
    #[inline]
    #[must_use]
    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// A decoded batch entry: context plus the prepared handler call.
///
/// Created during decode, consumed exactly once by the dispatch engine, and
/// discarded after its result(s) have been pushed.
pub struct BatchEntry {
    pub ctx: RequestContext,
    pub call: PreparedCall,
}

/// Decode a raw batch against the router's registered request shapes.
///
/// Returns one [`BatchEntry`] per envelope, pairing the typed prepared call
/// with its request context. Indices are assigned by position, so they are
/// unique by construction.
///
/// # Errors
///
/// Fails for the whole batch if any entry is malformed, carries an unknown
/// tag, or fails payload validation. No handler is invoked on failure.
pub fn decode_batch(router: &Router, raw: &Value) -> Result<Vec<BatchEntry>, ParseError> {
    let items = raw.as_array().ok_or(ParseError::NotABatch)?;
    let mut entries = Vec::with_capacity(items.len());

    for (index, item) in items.iter().enumerate() {
        let envelope: Envelope = serde_json::from_value(item.clone())
            .map_err(|source| ParseError::MalformedEnvelope { index, source })?;
        let tag = envelope
            .request
            .get("_tag")
            .and_then(Value::as_str)
            .ok_or(ParseError::MissingTag { index })?;
        let descriptor = router
            .descriptor(tag)
            .ok_or_else(|| ParseError::UnknownTag {
                index,
                tag: tag.to_string(),
            })?;

        let call = descriptor.prepare(&envelope.request, index)?;

        entries.push(BatchEntry {
            ctx: RequestContext {
                index,
                tag: descriptor.tag_arc(),
                trace_id: envelope.trace_id,
                span_id: envelope.span_id,
                sampled: envelope.sampled,
                headers: header_vec(&envelope.headers),
            },
            call,
        });
    }

    debug!(entries = entries.len(), "Batch decoded");
    Ok(entries)
}

fn header_vec(map: &serde_json::Map<String, Value>) -> HeaderVec {
    map.iter()
        .map(|(name, value)| {
            let value = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            (Arc::from(name.as_str()), value)
        })
        .collect()
}
