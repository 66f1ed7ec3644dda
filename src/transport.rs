//! # Transport Adapter Module
//!
//! Glue between the hosting HTTP layer and the dispatch engine: raw JSON
//! request body in, wire-safe JSON response value out. The HTTP server
//! itself (routing, status codes, auth) lives upstream and is not part of
//! this crate.
//!
//! ## Response Shape
//!
//! Outcomes are reassembled by batch index: a multi-entry batch yields a
//! JSON array with one encoded outcome per entry, order-correlated by index.
//! A one-element batch collapses to the sole outcome object, matching the
//! reference integration path which extracts the single entry directly.
//! Stream entries contribute one array of exits, concatenated from their
//! chunks in arrival order.

use crate::dispatcher::{Dispatcher, Outcome};
use crate::exit::Exit;
use crate::schema::ParseError;
use serde_json::Value;
use tracing::debug;

/// Handle one raw batch request body end to end.
///
/// Parses the body, dispatches the batch, drains the result channel, and
/// reassembles the encoded outcomes into the transport response value.
///
/// # Errors
///
/// Returns the whole-batch [`ParseError`] if the body is not valid JSON or
/// the batch fails decoding; the hosting layer is expected to map that to a
/// client error. Handler-level failures are never errors here - they arrive
/// encoded inside the response value.
pub fn handle_batch(dispatcher: &Dispatcher, body: &[u8]) -> Result<Value, ParseError> {
    let raw: Value = serde_json::from_slice(body)?;
    let batch_len = raw.as_array().map(Vec::len).unwrap_or_default();
    let receiver = dispatcher.dispatch(&raw)?;

    let mut slots: Vec<Option<Value>> = (0..batch_len).map(|_| None).collect();
    let mut received = 0usize;
    for result in receiver {
        received += 1;
        let slot = &mut slots[result.index];
        match result.outcome {
            Outcome::Exit(exit) => {
                *slot = Some(encoded(&exit));
            }
            Outcome::Chunk(chunk) => {
                // Stream chunks for one index concatenate in arrival order
                // into a single array of exits.
                let entry = slot.get_or_insert_with(|| Value::Array(Vec::new()));
                if let Value::Array(exits) = entry {
                    exits.extend(chunk.iter().map(encoded));
                }
            }
        }
    }
    debug!(batch_len, received, "Batch response assembled");

    let mut outcomes: Vec<Value> = slots
        .into_iter()
        .map(|slot| slot.unwrap_or(Value::Null))
        .collect();

    if outcomes.len() == 1 {
        // Sole-entry batches return the outcome object itself.
        Ok(outcomes.remove(0))
    } else {
        Ok(Value::Array(outcomes))
    }
}

fn encoded(exit: &Exit) -> Value {
    // Exits are plain data; serialization cannot fail for well-formed
    // variants, but the defect path stays total anyway.
    serde_json::to_value(exit).unwrap_or(Value::Null)
}
