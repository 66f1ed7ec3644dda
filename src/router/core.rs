use crate::exit::{encode_failure, encode_success, Chunk, Exit};
use crate::schema::{ParseError, RequestContext};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

/// A one-shot effectful handler: one request, one terminal outcome.
///
/// `TAG` is the wire discriminator; it must be unique within a router.
/// Payload, success, and error shapes are fixed per tag and known at both
/// decode and encode time through the associated types.
pub trait EffectRpc: Send + Sync + 'static {
    const TAG: &'static str;
    type Payload: DeserializeOwned + Send + 'static;
    type Success: Serialize + Send + 'static;
    type Error: Serialize + Send + 'static;

    /// Handle one decoded request, producing the declared success or error.
    fn call(
        &self,
        payload: Self::Payload,
        ctx: &RequestContext,
    ) -> Result<Self::Success, Self::Error>;
}

/// A streaming handler: one request, an ordered sequence of elements.
///
/// Elements pushed into the sink are delivered to the client incrementally,
/// one chunk per element, not buffered until completion. Returning `Ok(())`
/// ends the stream naturally; returning `Err` encodes the failure cause as
/// the stream's final chunk.
pub trait StreamRpc: Send + Sync + 'static {
    const TAG: &'static str;
    type Payload: DeserializeOwned + Send + 'static;
    type Success: Serialize + Send + 'static;
    type Error: Serialize + Send + 'static;

    fn stream(
        &self,
        payload: Self::Payload,
        ctx: &RequestContext,
        sink: &mut StreamSink<'_, Self::Success>,
    ) -> Result<(), Self::Error>;
}

/// Producer side handed to a [`StreamRpc`] implementation.
///
/// Every pushed element is encoded with the tag's success schema and
/// forwarded to the batch result channel immediately.
pub struct StreamSink<'a, S> {
    emit: &'a mut dyn FnMut(S),
}

impl<S> StreamSink<'_, S> {
    pub fn push(&mut self, item: S) {
        (self.emit)(item);
    }
}

/// Which execution shape a descriptor binds its tag to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerKind {
    Effect,
    Stream,
}

impl fmt::Display for HandlerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandlerKind::Effect => write!(f, "effect"),
            HandlerKind::Stream => write!(f, "stream"),
        }
    }
}

/// A decoded, type-checked handler invocation bound to one batch entry.
///
/// Produced during batch decode, consumed exactly once by the dispatch
/// engine. The payload has already been validated; invoking the call cannot
/// fail with a parse error, only with the handler's own outcome.
pub enum PreparedCall {
    /// Runs the effect handler and returns its encoded exit.
    Effect(Box<dyn FnOnce(&RequestContext) -> Exit + Send>),
    /// Drives the stream handler, pushing encoded chunks as produced and a
    /// terminal chunk at the end.
    Stream(Box<dyn FnOnce(&RequestContext, &mut dyn FnMut(Chunk)) + Send>),
}

impl PreparedCall {
    #[must_use]
    pub fn kind(&self) -> HandlerKind {
        match self {
            PreparedCall::Effect(_) => HandlerKind::Effect,
            PreparedCall::Stream(_) => HandlerKind::Stream,
        }
    }
}

type PrepareFn = dyn Fn(&Value, usize) -> Result<PreparedCall, ParseError> + Send + Sync;

/// Binding from a single request tag to a typed handler.
///
/// Built once per handler at startup; `prepare` decodes an incoming payload
/// with the tag's payload schema and closes over the handler plus the
/// precomputed success/error encoders.
#[derive(Clone)]
pub struct HandlerDescriptor {
    tag: Arc<str>,
    kind: HandlerKind,
    prepare: Arc<PrepareFn>,
}

impl HandlerDescriptor {
    /// Wrap an effect handler into a descriptor for its tag.
    pub fn effect<R: EffectRpc>(rpc: R) -> Self {
        let rpc = Arc::new(rpc);
        let tag: Arc<str> = Arc::from(R::TAG);
        let prepare_tag = Arc::clone(&tag);
        let prepare = move |payload: &Value, index: usize| -> Result<PreparedCall, ParseError> {
            let decoded: R::Payload =
                serde_json::from_value(payload.clone()).map_err(|source| {
                    ParseError::InvalidPayload {
                        index,
                        tag: prepare_tag.to_string(),
                        source,
                    }
                })?;
            let rpc = Arc::clone(&rpc);
            let tag = Arc::clone(&prepare_tag);
            Ok(PreparedCall::Effect(Box::new(
                move |ctx: &RequestContext| match rpc.call(decoded, ctx) {
                    Ok(value) => encode_success(&tag, &value),
                    Err(error) => encode_failure(&tag, &error),
                },
            )))
        };
        Self {
            tag,
            kind: HandlerKind::Effect,
            prepare: Arc::new(prepare),
        }
    }

    /// Wrap a stream handler into a descriptor for its tag.
    pub fn stream<R: StreamRpc>(rpc: R) -> Self {
        let rpc = Arc::new(rpc);
        let tag: Arc<str> = Arc::from(R::TAG);
        let prepare_tag = Arc::clone(&tag);
        let prepare = move |payload: &Value, index: usize| -> Result<PreparedCall, ParseError> {
            let decoded: R::Payload =
                serde_json::from_value(payload.clone()).map_err(|source| {
                    ParseError::InvalidPayload {
                        index,
                        tag: prepare_tag.to_string(),
                        source,
                    }
                })?;
            let rpc = Arc::clone(&rpc);
            let tag = Arc::clone(&prepare_tag);
            Ok(PreparedCall::Stream(Box::new(
                move |ctx: &RequestContext, push: &mut dyn FnMut(Chunk)| {
                    let result = {
                        let mut emit =
                            |item: R::Success| push(vec![encode_success(&tag, &item)]);
                        let mut sink = StreamSink { emit: &mut emit };
                        rpc.stream(decoded, ctx, &mut sink)
                    };
                    match result {
                        Ok(()) => push(vec![Exit::stream_end()]),
                        Err(error) => push(vec![encode_failure(&tag, &error)]),
                    }
                },
            )))
        };
        Self {
            tag,
            kind: HandlerKind::Stream,
            prepare: Arc::new(prepare),
        }
    }

    #[must_use]
    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub(crate) fn tag_arc(&self) -> Arc<str> {
        Arc::clone(&self.tag)
    }

    #[must_use]
    pub fn kind(&self) -> HandlerKind {
        self.kind
    }

    /// Decode an incoming request payload into a prepared call for this tag.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::InvalidPayload`] if the payload does not match
    /// the tag's declared shape.
    pub fn prepare(&self, payload: &Value, index: usize) -> Result<PreparedCall, ParseError> {
        (self.prepare)(payload, index)
    }
}

impl fmt::Debug for HandlerDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerDescriptor")
            .field("tag", &self.tag)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

/// Error raised while composing a router at startup.
#[derive(Debug, Error)]
pub enum RouterError {
    #[error("duplicate handler tag `{0}`")]
    DuplicateTag(String),
}

/// Immutable mapping from request tag to handler descriptor.
///
/// Composed once at startup; exposes lookup by tag for dispatch and
/// iteration over all descriptors for building the decode schema.
#[derive(Clone, Default)]
pub struct Router {
    descriptors: Vec<HandlerDescriptor>,
    by_tag: HashMap<Arc<str>, usize>,
}

impl Router {
    /// Build a router from handler descriptors.
    ///
    /// # Errors
    ///
    /// Fails at construction time, not per request, if two descriptors share
    /// a tag.
    pub fn make(
        descriptors: impl IntoIterator<Item = HandlerDescriptor>,
    ) -> Result<Self, RouterError> {
        let mut router = Router::default();
        for descriptor in descriptors {
            router.insert(descriptor)?;
        }
        info!(tags = router.descriptors.len(), "Router constructed");
        Ok(router)
    }

    /// Compose this router with another handler module's router.
    ///
    /// # Errors
    ///
    /// Fails if the two routers bind the same tag.
    pub fn merge(mut self, other: Router) -> Result<Self, RouterError> {
        for descriptor in other.descriptors {
            self.insert(descriptor)?;
        }
        Ok(self)
    }

    fn insert(&mut self, descriptor: HandlerDescriptor) -> Result<(), RouterError> {
        if self.by_tag.contains_key(descriptor.tag()) {
            return Err(RouterError::DuplicateTag(descriptor.tag().to_string()));
        }
        info!(
            tag = %descriptor.tag,
            kind = %descriptor.kind,
            "Handler registered"
        );
        self.by_tag
            .insert(descriptor.tag_arc(), self.descriptors.len());
        self.descriptors.push(descriptor);
        Ok(())
    }

    /// Look up the descriptor bound to a tag.
    #[must_use]
    pub fn descriptor(&self, tag: &str) -> Option<&HandlerDescriptor> {
        self.by_tag.get(tag).map(|&i| &self.descriptors[i])
    }

    /// Iterate over all registered descriptors in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &HandlerDescriptor> {
        self.descriptors.iter()
    }

    /// Registered tags in registration order.
    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.descriptors.iter().map(HandlerDescriptor::tag)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}
