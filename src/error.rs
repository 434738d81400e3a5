//! Error types for ragline.
//!
//! Graph construction and run-time input errors are [`PipelineError`]s and
//! are raised eagerly, before any component executes. Storage, embedding,
//! and generation failures carry their own enums so callers can tell a
//! retryable outage from a permanent one.

use thiserror::Error;

use crate::pipeline::ValueKind;

/// Result type alias for ragline operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type.
#[derive(Error, Debug)]
pub enum Error {
    /// Graph construction or run validation failed
    #[error("pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// Vector store operation failed
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Embedding service call failed
    #[error("embedding error: {0}")]
    Embedding(#[from] EmbedError),

    /// Completion service call failed
    #[error("generation error: {0}")]
    Generation(#[from] GenerationError),

    /// Configuration error
    #[error("config error: {0}")]
    Config(String),

    /// Document loading failed
    #[error("loader error: {0}")]
    Loader(String),

    /// I/O error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Graph construction and run validation errors.
///
/// Construction variants (`DuplicateComponent` through `TypeMismatch`) are
/// detected while the graph is being built and never surface mid-run.
/// `UnresolvedInput` is raised by the pre-flight pass of
/// [`Pipeline::run`](crate::pipeline::Pipeline::run) before anything
/// executes.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("component '{0}' is already registered")]
    DuplicateComponent(String),

    #[error("unknown component '{0}'")]
    UnknownComponent(String),

    #[error("component '{component}' has no {side} socket '{socket}'")]
    UnknownSocket {
        component: String,
        socket: String,
        side: &'static str,
    },

    #[error("reference '{reference}' is ambiguous: component has {count} {side} sockets, name one as 'component.socket'")]
    AmbiguousSocket {
        reference: String,
        count: usize,
        side: &'static str,
    },

    #[error("input socket '{component}.{socket}' already has an incoming connection")]
    SocketAlreadyBound { component: String, socket: String },

    #[error("connecting '{from}' to '{to}' would create a cycle")]
    Cycle { from: String, to: String },

    #[error("cannot connect '{from}' ({from_kind}) to '{to}' ({to_kind}): socket kinds differ")]
    TypeMismatch {
        from: String,
        to: String,
        from_kind: ValueKind,
        to_kind: ValueKind,
    },

    #[error("run input for '{component}.{socket}' has kind {actual}, socket expects {expected}")]
    InvalidInputKind {
        component: String,
        socket: String,
        expected: ValueKind,
        actual: ValueKind,
    },

    #[error("required input '{component}.{socket}' is not bound for this run")]
    UnresolvedInput { component: String, socket: String },

    /// A component read a socket the engine never validated for it.
    #[error("socket '{socket}' expected {expected}, got {actual:?}")]
    SocketKind {
        socket: String,
        expected: ValueKind,
        actual: Option<ValueKind>,
    },

    #[error("component '{component}' did not produce declared output '{socket}'")]
    MissingOutput { component: String, socket: String },

    #[error("component '{component}' produced output '{socket}' with kind {actual}, declared {expected}")]
    OutputKindMismatch {
        component: String,
        socket: String,
        expected: ValueKind,
        actual: ValueKind,
    },

    #[error("component '{name}' failed: {source}")]
    ComponentFailed {
        name: String,
        #[source]
        source: Box<Error>,
    },
}

/// Vector store errors.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("embedding has {actual} dimensions, store is fixed at {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("document '{0}' already exists")]
    DuplicateDocument(String),

    #[error("store was created with dimension {stored}, configuration says {configured}")]
    DimensionConflict { stored: usize, configured: usize },

    #[error("metadata for document '{id}' is not valid JSON: {source}")]
    Metadata {
        id: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Embedding service errors.
#[derive(Error, Debug)]
pub enum EmbedError {
    #[error("embedding provider is disabled")]
    Disabled,

    #[error("environment variable {0} is not set")]
    MissingCredentials(String),

    #[error("embedding service returned {status}: {message}")]
    Service { status: u16, message: String },

    #[error("embedding request failed: {0}")]
    Network(String),

    #[error("embedding response malformed: {0}")]
    MalformedResponse(String),

    #[error("embedding service returned {actual} vectors for {expected} inputs")]
    CountMismatch { expected: usize, actual: usize },

    #[error("embedding service returned a {actual}-dimensional vector, expected {expected}")]
    DimensionMismatch { expected: usize, actual: usize },
}

impl EmbedError {
    /// Whether a bounded-backoff retry is worth attempting.
    ///
    /// Rate limits, server errors, and network failures are transient;
    /// everything else (bad credentials, malformed requests) is not.
    pub fn is_retryable(&self) -> bool {
        match self {
            EmbedError::Service { status, .. } => *status == 429 || *status >= 500,
            EmbedError::Network(_) => true,
            _ => false,
        }
    }
}

/// Completion service errors.
#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("generation timed out after {0} seconds")]
    Timeout(u64),

    #[error("generation credentials rejected ({status}): {message}")]
    Auth { status: u16, message: String },

    #[error("generation rate limited: {0}")]
    RateLimited(String),

    #[error("generation service returned {status}: {message}")]
    Service { status: u16, message: String },

    #[error("generation request failed: {0}")]
    Network(String),

    #[error("environment variable {0} is not set")]
    MissingCredentials(String),

    #[error("generation response contained no choices")]
    EmptyResponse,
}

impl GenerationError {
    /// Whether a bounded-backoff retry is worth attempting.
    pub fn is_retryable(&self) -> bool {
        match self {
            GenerationError::Timeout(_)
            | GenerationError::RateLimited(_)
            | GenerationError::Network(_) => true,
            GenerationError::Service { status, .. } => *status >= 500,
            _ => false,
        }
    }
}
