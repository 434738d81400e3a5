//! Socket values, socket schemas, and the component contract.
//!
//! Every payload that can travel along a pipeline edge is a [`Value`]
//! variant; the matching [`ValueKind`] is what sockets are typed with, so
//! mis-wired graphs are rejected at construction time instead of mid-run.

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;

use crate::document::Document;
use crate::error::{PipelineError, Result};

/// A value flowing through pipeline sockets.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Text(String),
    Embedding(Vec<f32>),
    Documents(Vec<Document>),
    Count(usize),
}

/// The type of a socket, and of the [`Value`] bound to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Text,
    Embedding,
    Documents,
    Count,
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Text(_) => ValueKind::Text,
            Value::Embedding(_) => ValueKind::Embedding,
            Value::Documents(_) => ValueKind::Documents,
            Value::Count(_) => ValueKind::Count,
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueKind::Text => "text",
            ValueKind::Embedding => "embedding",
            ValueKind::Documents => "documents",
            ValueKind::Count => "count",
        };
        write!(f, "{}", name)
    }
}

/// A declared socket on a component interface.
///
/// Required input sockets must be bound (by the caller or by an incoming
/// connection) for the component to run; optional ones fall back to a
/// component-level default.
#[derive(Debug, Clone, Copy)]
pub struct SocketSpec {
    pub name: &'static str,
    pub kind: ValueKind,
    pub required: bool,
}

impl SocketSpec {
    pub const fn required(name: &'static str, kind: ValueKind) -> Self {
        Self {
            name,
            kind,
            required: true,
        }
    }

    pub const fn optional(name: &'static str, kind: ValueKind) -> Self {
        Self {
            name,
            kind,
            required: false,
        }
    }
}

/// Socket values keyed by socket name.
///
/// `BTreeMap` keeps iteration order deterministic, which keeps run results
/// deterministic.
pub type SocketValues = BTreeMap<String, Value>;

/// A named processing step in a [`Pipeline`](crate::pipeline::Pipeline).
///
/// Components are stateless across runs (the store writer's persistent side
/// effects excepted) and shared between concurrent runs, hence `Send + Sync`
/// and `&self`. The engine binds and kind-checks every input socket before
/// calling [`run`](Component::run).
#[async_trait]
pub trait Component: Send + Sync {
    fn input_sockets(&self) -> &[SocketSpec];
    fn output_sockets(&self) -> &[SocketSpec];

    /// Transform bound inputs into outputs, one map entry per declared
    /// output socket.
    async fn run(&self, inputs: SocketValues) -> Result<SocketValues>;
}

/// Unpack a text socket. The engine kind-checks bindings before dispatch,
/// so a mismatch here is a component wiring bug, not caller error.
pub fn take_text(inputs: &mut SocketValues, socket: &str) -> Result<String> {
    match inputs.remove(socket) {
        Some(Value::Text(text)) => Ok(text),
        other => Err(socket_kind_error(socket, ValueKind::Text, other)),
    }
}

/// Unpack an embedding socket.
pub fn take_embedding(inputs: &mut SocketValues, socket: &str) -> Result<Vec<f32>> {
    match inputs.remove(socket) {
        Some(Value::Embedding(vector)) => Ok(vector),
        other => Err(socket_kind_error(socket, ValueKind::Embedding, other)),
    }
}

/// Unpack a documents socket.
pub fn take_documents(inputs: &mut SocketValues, socket: &str) -> Result<Vec<Document>> {
    match inputs.remove(socket) {
        Some(Value::Documents(docs)) => Ok(docs),
        other => Err(socket_kind_error(socket, ValueKind::Documents, other)),
    }
}

/// Unpack an optional count socket; `None` when the socket is unbound.
pub fn take_count_opt(inputs: &mut SocketValues, socket: &str) -> Result<Option<usize>> {
    match inputs.remove(socket) {
        Some(Value::Count(n)) => Ok(Some(n)),
        None => Ok(None),
        other => Err(socket_kind_error(socket, ValueKind::Count, other)),
    }
}

fn socket_kind_error(socket: &str, expected: ValueKind, found: Option<Value>) -> crate::error::Error {
    PipelineError::SocketKind {
        socket: socket.to_string(),
        expected,
        actual: found.map(|v| v.kind()),
    }
    .into()
}
