//! Dataflow graph engine.
//!
//! A [`Pipeline`] is a directed acyclic graph of named [`Component`]s wired
//! together through typed sockets. The graph is built once (components
//! registered, sockets connected, every error caught eagerly) and is then
//! immutable and shared across concurrent runs; [`Pipeline::run`] executes
//! the components a request actually reaches, in dependency order, routing
//! each component's outputs into the inputs of whatever is connected
//! downstream.
//!
//! Nodes live in an arena (`Vec`) and edges refer to them by index, so the
//! graph owns its components without reference cycles. The topological
//! order is recomputed on every successful `connect` and cached for runs.

pub mod component;

pub use component::{
    take_count_opt, take_documents, take_embedding, take_text, Component, SocketSpec,
    SocketValues, Value, ValueKind,
};

use std::collections::{BTreeMap, BTreeSet, HashMap};

use futures::future::try_join_all;
use tracing::debug;

use crate::error::{Error, PipelineError, Result};

/// Caller-supplied inputs: component name → socket name → value.
pub type RunInputs = BTreeMap<String, SocketValues>;

/// Run results: every executed component's full outputs, keyed by name.
/// Intermediate stages are retained so callers can inspect them.
pub type RunOutputs = BTreeMap<String, SocketValues>;

struct Node {
    name: String,
    component: Box<dyn Component>,
}

#[derive(Debug, Clone)]
struct Edge {
    source: usize,
    source_socket: String,
    target: usize,
    target_socket: String,
}

#[derive(Clone, Copy, PartialEq)]
enum Side {
    Input,
    Output,
}

impl Side {
    fn name(self) -> &'static str {
        match self {
            Side::Input => "input",
            Side::Output => "output",
        }
    }
}

/// A directed acyclic graph of named components.
#[derive(Default)]
pub struct Pipeline {
    nodes: Vec<Node>,
    index: HashMap<String, usize>,
    edges: Vec<Edge>,
    order: Vec<usize>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a component under a unique name.
    pub fn add_component(
        &mut self,
        name: impl Into<String>,
        component: Box<dyn Component>,
    ) -> Result<()> {
        let name = name.into();
        if self.index.contains_key(&name) {
            return Err(PipelineError::DuplicateComponent(name).into());
        }
        self.index.insert(name.clone(), self.nodes.len());
        self.nodes.push(Node { name, component });
        if let Some(order) = self.topological_order() {
            self.order = order;
        }
        Ok(())
    }

    /// Connect an output socket to an input socket.
    ///
    /// References are `"component.socket"`; a bare `"component"` resolves
    /// when that side of the component has exactly one socket. A target
    /// socket accepts at most one incoming edge; a source socket may fan
    /// out. Rejected connections leave the graph exactly as it was.
    pub fn connect(&mut self, source: &str, target: &str) -> Result<()> {
        let (src_node, src_socket, src_kind) = self.resolve(source, Side::Output)?;
        let (dst_node, dst_socket, dst_kind) = self.resolve(target, Side::Input)?;

        if src_kind != dst_kind {
            return Err(PipelineError::TypeMismatch {
                from: format!("{}.{}", self.nodes[src_node].name, src_socket),
                to: format!("{}.{}", self.nodes[dst_node].name, dst_socket),
                from_kind: src_kind,
                to_kind: dst_kind,
            }
            .into());
        }

        if self
            .edges
            .iter()
            .any(|e| e.target == dst_node && e.target_socket == dst_socket)
        {
            return Err(PipelineError::SocketAlreadyBound {
                component: self.nodes[dst_node].name.clone(),
                socket: dst_socket,
            }
            .into());
        }

        self.edges.push(Edge {
            source: src_node,
            source_socket: src_socket,
            target: dst_node,
            target_socket: dst_socket,
        });

        match self.topological_order() {
            Some(order) => {
                self.order = order;
                Ok(())
            }
            None => {
                self.edges.pop();
                Err(PipelineError::Cycle {
                    from: source.to_string(),
                    to: target.to_string(),
                }
                .into())
            }
        }
    }

    /// Execute the graph for one request.
    ///
    /// A pre-flight pass validates the caller inputs and decides which
    /// components will run, before anything executes: a component is
    /// scheduled once every required input socket is bound, either directly
    /// by the caller or by an edge from a scheduled component. A component
    /// with some sockets bound but a required one unbound fails the whole
    /// run with [`PipelineError::UnresolvedInput`]; one with nothing bound
    /// is skipped, along with everything that depended on it.
    ///
    /// Scheduled components are grouped into dependency levels; siblings
    /// within a level run concurrently, levels strictly in order. Dropping
    /// the returned future cancels in-flight component calls.
    pub async fn run(&self, inputs: RunInputs) -> Result<RunOutputs> {
        self.validate_inputs(&inputs)?;
        let scheduled = self.schedule(&inputs)?;

        let mut level = vec![0usize; self.nodes.len()];
        for &i in &self.order {
            if !scheduled[i] {
                continue;
            }
            level[i] = self
                .edges
                .iter()
                .filter(|e| e.target == i && scheduled[e.source])
                .map(|e| level[e.source] + 1)
                .max()
                .unwrap_or(0);
        }

        let mut outputs = RunOutputs::new();
        let max_level = match (0..self.nodes.len())
            .filter(|&i| scheduled[i])
            .map(|i| level[i])
            .max()
        {
            Some(max) => max,
            None => return Ok(outputs),
        };

        for current in 0..=max_level {
            let batch: Vec<usize> = self
                .order
                .iter()
                .copied()
                .filter(|&i| scheduled[i] && level[i] == current)
                .collect();

            let futures: Vec<_> = batch
                .iter()
                .map(|&i| {
                    let bound = self.bind_inputs(i, &inputs, &outputs, &scheduled);
                    let node = &self.nodes[i];
                    async move {
                        debug!(component = %node.name, "running component");
                        let produced = node.component.run(bound).await.map_err(|err| {
                            Error::from(PipelineError::ComponentFailed {
                                name: node.name.clone(),
                                source: Box::new(err),
                            })
                        })?;
                        self.validate_outputs(i, &produced)?;
                        Ok::<(String, SocketValues), Error>((node.name.clone(), produced))
                    }
                })
                .collect();

            for (name, produced) in try_join_all(futures).await? {
                outputs.insert(name, produced);
            }
        }

        Ok(outputs)
    }

    fn resolve(&self, reference: &str, side: Side) -> Result<(usize, String, ValueKind)> {
        let (component, socket) = match reference.split_once('.') {
            Some((component, socket)) => (component, Some(socket)),
            None => (reference, None),
        };

        let &node = self
            .index
            .get(component)
            .ok_or_else(|| PipelineError::UnknownComponent(component.to_string()))?;

        let specs = match side {
            Side::Output => self.nodes[node].component.output_sockets(),
            Side::Input => self.nodes[node].component.input_sockets(),
        };

        let spec = match socket {
            Some(name) => specs.iter().find(|s| s.name == name).ok_or_else(|| {
                PipelineError::UnknownSocket {
                    component: component.to_string(),
                    socket: name.to_string(),
                    side: side.name(),
                }
            })?,
            None if specs.len() == 1 => &specs[0],
            None => {
                return Err(PipelineError::AmbiguousSocket {
                    reference: reference.to_string(),
                    count: specs.len(),
                    side: side.name(),
                }
                .into())
            }
        };

        Ok((node, spec.name.to_string(), spec.kind))
    }

    /// Kahn's algorithm; smallest node index first for a stable order.
    /// `None` means the edge set contains a cycle.
    fn topological_order(&self) -> Option<Vec<usize>> {
        let mut indegree = vec![0usize; self.nodes.len()];
        for edge in &self.edges {
            indegree[edge.target] += 1;
        }

        let mut ready: BTreeSet<usize> = (0..self.nodes.len())
            .filter(|&i| indegree[i] == 0)
            .collect();
        let mut order = Vec::with_capacity(self.nodes.len());

        while let Some(&node) = ready.iter().next() {
            ready.remove(&node);
            order.push(node);
            for edge in self.edges.iter().filter(|e| e.source == node) {
                indegree[edge.target] -= 1;
                if indegree[edge.target] == 0 {
                    ready.insert(edge.target);
                }
            }
        }

        (order.len() == self.nodes.len()).then_some(order)
    }

    fn validate_inputs(&self, inputs: &RunInputs) -> Result<()> {
        for (component, sockets) in inputs {
            let &node = self
                .index
                .get(component)
                .ok_or_else(|| PipelineError::UnknownComponent(component.clone()))?;
            for (socket, value) in sockets {
                let spec = self.nodes[node]
                    .component
                    .input_sockets()
                    .iter()
                    .find(|s| s.name == socket.as_str())
                    .ok_or_else(|| PipelineError::UnknownSocket {
                        component: component.clone(),
                        socket: socket.clone(),
                        side: "input",
                    })?;
                if value.kind() != spec.kind {
                    return Err(PipelineError::InvalidInputKind {
                        component: component.clone(),
                        socket: socket.clone(),
                        expected: spec.kind,
                        actual: value.kind(),
                    }
                    .into());
                }
                if self
                    .edges
                    .iter()
                    .any(|e| e.target == node && e.target_socket == *socket)
                {
                    return Err(PipelineError::SocketAlreadyBound {
                        component: component.clone(),
                        socket: socket.clone(),
                    }
                    .into());
                }
            }
        }
        Ok(())
    }

    fn schedule(&self, inputs: &RunInputs) -> Result<Vec<bool>> {
        let mut scheduled = vec![false; self.nodes.len()];
        for &i in &self.order {
            let node = &self.nodes[i];
            let caller = inputs.get(&node.name);
            let specs = node.component.input_sockets();

            // A component without input sockets has nothing to wait for.
            if specs.is_empty() {
                scheduled[i] = true;
                continue;
            }

            let mut bound_any = false;
            let mut missing: Option<&'static str> = None;
            for spec in specs {
                let from_caller = caller.is_some_and(|m| m.contains_key(spec.name));
                let from_edge = self.edges.iter().any(|e| {
                    e.target == i && e.target_socket == spec.name && scheduled[e.source]
                });
                if from_caller || from_edge {
                    bound_any = true;
                } else if spec.required && missing.is_none() {
                    missing = Some(spec.name);
                }
            }

            if bound_any {
                if let Some(socket) = missing {
                    return Err(PipelineError::UnresolvedInput {
                        component: node.name.clone(),
                        socket: socket.to_string(),
                    }
                    .into());
                }
                scheduled[i] = true;
            }
        }
        Ok(scheduled)
    }

    fn bind_inputs(
        &self,
        node: usize,
        inputs: &RunInputs,
        outputs: &RunOutputs,
        scheduled: &[bool],
    ) -> SocketValues {
        let mut bound = inputs
            .get(&self.nodes[node].name)
            .cloned()
            .unwrap_or_default();
        for edge in self
            .edges
            .iter()
            .filter(|e| e.target == node && scheduled[e.source])
        {
            if let Some(value) = outputs
                .get(&self.nodes[edge.source].name)
                .and_then(|produced| produced.get(&edge.source_socket))
            {
                bound.insert(edge.target_socket.clone(), value.clone());
            }
        }
        bound
    }

    fn validate_outputs(&self, node: usize, produced: &SocketValues) -> Result<()> {
        let name = &self.nodes[node].name;
        for spec in self.nodes[node].component.output_sockets() {
            match produced.get(spec.name) {
                None => {
                    return Err(PipelineError::MissingOutput {
                        component: name.clone(),
                        socket: spec.name.to_string(),
                    }
                    .into())
                }
                Some(value) if value.kind() != spec.kind => {
                    return Err(PipelineError::OutputKindMismatch {
                        component: name.clone(),
                        socket: spec.name.to_string(),
                        expected: spec.kind,
                        actual: value.kind(),
                    }
                    .into())
                }
                Some(_) => {}
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    const TEXT_IN: &[SocketSpec] = &[SocketSpec::required("text", ValueKind::Text)];
    const TEXT_OUT: &[SocketSpec] = &[SocketSpec::required("text", ValueKind::Text)];

    /// text → text, uppercased. Counts executions for side-effect checks.
    struct Upper {
        calls: Arc<AtomicUsize>,
    }

    impl Upper {
        fn boxed() -> (Box<dyn Component>, Arc<AtomicUsize>) {
            let calls = Arc::new(AtomicUsize::new(0));
            (Box::new(Upper { calls: calls.clone() }), calls)
        }
    }

    #[async_trait]
    impl Component for Upper {
        fn input_sockets(&self) -> &[SocketSpec] {
            TEXT_IN
        }
        fn output_sockets(&self) -> &[SocketSpec] {
            TEXT_OUT
        }
        async fn run(&self, mut inputs: SocketValues) -> Result<SocketValues> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let text = take_text(&mut inputs, "text")?;
            let mut out = SocketValues::new();
            out.insert("text".into(), Value::Text(text.to_uppercase()));
            Ok(out)
        }
    }

    const JOIN_IN: &[SocketSpec] = &[
        SocketSpec::required("a", ValueKind::Text),
        SocketSpec::required("b", ValueKind::Text),
    ];

    /// (a: text, b: text) → text, concatenated with a space.
    struct Join;

    #[async_trait]
    impl Component for Join {
        fn input_sockets(&self) -> &[SocketSpec] {
            JOIN_IN
        }
        fn output_sockets(&self) -> &[SocketSpec] {
            TEXT_OUT
        }
        async fn run(&self, mut inputs: SocketValues) -> Result<SocketValues> {
            let a = take_text(&mut inputs, "a")?;
            let b = take_text(&mut inputs, "b")?;
            let mut out = SocketValues::new();
            out.insert("text".into(), Value::Text(format!("{} {}", a, b)));
            Ok(out)
        }
    }

    const LENGTH_OUT: &[SocketSpec] = &[SocketSpec::required("length", ValueKind::Count)];

    /// text → count (length in chars).
    struct Measure;

    #[async_trait]
    impl Component for Measure {
        fn input_sockets(&self) -> &[SocketSpec] {
            TEXT_IN
        }
        fn output_sockets(&self) -> &[SocketSpec] {
            LENGTH_OUT
        }
        async fn run(&self, mut inputs: SocketValues) -> Result<SocketValues> {
            let text = take_text(&mut inputs, "text")?;
            let mut out = SocketValues::new();
            out.insert("length".into(), Value::Count(text.chars().count()));
            Ok(out)
        }
    }

    /// Zero-input source producing a constant text.
    struct Constant(&'static str);

    #[async_trait]
    impl Component for Constant {
        fn input_sockets(&self) -> &[SocketSpec] {
            &[]
        }
        fn output_sockets(&self) -> &[SocketSpec] {
            TEXT_OUT
        }
        async fn run(&self, _inputs: SocketValues) -> Result<SocketValues> {
            let mut out = SocketValues::new();
            out.insert("text".into(), Value::Text(self.0.to_string()));
            Ok(out)
        }
    }

    fn text_input(component: &str, text: &str) -> RunInputs {
        let mut sockets = SocketValues::new();
        sockets.insert("text".into(), Value::Text(text.into()));
        let mut inputs = RunInputs::new();
        inputs.insert(component.into(), sockets);
        inputs
    }

    #[test]
    fn test_duplicate_component_rejected() {
        let mut pipeline = Pipeline::new();
        pipeline.add_component("upper", Upper::boxed().0).unwrap();
        let err = pipeline.add_component("upper", Upper::boxed().0).unwrap_err();
        assert!(err.to_string().contains("already registered"));
    }

    #[test]
    fn test_connect_unknown_component() {
        let mut pipeline = Pipeline::new();
        pipeline.add_component("upper", Upper::boxed().0).unwrap();
        let err = pipeline.connect("upper.text", "missing.text").unwrap_err();
        assert!(err.to_string().contains("unknown component 'missing'"));
    }

    #[test]
    fn test_connect_unknown_socket() {
        let mut pipeline = Pipeline::new();
        pipeline.add_component("upper", Upper::boxed().0).unwrap();
        pipeline.add_component("measure", Box::new(Measure)).unwrap();
        let err = pipeline.connect("upper.nope", "measure.text").unwrap_err();
        assert!(err.to_string().contains("no output socket 'nope'"));
    }

    #[test]
    fn test_bare_reference_resolves_single_socket() {
        let mut pipeline = Pipeline::new();
        pipeline.add_component("upper", Upper::boxed().0).unwrap();
        pipeline.add_component("measure", Box::new(Measure)).unwrap();
        pipeline.connect("upper", "measure").unwrap();
    }

    #[test]
    fn test_bare_reference_ambiguous() {
        let mut pipeline = Pipeline::new();
        pipeline.add_component("upper", Upper::boxed().0).unwrap();
        pipeline.add_component("join", Box::new(Join)).unwrap();
        let err = pipeline.connect("upper", "join").unwrap_err();
        assert!(err.to_string().contains("ambiguous"));
    }

    #[test]
    fn test_target_socket_single_incoming_edge() {
        let mut pipeline = Pipeline::new();
        pipeline.add_component("first", Upper::boxed().0).unwrap();
        pipeline.add_component("second", Upper::boxed().0).unwrap();
        pipeline.add_component("measure", Box::new(Measure)).unwrap();

        pipeline.connect("first.text", "measure.text").unwrap();
        let err = pipeline.connect("second.text", "measure.text").unwrap_err();
        assert!(err.to_string().contains("already has an incoming connection"));
    }

    #[test]
    fn test_type_mismatch_rejected() {
        let mut pipeline = Pipeline::new();
        pipeline.add_component("measure", Box::new(Measure)).unwrap();
        pipeline.add_component("upper", Upper::boxed().0).unwrap();
        let err = pipeline.connect("measure.length", "upper.text").unwrap_err();
        assert!(err.to_string().contains("socket kinds differ"));
    }

    #[tokio::test]
    async fn test_cycle_rejected_without_corrupting_graph() {
        let mut pipeline = Pipeline::new();
        pipeline.add_component("a", Upper::boxed().0).unwrap();
        pipeline.add_component("b", Upper::boxed().0).unwrap();
        pipeline.add_component("c", Upper::boxed().0).unwrap();

        pipeline.connect("a.text", "b.text").unwrap();
        pipeline.connect("b.text", "c.text").unwrap();
        let err = pipeline.connect("c.text", "a.text").unwrap_err();
        assert!(err.to_string().contains("cycle"));

        // The rejected edge must not have mutated the graph.
        let results = pipeline.run(text_input("a", "hi")).await.unwrap();
        assert_eq!(
            results["c"]["text"],
            Value::Text("HI".into()),
        );
    }

    #[test]
    fn test_self_loop_rejected() {
        let mut pipeline = Pipeline::new();
        pipeline.add_component("a", Upper::boxed().0).unwrap();
        let err = pipeline.connect("a.text", "a.text").unwrap_err();
        assert!(err.to_string().contains("cycle"));
    }

    #[tokio::test]
    async fn test_run_routes_values_and_keeps_intermediates() {
        let mut pipeline = Pipeline::new();
        pipeline.add_component("upper", Upper::boxed().0).unwrap();
        pipeline.add_component("measure", Box::new(Measure)).unwrap();
        pipeline.connect("upper.text", "measure.text").unwrap();

        let results = pipeline.run(text_input("upper", "bowling")).await.unwrap();

        assert_eq!(results["upper"]["text"], Value::Text("BOWLING".into()));
        assert_eq!(results["measure"]["length"], Value::Count(7));
    }

    #[tokio::test]
    async fn test_source_socket_fans_out() {
        let mut pipeline = Pipeline::new();
        pipeline.add_component("upper", Upper::boxed().0).unwrap();
        pipeline.add_component("join", Box::new(Join)).unwrap();
        pipeline.connect("upper.text", "join.a").unwrap();
        pipeline.connect("upper.text", "join.b").unwrap();

        let results = pipeline.run(text_input("upper", "go")).await.unwrap();
        assert_eq!(results["join"]["text"], Value::Text("GO GO".into()));
    }

    #[tokio::test]
    async fn test_unresolved_required_input_fails_before_execution() {
        let mut pipeline = Pipeline::new();
        let (join_target, calls) = Upper::boxed();
        pipeline.add_component("join", Box::new(Join)).unwrap();
        pipeline.add_component("after", join_target).unwrap();
        pipeline.connect("join.text", "after.text").unwrap();

        // Only `a` is supplied; `b` stays unbound.
        let mut sockets = SocketValues::new();
        sockets.insert("a".into(), Value::Text("half".into()));
        let mut inputs = RunInputs::new();
        inputs.insert("join".into(), sockets);

        let err = pipeline.run(inputs).await.unwrap_err();
        assert!(err.to_string().contains("'join.b' is not bound"));
        assert_eq!(calls.load(Ordering::SeqCst), 0, "nothing may execute");
    }

    #[tokio::test]
    async fn test_unreached_components_are_skipped() {
        let mut pipeline = Pipeline::new();
        let (upper, upper_calls) = Upper::boxed();
        let (other, other_calls) = Upper::boxed();
        pipeline.add_component("upper", upper).unwrap();
        pipeline.add_component("measure", Box::new(Measure)).unwrap();
        pipeline.add_component("other", other).unwrap();
        pipeline.connect("upper.text", "measure.text").unwrap();

        let results = pipeline.run(text_input("upper", "hi")).await.unwrap();

        assert!(results.contains_key("upper"));
        assert!(results.contains_key("measure"));
        assert!(!results.contains_key("other"));
        assert_eq!(upper_calls.load(Ordering::SeqCst), 1);
        assert_eq!(other_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_zero_input_component_always_runs() {
        let mut pipeline = Pipeline::new();
        pipeline
            .add_component("constant", Box::new(Constant("fixed")))
            .unwrap();
        pipeline.add_component("measure", Box::new(Measure)).unwrap();
        pipeline.connect("constant.text", "measure.text").unwrap();

        let results = pipeline.run(RunInputs::new()).await.unwrap();
        assert_eq!(results["measure"]["length"], Value::Count(5));
    }

    #[tokio::test]
    async fn test_caller_input_for_connected_socket_rejected() {
        let mut pipeline = Pipeline::new();
        pipeline.add_component("upper", Upper::boxed().0).unwrap();
        pipeline.add_component("measure", Box::new(Measure)).unwrap();
        pipeline.connect("upper.text", "measure.text").unwrap();

        let mut inputs = text_input("upper", "hi");
        inputs.insert("measure".into(), {
            let mut sockets = SocketValues::new();
            sockets.insert("text".into(), Value::Text("direct".into()));
            sockets
        });

        let err = pipeline.run(inputs).await.unwrap_err();
        assert!(err.to_string().contains("already has an incoming connection"));
    }

    #[tokio::test]
    async fn test_caller_input_kind_checked() {
        let mut pipeline = Pipeline::new();
        pipeline.add_component("upper", Upper::boxed().0).unwrap();

        let mut sockets = SocketValues::new();
        sockets.insert("text".into(), Value::Count(1));
        let mut inputs = RunInputs::new();
        inputs.insert("upper".into(), sockets);

        let err = pipeline.run(inputs).await.unwrap_err();
        assert!(err.to_string().contains("socket expects text"));
    }

    #[tokio::test]
    async fn test_run_is_deterministic() {
        let mut pipeline = Pipeline::new();
        pipeline.add_component("upper", Upper::boxed().0).unwrap();
        pipeline.add_component("measure", Box::new(Measure)).unwrap();
        pipeline.connect("upper.text", "measure.text").unwrap();

        let first = pipeline.run(text_input("upper", "same input")).await.unwrap();
        let second = pipeline.run(text_input("upper", "same input")).await.unwrap();
        assert_eq!(first, second);
    }
}
