//! Construction scopes: naming, control dependencies and sticky error status.

use cf_core::{LoopContextId, NodeId};

use crate::error::{GraphError, GraphResult};
use crate::graph::{Graph, NodeDef, Output};
use crate::op::Op;
use crate::types::DataType;
use crate::while_context::LoopContext;

/// A construction handle over an exclusively borrowed graph.
///
/// A scope carries a name prefix and a set of control dependencies that are
/// attached to every node it creates. Every mutating call first checks the
/// graph's status and records its own failure, so one error poisons all later
/// construction on the same graph.
#[derive(Debug)]
pub struct Scope<'g> {
    graph: &'g mut Graph,
    name: String,
    control_deps: Vec<Output>,
}

impl<'g> Scope<'g> {
    /// Root scope: empty prefix, no control dependencies.
    pub fn new_root(graph: &'g mut Graph) -> Self {
        Self {
            graph,
            name: String::new(),
            control_deps: Vec::new(),
        }
    }

    /// Full name prefix of this scope (empty for the root).
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn graph(&self) -> &Graph {
        &*self.graph
    }

    pub fn control_dependencies(&self) -> &[Output] {
        &self.control_deps
    }

    /// `Ok` unless the graph already recorded a failure.
    pub fn status(&self) -> GraphResult<()> {
        self.graph.status()
    }

    /// Record `err` as the graph's sticky status and hand it back.
    pub fn fail(&mut self, err: GraphError) -> GraphError {
        self.graph.record_error(&err);
        err
    }

    /// Child scope named `<self>/<child>` (uniquified), inheriting control dependencies.
    pub fn sub_scope(&mut self, child: &str) -> Scope<'_> {
        let name = self.graph.unique_name(&self.join(child));
        Scope {
            graph: &mut *self.graph,
            name,
            control_deps: self.control_deps.clone(),
        }
    }

    /// Add control dependencies to every node this scope creates from now on.
    pub fn with_control_dependencies(mut self, deps: &[Output]) -> Self {
        self.control_deps.extend_from_slice(deps);
        self
    }

    /// Unique node name for an op created in this scope.
    pub fn unique_name(&mut self, op_name: &str) -> String {
        let base = self.join(op_name);
        self.graph.unique_name(&base)
    }

    /// Names the next `n` `unique_name(op_name)` calls will return.
    pub fn peek_unique_names(&self, op_name: &str, n: usize) -> Vec<String> {
        self.graph.peek_unique_names(&self.join(op_name), n)
    }

    /// Create a node named after its op type.
    pub fn add_node(&mut self, op: Op, inputs: Vec<Output>) -> GraphResult<NodeId> {
        self.status()?;
        let def = NodeDef {
            name: self.unique_name(op.type_name()),
            op,
            inputs,
            control_inputs: self.control_deps.clone(),
        };
        let result = self.graph.insert_node(def);
        self.track(result)
    }

    /// Allocate a node id whose node will be created later under `name`.
    pub fn reserve(&mut self, name: &str, dtype: DataType) -> GraphResult<NodeId> {
        self.status()?;
        let result = self.graph.reserve(name, dtype);
        self.track(result)
    }

    /// Create the node for reservation `id`; returns the name it was given.
    pub fn fill_reserved(&mut self, id: NodeId, op: Op, inputs: Vec<Output>) -> GraphResult<String> {
        self.status()?;
        let name = self.unique_name(op.type_name());
        let def = NodeDef {
            name: name.clone(),
            op,
            inputs,
            control_inputs: self.control_deps.clone(),
        };
        let result = self.graph.fill_reserved(id, def);
        self.track(result).map(|()| name)
    }

    /// Bind `src` into input slot `dst_slot` of the existing node `dst`.
    pub fn add_edge(&mut self, src: Output, dst: NodeId, dst_slot: usize) -> GraphResult<()> {
        self.status()?;
        let result = self.graph.add_edge(src, dst, dst_slot);
        self.track(result)
    }

    /// Register loop metadata; frame names must be unique per graph.
    pub fn add_loop_context(&mut self, ctx: LoopContext) -> GraphResult<LoopContextId> {
        self.status()?;
        let result = self.graph.add_loop_context(ctx);
        self.track(result)
    }

    /// Attach loop metadata to a node (used for Exit nodes).
    pub fn set_loop_context(&mut self, node: NodeId, ctx: LoopContextId) -> GraphResult<()> {
        self.status()?;
        let result = self.graph.set_loop_context(node, ctx);
        self.track(result)
    }

    fn track<T>(&mut self, result: GraphResult<T>) -> GraphResult<T> {
        if let Err(err) = &result {
            self.graph.record_error(err);
        }
        result
    }

    fn join(&self, child: &str) -> String {
        if self.name.is_empty() {
            child.to_string()
        } else {
            format!("{}/{}", self.name, child)
        }
    }
}
