//! Symbolic differentiation of acyclic subgraphs.
//!
//! The gradient loop needs the gradient of the forward body as a graph, built
//! inside its own body scope. [`SymbolicGradients`] is that seam; the default
//! [`GradientRegistry`] knows one rule per elementwise op.

use std::collections::{HashMap, HashSet};

use cf_core::NodeId;
use cf_graph::{GraphError, GraphResult, Op, Output, Scope, ops};
use tracing::trace;

/// Builds gradient subgraphs.
pub trait SymbolicGradients {
    /// Gradients of `outputs` with respect to `inputs`.
    ///
    /// `grad_outputs[i]` is the incoming gradient of `outputs[i]`. Returns one
    /// value per input; inputs with no path to any output get `ZerosLike(input)`.
    fn add_gradients(
        &self,
        scope: &mut Scope<'_>,
        outputs: &[Output],
        inputs: &[Output],
        grad_outputs: &[Output],
    ) -> GraphResult<Vec<Output>>;
}

/// Gradient rule for one single-output op.
pub trait GradFn: Send + Sync {
    /// Partial gradients for each input of a node given the gradient of its
    /// output. `None` means no gradient flows into that input.
    fn apply(
        &self,
        scope: &mut Scope<'_>,
        inputs: &[Output],
        grad: Output,
    ) -> GraphResult<Vec<Option<Output>>>;

    fn name(&self) -> &str;
}

pub struct IdentityGrad;

impl GradFn for IdentityGrad {
    fn apply(&self, scope: &mut Scope<'_>, _: &[Output], grad: Output) -> GraphResult<Vec<Option<Output>>> {
        Ok(vec![Some(ops::identity(scope, grad)?)])
    }

    fn name(&self) -> &str {
        "IdentityGrad"
    }
}

/// Addition: grad flows to both operands unchanged.
pub struct AddGrad;

impl GradFn for AddGrad {
    fn apply(&self, scope: &mut Scope<'_>, _: &[Output], grad: Output) -> GraphResult<Vec<Option<Output>>> {
        Ok(vec![
            Some(ops::identity(scope, grad)?),
            Some(ops::identity(scope, grad)?),
        ])
    }

    fn name(&self) -> &str {
        "AddGrad"
    }
}

pub struct SubGrad;

impl GradFn for SubGrad {
    fn apply(&self, scope: &mut Scope<'_>, _: &[Output], grad: Output) -> GraphResult<Vec<Option<Output>>> {
        Ok(vec![
            Some(ops::identity(scope, grad)?),
            Some(ops::neg(scope, grad)?),
        ])
    }

    fn name(&self) -> &str {
        "SubGrad"
    }
}

pub struct NegGrad;

impl GradFn for NegGrad {
    fn apply(&self, scope: &mut Scope<'_>, _: &[Output], grad: Output) -> GraphResult<Vec<Option<Output>>> {
        Ok(vec![Some(ops::neg(scope, grad)?)])
    }

    fn name(&self) -> &str {
        "NegGrad"
    }
}

/// Multiplication reads the forward operands.
///
/// Inside a gradient loop the operands are read at the gradient loop's own
/// iteration index, which counts forward rather than in reverse. Loop-varying
/// factors therefore give wrong gradients without an error; only factors that
/// are constant across iterations are exact.
pub struct MulGrad;

impl GradFn for MulGrad {
    fn apply(&self, scope: &mut Scope<'_>, inputs: &[Output], grad: Output) -> GraphResult<Vec<Option<Output>>> {
        // d/da (a*b) = b, d/db (a*b) = a
        let (lhs, rhs) = (inputs[0], inputs[1]);
        Ok(vec![
            Some(ops::mul(scope, grad, rhs)?),
            Some(ops::mul(scope, grad, lhs)?),
        ])
    }

    fn name(&self) -> &str {
        "MulGrad"
    }
}

/// Ops that are not differentiable (comparisons) or constant by construction.
pub struct StopGrad;

impl GradFn for StopGrad {
    fn apply(&self, _: &mut Scope<'_>, inputs: &[Output], _: Output) -> GraphResult<Vec<Option<Output>>> {
        Ok(vec![None; inputs.len()])
    }

    fn name(&self) -> &str {
        "StopGrad"
    }
}

/// Gradient rules keyed by op type name.
pub struct GradientRegistry {
    rules: HashMap<String, Box<dyn GradFn>>,
}

impl Default for GradientRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl GradientRegistry {
    /// A registry without any rules.
    pub fn empty() -> Self {
        Self {
            rules: HashMap::new(),
        }
    }

    /// Rules for every built-in elementwise op.
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry.register("Identity", IdentityGrad);
        registry.register("Add", AddGrad);
        registry.register("Sub", SubGrad);
        registry.register("Neg", NegGrad);
        registry.register("Mul", MulGrad);
        registry.register("ZerosLike", StopGrad);
        registry.register("Less", StopGrad);
        registry.register("Greater", StopGrad);
        registry
    }

    /// Add or replace the rule for `op_type`.
    pub fn register(&mut self, op_type: impl Into<String>, rule: impl GradFn + 'static) {
        self.rules.insert(op_type.into(), Box::new(rule));
    }

    pub fn has_rule(&self, op_type: &str) -> bool {
        self.rules.contains_key(op_type)
    }

    fn rule(&self, op_type: &str) -> GraphResult<&dyn GradFn> {
        self.rules
            .get(op_type)
            .map(|rule| rule.as_ref())
            .ok_or_else(|| GraphError::NoGradient {
                op: op_type.to_string(),
            })
    }
}

/// What the backward pass needs to know about one node, copied out of the graph
/// so gradient nodes can be created while iterating.
struct Visit {
    id: NodeId,
    op: Op,
    inputs: Vec<Output>,
    num_outputs: usize,
}

impl SymbolicGradients for GradientRegistry {
    fn add_gradients(
        &self,
        scope: &mut Scope<'_>,
        outputs: &[Output],
        inputs: &[Output],
        grad_outputs: &[Output],
    ) -> GraphResult<Vec<Output>> {
        if outputs.len() != grad_outputs.len() {
            return Err(scope.fail(GraphError::InvalidArgument(format!(
                "got {} gradients for {} outputs",
                grad_outputs.len(),
                outputs.len()
            ))));
        }

        let input_set: HashSet<Output> = inputs.iter().copied().collect();
        let order = relevant_nodes(scope, outputs, &input_set).map_err(|e| scope.fail(e))?;

        let mut grads: HashMap<Output, Output> = HashMap::new();
        for (&out, &g) in outputs.iter().zip(grad_outputs) {
            accumulate(scope, &mut grads, out, g)?;
        }

        // Reverse post-order visits every consumer before its producers.
        for visit in order.iter().rev() {
            let Some(grad) = (0..visit.num_outputs as u32)
                .find_map(|i| grads.get(&Output::new(visit.id, i)).copied())
            else {
                continue;
            };
            if visit.num_outputs != 1 {
                return Err(scope.fail(GraphError::NoGradient {
                    op: visit.op.type_name().to_string(),
                }));
            }

            let rule = self.rule(visit.op.type_name()).map_err(|e| scope.fail(e))?;
            trace!(node = %visit.id, rule = rule.name(), "applying gradient rule");
            let partials = rule.apply(scope, &visit.inputs, grad)?;
            for (&input, partial) in visit.inputs.iter().zip(partials) {
                let reaches = input_set.contains(&input)
                    || order.iter().any(|v| v.id == input.node);
                if let (Some(p), true) = (partial, reaches) {
                    accumulate(scope, &mut grads, input, p)?;
                }
            }
        }

        inputs
            .iter()
            .map(|&input| match grads.get(&input) {
                Some(&g) => Ok(g),
                None => ops::zeros_like(scope, input),
            })
            .collect()
    }
}

fn accumulate(
    scope: &mut Scope<'_>,
    grads: &mut HashMap<Output, Output>,
    at: Output,
    g: Output,
) -> GraphResult<()> {
    let total = match grads.get(&at) {
        Some(&prev) => ops::add(scope, prev, g)?,
        None => g,
    };
    grads.insert(at, total);
    Ok(())
}

/// Post-order of the nodes between `outputs` and `inputs`.
///
/// Traversal follows data inputs only, stops at requested inputs, and keeps
/// just the nodes from which some input is reachable. A loop primitive on such
/// a path has no symbolic gradient and fails with `NoGradient`.
fn relevant_nodes(
    scope: &Scope<'_>,
    outputs: &[Output],
    inputs: &HashSet<Output>,
) -> GraphResult<Vec<Visit>> {
    let graph = scope.graph();
    let mut reaches: HashMap<NodeId, bool> = HashMap::new();
    let mut order = Vec::new();

    // Iterative DFS: (node, next input index to look at).
    for root in outputs {
        if inputs.contains(root) || reaches.contains_key(&root.node) {
            continue;
        }
        let mut stack: Vec<(NodeId, usize)> = vec![(root.node, 0)];
        reaches.insert(root.node, false);

        while let Some(top) = stack.last_mut() {
            let (id, next) = *top;
            let node = graph
                .node(id)
                .ok_or(GraphError::UnknownNode { node: id })?;
            if let Some(&input) = node.inputs.get(next) {
                top.1 += 1;
                if inputs.contains(&input) {
                    reaches.insert(id, true);
                } else if !reaches.contains_key(&input.node) {
                    reaches.insert(input.node, false);
                    stack.push((input.node, 0));
                }
                continue;
            }

            stack.pop();
            let hit = reaches.get(&id).copied().unwrap_or(false)
                || node
                    .inputs
                    .iter()
                    .any(|i| reaches.get(&i.node).copied().unwrap_or(false));
            reaches.insert(id, hit);
            if hit && node.op.is_control_flow() {
                return Err(GraphError::NoGradient {
                    op: node.op.type_name().to_string(),
                });
            }
            if hit {
                order.push(Visit {
                    id,
                    op: node.op.clone(),
                    inputs: node.inputs.clone(),
                    num_outputs: node.num_outputs(),
                });
            }
        }
    }

    Ok(order)
}
