//! Gradient synthesis for recorded loops.
//!
//! Differentiating a loop takes three more loops, all in the original frame:
//!
//! 1. a forward counter that runs in lockstep with the original loop and
//!    exits with the iteration count N,
//! 2. a backward counter that counts N down to zero; its condition is true for
//!    exactly the first N evaluations,
//! 3. a gradient loop that iterates on that condition and applies the body's
//!    gradient once per forward iteration.
//!
//! Loop contexts handed to these functions are owned copies: they describe the
//! graph that `scope` is mutating.

use cf_core::LoopContextId;
use cf_graph::{GraphError, GraphResult, LoopContext, Output, Scope, ops};
use tracing::debug;

use crate::callbacks::{BodyFn, CondFn};
use crate::symbolic::SymbolicGradients;
use crate::while_loop::build_while_loop;

/// Condition value of a backward counter loop.
///
/// Only meaningful as the condition of a gradient loop in the same frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackpropPredicate {
    pub output: Output,
    pub frame_name: String,
}

/// Everything [`add_while_gradients`] built.
#[derive(Debug, Clone, PartialEq)]
pub struct WhileGradients {
    /// Forward iteration count.
    pub count: Output,
    pub predicate: BackpropPredicate,
    /// Gradients w.r.t. the loop inputs, one per loop-carried value.
    pub grad_outputs: Vec<Output>,
}

/// Condition that reuses an existing loop's condition value.
struct ExistingCondition(Output);

impl CondFn for ExistingCondition {
    fn build(&self, _: &mut Scope<'_>, _: &[Output]) -> GraphResult<Output> {
        Ok(self.0)
    }
}

struct Increment;

impl BodyFn for Increment {
    fn build(&self, scope: &mut Scope<'_>, inputs: &[Output]) -> GraphResult<Vec<Output>> {
        let one = ops::scalar_like(scope, inputs[0], 1)?;
        Ok(vec![ops::add(scope, inputs[0], one)?])
    }
}

struct Positive;

impl CondFn for Positive {
    fn build(&self, scope: &mut Scope<'_>, inputs: &[Output]) -> GraphResult<Output> {
        let zero = ops::scalar_like(scope, inputs[0], 0)?;
        ops::greater(scope, inputs[0], zero)
    }
}

struct Decrement;

impl BodyFn for Decrement {
    fn build(&self, scope: &mut Scope<'_>, inputs: &[Output]) -> GraphResult<Vec<Output>> {
        let one = ops::scalar_like(scope, inputs[0], 1)?;
        Ok(vec![ops::sub(scope, inputs[0], one)?])
    }
}

/// Body gradient of the forward loop, evaluated on the gradient loop's values.
struct BodyGradient<'a> {
    body_inputs: &'a [Output],
    body_outputs: &'a [Output],
    grads: &'a dyn SymbolicGradients,
}

impl BodyFn for BodyGradient<'_> {
    fn build(&self, scope: &mut Scope<'_>, inputs: &[Output]) -> GraphResult<Vec<Output>> {
        self.grads
            .add_gradients(scope, self.body_outputs, self.body_inputs, inputs)
    }
}

/// Count the iterations of the loop described by `ctx`.
///
/// Builds `i = 0; while <ctx's condition>: i += 1` in the same frame and
/// returns the Exit value.
pub fn add_forward_loop_counter(ctx: &LoopContext, scope: &mut Scope<'_>) -> GraphResult<Output> {
    let zero = ops::constant(scope, 0_i64)?;
    let counter = build_while_loop(
        scope,
        &[zero],
        &ExistingCondition(ctx.cond_output()),
        &Increment,
        ctx.frame_name(),
        false,
    )?;
    Ok(counter.outputs[0])
}

/// Build `while n > 0: n -= 1` in the loop's frame and return its condition.
pub fn add_backprop_loop_counter(
    ctx: &LoopContext,
    n: Output,
    scope: &mut Scope<'_>,
) -> GraphResult<BackpropPredicate> {
    let counter = build_while_loop(scope, &[n], &Positive, &Decrement, ctx.frame_name(), false)?;
    Ok(BackpropPredicate {
        output: counter.cond_output,
        frame_name: ctx.frame_name().to_string(),
    })
}

/// Build the loop that back-propagates `grad_inputs` through every iteration.
///
/// `grad_inputs[i]` is the gradient of the loop's i-th Exit value. Returns the
/// gradients w.r.t. the loop's inputs.
pub fn add_while_gradient_loop(
    ctx: &LoopContext,
    grad_inputs: &[Output],
    pred: &BackpropPredicate,
    scope: &mut Scope<'_>,
    grads: &dyn SymbolicGradients,
) -> GraphResult<Vec<Output>> {
    scope.status()?;
    let n = ctx.body_outputs().len();
    if grad_inputs.len() != n || ctx.body_inputs().len() != n {
        return Err(scope.fail(GraphError::InvalidArgument(format!(
            "loop '{}' has {} body inputs and {n} body outputs, got {} gradients",
            ctx.frame_name(),
            ctx.body_inputs().len(),
            grad_inputs.len()
        ))));
    }
    if pred.frame_name != ctx.frame_name() {
        return Err(scope.fail(GraphError::InvalidArgument(format!(
            "backprop predicate belongs to frame '{}', not '{}'",
            pred.frame_name,
            ctx.frame_name()
        ))));
    }

    let mut region = scope.sub_scope("while");
    let body = BodyGradient {
        body_inputs: ctx.body_inputs(),
        body_outputs: ctx.body_outputs(),
        grads,
    };
    let grad_loop = build_while_loop(
        &mut region,
        grad_inputs,
        &ExistingCondition(pred.output),
        &body,
        ctx.frame_name(),
        false,
    )?;
    Ok(grad_loop.outputs)
}

/// Gradients of a recorded loop w.r.t. its inputs, given the gradients of its
/// Exit values.
pub fn add_while_gradients(
    ctx: LoopContextId,
    grad_inputs: &[Output],
    scope: &mut Scope<'_>,
    grads: &dyn SymbolicGradients,
) -> GraphResult<WhileGradients> {
    scope.status()?;
    let ctx = match scope.graph().loop_context(ctx) {
        Some(found) => found.clone(),
        None => return Err(scope.fail(GraphError::UnknownLoopContext { id: ctx })),
    };
    debug!(frame = ctx.frame_name(), n = grad_inputs.len(), "building loop gradients");

    let count = add_forward_loop_counter(&ctx, scope)?;
    let predicate = add_backprop_loop_counter(&ctx, count, scope)?;
    let grad_outputs = add_while_gradient_loop(&ctx, grad_inputs, &predicate, scope, grads)?;
    Ok(WhileGradients {
        count,
        predicate,
        grad_outputs,
    })
}
