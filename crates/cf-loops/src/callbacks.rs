//! Strategy traits for the condition and body subgraphs of a loop.

use cf_graph::{GraphResult, Output, Scope};

/// Builds a loop's condition subgraph.
///
/// Receives the Merge outputs of the current iteration and must return a single
/// `bool` value. Nodes created through `scope` carry a control dependency on the
/// first Merge so they run inside the loop frame.
pub trait CondFn {
    fn build(&self, scope: &mut Scope<'_>, inputs: &[Output]) -> GraphResult<Output>;
}

/// Builds a loop's body subgraph.
///
/// Receives the Switch-true outputs and must return one value per loop-carried
/// value, with matching types.
pub trait BodyFn {
    fn build(&self, scope: &mut Scope<'_>, inputs: &[Output]) -> GraphResult<Vec<Output>>;
}

/// Adapter turning a closure into a [`CondFn`]; see [`cond_fn`].
pub struct CondClosure<F>(F);

/// Adapter turning a closure into a [`BodyFn`]; see [`body_fn`].
pub struct BodyClosure<F>(F);

/// Wrap a closure as a condition strategy.
pub fn cond_fn<F>(f: F) -> CondClosure<F>
where
    F: Fn(&mut Scope<'_>, &[Output]) -> GraphResult<Output>,
{
    CondClosure(f)
}

/// Wrap a closure as a body strategy.
pub fn body_fn<F>(f: F) -> BodyClosure<F>
where
    F: Fn(&mut Scope<'_>, &[Output]) -> GraphResult<Vec<Output>>,
{
    BodyClosure(f)
}

impl<F> CondFn for CondClosure<F>
where
    F: Fn(&mut Scope<'_>, &[Output]) -> GraphResult<Output>,
{
    fn build(&self, scope: &mut Scope<'_>, inputs: &[Output]) -> GraphResult<Output> {
        (self.0)(scope, inputs)
    }
}

impl<F> BodyFn for BodyClosure<F>
where
    F: Fn(&mut Scope<'_>, &[Output]) -> GraphResult<Vec<Output>>,
{
    fn build(&self, scope: &mut Scope<'_>, inputs: &[Output]) -> GraphResult<Vec<Output>> {
        (self.0)(scope, inputs)
    }
}
