//! Build, run and describe the step-loop demo graph.

use cf_core::{Real, nearly_equal};
use cf_exec::{ExecOptions, Interpreter};
use cf_graph::{Graph, GraphError, GraphResult, Scope, Value, loop_shape, ops, validate};
use cf_loops::{
    GradientRegistry, WhileGradients, WhileLoop, add_while_gradients, body_fn, build_while_loop,
    cond_fn,
};
use tracing::info;

use crate::config::DemoConfig;
use crate::error::{CliError, CliResult};

/// The demo loop and its gradient loops, in one graph.
pub struct DemoGraph {
    pub graph: Graph,
    pub forward: WhileLoop,
    pub gradients: WhileGradients,
}

pub fn build(config: &DemoConfig) -> GraphResult<DemoGraph> {
    let mut graph = Graph::new();
    let (forward, gradients) = {
        let mut root = Scope::new_root(&mut graph);
        let x = ops::constant(&mut root, config.start)?;
        let (limit, step) = (config.limit, config.step);
        let forward = build_while_loop(
            &mut root,
            &[x],
            &cond_fn(move |s, xs| {
                let limit = ops::constant(s, limit)?;
                ops::less(s, xs[0], limit)
            }),
            &body_fn(move |s, xs| {
                let step = ops::constant(s, step)?;
                Ok(vec![ops::add(s, xs[0], step)?])
            }),
            &config.frame_name,
            true,
        )?;
        let ctx = forward.context.ok_or_else(|| {
            GraphError::InvalidArgument("demo loop recorded no context".into())
        })?;

        let g = ops::constant(&mut root, config.upstream_gradient)?;
        let mut grad_scope = root.sub_scope("gradients");
        let gradients =
            add_while_gradients(ctx, &[g], &mut grad_scope, &GradientRegistry::default())?;
        (forward, gradients)
    };
    validate(&graph)?;
    Ok(DemoGraph {
        graph,
        forward,
        gradients,
    })
}

#[derive(Debug, Clone, PartialEq)]
pub struct DemoReport {
    pub final_value: Real,
    pub iterations: i64,
    /// Backward-counter condition, one entry per evaluation.
    pub predicates: Vec<bool>,
    pub gradient: Real,
    /// `upstream_gradient`: each step adds a constant, so d(out)/d(start) is 1.
    pub expected_gradient: Real,
    pub gradient_ok: bool,
}

pub fn run(demo: &DemoGraph, config: &DemoConfig) -> CliResult<DemoReport> {
    let exec = Interpreter::new(&demo.graph)?
        .with_options(ExecOptions {
            max_iterations: config.max_iterations,
        })
        .run()?;

    let final_value = float(exec.value(demo.forward.outputs[0]), "loop output")?;
    let iterations = exec
        .value(demo.gradients.count)
        .and_then(|v| v.as_int())
        .ok_or(CliError::MissingValue {
            what: "iteration count",
        })?;
    let predicates = exec
        .live_values(demo.gradients.predicate.output)
        .iter()
        .filter_map(Value::as_bool)
        .collect();
    let gradient = float(exec.value(demo.gradients.grad_outputs[0]), "gradient")?;

    let expected_gradient = config.upstream_gradient;
    let gradient_ok = nearly_equal(gradient, expected_gradient, config.tolerances);
    info!(iterations, gradient, gradient_ok, "demo finished");

    Ok(DemoReport {
        final_value,
        iterations,
        predicates,
        gradient,
        expected_gradient,
        gradient_ok,
    })
}

fn float(value: Option<Value>, what: &'static str) -> CliResult<Real> {
    value
        .and_then(|v| v.as_float())
        .ok_or(CliError::MissingValue { what })
}

/// Node listing and loop summary, one line per entry.
pub fn describe(graph: &Graph) -> Vec<String> {
    let mut lines: Vec<String> = graph
        .nodes()
        .map(|node| {
            let inputs: Vec<String> = node.inputs.iter().map(ToString::to_string).collect();
            let mut line = format!(
                "{} {} = {}({})",
                node.id,
                node.name,
                node.op.type_name(),
                inputs.join(", ")
            );
            if !node.control_inputs.is_empty() {
                let ctrl: Vec<String> = node.control_inputs.iter().map(ToString::to_string).collect();
                line.push_str(&format!(" ^[{}]", ctrl.join(", ")));
            }
            line
        })
        .collect();

    for (id, ctx) in graph.loop_contexts() {
        let summary = match loop_shape(graph, id) {
            Ok(shape) => format!(
                "{id} frame '{}': {} loop value(s), condition {}",
                ctx.frame_name(),
                shape.num_loop_vars(),
                shape.cond
            ),
            Err(err) => format!("{id} frame '{}': {err}", ctx.frame_name()),
        };
        lines.push(summary);
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_demo_matches_hand_computation() {
        let config = DemoConfig::default();
        let demo = build(&config).unwrap();
        let report = run(&demo, &config).unwrap();

        assert_eq!(report.final_value, 6.0);
        assert_eq!(report.iterations, 3);
        assert_eq!(report.predicates, vec![true, true, true, false]);
        assert_eq!(report.gradient, 1.0);
        assert!(report.gradient_ok);
    }

    #[test]
    fn upstream_gradient_is_carried() {
        let config = DemoConfig {
            upstream_gradient: 0.25,
            limit: 1.0,
            ..DemoConfig::default()
        };
        let report = run(&build(&config).unwrap(), &config).unwrap();
        assert_eq!(report.iterations, 1);
        assert_eq!(report.gradient, 0.25);
    }

    #[test]
    fn describe_lists_nodes_and_loops() {
        let demo = build(&DemoConfig::default()).unwrap();
        let lines = describe(&demo.graph);
        assert!(lines.iter().any(|l| l.contains("NextIteration")));
        assert!(lines.iter().any(|l| l.contains("frame 'step_loop': 1 loop value(s)")));
    }

    #[test]
    fn iteration_limit_from_config() {
        let config = DemoConfig {
            limit: 100.0,
            step: 1.0,
            max_iterations: 5,
            ..DemoConfig::default()
        };
        let demo = build(&config).unwrap();
        assert!(matches!(run(&demo, &config), Err(CliError::Exec(_))));
    }
}
