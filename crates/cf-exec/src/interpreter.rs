//! Tagged-token interpreter for graphs with loops.
//!
//! Every token carries a tag: the stack of iteration indices of the frames it
//! lives in. Enter pushes `0`, NextIteration bumps the innermost index, Exit
//! pops it. A node fires once per tag at which all of its inputs are present;
//! inputs from enclosing regions are found by looking up shorter prefixes of
//! the tag.
//!
//! Switch emits a live token on the taken branch and a dead one on the other.
//! Dead tokens flow through ordinary ops (and through control inputs) so every
//! node in the untaken branch completes; NextIteration and Exit drop them. That
//! is what stops a loop: the last condition routes the values to Exit and
//! nothing reaches NextIteration.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};

use cf_core::NodeId;
use cf_graph::{Consumers, Graph, Node, Op, Output, Value, validate};
use tracing::{debug, trace};

use crate::error::{ExecError, ExecResult};
use crate::kernels;

/// Iteration indices of the frames a token belongs to, outermost first.
pub type Tag = Vec<u32>;

/// The content of one edge at one tag.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Token {
    Live(Value),
    /// Produced on the untaken side of a Switch.
    Dead,
}

impl Token {
    pub fn live(self) -> Option<Value> {
        match self {
            Token::Live(v) => Some(v),
            Token::Dead => None,
        }
    }

    pub fn is_dead(self) -> bool {
        matches!(self, Token::Dead)
    }
}

/// Interpreter limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecOptions {
    /// Largest iteration index any frame may reach.
    pub max_iterations: u32,
}

impl Default for ExecOptions {
    fn default() -> Self {
        Self {
            max_iterations: 10_000,
        }
    }
}

/// Runs a validated graph to quiescence.
#[derive(Debug)]
pub struct Interpreter<'g> {
    graph: &'g Graph,
    consumers: Consumers,
    options: ExecOptions,
}

impl<'g> Interpreter<'g> {
    /// Fails if the graph is poisoned, has unfilled reservations, or has a
    /// cycle that is not a loop back-edge.
    pub fn new(graph: &'g Graph) -> ExecResult<Self> {
        validate(graph)?;
        Ok(Self {
            graph,
            consumers: Consumers::from_graph(graph),
            options: ExecOptions::default(),
        })
    }

    pub fn with_options(mut self, options: ExecOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> ExecOptions {
        self.options
    }

    /// Fire nodes until no more can fire.
    pub fn run(&self) -> ExecResult<Execution> {
        let mut run = Run::new(self);
        for node in self.graph.nodes() {
            if node.inputs.is_empty() && node.control_inputs.is_empty() {
                run.queue.push_back((node.id, Tag::new()));
            }
        }
        debug!(nodes = self.graph.node_count(), "execution started");

        while let Some((id, tag)) = run.queue.pop_front() {
            if run.fired.contains(&(id, tag.clone())) {
                continue;
            }
            let Some(node) = self.graph.node(id) else {
                continue;
            };
            run.try_fire(node, tag)?;
        }

        debug!(activations = run.activations, "execution finished");
        Ok(Execution {
            tokens: run.tokens,
            activations: run.activations,
        })
    }
}

/// Every token produced by one run.
#[derive(Debug, Clone)]
pub struct Execution {
    tokens: HashMap<Output, BTreeMap<Tag, Token>>,
    activations: usize,
}

impl Execution {
    /// Token on `output` at exactly `tag`.
    pub fn token(&self, output: Output, tag: &[u32]) -> Option<Token> {
        self.tokens.get(&output)?.get(tag).copied()
    }

    /// Live value of an output in the root region (outside every loop).
    pub fn value(&self, output: Output) -> Option<Value> {
        self.token(output, &[])?.live()
    }

    /// All tokens an output produced, ordered by tag.
    pub fn trace(&self, output: Output) -> Vec<(Tag, Token)> {
        self.tokens
            .get(&output)
            .map(|by_tag| by_tag.iter().map(|(t, tok)| (t.clone(), *tok)).collect())
            .unwrap_or_default()
    }

    /// Live values of an output, ordered by tag.
    pub fn live_values(&self, output: Output) -> Vec<Value> {
        self.trace(output)
            .into_iter()
            .filter_map(|(_, tok)| tok.live())
            .collect()
    }

    /// Number of node activations.
    pub fn activations(&self) -> usize {
        self.activations
    }
}

struct Run<'a, 'g> {
    interp: &'a Interpreter<'g>,
    tokens: HashMap<Output, BTreeMap<Tag, Token>>,
    /// Tags at which some input of a node has arrived.
    seen: HashMap<NodeId, BTreeSet<Tag>>,
    fired: HashSet<(NodeId, Tag)>,
    queue: VecDeque<(NodeId, Tag)>,
    activations: usize,
}

impl<'a, 'g> Run<'a, 'g> {
    fn new(interp: &'a Interpreter<'g>) -> Self {
        Self {
            interp,
            tokens: HashMap::new(),
            seen: HashMap::new(),
            fired: HashSet::new(),
            queue: VecDeque::new(),
            activations: 0,
        }
    }

    /// Token visible at `tag`: the exact tag, else the longest enclosing one.
    fn lookup(&self, output: Output, tag: &[u32]) -> Option<Token> {
        let by_tag = self.tokens.get(&output)?;
        (0..=tag.len())
            .rev()
            .find_map(|len| by_tag.get(&tag[..len]).copied())
    }

    fn lookup_all(&self, outputs: &[Output], tag: &[u32]) -> Option<Vec<Token>> {
        outputs.iter().map(|&o| self.lookup(o, tag)).collect()
    }

    fn emit(&mut self, output: Output, tag: Tag, token: Token) {
        trace!(%output, ?tag, ?token, "emit");
        for &consumer in self.interp.consumers.of(output.node) {
            let seen = self.seen.entry(consumer).or_default();
            seen.insert(tag.clone());
            // Extensions of `tag` sort directly after it.
            for t in seen
                .range(tag.clone()..)
                .take_while(|t| t.starts_with(&tag))
            {
                self.queue.push_back((consumer, t.clone()));
            }
        }
        self.tokens.entry(output).or_default().insert(tag, token);
    }

    fn emit_all(&mut self, node: &Node, tag: &Tag, tokens: Vec<Token>) {
        for (i, token) in tokens.into_iter().enumerate() {
            self.emit(node.output(i as u32), tag.clone(), token);
        }
    }

    fn try_fire(&mut self, node: &Node, tag: Tag) -> ExecResult<()> {
        let Some(control) = self.lookup_all(&node.control_inputs, &tag) else {
            return Ok(());
        };
        let control_dead = control.iter().any(|t| t.is_dead());

        let outcome = match &node.op {
            Op::Merge => self.merge(node, &tag, control_dead),
            _ => self
                .lookup_all(&node.inputs, &tag)
                .map(|inputs| (inputs, control_dead)),
        };
        let Some((inputs, dead)) = outcome.map(|(inputs, control_dead)| {
            let dead = control_dead || inputs.iter().any(|t| t.is_dead());
            (inputs, dead)
        }) else {
            return Ok(());
        };

        self.fired.insert((node.id, tag.clone()));
        self.activations += 1;
        trace!(node = %node.name, ?tag, dead, "fire");

        match &node.op {
            Op::Enter { .. } => {
                let mut inner = tag;
                inner.push(0);
                let token = if dead { Token::Dead } else { inputs[0] };
                self.emit(node.output(0), inner, token);
            }
            Op::NextIteration => {
                if dead {
                    return Ok(());
                }
                let next = self.advance(node, tag)?;
                self.emit(node.output(0), next, inputs[0]);
            }
            Op::Exit => {
                if dead {
                    return Ok(());
                }
                let mut outer = tag;
                if outer.pop().is_none() {
                    return Err(not_in_frame(node));
                }
                self.emit(node.output(0), outer, inputs[0]);
            }
            Op::Merge => {
                if dead {
                    self.emit_all(node, &tag, vec![Token::Dead; 2]);
                } else {
                    // merge() returns [chosen value, Int index].
                    self.emit_all(node, &tag, inputs);
                }
            }
            Op::Switch => {
                let out = if dead {
                    vec![Token::Dead, Token::Dead]
                } else {
                    let taken = switch_predicate(node, inputs[1])?;
                    if taken {
                        vec![Token::Dead, inputs[0]]
                    } else {
                        vec![inputs[0], Token::Dead]
                    }
                };
                self.emit_all(node, &tag, out);
            }
            _ => {
                let out = if dead {
                    vec![Token::Dead; node.num_outputs()]
                } else {
                    let args: Vec<Value> = inputs.iter().filter_map(|t| t.live()).collect();
                    vec![Token::Live(kernels::eval(node, &args)?)]
                };
                self.emit_all(node, &tag, out);
            }
        }
        Ok(())
    }

    /// Pick a Merge input; returns `[value, index]` tokens.
    fn merge(&self, node: &Node, tag: &[u32], control_dead: bool) -> Option<(Vec<Token>, bool)> {
        if self.is_loop_merge(node) {
            // Iteration 0 reads the Enter value, later ones the back-edge.
            let slot = match tag.last() {
                Some(&k) if k > 0 => 1,
                _ => 0,
            };
            let token = self.lookup(node.inputs[slot], tag)?;
            return Some((vec![token, Token::Live(Value::Int(slot as i64))], control_dead));
        }

        let inputs = self.lookup_all(&node.inputs, tag)?;
        let picked = inputs
            .iter()
            .enumerate()
            .find_map(|(i, t)| t.live().map(|v| (i, v)));
        Some(match picked {
            Some((i, v)) => (
                vec![Token::Live(v), Token::Live(Value::Int(i as i64))],
                control_dead,
            ),
            None => (vec![Token::Dead, Token::Dead], true),
        })
    }

    fn is_loop_merge(&self, node: &Node) -> bool {
        node.inputs.len() == 2
            && self
                .interp
                .graph
                .node(node.inputs[1].node)
                .is_some_and(|n| matches!(n.op, Op::NextIteration))
    }

    fn advance(&self, node: &Node, mut tag: Tag) -> ExecResult<Tag> {
        let limit = self.interp.options.max_iterations;
        let Some(last) = tag.last_mut() else {
            return Err(not_in_frame(node));
        };
        if *last >= limit {
            return Err(ExecError::IterationLimit {
                node: node.name.clone(),
                limit,
            });
        }
        *last += 1;
        Ok(tag)
    }
}

fn switch_predicate(node: &Node, pred: Token) -> ExecResult<bool> {
    match pred.live() {
        Some(Value::Bool(b)) => Ok(b),
        other => Err(ExecError::TypeMismatch {
            node: node.name.clone(),
            op: node.op.type_name().to_string(),
            actual: other.map_or_else(|| "dead".to_string(), |v| v.dtype().to_string()),
        }),
    }
}

fn not_in_frame(node: &Node) -> ExecError {
    ExecError::NotInFrame {
        node: node.name.clone(),
        op: node.op.type_name().to_string(),
    }
}
