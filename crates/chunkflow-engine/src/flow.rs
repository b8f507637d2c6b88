//! Job definitions: a static graph of steps, decision points, and
//! parallel splits.
//!
//! The transition table is built once at definition time and never
//! changes: `(current node, outcome) -> next node | terminal`.
//! Branching is limited to linear sequences, deciders, and split/join;
//! this is not a general DAG engine.

use std::collections::HashMap;
use std::sync::Arc;

use chunkflow_types::{BatchStatus, JobExecution, StepExecution};

use crate::partition::PartitionedStep;
use crate::step::Step;

/// Named outcome of a node, driving the next transition.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Outcome(String);

impl Outcome {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    #[must_use]
    pub fn completed() -> Self {
        Self::new("COMPLETED")
    }

    #[must_use]
    pub fn failed() -> Self {
        Self::new("FAILED")
    }

    #[must_use]
    pub fn stopped() -> Self {
        Self::new("STOPPED")
    }

    /// Outcome matching a step's terminal status.
    #[must_use]
    pub fn from_status(status: BatchStatus) -> Self {
        match status {
            BatchStatus::Completed => Self::completed(),
            BatchStatus::Stopped => Self::stopped(),
            _ => Self::failed(),
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Pure function selecting an outcome from execution snapshots.
pub type Decider =
    Arc<dyn Fn(&JobExecution, Option<&StepExecution>) -> Outcome + Send + Sync>;

/// Handle to a node within one job definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub(crate) usize);

/// A named linear sequence of steps; the unit of parallelism in a
/// split.
#[derive(Clone)]
pub struct Flow {
    pub name: String,
    pub steps: Vec<Arc<dyn Step>>,
}

impl Flow {
    #[must_use]
    pub fn new(name: impl Into<String>, steps: Vec<Arc<dyn Step>>) -> Self {
        Self {
            name: name.into(),
            steps,
        }
    }
}

/// One node in the job graph.
pub enum FlowNode {
    Step(Arc<dyn Step>),
    Partitioned(Arc<PartitionedStep>),
    Decision { name: String, decider: Decider },
    Split { name: String, flows: Vec<Flow> },
}

impl FlowNode {
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Step(step) => step.name(),
            Self::Partitioned(step) => step.name(),
            Self::Decision { name, .. } | Self::Split { name, .. } => name,
        }
    }
}

/// Where a transition leads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    To(NodeId),
    End(BatchStatus),
}

/// Immutable job definition: the node list, the start node, and the
/// static transition table.
pub struct JobDefinition {
    name: String,
    restartable_when_complete: bool,
    required_parameters: Vec<String>,
    nodes: Vec<FlowNode>,
    start: NodeId,
    transitions: HashMap<(usize, Outcome), Transition>,
}

impl std::fmt::Debug for JobDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobDefinition")
            .field("name", &self.name)
            .field("restartable_when_complete", &self.restartable_when_complete)
            .field("required_parameters", &self.required_parameters)
            .field("nodes", &self.nodes.len())
            .field("start", &self.start)
            .field("transitions", &self.transitions.len())
            .finish()
    }
}

impl JobDefinition {
    #[must_use]
    pub fn builder(name: impl Into<String>) -> JobBuilder {
        JobBuilder::new(name)
    }

    /// Convenience for the common shape: steps in order, each feeding
    /// the next on success, the last ending the job `Completed`.
    ///
    /// # Errors
    ///
    /// Returns an error if `steps` is empty.
    pub fn linear(
        name: impl Into<String>,
        steps: Vec<Arc<dyn Step>>,
    ) -> anyhow::Result<Self> {
        let mut builder = JobBuilder::new(name);
        let mut previous: Option<NodeId> = None;
        for step in steps {
            let node = builder.step(step);
            if let Some(prev) = previous {
                builder.on_completed(prev, node);
            }
            previous = Some(node);
        }
        if let Some(last) = previous {
            builder.end(last, Outcome::completed(), BatchStatus::Completed);
        }
        builder.build()
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn restartable_when_complete(&self) -> bool {
        self.restartable_when_complete
    }

    #[must_use]
    pub fn required_parameters(&self) -> &[String] {
        &self.required_parameters
    }

    #[must_use]
    pub fn start(&self) -> NodeId {
        self.start
    }

    #[must_use]
    pub fn node(&self, id: NodeId) -> &FlowNode {
        &self.nodes[id.0]
    }

    #[must_use]
    pub fn transition_for(&self, from: NodeId, outcome: &Outcome) -> Option<Transition> {
        self.transitions.get(&(from.0, outcome.clone())).copied()
    }
}

/// Builder assembling a [`JobDefinition`]'s nodes and transition
/// table. `build` validates the graph before handing it out.
pub struct JobBuilder {
    name: String,
    restartable_when_complete: bool,
    required_parameters: Vec<String>,
    nodes: Vec<FlowNode>,
    start: Option<NodeId>,
    transitions: HashMap<(usize, Outcome), Transition>,
}

impl JobBuilder {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            restartable_when_complete: false,
            required_parameters: Vec::new(),
            nodes: Vec::new(),
            start: None,
            transitions: HashMap::new(),
        }
    }

    /// Allow relaunching a completed instance with identical
    /// parameters.
    pub fn restartable_when_complete(&mut self) -> &mut Self {
        self.restartable_when_complete = true;
        self
    }

    /// Launches missing this parameter fail validation.
    pub fn require_parameter(&mut self, key: impl Into<String>) -> &mut Self {
        self.required_parameters.push(key.into());
        self
    }

    fn add_node(&mut self, node: FlowNode) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(node);
        if self.start.is_none() {
            self.start = Some(id);
        }
        id
    }

    /// Add a step node. The first node added becomes the start node.
    pub fn step(&mut self, step: Arc<dyn Step>) -> NodeId {
        self.add_node(FlowNode::Step(step))
    }

    /// Add a partitioned step node.
    pub fn partitioned(&mut self, step: Arc<PartitionedStep>) -> NodeId {
        self.add_node(FlowNode::Partitioned(step))
    }

    /// Add a decision node evaluating the previous step's execution.
    pub fn decision(
        &mut self,
        name: impl Into<String>,
        decider: impl Fn(&JobExecution, Option<&StepExecution>) -> Outcome + Send + Sync + 'static,
    ) -> NodeId {
        self.add_node(FlowNode::Decision {
            name: name.into(),
            decider: Arc::new(decider),
        })
    }

    /// Add a parallel split of independent flows, joined back into one
    /// outcome before continuing.
    pub fn split(&mut self, name: impl Into<String>, flows: Vec<Flow>) -> NodeId {
        self.add_node(FlowNode::Split {
            name: name.into(),
            flows,
        })
    }

    pub fn transition(&mut self, from: NodeId, outcome: Outcome, to: NodeId) -> &mut Self {
        self.transitions.insert((from.0, outcome), Transition::To(to));
        self
    }

    /// Shorthand for the success edge.
    pub fn on_completed(&mut self, from: NodeId, to: NodeId) -> &mut Self {
        self.transition(from, Outcome::completed(), to)
    }

    pub fn end(&mut self, from: NodeId, outcome: Outcome, status: BatchStatus) -> &mut Self {
        self.transitions
            .insert((from.0, outcome), Transition::End(status));
        self
    }

    /// Validate and freeze the definition.
    ///
    /// # Errors
    ///
    /// Returns an error listing every structural problem found: no
    /// start node, a non-decision node without a success route, or a
    /// decision node with no outgoing transitions.
    pub fn build(self) -> anyhow::Result<JobDefinition> {
        let mut errors = Vec::new();

        let Some(start) = self.start else {
            anyhow::bail!("job '{}' has no nodes", self.name);
        };

        for (index, node) in self.nodes.iter().enumerate() {
            let outgoing = self
                .transitions
                .keys()
                .filter(|(from, _)| *from == index)
                .count();
            match node {
                FlowNode::Decision { name, .. } => {
                    if outgoing == 0 {
                        errors.push(format!("decision '{name}' has no outgoing transitions"));
                    }
                }
                _ => {
                    if !self
                        .transitions
                        .contains_key(&(index, Outcome::completed()))
                    {
                        errors.push(format!(
                            "node '{}' has no COMPLETED transition",
                            node.name()
                        ));
                    }
                }
            }
        }

        if !errors.is_empty() {
            anyhow::bail!(
                "invalid job definition '{}': {}",
                self.name,
                errors.join("; ")
            );
        }

        Ok(JobDefinition {
            name: self.name,
            restartable_when_complete: self.restartable_when_complete,
            required_parameters: self.required_parameters,
            nodes: self.nodes,
            start,
            transitions: self.transitions,
        })
    }
}
