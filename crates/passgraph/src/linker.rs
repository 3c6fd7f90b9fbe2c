//! Name-based input resolution and execution ordering
//!
//! Linking registers every source and then every stage output in a name table, resolves
//! each declared stage input against it, and derives the execution order from the resolved
//! stage-to-stage dependencies. Stages are applied only after the whole plan succeeds, so a
//! failed link leaves the previous bindings untouched.

use crate::{
    config::DuplicatePolicy,
    error::{Diagnostic, PipelineError},
    resource::{ResourceOwner, ResourceRef},
    source::Source,
    stage::Stage,
};
use std::{
    cmp::Reverse,
    collections::{BinaryHeap, HashMap},
};

/// Outcome of a successful link
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkReport {
    /// Stage names in the order they will execute; the last one is presented
    pub execution_order: Vec<String>,
    /// Configuration problems the pipeline continues with
    pub diagnostics: Vec<Diagnostic>,
    /// Indices into the linked stage list, parallel to `execution_order`
    pub(crate) order: Vec<usize>,
}

impl LinkReport {
    /// Name of the stage rendered into the destination target
    pub fn presented_stage(&self) -> Option<&str> {
        self.execution_order.last().map(String::as_str)
    }

    pub fn is_clean(&self) -> bool {
        self.diagnostics.is_empty()
    }

    /// `(stage, input)` pairs that were bound to the fallback texture
    pub fn unresolved_inputs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.diagnostics.iter().filter_map(|diagnostic| match diagnostic {
            Diagnostic::UnresolvedInput { stage, input } => Some((stage.as_str(), input.as_str())),
            _ => None,
        })
    }
}

/// A registered producer of a named resource
#[derive(Debug, Clone, PartialEq, Eq)]
struct TableEntry {
    target: ResourceRef,
    /// Index of the producing stage, `None` for sources
    stage_index: Option<usize>,
}

/// Mapping from resource names to the component that produces them
#[derive(Debug, Default)]
struct NameTable {
    entries: HashMap<String, TableEntry>,
}

impl NameTable {
    /// Registers a producer, applying the duplicate policy
    fn register(&mut self, entry: TableEntry, policy: DuplicatePolicy) -> Result<Option<Diagnostic>, PipelineError> {
        let name = entry.target.owner.name().to_string();

        match self.entries.get(&name) {
            None => {
                self.entries.insert(name, entry);
                Ok(None)
            }
            Some(_) if policy == DuplicatePolicy::Reject => Err(PipelineError::DuplicateName(name)),
            Some(previous) => {
                let diagnostic = Diagnostic::DuplicateName {
                    name: name.clone(),
                    previous: previous.target.owner.clone(),
                    replacement: entry.target.owner.clone(),
                };
                self.entries.insert(name, entry);
                Ok(Some(diagnostic))
            }
        }
    }

    fn resolve(&self, name: &str) -> Option<&TableEntry> {
        self.entries.get(name)
    }
}

/// Resolved bindings and order for a set of stages, before anything is applied
#[derive(Debug, Clone, PartialEq, Eq)]
struct LinkPlan {
    /// Per stage, each declared input with its resolved target
    bindings: Vec<Vec<(String, Option<ResourceRef>)>>,
    order: Vec<usize>,
    diagnostics: Vec<Diagnostic>,
}

/// Declared interface of one stage as seen by the planner
#[derive(Debug, Clone)]
struct StageInterface {
    output: ResourceRef,
    inputs: Vec<String>,
}

fn plan(sources: &[ResourceRef], stages: &[StageInterface], policy: DuplicatePolicy) -> Result<LinkPlan, PipelineError> {
    let mut table = NameTable::default();
    let mut diagnostics = Vec::new();

    let registrations = sources
        .iter()
        .map(|target| TableEntry { target: target.clone(), stage_index: None })
        .chain(stages.iter().enumerate().map(|(index, stage)| TableEntry {
            target: stage.output.clone(),
            stage_index: Some(index),
        }));
    for entry in registrations {
        if let Some(diagnostic) = table.register(entry, policy)? {
            tracing::warn!("{diagnostic}");
            diagnostics.push(diagnostic);
        }
    }

    let mut bindings = Vec::with_capacity(stages.len());
    let mut dependencies = vec![Vec::new(); stages.len()];

    for (index, stage) in stages.iter().enumerate() {
        let stage_name = stage.output.owner.name();
        let mut stage_bindings = Vec::with_capacity(stage.inputs.len());

        for input in &stage.inputs {
            let Some(entry) = table.resolve(input) else {
                let diagnostic = Diagnostic::UnresolvedInput {
                    stage: stage_name.to_string(),
                    input: input.clone(),
                };
                tracing::warn!(stage = stage_name, input = %input, "{diagnostic}");
                diagnostics.push(diagnostic);
                stage_bindings.push((input.clone(), None));
                continue;
            };

            tracing::debug!(stage = stage_name, input = %input, producer = %entry.target.owner, "resolved input");
            if let Some(producer) = entry.stage_index {
                if producer > index {
                    let diagnostic = Diagnostic::ForwardReference {
                        stage: stage_name.to_string(),
                        input: input.clone(),
                        producer: entry.target.owner.name().to_string(),
                    };
                    tracing::warn!(stage = stage_name, input = %input, "{diagnostic}");
                    diagnostics.push(diagnostic);
                }
                if !dependencies[index].contains(&producer) {
                    dependencies[index].push(producer);
                }
            }
            stage_bindings.push((input.clone(), Some(entry.target.clone())));
        }

        bindings.push(stage_bindings);
    }

    let order = topological_order(&dependencies).map_err(|cyclic| PipelineError::Cycle {
        stages: cyclic.into_iter().map(|index| stages[index].output.owner.name().to_string()).collect(),
    })?;

    Ok(LinkPlan { bindings, order, diagnostics })
}

/// Orders stages so every stage runs after the stages it reads from
///
/// `dependencies[i]` lists the stages stage `i` reads. Among stages that are ready at the
/// same time, the one supplied first runs first, so an already valid order is unchanged.
///
/// # Returns
/// The execution order, or the indices of the stages that could not be ordered because they
/// sit on or behind a cycle
fn topological_order(dependencies: &[Vec<usize>]) -> Result<Vec<usize>, Vec<usize>> {
    let count = dependencies.len();
    let mut pending = dependencies.iter().map(Vec::len).collect::<Vec<_>>();
    let mut dependents = vec![Vec::new(); count];
    for (stage, producers) in dependencies.iter().enumerate() {
        for &producer in producers {
            dependents[producer].push(stage);
        }
    }

    let mut ready = (0..count).filter(|&i| pending[i] == 0).map(Reverse).collect::<BinaryHeap<_>>();
    let mut order = Vec::with_capacity(count);

    while let Some(Reverse(stage)) = ready.pop() {
        order.push(stage);
        for &dependent in &dependents[stage] {
            pending[dependent] -= 1;
            if pending[dependent] == 0 {
                ready.push(Reverse(dependent));
            }
        }
    }

    if order.len() == count {
        Ok(order)
    } else {
        Err((0..count).filter(|&i| pending[i] > 0).collect())
    }
}

/// Resolves every stage's declared inputs against the sources and stage outputs
///
/// Sources are registered first, then stage outputs in list order. On success each stage's
/// bindings are replaced, so re-running with the same inputs yields the same bindings.
///
/// # Arguments
/// * `sources` - Host-fed inputs
/// * `stages` - Stages in the order supplied by the host
/// * `policy` - How duplicate names are handled
///
/// # Returns
/// The execution order and every diagnostic produced, or an error for rejected duplicates and
/// dependency cycles
pub fn link(sources: &[Source], stages: &mut [Stage], policy: DuplicatePolicy) -> Result<LinkReport, PipelineError> {
    let source_refs = sources
        .iter()
        .map(|source| ResourceRef {
            owner: ResourceOwner::Source(source.name().to_string()),
            id: source.resource().id(),
        })
        .collect::<Vec<_>>();
    let interfaces = stages
        .iter()
        .map(|stage| StageInterface {
            output: ResourceRef {
                owner: ResourceOwner::Stage(stage.name().to_string()),
                id: stage.output().id(),
            },
            inputs: stage.declared_inputs().map(str::to_string).collect(),
        })
        .collect::<Vec<_>>();

    let plan = plan(&source_refs, &interfaces, policy)?;

    for (stage, stage_bindings) in stages.iter_mut().zip(plan.bindings) {
        stage.clear_bindings();
        for (input, target) in stage_bindings {
            if let Some(target) = target {
                stage.bind_input(&input, target);
            }
        }
    }

    let execution_order = plan.order.iter().map(|&index| stages[index].name().to_string()).collect::<Vec<_>>();
    tracing::info!(
        sources = sources.len(),
        stages = stages.len(),
        diagnostics = plan.diagnostics.len(),
        order = ?execution_order,
        "linked pipeline"
    );

    Ok(LinkReport {
        execution_order,
        diagnostics: plan.diagnostics,
        order: plan.order,
    })
}
