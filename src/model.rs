//! A model ties a root shape, its node graph and a generation context
//! together. The selector matching work is done once here; every run
//! afterwards only walks the graph.
use std::collections::BTreeSet;
use std::sync::Arc;

use rayon::prelude::*;
use tracing::{debug, info};

use crate::context::{Binding, GenerationContext, Mode, Override};
use crate::engine::{Engine, GenerationListener, NoopListener};
use crate::error::{BuildError, GenerationError};
use crate::graph::{GraphBuilder, NodeGraph, NodeId, NodeKind, Slot, SubtypeRule};
use crate::random::{Random, derive_seed};
use crate::resolve::{BindingScope, resolve};
use crate::selector::{Selector, Specificity};
use crate::settings::Settings;
use crate::shape::{ConcreteShape, ShapeRegistry, TypeRef};
use crate::value::Value;

/// One produced instance and the seed that reproduces it.
#[derive(Debug, Clone, PartialEq)]
pub struct Generated {
    pub value: Value,
    pub seed: u64,
    /// Random draws consumed by the run.
    pub draws: u64,
}

/// Where an assigned destination reads its origin from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct AssignPlan {
    pub origin: NodeId,
    /// Lowest common ancestor of destination and origin.
    pub anchor: NodeId,
    /// Child of `anchor` on the way to `origin`.
    pub branch: NodeId,
    /// Field names from `branch` down to `origin`.
    pub path: Vec<String>,
}

/// Bindings that apply to one node, as indices into the context.
#[derive(Debug, Clone, Default)]
pub(crate) struct NodePlan {
    pub source: Option<usize>,
    pub callbacks: Vec<usize>,
    pub filters: Vec<usize>,
    pub nullable: bool,
    pub unique: bool,
    pub matched: Vec<usize>,
    pub assignment: Option<AssignPlan>,
}

#[derive(Debug)]
pub struct Model {
    registry: Arc<ShapeRegistry>,
    context: GenerationContext,
    root: ConcreteShape,
    graph: NodeGraph,
    plans: Vec<NodePlan>,
    /// Bindings satisfied at build time: applied subtypes and selectors
    /// that only reach positions a run never walks.
    settled: BTreeSet<usize>,
}

impl Model {
    pub fn new(registry: Arc<ShapeRegistry>, root: TypeRef, context: GenerationContext) -> Result<Self, BuildError> {
        registry.validate()?;
        context.settings.validate()?;

        let root = match root {
            TypeRef::Named { name, args } if args.is_empty() && !context.root_args.is_empty() => {
                TypeRef::Named { name, args: context.root_args.clone() }
            }
            other => other,
        };
        let root = resolve(&root, None, &BindingScope::empty())?;

        let rules = context
            .bindings
            .iter()
            .enumerate()
            .filter_map(|(index, binding)| match &binding.action {
                Override::Subtype(subtype) => Some(SubtypeRule {
                    index,
                    selector: binding.selector.clone(),
                    subtype: subtype.clone(),
                }),
                _ => None,
            })
            .collect();
        let mut builder = GraphBuilder::new(&registry, &context.settings)?.with_subtypes(rules);
        let graph = builder.build(&root)?;
        let mut settled = builder.subtype_hits().clone();

        let plans = plan_nodes(&graph, &context.bindings)?;
        settled.extend(unreachable_matches(&graph, &plans, &context.bindings));

        info!(
            root = %root,
            nodes = graph.len(),
            bindings = context.bindings.len(),
            "model built"
        );
        Ok(Self { registry, context, root, graph, plans, settled })
    }

    pub fn root(&self) -> &ConcreteShape {
        &self.root
    }

    pub fn graph(&self) -> &NodeGraph {
        &self.graph
    }

    pub fn registry(&self) -> &ShapeRegistry {
        &self.registry
    }

    pub fn context(&self) -> &GenerationContext {
        &self.context
    }

    pub fn settings(&self) -> &Settings {
        &self.context.settings
    }

    pub fn mode(&self) -> Mode {
        self.context.mode
    }

    pub(crate) fn plan(&self, id: NodeId) -> &NodePlan {
        &self.plans[id.0]
    }

    pub(crate) fn binding(&self, index: usize) -> &Binding {
        &self.context.bindings[index]
    }

    /// The seed used by [`Model::generate`]: the configured one, or a fresh
    /// one per call.
    fn initial_seed(&self) -> u64 {
        self.context.seed.unwrap_or_else(|| Random::with_entropy().seed())
    }

    pub fn generate(&self) -> Result<Generated, GenerationError> {
        self.generate_with_listener(&mut NoopListener)
    }

    pub fn generate_with_seed(&self, seed: u64) -> Result<Generated, GenerationError> {
        let (generated, used) = self.run(seed, &mut NoopListener)?;
        self.check_unmatched(&used, vec![generated]).map(|mut all| all.remove(0))
    }

    pub fn generate_with_listener(&self, listener: &mut dyn GenerationListener) -> Result<Generated, GenerationError> {
        let (generated, used) = self.run(self.initial_seed(), listener)?;
        self.check_unmatched(&used, vec![generated]).map(|mut all| all.remove(0))
    }

    /// `count` instances; each run after the first is seeded from the
    /// previous seed.
    pub fn generate_many(&self, count: usize) -> Result<Vec<Generated>, GenerationError> {
        let mut used = BTreeSet::new();
        let mut generated = Vec::with_capacity(count);
        let mut seed = self.initial_seed();
        for i in 0..count {
            if i > 0 {
                seed = derive_seed(seed);
            }
            let (instance, run_used) = self.run(seed, &mut NoopListener)?;
            used.extend(run_used);
            generated.push(instance);
        }
        self.check_unmatched(&used, generated)
    }

    /// Lazy, unbounded instances on the same seed chain as
    /// [`Model::generate_many`]. Each item is checked for unmatched
    /// selectors on its own.
    pub fn stream(&self) -> impl Iterator<Item = Result<Generated, GenerationError>> + '_ {
        std::iter::successors(Some(self.initial_seed()), |seed| Some(derive_seed(*seed)))
            .map(|seed| self.generate_with_seed(seed))
    }

    /// Same seeds and results as [`Model::generate_many`], with the runs
    /// spread over the rayon pool.
    pub fn generate_many_parallel(&self, count: usize) -> Result<Vec<Generated>, GenerationError> {
        let mut seeds = Vec::with_capacity(count);
        let mut seed = self.initial_seed();
        for i in 0..count {
            if i > 0 {
                seed = derive_seed(seed);
            }
            seeds.push(seed);
        }
        let runs = seeds
            .into_par_iter()
            .map(|seed| self.run(seed, &mut NoopListener))
            .collect::<Result<Vec<_>, _>>()?;

        let mut used = BTreeSet::new();
        let mut generated = Vec::with_capacity(count);
        for (instance, run_used) in runs {
            used.extend(run_used);
            generated.push(instance);
        }
        self.check_unmatched(&used, generated)
    }

    fn run(
        &self,
        seed: u64,
        listener: &mut dyn GenerationListener,
    ) -> Result<(Generated, BTreeSet<usize>), GenerationError> {
        let mut engine = Engine::new(self, seed, listener);
        let value = engine.run()?;
        let draws = engine.draws();
        let used = engine.into_used();
        debug!(seed, draws, "run finished");
        Ok((Generated { value, seed, draws }, used))
    }

    fn check_unmatched(&self, used: &BTreeSet<usize>, generated: Vec<Generated>) -> Result<Vec<Generated>, GenerationError> {
        if !self.context.settings.fail_on_unmatched_selectors {
            return Ok(generated);
        }
        let selectors: Vec<String> = self
            .context
            .bindings
            .iter()
            .enumerate()
            .filter(|(index, binding)| {
                !binding.selector.lenient && !used.contains(index) && !self.settled.contains(index)
            })
            .map(|(_, binding)| format!("{} -> {}", binding.selector, binding.action.name()))
            .collect();
        if selectors.is_empty() {
            Ok(generated)
        } else {
            Err(GenerationError::UnmatchedSelectors { selectors, generated })
        }
    }
}

fn plan_nodes(graph: &NodeGraph, bindings: &[Binding]) -> Result<Vec<NodePlan>, BuildError> {
    let mut plans = Vec::with_capacity(graph.len());
    for node in graph.nodes() {
        let position = node.position();
        let ancestry = graph.ancestry(node.id);
        let mut plan = NodePlan::default();
        let mut best: Option<(Specificity, bool, usize)> = None;

        for (index, binding) in bindings.iter().enumerate() {
            if !binding.selector.matches(&position, &ancestry) {
                continue;
            }
            plan.matched.push(index);
            match &binding.action {
                Override::OnComplete(_) => plan.callbacks.push(index),
                Override::Filter(_) => plan.filters.push(index),
                Override::Nullable => plan.nullable = true,
                Override::Unique => plan.unique = true,
                action if action.is_source() => {
                    let rank = (
                        binding.selector.specificity(),
                        matches!(action, Override::Ignore),
                        index,
                    );
                    if best.is_none_or(|current| rank > current) {
                        best = Some(rank);
                    }
                }
                // subtypes were applied while building
                _ => {}
            }
        }

        plan.source = best.map(|(_, _, index)| index);
        if let Some(index) = plan.source {
            if let Override::Assign(assignment) = &bindings[index].action {
                plan.assignment = Some(plan_assignment(graph, node.id, &assignment.origin)?);
            }
        }
        plans.push(plan);
    }
    Ok(plans)
}

fn plan_assignment(
    graph: &NodeGraph,
    destination: NodeId,
    origin: &Selector,
) -> Result<AssignPlan, BuildError> {
    let failure = |reason: String| BuildError::AssignmentOrigin { destination: graph.path(destination), reason };

    let mut dest_chain = graph.ancestors(destination);
    dest_chain.push(destination);

    let mut best: Option<(usize, NodeId, Vec<NodeId>)> = None;
    for node in graph.nodes() {
        let candidate = node.id;
        if graph.is_ancestor_or_self(candidate, destination) || graph.is_ancestor_or_self(destination, candidate) {
            continue;
        }
        if !origin.matches(&node.position(), &graph.ancestry(candidate)) {
            continue;
        }
        let mut chain = graph.ancestors(candidate);
        chain.push(candidate);
        let shared = dest_chain.iter().zip(&chain).take_while(|(a, b)| a == b).count();
        if best.as_ref().is_none_or(|(depth, _, _)| shared > *depth) {
            best = Some((shared, candidate, chain));
        }
    }

    let Some((shared, origin_id, chain)) = best else {
        return Err(failure(format!("origin {origin} matches no node outside the destination's own branch")));
    };
    let anchor = chain[shared - 1];
    if !matches!(graph.node(anchor).kind, NodeKind::Record { .. }) {
        return Err(failure(format!("origin {} is not reachable through a shared record", graph.path(origin_id))));
    }

    let below = &chain[shared..];
    let mut path = Vec::with_capacity(below.len());
    for id in below {
        match &graph.node(*id).slot {
            Slot::Field(field) => path.push(field.name.clone()),
            _ => {
                return Err(failure(format!(
                    "origin {} sits inside a container; only record fields can be followed",
                    graph.path(origin_id)
                )));
            }
        }
    }
    path.remove(0);

    Ok(AssignPlan { origin: origin_id, anchor, branch: below[0], path })
}

/// Bindings whose every matched node is depth limited or lies under a node
/// whose value is not built from its children.
fn unreachable_matches(graph: &NodeGraph, plans: &[NodePlan], bindings: &[Binding]) -> BTreeSet<usize> {
    let mut reachable = BTreeSet::new();
    let mut hidden = BTreeSet::new();
    for node in graph.nodes() {
        let shadowed = matches!(node.kind, NodeKind::DepthLimited(_))
            || graph.ancestors(node.id).into_iter().any(|ancestor| {
                plans[ancestor.0]
                    .source
                    .is_some_and(|index| !matches!(bindings[index].action, Override::Blank))
            });
        for index in &plans[node.id.0].matched {
            if shadowed {
                hidden.insert(*index);
            } else {
                reachable.insert(*index);
            }
        }
    }
    hidden.difference(&reachable).copied().collect()
}
