//! The generation engine: one depth-first walk over a model's node graph.
//!
//! Per node the engine picks the value source (ignore, literal, supplier,
//! generator, assignment or default construction), applies the
//! nullability draw, runs the filter and uniqueness retry loop, then fires
//! callbacks and the `created` notification.
use std::collections::{BTreeSet, HashMap, HashSet};

use tracing::{trace, warn};

use crate::context::{Assignment, Mode, Override};
use crate::error::GenerationError;
use crate::generators::leaf_value;
use crate::graph::{Node, NodeId, NodeKind, Slot};
use crate::model::Model;
use crate::random::Random;
use crate::shape::{LeafKind, ShapeCategory};
use crate::value::{Record, Value};

/// Observes every node value as it is completed.
pub trait GenerationListener {
    /// `value` is `None` for ignored positions.
    fn object_created(&mut self, node: &Node, value: Option<&Value>) {
        let _ = (node, value);
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopListener;

impl GenerationListener for NoopListener {}

impl<F> GenerationListener for F
where
    F: FnMut(&Node, Option<&Value>),
{
    fn object_created(&mut self, node: &Node, value: Option<&Value>) {
        self(node, value)
    }
}

pub(crate) fn absent(category: ShapeCategory) -> Value {
    match category {
        ShapeCategory::Leaf | ShapeCategory::Record => Value::Null,
        ShapeCategory::Array => Value::Array(Vec::new()),
        ShapeCategory::Sequence => Value::Seq(Vec::new()),
        ShapeCategory::Mapping => Value::Map(Vec::new()),
    }
}

/// Scratch space of one record under construction.
struct Frame {
    record: NodeId,
    blank: bool,
    produced: HashMap<NodeId, Option<Value>>,
    in_progress: HashSet<NodeId>,
}

enum Rejection {
    Filter,
    Duplicate,
}

pub(crate) struct Engine<'m, 'l> {
    model: &'m Model,
    random: Random,
    listener: &'l mut dyn GenerationListener,
    frames: Vec<Frame>,
    seen: HashMap<NodeId, HashSet<Value>>,
    used: BTreeSet<usize>,
}

impl<'m, 'l> Engine<'m, 'l> {
    pub fn new(model: &'m Model, seed: u64, listener: &'l mut dyn GenerationListener) -> Self {
        Self {
            model,
            random: Random::new(seed),
            listener,
            frames: Vec::new(),
            seen: HashMap::new(),
            used: BTreeSet::new(),
        }
    }

    pub fn draws(&self) -> u64 {
        self.random.draws()
    }

    /// Indices of the bindings that matched a visited node.
    pub fn into_used(self) -> BTreeSet<usize> {
        self.used
    }

    pub fn run(&mut self) -> Result<Value, GenerationError> {
        let model = self.model;
        let blank = model.mode() == Mode::Blank;
        let value = self.produce(model.graph().root(), blank)?;
        Ok(value.unwrap_or(Value::Null))
    }

    fn produce(&mut self, id: NodeId, blank: bool) -> Result<Option<Value>, GenerationError> {
        let model = self.model;
        let node = model.graph().node(id);
        if let NodeKind::DepthLimited(category) = node.kind {
            return Ok(Some(absent(category)));
        }

        let plan = model.plan(id);
        self.used.extend(plan.matched.iter().copied());

        let source = plan.source.map(|index| &model.binding(index).action);
        let mut value = match source {
            Some(Override::Ignore) => {
                self.listener.object_created(node, None);
                return Ok(None);
            }
            Some(Override::Set(literal)) => Some(literal.clone()),
            Some(Override::Supply(supplier)) => Some(supplier()),
            Some(Override::Generate(generator)) => {
                if !blank && self.null_draw(id) {
                    Some(Value::Null)
                } else {
                    Some(self.constrained(id, |engine| Ok(generator.generate(&mut engine.random)))?)
                }
            }
            Some(Override::Assign(assignment)) => match self.assigned(id, assignment)? {
                Some(assigned) => Some(assigned),
                None => Some(self.default_value(id, blank)?),
            },
            Some(Override::Blank) => Some(self.default_value(id, true)?),
            _ => Some(self.default_value(id, blank)?),
        };

        if let Some(current) = value.as_mut().filter(|v| !v.is_null()) {
            for index in &plan.callbacks {
                if let Override::OnComplete(callback) = &model.binding(*index).action {
                    callback(current);
                }
            }
        }
        self.listener.object_created(node, value.as_ref());
        trace!(path = %model.graph().path(id), "created");
        Ok(value)
    }

    fn default_value(&mut self, id: NodeId, blank: bool) -> Result<Value, GenerationError> {
        if !blank && self.null_draw(id) {
            return Ok(Value::Null);
        }
        self.constrained(id, |engine| engine.construct(id, blank))
    }

    /// Null is drawn before construction, never for the root.
    fn null_draw(&mut self, id: NodeId) -> bool {
        let model = self.model;
        let node = model.graph().node(id);
        let settings = model.settings();
        let eligible = model.plan(id).nullable
            || match node.slot {
                Slot::Root => false,
                Slot::Field(_) => settings.nullable_default,
                Slot::Element => settings.nullable_elements,
                Slot::Key => settings.nullable_map_keys,
                Slot::Value => settings.nullable_map_values,
            };
        node.parent.is_some() && eligible && self.random.chance(settings.null_probability)
    }

    /// Retry `attempt` until the value passes every filter and, for unique
    /// nodes, was not produced before in this run. Null is exempt.
    fn constrained(
        &mut self,
        id: NodeId,
        mut attempt: impl FnMut(&mut Self) -> Result<Value, GenerationError>,
    ) -> Result<Value, GenerationError> {
        let model = self.model;
        let plan = model.plan(id);
        if plan.filters.is_empty() && !plan.unique {
            return attempt(self);
        }
        let settings = model.settings();
        let limit = if plan.unique { settings.unique_retry_limit } else { settings.filter_retry_limit }.max(1);

        let mut rejection = Rejection::Filter;
        for _ in 0..limit {
            let value = attempt(self)?;
            if value.is_null() {
                return Ok(value);
            }
            let accepted = plan.filters.iter().all(|index| match &model.binding(*index).action {
                Override::Filter(predicate) => predicate(&value),
                _ => true,
            });
            if !accepted {
                rejection = Rejection::Filter;
                continue;
            }
            if plan.unique && !self.seen.entry(id).or_default().insert(value.clone()) {
                rejection = Rejection::Duplicate;
                continue;
            }
            return Ok(value);
        }

        let node = model.graph().path(id);
        Err(match rejection {
            Rejection::Duplicate => GenerationError::UniqueRetryExhausted { node, attempts: limit },
            Rejection::Filter => GenerationError::FilterRetryExhausted { node, attempts: limit },
        })
    }

    fn construct(&mut self, id: NodeId, blank: bool) -> Result<Value, GenerationError> {
        let model = self.model;
        let node = model.graph().node(id);
        match &node.kind {
            NodeKind::DepthLimited(category) => Ok(absent(*category)),
            NodeKind::Leaf(_) if blank => Ok(Value::Null),
            NodeKind::Leaf(LeafKind::External) => Ok(model
                .registry()
                .generator(node.shape.name())
                .map_or(Value::Null, |generator| generator.generate(&mut self.random))),
            NodeKind::Leaf(kind) => Ok(leaf_value(kind, model.settings(), &mut self.random)),
            NodeKind::Record { children } => self.record(id, children, blank),
            NodeKind::Array { element, .. } => Ok(Value::Array(self.elements(id, *element, false, blank)?)),
            NodeKind::Sequence { element, unique } => Ok(Value::Seq(self.elements(id, *element, *unique, blank)?)),
            NodeKind::Mapping { key, value } => self.mapping(id, *key, *value, blank),
        }
    }

    fn record(&mut self, id: NodeId, children: &[NodeId], blank: bool) -> Result<Value, GenerationError> {
        let model = self.model;
        self.frames.push(Frame {
            record: id,
            blank,
            produced: HashMap::new(),
            in_progress: HashSet::new(),
        });
        let index = self.frames.len() - 1;
        let filled = children.iter().try_for_each(|&child| {
            if self.frames[index].produced.contains_key(&child) {
                Ok(())
            } else {
                self.produce_member(index, child, blank)
            }
        });
        let frame = self.frames.pop();
        filled?;

        let mut produced = frame.map(|frame| frame.produced).unwrap_or_default();
        let fields = children
            .iter()
            .map(|child| {
                let name = model.graph().node(*child).field().map(|f| f.name.clone()).unwrap_or_default();
                (name, produced.remove(child).flatten().unwrap_or(Value::Null))
            })
            .collect();
        Ok(Value::Record(Record { shape: model.graph().node(id).shape.to_string(), fields }))
    }

    fn produce_member(&mut self, frame: usize, child: NodeId, blank: bool) -> Result<(), GenerationError> {
        self.frames[frame].in_progress.insert(child);
        let value = self.produce(child, blank)?;
        let frame = &mut self.frames[frame];
        frame.in_progress.remove(&child);
        frame.produced.insert(child, value);
        Ok(())
    }

    /// The origin-derived value for an assigned destination, or `None` when
    /// a condition rejects the origin and default construction applies.
    fn assigned(&mut self, id: NodeId, assignment: &Assignment) -> Result<Option<Value>, GenerationError> {
        let model = self.model;
        let Some(plan) = model.plan(id).assignment.as_ref() else {
            return Ok(None);
        };
        let Some(frame) = self.frames.iter().rposition(|f| f.record == plan.anchor) else {
            return Ok(None);
        };

        if self.frames[frame].in_progress.contains(&plan.branch) {
            return Err(GenerationError::AssignmentCycle {
                destination: model.graph().path(id),
                origin: model.graph().path(plan.origin),
            });
        }
        if !self.frames[frame].produced.contains_key(&plan.branch) {
            let blank = self.frames[frame].blank;
            self.produce_member(frame, plan.branch, blank)?;
        }

        let branch = self.frames[frame].produced.get(&plan.branch).cloned().flatten();
        let origin = plan
            .path
            .iter()
            .try_fold(branch.unwrap_or(Value::Null), |value, name| value.field(name).cloned())
            .unwrap_or(Value::Null);

        if let Some(condition) = &assignment.condition {
            if !condition(&origin) {
                return Ok(None);
            }
        }
        Ok(Some((assignment.transform)(&origin)))
    }

    fn elements(&mut self, id: NodeId, element: NodeId, unique: bool, blank: bool) -> Result<Vec<Value>, GenerationError> {
        let model = self.model;
        if blank || matches!(model.graph().node(element).kind, NodeKind::DepthLimited(_)) {
            return Ok(Vec::new());
        }
        let settings = model.settings();
        let size = self.random.usize_range(settings.min_size, settings.max_size);
        let mut items: Vec<Value> = Vec::new();
        let mut collisions = 0;
        while items.len() < size {
            let Some(item) = self.produce(element, blank)? else {
                return Ok(Vec::new());
            };
            if unique && items.contains(&item) {
                collisions += 1;
                if collisions >= settings.fill_attempt_limit {
                    warn!(
                        path = %model.graph().path(id),
                        requested = size,
                        filled = items.len(),
                        "set fill exhausted, accepting fewer elements"
                    );
                    break;
                }
                continue;
            }
            items.push(item);
        }
        Ok(items)
    }

    fn mapping(&mut self, id: NodeId, key: NodeId, value: NodeId, blank: bool) -> Result<Value, GenerationError> {
        let model = self.model;
        let graph = model.graph();
        let limited = |node: NodeId| matches!(graph.node(node).kind, NodeKind::DepthLimited(_));
        if blank || limited(key) || limited(value) {
            return Ok(Value::Map(Vec::new()));
        }
        let settings = model.settings();
        let size = self.random.usize_range(settings.min_size, settings.max_size);
        let mut entries: Vec<(Value, Value)> = Vec::new();
        let mut collisions = 0;
        while entries.len() < size {
            let Some(k) = self.produce(key, blank)? else {
                return Ok(Value::Map(Vec::new()));
            };
            if entries.iter().any(|(existing, _)| *existing == k) {
                collisions += 1;
                if collisions >= settings.fill_attempt_limit {
                    warn!(
                        path = %graph.path(id),
                        requested = size,
                        filled = entries.len(),
                        "mapping fill exhausted, accepting a smaller map"
                    );
                    break;
                }
                continue;
            }
            let Some(v) = self.produce(value, blank)? else {
                return Ok(Value::Map(Vec::new()));
            };
            entries.push((k, v));
        }
        Ok(Value::Map(entries))
    }
}
