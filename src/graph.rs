//! Node graph construction.
//!
//! The graph is a tree stored in an arena. Every distinguishable position of
//! an instance (record field, sequence element, mapping key and value, array
//! element) is its own [`Node`] with a back-reference to its parent. The
//! builder runs in two phases per node: the slot is reserved so children can
//! point at it, then its kind is filled in once every child is built.
//!
//! Recursion is bounded by depth: a node deeper than `max_depth` becomes
//! [`NodeKind::DepthLimited`] and is never expanded.
use std::collections::{BTreeSet, HashMap};
use std::fmt::Write as _;
use std::sync::Arc;

use indexmap::IndexMap;
use tracing::debug;

use crate::error::{BuildError, UnresolvedTypeError};
use crate::resolve::{BindingScope, resolve};
use crate::selector::{Position, Selector};
use crate::settings::Settings;
use crate::shape::{ConcreteShape, FieldRef, LeafKind, ShapeCategory, ShapeDef, ShapeRegistry, TypeRef};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

/// How a node hangs off its parent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Slot {
    Root,
    Field(FieldRef),
    Element,
    Key,
    Value,
}

impl Slot {
    pub fn field(&self) -> Option<&FieldRef> {
        match self {
            Slot::Field(field) => Some(field),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    /// One child per settable member, inherited members first.
    Record { children: Vec<NodeId> },
    Array { element: NodeId, dimensions: usize },
    Sequence { element: NodeId, unique: bool },
    Mapping { key: NodeId, value: NodeId },
    Leaf(LeafKind),
    /// Beyond the maximum depth; produces the absent value of its category.
    DepthLimited(ShapeCategory),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub id: NodeId,
    /// The shape generated here, after any subtype substitution.
    pub shape: ConcreteShape,
    /// The declared shape when a subtype replaced it.
    pub declared: Option<ConcreteShape>,
    pub slot: Slot,
    pub bindings: BindingScope,
    pub parent: Option<NodeId>,
    pub depth: usize,
    pub kind: NodeKind,
}

impl Node {
    pub fn field(&self) -> Option<&FieldRef> {
        self.slot.field()
    }

    pub fn position(&self) -> Position {
        Position { shape: self.shape.clone(), field: self.field().cloned(), depth: self.depth }
    }

    pub fn children(&self) -> Vec<NodeId> {
        match &self.kind {
            NodeKind::Record { children } => children.clone(),
            NodeKind::Array { element, .. } | NodeKind::Sequence { element, .. } => vec![*element],
            NodeKind::Mapping { key, value } => vec![*key, *value],
            NodeKind::Leaf(_) | NodeKind::DepthLimited(_) => Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeGraph {
    nodes: Vec<Node>,
    root: NodeId,
}

impl NodeGraph {
    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Enclosing nodes, root first, excluding `id`.
    pub fn ancestors(&self, id: NodeId) -> Vec<NodeId> {
        let mut chain = Vec::new();
        let mut current = self.node(id).parent;
        while let Some(parent) = current {
            chain.push(parent);
            current = self.node(parent).parent;
        }
        chain.reverse();
        chain
    }

    pub fn ancestry(&self, id: NodeId) -> Vec<Position> {
        self.ancestors(id).into_iter().map(|a| self.node(a).position()).collect()
    }

    /// `a` is `b` or one of its ancestors.
    pub fn is_ancestor_or_self(&self, a: NodeId, b: NodeId) -> bool {
        let mut current = Some(b);
        while let Some(id) = current {
            if id == a {
                return true;
            }
            current = self.node(id).parent;
        }
        false
    }

    pub fn path(&self, id: NodeId) -> String {
        node_path(&self.nodes, id)
    }
}

fn node_path(nodes: &[Node], id: NodeId) -> String {
    let node = &nodes[id.0];
    let Some(parent) = node.parent else {
        return node.shape.to_string();
    };
    let mut path = node_path(nodes, parent);
    append_slot(&mut path, &node.slot);
    path
}

fn append_slot(path: &mut String, slot: &Slot) {
    match slot {
        Slot::Root => {}
        Slot::Field(field) => {
            let _ = write!(path, ".{}", field.name);
        }
        Slot::Element => path.push_str("[]"),
        Slot::Key => path.push_str("<key>"),
        Slot::Value => path.push_str("<value>"),
    }
}

/// A resolved record member: where it was declared and what it resolved to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    pub field: FieldRef,
    pub shape: ConcreteShape,
}

/// A configured subtype substitution, by its index in the context.
#[derive(Debug, Clone)]
pub struct SubtypeRule {
    pub index: usize,
    pub selector: Selector,
    pub subtype: TypeRef,
}

pub struct GraphBuilder<'a> {
    registry: &'a ShapeRegistry,
    max_depth: usize,
    fallback: Option<ConcreteShape>,
    subtypes: Vec<SubtypeRule>,
    root_scope: BindingScope,
    nodes: Vec<Node>,
    layouts: HashMap<ConcreteShape, Arc<Vec<Member>>>,
    subtype_hits: BTreeSet<usize>,
}

impl<'a> GraphBuilder<'a> {
    pub fn new(registry: &'a ShapeRegistry, settings: &Settings) -> Result<Self, BuildError> {
        let fallback = settings
            .erased_fallback
            .as_ref()
            .map(|ty| resolve(ty, None, &BindingScope::empty()))
            .transpose()?;
        Ok(Self {
            registry,
            max_depth: settings.max_depth,
            fallback,
            subtypes: Vec::new(),
            root_scope: BindingScope::empty(),
            nodes: Vec::new(),
            layouts: HashMap::new(),
            subtype_hits: BTreeSet::new(),
        })
    }

    pub fn with_subtypes(mut self, rules: Vec<SubtypeRule>) -> Self {
        self.subtypes = rules;
        self
    }

    /// Indices of subtype rules applied during the last build.
    pub fn subtype_hits(&self) -> &BTreeSet<usize> {
        &self.subtype_hits
    }

    /// Build the tree for `root`; its arguments bind the root shape's
    /// parameters and form the root scope.
    pub fn build(&mut self, root: &ConcreteShape) -> Result<NodeGraph, BuildError> {
        self.nodes.clear();
        self.layouts.clear();
        self.subtype_hits.clear();
        self.check_arity(root)?;

        let params = self.params_of(root);
        let bindings: IndexMap<String, ConcreteShape> = params
            .into_iter()
            .zip(root.args().iter().cloned())
            .collect();
        self.root_scope = BindingScope::root(bindings);

        let mut ancestry = Vec::new();
        let root_id = self.build_position(root.clone(), Slot::Root, None, 0, &mut ancestry)?;
        Ok(NodeGraph { nodes: std::mem::take(&mut self.nodes), root: root_id })
    }

    fn params_of(&self, shape: &ConcreteShape) -> Vec<String> {
        match shape {
            ConcreteShape::Named { name, .. } => self
                .registry
                .get(name)
                .map(|def| def.params().into_iter().map(str::to_string).collect())
                .unwrap_or_default(),
            ConcreteShape::Array(_) => Vec::new(),
        }
    }

    fn scope_for(&self, shape: &ConcreteShape) -> BindingScope {
        let params = self.params_of(shape);
        self.root_scope.bind(params.iter().map(String::as_str), shape.args())
    }

    fn check_arity(&self, shape: &ConcreteShape) -> Result<(), BuildError> {
        match shape {
            ConcreteShape::Array(component) => self.check_arity(component),
            ConcreteShape::Named { name, args } => {
                let def = self
                    .registry
                    .get(name)
                    .ok_or_else(|| BuildError::UnknownShape(name.clone()))?;
                let expected = def.params().len();
                if !args.is_empty() && args.len() != expected {
                    return Err(BuildError::ArityMismatch { shape: name.clone(), expected, actual: args.len() });
                }
                args.iter().try_for_each(|arg| self.check_arity(arg))
            }
        }
    }

    fn pending_path(&self, parent: Option<NodeId>, slot: &Slot, declared: &ConcreteShape) -> String {
        match parent {
            Some(parent) => {
                let mut path = node_path(&self.nodes, parent);
                append_slot(&mut path, slot);
                path
            }
            None => declared.to_string(),
        }
    }

    fn build_position(
        &mut self,
        declared: ConcreteShape,
        slot: Slot,
        parent: Option<NodeId>,
        depth: usize,
        ancestry: &mut Vec<Position>,
    ) -> Result<NodeId, BuildError> {
        let position = Position { shape: declared.clone(), field: slot.field().cloned(), depth };
        let substituted = self.substitute(&declared, &position, ancestry, parent, &slot)?;
        let (shape, declared) = match substituted {
            Some(subtype) => (subtype, Some(declared)),
            None => (declared, None),
        };
        self.check_arity(&shape)?;
        let category = self
            .registry
            .category(&shape)
            .ok_or_else(|| BuildError::UnknownShape(shape.name().to_string()))?;

        let id = NodeId(self.nodes.len());
        let bindings = self.scope_for(&shape);
        let field = slot.field().cloned();
        self.nodes.push(Node {
            id,
            shape: shape.clone(),
            declared,
            slot,
            bindings,
            parent,
            depth,
            kind: NodeKind::DepthLimited(category),
        });

        if depth > self.max_depth {
            debug!(path = %node_path(&self.nodes, id), depth, "depth limit reached");
            return Ok(id);
        }

        ancestry.push(Position { shape: shape.clone(), field, depth });
        let kind = self.expand(id, &shape, depth, ancestry);
        ancestry.pop();
        self.nodes[id.0].kind = kind?;
        debug!(path = %node_path(&self.nodes, id), shape = %shape, depth, "built node");
        Ok(id)
    }

    fn expand(
        &mut self,
        id: NodeId,
        shape: &ConcreteShape,
        depth: usize,
        ancestry: &mut Vec<Position>,
    ) -> Result<NodeKind, BuildError> {
        let registry = self.registry;
        let child_depth = depth + 1;
        match shape {
            ConcreteShape::Array(component) => {
                let element = self.build_position((**component).clone(), Slot::Element, Some(id), child_depth, ancestry)?;
                Ok(NodeKind::Array { element, dimensions: shape.dimensions() })
            }
            ConcreteShape::Named { name, args } => {
                let def = registry.get(name).ok_or_else(|| BuildError::UnknownShape(name.clone()))?;
                match def {
                    ShapeDef::Leaf(kind) => {
                        if *kind == LeafKind::External && registry.generator(name).is_none() {
                            return Err(BuildError::MissingLeafGenerator(name.clone()));
                        }
                        Ok(NodeKind::Leaf(kind.clone()))
                    }
                    ShapeDef::Sequence { param, unique } => {
                        let element_shape = self.argument(id, args, 0, param)?;
                        let element = self.build_position(element_shape, Slot::Element, Some(id), child_depth, ancestry)?;
                        Ok(NodeKind::Sequence { element, unique: *unique })
                    }
                    ShapeDef::Mapping { key_param, value_param } => {
                        let key_shape = self.argument(id, args, 0, key_param)?;
                        let value_shape = self.argument(id, args, 1, value_param)?;
                        let key = self.build_position(key_shape, Slot::Key, Some(id), child_depth, ancestry)?;
                        let value = self.build_position(value_shape, Slot::Value, Some(id), child_depth, ancestry)?;
                        Ok(NodeKind::Mapping { key, value })
                    }
                    ShapeDef::Record(_) => {
                        let layout = self.layout(shape)?;
                        let mut children = Vec::with_capacity(layout.len());
                        for member in layout.iter() {
                            let child = self.build_position(
                                member.shape.clone(),
                                Slot::Field(member.field.clone()),
                                Some(id),
                                child_depth,
                                ancestry,
                            )?;
                            children.push(child);
                        }
                        Ok(NodeKind::Record { children })
                    }
                }
            }
        }
    }

    /// Container argument by declared position. Erased containers take the
    /// configured fallback or fail.
    fn argument(&self, id: NodeId, args: &[ConcreteShape], index: usize, param: &str) -> Result<ConcreteShape, BuildError> {
        if let Some(arg) = args.get(index) {
            return Ok(arg.clone());
        }
        if let Some(fallback) = &self.fallback {
            return Ok(fallback.clone());
        }
        let node = &self.nodes[id.0];
        Err(UnresolvedTypeError {
            raw: node.shape.to_string(),
            argument: param.to_string(),
            field: node.field().map(ToString::to_string),
        }
        .into())
    }

    /// Resolved members of a record shape, inherited members first.
    pub fn layout(&mut self, shape: &ConcreteShape) -> Result<Arc<Vec<Member>>, BuildError> {
        if let Some(layout) = self.layouts.get(shape) {
            return Ok(layout.clone());
        }
        let name = shape.name();
        let Some(ShapeDef::Record(record)) = self.registry.get(name) else {
            return Err(BuildError::UnknownShape(name.to_string()));
        };
        let scope = self.root_scope.bind(record.params.iter().map(String::as_str), shape.args());

        let mut members = Vec::new();
        if let Some(supertype) = &record.extends {
            let supertype = resolve(supertype, None, &scope)?;
            members.extend(self.layout(&supertype)?.iter().cloned());
        }
        for field in &record.fields {
            let field_ref = FieldRef::new(name, &field.name);
            let resolved = resolve(&field.ty, Some(&field_ref), &scope)?;
            members.push(Member { field: field_ref, shape: resolved });
        }

        let members = Arc::new(members);
        self.layouts.insert(shape.clone(), members.clone());
        Ok(members)
    }

    fn substitute(
        &mut self,
        declared: &ConcreteShape,
        position: &Position,
        ancestry: &[Position],
        parent: Option<NodeId>,
        slot: &Slot,
    ) -> Result<Option<ConcreteShape>, BuildError> {
        let Some(rule) = self
            .subtypes
            .iter()
            .filter(|rule| rule.selector.matches(position, ancestry))
            .max_by_key(|rule| (rule.selector.specificity(), rule.index))
        else {
            return Ok(None);
        };
        let (index, raw) = (rule.index, rule.subtype.clone());
        self.subtype_hits.insert(index);

        let incompatible = || BuildError::IncompatibleSubtype {
            declared: declared.to_string(),
            subtype: raw.to_string(),
            position: self.pending_path(parent, slot, declared),
        };

        let mut subtype = resolve(&raw, None, &self.root_scope)?;
        if let ConcreteShape::Named { name, args } = &mut subtype {
            let arity = self.registry.get(name).map(|def| def.params().len()).unwrap_or_default();
            if args.is_empty() && arity > 0 && declared.args().len() == arity {
                *args = declared.args().to_vec();
            }
        }

        let (Some(declared_category), Some(subtype_category)) =
            (self.registry.category(declared), self.registry.category(&subtype))
        else {
            return Err(BuildError::UnknownShape(subtype.name().to_string()));
        };
        if declared_category != subtype_category {
            return Err(incompatible());
        }
        if declared_category == ShapeCategory::Record && !self.registry.is_subtype(subtype.name(), declared.name()) {
            return Err(incompatible());
        }
        if declared_category == ShapeCategory::Array && declared.dimensions() != subtype.dimensions() {
            return Err(incompatible());
        }
        Ok(Some(subtype))
    }
}

// ————————————————————————————————————————————————————————————————————————————
// TESTS
// ————————————————————————————————————————————————————————————————————————————
