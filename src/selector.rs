//! Structural selectors.
//!
//! A selector targets node positions by shape, by field (optionally
//! qualified by the declaring shape) or as the root, optionally constrained
//! to a depth and to a chain of enclosing scopes.
use std::cmp::Ordering;
use std::fmt;

use crate::error::ShapeError;
use crate::shape::{ConcreteShape, FieldRef, TypeRef};

/// What the matcher sees of a node: its shape, declaring field and depth.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Position {
    pub shape: ConcreteShape,
    pub field: Option<FieldRef>,
    pub depth: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Root,
    /// Matches nodes whose shape fits the pattern. Type variables in the
    /// pattern match any argument; a pattern without arguments matches any
    /// instantiation of the named shape.
    Shape(TypeRef),
    Field { declaring: Option<String>, name: String },
}

impl Target {
    fn matches(&self, position: &Position) -> bool {
        match self {
            Target::Root => position.depth == 0,
            Target::Shape(pattern) => shape_matches(pattern, &position.shape),
            Target::Field { declaring, name } => match &position.field {
                Some(field) => {
                    field.name == *name && declaring.as_ref().is_none_or(|d| *d == field.declaring)
                }
                None => false,
            },
        }
    }

    fn weight(&self) -> u8 {
        match self {
            Target::Root => 2,
            Target::Field { declaring, .. } => 1 + u8::from(declaring.is_some()),
            Target::Shape(_) => 0,
        }
    }
}

fn shape_matches(pattern: &TypeRef, shape: &ConcreteShape) -> bool {
    match (pattern, shape) {
        (TypeRef::Var(_), _) => true,
        (TypeRef::Array(pattern), ConcreteShape::Array(shape)) => shape_matches(pattern, shape),
        (TypeRef::Named { name, args }, ConcreteShape::Named { name: actual, args: actual_args }) => {
            name == actual
                && (args.is_empty()
                    || (args.len() == actual_args.len()
                        && args.iter().zip(actual_args).all(|(p, s)| shape_matches(p, s))))
        }
        _ => false,
    }
}

/// An enclosing-position constraint used by [`Selector::within`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scope {
    pub target: Target,
    pub depth: Option<usize>,
}

impl Scope {
    fn matches(&self, position: &Position) -> bool {
        self.depth.is_none_or(|d| d == position.depth) && self.target.matches(position)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    pub target: Target,
    pub depth: Option<usize>,
    /// Enclosing scopes, outermost first.
    pub within: Vec<Scope>,
    /// Exempt from the unmatched-selector check.
    pub lenient: bool,
}

impl Selector {
    fn new(target: Target) -> Self {
        Self { target, depth: None, within: Vec::new(), lenient: false }
    }

    pub fn root() -> Self {
        Self::new(Target::Root)
    }

    pub fn all(pattern: TypeRef) -> Self {
        Self::new(Target::Shape(pattern))
    }

    /// Parse a shape pattern; `_` stands for any argument.
    pub fn shape(pattern: &str) -> Result<Self, ShapeError> {
        Ok(Self::all(TypeRef::parse_with_params(pattern, &["_".to_string()])?))
    }

    pub fn field(name: impl Into<String>) -> Self {
        Self::new(Target::Field { declaring: None, name: name.into() })
    }

    pub fn field_of(declaring: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(Target::Field { declaring: Some(declaring.into()), name: name.into() })
    }

    pub fn at_depth(mut self, depth: usize) -> Self {
        self.depth = Some(depth);
        self
    }

    /// Require an enclosing position matched by `scope`. Scopes of `scope`
    /// itself are kept, outside of it.
    pub fn within(mut self, scope: Selector) -> Self {
        self.within.extend(scope.within);
        self.within.push(Scope { target: scope.target, depth: scope.depth });
        self
    }

    pub fn lenient(mut self) -> Self {
        self.lenient = true;
        self
    }

    /// `ancestry` lists the enclosing positions root first, excluding
    /// `position` itself. Scopes must appear in it in order, though not
    /// necessarily adjacent.
    pub fn matches(&self, position: &Position, ancestry: &[Position]) -> bool {
        if self.depth.is_some_and(|d| d != position.depth) || !self.target.matches(position) {
            return false;
        }
        let mut scopes = self.within.iter().peekable();
        for ancestor in ancestry {
            match scopes.peek() {
                Some(scope) if scope.matches(ancestor) => {
                    scopes.next();
                }
                Some(_) => {}
                None => break,
            }
        }
        scopes.peek().is_none()
    }

    /// This selector re-rooted at the positions `anchor` matches: `root()`
    /// becomes the anchor itself, everything else must lie below it, and
    /// depths shift by the anchor's depth. `None` when a depth is pinned
    /// but the anchor's is not.
    pub fn under(&self, anchor: &Selector) -> Option<Selector> {
        let shift = |depth: Option<usize>| match (depth, anchor.depth) {
            (None, _) => Some(None),
            (Some(depth), Some(base)) => Some(Some(base + depth)),
            (Some(_), None) => None,
        };
        let mut within = anchor.within.clone();
        if self.target == Target::Root {
            return Some(Selector { target: anchor.target.clone(), depth: anchor.depth, within, lenient: self.lenient });
        }
        within.push(Scope { target: anchor.target.clone(), depth: anchor.depth });
        for scope in self.within.iter().filter(|scope| scope.target != Target::Root) {
            within.push(Scope { target: scope.target.clone(), depth: shift(scope.depth)? });
        }
        Some(Selector { target: self.target.clone(), depth: shift(self.depth)?, within, lenient: self.lenient })
    }

    pub fn specificity(&self) -> Specificity {
        Specificity {
            ancestry: self.within.len(),
            qualifiers: self.target.weight() + u8::from(self.depth.is_some()),
        }
    }
}

/// Ordering key for competing selectors. Ancestry scopes dominate; ties
/// fall back to how narrowly the target itself is qualified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Specificity {
    pub ancestry: usize,
    pub qualifiers: u8,
}

impl Ord for Specificity {
    fn cmp(&self, other: &Self) -> Ordering {
        self.ancestry
            .cmp(&other.ancestry)
            .then(self.qualifiers.cmp(&other.qualifiers))
    }
}

impl PartialOrd for Specificity {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Root => f.write_str("root()"),
            Target::Shape(pattern) => write!(f, "all({pattern})"),
            Target::Field { declaring: Some(declaring), name } => write!(f, "field({declaring}, {name:?})"),
            Target::Field { declaring: None, name } => write!(f, "field({name:?})"),
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.target)?;
        if let Some(depth) = self.depth {
            write!(f, ".at_depth({depth})")?;
        }
        Ok(())
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.target)?;
        if let Some(depth) = self.depth {
            write!(f, ".at_depth({depth})")?;
        }
        for scope in &self.within {
            write!(f, ".within({scope})")?;
        }
        if self.lenient {
            f.write_str(".lenient()")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(shape: &str, field: Option<(&str, &str)>, depth: usize) -> Position {
        let TypeRef::Named { name, .. } = TypeRef::parse(shape).unwrap() else {
            panic!("named shape expected");
        };
        Position {
            shape: ConcreteShape::named(name),
            field: field.map(|(d, n)| FieldRef::new(d, n)),
            depth,
        }
    }

    #[test]
    fn field_and_declaring_shape() {
        let pos = at("String", Some(("Person", "name")), 1);
        assert!(Selector::field("name").matches(&pos, &[]));
        assert!(Selector::field_of("Person", "name").matches(&pos, &[]));
        assert!(!Selector::field_of("Pet", "name").matches(&pos, &[]));
        assert!(!Selector::field("age").matches(&pos, &[]));
    }

    #[test]
    fn shape_patterns_with_wildcards() {
        let list = ConcreteShape::generic("List", [ConcreteShape::named("String")]);
        let pos = Position { shape: list, field: None, depth: 2 };
        assert!(Selector::shape("List").unwrap().matches(&pos, &[]));
        assert!(Selector::shape("List<_>").unwrap().matches(&pos, &[]));
        assert!(Selector::shape("List<String>").unwrap().matches(&pos, &[]));
        assert!(!Selector::shape("List<i32>").unwrap().matches(&pos, &[]));
        assert!(!Selector::shape("Set").unwrap().matches(&pos, &[]));
    }

    #[test]
    fn depth_and_root() {
        let root = at("Person", None, 0);
        let nested = at("Person", Some(("Person", "parent")), 1);
        assert!(Selector::root().matches(&root, &[]));
        assert!(!Selector::root().matches(&nested, &[root.clone()]));
        let person = Selector::shape("Person").unwrap();
        assert!(person.clone().at_depth(1).matches(&nested, &[root.clone()]));
        assert!(!person.at_depth(1).matches(&root, &[]));
    }

    #[test]
    fn within_requires_ordered_ancestry() {
        let root = at("Order", None, 0);
        let address = at("Address", Some(("Order", "billing")), 1);
        let street = at("String", Some(("Address", "street")), 2);
        let ancestry = [root.clone(), address.clone()];

        let billing_street = Selector::field("street").within(Selector::field("billing"));
        assert!(billing_street.matches(&street, &ancestry));

        let shipping_street = Selector::field("street").within(Selector::field("shipping"));
        assert!(!shipping_street.matches(&street, &ancestry));

        let ordered = Selector::field("street")
            .within(Selector::shape("Order").unwrap())
            .within(Selector::field("billing"));
        assert!(ordered.matches(&street, &ancestry));

        let reversed = Selector::field("street")
            .within(Selector::field("billing"))
            .within(Selector::shape("Order").unwrap());
        assert!(!reversed.matches(&street, &ancestry));
    }

    #[test]
    fn nested_within_keeps_inner_scopes() {
        let root = at("Person", None, 0);
        let home = at("Place", Some(("Person", "home")), 1);
        let work = at("Place", Some(("Person", "work")), 1);
        let addr = at("Address", Some(("Place", "addr")), 2);
        let city = at("String", Some(("Address", "city")), 3);

        let selector = Selector::field("city").within(Selector::field("addr").within(Selector::field("home")));
        assert_eq!(selector.to_string(), "field(\"city\").within(field(\"home\")).within(field(\"addr\"))");
        assert!(selector.matches(&city, &[root.clone(), home, addr.clone()]));
        assert!(!selector.matches(&city, &[root, work, addr]));
    }

    #[test]
    fn rerooting_under_an_anchor() {
        let anchor = Selector::field("home");
        let root = at("Person", None, 0);
        let home = at("Place", Some(("Person", "home")), 1);
        let work = at("Place", Some(("Person", "work")), 1);
        let name = at("String", Some(("Place", "name")), 2);

        let inner = Selector::field("name").under(&anchor).unwrap();
        assert!(inner.matches(&name, &[root.clone(), home.clone()]));
        assert!(!inner.matches(&name, &[root.clone(), work]));

        let whole = Selector::root().under(&anchor).unwrap();
        assert!(whole.matches(&home, &[root.clone()]));

        assert!(Selector::field("name").at_depth(1).under(&anchor).is_none());
        let pinned = Selector::field("name").at_depth(1).under(&anchor.clone().at_depth(1)).unwrap();
        assert!(pinned.matches(&name, &[root, home]));
    }

    #[test]
    fn specificity_order() {
        let broad = Selector::shape("String").unwrap().specificity();
        let field = Selector::field("name").specificity();
        let qualified = Selector::field_of("Person", "name").specificity();
        let scoped = Selector::shape("String")
            .unwrap()
            .within(Selector::shape("Person").unwrap())
            .specificity();
        assert!(broad < field);
        assert!(field < qualified);
        assert!(qualified < scoped);
    }

    #[test]
    fn display() {
        let selector = Selector::field_of("Person", "name")
            .at_depth(2)
            .within(Selector::shape("Address").unwrap())
            .lenient();
        assert_eq!(
            selector.to_string(),
            "field(Person, \"name\").at_depth(2).within(all(Address)).lenient()"
        );
    }
}
