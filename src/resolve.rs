//! Binding scopes and the type-descriptor resolver.
//!
//! A [`BindingScope`] is an immutable pair of maps: the *local* bindings of
//! the shape currently being expanded and the *root* bindings supplied by the
//! caller for the root shape. Lookup consults the local map, then the root
//! map. Intermediate ancestors are never consulted; nested generic positions
//! already carry their concrete arguments by the time a child scope exists.
use std::sync::Arc;

use indexmap::IndexMap;

use crate::error::UnresolvedTypeError;
use crate::shape::{ConcreteShape, FieldRef, TypeRef};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BindingScope {
    local: Arc<IndexMap<String, ConcreteShape>>,
    root: Arc<IndexMap<String, ConcreteShape>>,
}

impl BindingScope {
    /// The scope of the root node. Its bindings are also the root map of
    /// every scope derived from it.
    pub fn root(bindings: IndexMap<String, ConcreteShape>) -> Self {
        let bindings = Arc::new(bindings);
        Self { local: bindings.clone(), root: bindings }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// A new scope sharing this scope's root map.
    pub fn child(&self, bindings: IndexMap<String, ConcreteShape>) -> Self {
        Self { local: Arc::new(bindings), root: self.root.clone() }
    }

    /// Bind `params` to `args` by position.
    pub fn bind<'a>(&self, params: impl IntoIterator<Item = &'a str>, args: &[ConcreteShape]) -> Self {
        let bindings = params
            .into_iter()
            .zip(args.iter())
            .map(|(param, arg)| (param.to_string(), arg.clone()))
            .collect();
        self.child(bindings)
    }

    pub fn lookup(&self, var: &str) -> Option<&ConcreteShape> {
        self.local.get(var).or_else(|| self.root.get(var))
    }

    pub fn local(&self) -> &IndexMap<String, ConcreteShape> {
        &self.local
    }

    pub fn is_empty(&self) -> bool {
        self.local.is_empty() && self.root.is_empty()
    }
}

/// Turns raw references into concrete shapes.
///
/// Plain shapes resolve directly; type variables are looked up in the scope
/// (nearest first, then root); generic arguments and array components are
/// resolved independently and recursively.
pub fn resolve(
    raw: &TypeRef,
    field: Option<&FieldRef>,
    scope: &BindingScope,
) -> Result<ConcreteShape, UnresolvedTypeError> {
    resolve_inner(raw, scope).map_err(|argument| UnresolvedTypeError {
        raw: raw.to_string(),
        argument,
        field: field.map(ToString::to_string),
    })
}

fn resolve_inner(raw: &TypeRef, scope: &BindingScope) -> Result<ConcreteShape, String> {
    match raw {
        TypeRef::Var(var) => scope.lookup(var).cloned().ok_or_else(|| var.clone()),
        TypeRef::Array(component) => Ok(ConcreteShape::Array(Box::new(resolve_inner(component, scope)?))),
        TypeRef::Named { name, args } => {
            let args = args
                .iter()
                .map(|arg| resolve_inner(arg, scope))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(ConcreteShape::Named { name: name.clone(), args })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bindings(pairs: &[(&str, &str)]) -> IndexMap<String, ConcreteShape> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), ConcreteShape::named(*v)))
            .collect()
    }

    #[test]
    fn local_then_root() {
        let root = BindingScope::root(bindings(&[("T", "String"), ("R", "bool")]));
        let child = root.child(bindings(&[("T", "i32")]));
        assert_eq!(child.lookup("T"), Some(&ConcreteShape::named("i32")));
        assert_eq!(child.lookup("R"), Some(&ConcreteShape::named("bool")));
        assert_eq!(root.lookup("T"), Some(&ConcreteShape::named("String")));
    }

    #[test]
    fn grandchild_skips_intermediate_scope() {
        let root = BindingScope::root(IndexMap::new());
        let parent = root.child(bindings(&[("A", "i64")]));
        let child = parent.child(bindings(&[("B", "char")]));
        assert_eq!(child.lookup("A"), None);
        assert_eq!(child.lookup("B"), Some(&ConcreteShape::named("char")));
    }

    #[test]
    fn bind_is_positional() {
        let scope = BindingScope::empty().bind(["V", "K"], &[ConcreteShape::named("String"), ConcreteShape::named("i32")]);
        assert_eq!(scope.lookup("V"), Some(&ConcreteShape::named("String")));
        assert_eq!(scope.lookup("K"), Some(&ConcreteShape::named("i32")));
    }

    #[test]
    fn resolves_nested_generics_and_arrays() {
        let scope = BindingScope::root(bindings(&[("T", "u8")]));
        let raw = TypeRef::parse_with_params("Map<String, List<T>>[]", &["T".to_string()]).unwrap();
        let shape = resolve(&raw, None, &scope).unwrap();
        assert_eq!(shape.to_string(), "Map<String, List<u8>>[]");
        assert_eq!(shape.dimensions(), 1);
    }

    #[test]
    fn unresolved_reports_argument_and_field() {
        let raw = TypeRef::parse_with_params("List<T>", &["T".to_string()]).unwrap();
        let field = FieldRef::new("Holder", "items");
        let err = resolve(&raw, Some(&field), &BindingScope::empty()).unwrap_err();
        assert_eq!(err.raw, "List<T>");
        assert_eq!(err.argument, "T");
        assert_eq!(err.field.as_deref(), Some("Holder.items"));
        assert!(err.to_string().contains("declared by field Holder.items"));
    }
}
