//! Shape descriptors.
//!
//! A *shape* describes a data type the generator knows how to populate:
//! leaves (primitives, enums, externally generated values), records with
//! ordered fields, sequences, mappings and arrays. Records, sequences and
//! mappings may be generic over named type parameters.
//!
//! - [`TypeRef`] is a raw reference as written in a definition, possibly
//!   mentioning type variables (`Map<K, List<Item<T>>>`).
//! - [`ConcreteShape`] is a fully resolved reference with no variables left.
//! - [`ShapeRegistry`] holds the definitions, including the built-ins.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::ShapeError;
use crate::generators::ValueGenerator;

static IDENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier pattern"));

static TOKEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(?:(?P<ident>[A-Za-z_][A-Za-z0-9_]*)|(?P<array>\[\s*\])|(?P<punct>[<>,]))")
        .expect("token pattern")
});

pub fn is_identifier(s: &str) -> bool {
    IDENT.is_match(s)
}

// ————————————————————————————————————————————————————————————————————————————
// REFERENCES
// ————————————————————————————————————————————————————————————————————————————

/// A shape reference as written in a definition.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum TypeRef {
    /// A named shape with (possibly zero) type arguments.
    Named { name: String, args: Vec<TypeRef> },
    /// A type variable of the enclosing definition.
    Var(String),
    /// An array of the component shape.
    Array(Box<TypeRef>),
}

impl TypeRef {
    pub fn named(name: impl Into<String>) -> Self {
        TypeRef::Named { name: name.into(), args: Vec::new() }
    }

    pub fn generic(name: impl Into<String>, args: impl IntoIterator<Item = TypeRef>) -> Self {
        TypeRef::Named { name: name.into(), args: args.into_iter().collect() }
    }

    pub fn var(name: impl Into<String>) -> Self {
        TypeRef::Var(name.into())
    }

    pub fn array_of(component: TypeRef) -> Self {
        TypeRef::Array(Box::new(component))
    }

    /// Parse a type expression where every identifier names a shape.
    pub fn parse(input: &str) -> Result<Self, ShapeError> {
        Self::parse_with_params(input, &[])
    }

    /// Parse a type expression inside a definition that declares `params`;
    /// bare identifiers equal to one of them become [`TypeRef::Var`].
    pub fn parse_with_params(input: &str, params: &[String]) -> Result<Self, ShapeError> {
        let tokens = tokenize(input)?;
        let mut parser = Parser { input, tokens, pos: 0, params };
        let ty = parser.parse_type()?;
        if let Some((offset, _)) = parser.tokens.get(parser.pos) {
            return Err(parse_error(input, *offset, "unexpected trailing input"));
        }
        Ok(ty)
    }

    pub fn is_concrete(&self) -> bool {
        match self {
            TypeRef::Var(_) => false,
            TypeRef::Array(component) => component.is_concrete(),
            TypeRef::Named { args, .. } => args.iter().all(TypeRef::is_concrete),
        }
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeRef::Named { name, args } => write_generic(f, name, args),
            TypeRef::Var(name) => f.write_str(name),
            TypeRef::Array(component) => write!(f, "{component}[]"),
        }
    }
}

impl FromStr for TypeRef {
    type Err = ShapeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TypeRef::parse(s)
    }
}

impl TryFrom<String> for TypeRef {
    type Error = ShapeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        TypeRef::parse(&value)
    }
}

impl From<TypeRef> for String {
    fn from(value: TypeRef) -> Self {
        value.to_string()
    }
}

/// A fully resolved shape: every generic argument is itself concrete.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ConcreteShape {
    Named { name: String, args: Vec<ConcreteShape> },
    Array(Box<ConcreteShape>),
}

impl ConcreteShape {
    pub fn named(name: impl Into<String>) -> Self {
        ConcreteShape::Named { name: name.into(), args: Vec::new() }
    }

    pub fn generic(name: impl Into<String>, args: impl IntoIterator<Item = ConcreteShape>) -> Self {
        ConcreteShape::Named { name: name.into(), args: args.into_iter().collect() }
    }

    /// The shape name; arrays report the name of their innermost component.
    pub fn name(&self) -> &str {
        match self {
            ConcreteShape::Named { name, .. } => name,
            ConcreteShape::Array(component) => component.name(),
        }
    }

    pub fn args(&self) -> &[ConcreteShape] {
        match self {
            ConcreteShape::Named { args, .. } => args,
            ConcreteShape::Array(_) => &[],
        }
    }

    /// Number of array dimensions (`i32[][]` has two).
    pub fn dimensions(&self) -> usize {
        match self {
            ConcreteShape::Array(component) => 1 + component.dimensions(),
            ConcreteShape::Named { .. } => 0,
        }
    }

    pub fn to_type_ref(&self) -> TypeRef {
        match self {
            ConcreteShape::Named { name, args } => TypeRef::Named {
                name: name.clone(),
                args: args.iter().map(ConcreteShape::to_type_ref).collect(),
            },
            ConcreteShape::Array(component) => TypeRef::Array(Box::new(component.to_type_ref())),
        }
    }
}

impl fmt::Display for ConcreteShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConcreteShape::Named { name, args } => write_generic(f, name, args),
            ConcreteShape::Array(component) => write!(f, "{component}[]"),
        }
    }
}

fn write_generic<T: fmt::Display>(f: &mut fmt::Formatter<'_>, name: &str, args: &[T]) -> fmt::Result {
    f.write_str(name)?;
    if !args.is_empty() {
        f.write_str("<")?;
        for (i, arg) in args.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{arg}")?;
        }
        f.write_str(">")?;
    }
    Ok(())
}

/// The record member a position was declared by.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldRef {
    /// Name of the record that declares the field (the supertype for
    /// inherited fields).
    pub declaring: String,
    pub name: String,
}

impl FieldRef {
    pub fn new(declaring: impl Into<String>, name: impl Into<String>) -> Self {
        Self { declaring: declaring.into(), name: name.into() }
    }
}

impl fmt::Display for FieldRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.declaring, self.name)
    }
}

// ————————————————————————————————————————————————————————————————————————————
// DEFINITIONS
// ————————————————————————————————————————————————————————————————————————————

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LeafKind {
    Bool,
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    F32,
    F64,
    Char,
    String,
    Enum(Vec<String>),
    /// Produced by a [`ValueGenerator`] registered under the shape name.
    External,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShapeCategory {
    Leaf,
    Record,
    Array,
    Sequence,
    Mapping,
}

impl fmt::Display for ShapeCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ShapeCategory::Leaf => "leaf",
            ShapeCategory::Record => "record",
            ShapeCategory::Array => "array",
            ShapeCategory::Sequence => "sequence",
            ShapeCategory::Mapping => "mapping",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDef {
    pub name: String,
    pub ty: TypeRef,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RecordDef {
    pub params: Vec<String>,
    /// Supertype whose fields are inherited, written in terms of `params`.
    pub extends: Option<TypeRef>,
    /// Settable members in declaration order.
    pub fields: Vec<FieldDef>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShapeDef {
    Leaf(LeafKind),
    Record(RecordDef),
    /// A list- or set-like container over a single element parameter.
    Sequence { param: String, unique: bool },
    /// A key-value container. The first declared parameter is the key, the
    /// second the value, whatever they are called.
    Mapping { key_param: String, value_param: String },
}

impl ShapeDef {
    /// Declared type parameters, in declaration order.
    pub fn params(&self) -> Vec<&str> {
        match self {
            ShapeDef::Leaf(_) => Vec::new(),
            ShapeDef::Record(record) => record.params.iter().map(String::as_str).collect(),
            ShapeDef::Sequence { param, .. } => vec![param.as_str()],
            ShapeDef::Mapping { key_param, value_param } => vec![key_param.as_str(), value_param.as_str()],
        }
    }

    pub fn category(&self) -> ShapeCategory {
        match self {
            ShapeDef::Leaf(_) => ShapeCategory::Leaf,
            ShapeDef::Record(_) => ShapeCategory::Record,
            ShapeDef::Sequence { .. } => ShapeCategory::Sequence,
            ShapeDef::Mapping { .. } => ShapeCategory::Mapping,
        }
    }
}

/// Unparsed record definition; type expressions are parsed against the
/// declared parameters when the record is registered.
#[derive(Debug, Clone, Default)]
pub struct RecordSpec {
    name: String,
    params: Vec<String>,
    extends: Option<String>,
    fields: Vec<(String, String)>,
}

impl RecordSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), ..Self::default() }
    }

    pub fn param(mut self, param: impl Into<String>) -> Self {
        self.params.push(param.into());
        self
    }

    pub fn extends(mut self, supertype: impl Into<String>) -> Self {
        self.extends = Some(supertype.into());
        self
    }

    pub fn field(mut self, name: impl Into<String>, ty: impl Into<String>) -> Self {
        self.fields.push((name.into(), ty.into()));
        self
    }
}

// ————————————————————————————————————————————————————————————————————————————
// REGISTRY
// ————————————————————————————————————————————————————————————————————————————

const BUILTIN_LEAVES: &[(&str, LeafKind)] = &[
    ("bool", LeafKind::Bool),
    ("i8", LeafKind::I8),
    ("i16", LeafKind::I16),
    ("i32", LeafKind::I32),
    ("i64", LeafKind::I64),
    ("u8", LeafKind::U8),
    ("u16", LeafKind::U16),
    ("u32", LeafKind::U32),
    ("u64", LeafKind::U64),
    ("f32", LeafKind::F32),
    ("f64", LeafKind::F64),
    ("char", LeafKind::Char),
    ("String", LeafKind::String),
];

/// Catalog of shape definitions. Definitions may reference each other in
/// any order; [`ShapeRegistry::validate`] checks the references once the
/// catalog is complete.
#[derive(Clone)]
pub struct ShapeRegistry {
    shapes: IndexMap<String, ShapeDef>,
    generators: HashMap<String, Arc<dyn ValueGenerator>>,
}

impl Default for ShapeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ShapeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut generators: Vec<&String> = self.generators.keys().collect();
        generators.sort();
        f.debug_struct("ShapeRegistry")
            .field("shapes", &self.shapes)
            .field("generators", &generators)
            .finish()
    }
}

impl ShapeRegistry {
    /// A registry holding the built-in leaves plus `List<E>`, `Set<E>` and
    /// `Map<K, V>`.
    pub fn new() -> Self {
        let mut shapes = IndexMap::new();
        for (name, kind) in BUILTIN_LEAVES {
            shapes.insert(name.to_string(), ShapeDef::Leaf(kind.clone()));
        }
        shapes.insert("List".into(), ShapeDef::Sequence { param: "E".into(), unique: false });
        shapes.insert("Set".into(), ShapeDef::Sequence { param: "E".into(), unique: true });
        shapes.insert(
            "Map".into(),
            ShapeDef::Mapping { key_param: "K".into(), value_param: "V".into() },
        );
        Self { shapes, generators: HashMap::new() }
    }

    pub fn empty() -> Self {
        Self { shapes: IndexMap::new(), generators: HashMap::new() }
    }

    pub fn get(&self, name: &str) -> Option<&ShapeDef> {
        self.shapes.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.shapes.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.shapes.keys().map(String::as_str)
    }

    pub fn generator(&self, name: &str) -> Option<&Arc<dyn ValueGenerator>> {
        self.generators.get(name)
    }

    pub fn define(&mut self, name: impl Into<String>, def: ShapeDef) -> Result<&mut Self, ShapeError> {
        let name = name.into();
        if !is_identifier(&name) {
            return Err(ShapeError::InvalidIdentifier(name));
        }
        for param in def.params() {
            if !is_identifier(param) {
                return Err(ShapeError::InvalidIdentifier(param.to_string()));
            }
        }
        if self.shapes.contains_key(&name) {
            return Err(ShapeError::DuplicateShape(name));
        }
        self.shapes.insert(name, def);
        Ok(self)
    }

    pub fn define_record(&mut self, spec: RecordSpec) -> Result<&mut Self, ShapeError> {
        let RecordSpec { name, params, extends, fields } = spec;
        let extends = extends
            .map(|expr| TypeRef::parse_with_params(&expr, &params))
            .transpose()?;
        let fields = fields
            .into_iter()
            .map(|(field, expr)| {
                if !is_identifier(&field) {
                    return Err(ShapeError::InvalidIdentifier(field));
                }
                let ty = TypeRef::parse_with_params(&expr, &params)?;
                Ok(FieldDef { name: field, ty })
            })
            .collect::<Result<Vec<_>, ShapeError>>()?;
        self.define(name, ShapeDef::Record(RecordDef { params, extends, fields }))
    }

    pub fn define_enum<I, S>(&mut self, name: impl Into<String>, variants: I) -> Result<&mut Self, ShapeError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let name = name.into();
        let variants: Vec<String> = variants.into_iter().map(Into::into).collect();
        if variants.is_empty() {
            return Err(ShapeError::EmptyEnum(name));
        }
        self.define(name, ShapeDef::Leaf(LeafKind::Enum(variants)))
    }

    /// Register an externally generated leaf shape.
    pub fn define_leaf(
        &mut self,
        name: impl Into<String>,
        generator: impl ValueGenerator + 'static,
    ) -> Result<&mut Self, ShapeError> {
        let name = name.into();
        self.define(name.clone(), ShapeDef::Leaf(LeafKind::External))?;
        self.generators.insert(name, Arc::new(generator));
        Ok(self)
    }

    pub fn category(&self, shape: &ConcreteShape) -> Option<ShapeCategory> {
        match shape {
            ConcreteShape::Array(_) => Some(ShapeCategory::Array),
            ConcreteShape::Named { name, .. } => self.get(name).map(ShapeDef::category),
        }
    }

    /// True when `sub` is `sup` or inherits from it through `extends`.
    pub fn is_subtype(&self, sub: &str, sup: &str) -> bool {
        let mut current = sub;
        for _ in 0..=self.shapes.len() {
            if current == sup {
                return true;
            }
            match self.get(current) {
                Some(ShapeDef::Record(RecordDef { extends: Some(TypeRef::Named { name, .. }), .. })) => {
                    current = name;
                }
                _ => return false,
            }
        }
        false
    }

    /// Check that every definition only references known shapes with the
    /// right number of arguments, only uses its own type variables, and
    /// that inheritance chains are acyclic and free of duplicate fields.
    pub fn validate(&self) -> Result<(), ShapeError> {
        for (name, def) in &self.shapes {
            match def {
                ShapeDef::Record(record) => {
                    for field in &record.fields {
                        self.check_reference(name, &record.params, &field.ty)?;
                    }
                    if let Some(supertype) = &record.extends {
                        self.check_reference(name, &record.params, supertype)?;
                        let is_record = matches!(
                            supertype,
                            TypeRef::Named { name: sup, .. } if matches!(self.get(sup), Some(ShapeDef::Record(_)))
                        );
                        if !is_record {
                            return Err(ShapeError::InvalidSupertype {
                                shape: name.clone(),
                                supertype: supertype.to_string(),
                            });
                        }
                    }
                    self.check_field_names(name)?;
                }
                ShapeDef::Leaf(LeafKind::Enum(variants)) if variants.is_empty() => {
                    return Err(ShapeError::EmptyEnum(name.clone()));
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn check_reference(&self, shape: &str, params: &[String], ty: &TypeRef) -> Result<(), ShapeError> {
        match ty {
            TypeRef::Var(var) => {
                if !params.contains(var) {
                    return Err(ShapeError::UndeclaredVariable { shape: shape.into(), var: var.clone() });
                }
            }
            TypeRef::Array(component) => self.check_reference(shape, params, component)?,
            TypeRef::Named { name, args } => {
                let def = self.get(name).ok_or_else(|| ShapeError::UnknownReference {
                    shape: shape.into(),
                    missing: name.clone(),
                })?;
                let expected = def.params().len();
                if !args.is_empty() && args.len() != expected {
                    return Err(ShapeError::Arity {
                        shape: shape.into(),
                        reference: ty.to_string(),
                        expected,
                        actual: args.len(),
                    });
                }
                for arg in args {
                    self.check_reference(shape, params, arg)?;
                }
            }
        }
        Ok(())
    }

    fn check_field_names(&self, shape: &str) -> Result<(), ShapeError> {
        let mut visited = HashSet::new();
        let mut seen = HashSet::new();
        let mut current = Some(shape);
        while let Some(name) = current {
            if !visited.insert(name) {
                return Err(ShapeError::CyclicSupertype(shape.into()));
            }
            let Some(ShapeDef::Record(record)) = self.get(name) else { break };
            for field in &record.fields {
                if !seen.insert(field.name.as_str()) {
                    return Err(ShapeError::DuplicateField { shape: shape.into(), field: field.name.clone() });
                }
            }
            current = match &record.extends {
                Some(TypeRef::Named { name, .. }) => Some(name.as_str()),
                _ => None,
            };
        }
        Ok(())
    }
}

// ————————————————————————————————————————————————————————————————————————————
// TYPE EXPRESSION PARSER
// ————————————————————————————————————————————————————————————————————————————

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Ident(String),
    Lt,
    Gt,
    Comma,
    Brackets,
}

fn parse_error(input: &str, offset: usize, message: &str) -> ShapeError {
    ShapeError::Parse { input: input.into(), offset, message: message.into() }
}

fn tokenize(input: &str) -> Result<Vec<(usize, Token)>, ShapeError> {
    let mut tokens = Vec::new();
    let mut offset = 0;
    while offset < input.len() {
        let rest = &input[offset..];
        let trimmed = rest.trim_start();
        if trimmed.is_empty() {
            break;
        }
        let start = offset + (rest.len() - trimmed.len());
        let Some(caps) = TOKEN.captures(rest) else {
            return Err(parse_error(input, start, "unexpected character"));
        };
        let token = if let Some(m) = caps.name("ident") {
            Token::Ident(m.as_str().to_string())
        } else if caps.name("array").is_some() {
            Token::Brackets
        } else {
            match caps.name("punct").map(|m| m.as_str()) {
                Some("<") => Token::Lt,
                Some(">") => Token::Gt,
                _ => Token::Comma,
            }
        };
        tokens.push((start, token));
        offset += caps.get(0).map_or(rest.len(), |m| m.end());
    }
    Ok(tokens)
}

struct Parser<'a> {
    input: &'a str,
    tokens: Vec<(usize, Token)>,
    pos: usize,
    params: &'a [String],
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(_, t)| t)
    }

    fn next(&mut self) -> Option<(usize, Token)> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn fail<T>(&self, offset: usize, message: &str) -> Result<T, ShapeError> {
        Err(parse_error(self.input, offset, message))
    }

    fn parse_type(&mut self) -> Result<TypeRef, ShapeError> {
        let end = self.input.len();
        let (offset, name) = match self.next() {
            Some((offset, Token::Ident(name))) => (offset, name),
            Some((offset, _)) => return self.fail(offset, "expected a shape name"),
            None => return self.fail(end, "unexpected end of input"),
        };

        let mut args = Vec::new();
        if self.peek() == Some(&Token::Lt) {
            self.next();
            loop {
                args.push(self.parse_type()?);
                match self.next() {
                    Some((_, Token::Comma)) => continue,
                    Some((_, Token::Gt)) => break,
                    Some((offset, _)) => return self.fail(offset, "expected `,` or `>`"),
                    None => return self.fail(end, "unclosed `<`"),
                }
            }
        }

        let mut ty = if self.params.contains(&name) {
            if !args.is_empty() {
                return self.fail(offset, "type variables take no arguments");
            }
            TypeRef::Var(name)
        } else {
            TypeRef::Named { name, args }
        };

        while self.peek() == Some(&Token::Brackets) {
            self.next();
            ty = TypeRef::Array(Box::new(ty));
        }
        Ok(ty)
    }
}

// ————————————————————————————————————————————————————————————————————————————
// TESTS
// ————————————————————————————————————————————————————————————————————————————
