//! Seeded, reproducible fixture synthesis.
//!
//! Describe data shapes in a [`ShapeRegistry`], pick a root shape, configure
//! overrides through a [`GenerationContext`], and let a [`Model`] produce
//! populated [`Value`] trees:
//!
//! ```
//! use std::sync::Arc;
//! use specimen::{GenerationContext, Model, RecordSpec, Selector, ShapeRegistry, TypeRef, Value};
//!
//! let mut registry = ShapeRegistry::new();
//! registry
//!     .define_record(RecordSpec::new("Person").field("id", "i64").field("tags", "List<String>"))
//!     .unwrap();
//! let context = GenerationContext::builder()
//!     .with_seed(42)
//!     .set(Selector::field("id"), 7)
//!     .build()
//!     .unwrap();
//! let model = Model::new(Arc::new(registry), TypeRef::named("Person"), context).unwrap();
//! let person = model.generate().unwrap();
//! assert_eq!(person.value.field("id"), Some(&Value::Int(7)));
//! ```
pub mod catalog;
pub mod context;
pub mod engine;
pub mod error;
pub mod generators;
pub mod graph;
pub mod logging;
pub mod model;
pub mod random;
pub mod report;
pub mod resolve;
pub mod selector;
pub mod settings;
pub mod shape;
pub mod value;

pub use context::{Assignment, GenerationContext, Mode, Override};
pub use engine::{GenerationListener, NoopListener};
pub use error::{BuildError, CatalogError, GenerationError, SettingsError, ShapeError, UnresolvedTypeError};
pub use generators::ValueGenerator;
pub use graph::{Node, NodeGraph, NodeId, NodeKind};
pub use model::{Generated, Model};
pub use random::Random;
pub use selector::Selector;
pub use settings::Settings;
pub use shape::{ConcreteShape, RecordSpec, ShapeDef, ShapeRegistry, TypeRef};
pub use value::Value;
