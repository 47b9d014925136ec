//! Generation context: the immutable snapshot of selector bindings,
//! settings, seed and mode a model is built from.
use std::fmt;
use std::sync::Arc;

use crate::error::SettingsError;
use crate::generators::ValueGenerator;
use crate::selector::Selector;
use crate::settings::Settings;
use crate::shape::TypeRef;
use crate::value::Value;

pub type Supplier = Arc<dyn Fn() -> Value + Send + Sync>;
pub type Callback = Arc<dyn Fn(&mut Value) + Send + Sync>;
pub type Predicate = Arc<dyn Fn(&Value) -> bool + Send + Sync>;
pub type Transform = Arc<dyn Fn(&Value) -> Value + Send + Sync>;

/// Derives a destination's value from another node of the same instance.
#[derive(Clone)]
pub struct Assignment {
    pub origin: Selector,
    pub transform: Transform,
    /// When present and false for the origin value, the destination falls
    /// back to default construction.
    pub condition: Option<Predicate>,
}

impl Assignment {
    /// Copy the origin value unchanged.
    pub fn of(origin: Selector) -> Self {
        Self { origin, transform: Arc::new(Value::clone), condition: None }
    }

    pub fn transform(mut self, f: impl Fn(&Value) -> Value + Send + Sync + 'static) -> Self {
        self.transform = Arc::new(f);
        self
    }

    pub fn when(mut self, condition: impl Fn(&Value) -> bool + Send + Sync + 'static) -> Self {
        self.condition = Some(Arc::new(condition));
        self
    }
}

impl fmt::Debug for Assignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Assignment")
            .field("origin", &self.origin.to_string())
            .field("conditional", &self.condition.is_some())
            .finish()
    }
}

#[derive(Clone)]
pub enum Override {
    Ignore,
    Set(Value),
    Supply(Supplier),
    Generate(Arc<dyn ValueGenerator>),
    Subtype(TypeRef),
    Assign(Assignment),
    /// Build the matched subtree in blank mode.
    Blank,
    OnComplete(Callback),
    Filter(Predicate),
    Nullable,
    Unique,
}

impl Override {
    /// Overrides that decide where a node's value comes from. At most one
    /// applies per node.
    pub fn is_source(&self) -> bool {
        matches!(
            self,
            Override::Ignore
                | Override::Set(_)
                | Override::Supply(_)
                | Override::Generate(_)
                | Override::Assign(_)
                | Override::Blank
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            Override::Ignore => "ignore",
            Override::Set(_) => "set",
            Override::Supply(_) => "supply",
            Override::Generate(_) => "generate",
            Override::Subtype(_) => "subtype",
            Override::Assign(_) => "assign",
            Override::Blank => "blank",
            Override::OnComplete(_) => "on_complete",
            Override::Filter(_) => "filter",
            Override::Nullable => "nullable",
            Override::Unique => "unique",
        }
    }
}

impl fmt::Debug for Override {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Override::Set(value) => f.debug_tuple("Set").field(value).finish(),
            Override::Subtype(ty) => f.debug_tuple("Subtype").field(&ty.to_string()).finish(),
            Override::Assign(assignment) => f.debug_tuple("Assign").field(assignment).finish(),
            other => f.write_str(other.name()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Binding {
    pub selector: Selector,
    pub action: Override,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    #[default]
    Normal,
    /// Only explicit overrides produce values; everything else is absent
    /// and no randomness is consumed by default construction.
    Blank,
}

/// Immutable once built. Bindings keep their configuration order.
#[derive(Debug, Clone, Default)]
pub struct GenerationContext {
    pub bindings: Vec<Binding>,
    pub settings: Settings,
    pub seed: Option<u64>,
    pub mode: Mode,
    pub root_args: Vec<TypeRef>,
}

impl GenerationContext {
    pub fn builder() -> ContextBuilder {
        ContextBuilder::default()
    }
}

#[derive(Debug, Default)]
pub struct ContextBuilder {
    context: GenerationContext,
    error: Option<SettingsError>,
}

impl ContextBuilder {
    fn bind(mut self, selector: Selector, action: Override) -> Self {
        self.context.bindings.push(Binding { selector, action });
        self
    }

    pub fn ignore(self, selector: Selector) -> Self {
        self.bind(selector, Override::Ignore)
    }

    pub fn set(self, selector: Selector, value: impl Into<Value>) -> Self {
        self.bind(selector, Override::Set(value.into()))
    }

    pub fn supply(self, selector: Selector, supplier: impl Fn() -> Value + Send + Sync + 'static) -> Self {
        self.bind(selector, Override::Supply(Arc::new(supplier)))
    }

    pub fn generate(self, selector: Selector, generator: impl ValueGenerator + 'static) -> Self {
        self.bind(selector, Override::Generate(Arc::new(generator)))
    }

    pub fn subtype(self, selector: Selector, subtype: TypeRef) -> Self {
        self.bind(selector, Override::Subtype(subtype))
    }

    pub fn assign(self, destination: Selector, assignment: Assignment) -> Self {
        self.bind(destination, Override::Assign(assignment))
    }

    pub fn on_complete(self, selector: Selector, callback: impl Fn(&mut Value) + Send + Sync + 'static) -> Self {
        self.bind(selector, Override::OnComplete(Arc::new(callback)))
    }

    /// Keep only values accepted by `predicate`, regenerating rejected ones.
    pub fn filter(self, selector: Selector, predicate: impl Fn(&Value) -> bool + Send + Sync + 'static) -> Self {
        self.bind(selector, Override::Filter(Arc::new(predicate)))
    }

    pub fn nullable(self, selector: Selector) -> Self {
        self.bind(selector, Override::Nullable)
    }

    pub fn unique(self, selector: Selector) -> Self {
        self.bind(selector, Override::Unique)
    }

    pub fn blank_at(self, selector: Selector) -> Self {
        self.bind(selector, Override::Blank)
    }

    /// Splice the bindings of `model` in below the positions `selector`
    /// matches; its `root()` selectors target those positions. A blank
    /// `model` blanks the subtree. Settings, seed and root arguments of
    /// `model` are not carried over.
    pub fn set_model(mut self, selector: Selector, model: &GenerationContext) -> Self {
        if model.mode == Mode::Blank {
            self = self.blank_at(selector.clone());
        }
        for binding in &model.bindings {
            match rescope(binding, &selector) {
                Some(binding) => self.context.bindings.push(binding),
                None => {
                    self.error.get_or_insert(SettingsError::Invalid(format!(
                        "{} pins a depth, so it can only be spliced under a depth-pinned selector, not {selector}",
                        binding.selector
                    )));
                }
            }
        }
        self
    }

    pub fn settings(mut self, settings: Settings) -> Self {
        self.context.settings = settings;
        self
    }

    /// Override one setting by key. Errors are reported by [`Self::build`].
    pub fn setting(mut self, key: &str, raw: &str) -> Self {
        if let Err(err) = self.context.settings.apply(key, raw) {
            self.error.get_or_insert(err);
        }
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.context.seed = Some(seed);
        self
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.context.settings.max_depth = max_depth;
        self
    }

    /// Accept selectors that match nothing.
    pub fn lenient(mut self) -> Self {
        self.context.settings.fail_on_unmatched_selectors = false;
        self
    }

    pub fn blank(mut self) -> Self {
        self.context.mode = Mode::Blank;
        self
    }

    pub fn root_type_arguments(mut self, args: impl IntoIterator<Item = TypeRef>) -> Self {
        self.context.root_args = args.into_iter().collect();
        self
    }

    pub fn build(self) -> Result<GenerationContext, SettingsError> {
        if let Some(err) = self.error {
            return Err(err);
        }
        self.context.settings.validate()?;
        Ok(self.context)
    }
}

fn rescope(binding: &Binding, anchor: &Selector) -> Option<Binding> {
    let action = match &binding.action {
        Override::Assign(assignment) => Override::Assign(Assignment {
            origin: assignment.origin.under(anchor)?,
            ..assignment.clone()
        }),
        other => other.clone(),
    };
    Some(Binding { selector: binding.selector.under(anchor)?, action })
}
