//! Value generators and default leaf construction.
use std::fmt;

use ordered_float::OrderedFloat;

use crate::random::Random;
use crate::settings::Settings;
use crate::shape::LeafKind;
use crate::value::Value;

/// Produces a value from the random source. Implementations must be
/// deterministic given the state of `random`.
pub trait ValueGenerator: Send + Sync {
    fn generate(&self, random: &mut Random) -> Value;
}

impl<F> ValueGenerator for F
where
    F: Fn(&mut Random) -> Value + Send + Sync,
{
    fn generate(&self, random: &mut Random) -> Value {
        self(random)
    }
}

/// Picks one of a fixed set of values.
#[derive(Debug, Clone)]
pub struct OneOf(pub Vec<Value>);

impl ValueGenerator for OneOf {
    fn generate(&self, random: &mut Random) -> Value {
        random.pick(&self.0).cloned().unwrap_or(Value::Null)
    }
}

/// Uniform integer in `[min, max]`.
#[derive(Debug, Clone, Copy)]
pub struct IntRange {
    pub min: i64,
    pub max: i64,
}

impl ValueGenerator for IntRange {
    fn generate(&self, random: &mut Random) -> Value {
        Value::Int(random.long_range(self.min, self.max))
    }
}

impl fmt::Debug for dyn ValueGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<generator>")
    }
}

fn clamp_signed(settings: &Settings, lo: i64, hi: i64) -> (i64, i64) {
    let min = settings.int_min.clamp(lo, hi);
    let max = settings.int_max.clamp(lo, hi);
    (min, max.max(min))
}

fn clamp_unsigned(settings: &Settings, hi: u64) -> (u64, u64) {
    let min = u64::try_from(settings.int_min.max(0)).unwrap_or(0).min(hi);
    let max = u64::try_from(settings.int_max.max(0)).unwrap_or(0).min(hi);
    (min, max.max(min))
}

/// Default construction for built-in leaves. External leaves are handled by
/// the caller through the registry; here they yield `Null`.
pub fn leaf_value(kind: &LeafKind, settings: &Settings, random: &mut Random) -> Value {
    match kind {
        LeafKind::Bool => Value::Bool(random.chance(0.5)),
        LeafKind::I8 => signed(settings, random, i8::MIN.into(), i8::MAX.into()),
        LeafKind::I16 => signed(settings, random, i16::MIN.into(), i16::MAX.into()),
        LeafKind::I32 => signed(settings, random, i32::MIN.into(), i32::MAX.into()),
        LeafKind::I64 => signed(settings, random, i64::MIN, i64::MAX),
        LeafKind::U8 => unsigned(settings, random, u8::MAX.into()),
        LeafKind::U16 => unsigned(settings, random, u16::MAX.into()),
        LeafKind::U32 => unsigned(settings, random, u32::MAX.into()),
        LeafKind::U64 => unsigned(settings, random, u64::MAX),
        LeafKind::F32 => {
            let x = random.double_range(settings.float_min, settings.float_max) as f32;
            Value::Float(OrderedFloat(f64::from(x)))
        }
        LeafKind::F64 => Value::Float(OrderedFloat(random.double_range(settings.float_min, settings.float_max))),
        LeafKind::Char => Value::Char(random.upper_char()),
        LeafKind::String => Value::Str(random.alphabetic_string(settings.string_min_len, settings.string_max_len)),
        LeafKind::Enum(variants) => random.pick(variants).map_or(Value::Null, |v| Value::Str(v.clone())),
        LeafKind::External => Value::Null,
    }
}

fn signed(settings: &Settings, random: &mut Random, lo: i64, hi: i64) -> Value {
    let (min, max) = clamp_signed(settings, lo, hi);
    Value::Int(random.long_range(min, max))
}

fn unsigned(settings: &Settings, random: &mut Random, hi: u64) -> Value {
    let (min, max) = clamp_unsigned(settings, hi);
    Value::UInt(random.uint_range(min, max))
}
