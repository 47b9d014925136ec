//! Global generation settings.
//!
//! Settings are a plain serde struct with defaults. They can be loaded from
//! JSON (see [`crate::catalog::load_settings`]) and overridden key by key
//! through the string lookup in [`Settings::apply`].
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::SettingsError;
use crate::shape::TypeRef;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Record fields and leaves may be null.
    pub nullable_default: bool,
    /// Sequence and array elements may be null.
    pub nullable_elements: bool,
    pub nullable_map_keys: bool,
    pub nullable_map_values: bool,
    /// Probability of a null draw at a nullable position.
    pub null_probability: f64,
    pub min_size: usize,
    pub max_size: usize,
    pub max_depth: usize,
    pub unique_retry_limit: usize,
    pub filter_retry_limit: usize,
    /// Bound on key collisions when filling a mapping or set.
    pub fill_attempt_limit: usize,
    pub fail_on_unmatched_selectors: bool,
    pub int_min: i64,
    pub int_max: i64,
    pub float_min: f64,
    pub float_max: f64,
    pub string_min_len: usize,
    pub string_max_len: usize,
    /// Element shape for sequences and mappings whose arguments were erased.
    pub erased_fallback: Option<TypeRef>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            nullable_default: false,
            nullable_elements: false,
            nullable_map_keys: false,
            nullable_map_values: false,
            null_probability: 1.0 / 6.0,
            min_size: 2,
            max_size: 6,
            max_depth: 8,
            unique_retry_limit: 1000,
            filter_retry_limit: 1000,
            fill_attempt_limit: 100,
            fail_on_unmatched_selectors: true,
            int_min: 1,
            int_max: 10_000,
            float_min: 1.0,
            float_max: 10_000.0,
            string_min_len: 3,
            string_max_len: 10,
            erased_fallback: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SettingKey {
    NullableDefault,
    NullableElements,
    NullableMapKeys,
    NullableMapValues,
    NullProbability,
    MinSize,
    MaxSize,
    MaxDepth,
    UniqueRetryLimit,
    FilterRetryLimit,
    FillAttemptLimit,
    FailOnUnmatchedSelectors,
    IntMin,
    IntMax,
    FloatMin,
    FloatMax,
    StringMinLen,
    StringMaxLen,
    ErasedFallback,
}

impl SettingKey {
    pub const ALL: [SettingKey; 19] = [
        SettingKey::NullableDefault,
        SettingKey::NullableElements,
        SettingKey::NullableMapKeys,
        SettingKey::NullableMapValues,
        SettingKey::NullProbability,
        SettingKey::MinSize,
        SettingKey::MaxSize,
        SettingKey::MaxDepth,
        SettingKey::UniqueRetryLimit,
        SettingKey::FilterRetryLimit,
        SettingKey::FillAttemptLimit,
        SettingKey::FailOnUnmatchedSelectors,
        SettingKey::IntMin,
        SettingKey::IntMax,
        SettingKey::FloatMin,
        SettingKey::FloatMax,
        SettingKey::StringMinLen,
        SettingKey::StringMaxLen,
        SettingKey::ErasedFallback,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SettingKey::NullableDefault => "nullable_default",
            SettingKey::NullableElements => "nullable_elements",
            SettingKey::NullableMapKeys => "nullable_map_keys",
            SettingKey::NullableMapValues => "nullable_map_values",
            SettingKey::NullProbability => "null_probability",
            SettingKey::MinSize => "min_size",
            SettingKey::MaxSize => "max_size",
            SettingKey::MaxDepth => "max_depth",
            SettingKey::UniqueRetryLimit => "unique_retry_limit",
            SettingKey::FilterRetryLimit => "filter_retry_limit",
            SettingKey::FillAttemptLimit => "fill_attempt_limit",
            SettingKey::FailOnUnmatchedSelectors => "fail_on_unmatched_selectors",
            SettingKey::IntMin => "int_min",
            SettingKey::IntMax => "int_max",
            SettingKey::FloatMin => "float_min",
            SettingKey::FloatMax => "float_max",
            SettingKey::StringMinLen => "string_min_len",
            SettingKey::StringMaxLen => "string_max_len",
            SettingKey::ErasedFallback => "erased_fallback",
        }
    }
}

impl fmt::Display for SettingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SettingKey {
    type Err = SettingsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SettingKey::ALL
            .into_iter()
            .find(|key| key.as_str() == s)
            .ok_or_else(|| SettingsError::UnknownKey(s.to_string()))
    }
}

fn parse_value<T>(key: SettingKey, raw: &str) -> Result<T, SettingsError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    raw.trim().parse().map_err(|e: T::Err| SettingsError::InvalidValue {
        key: key.to_string(),
        value: raw.to_string(),
        reason: e.to_string(),
    })
}

impl Settings {
    /// Set one key from its string form.
    pub fn apply(&mut self, key: &str, raw: &str) -> Result<(), SettingsError> {
        let key: SettingKey = key.parse()?;
        match key {
            SettingKey::NullableDefault => self.nullable_default = parse_value(key, raw)?,
            SettingKey::NullableElements => self.nullable_elements = parse_value(key, raw)?,
            SettingKey::NullableMapKeys => self.nullable_map_keys = parse_value(key, raw)?,
            SettingKey::NullableMapValues => self.nullable_map_values = parse_value(key, raw)?,
            SettingKey::NullProbability => self.null_probability = parse_value(key, raw)?,
            SettingKey::MinSize => self.min_size = parse_value(key, raw)?,
            SettingKey::MaxSize => self.max_size = parse_value(key, raw)?,
            SettingKey::MaxDepth => self.max_depth = parse_value(key, raw)?,
            SettingKey::UniqueRetryLimit => self.unique_retry_limit = parse_value(key, raw)?,
            SettingKey::FilterRetryLimit => self.filter_retry_limit = parse_value(key, raw)?,
            SettingKey::FillAttemptLimit => self.fill_attempt_limit = parse_value(key, raw)?,
            SettingKey::FailOnUnmatchedSelectors => {
                self.fail_on_unmatched_selectors = parse_value(key, raw)?
            }
            SettingKey::IntMin => self.int_min = parse_value(key, raw)?,
            SettingKey::IntMax => self.int_max = parse_value(key, raw)?,
            SettingKey::FloatMin => self.float_min = parse_value(key, raw)?,
            SettingKey::FloatMax => self.float_max = parse_value(key, raw)?,
            SettingKey::StringMinLen => self.string_min_len = parse_value(key, raw)?,
            SettingKey::StringMaxLen => self.string_max_len = parse_value(key, raw)?,
            SettingKey::ErasedFallback => {
                let raw = raw.trim();
                self.erased_fallback = if raw.is_empty() || raw == "none" {
                    None
                } else {
                    Some(parse_value(key, raw)?)
                };
            }
        }
        Ok(())
    }

    /// String form of one key, as accepted by [`Settings::apply`].
    pub fn get(&self, key: SettingKey) -> String {
        match key {
            SettingKey::NullableDefault => self.nullable_default.to_string(),
            SettingKey::NullableElements => self.nullable_elements.to_string(),
            SettingKey::NullableMapKeys => self.nullable_map_keys.to_string(),
            SettingKey::NullableMapValues => self.nullable_map_values.to_string(),
            SettingKey::NullProbability => self.null_probability.to_string(),
            SettingKey::MinSize => self.min_size.to_string(),
            SettingKey::MaxSize => self.max_size.to_string(),
            SettingKey::MaxDepth => self.max_depth.to_string(),
            SettingKey::UniqueRetryLimit => self.unique_retry_limit.to_string(),
            SettingKey::FilterRetryLimit => self.filter_retry_limit.to_string(),
            SettingKey::FillAttemptLimit => self.fill_attempt_limit.to_string(),
            SettingKey::FailOnUnmatchedSelectors => self.fail_on_unmatched_selectors.to_string(),
            SettingKey::IntMin => self.int_min.to_string(),
            SettingKey::IntMax => self.int_max.to_string(),
            SettingKey::FloatMin => self.float_min.to_string(),
            SettingKey::FloatMax => self.float_max.to_string(),
            SettingKey::StringMinLen => self.string_min_len.to_string(),
            SettingKey::StringMaxLen => self.string_max_len.to_string(),
            SettingKey::ErasedFallback => self
                .erased_fallback
                .as_ref()
                .map_or_else(|| "none".to_string(), ToString::to_string),
        }
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if !(0.0..=1.0).contains(&self.null_probability) {
            return Err(SettingsError::Invalid(format!(
                "null_probability must lie in [0, 1], got {}",
                self.null_probability
            )));
        }
        check_range("min_size", "max_size", self.min_size, self.max_size)?;
        check_range("int_min", "int_max", self.int_min, self.int_max)?;
        check_range("string_min_len", "string_max_len", self.string_min_len, self.string_max_len)?;
        if !self.float_min.is_finite() || !self.float_max.is_finite() {
            return Err(SettingsError::Invalid("float bounds must be finite".into()));
        }
        check_range("float_min", "float_max", self.float_min, self.float_max)?;
        if let Some(fallback) = &self.erased_fallback {
            if !fallback.is_concrete() {
                return Err(SettingsError::Invalid(format!(
                    "erased_fallback must be concrete, got `{fallback}`"
                )));
            }
        }
        Ok(())
    }
}

fn check_range<T: PartialOrd + fmt::Display>(min_key: &str, max_key: &str, min: T, max: T) -> Result<(), SettingsError> {
    if min > max {
        return Err(SettingsError::Invalid(format!("{min_key} ({min}) exceeds {max_key} ({max})")));
    }
    Ok(())
}
