/*!
 * Value constraints.
 *
 * A [`Constraint`] validates a param's value and can correct an invalid value
 * to the nearest valid one. Whether an invalid value is rejected or corrected
 * is decided by the constraint's [`ConstraintPolicy`].
 *
 * Range and choice constraints apply element-wise to arrays. The
 * [`LengthConstraint`] bounds array element counts and string lengths.
 */
use std::collections::BTreeMap;
use std::fmt::Debug;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use devmodel_core::types::Value;

use crate::error::{DeviceError, Result};
use crate::polyglot::PolyglotText;

/// What to do with a value that fails validation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintPolicy {
    /// Refuse the value with `INVALID_ARGUMENT`
    Reject,
    /// Replace the value with `constrain(value)`
    Clamp,
}

/// Validation and correction rule for a param's value domain
///
/// Implementations hold no per-call mutable state and may be shared between
/// params.
pub trait Constraint: Send + Sync + Debug {
    /// Whether `value` satisfies the constraint
    fn is_valid(&self, value: &Value) -> bool;

    /// Nearest valid value to `value`
    ///
    /// `constrain(constrain(v)) == constrain(v)` for every `v`.
    fn constrain(&self, value: &Value) -> Value;

    /// How invalid values are handled
    fn policy(&self) -> ConstraintPolicy;

    /// Serializable description of the constraint
    fn spec(&self) -> ConstraintSpec;
}

/// Shared handle to a constraint
pub type SharedConstraint = Arc<dyn Constraint>;

/// Run `value` through `constraint` according to its policy
pub fn admit(constraint: &dyn Constraint, value: Value) -> Result<Value> {
    if constraint.is_valid(&value) {
        return Ok(value);
    }
    match constraint.policy() {
        ConstraintPolicy::Reject => Err(DeviceError::invalid_argument(format!(
            "value {} violates constraint {}",
            value,
            constraint.spec().kind()
        ))),
        ConstraintPolicy::Clamp => Ok(constraint.constrain(&value)),
    }
}

fn policy_for(strict: bool) -> ConstraintPolicy {
    if strict {
        ConstraintPolicy::Reject
    } else {
        ConstraintPolicy::Clamp
    }
}

/// Map every i32 in a scalar or array value
fn map_i32(value: &Value, f: impl Fn(i32) -> i32) -> Value {
    match value {
        Value::Int32(v) => Value::Int32(f(*v)),
        Value::Int32Array(a) => Value::Int32Array(a.iter().map(|v| f(*v)).collect()),
        other => other.clone(),
    }
}

/// Whether every i32 in a scalar or array value passes `f`
fn all_i32(value: &Value, f: impl Fn(i32) -> bool) -> bool {
    match value {
        Value::Int32(v) => f(*v),
        Value::Int32Array(a) => a.iter().all(|v| f(*v)),
        _ => false,
    }
}

fn map_f32(value: &Value, f: impl Fn(f32) -> f32) -> Value {
    match value {
        Value::Float32(v) => Value::Float32(f(*v)),
        Value::Float32Array(a) => Value::Float32Array(a.iter().map(|v| f(*v)).collect()),
        other => other.clone(),
    }
}

fn all_f32(value: &Value, f: impl Fn(f32) -> bool) -> bool {
    match value {
        Value::Float32(v) => f(*v),
        Value::Float32Array(a) => a.iter().all(|v| f(*v)),
        _ => false,
    }
}

fn map_str(value: &Value, f: impl Fn(&str) -> String) -> Value {
    match value {
        Value::String(s) => Value::String(f(s)),
        Value::StringArray(a) => Value::StringArray(a.iter().map(|s| f(s)).collect()),
        other => other.clone(),
    }
}

fn all_str(value: &Value, f: impl Fn(&str) -> bool) -> bool {
    match value {
        Value::String(s) => f(s),
        Value::StringArray(a) => a.iter().all(|s| f(s)),
        _ => false,
    }
}

/// Integer range with optional step
#[derive(Debug, Clone, PartialEq)]
pub struct IntRangeConstraint {
    min: i32,
    max: i32,
    step: i32,
    display_min: i32,
    display_max: i32,
    strict: bool,
}

impl IntRangeConstraint {
    /// Create a range `[min, max]` with step 1
    pub fn new(min: i32, max: i32, strict: bool) -> Result<Self> {
        Self::with_step(min, max, 1, strict)
    }

    /// Create a range `[min, max]` whose valid values are `min + k * step`
    pub fn with_step(min: i32, max: i32, step: i32, strict: bool) -> Result<Self> {
        if min > max {
            return Err(DeviceError::invalid_argument(format!(
                "int range min {} is greater than max {}",
                min, max
            )));
        }
        if step <= 0 {
            return Err(DeviceError::invalid_argument(format!(
                "int range step must be positive, got {}",
                step
            )));
        }
        Ok(Self {
            min,
            max,
            step,
            display_min: min,
            display_max: max,
            strict,
        })
    }

    /// Override the range shown to clients
    pub fn with_display(mut self, display_min: i32, display_max: i32) -> Self {
        self.display_min = display_min;
        self.display_max = display_max;
        self
    }

    fn on_step(&self, v: i32) -> bool {
        (i64::from(v) - i64::from(self.min)) % i64::from(self.step) == 0
    }

    fn clamp(&self, v: i32) -> i32 {
        let v = v.clamp(self.min, self.max);
        let offset = (i64::from(v) - i64::from(self.min)) % i64::from(self.step);
        // offset < step and v - offset >= min, so the result fits in i32
        (i64::from(v) - offset) as i32
    }
}

impl Constraint for IntRangeConstraint {
    fn is_valid(&self, value: &Value) -> bool {
        all_i32(value, |v| v >= self.min && v <= self.max && self.on_step(v))
    }

    fn constrain(&self, value: &Value) -> Value {
        map_i32(value, |v| self.clamp(v))
    }

    fn policy(&self) -> ConstraintPolicy {
        policy_for(self.strict)
    }

    fn spec(&self) -> ConstraintSpec {
        ConstraintSpec::IntRange {
            min: self.min,
            max: self.max,
            step: self.step,
            display_min: Some(self.display_min),
            display_max: Some(self.display_max),
            strict: self.strict,
        }
    }
}

/// Float range with optional step
#[derive(Debug, Clone, PartialEq)]
pub struct FloatRangeConstraint {
    min: f32,
    max: f32,
    step: f32,
    display_min: f32,
    display_max: f32,
    strict: bool,
}

impl FloatRangeConstraint {
    /// Create a continuous range `[min, max]`
    pub fn new(min: f32, max: f32, strict: bool) -> Result<Self> {
        Self::with_step(min, max, 0.0, strict)
    }

    /// Create a range `[min, max]` whose valid values are `min + k * step`
    ///
    /// A step of 0 means the range is continuous.
    pub fn with_step(min: f32, max: f32, step: f32, strict: bool) -> Result<Self> {
        if !(min.is_finite() && max.is_finite() && step.is_finite()) {
            return Err(DeviceError::invalid_argument("float range bounds must be finite"));
        }
        if min > max {
            return Err(DeviceError::invalid_argument(format!(
                "float range min {} is greater than max {}",
                min, max
            )));
        }
        if step < 0.0 {
            return Err(DeviceError::invalid_argument(format!(
                "float range step must not be negative, got {}",
                step
            )));
        }
        Ok(Self {
            min,
            max,
            step,
            display_min: min,
            display_max: max,
            strict,
        })
    }

    /// Override the range shown to clients
    pub fn with_display(mut self, display_min: f32, display_max: f32) -> Self {
        self.display_min = display_min;
        self.display_max = display_max;
        self
    }

    fn clamp(&self, v: f32) -> f32 {
        if v.is_nan() {
            return self.min;
        }
        let v = v.clamp(self.min, self.max);
        if self.step == 0.0 {
            return v;
        }
        let mut snapped = self.min + ((v - self.min) / self.step).round() * self.step;
        if snapped > self.max {
            snapped -= self.step;
        }
        snapped.max(self.min)
    }
}

impl Constraint for FloatRangeConstraint {
    fn is_valid(&self, value: &Value) -> bool {
        all_f32(value, |v| {
            v >= self.min && v <= self.max && (self.step == 0.0 || self.clamp(v) == v)
        })
    }

    fn constrain(&self, value: &Value) -> Value {
        map_f32(value, |v| self.clamp(v))
    }

    fn policy(&self) -> ConstraintPolicy {
        policy_for(self.strict)
    }

    fn spec(&self) -> ConstraintSpec {
        ConstraintSpec::FloatRange {
            min: self.min,
            max: self.max,
            step: self.step,
            display_min: Some(self.display_min),
            display_max: Some(self.display_max),
            strict: self.strict,
        }
    }
}

/// A list of allowed strings
///
/// A non-strict picklist only suggests values; every string is accepted.
#[derive(Debug, Clone, PartialEq)]
pub struct PicklistConstraint {
    choices: Vec<String>,
    strict: bool,
}

impl PicklistConstraint {
    /// Create a picklist
    pub fn new<I, S>(choices: I, strict: bool) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            choices: choices.into_iter().map(Into::into).collect(),
            strict,
        }
    }

    fn allows(&self, s: &str) -> bool {
        !self.strict || self.choices.iter().any(|c| c == s)
    }
}

impl Constraint for PicklistConstraint {
    fn is_valid(&self, value: &Value) -> bool {
        all_str(value, |s| self.allows(s))
    }

    fn constrain(&self, value: &Value) -> Value {
        match self.choices.first() {
            Some(first) => map_str(value, |s| {
                if self.allows(s) {
                    s.to_string()
                } else {
                    first.clone()
                }
            }),
            None => value.clone(),
        }
    }

    fn policy(&self) -> ConstraintPolicy {
        policy_for(self.strict)
    }

    fn spec(&self) -> ConstraintSpec {
        ConstraintSpec::Picklist {
            choices: self.choices.clone(),
            strict: self.strict,
        }
    }
}

/// An integer choice with its display label
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntChoice {
    /// The value
    pub value: i32,
    /// The label shown for the value
    #[serde(default)]
    pub name: PolyglotText,
}

/// A string choice with its display label
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StringChoice {
    /// The value
    pub value: String,
    /// The label shown for the value
    #[serde(default)]
    pub name: PolyglotText,
}

/// A set of labelled integer values
#[derive(Debug, Clone, PartialEq)]
pub struct IntChoiceConstraint {
    choices: Vec<IntChoice>,
    strict: bool,
}

impl IntChoiceConstraint {
    /// Create an integer choice constraint
    pub fn new(choices: Vec<IntChoice>, strict: bool) -> Self {
        Self { choices, strict }
    }

    fn allows(&self, v: i32) -> bool {
        !self.strict || self.choices.iter().any(|c| c.value == v)
    }
}

impl Constraint for IntChoiceConstraint {
    fn is_valid(&self, value: &Value) -> bool {
        all_i32(value, |v| self.allows(v))
    }

    fn constrain(&self, value: &Value) -> Value {
        match self.choices.first() {
            Some(first) => map_i32(value, |v| if self.allows(v) { v } else { first.value }),
            None => value.clone(),
        }
    }

    fn policy(&self) -> ConstraintPolicy {
        policy_for(self.strict)
    }

    fn spec(&self) -> ConstraintSpec {
        ConstraintSpec::IntChoice {
            choices: self.choices.clone(),
            strict: self.strict,
        }
    }
}

/// A set of labelled string values
#[derive(Debug, Clone, PartialEq)]
pub struct StringChoiceConstraint {
    choices: Vec<StringChoice>,
    strict: bool,
}

impl StringChoiceConstraint {
    /// Create a string choice constraint
    pub fn new(choices: Vec<StringChoice>, strict: bool) -> Self {
        Self { choices, strict }
    }

    fn allows(&self, s: &str) -> bool {
        !self.strict || self.choices.iter().any(|c| c.value == s)
    }
}

impl Constraint for StringChoiceConstraint {
    fn is_valid(&self, value: &Value) -> bool {
        all_str(value, |s| self.allows(s))
    }

    fn constrain(&self, value: &Value) -> Value {
        match self.choices.first() {
            Some(first) => map_str(value, |s| {
                if self.allows(s) {
                    s.to_string()
                } else {
                    first.value.clone()
                }
            }),
            None => value.clone(),
        }
    }

    fn policy(&self) -> ConstraintPolicy {
        policy_for(self.strict)
    }

    fn spec(&self) -> ConstraintSpec {
        ConstraintSpec::StringChoice {
            choices: self.choices.clone(),
            strict: self.strict,
        }
    }
}

/// Bounds on array lengths and string lengths
///
/// `max_length` bounds the element count of arrays and the character count
/// of each string; `total_length` bounds the summed characters of a string
/// array. Always rejects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LengthConstraint {
    max_length: usize,
    total_length: usize,
}

impl LengthConstraint {
    /// Create a length constraint
    pub fn new(max_length: usize, total_length: usize) -> Self {
        Self {
            max_length,
            total_length,
        }
    }

    /// Maximum elements / characters
    pub fn max_length(&self) -> usize {
        self.max_length
    }

    /// Maximum summed characters of a string array
    pub fn total_length(&self) -> usize {
        self.total_length
    }

    fn truncate(&self, s: &str) -> String {
        s.chars().take(self.max_length).collect()
    }
}

impl Constraint for LengthConstraint {
    fn is_valid(&self, value: &Value) -> bool {
        match value {
            Value::String(s) => s.chars().count() <= self.max_length,
            Value::StringArray(a) => {
                a.len() <= self.max_length
                    && a.iter().all(|s| s.chars().count() <= self.max_length)
                    && a.iter().map(|s| s.chars().count()).sum::<usize>() <= self.total_length
            }
            other => other.array_len().map_or(true, |n| n <= self.max_length),
        }
    }

    fn constrain(&self, value: &Value) -> Value {
        match value {
            Value::String(s) => Value::String(self.truncate(s)),
            Value::StringArray(a) => {
                let mut budget = self.total_length;
                let mut out = Vec::new();
                for s in a.iter().take(self.max_length) {
                    let s: String = self.truncate(s).chars().take(budget).collect();
                    budget -= s.chars().count();
                    out.push(s);
                }
                Value::StringArray(out)
            }
            other if other.is_array() => {
                other.array_like(other.elements().into_iter().take(self.max_length).collect())
            }
            other => other.clone(),
        }
    }

    fn policy(&self) -> ConstraintPolicy {
        ConstraintPolicy::Reject
    }

    fn spec(&self) -> ConstraintSpec {
        ConstraintSpec::Length {
            max_length: self.max_length,
            total_length: self.total_length,
        }
    }
}

fn default_step_i32() -> i32 {
    1
}

/// Serializable description of a constraint
///
/// Used both to load constraints from a device model and to describe them
/// to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConstraintSpec {
    /// Integer range
    IntRange {
        /// Minimum value
        min: i32,
        /// Maximum value
        max: i32,
        /// Step between valid values
        #[serde(default = "default_step_i32")]
        step: i32,
        /// Minimum shown to clients
        #[serde(default, skip_serializing_if = "Option::is_none")]
        display_min: Option<i32>,
        /// Maximum shown to clients
        #[serde(default, skip_serializing_if = "Option::is_none")]
        display_max: Option<i32>,
        /// Reject rather than clamp
        #[serde(default)]
        strict: bool,
    },
    /// Float range
    FloatRange {
        /// Minimum value
        min: f32,
        /// Maximum value
        max: f32,
        /// Step between valid values, 0 for continuous
        #[serde(default)]
        step: f32,
        /// Minimum shown to clients
        #[serde(default, skip_serializing_if = "Option::is_none")]
        display_min: Option<f32>,
        /// Maximum shown to clients
        #[serde(default, skip_serializing_if = "Option::is_none")]
        display_max: Option<f32>,
        /// Reject rather than clamp
        #[serde(default)]
        strict: bool,
    },
    /// String picklist
    Picklist {
        /// Allowed strings
        choices: Vec<String>,
        /// Reject strings not in the list
        #[serde(default)]
        strict: bool,
    },
    /// Labelled integer choices
    IntChoice {
        /// Allowed values
        choices: Vec<IntChoice>,
        /// Reject values not in the list
        #[serde(default)]
        strict: bool,
    },
    /// Labelled string choices
    StringChoice {
        /// Allowed values
        choices: Vec<StringChoice>,
        /// Reject values not in the list
        #[serde(default)]
        strict: bool,
    },
    /// Length bounds
    Length {
        /// Maximum elements / characters
        max_length: usize,
        /// Maximum summed characters of a string array
        total_length: usize,
    },
}

impl ConstraintSpec {
    /// Short name of the constraint kind
    pub fn kind(&self) -> &'static str {
        match self {
            ConstraintSpec::IntRange { .. } => "int_range",
            ConstraintSpec::FloatRange { .. } => "float_range",
            ConstraintSpec::Picklist { .. } => "picklist",
            ConstraintSpec::IntChoice { .. } => "int_choice",
            ConstraintSpec::StringChoice { .. } => "string_choice",
            ConstraintSpec::Length { .. } => "length",
        }
    }

    /// Build the constraint this spec describes
    pub fn build(&self) -> Result<SharedConstraint> {
        let constraint: SharedConstraint = match self.clone() {
            ConstraintSpec::IntRange {
                min,
                max,
                step,
                display_min,
                display_max,
                strict,
            } => Arc::new(
                IntRangeConstraint::with_step(min, max, step, strict)?
                    .with_display(display_min.unwrap_or(min), display_max.unwrap_or(max)),
            ),
            ConstraintSpec::FloatRange {
                min,
                max,
                step,
                display_min,
                display_max,
                strict,
            } => Arc::new(
                FloatRangeConstraint::with_step(min, max, step, strict)?
                    .with_display(display_min.unwrap_or(min), display_max.unwrap_or(max)),
            ),
            ConstraintSpec::Picklist { choices, strict } => {
                Arc::new(PicklistConstraint::new(choices, strict))
            }
            ConstraintSpec::IntChoice { choices, strict } => {
                Arc::new(IntChoiceConstraint::new(choices, strict))
            }
            ConstraintSpec::StringChoice { choices, strict } => {
                Arc::new(StringChoiceConstraint::new(choices, strict))
            }
            ConstraintSpec::Length {
                max_length,
                total_length,
            } => Arc::new(LengthConstraint::new(max_length, total_length)),
        };
        Ok(constraint)
    }
}

/// How a param names its constraint: inline, or by reference to a constraint
/// shared across the device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConstraintEntry {
    /// Reference to a shared constraint
    Ref {
        /// Oid of the shared constraint
        ref_oid: String,
    },
    /// A constraint owned by the param
    Inline(ConstraintSpec),
}

/// Constraints shared by oid across a device's params
pub type SharedConstraints = BTreeMap<String, SharedConstraint>;

/// A constraint attached to a param, remembering whether it is shared
#[derive(Debug, Clone)]
pub struct AttachedConstraint {
    ref_oid: Option<String>,
    constraint: SharedConstraint,
}

impl AttachedConstraint {
    /// Attach a constraint owned by the param
    pub fn owned(constraint: SharedConstraint) -> Self {
        Self {
            ref_oid: None,
            constraint,
        }
    }

    /// Resolve an entry against the device's shared constraints
    pub fn resolve(entry: &ConstraintEntry, shared: &SharedConstraints) -> Result<Self> {
        match entry {
            ConstraintEntry::Ref { ref_oid } => {
                let constraint = shared.get(ref_oid).cloned().ok_or_else(|| {
                    DeviceError::not_found(format!("shared constraint '{}'", ref_oid))
                })?;
                Ok(Self {
                    ref_oid: Some(ref_oid.clone()),
                    constraint,
                })
            }
            ConstraintEntry::Inline(spec) => Ok(Self::owned(spec.build()?)),
        }
    }

    /// The constraint itself
    pub fn constraint(&self) -> &dyn Constraint {
        self.constraint.as_ref()
    }

    /// How this constraint is described to clients
    pub fn entry(&self) -> ConstraintEntry {
        match &self.ref_oid {
            Some(ref_oid) => ConstraintEntry::Ref {
                ref_oid: ref_oid.clone(),
            },
            None => ConstraintEntry::Inline(self.constraint.spec()),
        }
    }
}
