/*!
 * Parameters.
 *
 * A [`Param`] is a named, typed value node. Scalars and scalar arrays hold
 * their value directly; structs hold child params, and struct arrays hold
 * elements built from a template.
 *
 * Params are built from a [`ParamSpec`], which is also the shape in which a
 * param is described back to clients.
 */
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use devmodel_core::config::ModelConfig;
use devmodel_core::types::{StructFields, Value};

use crate::constraint::{
    self, AttachedConstraint, ConstraintEntry, ConstraintSpec, LengthConstraint,
    SharedConstraints,
};
use crate::error::{DeviceError, Result};
use crate::path::Segment;
use crate::polyglot::PolyglotText;
use crate::scope::Scope;

/// Type of a param's value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ParamType {
    /// No value
    #[default]
    Empty,
    /// 32-bit integer
    Int32,
    /// 32-bit float
    Float32,
    /// UTF-8 string
    String,
    /// Struct of child params
    Struct,
    /// Array of 32-bit integers
    Int32Array,
    /// Array of 32-bit floats
    Float32Array,
    /// Array of strings
    StringArray,
    /// Array of structs
    StructArray,
}

impl ParamType {
    /// The type of a value
    pub fn of(value: &Value) -> Self {
        match value {
            Value::Empty => ParamType::Empty,
            Value::Int32(_) => ParamType::Int32,
            Value::Float32(_) => ParamType::Float32,
            Value::String(_) => ParamType::String,
            Value::Struct(_) => ParamType::Struct,
            Value::Int32Array(_) => ParamType::Int32Array,
            Value::Float32Array(_) => ParamType::Float32Array,
            Value::StringArray(_) => ParamType::StringArray,
            Value::StructArray(_) => ParamType::StructArray,
        }
    }

    /// Whether this is one of the array types
    pub fn is_array(&self) -> bool {
        matches!(
            self,
            ParamType::Int32Array
                | ParamType::Float32Array
                | ParamType::StringArray
                | ParamType::StructArray
        )
    }

    /// Whether values of this type are bounded by the length limits
    pub fn is_sized(&self) -> bool {
        self.is_array() || *self == ParamType::String
    }

    /// Value a param of this type starts with when none is given
    pub fn default_value(&self) -> Value {
        match self {
            ParamType::Empty => Value::Empty,
            ParamType::Int32 => Value::Int32(0),
            ParamType::Float32 => Value::Float32(0.0),
            ParamType::String => Value::String(String::new()),
            ParamType::Struct => Value::Struct(StructFields::new()),
            ParamType::Int32Array => Value::Int32Array(Vec::new()),
            ParamType::Float32Array => Value::Float32Array(Vec::new()),
            ParamType::StringArray => Value::StringArray(Vec::new()),
            ParamType::StructArray => Value::StructArray(Vec::new()),
        }
    }
}

fn is_false(b: &bool) -> bool {
    !*b
}

/// Serializable description of a param
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParamSpec {
    /// Value type
    #[serde(rename = "type")]
    pub param_type: ParamType,

    /// Display name
    #[serde(default, skip_serializing_if = "PolyglotText::is_empty")]
    pub name: PolyglotText,

    /// Widget hint for client UIs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub widget: Option<String>,

    /// Scope needed to access the param; inherited when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_scope: Option<Scope>,

    /// Whether clients may write the param
    #[serde(default, skip_serializing_if = "is_false")]
    pub read_only: bool,

    /// Alternative oids for the param
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub oid_aliases: Vec<String>,

    /// Value constraint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constraint: Option<ConstraintEntry>,

    /// Current (or initial) value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,

    /// Struct fields, or the element fields of a struct array
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub params: BTreeMap<String, ParamSpec>,
}

impl ParamSpec {
    /// Spec for a param of the given type
    pub fn new(param_type: ParamType) -> Self {
        Self {
            param_type,
            ..Self::default()
        }
    }

    /// Set the initial value
    pub fn with_value<V: Into<Value>>(mut self, value: V) -> Self {
        self.value = Some(value.into());
        self
    }

    /// Attach an inline constraint
    pub fn with_constraint(mut self, spec: ConstraintSpec) -> Self {
        self.constraint = Some(ConstraintEntry::Inline(spec));
        self
    }

    /// Attach a shared constraint by oid
    pub fn with_constraint_ref<S: Into<String>>(mut self, ref_oid: S) -> Self {
        self.constraint = Some(ConstraintEntry::Ref {
            ref_oid: ref_oid.into(),
        });
        self
    }

    /// Set the access scope
    pub fn with_scope(mut self, scope: Scope) -> Self {
        self.access_scope = Some(scope);
        self
    }

    /// Mark the param read-only
    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    /// Add a display name translation
    pub fn with_name<L: Into<String>, T: Into<String>>(mut self, language: L, text: T) -> Self {
        self.name.insert(language, text);
        self
    }

    /// Set the widget hint
    pub fn with_widget<S: Into<String>>(mut self, widget: S) -> Self {
        self.widget = Some(widget.into());
        self
    }

    /// Add a struct field
    pub fn with_field<S: Into<String>>(mut self, name: S, field: ParamSpec) -> Self {
        self.params.insert(name.into(), field);
        self
    }
}

/// Everything a param needs from its device at construction
#[derive(Debug, Clone)]
pub struct ParamContext {
    default_scope: Scope,
    limits: LengthConstraint,
    shared: SharedConstraints,
}

impl ParamContext {
    /// Create a context
    pub fn new(default_scope: Scope, limits: LengthConstraint, shared: SharedConstraints) -> Self {
        Self {
            default_scope,
            limits,
            shared,
        }
    }

    /// Create a context with the length limits from the model configuration
    pub fn from_config(default_scope: Scope, config: &ModelConfig) -> Self {
        Self::new(
            default_scope,
            LengthConstraint::new(config.default_max_length, config.default_total_length),
            SharedConstraints::new(),
        )
    }

    /// Scope of params that name none and have no parent
    pub fn default_scope(&self) -> Scope {
        self.default_scope
    }

    /// Length limits attached to sized params
    pub fn limits(&self) -> LengthConstraint {
        self.limits
    }

    /// Constraints shared across the device
    pub fn shared(&self) -> &SharedConstraints {
        &self.shared
    }

    /// Register a shared constraint
    pub fn add_shared(&mut self, oid: &str, spec: &ConstraintSpec) -> Result<()> {
        let constraint = spec.build().map_err(|e| e.at(oid))?;
        self.shared.insert(oid.to_string(), constraint);
        Ok(())
    }

    /// Build a top-level param
    pub fn build(&self, oid: &str, spec: &ParamSpec) -> Result<Param> {
        Param::build(oid, spec, self, None).map_err(|e| e.at(oid))
    }
}

impl Default for ParamContext {
    fn default() -> Self {
        Self::from_config(Scope::Operate, &ModelConfig::default())
    }
}

/// Static description of a param
#[derive(Debug, Clone)]
pub struct ParamDescriptor {
    oid: String,
    param_type: ParamType,
    name: PolyglotText,
    widget: Option<String>,
    scope: Scope,
    read_only: bool,
    oid_aliases: Vec<String>,
    constraint: Option<AttachedConstraint>,
    length: Option<LengthConstraint>,
}

impl ParamDescriptor {
    /// Oid relative to the parent
    pub fn oid(&self) -> &str {
        &self.oid
    }

    /// Value type
    pub fn param_type(&self) -> ParamType {
        self.param_type
    }

    /// Display name
    pub fn name(&self) -> &PolyglotText {
        &self.name
    }

    /// Effective access scope, after inheritance
    pub fn scope(&self) -> Scope {
        self.scope
    }

    /// Whether clients may write the param
    pub fn read_only(&self) -> bool {
        self.read_only
    }

    /// Alternative oids
    pub fn oid_aliases(&self) -> &[String] {
        &self.oid_aliases
    }

    /// Attached value constraint
    pub fn constraint(&self) -> Option<&AttachedConstraint> {
        self.constraint.as_ref()
    }

    /// Length limits
    pub fn length(&self) -> Option<LengthConstraint> {
        self.length
    }

    /// Type check `value`, then run it through the constraints
    fn admit(&self, value: Value) -> Result<Value> {
        let actual = ParamType::of(&value);
        if actual != self.param_type {
            return Err(DeviceError::invalid_argument(format!(
                "expected {:?} value, got {:?}",
                self.param_type, actual
            )));
        }
        let mut value = value;
        if let Some(attached) = &self.constraint {
            value = constraint::admit(attached.constraint(), value)?;
        }
        if let Some(length) = &self.length {
            value = constraint::admit(length, value)?;
        }
        Ok(value)
    }

    fn check_count(&self, count: usize) -> Result<()> {
        match self.length {
            Some(length) if count > length.max_length() => Err(DeviceError::invalid_argument(
                format!("{} elements exceed the limit of {}", count, length.max_length()),
            )),
            _ => Ok(()),
        }
    }

    fn spec(&self) -> ParamSpec {
        ParamSpec {
            param_type: self.param_type,
            name: self.name.clone(),
            widget: self.widget.clone(),
            access_scope: Some(self.scope),
            read_only: self.read_only,
            oid_aliases: self.oid_aliases.clone(),
            constraint: self.constraint.as_ref().map(AttachedConstraint::entry),
            value: None,
            params: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone)]
enum ParamNode {
    Leaf(Value),
    Struct(BTreeMap<String, Param>),
    StructArray {
        template: Box<Param>,
        elements: Vec<Param>,
    },
}

/// A param and its current value
#[derive(Debug, Clone)]
pub struct Param {
    descriptor: ParamDescriptor,
    node: ParamNode,
}

impl Param {
    fn build(
        oid: &str,
        spec: &ParamSpec,
        ctx: &ParamContext,
        parent: Option<&ParamDescriptor>,
    ) -> Result<Self> {
        let scope = spec
            .access_scope
            .or_else(|| parent.map(ParamDescriptor::scope))
            .unwrap_or(ctx.default_scope);
        let read_only = spec.read_only || parent.map_or(false, ParamDescriptor::read_only);
        let constraint = spec
            .constraint
            .as_ref()
            .map(|entry| AttachedConstraint::resolve(entry, &ctx.shared))
            .transpose()?;

        let descriptor = ParamDescriptor {
            oid: oid.to_string(),
            param_type: spec.param_type,
            name: spec.name.clone(),
            widget: spec.widget.clone(),
            scope,
            read_only,
            oid_aliases: spec.oid_aliases.clone(),
            constraint,
            length: spec.param_type.is_sized().then_some(ctx.limits),
        };

        let node = match spec.param_type {
            ParamType::Struct => ParamNode::Struct(Self::build_fields(spec, ctx, &descriptor)?),
            ParamType::StructArray => {
                let element_spec = ParamSpec {
                    param_type: ParamType::Struct,
                    params: spec.params.clone(),
                    ..ParamSpec::default()
                };
                let template = Param::build(oid, &element_spec, ctx, Some(&descriptor))?;
                ParamNode::StructArray {
                    template: Box::new(template),
                    elements: Vec::new(),
                }
            }
            other => ParamNode::Leaf(other.default_value()),
        };

        let mut param = Self { descriptor, node };
        if let Some(value) = &spec.value {
            param.replace(value.clone())?;
        } else if let ParamNode::Leaf(value) = &param.node {
            // no initial value: start from the nearest valid default
            let mut value = value.clone();
            if let Some(attached) = &param.descriptor.constraint {
                value = attached.constraint().constrain(&value);
            }
            param.node = ParamNode::Leaf(param.descriptor.admit(value)?);
        }
        Ok(param)
    }

    fn build_fields(
        spec: &ParamSpec,
        ctx: &ParamContext,
        parent: &ParamDescriptor,
    ) -> Result<BTreeMap<String, Param>> {
        spec.params
            .iter()
            .map(|(name, field)| {
                Param::build(name, field, ctx, Some(parent))
                    .map(|p| (name.clone(), p))
                    .map_err(|e| e.at(name))
            })
            .collect()
    }

    /// Static description
    pub fn descriptor(&self) -> &ParamDescriptor {
        &self.descriptor
    }

    /// Oid relative to the parent
    pub fn oid(&self) -> &str {
        &self.descriptor.oid
    }

    /// Value type
    pub fn param_type(&self) -> ParamType {
        self.descriptor.param_type
    }

    /// Effective access scope
    pub fn scope(&self) -> Scope {
        self.descriptor.scope
    }

    /// Whether clients may write the param
    pub fn read_only(&self) -> bool {
        self.descriptor.read_only
    }

    /// Number of elements, for array params
    pub fn len(&self) -> Option<usize> {
        match &self.node {
            ParamNode::Leaf(value) => value.array_len(),
            ParamNode::StructArray { elements, .. } => Some(elements.len()),
            ParamNode::Struct(_) => None,
        }
    }

    /// Whether an array param has no elements
    pub fn is_empty(&self) -> bool {
        self.len() == Some(0)
    }

    /// Current value of the whole param
    pub fn value(&self) -> Value {
        match &self.node {
            ParamNode::Leaf(value) => value.clone(),
            ParamNode::Struct(_) => Value::Struct(self.fields()),
            ParamNode::StructArray { elements, .. } => {
                Value::StructArray(elements.iter().map(Param::fields).collect())
            }
        }
    }

    fn fields(&self) -> StructFields {
        match &self.node {
            ParamNode::Struct(fields) => fields
                .iter()
                .map(|(name, field)| (name.clone(), field.value()))
                .collect(),
            _ => StructFields::new(),
        }
    }

    /// Read the value at `path`, relative to this param
    ///
    /// Reading `-` or an index past the end is `OUT_OF_RANGE`; an unknown
    /// field is `NOT_FOUND`.
    pub fn get_value(&self, path: &[Segment]) -> Result<Value> {
        let Some((segment, rest)) = path.split_first() else {
            return Ok(self.value());
        };
        match (segment, &self.node) {
            (Segment::Append, _) => Err(DeviceError::out_of_range(format!(
                "'-' cannot be read on {}",
                self.oid()
            ))),
            (Segment::Name(name), ParamNode::Struct(fields)) => fields
                .get(name)
                .ok_or_else(|| self.no_such(segment))?
                .get_value(rest),
            (Segment::Index(i), ParamNode::StructArray { elements, .. }) => elements
                .get(*i)
                .ok_or_else(|| self.past_end(*i, elements.len()))?
                .get_value(rest),
            (Segment::Index(i), ParamNode::Leaf(value)) if value.is_array() && rest.is_empty() => {
                value
                    .element(*i)
                    .ok_or_else(|| self.past_end(*i, value.array_len().unwrap_or(0)))
            }
            _ => Err(self.no_such(segment)),
        }
    }

    /// Descriptor of the param addressed by `path`
    ///
    /// Indices into scalar arrays resolve to the array itself.
    pub fn descriptor_at(&self, path: &[Segment]) -> Result<&ParamDescriptor> {
        self.param_at(path).map(Param::descriptor)
    }

    /// Descriptors of every param a write of `value` at `path` changes
    ///
    /// Starts with the addressed param and descends into the struct fields
    /// named by `value`. Elements of a struct array are checked against the
    /// array's template.
    pub fn touched_descriptors(&self, path: &[Segment], value: &Value) -> Result<Vec<&ParamDescriptor>> {
        let mut touched = Vec::new();
        self.param_at(path)?.collect_touched(value, &mut touched);
        Ok(touched)
    }

    fn collect_touched<'a>(&'a self, value: &Value, touched: &mut Vec<&'a ParamDescriptor>) {
        touched.push(&self.descriptor);
        match (&self.node, value) {
            (ParamNode::Struct(_), Value::Struct(incoming)) => {
                self.collect_fields(incoming, touched);
            }
            (ParamNode::StructArray { template, .. }, Value::StructArray(incoming)) => {
                for fields in incoming {
                    template.collect_fields(fields, touched);
                }
            }
            _ => {}
        }
    }

    fn collect_fields<'a>(&'a self, incoming: &StructFields, touched: &mut Vec<&'a ParamDescriptor>) {
        if let ParamNode::Struct(fields) = &self.node {
            // unknown names are reported by the write itself
            for (name, field_value) in incoming {
                if let Some(field) = fields.get(name) {
                    field.collect_touched(field_value, touched);
                }
            }
        }
    }

    fn param_at(&self, path: &[Segment]) -> Result<&Param> {
        let Some((segment, rest)) = path.split_first() else {
            return Ok(self);
        };
        match (segment, &self.node) {
            (Segment::Name(name), ParamNode::Struct(fields)) => fields
                .get(name)
                .ok_or_else(|| self.no_such(segment))?
                .param_at(rest),
            (Segment::Index(i), ParamNode::StructArray { elements, .. }) => elements
                .get(*i)
                .ok_or_else(|| self.past_end(*i, elements.len()))?
                .param_at(rest),
            (Segment::Append, ParamNode::StructArray { template, .. }) => template.param_at(rest),
            (Segment::Index(_) | Segment::Append, ParamNode::Leaf(value))
                if value.is_array() && rest.is_empty() =>
            {
                Ok(self)
            }
            _ => Err(self.no_such(segment)),
        }
    }

    /// Write `value` at `path`, relative to this param
    ///
    /// The param is left untouched if the write fails.
    pub fn set_value(&mut self, path: &[Segment], value: Value) -> Result<()> {
        let mut staged = self.clone();
        staged.apply(path, value)?;
        *self = staged;
        Ok(())
    }

    fn apply(&mut self, path: &[Segment], value: Value) -> Result<()> {
        let Some((segment, rest)) = path.split_first() else {
            return self.replace(value);
        };
        let oid = self.descriptor.oid.clone();
        match (segment, &mut self.node) {
            (Segment::Name(name), ParamNode::Struct(fields)) => match fields.get_mut(name) {
                Some(field) => field.apply(rest, value),
                None => Err(DeviceError::not_found(format!("{} has no field {}", oid, name))),
            },
            (Segment::Index(i), ParamNode::StructArray { elements, .. }) => {
                let len = elements.len();
                match elements.get_mut(*i) {
                    Some(element) => element.apply(rest, value),
                    None => Err(past_end(&oid, *i, len)),
                }
            }
            (Segment::Append, ParamNode::StructArray { template, elements }) => {
                if !rest.is_empty() {
                    return Err(DeviceError::invalid_argument(format!(
                        "cannot address inside the element being appended to {}",
                        oid
                    )));
                }
                self.descriptor.check_count(elements.len() + 1)?;
                let mut element = (**template).clone();
                element.replace(value)?;
                elements.push(element);
                Ok(())
            }
            (Segment::Index(i), ParamNode::Leaf(current)) if current.is_array() && rest.is_empty() => {
                let len = current.array_len().unwrap_or(0);
                if *i >= len {
                    return Err(past_end(&oid, *i, len));
                }
                let kind = value.kind_name();
                let next = current.with_element(*i, value).ok_or_else(|| {
                    DeviceError::invalid_argument(format!(
                        "cannot store a {} in {} {}",
                        kind,
                        oid,
                        current.kind_name()
                    ))
                })?;
                *current = self.descriptor.admit(next)?;
                Ok(())
            }
            (Segment::Append, ParamNode::Leaf(current)) if current.is_array() && rest.is_empty() => {
                let kind = value.kind_name();
                let next = current.with_appended(value).ok_or_else(|| {
                    DeviceError::invalid_argument(format!(
                        "cannot append a {} to {} {}",
                        kind,
                        oid,
                        current.kind_name()
                    ))
                })?;
                *current = self.descriptor.admit(next)?;
                Ok(())
            }
            (segment, _) => Err(DeviceError::not_found(format!(
                "{} has no element {}",
                oid, segment
            ))),
        }
    }

    /// Replace the whole value of this param
    fn replace(&mut self, value: Value) -> Result<()> {
        match (&mut self.node, value) {
            (ParamNode::Leaf(current), value) => {
                *current = self.descriptor.admit(value)?;
                Ok(())
            }
            (ParamNode::Struct(fields), Value::Struct(incoming)) => {
                for (name, field_value) in incoming {
                    let field = fields.get_mut(&name).ok_or_else(|| {
                        DeviceError::invalid_argument(format!(
                            "{} has no field {}",
                            self.descriptor.oid, name
                        ))
                    })?;
                    field.replace(field_value).map_err(|e| e.at(&name))?;
                }
                Ok(())
            }
            (ParamNode::StructArray { template, elements }, Value::StructArray(incoming)) => {
                self.descriptor.check_count(incoming.len())?;
                let mut rebuilt = Vec::with_capacity(incoming.len());
                for fields in incoming {
                    let mut element = (**template).clone();
                    element.replace(Value::Struct(fields))?;
                    rebuilt.push(element);
                }
                *elements = rebuilt;
                Ok(())
            }
            (_, value) => Err(DeviceError::invalid_argument(format!(
                "expected {:?} value, got {:?}",
                self.descriptor.param_type,
                ParamType::of(&value)
            ))),
        }
    }

    /// Describe this param, including its current value
    pub fn to_spec(&self) -> ParamSpec {
        let mut spec = self.describe();
        spec.value = Some(self.value());
        spec
    }

    /// Describe this param and its fields, without values
    fn describe(&self) -> ParamSpec {
        let mut spec = self.descriptor.spec();
        spec.params = match &self.node {
            ParamNode::Leaf(_) => BTreeMap::new(),
            ParamNode::Struct(fields) => fields
                .iter()
                .map(|(name, field)| (name.clone(), field.describe()))
                .collect(),
            ParamNode::StructArray { template, .. } => template.describe().params,
        };
        spec
    }

    fn no_such(&self, segment: &Segment) -> DeviceError {
        DeviceError::not_found(format!("{} has no element {}", self.oid(), segment))
    }

    fn past_end(&self, index: usize, len: usize) -> DeviceError {
        past_end(self.oid(), index, len)
    }
}

fn past_end(oid: &str, index: usize, len: usize) -> DeviceError {
    DeviceError::out_of_range(format!(
        "index {} is past the end of {} (length {})",
        index, oid, len
    ))
}
