//! Schema types and builders
//!
//! A schema is a block tree: attributes are the leaves, nested blocks are the
//! internal nodes. Attributes also carry the behaviors the framework runs
//! during validation and planning (validators, plan modifiers, defaults and
//! semantic equality), which are not part of the wire form.

use crate::error::{PlugkitError, Result};
use crate::types::{AttributePath, AttributePathStep, Diagnostics};
use crate::value::{Type, Value};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

/// Schema is returned by providers, resources, data sources, ephemeral
/// resources and actions. Version is used for state upgrades.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Schema {
    pub version: i64,
    pub block: Block,
}

impl Schema {
    /// The object type of values conforming to this schema.
    pub fn ty(&self) -> Type {
        self.block.implied_type()
    }

    pub fn attribute_at(&self, path: &AttributePath) -> Option<&Attribute> {
        self.block.attribute_at(&path.steps)
    }

    /// Rejects malformed schemas.
    pub fn validate(&self) -> Result<()> {
        validate_block(&self.block, &AttributePath::root())
    }

    /// Visits every attribute present in `value`, parents before children.
    pub fn walk(&self, value: &Value, visitor: &mut dyn FnMut(&AttributePath, &Attribute, &Value)) {
        walk_object(
            &self.block.attributes,
            &self.block.block_types,
            value,
            &AttributePath::root(),
            visitor,
        );
    }

    /// Rebuilds `value` by passing every attribute through `f`, parents
    /// before children.
    pub fn transform(
        &self,
        value: Value,
        f: &mut dyn FnMut(&AttributePath, &Attribute, Value) -> Value,
    ) -> Value {
        transform_object(
            &self.block.attributes,
            &self.block.block_types,
            value,
            &AttributePath::root(),
            f,
        )
    }

    /// Replaces every write-only position with a null of its declared type.
    pub fn null_write_only(&self, value: Value) -> Value {
        if !self.block.has_write_only() {
            return value;
        }
        self.transform(value, &mut |_, attr, v| {
            if attr.write_only && !v.is_null() {
                Value::Null(attr.ty.clone())
            } else {
                v
            }
        })
    }

    /// An object with every attribute null.
    pub fn null_value(&self) -> Value {
        Value::null_object(&self.ty())
    }
}

/// Block represents a configuration block
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Block {
    pub attributes: Vec<Attribute>,
    pub block_types: Vec<NestedBlock>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub deprecated: bool,
}

impl Block {
    pub fn implied_type(&self) -> Type {
        let mut attrs: BTreeMap<String, Type> = self
            .attributes
            .iter()
            .map(|a| (a.name.clone(), a.ty.clone()))
            .collect();
        for nested in &self.block_types {
            attrs.insert(nested.type_name.clone(), nested.implied_type());
        }
        Type::Object(attrs)
    }

    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.name == name)
    }

    pub fn block_type(&self, name: &str) -> Option<&NestedBlock> {
        self.block_types.iter().find(|b| b.type_name == name)
    }

    pub fn has_write_only(&self) -> bool {
        self.attributes.iter().any(Attribute::has_write_only)
            || self.block_types.iter().any(|b| b.block.has_write_only())
    }

    fn attribute_at(&self, steps: &[AttributePathStep]) -> Option<&Attribute> {
        let (first, rest) = steps.split_first()?;
        let AttributePathStep::AttributeName(name) = first else {
            return None;
        };
        if let Some(attr) = self.attribute(name) {
            return attr.descend(rest);
        }
        let nested = self.block_type(name)?;
        let rest = match nested.nesting {
            NestingMode::Single | NestingMode::Group => rest,
            _ => rest.get(1..)?,
        };
        nested.block.attribute_at(rest)
    }
}

/// Behaviors attached to an attribute are shared, so cloning a schema is cheap
/// and keeps them.
#[derive(Clone, Serialize, Deserialize)]
pub struct Attribute {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: Type,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nested_type: Option<NestedType>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub optional: bool,
    #[serde(default)]
    pub computed: bool,
    #[serde(default)]
    pub sensitive: bool,
    #[serde(default)]
    pub write_only: bool,
    #[serde(default)]
    pub deprecated: bool,
    #[serde(skip)]
    pub validators: Vec<Arc<dyn Validator>>,
    #[serde(skip)]
    pub plan_modifiers: Vec<Arc<dyn PlanModifier>>,
    #[serde(skip)]
    pub default: Option<Arc<dyn AttributeDefault>>,
    #[serde(skip)]
    pub semantic: Option<Arc<dyn ValueAdapter>>,
}

impl Attribute {
    fn has_write_only(&self) -> bool {
        self.write_only
            || self
                .nested_type
                .as_ref()
                .is_some_and(|nt| nt.attributes.iter().any(Attribute::has_write_only))
    }

    fn descend(&self, rest: &[AttributePathStep]) -> Option<&Attribute> {
        if rest.is_empty() {
            return Some(self);
        }
        let Some(nested) = &self.nested_type else {
            // Element of a plain collection attribute.
            return Some(self);
        };
        let rest = match nested.nesting {
            ObjectNestingMode::Single => rest,
            _ => rest.get(1..)?,
        };
        let (first, rest) = rest.split_first()?;
        let AttributePathStep::AttributeName(name) = first else {
            return None;
        };
        nested
            .attributes
            .iter()
            .find(|a| &a.name == name)?
            .descend(rest)
    }
}

// Manual Debug implementation since behaviors don't implement Debug
impl fmt::Debug for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Attribute")
            .field("name", &self.name)
            .field("type", &self.ty)
            .field("nested_type", &self.nested_type)
            .field("required", &self.required)
            .field("optional", &self.optional)
            .field("computed", &self.computed)
            .field("sensitive", &self.sensitive)
            .field("write_only", &self.write_only)
            .field("validators", &self.validators.len())
            .field("plan_modifiers", &self.plan_modifiers.len())
            .field("default", &self.default.is_some())
            .field("semantic", &self.semantic.is_some())
            .finish()
    }
}

/// NestedBlock represents a nested configuration block
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NestedBlock {
    pub type_name: String,
    pub block: Block,
    pub nesting: NestingMode,
    #[serde(default)]
    pub min_items: i64,
    #[serde(default)]
    pub max_items: i64,
}

impl NestedBlock {
    pub fn new(type_name: &str, nesting: NestingMode, block: Block) -> Self {
        Self {
            type_name: type_name.to_string(),
            block,
            nesting,
            min_items: 0,
            max_items: 0,
        }
    }

    pub fn min_items(mut self, n: i64) -> Self {
        self.min_items = n;
        self
    }

    pub fn max_items(mut self, n: i64) -> Self {
        self.max_items = n;
        self
    }

    pub fn implied_type(&self) -> Type {
        let object = self.block.implied_type();
        match self.nesting {
            NestingMode::Single | NestingMode::Group => object,
            NestingMode::List => Type::list(object),
            NestingMode::Set => Type::set(object),
            NestingMode::Map => Type::map(object),
        }
    }
}

/// NestingMode defines how nested blocks are structured
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NestingMode {
    Single,
    Group,
    List,
    Set,
    Map,
}

impl fmt::Display for NestingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NestingMode::Single => "NestingSingle",
            NestingMode::Group => "NestingGroup",
            NestingMode::List => "NestingList",
            NestingMode::Set => "NestingSet",
            NestingMode::Map => "NestingMap",
        };
        f.write_str(name)
    }
}

/// NestedType for attributes with nested structures
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NestedType {
    pub attributes: Vec<Attribute>,
    pub nesting: ObjectNestingMode,
}

impl NestedType {
    pub fn new(nesting: ObjectNestingMode, attributes: Vec<Attribute>) -> Self {
        Self {
            attributes,
            nesting,
        }
    }

    pub fn implied_type(&self) -> Type {
        let object = Type::Object(
            self.attributes
                .iter()
                .map(|a| (a.name.clone(), a.ty.clone()))
                .collect(),
        );
        match self.nesting {
            ObjectNestingMode::Single => object,
            ObjectNestingMode::List => Type::list(object),
            ObjectNestingMode::Set => Type::set(object),
            ObjectNestingMode::Map => Type::map(object),
        }
    }
}

/// ObjectNestingMode for nested attribute objects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObjectNestingMode {
    Single,
    List,
    Set,
    Map,
}

/// Validator checks a configuration value for one attribute
pub trait Validator: Send + Sync {
    /// Human-readable description
    fn description(&self) -> String;
    /// Perform validation
    fn validate(&self, request: ValidatorRequest) -> ValidatorResponse;
}

/// Request for validators
pub struct ValidatorRequest {
    pub config_value: Value,
    pub path: AttributePath,
}

/// Response from validators
#[derive(Default)]
pub struct ValidatorResponse {
    pub diagnostics: Diagnostics,
}

/// PlanModifier modifies planned values during planning
pub trait PlanModifier: Send + Sync {
    /// Human-readable description
    fn description(&self) -> String;
    /// Modify the planned value
    fn modify(&self, request: PlanModifierRequest) -> PlanModifierResponse;
}

/// Request for plan modifiers
pub struct PlanModifierRequest {
    pub config_value: Value,
    pub state_value: Value,
    pub plan_value: Value,
    pub path: AttributePath,
    /// True when the resource has no prior state.
    pub creating: bool,
}

/// Response from plan modifiers
pub struct PlanModifierResponse {
    pub plan_value: Value,
    pub requires_replace: bool,
    pub diagnostics: Diagnostics,
}

impl PlanModifierResponse {
    pub fn unchanged(request: PlanModifierRequest) -> Self {
        Self {
            plan_value: request.plan_value,
            requires_replace: false,
            diagnostics: Diagnostics::new(),
        }
    }
}

/// Supplies a value for a computed attribute left null in configuration
pub trait AttributeDefault: Send + Sync {
    /// Human-readable description
    fn description(&self) -> String;
    /// Provide default value
    fn default_value(&self, request: DefaultRequest) -> DefaultResponse;
}

/// Request for default values
pub struct DefaultRequest {
    pub path: AttributePath,
    pub ty: Type,
}

/// Response with default value
pub struct DefaultResponse {
    pub value: Value,
    pub diagnostics: Diagnostics,
}

/// Custom value semantics for an attribute.
///
/// Two values for which `semantic_equal` holds are treated as the same value
/// during planning and apply consistency checks.
pub trait ValueAdapter: Send + Sync {
    fn description(&self) -> String;

    /// Normal form used for comparisons.
    fn canonicalize(&self, value: &Value) -> Value {
        value.clone()
    }

    fn semantic_equal(&self, a: &Value, b: &Value) -> bool {
        self.canonicalize(a) == self.canonicalize(b)
    }

    fn validate(&self, _value: &Value, _path: &AttributePath) -> Diagnostics {
        Diagnostics::new()
    }
}

/// AttributeBuilder provides fluent API for building attributes
pub struct AttributeBuilder {
    attribute: Attribute,
}

impl AttributeBuilder {
    /// Create a new attribute builder
    pub fn new(name: &str, ty: Type) -> Self {
        Self {
            attribute: Attribute {
                name: name.to_string(),
                ty,
                nested_type: None,
                description: String::new(),
                required: false,
                optional: false,
                computed: false,
                sensitive: false,
                write_only: false,
                deprecated: false,
                validators: Vec::new(),
                plan_modifiers: Vec::new(),
                default: None,
                semantic: None,
            },
        }
    }

    /// Create an attribute whose value is shaped by nested attributes
    pub fn nested(name: &str, nested: NestedType) -> Self {
        let mut builder = Self::new(name, nested.implied_type());
        builder.attribute.nested_type = Some(nested);
        builder
    }

    pub fn description(mut self, desc: &str) -> Self {
        self.attribute.description = desc.to_string();
        self
    }

    pub fn required(mut self) -> Self {
        self.attribute.required = true;
        self.attribute.optional = false;
        self
    }

    pub fn optional(mut self) -> Self {
        self.attribute.optional = true;
        self.attribute.required = false;
        self
    }

    pub fn computed(mut self) -> Self {
        self.attribute.computed = true;
        self
    }

    pub fn sensitive(mut self) -> Self {
        self.attribute.sensitive = true;
        self
    }

    /// Value flows in from configuration but is never persisted
    pub fn write_only(mut self) -> Self {
        self.attribute.write_only = true;
        self
    }

    pub fn deprecated(mut self) -> Self {
        self.attribute.deprecated = true;
        self
    }

    pub fn validator(mut self, validator: Arc<dyn Validator>) -> Self {
        self.attribute.validators.push(validator);
        self
    }

    pub fn plan_modifier(mut self, modifier: Arc<dyn PlanModifier>) -> Self {
        self.attribute.plan_modifiers.push(modifier);
        self
    }

    pub fn default(mut self, default: Arc<dyn AttributeDefault>) -> Self {
        self.attribute.default = Some(default);
        self
    }

    pub fn semantic(mut self, adapter: Arc<dyn ValueAdapter>) -> Self {
        self.attribute.semantic = Some(adapter);
        self
    }

    pub fn build(self) -> Attribute {
        self.attribute
    }
}

/// SchemaBuilder provides fluent API for building schemas
pub struct SchemaBuilder {
    schema: Schema,
}

impl SchemaBuilder {
    pub fn new() -> Self {
        Self {
            schema: Schema::default(),
        }
    }

    pub fn version(mut self, version: i64) -> Self {
        self.schema.version = version;
        self
    }

    pub fn attribute(mut self, attr: Attribute) -> Self {
        self.schema.block.attributes.push(attr);
        self
    }

    pub fn block(mut self, block: NestedBlock) -> Self {
        self.schema.block.block_types.push(block);
        self
    }

    pub fn description(mut self, desc: &str) -> Self {
        self.schema.block.description = desc.to_string();
        self
    }

    pub fn deprecated(mut self) -> Self {
        self.schema.block.deprecated = true;
        self
    }

    pub fn build(self) -> Schema {
        self.schema
    }

    /// Finalize as a block for use inside a [`NestedBlock`]
    pub fn build_block(self) -> Block {
        self.schema.block
    }
}

impl Default for SchemaBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Identity schema: a flat object of primitive attributes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IdentitySchema {
    pub version: i64,
    pub attributes: Vec<IdentityAttribute>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentityAttribute {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: Type,
    #[serde(default)]
    pub description: String,
    pub required_for_import: bool,
    pub optional_for_import: bool,
}

impl IdentityAttribute {
    pub fn required_for_import(name: &str, ty: Type) -> Self {
        Self {
            name: name.to_string(),
            ty,
            description: String::new(),
            required_for_import: true,
            optional_for_import: false,
        }
    }

    pub fn optional_for_import(name: &str, ty: Type) -> Self {
        Self {
            required_for_import: false,
            optional_for_import: true,
            ..Self::required_for_import(name, ty)
        }
    }
}

impl IdentitySchema {
    pub fn new(version: i64, attributes: Vec<IdentityAttribute>) -> Self {
        Self {
            version,
            attributes,
        }
    }

    pub fn ty(&self) -> Type {
        Type::Object(
            self.attributes
                .iter()
                .map(|a| (a.name.clone(), a.ty.clone()))
                .collect(),
        )
    }

    pub fn validate(&self) -> Result<()> {
        if self.attributes.is_empty() {
            return Err(PlugkitError::SchemaInvalid(
                "identity schema must declare at least one attribute".to_string(),
            ));
        }
        let mut seen = BTreeSet::new();
        for attr in &self.attributes {
            if !seen.insert(attr.name.as_str()) {
                return Err(PlugkitError::SchemaInvalid(format!(
                    "identity attribute {:?} is declared twice",
                    attr.name
                )));
            }
            let flat = attr.ty.is_primitive()
                || matches!(&attr.ty, Type::List(e) if e.is_primitive());
            if !flat {
                return Err(PlugkitError::SchemaInvalid(format!(
                    "identity attribute {:?} must be a primitive or a list of primitives, found {}",
                    attr.name, attr.ty
                )));
            }
            if attr.required_for_import == attr.optional_for_import {
                return Err(PlugkitError::SchemaInvalid(format!(
                    "identity attribute {:?} must be exactly one of required or optional for import",
                    attr.name
                )));
            }
        }
        Ok(())
    }
}

/// A provider-defined function parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: Type,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub allow_null_value: bool,
    #[serde(default)]
    pub allow_unknown_values: bool,
}

impl Parameter {
    pub fn new(name: &str, ty: Type) -> Self {
        Self {
            name: name.to_string(),
            ty,
            description: String::new(),
            allow_null_value: false,
            allow_unknown_values: false,
        }
    }

    pub fn allow_null(mut self) -> Self {
        self.allow_null_value = true;
        self
    }

    pub fn allow_unknown(mut self) -> Self {
        self.allow_unknown_values = true;
        self
    }

    pub fn description(mut self, desc: &str) -> Self {
        self.description = desc.to_string();
        self
    }
}

/// Signature of a provider-defined function
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDefinition {
    pub parameters: Vec<Parameter>,
    #[serde(default)]
    pub variadic_parameter: Option<Parameter>,
    pub return_type: Type,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub deprecation_message: String,
}

impl FunctionDefinition {
    pub fn new(return_type: Type) -> Self {
        Self {
            parameters: Vec::new(),
            variadic_parameter: None,
            return_type,
            summary: String::new(),
            description: String::new(),
            deprecation_message: String::new(),
        }
    }

    pub fn parameter(mut self, parameter: Parameter) -> Self {
        self.parameters.push(parameter);
        self
    }

    pub fn variadic(mut self, parameter: Parameter) -> Self {
        self.variadic_parameter = Some(parameter);
        self
    }

    pub fn summary(mut self, summary: &str) -> Self {
        self.summary = summary.to_string();
        self
    }

    /// Parameter governing the argument at `index`, counting the variadic tail.
    pub fn parameter_for(&self, index: usize) -> Option<&Parameter> {
        self.parameters
            .get(index)
            .or(self.variadic_parameter.as_ref())
    }
}

fn child_path(prefix: &AttributePath, name: &str) -> AttributePath {
    prefix.with_step(AttributePathStep::AttributeName(name.to_string()))
}

fn invalid(path: &AttributePath, message: impl fmt::Display) -> PlugkitError {
    if path.is_root() {
        PlugkitError::SchemaInvalid(message.to_string())
    } else {
        PlugkitError::SchemaInvalid(format!("{}: {}", path, message))
    }
}

fn validate_block(block: &Block, prefix: &AttributePath) -> Result<()> {
    let mut names = BTreeSet::new();
    for attr in &block.attributes {
        let path = child_path(prefix, &attr.name);
        if !names.insert(attr.name.as_str()) {
            return Err(invalid(&path, "attribute and block names must be unique"));
        }
        validate_attribute(attr, &path)?;
    }
    for nested in &block.block_types {
        let path = child_path(prefix, &nested.type_name);
        if !names.insert(nested.type_name.as_str()) {
            return Err(invalid(&path, "attribute and block names must be unique"));
        }
        let contains_dynamic = nested.block.implied_type().has_dynamic();
        match nested.nesting {
            NestingMode::Set if contains_dynamic => {
                return Err(invalid(
                    &path,
                    "NestingSet blocks may not contain attributes of dynamic pseudo-type",
                ));
            }
            NestingMode::List | NestingMode::Map if contains_dynamic => {
                return Err(invalid(
                    &path,
                    format!(
                        "{} blocks may not contain attributes of dynamic pseudo-type; declare a nested attribute instead",
                        nested.nesting
                    ),
                ));
            }
            _ => {}
        }
        if nested.max_items > 0 && nested.min_items > nested.max_items {
            return Err(invalid(&path, "min_items cannot exceed max_items"));
        }
        validate_block(&nested.block, &path)?;
    }
    Ok(())
}

fn validate_attribute(attr: &Attribute, path: &AttributePath) -> Result<()> {
    if attr.name.is_empty() {
        return Err(invalid(path, "attribute names cannot be empty"));
    }
    if !attr.required && !attr.optional && !attr.computed {
        return Err(invalid(path, "attribute must be required, optional or computed"));
    }
    if attr.required && attr.optional {
        return Err(invalid(path, "attribute cannot be both required and optional"));
    }
    if attr.required && attr.computed {
        return Err(invalid(path, "attribute cannot be both required and computed"));
    }
    if attr.default.is_some() && !attr.computed {
        return Err(invalid(path, "attribute with a default must be computed"));
    }
    if attr.write_only && attr.computed {
        return Err(invalid(path, "write-only attribute cannot be computed"));
    }
    if let Some(nested) = &attr.nested_type {
        let mut names = BTreeSet::new();
        for inner in &nested.attributes {
            let inner_path = child_path(path, &inner.name);
            if !names.insert(inner.name.as_str()) {
                return Err(invalid(&inner_path, "attribute names must be unique"));
            }
            validate_attribute(inner, &inner_path)?;
        }
    }
    Ok(())
}

#[derive(Clone, Copy)]
enum Nesting {
    Single,
    List,
    Set,
    Map,
}

impl From<NestingMode> for Nesting {
    fn from(mode: NestingMode) -> Self {
        match mode {
            NestingMode::Single | NestingMode::Group => Nesting::Single,
            NestingMode::List => Nesting::List,
            NestingMode::Set => Nesting::Set,
            NestingMode::Map => Nesting::Map,
        }
    }
}

impl From<ObjectNestingMode> for Nesting {
    fn from(mode: ObjectNestingMode) -> Self {
        match mode {
            ObjectNestingMode::Single => Nesting::Single,
            ObjectNestingMode::List => Nesting::List,
            ObjectNestingMode::Set => Nesting::Set,
            ObjectNestingMode::Map => Nesting::Map,
        }
    }
}

fn walk_object(
    attributes: &[Attribute],
    blocks: &[NestedBlock],
    value: &Value,
    path: &AttributePath,
    visitor: &mut dyn FnMut(&AttributePath, &Attribute, &Value),
) {
    for attr in attributes {
        let Some(v) = value.get_attr(&attr.name) else {
            continue;
        };
        let attr_path = child_path(path, &attr.name);
        visitor(&attr_path, attr, v);
        if let Some(nested) = &attr.nested_type {
            walk_elements(nested.nesting.into(), v, &attr_path, &mut |element, element_path| {
                walk_object(&nested.attributes, &[], element, element_path, visitor)
            });
        }
    }
    for nested in blocks {
        let Some(v) = value.get_attr(&nested.type_name) else {
            continue;
        };
        let block_path = child_path(path, &nested.type_name);
        walk_elements(nested.nesting.into(), v, &block_path, &mut |element, element_path| {
            walk_object(
                &nested.block.attributes,
                &nested.block.block_types,
                element,
                element_path,
                visitor,
            )
        });
    }
}

fn walk_elements(
    nesting: Nesting,
    value: &Value,
    path: &AttributePath,
    f: &mut dyn FnMut(&Value, &AttributePath),
) {
    match (nesting, value) {
        (Nesting::Single, Value::Object(_)) => f(value, path),
        (Nesting::List | Nesting::Set, Value::List(_, items) | Value::Set(_, items)) => {
            for (i, item) in items.iter().enumerate() {
                f(item, &path.with_step(AttributePathStep::ElementKeyInt(i as i64)));
            }
        }
        (Nesting::Map, Value::Map(_, items)) => {
            for (k, item) in items {
                f(item, &path.with_step(AttributePathStep::ElementKeyString(k.clone())));
            }
        }
        _ => {}
    }
}

fn transform_object(
    attributes: &[Attribute],
    blocks: &[NestedBlock],
    value: Value,
    path: &AttributePath,
    f: &mut dyn FnMut(&AttributePath, &Attribute, Value) -> Value,
) -> Value {
    let Value::Object(mut attrs) = value else {
        return value;
    };
    for attr in attributes {
        let Some(v) = attrs.remove(&attr.name) else {
            continue;
        };
        let attr_path = child_path(path, &attr.name);
        let mut v = f(&attr_path, attr, v);
        if let Some(nested) = &attr.nested_type {
            v = transform_elements(nested.nesting.into(), v, &attr_path, &mut |element, p| {
                transform_object(&nested.attributes, &[], element, p, f)
            });
        }
        attrs.insert(attr.name.clone(), v);
    }
    for nested in blocks {
        let Some(v) = attrs.remove(&nested.type_name) else {
            continue;
        };
        let block_path = child_path(path, &nested.type_name);
        let v = transform_elements(nested.nesting.into(), v, &block_path, &mut |element, p| {
            transform_object(
                &nested.block.attributes,
                &nested.block.block_types,
                element,
                p,
                f,
            )
        });
        attrs.insert(nested.type_name.clone(), v);
    }
    Value::Object(attrs)
}

fn transform_elements(
    nesting: Nesting,
    value: Value,
    path: &AttributePath,
    f: &mut dyn FnMut(Value, &AttributePath) -> Value,
) -> Value {
    let index_path = |i: usize| path.with_step(AttributePathStep::ElementKeyInt(i as i64));
    match (nesting, value) {
        (Nesting::Single, value @ Value::Object(_)) => f(value, path),
        (Nesting::List, Value::List(ty, items)) => Value::List(
            ty,
            items
                .into_iter()
                .enumerate()
                .map(|(i, item)| f(item, &index_path(i)))
                .collect(),
        ),
        (Nesting::Set, Value::Set(ty, items)) => Value::Set(
            ty,
            items
                .into_iter()
                .enumerate()
                .map(|(i, item)| f(item, &index_path(i)))
                .collect(),
        ),
        (Nesting::Map, Value::Map(ty, items)) => Value::Map(
            ty,
            items
                .into_iter()
                .map(|(k, item)| {
                    let p = path.with_step(AttributePathStep::ElementKeyString(k.clone()));
                    let item = f(item, &p);
                    (k, item)
                })
                .collect(),
        ),
        (_, other) => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn string_attr(name: &str) -> AttributeBuilder {
        AttributeBuilder::new(name, Type::String)
    }

    #[test]
    fn attribute_builder_creates_required_string() {
        let attr = string_attr("name")
            .description("The name of the resource")
            .required()
            .build();

        assert_eq!(attr.name, "name");
        assert_eq!(attr.ty, Type::String);
        assert!(attr.required);
        assert!(!attr.optional);
        assert_eq!(attr.description, "The name of the resource");
    }

    #[test]
    fn implied_type_includes_blocks() {
        let schema = SchemaBuilder::new()
            .attribute(string_attr("id").computed().build())
            .block(NestedBlock::new(
                "rule",
                NestingMode::List,
                SchemaBuilder::new()
                    .attribute(AttributeBuilder::new("port", Type::Number).required().build())
                    .build_block(),
            ))
            .build();

        assert_eq!(
            schema.ty(),
            Type::object([
                ("id", Type::String),
                ("rule", Type::list(Type::object([("port", Type::Number)]))),
            ])
        );
    }

    #[test]
    fn set_block_with_dynamic_is_rejected() {
        let schema = SchemaBuilder::new()
            .block(NestedBlock::new(
                "foo",
                NestingMode::Set,
                SchemaBuilder::new()
                    .attribute(AttributeBuilder::new("bar", Type::Dynamic).optional().build())
                    .build_block(),
            ))
            .build();

        let err = schema.validate().unwrap_err().to_string();
        assert!(err.contains("NestingSet blocks may not contain attributes of dynamic pseudo-type"));
    }

    #[test]
    fn list_block_with_dynamic_is_rejected() {
        let schema = SchemaBuilder::new()
            .block(NestedBlock::new(
                "foo",
                NestingMode::List,
                SchemaBuilder::new()
                    .attribute(AttributeBuilder::new("bar", Type::Dynamic).optional().build())
                    .build_block(),
            ))
            .build();

        let err = schema.validate().unwrap_err().to_string();
        assert!(err.contains("NestingList blocks may not contain attributes of dynamic pseudo-type"));
    }

    #[test]
    fn single_block_and_set_nested_attribute_with_dynamic_are_accepted() {
        let schema = SchemaBuilder::new()
            .block(NestedBlock::new(
                "single",
                NestingMode::Single,
                SchemaBuilder::new()
                    .attribute(AttributeBuilder::new("bar", Type::Dynamic).optional().build())
                    .build_block(),
            ))
            .attribute(
                AttributeBuilder::nested(
                    "set_attr",
                    NestedType::new(
                        ObjectNestingMode::Set,
                        vec![AttributeBuilder::new("bar", Type::Dynamic).optional().build()],
                    ),
                )
                .optional()
                .build(),
            )
            .build();

        assert!(schema.validate().is_ok());
    }

    #[test]
    fn flag_combinations_are_checked() {
        let none = SchemaBuilder::new().attribute(string_attr("a").build()).build();
        assert!(none.validate().is_err());

        let required_computed = SchemaBuilder::new()
            .attribute(string_attr("a").required().computed().build())
            .build();
        assert!(required_computed.validate().is_err());

        let write_only_computed = SchemaBuilder::new()
            .attribute(string_attr("a").optional().computed().write_only().build())
            .build();
        assert!(write_only_computed.validate().is_err());

        let write_only_required = SchemaBuilder::new()
            .attribute(string_attr("a").required().write_only().build())
            .build();
        assert!(write_only_required.validate().is_ok());
    }

    #[test]
    fn null_write_only_reaches_nested_blocks() {
        let schema = SchemaBuilder::new()
            .attribute(string_attr("password").required().write_only().build())
            .block(NestedBlock::new(
                "creds",
                NestingMode::List,
                SchemaBuilder::new()
                    .attribute(string_attr("token").optional().write_only().build())
                    .build_block(),
            ))
            .build();
        let creds_ty = Type::object([("token", Type::String)]);
        let value = Value::object([
            ("password", Value::from("fakepassword")),
            (
                "creds",
                Value::list(creds_ty, vec![Value::object([("token", Value::from("t"))])]),
            ),
        ]);

        let nulled = schema.null_write_only(value);

        assert_eq!(nulled.get_attr("password"), Some(&Value::null(Type::String)));
        let token = nulled
            .get_path(&AttributePath::new("creds").index(0).attribute("token"))
            .unwrap();
        assert_eq!(token, &Value::null(Type::String));
    }

    #[test]
    fn attribute_lookup_through_nesting() {
        let schema = SchemaBuilder::new()
            .attribute(
                AttributeBuilder::nested(
                    "endpoints",
                    NestedType::new(
                        ObjectNestingMode::List,
                        vec![string_attr("host").required().build()],
                    ),
                )
                .optional()
                .build(),
            )
            .build();

        let attr = schema
            .attribute_at(&AttributePath::new("endpoints").index(3).attribute("host"))
            .unwrap();
        assert_eq!(attr.name, "host");
        assert!(schema.attribute_at(&AttributePath::new("missing")).is_none());
    }

    #[test]
    fn walk_visits_parents_before_children() {
        let schema = SchemaBuilder::new()
            .attribute(
                AttributeBuilder::nested(
                    "outer",
                    NestedType::new(
                        ObjectNestingMode::Single,
                        vec![string_attr("inner").optional().build()],
                    ),
                )
                .optional()
                .build(),
            )
            .build();
        let value = Value::object([("outer", Value::object([("inner", Value::from("x"))]))]);

        let mut seen = Vec::new();
        schema.walk(&value, &mut |path, _, _| seen.push(path.to_string()));

        assert_eq!(seen, vec!["outer".to_string(), "outer.inner".to_string()]);
    }

    #[test]
    fn identity_schema_must_be_flat() {
        let ok = IdentitySchema::new(
            0,
            vec![IdentityAttribute::required_for_import("id", Type::String)],
        );
        assert!(ok.validate().is_ok());

        let nested = IdentitySchema::new(
            0,
            vec![IdentityAttribute::required_for_import(
                "obj",
                Type::object([("a", Type::String)]),
            )],
        );
        assert!(nested.validate().is_err());
    }

    #[test]
    fn variadic_parameter_governs_tail() {
        let def = FunctionDefinition::new(Type::String)
            .parameter(Parameter::new("sep", Type::String))
            .variadic(Parameter::new("parts", Type::String).allow_null());

        assert_eq!(def.parameter_for(0).unwrap().name, "sep");
        assert_eq!(def.parameter_for(5).unwrap().name, "parts");
    }
}
