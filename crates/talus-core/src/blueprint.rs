//! # Blueprint
//!
//! The read-only schema a project graph is built against: node types, which
//! types may nest under which, property schemas, and velocity weights.
//!
//! The engine never writes to a Blueprint. Loading one from its textual
//! source is the caller's business; the struct derives `Deserialize` so any
//! loader can produce it. Fields the engine does not understand are kept in
//! the opaque `extras` maps rather than being reached for by name.

use crate::primitives::{
    DEFAULT_BUDGET_PRIORITY, DEFAULT_BUDGET_PRIORITY_PROPERTY, DEFAULT_COST_PROPERTY,
    DEFAULT_IMPORTANCE_PROPERTY, DEFAULT_LEVEL_MULTIPLIER,
};
use crate::{PropertyValue, TalusError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// =============================================================================
// PROPERTY SCHEMA
// =============================================================================

/// The declared kind of a property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyKind {
    Text,
    Number,
    Currency,
    Select,
}

/// One option of a select property.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectOption {
    pub id: String,
    pub label: String,
}

/// Schema of a single property on a node type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyDef {
    pub id: String,
    pub kind: PropertyKind,
    #[serde(default)]
    pub options: Vec<SelectOption>,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub default: Option<PropertyValue>,
}

impl PropertyDef {
    #[must_use]
    pub fn new(id: impl Into<String>, kind: PropertyKind) -> Self {
        Self {
            id: id.into(),
            kind,
            options: Vec::new(),
            required: false,
            default: None,
        }
    }

    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    #[must_use]
    pub fn with_default(mut self, value: impl Into<PropertyValue>) -> Self {
        self.default = Some(value.into());
        self
    }

    #[must_use]
    pub fn with_option(mut self, id: impl Into<String>, label: impl Into<String>) -> Self {
        self.options.push(SelectOption {
            id: id.into(),
            label: label.into(),
        });
        self
    }

    /// Check that a value has the shape this property declares.
    pub fn validate(&self, value: &PropertyValue) -> Result<(), TalusError> {
        match (self.kind, value) {
            (PropertyKind::Text, PropertyValue::Text(_)) => Ok(()),
            (PropertyKind::Number | PropertyKind::Currency, PropertyValue::Number(n)) => {
                if n.is_finite() {
                    Ok(())
                } else {
                    Err(TalusError::ValidationError(format!(
                        "property '{}' must be a finite number",
                        self.id
                    )))
                }
            }
            (PropertyKind::Select, PropertyValue::Text(option)) => {
                if self.options.iter().any(|o| &o.id == option) {
                    Ok(())
                } else {
                    Err(TalusError::ValidationError(format!(
                        "'{}' is not an option of select property '{}'",
                        option, self.id
                    )))
                }
            }
            (kind, value) => Err(TalusError::ValidationError(format!(
                "property '{}' expects {:?}, got {}",
                self.id, kind, value
            ))),
        }
    }

    /// Find the option whose label matches, for label -> id normalization.
    #[must_use]
    pub fn option_by_label(&self, label: &str) -> Option<&SelectOption> {
        self.options.iter().find(|o| o.label == label)
    }
}

// =============================================================================
// NODE TYPES
// =============================================================================

/// Definition of one node type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeTypeDef {
    pub id: String,
    pub label: String,
    #[serde(default)]
    pub allowed_children: Vec<String>,
    #[serde(default)]
    pub properties: Vec<PropertyDef>,
    /// Unknown extensions (icons, colours, ...), carried but never interpreted.
    #[serde(default)]
    pub extras: BTreeMap<String, serde_json::Value>,
}

impl NodeTypeDef {
    #[must_use]
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            allowed_children: Vec::new(),
            properties: Vec::new(),
            extras: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn allow_child(mut self, type_id: impl Into<String>) -> Self {
        self.allowed_children.push(type_id.into());
        self
    }

    #[must_use]
    pub fn with_property(mut self, property: PropertyDef) -> Self {
        self.properties.push(property);
        self
    }

    /// Look up a property definition.
    #[must_use]
    pub fn property(&self, property_id: &str) -> Option<&PropertyDef> {
        self.properties.iter().find(|p| p.id == property_id)
    }

    /// Declared defaults, in declaration order.
    pub fn defaults(&self) -> impl Iterator<Item = (&str, &PropertyValue)> + '_ {
        self.properties
            .iter()
            .filter_map(|p| p.default.as_ref().map(|v| (p.id.as_str(), v)))
    }
}

// =============================================================================
// VELOCITY CONFIGURATION
// =============================================================================

fn default_importance_property() -> String {
    DEFAULT_IMPORTANCE_PROPERTY.to_string()
}

fn default_cost_property() -> String {
    DEFAULT_COST_PROPERTY.to_string()
}

fn default_budget_priority_property() -> String {
    DEFAULT_BUDGET_PRIORITY_PROPERTY.to_string()
}

fn default_budget_priority() -> f64 {
    DEFAULT_BUDGET_PRIORITY
}

fn default_boost_factor() -> f64 {
    1.0
}

/// Weights used by the velocity engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VelocityConfig {
    /// Multiplier per depth level, index 0 = root. Deeper levels use 1.
    #[serde(default)]
    pub hierarchy_multipliers: Vec<f64>,
    #[serde(default = "default_importance_property")]
    pub importance_property: String,
    #[serde(default = "default_cost_property")]
    pub cost_property: String,
    #[serde(default = "default_budget_priority_property")]
    pub budget_priority_property: String,
    #[serde(default = "default_budget_priority")]
    pub default_budget_priority: f64,
    /// Share of a blocked node's base score credited to its blocker.
    #[serde(default = "default_boost_factor")]
    pub dependency_boost_factor: f64,
}

impl Default for VelocityConfig {
    fn default() -> Self {
        Self {
            hierarchy_multipliers: Vec::new(),
            importance_property: default_importance_property(),
            cost_property: default_cost_property(),
            budget_priority_property: default_budget_priority_property(),
            default_budget_priority: default_budget_priority(),
            dependency_boost_factor: default_boost_factor(),
        }
    }
}

impl VelocityConfig {
    /// Multiplier for a depth level (0 = root).
    #[must_use]
    pub fn level_multiplier(&self, depth: usize) -> f64 {
        self.hierarchy_multipliers
            .get(depth)
            .copied()
            .filter(|m| m.is_finite())
            .unwrap_or(DEFAULT_LEVEL_MULTIPLIER)
    }
}

// =============================================================================
// BLUEPRINT
// =============================================================================

/// A complete project template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Blueprint {
    pub id: String,
    pub name: String,
    /// Schema version graphs built from this blueprint are recorded at.
    pub version: String,
    /// Type of the node created when a fresh project is opened.
    pub root_type: String,
    pub node_types: Vec<NodeTypeDef>,
    #[serde(default)]
    pub velocity: VelocityConfig,
    #[serde(default)]
    pub extras: BTreeMap<String, serde_json::Value>,
}

impl Blueprint {
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        version: impl Into<String>,
        root_type: impl Into<String>,
    ) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            version: version.into(),
            root_type: root_type.into(),
            node_types: Vec::new(),
            velocity: VelocityConfig::default(),
            extras: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_type(mut self, node_type: NodeTypeDef) -> Self {
        self.node_types.push(node_type);
        self
    }

    #[must_use]
    pub fn with_velocity(mut self, velocity: VelocityConfig) -> Self {
        self.velocity = velocity;
        self
    }

    /// Look up a node type.
    #[must_use]
    pub fn node_type(&self, type_id: &str) -> Option<&NodeTypeDef> {
        self.node_types.iter().find(|t| t.id == type_id)
    }

    /// Check if `child_type` may be created under `parent_type`.
    ///
    /// Unknown parent types allow nothing.
    #[must_use]
    pub fn is_allowed_child(&self, parent_type: &str, child_type: &str) -> bool {
        self.node_type(parent_type)
            .is_some_and(|def| def.allowed_children.iter().any(|c| c == child_type))
    }

    /// Fail with `InvalidHierarchy` unless `child_type` may sit under `parent_type`.
    pub fn ensure_allowed_child(&self, parent_type: &str, child_type: &str) -> Result<(), TalusError> {
        if self.is_allowed_child(parent_type, child_type) {
            Ok(())
        } else {
            Err(TalusError::InvalidHierarchy {
                parent_type: Some(parent_type.to_string()),
                child_type: child_type.to_string(),
            })
        }
    }

    /// Validate a property assignment against the node type's schema.
    pub fn validate_property(
        &self,
        type_id: &str,
        property_id: &str,
        value: &PropertyValue,
    ) -> Result<(), TalusError> {
        self.property_def(type_id, property_id)?.validate(value)
    }

    /// Look up a property definition, failing with `ValidationError`.
    pub fn property_def(&self, type_id: &str, property_id: &str) -> Result<&PropertyDef, TalusError> {
        let def = self.node_type(type_id).ok_or_else(|| {
            TalusError::ValidationError(format!("unknown node type '{}'", type_id))
        })?;
        def.property(property_id).ok_or_else(|| {
            TalusError::ValidationError(format!(
                "type '{}' has no property '{}'",
                type_id, property_id
            ))
        })
    }
}

// =============================================================================
// TESTS
// =============================================================================
