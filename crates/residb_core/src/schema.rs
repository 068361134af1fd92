//! Hand-written type metadata.
//!
//! A [`TypeSchema`] tells the store which properties a record type has,
//! how each is indexed and persisted, and which uniqueness rules apply.
//!
//! ```
//! use residb_codec::PropertyKind;
//! use residb_core::{CompositeUnique, PropertyDef, TypeSchema, UniqueConstraint};
//!
//! let schema = TypeSchema::new("User")
//!     .property(PropertyDef::new("username", PropertyKind::Text))
//!     .property(PropertyDef::new("age", PropertyKind::Numeric))
//!     .property(PropertyDef::new("team", PropertyKind::Text))
//!     .property(PropertyDef::new("badge", PropertyKind::Numeric))
//!     .unique(UniqueConstraint::new("username"))
//!     .composite(CompositeUnique::new("team_badge", ["team", "badge"]));
//!
//! assert!(schema.validate().is_ok());
//! ```

use crate::error::{CoreError, CoreResult};
use residb_codec::{PropertyKind, Value, ID_KEY};
use std::collections::HashSet;

/// Declaration of a single property.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyDef {
    /// Property name.
    pub name: String,
    /// Declared value kind.
    pub kind: PropertyKind,
    /// Whether an index is maintained for this property.
    pub indexed: bool,
    /// Whether the property is written to the blob store.
    pub persisted: bool,
    /// Value used for a non-persisted property when records are loaded.
    pub default: Value,
}

impl PropertyDef {
    /// Declares an indexed, persisted property.
    pub fn new(name: impl Into<String>, kind: PropertyKind) -> Self {
        let default = match kind {
            PropertyKind::Numeric => Value::Integer(0),
            PropertyKind::Boolean => Value::Bool(false),
            _ => Value::Null,
        };
        Self {
            name: name.into(),
            kind,
            indexed: true,
            persisted: true,
            default,
        }
    }

    /// Excludes the property from indexing.
    #[must_use]
    pub fn not_indexed(mut self) -> Self {
        self.indexed = false;
        self
    }

    /// Excludes the property from persistence.
    #[must_use]
    pub fn transient(mut self) -> Self {
        self.persisted = false;
        self
    }

    /// Sets the value restored for a non-persisted property.
    #[must_use]
    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = value.into();
        self
    }
}

/// A single-property uniqueness rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniqueConstraint {
    /// Constrained property.
    pub property: String,
    /// When true, null values are exempt from the rule.
    pub allow_null: bool,
    /// Custom violation message.
    pub message: Option<String>,
}

impl UniqueConstraint {
    /// Declares `property` unique; nulls are exempt.
    pub fn new(property: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            allow_null: true,
            message: None,
        }
    }

    /// Treats null as an ordinary value, so at most one record may hold it.
    #[must_use]
    pub fn reject_null(mut self) -> Self {
        self.allow_null = false;
        self
    }

    /// Sets the violation message.
    #[must_use]
    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// A named group of properties whose combined value must be unique.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompositeUnique {
    /// Group name.
    pub name: String,
    /// Properties in declaration order.
    pub properties: Vec<String>,
    /// When true, a tuple with any null component is exempt.
    pub allow_null: bool,
    /// Custom violation message.
    pub message: Option<String>,
}

impl CompositeUnique {
    /// Declares a composite group; tuples containing null are exempt.
    pub fn new<I, S>(name: impl Into<String>, properties: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            properties: properties.into_iter().map(Into::into).collect(),
            allow_null: true,
            message: None,
        }
    }

    /// Enforces the group even when components are null.
    #[must_use]
    pub fn reject_null(mut self) -> Self {
        self.allow_null = false;
        self
    }

    /// Sets the violation message.
    #[must_use]
    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// Metadata for one record type.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeSchema {
    /// Record type name.
    pub name: String,
    /// Declared properties.
    pub properties: Vec<PropertyDef>,
    /// Single-property uniqueness rules.
    pub unique: Vec<UniqueConstraint>,
    /// Composite uniqueness groups.
    pub composite: Vec<CompositeUnique>,
    /// False for memory-only types, which skip persistence.
    pub persistent: bool,
}

impl TypeSchema {
    /// Starts a schema for `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            properties: Vec::new(),
            unique: Vec::new(),
            composite: Vec::new(),
            persistent: true,
        }
    }

    /// Adds a property.
    #[must_use]
    pub fn property(mut self, def: PropertyDef) -> Self {
        self.properties.push(def);
        self
    }

    /// Adds a single-property uniqueness rule.
    #[must_use]
    pub fn unique(mut self, constraint: UniqueConstraint) -> Self {
        self.unique.push(constraint);
        self
    }

    /// Adds a composite uniqueness group.
    #[must_use]
    pub fn composite(mut self, group: CompositeUnique) -> Self {
        self.composite.push(group);
        self
    }

    /// Marks the whole type memory-only.
    #[must_use]
    pub fn memory_only(mut self) -> Self {
        self.persistent = false;
        self
    }

    /// Looks up a property declaration.
    pub fn property_def(&self, name: &str) -> Option<&PropertyDef> {
        self.properties.iter().find(|p| p.name == name)
    }

    /// Properties with an index.
    pub fn indexed_properties(&self) -> impl Iterator<Item = &PropertyDef> {
        self.properties.iter().filter(|p| p.indexed)
    }

    /// Properties written to the blob store.
    pub fn persisted_properties(&self) -> impl Iterator<Item = &PropertyDef> {
        self.properties.iter().filter(|p| p.persisted)
    }

    /// Returns true if any uniqueness rule is declared.
    pub fn has_constraints(&self) -> bool {
        !self.unique.is_empty() || !self.composite.is_empty()
    }

    /// Checks the schema for internal consistency.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidSchema`] for an empty type name, a
    /// duplicate or reserved property name, a default that does not fit
    /// its property's kind, or a constraint naming an undeclared property.
    /// On a persistent type a constraint may not name a transient property,
    /// since every reloaded record would share its default.
    pub fn validate(&self) -> CoreResult<()> {
        if self.name.trim().is_empty() {
            return Err(CoreError::invalid_schema("type name must not be empty"));
        }

        let mut seen = HashSet::new();
        for prop in &self.properties {
            if prop.name.is_empty() {
                return Err(CoreError::invalid_schema(format!(
                    "{}: property name must not be empty",
                    self.name
                )));
            }
            if prop.name == ID_KEY {
                return Err(CoreError::invalid_schema(format!(
                    "{}: \"{ID_KEY}\" is reserved for the record identity",
                    self.name
                )));
            }
            if !seen.insert(prop.name.as_str()) {
                return Err(CoreError::invalid_schema(format!(
                    "{}: duplicate property {}",
                    self.name, prop.name
                )));
            }
            if let Err(e) = prop.kind.coerce(prop.default.clone()) {
                return Err(CoreError::invalid_schema(format!(
                    "{}: default of {} does not fit: {e}",
                    self.name, prop.name
                )));
            }
        }

        for constraint in &self.unique {
            self.require_property(&constraint.property)?;
        }

        let mut groups = HashSet::new();
        for group in &self.composite {
            if group.properties.is_empty() {
                return Err(CoreError::invalid_schema(format!(
                    "{}: composite group {} has no properties",
                    self.name, group.name
                )));
            }
            if !groups.insert(group.name.as_str()) {
                return Err(CoreError::invalid_schema(format!(
                    "{}: duplicate composite group {}",
                    self.name, group.name
                )));
            }
            for prop in &group.properties {
                self.require_property(prop)?;
            }
        }

        Ok(())
    }

    fn require_property(&self, name: &str) -> CoreResult<()> {
        let Some(def) = self.property_def(name) else {
            return Err(CoreError::invalid_schema(format!(
                "{}: constraint refers to undeclared property {name}",
                self.name
            )));
        };
        if self.persistent && !def.persisted {
            return Err(CoreError::invalid_schema(format!(
                "{}: constraint refers to transient property {name}",
                self.name
            )));
        }
        Ok(())
    }

    /// Validates the schema and stores every default in its kind's form.
    ///
    /// # Errors
    ///
    /// As for [`validate`](Self::validate).
    pub(crate) fn normalized(mut self) -> CoreResult<Self> {
        self.validate()?;
        for def in &mut self.properties {
            let default = std::mem::replace(&mut def.default, Value::Null);
            def.default = def
                .kind
                .coerce(default)
                .map_err(|e| CoreError::from_coercion(&self.name, &def.name, e))?;
        }
        Ok(self)
    }
}
