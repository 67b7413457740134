//! Per-type field declarations.
//!
//! Replaces runtime reflection with an explicit table built at registration
//! time: each entity type declares which fields are persistable and what
//! kind of value they hold. Undeclared fields are private runtime state and
//! are never serialized or diffed.

use kiln_types::FieldKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A single persistable field declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDecl {
    /// Field name, unique within its type.
    pub name: String,
    /// The kind of value the field holds.
    pub kind: FieldKind,
    /// The statically expected entity type of referenced elements.
    /// Only meaningful for `EntityRef`, `OrderedList` and `KeyedMap`; the
    /// serialized form's type tag overrides this at deserialize time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub element_type: Option<String>,
}

impl FieldDecl {
    /// Shorthand for a primitive (JSON-safe) field.
    #[must_use]
    pub fn primitive(name: &str) -> Self {
        Self {
            name: name.into(),
            kind: FieldKind::Primitive,
            element_type: None,
        }
    }

    /// Shorthand for a single entity reference field.
    #[must_use]
    pub fn entity_ref(name: &str, element_type: &str) -> Self {
        Self {
            name: name.into(),
            kind: FieldKind::EntityRef,
            element_type: Some(element_type.into()),
        }
    }

    /// Shorthand for an ordered list of entity references.
    #[must_use]
    pub fn ordered_list(name: &str, element_type: &str) -> Self {
        Self {
            name: name.into(),
            kind: FieldKind::OrderedList,
            element_type: Some(element_type.into()),
        }
    }

    /// Shorthand for a string-keyed map of entity references.
    #[must_use]
    pub fn keyed_map(name: &str, element_type: &str) -> Self {
        Self {
            name: name.into(),
            kind: FieldKind::KeyedMap,
            element_type: Some(element_type.into()),
        }
    }
}

/// The declared shape of one entity type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeDecl {
    /// Declarations in insertion order.
    fields: Vec<FieldDecl>,
}

impl TypeDecl {
    /// Returns the ordered field declarations.
    #[must_use]
    pub fn fields(&self) -> &[FieldDecl] {
        &self.fields
    }

    /// Looks up a declaration by field name.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldDecl> {
        self.fields.iter().find(|f| f.name == name)
    }

    fn declare(&mut self, decl: FieldDecl) {
        // Re-declaring a field replaces it in place, keeping its position.
        if let Some(existing) = self.fields.iter_mut().find(|f| f.name == decl.name) {
            *existing = decl;
        } else {
            self.fields.push(decl);
        }
    }
}

/// Registry of all entity types known to a store.
///
/// Built once during application startup and then shared immutably. There is
/// no dynamic redeclaration; declaring the same field twice is idempotent
/// (last write wins, insertion position preserved).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TypeRegistry {
    types: BTreeMap<String, TypeDecl>,
}

impl TypeRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a field declaration for `type_name`, creating the type on
    /// first use.
    pub fn declare(&mut self, type_name: &str, decl: FieldDecl) {
        self.types.entry(type_name.into()).or_default().declare(decl);
    }

    /// Registers a type with no persistable fields (identity only).
    pub fn declare_type(&mut self, type_name: &str) {
        self.types.entry(type_name.into()).or_default();
    }

    /// Returns the ordered declaration list for a type, empty if unknown.
    #[must_use]
    pub fn fields_of(&self, type_name: &str) -> &[FieldDecl] {
        self.types.get(type_name).map_or(&[], |t| t.fields())
    }

    /// Returns the full declaration for a type.
    #[must_use]
    pub fn decl(&self, type_name: &str) -> Option<&TypeDecl> {
        self.types.get(type_name)
    }

    /// Whether the type has been registered.
    #[must_use]
    pub fn contains(&self, type_name: &str) -> bool {
        self.types.contains_key(type_name)
    }
}
