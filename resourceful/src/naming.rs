//! Convention-based naming for resources
//!
//! A handler named `WidgetsController` manages the `Widget` entity, binds a
//! single item as `widget` and a collection as `widgets`, and reads submitted
//! attributes from the `widget` parameter.
//!
//! # Inflection rules
//!
//! Pluralization deliberately follows a small fixed rule set instead of a
//! natural-language dictionary:
//!
//! | Singular ending              | Plural            |
//! |------------------------------|-------------------|
//! | consonant + `y`              | `ies`             |
//! | `s`, `x`, `z`, `ch`, `sh`    | append `es`       |
//! | anything else                | append `s`        |
//!
//! Singularization inverts the `ies`, `sses`, `xes`, `zes`, `ches` and `shes`
//! forms, leaves words ending in `ss` or `us` alone, and otherwise strips one
//! trailing `s`. Irregular nouns (`person`/`people`) are not handled; register
//! those entity types explicitly.

use std::any::type_name;
use std::collections::HashMap;
use std::fmt;

use heck::{ToSnakeCase, ToUpperCamelCase};

use crate::error::{Error, Result};

/// Namespace separator in entity type names
pub const NAMESPACE_SEPARATOR: &str = "::";

/// Suffixes stripped from handler names, matched case-insensitively
const HANDLER_SUFFIXES: [&str; 2] = ["controller", "handler"];

/// Descriptor of a domain entity type managed by a resource
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntityType {
    name: String,
}

impl EntityType {
    /// Create a descriptor from a (possibly namespaced) type name
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    /// Descriptor named after a Rust type, without its module path
    #[must_use]
    pub fn of<T: ?Sized>() -> Self {
        let full = type_name::<T>();
        // Drop generic arguments before taking the last path segment
        let base = full.split('<').next().unwrap_or(full);
        let simple = base.rsplit(NAMESPACE_SEPARATOR).next().unwrap_or(base);
        Self::new(simple)
    }

    /// Full name, including any namespace
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name without namespace, used in user-facing messages
    #[must_use]
    pub fn simple_name(&self) -> &str {
        self.name
            .rsplit(NAMESPACE_SEPARATOR)
            .next()
            .unwrap_or(&self.name)
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Explicit registry of entity types known to the application
///
/// Populated at startup; convention-derived lookups resolve against it.
#[derive(Debug, Clone, Default)]
pub struct EntityRegistry {
    types: HashMap<String, EntityType>,
}

impl EntityRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an entity type descriptor
    #[must_use]
    pub fn register(mut self, entity: EntityType) -> Self {
        self.types.insert(entity.name().to_string(), entity);
        self
    }

    /// Register an entity type named after a Rust type
    #[must_use]
    pub fn register_type<T: ?Sized>(self) -> Self {
        self.register(EntityType::of::<T>())
    }

    /// Look up an entity type by its full name
    #[must_use]
    pub fn resolve(&self, name: &str) -> Option<&EntityType> {
        self.types.get(name)
    }

    /// Number of registered types
    #[must_use]
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Check whether the registry is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

/// Resolve the entity type a handler manages
///
/// An explicit override always wins. Otherwise the handler name is stripped of
/// its `Controller`/`Handler` suffix, classified, and looked up in `registry`.
///
/// # Errors
///
/// Returns [`Error::UnresolvedEntityType`] if the derived name is not registered.
pub fn entity_type_for(
    handler_name: &str,
    explicit: Option<&EntityType>,
    registry: &EntityRegistry,
) -> Result<EntityType> {
    if let Some(entity) = explicit {
        return Ok(entity.clone());
    }

    let name = classify(strip_handler_suffix(handler_name));
    registry
        .resolve(&name)
        .cloned()
        .ok_or_else(|| Error::UnresolvedEntityType {
            handler: handler_name.to_string(),
            name,
        })
}

/// Strip a trailing `Controller` or `Handler` suffix, ignoring case
#[must_use]
pub fn strip_handler_suffix(name: &str) -> &str {
    let lower = name.to_ascii_lowercase();
    for suffix in HANDLER_SUFFIXES {
        if lower.ends_with(suffix) && lower.len() > suffix.len() {
            return &name[..name.len() - suffix.len()];
        }
    }
    name
}

/// Convert a (plural, any-case) name into a singular entity type name
///
/// `widgets` → `Widget`, `admin::line_items` → `Admin::LineItem`.
#[must_use]
pub fn classify(name: &str) -> String {
    let mut segments: Vec<String> = name
        .split(NAMESPACE_SEPARATOR)
        .map(|segment| segment.to_upper_camel_case())
        .collect();

    if let Some(last) = segments.last_mut() {
        let snake = last.to_snake_case();
        let (head, tail) = split_last_word(&snake);
        *last = format!("{head}{}", singularize(tail)).to_upper_camel_case();
    }

    segments.join(NAMESPACE_SEPARATOR)
}

/// Binding name for a single item: `Admin::WidgetPart` → `admin_widget_part`
#[must_use]
pub fn item_binding_name(entity: &EntityType) -> String {
    entity
        .name()
        .split(NAMESPACE_SEPARATOR)
        .map(|segment| segment.to_snake_case())
        .collect::<Vec<_>>()
        .join("_")
}

/// Binding name for a collection: `admin_widget_part` → `admin_widget_parts`
#[must_use]
pub fn list_binding_name(item_binding_name: &str) -> String {
    let (head, tail) = split_last_word(item_binding_name);
    format!("{head}{}", pluralize(tail))
}

/// Pluralize a single lower-case word
#[must_use]
pub fn pluralize(word: &str) -> String {
    if word.is_empty() {
        return String::new();
    }
    if let Some(stem) = word.strip_suffix('y') {
        if stem.chars().last().is_some_and(|c| !is_vowel(c)) {
            return format!("{stem}ies");
        }
    }
    if ["s", "x", "z", "ch", "sh"].iter().any(|end| word.ends_with(end)) {
        return format!("{word}es");
    }
    format!("{word}s")
}

/// Singularize a single lower-case word
#[must_use]
pub fn singularize(word: &str) -> String {
    if let Some(stem) = word.strip_suffix("ies") {
        if !stem.is_empty() {
            return format!("{stem}y");
        }
    }
    for ending in ["sses", "xes", "zes", "ches", "shes"] {
        if word.ends_with(ending) {
            return word[..word.len() - 2].to_string();
        }
    }
    if word.ends_with("ss") || word.ends_with("us") {
        return word.to_string();
    }
    match word.strip_suffix('s') {
        Some(stem) if !stem.is_empty() => stem.to_string(),
        _ => word.to_string(),
    }
}

/// Names derived from an entity type, computed once per resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingNames {
    /// Binding for the single item (`widget`)
    pub item: String,
    /// Binding for the collection (`widgets`)
    pub list: String,
    /// Parameter holding submitted attributes (`widget`)
    pub param_key: String,
}

impl BindingNames {
    /// Derive all names for an entity type
    #[must_use]
    pub fn for_entity(entity: &EntityType) -> Self {
        let item = item_binding_name(entity);
        let list = list_binding_name(&item);
        Self {
            param_key: item.clone(),
            item,
            list,
        }
    }
}

fn split_last_word(snake: &str) -> (&str, &str) {
    match snake.rfind('_') {
        Some(idx) => snake.split_at(idx + 1),
        None => ("", snake),
    }
}

fn is_vowel(c: char) -> bool {
    matches!(c, 'a' | 'e' | 'i' | 'o' | 'u')
}
