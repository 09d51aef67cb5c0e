//! Persistence collaborator
//!
//! The pipeline never talks to a database directly. It drives a
//! [`Persistence`] implementation through a small set of operations:
//! construct, find, list, save, update, delete, and the read-only
//! checks it needs to pick a response branch.
//!
//! The trait uses RPITIT (Return Position Impl Trait In Traits), so
//! implementations can be written with plain `async fn`.
//!
//! # Example
//!
//! ```rust,ignore
//! use resourceful::persistence::{Attributes, Persistence, ValidationErrors};
//!
//! struct WidgetStore {
//!     pool: PgPool,
//! }
//!
//! impl Persistence for WidgetStore {
//!     type Entity = Widget;
//!
//!     fn construct(&self, attrs: Option<&Attributes>) -> Result<Widget> {
//!         Widget::from_attributes(attrs)
//!     }
//!
//!     async fn find_by_id(&self, id: &str) -> Result<Option<Widget>> {
//!         sqlx::query_as!(Widget, "SELECT * FROM widgets WHERE id = $1", id)
//!             .fetch_optional(&self.pool)
//!             .await
//!             .map_err(|e| Error::Persistence(e.to_string()))
//!     }
//!     // ... other methods
//! }
//! ```

use std::collections::{BTreeMap, HashSet};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

/// Submitted attributes for one entity, as a JSON object
pub type Attributes = serde_json::Map<String, Value>;

/// Field-level validation error
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    /// Field name
    pub field: String,
    /// Error code (e.g., "REQUIRED", "TOO_LONG")
    pub code: String,
    /// Human-readable error message
    pub message: String,
}

/// Validation errors keyed by field
///
/// Serializes as a map from field name to the list of errors on that field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ValidationErrors {
    errors: BTreeMap<String, Vec<FieldError>>,
}

impl ValidationErrors {
    /// Create an empty error set
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a field-level error
    pub fn add(
        &mut self,
        field: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) {
        let field = field.into();
        let error = FieldError {
            field: field.clone(),
            code: code.into(),
            message: message.into(),
        };

        self.errors.entry(field).or_default().push(error);
    }

    /// Check if there are no errors
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Get the number of field errors
    #[must_use]
    pub fn error_count(&self) -> usize {
        self.errors.values().map(Vec::len).sum()
    }

    /// Errors on one field
    #[must_use]
    pub fn on(&self, field: &str) -> &[FieldError] {
        self.errors.get(field).map_or(&[], Vec::as_slice)
    }

    /// Names of the fields that have errors, sorted
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.errors.keys().map(String::as_str)
    }
}

/// Storage operations the action pipeline relies on
///
/// Returning `Ok(false)` from [`save`](Self::save) or
/// [`update_attributes`](Self::update_attributes) is a validation failure: the
/// pipeline then asks [`validation_errors`](Self::validation_errors) for the
/// details and takes the failure branch. An `Err` aborts the action.
pub trait Persistence: Send + Sync + 'static {
    /// The entity type this store manages
    type Entity: Serialize + Send + Sync + 'static;

    /// Build a new, unsaved entity, optionally from submitted attributes
    ///
    /// # Errors
    ///
    /// Returns an error if the attributes cannot be applied.
    fn construct(&self, attrs: Option<&Attributes>) -> Result<Self::Entity>;

    /// Find an entity by its identifier
    ///
    /// Returns `Ok(None)` if no entity matches.
    fn find_by_id(&self, id: &str)
        -> impl Future<Output = Result<Option<Self::Entity>>> + Send;

    /// Load the whole collection
    fn list_all(&self) -> impl Future<Output = Result<Vec<Self::Entity>>> + Send;

    /// Validate and store an entity
    ///
    /// Returns `false` if validation failed.
    fn save(&self, entity: &mut Self::Entity) -> impl Future<Output = Result<bool>> + Send;

    /// Apply attributes to an entity, then validate and store it
    ///
    /// The attributes stay applied when validation fails, so a re-rendered
    /// form shows what was submitted.
    fn update_attributes(
        &self,
        entity: &mut Self::Entity,
        attrs: &Attributes,
    ) -> impl Future<Output = Result<bool>> + Send;

    /// Remove an entity
    fn delete(&self, entity: &mut Self::Entity) -> impl Future<Output = Result<()>> + Send;

    /// Whether the entity has been removed
    fn is_deleted(&self, entity: &Self::Entity) -> bool;

    /// Validation errors for the entity's current state
    fn validation_errors(&self, entity: &Self::Entity) -> ValidationErrors;

    /// Identifier used in redirect locations, `None` for unsaved entities
    fn identify(&self, entity: &Self::Entity) -> Option<String>;
}

/// Entity that can live in a [`MemoryStore`]
pub trait Record: Clone + Default + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Assigned identifier, `None` until first saved
    fn id(&self) -> Option<u64>;

    /// Assign the identifier
    fn set_id(&mut self, id: u64);
}

/// Validation rule applied by a [`MemoryStore`] before every write
pub type Validator<E> = Arc<dyn Fn(&E) -> ValidationErrors + Send + Sync>;

/// Internal state protected by a `std::sync::Mutex`
///
/// The mutex is never held across `.await` points.
struct StoreState<E> {
    entries: BTreeMap<u64, E>,
    deleted: HashSet<u64>,
    next_id: u64,
}

/// In-memory [`Persistence`] implementation
///
/// Assigns sequential ids, keeps entries ordered by id, and remembers which
/// ids were deleted. Useful for tests and prototypes.
pub struct MemoryStore<E> {
    state: Mutex<StoreState<E>>,
    validator: Option<Validator<E>>,
}

impl<E: Record> MemoryStore<E> {
    /// Create an empty store that accepts every entity
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(StoreState {
                entries: BTreeMap::new(),
                deleted: HashSet::new(),
                next_id: 1,
            }),
            validator: None,
        }
    }

    /// Validate entities with `validator` before saving them
    #[must_use]
    pub fn with_validator<F>(mut self, validator: F) -> Self
    where
        F: Fn(&E) -> ValidationErrors + Send + Sync + 'static,
    {
        self.validator = Some(Arc::new(validator));
        self
    }

    /// Store an entity without validating it, returning it with its id
    ///
    /// # Errors
    ///
    /// Returns an error if the store's lock is poisoned.
    pub fn insert(&self, mut entity: E) -> Result<E> {
        let mut state = self.lock()?;
        Self::store(&mut state, &mut entity);
        Ok(entity)
    }

    /// Number of stored entities
    ///
    /// # Errors
    ///
    /// Returns an error if the store's lock is poisoned.
    pub fn len(&self) -> Result<usize> {
        Ok(self.lock()?.entries.len())
    }

    /// Check if nothing is stored
    ///
    /// # Errors
    ///
    /// Returns an error if the store's lock is poisoned.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.lock()?.entries.is_empty())
    }

    fn lock(&self) -> Result<MutexGuard<'_, StoreState<E>>> {
        self.state
            .lock()
            .map_err(|e| Error::Persistence(format!("Memory store lock poisoned: {e}")))
    }

    fn store(state: &mut StoreState<E>, entity: &mut E) {
        let id = match entity.id() {
            Some(id) => id,
            None => {
                let id = state.next_id;
                state.next_id += 1;
                entity.set_id(id);
                id
            }
        };
        state.next_id = state.next_id.max(id + 1);
        state.deleted.remove(&id);
        state.entries.insert(id, entity.clone());
    }

    fn check(&self, entity: &E) -> ValidationErrors {
        self.validator
            .as_ref()
            .map(|validate| validate(entity))
            .unwrap_or_default()
    }
}

impl<E: Record> Default for MemoryStore<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> std::fmt::Debug for MemoryStore<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("has_validator", &self.validator.is_some())
            .finish_non_exhaustive()
    }
}

/// Overlay `attrs` on the serialized form of `base`
fn merge<E: Serialize + DeserializeOwned>(base: &E, attrs: &Attributes) -> Result<E> {
    let mut value = serde_json::to_value(base)?;
    if let Value::Object(object) = &mut value {
        for (key, attr) in attrs {
            object.insert(key.clone(), attr.clone());
        }
    }
    Ok(serde_json::from_value(value)?)
}

impl<E: Record> Persistence for MemoryStore<E> {
    type Entity = E;

    fn construct(&self, attrs: Option<&Attributes>) -> Result<E> {
        let Some(attrs) = attrs else {
            return Ok(E::default());
        };
        // Submitted attributes never choose the id
        let mut attrs = attrs.clone();
        attrs.remove("id");
        merge(&E::default(), &attrs)
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<E>> {
        let Ok(id) = id.parse::<u64>() else {
            return Ok(None);
        };
        Ok(self.lock()?.entries.get(&id).cloned())
    }

    async fn list_all(&self) -> Result<Vec<E>> {
        Ok(self.lock()?.entries.values().cloned().collect())
    }

    async fn save(&self, entity: &mut E) -> Result<bool> {
        if !self.check(entity).is_empty() {
            return Ok(false);
        }
        let mut state = self.lock()?;
        Self::store(&mut state, entity);
        Ok(true)
    }

    async fn update_attributes(&self, entity: &mut E, attrs: &Attributes) -> Result<bool> {
        let id = entity.id();
        let mut updated = merge(entity, attrs)?;
        if let Some(id) = id {
            updated.set_id(id);
        }
        *entity = updated;
        self.save(entity).await
    }

    async fn delete(&self, entity: &mut E) -> Result<()> {
        let Some(id) = entity.id() else {
            return Ok(());
        };
        let mut state = self.lock()?;
        state.entries.remove(&id);
        state.deleted.insert(id);
        Ok(())
    }

    fn is_deleted(&self, entity: &E) -> bool {
        match (entity.id(), self.lock()) {
            (Some(id), Ok(state)) => state.deleted.contains(&id),
            _ => false,
        }
    }

    fn validation_errors(&self, entity: &E) -> ValidationErrors {
        self.check(entity)
    }

    fn identify(&self, entity: &E) -> Option<String> {
        entity.id().map(|id| id.to_string())
    }
}
