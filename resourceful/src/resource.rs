//! Handler type configuration
//!
//! A [`Resource`] bundles everything the action pipeline needs for one
//! handler type: the entity type and the names derived from it, the
//! persistence and view collaborators, the authorizer, the hooks, and the
//! message catalog. It is built once at startup and shared by all requests.
//!
//! ## Example
//!
//! ```rust,ignore
//! use resourceful::prelude::*;
//!
//! let config = Config::load()?;
//! let registry = EntityRegistry::new().register_type::<Widget>();
//!
//! let widgets = Resource::builder("WidgetsController", MemoryStore::<Widget>::new())
//!     .with_registry(registry)
//!     .with_config(&config)
//!     .with_views(WidgetViews)
//!     .before(Action::Index, |ctx| {
//!         tracing::info!("Listing widgets");
//!         Ok(())
//!     })
//!     .build()?;
//!
//! let widgets = Arc::new(widgets);
//! ```

use std::fmt;
use std::sync::{Arc, OnceLock};

use crate::authorization::{Authorize, Authorizer};
use crate::callbacks::{Action, CallbackRegistry, Phase};
use crate::config::Config;
use crate::context::ExecutionContext;
use crate::error::Result;
use crate::flash::MessageCatalog;
use crate::naming::{entity_type_for, BindingNames, EntityRegistry, EntityType};
use crate::persistence::Persistence;
use crate::views::{NoViews, Views};

/// Configuration of one resourceful handler type
pub struct Resource<P: Persistence> {
    handler: String,
    entity_type: EntityType,
    names: OnceLock<BindingNames>,
    persistence: P,
    views: Arc<dyn Views<P::Entity>>,
    authorizer: Authorizer<P::Entity>,
    callbacks: CallbackRegistry<P::Entity>,
    messages: MessageCatalog,
    root_url: String,
    collection_path: Option<String>,
}

impl<P: Persistence> Resource<P> {
    /// Start building a resource for the handler named `handler`
    ///
    /// The handler name drives the naming conventions: `WidgetsController`
    /// manages `Widget` unless an entity type is set explicitly.
    pub fn builder(handler: impl Into<String>, persistence: P) -> ResourceBuilder<P> {
        ResourceBuilder::new(handler, persistence)
    }

    /// Name of the handler type
    #[must_use]
    pub fn handler_name(&self) -> &str {
        &self.handler
    }

    /// Entity type this resource manages
    #[must_use]
    pub fn entity_type(&self) -> &EntityType {
        &self.entity_type
    }

    /// Binding and parameter names, derived on first use
    #[must_use]
    pub fn names(&self) -> &BindingNames {
        self.names
            .get_or_init(|| BindingNames::for_entity(&self.entity_type))
    }

    /// Binding name for the single item (`widget`)
    #[must_use]
    pub fn item_binding_name(&self) -> &str {
        &self.names().item
    }

    /// Binding name for the collection (`widgets`)
    #[must_use]
    pub fn list_binding_name(&self) -> &str {
        &self.names().list
    }

    /// Parameter that holds submitted attributes (`widget`)
    #[must_use]
    pub fn param_key(&self) -> &str {
        &self.names().param_key
    }

    /// Symbolic name of the authorizer
    #[must_use]
    pub fn authorize_method(&self) -> &str {
        self.authorizer.name()
    }

    /// Whether generated notices are translated
    #[must_use]
    pub fn localized_messages(&self) -> bool {
        self.messages.is_localized()
    }

    /// Persistence collaborator
    #[must_use]
    pub fn persistence(&self) -> &P {
        &self.persistence
    }

    /// View collaborator
    #[must_use]
    pub fn views(&self) -> &dyn Views<P::Entity> {
        self.views.as_ref()
    }

    /// Authorizer
    #[must_use]
    pub fn authorizer(&self) -> &Authorizer<P::Entity> {
        &self.authorizer
    }

    /// Registered hooks
    #[must_use]
    pub fn callbacks(&self) -> &CallbackRegistry<P::Entity> {
        &self.callbacks
    }

    /// Message catalog
    #[must_use]
    pub fn messages(&self) -> &MessageCatalog {
        &self.messages
    }

    /// Redirect target after `destroy`
    #[must_use]
    pub fn root_url(&self) -> &str {
        &self.root_url
    }

    /// Path of the collection, `/<list binding name>` unless configured
    #[must_use]
    pub fn collection_path(&self) -> String {
        match &self.collection_path {
            Some(path) => path.clone(),
            None => format!("/{}", self.list_binding_name()),
        }
    }

    /// Path of a single entity, or the collection path if it has no id yet
    #[must_use]
    pub fn item_path(&self, entity: &P::Entity) -> String {
        let collection = self.collection_path();
        match self.persistence.identify(entity) {
            Some(id) => format!("{}/{id}", collection.trim_end_matches('/')),
            None => collection,
        }
    }
}

impl<P: Persistence + fmt::Debug> fmt::Debug for Resource<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resource")
            .field("handler", &self.handler)
            .field("entity_type", &self.entity_type)
            .field("persistence", &self.persistence)
            .field("authorizer", &self.authorizer)
            .field("callbacks", &self.callbacks)
            .field("root_url", &self.root_url)
            .finish_non_exhaustive()
    }
}

/// Builder for [`Resource`]
///
/// Defaults:
/// - entity type: derived from the handler name and resolved in the registry
/// - views: [`NoViews`]
/// - authorizer: `abstract_authorize`, which allows everything
/// - messages and root URL: [`Config::default()`]
pub struct ResourceBuilder<P: Persistence> {
    handler: String,
    persistence: P,
    entity_type: Option<EntityType>,
    registry: EntityRegistry,
    views: Option<Arc<dyn Views<P::Entity>>>,
    authorizer: Option<Authorizer<P::Entity>>,
    callbacks: CallbackRegistry<P::Entity>,
    messages: MessageCatalog,
    root_url: String,
    collection_path: Option<String>,
}

impl<P: Persistence> ResourceBuilder<P> {
    /// Create a builder with defaults
    pub fn new(handler: impl Into<String>, persistence: P) -> Self {
        let config = Config::default();
        Self {
            handler: handler.into(),
            persistence,
            entity_type: None,
            registry: EntityRegistry::new(),
            views: None,
            authorizer: None,
            callbacks: CallbackRegistry::new(),
            messages: MessageCatalog::from_config(&config),
            root_url: config.root_url,
            collection_path: None,
        }
    }

    /// Set the entity type explicitly, bypassing the naming convention
    #[must_use]
    pub fn with_entity_type(mut self, entity_type: EntityType) -> Self {
        self.entity_type = Some(entity_type);
        self
    }

    /// Entity types the naming convention resolves against
    #[must_use]
    pub fn with_registry(mut self, registry: EntityRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Apply message and redirect settings from configuration
    #[must_use]
    pub fn with_config(mut self, config: &Config) -> Self {
        self.messages = MessageCatalog::from_config(config);
        self.root_url = config.root_url.clone();
        self
    }

    /// Set the view renderer
    #[must_use]
    pub fn with_views(mut self, views: impl Views<P::Entity> + 'static) -> Self {
        self.views = Some(Arc::new(views));
        self
    }

    /// Set the authorizer and the name it is logged under
    #[must_use]
    pub fn authorize_with(
        mut self,
        name: impl Into<String>,
        authorizer: impl Authorize<P::Entity> + 'static,
    ) -> Self {
        self.authorizer = Some(Authorizer::new(name, authorizer));
        self
    }

    /// Turn notice translation on or off
    #[must_use]
    pub fn with_localized_messages(mut self, localized: bool) -> Self {
        self.messages.set_localized(localized);
        self
    }

    /// Replace the message catalog
    #[must_use]
    pub fn with_messages(mut self, messages: MessageCatalog) -> Self {
        self.messages = messages;
        self
    }

    /// Redirect target after `destroy`
    #[must_use]
    pub fn with_root_url(mut self, root_url: impl Into<String>) -> Self {
        self.root_url = root_url.into();
        self
    }

    /// Collection path used to build item redirect locations
    #[must_use]
    pub fn with_collection_path(mut self, path: impl Into<String>) -> Self {
        self.collection_path = Some(path.into());
        self
    }

    /// Register a hook for any phase, replacing an earlier one
    #[must_use]
    pub fn on<F>(mut self, action: Action, phase: Phase, hook: F) -> Self
    where
        F: Fn(&mut ExecutionContext<P::Entity>) -> Result<()> + Send + Sync + 'static,
    {
        self.callbacks.register(action, phase, hook);
        self
    }

    /// Register a `before_<action>` hook
    #[must_use]
    pub fn before<F>(self, action: Action, hook: F) -> Self
    where
        F: Fn(&mut ExecutionContext<P::Entity>) -> Result<()> + Send + Sync + 'static,
    {
        self.on(action, Phase::Before, hook)
    }

    /// Register a `respond_to_<action>` hook
    #[must_use]
    pub fn respond_to<F>(self, action: Action, hook: F) -> Self
    where
        F: Fn(&mut ExecutionContext<P::Entity>) -> Result<()> + Send + Sync + 'static,
    {
        self.on(action, Phase::Respond, hook)
    }

    /// Register an `after_<action>` hook
    #[must_use]
    pub fn after<F>(self, action: Action, hook: F) -> Self
    where
        F: Fn(&mut ExecutionContext<P::Entity>) -> Result<()> + Send + Sync + 'static,
    {
        self.on(action, Phase::After, hook)
    }

    /// Resolve the entity type and finish the resource
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnresolvedEntityType`](crate::Error::UnresolvedEntityType)
    /// if no entity type was set and the convention-derived name is not registered.
    pub fn build(self) -> Result<Resource<P>> {
        let entity_type =
            entity_type_for(&self.handler, self.entity_type.as_ref(), &self.registry)?;

        let authorizer = self.authorizer.unwrap_or_default();
        tracing::debug!(
            handler = %self.handler,
            entity_type = %entity_type,
            authorizer = %authorizer.name(),
            hooks = self.callbacks.len(),
            "Built resource"
        );

        Ok(Resource {
            handler: self.handler,
            entity_type,
            names: OnceLock::new(),
            persistence: self.persistence,
            views: self.views.unwrap_or_else(|| Arc::new(NoViews)),
            authorizer,
            callbacks: self.callbacks,
            messages: self.messages,
            root_url: self.root_url,
            collection_path: self.collection_path,
        })
    }
}
