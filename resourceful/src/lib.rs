//! # resourceful
//!
//! Convention-driven CRUD actions for axum request handlers.
//!
//! A [`Resource`] turns a persistence collaborator and a handful of naming
//! conventions into the seven resourceful actions: `new`, `edit`, `index`,
//! `show`, `create`, `update` and `destroy`. Every action runs the same
//! pipeline of lifecycle hooks, entity resolution, authorization, variable
//! binding, persistence and content-negotiated response dispatch.
//!
//! ## Features
//!
//! - **Naming conventions**: `WidgetsController` manages `Widget`, binds `widget` and `widgets`
//! - **Lifecycle hooks**: before / respond / after, per action
//! - **Content negotiation**: HTML views, JSON and XML payloads
//! - **Exactly-once responses**: hooks can take over the response at any point
//! - **Notices**: generated flash messages, optionally translated
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use axum::{
//!     extract::{Path, State},
//!     http::HeaderMap,
//!     response::{IntoResponse, Response},
//!     routing::get,
//!     Router,
//! };
//! use resourceful::prelude::*;
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Debug, Clone, Default, Serialize, Deserialize)]
//! struct Widget {
//!     #[serde(default)]
//!     id: Option<u64>,
//!     #[serde(default)]
//!     name: String,
//! }
//!
//! impl Record for Widget {
//!     fn id(&self) -> Option<u64> {
//!         self.id
//!     }
//!
//!     fn set_id(&mut self, id: u64) {
//!         self.id = Some(id);
//!     }
//! }
//!
//! type Widgets = Arc<Resource<MemoryStore<Widget>>>;
//!
//! async fn show(
//!     State(widgets): State<Widgets>,
//!     Path(id): Path<String>,
//!     headers: HeaderMap,
//! ) -> Result<Response> {
//!     let request = RequestContext::from_headers(&headers).with_id(id);
//!     Ok(widgets.show(request).await?.into_response())
//! }
//!
//! fn main() -> Result<()> {
//!     let config = Config::load()?;
//!     init_tracing(&config)?;
//!
//!     let widgets = Resource::builder("WidgetsController", MemoryStore::<Widget>::new())
//!         .with_registry(EntityRegistry::new().register_type::<Widget>())
//!         .with_config(&config)
//!         .build()?;
//!
//!     let _app: Router = Router::new()
//!         .route("/widgets/{id}", get(show))
//!         .with_state(Arc::new(widgets));
//!     Ok(())
//! }
//! ```

pub mod authorization;
pub mod callbacks;
pub mod config;
pub mod context;
pub mod error;
pub mod flash;
pub mod format;
pub mod naming;
pub mod observability;
pub mod persistence;
pub mod pipeline;
pub mod resource;
pub mod views;

pub use error::{Error, Result};
pub use resource::{Resource, ResourceBuilder};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::authorization::{AbstractAuthorize, Authorize, Authorizer};
    pub use crate::callbacks::{Action, CallbackRegistry, Phase};
    pub use crate::config::Config;
    pub use crate::context::{
        Bindings, Bound, BoundRef, ExecutionContext, RequestContext, SkipPersistence, Subject,
    };
    pub use crate::error::{Error, Result};
    pub use crate::flash::{Flash, FlashKind, FlashMessage, MessageCatalog};
    pub use crate::format::{Branch, Format, Payload, Responder};
    pub use crate::naming::{BindingNames, EntityRegistry, EntityType};
    pub use crate::observability::init_tracing;
    pub use crate::persistence::{
        Attributes, FieldError, MemoryStore, Persistence, Record, ValidationErrors,
    };
    pub use crate::resource::{Resource, ResourceBuilder};
    pub use crate::views::{NoViews, ViewContext, Views};
}
