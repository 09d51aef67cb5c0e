//! The resourceful action pipeline
//!
//! Every action runs the same phases, strictly in order:
//!
//! 1. `before_<action>` hook
//! 2. entity resolution, only if the item (or list, for `index`) is still unset
//! 3. authorization, exactly once
//! 4. default variable binding (`widget`, `widgets`)
//! 5. persistence, for `create`, `update` and `destroy` unless a skip flag is set
//! 6. `respond_to_<action>` hook
//! 7. default response dispatch, only if no response was emitted yet
//! 8. `after_<action>` hook, always
//!
//! Lookup failures, persistence errors and hook errors abort the invocation.
//! A validation failure does not: it sets `success = false` and selects the
//! failure branch of the response table.
//!
//! ## Example
//!
//! ```rust,ignore
//! async fn show_widget(
//!     State(widgets): State<Arc<Resource<MemoryStore<Widget>>>>,
//!     Path(id): Path<String>,
//!     parts: Parts,
//! ) -> Result<Response> {
//!     let request = RequestContext::from_parts(&parts).with_id(id);
//!     Ok(widgets.show(request).await?.into_response())
//! }
//! ```

use axum::http::StatusCode;
use serde_json::json;
use tracing::Instrument;

use crate::callbacks::{Action, Phase};
use crate::context::{ExecutionContext, RequestContext};
use crate::error::{Error, Result};
use crate::format::{Branch, Payload, Responder};
use crate::persistence::Persistence;
use crate::resource::Resource;

/// XML root element for validation error payloads
const ERRORS_ROOT: &str = "errors";

/// XML root element for message payloads
const MESSAGE_ROOT: &str = "response";

impl<P: Persistence> Resource<P> {
    /// Form for a new item (`new`)
    ///
    /// # Errors
    ///
    /// Propagates hook, authorization and rendering errors.
    pub async fn new_form(&self, request: RequestContext) -> Result<ExecutionContext<P::Entity>> {
        self.run(Action::New, request).await
    }

    /// Form for an existing item (`edit`)
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the item does not exist.
    pub async fn edit(&self, request: RequestContext) -> Result<ExecutionContext<P::Entity>> {
        self.run(Action::Edit, request).await
    }

    /// List every item (`index`)
    ///
    /// # Errors
    ///
    /// Propagates persistence, hook, authorization and rendering errors.
    pub async fn index(&self, request: RequestContext) -> Result<ExecutionContext<P::Entity>> {
        self.run(Action::Index, request).await
    }

    /// Show one item (`show`)
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the item does not exist.
    pub async fn show(&self, request: RequestContext) -> Result<ExecutionContext<P::Entity>> {
        self.run(Action::Show, request).await
    }

    /// Persist a new item (`create`)
    ///
    /// # Errors
    ///
    /// Propagates persistence, hook, authorization and rendering errors.
    /// Validation failures are not errors.
    pub async fn create(&self, request: RequestContext) -> Result<ExecutionContext<P::Entity>> {
        self.run(Action::Create, request).await
    }

    /// Update an existing item (`update`)
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the item does not exist. Validation
    /// failures are not errors.
    pub async fn update(&self, request: RequestContext) -> Result<ExecutionContext<P::Entity>> {
        self.run(Action::Update, request).await
    }

    /// Delete an existing item (`destroy`)
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the item does not exist.
    pub async fn destroy(&self, request: RequestContext) -> Result<ExecutionContext<P::Entity>> {
        self.run(Action::Destroy, request).await
    }

    /// Run any action through the pipeline
    ///
    /// Returns the finished execution context; convert it into a response with
    /// [`IntoResponse`](axum::response::IntoResponse).
    ///
    /// # Errors
    ///
    /// Returns the first fatal error raised by any phase.
    pub async fn run(
        &self,
        action: Action,
        request: RequestContext,
    ) -> Result<ExecutionContext<P::Entity>> {
        let span = tracing::debug_span!(
            "resourceful.action",
            action = %action,
            entity_type = %self.entity_type(),
            format = %request.format(),
        );
        self.execute(action, request).instrument(span).await
    }

    async fn execute(
        &self,
        action: Action,
        request: RequestContext,
    ) -> Result<ExecutionContext<P::Entity>> {
        let mut ctx = ExecutionContext::new(action, request);

        self.callbacks().invoke(&mut ctx, action, Phase::Before)?;
        self.resolve(&mut ctx).await?;
        self.authorizer().authorize(action, &mut ctx)?;
        ctx.bind_defaults(self.names());

        if action.is_mutating() {
            self.persist(&mut ctx).await?;
        }

        self.callbacks().invoke(&mut ctx, action, Phase::Respond)?;

        if ctx.is_performed() {
            tracing::trace!("Response already emitted, skipping default dispatch");
        } else {
            self.dispatch(&mut ctx)?;
        }

        self.callbacks().invoke(&mut ctx, action, Phase::After)?;
        Ok(ctx)
    }

    /// Load the item or list unless a hook already provided it
    async fn resolve(&self, ctx: &mut ExecutionContext<P::Entity>) -> Result<()> {
        let action = ctx.action();

        if action.is_collection() {
            if ctx.list().is_some() {
                tracing::trace!("List preset, skipping lookup");
                return Ok(());
            }
            let list = self.persistence().list_all().await?;
            tracing::trace!(count = list.len(), "Loaded list");
            ctx.set_list(list);
            return Ok(());
        }

        if ctx.item().is_some() {
            tracing::trace!("Item preset, skipping lookup");
            return Ok(());
        }

        let item = match action {
            Action::New => self.persistence().construct(None)?,
            Action::Create => {
                let attrs = ctx.request().attributes(self.param_key());
                self.persistence().construct(attrs)?
            }
            _ => {
                let id = ctx.request().id().map(str::to_owned);
                self.find(id).await?
            }
        };
        ctx.set_item(item);
        Ok(())
    }

    async fn find(&self, id: Option<String>) -> Result<P::Entity> {
        let entity = self.entity_type().name();
        let Some(id) = id else {
            return Err(Error::not_found(entity, ""));
        };
        match self.persistence().find_by_id(&id).await? {
            Some(item) => Ok(item),
            None => {
                tracing::debug!(id = %id, "Item not found");
                Err(Error::not_found(entity, id))
            }
        }
    }

    /// Apply the action's persistence operation and record the outcome
    async fn persist(&self, ctx: &mut ExecutionContext<P::Entity>) -> Result<()> {
        let action = ctx.action();
        let skipped = match action {
            Action::Create => ctx.skip.create,
            Action::Update => ctx.skip.update,
            Action::Destroy => ctx.skip.destroy,
            _ => return Ok(()),
        };
        if skipped {
            tracing::debug!("Persistence skipped by hook");
            ctx.set_success(true);
            return Ok(());
        }

        let attrs = ctx
            .request()
            .attributes(self.param_key())
            .cloned()
            .unwrap_or_default();
        let id = ctx.request().id().map(str::to_owned);
        let Some(item) = ctx.item_mut() else {
            return Err(Error::not_found(
                self.entity_type().name(),
                id.unwrap_or_default(),
            ));
        };

        let persistence = self.persistence();
        let success = match action {
            Action::Create => persistence.save(item).await?,
            Action::Update => persistence.update_attributes(item, &attrs).await?,
            _ => {
                persistence.delete(item).await?;
                true
            }
        };
        let errors = (!success).then(|| persistence.validation_errors(item));

        tracing::debug!(success, "Persistence finished");
        ctx.set_success(success);
        if let Some(errors) = errors {
            ctx.set_validation_errors(errors);
        }
        Ok(())
    }

    /// Write the generated notice and emit the default response
    fn dispatch(&self, ctx: &mut ExecutionContext<P::Entity>) -> Result<()> {
        if let Some(notice) = self.notice(ctx) {
            ctx.flash_mut().notice(notice);
        }
        let responder = self.default_responder(ctx)?;
        ctx.respond_to(responder, self.views())
    }

    fn notice(&self, ctx: &ExecutionContext<P::Entity>) -> Option<String> {
        let succeeded = ctx.success() == Some(true);
        let verb = match ctx.action() {
            Action::Create if succeeded => "created",
            Action::Update if succeeded => "updated",
            Action::Destroy if ctx.item().is_some_and(|item| self.persistence().is_deleted(item)) => {
                "destroyed"
            }
            _ => return None,
        };
        let literal = format!(
            "{} was successfully {verb}",
            self.entity_type().simple_name()
        );
        Some(self.messages().translate(&literal))
    }

    /// The default response table
    fn default_responder(&self, ctx: &ExecutionContext<P::Entity>) -> Result<Responder> {
        let item_root = self.item_binding_name();
        let not_supported = Payload::new(
            MESSAGE_ROOT,
            json!({ "message": self.messages().format_not_supported() }),
        );
        let responder = Responder::new().fallback(Branch::Payload(
            not_supported
                .clone()
                .with_status(StatusCode::NOT_ACCEPTABLE),
        ));

        let item_payload = || -> Result<Payload> {
            Ok(Payload::new(item_root, serde_json::to_value(ctx.item())?))
        };
        let errors_payload = || -> Result<Payload> {
            Ok(Payload::new(ERRORS_ROOT, serde_json::to_value(ctx.validation_errors())?)
                .with_status(StatusCode::UNPROCESSABLE_ENTITY))
        };
        let item_path = || match ctx.item() {
            Some(item) => self.item_path(item),
            None => self.collection_path(),
        };
        let succeeded = ctx.success() == Some(true);

        let responder = match ctx.action() {
            action @ (Action::New | Action::Edit) => responder
                .html(Branch::render(action.as_str()))
                .json_and_xml(Branch::Payload(not_supported)),
            Action::Index => responder.html(Branch::render("index")).json_and_xml(
                Branch::Payload(Payload::new(
                    self.list_binding_name(),
                    serde_json::to_value(ctx.list())?,
                )),
            ),
            Action::Show => responder
                .html(Branch::render("show"))
                .json_and_xml(Branch::Payload(item_payload()?)),
            Action::Create if succeeded => {
                let location = item_path();
                responder
                    .html(Branch::redirect(location.clone()))
                    .json_and_xml(Branch::Payload(
                        item_payload()?
                            .with_status(StatusCode::CREATED)
                            .with_location(location),
                    ))
            }
            Action::Update if succeeded => responder
                .html(Branch::redirect(item_path()))
                .json_and_xml(Branch::Payload(item_payload()?)),
            Action::Create => responder
                .html(Branch::render_with_status(
                    "new",
                    StatusCode::UNPROCESSABLE_ENTITY,
                ))
                .json_and_xml(Branch::Payload(errors_payload()?)),
            Action::Update => responder
                .html(Branch::render_with_status(
                    "edit",
                    StatusCode::UNPROCESSABLE_ENTITY,
                ))
                .json_and_xml(Branch::Payload(errors_payload()?)),
            Action::Destroy => responder
                .html(Branch::redirect(self.root_url()))
                .json_and_xml(Branch::Payload(item_payload()?)),
        };
        Ok(responder)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use axum::http::{header, StatusCode};
    use axum::response::{IntoResponse, Response};
    use serde::{Deserialize, Serialize};
    use serde_json::{json, Value};

    use super::*;
    use crate::config::Config;
    use crate::context::{Bound, Subject};
    use crate::format::Format;
    use crate::naming::{EntityRegistry, EntityType};
    use crate::persistence::{MemoryStore, Record, ValidationErrors};
    use crate::resource::ResourceBuilder;
    use crate::views::{ViewContext, Views};

    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    struct Widget {
        #[serde(default)]
        id: Option<u64>,
        #[serde(default)]
        name: String,
    }

    impl Record for Widget {
        fn id(&self) -> Option<u64> {
            self.id
        }

        fn set_id(&mut self, id: u64) {
            self.id = Some(id);
        }
    }

    /// Renders `view|bound names|subject`
    struct TestViews;

    impl Views<Widget> for TestViews {
        fn render(&self, view: &str, ctx: &ViewContext<'_, Widget>) -> Result<String> {
            let subject = match (ctx.bindings.item("widget"), ctx.bindings.list("widgets")) {
                (Some(widget), _) => widget.name.clone(),
                (None, Some(widgets)) => widgets.len().to_string(),
                (None, None) => String::new(),
            };
            Ok(format!("{view}|{}|{subject}", ctx.bindings.names().join(",")))
        }
    }

    type Store = MemoryStore<Widget>;

    fn store() -> Store {
        MemoryStore::new().with_validator(|widget: &Widget| {
            let mut errors = ValidationErrors::new();
            if widget.name.is_empty() {
                errors.add("name", "REQUIRED", "Name can't be blank");
            }
            errors
        })
    }

    fn builder() -> ResourceBuilder<Store> {
        Resource::builder("WidgetsController", store())
            .with_registry(EntityRegistry::new().register_type::<Widget>())
            .with_views(TestViews)
    }

    fn seed(resource: &Resource<Store>, name: &str) -> Widget {
        resource
            .persistence()
            .insert(Widget {
                id: None,
                name: name.to_string(),
            })
            .unwrap()
    }

    fn html() -> RequestContext {
        RequestContext::new()
    }

    fn json_request() -> RequestContext {
        RequestContext::new().with_format(Format::Json)
    }

    fn widget_params(name: &str) -> Value {
        json!({ "widget": { "name": name } })
    }

    async fn body_text(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    async fn body_json(response: Response) -> Value {
        serde_json::from_str(&body_text(response).await).unwrap()
    }

    #[tokio::test]
    async fn test_show_renders_view_with_binding() {
        let resource = builder().build().unwrap();
        seed(&resource, "Sprocket");

        let ctx = resource.show(html().with_id("1")).await.unwrap();
        assert!(ctx.is_performed());
        assert!(ctx.is_responded());
        assert_eq!(ctx.success(), None);

        let response = ctx.into_response();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "show|widget|Sprocket");
    }

    #[tokio::test]
    async fn test_show_serializes_item_for_json() {
        let resource = builder().build().unwrap();
        seed(&resource, "Sprocket");

        let response = resource
            .show(json_request().with_id("1"))
            .await
            .unwrap()
            .into_response();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, json!({"id": 1, "name": "Sprocket"}));
    }

    #[tokio::test]
    async fn test_show_serializes_item_for_xml() {
        let resource = builder().build().unwrap();
        seed(&resource, "Sprocket");

        let response = resource
            .show(html().with_format(Format::Xml).with_id("1"))
            .await
            .unwrap()
            .into_response();
        assert!(body_text(response).await.ends_with(
            "<widget><id type=\"integer\">1</id><name>Sprocket</name></widget>"
        ));
    }

    #[tokio::test]
    async fn test_missing_item_is_not_found() {
        let resource = builder().build().unwrap();

        for action in [Action::Edit, Action::Show, Action::Update, Action::Destroy] {
            let err = resource.run(action, html().with_id("404")).await.unwrap_err();
            assert!(matches!(err, Error::NotFound { ref id, .. } if id == "404"));

            let err = resource.run(action, html()).await.unwrap_err();
            assert!(matches!(err, Error::NotFound { ref entity, .. } if entity == "Widget"));
        }
    }

    #[tokio::test]
    async fn test_index_binds_list() {
        let resource = builder().build().unwrap();
        seed(&resource, "a");
        seed(&resource, "b");

        let ctx = resource.index(html()).await.unwrap();
        assert_eq!(ctx.bindings().list("widgets").map(<[Widget]>::len), Some(2));
        assert!(!ctx.is_bound("widget"));
        assert_eq!(body_text(ctx.into_response()).await, "index|widgets|2");

        let response = resource.index(json_request()).await.unwrap().into_response();
        assert_eq!(
            body_json(response).await,
            json!([{"id": 1, "name": "a"}, {"id": 2, "name": "b"}])
        );
    }

    #[tokio::test]
    async fn test_new_renders_form() {
        let resource = builder().build().unwrap();

        let ctx = resource.new_form(html()).await.unwrap();
        assert_eq!(ctx.item(), Some(&Widget::default()));
        assert_eq!(body_text(ctx.into_response()).await, "new|widget|");
    }

    #[tokio::test]
    async fn test_forms_answer_json_with_message() {
        let resource = builder().build().unwrap();
        seed(&resource, "Sprocket");

        let response = resource.new_form(json_request()).await.unwrap().into_response();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            body_json(response).await,
            json!({"message": "This format is not supported."})
        );

        let response = resource
            .edit(html().with_format(Format::Xml).with_id("1"))
            .await
            .unwrap()
            .into_response();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_text(response)
            .await
            .ends_with("<response><message>This format is not supported.</message></response>"));
    }

    #[tokio::test]
    async fn test_unknown_format_is_not_acceptable() {
        let resource = builder().build().unwrap();
        seed(&resource, "Sprocket");

        let request = html()
            .with_format(Format::Other("text/csv".to_string()))
            .with_id("1");
        let response = resource.show(request).await.unwrap().into_response();
        assert_eq!(response.status(), StatusCode::NOT_ACCEPTABLE);
    }

    #[tokio::test]
    async fn test_create_redirects_with_notice() {
        let resource = builder().build().unwrap();

        let ctx = resource
            .create(html().with_params(widget_params("Sprocket")))
            .await
            .unwrap();
        assert_eq!(ctx.success(), Some(true));
        assert_eq!(ctx.flash().notice_text(), Some("Widget was successfully created"));
        assert_eq!(ctx.item().and_then(|w| w.id), Some(1));

        let response = ctx.into_response();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers()[header::LOCATION], "/widgets/1");
        assert_eq!(resource.persistence().len().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_create_json_returns_created() {
        let resource = builder().build().unwrap();

        let response = resource
            .create(json_request().with_params(widget_params("Sprocket")))
            .await
            .unwrap()
            .into_response();
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(response.headers()[header::LOCATION], "/widgets/1");
        assert_eq!(body_json(response).await, json!({"id": 1, "name": "Sprocket"}));
    }

    #[tokio::test]
    async fn test_invalid_create_returns_errors_without_notice() {
        let resource = builder().build().unwrap();

        let ctx = resource
            .create(json_request().with_params(widget_params("")))
            .await
            .unwrap();
        assert_eq!(ctx.success(), Some(false));
        assert!(ctx.flash().is_empty());
        assert_eq!(
            ctx.validation_errors().map(ValidationErrors::error_count),
            Some(1)
        );

        let response = ctx.into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(
            body_json(response).await,
            json!({"name": [{"field": "name", "code": "REQUIRED", "message": "Name can't be blank"}]})
        );
        assert!(resource.persistence().is_empty().unwrap());
    }

    #[tokio::test]
    async fn test_invalid_create_rerenders_form() {
        let resource = builder().build().unwrap();

        let response = resource
            .create(html().with_params(widget_params("")))
            .await
            .unwrap()
            .into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body_text(response).await, "new|widget|");
    }

    #[tokio::test]
    async fn test_update_binding_reflects_saved_state() {
        let resource = builder().build().unwrap();
        seed(&resource, "Sprocket");

        let ctx = resource
            .update(html().with_id("1").with_params(widget_params("Gear")))
            .await
            .unwrap();
        assert_eq!(ctx.success(), Some(true));
        assert_eq!(ctx.bindings().item("widget").map(|w| w.name.as_str()), Some("Gear"));
        assert_eq!(ctx.flash().notice_text(), Some("Widget was successfully updated"));

        let response = ctx.into_response();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers()[header::LOCATION], "/widgets/1");
    }

    #[tokio::test]
    async fn test_invalid_update_keeps_stored_item() {
        let resource = builder().build().unwrap();
        seed(&resource, "Sprocket");

        let ctx = resource
            .update(html().with_id("1").with_params(widget_params("")))
            .await
            .unwrap();
        assert_eq!(ctx.success(), Some(false));
        assert!(ctx.flash().is_empty());
        assert_eq!(
            ctx.into_response().status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );

        let stored = resource.persistence().find_by_id("1").await.unwrap();
        assert_eq!(stored.map(|w| w.name), Some("Sprocket".to_string()));
    }

    #[tokio::test]
    async fn test_update_json_serializes_item() {
        let resource = builder().build().unwrap();
        seed(&resource, "Sprocket");

        let response = resource
            .update(json_request().with_id("1").with_params(widget_params("Gear")))
            .await
            .unwrap()
            .into_response();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().get(header::LOCATION).is_none());
        assert_eq!(body_json(response).await, json!({"id": 1, "name": "Gear"}));
    }

    #[tokio::test]
    async fn test_invalid_update_returns_errors() {
        let resource = builder().build().unwrap();
        seed(&resource, "Sprocket");

        let response = resource
            .update(json_request().with_id("1").with_params(widget_params("")))
            .await
            .unwrap()
            .into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(
            body_json(response).await,
            json!({"name": [{"field": "name", "code": "REQUIRED", "message": "Name can't be blank"}]})
        );

        let request = html()
            .with_format(Format::Xml)
            .with_id("1")
            .with_params(widget_params(""));
        let response = resource.update(request).await.unwrap().into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body = body_text(response).await;
        assert!(body.contains("<errors>"), "{body}");
        assert!(body.ends_with("</errors>"), "{body}");
        assert!(body.contains("<code>REQUIRED</code>"), "{body}");
    }

    #[tokio::test]
    async fn test_destroy_redirects_to_root() {
        let resource = builder().with_root_url("/dashboard").build().unwrap();
        seed(&resource, "Sprocket");

        let ctx = resource.destroy(html().with_id("1")).await.unwrap();
        assert_eq!(ctx.success(), Some(true));
        assert_eq!(ctx.flash().notice_text(), Some("Widget was successfully destroyed"));

        let response = ctx.into_response();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers()[header::LOCATION], "/dashboard");
        assert!(resource.persistence().is_empty().unwrap());
    }

    #[tokio::test]
    async fn test_destroy_serializes_item() {
        let resource = builder().build().unwrap();
        seed(&resource, "Sprocket");
        seed(&resource, "Gear");

        let response = resource
            .destroy(json_request().with_id("1"))
            .await
            .unwrap()
            .into_response();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, json!({"id": 1, "name": "Sprocket"}));

        let response = resource
            .destroy(html().with_format(Format::Xml).with_id("2"))
            .await
            .unwrap()
            .into_response();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_text(response)
            .await
            .ends_with("<widget><id type=\"integer\">2</id><name>Gear</name></widget>"));
        assert!(resource.persistence().is_empty().unwrap());
    }

    #[tokio::test]
    async fn test_skipped_destroy_writes_no_notice() {
        let resource = builder()
            .before(Action::Destroy, |ctx| {
                ctx.skip.destroy = true;
                Ok(())
            })
            .build()
            .unwrap();
        seed(&resource, "Sprocket");

        let ctx = resource.destroy(html().with_id("1")).await.unwrap();
        assert_eq!(ctx.success(), Some(true));
        assert!(ctx.flash().is_empty());
        assert_eq!(resource.persistence().len().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_skipped_create_counts_as_success() {
        let resource = builder()
            .before(Action::Create, |ctx| {
                ctx.skip.create = true;
                Ok(())
            })
            .build()
            .unwrap();

        let ctx = resource
            .create(html().with_params(widget_params("")))
            .await
            .unwrap();
        assert_eq!(ctx.success(), Some(true));
        assert_eq!(ctx.flash().notice_text(), Some("Widget was successfully created"));
        assert!(resource.persistence().is_empty().unwrap());
    }

    #[tokio::test]
    async fn test_phase_order_for_every_action() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut builder = builder();
        for action in Action::ALL {
            for phase in [Phase::Before, Phase::Respond, Phase::After] {
                let log = Arc::clone(&log);
                builder = builder.on(action, phase, move |_| {
                    log.lock().unwrap().push(phase.hook_name(action));
                    Ok(())
                });
            }
        }
        let authorize_log = Arc::clone(&log);
        let resource = builder
            .authorize_with(
                "recording",
                move |action: Action, _: &mut ExecutionContext<Widget>| {
                    authorize_log.lock().unwrap().push(format!("authorize_{action}"));
                    Ok::<_, Error>(())
                },
            )
            .build()
            .unwrap();
        seed(&resource, "Sprocket");

        for action in Action::ALL {
            log.lock().unwrap().clear();
            let request = html().with_id("1").with_params(widget_params("Gear"));
            let ctx = resource.run(action, request).await.unwrap();
            assert!(ctx.is_performed(), "{action} emitted no response");

            assert_eq!(
                *log.lock().unwrap(),
                vec![
                    format!("before_{action}"),
                    format!("authorize_{action}"),
                    format!("respond_to_{action}"),
                    format!("after_{action}"),
                ]
            );
        }
    }

    #[tokio::test]
    async fn test_before_hook_preempts_lookup() {
        let resource = builder()
            .before(Action::Show, |ctx| {
                ctx.set_item(Widget {
                    id: Some(42),
                    name: "Injected".to_string(),
                });
                Ok(())
            })
            .before(Action::Index, |ctx| {
                ctx.set_list(Vec::new());
                Ok(())
            })
            .build()
            .unwrap();
        seed(&resource, "Stored");

        // No id: the lookup would have failed had it run
        let ctx = resource.show(html()).await.unwrap();
        assert_eq!(ctx.item().and_then(|w| w.id), Some(42));
        assert_eq!(
            ctx.bindings().item("widget").map(|w| w.name.as_str()),
            Some("Injected")
        );

        let ctx = resource.index(html()).await.unwrap();
        assert_eq!(ctx.bindings().list("widgets").map(<[Widget]>::len), Some(0));
    }

    #[tokio::test]
    async fn test_explicit_binding_survives_default_binding() {
        let resource = builder()
            .before(Action::Show, |ctx| {
                ctx.bind(
                    "widget",
                    Bound::Item(Widget {
                        id: None,
                        name: "Featured".to_string(),
                    }),
                );
                Ok(())
            })
            .build()
            .unwrap();
        seed(&resource, "Stored");

        let ctx = resource.show(html().with_id("1")).await.unwrap();
        assert_eq!(ctx.item().map(|w| w.name.as_str()), Some("Stored"));
        assert_eq!(body_text(ctx.into_response()).await, "show|widget|Featured");
    }

    #[tokio::test]
    async fn test_respond_hook_skips_default_dispatch() {
        let after_calls = Arc::new(AtomicUsize::new(0));
        let after = Arc::clone(&after_calls);
        let resource = builder()
            .respond_to(Action::Create, |ctx| ctx.redirect("/thanks"))
            .after(Action::Create, move |ctx| {
                assert!(ctx.is_performed());
                after.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .build()
            .unwrap();

        let ctx = resource
            .create(html().with_params(widget_params("Sprocket")))
            .await
            .unwrap();
        assert_eq!(ctx.success(), Some(true));
        assert!(!ctx.is_responded());
        assert!(ctx.flash().is_empty());
        assert_eq!(after_calls.load(Ordering::SeqCst), 1);

        let response = ctx.into_response();
        assert_eq!(response.headers()[header::LOCATION], "/thanks");
    }

    #[tokio::test]
    async fn test_authorizer_sees_subject_once() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&calls);
        let resource = builder()
            .authorize_with(
                "recording",
                move |action: Action, ctx: &mut ExecutionContext<Widget>| {
                    let subject = match ctx.subject() {
                        Subject::Item(widget) => widget.name.clone(),
                        Subject::List(widgets) => format!("{} widgets", widgets.len()),
                        Subject::None => "nothing".to_string(),
                    };
                    seen.lock().unwrap().push(format!("{action}:{subject}"));
                    Ok::<_, Error>(())
                },
            )
            .build()
            .unwrap();
        seed(&resource, "Sprocket");

        resource.index(html()).await.unwrap();
        resource.show(html().with_id("1")).await.unwrap();
        resource
            .create(html().with_params(widget_params("Gear")))
            .await
            .unwrap();

        assert_eq!(
            *calls.lock().unwrap(),
            vec!["index:1 widgets", "show:Sprocket", "create:Gear"]
        );
    }

    #[tokio::test]
    async fn test_authorizer_error_aborts_before_persistence() {
        let resource = builder()
            .authorize_with(
                "deny_all",
                |action: Action, _: &mut ExecutionContext<Widget>| {
                    Err::<(), _>(Error::Forbidden(format!("{action} denied")))
                },
            )
            .build()
            .unwrap();

        let err = resource
            .create(html().with_params(widget_params("Sprocket")))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Forbidden(ref msg) if msg == "create denied"));
        assert!(resource.persistence().is_empty().unwrap());
    }

    #[tokio::test]
    async fn test_authorizer_response_skips_default_dispatch() {
        let after_calls = Arc::new(AtomicUsize::new(0));
        let after = Arc::clone(&after_calls);
        let resource = builder()
            .authorize_with(
                "login_required",
                |_: Action, ctx: &mut ExecutionContext<Widget>| ctx.redirect("/login"),
            )
            .after(Action::Destroy, move |_| {
                after.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .build()
            .unwrap();
        seed(&resource, "Sprocket");

        let ctx = resource.destroy(html().with_id("1")).await.unwrap();
        assert_eq!(ctx.success(), Some(true));
        assert!(ctx.flash().is_empty());
        assert_eq!(after_calls.load(Ordering::SeqCst), 1);
        assert_eq!(ctx.into_response().headers()[header::LOCATION], "/login");
        assert!(resource.persistence().is_empty().unwrap());
    }

    #[tokio::test]
    async fn test_authorizer_response_still_persists_create() {
        let resource = builder()
            .authorize_with(
                "forbid_html",
                |_: Action, ctx: &mut ExecutionContext<Widget>| ctx.respond(StatusCode::FORBIDDEN),
            )
            .build()
            .unwrap();

        let ctx = resource
            .create(html().with_params(widget_params("Sprocket")))
            .await
            .unwrap();
        assert_eq!(ctx.success(), Some(true));
        assert!(!ctx.is_responded());
        assert!(ctx.flash().is_empty());
        assert_eq!(resource.persistence().len().unwrap(), 1);
        assert_eq!(ctx.into_response().status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_hook_error_propagates() {
        let resource = builder()
            .after(Action::Index, |_| Err(anyhow::anyhow!("audit log unavailable").into()))
            .build()
            .unwrap();

        let err = resource.index(html()).await.unwrap_err();
        assert!(matches!(err, Error::Hook(_)));
        assert!(err.to_string().contains("audit log unavailable"));
    }

    #[tokio::test]
    async fn test_reregistered_hook_replaces_earlier() {
        let resource = builder()
            .before(Action::Show, |ctx| {
                ctx.set_item(Widget {
                    id: None,
                    name: "first".to_string(),
                });
                Ok(())
            })
            .before(Action::Show, |ctx| {
                ctx.set_item(Widget {
                    id: None,
                    name: "second".to_string(),
                });
                Ok(())
            })
            .build()
            .unwrap();

        let ctx = resource.show(html()).await.unwrap();
        assert_eq!(ctx.item().map(|w| w.name.as_str()), Some("second"));
    }

    #[tokio::test]
    async fn test_localized_notice() {
        let mut config = Config::default();
        config.localized_messages = true;
        config.messages.insert(
            "widget_was_successfully_created".to_string(),
            "Widget angelegt".to_string(),
        );
        let resource = builder().with_config(&config).build().unwrap();

        let ctx = resource
            .create(html().with_params(widget_params("Sprocket")))
            .await
            .unwrap();
        assert_eq!(ctx.flash().notice_text(), Some("Widget angelegt"));

        // No translation for the update message: falls back to the literal
        let ctx = resource
            .update(html().with_id("1").with_params(widget_params("Gear")))
            .await
            .unwrap();
        assert_eq!(ctx.flash().notice_text(), Some("Widget was successfully updated"));
    }

    #[tokio::test]
    async fn test_localized_destroy_notice() {
        let mut config = Config::default();
        config.localized_messages = true;
        config.messages.insert(
            "widget_was_successfully_destroyed".to_string(),
            "Widget entfernt".to_string(),
        );
        let resource = builder().with_config(&config).build().unwrap();
        seed(&resource, "Sprocket");

        let ctx = resource.destroy(html().with_id("1")).await.unwrap();
        assert_eq!(ctx.flash().notice_text(), Some("Widget entfernt"));
    }

    #[tokio::test]
    async fn test_namespaced_entity_uses_simple_name_in_notice() {
        let resource = Resource::builder("PartsController", store())
            .with_entity_type(EntityType::new("Admin::Widget"))
            .build()
            .unwrap();

        let request = RequestContext::new()
            .with_format(Format::Json)
            .with_params(json!({"admin_widget": {"name": "Sprocket"}}));
        let ctx = resource.create(request).await.unwrap();
        assert_eq!(ctx.flash().notice_text(), Some("Widget was successfully created"));
        assert_eq!(
            ctx.into_response().headers()[header::LOCATION],
            "/admin_widgets/1"
        );
    }
}
