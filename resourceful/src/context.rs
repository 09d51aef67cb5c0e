//! Request-scoped execution state
//!
//! One [`ExecutionContext`] is created per action invocation and threaded
//! through every phase. Hooks and the authorizer receive it mutably; the
//! caller gets it back when the action completes and turns it into a response.

use std::collections::HashMap;

use axum::response::{IntoResponse, Redirect, Response};
use http::{request::Parts, HeaderMap, StatusCode};
use serde::Serialize;
use serde_json::Value;

use crate::callbacks::Action;
use crate::error::{Error, Result};
use crate::flash::Flash;
use crate::format::Format;
use crate::naming::BindingNames;
use crate::persistence::{Attributes, ValidationErrors};

/// Incoming request data the pipeline needs
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    id: Option<String>,
    params: Attributes,
    format: Format,
    headers: HeaderMap,
}

impl RequestContext {
    /// Create an empty HTML request
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from request headers, negotiating the format from `Accept`
    #[must_use]
    pub fn from_headers(headers: &HeaderMap) -> Self {
        Self {
            format: Format::negotiate(headers, None),
            headers: headers.clone(),
            ..Self::default()
        }
    }

    /// Build from request parts
    ///
    /// A path extension (`/widgets/7.json`) takes precedence over `Accept`.
    #[must_use]
    pub fn from_parts(parts: &Parts) -> Self {
        let extension = path_extension(parts.uri.path());
        Self {
            format: Format::negotiate(&parts.headers, extension),
            headers: parts.headers.clone(),
            ..Self::default()
        }
    }

    /// Set the entity identifier from the route
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Replace all submitted parameters
    ///
    /// A `format` parameter overrides the negotiated format. Non-object values
    /// are ignored.
    #[must_use]
    pub fn with_params(mut self, params: Value) -> Self {
        if let Value::Object(map) = params {
            if let Some(format) = map.get("format").and_then(Value::as_str) {
                self.format = Format::from_extension(format);
            }
            self.params = map;
        }
        self
    }

    /// Set a single parameter
    #[must_use]
    pub fn with_param(mut self, key: impl Into<String>, value: Value) -> Self {
        self.params.insert(key.into(), value);
        self
    }

    /// Override the negotiated format
    #[must_use]
    pub fn with_format(mut self, format: Format) -> Self {
        self.format = format;
        self
    }

    /// Entity identifier, if the route carried one
    #[must_use]
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// All submitted parameters
    #[must_use]
    pub fn params(&self) -> &Attributes {
        &self.params
    }

    /// Submitted attributes nested under `key`
    #[must_use]
    pub fn attributes(&self, key: &str) -> Option<&Attributes> {
        self.params.get(key).and_then(Value::as_object)
    }

    /// Negotiated response format
    #[must_use]
    pub fn format(&self) -> &Format {
        &self.format
    }

    /// Request headers
    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }
}

fn path_extension(path: &str) -> Option<&str> {
    let last = path.rsplit('/').next()?;
    let (stem, ext) = last.rsplit_once('.')?;
    (!stem.is_empty() && !ext.is_empty()).then_some(ext)
}

/// Flags that let a hook suppress the default persistence call
///
/// A skipped call is reported as a success.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SkipPersistence {
    /// Skip `save` in `create`
    pub create: bool,
    /// Skip `update_attributes` in `update`
    pub update: bool,
    /// Skip `delete` in `destroy`
    pub destroy: bool,
}

/// An owned value bound under an explicit name
#[derive(Debug, Clone, PartialEq)]
pub enum Bound<E> {
    /// A single entity
    Item(E),
    /// A collection of entities
    List(Vec<E>),
}

/// A borrowed view of a binding
#[derive(Debug, PartialEq)]
pub enum BoundRef<'a, E> {
    /// A single entity
    Item(&'a E),
    /// A collection of entities
    List(&'a [E]),
}

impl<E> Clone for BoundRef<'_, E> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<E> Copy for BoundRef<'_, E> {}

#[derive(Debug)]
enum Slot<E> {
    Item,
    List,
    Value(Bound<E>),
}

/// The entity or collection an action operates on
#[derive(Debug, PartialEq)]
pub enum Subject<'a, E> {
    /// A single entity
    Item(&'a E),
    /// A collection (`index`)
    List(&'a [E]),
    /// Nothing resolved yet
    None,
}

/// Named bindings visible to views
///
/// Default bindings alias the context's item and list, so they always reflect
/// the state after persistence.
pub struct Bindings<'a, E> {
    slots: &'a HashMap<String, Slot<E>>,
    item: Option<&'a E>,
    list: Option<&'a [E]>,
}

impl<'a, E> Bindings<'a, E> {
    /// Look up a binding by name
    #[must_use]
    pub fn get(&self, name: &str) -> Option<BoundRef<'a, E>> {
        match self.slots.get(name)? {
            Slot::Item => self.item.map(BoundRef::Item),
            Slot::List => self.list.map(BoundRef::List),
            Slot::Value(Bound::Item(item)) => Some(BoundRef::Item(item)),
            Slot::Value(Bound::List(list)) => Some(BoundRef::List(list)),
        }
    }

    /// Look up a single-item binding
    #[must_use]
    pub fn item(&self, name: &str) -> Option<&'a E> {
        match self.get(name)? {
            BoundRef::Item(item) => Some(item),
            BoundRef::List(_) => None,
        }
    }

    /// Look up a collection binding
    #[must_use]
    pub fn list(&self, name: &str) -> Option<&'a [E]> {
        match self.get(name)? {
            BoundRef::List(list) => Some(list),
            BoundRef::Item(_) => None,
        }
    }

    /// Bound names, sorted
    #[must_use]
    pub fn names(&self) -> Vec<&'a str> {
        let mut names: Vec<&str> = self.slots.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Serialize every resolvable binding into a JSON object for templates
    ///
    /// # Errors
    ///
    /// Returns an error if an entity fails to serialize.
    pub fn to_json(&self) -> Result<Value>
    where
        E: Serialize,
    {
        let mut object = serde_json::Map::new();
        for name in self.names() {
            let value = match self.get(name) {
                Some(BoundRef::Item(item)) => serde_json::to_value(item)?,
                Some(BoundRef::List(list)) => serde_json::to_value(list)?,
                None => continue,
            };
            object.insert(name.to_string(), value);
        }
        Ok(Value::Object(object))
    }
}

/// Per-invocation pipeline state
pub struct ExecutionContext<E> {
    action: Action,
    request: RequestContext,
    item: Option<E>,
    list: Option<Vec<E>>,
    /// Persistence calls a hook asked to skip
    pub skip: SkipPersistence,
    performed: bool,
    responded: bool,
    success: Option<bool>,
    errors: Option<ValidationErrors>,
    bindings: HashMap<String, Slot<E>>,
    flash: Flash,
    response: Option<Response>,
}

impl<E> ExecutionContext<E> {
    /// Create the context for one invocation
    #[must_use]
    pub fn new(action: Action, request: RequestContext) -> Self {
        Self {
            action,
            request,
            item: None,
            list: None,
            skip: SkipPersistence::default(),
            performed: false,
            responded: false,
            success: None,
            errors: None,
            bindings: HashMap::new(),
            flash: Flash::new(),
            response: None,
        }
    }

    /// The action being executed
    #[must_use]
    pub fn action(&self) -> Action {
        self.action
    }

    /// The incoming request
    #[must_use]
    pub fn request(&self) -> &RequestContext {
        &self.request
    }

    /// The resolved or injected item
    #[must_use]
    pub fn item(&self) -> Option<&E> {
        self.item.as_ref()
    }

    /// Mutable access to the item
    pub fn item_mut(&mut self) -> Option<&mut E> {
        self.item.as_mut()
    }

    /// Set the item; a before hook doing this preempts the default lookup
    pub fn set_item(&mut self, item: E) {
        self.item = Some(item);
    }

    /// Take the item out of the context
    pub fn take_item(&mut self) -> Option<E> {
        self.item.take()
    }

    /// The resolved or injected list
    #[must_use]
    pub fn list(&self) -> Option<&[E]> {
        self.list.as_deref()
    }

    /// Set the list; a before hook doing this preempts the default lookup
    pub fn set_list(&mut self, list: Vec<E>) {
        self.list = Some(list);
    }

    /// Take the list out of the context
    pub fn take_list(&mut self) -> Option<Vec<E>> {
        self.list.take()
    }

    /// What the action operates on: the list for `index`, otherwise the item
    #[must_use]
    pub fn subject(&self) -> Subject<'_, E> {
        let subject = if self.action.is_collection() {
            self.list().map(Subject::List)
        } else {
            self.item().map(Subject::Item)
        };
        subject.unwrap_or(Subject::None)
    }

    /// Bind an explicit value; the default binding step never overwrites it
    pub fn bind(&mut self, name: impl Into<String>, value: Bound<E>) {
        self.bindings.insert(name.into(), Slot::Value(value));
    }

    /// Check whether a name is bound
    #[must_use]
    pub fn is_bound(&self, name: &str) -> bool {
        self.bindings.contains_key(name)
    }

    /// Bind the conventional item and list names where not already bound
    pub(crate) fn bind_defaults(&mut self, names: &BindingNames) {
        if self.item.is_some() && !self.is_bound(&names.item) {
            self.bindings.insert(names.item.clone(), Slot::Item);
        }
        if self.list.is_some() && !self.is_bound(&names.list) {
            self.bindings.insert(names.list.clone(), Slot::List);
        }
    }

    /// Bindings visible to views
    #[must_use]
    pub fn bindings(&self) -> Bindings<'_, E> {
        Bindings {
            slots: &self.bindings,
            item: self.item.as_ref(),
            list: self.list.as_deref(),
        }
    }

    /// Persistence outcome, set for mutating actions
    #[must_use]
    pub fn success(&self) -> Option<bool> {
        self.success
    }

    pub(crate) fn set_success(&mut self, success: bool) {
        self.success = Some(success);
    }

    /// Validation errors captured when persistence failed
    #[must_use]
    pub fn validation_errors(&self) -> Option<&ValidationErrors> {
        self.errors.as_ref()
    }

    pub(crate) fn set_validation_errors(&mut self, errors: ValidationErrors) {
        self.errors = Some(errors);
    }

    /// Notice sink
    #[must_use]
    pub fn flash(&self) -> &Flash {
        &self.flash
    }

    /// Mutable notice sink
    pub fn flash_mut(&mut self) -> &mut Flash {
        &mut self.flash
    }

    /// Whether a response has been emitted
    #[must_use]
    pub fn is_performed(&self) -> bool {
        self.performed
    }

    /// Whether format dispatch has run
    #[must_use]
    pub fn is_responded(&self) -> bool {
        self.responded
    }

    pub(crate) fn mark_responded(&mut self) {
        self.responded = true;
    }

    /// Emit a response
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyPerformed`] if a response was already emitted.
    pub fn respond(&mut self, response: impl IntoResponse) -> Result<()> {
        if self.performed {
            return Err(Error::AlreadyPerformed(self.action.to_string()));
        }
        self.performed = true;
        self.response = Some(response.into_response());
        Ok(())
    }

    /// Emit a `303 See Other` redirect
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyPerformed`] if a response was already emitted.
    pub fn redirect(&mut self, location: &str) -> Result<()> {
        self.respond(Redirect::to(location))
    }

    /// Mark the invocation as handled without storing a response
    ///
    /// For hooks that deliver the response through another channel.
    pub fn mark_performed(&mut self) {
        self.performed = true;
    }

    /// The emitted response, if any
    #[must_use]
    pub fn response(&self) -> Option<&Response> {
        self.response.as_ref()
    }

    /// Take the emitted response out of the context
    pub fn take_response(&mut self) -> Option<Response> {
        self.response.take()
    }
}

impl<E> IntoResponse for ExecutionContext<E> {
    fn into_response(self) -> Response {
        self.response
            .unwrap_or_else(|| StatusCode::NO_CONTENT.into_response())
    }
}

impl<E> std::fmt::Debug for ExecutionContext<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("action", &self.action)
            .field("has_item", &self.item.is_some())
            .field("has_list", &self.list.is_some())
            .field("skip", &self.skip)
            .field("performed", &self.performed)
            .field("responded", &self.responded)
            .field("success", &self.success)
            .finish_non_exhaustive()
    }
}
