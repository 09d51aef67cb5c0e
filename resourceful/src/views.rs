//! View rendering collaborator
//!
//! The pipeline names a view (`index`, `show`, `new`, `edit`) and hands the
//! renderer a [`ViewContext`] with the bound variables, the flash and any
//! validation errors. Template lookup is the host's concern.
//!
//! ```rust,ignore
//! use askama::Template;
//!
//! struct WidgetViews;
//!
//! impl Views<Widget> for WidgetViews {
//!     fn render(&self, view: &str, ctx: &ViewContext<'_, Widget>) -> Result<String> {
//!         match view {
//!             "show" => ShowTemplate { widget: ctx.bindings.item("widget") }
//!                 .render()
//!                 .map_err(|e| Error::Render(e.to_string())),
//!             other => Err(Error::Render(format!("unknown view: {other}"))),
//!         }
//!     }
//! }
//! ```

use crate::callbacks::Action;
use crate::context::{Bindings, ExecutionContext};
use crate::error::{Error, Result};
use crate::flash::Flash;
use crate::persistence::ValidationErrors;

/// Data available to a view while it renders
pub struct ViewContext<'a, E> {
    /// Action being executed
    pub action: Action,
    /// Named bindings (`widget`, `widgets`)
    pub bindings: Bindings<'a, E>,
    /// Notices written during this invocation
    pub flash: &'a Flash,
    /// Validation errors when re-rendering a form
    pub errors: Option<&'a ValidationErrors>,
}

impl<'a, E> ViewContext<'a, E> {
    /// Snapshot the renderable parts of an execution context
    #[must_use]
    pub fn new(ctx: &'a ExecutionContext<E>) -> Self {
        Self {
            action: ctx.action(),
            bindings: ctx.bindings(),
            flash: ctx.flash(),
            errors: ctx.validation_errors(),
        }
    }
}

/// Renders named views to HTML
pub trait Views<E>: Send + Sync {
    /// Render `view` to an HTML string
    ///
    /// # Errors
    ///
    /// Returns [`Error::Render`] if the view is unknown or fails to render.
    fn render(&self, view: &str, ctx: &ViewContext<'_, E>) -> Result<String>;
}

impl<E, F> Views<E> for F
where
    F: Fn(&str, &ViewContext<'_, E>) -> Result<String> + Send + Sync,
{
    fn render(&self, view: &str, ctx: &ViewContext<'_, E>) -> Result<String> {
        self(view, ctx)
    }
}

/// Renderer for resources that only serve structured payloads
#[derive(Debug, Clone, Copy, Default)]
pub struct NoViews;

impl<E> Views<E> for NoViews {
    fn render(&self, view: &str, _ctx: &ViewContext<'_, E>) -> Result<String> {
        Err(Error::Render(format!("no views configured to render '{view}'")))
    }
}
