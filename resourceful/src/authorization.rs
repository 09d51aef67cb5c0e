//! Authorization hook
//!
//! Every action calls its resource's authorizer exactly once, after the item
//! or list has been resolved. The authorizer sees the action, the subject
//! (`ctx.subject()`) and the request, and denies in one of two ways:
//!
//! - return an error, usually [`Error::Forbidden`](crate::Error::Forbidden),
//!   which aborts the action;
//! - emit a response through the context (for example a redirect to a login
//!   page), after which no mutation is applied and no default response is
//!   produced.
//!
//! ```rust,ignore
//! let resource = Resource::builder("WidgetsController", store)
//!     .authorize_with("authorize_widget", |action, ctx: &mut ExecutionContext<Widget>| {
//!         if action.is_mutating() && !is_admin(ctx.request().headers()) {
//!             return Err(Error::Forbidden("Admins only".to_string()));
//!         }
//!         Ok(())
//!     })
//!     .build()?;
//! ```

use std::fmt;
use std::sync::Arc;

use crate::callbacks::Action;
use crate::context::ExecutionContext;
use crate::error::Result;

/// Name of the default, permissive authorizer
pub const DEFAULT_AUTHORIZER: &str = "abstract_authorize";

/// Decides whether an action may proceed
pub trait Authorize<E>: Send + Sync {
    /// Authorize `action` on the context's subject
    ///
    /// # Errors
    ///
    /// Returns an error to deny the action.
    fn authorize(&self, action: Action, ctx: &mut ExecutionContext<E>) -> Result<()>;
}

impl<E, F> Authorize<E> for F
where
    F: Fn(Action, &mut ExecutionContext<E>) -> Result<()> + Send + Sync,
{
    fn authorize(&self, action: Action, ctx: &mut ExecutionContext<E>) -> Result<()> {
        self(action, ctx)
    }
}

/// Authorizer that allows everything
#[derive(Debug, Clone, Copy, Default)]
pub struct AbstractAuthorize;

impl<E> Authorize<E> for AbstractAuthorize {
    fn authorize(&self, _action: Action, _ctx: &mut ExecutionContext<E>) -> Result<()> {
        Ok(())
    }
}

/// A named authorizer attached to a resource
pub struct Authorizer<E> {
    name: String,
    inner: Arc<dyn Authorize<E>>,
}

impl<E: 'static> Authorizer<E> {
    /// Wrap an authorizer under a symbolic name used in logs
    pub fn new(name: impl Into<String>, inner: impl Authorize<E> + 'static) -> Self {
        Self {
            name: name.into(),
            inner: Arc::new(inner),
        }
    }

    /// Symbolic name of the authorizer
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run the authorizer
    ///
    /// # Errors
    ///
    /// Propagates a denial.
    pub fn authorize(&self, action: Action, ctx: &mut ExecutionContext<E>) -> Result<()> {
        tracing::trace!(authorizer = %self.name, action = %action, "Authorizing");
        let result = self.inner.authorize(action, ctx);
        if let Err(ref e) = result {
            tracing::debug!(authorizer = %self.name, action = %action, error = %e, "Authorization denied");
        } else if ctx.is_performed() {
            tracing::debug!(authorizer = %self.name, action = %action, "Authorizer emitted a response");
        }
        result
    }
}

impl<E: 'static> Default for Authorizer<E> {
    fn default() -> Self {
        Self::new(DEFAULT_AUTHORIZER, AbstractAuthorize)
    }
}

impl<E> Clone for Authorizer<E> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<E> fmt::Debug for Authorizer<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Authorizer").field("name", &self.name).finish()
    }
}
