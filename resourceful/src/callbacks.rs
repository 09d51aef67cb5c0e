//! Lifecycle hooks keyed by action and phase
//!
//! Every resourceful action consults three optional hooks:
//!
//! - **before** runs ahead of any other logic, including authorization. It may
//!   pre-load the item or list, in which case the default lookup is skipped.
//! - **respond** runs after persistence and before the default response. If
//!   it emits a response, the default dispatch is skipped.
//! - **after** runs last, whether or not a response was already emitted.
//!
//! ```rust,ignore
//! let resource = Resource::builder("WidgetsController", store)
//!     .before(Action::Show, |ctx| {
//!         ctx.set_item(Widget::featured());
//!         Ok(())
//!     })
//!     .respond_to(Action::Create, |ctx| {
//!         ctx.redirect("/widgets/thanks")
//!     })
//!     .build()?;
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::context::ExecutionContext;
use crate::error::Result;

/// The seven resourceful actions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    /// Form for a new item
    New,
    /// Form for an existing item
    Edit,
    /// List all items
    Index,
    /// Show one item
    Show,
    /// Persist a new item
    Create,
    /// Update an existing item
    Update,
    /// Delete an existing item
    Destroy,
}

impl Action {
    /// All actions, in declaration order
    pub const ALL: [Action; 7] = [
        Self::New,
        Self::Edit,
        Self::Index,
        Self::Show,
        Self::Create,
        Self::Update,
        Self::Destroy,
    ];

    /// Action name as used in view names and log fields
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Edit => "edit",
            Self::Index => "index",
            Self::Show => "show",
            Self::Create => "create",
            Self::Update => "update",
            Self::Destroy => "destroy",
        }
    }

    /// Actions that change persisted state
    #[must_use]
    pub const fn is_mutating(&self) -> bool {
        matches!(self, Self::Create | Self::Update | Self::Destroy)
    }

    /// Actions that operate on the collection rather than a single item
    #[must_use]
    pub const fn is_collection(&self) -> bool {
        matches!(self, Self::Index)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Hook points within an action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Before entity resolution and authorization
    Before,
    /// After persistence, before the default response
    Respond,
    /// After everything else
    After,
}

impl Phase {
    /// Hook name prefix (`before_show`, `respond_to_show`, `after_show`)
    #[must_use]
    pub const fn prefix(&self) -> &'static str {
        match self {
            Self::Before => "before",
            Self::Respond => "respond_to",
            Self::After => "after",
        }
    }

    /// Conventional hook name for an action
    #[must_use]
    pub fn hook_name(&self, action: Action) -> String {
        format!("{}_{}", self.prefix(), action)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

/// A host-supplied hook body
pub type Hook<E> = Arc<dyn Fn(&mut ExecutionContext<E>) -> Result<()> + Send + Sync>;

/// Hooks registered for one resource
///
/// One hook per `(action, phase)`. Registering again for the same key
/// replaces the earlier hook.
pub struct CallbackRegistry<E> {
    hooks: HashMap<(Action, Phase), Hook<E>>,
}

impl<E> CallbackRegistry<E> {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self {
            hooks: HashMap::new(),
        }
    }

    /// Register a hook, replacing any existing one for the same key
    pub fn register<F>(&mut self, action: Action, phase: Phase, hook: F)
    where
        F: Fn(&mut ExecutionContext<E>) -> Result<()> + Send + Sync + 'static,
    {
        if self.hooks.insert((action, phase), Arc::new(hook)).is_some() {
            tracing::debug!(
                hook = %phase.hook_name(action),
                "Replacing previously registered hook"
            );
        }
    }

    /// Check whether a hook exists for the key
    #[must_use]
    pub fn contains(&self, action: Action, phase: Phase) -> bool {
        self.hooks.contains_key(&(action, phase))
    }

    /// Run the hook for the key, if one is registered
    ///
    /// Returns `Ok(false)` when no hook exists.
    ///
    /// # Errors
    ///
    /// Propagates the hook's own error.
    pub fn invoke(
        &self,
        ctx: &mut ExecutionContext<E>,
        action: Action,
        phase: Phase,
    ) -> Result<bool> {
        match self.hooks.get(&(action, phase)) {
            Some(hook) => {
                tracing::trace!(hook = %phase.hook_name(action), "Invoking hook");
                hook(ctx)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Number of registered hooks
    #[must_use]
    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    /// Check whether no hooks are registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }
}

impl<E> Default for CallbackRegistry<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> Clone for CallbackRegistry<E> {
    fn clone(&self) -> Self {
        Self {
            hooks: self.hooks.clone(),
        }
    }
}

impl<E> fmt::Debug for CallbackRegistry<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<String> = self
            .hooks
            .keys()
            .map(|(action, phase)| phase.hook_name(*action))
            .collect();
        keys.sort();
        f.debug_struct("CallbackRegistry").field("hooks", &keys).finish()
    }
}
