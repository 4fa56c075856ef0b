//! # Contexts
//!
//! A [`Context`] is a typed key with a default value. A runtime-wide provider
//! can override it with [`Runtime::provide`](crate::Runtime::provide); every
//! instance that read the context through `use_context` during its last render
//! is re-rendered when the provided value changes.
//!
//! ```rust
//! use tether_core::*;
//!
//! #[derive(Clone, Debug, PartialEq)]
//! struct Theme { background: &'static str }
//!
//! let theme = create_context(Theme { background: "#eeeeee" });
//! let mut registry = ContextRegistry::default();
//! assert_eq!(registry.get(&theme).background, "#eeeeee");
//!
//! registry.provide(&theme, Theme { background: "#222222" });
//! assert_eq!(registry.get(&theme).background, "#222222");
//! ```

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_CONTEXT: AtomicU64 = AtomicU64::new(1);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ContextId(u64);

pub struct Context<T> {
    id: ContextId,
    default: Rc<T>,
}

impl<T: 'static> Context<T> {
    pub fn new(default: T) -> Self {
        Self {
            id: ContextId(NEXT_CONTEXT.fetch_add(1, Ordering::Relaxed)),
            default: Rc::new(default),
        }
    }

    pub fn default_value(&self) -> Rc<T> {
        self.default.clone()
    }
}

impl<T> Context<T> {
    pub fn id(&self) -> ContextId {
        self.id
    }
}

impl<T> Clone for Context<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            default: self.default.clone(),
        }
    }
}

impl<T> fmt::Debug for Context<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Context").field(&self.id.0).finish()
    }
}

pub fn create_context<T: 'static>(default: T) -> Context<T> {
    Context::new(default)
}

/// Provided context values.
#[derive(Default)]
pub struct ContextRegistry {
    values: HashMap<ContextId, Rc<dyn Any>>,
}

impl ContextRegistry {
    /// Sets the provided value. Returns whether it differs from the value
    /// readers saw before (the previous provider, or the default).
    pub fn provide<T: PartialEq + 'static>(&mut self, ctx: &Context<T>, value: T) -> bool {
        let changed = *self.get(ctx) != value;
        self.values.insert(ctx.id, Rc::new(value));
        changed
    }

    /// Removes the provider; readers fall back to the default.
    pub fn revoke<T: PartialEq + 'static>(&mut self, ctx: &Context<T>) -> bool {
        let changed = *self.get(ctx) != *ctx.default;
        self.values.remove(&ctx.id);
        changed
    }

    pub fn get<T: 'static>(&self, ctx: &Context<T>) -> Rc<T> {
        self.values
            .get(&ctx.id)
            .and_then(|v| v.clone().downcast::<T>().ok())
            .unwrap_or_else(|| ctx.default.clone())
    }

    pub fn is_provided<T>(&self, ctx: &Context<T>) -> bool {
        self.values.contains_key(&ctx.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contexts_are_distinct() {
        let a = create_context(1);
        let b = create_context(1);
        assert_ne!(a.id(), b.id());

        let mut registry = ContextRegistry::default();
        registry.provide(&a, 5);
        assert_eq!(*registry.get(&a), 5);
        assert_eq!(*registry.get(&b), 1);
    }

    fn key_of<T>(ctx: &Context<T>) -> ContextId {
        ctx.id()
    }

    #[test]
    fn test_id_needs_no_bounds() {
        let ctx = create_context(vec![1, 2]);
        assert_eq!(key_of(&ctx), ctx.clone().id());
    }

    #[test]
    fn test_provide_reports_changes() {
        let ctx = create_context("light");
        let mut registry = ContextRegistry::default();
        assert!(!registry.provide(&ctx, "light"));
        assert!(registry.provide(&ctx, "dark"));
        assert!(!registry.provide(&ctx, "dark"));
        assert!(registry.is_provided(&ctx));
        assert!(registry.revoke(&ctx));
        assert!(!registry.is_provided(&ctx));
        assert_eq!(*registry.get(&ctx), "light");
    }
}
