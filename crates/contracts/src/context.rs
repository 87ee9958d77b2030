//! Context - ambient key/value map read by sinks
//!
//! Subscribers provide a `Context`; a sink exposes the one of its current
//! subscriber through `ManySink::current_context`. The map is immutable:
//! `put` returns a new context and leaves the original untouched.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Hook invoked with values a retrying emitter gave up on
pub type DiscardHook = Arc<dyn Fn(&dyn Any) + Send + Sync>;

const DISCARD_HOOK_KEY: &str = "reactive.sinks.discard";

type Entries = HashMap<String, Arc<dyn Any + Send + Sync>>;

/// Immutable, cheaply cloned key/value map
#[derive(Clone, Default)]
pub struct Context {
    entries: Arc<Entries>,
}

impl Context {
    /// Create an empty context
    pub fn empty() -> Self {
        Self::default()
    }

    /// Return a copy of this context with `key` bound to `value`
    pub fn put<V>(&self, key: impl Into<String>, value: V) -> Self
    where
        V: Any + Send + Sync,
    {
        let mut entries = Entries::clone(&self.entries);
        entries.insert(key.into(), Arc::new(value));
        Self {
            entries: Arc::new(entries),
        }
    }

    /// Typed lookup; `None` if the key is missing or holds another type
    pub fn get<V: Any + Send + Sync>(&self, key: &str) -> Option<&V> {
        self.entries.get(key)?.downcast_ref::<V>()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Register the hook called for discarded values
    pub fn with_discard_hook<F>(&self, hook: F) -> Self
    where
        F: Fn(&dyn Any) + Send + Sync + 'static,
    {
        let hook: DiscardHook = Arc::new(hook);
        self.put(DISCARD_HOOK_KEY, hook)
    }

    pub fn discard_hook(&self) -> Option<&DiscardHook> {
        self.get::<DiscardHook>(DISCARD_HOOK_KEY)
    }

    /// Pass `value` to the discard hook, if one is registered
    pub fn discard<T: Any>(&self, value: &T) {
        if let Some(hook) = self.discard_hook() {
            hook(value);
        }
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<&String> = self.entries.keys().collect();
        keys.sort();
        f.debug_struct("Context").field("keys", &keys).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    #[test]
    fn test_put_is_persistent() {
        let base = Context::empty();
        let derived = base.put("tenant", "acme".to_string());

        assert!(base.is_empty());
        assert_eq!(derived.len(), 1);
        assert_eq!(derived.get::<String>("tenant").map(String::as_str), Some("acme"));
    }

    #[test]
    fn test_get_wrong_type_is_none() {
        let ctx = Context::empty().put("count", 3u32);
        assert!(ctx.get::<u64>("count").is_none());
        assert_eq!(ctx.get::<u32>("count"), Some(&3));
    }

    #[test]
    fn test_discard_hook_receives_value() {
        let seen = Arc::new(AtomicU64::new(0));
        let sink = Arc::clone(&seen);
        let ctx = Context::empty().with_discard_hook(move |value| {
            if let Some(v) = value.downcast_ref::<u64>() {
                sink.store(*v, Ordering::SeqCst);
            }
        });

        ctx.discard(&42u64);
        assert_eq!(seen.load(Ordering::SeqCst), 42);

        // No hook registered: discarding is a no-op
        Context::empty().discard(&7u64);
    }
}
