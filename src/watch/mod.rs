//! Field-change notification.
//!
//! The host raises a notification whenever a field of the current record
//! changes. Interested parties subscribe for a set of field names and receive
//! a [`FieldChange`] for each matching notification until their
//! [`Subscription`] is dropped. There is no separate unsubscribe call and no
//! listener state to rewire by hand.
//!
//! # Examples
//!
//! ```rust
//! use polylookup::watch::FieldWatcher;
//! use serde_json::json;
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//!
//! let watcher = FieldWatcher::new();
//! let seen = Arc::new(AtomicUsize::new(0));
//! let counter = seen.clone();
//! let subscription = watcher.subscribe(["parentcustomerid"], move |_| {
//!     counter.fetch_add(1, Ordering::SeqCst);
//! });
//!
//! watcher.notify("parentcustomerid", json!("a-1"));
//! watcher.notify("name", json!("ignored"));
//! drop(subscription);
//! watcher.notify("parentcustomerid", json!("a-2"));
//!
//! assert_eq!(seen.load(Ordering::SeqCst), 1);
//! ```

use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

/// A single field change raised by the host.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldChange {
    /// Logical name of the changed field
    pub field: String,
    /// New value
    pub value: Value,
}

type Callback = Arc<dyn Fn(&FieldChange) + Send + Sync>;

struct Listener {
    fields: Vec<String>,
    callback: Callback,
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    listeners: HashMap<u64, Listener>,
}

fn lock(registry: &Mutex<Registry>) -> MutexGuard<'_, Registry> {
    registry.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Hub dispatching field changes to subscribers.
///
/// Cloning yields another handle to the same hub.
#[derive(Clone, Default)]
pub struct FieldWatcher {
    registry: Arc<Mutex<Registry>>,
}

impl std::fmt::Debug for FieldWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldWatcher").field("subscribers", &self.subscriber_count()).finish()
    }
}

impl FieldWatcher {
    /// Create an empty hub.
    pub fn new() -> Self {
        Self::default()
    }

    /// Call `callback` for every change of one of `fields` until the returned
    /// handle is dropped.
    ///
    /// Subscribing with no fields is allowed and never fires.
    #[must_use = "dropping the subscription unsubscribes immediately"]
    pub fn subscribe<I, S, F>(&self, fields: I, callback: F) -> Subscription
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        F: Fn(&FieldChange) + Send + Sync + 'static,
    {
        let fields: Vec<String> = fields.into_iter().map(Into::into).collect();
        let mut registry = lock(&self.registry);
        let id = registry.next_id;
        registry.next_id += 1;
        tracing::debug!(target: "watch", "Subscription {} watching {:?}", id, fields);
        registry.listeners.insert(
            id,
            Listener {
                fields,
                callback: Arc::new(callback),
            },
        );

        Subscription {
            id,
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// Raise a change of `field`. Returns the number of subscribers notified.
    pub fn notify(&self, field: &str, value: Value) -> usize {
        // Callbacks run outside the lock so they may subscribe or drop handles.
        let callbacks: Vec<Callback> = lock(&self.registry)
            .listeners
            .values()
            .filter(|l| l.fields.iter().any(|f| f == field))
            .map(|l| l.callback.clone())
            .collect();

        let change = FieldChange {
            field: field.to_string(),
            value,
        };
        for callback in &callbacks {
            callback(&change);
        }
        callbacks.len()
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        lock(&self.registry).listeners.len()
    }
}

/// Handle keeping a subscription alive; unsubscribes on drop.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    registry: Weak<Mutex<Registry>>,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            lock(&registry).listeners.remove(&self.id);
            tracing::debug!(target: "watch", "Subscription {} released", self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_only_matching_fields_fire() {
        let watcher = FieldWatcher::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let _sub = watcher.subscribe(["name", "statecode"], move |change| {
            sink.lock().unwrap().push(change.field.clone());
        });

        assert_eq!(watcher.notify("name", json!("x")), 1);
        assert_eq!(watcher.notify("telephone1", json!("y")), 0);
        assert_eq!(watcher.notify("statecode", json!(1)), 1);
        assert_eq!(*seen.lock().unwrap(), vec!["name", "statecode"]);
    }

    #[test]
    fn test_drop_releases_subscription() {
        let watcher = FieldWatcher::new();
        let first = watcher.subscribe(["name"], |_| {});
        let second = watcher.subscribe(["name"], |_| {});
        assert_eq!(watcher.subscriber_count(), 2);

        drop(first);
        assert_eq!(watcher.subscriber_count(), 1);
        assert_eq!(watcher.notify("name", json!(null)), 1);

        drop(second);
        assert_eq!(watcher.subscriber_count(), 0);
    }

    #[test]
    fn test_subscription_outliving_hub() {
        let watcher = FieldWatcher::new();
        let sub = watcher.subscribe(["name"], |_| {});
        drop(watcher);
        drop(sub);
    }

    #[test]
    fn test_empty_field_set_never_fires() {
        let watcher = FieldWatcher::new();
        let _sub = watcher.subscribe(Vec::<String>::new(), |_| panic!("should not fire"));
        assert_eq!(watcher.notify("name", json!("x")), 0);
    }
}
