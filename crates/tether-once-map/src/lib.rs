use std::borrow::Borrow;
use std::hash::{BuildHasher, Hash, RandomState};
use std::pin::pin;
use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::Notify;

/// Run tasks only once and store the results in a parallel hash map.
///
/// Metadata lookups are jobs `Fn(K) -> V` that should only run once per key. When the resolver
/// prefetches a package's version list while the search asks for the same list, the second caller
/// waits for the first to finish and receives a clone of the same result.
///
/// Values are cloned out of the map, so `V` is usually an `Arc`.
pub struct OnceMap<K, V, S = RandomState> {
    items: DashMap<K, Value<V>, S>,
}

impl<K: Eq + Hash, V: Clone, H: BuildHasher + Clone> OnceMap<K, V, H> {
    /// Create a [`OnceMap`] with the specified hasher.
    pub fn with_hasher(hasher: H) -> Self {
        Self {
            items: DashMap::with_hasher(hasher),
        }
    }

    /// Register that you want to start a job.
    ///
    /// If this method returns `true`, you need to start a job and call [`OnceMap::done`] eventually
    /// or other tasks will hang. If it returns `false`, this job is already in progress or done and
    /// you can [`OnceMap::wait`] for the result.
    pub fn register(&self, key: K) -> bool {
        match self.items.entry(key) {
            Entry::Occupied(_) => false,
            Entry::Vacant(entry) => {
                entry.insert(Value::Waiting(Arc::new(Notify::new())));
                true
            }
        }
    }

    /// Submit the result of a job you registered.
    pub fn done(&self, key: K, value: V) {
        if let Some(Value::Waiting(notify)) = self.items.insert(key, Value::Filled(value)) {
            notify.notify_waiters();
        }
    }

    /// Wait for the result of a job that is running.
    ///
    /// Returns `None` if the job was never registered. Will hang if [`OnceMap::done`] isn't called
    /// for this key.
    pub async fn wait(&self, key: &K) -> Option<V> {
        let notify = {
            let entry = self.items.get(key)?;
            match entry.value() {
                Value::Filled(value) => return Some(value.clone()),
                Value::Waiting(notify) => notify.clone(),
            }
        };

        // Register the waiter before re-checking, so a `done` in between can't be missed.
        let notification = pin!(notify.notified());
        if let Some(value) = self.get(key) {
            return Some(value);
        }
        notification.await;

        self.get(key)
    }

    /// Wait for the result of a job that is running, in a blocking context.
    pub fn wait_blocking(&self, key: &K) -> Option<V> {
        futures::executor::block_on(self.wait(key))
    }

    /// Return the result of a finished job, if any.
    pub fn get<Q: ?Sized + Hash + Eq>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
    {
        let entry = self.items.get(key)?;
        match entry.value() {
            Value::Filled(value) => Some(value.clone()),
            Value::Waiting(_) => None,
        }
    }

    /// Whether a job for the key was registered, finished or not.
    pub fn contains_key<Q: ?Sized + Hash + Eq>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
    {
        self.items.contains_key(key)
    }

    /// The number of registered jobs.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether no job was registered yet.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<K: Eq + Hash + Clone, V, H: Default + BuildHasher + Clone> Default for OnceMap<K, V, H> {
    fn default() -> Self {
        Self {
            items: DashMap::with_hasher(H::default()),
        }
    }
}

impl<K, V, H> FromIterator<(K, V)> for OnceMap<K, V, H>
where
    K: Eq + Hash,
    H: Default + Clone + BuildHasher,
{
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self {
            items: iter
                .into_iter()
                .map(|(k, v)| (k, Value::Filled(v)))
                .collect(),
        }
    }
}

enum Value<V> {
    Waiting(Arc<Notify>),
    Filled(V),
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::OnceMap;

    #[tokio::test]
    async fn waiters_receive_the_registered_value() {
        let map: Arc<OnceMap<&str, u32>> = Arc::new(OnceMap::default());
        assert!(map.register("attrs"));
        assert!(!map.register("attrs"));
        assert_eq!(map.get("attrs"), None);

        let waiter = {
            let map = map.clone();
            tokio::spawn(async move { map.wait(&"attrs").await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        map.done("attrs", 7);

        assert_eq!(waiter.await.unwrap(), Some(7));
        assert_eq!(map.get("attrs"), Some(7));
        assert_eq!(map.len(), 1);
    }

    #[tokio::test]
    async fn unregistered_keys() {
        let map: OnceMap<String, u32> = OnceMap::default();
        assert!(map.is_empty());
        assert_eq!(map.wait(&"missing".to_string()).await, None);
        assert!(!map.contains_key("missing"));
    }

    #[test]
    fn prefilled() {
        let map: OnceMap<&str, &str> = [("attrs", "20.3.0")].into_iter().collect();
        assert!(!map.register("attrs"));
        assert_eq!(map.wait_blocking(&"attrs"), Some("20.3.0"));
    }
}
