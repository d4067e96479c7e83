//! Observable value cells

use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::broadcast;

const DEFAULT_CAPACITY: usize = 16;

struct Inner<T> {
    value: RwLock<T>,
    sender: broadcast::Sender<T>,
}

/// Shared value with change notification. Readers that fall behind only
/// lose intermediate notifications; `get` always returns the latest value.
pub struct Observable<T: Clone> {
    inner: Arc<Inner<T>>,
}

impl<T: Clone> Clone for Observable<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Clone + Send + 'static> Observable<T> {
    pub fn new(value: T) -> Self {
        Self::with_capacity(value, DEFAULT_CAPACITY)
    }

    pub fn with_capacity(value: T, capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            inner: Arc::new(Inner {
                value: RwLock::new(value),
                sender,
            }),
        }
    }

    pub fn get(&self) -> T {
        self.inner.value.read().clone()
    }

    /// Overwrite the value and notify subscribers
    pub fn set(&self, value: T) {
        *self.inner.value.write() = value.clone();
        // No subscribers is not an error
        let _ = self.inner.sender.send(value);
    }

    /// Replace the value only if `f` approves the current one. Returns
    /// whether the value changed.
    pub fn set_if(&self, value: T, f: impl FnOnce(&T) -> bool) -> bool {
        {
            let mut guard = self.inner.value.write();
            if !f(&guard) {
                return false;
            }
            *guard = value.clone();
        }
        let _ = self.inner.sender.send(value);
        true
    }

    pub fn subscribe(&self) -> broadcast::Receiver<T> {
        self.inner.sender.subscribe()
    }

    pub fn reader(&self) -> ObservableReader<T> {
        ObservableReader {
            inner: self.inner.clone(),
        }
    }
}

/// Read-only view of an [`Observable`]
pub struct ObservableReader<T: Clone> {
    inner: Arc<Inner<T>>,
}

impl<T: Clone> Clone for ObservableReader<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Clone> ObservableReader<T> {
    pub fn get(&self) -> T {
        self.inner.value.read().clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<T> {
        self.inner.sender.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_set() {
        let cell = Observable::new(String::new());
        assert_eq!(cell.get(), "");
        cell.set("camera-a".to_string());
        assert_eq!(cell.get(), "camera-a");
        assert_eq!(cell.reader().get(), "camera-a");
    }

    #[test]
    fn test_set_if() {
        let cell = Observable::new(0u32);
        assert!(!cell.set_if(5, |current| *current != 0));
        assert_eq!(cell.get(), 0);
        assert!(cell.set_if(5, |current| *current == 0));
        assert_eq!(cell.get(), 5);
    }

    #[tokio::test]
    async fn test_subscribers_see_changes() {
        let cell = Observable::new(1u32);
        let mut rx = cell.reader().subscribe();
        cell.set(2);
        cell.set(3);
        assert_eq!(rx.recv().await.unwrap(), 2);
        assert_eq!(rx.recv().await.unwrap(), 3);
    }
}
