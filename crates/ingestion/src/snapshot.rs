use std::sync::{Arc, PoisonError, RwLock};

/// Latest-value cell replaced as a whole
///
/// Writers swap in a new `Arc`; readers clone the `Arc` and never observe a
/// partially updated value.
#[derive(Debug)]
pub struct Snapshot<T> {
    inner: RwLock<Option<Arc<T>>>,
}

impl<T> Snapshot<T> {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(None),
        }
    }

    pub fn load(&self) -> Option<Arc<T>> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn store(&self, value: T) {
        *self.inner.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(value));
    }

    pub fn clear(&self) {
        *self.inner.write().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

impl<T> Default for Snapshot<T> {
    fn default() -> Self {
        Self::new()
    }
}
