//! Keyed storage for component handles.

use crate::collaborators::Handle;
use crate::errors::HandleError;
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

/// A bag of type-erased handles keyed by name.
///
/// Publishing to an existing key returns `HandleError::Conflict`.
#[derive(Clone, Default)]
pub struct HandleBag {
    handles: HashMap<String, Handle>,
    order: Vec<String>,
}

impl HandleBag {
    /// Creates a new empty bag.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Publishes a handle.
    ///
    /// # Errors
    ///
    /// Returns `HandleError::Conflict` if the key already exists.
    pub fn insert(&mut self, key: impl Into<String>, handle: Handle) -> Result<(), HandleError> {
        let key = key.into();
        if self.handles.contains_key(&key) {
            return Err(HandleError::Conflict { key });
        }
        self.order.push(key.clone());
        self.handles.insert(key, handle);
        Ok(())
    }

    /// Gets the raw handle for a key.
    #[must_use]
    pub fn get_raw(&self, key: &str) -> Option<Handle> {
        self.handles.get(key).cloned()
    }

    /// Gets a handle downcast to `T`.
    pub fn get<T: Any + Send + Sync>(&self, key: &str) -> Result<Arc<T>, HandleError> {
        let handle = self.get_raw(key).ok_or_else(|| HandleError::Missing {
            key: key.to_string(),
        })?;
        handle.downcast::<T>().map_err(|_| HandleError::TypeMismatch {
            key: key.to_string(),
            expected: std::any::type_name::<T>(),
        })
    }

    /// Checks if a key exists.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.handles.contains_key(key)
    }

    /// Returns keys in publication order.
    #[must_use]
    pub fn keys(&self) -> &[String] {
        &self.order
    }

    /// Returns the number of handles.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    /// Returns true if the bag is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}

impl std::fmt::Debug for HandleBag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandleBag").field("keys", &self.order).finish()
    }
}
