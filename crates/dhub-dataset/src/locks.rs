//! Per-slug advisory locks.
//!
//! Slug creation is check-then-insert. [`SlugLocks`] serializes callers
//! working on the *same* slug while letting different slugs proceed in
//! parallel. The store's unique slug index remains the final authority.

use std::collections::HashSet;
use std::sync::{Condvar, Mutex, PoisonError};

use crate::error::{DatasetError, DatasetResult};

/// A set of held slugs; acquiring a held slug blocks until it is released.
#[derive(Debug, Default)]
pub struct SlugLocks {
    held: Mutex<HashSet<String>>,
    released: Condvar,
}

/// Holds one slug until dropped.
#[derive(Debug)]
pub struct SlugGuard<'a> {
    locks: &'a SlugLocks,
    slug: String,
}

impl SlugLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Block until `slug` is free, then hold it.
    pub fn acquire(&self, slug: &str) -> DatasetResult<SlugGuard<'_>> {
        let mut held = self.held.lock().map_err(poisoned)?;
        while held.contains(slug) {
            held = self.released.wait(held).map_err(poisoned)?;
        }
        held.insert(slug.to_string());
        Ok(SlugGuard {
            locks: self,
            slug: slug.to_string(),
        })
    }

    /// Whether `slug` is currently held.
    pub fn is_held(&self, slug: &str) -> bool {
        self.held
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(slug)
    }
}

impl SlugGuard<'_> {
    pub fn slug(&self) -> &str {
        &self.slug
    }
}

impl Drop for SlugGuard<'_> {
    fn drop(&mut self) {
        let mut held = self
            .locks
            .held
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        held.remove(&self.slug);
        self.locks.released.notify_all();
    }
}

fn poisoned<T>(e: PoisonError<T>) -> DatasetError {
    DatasetError::Backend(format!("slug lock poisoned: {e}"))
}
