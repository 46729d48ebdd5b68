//! Handle registry: opaque 32-bit handles for every live entity.
//!
//! Handles start at [`FIRST_HANDLE`] and only ever count up; destroying an
//! entity removes its table entry but never frees the number for reuse.
//! Lookups are typed: asking for a [`Gadget`] under an [`App`] handle yields
//! `None`, not the wrong entity.

#[cfg(test)]
#[path = "registry_test.rs"]
mod registry_test;

use std::collections::HashMap;

use crate::session::entity::{App, Gadget, ModelInstance};

pub type Handle = u32;

/// Handles below this are reserved.
pub const FIRST_HANDLE: Handle = 12;

#[derive(Debug)]
pub enum Entry {
    App(App),
    Gadget(Gadget),
    ModelInstance(ModelInstance),
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("handle space exhausted")]
    Exhausted,
}

/// An entity type that can live in the registry.
pub trait Registered: Sized {
    fn into_entry(self) -> Entry;
    fn from_entry(entry: Entry) -> Option<Self>;
    fn view(entry: &Entry) -> Option<&Self>;
    fn view_mut(entry: &mut Entry) -> Option<&mut Self>;
}

macro_rules! registered {
    ($ty:ident) => {
        impl Registered for $ty {
            fn into_entry(self) -> Entry {
                Entry::$ty(self)
            }

            fn from_entry(entry: Entry) -> Option<Self> {
                match entry {
                    Entry::$ty(value) => Some(value),
                    _ => None,
                }
            }

            fn view(entry: &Entry) -> Option<&Self> {
                match entry {
                    Entry::$ty(value) => Some(value),
                    _ => None,
                }
            }

            fn view_mut(entry: &mut Entry) -> Option<&mut Self> {
                match entry {
                    Entry::$ty(value) => Some(value),
                    _ => None,
                }
            }
        }
    };
}

registered!(App);
registered!(Gadget);
registered!(ModelInstance);

#[derive(Debug)]
pub struct Registry {
    next: Handle,
    entries: HashMap<Handle, Entry>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    #[must_use]
    pub fn new() -> Self {
        Self { next: FIRST_HANDLE, entries: HashMap::new() }
    }

    /// Register a new entity under a fresh handle.
    ///
    /// # Errors
    ///
    /// [`RegistryError::Exhausted`] once every 32-bit handle has been issued.
    pub fn create<T: Registered>(&mut self, value: T) -> Result<Handle, RegistryError> {
        let handle = self.next;
        self.next = handle.checked_add(1).ok_or(RegistryError::Exhausted)?;
        self.entries.insert(handle, value.into_entry());
        Ok(handle)
    }

    #[must_use]
    pub fn find<T: Registered>(&self, handle: Handle) -> Option<&T> {
        self.entries.get(&handle).and_then(T::view)
    }

    pub fn find_mut<T: Registered>(&mut self, handle: Handle) -> Option<&mut T> {
        self.entries.get_mut(&handle).and_then(T::view_mut)
    }

    #[cfg(test)]
    #[must_use]
    pub fn contains(&self, handle: Handle) -> bool {
        self.entries.contains_key(&handle)
    }

    /// Remove a handle's entry. Returns false if it was not registered.
    pub fn destroy(&mut self, handle: Handle) -> bool {
        self.entries.remove(&handle).is_some()
    }

    /// Remove and return the entity only if it has type `T`.
    pub fn take<T: Registered>(&mut self, handle: Handle) -> Option<T> {
        self.find::<T>(handle)?;
        self.entries.remove(&handle).and_then(T::from_entry)
    }

    #[cfg(test)]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[cfg(test)]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
