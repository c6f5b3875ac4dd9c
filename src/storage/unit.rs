//! Transactional unit of work
//!
//! A unit carries an identity and a typed side-table where components stash
//! scope-local data. The side-table is destroyed with the unit, so anything
//! buffered there disappears on rollback.

use std::any::{Any, TypeId};
use std::cell::RefCell;
use std::collections::HashMap;

use crate::models::UnitId;

/// One transactional unit of work
#[derive(Default)]
pub struct UnitOfWork {
    id: UnitId,
    extensions: RefCell<HashMap<TypeId, Box<dyn Any>>>,
}

impl UnitOfWork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn id(&self) -> UnitId {
        self.id
    }

    /// Run `f` against this unit's slot of type `T`, creating it on first use
    ///
    /// `f` must not re-enter `with_data` on the same unit.
    pub fn with_data<T, R>(&self, f: impl FnOnce(&mut T) -> R) -> R
    where
        T: Default + 'static,
    {
        let mut extensions = self.extensions.borrow_mut();
        let slot = extensions
            .entry(TypeId::of::<T>())
            .or_insert_with(|| Box::new(T::default()));
        match slot.downcast_mut::<T>() {
            Some(data) => f(data),
            None => unreachable!("slot is keyed by its TypeId"),
        }
    }

    /// Read this unit's slot of type `T` if it exists
    pub fn peek<T, R>(&self, f: impl FnOnce(&T) -> R) -> Option<R>
    where
        T: 'static,
    {
        let extensions = self.extensions.borrow();
        extensions
            .get(&TypeId::of::<T>())
            .and_then(|slot| slot.downcast_ref::<T>())
            .map(f)
    }
}

impl std::fmt::Debug for UnitOfWork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnitOfWork").field("id", &self.id).finish()
    }
}
