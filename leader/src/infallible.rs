//! Thin wrappers around `std::sync` primitives that panic on lock
//! poisoning instead of threading a second `Result` through every call
//! site. Adapted in-tree from the teacher's (unpublished) `aptos-infallible`
//! crate — see DESIGN.md.

use std::sync::{self, MutexGuard as StdMutexGuard};

pub struct Mutex<T>(sync::Mutex<T>);

impl<T> Mutex<T> {
    pub fn new(value: T) -> Self {
        Mutex(sync::Mutex::new(value))
    }

    pub fn lock(&self) -> StdMutexGuard<'_, T> {
        self.0.lock().expect("Mutex poisoned: a holder panicked")
    }
}
