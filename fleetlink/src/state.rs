//! Shared cells for readouts that cross task boundaries (link state,
//! health counters, subscriber lists). Writers are always the owning task.

use parking_lot::Mutex;
use std::sync::Arc;

pub type Shared<T> = Arc<Mutex<T>>;

pub fn new_state<T>(value: T) -> Shared<T> {
    Arc::new(Mutex::new(value))
}

/// Copy the current value out of a shared cell.
pub fn snapshot<T: Clone>(state: &Shared<T>) -> T {
    state.lock().clone()
}
