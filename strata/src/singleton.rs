use std::sync::{Mutex, PoisonError};

/// A process-wide state container with snapshot/restore hooks.
///
/// Core algorithms never reach for these statics directly; they receive the
/// data they need as arguments. The containers exist so that the long-lived
/// registries (plugins, config store) survive across compositions and so
/// that tests can isolate themselves:
///
/// ```
/// use strata::store::config_store;
///
/// let snapshot = config_store().get_state();
/// // ... test body mutating the store ...
/// config_store().set_state(snapshot);
/// ```
#[derive(Debug, Default)]
pub struct Singleton<T: Clone> {
  cell: Mutex<T>,
}

impl<T: Clone> Singleton<T> {
  pub fn new(value: T) -> Self {
    Self {
      cell: Mutex::new(value),
    }
  }

  /// Runs `f` with exclusive access to the contained state.
  pub fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
    let mut guard = self.cell.lock().unwrap_or_else(PoisonError::into_inner);
    f(&mut guard)
  }

  /// An opaque snapshot of the current state.
  pub fn get_state(&self) -> T {
    self.with(|state| state.clone())
  }

  /// Restores a snapshot taken with [`Singleton::get_state`].
  pub fn set_state(&self, state: T) {
    self.with(|slot| *slot = state);
  }
}

#[cfg(test)]
mod tests {
  use pretty_assertions::assert_eq;

  use super::*;

  #[test]
  fn snapshot_round_trips() {
    let singleton = Singleton::new(vec![1, 2, 3]);
    let snapshot = singleton.get_state();

    singleton.with(|v| v.push(4));
    assert_eq!(singleton.get_state(), vec![1, 2, 3, 4]);

    singleton.set_state(snapshot);
    assert_eq!(singleton.get_state(), vec![1, 2, 3]);
  }
}
