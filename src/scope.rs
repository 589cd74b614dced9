//! Per-call tensor arenas.
//!
//! Every tensor a pipeline stage allocates goes through a [`Scope`]. When the scope
//! ends, whatever it still tracks is released, so a call that fails halfway leaves the
//! store exactly as it found it. Tensors meant to outlive the call are handed out with
//! [`Scope::keep`].

use std::sync::Arc;

use ndarray::ArrayD;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::tensor::{TensorHandle, TensorStore};

pub struct Scope<'s> {
    store: &'s TensorStore,
    tracked: Vec<TensorHandle>,
}

impl<'s> Scope<'s> {
    pub fn new(store: &'s TensorStore) -> Self {
        Self {
            store,
            tracked: Vec::new(),
        }
    }

    pub fn store(&self) -> &'s TensorStore {
        self.store
    }

    /// Allocate a tensor owned by this scope.
    pub fn alloc(&mut self, data: ArrayD<f32>) -> TensorHandle {
        let handle = self.store.create(data);
        self.tracked.push(handle.clone());
        handle
    }

    pub fn read(&self, handle: &TensorHandle) -> Result<Arc<ArrayD<f32>>> {
        self.store.read(handle)
    }

    /// Release a tensor before the scope ends. Only tensors this scope allocated may be
    /// released through it; caller-owned inputs are never touched.
    pub fn release(&mut self, handle: &TensorHandle) -> Result<()> {
        self.untrack(handle)?;
        self.store.dispose(handle)
    }

    /// Exempt a tensor from release; ownership passes to whoever receives the handle.
    pub fn keep(&mut self, handle: &TensorHandle) -> Result<()> {
        self.untrack(handle)
    }

    pub fn num_tracked(&self) -> usize {
        self.tracked.len()
    }

    /// End the scope, releasing everything still tracked. The first release failure is
    /// returned after all other tensors have been released.
    pub fn close(mut self) -> Result<()> {
        let mut first_err = None;
        for handle in std::mem::take(&mut self.tracked) {
            if let Err(e) = self.store.dispose(&handle) {
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    fn untrack(&mut self, handle: &TensorHandle) -> Result<()> {
        let pos = self
            .tracked
            .iter()
            .position(|h| h.id() == handle.id())
            .ok_or(Error::ResourceDisposal { id: handle.id() })?;
        self.tracked.swap_remove(pos);
        Ok(())
    }
}

impl Drop for Scope<'_> {
    fn drop(&mut self) {
        if self.tracked.is_empty() {
            return;
        }
        debug!(count = self.tracked.len(), "releasing tensors left in scope");
        for handle in self.tracked.drain(..) {
            if let Err(e) = self.store.dispose(&handle) {
                warn!(tensor = %handle.id(), error = %e, "tensor release failed during unwind");
            }
        }
    }
}

impl TensorStore {
    /// Run `f` inside a fresh [`Scope`].
    ///
    /// On success every tensor `f` allocated and did not [`keep`](Scope::keep) is
    /// released, and release failures surface as errors. On failure everything is
    /// released before the error is returned.
    pub fn tidy<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Scope<'_>) -> Result<T>,
    {
        let mut scope = Scope::new(self);
        match f(&mut scope) {
            Ok(value) => {
                scope.close()?;
                Ok(value)
            }
            Err(e) => {
                debug!(released = scope.num_tracked(), error = %e, "scope aborted");
                drop(scope);
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::IxDyn;

    fn zeros(n: usize) -> ArrayD<f32> {
        ArrayD::zeros(IxDyn(&[n]))
    }

    #[test]
    fn tidy_releases_intermediates() {
        let store = TensorStore::new();
        let count = store
            .tidy(|scope| {
                scope.alloc(zeros(1));
                scope.alloc(zeros(2));
                Ok(scope.num_tracked())
            })
            .unwrap();
        assert_eq!(count, 2);
        assert_eq!(store.num_tensors(), 0);
    }

    #[test]
    fn kept_tensor_survives() {
        let store = TensorStore::new();
        let kept = store
            .tidy(|scope| {
                scope.alloc(zeros(4));
                let out = scope.alloc(zeros(2));
                scope.keep(&out)?;
                Ok(out)
            })
            .unwrap();
        assert_eq!(store.num_tensors(), 1);
        assert!(store.is_live(&kept));
        store.dispose(&kept).unwrap();
        assert_eq!(store.num_tensors(), 0);
    }

    #[test]
    fn failure_releases_everything() {
        let store = TensorStore::new();
        let result: Result<()> = store.tidy(|scope| {
            scope.alloc(zeros(1));
            scope.alloc(zeros(1));
            Err(Error::invalid_input("boom"))
        });
        assert!(matches!(result, Err(Error::InvalidInputShape { .. })));
        assert_eq!(store.num_tensors(), 0);
    }

    #[test]
    fn caller_tensors_are_not_released() {
        let store = TensorStore::new();
        let input = store.create(zeros(3));

        let result = store.tidy(|scope| scope.release(&input));
        assert!(matches!(result, Err(Error::ResourceDisposal { .. })));
        assert!(store.is_live(&input));
    }

    #[test]
    fn early_release_then_close() {
        let store = TensorStore::new();
        store
            .tidy(|scope| {
                let a = scope.alloc(zeros(1));
                scope.release(&a)?;
                assert_eq!(scope.num_tracked(), 0);
                assert!(scope.release(&a).is_err());
                Ok(())
            })
            .unwrap();
        assert_eq!(store.num_tensors(), 0);
    }

    #[test]
    fn close_reports_externally_disposed_tensor() {
        let store = TensorStore::new();
        let result = store.tidy(|scope| {
            let a = scope.alloc(zeros(1));
            scope.alloc(zeros(1));
            // Released behind the scope's back.
            scope.store().dispose(&a)?;
            Ok(())
        });
        assert!(matches!(result, Err(Error::ResourceDisposal { .. })));
        assert_eq!(store.num_tensors(), 0);
    }

    #[test]
    fn drop_releases_on_panic() {
        let store = TensorStore::new();
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let mut scope = Scope::new(&store);
            scope.alloc(zeros(8));
            panic!("stage failed");
        }));
        assert!(outcome.is_err());
        assert_eq!(store.num_tensors(), 0);
    }
}
