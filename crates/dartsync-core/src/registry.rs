// ── Push registration bookkeeping ──
//
// Every callback a coordinator registers on its entity is owned by a
// `HandleRegistry`. Closing the registry unsubscribes each handle exactly
// once; closing again is a no-op. `RegistrationScope` stages handles around
// a transport-open region and only hands them to the registry on commit.

use dartsync_api::CallbackHandle;

/// Owned set of live push registrations.
#[derive(Debug, Default)]
pub struct HandleRegistry {
    handles: Vec<CallbackHandle>,
}

impl HandleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, handle: CallbackHandle) {
        self.handles.push(handle);
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Unsubscribe and drop every handle. Returns how many were still live.
    pub fn close(&mut self) -> usize {
        self.handles
            .drain(..)
            .filter(CallbackHandle::unsubscribe)
            .count()
    }

    /// Stage registrations that only count once [`RegistrationScope::commit`] runs.
    pub fn scope(&mut self) -> RegistrationScope<'_> {
        RegistrationScope {
            registry: self,
            staged: Vec::new(),
        }
    }
}

impl Drop for HandleRegistry {
    fn drop(&mut self) {
        self.close();
    }
}

/// Registrations made while opening a transport.
///
/// Dropped without [`commit`](Self::commit) (an early `?`, a failed open),
/// every staged handle is unsubscribed.
#[derive(Debug)]
pub struct RegistrationScope<'a> {
    registry: &'a mut HandleRegistry,
    staged: Vec<CallbackHandle>,
}

impl RegistrationScope<'_> {
    pub fn stage(&mut self, handle: CallbackHandle) {
        self.staged.push(handle);
    }

    pub fn staged(&self) -> usize {
        self.staged.len()
    }

    /// Move staged handles into the registry.
    pub fn commit(mut self) {
        let staged = std::mem::take(&mut self.staged);
        self.registry.handles.extend(staged);
    }
}

impl Drop for RegistrationScope<'_> {
    fn drop(&mut self) {
        for handle in self.staged.drain(..) {
            handle.unsubscribe();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use dartsync_api::{CallbackTable, EventFilter};

    use super::*;

    fn register(table: &CallbackTable) -> CallbackHandle {
        table.register(EventFilter::State, Arc::new(|_| {}))
    }

    #[test]
    fn close_is_idempotent() {
        let table = CallbackTable::new();
        let mut registry = HandleRegistry::new();
        registry.push(register(&table));
        registry.push(register(&table));

        assert_eq!(registry.close(), 2);
        assert_eq!(registry.close(), 0);
        assert!(registry.is_empty());
        assert!(table.is_empty());
    }

    #[test]
    fn uncommitted_scope_unsubscribes() {
        let table = CallbackTable::new();
        let mut registry = HandleRegistry::new();
        {
            let mut scope = registry.scope();
            scope.stage(register(&table));
            scope.stage(register(&table));
            assert_eq!(scope.staged(), 2);
        }
        assert!(registry.is_empty());
        assert!(table.is_empty());
    }

    #[test]
    fn committed_scope_hands_over() {
        let table = CallbackTable::new();
        let mut registry = HandleRegistry::new();
        let mut scope = registry.scope();
        scope.stage(register(&table));
        scope.commit();

        assert_eq!(registry.len(), 1);
        assert_eq!(table.len(), 1);

        drop(registry);
        assert!(table.is_empty());
    }
}
