use std::sync::{Arc, Mutex, PoisonError};

use sol_session_core::{EventListener, ProviderEvent, Subscription};

/// Event listener set shared by the wallet adapters. Listeners run outside
/// the registry lock so they may call back into the adapter.
#[derive(Clone, Default)]
pub(crate) struct ListenerRegistry {
    inner: Arc<Mutex<Registry>>,
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    listeners: Vec<(u64, EventListener)>,
}

impl ListenerRegistry {
    pub(crate) fn add(&self, listener: EventListener) -> Subscription {
        let id = {
            let mut g = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            let id = g.next_id;
            g.next_id += 1;
            g.listeners.push((id, listener));
            id
        };

        let registry = Arc::downgrade(&self.inner);
        Subscription::new(move || {
            if let Some(registry) = registry.upgrade() {
                registry
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .listeners
                    .retain(|(l, _)| *l != id);
            }
        })
    }

    pub(crate) fn emit(&self, event: ProviderEvent) {
        let listeners: Vec<EventListener> = self
            .inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .listeners
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect();
        for listener in listeners {
            listener(event.clone());
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .listeners
            .len()
    }
}

impl std::fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerRegistry")
            .field("listeners", &self.len())
            .finish()
    }
}
