//! Per-kind handler registry for inbound envelopes.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

use crate::message::{Envelope, MessageKind};

/// Handler invoked for every inbound envelope of a registered kind.
pub type KindHandler = Arc<dyn Fn(&Envelope) + Send + Sync>;

/// Routes inbound envelopes to handlers registered by message kind.
///
/// Envelopes of kinds with no registered handler are dropped silently, so
/// newer server builds can ship kinds this client does not care about.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: DashMap<MessageKind, Vec<KindHandler>>,
}

impl HandlerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for a message kind. Multiple handlers per kind
    /// are invoked in registration order.
    pub fn register<F>(&self, kind: MessageKind, handler: F)
    where
        F: Fn(&Envelope) + Send + Sync + 'static,
    {
        self.handlers.entry(kind).or_default().push(Arc::new(handler));
    }

    /// Dispatch an envelope, returning how many handlers ran.
    pub fn dispatch(&self, envelope: &Envelope) -> usize {
        let handlers = match self.handlers.get(&envelope.kind) {
            Some(entry) => entry.value().clone(),
            None => {
                debug!(kind = %envelope.kind, "no handler registered, envelope dropped");
                return 0;
            }
        };
        for handler in &handlers {
            handler(envelope);
        }
        handlers.len()
    }

    /// Number of handlers registered for a kind.
    pub fn handler_count(&self, kind: &MessageKind) -> usize {
        self.handlers.get(kind).map(|entry| entry.value().len()).unwrap_or(0)
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry").field("kinds", &self.handlers.len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_dispatches_to_matching_kind_only() {
        let registry = HandlerRegistry::new();
        let chats = Arc::new(AtomicUsize::new(0));

        let seen = chats.clone();
        registry.register(MessageKind::Chat, move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(registry.dispatch(&Envelope::of(MessageKind::Chat)), 1);
        assert_eq!(registry.dispatch(&Envelope::of(MessageKind::Notification)), 0);
        assert_eq!(chats.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_multiple_handlers_run_in_registration_order() {
        let registry = HandlerRegistry::new();
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));

        for tag in ["first", "second"] {
            let order = order.clone();
            registry.register(MessageKind::System, move |_| {
                order.lock().unwrap().push(tag);
            });
        }

        registry.dispatch(&Envelope::of(MessageKind::System));
        assert_eq!(*order.lock().unwrap(), vec!["first", "second"]);
        assert_eq!(registry.handler_count(&MessageKind::System), 2);
    }

    #[test]
    fn test_unknown_kind_dispatch_is_a_no_op() {
        let registry = HandlerRegistry::new();
        let envelope = Envelope::of(MessageKind::Unknown("mystery".to_string()));
        assert_eq!(registry.dispatch(&envelope), 0);
    }
}
