//! Inbound message dispatch.
//!
//! One handler per message tag, registered before the session starts. This
//! replaces the per-event settable listener fields of older designs with a
//! single typed table: embedders register closures for the tags they care
//! about and everything else is logged and skipped without touching stream
//! synchronization (the frame was already fully consumed).

use crate::protocol::messages::Message;
use std::collections::HashMap;

/// Handler invoked with each decoded message for its tag
pub type MessageHandler = Box<dyn Fn(Message) + Send + Sync>;

/// Typed dispatch table keyed by message tag
#[derive(Default)]
pub struct Dispatcher {
    handlers: HashMap<u8, MessageHandler>,
}

impl Dispatcher {
    /// Create an empty dispatch table
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the handler for `tag`, replacing any previous one.
    ///
    /// Builder-style so tables read as a declaration:
    ///
    /// ```
    /// use setu_link::session::Dispatcher;
    /// use setu_link::protocol::messages::{Message, TAG_MOTOR_STATE};
    ///
    /// let dispatcher = Dispatcher::new().on(TAG_MOTOR_STATE, |message| {
    ///     if let Message::Motor(state) = message {
    ///         println!("duty: {}", state.left_forward);
    ///     }
    /// });
    /// # let _ = dispatcher;
    /// ```
    pub fn on<F>(mut self, tag: u8, handler: F) -> Self
    where
        F: Fn(Message) + Send + Sync + 'static,
    {
        self.handlers.insert(tag, Box::new(handler));
        self
    }

    /// Run `before` ahead of the registered handler for `tag`.
    ///
    /// Used by the robot role to apply a received settings copy to ground
    /// truth before the embedder's own handler observes it. The embedder's
    /// handler (if any) still runs afterwards.
    pub fn intercept<F>(&mut self, tag: u8, before: F)
    where
        F: Fn(&Message) + Send + Sync + 'static,
    {
        let previous = self.handlers.remove(&tag);
        let chained: MessageHandler = match previous {
            Some(handler) => Box::new(move |message: Message| {
                before(&message);
                handler(message);
            }),
            None => Box::new(move |message: Message| before(&message)),
        };
        self.handlers.insert(tag, chained);
    }

    /// Dispatch a decoded message to its handler, if one is registered.
    pub fn dispatch(&self, message: Message) {
        match self.handlers.get(&message.tag()) {
            Some(handler) => handler(message),
            None => log::debug!("No handler registered for tag {:#04x}", message.tag()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::messages::{MotorState, TAG_MOTOR_STATE, TAG_SETTINGS};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicI32, AtomicUsize, Ordering};

    fn motor(value: i32) -> Message {
        Message::Motor(MotorState {
            timestamp_ms: 0,
            left_forward: value,
            left_backward: 0,
            right_forward: 0,
            right_backward: 0,
        })
    }

    #[test]
    fn test_dispatch_by_tag() {
        let seen = Arc::new(AtomicI32::new(0));
        let seen_clone = Arc::clone(&seen);
        let dispatcher = Dispatcher::new().on(TAG_MOTOR_STATE, move |message| {
            if let Message::Motor(state) = message {
                seen_clone.store(state.left_forward, Ordering::SeqCst);
            }
        });

        dispatcher.dispatch(motor(42));
        assert_eq!(seen.load(Ordering::SeqCst), 42);
    }

    #[test]
    fn test_unhandled_tag_is_ignored() {
        // No handler for settings: must not panic, just skip
        let dispatcher = Dispatcher::new();
        dispatcher.dispatch(motor(1));
        let _ = TAG_SETTINGS;
    }

    #[test]
    fn test_intercept_runs_before_handler() {
        let order = Arc::new(AtomicUsize::new(0));

        let handler_order = Arc::clone(&order);
        let mut dispatcher = Dispatcher::new().on(TAG_MOTOR_STATE, move |_| {
            // Handler must observe the interceptor's effect
            assert_eq!(handler_order.fetch_add(1, Ordering::SeqCst), 1);
        });

        let intercept_order = Arc::clone(&order);
        dispatcher.intercept(TAG_MOTOR_STATE, move |_| {
            assert_eq!(intercept_order.fetch_add(1, Ordering::SeqCst), 0);
        });

        dispatcher.dispatch(motor(1));
        assert_eq!(order.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_intercept_without_handler() {
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = Arc::clone(&count);

        let mut dispatcher = Dispatcher::new();
        dispatcher.intercept(TAG_MOTOR_STATE, move |_| {
            count_clone.fetch_add(1, Ordering::SeqCst);
        });

        dispatcher.dispatch(motor(1));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
