//! Request/response correlation by action tag
//!
//! A caller that expects an answer registers the action tag of its request
//! before pushing it. When a session later sends a message carrying the same
//! action tag, the read loop resolves the waiter with that message.

use crate::traits::{Message, Result, WsHubError};
use parking_lot::Mutex;
use std::collections::HashMap;
use tokio::sync::oneshot;

/// Waiters keyed by action tag
#[derive(Default)]
pub struct PendingReplies {
    waiters: Mutex<HashMap<String, oneshot::Sender<Message>>>,
}

impl PendingReplies {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a waiter for `action`
    ///
    /// Fails if another request with the same tag is still pending.
    pub fn register(&self, action: &str) -> Result<oneshot::Receiver<Message>> {
        let mut waiters = self.waiters.lock();
        if waiters.contains_key(action) {
            return Err(WsHubError::Other(format!(
                "a request with action '{}' is already pending",
                action
            )));
        }
        let (tx, rx) = oneshot::channel();
        waiters.insert(action.to_string(), tx);
        Ok(rx)
    }

    /// Hand `message` to the waiter registered for its action tag
    ///
    /// Returns `true` if a waiter took the message.
    pub fn resolve(&self, message: Message) -> bool {
        if message.action.is_empty() {
            return false;
        }
        let waiter = self.waiters.lock().remove(&message.action);
        match waiter {
            Some(tx) => tx.send(message).is_ok(),
            None => false,
        }
    }

    /// Drop the waiter for `action`, if any
    pub fn cancel(&self, action: &str) {
        self.waiters.lock().remove(action);
    }

    pub fn len(&self) -> usize {
        self.waiters.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_resolve_by_action() {
        let pending = PendingReplies::new();
        let rx = pending.register("482913").unwrap();

        let reply = Message::targeted("client-1", ["hub"], "ok").with_action("482913");
        assert!(pending.resolve(reply.clone()));
        assert_eq!(rx.await.unwrap(), reply);
        assert!(pending.is_empty());
    }

    #[test]
    fn test_unmatched_messages_are_ignored() {
        let pending = PendingReplies::new();
        let _rx = pending.register("a").unwrap();
        assert!(!pending.resolve(Message::broadcast("x", "y").with_action("b")));
        assert!(!pending.resolve(Message::broadcast("x", "y")));
        assert_eq!(pending.len(), 1);
    }

    #[test]
    fn test_duplicate_tag_rejected() {
        let pending = PendingReplies::new();
        let _rx = pending.register("a").unwrap();
        assert!(pending.register("a").is_err());
        pending.cancel("a");
        assert!(pending.register("a").is_ok());
    }
}
