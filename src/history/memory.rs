//! In-memory history stack.

use parking_lot::{Mutex, RwLock};

use super::{ChangeListener, History, TokenProducer};

#[derive(Debug)]
struct Stack {
    entries: Vec<String>,
    cursor: usize,
}

impl Stack {
    fn current(&self) -> &str {
        self.entries.get(self.cursor).map_or("", String::as_str)
    }

    /// Append after the cursor; forward entries are dropped.
    fn push(&mut self, token: String) {
        self.entries.truncate(self.cursor + 1);
        self.entries.push(token);
        self.cursor = self.entries.len() - 1;
    }
}

/// Back/forward stack with a cursor, behaving like a browser session.
pub struct MemoryHistory {
    stack: Mutex<Stack>,
    listener: RwLock<Option<ChangeListener>>,
}

impl Default for MemoryHistory {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryHistory {
    /// Empty history; the initial location is the empty token.
    pub fn new() -> Self {
        Self::with_location("")
    }

    /// History whose initial entry is `token` (e.g. a deep link).
    pub fn with_location(token: impl Into<String>) -> Self {
        Self {
            stack: Mutex::new(Stack {
                entries: vec![token.into()],
                cursor: 0,
            }),
            listener: RwLock::new(None),
        }
    }

    /// All entries, oldest first.
    pub fn entries(&self) -> Vec<String> {
        self.stack.lock().entries.clone()
    }

    pub fn cursor(&self) -> usize {
        self.stack.lock().cursor
    }

    pub fn can_go_back(&self) -> bool {
        self.stack.lock().cursor > 0
    }

    pub fn can_go_forward(&self) -> bool {
        let stack = self.stack.lock();
        stack.cursor + 1 < stack.entries.len()
    }

    /// Move one entry back and notify the listener. Returns the new location.
    pub fn back(&self) -> Option<String> {
        let token = {
            let mut stack = self.stack.lock();
            if stack.cursor == 0 {
                return None;
            }
            stack.cursor -= 1;
            stack.current().to_string()
        };
        log::debug!("History back to '{}'", token);
        self.notify(&token);
        Some(token)
    }

    /// Move one entry forward and notify the listener.
    pub fn forward(&self) -> Option<String> {
        let token = {
            let mut stack = self.stack.lock();
            if stack.cursor + 1 >= stack.entries.len() {
                return None;
            }
            stack.cursor += 1;
            stack.current().to_string()
        };
        log::debug!("History forward to '{}'", token);
        self.notify(&token);
        Some(token)
    }

    /// Simulate the user typing a location: push it and notify the listener.
    pub fn push_external(&self, token: impl Into<String>) {
        let token = token.into();
        self.stack.lock().push(token.clone());
        log::debug!("History external push '{}'", token);
        self.notify(&token);
    }

    fn notify(&self, token: &str) {
        let listener = self.listener.read().clone();
        if let Some(listener) = listener {
            listener(token.to_string());
        }
    }
}

impl History for MemoryHistory {
    fn location(&self) -> String {
        self.stack.lock().current().to_string()
    }

    fn update(&self, producer: TokenProducer) {
        let Some(token) = producer() else {
            return;
        };
        let mut stack = self.stack.lock();
        if stack.current() == token {
            return;
        }
        log::debug!("History push '{}'", token);
        stack.push(token);
    }

    fn set_on_change(&self, listener: Option<ChangeListener>) {
        *self.listener.write() = listener;
    }
}

impl std::fmt::Debug for MemoryHistory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryHistory")
            .field("stack", &*self.stack.lock())
            .field("listening", &self.listener.read().is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn produce(token: &str) -> TokenProducer {
        let token = token.to_string();
        Arc::new(move || Some(token.clone()))
    }

    #[test]
    fn test_update_pushes_distinct_tokens() {
        let history = MemoryHistory::new();
        history.update(produce("product?p=1"));
        history.update(produce("product?p=1"));
        history.update(produce("cart"));
        history.update(Arc::new(|| None));
        assert_eq!(history.entries(), vec!["", "product?p=1", "cart"]);
        assert_eq!(history.location(), "cart");
    }

    #[test]
    fn test_back_forward_and_truncation() {
        let history = MemoryHistory::with_location("root");
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        history.set_on_change(Some(Arc::new(move |token| sink.lock().push(token))));

        history.update(produce("a"));
        history.update(produce("b"));
        assert_eq!(history.back().as_deref(), Some("a"));
        assert_eq!(history.back().as_deref(), Some("root"));
        assert_eq!(history.back(), None);
        assert_eq!(history.forward().as_deref(), Some("a"));
        assert!(history.can_go_forward());

        history.update(produce("c"));
        assert!(!history.can_go_forward());
        assert_eq!(history.entries(), vec!["root", "a", "c"]);
        assert_eq!(*seen.lock(), vec!["a", "root", "a"]);
    }

    #[test]
    fn test_push_external_notifies() {
        let history = MemoryHistory::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        history.set_on_change(Some(Arc::new(move |token| sink.lock().push(token))));
        history.push_external("cart?s=1");
        assert_eq!(history.location(), "cart?s=1");
        assert_eq!(*seen.lock(), vec!["cart?s=1"]);

        history.set_on_change(None);
        history.push_external("login");
        assert_eq!(seen.lock().len(), 1);
    }
}
