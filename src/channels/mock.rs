//! In-memory platform stub for unit tests.

use crate::channels::types::{ChatPlatform, Destination};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// Records every outbound message and serves a configurable destination
/// list, so tests can assert on exactly what was delivered where.
pub struct MockPlatform {
    destinations: Mutex<Vec<Destination>>,
    sent: Mutex<Vec<(String, String)>>,
    fail_sends: AtomicBool,
}

impl MockPlatform {
    pub fn new(destinations: Vec<Destination>) -> Self {
        Self {
            destinations: Mutex::new(destinations),
            sent: Mutex::new(Vec::new()),
            fail_sends: AtomicBool::new(false),
        }
    }

    /// (destination_id, text) pairs in send order.
    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn set_destinations(&self, destinations: Vec<Destination>) {
        *self.destinations.lock().unwrap() = destinations;
    }

    pub fn set_fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl ChatPlatform for MockPlatform {
    async fn list_destinations(&self) -> Result<Vec<Destination>, String> {
        Ok(self.destinations.lock().unwrap().clone())
    }

    async fn send_message(&self, destination_id: &str, text: &str) -> Result<(), String> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err("mock send failure".to_string());
        }
        self.sent
            .lock()
            .unwrap()
            .push((destination_id.to_string(), text.to_string()));
        Ok(())
    }
}

/// Convenience for tests: a destination with matching id and name fields.
pub fn destination(id: &str, name: &str) -> Destination {
    Destination {
        id: id.to_string(),
        name: name.to_string(),
    }
}
