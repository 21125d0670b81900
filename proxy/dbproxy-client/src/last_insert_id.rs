//! Client-side mirror of the server's auto-increment id

use dbproxy_common::InsertId;
use std::sync::Mutex;

/// Holds the last insert id reported by the proxy server
///
/// Starts out unavailable and only changes when a successful response
/// reports an id.
#[derive(Debug, Default)]
pub struct LastInsertIdCell {
    value: Mutex<InsertId>,
}

impl LastInsertIdCell {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> InsertId {
        self.value
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn set(&self, id: InsertId) {
        *self
            .value
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = id;
    }
}
