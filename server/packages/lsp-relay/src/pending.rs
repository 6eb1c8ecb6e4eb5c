use std::collections::HashMap;

use crate::message::{Method, RequestId};

/// Request id to method, kept only to annotate response logging.
///
/// Entries for requests the server never answers stay for the lifetime of the
/// connection; [`len`](PendingRequests::len) is logged so the growth is visible.
#[derive(Debug, Default)]
pub struct PendingRequests {
    entries: HashMap<RequestId, Method>,
}

impl PendingRequests {
    pub fn record(&mut self, id: RequestId, method: Method) {
        self.entries.insert(id, method);
    }

    /// Removes and returns the method for `id`; a second response for the same id yields `None`.
    pub fn resolve(&mut self, id: &RequestId) -> Option<Method> {
        self.entries.remove(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
