use std::collections::HashMap;

/// Handle for one outstanding request; compare it back with [`RequestSequencer::accept`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ticket {
    pub key: String,
    pub seq: u64,
}

/// Discards responses that were superseded by a newer request for the same key,
/// e.g. a slow file read arriving after the user already opened another file.
#[derive(Debug, Default)]
pub struct RequestSequencer {
    next: u64,
    latest: HashMap<String, u64>,
}

impl RequestSequencer {
    pub fn issue(&mut self, key: impl Into<String>) -> Ticket {
        self.next += 1;
        let key = key.into();
        self.latest.insert(key.clone(), self.next);
        Ticket {
            key,
            seq: self.next,
        }
    }

    /// True only for the newest ticket of its key. Accepting retires the key.
    pub fn accept(&mut self, ticket: &Ticket) -> bool {
        match self.latest.get(&ticket.key) {
            Some(&seq) if seq == ticket.seq => {
                self.latest.remove(&ticket.key);
                true
            }
            _ => {
                tracing::debug!(key = %ticket.key, seq = ticket.seq, "discarding stale response");
                false
            }
        }
    }

    pub fn is_pending(&self, key: &str) -> bool {
        self.latest.contains_key(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stale_tickets_are_rejected() {
        let mut sequencer = RequestSequencer::default();
        let first = sequencer.issue("open");
        let second = sequencer.issue("open");
        let other = sequencer.issue("tree");

        assert!(!sequencer.accept(&first));
        assert!(sequencer.accept(&second));
        assert!(!sequencer.accept(&second));
        assert!(sequencer.is_pending("tree"));
        assert!(sequencer.accept(&other));
        assert!(!sequencer.is_pending("tree"));
    }
}
