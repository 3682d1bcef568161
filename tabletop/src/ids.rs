//! Deterministic entity id generation.
//!
//! Ids are `<owner>:<prefix>-<n>` where `owner` is the local participant id
//! and `n` a per-generator counter, so two clients never mint the same id and
//! replays in tests are reproducible.

#[cfg(test)]
#[path = "ids_test.rs"]
mod ids_test;

use crate::doc::EntityId;

#[derive(Debug, Clone)]
pub struct IdGen {
    owner: String,
    counter: u64,
}

impl IdGen {
    #[must_use]
    pub fn new(owner: impl Into<String>) -> Self {
        Self { owner: owner.into(), counter: 0 }
    }

    /// Continue numbering after `counter`, e.g. when resuming from a save.
    #[must_use]
    pub fn starting_at(owner: impl Into<String>, counter: u64) -> Self {
        Self { owner: owner.into(), counter }
    }

    /// Mint the next id with the given kind prefix (`"token"`, `"fog"`, ...).
    pub fn next(&mut self, prefix: &str) -> EntityId {
        self.counter += 1;
        format!("{}:{prefix}-{}", self.owner, self.counter)
    }

    /// Number of ids minted so far.
    #[must_use]
    pub fn counter(&self) -> u64 {
        self.counter
    }

    /// Move the counter past `id` if this generator could have minted it.
    /// A restarted client or a second connection under the same owner then
    /// never reissues an id already in the session.
    pub fn observe(&mut self, id: &str) {
        let Some((_, n)) = id
            .strip_prefix(self.owner.as_str())
            .and_then(|rest| rest.strip_prefix(':'))
            .and_then(|local| local.rsplit_once('-'))
        else {
            return;
        };
        if let Ok(n) = n.parse::<u64>()
            && n > self.counter
        {
            self.counter = n;
        }
    }
}
