// Verification registry - live join challenges keyed by (chat, user).
//
// Each operation is atomic per key: DashMap holds the shard lock for the
// whole closure, so a check-then-remove cannot interleave with another
// transition on the same key. Closures must stay synchronous and short.

use super::verification_models::{ChallengeKey, ChallengeState};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

/// Whether a mutated entry stays in the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryFate {
    Keep,
    Remove,
}

#[derive(Default)]
pub struct VerificationRegistry {
    entries: DashMap<ChallengeKey, ChallengeState>,
}

impl VerificationRegistry {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Insert `state` unless a challenge for the same key exists.
    /// Returns `true` if the state was inserted.
    pub fn insert_if_absent(&self, state: ChallengeState) -> bool {
        match self.entries.entry(state.key()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(state);
                true
            }
        }
    }

    /// Remove the entry if `predicate` holds for it.
    pub fn remove_if(
        &self,
        key: &ChallengeKey,
        predicate: impl FnOnce(&ChallengeState) -> bool,
    ) -> Option<ChallengeState> {
        self.entries
            .remove_if(key, |_, state| predicate(state))
            .map(|(_, state)| state)
    }

    /// Run `f` on the entry if present; the returned fate decides whether
    /// the entry is kept. Returns `None` if there was no entry.
    pub fn mutate_if_present<R>(
        &self,
        key: &ChallengeKey,
        f: impl FnOnce(&mut ChallengeState) -> (R, EntryFate),
    ) -> Option<R> {
        match self.entries.entry(*key) {
            Entry::Vacant(_) => None,
            Entry::Occupied(mut occupied) => {
                let (result, fate) = f(occupied.get_mut());
                if fate == EntryFate::Remove {
                    occupied.remove();
                }
                Some(result)
            }
        }
    }

    pub fn get(&self, key: &ChallengeKey) -> Option<ChallengeState> {
        self.entries.get(key).map(|entry| entry.clone())
    }

    pub fn contains(&self, key: &ChallengeKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Pending challenges in one chat.
    pub fn count_for_chat(&self, chat_id: u64) -> usize {
        self.entries
            .iter()
            .filter(|entry| entry.key().chat_id == chat_id)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
