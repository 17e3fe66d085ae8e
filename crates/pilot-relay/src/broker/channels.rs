//! Channel name to member set.

use std::collections::{HashMap, HashSet};

use parking_lot::Mutex;
use pilot_core::ConnectionId;

/// Channel membership.
///
/// Channels exist only while they have members: the first join creates one
/// and the last leave removes it.
#[derive(Debug, Default)]
pub struct ChannelRegistry {
    channels: Mutex<HashMap<String, HashSet<ConnectionId>>>,
}

impl ChannelRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `id` to `channel`. Returns `false` if it was already a member.
    pub fn join(&self, channel: &str, id: &ConnectionId) -> bool {
        self.channels
            .lock()
            .entry(channel.to_owned())
            .or_default()
            .insert(id.clone())
    }

    /// Remove `id` from `channel`, dropping the channel once empty.
    /// Returns `false` if it was not a member.
    pub fn leave(&self, channel: &str, id: &ConnectionId) -> bool {
        let mut channels = self.channels.lock();
        let Some(members) = channels.get_mut(channel) else {
            return false;
        };
        let removed = members.remove(id);
        if members.is_empty() {
            let _ = channels.remove(channel);
        }
        removed
    }

    /// Members of `channel`, empty if it does not exist.
    pub fn members(&self, channel: &str) -> Vec<ConnectionId> {
        self.channels
            .lock()
            .get(channel)
            .map(|m| m.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of members in `channel`.
    pub fn member_count(&self, channel: &str) -> usize {
        self.channels.lock().get(channel).map_or(0, HashSet::len)
    }

    /// Whether `channel` currently exists.
    pub fn contains(&self, channel: &str) -> bool {
        self.channels.lock().contains_key(channel)
    }

    /// Sorted channel names.
    pub fn channel_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.channels.lock().keys().cloned().collect();
        names.sort_unstable();
        names
    }

    /// Number of channels.
    pub fn len(&self) -> usize {
        self.channels.lock().len()
    }

    /// Whether no channel exists.
    pub fn is_empty(&self) -> bool {
        self.channels.lock().is_empty()
    }
}
