use std::collections::HashMap;

use chatline_proto::PresenceUpdate;

/// Every user this client has ever heard about, with their latest online
/// flag. Users who log out stay listed as offline; nothing is removed.
#[derive(Debug, Default)]
pub struct PresenceStore {
    by_name: HashMap<String, bool>,
    ordered: Option<Vec<PresenceUpdate>>,
}

impl PresenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_one(&mut self, username: impl Into<String>, online: bool) {
        self.by_name.insert(username.into(), online);
        self.ordered = None;
    }

    pub fn set_many(&mut self, batch: impl IntoIterator<Item = PresenceUpdate>) {
        for entry in batch {
            self.set_one(entry.username, entry.online);
        }
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    /// Online users first, then offline, each group sorted by name.
    pub fn snapshot(&mut self) -> &[PresenceUpdate] {
        if self.ordered.is_none() {
            let mut ordered: Vec<PresenceUpdate> = self
                .by_name
                .iter()
                .map(|(username, online)| PresenceUpdate {
                    username: username.clone(),
                    online: *online,
                })
                .collect();
            ordered.sort_by(|a, b| {
                b.online
                    .cmp(&a.online)
                    .then_with(|| a.username.cmp(&b.username))
            });
            self.ordered = Some(ordered);
        }
        self.ordered.as_deref().unwrap_or(&[])
    }
}
