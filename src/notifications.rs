//! Append-only log of approval decisions shown to admins.
//!
//! Entries are kept newest first. Nothing is ever evicted; the log grows for
//! as long as the data directory lives.

use crate::model::{Decision, Notification};
use crate::store::{read_json, write_json, KeyValueStore, NOTIFICATIONS_KEY};
use anyhow::Result;

pub struct NotificationLog<'a> {
    store: &'a dyn KeyValueStore,
}

impl<'a> NotificationLog<'a> {
    pub fn new(store: &'a dyn KeyValueStore) -> Self {
        Self { store }
    }

    pub fn list(&self) -> Result<Vec<Notification>> {
        read_json(self.store, NOTIFICATIONS_KEY)
    }

    /// Prepend a new unread entry
    pub fn record(&self, user_id: &str, kind: Decision, message: String) -> Result<Notification> {
        let notification = Notification::new(user_id, kind, message);
        let mut all = self.list()?;
        all.insert(0, notification.clone());
        write_json(self.store, NOTIFICATIONS_KEY, &all)?;
        Ok(notification)
    }

    /// Mark one entry read; unknown ids leave the log unchanged
    pub fn mark_read(&self, id: &str) -> Result<Vec<Notification>> {
        let mut all = self.list()?;
        for n in all.iter_mut().filter(|n| n.id == id) {
            n.read = true;
        }
        write_json(self.store, NOTIFICATIONS_KEY, &all)?;
        Ok(all)
    }

    pub fn mark_all_read(&self) -> Result<Vec<Notification>> {
        let mut all = self.list()?;
        for n in all.iter_mut() {
            n.read = true;
        }
        write_json(self.store, NOTIFICATIONS_KEY, &all)?;
        Ok(all)
    }

    pub fn unread_count(&self) -> Result<usize> {
        Ok(self.list()?.iter().filter(|n| !n.read).count())
    }

    /// The `n` newest entries
    pub fn recent(&self, n: usize) -> Result<Vec<Notification>> {
        let mut all = self.list()?;
        all.truncate(n);
        Ok(all)
    }
}
