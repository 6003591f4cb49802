//! Self-service registrations and their review status.

use crate::error::AuthError;
use crate::model::{Decision, PendingUser, Status};
use crate::notifications::NotificationLog;
use crate::store::{read_json, write_json, KeyValueStore, PENDING_USERS_KEY};
use anyhow::{Context, Result};

/// Totals per status, for the admin summary
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusCounts {
    pub pending: usize,
    pub approved: usize,
    pub rejected: usize,
}

pub struct Registry<'a> {
    store: &'a dyn KeyValueStore,
}

impl<'a> Registry<'a> {
    pub fn new(store: &'a dyn KeyValueStore) -> Self {
        Self { store }
    }

    /// All registrations in the order they were submitted
    pub fn list(&self) -> Result<Vec<PendingUser>> {
        read_json(self.store, PENDING_USERS_KEY)
    }

    pub fn with_status(&self, status: Status) -> Result<Vec<PendingUser>> {
        Ok(self
            .list()?
            .into_iter()
            .filter(|u| u.status == status)
            .collect())
    }

    pub fn get(&self, id: &str) -> Result<Option<PendingUser>> {
        Ok(self.list()?.into_iter().find(|u| u.id == id))
    }

    /// First registration with this email, in submission order
    pub fn find_by_email(&self, email: &str) -> Result<Option<PendingUser>> {
        Ok(self.list()?.into_iter().find(|u| u.email == email))
    }

    pub fn counts(&self) -> Result<StatusCounts> {
        let mut counts = StatusCounts::default();
        for user in self.list()? {
            match user.status {
                Status::Pending => counts.pending += 1,
                Status::Approved => counts.approved += 1,
                Status::Rejected => counts.rejected += 1,
            }
        }
        Ok(counts)
    }

    /// Append a new `pending` registration
    pub fn register(&self, name: &str, email: &str) -> Result<PendingUser> {
        let user = PendingUser::new(name, email);
        let mut all = self.list()?;
        all.push(user.clone());
        write_json(self.store, PENDING_USERS_KEY, &all)?;
        Ok(user)
    }

    /// Move a pending registration to `approved` or `rejected` and record
    /// the decision in the notification log.
    ///
    /// Only `pending` entries can be decided; unknown ids and re-decisions are
    /// refused before anything is written. If the notification cannot be
    /// recorded the registry is written back as it was, so the entry stays
    /// `pending` and the decision can be retried.
    pub fn set_status(&self, id: &str, decision: Decision) -> Result<Vec<PendingUser>> {
        let previous = self.list()?;
        let mut all = previous.clone();
        let entry = all
            .iter_mut()
            .find(|u| u.id == id)
            .ok_or_else(|| AuthError::UnknownUser(id.to_string()))?;

        if entry.status != Status::Pending {
            return Err(AuthError::AlreadyDecided {
                id: id.to_string(),
                status: entry.status.to_string(),
            }
            .into());
        }

        entry.status = decision.as_status();
        let message = format!("User {} has been {}", entry.name, decision);
        write_json(self.store, PENDING_USERS_KEY, &all)?;

        if let Err(e) = NotificationLog::new(self.store).record(id, decision, message) {
            write_json(self.store, PENDING_USERS_KEY, &previous)
                .context("restoring registrations after a failed notification")?;
            return Err(e);
        }
        Ok(all)
    }

    /// Drop a registration entirely; unknown ids leave the registry unchanged
    pub fn remove(&self, id: &str) -> Result<Vec<PendingUser>> {
        let mut all = self.list()?;
        all.retain(|u| u.id != id);
        write_json(self.store, PENDING_USERS_KEY, &all)?;
        Ok(all)
    }
}
