//! Credential lookup.
//!
//! Two disjoint sources answer "who is this email": the fixed built-in
//! accounts and the registration registry. `lookup` consults them in order and
//! stops at the first source that knows the email, so a registration can never
//! shadow a built-in account.

use crate::model::{Role, Status, UsageStats, User};
use crate::registry::Registry;
use crate::store::KeyValueStore;
use anyhow::Result;
use once_cell::sync::Lazy;

/// What a source knows about an email/password pair
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup {
    /// Credentials accepted; this is the session user
    Granted(User),
    /// Email known but the registration has not been reviewed
    Pending,
    /// Email known and the registration was rejected
    Rejected,
    /// Email known to this source but the password is wrong
    WrongPassword,
    /// This source has never heard of the email
    Unknown,
}

/// A place credentials can be checked against
pub trait CredentialSource {
    fn name(&self) -> &'static str;

    fn lookup(&self, email: &str, password: &str) -> Result<Lookup>;

    /// The password this source keeps for the account behind `user`, if any.
    /// Accounts are matched by id, which profile edits never change.
    fn known_password(&self, user: &User) -> Option<&str>;
}

struct BuiltinAccount {
    password: &'static str,
    user: User,
}

static BUILTIN_ACCOUNTS: Lazy<Vec<BuiltinAccount>> = Lazy::new(|| {
    vec![
        BuiltinAccount {
            password: "admin",
            user: User {
                id: "admin-123".to_string(),
                name: "Admin User".to_string(),
                email: "admin@example.com".to_string(),
                role: Role::Admin,
                status: Status::Approved,
                avatar: None,
                stats: UsageStats::default(),
            },
        },
        BuiltinAccount {
            password: "password",
            user: User {
                id: "user-123".to_string(),
                name: "Demo User".to_string(),
                email: "demo@example.com".to_string(),
                role: Role::User,
                status: Status::Approved,
                avatar: None,
                stats: UsageStats {
                    total_detections: 152,
                    most_common_object: "person".to_string(),
                    detection_accuracy: 94.7,
                    recent_uploads: 12,
                },
            },
        },
    ]
});

/// The fixed admin and demo accounts
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinAccounts;

impl BuiltinAccounts {
    pub fn contains(email: &str) -> bool {
        BUILTIN_ACCOUNTS.iter().any(|a| a.user.email == email)
    }
}

impl CredentialSource for BuiltinAccounts {
    fn name(&self) -> &'static str {
        "builtin"
    }

    fn lookup(&self, email: &str, password: &str) -> Result<Lookup> {
        let outcome = match BUILTIN_ACCOUNTS.iter().find(|a| a.user.email == email) {
            Some(account) if account.password == password => Lookup::Granted(account.user.clone()),
            Some(_) => Lookup::WrongPassword,
            None => Lookup::Unknown,
        };
        Ok(outcome)
    }

    fn known_password(&self, user: &User) -> Option<&str> {
        BUILTIN_ACCOUNTS
            .iter()
            .find(|a| a.user.id == user.id)
            .map(|a| a.password)
    }
}

/// Registrations from the registry. Their passwords are never stored, so an
/// approved registration is granted on email alone.
pub struct RegistryAccounts<'a> {
    registry: Registry<'a>,
}

impl<'a> RegistryAccounts<'a> {
    pub fn new(store: &'a dyn KeyValueStore) -> Self {
        Self {
            registry: Registry::new(store),
        }
    }
}

impl CredentialSource for RegistryAccounts<'_> {
    fn name(&self) -> &'static str {
        "registry"
    }

    fn lookup(&self, email: &str, _password: &str) -> Result<Lookup> {
        let outcome = match self.registry.find_by_email(email)? {
            None => Lookup::Unknown,
            Some(entry) => match entry.status {
                Status::Pending => Lookup::Pending,
                Status::Rejected => Lookup::Rejected,
                Status::Approved => Lookup::Granted(entry.to_session_user()),
            },
        };
        Ok(outcome)
    }

    fn known_password(&self, _user: &User) -> Option<&str> {
        None
    }
}

/// Ask each source in order; the first one that knows the email decides
pub fn lookup(sources: &[&dyn CredentialSource], email: &str, password: &str) -> Result<Lookup> {
    for source in sources {
        match source.lookup(email, password)? {
            Lookup::Unknown => continue,
            found => return Ok(found),
        }
    }
    Ok(Lookup::Unknown)
}

/// The password any source keeps for `user`'s account
pub fn known_password<'s>(sources: &[&'s dyn CredentialSource], user: &User) -> Option<&'s str> {
    sources.iter().find_map(|s| s.known_password(user))
}
