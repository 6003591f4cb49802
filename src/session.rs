//! The active session and everything that mutates it.
//!
//! `SessionManager` is the single entry point the CLI talks to: login,
//! signup, profile edits, logout and the admin actions on registrations.
//! The session user is held through a `SessionStore` so the manager never
//! touches ambient storage for it directly.

use crate::audit::AuditLog;
use crate::avatar::Avatar;
use crate::config::AuthConfig;
use crate::credentials::{self, BuiltinAccounts, CredentialSource, Lookup, RegistryAccounts};
use crate::error::AuthError;
use crate::model::{Decision, PendingUser, Status, User};
use crate::notifications::NotificationLog;
use crate::registry::Registry;
use crate::store::{self, read_json, write_json, KeyValueStore, SESSION_KEY};
use anyhow::Result;
use once_cell::sync::Lazy;
use regex::Regex;
use std::cell::RefCell;
use std::time::Duration;

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid email pattern"));

pub const SIGNUP_MESSAGE: &str = "Registration successful. Please wait for admin approval.";
pub const PENDING_NOTICE: &str = "Your account is pending approval. You will be notified via email once an admin reviews your registration.";
pub const REJECTED_NOTICE: &str =
    "Your registration has been rejected. Please contact support for more information.";

/// Holder for the one active session user
pub trait SessionStore {
    fn load(&self) -> Result<Option<User>>;
    fn save(&self, user: &User) -> Result<()>;
    fn clear(&self) -> Result<()>;
}

/// Session persisted under the `user` key, so it survives restarts
pub struct StoredSession<'a> {
    store: &'a dyn KeyValueStore,
}

impl<'a> StoredSession<'a> {
    pub fn new(store: &'a dyn KeyValueStore) -> Self {
        Self { store }
    }
}

impl SessionStore for StoredSession<'_> {
    fn load(&self) -> Result<Option<User>> {
        read_json(self.store, SESSION_KEY)
    }

    fn save(&self, user: &User) -> Result<()> {
        write_json(self.store, SESSION_KEY, user)
    }

    fn clear(&self) -> Result<()> {
        self.store.remove(SESSION_KEY)
    }
}

/// Session that lives only as long as the process
#[derive(Debug, Default)]
pub struct TransientSession {
    user: RefCell<Option<User>>,
}

impl SessionStore for TransientSession {
    fn load(&self) -> Result<Option<User>> {
        Ok(self.user.borrow().clone())
    }

    fn save(&self, user: &User) -> Result<()> {
        *self.user.borrow_mut() = Some(user.clone());
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        *self.user.borrow_mut() = None;
        Ok(())
    }
}

/// Result of a login or signup attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthOutcome {
    pub success: bool,
    pub message: Option<String>,
}

impl AuthOutcome {
    fn ok(message: Option<&str>) -> Self {
        Self {
            success: true,
            message: message.map(str::to_string),
        }
    }

    fn failed(err: AuthError) -> Self {
        Self {
            success: false,
            message: Some(err.to_string()),
        }
    }
}

/// What the current session may see
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Anonymous,
    Pending,
    Rejected,
    Granted,
}

impl Access {
    /// Notice shown instead of the app, if any
    pub fn notice(&self) -> Option<&'static str> {
        match self {
            Access::Anonymous => Some("Please log in."),
            Access::Pending => Some(PENDING_NOTICE),
            Access::Rejected => Some(REJECTED_NOTICE),
            Access::Granted => None,
        }
    }
}

/// Fields submitted by the profile form
#[derive(Debug, Clone, Default)]
pub struct ProfileUpdate {
    pub name: String,
    /// Empty keeps the current email
    pub email: String,
    /// Stored avatar string; `None` clears it
    pub avatar: Option<String>,
    pub current_password: String,
    /// Empty means the password is not being changed
    pub new_password: String,
}

pub struct SessionManager<'a> {
    store: &'a dyn KeyValueStore,
    session: Box<dyn SessionStore + 'a>,
    user: Option<User>,
    config: AuthConfig,
    audit: Option<AuditLog>,
    audit_failures: usize,
    debug: bool,
}

impl<'a> SessionManager<'a> {
    /// Seed the registry documents and restore any saved session
    pub fn new(
        store: &'a dyn KeyValueStore,
        session: Box<dyn SessionStore + 'a>,
        config: AuthConfig,
    ) -> Result<Self> {
        store::initialize(store)?;
        let user = session.load()?;
        Ok(Self {
            store,
            session,
            user,
            config,
            audit: None,
            audit_failures: 0,
            debug: false,
        })
    }

    pub fn with_audit(mut self, audit: AuditLog) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Report audit write failures on stderr
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn registry(&self) -> Registry<'a> {
        Registry::new(self.store)
    }

    pub fn notifications(&self) -> NotificationLog<'a> {
        NotificationLog::new(self.store)
    }

    pub fn current_user(&self) -> Option<&User> {
        self.user.as_ref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.user.is_some()
    }

    pub fn access(&self) -> Access {
        match self.user.as_ref().map(|u| u.status) {
            None => Access::Anonymous,
            Some(Status::Pending) => Access::Pending,
            Some(Status::Rejected) => Access::Rejected,
            Some(Status::Approved) => Access::Granted,
        }
    }

    pub fn require_admin(&self) -> Result<&User, AuthError> {
        match &self.user {
            None => Err(AuthError::NotAuthenticated),
            Some(user) if user.is_admin() => Ok(user),
            Some(_) => Err(AuthError::Forbidden),
        }
    }

    fn pause(&self) {
        if self.config.delay_ms > 0 {
            std::thread::sleep(Duration::from_millis(self.config.delay_ms));
        }
    }

    /// Write an audit event if auditing is on. A failed write never fails
    /// the action being audited; it is counted and shown under `--debug`.
    pub fn audit(&mut self, f: impl FnOnce(&mut AuditLog) -> Result<()>) {
        if let Some(audit) = self.audit.as_mut() {
            if let Err(e) = f(audit) {
                self.audit_failures += 1;
                if self.debug {
                    eprintln!("[DEBUG] Audit write to {} failed: {}", audit.path.display(), e);
                }
            }
        }
    }

    /// Audit events that could not be written this run
    pub fn audit_failures(&self) -> usize {
        self.audit_failures
    }

    /// Check credentials against the built-in accounts, then the registry
    pub fn login(&mut self, email: &str, password: &str) -> Result<AuthOutcome> {
        self.pause();

        let builtin = BuiltinAccounts;
        let registry = RegistryAccounts::new(self.store);
        let sources: [&dyn CredentialSource; 2] = [&builtin, &registry];

        let err = match credentials::lookup(&sources, email, password)? {
            Lookup::Granted(user) => {
                self.session.save(&user)?;
                let (id, role) = (user.id.clone(), user.role.as_str());
                self.user = Some(user);
                self.audit(|a| a.login_ok(&id, email, role));
                return Ok(AuthOutcome::ok(None));
            }
            Lookup::Pending => AuthError::Pending,
            Lookup::Rejected => AuthError::Rejected,
            Lookup::WrongPassword | Lookup::Unknown => AuthError::InvalidCredentials,
        };

        let reason = err.to_string();
        self.audit(|a| a.login_failed(email, &reason));
        Ok(AuthOutcome::failed(err))
    }

    /// Submit a registration for admin review. The password is accepted but
    /// not kept anywhere.
    pub fn signup(&mut self, email: &str, _password: &str, name: &str) -> Result<AuthOutcome> {
        self.pause();

        let registry = self.registry();
        if !self.config.allow_duplicate_signups
            && (BuiltinAccounts::contains(email) || registry.find_by_email(email)?.is_some())
        {
            return Ok(AuthOutcome::failed(AuthError::DuplicateEmail(
                email.to_string(),
            )));
        }

        let entry = registry.register(name, email)?;
        self.audit(|a| a.signup(&entry.id, email));
        Ok(AuthOutcome::ok(Some(SIGNUP_MESSAGE)))
    }

    /// Replace the session user's name, email and avatar.
    ///
    /// A non-empty `new_password` requires `current_password` to match, which
    /// can only be checked for the built-in accounts; registry users have no
    /// stored password to compare against.
    pub fn update_profile(&mut self, update: ProfileUpdate) -> Result<User> {
        self.pause();

        let current = self.user.clone().ok_or(AuthError::NotAuthenticated)?;

        if update.name.trim().chars().count() < 2 {
            return Err(AuthError::validation("name", "Name must be at least 2 characters").into());
        }
        if !update.email.is_empty() && !EMAIL_RE.is_match(&update.email) {
            return Err(AuthError::validation("email", "Invalid email address").into());
        }
        if let Some(avatar) = &update.avatar {
            if let Err(e) = Avatar::parse(avatar) {
                return Err(AuthError::validation("avatar", &e.to_string()).into());
            }
        }

        let changing_password = !update.new_password.is_empty();
        if changing_password {
            let builtin = BuiltinAccounts;
            let sources: [&dyn CredentialSource; 1] = [&builtin];
            if let Some(expected) = credentials::known_password(&sources, &current) {
                if expected != update.current_password {
                    return Err(AuthError::InvalidCurrentPassword.into());
                }
            }
        }

        let email = if update.email.is_empty() {
            current.email.clone()
        } else {
            update.email
        };
        let updated = User {
            name: update.name,
            email,
            avatar: update.avatar,
            ..current
        };

        self.session.save(&updated)?;
        self.user = Some(updated.clone());
        self.audit(|a| a.profile_update(&updated.id, changing_password));
        Ok(updated)
    }

    pub fn logout(&mut self) -> Result<()> {
        self.session.clear()?;
        if let Some(user) = self.user.take() {
            self.audit(|a| a.logout(&user.id));
        }
        Ok(())
    }

    pub fn approve_user(&mut self, id: &str) -> Result<Vec<PendingUser>> {
        self.decide(id, Decision::Approved)
    }

    pub fn reject_user(&mut self, id: &str) -> Result<Vec<PendingUser>> {
        self.decide(id, Decision::Rejected)
    }

    fn decide(&mut self, id: &str, decision: Decision) -> Result<Vec<PendingUser>> {
        let admin_id = self.require_admin()?.id.clone();
        let updated = self.registry().set_status(id, decision)?;
        let status = decision.to_string();
        self.audit(|a| a.status_change(&admin_id, id, &status));
        Ok(updated)
    }

    /// Delete a registration. Admins may delete any entry; a registry user
    /// may delete their own. Deleting the active user logs them out.
    ///
    /// Returns whether the session was ended.
    pub fn delete_user(&mut self, id: &str) -> Result<bool> {
        let user = self.user.as_ref().ok_or(AuthError::NotAuthenticated)?;
        if !user.is_admin() && user.id != id {
            return Err(AuthError::Forbidden.into());
        }

        self.registry().remove(id)?;

        let forced = self.user.as_ref().is_some_and(|u| u.id == id);
        if forced {
            self.logout()?;
        }
        self.audit(|a| a.user_deleted(id, forced));
        Ok(forced)
    }
}
