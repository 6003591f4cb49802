//! Account, registration and notification records.
//!
//! Field names serialize in camelCase.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Account role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    User,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::User => "user",
        }
    }
}

/// Registration status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    #[default]
    Pending,
    Approved,
    Rejected,
}

impl Status {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

/// The outcome an admin can give a registration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Approved,
    Rejected,
}

impl Decision {
    pub fn as_status(&self) -> Status {
        match self {
            Self::Approved => Status::Approved,
            Self::Rejected => Status::Rejected,
        }
    }
}

impl std::fmt::Display for Decision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_status().as_str())
    }
}

/// Display-only usage numbers shown on the dashboard
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageStats {
    pub total_detections: u64,
    pub most_common_object: String,
    pub detection_accuracy: f64,
    pub recent_uploads: u64,
}

impl Default for UsageStats {
    fn default() -> Self {
        Self {
            total_detections: 0,
            most_common_object: "-".to_string(),
            detection_accuracy: 0.0,
            recent_uploads: 0,
        }
    }
}

/// The single active session user
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    #[serde(default)]
    pub stats: UsageStats,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// A self-service registration awaiting (or past) admin review
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingUser {
    pub id: String,
    pub name: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
    pub status: Status,
}

impl PendingUser {
    pub fn new(name: &str, email: &str) -> Self {
        Self {
            id: format!("user-{}", uuid::Uuid::new_v4()),
            name: name.to_string(),
            email: email.to_string(),
            created_at: Utc::now(),
            status: Status::Pending,
        }
    }

    /// Session record for a registration that has been approved
    pub fn to_session_user(&self) -> User {
        User {
            id: self.id.clone(),
            name: self.name.clone(),
            email: self.email.clone(),
            role: Role::User,
            status: Status::Approved,
            avatar: None,
            stats: UsageStats::default(),
        }
    }
}

/// One approval or rejection event
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: String,
    pub user_id: String,
    #[serde(rename = "type")]
    pub kind: Decision,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub read: bool,
}

impl Notification {
    pub fn new(user_id: &str, kind: Decision, message: String) -> Self {
        Self {
            id: format!("notification-{}", uuid::Uuid::new_v4()),
            user_id: user_id.to_string(),
            kind,
            message,
            timestamp: Utc::now(),
            read: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pending_user_serializes_camel_case() {
        let user = PendingUser::new("Alice", "a@x.com");
        let json = serde_json::to_value(&user).unwrap();
        assert!(json.get("createdAt").is_some());
        assert_eq!(json["status"], "pending");
        assert!(user.id.starts_with("user-"));
    }

    #[test]
    fn test_notification_type_field() {
        let n = Notification::new("user-1", Decision::Rejected, "msg".to_string());
        let json = serde_json::to_value(&n).unwrap();
        assert_eq!(json["type"], "rejected");
        assert_eq!(json["userId"], "user-1");
        assert_eq!(json["read"], false);
    }

    #[test]
    fn test_user_without_avatar_or_stats_parses() {
        let raw = r#"{"id":"u","name":"N","email":"e@x.com","role":"user","status":"approved"}"#;
        let user: User = serde_json::from_str(raw).unwrap();
        assert_eq!(user.avatar, None);
        assert_eq!(user.stats.most_common_object, "-");
    }

    #[test]
    fn test_status_from_str() {
        assert_eq!(Status::from_str("Approved"), Some(Status::Approved));
        assert_eq!(Status::from_str("done"), None);
    }
}
