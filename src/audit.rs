use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Append-only JSONL record of account and detection events for one run
pub struct AuditLog {
    pub path: PathBuf,
    run_id: String,
    file: File,
}

#[derive(Serialize)]
struct Event<'a> {
    ts: DateTime<Utc>,
    run_id: &'a str,
    #[serde(rename = "type")]
    event_type: &'a str,
    #[serde(flatten)]
    data: serde_json::Value,
}

impl AuditLog {
    pub fn new(path: &Path, run_id: &str) -> Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;

        Ok(Self {
            path: path.to_path_buf(),
            run_id: run_id.to_string(),
            file,
        })
    }

    /// Open `<dir>/<run_id>.jsonl`, creating the directory
    pub fn in_dir(dir: &Path, run_id: &str) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        Self::new(&dir.join(format!("{}.jsonl", run_id)), run_id)
    }

    pub fn log(&mut self, event_type: &str, data: serde_json::Value) -> Result<()> {
        let event = Event {
            ts: Utc::now(),
            run_id: &self.run_id,
            event_type,
            data,
        };
        let line = serde_json::to_string(&event)?;
        writeln!(self.file, "{}", line)?;
        self.file.flush()?;
        Ok(())
    }

    pub fn login_ok(&mut self, user_id: &str, email: &str, role: &str) -> Result<()> {
        self.log(
            "login_ok",
            serde_json::json!({ "user_id": user_id, "email": email, "role": role }),
        )
    }

    pub fn login_failed(&mut self, email: &str, reason: &str) -> Result<()> {
        self.log(
            "login_failed",
            serde_json::json!({ "email": email, "reason": reason }),
        )
    }

    pub fn signup(&mut self, user_id: &str, email: &str) -> Result<()> {
        self.log(
            "signup",
            serde_json::json!({ "user_id": user_id, "email": email }),
        )
    }

    /// Log an admin decision on a registration
    pub fn status_change(&mut self, admin_id: &str, user_id: &str, status: &str) -> Result<()> {
        self.log(
            "status_change",
            serde_json::json!({
                "admin_id": admin_id,
                "user_id": user_id,
                "status": status,
            }),
        )
    }

    pub fn user_deleted(&mut self, user_id: &str, forced_logout: bool) -> Result<()> {
        self.log(
            "user_deleted",
            serde_json::json!({ "user_id": user_id, "forced_logout": forced_logout }),
        )
    }

    pub fn logout(&mut self, user_id: &str) -> Result<()> {
        self.log("logout", serde_json::json!({ "user_id": user_id }))
    }

    pub fn profile_update(&mut self, user_id: &str, password_changed: bool) -> Result<()> {
        self.log(
            "profile_update",
            serde_json::json!({ "user_id": user_id, "password_changed": password_changed }),
        )
    }

    /// Log a single-image detection request
    pub fn detection_upload(
        &mut self,
        file: &str,
        ok: bool,
        detections: usize,
        duration_ms: u64,
    ) -> Result<()> {
        self.log(
            "detection_upload",
            serde_json::json!({
                "file": file,
                "ok": ok,
                "detections": detections,
                "duration_ms": duration_ms,
            }),
        )
    }

    pub fn stream(&mut self, started: bool, ok: bool) -> Result<()> {
        let event = if started { "stream_start" } else { "stream_stop" };
        self.log(event, serde_json::json!({ "ok": ok }))
    }
}
