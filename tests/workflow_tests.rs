//! End-to-end account workflow tests.

use spotter::audit::AuditLog;
use spotter::config::AuthConfig;
use spotter::model::{Decision, Role, Status};
use spotter::session::{SessionManager, StoredSession};
use spotter::store::{FileStore, MemoryStore};
use tempfile::TempDir;

fn no_delay() -> AuthConfig {
    AuthConfig {
        delay_ms: 0,
        allow_duplicate_signups: false,
    }
}

#[test]
fn test_signup_approve_login_scenario() {
    let store = MemoryStore::new();
    let mut mgr = SessionManager::new(&store, Box::new(StoredSession::new(&store)), no_delay())
        .unwrap();

    let outcome = mgr.signup("a@x.com", "pw", "Alice").unwrap();
    assert!(outcome.success);
    let entries = mgr.registry().list().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].status, Status::Pending);
    let alice_id = entries[0].id.clone();

    assert!(mgr.login("admin@example.com", "admin").unwrap().success);
    mgr.approve_user(&alice_id).unwrap();

    let entry = mgr.registry().get(&alice_id).unwrap().unwrap();
    assert_eq!(entry.status, Status::Approved);

    let notes = mgr.notifications().list().unwrap();
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].kind, Decision::Approved);
    assert!(notes[0].message.contains("Alice"));
    assert!(!notes[0].read);

    mgr.logout().unwrap();
    let outcome = mgr.login("a@x.com", "pw").unwrap();
    assert!(outcome.success);
    let user = mgr.current_user().unwrap();
    assert_eq!(user.role, Role::User);
    assert_eq!(user.id, alice_id);
}

#[test]
fn test_each_decision_adds_one_notification() {
    let store = MemoryStore::new();
    let mut mgr = SessionManager::new(&store, Box::new(StoredSession::new(&store)), no_delay())
        .unwrap();
    for (i, name) in ["Ann", "Ben", "Cat", "Dan"].iter().enumerate() {
        mgr.signup(&format!("u{}@x.com", i), "pw", name).unwrap();
    }
    mgr.login("admin@example.com", "admin").unwrap();

    let ids: Vec<String> = mgr
        .registry()
        .list()
        .unwrap()
        .into_iter()
        .map(|u| u.id)
        .collect();
    for (i, id) in ids.iter().enumerate() {
        let before = mgr.notifications().list().unwrap().len();
        if i % 2 == 0 {
            mgr.approve_user(id).unwrap();
        } else {
            mgr.reject_user(id).unwrap();
        }
        let after = mgr.notifications().list().unwrap();
        assert_eq!(after.len(), before + 1);
        assert!(!after[0].read);
        assert_eq!(&after[0].user_id, id);
    }

    let log = mgr.notifications();
    let first = log.mark_all_read().unwrap();
    assert!(first.iter().all(|n| n.read));
    assert_eq!(log.mark_all_read().unwrap(), first);
}

#[test]
fn test_file_backed_state_survives_restart() {
    let dir = TempDir::new().unwrap();
    let data = dir.path().join("data");
    let audit_dir = dir.path().join("audit");

    {
        let store = FileStore::open(&data).unwrap();
        let audit = AuditLog::in_dir(&audit_dir, "run-a").unwrap();
        let mut mgr = SessionManager::new(&store, Box::new(StoredSession::new(&store)), no_delay())
            .unwrap()
            .with_audit(audit);
        mgr.signup("b@x.com", "pw", "Bob").unwrap();
        mgr.login("admin@example.com", "admin").unwrap();
    }

    let store = FileStore::open(&data).unwrap();
    let mut mgr = SessionManager::new(&store, Box::new(StoredSession::new(&store)), no_delay())
        .unwrap();
    assert_eq!(mgr.current_user().unwrap().id, "admin-123");
    let bob = mgr.registry().find_by_email("b@x.com").unwrap().unwrap();
    mgr.reject_user(&bob.id).unwrap();
    mgr.logout().unwrap();

    let outcome = mgr.login("b@x.com", "pw").unwrap();
    assert!(!outcome.success);
    assert!(!mgr.is_authenticated());

    let audit = std::fs::read_to_string(audit_dir.join("run-a.jsonl")).unwrap();
    let types: Vec<String> = audit
        .lines()
        .map(|l| serde_json::from_str::<serde_json::Value>(l).unwrap()["type"]
            .as_str()
            .unwrap()
            .to_string())
        .collect();
    assert_eq!(types, vec!["signup", "login_ok"]);
}
