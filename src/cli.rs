use crate::avatar::{self, Avatar, DEFAULT_ICONS};
use crate::config::Config;
use crate::detect::{self, DetectionClient, Summary};
use crate::model::{Notification, PendingUser, Status, User};
use crate::session::{Access, ProfileUpdate, SessionManager};
use anyhow::{anyhow, bail, Result};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::cell::RefCell;
use std::path::Path;
use std::time::{Duration, Instant};

const DEFAULT_LIVE_ROUNDS: usize = 5;
const NOTIFICATION_PREVIEW: usize = 5;

pub struct Context<'a> {
    pub config: Config,
    pub manager: RefCell<SessionManager<'a>>,
    pub detector: Box<dyn DetectionClient + 'a>,
    pub verbose: bool,
}

/// Run each command in order, stopping at the first error
pub fn run_once(ctx: &Context, commands: &[String]) -> Result<()> {
    for line in commands {
        if ctx.verbose {
            eprintln!("[DEBUG] {}", line);
        }
        if let Command::Exit = execute(ctx, line)? {
            break;
        }
    }
    Ok(())
}

pub fn run_repl(ctx: Context) -> Result<()> {
    let mut rl = DefaultEditor::new()?;

    println!("spotter - type /help for commands, /exit to quit");
    print_session(&ctx);

    loop {
        match rl.readline("spotter> ") {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                rl.add_history_entry(line)?;

                match execute(&ctx, line) {
                    Ok(Command::Exit) => break,
                    Ok(Command::Continue) => {}
                    Err(e) => eprintln!("Error: {}", e),
                }
            }
            Err(ReadlineError::Interrupted | ReadlineError::Eof) => break,
            Err(e) => {
                eprintln!("Input error: {}", e);
                break;
            }
        }
    }

    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Continue,
    Exit,
}

/// Parse and run one command line
pub fn execute(ctx: &Context, line: &str) -> Result<Command> {
    let words = shell_words::split(line)?;
    let Some((cmd, args)) = words.split_first() else {
        return Ok(Command::Continue);
    };
    let args: Vec<&str> = args.iter().map(String::as_str).collect();

    match cmd.as_str() {
        "/exit" | "/quit" => return Ok(Command::Exit),
        "/help" => print_help(),
        "/login" => {
            let [email, password] = &args[..] else {
                bail!("Usage: /login <email> <password>");
            };
            let outcome = ctx.manager.borrow_mut().login(email, password)?;
            if outcome.success {
                print_session(ctx);
            } else {
                println!(
                    "Login failed: {}",
                    outcome.message.unwrap_or_else(|| "unknown error".to_string())
                );
            }
        }
        "/signup" => {
            let [email, password, name] = &args[..] else {
                bail!("Usage: /signup <email> <password> <name>");
            };
            let outcome = ctx.manager.borrow_mut().signup(email, password, name)?;
            let message = outcome.message.unwrap_or_default();
            if outcome.success {
                println!("{}", message);
            } else {
                println!("Signup failed: {}", message);
            }
        }
        "/logout" => {
            ctx.manager.borrow_mut().logout()?;
            println!("Logged out");
        }
        "/whoami" => print_session(ctx),
        "/pending" => {
            let manager = ctx.manager.borrow();
            manager.require_admin()?;
            let pending = manager.registry().with_status(Status::Pending)?;
            if pending.is_empty() {
                println!("No pending registrations");
            } else {
                println!("{} pending registration(s):", pending.len());
                print_registrations(&pending);
            }
        }
        "/users" => {
            let manager = ctx.manager.borrow();
            manager.require_admin()?;
            let registry = manager.registry();
            let users = match args.first() {
                Some(s) => {
                    let status =
                        Status::from_str(s).ok_or_else(|| anyhow!("Unknown status: {}", s))?;
                    registry.with_status(status)?
                }
                None => registry.list()?,
            };
            let counts = registry.counts()?;
            println!(
                "pending: {}  approved: {}  rejected: {}",
                counts.pending, counts.approved, counts.rejected
            );
            print_registrations(&users);
        }
        "/approve" | "/reject" => {
            let [id] = &args[..] else {
                bail!("Usage: {} <id>", cmd);
            };
            let mut manager = ctx.manager.borrow_mut();
            if cmd == "/approve" {
                manager.approve_user(id)?;
                println!("User has been approved successfully. They can now log in.");
            } else {
                manager.reject_user(id)?;
                println!("User has been rejected.");
            }
        }
        "/delete" => {
            let [id] = &args[..] else {
                bail!("Usage: /delete <id>");
            };
            let forced = ctx.manager.borrow_mut().delete_user(id)?;
            println!("User has been deleted.");
            if forced {
                println!("Your session has ended.");
            }
        }
        "/notifications" => {
            let manager = ctx.manager.borrow();
            manager.require_admin()?;
            let log = manager.notifications();
            let all = args.first() == Some(&"all");
            let entries = if all {
                log.list()?
            } else {
                log.recent(NOTIFICATION_PREVIEW)?
            };
            println!("{} unread", log.unread_count()?);
            print_notifications(&entries);
        }
        "/read" => {
            let [id] = &args[..] else {
                bail!("Usage: /read <notification-id>");
            };
            let manager = ctx.manager.borrow();
            manager.require_admin()?;
            manager.notifications().mark_read(id)?;
        }
        "/readall" => {
            let manager = ctx.manager.borrow();
            manager.require_admin()?;
            let all = manager.notifications().mark_all_read()?;
            println!("Marked {} notification(s) read", all.len());
        }
        "/profile" => {
            let update = parse_profile_args(ctx, &args)?;
            let user = ctx.manager.borrow_mut().update_profile(update)?;
            println!("Profile updated successfully");
            print_user(&user);
        }
        "/avatars" => {
            println!("Default avatars (use --avatar default:<id>):");
            for (id, label) in DEFAULT_ICONS {
                println!("  {:<14} {}", id, label);
            }
        }
        "/detect" => {
            let [path] = &args[..] else {
                bail!("Usage: /detect <image>");
            };
            require_access(ctx)?;
            detect_image(ctx, Path::new(path))?;
        }
        "/live" => {
            let rounds = match args.first() {
                Some(n) => n.parse::<usize>()?,
                None => DEFAULT_LIVE_ROUNDS,
            };
            require_access(ctx)?;
            watch_live(ctx, rounds)?;
        }
        other => println!("Unknown command: {}. Type /help.", other),
    }

    Ok(Command::Continue)
}

fn print_help() {
    println!("Account:");
    println!("  /login <email> <password>        - log in");
    println!("  /signup <email> <password> <name> - request an account");
    println!("  /logout                          - end the session");
    println!("  /whoami                          - show the session user");
    println!("  /profile <name> <email> [--avatar A] [--current P --new P]");
    println!("                                   - update profile (A: default:<id>, image path, or none)");
    println!("  /avatars                         - list default avatars");
    println!("Admin:");
    println!("  /pending                         - list pending registrations");
    println!("  /users [status]                  - list registrations");
    println!("  /approve <id>, /reject <id>      - decide a registration");
    println!("  /delete <id>                     - delete a registration");
    println!("  /notifications [all]             - show decision log");
    println!("  /read <id>, /readall             - mark notifications read");
    println!("Detection:");
    println!("  /detect <image>                  - run detection on an image");
    println!("  /live [rounds]                   - poll the live camera feed");
    println!("  /exit                            - quit");
}

fn parse_profile_args(ctx: &Context, args: &[&str]) -> Result<ProfileUpdate> {
    let manager = ctx.manager.borrow();
    let current = manager.current_user().cloned();

    let mut positional = Vec::new();
    let mut avatar = current.as_ref().and_then(|u| u.avatar.clone());
    let mut current_password = String::new();
    let mut new_password = String::new();

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match *arg {
            "--avatar" | "--current" | "--new" => {
                let value = iter
                    .next()
                    .ok_or_else(|| anyhow!("{} needs a value", arg))?;
                match *arg {
                    "--avatar" => avatar = resolve_avatar(value)?,
                    "--current" => current_password = value.to_string(),
                    _ => new_password = value.to_string(),
                }
            }
            other => positional.push(other),
        }
    }

    let name = match positional.first() {
        Some(n) => n.to_string(),
        None => current.as_ref().map(|u| u.name.clone()).unwrap_or_default(),
    };
    let email = positional.get(1).map(|e| e.to_string()).unwrap_or_default();

    Ok(ProfileUpdate {
        name,
        email,
        avatar,
        current_password,
        new_password,
    })
}

/// `none` clears, `default:`/`data:` strings pass through, anything else is
/// read as an image file
fn resolve_avatar(value: &str) -> Result<Option<String>> {
    if value == "none" {
        return Ok(None);
    }
    if value.starts_with("default:") || value.starts_with("data:") {
        return Ok(Some(value.to_string()));
    }
    Ok(Some(Avatar::from_file(Path::new(value))?.encode()))
}

fn require_access(ctx: &Context) -> Result<()> {
    match ctx.manager.borrow().access() {
        Access::Granted => Ok(()),
        other => Err(anyhow!(other.notice().unwrap_or("Access denied").to_string())),
    }
}

fn detect_image(ctx: &Context, path: &Path) -> Result<()> {
    let started = Instant::now();
    let result = ctx.detector.upload(path);
    let elapsed = started.elapsed().as_millis() as u64;
    let file = path.display().to_string();

    let detections = match result {
        Ok(d) => d,
        Err(e) => {
            ctx.manager
                .borrow_mut()
                .audit(|a| a.detection_upload(&file, false, 0, elapsed));
            return Err(anyhow!("Error during detection: {}", e));
        }
    };
    ctx.manager
        .borrow_mut()
        .audit(|a| a.detection_upload(&file, true, detections.len(), elapsed));

    println!("Detection completed successfully! ({} ms)", elapsed);
    if let Some(first) = detections.first() {
        println!("Image: {}x{}", first.image_width, first.image_height);
    }
    for d in &detections {
        let b = &d.bounding_box;
        println!(
            "  {:<16} {:>5.1}%  at ({}, {}) {}x{}",
            d.label,
            d.confidence * 100.0,
            b.x,
            b.y,
            b.width,
            b.height
        );
    }
    print_summary(&detect::summarize_upload(&detections));
    Ok(())
}

fn watch_live(ctx: &Context, rounds: usize) -> Result<()> {
    let cfg = &ctx.config.detection;

    let started = ctx.detector.start_stream();
    let ok = started.is_ok();
    ctx.manager.borrow_mut().audit(|a| a.stream(true, ok));
    let status = started?;
    println!("Stream {}; warming up...", status.status);

    std::thread::sleep(Duration::from_millis(cfg.warmup_ms));
    for round in 1..=rounds {
        match ctx.detector.poll() {
            Ok(detections) => {
                let summary = detect::summarize_live(&detections);
                let labels: Vec<String> = detections
                    .iter()
                    .map(|d| format!("{} {:.0}%", d.label, d.confidence * 100.0))
                    .collect();
                println!(
                    "[{}/{}] {} object(s): {}",
                    round,
                    rounds,
                    summary.total,
                    labels.join(", ")
                );
            }
            Err(e) => eprintln!("Failed to fetch detections: {}", e),
        }
        if round < rounds {
            std::thread::sleep(Duration::from_millis(cfg.poll_interval_ms));
        }
    }

    let stopped = ctx.detector.stop_stream();
    let ok = stopped.is_ok();
    ctx.manager.borrow_mut().audit(|a| a.stream(false, ok));
    println!("Stream {}", stopped?.status);
    Ok(())
}

fn print_session(ctx: &Context) {
    let manager = ctx.manager.borrow();
    match manager.current_user() {
        None => println!("Not logged in"),
        Some(user) => {
            print_user(user);
            if let Some(notice) = manager.access().notice() {
                println!("{}", notice);
            }
            if user.is_admin() {
                let pending = manager.registry().counts().map(|c| c.pending).unwrap_or(0);
                let unread = manager.notifications().unread_count().unwrap_or(0);
                if pending > 0 || unread > 0 {
                    println!(
                        "{} pending registration(s), {} unread notification(s)",
                        pending, unread
                    );
                }
            }
        }
    }
}

fn print_user(user: &User) {
    let avatar = match user.avatar.as_deref().map(Avatar::parse) {
        Some(Ok(a)) => a.describe(),
        Some(Err(_)) => "unreadable avatar".to_string(),
        None => format!("initials {}", avatar::initials(&user.name)),
    };
    println!(
        "{} <{}> [{}, {}] id={} ({})",
        user.name,
        user.email,
        user.role.as_str(),
        user.status,
        user.id,
        avatar
    );
    let s = &user.stats;
    println!(
        "  detections: {}  most common: {}  accuracy: {:.1}%  recent uploads: {}",
        s.total_detections, s.most_common_object, s.detection_accuracy, s.recent_uploads
    );
}

fn print_registrations(users: &[PendingUser]) {
    for u in users {
        println!(
            "  {}  {:<20} {:<28} {:<9} {}",
            u.id,
            u.name,
            u.email,
            u.status,
            u.created_at.format("%Y-%m-%d %H:%M")
        );
    }
}

fn print_notifications(entries: &[Notification]) {
    if entries.is_empty() {
        println!("No notifications");
    }
    for n in entries {
        let marker = if n.read { " " } else { "*" };
        println!(
            "{} {}  {}  {}",
            marker,
            n.timestamp.format("%Y-%m-%d %H:%M"),
            n.message,
            n.id
        );
    }
}

fn print_summary(summary: &Summary) {
    if summary.total == 0 {
        println!("No objects detected");
        return;
    }
    let labels: Vec<String> = summary
        .labels
        .iter()
        .map(|(l, n)| format!("{} x{}", l, n))
        .collect();
    println!(
        "{} object(s), mean confidence {:.1}%: {}",
        summary.total,
        summary.mean_confidence * 100.0,
        labels.join(", ")
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AuthConfig;
    use crate::detect::{BoundingBox, Detection, LiveDetection, StreamStatus};
    use crate::error::AuthError;
    use crate::session::StoredSession;
    use crate::store::MemoryStore;
    use std::cell::Cell;

    #[derive(Default)]
    struct MockDetector {
        uploads: Cell<usize>,
        polls: Cell<usize>,
    }

    impl DetectionClient for MockDetector {
        fn upload(&self, _image: &Path) -> Result<Vec<Detection>> {
            self.uploads.set(self.uploads.get() + 1);
            Ok(vec![Detection {
                label: "person".to_string(),
                confidence: 0.9,
                bounding_box: BoundingBox {
                    x: 1,
                    y: 2,
                    width: 3,
                    height: 4,
                },
                image_width: 640,
                image_height: 480,
            }])
        }

        fn start_stream(&self) -> Result<StreamStatus> {
            Ok(StreamStatus {
                status: "started".to_string(),
            })
        }

        fn stop_stream(&self) -> Result<StreamStatus> {
            Ok(StreamStatus {
                status: "stopped".to_string(),
            })
        }

        fn poll(&self) -> Result<Vec<LiveDetection>> {
            self.polls.set(self.polls.get() + 1);
            Ok(vec![])
        }
    }

    fn context<'a>(store: &'a MemoryStore, detector: &'a MockDetector) -> Context<'a> {
        let auth = AuthConfig {
            delay_ms: 0,
            allow_duplicate_signups: false,
        };
        let manager = SessionManager::new(store, Box::new(StoredSession::new(store)), auth).unwrap();
        let mut config = Config::default();
        config.detection.warmup_ms = 0;
        config.detection.poll_interval_ms = 1;
        Context {
            config,
            manager: RefCell::new(manager),
            detector: Box::new(detector),
            verbose: false,
        }
    }

    impl DetectionClient for &MockDetector {
        fn upload(&self, image: &Path) -> Result<Vec<Detection>> {
            (**self).upload(image)
        }
        fn start_stream(&self) -> Result<StreamStatus> {
            (**self).start_stream()
        }
        fn stop_stream(&self) -> Result<StreamStatus> {
            (**self).stop_stream()
        }
        fn poll(&self) -> Result<Vec<LiveDetection>> {
            (**self).poll()
        }
    }

    #[test]
    fn test_signup_and_admin_approval_commands() {
        let store = MemoryStore::new();
        let detector = MockDetector::default();
        let ctx = context(&store, &detector);

        execute(&ctx, "/signup a@x.com pw \"Alice Smith\"").unwrap();
        let alice = ctx
            .manager
            .borrow()
            .registry()
            .find_by_email("a@x.com")
            .unwrap()
            .unwrap();
        assert_eq!(alice.name, "Alice Smith");

        // not an admin yet
        let err = execute(&ctx, "/pending").unwrap_err();
        assert_eq!(
            err.downcast_ref::<AuthError>(),
            Some(&AuthError::NotAuthenticated)
        );

        execute(&ctx, "/login admin@example.com admin").unwrap();
        execute(&ctx, &format!("/approve {}", alice.id)).unwrap();
        execute(&ctx, "/readall").unwrap();

        let manager = ctx.manager.borrow();
        assert_eq!(
            manager.registry().get(&alice.id).unwrap().unwrap().status,
            Status::Approved
        );
        assert_eq!(manager.notifications().unread_count().unwrap(), 0);
    }

    #[test]
    fn test_usage_errors() {
        let store = MemoryStore::new();
        let detector = MockDetector::default();
        let ctx = context(&store, &detector);

        let err = execute(&ctx, "/login only-email").unwrap_err();
        assert!(err.to_string().starts_with("Usage"));
        assert_eq!(execute(&ctx, "/exit").unwrap(), Command::Exit);
        assert_eq!(execute(&ctx, "/quit").unwrap(), Command::Exit);
        assert_eq!(execute(&ctx, "/nope").unwrap(), Command::Continue);
        assert_eq!(execute(&ctx, "").unwrap(), Command::Continue);
    }

    #[test]
    fn test_detection_requires_approved_session() {
        let store = MemoryStore::new();
        let detector = MockDetector::default();
        let ctx = context(&store, &detector);

        assert!(execute(&ctx, "/detect photo.jpg").is_err());
        assert_eq!(detector.uploads.get(), 0);

        execute(&ctx, "/login demo@example.com password").unwrap();
        execute(&ctx, "/detect photo.jpg").unwrap();
        assert_eq!(detector.uploads.get(), 1);

        execute(&ctx, "/live 3").unwrap();
        assert_eq!(detector.polls.get(), 3);
    }

    #[test]
    fn test_profile_command_keeps_avatar_and_email() {
        let store = MemoryStore::new();
        let detector = MockDetector::default();
        let ctx = context(&store, &detector);

        execute(&ctx, "/login demo@example.com password").unwrap();
        execute(&ctx, "/profile \"Demo Person\" --avatar default:meh").unwrap();
        execute(&ctx, "/profile \"Demo Again\"").unwrap();

        let manager = ctx.manager.borrow();
        let user = manager.current_user().unwrap();
        assert_eq!(user.name, "Demo Again");
        assert_eq!(user.email, "demo@example.com");
        assert_eq!(user.avatar.as_deref(), Some("default:meh"));

        drop(manager);
        let err = execute(&ctx, "/profile Demo demo@example.com --current bad --new better")
            .unwrap_err();
        assert_eq!(
            err.downcast_ref::<AuthError>(),
            Some(&AuthError::InvalidCurrentPassword)
        );
        assert!(resolve_avatar("none").unwrap().is_none());
    }
}
