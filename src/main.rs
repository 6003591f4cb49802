use anyhow::Result;
use clap::Parser;
use spotter::audit::AuditLog;
use spotter::cli;
use spotter::config::Config;
use spotter::detect::HttpDetector;
use spotter::session::{SessionManager, SessionStore, StoredSession, TransientSession};
use spotter::store::{FileStore, KeyValueStore, MemoryStore};
use std::cell::RefCell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "spotter", about = "Account approvals and object detection from the terminal")]
pub struct Args {
    #[arg(short, long = "command", value_name = "CMD", action = clap::ArgAction::Append, help = "Run a command (e.g. '/login demo@example.com password') and exit")]
    pub commands: Vec<String>,

    #[arg(long, help = "Config file path")]
    pub config: Option<PathBuf>,

    #[arg(long, help = "Directory holding the account documents")]
    pub data_dir: Option<PathBuf>,

    #[arg(
        long,
        env = "SPOTTER_DETECT_URL",
        help = "Detection service base URL"
    )]
    pub detect_url: Option<String>,

    #[arg(long, help = "Keep all state in memory for this run only")]
    pub ephemeral: bool,

    #[arg(long, help = "Skip the artificial login/signup delay")]
    pub no_delay: bool,

    #[arg(long, help = "Disable the audit log")]
    pub no_audit: bool,

    #[arg(long, help = "Verbose output (echo commands)")]
    pub verbose: bool,

    #[arg(long, help = "Debug output (print resolved settings)")]
    pub debug: bool,
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let mut cfg = if let Some(config_path) = &args.config {
        Config::load_from(config_path)?
    } else {
        Config::load()?
    };

    // CLI overrides
    if let Some(dir) = &args.data_dir {
        cfg.storage.dir = dir.clone();
    }
    if let Some(url) = &args.detect_url {
        cfg.detection.base_url = url.clone();
    }
    if args.no_delay {
        cfg.auth.delay_ms = 0;
    }
    if args.no_audit || args.ephemeral {
        cfg.audit.enabled = false;
    }

    if let Err(errors) = cfg.validate() {
        for e in &errors {
            eprintln!("Config error {}", e);
        }
        return Err(anyhow::anyhow!("Invalid configuration ({} error(s))", errors.len()));
    }

    if args.debug {
        eprintln!("[DEBUG] Data dir: {}", cfg.storage.dir.display());
        eprintln!("[DEBUG] Detection service: {}", cfg.detection.base_url);
        eprintln!("[DEBUG] Auth delay: {} ms", cfg.auth.delay_ms);
        eprintln!(
            "[DEBUG] Audit: {}",
            if cfg.audit.enabled {
                cfg.audit.dir.display().to_string()
            } else {
                "off".to_string()
            }
        );
    }

    let store: Box<dyn KeyValueStore> = if args.ephemeral {
        Box::new(MemoryStore::new())
    } else {
        Box::new(FileStore::open(&cfg.storage.dir)?)
    };
    let session: Box<dyn SessionStore + '_> = if args.ephemeral {
        Box::new(TransientSession::default())
    } else {
        Box::new(StoredSession::new(store.as_ref()))
    };

    let mut manager =
        SessionManager::new(store.as_ref(), session, cfg.auth.clone())?.with_debug(args.debug);
    if cfg.audit.enabled {
        let run_id = uuid::Uuid::new_v4().to_string();
        let audit = AuditLog::in_dir(&cfg.audit.dir, &run_id)?;
        if args.debug {
            eprintln!("[DEBUG] Audit log: {}", audit.path.display());
        }
        manager = manager.with_audit(audit);
    }

    let detector = HttpDetector::new(&cfg.detection);

    let ctx = cli::Context {
        config: cfg,
        manager: RefCell::new(manager),
        detector: Box::new(detector),
        verbose: args.verbose,
    };

    if args.commands.is_empty() {
        cli::run_repl(ctx)
    } else {
        cli::run_once(&ctx, &args.commands)
    }
}
