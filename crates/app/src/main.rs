use std::collections::HashMap;
use std::fmt;
use std::io::Write as _;
use std::sync::Arc;
use std::time::Duration;

use mentor_core::model::{FieldName, UserId};
use services::{
    ApiClient, AuthService, BackendConfig, Clock, DEFAULT_TYPE_SPEED, LearnEngine, PopupKind,
    SseClient, TypewriterDriver,
};
use storage::repository::{SessionContextRepository as _, Storage};
use tracing_subscriber::EnvFilter;

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    UnknownArg(String),
    MissingBackend,
    MissingIdentity,
    InvalidSpeed { raw: String },
    InvalidDbUrl { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::MissingBackend => {
                write!(f, "no backend url (use --backend or MENTOR_BACKEND_URL)")
            }
            ArgsError::MissingIdentity => write!(
                f,
                "no session context yet; pass --user-id and --field for the first run"
            ),
            ArgsError::InvalidSpeed { raw } => write!(f, "invalid --speed-ms value: {raw}"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
        }
    }
}

impl std::error::Error for ArgsError {}

fn require_value(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<String, ArgsError> {
    args.next().ok_or(ArgsError::MissingValue { flag })
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  cargo run -p app -- learn  [--backend <url>] [--db <sqlite_url>]");
    eprintln!("                             [--user-id <id>] [--field <name>] [--speed-ms <n>]");
    eprintln!("  cargo run -p app -- logout [--db <sqlite_url>]");
    eprintln!();
    eprintln!("Defaults:");
    eprintln!("  --db sqlite:mentor.sqlite3");
    eprintln!("  --speed-ms 20");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  MENTOR_BACKEND_URL, MENTOR_DB_URL, MENTOR_USER_ID, MENTOR_FIELD,");
    eprintln!("  MENTOR_TYPE_SPEED_MS");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Learn,
    Logout,
}

impl Command {
    fn from_arg(arg: &str) -> Option<Self> {
        match arg {
            "learn" => Some(Self::Learn),
            "logout" => Some(Self::Logout),
            _ => None,
        }
    }
}

struct Args {
    backend: Option<String>,
    db_url: String,
    user_id: Option<String>,
    field: Option<String>,
    speed: Duration,
}

impl Args {
    fn parse(args: &mut impl Iterator<Item = String>) -> Result<Self, ArgsError> {
        let mut backend = std::env::var("MENTOR_BACKEND_URL").ok().filter(|v| !v.is_empty());
        let mut db_url = std::env::var("MENTOR_DB_URL")
            .ok()
            .map_or_else(|| "sqlite://mentor.sqlite3".into(), normalize_sqlite_url);
        let mut user_id = std::env::var("MENTOR_USER_ID").ok().filter(|v| !v.is_empty());
        let mut field = std::env::var("MENTOR_FIELD").ok().filter(|v| !v.is_empty());
        let mut speed = std::env::var("MENTOR_TYPE_SPEED_MS")
            .ok()
            .and_then(|value| value.parse::<u64>().ok())
            .map_or(DEFAULT_TYPE_SPEED, Duration::from_millis);

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--backend" => {
                    backend = Some(require_value(args, "--backend")?);
                }
                "--db" => {
                    let value = require_value(args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    db_url = normalize_sqlite_url(value);
                }
                "--user-id" => {
                    user_id = Some(require_value(args, "--user-id")?);
                }
                "--field" => {
                    field = Some(require_value(args, "--field")?);
                }
                "--speed-ms" => {
                    let value = require_value(args, "--speed-ms")?;
                    let millis: u64 = value
                        .parse()
                        .map_err(|_| ArgsError::InvalidSpeed { raw: value.clone() })?;
                    speed = Duration::from_millis(millis);
                }
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        Ok(Self {
            backend,
            db_url,
            user_id,
            field,
            speed,
        })
    }
}

fn normalize_sqlite_url(raw: String) -> String {
    if raw == "sqlite::memory:" || raw.starts_with("sqlite://") {
        return raw;
    }

    let trimmed = raw.trim().to_string();
    let path_str = trimmed
        .strip_prefix("sqlite:")
        .unwrap_or(trimmed.as_str())
        .to_string();
    let path = std::path::Path::new(&path_str);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| std::path::PathBuf::from("."))
            .join(path)
    };
    format!("sqlite://{}", absolute.display())
}

fn prepare_sqlite_file(db_url: &str) -> Result<(), Box<dyn std::error::Error>> {
    if db_url == "sqlite::memory:" {
        return Ok(());
    }

    let path = db_url
        .strip_prefix("sqlite://")
        .ok_or_else(|| ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        })?;
    let path = path.split('?').next().unwrap_or(path);
    if path.is_empty() {
        return Err(ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        }
        .into());
    }

    let path = std::path::Path::new(path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    if !path.exists() {
        std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path)?;
    }

    Ok(())
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let mut argv: Vec<String> = std::env::args().skip(1).collect();

    let cmd = match argv.first().map(String::as_str) {
        None => Command::Learn,
        Some("--help" | "-h") => {
            print_usage();
            return Ok(());
        }
        Some(first) if first.starts_with("--") => Command::Learn,
        Some(first) => Command::from_arg(first).ok_or_else(|| {
            eprintln!("unknown subcommand: {first}");
            print_usage();
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "unknown subcommand")
        })?,
    };

    if !argv.is_empty() && !argv[0].starts_with("--") {
        argv.remove(0);
    }

    let mut iter = argv.into_iter();
    let parsed = Args::parse(&mut iter).map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    // Open + migrate SQLite at startup. Keep this in the binary glue so
    // core/services stay pure.
    prepare_sqlite_file(&parsed.db_url)?;
    let storage = Storage::sqlite(&parsed.db_url).await?;

    match cmd {
        Command::Learn => run_learn(parsed, storage).await,
        Command::Logout => {
            // Logout only needs storage, not a reachable backend.
            let backend = parsed.backend.unwrap_or_else(|| "http://localhost".into());
            let api = ApiClient::new(BackendConfig::new(backend)?);
            let auth = AuthService::new(api, &storage, Clock::default_clock());
            auth.logout().await?;
            println!("Logged out; local session data cleared.");
            Ok(())
        }
    }
}

async fn run_learn(parsed: Args, storage: Storage) -> Result<(), Box<dyn std::error::Error>> {
    let backend = parsed.backend.ok_or(ArgsError::MissingBackend)?;
    let config = BackendConfig::new(backend)?;
    let api = ApiClient::new(config.clone());
    let clock = Clock::default_clock();
    let auth = AuthService::new(api.clone(), &storage, clock);

    if auth.is_login_expired().await? {
        auth.logout().await?;
        println!("Your login has expired. Please log in again.");
        return Ok(());
    }

    // First run binds an identity; later runs reuse the persisted context.
    if let (Some(user_id), Some(field)) = (&parsed.user_id, &parsed.field) {
        auth.select_field(UserId::new(user_id.clone()), FieldName::new(field.clone()), None)
            .await?;
    }
    let context = storage
        .contexts
        .load()
        .await?
        .ok_or(ArgsError::MissingIdentity)?;

    let engine = Arc::new(LearnEngine::new(api, &storage, clock));
    let _typewriter = TypewriterDriver::spawn(Arc::clone(&engine), parsed.speed);

    let mut popups = engine.subscribe_popups();
    let mut subscription = SseClient::new(config).subscribe(context.user_id().clone());

    engine.fetch_session_status().await?;

    println!(
        "Learning {} as {}; waiting for the stream (ctrl-c to quit)",
        context.field(),
        context.user_id()
    );

    let mut renderer = Renderer::default();
    let mut render_tick = tokio::time::interval(Duration::from_millis(50));

    loop {
        tokio::select! {
            event = subscription.next_event() => {
                let Some(event) = event else {
                    tracing::warn!("event stream closed");
                    break;
                };
                if let Err(err) = engine.handle_event(event).await {
                    tracing::warn!(error = %err, "event handling failed");
                }
            }
            popup = popups.recv() => {
                if let Ok(popup) = popup {
                    let tag = match popup.kind {
                        PopupKind::Success => "ok",
                        PopupKind::Info => "info",
                        PopupKind::Error => "error",
                    };
                    eprintln!("[{tag}] {}", popup.message);
                }
            }
            _ = render_tick.tick() => {
                renderer.render(&engine);
            }
            _ = tokio::signal::ctrl_c() => {
                println!();
                break;
            }
        }
    }

    subscription.close();
    Ok(())
}

/// Streams newly revealed text to stdout, block by block.
#[derive(Default)]
struct Renderer {
    printed: HashMap<String, usize>,
}

impl Renderer {
    fn render(&mut self, engine: &LearnEngine) {
        let snapshot = engine.snapshot();
        let mut stdout = std::io::stdout();

        for rendered in &snapshot.blocks {
            let id = rendered.block.id().to_string();
            let already = self.printed.get(&id).copied().unwrap_or(0);
            if rendered.revealed.len() <= already {
                continue;
            }
            if already == 0 {
                let title = match &rendered.block {
                    mentor_core::model::ContentBlock::Intro(b) => &b.title,
                    mentor_core::model::ContentBlock::Lesson(b) => &b.title,
                };
                let _ = writeln!(stdout, "\n\n── {title}\n");
            }
            let _ = write!(stdout, "{}", &rendered.revealed[already..]);
            let _ = stdout.flush();
            self.printed.insert(id, rendered.revealed.len());
        }
    }
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        // At this layer (binary glue), printing once is fine.
        eprintln!("{err}");
        std::process::exit(2);
    }
}
