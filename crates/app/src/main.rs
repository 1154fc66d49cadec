use std::fmt;

use chrono::Duration;
use quiz_core::model::{CategoryScope, UserId};
use services::{Clock, CompletedSession, QuizServices, StartConfig};
use tracing_subscriber::{EnvFilter, fmt as log_fmt, layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod fixtures;

use config::Config;

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    MissingFlag { flag: &'static str },
    UnknownArg(String),
    InvalidUserId { raw: String },
    InvalidMinutes { raw: String },
    InvalidScope { raw: String },
    InvalidAssignment { raw: String },
    InvalidDbUrl { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::MissingFlag { flag } => write!(f, "{flag} is required"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidUserId { raw } => write!(f, "invalid --user value: {raw}"),
            ArgsError::InvalidMinutes { raw } => {
                write!(f, "invalid --older-than-mins value: {raw}")
            }
            ArgsError::InvalidScope { raw } => write!(f, "invalid --scope value: {raw}"),
            ArgsError::InvalidAssignment { raw } => {
                write!(f, "expected key=value, got: {raw}")
            }
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
    eprintln!("  cargo run -p app -- seed     [--db <sqlite_url>]");
    eprintln!("  cargo run -p app -- demo     --user <id> [--scope mixed|<category_id>] [--db <sqlite_url>]");
    eprintln!("  cargo run -p app -- stats    --user <id> [--db <sqlite_url>]");
    eprintln!("  cargo run -p app -- settings [key=value ...] [--db <sqlite_url>]");
    eprintln!("  cargo run -p app -- sweep    --older-than-mins <n> [--db <sqlite_url>]");
    eprintln!();
    eprintln!("Defaults:");
    eprintln!("  --db sqlite://quiz.sqlite3");
    eprintln!("  --scope mixed");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  QUIZ_DB_URL, RUST_LOG");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Seed,
    Demo,
    Stats,
    Settings,
    Sweep,
}

impl Command {
    fn from_arg(arg: &str) -> Option<Self> {
        match arg {
            "seed" => Some(Self::Seed),
            "demo" => Some(Self::Demo),
            "stats" => Some(Self::Stats),
            "settings" => Some(Self::Settings),
            "sweep" => Some(Self::Sweep),
            _ => None,
        }
    }
}

#[derive(Debug)]
struct Args {
    db_url: String,
    user_id: Option<UserId>,
    scope: CategoryScope,
    older_than_mins: Option<i64>,
    assignments: Vec<(String, String)>,
}

impl Args {
    fn parse(
        args: &mut impl Iterator<Item = String>,
        default_db_url: String,
    ) -> Result<Self, ArgsError> {
        let mut parsed = Self {
            db_url: default_db_url,
            user_id: None,
            scope: CategoryScope::Mixed,
            older_than_mins: None,
            assignments: Vec::new(),
        };

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => {
                    let value = require_value(args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    parsed.db_url = normalize_sqlite_url(value);
                }
                "--user" => {
                    let value = require_value(args, "--user")?;
                    let user_id = value
                        .parse::<UserId>()
                        .map_err(|_| ArgsError::InvalidUserId { raw: value.clone() })?;
                    parsed.user_id = Some(user_id);
                }
                "--scope" => {
                    let value = require_value(args, "--scope")?;
                    parsed.scope = value
                        .parse()
                        .map_err(|_| ArgsError::InvalidScope { raw: value.clone() })?;
                }
                "--older-than-mins" => {
                    let value = require_value(args, "--older-than-mins")?;
                    let mins = value
                        .parse::<i64>()
                        .ok()
                        .filter(|m| *m >= 0)
                        .ok_or_else(|| ArgsError::InvalidMinutes { raw: value.clone() })?;
                    parsed.older_than_mins = Some(mins);
                }
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                other if other.contains('=') && !other.starts_with("--") => {
                    let (key, value) = other
                        .split_once('=')
                        .ok_or_else(|| ArgsError::InvalidAssignment { raw: arg.clone() })?;
                    if key.trim().is_empty() {
                        return Err(ArgsError::InvalidAssignment { raw: arg.clone() });
                    }
                    parsed
                        .assignments
                        .push((key.trim().to_string(), value.trim().to_string()));
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        Ok(parsed)
    }

    fn user(&self) -> Result<UserId, ArgsError> {
        self.user_id.ok_or(ArgsError::MissingFlag { flag: "--user" })
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

fn init_logging(config: &Config) {
    // stdout carries command output; logs go to stderr.
    let env_filter = EnvFilter::new(&config.rust_log);
    let stderr_layer = log_fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false);
    tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer)
        .init();
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::from_env();
    init_logging(&config);

    let mut argv = std::env::args().skip(1);
    let cmd = match argv.next() {
        None => {
            print_usage();
            return Ok(());
        }
        Some(first) if first == "--help" || first == "-h" => {
            print_usage();
            return Ok(());
        }
        Some(first) => Command::from_arg(&first).ok_or_else(|| {
            eprintln!("unknown subcommand: {first}");
            print_usage();
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "unknown subcommand")
        })?,
    };

    let parsed = Args::parse(&mut argv, config.db_url.clone()).map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    // Open + migrate SQLite here so the library crates never touch the filesystem.
    prepare_sqlite_file(&parsed.db_url)?;
    let services = QuizServices::new_sqlite(&parsed.db_url, Clock::system()).await?;
    tracing::debug!(db_url = %parsed.db_url, ?cmd, "storage ready");

    match cmd {
        Command::Seed => {
            let written = fixtures::load(&services.content()).await?;
            println!("seeded {written} questions into {}", parsed.db_url);
        }
        Command::Demo => {
            let user_id = parsed.user()?;
            fixtures::load(&services.content()).await?;
            let completed = run_demo(&services, user_id, parsed.scope).await?;
            println!("{}", serde_json::to_string_pretty(&completed)?);
        }
        Command::Stats => {
            let user_id = parsed.user()?;
            let stats = services.stats().list_stats(user_id).await?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        Command::Settings => {
            let settings = services.settings();
            for (key, value) in &parsed.assignments {
                settings.update_option(key, value).await?;
            }
            let effective = settings.load().await?;
            println!("{}", serde_json::to_string_pretty(&effective)?);
        }
        Command::Sweep => {
            let mins = parsed
                .older_than_mins
                .ok_or(ArgsError::MissingFlag {
                    flag: "--older-than-mins",
                })?;
            let swept = services
                .sessions()
                .abandon_stale(Duration::minutes(mins))
                .await?;
            println!("abandoned {} stale session(s)", swept.len());
        }
    }

    Ok(())
}

/// Play one session end to end: answer the first half correctly, the rest
/// wrong, leave the last question blank, then complete it.
///
/// The session size is capped at the pool size so a small bank still plays.
async fn run_demo(
    services: &QuizServices,
    user_id: UserId,
    scope: CategoryScope,
) -> Result<CompletedSession, Box<dyn std::error::Error>> {
    let sessions = services.sessions();
    let content = services.content();

    let configured = services.settings().load().await?.questions_per_session();
    let pool = u32::try_from(content.count_questions(scope).await?).unwrap_or(u32::MAX);
    // an empty pool keeps the configured size so start reports InsufficientContent
    let question_count = (pool > 0).then(|| configured.min(pool));

    let session = sessions
        .start_session(
            user_id,
            scope,
            StartConfig {
                question_count,
                seed: None,
            },
        )
        .await?;
    let ids = session.question_ids().to_vec();
    let half = ids.len() / 2;

    for (position, question_id) in ids.iter().enumerate() {
        if position + 1 == ids.len() && ids.len() > 1 {
            break;
        }
        let options = content.get_options(*question_id).await?;
        let choice = if position < half {
            options.iter().find(|o| o.is_correct)
        } else {
            options.iter().find(|o| !o.is_correct)
        };
        sessions
            .submit_answer(session.id(), *question_id, choice.map(|o| o.id))
            .await?;
    }

    let progress = sessions.progress(session.id()).await?;
    tracing::info!(
        answered = progress.answered,
        remaining = progress.remaining,
        "demo answers submitted"
    );

    Ok(sessions.complete_session(session.id()).await?)
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

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("{err}");
        std::process::exit(2);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quiz_core::model::CategoryId;
    use quiz_core::time::fixed_clock;

    fn parse(args: &[&str]) -> Result<Args, ArgsError> {
        let mut iter = args.iter().map(|s| (*s).to_string());
        Args::parse(&mut iter, "sqlite::memory:".into())
    }

    #[test]
    fn parses_flags_and_assignments() {
        let args = parse(&["--user", "7", "--scope", "2", "pass_threshold=80"]).unwrap();
        assert_eq!(args.user_id, Some(UserId::new(7)));
        assert!(matches!(args.scope, CategoryScope::Category(id) if id.value() == 2));
        assert_eq!(
            args.assignments,
            vec![("pass_threshold".to_string(), "80".to_string())]
        );
        assert_eq!(args.db_url, "sqlite::memory:");
    }

    #[test]
    fn rejects_bad_values() {
        assert!(matches!(
            parse(&["--user", "abc"]),
            Err(ArgsError::InvalidUserId { .. })
        ));
        assert!(matches!(
            parse(&["--older-than-mins", "-5"]),
            Err(ArgsError::InvalidMinutes { .. })
        ));
        assert!(matches!(
            parse(&["--user"]),
            Err(ArgsError::MissingValue { flag: "--user" })
        ));
        assert!(matches!(parse(&["=x"]), Err(ArgsError::InvalidAssignment { .. })));
        assert!(matches!(parse(&["--bogus"]), Err(ArgsError::UnknownArg(_))));
        assert!(matches!(
            parse(&[]).unwrap().user(),
            Err(ArgsError::MissingFlag { flag: "--user" })
        ));
    }

    #[tokio::test]
    async fn demo_plays_with_default_settings() {
        let services = QuizServices::in_memory(fixed_clock());
        fixtures::load(&services.content()).await.unwrap();
        let user = UserId::new(1);

        let completed = run_demo(&services, user, CategoryScope::Mixed).await.unwrap();
        assert_eq!(completed.report.total, 6);
        assert_eq!(completed.report.correct, 3);
        assert_eq!(completed.report.answered(), 5);

        let scoped = CategoryScope::Category(CategoryId::new(1));
        let completed = run_demo(&services, user, scoped).await.unwrap();
        assert_eq!(completed.report.total, 3);
        assert_eq!(services.stats().list_stats(user).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn demo_without_content_fails() {
        let services = QuizServices::in_memory(fixed_clock());
        let err = run_demo(&services, UserId::new(1), CategoryScope::Mixed)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not enough questions"));
    }

    #[test]
    fn normalizes_relative_paths() {
        assert_eq!(normalize_sqlite_url("sqlite::memory:".into()), "sqlite::memory:");
        assert_eq!(
            normalize_sqlite_url("sqlite:///tmp/q.db".into()),
            "sqlite:///tmp/q.db"
        );
        let url = normalize_sqlite_url("data/q.db".into());
        assert!(url.starts_with("sqlite://"));
        assert!(url.ends_with("data/q.db"));
    }
}
