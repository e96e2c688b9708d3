use std::fmt;
use std::sync::Arc;

use poise_core::model::{
    ProgramCatalog, ProgramId, SessionPreferences, StoredLedger, UserId,
};
use storage::repository::{PersistenceKey, StaticIdentity, Storage, save_json};

#[derive(Debug, Clone)]
struct Args {
    db_url: String,
    user: UserId,
    legacy: bool,
    program: Option<ProgramId>,
    days: Vec<u32>,
}

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    UnknownArg(String),
    InvalidUser { raw: String },
    InvalidProgram { raw: String },
    InvalidDays { raw: String },
    InvalidDbUrl { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidUser { raw } => write!(f, "invalid --user value: {raw}"),
            ArgsError::InvalidProgram { raw } => write!(f, "invalid --program value: {raw}"),
            ArgsError::InvalidDays { raw } => {
                write!(f, "invalid --days value (expected e.g. 1,2,5): {raw}")
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

fn parse_days(raw: &str) -> Result<Vec<u32>, ArgsError> {
    raw.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            part.parse::<u32>()
                .ok()
                .filter(|day| *day > 0)
                .ok_or_else(|| ArgsError::InvalidDays {
                    raw: raw.to_string(),
                })
        })
        .collect()
}

impl Args {
    fn parse() -> Result<Self, ArgsError> {
        let mut db_url =
            std::env::var("POISE_DB_URL").unwrap_or_else(|_| "sqlite:dev.sqlite3".into());
        let mut user = std::env::var("POISE_USER_ID")
            .ok()
            .and_then(|value| UserId::new(value).ok())
            .unwrap_or_else(UserId::anonymous);
        let mut legacy = false;
        let mut program = None;
        let mut days = vec![1, 2, 3];

        let mut args = std::env::args().skip(1);
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => {
                    let value = require_value(&mut args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    db_url = value;
                }
                "--user" => {
                    let value = require_value(&mut args, "--user")?;
                    user = UserId::new(value.clone())
                        .map_err(|_| ArgsError::InvalidUser { raw: value })?;
                }
                "--program" => {
                    let value = require_value(&mut args, "--program")?;
                    program = Some(
                        ProgramId::new(value.clone())
                            .map_err(|_| ArgsError::InvalidProgram { raw: value })?,
                    );
                }
                "--days" => {
                    let value = require_value(&mut args, "--days")?;
                    days = parse_days(&value)?;
                }
                "--legacy" => legacy = true,
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        Ok(Self {
            db_url,
            user,
            legacy,
            program,
            days,
        })
    }
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  cargo run -p storage --bin seed -- [options]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --db <sqlite_url>         SQLite URL (default: sqlite:dev.sqlite3)");
    eprintln!("  --user <id>               User whose data is seeded (default: anonymous)");
    eprintln!("  --program <id>            Program receiving the days (default: catalog default)");
    eprintln!("  --days <list>             Completed days, comma separated (default: 1,2,3)");
    eprintln!("  --legacy                  Write the old flat-array progress shape");
    eprintln!("  -h, --help                Show this help");
    eprintln!();
    eprintln!("Environment (same as flags):");
    eprintln!("  POISE_DB_URL, POISE_USER_ID");
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse().map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    let identity = Arc::new(StaticIdentity::new(args.user.clone()));
    let storage = Storage::sqlite(&args.db_url, identity).await?;
    let catalog = ProgramCatalog::builtin();

    let stored = if args.legacy {
        StoredLedger::Legacy(args.days.clone())
    } else {
        let program = match args.program {
            Some(id) => catalog.require(&id)?.id().clone(),
            None => catalog.default_program().id().clone(),
        };
        StoredLedger::Current([(program, args.days.clone())].into_iter().collect())
    };

    save_json(
        storage.kv.as_ref(),
        &args.user,
        PersistenceKey::ProgramProgress,
        &stored,
    )
    .await?;
    save_json(
        storage.kv.as_ref(),
        &args.user,
        PersistenceKey::SessionPreferences,
        &SessionPreferences::default(),
    )
    .await?;

    println!(
        "Seeded {} progress ({} days) and default preferences for {} into {}",
        if stored.is_legacy() { "legacy" } else { "current" },
        args.days.len(),
        args.user,
        args.db_url
    );

    Ok(())
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("{err}");
        std::process::exit(2);
    }
}
