use std::fmt;

use poise_core::model::{
    AppSettingsDraft, ExplorationMode, PacingFactor, ProgramId, SessionConfig, UserId,
};
use services::{AppConfig, AppServices, Clock, SessionEvent};

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    MissingArg { what: &'static str },
    UnknownArg(String),
    InvalidDbUrl { raw: String },
    InvalidUser { raw: String },
    InvalidNumber { flag: &'static str, raw: String },
    InvalidPacing { raw: String },
    InvalidMode { raw: String },
    InvalidProgram { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::MissingArg { what } => write!(f, "missing {what}"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
            ArgsError::InvalidUser { raw } => write!(f, "invalid --user value: {raw}"),
            ArgsError::InvalidNumber { flag, raw } => write!(f, "invalid {flag} value: {raw}"),
            ArgsError::InvalidPacing { raw } => {
                write!(f, "invalid --pacing value (slower|default|faster|1.5|1.0|0.75): {raw}")
            }
            ArgsError::InvalidMode { raw } => write!(
                f,
                "invalid --mode value (sequential|focused|dynamic|integrated): {raw}"
            ),
            ArgsError::InvalidProgram { raw } => write!(f, "invalid program id: {raw}"),
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

fn parse_number(raw: String, flag: &'static str) -> Result<u32, ArgsError> {
    raw.parse::<u32>()
        .map_err(|_| ArgsError::InvalidNumber { flag, raw })
}

fn parse_pacing(raw: String) -> Result<PacingFactor, ArgsError> {
    match raw.as_str() {
        "slower" => Ok(PacingFactor::Slower),
        "default" => Ok(PacingFactor::Default),
        "faster" => Ok(PacingFactor::Faster),
        _ => raw
            .parse::<f64>()
            .ok()
            .and_then(|value| PacingFactor::from_multiplier(value).ok())
            .ok_or(ArgsError::InvalidPacing { raw }),
    }
}

fn parse_mode(raw: String) -> Result<ExplorationMode, ArgsError> {
    match raw.as_str() {
        "sequential" => Ok(ExplorationMode::Sequential),
        "focused" => Ok(ExplorationMode::Focused),
        "dynamic" => Ok(ExplorationMode::Dynamic),
        "integrated" => Ok(ExplorationMode::Integrated),
        _ => Err(ArgsError::InvalidMode { raw }),
    }
}

fn parse_program(raw: String) -> Result<ProgramId, ArgsError> {
    ProgramId::new(raw.clone()).map_err(|_| ArgsError::InvalidProgram { raw })
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  cargo run -p app -- practice [options] [--duration <s>] [--pacing <p>] [--steps <n>] [--mode <m>]");
    eprintln!("  cargo run -p app -- program status [options]");
    eprintln!("  cargo run -p app -- program switch <program> [options]");
    eprintln!("  cargo run -p app -- program complete <program> <day> [options]");
    eprintln!("  cargo run -p app -- history [options]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --db <sqlite_url>         SQLite URL (default: sqlite:poise.sqlite3)");
    eprintln!("  --user <id>               User id (default: anonymous)");
    eprintln!();
    eprintln!("Practice defaults come from the stored session preferences.");
    eprintln!("Ctrl-C during practice ends the session early.");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  POISE_DB_URL, POISE_USER_ID, POISE_ANALYTICS_URL, POISE_ANALYTICS_KEY, RUST_LOG");
}

#[derive(Debug, Clone, Default)]
struct PracticeOverrides {
    duration: Option<u32>,
    pacing: Option<PacingFactor>,
    steps: Option<u32>,
    mode: Option<ExplorationMode>,
}

impl PracticeOverrides {
    fn apply(&self, mut config: SessionConfig) -> SessionConfig {
        if let Some(duration) = self.duration {
            config.total_duration_seconds = duration;
        }
        if let Some(pacing) = self.pacing {
            config.pacing = pacing;
        }
        if let Some(steps) = self.steps {
            config.step_count = steps;
        }
        if let Some(mode) = self.mode {
            config.exploration_mode = mode;
        }
        config
    }
}

#[derive(Debug, Clone)]
enum Command {
    Practice(PracticeOverrides),
    ProgramStatus,
    ProgramSwitch(ProgramId),
    ProgramComplete(ProgramId, u32),
    History,
}

struct Args {
    command: Command,
    db_url: Option<String>,
    user: Option<UserId>,
}

impl Args {
    fn parse(argv: Vec<String>) -> Result<Self, ArgsError> {
        let mut args = argv.into_iter();
        let command = match args.next().as_deref() {
            Some("practice") => Command::Practice(PracticeOverrides::default()),
            Some("history") => Command::History,
            Some("program") => match args.next().as_deref() {
                Some("status") => Command::ProgramStatus,
                Some("switch") => {
                    let raw = args.next().ok_or(ArgsError::MissingArg { what: "program" })?;
                    Command::ProgramSwitch(parse_program(raw)?)
                }
                Some("complete") => {
                    let raw = args.next().ok_or(ArgsError::MissingArg { what: "program" })?;
                    let program = parse_program(raw)?;
                    let day = args.next().ok_or(ArgsError::MissingArg { what: "day" })?;
                    Command::ProgramComplete(program, parse_number(day, "day")?)
                }
                Some(other) => return Err(ArgsError::UnknownArg(other.to_string())),
                None => return Err(ArgsError::MissingArg { what: "program subcommand" }),
            },
            Some(other) => return Err(ArgsError::UnknownArg(other.to_string())),
            None => return Err(ArgsError::MissingArg { what: "command" }),
        };

        let mut parsed = Self {
            command,
            db_url: None,
            user: None,
        };

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => {
                    let value = require_value(&mut args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    parsed.db_url = Some(normalize_sqlite_url(value));
                }
                "--user" => {
                    let value = require_value(&mut args, "--user")?;
                    parsed.user = Some(
                        UserId::new(value.clone())
                            .map_err(|_| ArgsError::InvalidUser { raw: value })?,
                    );
                }
                "--duration" | "--pacing" | "--steps" | "--mode" => {
                    let Command::Practice(overrides) = &mut parsed.command else {
                        return Err(ArgsError::UnknownArg(arg));
                    };
                    match arg.as_str() {
                        "--duration" => {
                            let value = require_value(&mut args, "--duration")?;
                            overrides.duration = Some(parse_number(value, "--duration")?);
                        }
                        "--pacing" => {
                            let value = require_value(&mut args, "--pacing")?;
                            overrides.pacing = Some(parse_pacing(value)?);
                        }
                        "--steps" => {
                            let value = require_value(&mut args, "--steps")?;
                            overrides.steps = Some(parse_number(value, "--steps")?);
                        }
                        _ => {
                            let value = require_value(&mut args, "--mode")?;
                            overrides.mode = Some(parse_mode(value)?);
                        }
                    }
                }
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        Ok(parsed)
    }

    fn into_config(self) -> Result<(Command, AppConfig), Box<dyn std::error::Error>> {
        let mut config = AppConfig::from_env()?;
        if let Some(db_url) = self.db_url {
            config.db_url = db_url;
        } else {
            config.db_url = normalize_sqlite_url(config.db_url);
        }
        if let Some(user) = self.user {
            let draft = AppSettingsDraft {
                user_id: Some(user.as_str().to_string()),
                analytics_endpoint: config
                    .settings
                    .analytics_endpoint()
                    .map(ToString::to_string),
                analytics_api_key: config.settings.analytics_api_key().map(str::to_string),
            };
            config.settings = draft.validate()?;
        }
        Ok((self.command, config))
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

async fn practice(
    services: &AppServices,
    overrides: &PracticeOverrides,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut session = services.sessions().open_realtime().await?;
    let setup = session.snapshot().await?;
    session.configure(overrides.apply(setup.config)).await?;
    let started = session.start().await?;
    println!(
        "Practicing for {}s ({} pace, {} steps, {}). Ctrl-C ends early.",
        started.config.total_duration_seconds,
        started.config.pacing.as_str(),
        started.config.step_count,
        started.config.exploration_mode.as_str()
    );

    let outcome = loop {
        tokio::select! {
            event = session.next_event() => match event {
                Some(SessionEvent::Tick { elapsed_seconds, progress, step_index }) => {
                    println!("  {elapsed_seconds:>4}s  {:>5.1}%  step {}", progress * 100.0, step_index + 1);
                }
                Some(SessionEvent::StepChanged { step_index }) => {
                    println!("  -> focus area {}", step_index + 1);
                }
                Some(SessionEvent::SessionCompleted(outcome)) => break Some(outcome),
                Some(SessionEvent::PhaseChanged { .. }) => {}
                None => break None,
            },
            _ = tokio::signal::ctrl_c() => {
                if let Err(err) = session.complete_early(Default::default()).await {
                    log::warn!("could not end the session early: {err}");
                }
            }
        }
    };

    session.close().await?;
    if let Some(outcome) = outcome {
        println!(
            "Session {} finished after {}s{}.",
            outcome.id(),
            outcome.elapsed_seconds(),
            if outcome.ended_early() { " (ended early)" } else { "" }
        );
    }
    Ok(())
}

async fn program_status(services: &AppServices) {
    for overview in services.program_overviews().await {
        let weeks: Vec<String> = overview.weeks.iter().map(ToString::to_string).collect();
        println!(
            "{:<12} {:>2}/{} days ({:>5.1}%)  resume day {:>2}  weeks [{}]  {}",
            overview.program_id.as_str(),
            overview.completed_days,
            overview.total_days,
            overview.percent_complete,
            overview.resume_day,
            weeks.join(" "),
            overview.title
        );
    }
}

async fn history(services: &AppServices) -> Result<(), Box<dyn std::error::Error>> {
    let history = services.sessions().history().await?;
    if history.is_empty() {
        println!("No completed sessions yet.");
    }
    for outcome in history {
        println!(
            "{}  {}s of {}s  {}{}",
            outcome.completed_at().to_rfc3339(),
            outcome.elapsed_seconds(),
            outcome.config().total_duration_seconds,
            outcome.config().exploration_mode.as_str(),
            if outcome.ended_early() { " (ended early)" } else { "" }
        );
    }
    Ok(())
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let argv: Vec<String> = std::env::args().skip(1).collect();
    if matches!(argv.first().map(String::as_str), Some("--help" | "-h")) {
        print_usage();
        return Ok(());
    }

    let args = Args::parse(argv).map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;
    let (command, config) = args.into_config()?;

    // Open + migrate SQLite at startup. Keep this in the binary glue so core/services stay pure.
    prepare_sqlite_file(&config.db_url)?;
    let services = AppServices::new_sqlite(&config, Clock::system()).await?;
    log::info!("signed in as {}", services.user());

    match command {
        Command::Practice(overrides) => practice(&services, &overrides).await?,
        Command::ProgramStatus => program_status(&services).await,
        Command::ProgramSwitch(program) => {
            let day = services.switch_program(&program).await?;
            println!("{program}: continue with day {day}");
        }
        Command::ProgramComplete(program, day) => {
            let events = services.mark_day_complete(&program, day).await?;
            if events.is_empty() {
                println!("{program} day {day} was already complete");
            } else {
                println!("{program} day {day} marked complete");
            }
        }
        Command::History => history(&services).await?,
    }

    services.shutdown().await;
    Ok(())
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(err) = run().await {
        // At this layer (binary glue), printing once is fine.
        eprintln!("{err}");
        std::process::exit(2);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(args: &[&str]) -> Vec<String> {
        args.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn practice_overrides_are_parsed() {
        let args = Args::parse(argv(&[
            "practice", "--duration", "60", "--pacing", "faster", "--mode", "dynamic",
        ]))
        .unwrap();
        let Command::Practice(overrides) = args.command else {
            panic!("expected practice");
        };
        let config = overrides.apply(SessionConfig::new(
            300,
            PacingFactor::Default,
            8,
            ExplorationMode::Sequential,
        ));
        assert_eq!(config.total_duration_seconds, 60);
        assert_eq!(config.pacing, PacingFactor::Faster);
        assert_eq!(config.step_count, 8);
        assert_eq!(config.exploration_mode, ExplorationMode::Dynamic);
    }

    #[test]
    fn pacing_accepts_multipliers() {
        let args = Args::parse(argv(&["practice", "--pacing", "1.5"])).unwrap();
        let Command::Practice(overrides) = args.command else {
            panic!("expected practice");
        };
        assert_eq!(overrides.pacing, Some(PacingFactor::Slower));
        assert_eq!(parse_pacing("0.75".into()).unwrap(), PacingFactor::Faster);
    }

    #[test]
    fn program_complete_needs_program_and_day() {
        let args = Args::parse(argv(&["program", "complete", "presence", "5", "--user", "ana"]))
            .unwrap();
        assert!(matches!(args.command, Command::ProgramComplete(ref p, 5) if p.as_str() == "presence"));
        assert_eq!(args.user.unwrap().as_str(), "ana");

        assert!(matches!(
            Args::parse(argv(&["program", "complete", "presence"])),
            Err(ArgsError::MissingArg { what: "day" })
        ));
    }

    #[test]
    fn practice_flags_are_rejected_for_other_commands() {
        assert!(matches!(
            Args::parse(argv(&["history", "--steps", "4"])),
            Err(ArgsError::UnknownArg(_))
        ));
    }

    #[test]
    fn bad_values_are_reported() {
        assert!(matches!(
            Args::parse(argv(&["practice", "--pacing", "warp"])),
            Err(ArgsError::InvalidPacing { .. })
        ));
        assert!(matches!(
            Args::parse(argv(&["practice", "--pacing", "2.0"])),
            Err(ArgsError::InvalidPacing { .. })
        ));
        assert!(matches!(
            Args::parse(argv(&["practice", "--db", " "])),
            Err(ArgsError::InvalidDbUrl { .. })
        ));
    }

    #[test]
    fn sqlite_urls_are_made_absolute() {
        assert_eq!(normalize_sqlite_url("sqlite::memory:".into()), "sqlite::memory:");
        assert_eq!(
            normalize_sqlite_url("sqlite:///tmp/poise.db".into()),
            "sqlite:///tmp/poise.db"
        );
        assert!(normalize_sqlite_url("sqlite:poise.db".into()).starts_with("sqlite:///"));
    }
}
