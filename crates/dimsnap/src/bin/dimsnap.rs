//! dimsnap CLI: measure objects in photos against a reference object.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand, ValueEnum};
use dimsnap::store::{
    EnvIdentity, IdentityProvider, JsonFileStore, MeasurementStore, DEFAULT_HISTORY_LIMIT,
};
use dimsnap::{
    diagnose, CancellationToken, MeasureRequest, ReferenceCatalog, ServiceConfig, Unit, UserId,
};
use log::LevelFilter;
use serde::Serialize;

type CliError = Box<dyn std::error::Error>;
type CliResult<T> = Result<T, CliError>;

#[derive(Parser)]
#[command(name = "dimsnap")]
#[command(about = "Measure real-world object sizes in a photo using a reference object of known size")]
#[command(version)]
struct Cli {
    /// Log level for the stderr logger.
    #[arg(long, global = true, value_enum, default_value_t = LogLevel::Warn)]
    log_level: LogLevel,

    /// Emit tracing spans (human readable) instead of plain log lines.
    #[cfg(feature = "tracing")]
    #[arg(long, global = true)]
    trace: bool,

    /// Emit tracing spans as JSON lines on stderr.
    #[cfg(feature = "tracing")]
    #[arg(long, global = true)]
    trace_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Measure the target object in an image.
    Measure(MeasureArgs),

    /// List the built-in reference objects.
    References,

    /// Show a user's saved measurements, newest first.
    History {
        /// User whose history to show (default: $DIMSNAP_USER).
        #[arg(long)]
        user: Option<String>,
        #[arg(long, default_value_t = DEFAULT_HISTORY_LIMIT)]
        limit: usize,
        /// History directory (default: the platform data directory).
        #[arg(long)]
        store: Option<PathBuf>,
    },

    /// Delete one of a user's saved measurements.
    Delete {
        #[arg(long)]
        user: Option<String>,
        #[arg(long)]
        id: uuid::Uuid,
        #[arg(long)]
        store: Option<PathBuf>,
    },

    /// Check that configured detector back ends can run here.
    Diagnose {
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Write a default service config to a file.
    InitConfig {
        path: PathBuf,
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
}

#[derive(Debug, Clone, Args)]
struct MeasureArgs {
    /// Path to the photo.
    #[arg(long)]
    image: PathBuf,

    /// Reference object id (see `dimsnap references`), or `custom`.
    #[arg(long, default_value = "credit-card")]
    reference: String,

    /// Custom reference width.
    #[arg(long)]
    custom_width: Option<f64>,

    /// Custom reference height.
    #[arg(long)]
    custom_height: Option<f64>,

    /// Unit of the custom size.
    #[arg(long, value_enum)]
    unit: Option<UnitArg>,

    /// Save the result to this user's history (default: $DIMSNAP_USER).
    #[arg(long)]
    user: Option<String>,

    /// Service config (JSON).
    #[arg(long)]
    config: Option<PathBuf>,

    /// History directory; overrides the config's store_dir.
    #[arg(long)]
    store: Option<PathBuf>,

    /// Also write the response JSON to this file.
    #[arg(long)]
    out: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum UnitArg {
    Cm,
    Mm,
    In,
}

impl From<UnitArg> for Unit {
    fn from(u: UnitArg) -> Self {
        match u {
            UnitArg::Cm => Unit::Cm,
            UnitArg::Mm => Unit::Mm,
            UnitArg::In => Unit::In,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for LevelFilter {
    fn from(l: LogLevel) -> Self {
        match l {
            LogLevel::Off => LevelFilter::Off,
            LogLevel::Error => LevelFilter::Error,
            LogLevel::Warn => LevelFilter::Warn,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Debug => LevelFilter::Debug,
            LogLevel::Trace => LevelFilter::Trace,
        }
    }
}

fn init_logging(cli: &Cli) -> CliResult<()> {
    #[cfg(feature = "tracing")]
    if cli.trace || cli.trace_json {
        dimsnap::core::init_tracing(cli.trace_json);
        // already installed when the subscriber bridges log itself
        let _ = tracing_log::LogTracer::init();
        return Ok(());
    }
    dimsnap::core::init_with_level(cli.log_level.into())?;
    Ok(())
}

fn print_json(value: &impl Serialize) -> CliResult<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn load_config(path: Option<&Path>) -> CliResult<ServiceConfig> {
    match path {
        Some(p) => {
            log::info!("loading config {}", p.display());
            Ok(ServiceConfig::load_json(p)?)
        }
        None => Ok(ServiceConfig::default()),
    }
}

fn resolve_user(flag: Option<&str>) -> CliResult<Option<UserId>> {
    match flag {
        Some(u) => Ok(Some(UserId::new(u)?)),
        None => Ok(EnvIdentity::default().current_user()),
    }
}

fn require_user(flag: Option<&str>) -> CliResult<UserId> {
    resolve_user(flag)?.ok_or_else(|| "no user given; pass --user or set DIMSNAP_USER".into())
}

fn open_store(dir: Option<&Path>) -> CliResult<JsonFileStore> {
    Ok(match dir {
        Some(d) => JsonFileStore::with_root(d),
        None => JsonFileStore::from_default_project()?,
    })
}

fn run_measure(args: &MeasureArgs) -> CliResult<ExitCode> {
    let mut config = load_config(args.config.as_deref())?;
    if let Some(store) = &args.store {
        config.store_dir = Some(store.display().to_string());
    }
    let service = config.build_service();
    let user = resolve_user(args.user.as_deref())?;

    let image = std::fs::read(&args.image)
        .map_err(|e| format!("failed to read {}: {e}", args.image.display()))?;
    let request = MeasureRequest {
        image,
        reference_id: args.reference.clone(),
        custom_width: args.custom_width,
        custom_height: args.custom_height,
        unit: args.unit.map(Unit::from),
    };

    match service.measure(&request, user.as_ref(), &CancellationToken::new()) {
        Ok(response) => {
            print_json(&response)?;
            if let Some(out) = &args.out {
                std::fs::write(out, serde_json::to_string_pretty(&response)?)?;
                log::info!("response written to {}", out.display());
            }
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => {
            print_json(&err.to_response())?;
            Ok(ExitCode::from(2))
        }
    }
}

fn run_references() -> CliResult<ExitCode> {
    print_json(&ReferenceCatalog::builtin().entries())?;
    Ok(ExitCode::SUCCESS)
}

fn run_history(user: Option<&str>, limit: usize, store: Option<&Path>) -> CliResult<ExitCode> {
    let user = require_user(user)?;
    let records = open_store(store)?.list_for_user(&user, limit)?;
    print_json(&records)?;
    Ok(ExitCode::SUCCESS)
}

fn run_delete(user: Option<&str>, id: uuid::Uuid, store: Option<&Path>) -> CliResult<ExitCode> {
    let user = require_user(user)?;
    if open_store(store)?.delete(&user, id)? {
        println!("deleted {id}");
        Ok(ExitCode::SUCCESS)
    } else {
        eprintln!("no measurement {id} for {user}");
        Ok(ExitCode::from(1))
    }
}

fn run_diagnose(config: Option<&Path>) -> CliResult<ExitCode> {
    let config = load_config(config)?;
    print_json(&diagnose(&config))?;
    Ok(ExitCode::SUCCESS)
}

fn run_init_config(path: &Path, force: bool) -> CliResult<ExitCode> {
    if path.exists() && !force {
        return Err(format!("{} exists; pass --force to overwrite", path.display()).into());
    }
    ServiceConfig::default().write_json(path)?;
    println!("wrote {}", path.display());
    Ok(ExitCode::SUCCESS)
}

fn main() -> CliResult<ExitCode> {
    let cli = Cli::parse();
    init_logging(&cli)?;

    match &cli.command {
        Commands::Measure(args) => run_measure(args),
        Commands::References => run_references(),
        Commands::History { user, limit, store } => {
            run_history(user.as_deref(), *limit, store.as_deref())
        }
        Commands::Delete { user, id, store } => run_delete(user.as_deref(), *id, store.as_deref()),
        Commands::Diagnose { config } => run_diagnose(config.as_deref()),
        Commands::InitConfig { path, force } => run_init_config(path, *force),
    }
}
