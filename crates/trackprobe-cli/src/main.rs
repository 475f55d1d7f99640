//! `trackprobe`: run the telemetry scenario catalog against an Appium endpoint.
//!
//! Exit codes: 0 when every scenario passed, 1 when any scenario or recovery
//! failed, 2 when no session could be started, 3 on configuration errors.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use trackprobe_core::catalog::Catalog;
use trackprobe_core::config::{ProfileOverrides, TrackprobeConfig};
use trackprobe_core::element::AmbiguityPolicy;
use trackprobe_core::journal::StepJournal;
use trackprobe_core::runner::run_suite;
use trackprobe_core::session::AppiumConnector;

/// UI scenario runner for the Application Insights Android sample app.
#[derive(Parser)]
#[command(name = "trackprobe", version, about)]
struct Cli {
    /// Config file (defaults to ~/.trackprobe/config.json)
    #[arg(long, global = true, env = "TRACKPROBE_CONFIG")]
    config: Option<PathBuf>,

    /// Write logs to this file instead of stderr
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, ValueEnum)]
enum CatalogKind {
    /// Telemetry toggles against the sample app
    Telemetry,
    /// Device settings checks
    Settings,
}

#[derive(clap::Args)]
struct CatalogArgs {
    /// Built-in catalog to use
    #[arg(long, value_enum, default_value = "telemetry")]
    catalog: CatalogKind,

    /// Load the catalog from a JSON file instead
    #[arg(long, conflicts_with = "catalog")]
    catalog_file: Option<PathBuf>,

    /// Only keep entries whose id or label contains this text
    #[arg(long)]
    only: Option<String>,
}

#[derive(Subcommand)]
enum Command {
    /// Run a scenario catalog in one session
    Run {
        /// Profile name
        #[arg(short, long, env = "TRACKPROBE_PROFILE")]
        profile: Option<String>,

        /// Override the Appium endpoint URL
        #[arg(long, env = "TRACKPROBE_SERVER_URL")]
        server_url: Option<String>,

        /// Override the APK path or URL
        #[arg(long, env = "TRACKPROBE_APP")]
        app: Option<String>,

        /// Override the device name
        #[arg(long, env = "TRACKPROBE_DEVICE")]
        device: Option<String>,

        #[command(flatten)]
        catalog: CatalogArgs,

        /// Fail a step when several elements share the text it looks for
        #[arg(long)]
        reject_ambiguous: bool,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,

        /// Do not write a step journal file
        #[arg(long)]
        no_journal: bool,
    },

    /// List catalog entries
    List {
        #[command(flatten)]
        catalog: CatalogArgs,

        /// Also print every step
        #[arg(long)]
        steps: bool,
    },

    /// List known profiles
    Profiles,
}

enum CliError {
    Config(String),
    SessionStart(String),
    /// Carries the report's exit code and summary line.
    ScenariosFailed(u8, String),
}

impl CliError {
    fn exit_code(&self) -> ExitCode {
        match self {
            CliError::ScenariosFailed(code, _) => ExitCode::from(*code),
            CliError::SessionStart(_) => ExitCode::from(2),
            CliError::Config(_) => ExitCode::from(3),
        }
    }
}

impl std::fmt::Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CliError::Config(msg) => write!(f, "{}", msg),
            CliError::SessionStart(msg) => write!(f, "{}", msg),
            CliError::ScenariosFailed(_, summary) => write!(f, "run failed: {}", summary),
        }
    }
}

fn init_logging(log_file: Option<&Path>, json: bool) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    match log_file {
        Some(path) => {
            let dir = path.parent().unwrap_or_else(|| Path::new("."));
            let name = path.file_name().unwrap_or_else(|| "trackprobe.log".as_ref());
            let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::never(dir, name));
            let builder = builder.with_writer(writer).with_ansi(false);
            if json {
                builder.json().init();
            } else {
                builder.init();
            }
            Some(guard)
        }
        None => {
            let builder = builder.with_writer(std::io::stderr);
            if json {
                builder.json().init();
            } else {
                builder.init();
            }
            None
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let _guard = init_logging(cli.log_file.as_deref(), cli.log_json);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            e.exit_code()
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<TrackprobeConfig, CliError> {
    match path {
        Some(path) => TrackprobeConfig::load_from(path),
        None => TrackprobeConfig::load(),
    }
    .map_err(|e| CliError::Config(e.to_string()))
}

fn load_catalog(args: &CatalogArgs) -> Result<Catalog, CliError> {
    let catalog = match &args.catalog_file {
        Some(path) => Catalog::from_json_file(path)
            .map_err(|e| CliError::Config(format!("{}: {}", path.display(), e)))?,
        None => match args.catalog {
            CatalogKind::Telemetry => Catalog::telemetry(),
            CatalogKind::Settings => Catalog::settings(),
        },
    };
    let catalog = match &args.only {
        Some(pattern) => catalog.filter(pattern),
        None => catalog,
    };
    if catalog.is_empty() {
        return Err(CliError::Config("no catalog entries selected".to_string()));
    }
    Ok(catalog)
}

async fn run(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        Command::Run {
            profile,
            server_url,
            app,
            device,
            catalog,
            reject_ambiguous,
            json,
            no_journal,
        } => {
            let config = load_config(cli.config.as_deref())?;
            let profile_name = profile.unwrap_or_else(|| config.default_profile_name().to_string());
            let mut profile = config
                .profile(&profile_name)
                .map_err(|e| CliError::Config(e.to_string()))?;
            profile.apply(&ProfileOverrides {
                server_url,
                app,
                device_name: device,
                ambiguity: reject_ambiguous.then_some(AmbiguityPolicy::Reject),
            });
            profile.validate().map_err(|e| CliError::Config(e.to_string()))?;
            let catalog = load_catalog(&catalog)?;

            let journal = if no_journal {
                StepJournal::in_memory()
            } else {
                StepJournal::with_log_dir(&config.log_dir(), &profile_name)
            };
            if let Some(path) = journal.path() {
                info!(path = %path.display(), "writing step journal");
            }

            info!(profile = %profile_name, entries = catalog.len(), "starting run");
            let report = run_suite(&AppiumConnector, &profile, &catalog, Some(Arc::new(journal)))
                .await
                .map_err(|e| CliError::SessionStart(e.to_string()))?;

            if json {
                let text = serde_json::to_string_pretty(&report).map_err(|e| CliError::Config(e.to_string()))?;
                println!("{}", text);
            } else {
                println!("{}", report.render_text());
            }

            match report.exit_code() {
                0 => Ok(()),
                code => Err(CliError::ScenariosFailed(code, report.summary())),
            }
        }

        Command::List { catalog, steps } => {
            let catalog = load_catalog(&catalog)?;
            for entry in catalog.entries() {
                println!("{:<24} {}", entry.id, entry.label());
                if steps {
                    for (i, step) in entry.scenario.steps.iter().enumerate() {
                        println!("    {:>3}. {}", i + 1, step);
                    }
                    for step in &entry.recovery {
                        println!("      +  {}", step);
                    }
                }
            }
            Ok(())
        }

        Command::Profiles => {
            let config = load_config(cli.config.as_deref())?;
            let default = config.default_profile_name();
            for name in config.profile_names() {
                let profile = config.profile(&name).map_err(|e| CliError::Config(e.to_string()))?;
                let marker = if name == default { "*" } else { " " };
                println!("{} {:<16} {} ({})", marker, name, profile.server_url, profile.device_name);
            }
            Ok(())
        }
    }
}
