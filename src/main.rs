use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use stylesync::config::{self, SyncConfig};
use stylesync::reconcile::{ReconciliationPlan, Reconciler, SyncOptions};
use stylesync::storage::{self, Storage, StorageKind};
use stylesync::styles::StyleRegistry;
use stylesync::{expected, output, provider};

/// Environment variable holding the bearer token for `--storage drive`.
const DRIVE_TOKEN_ENV: &str = "STYLESYNC_DRIVE_TOKEN";

/// Environment variable holding the container SAS URL for `--storage blob`.
const BLOB_URL_ENV: &str = "STYLESYNC_BLOB_URL";

#[derive(Parser)]
#[command(name = "stylesync")]
#[command(version)]
#[command(about = "Keep AI-styled image variants in sync with your source images")]
#[command(long_about = "\
Keep AI-styled image variants in sync with your source images

For every source image and every enabled style, exactly one styled image
exists in the output tree. Missing or outdated variants are generated,
variants of deleted images or removed styles are deleted, everything else
is left alone.

Output layout (naming = \"style-folder\"):

  styled/
  ├── .stylesync-manifest.json     # What each variant was generated from
  ├── original/trip/a.jpg          # Unmodified copy of images/trip/a.jpg
  ├── anime/trip/a.jpg             # Style \"anime\"
  └── sketch/trip/a.jpg            # Style \"sketch\"

Remote backends read their credential from the environment:
STYLESYNC_DRIVE_TOKEN for --storage drive, STYLESYNC_BLOB_URL (a container
SAS URL) for --storage blob. --source and --output are then folders inside
the drive or container.

Run 'stylesync gen-config' to generate a documented stylesync.toml.")]
struct Cli {
    /// Config file
    #[arg(long, default_value = "stylesync.toml", global = true)]
    config: PathBuf,

    /// Source image root
    #[arg(long, default_value = "images", global = true)]
    source: String,

    /// Output root for styled images
    #[arg(long, default_value = "styled", global = true)]
    output: String,

    /// Storage backend for both roots
    #[arg(long, value_enum, default_value = "local", global = true)]
    storage: StorageArg,

    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, ValueEnum)]
enum StorageArg {
    Local,
    Drive,
    Blob,
}

impl From<StorageArg> for StorageKind {
    fn from(arg: StorageArg) -> Self {
        match arg {
            StorageArg::Local => StorageKind::Local,
            StorageArg::Drive => StorageKind::Drive,
            StorageArg::Blob => StorageKind::Blob,
        }
    }
}

/// Shared flags for commands that plan a run.
#[derive(clap::Args, Clone)]
struct RunArgs {
    /// Only sync this style (repeatable); other styles count as disabled
    #[arg(long = "style", value_name = "NAME")]
    styles: Vec<String>,

    /// Print JSON instead of text
    #[arg(long)]
    json: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Generate missing and stale variants, delete orphans
    Sync {
        #[command(flatten)]
        run: RunArgs,

        /// Also write the JSON summary to this file
        #[arg(long, value_name = "FILE")]
        report: Option<PathBuf>,
    },
    /// Show what sync would do, without changing anything
    Plan(RunArgs),
    /// Validate config and source tree without syncing
    Check,
    /// Print a stock stylesync.toml with all options documented
    GenConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    match &cli.command {
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
        Command::Check => {
            let (config, registry) = load(&cli, &[])?;
            registry.check_naming(config.naming)?;
            output::print_styles(&registry, config.naming);
            storage::check_roots(cli.storage.into(), &cli.source, &cli.output)?;
            let source = open_storage(&cli, &cli.source)?;
            let sources = expected::discover_sources(source.as_ref(), &config.extensions)?;
            let expected =
                expected::compute(&sources, &registry, config.naming, config.mirror_originals)?;
            println!(
                "==> {} source images, {} expected artifacts in {}",
                sources.len(),
                expected.len(),
                source.describe()
            );
            println!("==> Configuration is valid");
        }
        Command::Plan(run) => {
            let (config, registry) = load(&cli, &run.styles)?;
            storage::check_roots(cli.storage.into(), &cli.source, &cli.output)?;
            let source = open_storage(&cli, &cli.source)?;
            let out = open_storage(&cli, &cli.output)?;
            let reconciler = Reconciler::new(
                source.as_ref(),
                out.as_ref(),
                &registry,
                SyncOptions::from_config(&config),
            )?;
            let plan = reconciler.plan()?;
            if run.json {
                println!("{}", serde_json::to_string_pretty(&plan_json(&plan))?);
            } else {
                output::print_plan(&plan);
            }
        }
        Command::Sync { run, report } => {
            let (config, registry) = load(&cli, &run.styles)?;
            let provider_config = config
                .provider
                .as_ref()
                .ok_or("no [provider] section in config; sync needs one")?;
            let provider = provider::from_config(provider_config);
            storage::check_roots(cli.storage.into(), &cli.source, &cli.output)?;
            let source = open_storage(&cli, &cli.source)?;
            let out = open_storage(&cli, &cli.output)?;
            let reconciler = Reconciler::new(
                source.as_ref(),
                out.as_ref(),
                &registry,
                SyncOptions::from_config(&config),
            )?;

            if !run.json && !cli.quiet {
                println!(
                    "==> Syncing {} → {} with {}",
                    source.describe(),
                    out.describe(),
                    provider.name()
                );
            }

            let (tx, printer) = if run.json || cli.quiet {
                (None, None)
            } else {
                let (tx, rx) = std::sync::mpsc::channel();
                let printer = std::thread::spawn(move || {
                    for event in rx {
                        for line in output::format_sync_event(&event) {
                            println!("{}", line);
                        }
                    }
                });
                (Some(tx), Some(printer))
            };
            let result = reconciler.sync(provider.as_ref(), tx)?;
            if let Some(printer) = printer {
                printer
                    .join()
                    .map_err(|_| "progress printer thread panicked")?;
            }

            let json = serde_json::to_string_pretty(&result.summary)?;
            if let Some(path) = report {
                std::fs::write(path, &json)?;
            }
            if run.json {
                println!("{}", json);
            } else {
                output::print_summary(&result.summary);
            }
            if !result.summary.is_complete() {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}

/// Initialize logging based on `-v` count and `-q`.
fn init_logging(verbose: u8, quiet: bool) {
    let level = match verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    env_logger::Builder::new()
        .filter_level(if quiet {
            log::LevelFilter::Error
        } else {
            level
        })
        .format_timestamp(None)
        .init();
}

/// Load config and build the registry, applying any `--style` selection.
fn load(
    cli: &Cli,
    styles: &[String],
) -> Result<(SyncConfig, StyleRegistry), config::ConfigError> {
    let config = config::load_config(&cli.config)?;
    let registry = config.registry()?;
    let registry = if styles.is_empty() {
        registry
    } else {
        registry.select(styles)?
    };
    Ok((config, registry))
}

fn open_storage(cli: &Cli, root: &str) -> Result<Box<dyn Storage>, storage::StorageError> {
    let credential = match cli.storage {
        StorageArg::Local => None,
        StorageArg::Drive => std::env::var(DRIVE_TOKEN_ENV).ok(),
        StorageArg::Blob => std::env::var(BLOB_URL_ENV).ok(),
    };
    storage::open(cli.storage.into(), root, credential.as_deref())
}

fn plan_json(plan: &ReconciliationPlan) -> serde_json::Value {
    serde_json::json!({
        "sources_found": plan.sources_found,
        "expected": plan.expected(),
        "generate": plan
            .to_generate
            .iter()
            .map(|i| serde_json::json!({
                "path": i.artifact.output_path,
                "source": i.artifact.source.path,
                "kind": i.artifact.kind,
                "reason": i.reason,
            }))
            .collect::<Vec<_>>(),
        "delete": plan.to_delete.iter().map(|e| &e.path).collect::<Vec<_>>(),
        "skip": plan.to_skip.iter().map(|a| &a.output_path).collect::<Vec<_>>(),
    })
}
