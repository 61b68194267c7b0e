//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use bookcorpus_core::filter::HeuristicFilter;
use bookcorpus_core::pipeline::{
    PackageOutcome, ProgressReporter, RunOptions, RunSummary, extract_package, run_catalog,
};
use bookcorpus_core::progress::ProgressLedger;
use bookcorpus_shared::{
    AppConfig, ExtractConfig, PackageDescriptor, init_config, load_config, load_config_from,
};
use bookcorpus_storage::ArrowStore;
use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// bookcorpus: build a text corpus from unpacked e-book packages.
#[derive(Parser)]
#[command(
    name = "bookcorpus",
    version,
    about = "Extract reading-order text from e-book packages into a keyed Arrow store.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file to use instead of ~/.bookcorpus/bookcorpus.toml.
    #[arg(long, global = true, env = "BOOKCORPUS_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Process every package in a catalog into the store.
    Build {
        /// JSON array of packages ({ name, key, version, path }).
        #[arg(long)]
        catalog: PathBuf,

        /// Store file (defaults to the configured store_path).
        #[arg(long)]
        store: Option<PathBuf>,

        /// Progress ledger file (defaults to the configured progress_path).
        #[arg(long)]
        progress: Option<PathBuf>,

        /// Reprocess packages the ledger already has at the same version.
        #[arg(long)]
        force: bool,

        /// Read at most this many content files per package.
        #[arg(long)]
        max_files: Option<usize>,
    },

    /// Extract one package and print its text without touching the store.
    Extract {
        /// Package root directory.
        package_dir: PathBuf,

        /// Record key (defaults to the directory name).
        #[arg(long)]
        key: Option<String>,

        /// Write the text to this file instead of stdout.
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Read at most this many content files.
        #[arg(long)]
        max_files: Option<usize>,
    },

    /// List the records in the store.
    List {
        /// Store file (defaults to the configured store_path).
        #[arg(long)]
        store: Option<PathBuf>,
    },

    /// Print the text of one record.
    Show {
        /// Record key.
        key: String,

        /// Store file (defaults to the configured store_path).
        #[arg(long)]
        store: Option<PathBuf>,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

const CRATE_TARGETS: [&str; 6] = [
    "bookcorpus",
    "bookcorpus_core",
    "bookcorpus_opf",
    "bookcorpus_markdown",
    "bookcorpus_storage",
    "bookcorpus_shared",
];

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let directives = CRATE_TARGETS
        .iter()
        .map(|target| format!("{target}={level}"))
        .collect::<Vec<_>>()
        .join(",");

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("warn,{directives}")));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config;
    let config = || -> Result<AppConfig> {
        Ok(match &config_path {
            Some(path) => load_config_from(path)?,
            None => load_config()?,
        })
    };

    match cli.command {
        Command::Build {
            catalog,
            store,
            progress,
            force,
            max_files,
        } => cmd_build(&config()?, &catalog, store, progress, force, max_files),
        Command::Extract {
            package_dir,
            key,
            out,
            max_files,
        } => cmd_extract(&config()?, &package_dir, key, out.as_deref(), max_files),
        Command::List { store } => cmd_list(&store_for(&config()?, store)),
        Command::Show { key, store } => cmd_show(&store_for(&config()?, store), &key),
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(&config()?),
        },
    }
}

fn store_for(config: &AppConfig, flag: Option<PathBuf>) -> ArrowStore {
    ArrowStore::new(flag.unwrap_or_else(|| PathBuf::from(&config.defaults.store_path)))
}

// ---------------------------------------------------------------------------
// build
// ---------------------------------------------------------------------------

fn cmd_build(
    config: &AppConfig,
    catalog: &Path,
    store: Option<PathBuf>,
    progress: Option<PathBuf>,
    force: bool,
    max_files: Option<usize>,
) -> Result<()> {
    let packages = read_catalog(catalog)?;
    let store = store_for(config, store);
    let ledger_path =
        progress.unwrap_or_else(|| PathBuf::from(&config.defaults.progress_path));
    let mut ledger = ProgressLedger::load(&ledger_path)?;

    let mut extract = ExtractConfig::from(config);
    if max_files.is_some() {
        extract.max_files = max_files;
    }
    let filter = HeuristicFilter::new(&extract.boilerplate_keywords);
    let options = RunOptions { extract, force };

    let cancel = install_cancel_flag()?;

    info!(
        catalog = %catalog.display(),
        packages = packages.len(),
        store = %store.path().display(),
        ledger = %ledger.path().display(),
        "building corpus"
    );

    let reporter = CliProgress::new(packages.len());
    let summary = run_catalog(
        &packages,
        &store,
        &mut ledger,
        &filter,
        &options,
        &reporter,
        &cancel,
    );
    let rows = store.len()?;

    println!();
    if summary.cancelled {
        println!("  Run interrupted; the store holds every package completed so far.");
    } else {
        println!("  Corpus build complete!");
    }
    println!("  Processed: {}", summary.processed);
    println!("  Skipped:   {}", summary.skipped);
    println!("  Failed:    {}", summary.failed);
    println!("  Rows:      {rows}");
    println!("  Store:     {}", store.path().display());
    println!("  Ledger:    {}", ledger.path().display());
    println!("  Time:      {:.1}s", summary.elapsed.as_secs_f64());
    println!();

    Ok(())
}

/// Read a catalog file. Relative package paths resolve against the catalog's
/// directory.
fn read_catalog(path: &Path) -> Result<Vec<PackageDescriptor>> {
    let content = std::fs::read_to_string(path)
        .wrap_err_with(|| format!("cannot read catalog {}", path.display()))?;
    let mut packages: Vec<PackageDescriptor> = serde_json::from_str(&content)
        .wrap_err_with(|| format!("invalid catalog {}", path.display()))?;

    let base = path.parent().unwrap_or(Path::new("."));
    for package in &mut packages {
        if package.path.is_relative() {
            package.path = base.join(&package.path);
        }
    }
    Ok(packages)
}

/// A flag set by SIGINT/SIGTERM; the driver stops between packages.
fn install_cancel_flag() -> Result<Arc<AtomicBool>> {
    let flag = Arc::new(AtomicBool::new(false));
    for signal in [signal_hook::consts::SIGINT, signal_hook::consts::SIGTERM] {
        signal_hook::flag::register(signal, Arc::clone(&flag))
            .wrap_err("cannot install signal handler")?;
    }
    Ok(flag)
}

// ---------------------------------------------------------------------------
// extract / list / show
// ---------------------------------------------------------------------------

fn cmd_extract(
    config: &AppConfig,
    package_dir: &Path,
    key: Option<String>,
    out: Option<&Path>,
    max_files: Option<usize>,
) -> Result<()> {
    let key = match key {
        Some(key) => key,
        None => package_dir
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| eyre!("cannot derive a key from '{}'", package_dir.display()))?,
    };

    let mut extract = ExtractConfig::from(config);
    if max_files.is_some() {
        extract.max_files = max_files;
    }
    let filter = HeuristicFilter::new(&extract.boilerplate_keywords);

    let record = extract_package(package_dir, &key, &extract, &filter)?;

    match out {
        Some(path) => {
            std::fs::write(path, &record.text)
                .wrap_err_with(|| format!("cannot write {}", path.display()))?;
            println!("  Title:    {}", record.title);
            println!("  Author:   {}", record.author);
            println!("  Language: {}", record.language);
            println!("  Chars:    {}", record.text.chars().count());
            println!("  Written:  {}", path.display());
        }
        None => println!("{}", record.text),
    }

    Ok(())
}

fn cmd_list(store: &ArrowStore) -> Result<()> {
    if !store.exists() {
        warn!(store = %store.path().display(), "store does not exist yet");
    }
    let records = store.read_all()?;

    for record in &records {
        println!(
            "{}\t{}\t{}\t{}\t{}",
            record.key,
            record.title,
            record.author,
            record.language,
            record.text.chars().count()
        );
    }
    info!(rows = records.len(), "listed store");
    Ok(())
}

fn cmd_show(store: &ArrowStore, key: &str) -> Result<()> {
    let record = store
        .get(key)?
        .ok_or_else(|| eyre!("no record with key '{key}' in {}", store.path().display()))?;
    println!("{}", record.text);
    Ok(())
}

// ---------------------------------------------------------------------------
// config
// ---------------------------------------------------------------------------

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show(config: &AppConfig) -> Result<()> {
    let toml_str = toml::to_string_pretty(config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif bar.
struct CliProgress {
    bar: ProgressBar,
}

impl CliProgress {
    fn new(total: usize) -> Self {
        let bar = ProgressBar::new(total as u64);
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} [{pos}/{len}] {wide_msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        bar.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { bar }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.bar.set_message(name.to_string());
    }

    fn package_started(&self, name: &str, _current: usize, _total: usize) {
        self.bar.set_message(name.to_string());
    }

    fn package_finished(&self, name: &str, outcome: &PackageOutcome) {
        if let PackageOutcome::Failed(reason) = outcome {
            self.bar.println(format!("  failed: {name}: {reason}"));
        }
        self.bar.inc(1);
    }

    fn done(&self, _summary: &RunSummary) {
        self.bar.finish_and_clear();
    }
}
