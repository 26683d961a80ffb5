#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::struct_excessive_bools)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::missing_errors_doc)]

mod commands;
mod logging;

use better_core::{CacheLayout, CacheMode, CacheOptions, Host, LinkStrategy, PackageManager, ScriptsMode};
use clap::Parser;
use miette::Result;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "better")]
#[command(author, version, about = "A global materialization cache for JavaScript installs", long_about = None)]
struct Cli {
    /// Increase logging verbosity (-v for DEBUG, -vv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Emit JSON formatted output (stable, machine-readable)
    #[arg(long, global = true)]
    json: bool,

    /// Override the working directory
    #[arg(long, global = true, value_name = "PATH")]
    cwd: Option<PathBuf>,

    /// Override the cache root (also: BETTER_CACHE_ROOT env var)
    #[arg(long, global = true, value_name = "PATH")]
    cache_root: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Options shared by every key-deriving subcommand.
#[derive(clap::Args, Debug, Clone)]
struct CacheArgs {
    /// Package manager whose install is cached (npm, pnpm, yarn, bun)
    #[arg(long, default_value = "npm")]
    pm: String,

    /// Cache key mode: strict (full fingerprint) or relaxed
    #[arg(long, default_value = "strict")]
    cache_mode: String,

    /// Lifecycle scripts after a restore: rebuild or skip
    #[arg(long, default_value = "rebuild")]
    scripts_mode: String,

    /// The install was requested with a frozen lockfile
    #[arg(long)]
    frozen: bool,

    /// Dev dependencies were excluded
    #[arg(long)]
    production: bool,

    /// Opaque salt mixed into the cache key
    #[arg(long)]
    cache_key_salt: Option<String>,

    /// Node major version recorded in the fingerprint
    #[arg(long)]
    node_major: Option<u32>,

    /// Link strategy: hardlink, copy, or auto
    #[arg(long, default_value = "auto")]
    link_strategy: String,

    /// Worker pool size for file operations (1-128)
    #[arg(long, default_value_t = better_core::DEFAULT_FS_CONCURRENCY)]
    fs_concurrency: usize,
}

impl CacheArgs {
    fn to_options(&self, cache_read_only: bool) -> CacheOptions {
        CacheOptions {
            pm: PackageManager::parse(&self.pm),
            engine: String::from("better"),
            cache_mode: CacheMode::parse(&self.cache_mode),
            scripts_mode: ScriptsMode::parse(&self.scripts_mode),
            frozen: self.frozen,
            production: self.production,
            cache_key_salt: self.cache_key_salt.clone(),
            node_major: self.node_major,
            link_strategy: LinkStrategy::parse(&self.link_strategy),
            fs_concurrency: self.fs_concurrency,
            cache_read_only,
        }
    }

    fn host(&self) -> Host {
        Host::detect(self.node_major)
    }
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Print version information
    Version,

    /// Derive the cache key for the project
    Key {
        #[command(flatten)]
        cache: CacheArgs,

        /// Emit the better.lock verification document
        #[arg(long)]
        lock_report: bool,
    },

    /// Verify that a cache entry is complete
    Verify {
        /// 64-hex entry key
        key: String,
    },

    /// Materialize a cache entry into the project
    Restore {
        /// Entry key; derived from the project when omitted
        key: Option<String>,

        #[command(flatten)]
        cache: CacheArgs,
    },

    /// Publish the project's node_modules as a cache entry
    Capture {
        #[command(flatten)]
        cache: CacheArgs,
    },

    /// Evaluate the project's reuse marker against the derived key
    Marker {
        #[command(flatten)]
        cache: CacheArgs,
    },

    /// Install through the cache, delegating to the package manager
    Install {
        #[command(flatten)]
        cache: CacheArgs,

        /// Never write to the cache (restore-only)
        #[arg(long)]
        cache_read_only: bool,
    },

    /// Evict old or excess cache entries
    Gc {
        /// Remove entries older than this many days
        #[arg(long)]
        max_age_days: Option<u32>,

        /// Remove oldest entries until the store is at or below this size
        #[arg(long)]
        max_size_bytes: Option<u64>,

        /// Report deletions without performing them
        #[arg(long)]
        dry_run: bool,
    },

    /// Show cache totals and hit/miss metrics
    Status,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose, cli.json);

    // Determine working directory
    let cwd = cli
        .cwd
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."));
    let cwd = dunce::canonicalize(&cwd).unwrap_or(cwd);

    if matches!(cli.command, Commands::Version) {
        println!("better {}", better_core::VERSION);
        return Ok(());
    }

    let layout = CacheLayout::resolve(cli.cache_root.as_deref(), &cwd);

    match cli.command {
        Commands::Version => unreachable!("handled above"),
        Commands::Key { cache, lock_report } => {
            commands::key::run(&cwd, &cache.to_options(false), &cache.host(), lock_report, cli.json)
        }
        Commands::Verify { key } => commands::verify::run(&layout, &key, cli.json),
        Commands::Restore { key, cache } => commands::restore::run(
            &layout,
            &cwd,
            key.as_deref(),
            &cache.to_options(false),
            &cache.host(),
            cli.json,
        ),
        Commands::Capture { cache } => commands::capture::run(
            &layout,
            &cwd,
            &cache.to_options(false),
            &cache.host(),
            cli.json,
        ),
        Commands::Marker { cache } => commands::marker::run(
            &cwd,
            &cache.to_options(false),
            &cache.host(),
            cli.json,
        ),
        Commands::Install {
            cache,
            cache_read_only,
        } => commands::install::run(
            &layout,
            &cwd,
            &cache.to_options(cache_read_only),
            &cache.host(),
            cli.json,
        ),
        Commands::Gc {
            max_age_days,
            max_size_bytes,
            dry_run,
        } => commands::gc::run(&layout, max_age_days, max_size_bytes, dry_run, cli.json),
        Commands::Status => commands::status::run(&layout, cli.json),
    }
}
