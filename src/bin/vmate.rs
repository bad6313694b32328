//! vmate - OpenVPN profile tester
//!
//! # Usage
//!
//! ```bash
//! # Find up to 5 working profiles under ~/vpn (requires root)
//! sudo vmate test --dir ~/vpn --limit 5
//!
//! # Stay connected, failing over through the profiles found last time
//! sudo vmate connect
//!
//! # Show / export the profiles found last time
//! vmate list
//! vmate export ./working
//! ```

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use libvmate::cipher::fix_profile_ciphers;
use libvmate::export::export_profiles;
use libvmate::progress::BarProgress;
use libvmate::vpn::process::sweep_by_name_blocking;
use libvmate::*;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "vmate")]
#[command(version)]
#[command(about = "VPN config tester - find working OpenVPN profiles and stay connected", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbose output (client output and per-profile failures)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    /// History file of known-good profiles
    #[arg(long, global = true)]
    history: Option<PathBuf>,

    /// VPN client binary
    #[arg(long, global = true)]
    client: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Test every profile in a directory
    Test {
        /// Directory searched recursively for .ovpn files
        #[arg(short, long, default_value = "~/")]
        dir: String,

        /// Stop after this many working profiles
        #[arg(short, long)]
        limit: Option<usize>,

        /// Profiles tested at once
        #[arg(short, long)]
        workers: Option<usize>,

        /// Per-profile timeout in seconds
        #[arg(short, long)]
        timeout: Option<u64>,

        /// Rewrite legacy "cipher AES-128-CBC" lines before testing
        #[arg(long)]
        fix_ciphers: bool,

        /// Print results as JSON
        #[arg(long)]
        json: bool,

        /// ipinfo.io token
        #[arg(long, env = "VMATE_IPINFO_TOKEN")]
        ipinfo_token: Option<String>,
    },

    /// Connect and keep the tunnel alive, failing over through history
    Connect {
        /// History entry to start with (0-based)
        #[arg(short, long, default_value_t = 0)]
        index: usize,

        /// Handshake deadline in seconds
        #[arg(long)]
        handshake_timeout: Option<u64>,
    },

    /// Show profiles that passed last time
    List,

    /// Copy profiles that passed last time into a directory
    Export {
        /// Destination directory
        #[arg(default_value = ".")]
        dest: PathBuf,
    },
}

/// Kills every leftover client on the way out, however we exit
struct SweepOnExit {
    binary: String,
}

impl Drop for SweepOnExit {
    fn drop(&mut self) {
        sweep_by_name_blocking(&self.binary);
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(&cli);

    if let Err(e) = run(cli).await {
        error!("{:#}", e);
        process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = match &cli.config {
        Some(path) => VmateConfig::load(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => VmateConfig::default(),
    };
    config.verbose |= cli.verbose;
    if let Some(history) = &cli.history {
        config.history_path = history.clone();
    }
    if let Some(client) = &cli.client {
        config.client_binary = client.clone();
    }

    match cli.command {
        Commands::Test {
            dir,
            limit,
            workers,
            timeout,
            fix_ciphers,
            json,
            ipinfo_token,
        } => {
            if let Some(limit) = limit {
                config.limit = limit;
            }
            if let Some(workers) = workers {
                config.max_workers = workers;
            }
            if let Some(timeout) = timeout {
                config.test_timeout_secs = timeout;
            }
            if ipinfo_token.is_some() {
                config.ipinfo_token = ipinfo_token;
            }
            config.validate()?;
            check_root();
            run_test(Arc::new(config), expand_home(&dir), fix_ciphers, json).await
        }
        Commands::Connect { index, handshake_timeout } => {
            if let Some(secs) = handshake_timeout {
                config.handshake_timeout_secs = secs;
            }
            config.validate()?;
            check_root();
            run_connect(Arc::new(config), index).await
        }
        Commands::List => {
            let entries = FileHistoryStore::new(&config.history_path).load();
            if entries.is_empty() {
                println!("No saved profiles in {}", config.history_path.display());
            }
            for (i, entry) in entries.iter().enumerate() {
                println!("{:>3}  {:<8} {}", i, entry.label, entry.path.display());
            }
            Ok(())
        }
        Commands::Export { dest } => {
            let entries = FileHistoryStore::new(&config.history_path).load();
            let written = export_profiles(&entries, &dest)
                .with_context(|| format!("exporting to {}", dest.display()))?;
            println!("Exported {} of {} profiles to {}", written.len(), entries.len(), dest.display());
            Ok(())
        }
    }
}

async fn run_test(config: Arc<VmateConfig>, dir: PathBuf, fix_ciphers: bool, json: bool) -> Result<()> {
    let _sweep = SweepOnExit { binary: config.client_binary.clone() };

    let profiles = discover_profiles(&dir)?;
    info!("Found {} profiles in {}", profiles.len(), dir.display());

    if fix_ciphers {
        let fixed = fix_profile_ciphers(&profiles);
        info!("Rewrote legacy cipher directive in {} profiles", fixed);
    }

    let cancel = CancellationToken::new();
    spawn_interrupt_handler(cancel.clone());

    let launcher: Arc<dyn ClientLauncher> = Arc::new(OpenVpnLauncher::new(config.client_binary.clone()));
    let tester = Arc::new(ClientTester::new(launcher, config.test_timeout(), config.verbose));
    let locator = Arc::new(IpInfoLocator::new(config.ipinfo_token.clone()));
    let orchestrator = TestOrchestrator::new(config.clone(), tester, locator);

    let total = profiles.len();
    let bar = (!config.verbose && !json).then(|| Arc::new(BarProgress::new(total)));
    let sink = bar.clone().map(|b| b as Arc<dyn ProgressSink>);

    let results = orchestrator.run(profiles, &cancel, sink).await;
    if let Some(bar) = bar {
        bar.finish();
    }

    let entries: Vec<HistoryEntry> = results.iter().map(HistoryEntry::from).collect();
    if !entries.is_empty() && !FileHistoryStore::new(&config.history_path).save(&entries) {
        warn!("Could not save results to {}", config.history_path.display());
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
    } else {
        for entry in &entries {
            println!("{} -- {}", entry.path.display(), entry.label);
        }
        println!("{} / {}", entries.len(), total);
    }

    if cancel.is_cancelled() {
        info!("Interrupted");
    }
    Ok(())
}

async fn run_connect(config: Arc<VmateConfig>, index: usize) -> Result<()> {
    let _sweep = SweepOnExit { binary: config.client_binary.clone() };

    let history: Arc<dyn HistoryStore> = Arc::new(FileHistoryStore::new(&config.history_path));
    let entries = history.load();
    let Some(start) = entries.get(index) else {
        bail!(
            "no saved profile #{} in {} ({} saved, run `vmate test` first)",
            index,
            config.history_path.display(),
            entries.len()
        );
    };

    let cancel = CancellationToken::new();
    spawn_interrupt_handler(cancel.clone());

    let launcher: Arc<dyn ClientLauncher> = Arc::new(OpenVpnLauncher::new(config.client_binary.clone()));
    let supervisor = ConnectionSupervisor::new(launcher.clone(), config.handshake_timeout(), config.verbose);
    let policy = ReconnectPolicy::new(history, start.to_profile());

    match ConnectLoop::new(supervisor, launcher, policy).run(&cancel).await {
        Ok(()) => {
            info!("Disconnected");
            Ok(())
        }
        Err(VmateError::HistoryExhausted) => {
            bail!("no alternative profiles available, run `vmate test` to find new ones")
        }
        Err(e) => Err(e.into()),
    }
}

/// Cancel on Ctrl+C or SIGTERM
fn spawn_interrupt_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};

            let mut sigterm = match signal(SignalKind::terminate()) {
                Ok(s) => s,
                Err(e) => {
                    warn!("Failed to register SIGTERM handler: {}", e);
                    let _ = tokio::signal::ctrl_c().await;
                    cancel.cancel();
                    return;
                }
            };
            tokio::select! {
                _ = tokio::signal::ctrl_c() => info!("Received SIGINT (Ctrl+C), stopping"),
                _ = sigterm.recv() => info!("Received SIGTERM, stopping"),
            }
        }

        #[cfg(not(unix))]
        {
            let _ = tokio::signal::ctrl_c().await;
            info!("Received Ctrl+C, stopping");
        }

        cancel.cancel();
    });
}

/// Warn when the client will lack the privileges it needs
fn check_root() {
    #[cfg(unix)]
    {
        let uid = unsafe { libc::geteuid() };
        if uid != 0 {
            warn!("Not running as root - the VPN client will likely fail");
            warn!("   Consider running with sudo");
        }
    }
}

/// Expand a leading `~` to the invoking user's home directory
fn expand_home(dir: &str) -> PathBuf {
    match (dir.strip_prefix('~'), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest.trim_start_matches('/')),
        _ => PathBuf::from(dir),
    }
}

/// Logs go to stderr so stdout carries only results (`--json` stays parseable)
fn init_logging(cli: &Cli) {
    let level = if cli.verbose { "debug" } else { cli.log_level.as_str() };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("vmate={level},libvmate={level}")));

    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_ansi(atty::is(atty::Stream::Stderr))
        .init();
}
