//! Certkeeper - Main entry point
//!
//! Issues and renews ACME certificates for configured domains while
//! serving HTTP-01 challenges.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tokio::net::TcpListener;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use certkeeper::{App, CertificateEvent};
use certkeeper_common::DomainName;
use certkeeper_config::Config;

/// Certkeeper - ACME certificate lifecycle manager
#[derive(Parser, Debug)]
#[command(name = "certkeeper")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file path
    #[arg(
        short = 'c',
        long = "config",
        env = "CERTKEEPER_CONFIG",
        global = true,
        default_value = "/etc/certkeeper/certkeeper.kdl"
    )]
    config: String,

    /// Enable verbose logging (debug level)
    #[arg(long = "verbose", global = true)]
    verbose: bool,

    /// Log output format
    #[arg(long = "log-format", value_enum, default_value_t = LogFormat::Text, global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Serve challenges and keep managed domains renewed (default)
    Run,
    /// Issue a certificate for one domain and exit
    Issue {
        /// Domain to issue for
        domain: String,
    },
    /// Renew the certificate for one domain and exit
    Renew {
        /// Domain to renew
        domain: String,
    },
    /// Report whether a domain is due for renewal
    Check {
        /// Domain to check
        domain: String,
        /// Renewal threshold in days (defaults to renew-before-days)
        #[arg(long = "threshold-days")]
        threshold_days: Option<u32>,
    },
    /// Validate configuration file and exit
    Test,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.log_format);

    let runtime = tokio::runtime::Runtime::new()?;

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => runtime.block_on(run_daemon(&cli.config)),
        Commands::Issue { domain } => runtime.block_on(one_shot(&cli.config, &domain, false)),
        Commands::Renew { domain } => runtime.block_on(one_shot(&cli.config, &domain, true)),
        Commands::Check {
            domain,
            threshold_days,
        } => runtime.block_on(check_domain(&cli.config, &domain, threshold_days)),
        Commands::Test => runtime.block_on(test_config(&cli.config)),
    }
}

fn init_logging(verbose: bool, format: LogFormat) {
    let log_level = if verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    match format {
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
    }
}

fn load_config(path: &str) -> Result<Config> {
    info!("Loading configuration from: {}", path);
    let config = Config::from_file(Path::new(path)).context("Failed to load configuration file")?;
    config.validate().context("Configuration validation failed")?;
    Ok(config)
}

/// Test configuration file and exit
async fn test_config(path: &str) -> Result<()> {
    info!("Testing configuration file: {}", path);
    let config = Config::from_file(Path::new(path)).context("Failed to load configuration file")?;

    let result = config.validate_environment().await;
    for warning in &result.warnings {
        warn!("{}", warning.message);
    }
    result
        .into_result()
        .context("Environment validation failed")?;

    info!("Configuration test successful:");
    info!("  - account {}", config.acme.email);
    info!("  - directory {}", config.acme.directory_url());
    info!("  - {} managed domain(s)", config.renewal.domains.len());

    println!("certkeeper: configuration file {} test is successful", path);
    Ok(())
}

/// Bind the solver and serve until `shutdown` fires
async fn start_solver(app: &App, shutdown: &CancellationToken) -> Result<JoinHandle<()>> {
    let address = &app.config.solver.address;
    let listener = TcpListener::bind(address)
        .await
        .with_context(|| format!("Failed to bind challenge solver on {}", address))?;

    let solver = app.solver.clone();
    let shutdown = shutdown.clone();
    Ok(tokio::spawn(async move {
        if let Err(e) = solver.serve(listener, shutdown).await {
            error!(error = %e, "Challenge solver failed");
        }
    }))
}

/// Cancel `shutdown` on SIGINT or SIGTERM
fn spawn_signal_handler(shutdown: CancellationToken) {
    tokio::spawn(async move {
        wait_for_signal().await;
        info!("Shutdown signal received");
        shutdown.cancel();
    });
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(sigterm) => sigterm,
        Err(e) => {
            warn!(error = %e, "Failed to install SIGTERM handler");
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = sigterm.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

/// Run the solver and the renewal scheduler until shut down
async fn run_daemon(path: &str) -> Result<()> {
    let app = App::from_config(load_config(path)?).await?;
    let shutdown = CancellationToken::new();
    spawn_signal_handler(shutdown.clone());

    let solver = start_solver(&app, &shutdown).await?;

    let mut events = app.manager.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(CertificateEvent::Issued {
                    domain, expires, ..
                }) => {
                    info!(domain = %domain, expires = %expires, "New certificate ready for reload");
                }
                Err(RecvError::Lagged(missed)) => {
                    warn!(missed = missed, "Certificate event listener lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    app.scheduler()?.run(shutdown.clone()).await;

    shutdown.cancel();
    let _ = tokio::time::timeout(Duration::from_secs(5), solver).await;
    info!("Certkeeper stopped");
    Ok(())
}

/// Issue or renew one domain while serving its challenge
async fn one_shot(path: &str, domain: &str, renew: bool) -> Result<()> {
    let domain = DomainName::parse(domain).context("Invalid domain")?;
    let app = App::from_config(load_config(path)?).await?;
    let shutdown = CancellationToken::new();
    spawn_signal_handler(shutdown.clone());

    let solver = start_solver(&app, &shutdown).await?;

    let result = if renew {
        app.manager.renew(&domain, &shutdown).await
    } else {
        app.manager.issue(&domain, &shutdown).await
    };

    shutdown.cancel();
    let _ = solver.await;

    let details = result.with_context(|| format!("Certificate for {} not issued", domain))?;
    println!(
        "{}: issued at {}, key {}, chain {}",
        details.domain,
        details.creation_date,
        app.manager.storage().key_path(&domain).display(),
        app.manager.storage().chain_path(&domain).display()
    );
    Ok(())
}

/// Print renewal status for one domain
async fn check_domain(path: &str, domain: &str, threshold_days: Option<u32>) -> Result<()> {
    let domain = DomainName::parse(domain).context("Invalid domain")?;
    let config = load_config(path)?;

    let threshold = match threshold_days {
        Some(days) => Duration::from_secs(u64::from(days) * 86_400),
        None => config.renewal.threshold(),
    };

    // Checking needs no account, only the store and the chain on disk
    let tokens = certkeeper::open_store(&config.store)?;
    let storage =
        certkeeper::KeyMaterialStorage::new(&config.acme.domain_keys, &config.acme.full_chains)?;

    let check = certkeeper::check_renewal(tokens.as_ref(), &storage, &domain, threshold).await?;
    let verdict = if check.due { "due" } else { "not due" };

    match (check.record, check.expiry) {
        (Some(record), Some(expiry)) => println!(
            "{}: issued {}, expires {}, renewal {}",
            domain, record.creation_date, expiry, verdict
        ),
        (None, Some(expiry)) => println!(
            "{}: expires {} (no issuance record), renewal {}",
            domain, expiry, verdict
        ),
        (Some(record), None) => println!(
            "{}: issued {} but no readable chain, renewal {}",
            domain, record.creation_date, verdict
        ),
        (None, None) => println!("{}: no certificate issued, renewal {}", domain, verdict),
    }
    Ok(())
}
