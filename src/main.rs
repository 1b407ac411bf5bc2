use clap::{Parser, Subcommand};
use consentd::broker::{MemoryBroker, TopicSet};
use consentd::config::{AppConfig, LoggingConfig};
use consentd::context::RuntimeContext;
use consentd::domain::DaemonStores;
use consentd::error::{DaemonError, Result};
use consentd::lifecycle::LifecycleController;
use consentd::session::StaticKeySession;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "consentd")]
#[command(version = "0.1.0")]
#[command(about = "Message-driven consent-registry admission daemon", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Configuration directory
    #[arg(short, long, default_value = "config")]
    config_dir: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the daemon
    Run,
    /// Load and validate the configuration, then exit
    CheckConfig,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Run) {
        Commands::CheckConfig => {
            init_logging_simple();
            let config = AppConfig::load_from(&cli.config_dir)?;
            validate(&config)?;
            println!("configuration ok");
            Ok(())
        }
        Commands::Run => {
            let config = AppConfig::load_from(&cli.config_dir)?;
            init_logging(&config.logging);
            validate(&config)?;

            let mut builder = tokio::runtime::Builder::new_multi_thread();
            if let Some(threads) = config.http.worker_threads {
                builder.worker_threads(threads);
            }
            let runtime = builder.enable_all().build()?;
            runtime.block_on(run_daemon(config))
        }
    }
}

fn validate(config: &AppConfig) -> Result<()> {
    config
        .validate()
        .map_err(|errors| DaemonError::InvalidConfig(errors.join("; ")))
}

async fn run_daemon(config: AppConfig) -> Result<()> {
    info!(
        port = config.http.port,
        broker = %config.broker.endpoint(),
        admin = %config.broker.admin_endpoint(),
        agent_threads = config.agents.thread_count,
        response_queue = config.agents.response_queue_size,
        rate_limit = config.admission.max_requests_per_sec,
        "starting consentd"
    );

    let broker = MemoryBroker::connect(&config.broker);
    let session = Arc::new(StaticKeySession::from_env());
    let topics = TopicSet::new(config.broker.namespace.as_deref());
    let context = Arc::new(RuntimeContext::new(broker, session, topics));
    let stores = DaemonStores::new();

    let controller = LifecycleController::new(context, stores, config);
    controller.start().await
}

fn init_logging(config: &LoggingConfig) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},consentd=debug", config.level)));

    // Optional daily-rotated file output. `tracing_appender::rolling::daily`
    // panics if it cannot create the initial log file, so writability is
    // checked first.
    let file_layer = config.dir.as_deref().and_then(|log_dir| {
        if std::fs::create_dir_all(log_dir).is_err() {
            eprintln!("Warning: could not create log directory {log_dir}, file logging disabled");
            return None;
        }
        let test_path = std::path::Path::new(log_dir).join(".consentd_write_test");
        match std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&test_path)
        {
            Ok(_) => {
                let _ = std::fs::remove_file(&test_path);

                let file_appender = tracing_appender::rolling::daily(log_dir, "consentd.log");
                let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

                // Keep the guard alive for the life of the process
                Box::leak(Box::new(guard));

                Some(
                    tracing_subscriber::fmt::layer()
                        .with_writer(non_blocking)
                        .with_ansi(false)
                        .with_target(true),
                )
            }
            Err(e) => {
                eprintln!(
                    "Warning: could not write to log directory {log_dir} ({e}), file logging disabled"
                );
                None
            }
        }
    });

    let registry = tracing_subscriber::registry().with(filter).with(file_layer);

    if config.json {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .init();
    }
}

fn init_logging_simple() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .try_init();
}
