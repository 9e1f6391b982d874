use std::{path::Path, sync::Arc};

use clap::Parser;
use color_eyre::{
    Result,
    eyre::{Context, eyre},
};
use remora::{
    adapters::{HyperTransport, ProxyServer},
    config::{ProxyConfigValidator, build_tree, load_config},
    core::ProxyService,
    tracing_setup,
    utils::GracefulShutdown,
};

#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    #[clap(subcommand)]
    command: Option<Commands>,

    #[clap(short, long, default_value = "remora.toml")]
    config: String,

    /// Emit JSON logs instead of console formatting
    #[clap(long)]
    log_json: bool,
}

#[derive(Parser, Debug)]
enum Commands {
    /// Validate configuration file
    Validate {
        /// Configuration file to validate
        #[clap(short, long, default_value = "remora.toml")]
        config: String,
    },
    /// Initialize a new configuration file
    Init {
        /// Output path for the new config file
        #[clap(short, long, default_value = "remora.toml")]
        config: String,
    },
    /// Start the proxy (default)
    Serve {
        /// Configuration file to use
        #[clap(short, long, default_value = "remora.toml")]
        config: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let args = Args::parse();

    let (command, config_path) = match args.command {
        Some(Commands::Validate { config }) => ("validate", config),
        Some(Commands::Init { config }) => ("init", config),
        Some(Commands::Serve { config }) => ("serve", config),
        None => ("serve", args.config),
    };

    match command {
        "validate" => return validate_config_command(&config_path),
        "init" => return init_config_command(&config_path).await,
        _ => {}
    }

    if args.log_json {
        tracing_setup::init_tracing()
    } else {
        tracing_setup::init_console_tracing()
    }
    .map_err(|e| eyre!("Failed to initialize tracing: {e}"))?;

    tracing::info!("loading configuration from {config_path}");
    let config = load_config(&config_path)
        .with_context(|| format!("failed to load config from {config_path}"))?;

    if let Err(errors) = ProxyConfigValidator::validate(&config) {
        for error in &errors {
            tracing::error!(%error, "configuration error");
        }
        return Err(eyre!(
            "configuration failed validation with {} error(s)",
            errors.len()
        ));
    }

    let transport =
        Arc::new(HyperTransport::new().context("failed to create upstream transport")?);
    let root = build_tree(&config, transport).context("failed to build routing tree")?;
    let service = Arc::new(ProxyService::new(root));

    let shutdown = Arc::new(GracefulShutdown::new());
    let signal_shutdown = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = signal_shutdown.run_signal_handler().await {
            tracing::error!("signal handler error: {e}");
        }
    });

    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.listen_addr))?;

    tracing::info!("remora starting on {}", config.listen_addr);
    ProxyServer::new(service).run(listener, shutdown).await
}

/// Validate configuration file and exit
fn validate_config_command(config_path: &str) -> Result<()> {
    println!("Validating configuration file: {config_path}");

    if !Path::new(config_path).exists() {
        eprintln!("error: configuration file '{config_path}' not found");
        std::process::exit(1);
    }

    let config = match load_config(config_path) {
        Ok(config) => {
            println!("configuration parsing: OK");
            config
        }
        Err(e) => {
            eprintln!("configuration parsing failed:");
            eprintln!("   {e}");
            std::process::exit(1);
        }
    };

    match ProxyConfigValidator::validate(&config) {
        Ok(()) => {
            println!("configuration validation: OK");
            println!();
            println!("Summary:");
            println!("   listen address: {}", config.listen_addr);
            println!("   upstream timeout: {}", config.upstream.timeout);
            println!("   routing nodes: {}", count_nodes(&config.root));
            Ok(())
        }
        Err(errors) => {
            eprintln!("configuration validation failed:");
            for error in &errors {
                eprintln!("   {error}");
            }
            println!();
            println!("Common fixes:");
            println!("   - check regex patterns for unbalanced brackets");
            println!("   - verify the listen address format (e.g. '127.0.0.1:3128')");
            println!("   - timeouts use humantime units (e.g. '8s', '2m')");
            std::process::exit(1);
        }
    }
}

fn count_nodes(node: &remora::config::NodeConfig) -> usize {
    1 + node.children.iter().map(count_nodes).sum::<usize>()
}

/// Initialize a new configuration file
async fn init_config_command(config_path: &str) -> Result<()> {
    let path = Path::new(config_path);
    if path.exists() {
        eprintln!("error: configuration file '{config_path}' already exists");
        std::process::exit(1);
    }

    let default_config = r#"# Remora proxy configuration

# The address to listen on
listen_addr = "127.0.0.1:3128"

[upstream]
# Per-request upstream timeout
timeout = "8s"
# 0 relays redirects to the client untouched
max_redirects = 0

# The root routing node: no matchers, so it claims any request its
# children decline
[root]

# Example: rewrite bodies for one host
# [[root.children]]
# host = 'example\.com'
#
# [[root.children.body_rewrites]]
# search = "http://"
# replace = "https://"

# Example: strip the Server header for an internal zone
# [[root.children]]
# host = 'internal\..+'
#
# [root.children.response_headers]
# "-server" = ""
"#;

    tokio::fs::write(path, default_config)
        .await
        .context("Failed to write config file")?;
    println!("created default configuration at: {config_path}");
    println!("   run 'remora serve --config {config_path}' to start the proxy");
    Ok(())
}
