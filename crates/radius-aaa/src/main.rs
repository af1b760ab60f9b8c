use clap::Parser;
use radius_aaa::{Config, RadiusServer};
use std::path::Path;
use std::process;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// RADIUS/EAP authentication and accounting server
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(name = "radius-aaa")]
struct Cli {
    /// Path to configuration file
    #[arg(value_name = "CONFIG", default_value = "config.json")]
    config_path: String,

    /// Validate configuration and exit
    #[arg(long)]
    validate: bool,
}

fn init_tracing(level: &str) {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn print_summary(config: &Config) {
    println!("Configuration is valid");
    println!("  Auth:       {}:{}", config.listen_address, config.auth_port);
    println!("  Accounting: {}:{}", config.listen_address, config.acct_port);
    println!("  EAP method: {}", config.eap_method);
    match &config.database_url {
        Some(_) => println!("  Repository: postgres"),
        None => println!("  Repository: {} NAS, {} users", config.nas.len(), config.users.len()),
    }
    if let Some(path) = &config.audit_log_path {
        println!("  Audit log:  {}", path);
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if !cli.validate && !Path::new(&cli.config_path).exists() {
        init_tracing("info");
        warn!(path = %cli.config_path, "Configuration file not found");
        if let Err(e) = Config::example().to_file(&cli.config_path) {
            error!(error = %e, "Could not write example configuration");
            process::exit(1);
        }
        info!(path = %cli.config_path, "Wrote example configuration; edit it and restart");
        return;
    }

    let config = match Config::from_file(&cli.config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Invalid configuration {}: {}", cli.config_path, e);
            process::exit(1);
        }
    };

    if cli.validate {
        print_summary(&config);
        return;
    }

    init_tracing(config.log_level.as_deref().unwrap_or("info"));
    info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %cli.config_path,
        "Starting radius-aaa"
    );

    let server = match RadiusServer::from_config(&config).await {
        Ok(server) => Arc::new(server),
        Err(e) => {
            error!(error = %e, "Failed to start server");
            process::exit(1);
        }
    };

    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                error!(error = %e, "Server error");
                process::exit(1);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down");
        }
    }
}
