//! oidc-guard - OIDC bearer-token guard

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};

use oidc_guard::{
    auth::Principal,
    cache::InMemoryCache,
    cli::{Cli, Command},
    config::Config,
    oidc::TrustChain,
    server, setup_tracing,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = setup_tracing(&cli.log_level, cli.log_format.as_deref()) {
        eprintln!("Failed to setup tracing: {e}");
        return ExitCode::FAILURE;
    }

    let config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    match cli.command {
        Some(Command::Discover) => run_discover(&config).await,
        Some(Command::Verify { token }) => run_verify(&config, &token).await,
        Some(Command::Serve { host, port }) => run_server(config, host, port).await,
        None => run_server(config, None, None).await,
    }
}

/// Build the trust chain for one-shot commands
fn trust_chain(config: &Config) -> Option<TrustChain> {
    if let Err(e) = config.validate() {
        error!("{e}");
        return None;
    }
    match TrustChain::from_config(&config.oidc, Arc::new(InMemoryCache::new())) {
        Ok(chain) => Some(chain),
        Err(e) => {
            error!("Failed to build trust chain: {e}");
            None
        }
    }
}

/// Print the discovery document and the key IDs it publishes
async fn run_discover(config: &Config) -> ExitCode {
    let Some(chain) = trust_chain(config) else {
        return ExitCode::FAILURE;
    };

    let metadata = match chain.metadata.metadata().await {
        Ok(metadata) => metadata,
        Err(e) => {
            eprintln!("Discovery failed: {e}");
            return ExitCode::FAILURE;
        }
    };

    println!("Discovery: {}", chain.metadata.discovery_url());
    println!("Issuer:    {}", metadata.issuer);
    println!("JWKS URI:  {}", metadata.jwks_uri);

    match chain.jwks.keys().await {
        Ok(keys) if keys.is_empty() => println!("No signing keys published"),
        Ok(keys) => {
            println!("Signing keys ({}):", keys.len());
            for (kid, key) in &keys {
                println!(
                    "  {kid}  kty={}  alg={}",
                    key.kty,
                    key.alg.as_deref().unwrap_or("-")
                );
            }
        }
        Err(e) => {
            eprintln!("JWKS fetch failed: {e}");
            return ExitCode::FAILURE;
        }
    }

    ExitCode::SUCCESS
}

/// Verify one token and print the principal, or the failure kind
async fn run_verify(config: &Config, token: &str) -> ExitCode {
    let Some(chain) = trust_chain(config) else {
        return ExitCode::FAILURE;
    };

    match chain.verifier.verify(token).await {
        Ok(claims) => {
            let principal = Principal::from(&claims);
            let output = serde_json::json!({
                "principal": principal,
                "claims": claims,
            });
            match serde_json::to_string_pretty(&output) {
                Ok(json) => println!("{json}"),
                Err(e) => {
                    eprintln!("Failed to serialize to JSON: {e}");
                    return ExitCode::FAILURE;
                }
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Rejected ({}): {e}", e.kind());
            ExitCode::FAILURE
        }
    }
}

async fn run_server(mut config: Config, host: Option<String>, port: Option<u16>) -> ExitCode {
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }

    info!(
        version = env!("CARGO_PKG_VERSION"),
        port = config.server.port,
        "Starting oidc-guard"
    );

    if let Err(e) = server::run(config).await {
        error!("Server error: {e}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}
