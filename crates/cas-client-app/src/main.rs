#![warn(missing_docs)]
//! # cas-client binary
//!
//! Command-line entry point: prints CAS URLs, validates tickets and replays
//! callback requests.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use cas_client_app::{
    APP_VERSION, AppError, init_tracing, network_validator, render_outcome, resolve_settings,
    run_callback, validate_ticket,
};
use cas_client_core::{CasConfig, build_login_url, build_logout_url};
use clap::{Parser, Subcommand};
use tracing::error;

/// CAS client command line.
#[derive(Debug, Parser)]
#[command(name = "cas-client", version = APP_VERSION, about = "CAS ticket validation client")]
struct Cli {
    /// JSON settings file with `service` and `redirect_url`.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Service code sent as `cassvc`.
    #[arg(long, global = true)]
    service: Option<String>,
    /// Callback URL sent as `casurl`.
    #[arg(long, global = true)]
    redirect: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the login URL.
    LoginUrl,
    /// Print the logout URL.
    LogoutUrl,
    /// Validate one ticket and print the username.
    Validate {
        /// Ticket returned by the login service.
        #[arg(long)]
        ticket: String,
    },
    /// Authenticate a callback request against an empty session.
    Callback {
        /// Full callback URL, including any `casticket` parameter.
        #[arg(long)]
        url: String,
        /// Where to send the caller when validation fails.
        #[arg(long)]
        deny_redirect: Option<String>,
    },
}

/// CLI entry point.
fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    match run(cli) {
        Ok(code) => code,
        Err(error) => {
            error!(%error, "cas-client failed");
            eprintln!("cas-client: {error}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode, AppError> {
    let settings = resolve_settings(cli.config.as_deref(), cli.service, cli.redirect)?;
    let config = CasConfig::from_env(settings);

    match cli.command {
        Command::LoginUrl => {
            println!("{}", build_login_url(&config));
            Ok(ExitCode::SUCCESS)
        }
        Command::LogoutUrl => {
            println!("{}", build_logout_url(&config));
            Ok(ExitCode::SUCCESS)
        }
        Command::Validate { ticket } => {
            match validate_ticket(&network_validator(), &config, &ticket) {
                Some(identity) => {
                    println!("{identity}");
                    Ok(ExitCode::SUCCESS)
                }
                None => {
                    eprintln!("ticket rejected");
                    Ok(ExitCode::FAILURE)
                }
            }
        }
        Command::Callback { url, deny_redirect } => {
            let outcome = run_callback(
                config,
                Arc::new(network_validator()),
                &url,
                deny_redirect.as_deref(),
            )?;
            println!("{}", render_outcome(&outcome)?);
            Ok(if outcome.identity().is_some() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
    }
}
