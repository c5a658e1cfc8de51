//! Sessionkeeper CLI - drive the session lifecycle from a terminal.
//!
//! Every command first runs the startup sequence (restoring or discarding the
//! stored credential), then performs its action against the configured
//! authority.

use std::io::{self, Write};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use sessionkeeper::session::NavigationEvent;
use sessionkeeper::{Config, LoginRequest, SessionManager};

/// Role used when none is given on the command line
const DEFAULT_ROLE: &str = "user";

/// Directory for optional rolling log files
const ENV_LOG_DIR: &str = "SESSIONKEEPER_LOG_DIR";

/// Admin password for privileged roles, never prompted for
const ENV_ADMIN_PASSWORD: &str = "SESSIONKEEPER_ADMIN_PASSWORD";

const USAGE: &str = "Usage: sessionkeeper <status|whoami|login [email] [role] [--remember]|logout|verify>";

/// Initialize the tracing subscriber for logging
fn init_tracing() -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match std::env::var(ENV_LOG_DIR) {
        Ok(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "sessionkeeper.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_writer(writer).with_ansi(false)),
                Some(guard),
            )
        }
        Err(_) => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();
    let _log_guard = init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = args.first().map(String::as_str) else {
        eprintln!("{}", USAGE);
        std::process::exit(2);
    };

    let mut config = Config::load().unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        Config::default()
    });

    let manager = Arc::new(
        SessionManager::from_config(&config)?
            .with_navigation(|event| info!(route = route_for(event), "Navigation")),
    );

    let report = manager.start().await;
    info!(outcome = ?report.outcome, "Startup complete");

    match command {
        "status" => print_status(&manager)?,
        "whoami" => print_whoami(&manager),
        "login" => login_interactive(&manager, &mut config, &args[1..]).await?,
        "logout" => {
            manager.logout().await?;
            println!("Signed out.");
        }
        "verify" => {
            if manager.verify_session().await {
                println!("valid");
            } else {
                println!("invalid");
            }
        }
        other => {
            eprintln!("Unknown command: {}\n{}", other, USAGE);
            std::process::exit(2);
        }
    }

    Ok(())
}

fn print_status(manager: &SessionManager) -> Result<()> {
    let json = serde_json::to_string_pretty(&manager.context())?;
    println!("{}", json);
    Ok(())
}

fn print_whoami(manager: &SessionManager) {
    match manager.state().identity() {
        Some(claims) => {
            println!(
                "{} ({}) role={} expires in {}m",
                claims.email.as_deref().unwrap_or("-"),
                claims.user_id,
                claims.role.as_deref().unwrap_or("-"),
                claims.minutes_until_expiry(Utc::now())
            );
        }
        None => println!("Not signed in."),
    }
}

/// Interactive login: positional email/role, prompts for what is missing.
async fn login_interactive(manager: &SessionManager, config: &mut Config, args: &[String]) -> Result<()> {
    let remember = args.iter().any(|a| a == "--remember");
    let mut positional = args.iter().filter(|a| !a.starts_with("--"));

    let email = match positional.next() {
        Some(email) => email.clone(),
        None => prompt_email(config.last_email.as_deref())?,
    };
    let role = positional
        .next()
        .cloned()
        .unwrap_or_else(|| DEFAULT_ROLE.to_string());
    let password = rpassword::prompt_password("Password: ").context("Failed to read password")?;

    if email.is_empty() || password.is_empty() {
        anyhow::bail!("Email and password required");
    }

    let mut request = LoginRequest::new(email.clone(), password, role).remember_me(remember);
    if let Ok(admin_password) = std::env::var(ENV_ADMIN_PASSWORD) {
        request = request.admin_password(admin_password);
    }

    println!("\nAuthenticating...");

    match manager.login(&request).await {
        Ok(user) => {
            config.last_email = Some(email);
            if let Err(e) = config.save() {
                warn!(error = %e, "Failed to save config");
            }
            println!(
                "Signed in as {} ({})",
                user.email.as_deref().unwrap_or(&user.id),
                user.role.as_deref().unwrap_or(DEFAULT_ROLE)
            );
            Ok(())
        }
        Err(e) => {
            eprintln!("{}", e.user_message());
            Err(e.into())
        }
    }
}

fn prompt_email(last: Option<&str>) -> Result<String> {
    match last {
        Some(last) => print!("Email [{}]: ", last),
        None => print!("Email: "),
    }
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    let input = input.trim();

    Ok(match (input.is_empty(), last) {
        (true, Some(last)) => last.to_string(),
        _ => input.to_string(),
    })
}

/// Route the UI would move to for a navigation event
fn route_for(event: NavigationEvent) -> &'static str {
    match event {
        NavigationEvent::SignedIn => "home",
        NavigationEvent::SignedOut => "login",
        NavigationEvent::SessionExpired => "login?expired",
    }
}
