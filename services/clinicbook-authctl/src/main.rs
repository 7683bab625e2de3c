//! ClinicBook authctl - operator CLI for the auth subsystem
//!
//! Works against a sled data directory holding the persisted auth state
//! (session, refresh token, login attempts, audit log).
//!
//! # Quick Start
//!
//! ```bash
//! export JWT_SECRET="$(openssl rand -hex 32)"
//! export CLINICBOOK_ADMIN_EMAIL=admin@clinic.example
//! export CLINICBOOK_ADMIN_PASSWORD_HASH="$(clinicbook-authctl hash-password --password 's3cret!')"
//!
//! clinicbook-authctl login --email admin@clinic.example --password 's3cret!'
//! clinicbook-authctl status
//! clinicbook-authctl audit stats
//! clinicbook-authctl audit export --format csv --output audit.csv
//! ```

use anyhow::Context;
use clap::{Parser, Subcommand};
use clinicbook_audit::{AuditQuery, ExportFormat, SecurityEventType, Severity};
use clinicbook_auth::{AuthConfig, AuthResponse, AuthService, PasswordService, StaticCredentials};
use clinicbook_store::{SledStore, StorageScope};
use clinicbook_types::{SystemClock, UserId, UserIdentity, UserRole};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod display;

/// ClinicBook auth operator tool
#[derive(Parser)]
#[command(name = "clinicbook-authctl")]
#[command(version)]
#[command(about = "Inspect and manage ClinicBook sessions, lockouts and the security audit log", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Directory holding the persisted auth state
    #[arg(long, global = true, env = "CLINICBOOK_DATA_DIR", default_value = ".clinicbook")]
    data_dir: PathBuf,

    /// JSON config file (defaults plus environment otherwise)
    #[arg(long, global = true, env = "CLINICBOOK_CONFIG")]
    config: Option<PathBuf>,

    /// Print machine-readable JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in with email and password
    Login {
        #[arg(long)]
        email: String,

        #[arg(long, env = "CLINICBOOK_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// End the current session
    Logout,

    /// Renew the current session from the refresh token
    Refresh,

    /// Show session and lockout state
    Status {
        /// Also show the lockout state for this email
        #[arg(long)]
        email: Option<String>,
    },

    /// Clear a login lockout
    Unlock {
        #[arg(long)]
        email: String,
    },

    /// Print an Argon2id hash for a password
    HashPassword {
        #[arg(long, env = "CLINICBOOK_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// Security audit log
    Audit {
        #[command(subcommand)]
        action: AuditCommands,
    },
}

#[derive(Subcommand)]
enum AuditCommands {
    /// Export the log
    Export {
        #[arg(long, default_value = "json")]
        format: ExportFormat,

        /// Write to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show aggregate statistics
    Stats,

    /// List matching events, newest first
    Query {
        #[arg(long = "type")]
        event_type: Option<SecurityEventType>,

        #[arg(long)]
        severity: Option<Severity>,

        #[arg(long)]
        email: Option<String>,

        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Delete every event
    Clear,
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();
}

fn load_config(path: Option<&Path>) -> anyhow::Result<AuthConfig> {
    let mut config = match path {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("reading config {}", path.display()))?;
            serde_json::from_str::<AuthConfig>(&raw)
                .with_context(|| format!("parsing config {}", path.display()))?
        }
        None => AuthConfig::default(),
    };

    // Environment wins over the file for secrets
    let env = AuthConfig::from_env();
    if !env.token.secret.is_empty() {
        config.token.secret = env.token.secret;
    }
    if env.password.pepper.is_some() {
        config.password.pepper = env.password.pepper;
    }
    if std::env::var("JWT_ISSUER").is_ok() {
        config.token.issuer = env.token.issuer;
    }
    if std::env::var("JWT_AUDIENCE").is_ok() {
        config.token.audience = env.token.audience;
    }

    Ok(config)
}

/// The configured admin account, if any
fn admin_credentials(config: &AuthConfig) -> anyhow::Result<StaticCredentials> {
    let credentials = StaticCredentials::new(PasswordService::new(config.password.clone()));

    let (Ok(email), Ok(hash)) = (
        std::env::var("CLINICBOOK_ADMIN_EMAIL"),
        std::env::var("CLINICBOOK_ADMIN_PASSWORD_HASH"),
    ) else {
        tracing::warn!("No admin account configured; every login will fail");
        return Ok(credentials);
    };

    let id = match std::env::var("CLINICBOOK_ADMIN_ID") {
        Ok(raw) => UserId::parse(&raw).context("CLINICBOOK_ADMIN_ID is not a valid id")?,
        Err(_) => UserId::new(),
    };
    let name = std::env::var("CLINICBOOK_ADMIN_NAME").unwrap_or_else(|_| "Clinic Admin".to_string());

    Ok(credentials.with_account(UserIdentity::new(id, &email, UserRole::Admin, name), hash))
}

fn open_service(cli: &Cli) -> anyhow::Result<AuthService> {
    let config = load_config(cli.config.as_deref())?;
    let credentials = admin_credentials(&config)?;

    let db = sled::open(&cli.data_dir)
        .with_context(|| format!("opening data directory {}", cli.data_dir.display()))?;
    let tab = SledStore::named(&db, "tab", StorageScope::Tab)?;
    let profile = SledStore::named(&db, "profile", StorageScope::Profile)?;

    AuthService::new(
        config,
        Arc::new(tab),
        Arc::new(profile),
        Arc::new(credentials),
        Arc::new(SystemClock),
    )
    .context("invalid auth configuration (is JWT_SECRET set?)")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();

    if let Commands::HashPassword { password } = &cli.command {
        let config = load_config(cli.config.as_deref())?;
        let hash = PasswordService::new(config.password).hash_password(password)?;
        println!("{}", hash);
        return Ok(());
    }

    let service = open_service(&cli)?;

    match cli.command {
        Commands::Login { email, password } => {
            let result = service.login(&email, &password).await;
            let failed = result.is_err();
            let response = AuthResponse::from(result);
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&response)?);
            } else {
                display::login_response(&response);
            }
            if failed {
                std::process::exit(1);
            }
        }

        Commands::Logout => {
            service.logout().await?;
            display::ok("Logged out");
        }

        Commands::Refresh => {
            if service.refresh_session().await {
                let session = service.current_session().await?;
                if let Some(session) = session {
                    display::session(&session);
                }
            } else {
                display::fail("Refresh failed; the session has been ended");
                std::process::exit(1);
            }
        }

        Commands::Status { email } => {
            let session = service.current_session().await?;
            let remaining = service.sessions().time_until_expiry().await?;
            let lockout = match &email {
                Some(email) => Some((
                    service.rate_limiter().remaining_attempts(email).await?,
                    service.rate_limiter().is_locked_out(email).await?,
                )),
                None => None,
            };

            if cli.json {
                let status = serde_json::json!({
                    "state": service.state(),
                    "session": session,
                    "expires_in_secs": remaining.map(|d| d.as_secs()),
                    "remaining_attempts": lockout.map(|(attempts, _)| attempts),
                    "locked_for_secs": lockout.and_then(|(_, locked)| locked.map(|d| d.as_secs())),
                });
                println!("{}", serde_json::to_string_pretty(&status)?);
            } else {
                match &session {
                    Some(session) => display::session(session),
                    None => display::fail("No active session"),
                }
                if let (Some(email), Some((attempts, locked))) = (&email, lockout) {
                    display::lockout(email, attempts, locked);
                }
            }
        }

        Commands::Unlock { email } => {
            if service.unlock(&email).await? {
                display::ok(&format!("Unlocked {}", email));
            } else {
                display::fail(&format!("No failed attempts recorded for {}", email));
            }
        }

        Commands::Audit { action } => match action {
            AuditCommands::Export { format, output } => {
                let rendered = service.export_audit_log(format).await?;
                match output {
                    Some(path) => {
                        std::fs::write(&path, rendered)
                            .with_context(|| format!("writing {}", path.display()))?;
                        display::ok(&format!("Exported audit log to {}", path.display()));
                    }
                    None => println!("{}", rendered),
                }
            }

            AuditCommands::Stats => {
                let stats = service.audit().statistics().await?;
                if cli.json {
                    println!("{}", serde_json::to_string_pretty(&stats)?);
                } else {
                    display::statistics(&stats);
                }
            }

            AuditCommands::Query {
                event_type,
                severity,
                email,
                limit,
            } => {
                let mut query = AuditQuery::new().limit(limit);
                if let Some(event_type) = event_type {
                    query = query.event_type(event_type);
                }
                if let Some(severity) = severity {
                    query = query.severity(severity);
                }
                if let Some(email) = &email {
                    query = query.user_email(email);
                }

                let events = service.audit().query(&query).await?;
                if cli.json {
                    println!("{}", serde_json::to_string_pretty(&events)?);
                } else {
                    display::events(&events);
                }
            }

            AuditCommands::Clear => {
                service.clear_audit_log().await?;
                display::ok("Audit log cleared");
            }
        },

        Commands::HashPassword { .. } => {}
    }

    Ok(())
}
