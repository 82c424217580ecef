//! Command-line interface.
//!
//! Without a subcommand the binary starts the HTTP server. Subcommands:
//! - `config check` - Validate and summarize the configuration file
//! - `db seed` - Insert demo accounts and visits
//! - `user create` - Create an account

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::api::auth::hash_password;
use crate::api::validation::{parse_role, validate_email, validate_password, validate_user_name};
use crate::config::{Config, JWT_SECRET_ENV};
use crate::db;

/// CLI arguments structure
#[derive(Parser, Debug)]
#[command(name = "visitor-register")]
#[command(author, version, about = "Visitor check-in register for care facilities", long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, env = "VISITOR_REGISTER_CONFIG", default_value = "visitor-register.toml")]
    pub config: PathBuf,

    /// Override log level
    #[arg(short, long)]
    pub log_level: Option<String>,

    /// Subcommand to run (if none, starts the server)
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Configuration management commands
    #[command(subcommand)]
    Config(ConfigCommands),

    /// Database management commands
    #[command(subcommand)]
    Db(DbCommands),

    /// Account management commands
    #[command(subcommand)]
    User(UserCommands),
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Validate configuration file
    Check,
}

#[derive(Subcommand, Debug)]
pub enum DbCommands {
    /// Insert demo accounts and visits (two inside, two already left)
    Seed {
        /// Delete all existing visits and users first
        #[arg(long)]
        reset: bool,
    },
}

#[derive(Subcommand, Debug)]
pub enum UserCommands {
    /// Create an account
    Create {
        #[arg(long)]
        email: String,
        #[arg(long)]
        name: String,
        #[arg(long, env = "VISITOR_REGISTER_USER_PASSWORD")]
        password: String,
        /// ADMIN or RECEPCAO
        #[arg(long)]
        role: Option<String>,
    },
}

/// Run a CLI command
pub async fn run_command(cli: &Cli) -> Result<()> {
    match &cli.command {
        Some(Commands::Config(ConfigCommands::Check)) => cmd_config_check(cli),
        Some(Commands::Db(DbCommands::Seed { reset })) => cmd_db_seed(cli, *reset).await,
        Some(Commands::User(UserCommands::Create {
            email,
            name,
            password,
            role,
        })) => cmd_user_create(cli, email, name, password, role.as_deref()).await,
        None => {
            // No subcommand means start the server - this is handled in main.rs
            Ok(())
        }
    }
}

fn enabled(flag: bool) -> &'static str {
    if flag {
        "Enabled"
    } else {
        "Disabled"
    }
}

fn cmd_config_check(cli: &Cli) -> Result<()> {
    let config_path = &cli.config;

    println!("Checking configuration file: {}", config_path.display());
    println!();

    if !config_path.exists() {
        println!(
            "[!!] Configuration file not found: {}",
            config_path.display()
        );
        println!();
        println!("A default configuration will be used when starting the server.");
        return Ok(());
    }

    let content = std::fs::read_to_string(config_path)
        .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

    let config = match Config::parse(&content) {
        Ok(config) => config,
        Err(e) => {
            println!("[!!] Configuration file is invalid!");
            println!();
            println!("Error: {:#}", e);
            anyhow::bail!("Invalid configuration file");
        }
    };

    let problems = config.validate();
    if problems.is_empty() {
        println!("[OK] Configuration file is valid!");
    } else {
        println!("[!!] Configuration has problems:");
        for problem in &problems {
            println!("  - {}", problem);
        }
    }

    println!();
    println!("=== Configuration Summary ===");
    println!();
    println!("Server:");
    println!("  Host:          {}", config.server.host);
    println!("  Port:          {}", config.server.port);
    println!("  Data Dir:      {}", config.server.data_dir.display());
    println!();
    println!("Security:");
    println!("  Token TTL:     {}h", config.auth.token_ttl_hours);
    println!(
        "  Rate Limiting: {} ({} api / {} login per {}s)",
        enabled(config.rate_limit.enabled),
        config.rate_limit.api_requests_per_window,
        config.rate_limit.auth_requests_per_window,
        config.rate_limit.window_seconds
    );
    println!("  CORS Origin:   {}", config.cors.allowed_origin);
    println!(
        "  Admin Account: {}",
        config.auth.admin_email.as_deref().unwrap_or("(none)")
    );
    println!();

    let mut warnings = Vec::new();
    if config.auth.jwt_secret.trim().is_empty() && std::env::var(JWT_SECRET_ENV).is_err() {
        warnings.push("No JWT secret set - tokens will not survive a restart");
    }
    if !config.rate_limit.enabled {
        warnings.push("Rate limiting is disabled - login attempts are unthrottled");
    }
    if !warnings.is_empty() {
        println!("Warnings:");
        for warning in warnings {
            println!("  [!] {}", warning);
        }
        println!();
    }

    if !problems.is_empty() {
        anyhow::bail!("Invalid configuration file");
    }
    Ok(())
}

async fn open_database(cli: &Cli) -> Result<db::DbPool> {
    let config = Config::load(&cli.config)?;
    std::fs::create_dir_all(&config.server.data_dir).with_context(|| {
        format!(
            "Failed to create data directory: {}",
            config.server.data_dir.display()
        )
    })?;
    db::init(&config.server.data_dir).await
}

async fn cmd_db_seed(cli: &Cli, reset: bool) -> Result<()> {
    let pool = open_database(cli).await?;
    db::seed_demo_data(&pool, reset).await?;

    println!("Demo data created:");
    for (email, password, _, role) in db::DEMO_USERS {
        println!("  - {} / {} ({})", email, password, role);
    }
    println!("  - 2 active visits, 2 completed visits");
    Ok(())
}

async fn cmd_user_create(
    cli: &Cli,
    email: &str,
    name: &str,
    password: &str,
    role: Option<&str>,
) -> Result<()> {
    let checks = [
        ("email", validate_email(email)),
        ("password", validate_password(password)),
        ("name", validate_user_name(name)),
        ("role", parse_role(role).map(|_| ())),
    ];
    let problems: Vec<String> = checks
        .into_iter()
        .filter_map(|(field, result)| result.err().map(|e| format!("{}: {}", field, e)))
        .collect();
    if !problems.is_empty() {
        anyhow::bail!("Invalid user: {}", problems.join("; "));
    }
    let role = parse_role(role).map_err(anyhow::Error::msg)?;

    let pool = open_database(cli).await?;
    let email = email.trim();
    if db::find_user_by_email(&pool, email).await?.is_some() {
        anyhow::bail!("User {} already exists", email);
    }

    let hash =
        hash_password(password).map_err(|e| anyhow::anyhow!("Failed to hash password: {}", e))?;
    let user = db::create_user(&pool, email, &hash, name.trim(), role).await?;

    println!("Created {} account {} (id {})", user.role, user.email, user.id);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_no_subcommand() {
        let cli = Cli::try_parse_from(["visitor-register"]).unwrap();
        assert!(cli.command.is_none());
        assert_eq!(cli.config, PathBuf::from("visitor-register.toml"));
    }

    #[test]
    fn test_parse_seed_reset() {
        let cli = Cli::try_parse_from(["visitor-register", "db", "seed", "--reset"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Commands::Db(DbCommands::Seed { reset: true }))
        ));
    }

    #[test]
    fn test_parse_user_create() {
        let cli = Cli::try_parse_from([
            "visitor-register",
            "--log-level",
            "debug",
            "user",
            "create",
            "--email",
            "ana@casa.org",
            "--name",
            "Ana",
            "--password",
            "segredo1",
            "--role",
            "ADMIN",
        ])
        .unwrap();
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
        match cli.command {
            Some(Commands::User(UserCommands::Create { email, role, .. })) => {
                assert_eq!(email, "ana@casa.org");
                assert_eq!(role.as_deref(), Some("ADMIN"));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }
}
