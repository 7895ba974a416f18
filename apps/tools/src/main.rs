use std::time::Duration;

use anyhow::{bail, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use server_api::password::hash_password;
use shared::{
    domain::{Role, UserId},
    validation::{validate_password, validate_username},
};
use storage::Storage;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(about = "Operator tasks for the profile database")]
struct Cli {
    #[arg(long, env = "DATABASE_URL", default_value = "sqlite://./data/profiles.db")]
    database_url: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Open the database and apply pending migrations.
    Migrate {
        #[arg(long, default_value_t = 5)]
        retries: u32,
        #[arg(long, default_value_t = 500)]
        delay_ms: u64,
    },
    /// Create the user if missing, set its password and grant super admin.
    BootstrapSuperAdmin {
        username: String,
        #[arg(long, env = "BOOTSTRAP_ADMIN_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Delete admin activity older than the given age.
    CleanupActivity {
        #[arg(long, default_value_t = 90)]
        older_than_days: i64,
    },
    ListUsers,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
    let cli = Cli::parse();

    match cli.command {
        Command::Migrate { retries, delay_ms } => {
            migrate_with_retries(&cli.database_url, retries, Duration::from_millis(delay_ms))
                .await?;
            println!("migrations applied");
        }
        Command::BootstrapSuperAdmin { username, password } => {
            let storage = Storage::new(&cli.database_url).await?;
            let user_id = bootstrap_super_admin(&storage, &username, &password).await?;
            println!("super admin user_id={} username={username}", user_id.0);
        }
        Command::CleanupActivity { older_than_days } => {
            let storage = Storage::new(&cli.database_url).await?;
            let removed = cleanup_activity(&storage, older_than_days).await?;
            println!("removed {removed} activity rows older than {older_than_days} days");
        }
        Command::ListUsers => {
            let storage = Storage::new(&cli.database_url).await?;
            for user in storage.list_users().await? {
                println!(
                    "{}\t{}\t{}\t{}\t{}",
                    user.user_id.0,
                    user.username,
                    user.role.as_str(),
                    if user.is_public { "public" } else { "private" },
                    user.created_at.to_rfc3339()
                );
            }
        }
    }

    Ok(())
}

/// Opening the database runs the embedded migrations. Attempts are spaced
/// `delay`, `2 * delay`, ... apart.
async fn migrate_with_retries(
    database_url: &str,
    retries: u32,
    delay: Duration,
) -> Result<Storage> {
    let attempts = retries.max(1);
    if delay.checked_mul(attempts).is_none() {
        bail!("--delay-ms is too large for {attempts} attempts");
    }
    let mut attempt = 1;
    loop {
        match Storage::new(database_url).await {
            Ok(storage) => {
                info!(attempt, "database ready");
                return Ok(storage);
            }
            Err(error) if attempt < attempts => {
                let wait = delay * attempt;
                warn!(
                    attempt,
                    attempts,
                    %error,
                    wait_ms = wait.as_millis() as u64,
                    "migration failed; retrying"
                );
                tokio::time::sleep(wait).await;
                attempt += 1;
            }
            Err(error) => {
                return Err(error.context(format!("migrations failed after {attempts} attempts")))
            }
        }
    }
}

/// Re-running resets the password; the role change is logged only once.
async fn bootstrap_super_admin(
    storage: &Storage,
    username: &str,
    password: &str,
) -> Result<UserId> {
    let username = username.trim();
    if let Err(message) = validate_username(username) {
        bail!(message);
    }
    if let Err(message) = validate_password(password) {
        bail!(message);
    }
    let password_hash = hash_password(password)?;
    let user_id = storage.create_user(username).await?;
    storage.set_password_hash(user_id, &password_hash).await?;
    let previous = storage
        .load_user(user_id)
        .await?
        .map(|user| user.role)
        .unwrap_or_default();
    if previous != Role::SuperAdmin {
        storage.set_role(user_id, Role::SuperAdmin).await?;
        storage
            .record_activity(
                user_id,
                "bootstrap_super_admin",
                Some(user_id),
                Some(&format!("{} -> super_admin", previous.as_str())),
            )
            .await?;
        info!(user_id = user_id.0, username, "granted super admin");
    }
    Ok(user_id)
}

async fn cleanup_activity(storage: &Storage, older_than_days: i64) -> Result<u64> {
    if older_than_days < 0 {
        bail!("--older-than-days must not be negative");
    }
    let Some(cutoff) = chrono::Duration::try_days(older_than_days)
        .and_then(|age| Utc::now().checked_sub_signed(age))
    else {
        bail!("--older-than-days {older_than_days} is out of range");
    };
    let removed = storage.delete_activity_before(cutoff).await?;
    info!(removed, %cutoff, "activity cleanup finished");
    Ok(removed)
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
