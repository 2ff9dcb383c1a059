//! # squidctl
//!
//! Squid external helper backed by the squid-database store.
//!
//! Reads one request per line on stdin and answers `OK` or `ERR` on stdout, as Squid's
//! `auth_param basic` and `external_acl_type` helpers expect. Logs go to stderr.
//!
//! ## Usage
//!
//! ```bash
//! # Basic auth helper: "<user> <password>" per line
//! squidctl --url http://127.0.0.1:8080 auth
//!
//! # Group ACL helper: "<user> <group>" per line
//! squidctl group
//!
//! # Check the operator credentials against the store
//! squidctl check
//! ```

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use squid_vault_auth::constants::{DEFAULT_CONNECT_TIMEOUT, DEFAULT_STORE_URL};
use squid_vault_auth::issuer::{parse_duration, StoreClient};
use squid_vault_auth::observability;
use squid_vault_auth::server::hash::verify_secret_blocking;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, error, info, warn};

/// Squid credential helper for the squid-database store
#[derive(Parser)]
#[command(name = "squidctl")]
#[command(about = "Squid credential helper for the squid-database store", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Store base URL
    #[arg(long, global = true, env = "SQUIDDB_URL", default_value = DEFAULT_STORE_URL)]
    url: String,

    /// Operator identity
    #[arg(long, global = true, env = "SQUIDDB_USER", default_value = "admin")]
    admin_user: String,

    /// Operator secret
    #[arg(
        long,
        global = true,
        env = "SQUIDDB_PASS",
        default_value = "admin",
        hide_env_values = true,
        hide_default_value = true
    )]
    admin_pass: String,

    /// Per-request timeout (e.g. `5s`, `500ms`)
    #[arg(long, global = true, default_value = DEFAULT_CONNECT_TIMEOUT, value_parser = parse_duration)]
    timeout: Duration,

    /// Debug logging on stderr
    #[arg(long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Basic auth helper: answer "<user> <password>" lines
    Auth,
    /// Group helper: answer "<user> <group>" lines
    Group,
    /// Verify the operator credentials against the store
    Check,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HelperMode {
    Auth,
    Group,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    observability::init_stderr_tracing(cli.debug, "squidctl=info,squid_vault_auth=warn");

    let client = StoreClient::new(&cli.url, &cli.admin_user, &cli.admin_pass, cli.timeout)
        .context("Failed to create store client")?;

    match cli.command {
        Commands::Auth => run_helper(&client, HelperMode::Auth).await,
        Commands::Group => run_helper(&client, HelperMode::Group).await,
        Commands::Check => check_command(&client).await,
    }
}

/// Probe `/authTest` with the operator credentials
async fn check_command(client: &StoreClient) -> Result<()> {
    client
        .auth_test()
        .await
        .with_context(|| format!("Operator check against {} failed", client.base_url()))?;
    println!("OK");
    info!("Operator credentials accepted by {}", client.base_url());
    Ok(())
}

/// Answer helper requests until stdin closes
async fn run_helper(client: &StoreClient, mode: HelperMode) -> Result<()> {
    info!("Serving {:?} helper requests against {}", mode, client.base_url());
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    while let Some(line) = lines.next_line().await.context("Failed to read stdin")? {
        let verdict = if check_line(client, mode, &line).await {
            "OK\n"
        } else {
            "ERR\n"
        };
        stdout
            .write_all(verdict.as_bytes())
            .await
            .context("Failed to write answer")?;
        stdout.flush().await.context("Failed to flush answer")?;
    }

    debug!("stdin closed, exiting");
    Ok(())
}

async fn check_line(client: &StoreClient, mode: HelperMode, line: &str) -> bool {
    let Some((user, argument)) = parse_line(line) else {
        warn!("Malformed helper request");
        return false;
    };

    let record = match client.get_user(&user).await {
        Ok(Some(record)) => record,
        Ok(None) => {
            info!("Unknown user {}", user);
            return false;
        }
        Err(e) => {
            error!("Store lookup for {} failed: {}", user, e);
            return false;
        }
    };

    if record.is_expired_at(Utc::now().timestamp()) {
        info!("User {} has expired", user);
        return false;
    }

    match mode {
        HelperMode::Auth => {
            let ok = verify_secret_blocking(argument, record.password).await;
            if !ok {
                info!("Wrong password for {}", user);
            }
            ok
        }
        HelperMode::Group => {
            let ok = record.has_group(&argument);
            if !ok {
                info!("User {} is not in group {}", user, argument);
            }
            ok
        }
    }
}

/// Split `"<user> <rest>"` and undo Squid's %-escaping of both parts
fn parse_line(line: &str) -> Option<(String, String)> {
    let line = line.trim_end_matches(['\r', '\n']);
    let (user, rest) = line.split_once(' ')?;
    let user = unescape(user);
    if user.is_empty() {
        return None;
    }
    Some((user, unescape(rest)))
}

/// Percent-decode a helper token; a token that decodes to invalid UTF-8 is kept as sent
fn unescape(input: &str) -> String {
    urlencoding::decode(input).map_or_else(|_| input.to_string(), |decoded| decoded.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_line() {
        assert_eq!(
            parse_line("alice hunter2\n"),
            Some(("alice".to_string(), "hunter2".to_string()))
        );
        assert_eq!(
            parse_line("bob pass with spaces"),
            Some(("bob".to_string(), "pass with spaces".to_string()))
        );
        assert_eq!(
            parse_line("carol%40corp p%25w%20d"),
            Some(("carol@corp".to_string(), "p%w d".to_string()))
        );
        assert_eq!(parse_line("lonely"), None);
        assert_eq!(parse_line(" nouser"), None);
    }

    #[test]
    fn test_unescape_leaves_invalid_sequences() {
        assert_eq!(unescape("100%"), "100%");
        assert_eq!(unescape("%zz"), "%zz");
        assert_eq!(unescape("%4"), "%4");
        assert_eq!(unescape("%ff%fe"), "%ff%fe");
        assert_eq!(unescape("a+b"), "a+b");
    }

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::try_parse_from(["squidctl", "check"]).unwrap();
        assert_eq!(cli.timeout, Duration::from_secs(5));
        assert!(matches!(cli.command, Commands::Check));

        let cli = Cli::try_parse_from(["squidctl", "auth", "--timeout", "250ms"]).unwrap();
        assert_eq!(cli.timeout, Duration::from_millis(250));
        assert!(Cli::try_parse_from(["squidctl", "auth", "--timeout", "0s"]).is_err());
    }
}
