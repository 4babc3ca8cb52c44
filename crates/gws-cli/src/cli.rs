//! Command-line definitions for `gauth` and `gcontacts`.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::output::OutputFormat;

/// Flags shared by every gws executable.
#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Named set of credentials and cache
    #[arg(long, global = true, env = "GWS_PROFILE", default_value = "default")]
    pub profile: String,

    /// Configuration directory (default: platform config dir + /gws)
    #[arg(long = "config", global = true, value_name = "DIR")]
    pub config_dir: Option<PathBuf>,

    /// Output format (default: from config, else text)
    #[arg(long, global = true, value_enum)]
    pub format: Option<OutputFormat>,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

/// Google OAuth2 credential management
#[derive(Parser, Debug)]
#[command(name = "gauth", version, about = "Manage Google Workspace credentials")]
pub struct GauthCli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: GauthCommand,
}

#[derive(Subcommand, Debug)]
pub enum GauthCommand {
    /// Authorize this profile through the OAuth2 consent flow
    Login {
        /// Authorization code or redirect URL (read from stdin if omitted)
        #[arg(long)]
        code: Option<String>,
    },
    /// Refresh the access token now
    Refresh,
    /// Show credential state, expiry and scopes
    Status,
    /// Print a valid access token, refreshing if needed
    Token,
    /// Delete the stored credentials
    Logout,
}

/// Local Google Contacts cache
#[derive(Parser, Debug)]
#[command(name = "gcontacts", version, about = "Search a local cache of Google Contacts")]
pub struct GcontactsCli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: GcontactsCommand,
}

#[derive(Subcommand, Debug)]
pub enum GcontactsCommand {
    /// Synchronize the cache with Google
    Sync {
        /// Discard the sync cursor and rebuild the cache
        #[arg(long)]
        full: bool,
    },
    /// Find contacts whose name, email, phone or organization starts with PREFIX
    Search {
        prefix: String,
        /// Maximum number of results
        #[arg(short, long)]
        limit: Option<u32>,
    },
    /// List cached contacts
    List {
        /// Maximum number of results
        #[arg(short, long)]
        limit: Option<u32>,
    },
    /// Show entry count and sync cursor age
    Status,
    /// Empty the cache (recreates it if corrupt)
    Clear,
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
    use super::*;

    #[test]
    fn parse_gauth_login_with_code() {
        let cli = GauthCli::try_parse_from(["gauth", "login", "--code", "4/abc"]).unwrap();
        match cli.command {
            GauthCommand::Login { code } => assert_eq!(code.as_deref(), Some("4/abc")),
            other => panic!("expected Login, got {other:?}"),
        }
    }

    #[test]
    fn parse_global_flags_after_subcommand() {
        let cli = GauthCli::try_parse_from([
            "gauth", "status", "--profile", "work", "--format", "json", "-vv",
        ])
        .unwrap();
        assert!(matches!(cli.command, GauthCommand::Status));
        assert_eq!(cli.global.profile, "work");
        assert_eq!(cli.global.format, Some(OutputFormat::Json));
        assert_eq!(cli.global.verbose, 2);
    }

    #[test]
    fn parse_gcontacts_search() {
        let cli =
            GcontactsCli::try_parse_from(["gcontacts", "search", "ann", "--limit", "5"]).unwrap();
        match cli.command {
            GcontactsCommand::Search { prefix, limit } => {
                assert_eq!(prefix, "ann");
                assert_eq!(limit, Some(5));
            }
            other => panic!("expected Search, got {other:?}"),
        }
    }

    #[test]
    fn parse_gcontacts_sync_full() {
        let cli = GcontactsCli::try_parse_from(["gcontacts", "sync", "--full"]).unwrap();
        assert!(matches!(cli.command, GcontactsCommand::Sync { full: true }));
    }

    #[test]
    fn search_requires_prefix() {
        assert!(GcontactsCli::try_parse_from(["gcontacts", "search"]).is_err());
    }

    #[test]
    fn rejects_unknown_format() {
        assert!(GcontactsCli::try_parse_from(["gcontacts", "list", "--format", "xml"]).is_err());
    }
}
