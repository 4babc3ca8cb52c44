//! `gauth`: authorize, inspect, refresh, and revoke Google credentials.

use std::io::Write;

use chrono::{DateTime, Duration, Utc};
use clap::Parser;
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, BufReader};

use gws_auth::manager::DEFAULT_EXPIRY_MARGIN_SECS;
use gws_auth::{
    parse_authorization_response, AuthorizationRequest, CredentialRecord, CredentialState,
    CredentialStore,
};
use gws_cli::cli::{GauthCli, GauthCommand};
use gws_cli::{render_record, report, CliError, Context, Tabular};
use gws_core::ExitCode;

#[derive(Debug, Serialize)]
struct CredentialStatus {
    profile: String,
    state: &'static str,
    expiry: Option<DateTime<Utc>>,
    scopes: Vec<String>,
    refresh_token: bool,
}

impl CredentialStatus {
    fn new(profile: &str, record: Option<&CredentialRecord>) -> Self {
        let state = match record {
            None => CredentialState::Absent,
            Some(r) => r.state_at(Utc::now(), Duration::seconds(DEFAULT_EXPIRY_MARGIN_SECS)),
        };
        Self {
            profile: profile.to_string(),
            state: state.as_str(),
            expiry: record.map(|r| r.expiry),
            scopes: record.map(|r| r.granted_scopes.clone()).unwrap_or_default(),
            refresh_token: record.is_some_and(|r| r.refresh_token.is_some()),
        }
    }
}

impl Tabular for CredentialStatus {
    fn headers() -> &'static [&'static str] {
        &["profile", "state", "expiry", "refresh_token", "scopes"]
    }

    fn row(&self) -> Vec<Option<String>> {
        vec![
            Some(self.profile.clone()),
            Some(self.state.to_string()),
            self.expiry.map(|e| e.to_rfc3339()),
            Some(if self.refresh_token { "yes" } else { "no" }.to_string()),
            Some(self.scopes.join(" ")).filter(|s| !s.is_empty()),
        ]
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> std::process::ExitCode {
    let cli = GauthCli::parse();
    gws_core::init_logging(cli.global.verbose);

    match run(cli).await {
        Ok(()) => ExitCode::Success.into(),
        Err(e) => report(&e, &mut std::io::stderr()).into(),
    }
}

async fn run(cli: GauthCli) -> Result<(), CliError> {
    let ctx = Context::load(&cli.global)?;
    let mut stdout = std::io::stdout().lock();

    match cli.command {
        GauthCommand::Login { code } => {
            let manager = ctx.credential_manager()?;
            let request = AuthorizationRequest::new(manager.endpoint());

            eprintln!("Open this URL in a browser and grant access:\n\n  {}\n", request.url);
            let input = match code {
                Some(code) => code,
                None => {
                    eprintln!("Paste the authorization code or the full redirect URL:");
                    let mut line = String::new();
                    BufReader::new(tokio::io::stdin()).read_line(&mut line).await?;
                    line
                }
            };

            let code = parse_authorization_response(&input, &request.state)?;
            manager.authorize(&code).await?;

            let record = manager.record()?;
            eprintln!("Authorized profile '{}'", ctx.profile);
            render_record(
                &CredentialStatus::new(ctx.profile.name(), record.as_ref()),
                ctx.format,
                &mut stdout,
            )?;
        }
        GauthCommand::Refresh => {
            let manager = ctx.credential_manager()?;
            manager.force_refresh().await?;

            let record = manager.record()?;
            render_record(
                &CredentialStatus::new(ctx.profile.name(), record.as_ref()),
                ctx.format,
                &mut stdout,
            )?;
        }
        GauthCommand::Status => {
            // Readable without an OAuth client configured.
            let record = ctx.credential_store().load()?;
            render_record(
                &CredentialStatus::new(ctx.profile.name(), record.as_ref()),
                ctx.format,
                &mut stdout,
            )?;
        }
        GauthCommand::Token => {
            let manager = ctx.credential_manager()?;
            let token = manager.get_valid_token().await?;
            writeln!(stdout, "{}", token.secret())?;
        }
        GauthCommand::Logout => {
            if ctx.credential_store().delete()? {
                eprintln!("Removed credentials for profile '{}'", ctx.profile);
            } else {
                eprintln!("No stored credentials for profile '{}'", ctx.profile);
            }
        }
    }

    Ok(())
}
