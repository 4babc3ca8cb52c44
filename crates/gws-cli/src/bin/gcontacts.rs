//! `gcontacts`: sync and search the local Google Contacts cache.

use chrono::{DateTime, Utc};
use clap::Parser;
use serde::Serialize;

use gws_cli::cli::{GcontactsCli, GcontactsCommand};
use gws_cli::common::format_age;
use gws_cli::{render_list, render_record, report, CliError, Context, Tabular};
use gws_contacts::{ContactCache, ContactSyncer, PeopleClient};
use gws_core::ExitCode;

#[derive(Debug, Serialize)]
struct CacheSummary {
    profile: String,
    path: String,
    entries: u64,
    cursor_issued_at: Option<DateTime<Utc>>,
    cursor_age: Option<String>,
}

impl Tabular for CacheSummary {
    fn headers() -> &'static [&'static str] {
        &["profile", "entries", "cursor_issued_at", "cursor_age", "path"]
    }

    fn row(&self) -> Vec<Option<String>> {
        vec![
            Some(self.profile.clone()),
            Some(self.entries.to_string()),
            self.cursor_issued_at.map(|t| t.to_rfc3339()),
            self.cursor_age.clone(),
            Some(self.path.clone()),
        ]
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> std::process::ExitCode {
    let cli = GcontactsCli::parse();
    gws_core::init_logging(cli.global.verbose);

    match run(cli).await {
        Ok(()) => ExitCode::Success.into(),
        Err(e) => report(&e, &mut std::io::stderr()).into(),
    }
}

async fn run(cli: GcontactsCli) -> Result<(), CliError> {
    let ctx = Context::load(&cli.global)?;
    let cache_path = ctx.contacts_cache_path();
    let mut stdout = std::io::stdout().lock();
    let mut stderr = std::io::stderr();

    match cli.command {
        GcontactsCommand::Sync { full } => {
            let mut cache = ContactCache::open(&cache_path)?;
            let manager = ctx.credential_manager()?;
            let token = manager.get_valid_token().await?;

            let client = PeopleClient::new(
                ctx.http_client()?,
                &ctx.config.google.people_api_url,
                token,
            );
            let syncer = ContactSyncer::new(client)
                .with_retry(ctx.config.network.retry())
                .with_cursor_retention(ctx.config.contacts.cursor_retention());

            let report = syncer.sync(&mut cache, full).await?;
            render_record(&report, ctx.format, &mut stdout)?;
        }
        GcontactsCommand::Search { prefix, limit } => {
            let cache = ContactCache::open(&cache_path)?;
            let limit = limit.unwrap_or(ctx.config.contacts.default_limit);
            let entries = cache.search(&prefix, limit)?;
            render_list(&entries, ctx.format, &mut stdout, &mut stderr)?;
        }
        GcontactsCommand::List { limit } => {
            let cache = ContactCache::open(&cache_path)?;
            let limit = limit.unwrap_or(ctx.config.contacts.default_limit);
            let entries = cache.list(limit)?;
            render_list(&entries, ctx.format, &mut stdout, &mut stderr)?;
        }
        GcontactsCommand::Status => {
            let cache = ContactCache::open(&cache_path)?;
            let status = cache.status()?;
            let now = Utc::now();

            let summary = CacheSummary {
                profile: ctx.profile.to_string(),
                path: cache_path.display().to_string(),
                entries: status.entries,
                cursor_issued_at: status.cursor.as_ref().map(|c| c.issued_at),
                cursor_age: status.cursor.as_ref().map(|c| format_age(c.age_at(now))),
            };
            render_record(&summary, ctx.format, &mut stdout)?;
        }
        GcontactsCommand::Clear => {
            ContactCache::reset(&cache_path)?;
            eprintln!("Cleared contact cache for profile '{}'", ctx.profile);
        }
    }

    Ok(())
}
