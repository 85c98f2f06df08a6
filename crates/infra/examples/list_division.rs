//! Example: listing one page of a resource in the current division
//!
//! Reads configuration from `LEDGERLINK_*` environment variables or a
//! `ledgerlink.toml` next to the working directory, then prints the first
//! page of general ledger accounts.
//!
//! ```bash
//! export LEDGERLINK_BASE_URL=https://start.exactonline.nl
//! export LEDGERLINK_CLIENT_ID=...
//! export LEDGERLINK_CLIENT_SECRET=...
//! export LEDGERLINK_REDIRECT_URI=https://app.example/callback
//! export LEDGERLINK_AUTHORIZATION_CODE=...   # first run only
//! cargo run --example list_division
//! ```

use ledgerlink_core::{Query, ResourceDescriptor};
use ledgerlink_infra::{config, init_tracing, Connection};
use tracing::info;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = config::load()?;
    init_tracing(&config.logging);

    let connection = Connection::new(config)?;
    let division = connection.division()?;
    info!(%division, "division resolved");

    let accounts = connection.resource(ResourceDescriptor::new("financial/GLAccounts"));
    let page = accounts.list(&Query::new().select(["ID", "Code", "Description"]).top(20))?;

    for account in &page.items {
        info!(
            code = account.get_str("Code").unwrap_or("-"),
            description = account.get_str("Description").unwrap_or("-"),
            "account"
        );
    }
    info!(count = page.items.len(), more = page.next.is_some(), "page listed");

    info!(limits = ?connection.rate_limits(), "rate limits");
    Ok(())
}
