use std::sync::Arc;

use anyhow::{bail, Result};
use tracing_subscriber::EnvFilter;

use backend::{
    config::AppConfig,
    crm::CrmClient,
    db,
    poller::Poller,
    store::postgres::PgStore,
};

/// One-shot ingestion run, for cron-style schedulers that prefer a process
/// exit code over an HTTP endpoint.
#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    let config = AppConfig::from_env()?;
    tracing::info!(
        component = "poll",
        database_url = %config.redacted_database_url(),
        cutoff = ?config.crm_ignore_before,
        "loaded backend configuration"
    );

    let Some(api_key) = config.crm_api_key.as_deref() else {
        bail!("CRM_API_KEY is not configured");
    };

    let pool = db::init_pool_with_size(&config.database_url, 1)?;
    let store = Arc::new(PgStore::new(pool));
    let crm = Arc::new(CrmClient::new(&config.crm_base_url, api_key)?);

    let poller = Poller::new(
        store,
        crm,
        config.crm_ignore_before,
        config.default_country_dial_code.clone(),
    );
    let summary = poller.run().await?;
    println!("Polling completed ({}).", summary.describe());

    if summary.aborted {
        bail!("ingestion run aborted after a page fetch failure");
    }

    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}
