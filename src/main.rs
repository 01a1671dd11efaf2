use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use backend::{
    auth::jwt::JwtService,
    config::AppConfig,
    crm::{CrmApi, CrmClient},
    db,
    routes::create_router,
    state::AppState,
    store::postgres::PgStore,
    whatsapp::GraphClient,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    let config = AppConfig::from_env()?;
    tracing::info!(
        component = "api",
        database_url = %config.redacted_database_url(),
        pool_size = config.database_max_pool_size,
        crm_enabled = config.crm_api_key.is_some(),
        cutoff = ?config.crm_ignore_before,
        "loaded backend configuration"
    );

    let pool = db::init_pool_with_size(&config.database_url, config.database_max_pool_size)?;
    db::run_migrations(&pool)?;
    let store = Arc::new(PgStore::new(pool));

    let crm: Option<Arc<dyn CrmApi>> = match config.crm_api_key.as_deref() {
        Some(key) => Some(Arc::new(CrmClient::new(&config.crm_base_url, key)?)),
        None => {
            tracing::warn!("CRM_API_KEY not set; ingestion runs will be rejected");
            None
        }
    };

    let messenger = Arc::new(GraphClient::new(&config.graph_api_base)?);
    let jwt = JwtService::from_config(&config)?;

    let addr = format!("{}:{}", config.server_host, config.server_port);
    let state = AppState::new(store, crm, messenger, config, jwt);
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(addr = %addr, "listening");
    axum::serve(listener, app).await?;

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
