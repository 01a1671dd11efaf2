use std::sync::Arc;

use crate::{
    auth::jwt::JwtService, config::AppConfig, crm::CrmApi, store::LeadStore, whatsapp::Messenger,
};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn LeadStore>,
    pub crm: Option<Arc<dyn CrmApi>>,
    pub messenger: Arc<dyn Messenger>,
    pub config: Arc<AppConfig>,
    pub jwt: JwtService,
}

impl AppState {
    pub fn new(
        store: Arc<dyn LeadStore>,
        crm: Option<Arc<dyn CrmApi>>,
        messenger: Arc<dyn Messenger>,
        config: AppConfig,
        jwt: JwtService,
    ) -> Self {
        Self {
            store,
            crm,
            messenger,
            config: Arc::new(config),
            jwt,
        }
    }
}
