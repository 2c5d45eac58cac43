use crate::config::AppConfig;
use crate::mailer::{self, Mailer};
use crate::store::Store;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<Store>,
    pub config: Arc<AppConfig>,
    pub mailer: Arc<dyn Mailer>,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);
        let store = Arc::new(Store::open(&config.data_file).await);
        let mailer = mailer::from_config(&config.smtp)?;

        Ok(Self {
            store,
            config,
            mailer,
        })
    }

    pub fn from_parts(store: Arc<Store>, config: Arc<AppConfig>, mailer: Arc<dyn Mailer>) -> Self {
        Self {
            store,
            config,
            mailer,
        }
    }
}
