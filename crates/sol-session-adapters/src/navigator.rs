use std::sync::{Arc, Mutex, PoisonError};

use tracing::info;

use sol_session_core::NavigatorPort;

use crate::SessionAdapterConfig;

/// Fixed user agent and page URL. Redirects are recorded instead of followed.
#[derive(Debug, Clone, Default)]
pub struct StaticNavigator {
    user_agent: String,
    page_url: String,
    redirects: Arc<Mutex<Vec<String>>>,
}

impl StaticNavigator {
    pub fn new(user_agent: impl Into<String>, page_url: impl Into<String>) -> Self {
        Self {
            user_agent: user_agent.into(),
            page_url: page_url.into(),
            redirects: Arc::default(),
        }
    }

    pub fn from_config(config: &SessionAdapterConfig) -> Self {
        Self::new(config.user_agent.clone(), config.page_url.clone())
    }

    pub fn redirects(&self) -> Vec<String> {
        self.redirects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl NavigatorPort for StaticNavigator {
    fn user_agent(&self) -> String {
        self.user_agent.clone()
    }

    fn page_url(&self) -> String {
        self.page_url.clone()
    }

    fn redirect(&self, url: &str) {
        info!(%url, "navigation requested");
        self.redirects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(url.to_owned());
    }
}
