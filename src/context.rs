use crate::config::AppConfig;
use crate::core::job::RunMode;
use tokio_util::sync::CancellationToken;

#[derive(Clone)]
pub struct AppContext {
    pub config: std::sync::Arc<AppConfig>,
    /// Decided once at startup
    pub mode: RunMode,
    /// Fired by SIGINT/SIGTERM
    pub cancel: CancellationToken,
}

impl AppContext {
    pub fn new(config: AppConfig, mode: RunMode) -> Self {
        Self {
            config: std::sync::Arc::new(config),
            mode,
            cancel: CancellationToken::new(),
        }
    }
}
