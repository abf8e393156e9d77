mod session_id;

use crate::config::AppConfig;
use crate::error::ProxyError;
use crate::transport::HttpTransport;

use session_id::SessionIdGenerator;

/// Shared application state accessible to all handlers.
///
/// Holds only immutable configuration and the pooled HTTP client; chat
/// exchanges keep their own state in a [`crate::stream::StreamSession`].
pub struct AppState {
    pub config: AppConfig,
    pub transport: HttpTransport,
    session_ids: SessionIdGenerator,
}

impl AppState {
    #[must_use]
    pub fn new(config: AppConfig, transport: HttpTransport) -> Self {
        Self {
            config,
            transport,
            session_ids: SessionIdGenerator::new(),
        }
    }

    /// Build the transport from `config.backend` and wrap both.
    ///
    /// # Errors
    ///
    /// Returns [`ProxyError::Config`] when the backend URL is unusable.
    pub fn from_config(config: AppConfig) -> Result<Self, ProxyError> {
        let transport = HttpTransport::new(&config.backend)?;
        Ok(Self::new(config, transport))
    }

    /// Id for a new chat exchange, used to correlate its log lines.
    #[must_use]
    pub fn next_session_id(&self) -> uuid::Uuid {
        self.session_ids.next_id()
    }
}
