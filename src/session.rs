//! Agent login state: the authenticated [`ApiClient`] plus its persistence.

use crate::api::client::ApiClient;
use crate::api::error::ApiError;
use crate::api::models::Agent;
use crate::app::AppState;
use crate::storage::Storage;

#[derive(Debug, Clone)]
pub struct Session {
    client: ApiClient,
    storage: Storage,
    device_info: String,
}

impl Session {
    pub fn new(client: ApiClient, storage: Storage, device_info: impl Into<String>) -> Self {
        Self { client, storage, device_info: device_info.into() }
    }

    /// Client for the configured server, carrying any stored token.
    pub fn from_state(state: &AppState, storage: Storage) -> Result<Self, ApiError> {
        let mut client = ApiClient::with_timeout(&state.base_url, state.request_timeout())?;
        match storage.token() {
            Ok(token) => client.set_token(token),
            Err(e) => log::warn!("Could not read stored token: {e}"),
        }
        Ok(Self::new(client, storage, state.device_info.clone()))
    }

    pub fn client(&self) -> &ApiClient {
        &self.client
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    pub fn is_logged_in(&self) -> bool {
        self.client.token().is_some()
    }

    /// Cached profile of the logged-in agent, if any.
    pub fn stored_agent(&self) -> Option<Agent> {
        self.storage.agent().unwrap_or_else(|e| {
            log::warn!("Could not read stored agent profile: {e}");
            None
        })
    }

    pub async fn login(&mut self, agent_id: &str, password: &str) -> Result<Agent, ApiError> {
        if agent_id.trim().is_empty() || password.is_empty() {
            return Err(ApiError::Rejected("Please enter your agent ID and password".into()));
        }
        let grant = self.client.login(agent_id.trim(), password, &self.device_info).await?;
        if let Err(e) = self.storage.save_token(&grant.token) {
            log::error!("Failed to persist session token: {e}");
        }
        if let Err(e) = self.storage.save_agent(&grant.agent) {
            log::error!("Failed to persist agent profile: {e}");
        }
        self.client.set_token(Some(grant.token));
        log::info!("Logged in as agent {}", grant.agent.agent_id);
        Ok(grant.agent)
    }

    /// Server logout is best effort; local state is always cleared.
    pub async fn logout(&mut self) {
        if self.is_logged_in() {
            if let Err(e) = self.client.logout().await {
                log::warn!("Server logout failed: {e}");
            }
        }
        if let Err(e) = self.storage.clear_session() {
            log::error!("Failed to clear stored session: {e}");
        }
        self.client.set_token(None);
    }

    /// Check the stored token against the server. Returns the fresh profile,
    /// or `None` when there is no usable session.
    pub async fn restore(&mut self) -> Option<Agent> {
        if !self.is_logged_in() {
            return None;
        }
        match self.client.me().await {
            Ok(agent) => {
                if let Err(e) = self.storage.save_agent(&agent) {
                    log::warn!("Failed to refresh agent profile: {e}");
                }
                Some(agent)
            }
            Err(e) => {
                log::warn!("Stored session is no longer valid: {e}");
                if e.is_auth() {
                    self.client.set_token(None);
                    if let Err(e) = self.storage.clear_session() {
                        log::error!("Failed to clear expired session: {e}");
                    }
                }
                None
            }
        }
    }
}
