use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use directories::BaseDirs;

fn default_device_info() -> String {
    format!("Tanzanite Agent Desk {}", env!("CARGO_PKG_VERSION"))
}

fn default_message_poll_secs() -> u64 {
    5
}

fn default_conversation_refresh_secs() -> u64 {
    30
}

fn default_request_timeout_secs() -> u64 {
    15
}

/// User configuration, persisted as TOML. The session token is not kept
/// here; it lives in [`crate::storage::Storage`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppState {
    #[serde(default)]
    pub base_url: String,
    #[serde(default)]
    pub agent_id: String,
    #[serde(default = "default_device_info")]
    pub device_info: String,
    #[serde(default = "default_message_poll_secs")]
    pub message_poll_secs: u64,
    #[serde(default = "default_conversation_refresh_secs")]
    pub conversation_refresh_secs: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for AppState {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            agent_id: String::new(),
            device_info: default_device_info(),
            message_poll_secs: default_message_poll_secs(),
            conversation_refresh_secs: default_conversation_refresh_secs(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl AppState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config_path() -> Option<PathBuf> {
        let base = BaseDirs::new()?;
        Some(base.config_dir().join("tanzanite-agent.toml"))
    }

    /// Load from the default location, falling back to defaults.
    pub fn load() -> Self {
        match Self::config_path() {
            Some(path) => Self::load_from(&path),
            None => Self::new(),
        }
    }

    pub fn load_from(path: &Path) -> Self {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(_) => return Self::new(),
        };
        match toml::from_str::<AppState>(&text) {
            Ok(state) => state,
            Err(e) => {
                log::warn!("Ignoring unreadable config {}: {e}", path.display());
                Self::new()
            }
        }
    }

    pub fn save(&self) -> std::io::Result<()> {
        match Self::config_path() {
            Some(path) => self.save_to(&path),
            None => Err(std::io::Error::new(std::io::ErrorKind::NotFound, "No config dir")),
        }
    }

    pub fn save_to(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let toml = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;
        fs::write(path, toml)
    }

    pub fn is_configured(&self) -> bool {
        !self.base_url.trim().is_empty()
    }

    /// Poll period, never shorter than one second.
    pub fn message_poll_period(&self) -> Duration {
        Duration::from_secs(self.message_poll_secs.max(1))
    }

    pub fn conversation_refresh_period(&self) -> Duration {
        Duration::from_secs(self.conversation_refresh_secs.max(1))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}

/// Route to the desk when the stored token still works, to the login form
/// otherwise. The token is checked against the server before the desk opens.
#[cfg(feature = "gui")]
pub fn build_ui(app: &adw::Application) {
    use adw::prelude::*;

    let state = AppState::load();
    let session = match crate::storage::Storage::open_default() {
        Ok(storage) if state.is_configured() => crate::session::Session::from_state(&state, storage).ok(),
        Ok(_) => None,
        Err(e) => {
            log::error!("Cannot open local storage: {e}");
            None
        }
    };
    let Some(mut session) = session.filter(crate::session::Session::is_logged_in) else {
        crate::ui::login::show_login_window(app);
        return;
    };

    // No window exists while the check runs; keep the application alive.
    let hold = app.hold();
    let rx = crate::utils::run_async_to_main(async move { Ok::<_, ()>(session.restore().await) });
    let app = app.clone();
    let mut hold = Some(hold);
    rx.attach(None, move |res| {
        let _released = hold.take();
        match res {
            Ok(Some(agent)) => {
                log::info!("Resumed session for agent {}", agent.agent_id);
                crate::ui::main_window::show_main_window(&app);
            }
            _ => crate::ui::login::show_login_window(&app),
        }
        glib::ControlFlow::Break
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let state = AppState::load_from(&dir.path().join("absent.toml"));
        assert_eq!(state, AppState::default());
        assert_eq!(state.message_poll_period(), Duration::from_secs(5));
        assert_eq!(state.conversation_refresh_period(), Duration::from_secs(30));
        assert!(!state.is_configured());
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cfg.toml");
        fs::write(&path, "base_url = \"https://shop.example.com\"\nmessage_poll_secs = 0\n").unwrap();

        let state = AppState::load_from(&path);
        assert_eq!(state.base_url, "https://shop.example.com");
        assert_eq!(state.request_timeout_secs, 15);
        assert_eq!(state.message_poll_period(), Duration::from_secs(1));
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sub").join("cfg.toml");
        let state = AppState { agent_id: "A9".into(), base_url: "https://x.test".into(), ..AppState::default() };

        state.save_to(&path).unwrap();
        assert_eq!(AppState::load_from(&path), state);
    }

    #[test]
    fn garbage_file_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cfg.toml");
        fs::write(&path, "base_url = [").unwrap();
        assert_eq!(AppState::load_from(&path), AppState::default());
    }
}
