//! Client configuration.

use std::path::PathBuf;
use std::time::Duration;

/// Storage key used by the auth client when a session is handed off via URL.
///
/// Keeping handoff sessions under their own key (and in process-local
/// storage) means they never contend for the shared persisted token.
pub const HANDOFF_STORAGE_KEY: &str = "sb-handoff-isolated";

const DEFAULT_BACKEND_URL: &str = "https://lnhwazoamudessdhhvsj.supabase.co";
const DEFAULT_ANON_KEY: &str = "sb_publishable_uzQs9fk-6ZTeu4RSJ3wHgw_1KMskJ9-";

/// Configuration for the Model Atlas client.
#[derive(Clone, Debug)]
pub struct AtlasConfig {
    /// Backend base URL (e.g. `https://<ref>.supabase.co`).
    pub backend_url: String,
    /// Publishable anon key sent as `apikey` on every request.
    pub anon_key: String,
    /// Directory holding persisted client state (token blob, preferences).
    pub state_dir: PathBuf,
    /// How long a single session lookup may take before it is abandoned.
    pub session_timeout: Duration,
    /// Number of session lookup attempts before giving up.
    pub session_attempts: u32,
    /// Pause between lock-contended session lookups.
    pub lock_retry_delay: Duration,
    /// How long sign-out may take before the local logout is forced.
    pub signout_timeout: Duration,
    /// Maximum wait for the auth client's storage lock.
    pub lock_wait: Duration,
}

impl AtlasConfig {
    /// Reads configuration from environment variables with sensible defaults.
    ///
    /// | Variable                    | Default                          |
    /// |-----------------------------|----------------------------------|
    /// | `ATLAS_BACKEND_URL`         | hosted project URL               |
    /// | `ATLAS_ANON_KEY`            | publishable anon key             |
    /// | `ATLAS_STATE_DIR`           | `<data_dir>/modelatlas`          |
    /// | `ATLAS_SESSION_TIMEOUT_MS`  | `2000`                           |
    /// | `ATLAS_SESSION_ATTEMPTS`    | `2`                              |
    /// | `ATLAS_LOCK_RETRY_DELAY_MS` | `500`                            |
    /// | `ATLAS_SIGNOUT_TIMEOUT_MS`  | `2000`                           |
    /// | `ATLAS_LOCK_WAIT_MS`        | `10000`                          |
    pub fn from_env() -> Self {
        Self {
            backend_url: std::env::var("ATLAS_BACKEND_URL")
                .unwrap_or_else(|_| DEFAULT_BACKEND_URL.into()),
            anon_key: std::env::var("ATLAS_ANON_KEY").unwrap_or_else(|_| DEFAULT_ANON_KEY.into()),
            state_dir: std::env::var("ATLAS_STATE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| default_state_dir()),
            session_timeout: env_millis("ATLAS_SESSION_TIMEOUT_MS", 2_000),
            session_attempts: std::env::var("ATLAS_SESSION_ATTEMPTS")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(2),
            lock_retry_delay: env_millis("ATLAS_LOCK_RETRY_DELAY_MS", 500),
            signout_timeout: env_millis("ATLAS_SIGNOUT_TIMEOUT_MS", 2_000),
            lock_wait: env_millis("ATLAS_LOCK_WAIT_MS", 10_000),
        }
    }

    /// Project reference: the first label of the backend host.
    pub fn project_ref(&self) -> String {
        url::Url::parse(&self.backend_url)
            .ok()
            .and_then(|u| u.host_str().map(|h| h.split('.').next().unwrap_or(h).to_string()))
            .unwrap_or_else(|| "local".to_string())
    }

    /// Key under which the auth client persists its token blob.
    pub fn token_storage_key(&self) -> String {
        format!("sb-{}-auth-token", self.project_ref())
    }
}

impl Default for AtlasConfig {
    fn default() -> Self {
        Self {
            backend_url: DEFAULT_BACKEND_URL.into(),
            anon_key: DEFAULT_ANON_KEY.into(),
            state_dir: default_state_dir(),
            session_timeout: Duration::from_millis(2_000),
            session_attempts: 2,
            lock_retry_delay: Duration::from_millis(500),
            signout_timeout: Duration::from_millis(2_000),
            lock_wait: Duration::from_millis(10_000),
        }
    }
}

fn env_millis(name: &str, default: u64) -> Duration {
    let ms = std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default);
    Duration::from_millis(ms)
}

fn default_state_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("modelatlas")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn project_ref_is_first_host_label() {
        let config = AtlasConfig {
            backend_url: "https://abcdef.supabase.co".into(),
            ..AtlasConfig::default()
        };
        assert_eq!(config.project_ref(), "abcdef");
        assert_eq!(config.token_storage_key(), "sb-abcdef-auth-token");
    }

    #[test]
    fn project_ref_for_localhost() {
        let config = AtlasConfig {
            backend_url: "http://127.0.0.1:54321".into(),
            ..AtlasConfig::default()
        };
        assert_eq!(config.project_ref(), "127");
    }

    #[test]
    fn unparsable_url_falls_back_to_local() {
        let config = AtlasConfig {
            backend_url: "not a url".into(),
            ..AtlasConfig::default()
        };
        assert_eq!(config.token_storage_key(), "sb-local-auth-token");
    }
}
