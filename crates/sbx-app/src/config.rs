use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use anyhow::Context;

#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Root of the diffusion backend, e.g. `http://127.0.0.1:8188`.
    pub comfyui_url: String,
    pub api_prefix: String,
    pub timeout: Duration,
    pub poll_interval: Duration,
    /// POST each workflow once to validate it before the real submission.
    pub prevalidate: bool,
    pub public_dir: PathBuf,
    pub port: u16,
    pub settings_path: PathBuf,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            comfyui_url: "http://127.0.0.1:8188".to_string(),
            api_prefix: "/api".to_string(),
            timeout: Duration::from_secs(300),
            poll_interval: Duration::from_millis(1000),
            prevalidate: false,
            public_dir: PathBuf::from("public"),
            port: 3000,
            settings_path: PathBuf::from("settings.json"),
        }
    }
}

impl AppConfig {
    /// Reads `.env` when present, then the process environment.
    pub fn load() -> anyhow::Result<Self> {
        match dotenvy::dotenv() {
            Ok(path) => tracing::debug!("Loaded environment from {}", path.display()),
            Err(e) if e.not_found() => {}
            Err(e) => return Err(e).context("failed to read .env"),
        }

        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let defaults = Self::default();

        Ok(Self {
            comfyui_url: lookup("COMFYUI_URL").unwrap_or(defaults.comfyui_url),
            api_prefix: lookup("COMFYUI_API_PREFIX").unwrap_or(defaults.api_prefix),
            timeout: parse(&lookup, "GENERATION_TIMEOUT_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
            poll_interval: parse(&lookup, "POLL_INTERVAL_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.poll_interval),
            prevalidate: parse(&lookup, "COMFYUI_PREVALIDATE")?.unwrap_or(defaults.prevalidate),
            public_dir: lookup("PUBLIC_DIR").map(PathBuf::from).unwrap_or(defaults.public_dir),
            port: parse(&lookup, "PORT")?.unwrap_or(defaults.port),
            settings_path: lookup("SETTINGS_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.settings_path),
        })
    }

    /// Base URL every backend path is appended to.
    pub fn api_url(&self) -> String {
        format!(
            "{}/{}",
            self.comfyui_url.trim_end_matches('/'),
            self.api_prefix.trim_matches('/')
        )
        .trim_end_matches('/')
        .to_string()
    }

    pub fn images_dir(&self) -> PathBuf {
        self.public_dir.join("images")
    }

    pub fn survival_dir(&self) -> PathBuf {
        self.public_dir.join("survival")
    }
}

fn parse<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> anyhow::Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    lookup(key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .with_context(|| format!("{} must be a valid value, got '{}'", key, raw))
        })
        .transpose()
}
