use crate::candles::Timeframe;
use anyhow::Context;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::path::{Path, PathBuf};
use tokio::fs;

// CONFIGURATION STRUCTS
// Loaded from `config.json` in the storage directory.

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    pub retry_delay_ms: u64,      // fixed sleep after a failed request
    pub max_retries: Option<u32>, // null = keep retrying forever
    pub request_pause_ms: u64,    // pause before every candle request
    pub candle_limit: Option<u32>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.dydx.exchange".to_string(),
            retry_delay_ms: 3000,
            max_retries: None,
            request_pause_ms: 100,
            candle_limit: None,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub api: ApiConfig,
    pub timeframes: Vec<Timeframe>,
    pub excluded_markets: Vec<String>, // dead markets, e.g. "LUNA-USD"
    pub market_pattern: Option<String>,
    pub top_n: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api: ApiConfig::default(),
            timeframes: vec![Timeframe::OneDay, Timeframe::FourHours, Timeframe::OneHour],
            excluded_markets: vec!["LUNA-USD".to_string()],
            market_pattern: None,
            top_n: 3,
        }
    }
}

impl AppConfig {
    /// **Config Bootstrap**
    /// Loads `config.json`, writing the defaults first if the file does not exist yet.
    /// Keys missing from an existing file fall back to their defaults.
    pub async fn load_or_init(storage: &AsyncStorageManager) -> anyhow::Result<Self> {
        if !storage.exists("config").await {
            let config = Self::default();
            storage.save("config", &config).await?;
            tracing::info!(dir = ?storage.base_dir, "wrote default config");
            return Ok(config);
        }
        storage.load("config").await.context("invalid config.json")
    }
}

// STORAGE MANAGER

pub struct AsyncStorageManager {
    // Absolute path to the storage directory (e.g. ".../target/debug/storage")
    pub base_dir: PathBuf,
}

impl AsyncStorageManager {
    /// **Constructor: new_relative**
    /// Resolves the storage directory next to the running executable, so the
    /// config travels with the binary rather than the working directory.
    pub async fn new_relative<P: AsRef<Path>>(relative_path: P) -> anyhow::Result<Self> {
        // 1. Locate the running executable
        let exe_path = std::env::current_exe()?;

        // 2. Append the relative path (e.g. "storage") to its directory
        let base_dir = exe_path
            .parent()
            .ok_or_else(|| anyhow::anyhow!("Could not find binary directory"))?
            .join(relative_path);
        Self::new(base_dir).await
    }

    /// **Constructor: new**
    /// Uses `base_dir` as given (the `--storage-dir` flag), creating it up front
    /// so later saves never have to check for it.
    pub async fn new<P: Into<PathBuf>>(base_dir: P) -> anyhow::Result<Self> {
        let base_dir = base_dir.into();
        if !base_dir.exists() {
            fs::create_dir_all(&base_dir)
                .await
                .with_context(|| format!("creating {}", base_dir.display()))?;
        }
        Ok(Self { base_dir })
    }

    fn path_for(&self, filename: &str) -> PathBuf {
        self.base_dir.join(format!("{}.json", filename))
    }

    pub async fn exists(&self, filename: &str) -> bool {
        fs::try_exists(self.path_for(filename)).await.unwrap_or(false)
    }

    /// **Generic Save Function**
    /// Serializes any `Serialize` value to `<filename>.json` as pretty JSON,
    /// which keeps `config.json` editable by hand.
    pub async fn save<T: Serialize>(&self, filename: &str, data: &T) -> anyhow::Result<()> {
        let final_path = self.path_for(filename);
        // A crash mid-write only ever truncates the .tmp file
        let tmp_path = self.base_dir.join(format!("{}.json.tmp", filename));

        let json_bytes = serde_json::to_vec_pretty(data)?;

        // 1. Write data to the temporary file
        fs::write(&tmp_path, json_bytes).await?;

        // 2. Atomically rename the temp file to the final name
        fs::rename(tmp_path, final_path).await?;

        Ok(())
    }

    /// **Generic Load Function**
    /// Reads `<filename>.json` and deserializes it into `T`.
    pub async fn load<T: DeserializeOwned>(&self, filename: &str) -> anyhow::Result<T> {
        let path = self.path_for(filename);
        // serde_json validates UTF-8 itself, no need for read_to_string
        let content = fs::read(&path)
            .await
            .with_context(|| format!("reading {}", path.display()))?;
        let data = serde_json::from_slice(&content)?;
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(name: &str) -> PathBuf {
        let unique = format!("stationarity-screener-{}-{}", name, std::process::id());
        std::env::temp_dir().join(unique)
    }

    #[tokio::test]
    async fn missing_config_is_initialised_with_defaults() {
        let dir = scratch_dir("init");
        let _ = std::fs::remove_dir_all(&dir);
        let storage = AsyncStorageManager::new(&dir).await.unwrap();

        let config = AppConfig::load_or_init(&storage).await.unwrap();
        assert_eq!(config, AppConfig::default());
        assert!(dir.join("config.json").exists());
        assert!(!dir.join("config.json.tmp").exists());

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn partial_config_falls_back_to_defaults() {
        let dir = scratch_dir("partial");
        let _ = std::fs::remove_dir_all(&dir);
        let storage = AsyncStorageManager::new(&dir).await.unwrap();
        std::fs::write(
            dir.join("config.json"),
            r#"{"timeframes": ["1HOUR"], "api": {"retry_delay_ms": 10}}"#,
        )
        .unwrap();

        let config = AppConfig::load_or_init(&storage).await.unwrap();
        assert_eq!(config.timeframes, vec![Timeframe::OneHour]);
        assert_eq!(config.api.retry_delay_ms, 10);
        assert_eq!(config.api.base_url, "https://api.dydx.exchange");
        assert_eq!(config.excluded_markets, vec!["LUNA-USD".to_string()]);
        assert_eq!(config.top_n, 3);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn malformed_config_is_an_error() {
        let dir = scratch_dir("malformed");
        let _ = std::fs::remove_dir_all(&dir);
        let storage = AsyncStorageManager::new(&dir).await.unwrap();
        std::fs::write(dir.join("config.json"), "{ not json").unwrap();

        assert!(AppConfig::load_or_init(&storage).await.is_err());

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
