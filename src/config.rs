use crate::error::{EtlError, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_CONFIG_PATH: &str = "concert_etl.toml";

/// Process-wide settings, built once at startup and passed by reference.
#[derive(Debug, Clone)]
pub struct Config {
    pub perplexity_api_key: Option<String>,
    pub gemini_api_key: Option<String>,
    pub kopis_api_key: Option<String>,
    pub musixmatch_api_key: Option<String>,
    pub discord_webhook_url: Option<String>,
    pub output_dir: PathBuf,
    pub log_level: String,
    pub request_delay_secs: f64,
    pub max_retries: u32,
    pub timeout_secs: u64,
    pub use_gemini: bool,
    pub gemini_model: String,
    pub perplexity_model: String,
    pub test_mode: bool,
    pub test_concert_limit: usize,
    pub database: DatabaseConfig,
    pub ssh: Option<SshConfig>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SshConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub key_path: Option<PathBuf>,
    pub local_port: u16,
}

/// Optional `concert_etl.toml`; every key may be overridden by the environment.
#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    #[serde(default)]
    pipeline: FilePipeline,
    #[serde(default)]
    database: FileDatabase,
}

#[derive(Debug, Default, Deserialize)]
struct FilePipeline {
    output_dir: Option<String>,
    log_level: Option<String>,
    request_delay: Option<f64>,
    max_retries: Option<u32>,
    timeout: Option<u64>,
    use_gemini_api: Option<bool>,
    gemini_model: Option<String>,
    perplexity_model: Option<String>,
    test_concert_limit: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct FileDatabase {
    host: Option<String>,
    port: Option<u16>,
    user: Option<String>,
    name: Option<String>,
}

impl Config {
    /// Loads `.env`, the optional TOML file and the process environment.
    pub fn load() -> Result<Self> {
        dotenv::dotenv().ok();

        let path = std::env::var("CONCERT_ETL_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let file = read_file_config(Path::new(&path))?;
        Self::build(file, |key| std::env::var(key).ok())
    }

    /// Builds a config from defaults and an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        Self::build(FileConfig::default(), lookup)
    }

    fn build<F>(file: FileConfig, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let p = file.pipeline;
        let d = file.database;

        let request_delay_secs = match var("REQUEST_DELAY") {
            Some(raw) => parse_number::<f64>("REQUEST_DELAY", &raw)?,
            None => p.request_delay.unwrap_or(1.0),
        };
        if request_delay_secs < 0.0 {
            return Err(EtlError::Config("REQUEST_DELAY must not be negative".to_string()));
        }
        let max_retries = match var("MAX_RETRIES") {
            Some(raw) => parse_number("MAX_RETRIES", &raw)?,
            None => p.max_retries.unwrap_or(3),
        };
        let timeout_secs = match var("TIMEOUT") {
            Some(raw) => parse_number("TIMEOUT", &raw)?,
            None => p.timeout.unwrap_or(60),
        };
        let use_gemini = match var("USE_GEMINI_API") {
            Some(raw) => parse_bool(&raw),
            None => p.use_gemini_api.unwrap_or(false),
        };

        let database = DatabaseConfig {
            host: var("DB_HOST").or(d.host).unwrap_or_else(|| "127.0.0.1".to_string()),
            port: match var("DB_PORT") {
                Some(raw) => parse_number("DB_PORT", &raw)?,
                None => d.port.unwrap_or(3306),
            },
            user: var("DB_USER").or(d.user).unwrap_or_else(|| "root".to_string()),
            password: var("DB_PASSWORD").unwrap_or_default(),
            name: var("DB_NAME").or(d.name).unwrap_or_else(|| "concerts".to_string()),
        };

        let ssh = match var("SSH_HOST") {
            Some(host) => Some(SshConfig {
                host,
                port: match var("SSH_PORT") {
                    Some(raw) => parse_number("SSH_PORT", &raw)?,
                    None => 22,
                },
                user: var("SSH_USER").unwrap_or_else(|| "ubuntu".to_string()),
                key_path: var("SSH_KEY_PATH").map(PathBuf::from),
                local_port: match var("SSH_LOCAL_PORT") {
                    Some(raw) => parse_number("SSH_LOCAL_PORT", &raw)?,
                    None => 3307,
                },
            }),
            None => None,
        };

        Ok(Self {
            perplexity_api_key: var("PERPLEXITY_API_KEY"),
            gemini_api_key: var("GEMINI_API_KEY"),
            kopis_api_key: var("KOPIS_API_KEY"),
            musixmatch_api_key: var("MUSIXMATCH_API_KEY"),
            discord_webhook_url: var("DISCORD_WEBHOOK_URL"),
            output_dir: PathBuf::from(var("OUTPUT_DIR").or(p.output_dir).unwrap_or_else(|| "output".to_string())),
            log_level: var("LOG_LEVEL").or(p.log_level).unwrap_or_else(|| "info".to_string()),
            request_delay_secs,
            max_retries,
            timeout_secs,
            use_gemini,
            gemini_model: p.gemini_model.unwrap_or_else(|| "gemini-2.5-flash".to_string()),
            perplexity_model: p.perplexity_model.unwrap_or_else(|| "sonar-pro".to_string()),
            test_mode: false,
            test_concert_limit: p.test_concert_limit.unwrap_or(3),
            database,
            ssh,
        })
    }

    pub fn with_test_mode(mut self, enabled: bool) -> Self {
        self.test_mode = enabled;
        self
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    /// Directory the CSV catalog lives in; test runs write to a `test` subdirectory.
    pub fn data_dir(&self) -> PathBuf {
        if self.test_mode {
            self.output_dir.join("test")
        } else {
            self.output_dir.clone()
        }
    }

    pub fn output_path(&self, file_name: &str) -> PathBuf {
        self.data_dir().join(file_name)
    }

    pub fn request_delay(&self) -> Duration {
        Duration::from_secs_f64(self.request_delay_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Maximum number of concerts a collection run should touch.
    pub fn concert_limit(&self) -> Option<usize> {
        self.test_mode.then_some(self.test_concert_limit)
    }

    pub fn kopis_key(&self) -> Result<&str> {
        require(&self.kopis_api_key, "KOPIS_API_KEY")
    }

    pub fn perplexity_key(&self) -> Result<&str> {
        require(&self.perplexity_api_key, "PERPLEXITY_API_KEY")
    }

    pub fn gemini_key(&self) -> Result<&str> {
        require(&self.gemini_api_key, "GEMINI_API_KEY")
    }

    pub fn musixmatch_key(&self) -> Result<&str> {
        require(&self.musixmatch_api_key, "MUSIXMATCH_API_KEY")
    }
}

fn require<'a>(key: &'a Option<String>, name: &str) -> Result<&'a str> {
    key.as_deref()
        .ok_or_else(|| EtlError::Config(format!("{name} environment variable not set")))
}

fn read_file_config(path: &Path) -> Result<FileConfig> {
    if !path.is_file() {
        return Ok(FileConfig::default());
    }
    let content = fs::read_to_string(path)
        .map_err(|e| EtlError::Config(format!("Failed to read config file '{}': {}", path.display(), e)))?;
    Ok(toml::from_str(&content)?)
}

fn parse_number<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.parse::<T>()
        .map_err(|_| EtlError::Config(format!("{key} has an invalid value: {raw}")))
}

fn parse_bool(raw: &str) -> bool {
    matches!(raw.to_ascii_lowercase().as_str(), "true" | "1" | "yes" | "y")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<Config> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Config::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn defaults_apply_without_environment() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.output_dir, PathBuf::from("output"));
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.timeout_secs, 60);
        assert!(!config.use_gemini);
        assert!(config.ssh.is_none());
        assert_eq!(config.concert_limit(), None);
    }

    #[test]
    fn environment_overrides_defaults() {
        let config = config_from(&[
            ("REQUEST_DELAY", "2.5"),
            ("MAX_RETRIES", "5"),
            ("USE_GEMINI_API", "Yes"),
            ("SSH_HOST", "bastion.example.com"),
            ("SSH_KEY_PATH", "/keys/id_rsa"),
        ])
        .unwrap();
        assert_eq!(config.request_delay(), Duration::from_millis(2500));
        assert_eq!(config.max_retries, 5);
        assert!(config.use_gemini);
        let ssh = config.ssh.unwrap();
        assert_eq!(ssh.host, "bastion.example.com");
        assert_eq!(ssh.port, 22);
        assert_eq!(ssh.key_path, Some(PathBuf::from("/keys/id_rsa")));
    }

    #[test]
    fn invalid_numbers_are_config_errors() {
        let err = config_from(&[("MAX_RETRIES", "many")]).unwrap_err();
        assert!(matches!(err, EtlError::Config(_)));
    }

    #[test]
    fn test_mode_redirects_output_and_limits_concerts() {
        let config = config_from(&[("OUTPUT_DIR", "/data")]).unwrap().with_test_mode(true);
        assert_eq!(config.output_path("concerts.csv"), PathBuf::from("/data/test/concerts.csv"));
        assert_eq!(config.concert_limit(), Some(3));
    }

    #[test]
    fn missing_key_is_reported_by_name() {
        let config = config_from(&[]).unwrap();
        let err = config.kopis_key().unwrap_err();
        assert!(err.to_string().contains("KOPIS_API_KEY"));
    }
}
