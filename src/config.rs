use std::fs;
use std::time::Duration;

use camino::Utf8PathBuf;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::blob::{Credentials, S3Settings};
use crate::error::DownloaderError;

pub const CONFIG_FILE: &str = "s3sql.json";
pub const DEFAULT_OUTPUT_DIR: &str = "downloads";
pub const DEFAULT_DATABASE: &str = "app.db";
pub const DEFAULT_REGION: &str = "us-east-1";
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// On-disk shape of `s3sql.json`; every key is optional.
#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    #[serde(default)]
    pub bucket: Option<String>,
    #[serde(default)]
    pub database: Option<String>,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub output_dir: Option<String>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

/// Values taken from the command line; they win over file and environment.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub bucket: Option<String>,
    pub database: Option<String>,
    pub endpoint: Option<String>,
    pub region: Option<String>,
    pub output_dir: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub schema_version: u32,
    pub bucket: String,
    pub database: Utf8PathBuf,
    pub endpoint: String,
    pub region: String,
    pub output_dir: Utf8PathBuf,
    pub timeout: Duration,
    pub credentials: Option<Credentials>,
}

impl ResolvedConfig {
    pub fn s3_settings(&self) -> S3Settings {
        S3Settings {
            endpoint: self.endpoint.clone(),
            region: self.region.clone(),
            timeout: self.timeout,
            credentials: self.credentials.clone(),
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct EnvSettings {
    pub bucket: Option<String>,
    pub database: Option<String>,
    pub endpoint: Option<String>,
    pub region: Option<String>,
    pub credentials: Option<Credentials>,
}

impl EnvSettings {
    pub fn from_process() -> Self {
        Self {
            bucket: env_value("S3SQL_BUCKET"),
            database: env_value("S3SQL_DATABASE"),
            endpoint: env_value("S3SQL_ENDPOINT"),
            region: env_value("AWS_REGION").or_else(|| env_value("AWS_DEFAULT_REGION")),
            credentials: Credentials::from_env(),
        }
    }
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Reads the config file, then layers environment and overrides on top.
    ///
    /// An explicit `path` must exist. Without one, `./s3sql.json` and then the
    /// per-user config file are tried, and a missing file is not an error.
    pub fn resolve(
        path: Option<&str>,
        overrides: Overrides,
    ) -> Result<ResolvedConfig, DownloaderError> {
        let config = match path {
            Some(path) => Self::read(Utf8PathBuf::from(path))?,
            None => match Self::discover() {
                Some(found) => Self::read(found)?,
                None => Config::default(),
            },
        };
        Self::resolve_config(config, EnvSettings::from_process(), overrides)
    }

    pub fn resolve_config(
        config: Config,
        env: EnvSettings,
        overrides: Overrides,
    ) -> Result<ResolvedConfig, DownloaderError> {
        let bucket = overrides
            .bucket
            .or(env.bucket)
            .or(config.bucket)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .ok_or(DownloaderError::MissingBucket)?;

        let region = overrides
            .region
            .or(env.region)
            .or(config.region)
            .unwrap_or_else(|| DEFAULT_REGION.to_string());

        let endpoint = overrides
            .endpoint
            .or(env.endpoint)
            .or(config.endpoint)
            .unwrap_or_else(|| default_endpoint(&region));

        let database = overrides
            .database
            .or(env.database)
            .or(config.database)
            .unwrap_or_else(|| DEFAULT_DATABASE.to_string());

        let output_dir = overrides
            .output_dir
            .or(config.output_dir)
            .unwrap_or_else(|| DEFAULT_OUTPUT_DIR.to_string());

        Ok(ResolvedConfig {
            schema_version: config.schema_version.unwrap_or(1),
            bucket,
            database: Utf8PathBuf::from(database),
            endpoint,
            region,
            output_dir: Utf8PathBuf::from(output_dir),
            timeout: Duration::from_secs(config.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS)),
            credentials: env.credentials,
        })
    }

    fn discover() -> Option<Utf8PathBuf> {
        let local = Utf8PathBuf::from(CONFIG_FILE);
        if local.as_std_path().is_file() {
            return Some(local);
        }
        ProjectDirs::from("", "", "s3sql")
            .and_then(|dirs| Utf8PathBuf::from_path_buf(dirs.config_dir().join("config.json")).ok())
            .filter(|path| path.as_std_path().is_file())
    }

    fn read(path: Utf8PathBuf) -> Result<Config, DownloaderError> {
        let content =
            fs::read_to_string(path.as_std_path()).map_err(|_| DownloaderError::ConfigRead(path.clone()))?;
        serde_json::from_str(&content).map_err(|err| DownloaderError::ConfigParse(err.to_string()))
    }
}

pub fn default_endpoint(region: &str) -> String {
    format!("https://s3.{region}.amazonaws.com")
}
