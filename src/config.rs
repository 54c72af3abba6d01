// src/config.rs

//! Configuration loading for the Lambda environment.
//!
//! The function reads `{prefix}/config.toml` from S3. A missing object falls
//! back to defaults plus environment overrides, so secrets can live in the
//! function environment alone.

use aws_sdk_s3::Client;
use tracing::{info, warn};

use crate::error::{AppError, Result};
use crate::models::Config;

/// Config loader for Lambda environment.
pub struct LambdaConfigLoader {
    client: Client,
    bucket: String,
    prefix: String,
}

impl LambdaConfigLoader {
    pub fn new(client: Client, bucket: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
            prefix: prefix.into(),
        }
    }

    /// Build from `CONFIG_S3_BUCKET` and `CONFIG_S3_PREFIX`.
    pub async fn from_env() -> Self {
        let sdk_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        let bucket =
            std::env::var("CONFIG_S3_BUCKET").unwrap_or_else(|_| "toplist-archive".to_string());
        let prefix = std::env::var("CONFIG_S3_PREFIX").unwrap_or_else(|_| "config".to_string());
        Self::new(Client::new(&sdk_config), bucket, prefix)
    }

    fn key(&self, file_name: &str) -> String {
        object_key(&self.prefix, file_name)
    }

    async fn read_optional(&self, key: &str) -> Result<Option<String>> {
        let result = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await;

        match result {
            Ok(output) => {
                let bytes = output
                    .body
                    .collect()
                    .await
                    .map_err(|e| AppError::config(format!("Reading s3://{}/{key}: {e}", self.bucket)))?;
                let text = String::from_utf8(bytes.into_bytes().to_vec()).map_err(|e| {
                    AppError::config(format!("Config file {key} is not valid UTF-8: {e}"))
                })?;
                Ok(Some(text))
            }
            Err(err) => {
                let service_err = err.into_service_error();
                if service_err.is_no_such_key() {
                    Ok(None)
                } else {
                    Err(AppError::config(format!(
                        "Reading s3://{}/{key}: {service_err}",
                        self.bucket
                    )))
                }
            }
        }
    }

    pub async fn load_config(&self) -> Result<Config> {
        let key = self.key("config.toml");
        info!("Loading config file from S3: {}", key);
        match self.read_optional(&key).await? {
            Some(text) => Config::from_toml(&text),
            None => {
                warn!("No config at s3://{}/{}; using defaults", self.bucket, key);
                let mut config = Config::default();
                config.apply_env();
                Ok(config)
            }
        }
    }
}

fn object_key(prefix: &str, file_name: &str) -> String {
    let prefix = prefix.trim_matches('/');
    if prefix.is_empty() {
        file_name.to_string()
    } else {
        format!("{prefix}/{file_name}")
    }
}
