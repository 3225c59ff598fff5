use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

/// MIME типы, которые принимает /decode
pub const ALLOWED_IMAGE_TYPES: [&str; 3] = ["image/jpeg", "image/png", "image/jpg"];

const DEFAULT_PORT: u16 = 3000;
const DEFAULT_MAX_UPLOAD_BYTES: usize = 3_000_000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub upload: UploadConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    pub dir: PathBuf,
    pub max_file_size: usize,
    pub allowed_types: Vec<String>,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("uploads"),
            max_file_size: DEFAULT_MAX_UPLOAD_BYTES,
            allowed_types: ALLOWED_IMAGE_TYPES.iter().map(|t| t.to_string()).collect(),
        }
    }
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        // .env необязателен
        dotenv::dotenv().ok();

        let upload_defaults = UploadConfig::default();

        let config = Config {
            server: ServerConfig {
                host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: env::var("PORT")
                    .ok()
                    .and_then(|p| p.parse().ok())
                    .unwrap_or(DEFAULT_PORT),
            },
            upload: UploadConfig {
                dir: env::var("UPLOAD_DIR")
                    .map(PathBuf::from)
                    .unwrap_or(upload_defaults.dir),
                max_file_size: env::var("MAX_UPLOAD_BYTES")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(upload_defaults.max_file_size),
                allowed_types: upload_defaults.allowed_types,
            },
        };

        // Валидация конфигурации
        config.validate()?;

        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.server.port == 0 {
            anyhow::bail!("Port must be non-zero");
        }

        if self.upload.max_file_size == 0 {
            anyhow::bail!("Upload size limit must be positive");
        }

        if self.upload.dir.as_os_str().is_empty() {
            anyhow::bail!("Upload directory is not configured");
        }

        if self.upload.allowed_types.is_empty() {
            anyhow::bail!("No allowed image types configured");
        }

        Ok(())
    }
}

impl UploadConfig {
    pub fn is_type_allowed(&self, mime: &str) -> bool {
        self.allowed_types.iter().any(|t| t.eq_ignore_ascii_case(mime))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Config {
        Config {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: DEFAULT_PORT,
            },
            upload: UploadConfig::default(),
        }
    }

    #[test]
    fn default_upload_config_matches_service_limits() {
        let upload = UploadConfig::default();
        assert_eq!(upload.max_file_size, 3_000_000);
        assert_eq!(upload.dir, PathBuf::from("uploads"));
        assert!(upload.is_type_allowed("image/png"));
        assert!(upload.is_type_allowed("IMAGE/JPEG"));
        assert!(upload.is_type_allowed("image/jpg"));
        assert!(!upload.is_type_allowed("text/plain"));
        assert!(!upload.is_type_allowed("image/gif"));
    }

    #[test]
    fn validate_accepts_defaults() {
        assert!(sample().validate().is_ok());
    }

    #[test]
    fn validate_rejects_broken_values() {
        let mut config = sample();
        config.server.port = 0;
        assert!(config.validate().is_err());

        let mut config = sample();
        config.upload.max_file_size = 0;
        assert!(config.validate().is_err());

        let mut config = sample();
        config.upload.allowed_types.clear();
        assert!(config.validate().is_err());

        let mut config = sample();
        config.upload.dir = PathBuf::new();
        assert!(config.validate().is_err());
    }
}
