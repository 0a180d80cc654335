//! Server configuration management

use crate::error::{ApiError, Result};
use mapforge::{CanvasSpec, MarkerLimits};
use mapforge_registry::{RegistryConfig, StorageArea, StorageLayout};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,

    /// Port to bind to
    pub port: u16,

    /// SQLite connection string for metadata
    pub database_url: String,

    /// Directory served under `/maps`
    pub map_root: PathBuf,

    pub template_dir: PathBuf,
    pub current_dir: PathBuf,
    pub overlays_dir: PathBuf,
    pub awaiting_dir: PathBuf,

    /// Largest accepted marker upload in bytes
    pub max_upload_bytes: usize,

    /// Users treated as admins regardless of the forwarded role
    pub admin_user_ids: Vec<i64>,

    /// CORS allowed origins
    pub cors_origins: Vec<String>,
}

impl ServerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Load configuration from any variable source
    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let map_root = PathBuf::from(var("MAP_ROOT").unwrap_or_else(|| "./maps".to_string()));
        let area_dir = |key: &str, area: StorageArea| {
            var(key)
                .map(PathBuf::from)
                .unwrap_or_else(|| map_root.join(area.default_dir()))
        };

        Ok(Self {
            host: var("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: var("PORT")
                .unwrap_or_else(|| "3001".to_string())
                .parse()
                .map_err(|_| ApiError::Config("Invalid PORT value".to_string()))?,
            database_url: var("DATABASE_URL")
                .unwrap_or_else(|| "sqlite:./data/mapforge.db".to_string()),
            template_dir: area_dir("MAP_TEMPLATE_DIR", StorageArea::Templates),
            current_dir: area_dir("MAP_CURRENT_DIR", StorageArea::Current),
            overlays_dir: area_dir("MAP_OVERLAYS_DIR", StorageArea::Overlays),
            awaiting_dir: area_dir("MAP_AWAITING_DIR", StorageArea::Awaiting),
            map_root: map_root.clone(),
            max_upload_bytes: var("MAX_UPLOAD_BYTES")
                .unwrap_or_else(|| mapforge::normalize::DEFAULT_MAX_UPLOAD_BYTES.to_string())
                .parse()
                .map_err(|_| ApiError::Config("Invalid MAX_UPLOAD_BYTES value".to_string()))?,
            admin_user_ids: var("ADMIN_USER_IDS")
                .unwrap_or_default()
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| {
                    s.parse()
                        .map_err(|_| ApiError::Config(format!("Invalid ADMIN_USER_IDS entry: {}", s)))
                })
                .collect::<Result<_>>()?,
            cors_origins: var("CORS_ORIGINS")
                .unwrap_or_else(|| "*".to_string())
                .split(',')
                .map(|s| s.trim().to_string())
                .collect(),
        })
    }

    pub fn storage_layout(&self) -> StorageLayout {
        StorageLayout {
            root: self.map_root.clone(),
            overlays: self.overlays_dir.clone(),
            awaiting: self.awaiting_dir.clone(),
            templates: self.template_dir.clone(),
            current: self.current_dir.clone(),
        }
    }

    pub fn registry_config(&self) -> RegistryConfig {
        RegistryConfig {
            limits: MarkerLimits {
                max_bytes: self.max_upload_bytes,
                ..MarkerLimits::default()
            },
            canvas: CanvasSpec::default(),
        }
    }

    /// Request body limit for uploads, with room for multipart framing so
    /// oversized images reach the size check instead of being cut off
    pub fn upload_body_limit(&self) -> usize {
        self.max_upload_bytes.saturating_mul(2).max(64 * 1024)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        let map_root = PathBuf::from("./maps");
        Self {
            host: "0.0.0.0".to_string(),
            port: 3001,
            database_url: "sqlite:./data/mapforge.db".to_string(),
            template_dir: map_root.join(StorageArea::Templates.default_dir()),
            current_dir: map_root.join(StorageArea::Current.default_dir()),
            overlays_dir: map_root.join(StorageArea::Overlays.default_dir()),
            awaiting_dir: map_root.join(StorageArea::Awaiting.default_dir()),
            map_root,
            max_upload_bytes: mapforge::normalize::DEFAULT_MAX_UPLOAD_BYTES,
            admin_user_ids: Vec::new(),
            cors_origins: vec!["*".to_string()],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<ServerConfig> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServerConfig::from_vars(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3001);
        assert_eq!(config.database_url, "sqlite:./data/mapforge.db");
        assert_eq!(config.max_upload_bytes, 2_097_152);
        assert_eq!(config.awaiting_dir, PathBuf::from("./maps/awaiting-approval"));
        assert_eq!(config.template_dir, PathBuf::from("./maps/template"));
        assert!(config.admin_user_ids.is_empty());
        assert_eq!(config.cors_origins, vec!["*".to_string()]);

        let parsed = config_from(&[]).unwrap();
        assert_eq!(parsed.storage_layout(), config.storage_layout());
        assert_eq!(parsed.max_upload_bytes, config.max_upload_bytes);
    }

    #[test]
    fn test_directories_follow_map_root_unless_overridden() {
        let config = config_from(&[
            ("MAP_ROOT", "/srv/maps"),
            ("MAP_CURRENT_DIR", "/srv/maps/published"),
        ])
        .unwrap();
        assert_eq!(config.overlays_dir, PathBuf::from("/srv/maps/overlays"));
        assert_eq!(config.current_dir, PathBuf::from("/srv/maps/published"));
        assert_eq!(config.storage_layout().root, PathBuf::from("/srv/maps"));
    }

    #[test]
    fn test_admin_ids_are_parsed() {
        let config = config_from(&[("ADMIN_USER_IDS", "1, 42 ,")]).unwrap();
        assert_eq!(config.admin_user_ids, vec![1, 42]);
        assert!(config_from(&[("ADMIN_USER_IDS", "1,bob")]).is_err());
    }

    #[test]
    fn test_invalid_numbers_are_config_errors() {
        assert!(matches!(config_from(&[("PORT", "http")]), Err(ApiError::Config(_))));
        assert!(matches!(
            config_from(&[("MAX_UPLOAD_BYTES", "-1")]),
            Err(ApiError::Config(_))
        ));
    }
}
