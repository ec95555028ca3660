use crate::{AttachError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

const DEFAULT_IMAGE_TIMEOUT_SECS: u64 = 4;
const DEFAULT_TOTAL_TIMEOUT_SECS: u64 = 20;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AttachConfig {
    /// Comma-separated hostnames that never count as external.
    /// A `*.` prefix matches any single subdomain label.
    pub except_domains: String,
    /// Per-image download budget in seconds. 0 falls back to the default.
    pub image_timeout_secs: u64,
    /// Whole-batch download budget in seconds. 0 falls back to the default.
    pub total_timeout_secs: u64,
    pub retry_failed_downloads: bool,
    pub apply_size_limits: bool,
    pub allow_animated_gif: bool,
    /// Extension used when neither the URL nor the bytes reveal one.
    pub default_extension: String,
}

impl Default for AttachConfig {
    fn default() -> Self {
        Self {
            except_domains: String::new(),
            image_timeout_secs: DEFAULT_IMAGE_TIMEOUT_SECS,
            total_timeout_secs: DEFAULT_TOTAL_TIMEOUT_SECS,
            retry_failed_downloads: false,
            apply_size_limits: false,
            allow_animated_gif: true,
            default_extension: "jpg".to_string(),
        }
    }
}

impl AttachConfig {
    pub fn per_item_timeout(&self) -> Duration {
        let secs = if self.image_timeout_secs == 0 {
            DEFAULT_IMAGE_TIMEOUT_SECS
        } else {
            self.image_timeout_secs
        };
        Duration::from_secs(secs)
    }

    pub fn aggregate_timeout(&self) -> Duration {
        let secs = if self.total_timeout_secs == 0 {
            DEFAULT_TOTAL_TIMEOUT_SECS
        } else {
            self.total_timeout_secs
        };
        Duration::from_secs(secs)
    }

    pub fn load_from(path: &Path) -> Result<AttachConfig> {
        if !path.exists() {
            return Ok(AttachConfig::default());
        }
        let bytes = std::fs::read(path)?;
        let parsed: AttachConfig =
            serde_json::from_slice(&bytes).map_err(|e| AttachError::ConfigInvalid {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
        Ok(parsed)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, format!("{json}\n"))?;
        Ok(())
    }
}
