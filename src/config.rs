use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub base_url: String,
    pub port: u16,
    pub database: Database,
    pub storage: Storage,
    #[serde(default)]
    pub limits: Limits,
    pub identifiers: Identifiers,
    pub fingerprint: Fingerprint,
    #[serde(default)]
    pub attachments: Attachments,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Database {
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Storage {
    pub dir: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Limits {
    pub max_upload_size: usize,
    pub page_size: u32,
}

impl Default for Limits {
    fn default() -> Self {
        Limits {
            max_upload_size: 4 * 1024 * 1024,
            page_size: 10,
        }
    }
}

/// Key for the identifier permutation. Changing it changes every public
/// paste identifier, so it must stay fixed for the lifetime of a database.
#[derive(Debug, Clone, Deserialize)]
pub struct Identifiers {
    pub secret: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Fingerprint {
    pub secret: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Attachments {
    pub enabled: bool,
    pub allowed_extensions: Vec<String>,
}

impl Default for Attachments {
    fn default() -> Self {
        Attachments {
            enabled: false,
            allowed_extensions: ["txt", "png", "jpg", "jpeg", "gif", "pdf", "log"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

impl Attachments {
    /// Whether a file name carries one of the allowed extensions.
    pub fn allows(&self, file_name: &str) -> bool {
        let Some((_, ext)) = file_name.rsplit_once('.') else {
            return false;
        };
        let ext = ext.to_lowercase();
        self.allowed_extensions
            .iter()
            .any(|allowed| allowed.to_lowercase() == ext)
    }
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        toml::from_str(&text).context("failed to deserialize config")
    }

    /// The config file used when none is given on the command line.
    pub fn default_path() -> PathBuf {
        directories_next::ProjectDirs::from("", "", "revbin")
            .map(|dirs| dirs.config_dir().join("config.toml"))
            .unwrap_or_else(|| PathBuf::from("config.toml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXAMPLE: &str = r#"
        base_url = "http://localhost:8080"
        port = 8080

        [database]
        url = "sqlite://revbin.db"

        [storage]
        dir = "attachments"

        [identifiers]
        secret = 1234

        [fingerprint]
        secret = "pepper"
    "#;

    #[test]
    fn optional_sections_use_defaults() {
        let config: Config = toml::from_str(EXAMPLE).unwrap();
        assert_eq!(config.limits.page_size, 10);
        assert!(!config.attachments.enabled);
        assert_eq!(config.identifiers.secret, 1234);
    }

    #[test]
    fn extension_filter_ignores_case() {
        let attachments = Attachments::default();
        assert!(attachments.allows("screenshot.PNG"));
        assert!(attachments.allows("archive.tar.log"));
        assert!(!attachments.allows("script.sh"));
        assert!(!attachments.allows("README"));
    }
}
