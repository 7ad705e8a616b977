//! `agentgate config`: Configuration management commands.

use std::path::{Path, PathBuf};

use agentgate_config::AppConfig;

/// Print the effective configuration with secrets masked.
pub fn show() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    println!("{}", render(&config)?);
    Ok(())
}

pub fn path() {
    println!("{}", config_path().display());
}

/// Write the starter config file unless one already exists.
pub fn init() -> Result<(), Box<dyn std::error::Error>> {
    let path = config_path();
    init_at(&path)?;
    println!("Wrote {}", path.display());
    Ok(())
}

fn config_path() -> PathBuf {
    AppConfig::config_dir().join("config.toml")
}

fn init_at(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    if path.exists() {
        return Err(format!("{} already exists", path.display()).into());
    }
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    std::fs::write(path, AppConfig::default_toml())?;
    Ok(())
}

fn render(config: &AppConfig) -> Result<String, toml::ser::Error> {
    let mut masked = config.clone();
    if masked.backend.api_key.is_some() {
        masked.backend.api_key = Some("[REDACTED]".into());
    }
    toml::to_string_pretty(&masked)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_path_is_valid() {
        assert!(config_path().to_str().unwrap().ends_with("config.toml"));
    }

    #[test]
    fn render_masks_api_key() {
        let mut config = AppConfig::default();
        config.backend.api_key = Some("sk-secret".into());
        let text = render(&config).unwrap();
        assert!(text.contains("[REDACTED]"));
        assert!(!text.contains("sk-secret"));
    }

    #[test]
    fn init_writes_loadable_file_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        init_at(&path).unwrap();
        let loaded = AppConfig::load_from(&path).unwrap();
        assert_eq!(loaded.gateway.port, AppConfig::default().gateway.port);

        assert!(init_at(&path).is_err());
    }
}
