use std::fs;
use std::path::Path;

use directories::ProjectDirs;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

/// Per-project overrides, looked up in the project root.
pub const PROJECT_CONFIG_FILE: &str = "inkfolio.toml";
pub const ENV_PREFIX: &str = "INKFOLIO_";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct LoggingConfig {
    pub inkfolio: String,
    pub image: String,
}

impl LoggingConfig {
    const LOG_LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];
    const INKFOLIO_LEVEL: &str = "info";
    const IMAGE_LEVEL: &str = "warn";

    fn default() -> Self {
        LoggingConfig {
            inkfolio: Self::INKFOLIO_LEVEL.to_string(),
            image: Self::IMAGE_LEVEL.to_string(),
        }
    }

    fn ensure_valid(&mut self) {
        Self::ensure_level(&mut self.inkfolio, "inkfolio", Self::INKFOLIO_LEVEL);
        Self::ensure_level(&mut self.image, "image", Self::IMAGE_LEVEL);
    }

    fn ensure_level(level: &mut String, name: &str, default: &str) {
        let str_original = level.clone();
        *level = level.trim().to_ascii_lowercase();
        if !Self::LOG_LEVELS.contains(&level.as_str()) {
            eprintln!(
                "Config error: {} log level of '{}' is invalid - using default of '{}'",
                name, str_original, default
            );
            *level = default.to_owned();
        }
    }

    /// flexi_logger spec string, e.g. `warn, inkfolio=info, image=warn`.
    pub fn log_spec(&self) -> String {
        format!("warn, inkfolio={}, image={}", self.inkfolio, self.image)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct LayoutConfig {
    pub catalog: String,
    pub thumb_dir: String,
    pub large_dir: String,
}

impl LayoutConfig {
    const CATALOG: &str = "artworks.json";
    const THUMB_DIR: &str = "images/paintings/thumbnails";
    const LARGE_DIR: &str = "images/paintings/large";

    fn default() -> Self {
        LayoutConfig {
            catalog: Self::CATALOG.to_owned(),
            thumb_dir: Self::THUMB_DIR.to_owned(),
            large_dir: Self::LARGE_DIR.to_owned(),
        }
    }

    fn ensure_valid(&mut self) {
        for (value, name, default) in [
            (&mut self.catalog, "catalog", Self::CATALOG),
            (&mut self.thumb_dir, "thumb_dir", Self::THUMB_DIR),
            (&mut self.large_dir, "large_dir", Self::LARGE_DIR),
        ] {
            if value.trim().is_empty() {
                eprintln!("Config error: layout {} is empty - using default of '{}'", name, default);
                *value = default.to_owned();
            }
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ThumbnailConfig {
    pub max_size: u32,
}

impl ThumbnailConfig {
    const MAX_SIZE: u32 = 800;

    fn default() -> Self {
        ThumbnailConfig {
            max_size: Self::MAX_SIZE,
        }
    }

    fn ensure_valid(&mut self) {
        if self.max_size == 0 {
            eprintln!(
                "Config error: thumbnail max_size of 0 is invalid - using default of '{}'",
                Self::MAX_SIZE
            );
            self.max_size = Self::MAX_SIZE;
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Config {
    pub logging: LoggingConfig,
    pub layout: LayoutConfig,
    pub thumbnails: ThumbnailConfig,
}

impl Config {
    fn default() -> Self {
        Config {
            logging: LoggingConfig::default(),
            layout: LayoutConfig::default(),
            thumbnails: ThumbnailConfig::default(),
        }
    }

    /// Loads `config.toml` from the platform config directory, then the project's
    /// `inkfolio.toml` (if a project root is known), then `INKFOLIO_` environment
    /// variables. Problems are reported and defaults are used.
    pub fn load_config(project_dirs: &ProjectDirs, project_root: Option<&Path>) -> Self {
        let config_path = project_dirs.config_dir().join("config.toml");
        Self::load_from(&config_path, project_root)
    }

    pub fn load_from(config_path: &Path, project_root: Option<&Path>) -> Self {
        let default_config = Config::default();

        // If the config file doesn't exist, write the default configuration to disk.
        if !config_path.exists() {
            if let Some(parent) = config_path.parent() {
                if let Err(e) = fs::create_dir_all(parent) {
                    eprintln!(
                        "Failed to create configuration directory {}: {}",
                        parent.display(),
                        e
                    );
                }
            }
            if let Ok(toml_string) = toml::to_string_pretty(&default_config) {
                if let Err(e) = fs::write(config_path, toml_string) {
                    eprintln!(
                        "Failed to write default config to {}: {}",
                        config_path.display(),
                        e
                    );
                }
            } else {
                eprintln!("Failed to serialize default config.");
            }
        }

        let mut figment = Figment::from(Serialized::defaults(default_config.clone()))
            .merge(Toml::file(config_path));
        if let Some(root) = project_root {
            figment = figment.merge(Toml::file(root.join(PROJECT_CONFIG_FILE)));
        }
        figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));

        let mut config = figment.extract().unwrap_or_else(|err| {
            eprintln!(
                "Could not load config file {}: {}. Using default configuration.",
                config_path.display(),
                err
            );
            default_config
        });

        config.ensure_valid();

        config
    }

    fn ensure_valid(&mut self) {
        self.logging.ensure_valid();
        self.layout.ensure_valid();
        self.thumbnails.ensure_valid();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_missing_file_writes_defaults() {
        Jail::expect_with(|jail| {
            let config_path = jail.directory().join("conf").join("config.toml");
            let config = Config::load_from(&config_path, None);

            assert_eq!(config, Config::default());
            assert!(config_path.is_file());
            let written = fs::read_to_string(&config_path).unwrap();
            assert!(written.contains("images/paintings/thumbnails"));
            Ok(())
        });
    }

    #[test]
    fn test_layering_file_project_and_env() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "config.toml",
                r#"
                [logging]
                inkfolio = "DEBUG"
                image = "warn"

                [thumbnails]
                max_size = 400
                "#,
            )?;
            jail.create_dir("site")?;
            jail.create_file(
                "site/inkfolio.toml",
                r#"
                [layout]
                catalog = "data/artworks.json"
                thumb_dir = "images/thumbs"
                large_dir = "images/large"
                "#,
            )?;
            jail.set_env("INKFOLIO_LAYOUT__LARGE_DIR", "images/hires");

            let config = Config::load_from(Path::new("config.toml"), Some(Path::new("site")));

            assert_eq!(config.logging.inkfolio, "debug");
            assert_eq!(config.thumbnails.max_size, 400);
            assert_eq!(config.layout.catalog, "data/artworks.json");
            assert_eq!(config.layout.thumb_dir, "images/thumbs");
            assert_eq!(config.layout.large_dir, "images/hires");
            Ok(())
        });
    }

    #[test]
    fn test_invalid_values_fall_back_to_defaults() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "config.toml",
                r#"
                [logging]
                inkfolio = "loud"
                image = "info"

                [layout]
                catalog = "  "
                thumb_dir = "t"
                large_dir = "l"

                [thumbnails]
                max_size = 0
                "#,
            )?;

            let config = Config::load_from(Path::new("config.toml"), None);

            assert_eq!(config.logging.inkfolio, "info");
            assert_eq!(config.logging.image, "info");
            assert_eq!(config.layout.catalog, "artworks.json");
            assert_eq!(config.thumbnails.max_size, 800);
            assert_eq!(config.logging.log_spec(), "warn, inkfolio=info, image=info");
            Ok(())
        });
    }
}
