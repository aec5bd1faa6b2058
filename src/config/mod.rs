//! Site configuration management for `loam.toml`.
//!
//! # Sections
//!
//! | Section        | Purpose                                        |
//! |----------------|------------------------------------------------|
//! | `[workspace]`  | Project directory layout (sources, output)     |
//! | `[build]`      | Build behavior (optimization, prerender, base) |
//! | `[dev_server]` | Development server (port, host, extensions)    |
//! | `[markdown]`   | Markdown page handling                         |
//! | `[polyfills]`  | Browser compatibility shims                    |
//! | `[extra]`      | User-defined custom fields                     |
//!
//! # Example
//!
//! ```toml
//! [workspace]
//! path = "src"
//! output = "public"
//!
//! [build]
//! optimization = "inline"
//! prerender = true
//!
//! [dev_server]
//! port = 1984
//!
//! [extra]
//! analytics_id = "UA-12345"
//! ```

mod build;
pub mod defaults;
mod dev_server;
mod error;
mod markdown;
mod polyfills;
mod workspace;

// Re-export public types used by other modules
pub use build::Optimization;
pub use error::ConfigError;
pub use polyfills::ImportAttribute;

// Internal imports used in this module
use build::BuildConfig;
use dev_server::DevServerConfig;
use markdown::MarkdownConfig;
use polyfills::PolyfillsConfig;
use workspace::WorkspaceConfig;

use crate::cli::{Cli, Commands};
use anyhow::{Result, bail};
use educe::Educe;
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    fs,
    net::IpAddr,
    path::{Path, PathBuf},
};

// ============================================================================
// Root Configuration
// ============================================================================

/// Root configuration structure representing loam.toml
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(deny_unknown_fields)]
pub struct SiteConfig {
    /// Absolute path to the config file (set after loading)
    #[serde(skip)]
    pub config_path: PathBuf,

    /// Project directory layout
    #[serde(default)]
    pub workspace: WorkspaceConfig,

    /// Build settings
    #[serde(default)]
    pub build: BuildConfig,

    /// Development server settings
    #[serde(default)]
    pub dev_server: DevServerConfig,

    /// Markdown handling settings
    #[serde(default)]
    pub markdown: MarkdownConfig,

    /// Browser compatibility settings
    #[serde(default)]
    pub polyfills: PolyfillsConfig,

    /// User-defined extra fields
    #[serde(default)]
    pub extra: HashMap<String, toml::Value>,
}

impl SiteConfig {
    /// Parse configuration from TOML string
    pub fn from_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Load configuration from file path
    pub fn from_path(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(config)
    }

    /// Get the root directory path
    pub fn get_root(&self) -> &Path {
        self.workspace.root.as_deref().unwrap_or(Path::new("./"))
    }

    /// Set the root directory path
    pub fn set_root(&mut self, path: &Path) {
        self.workspace.root = Some(path.to_path_buf())
    }

    /// Update configuration with CLI arguments
    pub fn update_with_cli(&mut self, cli: &Cli) -> Result<()> {
        let root = cli
            .root
            .as_ref()
            .cloned()
            .unwrap_or_else(|| self.get_root().to_owned());

        // Normalize root to absolute path
        let root = Self::normalize_path(&root);
        self.set_root(&root);

        // Normalize config path
        self.config_path = Self::normalize_path(&root.join(&cli.config));

        Self::update_option(&mut self.workspace.output, cli.output.as_ref());

        match &cli.command {
            Commands::Build { build_args } => {
                Self::update_option(&mut self.build.prerender, build_args.prerender.as_ref());
                Self::update_option(&mut self.build.base_path, build_args.base_path.as_ref());
                if let Some(mode) = &build_args.optimization {
                    self.build.optimization = mode.parse()?;
                }
            }
            Commands::Serve { host, port } => {
                Self::update_option(&mut self.dev_server.host, host.as_ref());
                Self::update_option(&mut self.dev_server.port, port.as_ref());
            }
        }

        Ok(())
    }

    /// Update config option if CLI value is provided
    fn update_option<T: Clone>(config_option: &mut T, cli_option: Option<&T>) {
        if let Some(option) = cli_option {
            *config_option = option.clone();
        }
    }

    /// Normalize a path to absolute, using canonicalize if the path exists
    pub fn normalize_path(path: &Path) -> PathBuf {
        path.canonicalize().unwrap_or_else(|_| {
            // For non-existent paths, manually make them absolute
            if path.is_absolute() {
                path.to_path_buf()
            } else {
                std::env::current_dir()
                    .map(|cwd| cwd.join(path))
                    .unwrap_or_else(|_| path.to_path_buf())
            }
        })
    }

    /// Validate configuration shape before any work starts
    pub fn validate(&self) -> Result<()> {
        let base_path = &self.build.base_path;
        if !base_path.is_empty() && (!base_path.starts_with('/') || base_path.ends_with('/')) {
            bail!(ConfigError::Validation(
                "[build.base_path] must start with `/` and not end with `/`".into()
            ));
        }

        if self.dev_server.host.parse::<IpAddr>().is_err() {
            bail!(ConfigError::Validation(
                "[dev_server.host] is not a valid IP address".into()
            ));
        }

        if self.dev_server.port == 0 {
            bail!(ConfigError::Validation(
                "[dev_server.port] must be non-zero".into()
            ));
        }

        if self.markdown.extensions.is_empty() {
            bail!(ConfigError::Validation(
                "[markdown.extensions] must have at least one element".into()
            ));
        }

        for (field, extensions) in [
            ("markdown", &self.markdown.extensions),
            ("dev_server", &self.dev_server.extensions),
        ] {
            for ext in extensions {
                if ext.is_empty() || ext.starts_with('.') {
                    bail!(ConfigError::Validation(format!(
                        "[{field}.extensions] entries must be bare extensions, got `{ext}`"
                    )));
                }
            }
        }

        if self.workspace.scratch == self.workspace.output {
            bail!(ConfigError::Validation(
                "[workspace.scratch] must differ from [workspace.output]".into()
            ));
        }

        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::BuildArgs;
    use tempfile::TempDir;

    #[test]
    fn test_from_str() {
        let config_str = r#"
            [workspace]
            path = "www"

            [build]
            prerender = true
        "#;
        let result = SiteConfig::from_str(config_str);

        assert!(result.is_ok());
        let config = result.unwrap();
        assert_eq!(config.workspace.path, PathBuf::from("www"));
        assert!(config.build.prerender);
    }

    #[test]
    fn test_from_str_invalid_toml() {
        let invalid_config = r#"
            [build
            prerender = true
        "#;
        let result = SiteConfig::from_str(invalid_config);

        assert!(result.is_err());
    }

    #[test]
    fn test_from_path_errors_name_the_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("loam.toml");

        let missing = SiteConfig::from_path(&path).unwrap_err();
        assert!(format!("{missing:#}").contains("loam.toml"));

        fs::write(&path, "[build\nprerender = true").unwrap();
        let malformed = SiteConfig::from_path(&path).unwrap_err();
        assert!(format!("{malformed:#}").contains("loam.toml"));
        assert!(format!("{malformed:#}").contains("TOML"));
    }

    #[test]
    fn test_get_root_default() {
        let config = SiteConfig::default();
        assert_eq!(config.get_root(), Path::new("./"));
    }

    #[test]
    fn test_set_root() {
        let mut config = SiteConfig::default();
        config.set_root(Path::new("/custom/path"));
        assert_eq!(config.get_root(), Path::new("/custom/path"));
    }

    #[test]
    fn test_update_with_cli_applies_overrides() {
        let cli = Cli {
            root: Some(PathBuf::from("/custom/site")),
            output: Some(PathBuf::from("public")),
            config: PathBuf::from("loam.toml"),
            command: Commands::Build {
                build_args: BuildArgs {
                    clean: false,
                    prerender: Some(true),
                    optimization: Some("static".into()),
                    base_path: Some("/docs".into()),
                },
            },
        };

        let mut config = SiteConfig::default();
        config.update_with_cli(&cli).unwrap();

        assert_eq!(config.get_root(), Path::new("/custom/site"));
        assert_eq!(config.config_path, PathBuf::from("/custom/site/loam.toml"));
        assert_eq!(config.workspace.output, PathBuf::from("public"));
        assert!(config.build.prerender);
        assert_eq!(config.build.optimization, Optimization::Static);
        assert_eq!(config.build.base_path, "/docs");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_update_with_cli_rejects_unknown_optimization() {
        let cli = Cli {
            root: None,
            output: None,
            config: PathBuf::from("loam.toml"),
            command: Commands::Build {
                build_args: BuildArgs {
                    clean: false,
                    prerender: None,
                    optimization: Some("aggressive".into()),
                    base_path: None,
                },
            },
        };

        let mut config = SiteConfig::default();
        assert!(config.update_with_cli(&cli).is_err());
    }

    #[test]
    fn test_extra_fields() {
        let config = r#"
            [extra]
            custom_field = "custom_value"
            number_field = 42
            nested = { key = "value" }
        "#;
        let config: SiteConfig = toml::from_str(config).unwrap();

        assert_eq!(
            config.extra.get("custom_field").and_then(|v| v.as_str()),
            Some("custom_value")
        );
        assert_eq!(
            config.extra.get("number_field").and_then(|v| v.as_integer()),
            Some(42)
        );
    }

    #[test]
    fn test_site_config_default() {
        let config = SiteConfig::default();

        assert_eq!(config.config_path, PathBuf::new());
        assert_eq!(config.workspace.output, PathBuf::from("public"));
        assert_eq!(config.build.optimization, Optimization::Default);
        assert_eq!(config.dev_server.port, 1984);
        assert_eq!(config.markdown.extensions, vec!["md"]);
    }

    #[test]
    fn test_full_config_all_sections() {
        let config = r#"
            [workspace]
            path = "www"
            pages = "routes"
            apis = "endpoints"
            layouts = "layouts"
            output = "dist"
            scratch = ".cache"

            [build]
            base_path = "/docs"
            optimization = "static"
            prerender = true
            static_router = true

            [dev_server]
            host = "0.0.0.0"
            port = 3000
            extensions = ["txt"]

            [markdown]
            plugins = ["remark-github"]
            extensions = ["md", "markdown"]

            [polyfills]
            import_attributes = ["css"]
            import_maps = true

            [extra]
            analytics_id = "UA-12345"
        "#;
        let config: SiteConfig = toml::from_str(config).unwrap();

        assert_eq!(config.workspace.path, PathBuf::from("www"));
        assert_eq!(config.build.base_path, "/docs");
        assert_eq!(config.build.optimization, Optimization::Static);
        assert_eq!(config.dev_server.port, 3000);
        assert_eq!(config.markdown.plugins, vec!["remark-github"]);
        assert_eq!(config.polyfills.import_attributes, vec![ImportAttribute::Css]);
        assert!(config.extra.contains_key("analytics_id"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_unknown_top_level_field_rejection() {
        let config = r#"
            [unknown_section]
            field = "value"
        "#;
        let result: Result<SiteConfig, _> = toml::from_str(config);
        assert!(result.is_err());
    }

    // ------------------------------------------------------------------------
    // Validation tests
    // ------------------------------------------------------------------------

    #[test]
    fn test_validate_default_config() {
        assert!(SiteConfig::default().validate().is_ok());
    }

    #[test]
    fn test_validate_base_path_missing_leading_slash() {
        let config: SiteConfig = toml::from_str(
            r#"
            [build]
            base_path = "docs"
        "#,
        )
        .unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_base_path_trailing_slash() {
        let config: SiteConfig = toml::from_str(
            r#"
            [build]
            base_path = "/docs/"
        "#,
        )
        .unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_bad_host() {
        let config: SiteConfig = toml::from_str(
            r#"
            [dev_server]
            host = "localhost"
        "#,
        )
        .unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_zero_port() {
        let config: SiteConfig = toml::from_str(
            r#"
            [dev_server]
            port = 0
        "#,
        )
        .unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_dotted_extension() {
        let config: SiteConfig = toml::from_str(
            r#"
            [markdown]
            extensions = [".md"]
        "#,
        )
        .unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_empty_markdown_extensions() {
        let config: SiteConfig = toml::from_str(
            r#"
            [markdown]
            extensions = []
        "#,
        )
        .unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_scratch_equals_output() {
        let config: SiteConfig = toml::from_str(
            r#"
            [workspace]
            output = "public"
            scratch = "public"
        "#,
        )
        .unwrap();
        assert!(config.validate().is_err());
    }
}
