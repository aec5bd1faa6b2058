//! `[dev_server]` section configuration.
//!
//! Contains development server settings.

use super::defaults;
use educe::Educe;
use serde::{Deserialize, Serialize};

/// `[dev_server]` section in loam.toml - development server settings.
///
/// # Example
/// ```toml
/// [dev_server]
/// host = "0.0.0.0"       # Listen on all interfaces
/// port = 3000
/// extensions = ["txt"]   # Extra workspace extensions to serve
/// ```
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(default, deny_unknown_fields)]
pub struct DevServerConfig {
    /// Network interface to bind.
    /// - `127.0.0.1` (default): localhost only
    /// - `0.0.0.0`: all interfaces (LAN accessible)
    #[serde(default = "defaults::dev_server::host")]
    #[educe(Default = defaults::dev_server::host())]
    pub host: String,

    /// HTTP port number (default: 1984).
    #[serde(default = "defaults::dev_server::port")]
    #[educe(Default = defaults::dev_server::port())]
    pub port: u16,

    /// Additional file extensions (without the dot) the dev server treats
    /// as servable workspace sources, on top of the built-in set.
    #[serde(default = "defaults::dev_server::extensions")]
    #[educe(Default = defaults::dev_server::extensions())]
    pub extensions: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::super::SiteConfig;

    #[test]
    fn test_dev_server_config() {
        let config = r#"
            [dev_server]
            host = "0.0.0.0"
            port = 8080
            extensions = ["txt", "csv"]
        "#;
        let config: SiteConfig = toml::from_str(config).unwrap();

        assert_eq!(config.dev_server.host, "0.0.0.0");
        assert_eq!(config.dev_server.port, 8080);
        assert_eq!(config.dev_server.extensions, vec!["txt", "csv"]);
    }

    #[test]
    fn test_dev_server_config_defaults() {
        let config: SiteConfig = toml::from_str("").unwrap();

        assert_eq!(config.dev_server.host, "127.0.0.1");
        assert_eq!(config.dev_server.port, 1984);
        assert!(config.dev_server.extensions.is_empty());
    }

    #[test]
    fn test_unknown_field_rejection() {
        let config = r#"
            [dev_server]
            interface = "should_fail"
        "#;
        let result: Result<SiteConfig, _> = toml::from_str(config);

        assert!(result.is_err());
    }

    #[test]
    fn test_dev_server_config_host_variants() {
        // IPv4 any
        let config = r#"
            [dev_server]
            host = "0.0.0.0"
        "#;
        let config: SiteConfig = toml::from_str(config).unwrap();
        assert_eq!(config.dev_server.host, "0.0.0.0");

        // IPv6 localhost
        let config = r#"
            [dev_server]
            host = "::1"
        "#;
        let config: SiteConfig = toml::from_str(config).unwrap();
        assert_eq!(config.dev_server.host, "::1");
    }

    #[test]
    fn test_dev_server_config_partial_override() {
        let config = r#"
            [dev_server]
            port = 3000
        "#;
        let config: SiteConfig = toml::from_str(config).unwrap();

        // port is overridden
        assert_eq!(config.dev_server.port, 3000);
        // host uses default
        assert_eq!(config.dev_server.host, "127.0.0.1");
    }
}
