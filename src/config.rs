//! Environment-driven server configuration.

/// Runtime switches read from the environment at startup.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// `ENABLE_WEBSERVER`: start the sibling HTTP API.
    pub enable_webserver: bool,
    /// `WEBSERVER_PORT_BASE`: first port to try; the next 19 are fallbacks.
    pub webserver_port_base: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            enable_webserver: false,
            webserver_port_base: 8080,
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let enable_webserver = get("ENABLE_WEBSERVER")
            .map(|value| {
                let value = value.trim();
                value.eq_ignore_ascii_case("true") || value == "1"
            })
            .unwrap_or(defaults.enable_webserver);
        let webserver_port_base = get("WEBSERVER_PORT_BASE")
            .and_then(|value| match value.trim().parse() {
                Ok(port) => Some(port),
                Err(_) => {
                    tracing::warn!("ignoring invalid WEBSERVER_PORT_BASE {value:?}");
                    None
                }
            })
            .unwrap_or(defaults.webserver_port_base);
        Self {
            enable_webserver,
            webserver_port_base,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup<'a>(pairs: &'a [(&'a str, &'a str)]) -> impl Fn(&str) -> Option<String> + 'a {
        move |key| {
            pairs
                .iter()
                .find(|(name, _)| *name == key)
                .map(|(_, value)| (*value).to_string())
        }
    }

    #[test]
    fn defaults_without_environment() {
        let config = ServerConfig::from_lookup(lookup(&[]));
        assert!(!config.enable_webserver);
        assert_eq!(config.webserver_port_base, 8080);
    }

    #[test]
    fn truthy_spellings_enable_the_webserver() {
        for value in ["true", "TRUE", "True", "1"] {
            let config = ServerConfig::from_lookup(lookup(&[("ENABLE_WEBSERVER", value)]));
            assert!(config.enable_webserver, "value {value:?}");
        }
        for value in ["false", "0", "yes", ""] {
            let config = ServerConfig::from_lookup(lookup(&[("ENABLE_WEBSERVER", value)]));
            assert!(!config.enable_webserver, "value {value:?}");
        }
    }

    #[test]
    fn port_base_parses_or_falls_back() {
        let config = ServerConfig::from_lookup(lookup(&[("WEBSERVER_PORT_BASE", "9100")]));
        assert_eq!(config.webserver_port_base, 9100);
        let config = ServerConfig::from_lookup(lookup(&[("WEBSERVER_PORT_BASE", "not-a-port")]));
        assert_eq!(config.webserver_port_base, 8080);
    }
}
