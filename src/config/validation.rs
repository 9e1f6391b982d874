use std::net::SocketAddr;

use http::HeaderName;
use regex::Regex;

use crate::config::models::{NodeConfig, ProxyConfig};

/// Validation error types
#[derive(Debug, thiserror::Error, Clone)]
pub enum ValidationError {
    #[error("invalid listen address '{address}': {reason}")]
    InvalidListenAddress { address: String, reason: String },

    #[error("invalid duration '{value}' at {location}: {reason}")]
    InvalidDuration {
        location: String,
        value: String,
        reason: String,
    },

    #[error("invalid pattern '{pattern}' at {location}: {reason}")]
    InvalidPattern {
        location: String,
        pattern: String,
        reason: String,
    },

    #[error("invalid header name '{name}' at {location}")]
    InvalidHeaderName { location: String, name: String },
}

/// Checks a configuration before the routing tree is built from it, so
/// every problem is reported at once instead of failing on the first bad
/// regex mid-assembly.
pub struct ProxyConfigValidator;

impl ProxyConfigValidator {
    pub fn validate(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if let Err(e) = config.listen_addr.parse::<SocketAddr>() {
            errors.push(ValidationError::InvalidListenAddress {
                address: config.listen_addr.clone(),
                reason: e.to_string(),
            });
        }

        Self::check_duration(&config.upstream.timeout, "upstream.timeout", &mut errors);
        Self::validate_node(&config.root, "root", &mut errors);

        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }

    fn validate_node(node: &NodeConfig, location: &str, errors: &mut Vec<ValidationError>) {
        if let Some(host) = &node.host {
            Self::check_pattern(host, &format!("{location}.host"), errors);
        }

        for (name, pattern) in &node.headers {
            if name.parse::<HeaderName>().is_err() {
                errors.push(ValidationError::InvalidHeaderName {
                    location: format!("{location}.headers"),
                    name: name.clone(),
                });
            }
            Self::check_pattern(pattern, &format!("{location}.headers.{name}"), errors);
        }

        for (changes, field) in [
            (&node.request_headers, "request_headers"),
            (&node.response_headers, "response_headers"),
        ] {
            for key in changes.keys() {
                let name = key.trim_start_matches(['-', '+']);
                if name.parse::<HeaderName>().is_err() {
                    errors.push(ValidationError::InvalidHeaderName {
                        location: format!("{location}.{field}"),
                        name: key.clone(),
                    });
                }
            }
        }

        for (index, rule) in node.body_rewrites.iter().enumerate() {
            Self::check_pattern(
                &rule.search,
                &format!("{location}.body_rewrites[{index}]"),
                errors,
            );
        }

        if let Some(timeout) = &node.timeout {
            Self::check_duration(timeout, &format!("{location}.timeout"), errors);
        }

        for (index, child) in node.children.iter().enumerate() {
            Self::validate_node(child, &format!("{location}.children[{index}]"), errors);
        }
    }

    fn check_pattern(pattern: &str, location: &str, errors: &mut Vec<ValidationError>) {
        if let Err(e) = Regex::new(pattern) {
            errors.push(ValidationError::InvalidPattern {
                location: location.to_string(),
                pattern: pattern.to_string(),
                reason: e.to_string(),
            });
        }
    }

    fn check_duration(value: &str, location: &str, errors: &mut Vec<ValidationError>) {
        if let Err(e) = humantime::parse_duration(value) {
            errors.push(ValidationError::InvalidDuration {
                location: location.to_string(),
                value: value.to_string(),
                reason: e.to_string(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::models::RewriteRuleConfig;

    #[test]
    fn default_config_is_valid() {
        assert!(ProxyConfigValidator::validate(&ProxyConfig::default()).is_ok());
    }

    #[test]
    fn bad_listen_address_is_reported() {
        let config = ProxyConfig {
            listen_addr: "not-an-address".to_string(),
            ..Default::default()
        };

        let errors = ProxyConfigValidator::validate(&config).unwrap_err();
        assert!(matches!(
            errors[0],
            ValidationError::InvalidListenAddress { .. }
        ));
    }

    #[test]
    fn every_problem_is_collected() {
        let mut config = ProxyConfig {
            listen_addr: "nope".to_string(),
            ..Default::default()
        };
        config.upstream.timeout = "eight seconds-ish".to_string();
        config.root.host = Some("(unclosed".to_string());

        let mut child = NodeConfig::default();
        child.body_rewrites.push(RewriteRuleConfig {
            search: "[bad".to_string(),
            replace: String::new(),
        });
        config.root.children.push(child);

        let errors = ProxyConfigValidator::validate(&config).unwrap_err();
        assert_eq!(errors.len(), 4);
    }

    #[test]
    fn header_change_prefixes_are_stripped_before_checking() {
        let mut config = ProxyConfig::default();
        config
            .root
            .request_headers
            .insert("-cookie".to_string(), String::new());
        config
            .root
            .response_headers
            .insert("+x-extra".to_string(), "1".to_string());

        assert!(ProxyConfigValidator::validate(&config).is_ok());
    }

    #[test]
    fn nested_errors_carry_their_location() {
        let mut config = ProxyConfig::default();
        let mut child = NodeConfig::default();
        child.host = Some("(unclosed".to_string());
        config.root.children.push(child);

        let errors = ProxyConfigValidator::validate(&config).unwrap_err();
        let ValidationError::InvalidPattern { location, .. } = &errors[0] else {
            panic!("expected pattern error");
        };
        assert_eq!(location, "root.children[0].host");
    }
}
