//! Configuration validation

use crate::schema::{RawConfig, RawResource};
use larder_util::{ChannelKey, ensure_bare_file_name};
use std::collections::HashSet;
use thiserror::Error;
use url::Url;

/// URL schemes the resource fetcher knows how to open
pub const SUPPORTED_SCHEMES: &[&str] = &["http", "https", "file"];

/// Validation error
#[derive(Debug, Clone, Error)]
pub enum ValidationError {
    #[error("Resource '{name}': {message}")]
    ResourceError { name: String, message: String },

    #[error("Duplicate resource name: {0}")]
    DuplicateResource(String),

    #[error("Channel '{0}' is not a channel name")]
    InvalidChannel(String),

    #[error("Global config error: {0}")]
    GlobalError(String),
}

/// Validate a raw configuration
pub fn validate_config(config: &RawConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if config.service.max_concurrent_fetches == Some(0) {
        errors.push(ValidationError::GlobalError(
            "max_concurrent_fetches must be at least 1".into(),
        ));
    }

    for name in config.channels.keys() {
        if !ChannelKey::new(name.as_str()).is_channel() {
            errors.push(ValidationError::InvalidChannel(name.clone()));
        }
    }

    // Resource names are file names, so they compare case-sensitively
    let mut seen = HashSet::new();
    for resource in &config.resources {
        if !seen.insert(&resource.name) {
            errors.push(ValidationError::DuplicateResource(resource.name.clone()));
        }
    }

    for resource in &config.resources {
        errors.extend(validate_resource(resource));
    }

    errors
}

fn validate_resource(resource: &RawResource) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    let error = |message: String| ValidationError::ResourceError {
        name: resource.name.clone(),
        message,
    };

    if ensure_bare_file_name(&resource.name).is_err() {
        errors.push(error("name must be a bare file name".into()));
    }

    if resource.url.trim().is_empty() {
        errors.push(error("url cannot be empty".into()));
        return errors;
    }

    match Url::parse(&resource.url) {
        Ok(url) if !SUPPORTED_SCHEMES.contains(&url.scheme()) => {
            errors.push(error(format!("unsupported url scheme '{}'", url.scheme())));
        }
        Ok(_) => {}
        Err(e) => errors.push(error(format!("invalid url: {}", e))),
    }

    errors
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resource(name: &str, url: &str) -> RawResource {
        RawResource {
            name: name.into(),
            url: url.into(),
            refresh_seconds: 60,
        }
    }

    fn config_with(resources: Vec<RawResource>) -> RawConfig {
        RawConfig {
            config_version: 1,
            service: Default::default(),
            channels: Default::default(),
            resources,
        }
    }

    #[test]
    fn accepts_supported_schemes() {
        let config = config_with(vec![
            resource("a", "http://example.org/a"),
            resource("b", "https://example.org/b"),
            resource("c", "file:///tmp/c"),
        ]);
        assert!(validate_config(&config).is_empty());
    }

    #[test]
    fn rejects_duplicates_and_bad_urls() {
        let config = config_with(vec![
            resource("geoip", "https://example.org/geoip"),
            resource("geoip", "https://example.org/other"),
            resource("ftp", "ftp://example.org/x"),
            resource("empty", ""),
            resource("garbage", "not a url"),
        ]);

        let errors = validate_config(&config);
        assert_eq!(errors.len(), 4);
        assert!(matches!(&errors[0], ValidationError::DuplicateResource(n) if n == "geoip"));
    }

    #[test]
    fn rejects_path_like_names() {
        let config = config_with(vec![
            resource("../escape", "https://example.org/x"),
            resource("dir/file", "https://example.org/y"),
        ]);
        assert_eq!(validate_config(&config).len(), 2);
    }

    #[test]
    fn rejects_zero_fetch_bound() {
        let mut config = config_with(vec![]);
        config.service.max_concurrent_fetches = Some(0);
        let errors = validate_config(&config);
        assert!(matches!(errors[0], ValidationError::GlobalError(_)));
    }

    #[test]
    fn rejects_non_channel_override() {
        let mut config = config_with(vec![]);
        config.channels.insert("nick".into(), Default::default());
        let errors = validate_config(&config);
        assert!(matches!(&errors[0], ValidationError::InvalidChannel(n) if n == "nick"));
    }
}
