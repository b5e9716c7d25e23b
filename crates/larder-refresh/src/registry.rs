//! Resource descriptors

use larder_config::ResourceSpec;
use larder_util::ensure_bare_file_name;
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::{RefreshError, RefreshResult};

pub type TransformResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// Post-download step. It receives the temporary file and owns it from then
/// on: moving or deleting it is up to the transform.
pub type Transform = Arc<dyn Fn(&Path) -> TransformResult + Send + Sync>;

/// One resource kept fresh under the data directory
#[derive(Clone)]
pub struct ResourceDescriptor {
    pub name: String,
    pub locator: String,
    pub interval: Duration,
    pub transform: Option<Transform>,
}

impl ResourceDescriptor {
    pub fn new(name: impl Into<String>, locator: impl Into<String>, interval: Duration) -> Self {
        Self {
            name: name.into(),
            locator: locator.into(),
            interval,
            transform: None,
        }
    }

    pub fn with_transform(
        mut self,
        transform: impl Fn(&Path) -> TransformResult + Send + Sync + 'static,
    ) -> Self {
        self.transform = Some(Arc::new(transform));
        self
    }
}

impl fmt::Debug for ResourceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceDescriptor")
            .field("name", &self.name)
            .field("locator", &self.locator)
            .field("interval", &self.interval)
            .field("transform", &self.transform.is_some())
            .finish()
    }
}

impl From<&ResourceSpec> for ResourceDescriptor {
    fn from(spec: &ResourceSpec) -> Self {
        Self::new(spec.name.clone(), spec.url.clone(), spec.refresh_interval)
    }
}

/// The set of resources a refresher manages, keyed by name
#[derive(Debug, Clone, Default)]
pub struct ResourceRegistry {
    resources: BTreeMap<String, ResourceDescriptor>,
}

impl ResourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from configured resources
    pub fn from_specs<'a>(specs: impl IntoIterator<Item = &'a ResourceSpec>) -> RefreshResult<Self> {
        let mut registry = Self::new();
        for spec in specs {
            registry.register(ResourceDescriptor::from(spec))?;
        }
        Ok(registry)
    }

    /// Add a resource. Its name is a file name under the data directory.
    pub fn register(&mut self, descriptor: ResourceDescriptor) -> RefreshResult<()> {
        if ensure_bare_file_name(&descriptor.name).is_err() {
            return Err(RefreshError::InvalidName(descriptor.name));
        }
        if self.resources.contains_key(&descriptor.name) {
            return Err(RefreshError::DuplicateResource(descriptor.name));
        }
        self.resources.insert(descriptor.name.clone(), descriptor);
        Ok(())
    }

    /// Attach a transform to an already registered resource
    pub fn set_transform(
        &mut self,
        name: &str,
        transform: impl Fn(&Path) -> TransformResult + Send + Sync + 'static,
    ) -> RefreshResult<()> {
        let descriptor = self
            .resources
            .get_mut(name)
            .ok_or_else(|| RefreshError::UnknownResource(name.to_string()))?;
        descriptor.transform = Some(Arc::new(transform));
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&ResourceDescriptor> {
        self.resources.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.resources.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ResourceDescriptor> {
        self.resources.values()
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_from_specs() {
        let specs = vec![
            ResourceSpec {
                name: "geoip".into(),
                url: "https://example.org/geoip".into(),
                refresh_interval: Duration::from_secs(86400),
            },
            ResourceSpec {
                name: "motd".into(),
                url: "file:///etc/motd".into(),
                refresh_interval: Duration::from_secs(60),
            },
        ];

        let registry = ResourceRegistry::from_specs(&specs).unwrap();
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["geoip", "motd"]);
        assert_eq!(
            registry.get("geoip").unwrap().interval,
            Duration::from_secs(86400)
        );
    }

    #[test]
    fn rejects_duplicates() {
        let mut registry = ResourceRegistry::new();
        registry
            .register(ResourceDescriptor::new("a", "file:///a", Duration::ZERO))
            .unwrap();
        assert!(matches!(
            registry.register(ResourceDescriptor::new("a", "file:///b", Duration::ZERO)),
            Err(RefreshError::DuplicateResource(n)) if n == "a"
        ));
    }

    #[test]
    fn transforms_attach_to_known_names_only() {
        let mut registry = ResourceRegistry::new();
        registry
            .register(ResourceDescriptor::new("a", "file:///a", Duration::ZERO))
            .unwrap();

        registry.set_transform("a", |_| Ok(())).unwrap();
        assert!(registry.get("a").unwrap().transform.is_some());

        assert!(matches!(
            registry.set_transform("b", |_| Ok(())),
            Err(RefreshError::UnknownResource(_))
        ));
    }

    #[test]
    fn names_must_stay_inside_the_data_dir() {
        let mut registry = ResourceRegistry::new();
        for name in ["../escaped", "sub/geoip", "..", ""] {
            assert!(matches!(
                registry.register(ResourceDescriptor::new(name, "file:///a", Duration::ZERO)),
                Err(RefreshError::InvalidName(n)) if n == name
            ));
        }
        assert!(registry.is_empty());

        let specs = vec![ResourceSpec {
            name: "../escaped".into(),
            url: "https://example.org/geoip".into(),
            refresh_interval: Duration::from_secs(60),
        }];
        assert!(matches!(
            ResourceRegistry::from_specs(&specs),
            Err(RefreshError::InvalidName(_))
        ));
    }
}
