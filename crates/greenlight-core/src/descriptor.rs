//! Deployment descriptors and revisions.
//!
//! The Build stage emits a versioned JSON descriptor naming the pushed
//! image and how to run it. The Deploy stage reads it back, rejects
//! schema versions it does not understand, and turns it into an
//! immutable [`DeploymentRevision`].

use std::collections::BTreeMap;
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{RunId, epoch_millis};

/// Descriptor schema written by this version of Greenlight.
pub const DESCRIPTOR_SCHEMA_VERSION: &str = "1.0.0";

/// Compile a literal pattern. A failure here is a bug in this file.
macro_rules! static_regex {
    ($pattern:expr, $name:expr) => {
        Regex::new($pattern)
            .unwrap_or_else(|e| panic!("static regex {} failed to compile: {e}", $name))
    };
}

static REPOSITORY_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    static_regex!(
        r"^[a-z0-9]+(?:[._-][a-z0-9]+)*(?:/[a-z0-9]+(?:[._-][a-z0-9]+)*)*$",
        "REPOSITORY_PATTERN"
    )
});
static TAG_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| static_regex!(r"^[A-Za-z0-9_][A-Za-z0-9_.-]{0,127}$", "TAG_PATTERN"));
static DIGEST_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| static_regex!(r"^sha256:[a-f0-9]{64}$", "DIGEST_PATTERN"));

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DescriptorError {
    #[error("invalid image reference {reference:?}: {reason}")]
    InvalidImage { reference: String, reason: String },

    #[error("unsupported descriptor schema version {found} (supported: {supported})")]
    IncompatibleSchema { found: String, supported: String },

    #[error("malformed descriptor: {0}")]
    Malformed(String),

    #[error("invalid descriptor field {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },
}

// ── Image references ───────────────────────────────────────────────

/// A container image reference: `[registry/]repository[:tag][@digest]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRef {
    pub registry: Option<String>,
    pub repository: String,
    pub tag: Option<String>,
    pub digest: Option<String>,
}

impl ImageRef {
    pub fn parse(reference: &str) -> Result<Self, DescriptorError> {
        let invalid = |reason: &str| DescriptorError::InvalidImage {
            reference: reference.to_string(),
            reason: reason.to_string(),
        };
        let reference = reference.trim();
        if reference.is_empty() {
            return Err(invalid("empty"));
        }

        let (name, digest) = match reference.split_once('@') {
            Some((name, digest)) => (name, Some(digest.to_string())),
            None => (reference, None),
        };

        // A ':' after the last '/' separates the tag; earlier ones belong to a registry port.
        let last_slash = name.rfind('/').map(|i| i + 1).unwrap_or(0);
        let (path, tag) = match name[last_slash..].rfind(':') {
            Some(i) => (
                &name[..last_slash + i],
                Some(name[last_slash + i + 1..].to_string()),
            ),
            None => (name, None),
        };

        let (registry, repository) = match path.split_once('/') {
            Some((first, rest))
                if first.contains('.') || first.contains(':') || first == "localhost" =>
            {
                (Some(first.to_string()), rest.to_string())
            }
            _ => (None, path.to_string()),
        };

        if !REPOSITORY_PATTERN.is_match(&repository) {
            return Err(invalid("repository must be lowercase path components"));
        }
        if let Some(tag) = &tag {
            if !TAG_PATTERN.is_match(tag) {
                return Err(invalid("malformed tag"));
            }
        }
        if let Some(digest) = &digest {
            if !DIGEST_PATTERN.is_match(digest) {
                return Err(invalid("digest must be sha256:<64 hex>"));
            }
        }

        Ok(Self {
            registry,
            repository,
            tag,
            digest,
        })
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(registry) = &self.registry {
            write!(f, "{registry}/")?;
        }
        f.write_str(&self.repository)?;
        if let Some(tag) = &self.tag {
            write!(f, ":{tag}")?;
        }
        if let Some(digest) = &self.digest {
            write!(f, "@{digest}")?;
        }
        Ok(())
    }
}

// ── Descriptor ─────────────────────────────────────────────────────

/// Versioned document handed from Build to Deploy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentDescriptor {
    pub schema_version: String,
    pub image: String,
    pub container_name: String,
    pub container_port: u16,
    pub cpu_units: u32,
    pub memory_mib: u32,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
}

impl DeploymentDescriptor {
    /// Descriptor for `image` at the current schema version.
    pub fn new(
        image: &ImageRef,
        container_name: &str,
        container_port: u16,
        cpu_units: u32,
        memory_mib: u32,
    ) -> Self {
        Self {
            schema_version: DESCRIPTOR_SCHEMA_VERSION.to_string(),
            image: image.to_string(),
            container_name: container_name.to_string(),
            container_port,
            cpu_units,
            memory_mib,
            env: BTreeMap::new(),
        }
    }

    pub fn to_json_bytes(&self) -> Result<Vec<u8>, DescriptorError> {
        serde_json::to_vec_pretty(self).map_err(|e| DescriptorError::Malformed(e.to_string()))
    }

    /// Parse a descriptor, checking the schema version before the body.
    pub fn from_json_bytes(bytes: &[u8]) -> Result<Self, DescriptorError> {
        let value: serde_json::Value =
            serde_json::from_slice(bytes).map_err(|e| DescriptorError::Malformed(e.to_string()))?;
        let version = value
            .get("schema_version")
            .and_then(|v| v.as_str())
            .ok_or_else(|| DescriptorError::Malformed("missing schema_version".to_string()))?;
        check_schema_version(version)?;

        let descriptor: Self =
            serde_json::from_value(value).map_err(|e| DescriptorError::Malformed(e.to_string()))?;
        descriptor.validate()?;
        Ok(descriptor)
    }

    /// Check field-level constraints.
    pub fn validate(&self) -> Result<(), DescriptorError> {
        check_schema_version(&self.schema_version)?;
        ImageRef::parse(&self.image)?;
        if self.container_name.trim().is_empty() {
            return Err(DescriptorError::InvalidField {
                field: "container_name",
                reason: "must not be empty".to_string(),
            });
        }
        if self.container_port == 0 {
            return Err(DescriptorError::InvalidField {
                field: "container_port",
                reason: "must be non-zero".to_string(),
            });
        }
        if self.cpu_units == 0 || self.memory_mib == 0 {
            return Err(DescriptorError::InvalidField {
                field: "resources",
                reason: "cpu_units and memory_mib must be non-zero".to_string(),
            });
        }
        Ok(())
    }
}

/// Accept any schema sharing our major version.
fn check_schema_version(found: &str) -> Result<(), DescriptorError> {
    let incompatible = || DescriptorError::IncompatibleSchema {
        found: found.to_string(),
        supported: DESCRIPTOR_SCHEMA_VERSION.to_string(),
    };
    let found_version = semver::Version::parse(found).map_err(|_| incompatible())?;
    let ours = semver::Version::parse(DESCRIPTOR_SCHEMA_VERSION).map_err(|_| incompatible())?;
    if found_version.major != ours.major {
        return Err(incompatible());
    }
    Ok(())
}

// ── Revision ───────────────────────────────────────────────────────

/// An immutable unit of deployable work derived from a build descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentRevision {
    pub run_id: RunId,
    pub source_revision: String,
    pub image: ImageRef,
    pub descriptor: DeploymentDescriptor,
    pub created_at: u64,
}

impl DeploymentRevision {
    pub fn from_descriptor(
        run_id: &str,
        source_revision: &str,
        descriptor: DeploymentDescriptor,
    ) -> Result<Self, DescriptorError> {
        descriptor.validate()?;
        let image = ImageRef::parse(&descriptor.image)?;
        Ok(Self {
            run_id: run_id.to_string(),
            source_revision: source_revision.to_string(),
            image,
            descriptor,
            created_at: epoch_millis(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor() -> DeploymentDescriptor {
        DeploymentDescriptor::new(&ImageRef::parse("img:r1").unwrap(), "web", 80, 256, 512)
    }

    #[test]
    fn parse_bare_image_with_tag() {
        let image = ImageRef::parse("img:r1").unwrap();
        assert_eq!(image.registry, None);
        assert_eq!(image.repository, "img");
        assert_eq!(image.tag.as_deref(), Some("r1"));
        assert_eq!(image.to_string(), "img:r1");
    }

    #[test]
    fn parse_registry_with_port() {
        let image = ImageRef::parse("registry.example.com:5000/team/frontend:abc123").unwrap();
        assert_eq!(image.registry.as_deref(), Some("registry.example.com:5000"));
        assert_eq!(image.repository, "team/frontend");
        assert_eq!(image.tag.as_deref(), Some("abc123"));
    }

    #[test]
    fn parse_digest() {
        let digest = format!("sha256:{}", "a".repeat(64));
        let image = ImageRef::parse(&format!("localhost/app@{digest}")).unwrap();
        assert_eq!(image.registry.as_deref(), Some("localhost"));
        assert_eq!(image.tag, None);
        assert_eq!(image.digest.as_deref(), Some(digest.as_str()));
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(ImageRef::parse("").is_err());
        assert!(ImageRef::parse("UPPER/case").is_err());
        assert!(ImageRef::parse("app@md5:abc").is_err());
    }

    #[test]
    fn static_patterns_compile_once_and_are_reused() {
        let repository: *const Regex = &*REPOSITORY_PATTERN;
        assert!(TAG_PATTERN.is_match("r1"));
        assert!(DIGEST_PATTERN.is_match(&format!("sha256:{}", "0".repeat(64))));

        for reference in ["img:r1", "registry.example.com/web:r2", "localhost:5000/app"] {
            ImageRef::parse(reference).unwrap();
        }
        assert!(std::ptr::eq(repository, &*REPOSITORY_PATTERN));
    }

    #[test]
    fn descriptor_json_roundtrip_preserves_fields() {
        let bytes = descriptor().to_json_bytes().unwrap();
        let back = DeploymentDescriptor::from_json_bytes(&bytes).unwrap();
        assert_eq!(back, descriptor());
    }

    #[test]
    fn accepts_newer_minor_schema() {
        let mut d = descriptor();
        d.schema_version = "1.4.0".to_string();
        let bytes = serde_json::to_vec(&d).unwrap();
        assert!(DeploymentDescriptor::from_json_bytes(&bytes).is_ok());
    }

    #[test]
    fn rejects_other_major_schema_before_body() {
        let bytes = br#"{"schema_version": "2.0.0", "image_uri": "img:r1"}"#;
        let err = DeploymentDescriptor::from_json_bytes(bytes).unwrap_err();
        assert!(matches!(err, DescriptorError::IncompatibleSchema { .. }));
    }

    #[test]
    fn rejects_missing_schema() {
        let err = DeploymentDescriptor::from_json_bytes(br#"{"image": "img:r1"}"#).unwrap_err();
        assert!(matches!(err, DescriptorError::Malformed(_)));
    }

    #[test]
    fn rejects_zero_port() {
        let mut d = descriptor();
        d.container_port = 0;
        assert!(matches!(
            d.validate(),
            Err(DescriptorError::InvalidField { field: "container_port", .. })
        ));
    }

    #[test]
    fn revision_from_descriptor() {
        let rev = DeploymentRevision::from_descriptor("run-1", "r1", descriptor()).unwrap();
        assert_eq!(rev.image.to_string(), "img:r1");
        assert_eq!(rev.source_revision, "r1");
    }
}
