//! BackupStorageLocation Custom Resource Definition
//!
//! Describes an object-storage bucket that holds backup repositories.
//! The repository controller only ever reads these objects.

use std::collections::BTreeMap;

use base64::Engine;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::Error;

/// Reference to a single key in a Kubernetes Secret
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub struct SecretKeySelector {
    /// Secret name
    pub name: String,
    /// Key within the secret's data
    pub key: String,
}

impl SecretKeySelector {
    /// Create a selector for `key` in secret `name`
    pub fn new(name: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            key: key.into(),
        }
    }
}

/// Bucket and prefix within the object store
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ObjectStorageLocation {
    /// Bucket (or container) name
    pub bucket: String,

    /// Prefix inside the bucket
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,

    /// Base64-encoded PEM bundle used to verify the object store's TLS certificate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca_cert: Option<String>,
}

/// Specification for a BackupStorageLocation
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "strongbox.dev",
    version = "v1alpha1",
    kind = "BackupStorageLocation",
    shortname = "bsl",
    namespaced,
    printcolumn = r#"{"name":"Provider","type":"string","jsonPath":".spec.provider"}"#,
    printcolumn = r#"{"name":"Bucket","type":"string","jsonPath":".spec.objectStorage.bucket"}"#,
    printcolumn = r#"{"name":"Default","type":"boolean","jsonPath":".spec.default"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct BackupStorageLocationSpec {
    /// Object store provider (`aws`, `gcp`, `azure`, optionally vendor-qualified)
    pub provider: String,

    /// Where in the object store data lives
    pub object_storage: ObjectStorageLocation,

    /// Provider-specific settings (region, s3Url, profile, insecureSkipTLSVerify, ...)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub config: BTreeMap<String, String>,

    /// Secret holding the provider credentials file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<SecretKeySelector>,

    /// Whether this is the default location
    #[serde(default)]
    pub default: bool,
}

impl BackupStorageLocation {
    /// Decoded CA certificate bytes, if the location carries one
    pub fn ca_cert(&self) -> Result<Option<Vec<u8>>, Error> {
        let Some(ref encoded) = self.spec.object_storage.ca_cert else {
            return Ok(None);
        };
        if encoded.trim().is_empty() {
            return Ok(None);
        }
        base64::engine::general_purpose::STANDARD
            .decode(encoded.trim())
            .map(Some)
            .map_err(|e| Error::serialization(format!("invalid caCert encoding: {}", e)))
    }

    /// Look up a provider config value
    pub fn config_value(&self, key: &str) -> Option<&str> {
        self.spec.config.get(key).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(yaml: &str) -> BackupStorageLocationSpec {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn parses_full_spec() {
        let spec = parse(
            r#"
provider: aws
objectStorage:
  bucket: backups
  prefix: cluster-a
  caCert: LS0tLS1CRUdJTg==
config:
  region: us-west-2
  insecureSkipTLSVerify: "true"
credential:
  name: cloud-credentials
  key: cloud
default: true
"#,
        );
        assert_eq!(spec.provider, "aws");
        assert_eq!(spec.object_storage.prefix.as_deref(), Some("cluster-a"));
        assert_eq!(spec.config.get("region").unwrap(), "us-west-2");
        assert_eq!(
            spec.credential,
            Some(SecretKeySelector::new("cloud-credentials", "cloud"))
        );
        assert!(spec.default);
    }

    #[test]
    fn ca_cert_is_decoded() {
        let spec = parse(
            r#"
provider: aws
objectStorage:
  bucket: backups
  caCert: LS0tLS1CRUdJTg==
"#,
        );
        let bsl = BackupStorageLocation::new("default", spec);
        assert_eq!(bsl.ca_cert().unwrap().unwrap(), b"-----BEGIN".to_vec());
    }

    #[test]
    fn missing_or_blank_ca_cert_is_none() {
        let mut bsl = BackupStorageLocation::new(
            "default",
            parse("provider: gcp\nobjectStorage:\n  bucket: b\n"),
        );
        assert!(bsl.ca_cert().unwrap().is_none());
        bsl.spec.object_storage.ca_cert = Some("  ".to_string());
        assert!(bsl.ca_cert().unwrap().is_none());
    }

    #[test]
    fn invalid_ca_cert_is_an_error() {
        let mut bsl = BackupStorageLocation::new(
            "default",
            parse("provider: gcp\nobjectStorage:\n  bucket: b\n"),
        );
        bsl.spec.object_storage.ca_cert = Some("not base64!".to_string());
        assert!(bsl.ca_cert().is_err());
    }
}
