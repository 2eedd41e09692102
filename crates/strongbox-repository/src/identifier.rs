//! Repository naming and backend identifier derivation

use strongbox_common::crd::{BackupStorageLocation, RepositoryType};
use strongbox_common::kube_utils::bounded_name;
use strongbox_common::Error;

use crate::provider::BackendType;

/// Location config key overriding the derived identifier prefix
pub const REPO_PREFIX_KEY: &str = "resticRepoPrefix";

/// Location config key for a custom S3 endpoint
pub const S3_URL_KEY: &str = "s3Url";

/// Location config key for the S3 region
pub const REGION_KEY: &str = "region";

/// Directory under the object prefix holding repositories
const REPOSITORY_DIR: &str = "restic";

/// Name of the BackupRepository for a volume namespace in a location
pub fn repository_name(
    volume_namespace: &str,
    location_name: &str,
    repository_type: RepositoryType,
) -> String {
    bounded_name(&format!(
        "{}-{}-{}",
        volume_namespace, location_name, repository_type
    ))
}

/// Backend identifier of the repository for `volume_namespace` in `location`
pub fn repository_identifier(
    location: &BackupStorageLocation,
    volume_namespace: &str,
) -> Result<String, Error> {
    if let Some(prefix) = location.config_value(REPO_PREFIX_KEY).filter(|p| !p.is_empty()) {
        return Ok(format!("{}/{}", prefix, volume_namespace));
    }

    let bucket = &location.spec.object_storage.bucket;
    let path = join_path(&[
        location.spec.object_storage.prefix.as_deref().unwrap_or(""),
        REPOSITORY_DIR,
        volume_namespace,
    ]);

    match BackendType::of(location) {
        BackendType::Aws => {
            let url = match location.config_value(S3_URL_KEY).filter(|u| !u.is_empty()) {
                Some(url) => url.trim_end_matches('/').to_string(),
                None => match location.config_value(REGION_KEY).filter(|r| !r.is_empty()) {
                    Some(region) => format!("s3-{}.amazonaws.com", region),
                    None => "s3.amazonaws.com".to_string(),
                },
            };
            Ok(format!("s3:{}/{}", url, join_path(&[bucket, &path])))
        }
        BackendType::Azure => Ok(format!("azure:{}:/{}", bucket, path)),
        BackendType::Gcp => Ok(format!("gs:{}:/{}", bucket, path)),
        BackendType::Other => Err(Error::resolution(
            volume_namespace,
            format!("{} not specified", REPO_PREFIX_KEY),
        )),
    }
}

fn join_path(segments: &[&str]) -> String {
    segments
        .iter()
        .map(|s| s.trim_matches('/'))
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use strongbox_common::crd::{BackupStorageLocationSpec, ObjectStorageLocation};

    fn location(provider: &str, prefix: Option<&str>, config: &[(&str, &str)]) -> BackupStorageLocation {
        BackupStorageLocation::new(
            "default",
            BackupStorageLocationSpec {
                provider: provider.into(),
                object_storage: ObjectStorageLocation {
                    bucket: "backups".into(),
                    prefix: prefix.map(String::from),
                    ca_cert: None,
                },
                config: config
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
                ..Default::default()
            },
        )
    }

    #[test]
    fn explicit_prefix_wins() {
        let bsl = location("minio", None, &[(REPO_PREFIX_KEY, "s3:http://minio:9000/bucket")]);
        assert_eq!(
            repository_identifier(&bsl, "app").unwrap(),
            "s3:http://minio:9000/bucket/app"
        );
    }

    #[test]
    fn aws_defaults_to_global_endpoint() {
        let bsl = location("aws", None, &[]);
        assert_eq!(
            repository_identifier(&bsl, "app").unwrap(),
            "s3:s3.amazonaws.com/backups/restic/app"
        );
    }

    #[test]
    fn aws_uses_region_endpoint_and_object_prefix() {
        let bsl = location("aws", Some("cluster-a"), &[(REGION_KEY, "eu-west-1")]);
        assert_eq!(
            repository_identifier(&bsl, "app").unwrap(),
            "s3:s3-eu-west-1.amazonaws.com/backups/cluster-a/restic/app"
        );
    }

    #[test]
    fn aws_custom_url_is_trimmed() {
        let bsl = location(
            "velero.io/aws",
            None,
            &[(S3_URL_KEY, "https://minio.local:9000/"), (REGION_KEY, "minio")],
        );
        assert_eq!(
            repository_identifier(&bsl, "app").unwrap(),
            "s3:https://minio.local:9000/backups/restic/app"
        );
    }

    #[test]
    fn azure_and_gcp_layouts() {
        assert_eq!(
            repository_identifier(&location("azure", Some("p"), &[]), "app").unwrap(),
            "azure:backups:/p/restic/app"
        );
        assert_eq!(
            repository_identifier(&location("gcp", None, &[]), "app").unwrap(),
            "gs:backups:/restic/app"
        );
    }

    #[test]
    fn unknown_provider_without_prefix_fails() {
        let err = repository_identifier(&location("minio", None, &[]), "app").unwrap_err();
        assert!(matches!(err, Error::Resolution { .. }));
        assert!(err.to_string().contains("resticRepoPrefix not specified"));
    }

    #[test]
    fn repository_names_are_bounded() {
        assert_eq!(
            repository_name("app", "default", RepositoryType::Restic),
            "app-default-restic"
        );
        let long = repository_name(&"n".repeat(70), "default", RepositoryType::Restic);
        assert!(long.len() <= 63);
    }
}
