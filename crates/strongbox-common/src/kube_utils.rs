//! Shared Kubernetes utilities using kube-rs

use std::future::Future;
use std::time::Duration;

use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::api::{Api, Patch, PatchParams};
use kube::{Client, CustomResourceExt};
use tracing::{info, trace};

use crate::crd::{BackupRepository, BackupStorageLocation};
use crate::Error;

/// Maximum length of a DNS-1123 label (object names used as label values)
pub const MAX_NAME_LEN: usize = 63;

/// Poll until a condition is met or timeout is reached
///
/// Repeatedly calls `check_fn` until it returns `Ok(true)`. Check errors are
/// returned immediately; `Ok(false)` keeps polling.
pub async fn poll_until<F, Fut>(
    timeout: Duration,
    poll_interval: Duration,
    timeout_msg: impl Into<String>,
    mut check_fn: F,
) -> Result<(), Error>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool, Error>>,
{
    let start = tokio::time::Instant::now();
    let timeout_msg = timeout_msg.into();

    loop {
        if check_fn().await? {
            return Ok(());
        }
        if start.elapsed() >= timeout {
            return Err(Error::internal_with_context("poll_until", timeout_msg));
        }
        trace!("Polling condition not yet met, retrying...");
        tokio::time::sleep(poll_interval).await;
    }
}

/// Compute a deterministic hash of the input string, returning a 16-char hex digest.
///
/// Uses truncated SHA-256 so that names derived from it stay stable across
/// toolchain versions.
pub fn deterministic_hash(input: &str) -> String {
    use aws_lc_rs::digest;
    let hash = digest::digest(&digest::SHA256, input.as_bytes());
    hash.as_ref()[..8]
        .iter()
        .fold(String::with_capacity(16), |mut s, b| {
            use std::fmt::Write;
            let _ = write!(s, "{:02x}", b);
            s
        })
}

/// Shorten `name` to a valid object name, appending a stable hash suffix
/// when it is too long
pub fn bounded_name(name: &str) -> String {
    let lowered = name.to_lowercase();
    if lowered.len() <= MAX_NAME_LEN {
        return lowered;
    }
    let hash = deterministic_hash(&lowered);
    let suffix = &hash[..8];
    let keep = MAX_NAME_LEN - suffix.len() - 1;
    let prefix = lowered[..keep].trim_end_matches('-');
    format!("{}-{}", prefix, suffix)
}

/// Install (or update) the strongbox CRDs using server-side apply
pub async fn ensure_crds_installed(client: &Client, field_manager: &str) -> Result<(), Error> {
    let api: Api<CustomResourceDefinition> = Api::all(client.clone());
    let params = PatchParams::apply(field_manager).force();

    for crd in crds() {
        let name = crd.metadata.name.clone().unwrap_or_default();
        info!(crd = %name, "Installing CRD");
        api.patch(&name, &params, &Patch::Apply(&crd)).await?;
    }
    Ok(())
}

/// All CRDs owned by strongbox
pub fn crds() -> Vec<CustomResourceDefinition> {
    vec![BackupRepository::crd(), BackupStorageLocation::crd()]
}
