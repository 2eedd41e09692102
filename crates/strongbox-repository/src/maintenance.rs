//! Maintenance scheduling
//!
//! Frequency resolution order: process-wide override, then the backend's
//! suggested default, then [`DEFAULT_MAINTENANCE_FREQUENCY`].

use std::time::Duration;

use chrono::{DateTime, Utc};
use strongbox_common::crd::BackupRepository;
use strongbox_common::Error;
use tracing::warn;

/// Fallback frequency when neither an override nor a suggestion is available
pub const DEFAULT_MAINTENANCE_FREQUENCY: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// True if `repo` should be pruned at `now`
///
/// A repository that has never been maintained is always due. Otherwise it
/// becomes due once `lastMaintenanceTime + frequency` is strictly before
/// `now`.
pub fn due_for_maintenance(repo: &BackupRepository, now: DateTime<Utc>) -> bool {
    let Some(last) = repo.last_maintenance_time() else {
        return true;
    };
    let frequency = repo
        .spec
        .maintenance_frequency()
        .unwrap_or(DEFAULT_MAINTENANCE_FREQUENCY);
    match chrono::Duration::from_std(frequency) {
        Ok(frequency) => last
            .checked_add_signed(frequency)
            .is_some_and(|deadline| deadline < now),
        Err(_) => false,
    }
}

/// Effective maintenance frequency
///
/// `overridden` is the operator-wide setting; `suggested` is what the
/// backend reported. A failure to obtain a suggestion is logged and treated
/// as no suggestion.
pub fn resolve_maintenance_frequency(
    overridden: Option<Duration>,
    suggested: Result<Option<Duration>, Error>,
) -> Duration {
    if let Some(freq) = overridden.filter(|f| !f.is_zero()) {
        return freq;
    }
    match suggested {
        Ok(Some(freq)) if !freq.is_zero() => freq,
        Ok(_) => DEFAULT_MAINTENANCE_FREQUENCY,
        Err(e) => {
            warn!(error = %e, "failed to get default maintenance frequency, using fallback");
            DEFAULT_MAINTENANCE_FREQUENCY
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use strongbox_common::crd::{BackupRepositoryPatch, BackupRepositorySpec};

    const HOUR: Duration = Duration::from_secs(3600);

    fn repo(frequency_secs: Option<u64>, last: Option<DateTime<Utc>>) -> BackupRepository {
        let mut repo = BackupRepository::new(
            "app-default-restic",
            BackupRepositorySpec {
                backup_storage_location: "default".into(),
                volume_namespace: "app".into(),
                maintenance_frequency_seconds: frequency_secs,
                ..Default::default()
            },
        );
        if let Some(at) = last {
            BackupRepositoryPatch::default()
                .last_maintenance_time(at)
                .apply_to(&mut repo);
        }
        repo
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn never_maintained_is_always_due() {
        let r = repo(Some(3600), None);
        assert!(due_for_maintenance(&r, t0()));
        assert!(due_for_maintenance(&r, DateTime::<Utc>::MIN_UTC));
    }

    #[test]
    fn not_due_right_after_maintenance() {
        let r = repo(Some(3600), Some(t0()));
        assert!(!due_for_maintenance(&r, t0()));
        assert!(!due_for_maintenance(&r, t0() + chrono::Duration::minutes(59)));
    }

    #[test]
    fn due_once_deadline_has_passed() {
        let r = repo(Some(3600), Some(t0()));
        assert!(!due_for_maintenance(&r, t0() + chrono::Duration::hours(1)));
        assert!(due_for_maintenance(
            &r,
            t0() + chrono::Duration::hours(1) + chrono::Duration::seconds(1)
        ));
        assert!(due_for_maintenance(&r, t0() + chrono::Duration::hours(2)));
    }

    #[test]
    fn unset_frequency_uses_fallback() {
        let r = repo(None, Some(t0()));
        assert!(!due_for_maintenance(&r, t0() + chrono::Duration::days(6)));
        assert!(!due_for_maintenance(&r, t0() + chrono::Duration::days(7)));
        assert!(due_for_maintenance(&r, t0() + chrono::Duration::days(8)));
    }

    #[test]
    fn override_wins_when_positive() {
        assert_eq!(
            resolve_maintenance_frequency(Some(HOUR), Ok(Some(HOUR * 24))),
            HOUR
        );
        assert_eq!(
            resolve_maintenance_frequency(Some(Duration::ZERO), Ok(Some(HOUR * 24))),
            HOUR * 24
        );
    }

    #[test]
    fn suggestion_then_fallback() {
        assert_eq!(resolve_maintenance_frequency(None, Ok(Some(HOUR))), HOUR);
        assert_eq!(
            resolve_maintenance_frequency(None, Ok(None)),
            DEFAULT_MAINTENANCE_FREQUENCY
        );
        assert_eq!(
            resolve_maintenance_frequency(None, Err(Error::internal("no backend"))),
            DEFAULT_MAINTENANCE_FREQUENCY
        );
    }
}
