//! Desired identity-registration settings, one entry per source segment.

use crate::deployment::{Deployment, ResourceId};
use farmstead_shared::errors::{FarmsteadError, FarmsteadResult};
use farmstead_shared::{RegistrationStatus, Role, SourceSubnet, validate_subnet_id};
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Entry {
    role: Role,
    status: RegistrationStatus,
}

struct StoreInner {
    entries: BTreeMap<String, Entry>,
    sealed: bool,
}

/// Thread-safe store shared by every caller that registers a segment.
///
/// Callers may register in any order from any thread. The final contents do
/// not depend on call order; disagreeing callers get a `Conflict` instead.
/// The store is sealed when the registration command renders, and reopened
/// if the surrounding instance render fails.
#[derive(Clone)]
pub struct RegistrationSettingsStore {
    deployment: Deployment,
    instance: ResourceId,
    front_door: Arc<BTreeSet<String>>,
    inner: Arc<RwLock<StoreInner>>,
}

impl fmt::Debug for RegistrationSettingsStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistrationSettingsStore")
            .field("instance", &self.instance)
            .field("entries", &self.inner.read().entries.len())
            .finish()
    }
}

impl RegistrationSettingsStore {
    /// Store applied by `instance`. Segments in `front_door` trigger an
    /// overlap warning when registered as sources.
    pub fn new<I, S>(deployment: Deployment, instance: ResourceId, front_door: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            deployment,
            instance,
            front_door: Arc::new(front_door.into_iter().map(Into::into).collect()),
            inner: Arc::new(RwLock::new(StoreInner {
                entries: BTreeMap::new(),
                sealed: false,
            })),
        }
    }

    pub fn instance(&self) -> &ResourceId {
        &self.instance
    }

    /// Declare the desired registration for `segment`.
    ///
    /// `dependent` is ordered after the instance applying the settings.
    /// Re-registering identical values is a no-op for the entry; any other
    /// disagreement fails with [`FarmsteadError::Conflict`].
    pub fn register(
        &self,
        segment: &str,
        role: Role,
        status: RegistrationStatus,
        dependent: &ResourceId,
    ) -> FarmsteadResult<()> {
        if role == Role::Administrator {
            return Err(FarmsteadError::InvalidRole(format!(
                "segment {} cannot be registered as {}; administrators are provisioned separately",
                segment, role
            )));
        }
        validate_subnet_id(segment)?;

        let requested = Entry { role, status };
        let mut inner = self.inner.write();
        if inner.sealed {
            return Err(FarmsteadError::InvalidState(format!(
                "registration settings already rendered; cannot register segment {}",
                segment
            )));
        }

        let existing = inner.entries.get(segment).copied();
        if let Some(existing) = existing
            && existing != requested
        {
            return Err(FarmsteadError::Conflict(format!(
                "segment {} already registered with role {} and status {}, requested role {} and status {}",
                segment, existing.role, existing.status, role, status
            )));
        }

        self.deployment.add_dependency(dependent, &self.instance)?;

        if existing.is_none() {
            inner.entries.insert(segment.to_string(), requested);
            tracing::debug!(
                segment = %segment,
                role = %role,
                status = %status,
                dependent = %dependent,
                "Registered source segment"
            );
        } else {
            tracing::trace!(segment = %segment, dependent = %dependent, "Segment already registered");
        }
        drop(inner);

        if self.front_door.contains(segment) {
            tracing::warn!(
                segment = %segment,
                "Source segment is also a connection segment; use dedicated subnets for clients so registration rules stay distinct"
            );
        }
        Ok(())
    }

    /// Current entries sorted by segment id.
    pub fn entries(&self) -> Vec<SourceSubnet> {
        self.inner
            .read()
            .entries
            .iter()
            .map(|(segment, entry)| SourceSubnet::new(segment.clone(), entry.role, entry.status))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().entries.is_empty()
    }

    pub fn is_sealed(&self) -> bool {
        self.inner.read().sealed
    }

    /// Seal the store and return its final entries.
    pub(crate) fn seal(&self) -> Vec<SourceSubnet> {
        let mut inner = self.inner.write();
        inner.sealed = true;
        inner
            .entries
            .iter()
            .map(|(segment, entry)| SourceSubnet::new(segment.clone(), entry.role, entry.status))
            .collect()
    }

    /// Reopen after a render that did not complete.
    pub(crate) fn unseal(&self) {
        let mut inner = self.inner.write();
        if inner.sealed {
            inner.sealed = false;
            tracing::debug!(instance = %self.instance, "Registration settings reopened");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixture {
        deployment: Deployment,
        store: RegistrationSettingsStore,
        worker: ResourceId,
    }

    fn fixture() -> Fixture {
        let deployment = Deployment::new("Farm", "us-west-2").unwrap();
        let instance = deployment.add_resource("Farm/Registration").unwrap();
        let worker = deployment.add_resource("Farm/Workers").unwrap();
        let store = RegistrationSettingsStore::new(deployment.clone(), instance, ["subnet-rq"]);
        Fixture {
            deployment,
            store,
            worker,
        }
    }

    #[test]
    fn test_identical_registration_is_idempotent() {
        let f = fixture();
        for _ in 0..3 {
            f.store
                .register("subnet-a", Role::Client, RegistrationStatus::Registered, &f.worker)
                .unwrap();
        }
        assert_eq!(f.store.len(), 1);
        assert!(f.deployment.depends_on(&f.worker, f.store.instance()));
    }

    #[test]
    fn test_conflict_names_both_values() {
        let f = fixture();
        f.store
            .register("subnet-a", Role::Client, RegistrationStatus::Registered, &f.worker)
            .unwrap();
        let err = f
            .store
            .register("subnet-a", Role::Client, RegistrationStatus::Pending, &f.worker)
            .unwrap_err();

        assert!(matches!(err, FarmsteadError::Conflict(_)));
        let message = err.to_string();
        assert!(message.contains("subnet-a"));
        assert!(message.contains("Registered"));
        assert!(message.contains("Pending"));
        assert_eq!(f.store.entries()[0].status, RegistrationStatus::Registered);
    }

    #[test]
    fn test_administrator_rejected() {
        let f = fixture();
        let err = f
            .store
            .register("subnet-a", Role::Administrator, RegistrationStatus::Registered, &f.worker)
            .unwrap_err();
        assert!(matches!(err, FarmsteadError::InvalidRole(_)));
        assert!(f.store.is_empty());
        assert!(!f.deployment.depends_on(&f.worker, f.store.instance()));
    }

    #[test]
    fn test_unknown_dependent_leaves_store_unchanged() {
        let f = fixture();
        let stranger = f.store.instance().child("Unknown");
        assert!(
            f.store
                .register("subnet-a", Role::Server, RegistrationStatus::Registered, &stranger)
                .is_err()
        );
        assert!(f.store.is_empty());
    }

    #[test]
    fn test_unsafe_segment_ids_rejected() {
        let f = fixture();
        for segment in ["a,b", "x\" ; reboot ; echo \"", "seg ment", "$HOME", "`id`"] {
            let err = f
                .store
                .register(segment, Role::Client, RegistrationStatus::Pending, &f.worker)
                .unwrap_err();
            assert!(matches!(err, FarmsteadError::Config(_)), "{segment:?} accepted");
        }
        assert!(f.store.is_empty());
        assert!(!f.deployment.depends_on(&f.worker, f.store.instance()));
    }

    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<parking_lot::Mutex<Vec<u8>>>);

    impl CapturedLogs {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock()).into_owned()
        }
    }

    impl std::io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn warnings_during(f: impl FnOnce()) -> String {
        let logs = CapturedLogs::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::WARN)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        tracing::subscriber::with_default(subscriber, f);
        logs.contents()
    }

    #[test]
    fn test_front_door_overlap_warns_without_failing() {
        let f = fixture();
        let warnings = warnings_during(|| {
            f.store
                .register("subnet-rq", Role::Server, RegistrationStatus::Registered, &f.worker)
                .unwrap();
        });

        assert_eq!(f.store.len(), 1);
        assert!(warnings.contains("WARN"), "no warning in {warnings:?}");
        assert!(warnings.contains("also a connection segment"));
        assert!(warnings.contains("segment=subnet-rq"));
    }

    #[test]
    fn test_dedicated_segment_does_not_warn() {
        let f = fixture();
        let warnings = warnings_during(|| {
            f.store
                .register("subnet-clients", Role::Client, RegistrationStatus::Registered, &f.worker)
                .unwrap();
        });
        assert!(warnings.is_empty(), "unexpected output {warnings:?}");
    }

    #[test]
    fn test_unseal_reopens_registration() {
        let f = fixture();
        f.store.seal();
        assert!(f.store.is_sealed());
        f.store.unseal();
        f.store
            .register("subnet-late", Role::Client, RegistrationStatus::Pending, &f.worker)
            .unwrap();
        assert_eq!(f.store.len(), 1);
    }

    #[test]
    fn test_entries_sorted_and_sealed() {
        let f = fixture();
        for segment in ["subnet-c", "subnet-a", "subnet-b"] {
            f.store
                .register(segment, Role::Client, RegistrationStatus::Pending, &f.worker)
                .unwrap();
        }
        let ids: Vec<_> = f.store.seal().into_iter().map(|s| s.subnet_id).collect();
        assert_eq!(ids, vec!["subnet-a", "subnet-b", "subnet-c"]);

        let err = f
            .store
            .register("subnet-d", Role::Client, RegistrationStatus::Pending, &f.worker)
            .unwrap_err();
        assert!(matches!(err, FarmsteadError::InvalidState(_)));
    }
}
