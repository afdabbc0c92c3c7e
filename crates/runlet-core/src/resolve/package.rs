//! Registry package resolution strategy.

use std::collections::BTreeSet;
use std::path::PathBuf;

use semver::Version;

use crate::cancel::AbortHandle;
use crate::error::{Error, Result};

use super::registry::RegistryClient;

/// Resolve a `nuget:` package specifier through the registry client.
///
/// An omitted version queries the registry and takes the highest available
/// version. The returned set already includes the package's transitive
/// dependencies (the registry restores them).
pub(crate) fn resolve_package(
    registry: &dyn RegistryClient,
    id: &str,
    version: Option<&Version>,
    target: &str,
    cancel: &AbortHandle,
) -> Result<BTreeSet<PathBuf>> {
    cancel.check()?;

    let version = match version {
        Some(v) => v.clone(),
        None => registry
            .list_versions(id)?
            .into_iter()
            .max()
            .ok_or_else(|| {
                Error::Resolution(format!("package `{id}` has no published versions"))
            })?,
    };

    cancel.check()?;
    tracing::debug!(package = id, %version, target, "restoring registry package");

    let libraries = registry.resolve_libraries(id, &version, target)?;
    Ok(libraries.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeRegistry {
        versions: Vec<Version>,
        list_calls: AtomicUsize,
    }

    impl FakeRegistry {
        fn new(versions: &[(u64, u64, u64)]) -> Self {
            Self {
                versions: versions
                    .iter()
                    .map(|&(a, b, c)| Version::new(a, b, c))
                    .collect(),
                list_calls: AtomicUsize::new(0),
            }
        }
    }

    impl RegistryClient for FakeRegistry {
        fn list_versions(&self, _id: &str) -> Result<Vec<Version>> {
            self.list_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.versions.clone())
        }

        fn resolve_libraries(
            &self,
            id: &str,
            version: &Version,
            _target: &str,
        ) -> Result<Vec<PathBuf>> {
            Ok(vec![PathBuf::from(format!("/store/{id}/{version}/lib{id}.rlib"))])
        }
    }

    #[test]
    fn omitted_version_takes_the_highest_available() {
        let registry = FakeRegistry::new(&[(1, 0, 0), (2, 1, 0), (2, 0, 0)]);
        let cancel = AbortHandle::new();
        let set = resolve_package(&registry, "foo", None, "2021", &cancel).unwrap();
        assert_eq!(
            set,
            BTreeSet::from([PathBuf::from("/store/foo/2.1.0/libfoo.rlib")])
        );
        assert_eq!(registry.list_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn explicit_version_skips_the_version_query() {
        let registry = FakeRegistry::new(&[(1, 0, 0)]);
        let cancel = AbortHandle::new();
        let pinned = Version::new(1, 0, 0);
        resolve_package(&registry, "foo", Some(&pinned), "2021", &cancel).unwrap();
        assert_eq!(registry.list_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn no_published_versions_is_a_resolution_error() {
        let registry = FakeRegistry::new(&[]);
        let cancel = AbortHandle::new();
        let err = resolve_package(&registry, "ghost", None, "2021", &cancel).unwrap_err();
        assert!(matches!(err, Error::Resolution(_)));
    }

    #[test]
    fn cancellation_surfaces_as_cancelled() {
        let registry = FakeRegistry::new(&[(1, 0, 0)]);
        let cancel = AbortHandle::new();
        cancel.abort();
        let err = resolve_package(&registry, "foo", None, "2021", &cancel).unwrap_err();
        assert!(err.is_cancelled());
    }
}
