//! Per-invocation memoization of resolved reference sets.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Mutex;

use rustc_hash::FxHashMap;

use crate::error::Result;

/// Cache key: the specifier's operation name plus the compile/execute mode.
///
/// Compile-time and execute-time resolution of the same specifier may yield
/// different sets (reference packs vs runtime libraries), so the mode is part
/// of the key.
pub type CacheKey = (String, bool);

/// Read-through cache for resolved reference sets.
///
/// Scoped to the lifetime of one [`ExecutionOptions`] instance and never
/// serialized to disk; it only avoids repeating the same registry/filesystem
/// resolution within a single compile + execute cycle. Safe for concurrent
/// access from fan-out resolution branches.
///
/// [`ExecutionOptions`]: crate::options::ExecutionOptions
#[derive(Debug, Default)]
pub struct ResolutionCache {
    /// Instance-level bypass, set from the invocation's `no_cache` flag.
    disabled: bool,
    entries: Mutex<FxHashMap<CacheKey, BTreeSet<PathBuf>>>,
}

impl ResolutionCache {
    pub fn new(disabled: bool) -> Self {
        Self {
            disabled,
            entries: Mutex::new(FxHashMap::default()),
        }
    }

    /// Look up `key`, computing and storing the value on a miss.
    ///
    /// Bypassed entirely when either the instance-level or the call-site
    /// `bypass` flag is set. The factory runs outside the lock so concurrent
    /// branches never serialize on each other's resolution work; a racing
    /// double-compute is harmless because resolution is idempotent.
    pub fn get_or_compute<F>(
        &self,
        key: CacheKey,
        bypass: bool,
        factory: F,
    ) -> Result<BTreeSet<PathBuf>>
    where
        F: FnOnce() -> Result<BTreeSet<PathBuf>>,
    {
        if self.disabled || bypass {
            return factory();
        }

        if let Some(hit) = self.entries.lock().expect("cache poisoned").get(&key) {
            tracing::trace!(operation = %key.0, compilation = key.1, "resolution cache hit");
            return Ok(hit.clone());
        }

        let value = factory()?;
        self.entries
            .lock()
            .expect("cache poisoned")
            .insert(key, value.clone());
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn key(op: &str, compilation: bool) -> CacheKey {
        (op.to_string(), compilation)
    }

    #[test]
    fn second_lookup_does_not_recompute() {
        let cache = ResolutionCache::new(false);
        let calls = AtomicUsize::new(0);
        let factory = || {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(BTreeSet::from([PathBuf::from("/lib/a.rlib")]))
        };

        let first = cache.get_or_compute(key("package:a", true), false, factory).unwrap();
        let second = cache
            .get_or_compute(key("package:a", true), false, || {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(BTreeSet::new())
            })
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn mode_is_part_of_the_key() {
        let cache = ResolutionCache::new(false);
        cache
            .get_or_compute(key("framework:base", true), false, || {
                Ok(BTreeSet::from([PathBuf::from("/ref/base.rmeta")]))
            })
            .unwrap();
        let runtime = cache
            .get_or_compute(key("framework:base", false), false, || {
                Ok(BTreeSet::from([PathBuf::from("/shared/base.so")]))
            })
            .unwrap();
        assert_eq!(runtime, BTreeSet::from([PathBuf::from("/shared/base.so")]));
    }

    #[test]
    fn bypass_flags_disable_memoization() {
        let instance_disabled = ResolutionCache::new(true);
        let calls = AtomicUsize::new(0);
        for _ in 0..2 {
            instance_disabled
                .get_or_compute(key("x", false), false, || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(BTreeSet::new())
                })
                .unwrap();
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        let cache = ResolutionCache::new(false);
        for _ in 0..2 {
            cache
                .get_or_compute(key("x", false), true, || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(BTreeSet::new())
                })
                .unwrap();
        }
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn factory_errors_are_not_cached() {
        let cache = ResolutionCache::new(false);
        let err = cache.get_or_compute(key("bad", true), false, || {
            Err(crate::error::Error::Resolution("registry down".into()))
        });
        assert!(err.is_err());

        let ok = cache
            .get_or_compute(key("bad", true), false, || Ok(BTreeSet::new()))
            .unwrap();
        assert!(ok.is_empty());
    }
}
