// Copyright 2024 FastLabs Developers
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Cached handles to externally-owned resources.
//!
//! The backing resources (session, databases) are owned by the host and may
//! be invalidated outside this crate's control at any time. Every read path
//! goes through a [`Handle`]: a cheap liveness probe on each access, with a
//! transparent single re-resolution when the probe fails.

use std::sync::Arc;

use crate::host::Environment;
use crate::host::Session;
use crate::store::Store;

/// A cheap no-op probe that detects whether a cached handle has been
/// invalidated by its external owner.
pub trait Liveness {
    /// Whether the backing resource is still usable.
    fn is_live(&self) -> bool;
}

/// A cached reference to an externally-owned resource.
///
/// A consumer never observes a handle that fails its liveness probe: a stale
/// handle is discarded and re-resolved exactly once per access. Resolution
/// failure surfaces as an error the caller folds into an absent handle; it is
/// never raised past the public entry points.
#[derive(Debug)]
pub struct Handle<T: ?Sized> {
    slot: Option<Arc<T>>,
}

impl<T: ?Sized> Default for Handle<T> {
    fn default() -> Self {
        Handle::empty()
    }
}

impl<T: ?Sized> Handle<T> {
    /// Create an unresolved handle.
    pub const fn empty() -> Handle<T> {
        Handle { slot: None }
    }

    /// Drop the cached resource, forcing re-resolution on next access.
    pub fn invalidate(&mut self) {
        self.slot = None;
    }

    /// Whether a resource is currently cached (live or not).
    pub fn is_cached(&self) -> bool {
        self.slot.is_some()
    }
}

impl<T: ?Sized + Liveness> Handle<T> {
    /// Return the cached resource if it probes live, otherwise resolve it
    /// through `resolve` and cache the result.
    pub fn get_or_resolve<F>(&mut self, resolve: F) -> anyhow::Result<Arc<T>>
    where
        F: FnOnce() -> anyhow::Result<Arc<T>>,
    {
        if let Some(current) = &self.slot {
            if current.is_live() {
                return Ok(current.clone());
            }
            // released by its external owner; reacquire
            self.slot = None;
        }
        let resolved = resolve()?;
        self.slot = Some(resolved.clone());
        Ok(resolved)
    }
}

/// Process-context-wide cache of the expensive ambient handles: the execution
/// session, the caller's own store, and the log store.
///
/// Invalidated wholesale, together with the settings bag, whenever the
/// originating store path changes between calls.
#[derive(Debug, Default)]
pub struct ContextCache {
    session: Handle<dyn Session>,
    current_store: Handle<dyn Store>,
    log_store: Handle<dyn Store>,
}

impl ContextCache {
    /// Create an empty cache.
    pub fn new() -> ContextCache {
        ContextCache::default()
    }

    /// The execution session.
    pub fn session(&mut self, env: &dyn Environment) -> anyhow::Result<Arc<dyn Session>> {
        self.session.get_or_resolve(|| env.session())
    }

    /// The caller's own store.
    pub fn current_store(&mut self, env: &dyn Environment) -> anyhow::Result<Arc<dyn Store>> {
        self.current_store.get_or_resolve(|| env.current_store())
    }

    /// The log store at the given location.
    pub fn log_store(
        &mut self,
        env: &dyn Environment,
        server: &str,
        path: &str,
    ) -> anyhow::Result<Arc<dyn Store>> {
        self.log_store
            .get_or_resolve(|| env.open_store(server, path))
    }

    /// Cache a log store obtained outside the normal resolution path, such as
    /// a freshly provisioned one.
    pub fn put_log_store(&mut self, store: Arc<dyn Store>) {
        self.log_store = Handle { slot: Some(store) };
    }

    /// Drop every cached handle.
    pub fn invalidate_all(&mut self) {
        self.session.invalidate();
        self.current_store.invalidate();
        self.log_store.invalidate();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicBool;
    use std::sync::atomic::AtomicUsize;
    use std::sync::atomic::Ordering;

    use super::*;

    #[derive(Debug)]
    struct Resource {
        alive: AtomicBool,
    }

    impl Resource {
        fn new() -> Arc<Resource> {
            Arc::new(Resource {
                alive: AtomicBool::new(true),
            })
        }

        fn revoke(&self) {
            self.alive.store(false, Ordering::SeqCst);
        }
    }

    impl Liveness for Resource {
        fn is_live(&self) -> bool {
            self.alive.load(Ordering::SeqCst)
        }
    }

    #[test]
    fn test_handle_resolves_once_while_live() {
        let mut handle: Handle<Resource> = Handle::empty();
        let resolutions = AtomicUsize::new(0);
        for _ in 0..3 {
            handle
                .get_or_resolve(|| {
                    resolutions.fetch_add(1, Ordering::SeqCst);
                    Ok(Resource::new())
                })
                .unwrap();
        }
        assert_eq!(resolutions.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_handle_reacquires_after_revocation() {
        let mut handle: Handle<Resource> = Handle::empty();
        let first = handle.get_or_resolve(|| Ok(Resource::new())).unwrap();
        first.revoke();

        let second = handle.get_or_resolve(|| Ok(Resource::new())).unwrap();
        assert!(second.is_live());
        assert!(!Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_handle_absent_on_resolution_failure() {
        let mut handle: Handle<Resource> = Handle::empty();
        let err = handle.get_or_resolve(|| anyhow::bail!("host gone"));
        assert!(err.is_err());
        assert!(!handle.is_cached());

        // the failure is not sticky
        assert!(handle.get_or_resolve(|| Ok(Resource::new())).is_ok());
    }
}
