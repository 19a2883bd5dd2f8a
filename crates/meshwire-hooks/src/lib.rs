//! Named + global callback registry, safe against unregister-during-dispatch.
//!
//! `Hookable<T>` dispatches over some context `T` (a `Socket`, or a
//! `Connection` once [`Connection`] wraps it): global hooks run before named
//! hooks for the same event and may veto further dispatch, and
//! registration/unregistration may happen from inside a callback without
//! deadlocking or panicking.
//!
//! [`Connection`]: https://docs.rs/meshwire-conn

use std::{
    collections::HashMap,
    panic::{AssertUnwindSafe, catch_unwind},
    sync::{
        Arc, RwLock,
        atomic::{AtomicU64, Ordering},
    },
};

/// Hook ids are monotonically increasing and unique across every
/// [`Hookable`] in the process, not just within one registry.
static NEXT_HOOK_ID: AtomicU64 = AtomicU64::new(0);

pub type HookId = u64;

type NamedCallback<T> = Arc<dyn Fn(&T, &[u8]) + Send + Sync>;
type GlobalCallback<T> = Arc<dyn Fn(&T, &str, &[u8]) -> bool + Send + Sync>;

fn next_hook_id() -> HookId {
    NEXT_HOOK_ID.fetch_add(1, Ordering::Relaxed)
}

/// A named + global hook registry dispatched over context `T`.
///
/// `trigger` releases its read lock around every callback invocation so that
/// a callback may call `register_hook`/`unregister` on the same registry
/// without deadlocking; an id unregistered mid-dispatch is simply skipped
/// rather than causing an error.
pub struct Hookable<T> {
    named: RwLock<HashMap<String, Vec<(HookId, NamedCallback<T>)>>>,
    global: RwLock<Vec<(HookId, GlobalCallback<T>)>>,
}

impl<T> Default for Hookable<T> {
    fn default() -> Self {
        Self { named: RwLock::new(HashMap::new()), global: RwLock::new(Vec::new()) }
    }
}

impl<T> Hookable<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `cb` to run whenever `hook_name` is triggered. Returns the
    /// id to pass to [`unregister`](Self::unregister).
    pub fn register_hook<F>(&self, hook_name: impl Into<String>, cb: F) -> HookId
    where
        F: Fn(&T, &[u8]) + Send + Sync + 'static,
    {
        let id = next_hook_id();
        let hook_name = hook_name.into();
        tracing::trace!(hook_id = id, %hook_name, "hook registered");
        let mut named = self.named.write().expect("hook registry poisoned");
        named.entry(hook_name).or_default().push((id, Arc::new(cb)));
        id
    }

    /// Registers `cb` to run for every hook name, before the named
    /// listeners. Returning `false` aborts dispatch for that event,
    /// including all named hooks that would have run after it.
    pub fn register_global_hook<F>(&self, cb: F) -> HookId
    where
        F: Fn(&T, &str, &[u8]) -> bool + Send + Sync + 'static,
    {
        let id = next_hook_id();
        tracing::trace!(hook_id = id, "global hook registered");
        let mut global = self.global.write().expect("hook registry poisoned");
        global.push((id, Arc::new(cb)));
        id
    }

    /// Removes a hook registered via either `register_hook` or
    /// `register_global_hook`. No-op if `id` is unknown (already removed, or
    /// never registered on this instance).
    pub fn unregister(&self, id: HookId) {
        {
            let mut global = self.global.write().expect("hook registry poisoned");
            if let Some(pos) = global.iter().position(|(i, _)| *i == id) {
                global.remove(pos);
                return;
            }
        }
        let mut named = self.named.write().expect("hook registry poisoned");
        for hooks in named.values_mut() {
            if let Some(pos) = hooks.iter().position(|(i, _)| *i == id) {
                hooks.remove(pos);
                return;
            }
        }
    }

    /// Dispatches `hook_name` with `data` to global hooks (insertion order),
    /// then to named hooks for `hook_name` (insertion order), unless a
    /// global hook returns `false` to veto the rest of dispatch. Returns
    /// `false` if a global hook vetoed, `true` otherwise (including when
    /// there were no hooks registered for `hook_name` at all).
    ///
    /// A callback that panics is caught at this boundary, logged, and
    /// treated as a no-op (a panicking global hook does not veto the rest of
    /// dispatch) — one misbehaving listener cannot abort delivery to the
    /// others or unwind into the runtime thread driving this dispatch.
    pub fn trigger(&self, ctx: &T, hook_name: &str, data: &[u8]) -> bool {
        let global_snapshot: Vec<(HookId, GlobalCallback<T>)> = {
            let global = self.global.read().expect("hook registry poisoned");
            global.clone()
        };
        for (id, cb) in global_snapshot {
            if !self.still_registered_global(id) {
                continue;
            }
            match catch_unwind(AssertUnwindSafe(|| cb(ctx, hook_name, data))) {
                Ok(false) => return false,
                Ok(true) => {}
                Err(_) => {
                    tracing::error!(hook_id = id, %hook_name, "global hook panicked, continuing dispatch");
                }
            }
        }

        let named_snapshot: Vec<(HookId, NamedCallback<T>)> = {
            let named = self.named.read().expect("hook registry poisoned");
            match named.get(hook_name) {
                Some(hooks) => hooks.clone(),
                None => return true,
            }
        };
        for (id, cb) in named_snapshot {
            if !self.still_registered_named(hook_name, id) {
                continue;
            }
            if catch_unwind(AssertUnwindSafe(|| cb(ctx, data))).is_err() {
                tracing::error!(hook_id = id, %hook_name, "named hook panicked, continuing dispatch");
            }
        }
        true
    }

    fn still_registered_global(&self, id: HookId) -> bool {
        self.global.read().expect("hook registry poisoned").iter().any(|(i, _)| *i == id)
    }

    fn still_registered_named(&self, hook_name: &str, id: HookId) -> bool {
        self.named
            .read()
            .expect("hook registry poisoned")
            .get(hook_name)
            .is_some_and(|hooks| hooks.iter().any(|(i, _)| *i == id))
    }
}
