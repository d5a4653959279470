//! The raw effect primitive underlying the watcher API.
//!
//! `watch`/`watch_effect` (§4.6) are the user-facing layer; [`create_effect`]
//! is the bare "run now, re-run synchronously whenever a dependency changes"
//! primitive they're built from, matching the teacher's own `create_effect`
//! (`sycamore-reactive/src/effect.rs`) which has no flush-phase concept at
//! all — everything there runs eagerly.

use crate::scheduler::FlushPhase;
use crate::scope::{self, EffectKey};
use crate::watch::{watch_effect, WatchOptions};

/// A handle to a raw effect (§4.2/§4.5), separate from [`crate::watch::WatchHandle`]
/// only in name — both wrap the same underlying effect node.
#[derive(Clone, Copy)]
pub struct EffectHandle {
    effect: EffectKey,
}

impl EffectHandle {
    pub fn dispose(&self) {
        scope::dispose_effect(self.effect);
    }

    pub fn pause(&self) {
        scope::pause_effect(self.effect);
    }

    pub fn resume(&self) {
        scope::resume_effect(self.effect);
    }
}

/// Runs `f` immediately, then re-runs it synchronously whenever a signal it
/// read changes (subject to an open `batch()`).
pub fn create_effect(f: impl FnMut() + 'static) -> EffectHandle {
    let handle = watch_effect(f, WatchOptions { flush: FlushPhase::Sync, ..Default::default() });
    EffectHandle { effect: handle.key() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::__reset_runtime_for_tests;
    use crate::signal::ValueRef;
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn effect_reruns_synchronously_on_write() {
        __reset_runtime_for_tests();
        let source = ValueRef::new(1);
        let runs = Rc::new(Cell::new(0));
        let runs2 = runs.clone();
        let source2 = source.clone();
        let _handle = create_effect(move || {
            source2.get();
            runs2.set(runs2.get() + 1);
        });
        assert_eq!(runs.get(), 1);
        source.set(2);
        assert_eq!(runs.get(), 2, "sync-flush effect must rerun inline, with no flush_sync() needed");
    }
}
