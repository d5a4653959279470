//! The dependency tracker (component C2): which effect is "currently
//! running", so that reading a signal can record a dependency.
//!
//! Grounded on the teacher's `CURRENT_LISTENER` thread-local stack in
//! `sycamore-reactive/src/effect.rs`. Tracking is push/pop around a run, not
//! a persistent global flag, so nested effects and computeds correctly
//! restore the outer effect as the tracked one once the inner one finishes
//! (teacher test: `nested_effects_should_recreate_inner`).

use std::cell::Cell;

use crate::graph::{self, prune_stale_links};
use crate::runtime::{Runtime, SignalKey};
use crate::scheduler::{self, FlushPhase};
use crate::scope::EffectKey;

thread_local! {
    /// Depth of `untrack`/`with_suspended_tracking` nesting, so tracking
    /// resumes only once the outermost suspension ends.
    static SUSPEND_DEPTH: Cell<u32> = Cell::new(0);
}

/// RAII guard restoring the previously active effect (and its dep-version
/// bookkeeping) when a tracked run ends, including on panic-unwind.
pub(crate) struct TrackingGuard {
    previous: Option<EffectKey>,
    effect: EffectKey,
    version: u64,
}

impl Drop for TrackingGuard {
    fn drop(&mut self) {
        Runtime::with(|rt| rt.active_effect.set(self.previous));
        prune_stale_links(self.effect, self.version);
    }
}

/// Starts a tracked run for `effect`: bumps its dependency-version counter
/// (so links touched during this run are distinguished from stale ones left
/// by a previous run) and installs it as the active effect.
pub(crate) fn begin_tracking(effect: EffectKey) -> TrackingGuard {
    let version = Runtime::with(|rt| {
        let mut nodes = rt.effect_nodes.borrow_mut();
        let node = nodes.get_mut(effect).expect("effect node must exist while tracking");
        node.dep_version += 1;
        node.dep_version
    });
    let previous = Runtime::with(|rt| rt.active_effect.replace(Some(effect)));
    TrackingGuard { previous, effect, version }
}

/// Records a read of `signal` as a dependency of the currently active effect,
/// unless tracking is suspended (`untrack`/`peek`) or there is no active
/// effect (a plain read outside any effect, which is always untracked).
pub(crate) fn track_signal(signal: SignalKey) {
    if SUSPEND_DEPTH.with(|d| d.get()) > 0 {
        return;
    }
    let Some(effect) = Runtime::with(|rt| rt.active_effect.get()) else { return };
    let version = Runtime::with(|rt| rt.effect_nodes.borrow().get(effect).map(|n| n.dep_version).unwrap_or(0));
    graph::link(signal, effect, version);
}

/// Notifies every subscriber of `signal` that it changed. `Sync`-flush
/// subscribers run immediately (unless a batch is open); everyone else is
/// queued onto their phase for the next flush.
pub(crate) fn trigger_signal(signal: SignalKey) {
    let mut subscribers = Vec::new();
    graph::for_each_subscriber(signal, |effect| subscribers.push(effect));
    for effect in subscribers {
        match crate::scope::flush_phase_of(effect) {
            FlushPhase::Sync => scheduler::trigger_sync(effect),
            phase => scheduler::queue_job(effect, phase),
        }
    }
}

/// Runs `f` without recording any signal reads inside it as dependencies of
/// the currently active effect (§4.2 `untrack`/`peek`).
pub fn untrack<R>(f: impl FnOnce() -> R) -> R {
    SUSPEND_DEPTH.with(|d| d.set(d.get() + 1));
    struct Guard;
    impl Drop for Guard {
        fn drop(&mut self) {
            SUSPEND_DEPTH.with(|d| d.set(d.get() - 1));
        }
    }
    let _guard = Guard;
    f()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::__reset_runtime_for_tests;
    use crate::scope::create_effect_node;
    use std::cell::Cell as StdCell;
    use std::rc::Rc;

    #[test]
    fn reading_inside_untrack_does_not_subscribe() {
        __reset_runtime_for_tests();
        let signal = graph::create_signal();
        let touched = Rc::new(StdCell::new(0));
        let touched2 = touched.clone();
        let effect = create_effect_node(Some(Box::new(move || {
            untrack(|| track_signal(signal));
            touched2.set(touched2.get() + 1);
        })));
        let guard = begin_tracking(effect);
        untrack(|| track_signal(signal));
        drop(guard);
        trigger_signal(signal);
        scheduler::flush_sync();
        assert_eq!(touched.get(), 0, "no subscription should have been recorded");
    }

    #[test]
    fn triggering_reruns_tracked_effect() {
        __reset_runtime_for_tests();
        let signal = graph::create_signal();
        let runs = Rc::new(StdCell::new(0));
        let runs2 = runs.clone();
        let effect = create_effect_node(Some(Box::new(move || {
            runs2.set(runs2.get() + 1);
        })));
        let guard = begin_tracking(effect);
        track_signal(signal);
        drop(guard);
        trigger_signal(signal);
        scheduler::flush_sync();
        assert_eq!(runs.get(), 1);
    }
}
