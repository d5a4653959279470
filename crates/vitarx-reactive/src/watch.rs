//! The watcher API (component C6): `watch` and `watch_effect`, built as a
//! thin layer over the effect scheduling primitives in [`crate::scope`] and
//! [`crate::tracker`].
//!
//! Grounded on the teacher's `create_effect` (`sycamore-reactive/src/effect.rs`)
//! for the tracked-run-then-reschedule shape, generalized with the
//! `flush`/`immediate`/`once` options named in §4.6.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::scheduler::FlushPhase;
use crate::scope::{self, EffectKey};
use crate::tracker;

#[derive(Clone, Copy)]
pub struct WatchOptions {
    /// Run the callback once immediately instead of waiting for the first
    /// change (ignored by `watch_effect`, which always runs immediately).
    pub immediate: bool,
    /// Stop watching after the first callback invocation.
    pub once: bool,
    pub flush: FlushPhase,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self { immediate: false, once: false, flush: FlushPhase::Main }
    }
}

/// A handle to a running watcher, letting callers pause/resume/stop it
/// independently of the scope that owns it (§4.6).
#[derive(Clone, Copy)]
pub struct WatchHandle {
    effect: EffectKey,
}

impl WatchHandle {
    pub(crate) fn key(&self) -> EffectKey {
        self.effect
    }

    pub fn stop(&self) {
        scope::dispose_effect(self.effect);
    }

    pub fn pause(&self) {
        scope::pause_effect(self.effect);
    }

    pub fn resume(&self) {
        scope::resume_effect(self.effect);
    }

    /// Whether the watcher has stopped running, either via [`WatchHandle::stop`]
    /// or because its owning scope was disposed (§4.6 `isDeprecated`).
    pub fn is_deprecated(&self) -> bool {
        !scope::effect_is_alive(self.effect)
    }
}

/// Watches a derived `source` value, calling `callback(new, old)` whenever it
/// changes (by `PartialEq`). Unless `options.immediate` is set, the first
/// call only establishes the dependency subscription and baseline value; the
/// callback doesn't run until the first real change.
pub fn watch<T, F, C>(mut source: F, mut callback: C, options: WatchOptions) -> WatchHandle
where
    T: PartialEq + Clone + 'static,
    F: FnMut() -> T + 'static,
    C: FnMut(&T, Option<&T>) + 'static,
{
    let effect = scope::create_effect_node_with_flush(None, options.flush);
    let previous: Rc<RefCell<Option<T>>> = Rc::new(RefCell::new(None));
    let stopped = Rc::new(Cell::new(false));
    let once = options.once;

    let previous_for_run = previous.clone();
    let stopped_for_run = stopped.clone();
    let run = move || {
        if stopped_for_run.get() {
            return;
        }
        let guard = tracker::begin_tracking(effect);
        let new_value = source();
        drop(guard);
        let changed = previous_for_run.borrow().as_ref() != Some(&new_value);
        let old_value = previous_for_run.borrow_mut().replace(new_value.clone());
        if changed {
            callback(&new_value, old_value.as_ref());
            if once {
                stopped_for_run.set(true);
                scope::dispose_effect(effect);
            }
        }
    };
    scope::set_effect_run(effect, Rc::new(RefCell::new(run)));

    if options.immediate {
        scope::run_effect_if_alive(effect);
    } else {
        // Establish the subscription and baseline without firing the callback.
        let guard = tracker::begin_tracking(effect);
        let initial = source();
        drop(guard);
        *previous.borrow_mut() = Some(initial);
    }

    WatchHandle { effect }
}

/// Runs `f` immediately and re-runs it whenever any signal it read changes
/// (§4.6 `watchEffect`). Unlike `watch`, there is no "old vs new" diffing —
/// `f` is just re-executed.
pub fn watch_effect(mut f: impl FnMut() + 'static, options: WatchOptions) -> WatchHandle {
    let effect = scope::create_effect_node_with_flush(None, options.flush);
    let stopped = Rc::new(Cell::new(false));
    let once = options.once;
    let stopped_for_run = stopped.clone();
    let run = move || {
        if stopped_for_run.get() {
            return;
        }
        let guard = tracker::begin_tracking(effect);
        f();
        drop(guard);
        if once {
            stopped_for_run.set(true);
            scope::dispose_effect(effect);
        }
    };
    scope::set_effect_run(effect, Rc::new(RefCell::new(run)));
    scope::run_effect_if_alive(effect);
    WatchHandle { effect }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::__reset_runtime_for_tests;
    use crate::scheduler::flush_sync;
    use crate::signal::ValueRef;
    use std::cell::Cell as StdCell;

    #[test]
    fn watch_is_lazy_by_default() {
        __reset_runtime_for_tests();
        let source = ValueRef::new(1);
        let calls = Rc::new(StdCell::new(0));
        let calls2 = calls.clone();
        let source2 = source.clone();
        let _handle = watch(move || source2.get(), move |_new, _old| calls2.set(calls2.get() + 1), WatchOptions::default());
        assert_eq!(calls.get(), 0);
        source.set(2);
        flush_sync();
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn watch_immediate_runs_once_up_front() {
        __reset_runtime_for_tests();
        let source = ValueRef::new(1);
        let calls = Rc::new(StdCell::new(0));
        let calls2 = calls.clone();
        let source2 = source.clone();
        let _handle = watch(
            move || source2.get(),
            move |_new, _old| calls2.set(calls2.get() + 1),
            WatchOptions { immediate: true, ..Default::default() },
        );
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn watch_once_stops_after_first_change() {
        __reset_runtime_for_tests();
        let source = ValueRef::new(1);
        let calls = Rc::new(StdCell::new(0));
        let calls2 = calls.clone();
        let source2 = source.clone();
        let _handle = watch(
            move || source2.get(),
            move |_new, _old| calls2.set(calls2.get() + 1),
            WatchOptions { once: true, ..Default::default() },
        );
        source.set(2);
        flush_sync();
        source.set(3);
        flush_sync();
        assert_eq!(calls.get(), 1, "once-watcher must not fire a second time");
    }

    #[test]
    fn watch_effect_runs_immediately_and_on_change() {
        __reset_runtime_for_tests();
        let source = ValueRef::new(1);
        let runs = Rc::new(StdCell::new(0));
        let runs2 = runs.clone();
        let source2 = source.clone();
        let _handle = watch_effect(
            move || {
                source2.get();
                runs2.set(runs2.get() + 1);
            },
            WatchOptions::default(),
        );
        assert_eq!(runs.get(), 1);
        source.set(2);
        flush_sync();
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn stopped_watcher_no_longer_runs() {
        __reset_runtime_for_tests();
        let source = ValueRef::new(1);
        let runs = Rc::new(StdCell::new(0));
        let runs2 = runs.clone();
        let source2 = source.clone();
        let handle = watch_effect(
            move || {
                source2.get();
                runs2.set(runs2.get() + 1);
            },
            WatchOptions::default(),
        );
        handle.stop();
        source.set(2);
        flush_sync();
        assert_eq!(runs.get(), 1);
    }
}
