//! Signal primitives (component C3): [`ValueRef`], a single mutable reactive
//! cell, and [`Computed`], a dirty-tracked derived value.
//!
//! Grounded on the teacher's (orphaned but instructive) `signal.rs` for the
//! `SignalData<T>` shape, and on `effect.rs::create_memo` /
//! `create_selector_with` for how a computed's private effect drives
//! recomputation. The SameValue write-suppression rule (§3 invariant: "a
//! write that doesn't change the value by `==` does not trigger
//! subscribers") runs on every `set`/`update`.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::graph;
use crate::runtime::SignalKey;
use crate::scheduler::FlushPhase;
use crate::scope::{self, EffectKey};
use crate::tracker;

struct ValueRefInner<T> {
    id: SignalKey,
    value: RefCell<T>,
}

/// A single reactive cell (the "ref"/"signal" of §4.3).
pub struct ValueRef<T: 'static> {
    inner: Rc<ValueRefInner<T>>,
}

impl<T: 'static> Clone for ValueRef<T> {
    fn clone(&self) -> Self {
        Self { inner: self.inner.clone() }
    }
}

impl<T: fmt::Debug + Clone + 'static> fmt::Debug for ValueRef<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValueRef").field("value", &*self.inner.value.borrow()).finish()
    }
}

impl<T: 'static> ValueRef<T> {
    pub fn new(value: T) -> Self {
        let id = graph::create_signal();
        Self { inner: Rc::new(ValueRefInner { id, value: RefCell::new(value) }) }
    }

    pub(crate) fn id(&self) -> SignalKey {
        self.inner.id
    }

    /// Reads the current value, recording a dependency on the currently
    /// active effect (if any).
    pub fn get(&self) -> T
    where
        T: Clone,
    {
        tracker::track_signal(self.inner.id);
        self.inner.value.borrow().clone()
    }

    /// Reads the current value without tracking (§4.2 `peek`).
    pub fn peek(&self) -> T
    where
        T: Clone,
    {
        self.inner.value.borrow().clone()
    }

    /// Borrow-based read that tracks a dependency without requiring `T: Clone`.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        tracker::track_signal(self.inner.id);
        f(&self.inner.value.borrow())
    }

    /// Borrow-based untracked read.
    pub fn peek_with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.inner.value.borrow())
    }

    /// Writes a new value, triggering subscribers unless the new value
    /// compares equal to the old one (SameValue suppression, §3).
    pub fn set(&self, value: T)
    where
        T: PartialEq,
    {
        let changed = {
            let mut current = self.inner.value.borrow_mut();
            if *current == value {
                false
            } else {
                *current = value;
                true
            }
        };
        if changed {
            tracker::trigger_signal(self.inner.id);
        }
    }

    /// Mutates the value in place via `f`, comparing against a clone taken
    /// before the mutation to decide whether to trigger.
    pub fn update(&self, f: impl FnOnce(&mut T))
    where
        T: PartialEq + Clone,
    {
        let before = self.inner.value.borrow().clone();
        f(&mut self.inner.value.borrow_mut());
        if *self.inner.value.borrow() != before {
            tracker::trigger_signal(self.inner.id);
        }
    }

    /// Writes a new value and triggers subscribers unconditionally, even if
    /// it compares equal to the old one. Escape hatch for values whose
    /// `PartialEq` doesn't capture every observable change (e.g. interior
    /// mutability inside `T`).
    pub fn set_force(&self, value: T) {
        *self.inner.value.borrow_mut() = value;
        tracker::trigger_signal(self.inner.id);
    }
}

/// A dirty-tracked derived value (§4.3 "computed"). Not recomputed until
/// read; a dependency change marks it dirty and notifies its own subscribers,
/// but the getter closure itself only runs inside [`Computed::get`]/
/// [`Computed::peek`].
pub struct Computed<T: 'static> {
    inner: Rc<ComputedInner<T>>,
}

impl<T: 'static> Clone for Computed<T> {
    fn clone(&self) -> Self {
        Self { inner: self.inner.clone() }
    }
}

struct ComputedInner<T> {
    id: SignalKey,
    effect: EffectKey,
    dirty: std::cell::Cell<bool>,
    /// Re-entrancy guard: set for the duration of a getter call, so a
    /// computed that (directly or transitively) reads itself is caught
    /// instead of recursing through `get` -> `recompute` -> `get` forever.
    computing: std::cell::Cell<bool>,
    value: RefCell<Option<T>>,
    getter: RefCell<Box<dyn FnMut() -> T>>,
    /// `None` for [`Computed::new`], which stays purely lazy: a dependency
    /// change just marks `dirty` and notifies, deferring the actual getter
    /// call to the next read. `Some` for [`Computed::with_comparator`],
    /// which trades that laziness for eager recomputation (teacher:
    /// `effect.rs::create_selector_with`, whose whole point is comparing the
    /// freshly recomputed value against the cached one before deciding
    /// whether to notify downstream at all).
    comparator: Option<Box<dyn Fn(&T, &T) -> bool>>,
}

impl<T: 'static> ComputedInner<T> {
    /// Runs the getter under tracking, caches the result, and reports
    /// whether it differs from the previous cached value under `comparator`
    /// (always "changed" when there's no comparator, or no previous value).
    fn recompute(&self) -> bool {
        if self.computing.replace(true) {
            panic!("{}", crate::error::GraphError::CyclicDependency);
        }
        struct ComputingGuard<'a>(&'a std::cell::Cell<bool>);
        impl Drop for ComputingGuard<'_> {
            fn drop(&mut self) {
                self.0.set(false);
            }
        }
        let _guard = ComputingGuard(&self.computing);

        let guard = tracker::begin_tracking(self.effect);
        let new_value = (self.getter.borrow_mut())();
        drop(guard);

        let changed = match (&self.comparator, self.value.borrow().as_ref()) {
            (Some(cmp), Some(old)) => !cmp(old, &new_value),
            _ => true,
        };
        *self.value.borrow_mut() = Some(new_value);
        self.dirty.set(false);
        changed
    }
}

impl<T: 'static> Computed<T> {
    pub fn new(getter: impl FnMut() -> T + 'static) -> Self {
        Self::build(getter, None)
    }

    /// Like [`Computed::new`], but with a custom "are these equal" predicate
    /// instead of `PartialEq` (teacher: `effect.rs::create_selector_with`).
    /// Opting into a comparator trades the base case's laziness for eager
    /// recomputation on every dependency change, since the comparator can
    /// only suppress a downstream trigger once the new value is actually
    /// known.
    pub fn with_comparator(
        getter: impl FnMut() -> T + 'static,
        comparator: impl Fn(&T, &T) -> bool + 'static,
    ) -> Self {
        Self::build(getter, Some(Box::new(comparator)))
    }

    fn build(getter: impl FnMut() -> T + 'static, comparator: Option<Box<dyn Fn(&T, &T) -> bool>>) -> Self {
        let id = graph::create_signal();
        let effect = scope::create_effect_node_with_flush(None, FlushPhase::Sync);
        let inner = Rc::new(ComputedInner {
            id,
            effect,
            dirty: std::cell::Cell::new(true),
            computing: std::cell::Cell::new(false),
            value: RefCell::new(None),
            getter: RefCell::new(Box::new(getter)),
            comparator,
        });
        let weak = Rc::downgrade(&inner);
        scope::set_effect_run(
            effect,
            Rc::new(RefCell::new(move || {
                let Some(inner) = weak.upgrade() else { return };
                if inner.comparator.is_some() {
                    if inner.recompute() {
                        tracker::trigger_signal(inner.id);
                    }
                } else {
                    inner.dirty.set(true);
                    tracker::trigger_signal(inner.id);
                }
            })),
        );
        Computed { inner }
    }

    fn recompute_if_dirty(&self) {
        if self.inner.dirty.get() {
            self.inner.recompute();
        }
    }

    pub fn get(&self) -> T
    where
        T: Clone,
    {
        tracker::track_signal(self.inner.id);
        self.recompute_if_dirty();
        self.inner.value.borrow().as_ref().unwrap().clone()
    }

    pub fn peek(&self) -> T
    where
        T: Clone,
    {
        self.recompute_if_dirty();
        self.inner.value.borrow().as_ref().unwrap().clone()
    }

    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        tracker::track_signal(self.inner.id);
        self.recompute_if_dirty();
        f(self.inner.value.borrow().as_ref().unwrap())
    }
}

impl<T: 'static> Drop for ComputedInner<T> {
    fn drop(&mut self) {
        scope::dispose_effect(self.effect);
    }
}

/// A signal-shaped view onto one key of a [`crate::reactive::ReactiveMap`]
/// (§4.6 `PropertyRef<O, K>`): reads project `owner[key]`, writes set back
/// through the owner. Caching "by (owner, key) identity" falls out of the
/// map's own per-key signal table (`reactive::KeyedSignals::signal_for`)
/// rather than needing a cache here — every `PropertyRef` built for the same
/// owner clone and key tracks/triggers the exact same underlying signal.
pub struct PropertyRef<K: std::hash::Hash + Eq + Clone + 'static, V: Clone + 'static> {
    owner: crate::reactive::ReactiveMap<K, V>,
    key: K,
}

impl<K: std::hash::Hash + Eq + Clone + 'static, V: Clone + 'static> Clone for PropertyRef<K, V> {
    fn clone(&self) -> Self {
        Self { owner: self.owner.clone(), key: self.key.clone() }
    }
}

impl<K: std::hash::Hash + Eq + Clone + 'static, V: Clone + 'static> PropertyRef<K, V> {
    pub fn new(owner: &crate::reactive::ReactiveMap<K, V>, key: K) -> Self {
        Self { owner: owner.clone(), key }
    }

    pub fn get(&self) -> Option<V> {
        self.owner.get(&self.key)
    }

    pub fn set(&self, value: V) {
        self.owner.set(self.key.clone(), value);
    }
}

impl<K: std::hash::Hash + Eq + Clone + 'static, V: Clone + 'static> Signal for PropertyRef<K, V> {}

/// Marker implemented by every signal-shaped type, so [`is_signal`]/[`is_ref`]
/// can identify one generically without downcasting (§4.3: "All signals
/// carry `[IS_SIGNAL]=true` identity tags consulted by utilities").
pub trait Signal {}

impl<T: 'static> Signal for ValueRef<T> {}
impl<T: 'static> Signal for Computed<T> {}

/// §4.3 `isSignal`.
pub fn is_signal<S: Signal>(_value: &S) -> bool {
    true
}

/// §4.3 `isRef`; an alias over [`is_signal`] since every signal variant here
/// already plays the "ref" role JS distinguishes from plain reactive objects.
pub fn is_ref<S: Signal>(value: &S) -> bool {
    is_signal(value)
}

/// Either a plain value or a signal producing one — the duality [`unref`]
/// collapses (§4.3: "returns the inner value if the argument is a ref,
/// otherwise the argument itself"). Callers wrap a plain value as
/// `MaybeSignal::Value(x)`; `ValueRef`/`Computed` convert in via `From`.
pub enum MaybeSignal<T: Clone + 'static> {
    Value(T),
    Ref(ValueRef<T>),
    Computed(Computed<T>),
}

impl<T: Clone + 'static> MaybeSignal<T> {
    pub fn unref(&self) -> T {
        match self {
            MaybeSignal::Value(v) => v.clone(),
            MaybeSignal::Ref(r) => r.get(),
            MaybeSignal::Computed(c) => c.get(),
        }
    }
}

impl<T: Clone + 'static> From<ValueRef<T>> for MaybeSignal<T> {
    fn from(value: ValueRef<T>) -> Self {
        MaybeSignal::Ref(value)
    }
}

impl<T: Clone + 'static> From<Computed<T>> for MaybeSignal<T> {
    fn from(value: Computed<T>) -> Self {
        MaybeSignal::Computed(value)
    }
}

/// §4.3 `unref`.
pub fn unref<T: Clone + 'static>(value: impl Into<MaybeSignal<T>>) -> T {
    value.into().unref()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::__reset_runtime_for_tests;
    use std::cell::Cell as StdCell;

    #[test]
    fn write_with_same_value_does_not_trigger() {
        __reset_runtime_for_tests();
        let signal = ValueRef::new(1);
        let runs = Rc::new(StdCell::new(0));
        let runs2 = runs.clone();
        let signal2 = signal.clone();
        let effect = scope::create_effect_node(Some(Box::new(move || {
            signal2.get();
            runs2.set(runs2.get() + 1);
        })));
        let guard = tracker::begin_tracking(effect);
        signal.get();
        drop(guard);
        signal.set(1);
        crate::scheduler::flush_sync();
        assert_eq!(runs.get(), 0, "setting the same value must not trigger subscribers");
        signal.set(2);
        crate::scheduler::flush_sync();
        assert_eq!(runs.get(), 1);
        scope::dispose_effect(effect);
    }

    #[test]
    fn computed_is_lazy_and_cached() {
        __reset_runtime_for_tests();
        let source = ValueRef::new(2);
        let calls = Rc::new(StdCell::new(0));
        let calls2 = calls.clone();
        let source2 = source.clone();
        let doubled = Computed::new(move || {
            calls2.set(calls2.get() + 1);
            source2.get() * 2
        });
        assert_eq!(calls.get(), 0, "must not compute before first read");
        assert_eq!(doubled.get(), 4);
        assert_eq!(calls.get(), 1);
        assert_eq!(doubled.get(), 4, "cached read must not recompute");
        assert_eq!(calls.get(), 1);
        source.set(3);
        assert_eq!(calls.get(), 1, "dependency change alone must not force recompute");
        assert_eq!(doubled.get(), 6);
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn computed_with_comparator_suppresses_downstream_trigger_when_unchanged() {
        __reset_runtime_for_tests();
        let source = ValueRef::new(1i32);
        let source2 = source.clone();
        let parity = Computed::with_comparator(move || source2.get() % 2, |a, b| a == b);
        let runs = Rc::new(StdCell::new(0));
        let runs2 = runs.clone();
        let parity2 = parity.clone();
        let effect = scope::create_effect_node(Some(Box::new(move || {
            parity2.get();
            runs2.set(runs2.get() + 1);
        })));
        let guard = tracker::begin_tracking(effect);
        parity.get();
        drop(guard);
        assert_eq!(runs.get(), 0);

        source.set(3); // still odd: the comparator must suppress the trigger
        crate::scheduler::flush_sync();
        assert_eq!(runs.get(), 0, "comparator must suppress the trigger when the recomputed value compares equal");

        source.set(4); // now even: a genuine change must still propagate
        crate::scheduler::flush_sync();
        assert_eq!(runs.get(), 1, "a real change under the comparator must still trigger downstream");
        assert_eq!(parity.get(), 0);
        scope::dispose_effect(effect);
    }

    #[test]
    #[should_panic(expected = "cyclic dependency")]
    fn computed_reading_itself_panics_instead_of_looping() {
        __reset_runtime_for_tests();
        // `cell` lets the getter close over the computed it's about to build.
        let cell: Rc<RefCell<Option<Computed<i32>>>> = Rc::new(RefCell::new(None));
        let cell2 = cell.clone();
        let looping = Computed::new(move || cell2.borrow().as_ref().unwrap().get() + 1);
        *cell.borrow_mut() = Some(looping.clone());
        looping.get();
    }
}
