//! Reactive proxies over plain values and collections (component C4).
//!
//! JS-style transparent proxies have no Rust equivalent, so this follows the
//! fallback the spec's own Design Notes call out: explicit `get`/`set`
//! accessors instead of interception. The shape is grounded on the teacher's
//! `store.rs` (`Store<T: State>`, per-field `__trigger`): [`Reactive<T>`] is a
//! whole-value cell like [`crate::ValueRef`] (deep/shallow collapse to the
//! same behavior for an opaque `T` — fine-grained nested reactivity is
//! obtained by composing nested `Reactive<_>`/`ValueRef<_>` fields, the same
//! way `Store`'s derive macro builds per-field signals instead of wrapping
//! the whole struct). [`ReactiveMap`]/[`ReactiveSet`]/[`ReactiveVec`] track
//! per-key and size/iteration signals independently, per §4.4's "collection
//! methods are intercepted to track per-key and size".

use std::cell::RefCell;
use std::collections::HashMap;
use std::hash::Hash;
use std::rc::Rc;

use crate::graph;
use crate::runtime::SignalKey;
use crate::tracker;

/// A single reactive cell over an arbitrary value (§4.4 `reactive`).
pub struct Reactive<T: 'static> {
    inner: Rc<RefCell<T>>,
    id: SignalKey,
}

impl<T: 'static> Clone for Reactive<T> {
    fn clone(&self) -> Self {
        Self { inner: self.inner.clone(), id: self.id }
    }
}

impl<T: 'static> Reactive<T> {
    fn new_with(value: T) -> Self {
        Self { inner: Rc::new(RefCell::new(value)), id: graph::create_signal() }
    }

    pub fn get(&self) -> T
    where
        T: Clone,
    {
        tracker::track_signal(self.id);
        self.inner.borrow().clone()
    }

    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        tracker::track_signal(self.id);
        f(&self.inner.borrow())
    }

    pub fn set(&self, value: T)
    where
        T: PartialEq,
    {
        let changed = *self.inner.borrow() != value;
        *self.inner.borrow_mut() = value;
        if changed {
            tracker::trigger_signal(self.id);
        }
    }

    /// Mutates in place via `f`, always triggering (no cheap equality check
    /// is available without re-cloning before and after).
    pub fn mutate(&self, f: impl FnOnce(&mut T)) {
        f(&mut self.inner.borrow_mut());
        tracker::trigger_signal(self.id);
    }

    /// Reads without tracking (§4.2 `toRaw`-adjacent escape hatch).
    pub fn peek(&self) -> T
    where
        T: Clone,
    {
        self.inner.borrow().clone()
    }
}

/// Builds a deep-by-convention reactive cell (§4.4 `reactive(obj)`).
pub fn reactive<T: 'static>(value: T) -> Reactive<T> {
    Reactive::new_with(value)
}

/// Builds a reactive cell whose nested fields (if any) are expected to carry
/// their own identity rather than being recursively wrapped — functionally
/// identical to [`reactive`] for an opaque `T`, since this crate never
/// auto-wraps nested fields; kept distinct for API parity with §4.4's
/// `shallowReactive`.
pub fn shallow_reactive<T: 'static>(value: T) -> Reactive<T> {
    Reactive::new_with(value)
}

/// A read-only view over a [`Reactive`] (or any `Fn() -> T` getter). Writes
/// are simply not exposed; there is no runtime write-rejection to perform
/// since Rust's type system already removes `set`/`mutate` from the type.
pub struct Readonly<T: 'static> {
    get: Rc<dyn Fn() -> T>,
}

impl<T: 'static> Clone for Readonly<T> {
    fn clone(&self) -> Self {
        Self { get: self.get.clone() }
    }
}

impl<T: Clone + 'static> Readonly<T> {
    pub fn get(&self) -> T {
        (self.get)()
    }
}

/// Wraps a reactive cell as read-only (§4.4 `readonly`).
pub fn readonly<T: Clone + 'static>(source: &Reactive<T>) -> Readonly<T> {
    let source = source.clone();
    Readonly { get: Rc::new(move || source.get()) }
}

/// `shallowReadonly` collapses to [`readonly`] for the same reason
/// [`shallow_reactive`] collapses to [`reactive`].
pub fn shallow_readonly<T: Clone + 'static>(source: &Reactive<T>) -> Readonly<T> {
    readonly(source)
}

/// Marker wrapper signaling that a value should not be wrapped reactively
/// when composed into a larger structure (§4.4 `markRaw`). Since this crate
/// never auto-wraps nested fields, `Raw<T>` is mostly documentation; it does
/// prevent accidentally calling [`reactive`] on the same value twice when
/// composing structs by hand.
pub struct Raw<T>(pub T);

pub fn mark_raw<T>(value: T) -> Raw<T> {
    Raw(value)
}

/// Reads the plain, untracked value out of a reactive cell (§4.4 `toRaw`).
pub fn to_raw<T: Clone + 'static>(source: &Reactive<T>) -> T {
    source.peek()
}

/// Marker implemented by every reactive-proxy type, paralleling
/// [`crate::signal::Signal`] for the proxy side of §4.3's identity tags.
pub trait IsReactive {}

impl<T: 'static> IsReactive for Reactive<T> {}

/// §4.3 `isReactive`.
pub fn is_reactive<R: IsReactive>(_value: &R) -> bool {
    true
}

/// §4.6 `toRef(owner, key)`: a [`crate::signal::PropertyRef`] onto one key of
/// a [`ReactiveMap`], reading/writing straight through to `owner`.
pub fn to_ref<K: Eq + Hash + Clone + 'static, V: Clone + 'static>(
    owner: &ReactiveMap<K, V>,
    key: K,
) -> crate::signal::PropertyRef<K, V> {
    crate::signal::PropertyRef::new(owner, key)
}

/// §4.6 `toRefs(owner)`: one [`crate::signal::PropertyRef`] per key currently
/// present in `owner`. Keys added to `owner` afterward need their own
/// `to_ref` call, matching `toRefs`'s "snapshot of the object's own keys at
/// call time" semantics.
pub fn to_refs<K: Eq + Hash + Clone + 'static, V: Clone + 'static>(
    owner: &ReactiveMap<K, V>,
) -> Vec<(K, crate::signal::PropertyRef<K, V>)> {
    owner.entries().into_iter().map(|(key, _)| (key.clone(), to_ref(owner, key))).collect()
}

// ---------------------------------------------------------------------
// Collections
// ---------------------------------------------------------------------

struct KeyedSignals<K> {
    per_key: RefCell<HashMap<K, SignalKey>>,
    size: SignalKey,
    iteration: SignalKey,
}

impl<K: Eq + Hash + Clone> KeyedSignals<K> {
    fn new() -> Self {
        Self { per_key: RefCell::new(HashMap::new()), size: graph::create_signal(), iteration: graph::create_signal() }
    }

    fn signal_for(&self, key: &K) -> SignalKey {
        if let Some(id) = self.per_key.borrow().get(key) {
            return *id;
        }
        let id = graph::create_signal();
        self.per_key.borrow_mut().insert(key.clone(), id);
        id
    }

    fn track_key(&self, key: &K) {
        tracker::track_signal(self.signal_for(key));
    }

    fn trigger_key(&self, key: &K) {
        tracker::trigger_signal(self.signal_for(key));
    }

    fn track_size(&self) {
        tracker::track_signal(self.size);
    }

    fn track_iteration(&self) {
        tracker::track_signal(self.iteration);
    }

    fn trigger_structural(&self) {
        tracker::trigger_signal(self.size);
        tracker::trigger_signal(self.iteration);
    }
}

/// A reactive `HashMap` (§4.4: "Map.set/delete/clear ... tracked per-key and
/// size").
pub struct ReactiveMap<K: Eq + Hash + Clone + 'static, V: Clone + 'static> {
    data: Rc<RefCell<HashMap<K, V>>>,
    signals: Rc<KeyedSignals<K>>,
}

impl<K: Eq + Hash + Clone + 'static, V: Clone + 'static> Clone for ReactiveMap<K, V> {
    fn clone(&self) -> Self {
        Self { data: self.data.clone(), signals: self.signals.clone() }
    }
}

impl<K: Eq + Hash + Clone + 'static, V: Clone + 'static> Default for ReactiveMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Eq + Hash + Clone + 'static, V: Clone + 'static> ReactiveMap<K, V> {
    pub fn new() -> Self {
        Self { data: Rc::new(RefCell::new(HashMap::new())), signals: Rc::new(KeyedSignals::new()) }
    }

    pub fn get(&self, key: &K) -> Option<V> {
        self.signals.track_key(key);
        self.data.borrow().get(key).cloned()
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.signals.track_key(key);
        self.data.borrow().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.signals.track_size();
        self.data.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn set(&self, key: K, value: V) {
        let is_new = !self.data.borrow().contains_key(&key);
        self.data.borrow_mut().insert(key.clone(), value);
        self.signals.trigger_key(&key);
        if is_new {
            self.signals.trigger_structural();
        }
    }

    pub fn delete(&self, key: &K) -> Option<V> {
        let removed = self.data.borrow_mut().remove(key);
        if removed.is_some() {
            self.signals.trigger_key(key);
            self.signals.trigger_structural();
        }
        removed
    }

    pub fn clear(&self) {
        let had_entries = !self.data.borrow().is_empty();
        let keys: Vec<K> = self.data.borrow().keys().cloned().collect();
        self.data.borrow_mut().clear();
        for key in &keys {
            self.signals.trigger_key(key);
        }
        if had_entries {
            self.signals.trigger_structural();
        }
    }

    /// Snapshot of entries; tracks the iteration signal, so any future
    /// insert/remove invalidates callers that iterated (§4.4).
    pub fn entries(&self) -> Vec<(K, V)> {
        self.signals.track_iteration();
        self.data.borrow().iter().map(|(k, v)| (k.clone(), v.clone())).collect()
    }
}

/// A reactive `HashSet` (§4.4: "Set.add/delete/clear").
pub struct ReactiveSet<T: Eq + Hash + Clone + 'static> {
    map: ReactiveMap<T, ()>,
}

impl<T: Eq + Hash + Clone + 'static> Clone for ReactiveSet<T> {
    fn clone(&self) -> Self {
        Self { map: self.map.clone() }
    }
}

impl<T: Eq + Hash + Clone + 'static> Default for ReactiveSet<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Eq + Hash + Clone + 'static> ReactiveSet<T> {
    pub fn new() -> Self {
        Self { map: ReactiveMap::new() }
    }

    pub fn contains(&self, value: &T) -> bool {
        self.map.contains_key(value)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn add(&self, value: T) {
        self.map.set(value, ());
    }

    pub fn delete(&self, value: &T) -> bool {
        self.map.delete(value).is_some()
    }

    pub fn clear(&self) {
        self.map.clear();
    }

    pub fn values(&self) -> Vec<T> {
        self.map.entries().into_iter().map(|(k, _)| k).collect()
    }
}

/// A reactive, index-addressable vector (§4.4, supplementing `Map`/`Set` with
/// the third JS collection kind proxies commonly wrap).
pub struct ReactiveVec<T: Clone + 'static> {
    data: Rc<RefCell<Vec<T>>>,
    length: SignalKey,
    iteration: SignalKey,
}

impl<T: Clone + 'static> Clone for ReactiveVec<T> {
    fn clone(&self) -> Self {
        Self { data: self.data.clone(), length: self.length, iteration: self.iteration }
    }
}

impl<T: Clone + 'static> Default for ReactiveVec<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + 'static> ReactiveVec<T> {
    pub fn new() -> Self {
        Self { data: Rc::new(RefCell::new(Vec::new())), length: graph::create_signal(), iteration: graph::create_signal() }
    }

    pub fn get(&self, index: usize) -> Option<T> {
        tracker::track_signal(self.iteration);
        self.data.borrow().get(index).cloned()
    }

    pub fn len(&self) -> usize {
        tracker::track_signal(self.length);
        self.data.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn push(&self, value: T) {
        self.data.borrow_mut().push(value);
        tracker::trigger_signal(self.length);
        tracker::trigger_signal(self.iteration);
    }

    pub fn set(&self, index: usize, value: T) {
        self.data.borrow_mut()[index] = value;
        tracker::trigger_signal(self.iteration);
    }

    pub fn remove(&self, index: usize) -> T {
        let value = self.data.borrow_mut().remove(index);
        tracker::trigger_signal(self.length);
        tracker::trigger_signal(self.iteration);
        value
    }

    pub fn snapshot(&self) -> Vec<T> {
        tracker::track_signal(self.iteration);
        self.data.borrow().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::__reset_runtime_for_tests;
    use crate::scheduler::flush_sync;
    use crate::scope::create_effect_node;
    use crate::tracker::begin_tracking;
    use std::cell::Cell as StdCell;

    #[test]
    fn reactive_set_suppresses_equal_write() {
        __reset_runtime_for_tests();
        let cell = reactive(1);
        let runs = Rc::new(StdCell::new(0));
        let runs2 = runs.clone();
        let cell2 = cell.clone();
        let effect = create_effect_node(Some(Box::new(move || {
            cell2.get();
            runs2.set(runs2.get() + 1);
        })));
        let guard = begin_tracking(effect);
        cell.get();
        drop(guard);
        cell.set(1);
        flush_sync();
        assert_eq!(runs.get(), 0);
        cell.set(2);
        flush_sync();
        assert_eq!(runs.get(), 1);
    }

    #[test]
    fn reactive_map_tracks_per_key_not_unrelated_keys() {
        __reset_runtime_for_tests();
        let map: ReactiveMap<&'static str, i32> = ReactiveMap::new();
        map.set("a", 1);
        let runs_a = Rc::new(StdCell::new(0));
        let runs_a2 = runs_a.clone();
        let map2 = map.clone();
        let effect = create_effect_node(Some(Box::new(move || {
            map2.get(&"a");
            runs_a2.set(runs_a2.get() + 1);
        })));
        let guard = begin_tracking(effect);
        map.get(&"a");
        drop(guard);
        map.set("b", 2);
        flush_sync();
        assert_eq!(runs_a.get(), 0, "writing an unrelated key must not trigger a subscriber of \"a\"");
        map.set("a", 10);
        flush_sync();
        assert_eq!(runs_a.get(), 1);
    }

    #[test]
    fn reactive_vec_push_triggers_length_subscribers() {
        __reset_runtime_for_tests();
        let vec: ReactiveVec<i32> = ReactiveVec::new();
        let runs = Rc::new(StdCell::new(0));
        let runs2 = runs.clone();
        let vec2 = vec.clone();
        let effect = create_effect_node(Some(Box::new(move || {
            vec2.len();
            runs2.set(runs2.get() + 1);
        })));
        let guard = begin_tracking(effect);
        vec.len();
        drop(guard);
        vec.push(1);
        flush_sync();
        assert_eq!(runs.get(), 1);
    }
}
