//! Effect scopes (component C5) and the low-level effect node arena shared by
//! the tracker, watcher and scheduler layers.
//!
//! Grounded on the teacher's *actually wired* scope design in
//! `sycamore-reactive/src/lib.rs` (`ScopeRaw`/`ScopeInner`, not the orphaned
//! `scope.rs`/`ReactiveScope` variant living alongside it): a tree of scopes,
//! each owning a list of disposables, torn down child-scopes-first. Unlike
//! the teacher, disposal here is an explicit `dispose()` call rather than
//! arena-lifetime-bound, because the spec models scopes as explicitly
//! stoppable (§4.5), closer to Vue's `effectScope().stop()`.
//!
//! Provide/inject walks the parent chain exactly like
//! `sycamore-reactive/src/context.rs`.

use std::any::{Any, TypeId};
use std::cell::Cell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::graph::LinkKey;
use crate::runtime::{Runtime, SignalKey};
use crate::scheduler::FlushPhase;

slotmap::new_key_type! {
    pub struct EffectKey;
}

slotmap::new_key_type! {
    pub struct ScopeKey;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EffectRunState {
    Active,
    Paused,
}

pub(crate) struct EffectNode {
    pub signal_head: Option<LinkKey>,
    pub signal_tail: Option<LinkKey>,
    pub index: Option<HashMap<SignalKey, LinkKey>>,
    pub dep_version: u64,
    pub state: EffectRunState,
    /// Set while a paused effect's signal fired, so `resume` knows to
    /// catch it up (§4.5 edge case: "a paused effect that would have fired
    /// re-runs once on resume if it missed a trigger").
    pub missed_while_paused: bool,
    pub owner_scope: Option<ScopeKey>,
    pub flush: FlushPhase,
    pub run: Option<Rc<std::cell::RefCell<dyn FnMut()>>>,
    pub scope_prev: Option<EffectKey>,
    pub scope_next: Option<EffectKey>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ScopeState {
    Active,
    Paused,
    Disposed,
}

pub(crate) struct ScopeNode {
    pub parent: Option<ScopeKey>,
    pub state: ScopeState,
    pub effect_head: Option<EffectKey>,
    pub effect_tail: Option<EffectKey>,
    pub child_head: Option<ScopeKey>,
    pub child_tail: Option<ScopeKey>,
    pub scope_prev: Option<ScopeKey>,
    pub scope_next: Option<ScopeKey>,
    pub cleanups: Vec<Box<dyn FnOnce()>>,
    pub contexts: Option<HashMap<TypeId, Rc<dyn Any>>>,
}

impl ScopeNode {
    fn new(parent: Option<ScopeKey>) -> Self {
        Self {
            parent,
            state: ScopeState::Active,
            effect_head: None,
            effect_tail: None,
            child_head: None,
            child_tail: None,
            scope_prev: None,
            scope_next: None,
            cleanups: Vec::new(),
            contexts: None,
        }
    }
}

// ---------------------------------------------------------------------
// Effect node allocation, used by both the tracker/watcher layer and tests.
// ---------------------------------------------------------------------

pub(crate) fn create_effect_node(run: Option<Box<dyn FnMut()>>) -> EffectKey {
    create_effect_node_with_flush(run, FlushPhase::Main)
}

pub(crate) fn create_effect_node_with_flush(run: Option<Box<dyn FnMut()>>, flush: FlushPhase) -> EffectKey {
    Runtime::with(|rt| {
        let owner_scope = rt.active_scope.get();
        let key = rt.effect_nodes.borrow_mut().insert(EffectNode {
            signal_head: None,
            signal_tail: None,
            index: None,
            dep_version: 0,
            state: EffectRunState::Active,
            missed_while_paused: false,
            owner_scope,
            flush,
            run: run.map(|f| Rc::new(std::cell::RefCell::new(f)) as Rc<std::cell::RefCell<dyn FnMut()>>),
            scope_prev: None,
            scope_next: None,
        });
        if let Some(scope) = owner_scope {
            attach_effect_to_scope(scope, key);
        }
        key
    })
}

fn attach_effect_to_scope(scope: ScopeKey, effect: EffectKey) {
    Runtime::with(|rt| {
        let mut scopes = rt.scopes.borrow_mut();
        let Some(node) = scopes.get_mut(scope) else { return };
        let old_tail = node.effect_tail;
        if let Some(tail) = old_tail {
            rt.effect_nodes.borrow_mut().get_mut(tail).unwrap().scope_next = Some(effect);
        } else {
            node.effect_head = Some(effect);
        }
        rt.effect_nodes.borrow_mut().get_mut(effect).unwrap().scope_prev = old_tail;
        node.effect_tail = Some(effect);
    });
}

fn detach_effect_from_scope(effect: EffectKey) {
    Runtime::with(|rt| {
        let (owner, prev, next) = {
            let nodes = rt.effect_nodes.borrow();
            let Some(n) = nodes.get(effect) else { return };
            (n.owner_scope, n.scope_prev, n.scope_next)
        };
        let Some(scope) = owner else { return };
        let mut scopes = rt.scopes.borrow_mut();
        let Some(node) = scopes.get_mut(scope) else { return };
        match prev {
            Some(p) => rt.effect_nodes.borrow_mut().get_mut(p).unwrap().scope_next = next,
            None => node.effect_head = next,
        }
        match next {
            Some(n) => rt.effect_nodes.borrow_mut().get_mut(n).unwrap().scope_prev = prev,
            None => node.effect_tail = prev,
        }
    });
}

/// Runs an effect's stored closure if it's still live and not paused. The
/// scheduler calls this when draining a phase queue; it is also how a signal
/// write re-runs a `sync`-flush effect immediately.
/// Installs (or replaces) an effect node's callback after construction. Used
/// by computeds, which need the node's `EffectKey` to exist before they can
/// build a closure that captures it.
pub(crate) fn set_effect_run(effect: EffectKey, run: Rc<std::cell::RefCell<dyn FnMut()>>) {
    Runtime::with(|rt| {
        if let Some(node) = rt.effect_nodes.borrow_mut().get_mut(effect) {
            node.run = Some(run);
        }
    });
}

pub(crate) fn run_effect_if_alive(effect: EffectKey) {
    let (run, active) = Runtime::with(|rt| {
        let nodes = rt.effect_nodes.borrow();
        match nodes.get(effect) {
            Some(n) => (n.run.clone(), n.state == EffectRunState::Active),
            None => (None, false),
        }
    });
    let Some(run) = run else { return };
    if !active {
        Runtime::with(|rt| {
            if let Some(n) = rt.effect_nodes.borrow_mut().get_mut(effect) {
                n.missed_while_paused = true;
            }
        });
        return;
    }
    (run.borrow_mut())();
}

pub(crate) fn flush_phase_of(effect: EffectKey) -> FlushPhase {
    Runtime::with(|rt| rt.effect_nodes.borrow().get(effect).map(|n| n.flush).unwrap_or(FlushPhase::Main))
}

pub(crate) fn pause_effect(effect: EffectKey) {
    Runtime::with(|rt| {
        if let Some(n) = rt.effect_nodes.borrow_mut().get_mut(effect) {
            n.state = EffectRunState::Paused;
        }
    });
}

pub(crate) fn resume_effect(effect: EffectKey) {
    let missed = Runtime::with(|rt| {
        let mut nodes = rt.effect_nodes.borrow_mut();
        let Some(n) = nodes.get_mut(effect) else { return false };
        n.state = EffectRunState::Active;
        std::mem::take(&mut n.missed_while_paused)
    });
    if missed {
        run_effect_if_alive(effect);
    }
}

/// Whether `effect` still has a live node in the runtime's arena, i.e. it
/// hasn't been removed by [`dispose_effect`] (directly, or via its owning
/// scope being disposed).
pub(crate) fn effect_is_alive(effect: EffectKey) -> bool {
    Runtime::with(|rt| rt.effect_nodes.borrow().contains_key(effect))
}

pub(crate) fn dispose_effect(effect: EffectKey) {
    crate::graph::clear_effect_links(effect);
    detach_effect_from_scope(effect);
    Runtime::with(|rt| {
        rt.effect_nodes.borrow_mut().remove(effect);
    });
}

// ---------------------------------------------------------------------
// Scopes
// ---------------------------------------------------------------------

/// A handle to a node in the effect-scope tree (§4.5).
///
/// Cheap to copy; the actual state lives in the runtime's scope arena.
/// Disposal is explicit (`dispose`), matching the spec's "owns a list of
/// disposables ... pause()/resume()/dispose()" rather than Drop-on-scope-go-
/// out-of-scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EffectScope {
    pub(crate) key: ScopeKey,
}

impl EffectScope {
    /// Creates a new scope. If `detached` is false (the common case) and
    /// there is a currently active scope, the new scope is attached as its
    /// child, so disposing the parent disposes this one too.
    pub fn new(detached: bool) -> Self {
        Runtime::with(|rt| {
            let parent = if detached { None } else { rt.active_scope.get() };
            let key = rt.scopes.borrow_mut().insert(ScopeNode::new(parent));
            if let Some(parent_key) = parent {
                attach_child_scope(parent_key, key);
            }
            EffectScope { key }
        })
    }

    /// Runs `f` with this scope active, so effects/signals/child scopes
    /// created inside `f` are owned by it. Restores the previous active
    /// scope afterwards, including on panic-unwind via the guard's `Drop`.
    ///
    /// Panics if the scope has already been disposed; use [`try_run`] to
    /// handle that case without unwinding.
    ///
    /// [`try_run`]: EffectScope::try_run
    pub fn run<R>(&self, f: impl FnOnce() -> R) -> R {
        self.try_run(f).unwrap_or_else(|err| panic!("{err}"))
    }

    /// Fallible form of [`run`](EffectScope::run): returns
    /// [`crate::error::ScopeError::ScopeDisposed`] instead of running `f` if
    /// this scope has already been disposed.
    pub fn try_run<R>(&self, f: impl FnOnce() -> R) -> Result<R, crate::error::ScopeError> {
        if self.is_disposed() {
            return Err(crate::error::ScopeError::ScopeDisposed);
        }
        struct Restore(Option<ScopeKey>);
        impl Drop for Restore {
            fn drop(&mut self) {
                Runtime::with(|rt| rt.active_scope.set(self.0));
            }
        }
        let previous = Runtime::with(|rt| rt.active_scope.replace(Some(self.key)));
        let _restore = Restore(previous);
        Ok(f())
    }

    pub fn pause(&self) {
        set_scope_state_recursive(self.key, ScopeState::Paused);
    }

    pub fn resume(&self) {
        set_scope_state_recursive(self.key, ScopeState::Active);
    }

    pub fn is_disposed(&self) -> bool {
        Runtime::with(|rt| rt.scopes.borrow().get(self.key).map(|n| n.state == ScopeState::Disposed).unwrap_or(true))
    }

    /// Disposes child scopes, then this scope's own effects, then runs its
    /// `on_cleanup` callbacks, then drops its context map — in that order
    /// (the order the teacher's `ScopeRaw` drop glue documents).
    ///
    /// Returns [`crate::error::ScopeError::ScopeDisposed`] if the scope was
    /// already disposed rather than silently doing nothing.
    pub fn dispose(&self) -> Result<(), crate::error::ScopeError> {
        if self.is_disposed() {
            return Err(crate::error::ScopeError::ScopeDisposed);
        }
        dispose_scope(self.key);
        Ok(())
    }
}

fn attach_child_scope(parent: ScopeKey, child: ScopeKey) {
    Runtime::with(|rt| {
        let mut scopes = rt.scopes.borrow_mut();
        let old_tail = scopes.get(parent).and_then(|n| n.child_tail);
        if let Some(tail) = old_tail {
            scopes.get_mut(tail).unwrap().scope_next = Some(child);
        } else if let Some(p) = scopes.get_mut(parent) {
            p.child_head = Some(child);
        }
        if let Some(c) = scopes.get_mut(child) {
            c.scope_prev = old_tail;
        }
        if let Some(p) = scopes.get_mut(parent) {
            p.child_tail = Some(child);
        }
    });
}

fn set_scope_state_recursive(scope: ScopeKey, state: ScopeState) {
    let (children, effects) = Runtime::with(|rt| {
        let mut scopes = rt.scopes.borrow_mut();
        let Some(node) = scopes.get_mut(scope) else { return (Vec::new(), Vec::new()) };
        if node.state == ScopeState::Disposed {
            return (Vec::new(), Vec::new());
        }
        node.state = state;
        let mut children = Vec::new();
        let mut cursor = node.child_head;
        while let Some(c) = cursor {
            children.push(c);
            cursor = scopes.get(c).and_then(|n| n.scope_next);
        }
        drop(scopes);
        let mut effects = Vec::new();
        let mut cursor = rt.scopes.borrow().get(scope).and_then(|n| n.effect_head);
        while let Some(e) = cursor {
            effects.push(e);
            cursor = rt.effect_nodes.borrow().get(e).and_then(|n| n.scope_next);
        }
        (children, effects)
    });
    for e in effects {
        match state {
            ScopeState::Paused => pause_effect(e),
            ScopeState::Active => resume_effect(e),
            ScopeState::Disposed => {}
        }
    }
    for c in children {
        set_scope_state_recursive(c, state);
    }
}

fn dispose_scope(scope: ScopeKey) {
    let already = Runtime::with(|rt| rt.scopes.borrow().get(scope).map(|n| n.state == ScopeState::Disposed).unwrap_or(true));
    if already {
        return;
    }

    let children = Runtime::with(|rt| {
        let scopes = rt.scopes.borrow();
        let mut children = Vec::new();
        let mut cursor = scopes.get(scope).and_then(|n| n.child_head);
        while let Some(c) = cursor {
            children.push(c);
            cursor = scopes.get(c).and_then(|n| n.scope_next);
        }
        children
    });
    for child in children {
        dispose_scope(child);
    }

    let effects = Runtime::with(|rt| {
        let mut effects = Vec::new();
        let mut cursor = rt.scopes.borrow().get(scope).and_then(|n| n.effect_head);
        while let Some(e) = cursor {
            effects.push(e);
            cursor = rt.effect_nodes.borrow().get(e).and_then(|n| n.scope_next);
        }
        effects
    });
    for effect in effects {
        dispose_effect(effect);
    }

    let cleanups = Runtime::with(|rt| {
        rt.scopes.borrow_mut().get_mut(scope).map(|n| std::mem::take(&mut n.cleanups)).unwrap_or_default()
    });
    for cleanup in cleanups {
        cleanup();
    }

    Runtime::with(|rt| {
        if let Some(node) = rt.scopes.borrow_mut().get_mut(scope) {
            node.contexts = None;
            node.state = ScopeState::Disposed;
        }
        // Detach from parent's child list so the parent doesn't walk a
        // disposed scope on its own dispose.
        let (parent, prev, next) = {
            let scopes = rt.scopes.borrow();
            let n = &scopes[scope];
            (n.parent, n.scope_prev, n.scope_next)
        };
        if let Some(parent) = parent {
            let mut scopes = rt.scopes.borrow_mut();
            match prev {
                Some(p) => scopes.get_mut(p).unwrap().scope_next = next,
                None => {
                    if let Some(p) = scopes.get_mut(parent) {
                        p.child_head = next;
                    }
                }
            }
            match next {
                Some(n2) => scopes.get_mut(n2).unwrap().scope_prev = prev,
                None => {
                    if let Some(p) = scopes.get_mut(parent) {
                        p.child_tail = prev;
                    }
                }
            }
        }
    });
}

/// Registers `cb` to run when the currently active scope is disposed. A
/// no-op if there is no active scope (§4.5 edge case: "on_cleanup outside any
/// scope is a warning, not an error").
pub fn on_cleanup(cb: impl FnOnce() + 'static) {
    let attached = Runtime::with(|rt| {
        if let Some(scope) = rt.active_scope.get() {
            if let Some(node) = rt.scopes.borrow_mut().get_mut(scope) {
                node.cleanups.push(Box::new(cb));
                return true;
            }
        }
        false
    });
    if !attached {
        #[cfg(feature = "trace")]
        tracing::warn!(target: "vitarx::reactive::scope", "on_cleanup called outside any effect scope");
    }
}

/// Provides a value of type `T` visible to this scope and its descendants
/// (§4.5 / §4.9 "provide/inject"), shadowing any ancestor value of the same
/// type.
pub fn provide_context<T: 'static>(value: T) {
    Runtime::with(|rt| {
        let Some(scope) = rt.active_scope.get() else { return };
        let mut scopes = rt.scopes.borrow_mut();
        let Some(node) = scopes.get_mut(scope) else { return };
        node.contexts.get_or_insert_with(HashMap::new).insert(TypeId::of::<T>(), Rc::new(value) as Rc<dyn Any>);
    });
}

/// Looks up the nearest ancestor-provided value of type `T`, walking from the
/// active scope up through its parents.
pub fn use_context<T: 'static>() -> Option<Rc<T>> {
    Runtime::with(|rt| {
        let mut cursor = rt.active_scope.get();
        while let Some(scope) = cursor {
            let scopes = rt.scopes.borrow();
            let node = scopes.get(scope)?;
            if let Some(contexts) = &node.contexts {
                if let Some(value) = contexts.get(&TypeId::of::<T>()) {
                    return value.clone().downcast::<T>().ok();
                }
            }
            cursor = node.parent;
        }
        None
    })
}

/// Like [`use_context`], but provides `init()` on the active scope and
/// returns it if no ancestor already has one (teacher: `context.rs`'s
/// `use_context_or_else`).
pub fn use_context_or_else<T: 'static>(init: impl FnOnce() -> T) -> Rc<T> {
    if let Some(value) = use_context::<T>() {
        return value;
    }
    let value = Rc::new(init());
    Runtime::with(|rt| {
        let Some(scope) = rt.active_scope.get() else { return };
        let mut scopes = rt.scopes.borrow_mut();
        let Some(node) = scopes.get_mut(scope) else { return };
        node.contexts.get_or_insert_with(HashMap::new).insert(TypeId::of::<T>(), value.clone() as Rc<dyn Any>);
    });
    value
}

#[allow(dead_code)]
pub(crate) fn current_scope() -> Option<ScopeKey> {
    Runtime::with(|rt| rt.active_scope.get())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::__reset_runtime_for_tests;

    #[test]
    fn child_scope_disposed_with_parent() {
        __reset_runtime_for_tests();
        let parent = EffectScope::new(false);
        let child = parent.run(|| EffectScope::new(false));
        parent.dispose().unwrap();
        assert!(child.is_disposed());
    }

    #[test]
    fn disposing_twice_reports_scope_disposed() {
        __reset_runtime_for_tests();
        let scope = EffectScope::new(false);
        scope.dispose().unwrap();
        assert_eq!(scope.dispose(), Err(crate::error::ScopeError::ScopeDisposed));
    }

    #[test]
    fn try_run_on_a_disposed_scope_reports_scope_disposed() {
        __reset_runtime_for_tests();
        let scope = EffectScope::new(false);
        scope.dispose().unwrap();
        assert_eq!(scope.try_run(|| 1).err(), Some(crate::error::ScopeError::ScopeDisposed));
    }

    #[test]
    fn cleanup_runs_on_dispose() {
        __reset_runtime_for_tests();
        let ran = Rc::new(Cell::new(false));
        let ran2 = ran.clone();
        let scope = EffectScope::new(false);
        scope.run(|| on_cleanup(move || ran2.set(true)));
        assert!(!ran.get());
        scope.dispose().unwrap();
        assert!(ran.get());
    }

    #[test]
    fn context_walks_parent_chain() {
        __reset_runtime_for_tests();
        let parent = EffectScope::new(false);
        parent.run(|| provide_context(42i32));
        let child = parent.run(|| EffectScope::new(false));
        let found = child.run(|| use_context::<i32>());
        assert_eq!(found.map(|rc| *rc), Some(42));
    }

    #[test]
    fn context_shadows_ancestor() {
        __reset_runtime_for_tests();
        let parent = EffectScope::new(false);
        parent.run(|| provide_context(1i32));
        let child = parent.run(|| EffectScope::new(false));
        child.run(|| provide_context(2i32));
        let found = child.run(|| use_context::<i32>());
        assert_eq!(found.map(|rc| *rc), Some(2));
    }

    #[test]
    fn pause_suppresses_then_resume_catches_up() {
        __reset_runtime_for_tests();
        let runs = Rc::new(Cell::new(0));
        let runs2 = runs.clone();
        let scope = EffectScope::new(false);
        let effect = scope.run(|| create_effect_node(Some(Box::new(move || runs2.set(runs2.get() + 1)))));
        scope.pause();
        run_effect_if_alive(effect);
        assert_eq!(runs.get(), 0);
        scope.resume();
        assert_eq!(runs.get(), 1, "resume must replay a missed run");
    }
}
