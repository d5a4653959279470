//! The process-wide (thread-local) reactive runtime.
//!
//! Grounded on the teacher's `Root` (`sycamore-reactive/src/root.rs`): a single
//! leaked, thread-local struct holding every arena the reactive graph needs,
//! with `current_node`/`tracker` stacks swapped in and out via `Cell::replace`.
//! Unlike the teacher's single unified `SlotMap<NodeId, ReactiveNode>`, this
//! keeps separate arenas for signals, effects, links and scopes so that the
//! dep-graph (C1) can expose the explicit doubly linked `DepLink` shape spec'd
//! in DATA MODEL, following the "arena of fixed-size records, referenced by
//! index" recipe from the spec's own Design Notes (§9).

use std::cell::{Cell, RefCell};

use slotmap::SlotMap;

use crate::graph::{DepLink, LinkKey, SignalNode};
use crate::scheduler::Scheduler;
use crate::scope::{EffectKey, EffectNode, ScopeKey, ScopeNode};

slotmap::new_key_type! {
    /// Stable identity for a signal (§3 DATA MODEL: "a stable identity").
    pub struct SignalKey;
}

pub(crate) struct Runtime {
    pub signal_nodes: RefCell<SlotMap<SignalKey, SignalNode>>,
    pub effect_nodes: RefCell<SlotMap<EffectKey, EffectNode>>,
    pub links: RefCell<SlotMap<LinkKey, DepLink>>,
    pub scopes: RefCell<SlotMap<ScopeKey, ScopeNode>>,
    pub active_effect: Cell<Option<EffectKey>>,
    pub active_scope: Cell<Option<ScopeKey>>,
    pub scheduler: Scheduler,
}

thread_local! {
    static RUNTIME: Runtime = Runtime::new();
}

impl Runtime {
    fn new() -> Self {
        Self {
            signal_nodes: RefCell::new(SlotMap::with_key()),
            effect_nodes: RefCell::new(SlotMap::with_key()),
            links: RefCell::new(SlotMap::with_key()),
            scopes: RefCell::new(SlotMap::with_key()),
            active_effect: Cell::new(None),
            active_scope: Cell::new(None),
            scheduler: Scheduler::new(),
        }
    }

    /// Run `f` with shared access to the thread-local runtime.
    pub(crate) fn with<R>(f: impl FnOnce(&Runtime) -> R) -> R {
        RUNTIME.with(f)
    }
}

/// Resets all reactive state on the current thread. Intended for test isolation
/// between independent scenarios (the teacher's `Root::reinit` plays the same
/// role for its own tests).
#[doc(hidden)]
pub fn __reset_runtime_for_tests() {
    Runtime::with(|rt| {
        rt.signal_nodes.borrow_mut().clear();
        rt.effect_nodes.borrow_mut().clear();
        rt.links.borrow_mut().clear();
        rt.scopes.borrow_mut().clear();
        rt.active_effect.set(None);
        rt.active_scope.set(None);
        rt.scheduler.clear();
    });
}
