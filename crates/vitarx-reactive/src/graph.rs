//! The dependency graph (component C1).
//!
//! A signal and an effect are linked by a `DepLink`, an arena record that sits
//! on two intrusive doubly linked lists at once: the list of links hanging off
//! a signal (its subscribers) and the list of links hanging off an effect (its
//! dependencies). This is the "arena of index-referenced doubly linked
//! records" recipe spec'd in Design Notes §9, rather than the teacher's own
//! `HashSet<SignalId>`/`IndexMap` membership lists (`effect.rs::EffectState`,
//! `signal.rs::SignalData`) — those don't give O(1) unlink-by-handle, which
//! the invariants here require.

use std::collections::HashMap;

use slotmap::SlotMap;

use crate::runtime::{Runtime, SignalKey};
use crate::scope::EffectKey;

slotmap::new_key_type! {
    /// Handle to one signal-effect subscription edge.
    pub struct LinkKey;
}

#[derive(Debug)]
pub(crate) struct SignalNode {
    pub effect_head: Option<LinkKey>,
    pub effect_tail: Option<LinkKey>,
}

impl SignalNode {
    pub fn new() -> Self {
        Self { effect_head: None, effect_tail: None }
    }
}

#[derive(Debug)]
pub(crate) struct DepLink {
    pub signal: SignalKey,
    pub effect: EffectKey,
    pub prev_on_signal: Option<LinkKey>,
    pub next_on_signal: Option<LinkKey>,
    pub prev_on_effect: Option<LinkKey>,
    pub next_on_effect: Option<LinkKey>,
    /// Snapshot of the owning effect's `dep_version` at the moment this link
    /// was (re)used. Stale links (version < the effect's current version)
    /// left over from a re-run are pruned by `end_tracking`.
    pub dep_version: u64,
}

/// Allocates a signal identity with no subscribers yet.
pub(crate) fn create_signal() -> SignalKey {
    Runtime::with(|rt| rt.signal_nodes.borrow_mut().insert(SignalNode::new()))
}

/// Removes a signal's node, unlinking every subscription that still
/// references it. Called when a signal's owning handle is dropped for good
/// (the facade types never currently call this today — signals live for the
/// process in line with the teacher's own leaked `Root` arena — but the
/// invariant ("links are cleaned when either side is disposed") is exercised
/// by scope disposal on the effect side).
#[allow(dead_code)]
pub(crate) fn destroy_signal(signal: SignalKey) {
    Runtime::with(|rt| {
        let head = rt.signal_nodes.borrow().get(signal).map(|n| n.effect_head);
        let Some(mut cursor) = head.flatten() else {
            rt.signal_nodes.borrow_mut().remove(signal);
            return;
        };
        loop {
            let next = rt.links.borrow().get(cursor).and_then(|l| l.next_on_signal);
            unlink(cursor);
            match next {
                Some(n) => cursor = n,
                None => break,
            }
        }
        rt.signal_nodes.borrow_mut().remove(signal);
    });
}

/// Links `effect` as a subscriber of `signal`, or refreshes an existing link's
/// `dep_version` if one is already present in the effect's dependency index.
/// Idempotent re-subscription within the same tracking pass is what keeps
/// "effect re-subscribes to the same signal every run" cheap (§3 edge case).
pub(crate) fn link(signal: SignalKey, effect: EffectKey, dep_version: u64) {
    Runtime::with(|rt| {
        let existing = rt
            .effect_nodes
            .borrow()
            .get(effect)
            .and_then(|e| e.index.as_ref().and_then(|ix| ix.get(&signal).copied()));
        if let Some(link_key) = existing {
            rt.links.borrow_mut().get_mut(link_key).unwrap().dep_version = dep_version;
            return;
        }

        let link_key = rt.links.borrow_mut().insert(DepLink {
            signal,
            effect,
            prev_on_signal: None,
            next_on_signal: None,
            prev_on_effect: None,
            next_on_effect: None,
            dep_version,
        });

        {
            let mut signals = rt.signal_nodes.borrow_mut();
            let node = signals.get_mut(signal).expect("signal node must exist");
            let old_tail = node.effect_tail;
            if let Some(tail) = old_tail {
                rt.links.borrow_mut().get_mut(tail).unwrap().next_on_signal = Some(link_key);
            } else {
                node.effect_head = Some(link_key);
            }
            rt.links.borrow_mut().get_mut(link_key).unwrap().prev_on_signal = old_tail;
            node.effect_tail = Some(link_key);
        }

        {
            let mut effects = rt.effect_nodes.borrow_mut();
            let node = effects.get_mut(effect).expect("effect node must exist");
            let old_tail = node.signal_tail;
            if let Some(tail) = old_tail {
                rt.links.borrow_mut().get_mut(tail).unwrap().next_on_effect = Some(link_key);
            } else {
                node.signal_head = Some(link_key);
            }
            rt.links.borrow_mut().get_mut(link_key).unwrap().prev_on_effect = old_tail;
            node.signal_tail = Some(link_key);
            node.index.get_or_insert_with(HashMap::new).insert(signal, link_key);
        }
    });
}

/// Removes a single link from both lists it belongs to. Internal helper used
/// by both `destroy_signal` and `end_tracking`'s stale-link sweep.
fn unlink(link_key: LinkKey) {
    Runtime::with(|rt| {
        let link = rt.links.borrow_mut().remove(link_key);
        let Some(link) = link else { return };

        {
            let mut signals = rt.signal_nodes.borrow_mut();
            if let Some(node) = signals.get_mut(link.signal) {
                match link.prev_on_signal {
                    Some(prev) => rt.links.borrow_mut().get_mut(prev).unwrap().next_on_signal = link.next_on_signal,
                    None => node.effect_head = link.next_on_signal,
                }
                match link.next_on_signal {
                    Some(next) => rt.links.borrow_mut().get_mut(next).unwrap().prev_on_signal = link.prev_on_signal,
                    None => node.effect_tail = link.prev_on_signal,
                }
            }
        }

        {
            let mut effects = rt.effect_nodes.borrow_mut();
            if let Some(node) = effects.get_mut(link.effect) {
                match link.prev_on_effect {
                    Some(prev) => rt.links.borrow_mut().get_mut(prev).unwrap().next_on_effect = link.next_on_effect,
                    None => node.signal_head = link.next_on_effect,
                }
                match link.next_on_effect {
                    Some(next) => rt.links.borrow_mut().get_mut(next).unwrap().prev_on_effect = link.prev_on_effect,
                    None => node.signal_tail = link.prev_on_effect,
                }
                if let Some(ix) = node.index.as_mut() {
                    ix.remove(&link.signal);
                }
            }
        }
    });
}

/// Drops every link on an effect's dependency list. Called when an effect is
/// disposed (§4.5) or immediately before it re-runs and rebuilds its deps from
/// scratch via the version-stamp sweep in `end_tracking`.
pub(crate) fn clear_effect_links(effect: EffectKey) {
    loop {
        let head = Runtime::with(|rt| rt.effect_nodes.borrow().get(effect).and_then(|n| n.signal_head));
        match head {
            Some(link_key) => unlink(link_key),
            None => break,
        }
    }
}

/// Removes links on `effect`'s dependency list whose `dep_version` is older
/// than `current_version` — the ones that weren't re-touched during the most
/// recent run, i.e. dependencies that disappeared (§3: "An effect's dependency
/// set is exactly the signals read during its most recent run").
pub(crate) fn prune_stale_links(effect: EffectKey, current_version: u64) {
    let mut cursor = Runtime::with(|rt| rt.effect_nodes.borrow().get(effect).and_then(|n| n.signal_head));
    while let Some(link_key) = cursor {
        let (next, stale) = Runtime::with(|rt| {
            let links = rt.links.borrow();
            let l = &links[link_key];
            (l.next_on_effect, l.dep_version < current_version)
        });
        if stale {
            unlink(link_key);
        }
        cursor = next;
    }
}

/// Triggers every effect currently subscribed to `signal` by handing each one
/// to `sink`. The caller (tracker/signal layer) decides whether that means
/// "mark dirty and schedule" or "run synchronously" per effect kind.
pub(crate) fn for_each_subscriber(signal: SignalKey, mut sink: impl FnMut(EffectKey)) {
    let mut cursor = Runtime::with(|rt| rt.signal_nodes.borrow().get(signal).map(|n| n.effect_head)).flatten();
    while let Some(link_key) = cursor {
        let (effect, next) = Runtime::with(|rt| {
            let links = rt.links.borrow();
            let l = &links[link_key];
            (l.effect, l.next_on_signal)
        });
        sink(effect);
        cursor = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::__reset_runtime_for_tests;
    use crate::scope::{create_effect_node, dispose_effect};

    #[test]
    fn link_and_trigger() {
        __reset_runtime_for_tests();
        let s = create_signal();
        let e = create_effect_node(None);
        link(s, e, 1);
        let mut seen = Vec::new();
        for_each_subscriber(s, |eff| seen.push(eff));
        assert_eq!(seen, vec![e]);
        dispose_effect(e);
    }

    #[test]
    fn relink_same_signal_is_idempotent() {
        __reset_runtime_for_tests();
        let s = create_signal();
        let e = create_effect_node(None);
        link(s, e, 1);
        link(s, e, 2);
        let count = Runtime::with(|rt| {
            let mut n = 0;
            let mut cursor = rt.signal_nodes.borrow().get(s).unwrap().effect_head;
            while let Some(lk) = cursor {
                n += 1;
                cursor = rt.links.borrow()[lk].next_on_signal;
            }
            n
        });
        assert_eq!(count, 1, "re-subscribing to the same signal must not duplicate the link");
        dispose_effect(e);
    }

    #[test]
    fn prune_stale_links_drops_old_dependency() {
        __reset_runtime_for_tests();
        let a = create_signal();
        let b = create_signal();
        let e = create_effect_node(None);
        link(a, e, 1);
        link(b, e, 1);
        // Second run only touches `b`.
        link(b, e, 2);
        prune_stale_links(e, 2);
        let mut seen = Vec::new();
        for_each_subscriber(a, |eff| seen.push(eff));
        assert!(seen.is_empty(), "dependency dropped on re-run must be unlinked");
        let mut seen_b = Vec::new();
        for_each_subscriber(b, |eff| seen_b.push(eff));
        assert_eq!(seen_b, vec![e]);
        dispose_effect(e);
    }
}
