//! The VNode model (component C8).
//!
//! `ShapeFlag` and the explicit node lifecycle state machine are spec'd
//! directly (they have no teacher analogue — sycamore has no VDOM, it
//! patches the host tree straight from reactive closures, per
//! `sycamore-core/src/render.rs`). Props normalization and the
//! `AttributeValue` variants are grounded on the teacher's
//! `component.rs::{Attributes, AttributeValue}`, generalized from "attribute
//! on a DOM element" to "prop on any VNode".

use hashbrown::HashMap;
use std::any::Any;
use std::cell::RefCell;
use std::rc::Rc;

use crate::host::HostDriver;
use crate::widget::{WidgetInstance, WidgetSpec};

bitflags::bitflags! {
    /// What kind of content a [`VNode`] represents. Mirrors Vue's shapeFlag
    /// bitmask so reconciliation can dispatch on node kind with one integer
    /// compare instead of matching an enum discriminant for every child.
    #[derive(Clone, Copy, PartialEq, Eq)]
    pub struct ShapeFlag: u16 {
        const ELEMENT = 1 << 0;
        const TEXT = 1 << 1;
        const FRAGMENT = 1 << 2;
        const WIDGET = 1 << 3;
        const TEXT_CHILDREN = 1 << 4;
        const ARRAY_CHILDREN = 1 << 5;
        const KEYED_CHILDREN = 1 << 6;
    }
}

/// A normalized prop value (§4.8), grounded on the teacher's
/// `component.rs::AttributeValue`.
#[derive(Clone)]
pub enum PropValue {
    Str(Rc<str>),
    Bool(bool),
    Number(f64),
    /// An event handler bound with `on:event_name`.
    Handler(Rc<dyn Fn(&str)>),
    /// Arbitrary typed data passed straight through to a widget (class
    /// widgets downcast it; elements never see this variant survive
    /// normalization).
    Opaque(Rc<dyn std::any::Any>),
}

#[derive(Clone, Default)]
pub struct Props {
    entries: Rc<HashMap<Rc<str>, PropValue>>,
}

impl Props {
    pub fn new(entries: HashMap<Rc<str>, PropValue>) -> Self {
        Self { entries: Rc::new(entries) }
    }

    pub fn get(&self, key: &str) -> Option<&PropValue> {
        self.entries.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Merges `other` over `self` (v-bind spread semantics: later keys win,
    /// §4.8 edge case: "merging two prop sets, the later one wins per key").
    pub fn merged_over(&self, other: &Props) -> Props {
        let mut merged = (*self.entries).clone();
        for (key, value) in other.entries.iter() {
            merged.insert(key.clone(), value.clone());
        }
        Props::new(merged)
    }
}

/// A VNode's content payload, discriminated redundantly by [`ShapeFlag`] so
/// the renderer can branch on the flag alone during the hot diff path.
pub enum VNodeKind<D: HostDriver> {
    Element { tag: Rc<str>, props: Props, children: Vec<VNode<D>> },
    Text(Rc<str>),
    Fragment(Vec<VNode<D>>),
    Widget { spec: Rc<WidgetSpec<D>>, props: Props },
}

/// A cell the renderer fills in with the live host node once a VNode with a
/// `ref` binding mounts, and clears on unmount (§4.8: `ref`). Cloning shares
/// the same cell, mirroring a template ref handed out to calling code.
#[derive(Clone)]
pub struct NodeRef<D: HostDriver>(Rc<RefCell<Option<D::Node>>>);

impl<D: HostDriver> NodeRef<D> {
    pub fn new() -> Self {
        Self(Rc::new(RefCell::new(None)))
    }

    pub fn get(&self) -> Option<D::Node> {
        self.0.borrow().clone()
    }

    pub(crate) fn set(&self, node: Option<D::Node>) {
        *self.0.borrow_mut() = node;
    }
}

impl<D: HostDriver> Default for NodeRef<D> {
    fn default() -> Self {
        Self::new()
    }
}

/// A custom directive attached to a VNode (§4.8: `directives`), grounded on
/// the teacher's attribute-binding hooks but generalized to its own
/// mounted/unmounted pair rather than piggybacking on `set_attribute`.
pub trait Directive<D: HostDriver> {
    fn mounted(&self, _node: &D::Node, _value: &dyn Any) {}
    fn unmounted(&self, _node: &D::Node, _value: &dyn Any) {}
}

/// One `name`+value binding of a [`Directive`] to a particular VNode.
#[derive(Clone)]
pub struct DirectiveBinding<D: HostDriver> {
    pub name: Rc<str>,
    pub directive: Rc<dyn Directive<D>>,
    pub value: Rc<dyn Any>,
}

/// The lifecycle state machine a mounted VNode instance moves through
/// (§4.8 DATA MODEL): `Created -> Rendered -> Activated <-> Deactivated ->
/// Unmounted`. `Deactivated` is for `<KeepAlive>`-style subtrees kept around
/// without being live; everything else tears down fully on unmount.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeLifecycle {
    Created,
    Rendered,
    Activated,
    Deactivated,
    Unmounted,
}

impl NodeLifecycle {
    /// Whether `self -> next` is a legal lifecycle transition.
    pub fn can_transition_to(self, next: NodeLifecycle) -> bool {
        use NodeLifecycle::*;
        matches!(
            (self, next),
            (Created, Rendered)
                | (Rendered, Activated)
                | (Rendered, Unmounted)
                | (Activated, Deactivated)
                | (Activated, Unmounted)
                | (Deactivated, Activated)
                | (Deactivated, Unmounted)
        )
    }
}

pub struct VNode<D: HostDriver> {
    pub key: Option<Rc<str>>,
    pub shape: ShapeFlag,
    pub kind: VNodeKind<D>,
    pub lifecycle: NodeLifecycle,
    /// The host node this VNode is mounted to, once rendered.
    pub host: Option<D::Node>,
    /// Filled in (and cleared) by the renderer as this node mounts/unmounts,
    /// giving calling code a handle to the live host node (§4.8: `ref`).
    pub node_ref: Option<NodeRef<D>>,
    /// Custom directives bound to this node (§4.8: `directives`).
    pub directives: Vec<DirectiveBinding<D>>,
    /// The [`WidgetInstance`] that produced this node, set only for
    /// `VNodeKind::Widget` nodes once mounted (§4.8: `ownerWidget`). This is
    /// what lets the renderer call back into `WidgetInstance::build`/dispose
    /// for a widget nested inside another widget's own output, rather than
    /// reducing it to an inert placeholder.
    pub owner_widget: Option<Rc<WidgetInstance<D>>>,
    /// A placeholder host node kept in the live tree in place of `host`
    /// while this node is [`NodeLifecycle::Deactivated`], so the renderer can
    /// restore `host` at the same position on reactivation (§4.8: `anchor`).
    pub anchor: Option<D::Node>,
}

impl<D: HostDriver> VNode<D> {
    pub fn element(tag: impl Into<Rc<str>>, props: Props, children: Vec<VNode<D>>) -> Self {
        let keyed = children.iter().any(|c| c.key.is_some());
        let mut shape = ShapeFlag::ELEMENT;
        shape |= if children.is_empty() {
            ShapeFlag::empty()
        } else if keyed {
            ShapeFlag::KEYED_CHILDREN
        } else {
            ShapeFlag::ARRAY_CHILDREN
        };
        Self::new(shape, VNodeKind::Element { tag: tag.into(), props, children })
    }

    pub fn text(value: impl Into<Rc<str>>) -> Self {
        Self::new(ShapeFlag::TEXT, VNodeKind::Text(value.into()))
    }

    pub fn fragment(children: Vec<VNode<D>>) -> Self {
        Self::new(ShapeFlag::FRAGMENT, VNodeKind::Fragment(children))
    }

    pub fn widget(spec: Rc<WidgetSpec<D>>, props: Props) -> Self {
        Self::new(ShapeFlag::WIDGET, VNodeKind::Widget { spec, props })
    }

    fn new(shape: ShapeFlag, kind: VNodeKind<D>) -> Self {
        Self {
            key: None,
            shape,
            kind,
            lifecycle: NodeLifecycle::Created,
            host: None,
            node_ref: None,
            directives: Vec::new(),
            owner_widget: None,
            anchor: None,
        }
    }

    pub fn with_key(mut self, key: impl Into<Rc<str>>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn with_ref(mut self, node_ref: NodeRef<D>) -> Self {
        self.node_ref = Some(node_ref);
        self
    }

    pub fn with_directive(mut self, binding: DirectiveBinding<D>) -> Self {
        self.directives.push(binding);
        self
    }

    /// Attempts `self.lifecycle -> next`, panicking on an illegal transition
    /// (§4.8 invariant: "lifecycle transitions outside the documented graph
    /// are a bug, not a recoverable condition").
    pub fn transition(&mut self, next: NodeLifecycle) {
        assert!(
            self.lifecycle.can_transition_to(next),
            "illegal vnode lifecycle transition: {:?} -> {:?}",
            self.lifecycle,
            next
        );
        self.lifecycle = next;
    }

    pub fn children(&self) -> &[VNode<D>] {
        match &self.kind {
            VNodeKind::Element { children, .. } => children,
            VNodeKind::Fragment(children) => children,
            _ => &[],
        }
    }

    /// Takes ownership of this node's children, leaving an empty `Vec` in
    /// their place. Used by the renderer to recurse into a subtree it's
    /// about to drop.
    pub(crate) fn children_owned(&mut self) -> Vec<VNode<D>> {
        match &mut self.kind {
            VNodeKind::Element { children, .. } => std::mem::take(children),
            VNodeKind::Fragment(children) => std::mem::take(children),
            _ => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_graph_rejects_skipping_rendered() {
        assert!(!NodeLifecycle::Created.can_transition_to(NodeLifecycle::Activated));
        assert!(NodeLifecycle::Created.can_transition_to(NodeLifecycle::Rendered));
    }

    #[test]
    fn lifecycle_graph_allows_deactivate_reactivate_cycle() {
        assert!(NodeLifecycle::Activated.can_transition_to(NodeLifecycle::Deactivated));
        assert!(NodeLifecycle::Deactivated.can_transition_to(NodeLifecycle::Activated));
    }

    #[test]
    fn props_merge_prefers_later_entries() {
        let mut a = HashMap::new();
        a.insert(Rc::from("class"), PropValue::Str(Rc::from("a")));
        let base = Props::new(a);
        let mut b = HashMap::new();
        b.insert(Rc::from("class"), PropValue::Str(Rc::from("b")));
        let overlay = Props::new(b);
        let merged = base.merged_over(&overlay);
        match merged.get("class") {
            Some(PropValue::Str(s)) => assert_eq!(&**s, "b"),
            _ => panic!("expected overlay value to win"),
        }
    }
}
