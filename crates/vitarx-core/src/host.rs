//! The host-driver abstraction (component C10's rendering backend contract).
//!
//! Grounded on the teacher's [`GenericNode`] trait
//! (`sycamore-core/src/generic_node.rs`): this crate ships no concrete DOM
//! backend, only the contract a host (a browser DOM binding, a terminal UI,
//! a test harness) implements so the renderer can patch against it without
//! knowing what "a node" actually is.

use std::fmt::Debug;
use std::hash::Hash;

/// A host-tree node handle. Implementors are expected to be cheap to clone
/// (an `Rc`-backed id or a raw handle) and preserve reference equality, the
/// same contract the teacher documents on `GenericNode`.
pub trait HostNode: Debug + Clone + PartialEq + Eq + Hash + 'static {}

impl<T: Debug + Clone + PartialEq + Eq + Hash + 'static> HostNode for T {}

/// Everything the renderer (component C10) needs from a rendering backend.
pub trait HostDriver: 'static {
    type Node: HostNode;

    fn create_element(&self, tag: &str) -> Self::Node;
    fn create_text(&self, text: &str) -> Self::Node;
    fn create_placeholder(&self) -> Self::Node;

    fn set_text(&self, node: &Self::Node, text: &str);
    fn set_attribute(&self, node: &Self::Node, name: &str, value: &str);
    fn remove_attribute(&self, node: &Self::Node, name: &str);

    fn append_child(&self, parent: &Self::Node, child: &Self::Node);
    fn insert_before(&self, parent: &Self::Node, child: &Self::Node, reference: Option<&Self::Node>);
    fn remove_child(&self, parent: &Self::Node, child: &Self::Node);
    fn replace_child(&self, parent: &Self::Node, old: &Self::Node, new: &Self::Node);

    fn parent_node(&self, node: &Self::Node) -> Option<Self::Node>;
    fn next_sibling(&self, node: &Self::Node) -> Option<Self::Node>;
}
