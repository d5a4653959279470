//! VNode model, widget runtime, renderer and app container built on top of
//! `vitarx-reactive`.
//!
//! Module layout mirrors the teacher's `sycamore-core` package: a host
//! abstraction ([`host`]) generic over the target tree, a VNode model
//! ([`vnode`]), a widget runtime ([`widget`]) that owns an effect scope per
//! instance, a renderer/patch pass ([`render`]), and an app container
//! ([`app`]) tying the root scope, plugin registry and error routing
//! together. No concrete DOM (or other host) backend ships here, same as the
//! teacher's `GenericNode` abstraction — `HostDriver` is the seam a real
//! target implements against.

mod app;
mod error;
mod host;
mod render;
mod vnode;
mod widget;

pub use app::{App, AppConfig, ErrorScope, Plugin};
pub use error::{ErrorSource, RenderError};
pub use host::{HostDriver, HostNode};
pub use render::{deactivate, mount, patch_children, reactivate, unmount};
pub use vnode::{Directive, DirectiveBinding, NodeLifecycle, NodeRef, PropValue, Props, ShapeFlag, VNode, VNodeKind};
pub use widget::{mount_async, on_mount, on_unmount, suspense, Widget, WidgetInstance, WidgetSpec};

/// Re-exports the common entry points in one `use vitarx_core::prelude::*;`.
pub mod prelude {
    pub use crate::{
        deactivate, mount, on_mount, on_unmount, reactivate, unmount, App, AppConfig, Directive, DirectiveBinding,
        ErrorScope, ErrorSource, HostDriver, HostNode, NodeLifecycle, NodeRef, Plugin, PropValue, Props, RenderError,
        ShapeFlag, VNode, VNodeKind, Widget, WidgetInstance, WidgetSpec,
    };
}
