//! The widget runtime (component C9).
//!
//! Each mounted widget owns an [`EffectScope`](vitarx_reactive::EffectScope)
//! so its signals/effects/children are disposed together on unmount — the
//! same ownership idea as the teacher's `component_scope`
//! (`sycamore-core/src/component.rs`), generalized from "a plain closure
//! that returns a `View`" to class widgets with lifecycle hooks plus async
//! factory widgets. `onMounted`/`onUnmounted`-style hooks are captured via a
//! thread-local "currently building" context, mirroring how the teacher's
//! `create_ref`/`on_cleanup` rely on "the currently active scope" rather
//! than threading a context object through every call site.

use std::cell::{Cell, RefCell};
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;

use vitarx_reactive::{on_cleanup, EffectScope};

use crate::error::RenderError;
use crate::host::HostDriver;
use crate::vnode::{Props, VNode};

/// A class-style widget: stateful, with lifecycle hooks invoked by the
/// widget runtime as the instance moves through
/// [`crate::vnode::NodeLifecycle`].
pub trait Widget<D: HostDriver> {
    fn build(&self, props: &Props) -> VNode<D>;
    fn on_mounted(&self) {}
    fn on_unmounted(&self) {}
    /// Called after a re-render caused by one of the widget's own
    /// dependencies changing (§4.9: "update hook").
    fn on_updated(&self) {}
    /// Called on the nearest ancestor class widget when a descendant panics
    /// while building (§4.9 item 7 / §6 `onError`). Returning `Some(vnode)`
    /// renders `vnode` in the failed descendant's slot instead of letting the
    /// panic keep unwinding; the default declines, so it propagates to the
    /// next ancestor with an `on_error` override (or to the app root).
    fn on_error(&self, _err: &RenderError) -> Option<VNode<D>> {
        None
    }
}

type ClassFactory<D> = Rc<dyn Fn() -> Box<dyn Widget<D>>>;
type FnWidget<D> = Rc<dyn Fn(&Props) -> VNode<D>>;
type AsyncFnWidget<D> = Rc<dyn Fn(Props) -> Pin<Box<dyn Future<Output = VNode<D>>>>>;

/// What a [`crate::vnode::VNodeKind::Widget`] actually instantiates.
pub enum WidgetSpec<D: HostDriver> {
    Class(ClassFactory<D>),
    Function(FnWidget<D>),
    /// A function widget whose body is a `Future`; the widget runtime mounts
    /// a placeholder and swaps it in once the future resolves (§4.9 item 2,
    /// tracked by the app-wide suspense counter in [`suspense`]).
    AsyncFunction(AsyncFnWidget<D>),
}

impl<D: HostDriver> WidgetSpec<D> {
    pub fn from_function(f: impl Fn(&Props) -> VNode<D> + 'static) -> Self {
        WidgetSpec::Function(Rc::new(f))
    }

    pub fn from_class<W: Widget<D> + 'static>(factory: impl Fn() -> W + 'static) -> Self {
        WidgetSpec::Class(Rc::new(move || Box::new(factory()) as Box<dyn Widget<D>>))
    }

    pub fn from_async_function<F>(f: impl Fn(Props) -> F + 'static) -> Self
    where
        F: Future<Output = VNode<D>> + 'static,
    {
        WidgetSpec::AsyncFunction(Rc::new(move |props| Box::pin(f(props)) as Pin<Box<dyn Future<Output = VNode<D>>>>))
    }
}

thread_local! {
    /// The lifecycle-hook sink for whichever widget is currently being
    /// built. `on_mount`/`on_unmount` push into it; `WidgetInstance::mount`
    /// swaps it in/out around the `build()` call.
    static HOOKS: RefCell<Option<HookSink>> = RefCell::new(None);
}

#[derive(Default)]
struct HookSink {
    on_mount: Vec<Box<dyn FnOnce()>>,
}

/// Registers `f` to run once this widget finishes mounting (§4.9 hook).
/// A no-op (with a debug warning) outside of a widget's `build()` call.
pub fn on_mount(f: impl FnOnce() + 'static) {
    let attached = HOOKS.with(|hooks| {
        if let Some(sink) = hooks.borrow_mut().as_mut() {
            sink.on_mount.push(Box::new(f));
            true
        } else {
            false
        }
    });
    if !attached {
        #[cfg(feature = "trace")]
        tracing::warn!(target: "vitarx::core::widget", "on_mount called outside widget construction");
    }
}

/// Registers `f` to run when this widget's scope is disposed (§4.9 hook).
/// Thin alias over [`vitarx_reactive::on_cleanup`] for symmetry with
/// [`on_mount`].
pub fn on_unmount(f: impl FnOnce() + 'static) {
    on_cleanup(f);
}

/// A live widget instance: its own effect scope plus the VNode subtree it
/// last produced.
pub struct WidgetInstance<D: HostDriver> {
    scope: EffectScope,
    spec: Rc<WidgetSpec<D>>,
    widget: RefCell<Option<Box<dyn Widget<D>>>>,
    /// The subtree returned by the most recent `build()`, once the renderer
    /// has turned it into host nodes. Lets a later patch pass diff the new
    /// `build()` output against what's actually mounted (review: nested
    /// widget instances need somewhere to keep their rendered content).
    rendered: RefCell<Option<VNode<D>>>,
}

impl<D: HostDriver> WidgetInstance<D> {
    pub fn new(spec: Rc<WidgetSpec<D>>) -> Self {
        Self { scope: EffectScope::new(false), spec, widget: RefCell::new(None), rendered: RefCell::new(None) }
    }

    pub(crate) fn set_rendered(&self, node: VNode<D>) {
        *self.rendered.borrow_mut() = Some(node);
    }

    pub(crate) fn take_rendered(&self) -> Option<VNode<D>> {
        self.rendered.borrow_mut().take()
    }

    /// Asks this instance's widget (if it's a class widget) to recover from
    /// an error raised while building one of its descendants. Function and
    /// async-function widgets have no instance state to call a hook on, so
    /// they never handle errors — the panic keeps propagating past them to
    /// the next class-widget ancestor.
    pub(crate) fn widget_on_error(&self, err: &RenderError) -> Option<VNode<D>> {
        if !matches!(&*self.spec, WidgetSpec::Class(_)) {
            return None;
        }
        self.widget.borrow().as_ref()?.on_error(err)
    }

    /// Builds (or rebuilds) the widget's subtree inside its own scope,
    /// running any `on_mount` hooks registered during the very first build.
    pub fn build(&self, props: &Props) -> VNode<D> {
        let first_build = self.widget.borrow().is_none();
        let sink = RefCell::new(Some(HookSink::default()));
        let node = self.scope.run(|| {
            HOOKS.with(|hooks| *hooks.borrow_mut() = sink.borrow_mut().take());
            let result = match &*self.spec {
                WidgetSpec::Function(f) => f(props),
                WidgetSpec::AsyncFunction(_) => {
                    panic!("async function widgets must be driven through `mount_async`, not `build`")
                }
                WidgetSpec::Class(factory) => {
                    if first_build {
                        *self.widget.borrow_mut() = Some(factory());
                    }
                    self.widget.borrow().as_ref().unwrap().build(props)
                }
            };
            let collected = HOOKS.with(|hooks| hooks.borrow_mut().take());
            *sink.borrow_mut() = collected;
            result
        });

        if let Some(sink) = sink.into_inner() {
            if first_build {
                for hook in sink.on_mount {
                    hook();
                }
                if let WidgetSpec::Class(_) = &*self.spec {
                    if let Some(widget) = self.widget.borrow().as_ref() {
                        widget.on_mounted();
                    }
                }
            } else if let WidgetSpec::Class(_) = &*self.spec {
                if let Some(widget) = self.widget.borrow().as_ref() {
                    widget.on_updated();
                }
            }
        }

        node
    }

    pub fn unmount(&self) {
        if let WidgetSpec::Class(_) = &*self.spec {
            if let Some(widget) = self.widget.borrow().as_ref() {
                widget.on_unmounted();
            }
        }
        let _ = self.scope.dispose();
    }
}

/// Tracks how many in-flight async factory widgets are still pending
/// (§4.9 item 2). A host can poll [`pending_count`] to know whether to show
/// a suspense fallback.
pub mod suspense {
    use super::Cell;

    thread_local! {
        static PENDING: Cell<u32> = Cell::new(0);
    }

    pub(crate) struct Guard;

    impl Guard {
        pub(crate) fn enter() -> Self {
            PENDING.with(|p| p.set(p.get() + 1));
            Guard
        }
    }

    impl Drop for Guard {
        fn drop(&mut self) {
            PENDING.with(|p| p.set(p.get().saturating_sub(1)));
        }
    }

    pub fn pending_count() -> u32 {
        PENDING.with(|p| p.get())
    }
}

/// Awaits an async function widget's future, bumping the suspense counter
/// for its duration, and returns the resulting subtree.
pub async fn mount_async<D: HostDriver>(spec: &WidgetSpec<D>, props: Props) -> VNode<D> {
    let WidgetSpec::AsyncFunction(f) = spec else {
        panic!("mount_async called with a non-async widget spec");
    };
    let _guard = suspense::Guard::enter();
    f(props).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::HostDriver;

    #[derive(Debug, Clone, PartialEq, Eq, Hash)]
    struct FakeNode(u32);

    struct FakeHost;
    impl HostDriver for FakeHost {
        type Node = FakeNode;
        fn create_element(&self, _tag: &str) -> Self::Node {
            FakeNode(0)
        }
        fn create_text(&self, _text: &str) -> Self::Node {
            FakeNode(0)
        }
        fn create_placeholder(&self) -> Self::Node {
            FakeNode(0)
        }
        fn set_text(&self, _node: &Self::Node, _text: &str) {}
        fn set_attribute(&self, _node: &Self::Node, _name: &str, _value: &str) {}
        fn remove_attribute(&self, _node: &Self::Node, _name: &str) {}
        fn append_child(&self, _parent: &Self::Node, _child: &Self::Node) {}
        fn insert_before(&self, _parent: &Self::Node, _child: &Self::Node, _reference: Option<&Self::Node>) {}
        fn remove_child(&self, _parent: &Self::Node, _child: &Self::Node) {}
        fn replace_child(&self, _parent: &Self::Node, _old: &Self::Node, _new: &Self::Node) {}
        fn parent_node(&self, _node: &Self::Node) -> Option<Self::Node> {
            None
        }
        fn next_sibling(&self, _node: &Self::Node) -> Option<Self::Node> {
            None
        }
    }

    #[test]
    fn on_mount_hook_fires_once_after_first_build() {
        vitarx_reactive::__reset_runtime_for_tests();
        let calls = Rc::new(Cell::new(0));
        let calls2 = calls.clone();
        let spec = Rc::new(WidgetSpec::<FakeHost>::from_function(move |_props| {
            let calls3 = calls2.clone();
            on_mount(move || calls3.set(calls3.get() + 1));
            VNode::text("hi")
        }));
        let instance = WidgetInstance::new(spec);
        instance.build(&Props::default());
        assert_eq!(calls.get(), 1);
        instance.build(&Props::default());
        assert_eq!(calls.get(), 1, "on_mount must not fire again on rebuild");
    }

    #[test]
    fn unmount_disposes_scope_and_calls_hook() {
        vitarx_reactive::__reset_runtime_for_tests();
        let unmounted = Rc::new(Cell::new(false));
        let unmounted2 = unmounted.clone();
        let spec = Rc::new(WidgetSpec::<FakeHost>::from_function(move |_props| {
            let unmounted3 = unmounted2.clone();
            on_unmount(move || unmounted3.set(true));
            VNode::text("hi")
        }));
        let instance = WidgetInstance::new(spec);
        instance.build(&Props::default());
        instance.unmount();
        assert!(unmounted.get());
    }
}
