//! Concrete end-to-end reactivity scenarios, exercising `vitarx-reactive`
//! through the facade crate the way a consumer would.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use vitarx::prelude::*;

#[test]
fn basic_signal_reruns_dependent_effect() {
    vitarx_reactive::__reset_runtime_for_tests();
    let count = ValueRef::new(0);
    let seen = Rc::new(RefCell::new(Vec::new()));
    let seen2 = seen.clone();
    let count2 = count.clone();
    let _handle = create_effect(move || {
        seen2.borrow_mut().push(count2.get());
    });
    assert_eq!(*seen.borrow(), vec![0]);
    count.set(1);
    assert_eq!(*seen.borrow(), vec![0, 1]);
}

#[test]
fn write_with_same_value_does_not_rerun_effect() {
    vitarx_reactive::__reset_runtime_for_tests();
    let count = ValueRef::new(5);
    let runs = Rc::new(Cell::new(0));
    let runs2 = runs.clone();
    let count2 = count.clone();
    let _handle = create_effect(move || {
        count2.get();
        runs2.set(runs2.get() + 1);
    });
    assert_eq!(runs.get(), 1);
    count.set(5);
    assert_eq!(runs.get(), 1, "SameValue writes must not trigger subscribers");
}

#[test]
fn batching_coalesces_multiple_writes_into_one_rerun() {
    vitarx_reactive::__reset_runtime_for_tests();
    let a = ValueRef::new(1);
    let b = ValueRef::new(2);
    let runs = Rc::new(Cell::new(0));
    let runs2 = runs.clone();
    let (a2, b2) = (a.clone(), b.clone());
    let _handle = create_effect(move || {
        a2.get();
        b2.get();
        runs2.set(runs2.get() + 1);
    });
    assert_eq!(runs.get(), 1);

    batch(|| {
        a.set(10);
        b.set(20);
    });
    assert_eq!(runs.get(), 2, "batching must coalesce both writes into a single rerun");
}

#[test]
fn computed_is_lazy_until_read_but_still_notifies_dependents() {
    vitarx_reactive::__reset_runtime_for_tests();
    let source = ValueRef::new(1);
    let getter_calls = Rc::new(Cell::new(0));
    let getter_calls2 = getter_calls.clone();
    let source2 = source.clone();
    let doubled = Computed::new(move || {
        getter_calls2.set(getter_calls2.get() + 1);
        source2.get() * 2
    });
    assert_eq!(getter_calls.get(), 0, "constructing a computed must not evaluate its getter yet");
    assert_eq!(doubled.get(), 2);
    assert_eq!(getter_calls.get(), 1);
    assert_eq!(doubled.get(), 2);
    assert_eq!(getter_calls.get(), 1, "a second read with no dependency change must not recompute");

    let downstream_runs = Rc::new(Cell::new(0));
    let downstream_runs2 = downstream_runs.clone();
    let doubled2 = doubled.clone();
    let _handle = create_effect(move || {
        doubled2.get();
        downstream_runs2.set(downstream_runs2.get() + 1);
    });
    assert_eq!(downstream_runs.get(), 1);

    source.set(2);
    assert_eq!(downstream_runs.get(), 2, "an effect depending on a computed must rerun when the computed's source changes");
    assert_eq!(getter_calls.get(), 2, "recomputation only happens once the computed (or its dependent) is actually read");
}

#[test]
fn scope_dispose_tears_down_child_scopes_and_runs_cleanups_in_order() {
    vitarx_reactive::__reset_runtime_for_tests();
    let log = Rc::new(RefCell::new(Vec::new()));

    let parent = EffectScope::new(true);
    parent.run(|| {
        let log1 = log.clone();
        on_cleanup(move || log1.borrow_mut().push("parent-cleanup"));

        let child = EffectScope::new(false);
        child.run(|| {
            let log2 = log.clone();
            on_cleanup(move || log2.borrow_mut().push("child-cleanup"));
        });
    });

    parent.dispose().unwrap();
    // Children are disposed (and their cleanups run) before the parent's own
    // cleanups, matching the documented dispose order.
    assert_eq!(*log.borrow(), vec!["child-cleanup", "parent-cleanup"]);
    assert!(parent.is_disposed());
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct FakeNode(u32);

struct FakeHost {
    next_id: Cell<u32>,
}

impl FakeHost {
    fn new() -> Self {
        Self { next_id: Cell::new(0) }
    }

    fn fresh(&self) -> FakeNode {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        FakeNode(id)
    }
}

impl HostDriver for FakeHost {
    type Node = FakeNode;
    fn create_element(&self, _tag: &str) -> Self::Node {
        self.fresh()
    }
    fn create_text(&self, _text: &str) -> Self::Node {
        self.fresh()
    }
    fn create_placeholder(&self) -> Self::Node {
        self.fresh()
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
fn widget_lifecycle_hooks_fire_in_mount_then_unmount_order() {
    vitarx_reactive::__reset_runtime_for_tests();
    let log = Rc::new(RefCell::new(Vec::new()));
    let log_mount = log.clone();
    let log_unmount = log.clone();

    let spec = Rc::new(WidgetSpec::<FakeHost>::from_function(move |_props| {
        let log_inner = log_mount.clone();
        on_mount(move || log_inner.borrow_mut().push("mounted"));
        let log_inner2 = log_unmount.clone();
        on_unmount(move || log_inner2.borrow_mut().push("unmounted"));
        VNode::text("hello")
    }));

    let instance = WidgetInstance::new(spec);
    instance.build(&Props::default());
    assert_eq!(*log.borrow(), vec!["mounted"]);
    instance.unmount();
    assert_eq!(*log.borrow(), vec!["mounted", "unmounted"]);
}

#[test]
fn error_bubbles_to_configured_app_error_handler() {
    vitarx_reactive::__reset_runtime_for_tests();
    let received = Rc::new(RefCell::new(None));
    let received2 = received.clone();
    let config = AppConfig::default().with_error_handler(move |err| {
        *received2.borrow_mut() = Some(err.source);
    });
    let spec = WidgetSpec::<FakeHost>::from_function(|_props| VNode::text("root"));
    let app = App::new(spec, config);

    app.report_build_error(std::io::Error::new(std::io::ErrorKind::Other, "boom"));

    assert_eq!(*received.borrow(), Some(ErrorSource::Build));
}

#[test]
fn mounting_an_app_attaches_its_root_widget_to_the_host() {
    vitarx_reactive::__reset_runtime_for_tests();
    let driver = FakeHost::new();
    let root = driver.fresh();
    let spec = WidgetSpec::<FakeHost>::from_function(|_props| VNode::text("hello"));
    let app = App::new(spec, AppConfig::default());
    app.mount(&driver, &root);
    app.unmount(&driver, &root);
}

#[test]
fn widget_nested_in_another_widgets_build_output_is_actually_mounted() {
    vitarx_reactive::__reset_runtime_for_tests();
    let log = Rc::new(RefCell::new(Vec::new()));

    let child_log = log.clone();
    let child_spec = Rc::new(WidgetSpec::<FakeHost>::from_function(move |_props| {
        let log_inner = child_log.clone();
        on_mount(move || log_inner.borrow_mut().push("child-mounted"));
        VNode::text("child content")
    }));

    let parent_log = log.clone();
    let parent_spec = WidgetSpec::<FakeHost>::from_function(move |_props| {
        let log_inner = parent_log.clone();
        on_mount(move || log_inner.borrow_mut().push("parent-mounted"));
        VNode::widget(child_spec.clone(), Props::default())
    });

    let driver = FakeHost::new();
    let root = driver.fresh();
    let app = App::new(parent_spec, AppConfig::default());
    app.mount(&driver, &root);

    assert_eq!(
        *log.borrow(),
        vec!["parent-mounted", "child-mounted"],
        "a widget nested inside another widget's build output must actually be built and mounted, not reduced to a placeholder"
    );

    app.unmount(&driver, &root);
}

#[test]
fn parent_on_error_recovers_from_a_child_widgets_build_panic() {
    vitarx_reactive::__reset_runtime_for_tests();

    struct Boundary;
    impl Widget<FakeHost> for Boundary {
        fn build(&self, _props: &Props) -> VNode<FakeHost> {
            VNode::widget(
                Rc::new(WidgetSpec::<FakeHost>::from_function(|_props| {
                    panic!("child widget exploded");
                })),
                Props::default(),
            )
        }
        fn on_error(&self, _err: &RenderError) -> Option<VNode<FakeHost>> {
            Some(VNode::text("recovered"))
        }
    }

    let spec = WidgetSpec::<FakeHost>::from_class(|| Boundary);
    let driver = FakeHost::new();
    let root = driver.fresh();
    let app = App::new(spec, AppConfig::default());
    app.mount(&driver, &root);
    app.unmount(&driver, &root);
}
