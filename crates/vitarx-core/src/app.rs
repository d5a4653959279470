//! The app container (component C11): root lifecycle, plugin/directive
//! registries and error routing.
//!
//! `App` plays the role the teacher's top-level `sycamore` facade doesn't
//! need, since sycamore has no central app-config object; `AppConfig`'s
//! builder-style setters (`Default` plus chained `with_*` methods) follow the
//! same shape the teacher uses for its own optional-configuration structs.
//! The root injection map and `provide`/`inject` walk reuse
//! [`vitarx_reactive::EffectScope`]'s own context machinery
//! (`sycamore-reactive/src/context.rs`), since the app's root scope is just
//! an ordinary (detached) scope holding the `"App"`-reserved entry.

use std::cell::RefCell;
use std::rc::Rc;

use vitarx_reactive::EffectScope;

use crate::error::{ErrorSource, RenderError};
use crate::host::HostDriver;
use crate::vnode::{Directive, VNode};
use crate::widget::{WidgetInstance, WidgetSpec};

/// A plugin: either a plain install function or an object exposing one.
/// Mirrors the spec's `use(plugin, options?)`: "accepts a function or an
/// object with `install`."
pub trait Plugin<D: HostDriver> {
    fn install(&self, app: &App<D>);
}

impl<D: HostDriver, F: Fn(&App<D>)> Plugin<D> for F {
    fn install(&self, app: &App<D>) {
        self(app)
    }
}

pub type ErrorHandler = Rc<dyn Fn(&RenderError)>;
pub type WarnHandler = Rc<dyn Fn(&str)>;

/// App-wide configuration (`App.config` in the spec). Built with setter
/// methods over a `Default` base rather than a constructor with a long
/// parameter list.
#[derive(Clone)]
pub struct AppConfig {
    error_handler: Option<ErrorHandler>,
    warn_handler: Option<WarnHandler>,
    /// Placeholder for enabling/disabling prop-shape validation at
    /// build time; unused until a macro layer exists to feed it.
    pub compile_time_checks: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self { error_handler: None, warn_handler: None, compile_time_checks: true }
    }
}

impl AppConfig {
    pub fn with_error_handler(mut self, handler: impl Fn(&RenderError) + 'static) -> Self {
        self.error_handler = Some(Rc::new(handler));
        self
    }

    pub fn with_warn_handler(mut self, handler: impl Fn(&str) + 'static) -> Self {
        self.warn_handler = Some(Rc::new(handler));
        self
    }

    pub fn with_compile_time_checks(mut self, enabled: bool) -> Self {
        self.compile_time_checks = enabled;
        self
    }

    fn report_error(&self, err: &RenderError) {
        match &self.error_handler {
            Some(handler) => handler(err),
            None => {
                #[cfg(feature = "trace")]
                tracing::error!(target: "vitarx::core::app", source = %err.source, "{err}");
                #[cfg(not(feature = "trace"))]
                eprintln!("vitarx: unhandled error ({}): {err}", err.source);
            }
        }
    }

    fn report_warning(&self, message: &str) {
        match &self.warn_handler {
            Some(handler) => handler(message),
            None => {
                #[cfg(feature = "trace")]
                tracing::warn!(target: "vitarx::core::app", "{message}");
                #[cfg(not(feature = "trace"))]
                eprintln!("vitarx: {message}");
            }
        }
    }
}

/// The reserved injection key for the app instance itself (§4.11: "The key
/// `\"App\"` is reserved").
struct AppContext;

/// Routes an error up through ancestor `onError` hooks, finally to
/// `App.config.error_handler`, per §6's propagation policy: "only `onError`
/// returning neither `false` nor a VNode propagates."
pub struct ErrorScope {
    config: AppConfig,
}

impl ErrorScope {
    fn new(config: AppConfig) -> Self {
        Self { config }
    }

    /// Handles an error raised by a widget with no (or a declining)
    /// `onError` of its own by reporting it to the app's configured handler.
    /// Returns nothing: there is no further ancestor to propagate to once an
    /// error reaches the app root.
    pub fn handle(&self, err: RenderError) {
        self.config.report_error(&err);
    }

    pub fn warn(&self, message: &str) {
        self.config.report_warning(message);
    }
}

/// The root of a Vitarx application: an empty detached root scope, directive
/// and plugin registries, and the `"App"`-keyed injection root (§4.11).
pub struct App<D: HostDriver> {
    root_scope: EffectScope,
    config: AppConfig,
    directives: RefCell<hashbrown::HashMap<Rc<str>, Rc<dyn Directive<D>>>>,
    plugins_installed: RefCell<Vec<Rc<str>>>,
    root: RefCell<Option<VNode<D>>>,
    root_spec: Rc<WidgetSpec<D>>,
}

impl<D: HostDriver> App<D> {
    pub fn new(root_spec: WidgetSpec<D>, config: AppConfig) -> Rc<Self> {
        let root_scope = EffectScope::new(true);
        let app = Rc::new(Self {
            root_scope,
            config,
            directives: RefCell::new(hashbrown::HashMap::new()),
            plugins_installed: RefCell::new(Vec::new()),
            root: RefCell::new(None),
            root_spec: Rc::new(root_spec),
        });
        app.root_scope.run(|| {
            vitarx_reactive::provide_context(AppContext);
        });
        app
    }

    /// Builds the root widget and stores the resulting subtree. Actually
    /// attaching it to a host tree is left to the caller via a [`HostDriver`]
    /// and [`crate::render::mount`], since this crate ships no concrete
    /// target.
    ///
    /// The root widget is its own nearest `onError` boundary (there's no
    /// ancestor above it the way [`crate::render::mount`] gives nested
    /// widgets one): a panic anywhere in building or mounting it is first
    /// offered to its own `on_error`, and only falls back to
    /// `config.error_handler` (leaving the app unmounted) if that declines.
    pub fn mount(self: &Rc<Self>, driver: &D, target: &D::Node) {
        let instance = Rc::new(WidgetInstance::new(self.root_spec.clone()));
        let root_scope = &self.root_scope;
        let instance_for_build = instance.clone();
        let built = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let mut node = root_scope.run(|| instance_for_build.build(&crate::vnode::Props::default()));
            crate::render::mount(driver, target, &mut node);
            node
        }));

        let node = match built {
            Ok(node) => node,
            Err(payload) => {
                let message = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "root widget build panicked".to_string());
                let err = RenderError::new(ErrorSource::Build, RootBuildPanic(message));
                match instance.widget_on_error(&err) {
                    Some(mut fallback) => {
                        crate::render::mount(driver, target, &mut fallback);
                        fallback
                    }
                    None => {
                        self.error_scope().handle(err);
                        return;
                    }
                }
            }
        };
        *self.root.borrow_mut() = Some(node);
    }

    pub fn unmount(&self, driver: &D, target: &D::Node) {
        if let Some(node) = self.root.borrow_mut().take() {
            crate::render::unmount(driver, target, node);
        }
        let _ = self.root_scope.dispose();
    }

    /// Installs a plugin, tolerating re-installation of a plugin already
    /// registered under `name` (a no-op, matching most "use a plugin" idioms
    /// that are safe to call more than once).
    pub fn use_plugin(self: &Rc<Self>, name: impl Into<Rc<str>>, plugin: impl Plugin<D>) {
        let name = name.into();
        if self.plugins_installed.borrow().contains(&name) {
            return;
        }
        plugin.install(self);
        self.plugins_installed.borrow_mut().push(name);
    }

    pub fn directive(&self, name: impl Into<Rc<str>>, def: impl Directive<D> + 'static) {
        self.directives.borrow_mut().insert(name.into(), Rc::new(def));
    }

    /// Looks up a directive registered with [`App::directive`] by name, for
    /// resolving a `v-name` binding encountered while building a VNode tree.
    pub fn resolve_directive(&self, name: &str) -> Option<Rc<dyn Directive<D>>> {
        self.directives.borrow().get(name).cloned()
    }

    pub fn provide<T: 'static>(&self, value: T) {
        self.root_scope.run(|| {
            vitarx_reactive::provide_context(value);
        });
    }

    pub fn inject<T: 'static>(&self) -> Option<Rc<T>> {
        self.root_scope.run(vitarx_reactive::use_context::<T>)
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn error_scope(&self) -> ErrorScope {
        ErrorScope::new(self.config.clone())
    }

    pub fn report_build_error(&self, cause: impl std::error::Error + 'static) {
        self.error_scope().handle(RenderError::new(ErrorSource::Build, cause));
    }
}

#[derive(Debug)]
struct RootBuildPanic(String);

impl std::fmt::Display for RootBuildPanic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for RootBuildPanic {}
