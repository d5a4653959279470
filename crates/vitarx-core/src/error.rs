//! Error taxonomy surfaced to widget `onError` hooks (§6/§7, SPEC_FULL.md §2).
//!
//! Grounded the same way as [`vitarx_reactive::error`]: `thiserror`-derived
//! enums rather than a hand-rolled `Display` impl, matching the retrieval
//! pack's convention for this kind of error type.

use std::fmt;

use thiserror::Error;

/// Where a [`RenderError`] originated, mirroring the taxonomy's `source`
/// field: `'build' | 'render' | 'update' | 'hook:<name>' | 'effect.<subsource>'
/// | 'view:switch'`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSource {
    Build,
    Render,
    Update,
    Hook(&'static str),
    Effect(&'static str),
    ViewSwitch,
}

impl fmt::Display for ErrorSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorSource::Build => write!(f, "build"),
            ErrorSource::Render => write!(f, "render"),
            ErrorSource::Update => write!(f, "update"),
            ErrorSource::Hook(name) => write!(f, "hook:{name}"),
            ErrorSource::Effect(name) => write!(f, "effect.{name}"),
            ErrorSource::ViewSwitch => write!(f, "view:switch"),
        }
    }
}

/// An error raised while building, rendering or updating a widget, carrying
/// enough of the taxonomy (§6: "kinds: validation, user callback,
/// render/build, invariant") for `App.config.error_handler` to route on.
#[derive(Error, Debug)]
#[error("{source}: {cause}")]
pub struct RenderError {
    pub source: ErrorSource,
    #[source]
    pub cause: Box<dyn std::error::Error + 'static>,
}

impl RenderError {
    pub fn new(source: ErrorSource, cause: impl std::error::Error + 'static) -> Self {
        Self { source, cause: Box::new(cause) }
    }
}
