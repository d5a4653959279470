//! Fine-grained reactive signal/effect graph.
//!
//! This crate implements the dependency graph, tracker, signal primitives,
//! reactive proxies, effect scopes, watcher API and scheduler that the rest
//! of the workspace builds widgets and rendering on top of. It has no notion
//! of VNodes or a host tree — see `vitarx-core` for that.
//!
//! Module layout mirrors the teacher's `sycamore-reactive` package: a
//! thread-local runtime ([`runtime`]) holding arena-backed signals, effects
//! and links ([`graph`]), a tracker ([`tracker`]) recording which effect is
//! currently running, and signal/scope/watch/scheduler layers built on top.

mod effect;
mod error;
mod graph;
mod reactive;
mod runtime;
mod scheduler;
mod scope;
mod signal;
mod tracker;
mod watch;

pub use effect::{create_effect, EffectHandle};
pub use error::{GraphError, ScopeError};
pub use reactive::{
    is_reactive, mark_raw, readonly, reactive, shallow_reactive, shallow_readonly, to_raw, to_ref, to_refs, IsReactive,
    Raw, Reactive, ReactiveMap, ReactiveSet, ReactiveVec, Readonly,
};
pub use runtime::__reset_runtime_for_tests;
pub use scheduler::{batch, flush_sync, next_tick, set_microtask_spawner, FlushPhase, MicrotaskSpawner};
pub use scope::{on_cleanup, provide_context, use_context, use_context_or_else, EffectScope};
pub use signal::{is_ref, is_signal, unref, Computed, MaybeSignal, PropertyRef, Signal, ValueRef};
pub use tracker::untrack;
pub use watch::{watch, watch_effect, WatchHandle, WatchOptions};

/// Re-exports the common entry points in one `use vitarx_reactive::prelude::*;`.
pub mod prelude {
    pub use crate::{
        batch, create_effect, flush_sync, is_reactive, is_ref, is_signal, mark_raw, next_tick, on_cleanup,
        provide_context, reactive, readonly, shallow_reactive, shallow_readonly, to_raw, to_ref, to_refs, unref,
        untrack, use_context, use_context_or_else, watch, watch_effect, Computed, EffectHandle, EffectScope,
        FlushPhase, GraphError, IsReactive, MaybeSignal, PropertyRef, Raw, Reactive, ReactiveMap, ReactiveSet,
        ReactiveVec, Readonly, ScopeError, Signal, ValueRef, WatchHandle, WatchOptions,
    };
}
