//! Facade crate re-exporting [`vitarx_reactive`] and [`vitarx_core`] under a
//! single `vitarx::prelude`, the same role the teacher's top-level `sycamore`
//! package plays over `sycamore-reactive` and `sycamore-core`.

pub use vitarx_core as core;
pub use vitarx_reactive as reactive;

pub use vitarx_core::*;
pub use vitarx_reactive::*;

pub mod prelude {
    pub use vitarx_core::prelude::*;
    pub use vitarx_reactive::prelude::*;
}
