//! Abstract interpretation of method bodies
//!
//! Simulating a method means running it on abstract values instead of concrete ones: a value is
//! a lattice element (a primitive of some kind with possibly a known literal, or a reference of
//! some static type with possibly a known string/builder/class literal) instead of an actual
//! number or object. Since branch conditions are usually unknown, both arms of every branch get
//! executed, and whenever control reaches an instruction from more than one place the frames
//! get merged (see [`Frame::merge`]). This is a fix-point algorithm: merging only ever moves
//! values up the lattice, so eventually re-executing an instruction doesn't change anything and
//! the work list empties.
//!
//! Values live in a [`ValueArena`] and frames only hold their ids. On top of the lattice element,
//! each value records where it came from:
//!
//!   - its _provenance_, the instructions that contributed to it (copies inherit the provenance
//!     of the value they copy, plus the copying instruction)
//!   - the instruction that pushed it and those that popped it
//!   - the `ifnull`/`ifnonnull` guarding it, if any
//!
//! Along the way, every branch edge gets recorded in a [`BlockTree`], which is what answers
//! whether a use of a value is still dominated by the null check guarding it (see
//! [`Simulation::is_null_checked`]).
//!
//! A handful of pure library methods (string building, boxing, some of `java.lang.Math`) are
//! executed symbolically on literals (see [`symbolic`]). Everything else produces an unknown
//! value of the declared return type.

mod arena;
mod block_tree;
mod errors;
mod executor;
mod frame;
mod interpreter;
mod settings;
pub mod symbolic;
mod value;

pub use arena::*;
pub use block_tree::*;
pub use errors::*;
pub use executor::*;
pub use frame::*;
pub use interpreter::*;
pub use settings::*;
pub use value::*;
