//! Method bodies
//!
//! ### Structure
//!
//! A method body is an ordered sequence of [`Instruction`]s along with the [`ExceptionHandler`]s
//! protecting ranges of that sequence. Unlike in a class file, where branches are byte offsets,
//! instructions here are identified by their position (an [`InsnIndex`]) and every branch target
//! is such a position. Constant pool references are already resolved.
//!
//! The [list of bytecode instructions][0] is represented in full, but similar instructions get
//! folded into one variant (for instance all of the `if<cond>` instructions are just [`If`]).
//!
//! ### Listings
//!
//! Since there is no class file reader here, methods can be written out by hand in a small
//! assembler-like format (see [`parse_listing`]). That is what the command line tool and most of
//! the tests use.
//!
//! [0]: https://docs.oracle.com/javase/specs/jvms/se18/html/jvms-6.html#jvms-6.5
//! [`If`]: Instruction::If

mod instructions;
mod listing;
mod method;
mod stack_effect;

pub use instructions::*;
pub use listing::*;
pub use method::*;
pub use stack_effect::*;

/// Position of an instruction inside of a method body
pub type InsnIndex = usize;
