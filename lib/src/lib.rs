//! Abstract interpretation of JVM method bodies
//!
//! Given a resolved [`jvm::code::Method`], [`simulator::simulate`] walks every reachable
//! instruction and computes the operand stack and locals in effect before it. Each stack or local
//! slot holds a value identity from a shared arena, so consumers can ask where a value came from,
//! which instructions pushed and popped it, and whether a use of a reference is dominated by a
//! null check.
//!
//! ```
//! use jvmsim::jvm::code::parse_listing;
//! use jvmsim::simulator::{simulate, Settings, Value, Literal};
//!
//! let listing = "
//! .method static seven()I
//!     iconst_3
//!     iconst_4
//!     iadd
//!     ireturn
//! .end method
//! ";
//! let methods = parse_listing(listing).unwrap();
//! let simulation = simulate(&methods[0], &Settings::default()).unwrap();
//!
//! let before_return = simulation.frame_before(3).unwrap();
//! let top = before_return.stack_values().last().copied().unwrap();
//! assert_eq!(simulation.values.value(top).literal(), Some(&Literal::Int(7)));
//! ```

pub mod jvm;
pub mod simulator;
mod util;
