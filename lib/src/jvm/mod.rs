//! Model of the JVM pieces needed to simulate a method
//!
//! This is intentionally a lot less than a full class file model: a [`code::Method`] only carries
//! its owner, name, descriptor, access flags, and the resolved instruction sequence. Types are
//! described with the same descriptor grammar the JVM uses.
//!
//! ```
//! use jvmsim::jvm::*;
//!
//! let descriptor = MethodDescriptor::parse("(IJLjava/lang/String;)V").unwrap();
//! assert_eq!(descriptor.parameter_length(true), 5);
//! assert_eq!(descriptor.render(), "(IJLjava/lang/String;)V");
//! ```

mod access_flags;
pub mod code;
mod descriptors;
mod errors;
mod names;

pub use access_flags::*;
pub use descriptors::*;
pub use errors::*;
pub use names::*;
