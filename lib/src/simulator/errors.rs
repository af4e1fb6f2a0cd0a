use super::{Value, ValueId};
use crate::jvm;
use crate::jvm::code::InsnIndex;

/// Failure to simulate a method
#[derive(Debug)]
pub enum Error {
    /// Fault raised while executing or merging at an instruction
    Simulation {
        index: InsnIndex,
        kind: SimulationErrorKind,
    },

    /// Method that can't be simulated at all (eg. abstract or empty)
    InvalidMethod(String),

    /// Problem with the method model (usually while reading a listing)
    Model(jvm::Error),
}

impl Error {
    /// Category of the fault, if this happened during simulation
    pub fn category(&self) -> Option<ErrorCategory> {
        match self {
            Error::Simulation { kind, .. } => Some(kind.category()),
            Error::InvalidMethod(_) | Error::Model(_) => None,
        }
    }
}

impl From<jvm::Error> for Error {
    fn from(err: jvm::Error) -> Error {
        Error::Model(err)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Error {
        Error::Model(jvm::Error::IoError(err))
    }
}

/// Broad classes of simulation faults
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum ErrorCategory {
    /// Malformed input (the method itself is broken)
    Structural,

    /// Operation there is no transfer rule for
    ///
    /// Depending on [`super::UnsupportedPolicy`], these are either fatal or collapse the affected
    /// values to unknowns.
    Unsupported,

    /// Bug in the transfer rules (never a property of the input)
    Invariant,
}

#[derive(Clone, Debug, PartialEq)]
pub enum SimulationErrorKind {
    // Structural
    EmptyStack,
    UnbalancedStack {
        existing: usize,
        incoming: usize,
    },
    /// Local slot holding the second half of a `long` or `double` gets written on its own
    WideSlotStraddle(u16),
    /// Local slot holding the second half of a `long` or `double` gets read on its own
    ReadContinuation(u16),
    /// Stack slots would split a `long` or `double` in half
    StackShapeMismatch,
    TypeMismatch {
        expected: &'static str,
        found: Value,
    },
    TargetOutOfBounds(InsnIndex),
    FallOffEnd,

    // Unsupported
    UnresolvedReturnAddress(u16),
    UnsupportedCall(String),

    // Invariant
    CopyUninitialized,
    CopyReturnAddress,
    ReadUninitialized(u16),
    ValuePushedTwice(ValueId),
    UninitializedOperand,
}

impl SimulationErrorKind {
    pub fn category(&self) -> ErrorCategory {
        use SimulationErrorKind::*;
        match self {
            EmptyStack
            | UnbalancedStack { .. }
            | WideSlotStraddle(_)
            | ReadContinuation(_)
            | StackShapeMismatch
            | TypeMismatch { .. }
            | TargetOutOfBounds(_)
            | FallOffEnd => ErrorCategory::Structural,
            UnresolvedReturnAddress(_) | UnsupportedCall(_) => ErrorCategory::Unsupported,
            CopyUninitialized
            | CopyReturnAddress
            | ReadUninitialized(_)
            | ValuePushedTwice(_)
            | UninitializedOperand => ErrorCategory::Invariant,
        }
    }
}
