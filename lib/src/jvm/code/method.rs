use super::{InsnIndex, Instruction};
use crate::jvm::{BinaryName, Error, MethodAccessFlags, MethodDescriptor, UnqualifiedName};

/// Protected range of instructions along with where to go if an exception is thrown in it
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExceptionHandler {
    /// First protected instruction
    pub start: InsnIndex,

    /// First instruction after the protected range (exclusive)
    pub end: InsnIndex,

    /// Entry point of the handler
    pub handler: InsnIndex,

    /// Caught exception class (`None` catches everything, as for `finally`)
    pub catch_type: Option<BinaryName>,
}

impl ExceptionHandler {
    pub fn covers(&self, index: InsnIndex) -> bool {
        self.start <= index && index < self.end
    }
}

/// Ordered instruction sequence of a method body
///
/// Instructions are identified by their position. There are no labels or pseudo-instructions:
/// branch targets are already positions in this sequence.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Code {
    instructions: Vec<Instruction>,

    /// Exception handlers, in priority order
    pub handlers: Vec<ExceptionHandler>,
}

impl Code {
    pub fn new(instructions: Vec<Instruction>) -> Code {
        Code {
            instructions,
            handlers: vec![],
        }
    }

    pub fn with_handlers(instructions: Vec<Instruction>, handlers: Vec<ExceptionHandler>) -> Code {
        Code {
            instructions,
            handlers,
        }
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    pub fn get(&self, index: InsnIndex) -> Option<&Instruction> {
        self.instructions.get(index)
    }

    /// Index of the following instruction, if there is one
    pub fn next(&self, index: InsnIndex) -> Option<InsnIndex> {
        let next = index + 1;
        if next < self.instructions.len() {
            Some(next)
        } else {
            None
        }
    }

    /// Index of the preceding instruction, if there is one
    pub fn previous(&self, index: InsnIndex) -> Option<InsnIndex> {
        index.checked_sub(1).filter(|i| *i < self.instructions.len())
    }

    pub fn iter(&self) -> impl Iterator<Item = (InsnIndex, &Instruction)> {
        self.instructions.iter().enumerate()
    }

    /// Handlers whose protected range includes the instruction
    pub fn handlers_covering(&self, index: InsnIndex) -> impl Iterator<Item = &ExceptionHandler> {
        self.handlers.iter().filter(move |h| h.covers(index))
    }

    /// Check that every jump and handler lands inside the method
    pub fn check_targets(&self) -> Result<(), Error> {
        let len = self.instructions.len();
        for (index, insn) in self.iter() {
            for target in insn.jump_targets() {
                if target >= len {
                    return Err(Error::TargetOutOfBounds { index, target });
                }
            }
        }
        for handler in &self.handlers {
            let bad = [handler.handler, handler.start]
                .into_iter()
                .find(|target| *target >= len)
                .or(Some(handler.end).filter(|end| *end > len || *end <= handler.start));
            if let Some(target) = bad {
                return Err(Error::TargetOutOfBounds {
                    index: handler.start,
                    target,
                });
            }
        }
        Ok(())
    }
}

/// Method whose body gets simulated
#[derive(Clone, Debug, PartialEq)]
pub struct Method {
    /// Class declaring the method (type of `this` for instance methods)
    pub owner: BinaryName,

    pub name: UnqualifiedName,

    pub descriptor: MethodDescriptor,

    pub access_flags: MethodAccessFlags,

    /// Declared maximum stack size
    ///
    /// Only a hint: the simulation reports what it actually observed.
    pub max_stack: Option<u16>,

    /// Declared maximum number of locals (also only a hint)
    pub max_locals: Option<u16>,

    pub code: Code,
}

impl Method {
    pub fn new(
        owner: BinaryName,
        name: UnqualifiedName,
        descriptor: MethodDescriptor,
        access_flags: MethodAccessFlags,
        code: Code,
    ) -> Method {
        Method {
            owner,
            name,
            descriptor,
            access_flags,
            max_stack: None,
            max_locals: None,
            code,
        }
    }

    pub fn is_static(&self) -> bool {
        self.access_flags.contains(MethodAccessFlags::STATIC)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::code::Instruction::*;
    use crate::jvm::code::OrdComparison;

    #[test]
    fn neighbours() {
        let code = Code::new(vec![IConst0, IConst1, IAdd, IReturn]);
        assert_eq!(code.len(), 4);
        assert_eq!(code.next(2), Some(3));
        assert_eq!(code.next(3), None);
        assert_eq!(code.previous(0), None);
        assert_eq!(code.previous(3), Some(2));
        assert_eq!(code.get(2), Some(&IAdd));
    }

    #[test]
    fn out_of_bounds_targets() {
        let code = Code::new(vec![IConst0, Goto(5), Return]);
        assert!(matches!(
            code.check_targets(),
            Err(Error::TargetOutOfBounds {
                index: 1,
                target: 5
            })
        ));

        let handler = ExceptionHandler {
            start: 0,
            end: 2,
            handler: 9,
            catch_type: None,
        };
        let code = Code::with_handlers(vec![Nop, Nop, Return], vec![handler]);
        assert!(code.check_targets().is_err());

        let code = Code::new(vec![IConst0, If(OrdComparison::LT, 0), Return]);
        assert!(code.check_targets().is_ok());
    }
}
