use super::interpreter::{interpret, Edge, Effect, Successor};
use super::{BlockTree, Error, Frame, Settings, SimulationErrorKind, Value, ValueArena, ValueId, ValueSource};
use crate::jvm::code::{EqComparison, InsnIndex, Instruction, Method};
use crate::jvm::{BinaryName, Name, RefType, RenderDescriptor};
use std::collections::{HashMap, VecDeque};

/// How the simulation ended
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum Completion {
    /// The work list emptied: every frame is a fixed point
    Converged,

    /// The iteration cap was hit first, so frames may be missing or too precise
    Incomplete,
}

/// Result of simulating one method
///
/// Frames are indexed by instruction. Instructions that were never reached have no frame.
#[derive(Debug)]
pub struct Simulation {
    /// Every value created while simulating
    pub values: ValueArena,

    /// Nesting of the branch (and handler) edges
    pub blocks: BlockTree,

    pub completion: Completion,

    /// Largest stack observed, in slots
    pub max_stack: usize,

    /// Largest number of locals observed, in slots
    pub max_locals: usize,

    /// Number of instructions executed (counting re-executions)
    pub iterations: usize,

    frames_before: Vec<Option<Frame>>,
    steps: Vec<Option<Effect>>,

    /// Branch index of every `ifnull`/`ifnonnull` mapped to the start of its non-null arm
    non_null_arms: HashMap<InsnIndex, InsnIndex>,
}

impl Simulation {
    /// Frame on entry to an instruction
    pub fn frame_before(&self, index: InsnIndex) -> Option<&Frame> {
        self.frames_before.get(index)?.as_ref()
    }

    /// What the last execution of the instruction did
    pub fn step(&self, index: InsnIndex) -> Option<&Effect> {
        self.steps.get(index)?.as_ref()
    }

    /// Frames flowing out of the instruction, including to exception handlers
    pub fn frames_after(&self, index: InsnIndex) -> &[Successor] {
        self.step(index)
            .map_or(&[][..], |effect| effect.successors.as_slice())
    }

    /// Values the instruction popped, in popping order
    pub fn consumed(&self, index: InsnIndex) -> &[ValueId] {
        self.step(index).map_or(&[][..], |effect| effect.consumed.as_slice())
    }

    /// Values the instruction pushed, in pushing order
    pub fn produced(&self, index: InsnIndex) -> &[ValueId] {
        self.step(index).map_or(&[][..], |effect| effect.produced.as_slice())
    }

    pub fn is_reachable(&self, index: InsnIndex) -> bool {
        self.frame_before(index).is_some()
    }

    pub fn is_complete(&self) -> bool {
        self.completion == Completion::Converged
    }

    /// Is the value known to be non-null when used at `use_index`?
    ///
    /// Freshly allocated objects, `this`, and references with a known literal are never null.
    /// Anything else needs to have passed through the non-null arm of an `ifnull`/`ifnonnull`,
    /// and the use must still be inside the block of that arm.
    pub fn is_null_checked(&self, value: ValueId, use_index: InsnIndex) -> bool {
        let record = self.values.get(value);
        match record.source {
            ValueSource::New | ValueSource::This => return true,
            _ => (),
        }
        if record.value.reference_literal().is_some() {
            return true;
        }

        let safe_start = match record
            .null_check
            .and_then(|guard| self.non_null_arms.get(&guard))
        {
            Some(safe_start) => *safe_start,
            None => return false,
        };
        let safe_block = self.blocks.block_at(safe_start);
        self.blocks.is_within(use_index, safe_block)
    }
}

/// Simulate a method until all frames reach a fixed point (or the iteration cap is hit)
pub fn simulate(method: &Method, settings: &Settings) -> Result<Simulation, Error> {
    let code_len = method.code.len();
    if code_len == 0 {
        return Err(Error::InvalidMethod(format!(
            "{}.{}{} has no code",
            method.owner.as_str(),
            method.name.as_str(),
            method.descriptor.render()
        )));
    }
    method.code.check_targets().map_err(|err| match err {
        crate::jvm::Error::TargetOutOfBounds { index, target } => Error::Simulation {
            index,
            kind: SimulationErrorKind::TargetOutOfBounds(target),
        },
        other => Error::Model(other),
    })?;

    let mut values = ValueArena::new();
    let mut blocks = BlockTree::new(code_len);
    let mut frames_before: Vec<Option<Frame>> = vec![None; code_len];
    let mut steps: Vec<Option<Effect>> = vec![None; code_len];
    let mut max_stack = 0;
    let mut max_locals = 0;

    let entry = Frame::entry(method, &mut values);
    entry.update_maximums(&mut max_locals, &mut max_stack);
    frames_before[0] = Some(entry);

    if settings.follow_exception_handlers {
        for handler in &method.code.handlers {
            blocks.insert_edge(handler.start, handler.handler);
        }
    }
    let non_null_arms = method
        .code
        .iter()
        .filter_map(|(index, insn)| match insn {
            Instruction::IfNull(EqComparison::EQ, _) => Some((index, index + 1)),
            Instruction::IfNull(EqComparison::NE, target) => Some((index, *target)),
            _ => None,
        })
        .collect();

    let mut worklist = VecDeque::from(vec![0]);
    let mut queued = vec![false; code_len];
    queued[0] = true;
    let mut iterations = 0;
    let mut completion = Completion::Converged;

    while let Some(index) = worklist.pop_front() {
        queued[index] = false;
        if settings.max_iterations.map_or(false, |cap| iterations >= cap) {
            log::warn!(
                "Stopping {}.{} after {} iterations with {} instructions still queued",
                method.owner.as_str(),
                method.name.as_str(),
                iterations,
                worklist.len() + 1
            );
            completion = Completion::Incomplete;
            break;
        }
        iterations += 1;

        let frame = match &frames_before[index] {
            Some(frame) => frame.clone(),
            None => continue,
        };
        let mut effect = interpret(method, index, &frame, &mut values, &mut blocks, settings)
            .map_err(|kind| {
                log::error!("Simulation failed at {}: {:?}", index, kind);
                Error::Simulation { index, kind }
            })?;

        if settings.follow_exception_handlers {
            for handler in method.code.handlers_covering(index) {
                let catch_type = handler
                    .catch_type
                    .clone()
                    .unwrap_or(BinaryName::THROWABLE);
                let exception = values.alloc(
                    Value::reference(RefType::Object(catch_type)),
                    ValueSource::Exception,
                    vec![index],
                    vec![],
                );
                let mut handler_frame = Frame {
                    locals: frame.locals.clone(),
                    stack: vec![],
                };
                handler_frame
                    .push(exception, &mut values, index)
                    .map_err(|kind| Error::Simulation { index, kind })?;
                effect.successors.push(Successor {
                    target: handler.handler,
                    frame: handler_frame,
                    edge: Edge::Handler,
                });
            }
        }

        for successor in &effect.successors {
            let target = successor.target;
            if target >= code_len {
                log::error!("Control falls off the end of the method at {}", index);
                return Err(Error::Simulation {
                    index,
                    kind: SimulationErrorKind::FallOffEnd,
                });
            }
            successor
                .frame
                .update_maximums(&mut max_locals, &mut max_stack);

            let updated = match &frames_before[target] {
                None => Some(successor.frame.clone()),
                Some(existing) => existing
                    .merge(&successor.frame, &mut values, target)
                    .map_err(|kind| {
                        log::error!(
                            "Failed to merge frame from {} into {}: {:?}",
                            index,
                            target,
                            kind
                        );
                        Error::Simulation {
                            index: target,
                            kind,
                        }
                    })?,
            };
            if let Some(updated) = updated {
                frames_before[target] = Some(updated);
                if !queued[target] {
                    log::debug!("Re-enqueueing {} (changed by {})", target, index);
                    queued[target] = true;
                    worklist.push_back(target);
                }
            }
        }
        steps[index] = Some(effect);
    }

    Ok(Simulation {
        values,
        blocks,
        completion,
        max_stack,
        max_locals,
        iterations,
        frames_before,
        steps,
        non_null_arms,
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::code::{Code, ExceptionHandler, OrdComparison};
    use crate::jvm::{MethodAccessFlags, MethodDescriptor, ParseDescriptor, UnqualifiedName};
    use crate::simulator::Literal;
    use Instruction::*;

    fn method(descriptor: &str, code: Code) -> Method {
        Method::new(
            BinaryName::from_string(String::from("me/Test")).unwrap(),
            UnqualifiedName::from_string(String::from("test")).unwrap(),
            MethodDescriptor::parse(descriptor).unwrap(),
            MethodAccessFlags::STATIC,
            code,
        )
    }

    #[test]
    fn empty_method() {
        let method = method("()V", Code::new(vec![]));
        assert!(matches!(
            simulate(&method, &Settings::new()),
            Err(Error::InvalidMethod(_))
        ));
    }

    #[test]
    fn target_out_of_bounds() {
        let method = method("()V", Code::new(vec![Goto(7)]));
        match simulate(&method, &Settings::new()) {
            Err(Error::Simulation { index, kind }) => {
                assert_eq!(index, 0);
                assert_eq!(kind, SimulationErrorKind::TargetOutOfBounds(7));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn falling_off_the_end() {
        let method = method("()V", Code::new(vec![Nop]));
        match simulate(&method, &Settings::new()) {
            Err(err @ Error::Simulation { .. }) => {
                assert_eq!(err.category(), Some(crate::simulator::ErrorCategory::Structural));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn counting_loop_converges() {
        // for (int i = 0; i < n; i++) {}
        let code = Code::new(vec![
            IConst0,
            IStore(1),
            ILoad(1),
            ILoad(0),
            IfICmp(OrdComparison::GE, 7),
            IInc(1, 1),
            Goto(2),
            Return,
        ]);
        let method = method("(I)V", code);
        let simulation = simulate(&method, &Settings::new()).unwrap();
        assert!(simulation.is_complete());

        let head = simulation.frame_before(2).unwrap();
        let counter = head.load(1).unwrap();
        assert_eq!(simulation.values.value(counter), &Value::unknown(crate::jvm::BaseType::Int));
        assert!(simulation.is_reachable(7));
        assert_eq!(simulation.max_locals, 2);
        assert_eq!(simulation.max_stack, 2);
        assert_eq!(simulation.frames_after(4).len(), 2);
        assert_eq!(simulation.frames_after(7).len(), 0);
    }

    #[test]
    fn handlers_receive_the_exception() {
        let code = Code::with_handlers(
            vec![IConst1, IStore(0), IConst0, Return, AStore(1), Return],
            vec![ExceptionHandler {
                start: 0,
                end: 3,
                handler: 4,
                catch_type: None,
            }],
        );
        let method = method("()V", code);
        let simulation = simulate(&method, &Settings::new()).unwrap();

        let frame = simulation.frame_before(4).unwrap();
        let exception = frame.stack_values()[0];
        let record = simulation.values.get(exception);
        assert_eq!(record.source, ValueSource::Exception);
        assert_eq!(record.value, Value::reference(RefType::Object(BinaryName::THROWABLE)));

        // Local 0 is only set on some paths into the handler
        assert_eq!(frame.local(0), None);

        let mut without = Settings::new();
        without.follow_exception_handlers = false;
        let simulation = simulate(&method, &without).unwrap();
        assert!(!simulation.is_reachable(4));
    }

    #[test]
    fn iteration_cap() {
        let code = Code::new(vec![IConst0, IStore(0), IInc(0, 1), Goto(2)]);
        let method = method("()V", code);
        let mut settings = Settings::new();
        settings.max_iterations = Some(3);
        let simulation = simulate(&method, &settings).unwrap();
        assert_eq!(simulation.completion, Completion::Incomplete);
        assert_eq!(simulation.iterations, 3);

        let simulation = simulate(&method, &Settings::new()).unwrap();
        assert!(simulation.is_complete());
        let counter = simulation.frame_before(3).unwrap().load(0).unwrap();
        assert_eq!(simulation.values.value(counter).literal(), None::<&Literal>);
    }
}
