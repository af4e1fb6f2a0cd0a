//! Transfer functions
//!
//! [`interpret`] executes one instruction against the frame recorded before it and returns the
//! frames flowing out of it. There is one arm per instruction kind in a single `match`, so adding
//! an instruction to [`Instruction`] means the compiler points out where it needs a rule.

use super::symbolic::{self, Simulated};
use super::{
    BlockTree, Frame, Literal, ReferenceLiteral, Settings, SimulationErrorKind, Slot,
    UnsupportedPolicy, Value, ValueArena, ValueId, ValueSource,
};
use crate::jvm::code::{
    CallSite, CompareMode, EqComparison, InsnIndex, Instruction, InvokeType, Method, MethodRef,
    ShiftType,
};
use crate::jvm::{BaseType, FieldType, RefType};

/// Kind of control flow edge
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum Edge {
    /// Continue on to the next instruction
    FallThrough,

    /// Explicit branch, jump, switch, or subroutine edge
    Jump,

    /// Exception thrown inside a protected range
    Handler,
}

/// Frame flowing out of an instruction
#[derive(Clone, Debug, PartialEq)]
pub struct Successor {
    pub target: InsnIndex,
    pub frame: Frame,
    pub edge: Edge,
}

/// Everything one execution of an instruction did
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Effect {
    /// Values popped off the stack, in the order they were popped
    pub consumed: Vec<ValueId>,

    /// Values pushed onto the stack, in the order they were pushed
    pub produced: Vec<ValueId>,

    pub successors: Vec<Successor>,
}

/// Execute the instruction at `index` starting from `frame`
///
/// Branch edges get registered in the block tree as they are executed. Exception handler edges
/// are not produced here (see the executor).
pub fn interpret(
    method: &Method,
    index: InsnIndex,
    frame: &Frame,
    arena: &mut ValueArena,
    blocks: &mut BlockTree,
    settings: &Settings,
) -> Result<Effect, SimulationErrorKind> {
    use Instruction::*;

    let insn = method
        .code
        .get(index)
        .ok_or(SimulationErrorKind::TargetOutOfBounds(index))?;
    log::trace!("{}: {:?} (stack depth {})", index, insn, frame.stack_depth());

    let mut step = Step {
        index,
        frame: frame.clone(),
        arena,
        blocks,
        settings,
        consumed: vec![],
        produced: vec![],
    };

    let flow = match insn {
        Nop => Flow::Next,

        AConstNull => step.constant(Value::Null)?,
        IConstM1 => step.constant(Value::int(-1))?,
        IConst0 => step.constant(Value::int(0))?,
        IConst1 => step.constant(Value::int(1))?,
        IConst2 => step.constant(Value::int(2))?,
        IConst3 => step.constant(Value::int(3))?,
        IConst4 => step.constant(Value::int(4))?,
        IConst5 => step.constant(Value::int(5))?,
        LConst0 => step.constant(Value::long(0))?,
        LConst1 => step.constant(Value::long(1))?,
        FConst0 => step.constant(Value::float(0.0))?,
        FConst1 => step.constant(Value::float(1.0))?,
        FConst2 => step.constant(Value::float(2.0))?,
        DConst0 => step.constant(Value::double(0.0))?,
        DConst1 => step.constant(Value::double(1.0))?,
        BiPush(b) => step.constant(Value::int(*b as i32))?,
        SiPush(s) => step.constant(Value::int(*s as i32))?,
        Ldc(constant) => step.constant(Value::of_constant(constant, None))?,

        ILoad(slot) => step.load(*slot, BaseType::Int)?,
        LLoad(slot) => step.load(*slot, BaseType::Long)?,
        FLoad(slot) => step.load(*slot, BaseType::Float)?,
        DLoad(slot) => step.load(*slot, BaseType::Double)?,
        ALoad(slot) => step.load_reference(*slot)?,
        IStore(slot) => step.store(*slot, BaseType::Int)?,
        LStore(slot) => step.store(*slot, BaseType::Long)?,
        FStore(slot) => step.store(*slot, BaseType::Float)?,
        DStore(slot) => step.store(*slot, BaseType::Double)?,
        AStore(slot) => step.store_reference(*slot)?,
        IInc(slot, by) => step.increment(*slot, *by)?,

        IALoad => step.array_load(Some(BaseType::Int))?,
        LALoad => step.array_load(Some(BaseType::Long))?,
        FALoad => step.array_load(Some(BaseType::Float))?,
        DALoad => step.array_load(Some(BaseType::Double))?,
        AALoad => step.array_load(None)?,
        BALoad => step.array_load(Some(BaseType::Byte))?,
        CALoad => step.array_load(Some(BaseType::Char))?,
        SALoad => step.array_load(Some(BaseType::Short))?,
        IAStore => step.array_store(Some(BaseType::Int))?,
        LAStore => step.array_store(Some(BaseType::Long))?,
        FAStore => step.array_store(Some(BaseType::Float))?,
        DAStore => step.array_store(Some(BaseType::Double))?,
        AAStore => step.array_store(None)?,
        BAStore => step.array_store(Some(BaseType::Byte))?,
        CAStore => step.array_store(Some(BaseType::Char))?,
        SAStore => step.array_store(Some(BaseType::Short))?,

        // Patterns index the slots taken off the top of the stack, bottom first
        Pop => step.shuffle(1, &[])?,
        Pop2 => step.shuffle(2, &[])?,
        Dup => step.shuffle(1, &[0, 0])?,
        DupX1 => step.shuffle(2, &[1, 0, 1])?,
        DupX2 => step.shuffle(3, &[2, 0, 1, 2])?,
        Dup2 => step.shuffle(2, &[0, 1, 0, 1])?,
        Dup2X1 => step.shuffle(3, &[1, 2, 0, 1, 2])?,
        Dup2X2 => step.shuffle(4, &[2, 3, 0, 1, 2, 3])?,
        Swap => step.shuffle(2, &[1, 0])?,

        IAdd | ISub | IMul | IDiv | IRem | IAnd | IOr | IXor => {
            step.binary(insn, BaseType::Int, BaseType::Int, None)?
        }
        LAdd | LSub | LMul | LDiv | LRem | LAnd | LOr | LXor => {
            step.binary(insn, BaseType::Long, BaseType::Long, None)?
        }
        FAdd | FSub | FMul | FDiv | FRem => {
            step.binary(insn, BaseType::Float, BaseType::Float, None)?
        }
        DAdd | DSub | DMul | DDiv | DRem => {
            step.binary(insn, BaseType::Double, BaseType::Double, None)?
        }
        ISh(_) => step.binary(insn, BaseType::Int, BaseType::Int, None)?,
        LSh(_) => step.binary(insn, BaseType::Long, BaseType::Int, None)?,
        LCmp => step.binary(insn, BaseType::Long, BaseType::Long, Some(BaseType::Int))?,
        FCmp(_) => step.binary(insn, BaseType::Float, BaseType::Float, Some(BaseType::Int))?,
        DCmp(_) => step.binary(insn, BaseType::Double, BaseType::Double, Some(BaseType::Int))?,

        INeg => step.unary(BaseType::Int, BaseType::Int, negate)?,
        LNeg => step.unary(BaseType::Long, BaseType::Long, negate)?,
        FNeg => step.unary(BaseType::Float, BaseType::Float, negate)?,
        DNeg => step.unary(BaseType::Double, BaseType::Double, negate)?,
        I2L => step.convert(BaseType::Int, BaseType::Long)?,
        I2F => step.convert(BaseType::Int, BaseType::Float)?,
        I2D => step.convert(BaseType::Int, BaseType::Double)?,
        L2I => step.convert(BaseType::Long, BaseType::Int)?,
        L2F => step.convert(BaseType::Long, BaseType::Float)?,
        L2D => step.convert(BaseType::Long, BaseType::Double)?,
        F2I => step.convert(BaseType::Float, BaseType::Int)?,
        F2L => step.convert(BaseType::Float, BaseType::Long)?,
        F2D => step.convert(BaseType::Float, BaseType::Double)?,
        D2I => step.convert(BaseType::Double, BaseType::Int)?,
        D2L => step.convert(BaseType::Double, BaseType::Long)?,
        D2F => step.convert(BaseType::Double, BaseType::Float)?,
        I2B => step.convert(BaseType::Int, BaseType::Byte)?,
        I2C => step.convert(BaseType::Int, BaseType::Char)?,
        I2S => step.convert(BaseType::Int, BaseType::Short)?,

        If(_, target) => {
            step.pop_primitive(BaseType::Int)?;
            Flow::jump(vec![*target], true)
        }
        IfICmp(_, target) => {
            step.pop_primitive(BaseType::Int)?;
            step.pop_primitive(BaseType::Int)?;
            Flow::jump(vec![*target], true)
        }
        IfACmp(_, target) => {
            step.pop_reference()?;
            step.pop_reference()?;
            Flow::jump(vec![*target], true)
        }
        IfNull(comparison, target) => {
            let tested = step.pop_reference()?;
            return Ok(step.null_branch(*comparison, *target, tested));
        }
        Goto(target) => Flow::jump(vec![*target], false),
        Jsr(target) => {
            step.constant(Value::ReturnAddress(index + 1))?;
            Flow::jump(vec![*target], false)
        }
        Ret(slot) => match step.frame.local(*slot).map(|id| step.arena.value(id)) {
            Some(Value::ReturnAddress(target)) => Flow::jump(vec![*target], false),
            _ => {
                step.unsupported(SimulationErrorKind::UnresolvedReturnAddress(*slot))?;
                Flow::Stop
            }
        },
        TableSwitch { .. } | LookupSwitch { .. } => {
            step.pop_primitive(BaseType::Int)?;
            Flow::jump(insn.jump_targets(), false)
        }

        IReturn => step.exit(Some(BaseType::Int))?,
        LReturn => step.exit(Some(BaseType::Long))?,
        FReturn => step.exit(Some(BaseType::Float))?,
        DReturn => step.exit(Some(BaseType::Double))?,
        AReturn | AThrow => step.exit(None)?,
        Return => Flow::Stop,

        GetStatic(field) => {
            let value = match &field.constant_value {
                Some(constant) => Value::of_constant(constant, Some(&field.descriptor)),
                None => Value::of_type(&field.descriptor),
            };
            step.push_new(value, ValueSource::Field, vec![])?;
            Flow::Next
        }
        PutStatic(field) => {
            let value = step.pop_typed(&field.descriptor)?;
            step.escape(value);
            Flow::Next
        }
        GetField(field) => {
            let object = step.pop_reference()?;
            step.push_new(Value::of_type(&field.descriptor), ValueSource::Field, vec![object])?;
            Flow::Next
        }
        PutField(field) => {
            let value = step.pop_typed(&field.descriptor)?;
            step.pop_reference()?;
            step.escape(value);
            Flow::Next
        }
        Invoke(invoke_type, method_ref) => step.invoke(*invoke_type, method_ref)?,
        InvokeDynamic(call_site) => step.invoke_dynamic(call_site)?,

        New(class) => {
            let value = Value::reference(RefType::Object(class.clone()));
            step.push_new(value, ValueSource::New, vec![])?;
            Flow::Next
        }
        NewArray(element) => step.new_array(RefType::array(FieldType::Base(*element)), 1)?,
        ANewArray(element) => step.new_array(RefType::array(FieldType::Ref(element.clone())), 1)?,
        MultiANewArray(array_type, dimensions) => {
            step.new_array(array_type.clone(), *dimensions as usize)?
        }
        ArrayLength => {
            let array = step.pop_reference()?;
            step.push_new(Value::unknown(BaseType::Int), ValueSource::Computed, vec![array])?;
            Flow::Next
        }
        CheckCast(target_type) => {
            let object = step.pop_reference()?;
            let value = match step.arena.value(object) {
                Value::Reference { literal, .. } => Value::Reference {
                    static_type: target_type.clone(),
                    literal: literal.clone(),
                },
                other => other.clone(),
            };
            let cast = step
                .arena
                .derive_with_source(object, value, ValueSource::Cast, index);
            step.push(cast)?;
            Flow::Next
        }
        InstanceOf(_) => {
            let object = step.pop_reference()?;
            let literal = match step.arena.value(object) {
                Value::Null => Some(Literal::Int(0)),
                _ => None,
            };
            let value = Value::Primitive {
                kind: BaseType::Int,
                literal,
            };
            step.push_new(value, ValueSource::Computed, vec![object])?;
            Flow::Next
        }
        MonitorEnter | MonitorExit => {
            step.pop_reference()?;
            Flow::Next
        }
    };

    Ok(step.finish(flow))
}

/// Where control goes after an instruction
enum Flow {
    /// Fall through to the next instruction
    Next,

    /// Explicit targets, possibly also falling through
    Jump {
        targets: Vec<InsnIndex>,
        falls_through: bool,
    },

    /// No successors (return, throw)
    Stop,
}

impl Flow {
    fn jump(targets: Vec<InsnIndex>, falls_through: bool) -> Flow {
        Flow::Jump {
            targets,
            falls_through,
        }
    }
}

/// State while executing one instruction
struct Step<'a> {
    index: InsnIndex,
    frame: Frame,
    arena: &'a mut ValueArena,
    blocks: &'a mut BlockTree,
    settings: &'a Settings,
    consumed: Vec<ValueId>,
    produced: Vec<ValueId>,
}

type StepResult<T> = Result<T, SimulationErrorKind>;

impl<'a> Step<'a> {
    fn pop(&mut self) -> StepResult<ValueId> {
        let id = self.frame.pop(self.arena, self.index)?;
        if id == ValueId::UNINITIALIZED {
            return Err(SimulationErrorKind::UninitializedOperand);
        }
        self.consumed.push(id);
        Ok(id)
    }

    /// Pop a primitive operand of the given kind, along with its kind and literal
    fn pop_primitive(&mut self, expected: BaseType) -> StepResult<(ValueId, BaseType, Option<Literal>)> {
        let id = self.pop()?;
        let value = self.arena.value(id);
        match value {
            Value::Primitive { kind, literal } if value.fits_primitive(expected) => {
                Ok((id, *kind, *literal))
            }
            _ => Err(SimulationErrorKind::TypeMismatch {
                expected: expected.keyword(),
                found: value.clone(),
            }),
        }
    }

    fn pop_reference(&mut self) -> StepResult<ValueId> {
        let id = self.pop()?;
        let value = self.arena.value(id);
        if value.is_reference() {
            Ok(id)
        } else {
            Err(SimulationErrorKind::TypeMismatch {
                expected: "reference",
                found: value.clone(),
            })
        }
    }

    fn pop_typed(&mut self, field_type: &FieldType) -> StepResult<ValueId> {
        match field_type {
            FieldType::Base(kind) => Ok(self.pop_primitive(*kind)?.0),
            FieldType::Ref(_) => self.pop_reference(),
        }
    }

    fn push(&mut self, id: ValueId) -> StepResult<()> {
        self.frame.push(id, self.arena, self.index)?;
        self.produced.push(id);
        Ok(())
    }

    /// Push a value produced by this instruction
    fn push_new(
        &mut self,
        value: Value,
        source: ValueSource,
        operands: Vec<ValueId>,
    ) -> StepResult<ValueId> {
        let id = self.arena.alloc(value, source, vec![self.index], operands);
        self.push(id)?;
        Ok(id)
    }

    fn constant(&mut self, value: Value) -> StepResult<Flow> {
        self.push_new(value, ValueSource::Constant, vec![])?;
        Ok(Flow::Next)
    }

    fn unsupported(&self, kind: SimulationErrorKind) -> StepResult<()> {
        match self.settings.unsupported_policy {
            UnsupportedPolicy::Fail => Err(kind),
            UnsupportedPolicy::Collapse => {
                log::warn!("Collapsing unsupported operation at {}: {:?}", self.index, kind);
                Ok(())
            }
        }
    }

    fn load(&mut self, slot: u16, expected: BaseType) -> StepResult<Flow> {
        let id = self.frame.load(slot)?;
        let value = self.arena.value(id);
        if !value.fits_primitive(expected) {
            return Err(SimulationErrorKind::TypeMismatch {
                expected: expected.keyword(),
                found: value.clone(),
            });
        }
        let copy = self.arena.relocate(id, self.index)?;
        self.push(copy)?;
        Ok(Flow::Next)
    }

    fn load_reference(&mut self, slot: u16) -> StepResult<Flow> {
        let id = self.frame.load(slot)?;
        let value = self.arena.value(id);
        if !value.is_reference() {
            return Err(SimulationErrorKind::TypeMismatch {
                expected: "reference",
                found: value.clone(),
            });
        }
        let copy = self.arena.relocate(id, self.index)?;
        self.push(copy)?;
        Ok(Flow::Next)
    }

    fn store(&mut self, slot: u16, expected: BaseType) -> StepResult<Flow> {
        let (id, _, _) = self.pop_primitive(expected)?;
        let copy = self.arena.relocate(id, self.index)?;
        self.frame.store(slot, copy, self.arena)?;
        Ok(Flow::Next)
    }

    /// `astore` also accepts return addresses
    fn store_reference(&mut self, slot: u16) -> StepResult<Flow> {
        let id = self.pop()?;
        let value = self.arena.value(id);
        if !value.is_reference() && !matches!(value, Value::ReturnAddress(_)) {
            return Err(SimulationErrorKind::TypeMismatch {
                expected: "reference or return address",
                found: value.clone(),
            });
        }
        let copy = self.arena.relocate(id, self.index)?;
        self.frame.store(slot, copy, self.arena)?;
        Ok(Flow::Next)
    }

    fn increment(&mut self, slot: u16, by: i16) -> StepResult<Flow> {
        let current = self.frame.load(slot)?;
        let value = self.arena.value(current);
        if !value.fits_primitive(BaseType::Int) {
            return Err(SimulationErrorKind::TypeMismatch {
                expected: "int",
                found: value.clone(),
            });
        }
        let literal = value
            .literal()
            .map(|literal| Literal::Int(literal.as_i32().wrapping_add(by as i32)));
        let value = Value::Primitive {
            kind: BaseType::Int,
            literal,
        };
        let incremented = self
            .arena
            .alloc(value, ValueSource::Computed, vec![self.index], vec![current]);
        self.frame.store(slot, incremented, self.arena)?;
        Ok(Flow::Next)
    }

    /// Array load (`None` is for `aaload`, where the element type comes from the array)
    fn array_load(&mut self, element: Option<BaseType>) -> StepResult<Flow> {
        let (index, _, _) = self.pop_primitive(BaseType::Int)?;
        let array = self.pop_reference()?;
        let value = match element {
            Some(kind) => Value::unknown(kind),
            None => match self.arena.value(array) {
                Value::Reference { static_type, .. } => match static_type.element_type() {
                    Some(FieldType::Ref(element_type)) => Value::reference(element_type),
                    _ => Value::reference(RefType::OBJECT),
                },
                _ => Value::reference(RefType::OBJECT),
            },
        };
        self.push_new(value, ValueSource::ArrayElement, vec![array, index])?;
        Ok(Flow::Next)
    }

    fn array_store(&mut self, element: Option<BaseType>) -> StepResult<Flow> {
        let value = match element {
            Some(kind) => self.pop_primitive(kind)?.0,
            None => self.pop_reference()?,
        };
        self.pop_primitive(BaseType::Int)?;
        self.pop_reference()?;
        self.escape(value);
        Ok(Flow::Next)
    }

    fn new_array(&mut self, array_type: RefType, dimensions: usize) -> StepResult<Flow> {
        let mut counts = vec![];
        for _ in 0..dimensions {
            counts.push(self.pop_primitive(BaseType::Int)?.0);
        }
        counts.reverse();
        self.push_new(Value::reference(array_type), ValueSource::New, counts)?;
        Ok(Flow::Next)
    }

    /// Take `take` slots off the stack and push them back in the order of `pattern`
    ///
    /// The first occurrence of a taken value in the pattern is the value itself, later ones are
    /// copies. So `dup` leaves the original where it was and pushes a copy on top.
    fn shuffle(&mut self, take: usize, pattern: &[usize]) -> StepResult<Flow> {
        let taken = self.frame.pop_slots(take)?;
        for slot in &taken {
            if let Slot::Value(id) = slot {
                if *id == ValueId::UNINITIALIZED {
                    return Err(SimulationErrorKind::UninitializedOperand);
                }
                self.arena.record_pop(*id, self.index);
                self.consumed.push(*id);
            }
        }

        for (position, from) in pattern.iter().enumerate() {
            let slot = match taken[*from] {
                Slot::Value(id) if pattern[..position].contains(from) => {
                    let copy = self.arena.duplicate(id, self.index)?;
                    self.arena.record_push(copy, self.index)?;
                    Slot::Value(copy)
                }
                slot => slot,
            };
            if let Slot::Value(id) = slot {
                self.produced.push(id);
            }
            self.frame.stack.push(slot);
        }
        self.frame.check_stack_shape(self.arena)?;
        Ok(Flow::Next)
    }

    /// Binary operation on primitives (`result` defaults to the promoted operand type)
    fn binary(
        &mut self,
        insn: &Instruction,
        operand: BaseType,
        rhs_operand: BaseType,
        result: Option<BaseType>,
    ) -> StepResult<Flow> {
        let (rhs, rhs_kind, rhs_literal) = self.pop_primitive(rhs_operand)?;
        let (lhs, lhs_kind, lhs_literal) = self.pop_primitive(operand)?;
        let kind = result.unwrap_or_else(|| lhs_kind.promote(rhs_kind).promote(operand));
        let literal = lhs_literal
            .zip(rhs_literal)
            .and_then(|(a, b)| fold_binary(insn, a, b));
        let value = Value::Primitive { kind, literal };
        self.push_new(value, ValueSource::Computed, vec![lhs, rhs])?;
        Ok(Flow::Next)
    }

    fn unary(
        &mut self,
        operand: BaseType,
        result: BaseType,
        fold: impl FnOnce(Literal) -> Literal,
    ) -> StepResult<Flow> {
        let (id, _, literal) = self.pop_primitive(operand)?;
        let value = Value::Primitive {
            kind: result,
            literal: literal.map(fold),
        };
        self.push_new(value, ValueSource::Computed, vec![id])?;
        Ok(Flow::Next)
    }

    fn convert(&mut self, operand: BaseType, result: BaseType) -> StepResult<Flow> {
        self.unary(operand, result, |literal| literal.convert(result))
    }

    fn exit(&mut self, returned: Option<BaseType>) -> StepResult<Flow> {
        match returned {
            Some(kind) => {
                self.pop_primitive(kind)?;
            }
            None => {
                self.pop_reference()?;
            }
        }
        Ok(Flow::Stop)
    }

    fn invoke(&mut self, invoke_type: InvokeType, method: &MethodRef) -> StepResult<Flow> {
        let mut arguments = vec![];
        for parameter in method.descriptor.parameters.iter().rev() {
            arguments.push(self.pop_typed(parameter)?);
        }
        arguments.reverse();
        let receiver = if invoke_type.has_receiver() {
            Some(self.pop_reference()?)
        } else {
            None
        };

        if self.settings.simulate_pure_calls && symbolic::is_modeled(&method.owner) {
            let receiver_value = receiver.map(|id| self.arena.value(id).clone());
            let argument_values: Vec<Value> = arguments
                .iter()
                .map(|id| self.arena.value(*id).clone())
                .collect();
            match symbolic::simulate(method, receiver_value.as_ref(), &argument_values) {
                Ok(simulated) => {
                    self.apply_simulated(simulated, receiver, &arguments)?;
                    return Ok(Flow::Next);
                }
                Err(kind) => self.unsupported(kind)?,
            }
        }

        // Unknown code could do anything to builders handed to it
        for value in receiver.iter().chain(&arguments) {
            self.escape(*value);
        }
        if let Some(return_type) = &method.descriptor.return_type {
            let operands = receiver.into_iter().chain(arguments).collect();
            self.push_new(Value::of_type(return_type), ValueSource::MethodReturn, operands)?;
        }
        Ok(Flow::Next)
    }

    fn invoke_dynamic(&mut self, call_site: &CallSite) -> StepResult<Flow> {
        let mut arguments = vec![];
        for parameter in call_site.descriptor.parameters.iter().rev() {
            arguments.push(self.pop_typed(parameter)?);
        }
        arguments.reverse();
        for argument in &arguments {
            self.escape(*argument);
        }
        if let Some(return_type) = &call_site.descriptor.return_type {
            self.push_new(Value::of_type(return_type), ValueSource::MethodReturn, arguments)?;
        }
        Ok(Flow::Next)
    }

    fn apply_simulated(
        &mut self,
        simulated: Simulated,
        receiver: Option<ValueId>,
        arguments: &[ValueId],
    ) -> StepResult<()> {
        let operands: Vec<ValueId> = receiver.into_iter().chain(arguments.iter().copied()).collect();
        match (simulated, receiver) {
            (Simulated::Returns(value), _) | (Simulated::MutatesAndReturns(value), None) => {
                self.push_new(value, ValueSource::MethodReturn, operands)?;
            }
            (Simulated::Mutates(value), Some(receiver)) => self.mutate(receiver, value),
            (Simulated::Mutates(_), None) => (),
            (Simulated::MutatesAndReturns(value), Some(receiver)) => {
                self.mutate(receiver, value.clone());
                let returned = self.arena.derive(receiver, value, self.index);
                self.push(returned)?;
            }
        }
        Ok(())
    }

    /// Replace every copy of the receiver in the frame with a new state of the same object
    fn mutate(&mut self, receiver: ValueId, value: Value) {
        let origin = self.arena.origin(receiver);
        let index = self.index;
        let arena = &mut *self.arena;
        self.frame.replace_all(|id| {
            if id != ValueId::UNINITIALIZED && arena.origin(id) == origin {
                Some(arena.derive(id, value.clone(), index))
            } else {
                None
            }
        });
    }

    /// Forget the contents of a builder that leaks to code we don't model
    fn escape(&mut self, id: ValueId) {
        let forgotten = match self.arena.value(id) {
            Value::Reference {
                static_type,
                literal: Some(ReferenceLiteral::Builder(_)),
            } => Value::reference(static_type.clone()),
            _ => return,
        };
        log::debug!("Builder {:?} escapes at {}", id, self.index);
        self.mutate(id, forgotten);
    }

    /// `ifnull` or `ifnonnull`: the tested value and all of its copies are guarded on the
    /// non-null arm
    fn null_branch(self, comparison: EqComparison, target: InsnIndex, tested: ValueId) -> Effect {
        self.blocks.insert_edge(self.index, target);

        let origin = self.arena.origin(tested);
        let index = self.index;
        let arena = self.arena;
        let mut refined = self.frame.clone();
        refined.replace_all(|id| {
            if id != ValueId::UNINITIALIZED && arena.origin(id) == origin {
                Some(arena.guard(id, index))
            } else {
                None
            }
        });

        let (fall_through, jump) = match comparison {
            EqComparison::EQ => (refined, self.frame),
            EqComparison::NE => (self.frame, refined),
        };
        Effect {
            consumed: self.consumed,
            produced: self.produced,
            successors: vec![
                Successor {
                    target: index + 1,
                    frame: fall_through,
                    edge: Edge::FallThrough,
                },
                Successor {
                    target,
                    frame: jump,
                    edge: Edge::Jump,
                },
            ],
        }
    }

    fn finish(self, flow: Flow) -> Effect {
        let mut successors = vec![];
        match flow {
            Flow::Stop => (),
            Flow::Next => successors.push(Successor {
                target: self.index + 1,
                frame: self.frame,
                edge: Edge::FallThrough,
            }),
            Flow::Jump {
                targets,
                falls_through,
            } => {
                if falls_through {
                    successors.push(Successor {
                        target: self.index + 1,
                        frame: self.frame.clone(),
                        edge: Edge::FallThrough,
                    });
                }
                for target in targets {
                    self.blocks.insert_edge(self.index, target);
                    successors.push(Successor {
                        target,
                        frame: self.frame.clone(),
                        edge: Edge::Jump,
                    });
                }
            }
        }
        Effect {
            consumed: self.consumed,
            produced: self.produced,
            successors,
        }
    }
}

fn negate(literal: Literal) -> Literal {
    match literal {
        Literal::Int(i) => Literal::Int(i.wrapping_neg()),
        Literal::Long(l) => Literal::Long(l.wrapping_neg()),
        Literal::Float(f) => Literal::Float(-f),
        Literal::Double(d) => Literal::Double(-d),
    }
}

/// `-1`, `0`, or `1`, with `NaN` going to `-1` or `1` depending on the mode
fn compare<T: PartialOrd>(a: T, b: T, mode: CompareMode) -> i32 {
    match a.partial_cmp(&b) {
        Some(ordering) => ordering as i32,
        None => match mode {
            CompareMode::L => -1,
            CompareMode::G => 1,
        },
    }
}

/// Constant fold a binary instruction (`None` if the result isn't a constant, eg. division by 0)
fn fold_binary(insn: &Instruction, a: Literal, b: Literal) -> Option<Literal> {
    use Instruction::*;
    use Literal::{Double, Float, Int, Long};

    let folded = match (insn, a, b) {
        (IDiv | IRem, Int(_), Int(0)) | (LDiv | LRem, Long(_), Long(0)) => return None,

        (IAdd, Int(a), Int(b)) => Int(a.wrapping_add(b)),
        (ISub, Int(a), Int(b)) => Int(a.wrapping_sub(b)),
        (IMul, Int(a), Int(b)) => Int(a.wrapping_mul(b)),
        (IDiv, Int(a), Int(b)) => Int(a.wrapping_div(b)),
        (IRem, Int(a), Int(b)) => Int(a.wrapping_rem(b)),
        (IAnd, Int(a), Int(b)) => Int(a & b),
        (IOr, Int(a), Int(b)) => Int(a | b),
        (IXor, Int(a), Int(b)) => Int(a ^ b),
        (ISh(ShiftType::Left), Int(a), Int(b)) => Int(a.wrapping_shl(b as u32)),
        (ISh(ShiftType::ArithmeticRight), Int(a), Int(b)) => Int(a.wrapping_shr(b as u32)),
        (ISh(ShiftType::LogicalRight), Int(a), Int(b)) => {
            Int((a as u32).wrapping_shr(b as u32) as i32)
        }

        (LAdd, Long(a), Long(b)) => Long(a.wrapping_add(b)),
        (LSub, Long(a), Long(b)) => Long(a.wrapping_sub(b)),
        (LMul, Long(a), Long(b)) => Long(a.wrapping_mul(b)),
        (LDiv, Long(a), Long(b)) => Long(a.wrapping_div(b)),
        (LRem, Long(a), Long(b)) => Long(a.wrapping_rem(b)),
        (LAnd, Long(a), Long(b)) => Long(a & b),
        (LOr, Long(a), Long(b)) => Long(a | b),
        (LXor, Long(a), Long(b)) => Long(a ^ b),
        (LSh(ShiftType::Left), Long(a), Int(b)) => Long(a.wrapping_shl(b as u32)),
        (LSh(ShiftType::ArithmeticRight), Long(a), Int(b)) => Long(a.wrapping_shr(b as u32)),
        (LSh(ShiftType::LogicalRight), Long(a), Int(b)) => {
            Long((a as u64).wrapping_shr(b as u32) as i64)
        }

        (FAdd, Float(a), Float(b)) => Float(a + b),
        (FSub, Float(a), Float(b)) => Float(a - b),
        (FMul, Float(a), Float(b)) => Float(a * b),
        (FDiv, Float(a), Float(b)) => Float(a / b),
        (FRem, Float(a), Float(b)) => Float(a % b),

        (DAdd, Double(a), Double(b)) => Double(a + b),
        (DSub, Double(a), Double(b)) => Double(a - b),
        (DMul, Double(a), Double(b)) => Double(a * b),
        (DDiv, Double(a), Double(b)) => Double(a / b),
        (DRem, Double(a), Double(b)) => Double(a % b),

        (LCmp, Long(a), Long(b)) => Int(a.cmp(&b) as i32),
        (FCmp(mode), Float(a), Float(b)) => Int(compare(a, b, *mode)),
        (DCmp(mode), Double(a), Double(b)) => Int(compare(a, b, *mode)),

        _ => return None,
    };
    Some(folded)
}

#[cfg(test)]
mod test {
    use super::Instruction::*;
    use super::*;
    use crate::jvm::code::Code;
    use crate::jvm::{
        BinaryName, MethodAccessFlags, MethodDescriptor, Name, ParseDescriptor, UnqualifiedName,
    };

    fn method(descriptor: &str, instructions: Vec<Instruction>) -> Method {
        Method::new(
            BinaryName::from_string(String::from("me/Test")).unwrap(),
            UnqualifiedName::from_string(String::from("test")).unwrap(),
            MethodDescriptor::parse(descriptor).unwrap(),
            MethodAccessFlags::STATIC,
            Code::new(instructions),
        )
    }

    /// Run straight-line code up to (not including) `until`, returning the frame before it
    fn run_until(
        method: &Method,
        until: InsnIndex,
        arena: &mut ValueArena,
        blocks: &mut BlockTree,
    ) -> Frame {
        let settings = Settings::new();
        let mut frame = Frame::entry(method, arena);
        for index in 0..until {
            let effect = interpret(method, index, &frame, arena, blocks, &settings).unwrap();
            frame = effect.successors[0].frame.clone();
        }
        frame
    }

    fn top(frame: &Frame) -> ValueId {
        *frame.stack_values().last().unwrap()
    }

    #[test]
    fn constant_folding() {
        let cases = vec![
            (vec![IConst3, IConst4, IAdd], Value::int(7)),
            (vec![BiPush(-8), IConst1, ISh(ShiftType::LogicalRight)], Value::int(0x7fff_fffc)),
            (vec![IConst1, IConst0, IDiv], Value::unknown(BaseType::Int)),
            (vec![LConst1, IConst2, LSh(ShiftType::Left)], Value::long(4)),
            (vec![BiPush(100), I2B], Value::Primitive {
                kind: BaseType::Byte,
                literal: Some(Literal::Int(100)),
            }),
            (vec![DConst0, DConst0, DDiv, DConst1, DCmp(CompareMode::G)], Value::int(1)),
            (vec![DConst0, DConst0, DDiv, DConst1, DCmp(CompareMode::L)], Value::int(-1)),
            (vec![LConst0, LConst1, LCmp], Value::int(-1)),
            (vec![FConst2, F2I, INeg], Value::int(-2)),
        ];
        for (instructions, expected) in cases {
            let len = instructions.len();
            let method = method("()V", instructions);
            let mut arena = ValueArena::new();
            let mut blocks = BlockTree::new(len);
            let frame = run_until(&method, len, &mut arena, &mut blocks);
            assert_eq!(arena.value(top(&frame)), &expected, "{:?}", method.code);
        }
    }

    #[test]
    fn duplicates_keep_the_original() {
        let method = method("()V", vec![IConst1, IConst2, DupX1, Pop, Pop, Pop]);
        let mut arena = ValueArena::new();
        let mut blocks = BlockTree::new(6);
        let before = run_until(&method, 2, &mut arena, &mut blocks);
        let (one, two) = (before.stack_values()[0], before.stack_values()[1]);

        let after = run_until(&method, 3, &mut arena, &mut blocks);
        let values = after.stack_values();
        assert_eq!(values.len(), 3);
        assert_eq!(&values[..2], &[two, one]);
        assert_eq!(arena.origin(values[2]), two);
        assert_eq!(arena.get(values[2]).provenance, vec![1, 2]);
        assert_eq!(arena.get(values[2]).pusher, Some(2));
        assert_eq!(arena.get(two).provenance, vec![1]);
    }

    #[test]
    fn wide_shuffles() {
        // `dup2` on a long copies the whole value
        let method = method("()V", vec![LConst1, Dup2, LAdd]);
        let mut arena = ValueArena::new();
        let mut blocks = BlockTree::new(3);
        let frame = run_until(&method, 3, &mut arena, &mut blocks);
        assert_eq!(arena.value(top(&frame)), &Value::long(2));

        // `dup` can't split a long
        let method = self::method("()V", vec![LConst1, Dup]);
        let mut arena = ValueArena::new();
        let mut blocks = BlockTree::new(2);
        let frame = run_until(&method, 1, &mut arena, &mut blocks);
        let settings = Settings::new();
        assert_eq!(
            interpret(&method, 1, &frame, &mut arena, &mut blocks, &settings),
            Err(SimulationErrorKind::StackShapeMismatch)
        );
    }

    #[test]
    fn null_checks_refine_the_non_null_arm() {
        let method = method(
            "(Ljava/lang/String;)V",
            vec![ALoad(0), IfNull(EqComparison::NE, 4), Return, Nop, Return],
        );
        let mut arena = ValueArena::new();
        let mut blocks = BlockTree::new(5);
        let frame = run_until(&method, 1, &mut arena, &mut blocks);
        let settings = Settings::new();
        let effect = interpret(&method, 1, &frame, &mut arena, &mut blocks, &settings).unwrap();

        assert_eq!(effect.successors.len(), 2);
        let fall_through = &effect.successors[0];
        let jump = &effect.successors[1];
        assert_eq!((fall_through.target, jump.target), (2, 4));

        let unchecked = fall_through.frame.load(0).unwrap();
        let checked = jump.frame.load(0).unwrap();
        assert_eq!(arena.get(unchecked).null_check, None);
        assert_eq!(arena.get(checked).null_check, Some(1));
        assert_eq!(arena.origin(checked), arena.origin(unchecked));
        assert_eq!(blocks.len(), 2);
    }

    #[test]
    fn type_mismatches_are_structural() {
        let method = method("()V", vec![FConst0, IConst1, IAdd]);
        let mut arena = ValueArena::new();
        let mut blocks = BlockTree::new(3);
        let frame = run_until(&method, 2, &mut arena, &mut blocks);
        let settings = Settings::new();
        let result = interpret(&method, 2, &frame, &mut arena, &mut blocks, &settings);
        assert!(matches!(
            result,
            Err(SimulationErrorKind::TypeMismatch {
                expected: "int",
                ..
            })
        ));
    }

    #[test]
    fn unresolved_ret_follows_policy() {
        let method = method("(I)V", vec![Ret(0)]);
        let mut arena = ValueArena::new();
        let mut blocks = BlockTree::new(1);
        let frame = Frame::entry(&method, &mut arena);

        let effect = interpret(&method, 0, &frame, &mut arena, &mut blocks, &Settings::new()).unwrap();
        assert!(effect.successors.is_empty());

        let strict = Settings::new().strict();
        assert_eq!(
            interpret(&method, 0, &frame, &mut arena, &mut blocks, &strict),
            Err(SimulationErrorKind::UnresolvedReturnAddress(0))
        );
    }
}
