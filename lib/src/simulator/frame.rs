use super::{SimulationErrorKind, Value, ValueArena, ValueId, ValueSource};
use crate::jvm::code::{InsnIndex, Method};
use crate::jvm::RefType;
use crate::util::Width;

/// Contents of one stack or local slot
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum Slot {
    Value(ValueId),

    /// Second half of the `long` or `double` in the previous slot
    Continuation,
}

/// Snapshot of the stack and local variables at a point in the bytecode
///
/// Both are measured in slots, so a `long` or `double` takes up its own slot followed by a
/// [`Slot::Continuation`]. Frames are plain data: they are cloned whenever control splits and
/// the values themselves live in a [`ValueArena`].
#[derive(Debug, Clone, Eq, PartialEq, Default)]
pub struct Frame {
    /// Local variables in scope
    pub locals: Vec<Slot>,

    /// Values on the stack (top of the stack is last)
    pub stack: Vec<Slot>,
}

impl Frame {
    /// Frame on entry to a method: `this` (unless static) followed by the parameters
    pub fn entry(method: &Method, arena: &mut ValueArena) -> Frame {
        let mut frame = Frame::default();
        if !method.is_static() {
            let this = arena.alloc(
                Value::reference(RefType::Object(method.owner.clone())),
                ValueSource::This,
                vec![],
                vec![],
            );
            frame.locals.push(Slot::Value(this));
        }
        for parameter in &method.descriptor.parameters {
            let argument = arena.alloc(
                Value::of_type(parameter),
                ValueSource::Argument,
                vec![],
                vec![],
            );
            frame.locals.push(Slot::Value(argument));
            if parameter.width() == 2 {
                frame.locals.push(Slot::Continuation);
            }
        }
        frame
    }

    /// Stack size in slots
    pub fn stack_depth(&self) -> usize {
        self.stack.len()
    }

    /// Values on the stack, bottom first (continuations skipped)
    pub fn stack_values(&self) -> Vec<ValueId> {
        values(&self.stack)
    }

    /// Peek at a local without any checks
    pub fn local(&self, slot: u16) -> Option<ValueId> {
        match self.locals.get(slot as usize) {
            Some(Slot::Value(id)) if *id != ValueId::UNINITIALIZED => Some(*id),
            _ => None,
        }
    }

    /// Push a value on the stack, recording the pushing instruction
    pub fn push(
        &mut self,
        id: ValueId,
        arena: &mut ValueArena,
        insn: InsnIndex,
    ) -> Result<(), SimulationErrorKind> {
        arena.record_push(id, insn)?;
        let wide = arena.value(id).width() == 2;
        self.stack.push(Slot::Value(id));
        if wide {
            self.stack.push(Slot::Continuation);
        }
        Ok(())
    }

    /// Pop a value off the stack, recording the popping instruction
    ///
    /// A `long` or `double` is popped in one go along with its continuation.
    pub fn pop(
        &mut self,
        arena: &mut ValueArena,
        insn: InsnIndex,
    ) -> Result<ValueId, SimulationErrorKind> {
        let id = match self.stack.pop() {
            None => return Err(SimulationErrorKind::EmptyStack),
            Some(Slot::Continuation) => match self.stack.pop() {
                Some(Slot::Value(id)) if arena.value(id).width() == 2 => id,
                None => return Err(SimulationErrorKind::EmptyStack),
                Some(_) => return Err(SimulationErrorKind::StackShapeMismatch),
            },
            Some(Slot::Value(id)) => {
                if arena.value(id).width() == 2 {
                    return Err(SimulationErrorKind::StackShapeMismatch);
                }
                id
            }
        };
        arena.record_pop(id, insn);
        Ok(id)
    }

    /// Pop raw slots off the top of the stack (bottom first)
    ///
    /// This can't split a wide value: the lowest slot taken may not be a continuation.
    pub fn pop_slots(&mut self, count: usize) -> Result<Vec<Slot>, SimulationErrorKind> {
        let len = self.stack.len();
        if len < count {
            return Err(SimulationErrorKind::EmptyStack);
        }
        if count > 0 && self.stack[len - count] == Slot::Continuation {
            return Err(SimulationErrorKind::StackShapeMismatch);
        }
        Ok(self.stack.split_off(len - count))
    }

    /// Check that every wide value on the stack is followed by exactly its continuation
    pub fn check_stack_shape(&self, arena: &ValueArena) -> Result<(), SimulationErrorKind> {
        let mut expect_continuation = false;
        for slot in &self.stack {
            match slot {
                Slot::Continuation if expect_continuation => expect_continuation = false,
                Slot::Value(id) if !expect_continuation => {
                    expect_continuation = arena.value(*id).width() == 2;
                }
                _ => return Err(SimulationErrorKind::StackShapeMismatch),
            }
        }
        if expect_continuation {
            return Err(SimulationErrorKind::StackShapeMismatch);
        }
        Ok(())
    }

    /// Read a local variable
    pub fn load(&self, slot: u16) -> Result<ValueId, SimulationErrorKind> {
        match self.locals.get(slot as usize) {
            None => Err(SimulationErrorKind::ReadUninitialized(slot)),
            Some(Slot::Continuation) => Err(SimulationErrorKind::ReadContinuation(slot)),
            Some(Slot::Value(id)) if *id == ValueId::UNINITIALIZED => {
                Err(SimulationErrorKind::ReadUninitialized(slot))
            }
            Some(Slot::Value(id)) => Ok(*id),
        }
    }

    /// Write a local variable
    ///
    /// Storing a wide value reserves the following slot too. Overwriting either half of a wide
    /// value invalidates the whole thing, except that the continuation half can't be written
    /// on its own.
    pub fn store(
        &mut self,
        slot: u16,
        id: ValueId,
        arena: &ValueArena,
    ) -> Result<(), SimulationErrorKind> {
        let slot_idx = slot as usize;
        let wide = arena.value(id).width() == 2;
        let needed = slot_idx + if wide { 2 } else { 1 };
        if self.locals.len() < needed {
            self.locals
                .resize(needed, Slot::Value(ValueId::UNINITIALIZED));
        }

        // Clear out whatever wide value used to be in this slot
        match self.locals[slot_idx] {
            Slot::Continuation => return Err(SimulationErrorKind::WideSlotStraddle(slot)),
            Slot::Value(old) if arena.value(old).width() == 2 => {
                if let Some(next) = self.locals.get_mut(slot_idx + 1) {
                    *next = Slot::Value(ValueId::UNINITIALIZED);
                }
            }
            Slot::Value(_) => (),
        }

        if wide {
            // The slot being taken over as continuation might itself start a wide value
            if let Slot::Value(old) = self.locals[slot_idx + 1] {
                if arena.value(old).width() == 2 {
                    if let Some(next) = self.locals.get_mut(slot_idx + 2) {
                        *next = Slot::Value(ValueId::UNINITIALIZED);
                    }
                }
            }
            self.locals[slot_idx + 1] = Slot::Continuation;
        }
        self.locals[slot_idx] = Slot::Value(id);
        Ok(())
    }

    /// Replace values in every stack and local slot
    ///
    /// The function returns the replacement, or `None` to leave the slot alone.
    pub fn replace_all(&mut self, mut replace: impl FnMut(ValueId) -> Option<ValueId>) {
        for slot in self.locals.iter_mut().chain(self.stack.iter_mut()) {
            if let Slot::Value(id) = slot {
                if let Some(replacement) = replace(*id) {
                    *id = replacement;
                }
            }
        }
    }

    /// Merge an incoming frame into this one
    ///
    /// Returns `None` if the merge doesn't change this frame. Stacks must line up exactly, but
    /// locals only present or only wide on one side just become uninitialized.
    pub fn merge(
        &self,
        incoming: &Frame,
        arena: &mut ValueArena,
        at: InsnIndex,
    ) -> Result<Option<Frame>, SimulationErrorKind> {
        if self.stack.len() != incoming.stack.len() {
            return Err(SimulationErrorKind::UnbalancedStack {
                existing: self.stack.len(),
                incoming: incoming.stack.len(),
            });
        }

        let mut stack = Vec::with_capacity(self.stack.len());
        for (existing, other) in self.stack.iter().zip(&incoming.stack) {
            let merged = match (existing, other) {
                (Slot::Value(a), Slot::Value(b)) => Slot::Value(arena.merge(*a, *b, at).0),
                (Slot::Continuation, Slot::Continuation) => Slot::Continuation,
                _ => return Err(SimulationErrorKind::StackShapeMismatch),
            };
            stack.push(merged);
        }

        let uninitialized = Slot::Value(ValueId::UNINITIALIZED);
        let locals_len = self.locals.len().max(incoming.locals.len());
        let mut locals = Vec::with_capacity(locals_len);
        for idx in 0..locals_len {
            let existing = self.locals.get(idx).copied().unwrap_or(uninitialized);
            let other = incoming.locals.get(idx).copied().unwrap_or(uninitialized);
            let merged = match (existing, other) {
                (Slot::Value(a), Slot::Value(b)) => Slot::Value(arena.merge(a, b, at).0),
                (Slot::Continuation, Slot::Continuation) => Slot::Continuation,
                _ => uninitialized,
            };
            locals.push(merged);
        }

        // Continuations whose wide value didn't survive the merge (or vice versa)
        for idx in 0..locals.len() {
            let starts_wide = match locals[idx] {
                Slot::Value(id) => arena.value(id).width() == 2,
                Slot::Continuation => false,
            };
            let next_is_continuation = locals.get(idx + 1) == Some(&Slot::Continuation);
            if starts_wide && !next_is_continuation {
                locals[idx] = uninitialized;
            } else if !starts_wide && next_is_continuation {
                locals[idx + 1] = uninitialized;
            }
        }
        if locals.first() == Some(&Slot::Continuation) {
            locals[0] = uninitialized;
        }
        while locals.last() == Some(&uninitialized) {
            locals.pop();
        }

        let merged = Frame { locals, stack };
        let mut existing = self.clone();
        while existing.locals.last() == Some(&uninitialized) {
            existing.locals.pop();
        }
        if merged == existing {
            Ok(None)
        } else {
            Ok(Some(merged))
        }
    }

    /// Update the maximum locals and stack
    ///
    /// Only has an effect if the size of the locals or the size of the stack is greater than the
    /// previous maximum values.
    pub fn update_maximums(&self, max_locals: &mut usize, max_stack: &mut usize) {
        *max_locals = (*max_locals).max(self.locals.len());
        *max_stack = (*max_stack).max(self.stack.len());
    }
}

fn values(slots: &[Slot]) -> Vec<ValueId> {
    slots
        .iter()
        .filter_map(|slot| match slot {
            Slot::Value(id) => Some(*id),
            Slot::Continuation => None,
        })
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::code::Code;
    use crate::jvm::{
        BaseType, BinaryName, MethodAccessFlags, MethodDescriptor, Name, ParseDescriptor,
        UnqualifiedName,
    };

    fn constant(arena: &mut ValueArena, value: Value) -> ValueId {
        arena.alloc(value, ValueSource::Constant, vec![0], vec![])
    }

    #[test]
    fn entry_frame() {
        let method = Method::new(
            BinaryName::from_string(String::from("me/Foo")).unwrap(),
            UnqualifiedName::from_string(String::from("bar")).unwrap(),
            MethodDescriptor::parse("(JLjava/lang/String;)V").unwrap(),
            MethodAccessFlags::PUBLIC,
            Code::default(),
        );
        let mut arena = ValueArena::new();
        let frame = Frame::entry(&method, &mut arena);
        assert_eq!(frame.locals.len(), 4);
        assert_eq!(frame.locals[2], Slot::Continuation);
        let this = frame.load(0).unwrap();
        assert_eq!(arena.get(this).source, ValueSource::This);
        let long = frame.load(1).unwrap();
        assert_eq!(arena.value(long), &Value::unknown(BaseType::Long));
        assert_eq!(arena.get(long).source, ValueSource::Argument);
        assert_eq!(frame.load(2), Err(SimulationErrorKind::ReadContinuation(2)));
        assert_eq!(frame.load(7), Err(SimulationErrorKind::ReadUninitialized(7)));
    }

    #[test]
    fn wide_values_take_two_slots() {
        let mut arena = ValueArena::new();
        let mut frame = Frame::default();
        let long = constant(&mut arena, Value::long(1));
        let int = constant(&mut arena, Value::int(2));
        frame.push(long, &mut arena, 0).unwrap();
        frame.push(int, &mut arena, 1).unwrap();
        assert_eq!(frame.stack_depth(), 3);
        assert_eq!(frame.stack_values(), vec![long, int]);

        assert_eq!(frame.pop(&mut arena, 2), Ok(int));
        assert_eq!(frame.pop(&mut arena, 2), Ok(long));
        assert_eq!(frame.pop(&mut arena, 2), Err(SimulationErrorKind::EmptyStack));
        assert_eq!(arena.get(long).pusher, Some(0));
        assert_eq!(arena.get(long).poppers, vec![2]);
    }

    #[test]
    fn wide_locals() {
        let mut arena = ValueArena::new();
        let mut frame = Frame::default();
        let double = constant(&mut arena, Value::double(1.0));
        let int = constant(&mut arena, Value::int(2));

        frame.store(1, double, &arena).unwrap();
        assert_eq!(
            frame.locals,
            vec![
                Slot::Value(ValueId::UNINITIALIZED),
                Slot::Value(double),
                Slot::Continuation
            ]
        );
        assert_eq!(
            frame.store(2, int, &arena),
            Err(SimulationErrorKind::WideSlotStraddle(2))
        );

        // Overwriting the first half frees the second
        frame.store(1, int, &arena).unwrap();
        assert_eq!(frame.load(1), Ok(int));
        assert_eq!(frame.load(2), Err(SimulationErrorKind::ReadUninitialized(2)));

        // Wide store on top of the start of another wide value
        frame.store(2, double, &arena).unwrap();
        frame.store(1, double, &arena).unwrap();
        assert_eq!(frame.locals[2], Slot::Continuation);
        assert_eq!(frame.locals[3], Slot::Value(ValueId::UNINITIALIZED));
    }

    #[test]
    fn pop_slots_respects_wide_values() {
        let mut arena = ValueArena::new();
        let mut frame = Frame::default();
        let int = constant(&mut arena, Value::int(2));
        let long = constant(&mut arena, Value::long(1));
        frame.push(int, &mut arena, 0).unwrap();
        frame.push(long, &mut arena, 1).unwrap();
        assert_eq!(
            frame.pop_slots(1),
            Err(SimulationErrorKind::StackShapeMismatch)
        );
        assert_eq!(
            frame.pop_slots(2),
            Ok(vec![Slot::Value(long), Slot::Continuation])
        );
        assert_eq!(frame.pop_slots(2), Err(SimulationErrorKind::EmptyStack));
        assert!(frame.check_stack_shape(&arena).is_ok());
        frame.stack.push(Slot::Continuation);
        assert!(frame.check_stack_shape(&arena).is_err());
    }

    #[test]
    fn merging_frames() {
        let mut arena = ValueArena::new();
        let three = constant(&mut arena, Value::int(3));
        let four = constant(&mut arena, Value::int(4));
        let long = constant(&mut arena, Value::long(4));

        let mut left = Frame::default();
        left.store(0, three, &arena).unwrap();
        left.store(1, long, &arena).unwrap();
        left.stack.push(Slot::Value(three));

        let mut right = Frame::default();
        right.store(0, four, &arena).unwrap();
        right.store(1, three, &arena).unwrap();
        right.stack.push(Slot::Value(three));

        let merged = left.merge(&right, &mut arena, 9).unwrap().unwrap();
        assert_eq!(merged.stack, vec![Slot::Value(three)]);
        let local = merged.load(0).unwrap();
        assert_eq!(arena.value(local), &Value::unknown(BaseType::Int));

        // Long on one side, int on the other: nothing survives
        assert_eq!(merged.locals.len(), 1);

        // Merging again is stable
        assert_eq!(merged.merge(&right, &mut arena, 9), Ok(None));
        assert_eq!(merged.merge(&merged, &mut arena, 9), Ok(None));

        let mut deeper = right.clone();
        deeper.stack.push(Slot::Value(four));
        assert_eq!(
            left.merge(&deeper, &mut arena, 9),
            Err(SimulationErrorKind::UnbalancedStack {
                existing: 1,
                incoming: 2
            })
        );
    }
}
