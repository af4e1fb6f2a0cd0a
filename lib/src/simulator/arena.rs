use super::{SimulationErrorKind, Value};
use crate::jvm::code::InsnIndex;
use crate::util::push_unique;

/// Stable identity of a value in a [`ValueArena`]
///
/// Frames only store these ids. Two slots holding the same id hold the same physical value, as
/// opposed to two values that happen to be equal in the lattice.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct ValueId(usize);

impl ValueId {
    /// Shared value used for every uninitialized slot
    pub const UNINITIALIZED: ValueId = ValueId(0);

    pub fn index(&self) -> usize {
        self.0
    }
}

/// How a value (or the value it was copied from) came to be
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum ValueSource {
    Constant,
    Argument,
    This,
    Merge,
    Exception,
    ArrayElement,
    Cast,
    Computed,
    New,
    Field,
    MethodReturn,
}

/// Everything known about one value
#[derive(Clone, Debug)]
pub struct ValueRecord {
    /// Lattice element
    pub value: Value,

    pub source: ValueSource,

    /// Instructions that contributed to this value, oldest first
    pub provenance: Vec<InsnIndex>,

    /// `ifnull`/`ifnonnull` instruction proving this value non-null on one of its arms
    pub null_check: Option<InsnIndex>,

    /// Instruction that pushed the value onto the stack
    pub pusher: Option<InsnIndex>,

    /// Instructions that popped the value off of the stack
    pub poppers: Vec<InsnIndex>,

    /// Value this one is a copy of (moved through locals, duplicated, refined, etc.)
    pub copy_source: Option<ValueId>,

    /// Values this one was computed from (or the two sides of a merge)
    pub operands: Vec<ValueId>,
}

/// Owner of every value created during one simulation
///
/// Ids are handed out sequentially and never reused, so an id stays valid as long as the arena
/// does. Index `0` is always the shared [`ValueId::UNINITIALIZED`] value.
#[derive(Clone, Debug)]
pub struct ValueArena {
    records: Vec<ValueRecord>,
}

impl ValueArena {
    pub fn new() -> ValueArena {
        let uninitialized = ValueRecord {
            value: Value::Uninitialized,
            source: ValueSource::Constant,
            provenance: vec![],
            null_check: None,
            pusher: None,
            poppers: vec![],
            copy_source: None,
            operands: vec![],
        };
        ValueArena {
            records: vec![uninitialized],
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn get(&self, id: ValueId) -> &ValueRecord {
        &self.records[id.0]
    }

    pub fn value(&self, id: ValueId) -> &Value {
        &self.records[id.0].value
    }

    pub fn iter(&self) -> impl Iterator<Item = (ValueId, &ValueRecord)> {
        self.records
            .iter()
            .enumerate()
            .map(|(idx, record)| (ValueId(idx), record))
    }

    /// Allocate a fresh value
    pub fn alloc(
        &mut self,
        value: Value,
        source: ValueSource,
        provenance: Vec<InsnIndex>,
        operands: Vec<ValueId>,
    ) -> ValueId {
        if value == Value::Uninitialized {
            return ValueId::UNINITIALIZED;
        }
        let id = ValueId(self.records.len());
        self.records.push(ValueRecord {
            value,
            source,
            provenance,
            null_check: None,
            pusher: None,
            poppers: vec![],
            copy_source: None,
            operands,
        });
        id
    }

    /// Copy of a value as made by the `dup` family of instructions
    ///
    /// The copy shares the provenance of the source with the duplicating instruction appended,
    /// and inherits its null-check guard. Only data values can be duplicated.
    pub fn duplicate(&mut self, id: ValueId, insn: InsnIndex) -> Result<ValueId, SimulationErrorKind> {
        match self.value(id) {
            Value::Uninitialized => Err(SimulationErrorKind::CopyUninitialized),
            Value::ReturnAddress(_) => Err(SimulationErrorKind::CopyReturnAddress),
            value => {
                let value = value.clone();
                Ok(self.copy(id, value, None, insn))
            }
        }
    }

    /// Copy of a value moving between the stack and the locals
    ///
    /// Unlike [`Self::duplicate`], return addresses may move (`jsr` targets usually start with an
    /// `astore`).
    pub fn relocate(&mut self, id: ValueId, insn: InsnIndex) -> Result<ValueId, SimulationErrorKind> {
        match self.value(id) {
            Value::Uninitialized => Err(SimulationErrorKind::CopyUninitialized),
            value => {
                let value = value.clone();
                Ok(self.copy(id, value, None, insn))
            }
        }
    }

    /// New lattice element for the same underlying object (a cast, or a builder getting appended to)
    pub fn derive(&mut self, id: ValueId, value: Value, insn: InsnIndex) -> ValueId {
        self.copy(id, value, None, insn)
    }

    /// Like [`Self::derive`], but recording a different source
    pub fn derive_with_source(
        &mut self,
        id: ValueId,
        value: Value,
        source: ValueSource,
        insn: InsnIndex,
    ) -> ValueId {
        self.copy(id, value, Some(source), insn)
    }

    /// Copy of the value known to be non-null past the given `ifnull`/`ifnonnull`
    ///
    /// The branch is not added to the provenance: it doesn't produce anything.
    pub fn guard(&mut self, id: ValueId, branch: InsnIndex) -> ValueId {
        if id == ValueId::UNINITIALIZED {
            return id;
        }
        let source = self.get(id);
        let record = ValueRecord {
            value: source.value.clone(),
            source: source.source,
            provenance: source.provenance.clone(),
            null_check: Some(branch),
            pusher: None,
            poppers: vec![],
            copy_source: Some(id),
            operands: vec![],
        };
        let guarded = ValueId(self.records.len());
        self.records.push(record);
        guarded
    }

    fn copy(&mut self, id: ValueId, value: Value, source: Option<ValueSource>, insn: InsnIndex) -> ValueId {
        let original = self.get(id);
        let mut provenance = original.provenance.clone();
        push_unique(&mut provenance, insn);
        let record = ValueRecord {
            value,
            source: source.unwrap_or(original.source),
            provenance,
            null_check: original.null_check,
            pusher: None,
            poppers: vec![],
            copy_source: Some(id),
            operands: vec![],
        };
        let copy = ValueId(self.records.len());
        self.records.push(record);
        copy
    }

    /// First value in the chain of copies leading to this one
    pub fn origin(&self, mut id: ValueId) -> ValueId {
        while let Some(source) = self.get(id).copy_source {
            id = source;
        }
        id
    }

    /// Record that an instruction pushed the value
    ///
    /// A value is pushed exactly once: anything that pushes again must push a copy.
    pub fn record_push(&mut self, id: ValueId, insn: InsnIndex) -> Result<(), SimulationErrorKind> {
        if id == ValueId::UNINITIALIZED {
            return Err(SimulationErrorKind::UninitializedOperand);
        }
        let record = &mut self.records[id.0];
        if record.pusher.is_some() {
            return Err(SimulationErrorKind::ValuePushedTwice(id));
        }
        record.pusher = Some(insn);
        Ok(())
    }

    /// Record that an instruction popped the value
    pub fn record_pop(&mut self, id: ValueId, insn: InsnIndex) {
        if id != ValueId::UNINITIALIZED {
            push_unique(&mut self.records[id.0].poppers, insn);
        }
    }

    /// Merge an incoming value into the one already recorded at a join point
    ///
    /// Returns the id for the join point and whether that is a change. The existing id is kept
    /// only when the lattice element, guard and provenance are all unchanged. Records already
    /// held by earlier frames are never modified.
    pub fn merge(&mut self, existing: ValueId, incoming: ValueId, at: InsnIndex) -> (ValueId, bool) {
        if existing == incoming {
            return (existing, false);
        }
        let existing_record = self.get(existing);
        let incoming_record = self.get(incoming);

        let value = existing_record.value.merge(&incoming_record.value);
        if value == Value::Uninitialized {
            return (ValueId::UNINITIALIZED, existing != ValueId::UNINITIALIZED);
        }
        let null_check = Some(existing_record.null_check)
            .filter(|guard| *guard == incoming_record.null_check)
            .flatten();

        let mut provenance = existing_record.provenance.clone();
        let mut widened = false;
        for insn in &incoming_record.provenance {
            widened |= push_unique(&mut provenance, *insn);
        }
        if value == existing_record.value && null_check == existing_record.null_check && !widened {
            return (existing, false);
        }

        let source = if existing_record.source == incoming_record.source {
            existing_record.source
        } else {
            ValueSource::Merge
        };
        let existing_origin = self.origin(existing);
        let copy_source = Some(existing_origin).filter(|origin| *origin == self.origin(incoming));

        log::debug!(
            "Merging values {:?} and {:?} at {} into {}",
            existing,
            incoming,
            at,
            value
        );
        let merged = ValueId(self.records.len());
        self.records.push(ValueRecord {
            value,
            source,
            provenance,
            null_check,
            pusher: None,
            poppers: vec![],
            copy_source,
            operands: vec![existing, incoming],
        });
        (merged, true)
    }
}

impl Default for ValueArena {
    fn default() -> ValueArena {
        ValueArena::new()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::{BaseType, RefType};

    #[test]
    fn duplicate_extends_provenance() {
        let mut arena = ValueArena::new();
        let v = arena.alloc(Value::int(1), ValueSource::Constant, vec![5], vec![]);
        let copy = arena.duplicate(v, 9).unwrap();
        assert_eq!(arena.get(copy).provenance, vec![5, 9]);
        assert_eq!(arena.get(v).provenance, vec![5]);
        assert_eq!(arena.get(copy).copy_source, Some(v));
        assert_eq!(arena.origin(copy), v);
        assert_eq!(arena.get(copy).source, ValueSource::Constant);
    }

    #[test]
    fn copying_non_data_values_fails() {
        let mut arena = ValueArena::new();
        let ret = arena.alloc(Value::ReturnAddress(3), ValueSource::Constant, vec![2], vec![]);
        assert_eq!(
            arena.duplicate(ValueId::UNINITIALIZED, 1),
            Err(SimulationErrorKind::CopyUninitialized)
        );
        assert_eq!(
            arena.duplicate(ret, 4),
            Err(SimulationErrorKind::CopyReturnAddress)
        );
        assert!(arena.relocate(ret, 4).is_ok());
    }

    #[test]
    fn guards_propagate_forward_only() {
        let mut arena = ValueArena::new();
        let v = arena.alloc(Value::Null, ValueSource::Constant, vec![0], vec![]);
        let guarded = arena.guard(v, 1);
        let copy = arena.duplicate(guarded, 2).unwrap();
        assert_eq!(arena.get(guarded).null_check, Some(1));
        assert_eq!(arena.get(copy).null_check, Some(1));
        assert_eq!(arena.get(v).null_check, None);
        assert_eq!(arena.origin(copy), v);
    }

    #[test]
    fn pushes_are_unique() {
        let mut arena = ValueArena::new();
        let v = arena.alloc(Value::int(1), ValueSource::Constant, vec![0], vec![]);
        assert!(arena.record_push(v, 0).is_ok());
        assert_eq!(
            arena.record_push(v, 3),
            Err(SimulationErrorKind::ValuePushedTwice(v))
        );
        arena.record_pop(v, 4);
        arena.record_pop(v, 6);
        arena.record_pop(v, 4);
        assert_eq!(arena.get(v).poppers, vec![4, 6]);
    }

    #[test]
    fn merging() {
        let mut arena = ValueArena::new();
        let a = arena.alloc(Value::int(3), ValueSource::Constant, vec![1], vec![]);
        let b = arena.alloc(Value::int(3), ValueSource::Constant, vec![4], vec![]);
        let c = arena.alloc(Value::int(5), ValueSource::Computed, vec![6], vec![]);
        let f = arena.alloc(Value::float(5.0), ValueSource::Computed, vec![7], vec![]);

        // Same lattice element, wider provenance: a new value, `a` itself is untouched
        let (same, changed) = arena.merge(a, b, 8);
        assert!(changed);
        assert_ne!(same, a);
        assert_eq!(arena.value(same), &Value::int(3));
        assert_eq!(arena.get(same).provenance, vec![1, 4]);
        assert_eq!(arena.get(same).operands, vec![a, b]);
        assert_eq!(arena.get(a).provenance, vec![1]);

        // Nothing new coming in
        assert_eq!(arena.merge(same, b, 8), (same, false));
        assert_eq!(arena.merge(same, a, 8), (same, false));

        let (merged, changed) = arena.merge(a, c, 8);
        assert!(changed);
        assert_eq!(arena.value(merged), &Value::unknown(BaseType::Int));
        assert_eq!(arena.get(merged).source, ValueSource::Merge);
        assert_eq!(arena.get(merged).operands, vec![a, c]);
        assert_eq!(arena.get(merged).provenance, vec![1, 6]);

        assert_eq!(arena.merge(c, f, 8), (ValueId::UNINITIALIZED, true));
        assert_eq!(
            arena.merge(ValueId::UNINITIALIZED, f, 8),
            (ValueId::UNINITIALIZED, false)
        );
    }

    #[test]
    fn merging_drops_differing_guards() {
        let mut arena = ValueArena::new();
        let v = arena.alloc(
            Value::reference(RefType::STRING),
            ValueSource::Argument,
            vec![],
            vec![],
        );
        let guarded = arena.guard(v, 2);
        let (merged, changed) = arena.merge(guarded, v, 5);
        assert!(changed);
        assert_eq!(arena.get(merged).null_check, None);
        assert_eq!(arena.origin(merged), v);

        // Existing already unguarded: nothing to lose
        assert_eq!(arena.merge(merged, guarded, 5), (merged, false));
    }
}
