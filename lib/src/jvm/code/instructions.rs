//! Resolved JVM bytecode instructions
//!
//! The representation is slightly different from the raw class file form, since everything here
//! has already been resolved by whoever produced the method:
//!
//!   - The "wide" prefix doesn't show up at all, but instead gets merged into the instructions it
//!     is allowed to modify. The same goes for the short forms like `iload_0`.
//!
//!   - Constant pool references are replaced by the constants, fields, and methods they point to.
//!
//!   - Branch targets are positions in the instruction sequence, not byte offsets.
//!
//!   - Similar instructions (comparisons, shifts, invokes) are folded into one variant with a
//!     field, which helps with repetitive pattern matches.

use super::InsnIndex;
use crate::jvm::{BaseType, BinaryName, FieldType, MethodDescriptor, RefType, UnqualifiedName};

/// One JVM instruction with its operands
#[derive(Clone, Debug, PartialEq)]
pub enum Instruction {
    Nop,
    AConstNull,
    IConstM1,
    IConst0,
    IConst1,
    IConst2,
    IConst3,
    IConst4,
    IConst5,
    LConst0,
    LConst1,
    FConst0,
    FConst1,
    FConst2,
    DConst0,
    DConst1,
    BiPush(i8),
    SiPush(i16),
    Ldc(Constant), // covers `ldc`, `ldc_w`, and `ldc2_w`
    ILoad(u16),    // covers `iload`, `iload{0,3}`, and `wide iload`
    LLoad(u16),
    FLoad(u16),
    DLoad(u16),
    ALoad(u16),
    IALoad,
    LALoad,
    FALoad,
    DALoad,
    AALoad,
    BALoad,
    CALoad,
    SALoad,
    IStore(u16), // covers `istore`, `istore{0,3}`, and `wide istore`
    LStore(u16),
    FStore(u16),
    DStore(u16),
    AStore(u16),
    IAStore,
    LAStore,
    FAStore,
    DAStore,
    AAStore,
    BAStore,
    CAStore,
    SAStore,
    Pop,
    Pop2,
    Dup,
    DupX1,
    DupX2,
    Dup2,
    Dup2X1,
    Dup2X2,
    Swap,
    IAdd,
    LAdd,
    FAdd,
    DAdd,
    ISub,
    LSub,
    FSub,
    DSub,
    IMul,
    LMul,
    FMul,
    DMul,
    IDiv,
    LDiv,
    FDiv,
    DDiv,
    IRem,
    LRem,
    FRem,
    DRem,
    INeg,
    LNeg,
    FNeg,
    DNeg,
    ISh(ShiftType), // covers `ishr`, `ishl`, and `iushr`
    LSh(ShiftType), // covers `lshr`, `lshl`, and `lushr`
    IAnd,
    LAnd,
    IOr,
    LOr,
    IXor,
    LXor,
    IInc(u16, i16), // covers `iinc` and `wide iinc`
    I2L,
    I2F,
    I2D,
    L2I,
    L2F,
    L2D,
    F2I,
    F2L,
    F2D,
    D2I,
    D2L,
    D2F,
    I2B,
    I2C,
    I2S,
    LCmp,
    FCmp(CompareMode), // covers `fcmpl` and `fcmpg`
    DCmp(CompareMode), // covers `dcmpl` and `dcmpg`
    If(OrdComparison, InsnIndex),
    IfICmp(OrdComparison, InsnIndex),
    IfACmp(EqComparison, InsnIndex),
    IfNull(EqComparison, InsnIndex), // `EQ` is `ifnull`, `NE` is `ifnonnull`
    Goto(InsnIndex),
    Jsr(InsnIndex),
    Ret(u16),
    TableSwitch {
        default: InsnIndex,
        low: i32,
        targets: Vec<InsnIndex>,
    },
    LookupSwitch {
        default: InsnIndex,
        targets: Vec<(i32, InsnIndex)>,
    },
    IReturn,
    LReturn,
    FReturn,
    DReturn,
    AReturn,
    Return,
    GetStatic(FieldRef),
    PutStatic(FieldRef),
    GetField(FieldRef),
    PutField(FieldRef),
    Invoke(InvokeType, MethodRef),
    InvokeDynamic(CallSite),
    New(BinaryName),
    NewArray(BaseType),
    ANewArray(RefType),
    ArrayLength,
    AThrow,
    CheckCast(RefType),
    InstanceOf(RefType),
    MonitorEnter,
    MonitorExit,
    MultiANewArray(RefType, u8),
}

impl Instruction {
    /// Explicit jump targets (not including the fallthrough)
    pub fn jump_targets(&self) -> Vec<InsnIndex> {
        use Instruction::*;
        match self {
            If(_, target)
            | IfICmp(_, target)
            | IfACmp(_, target)
            | IfNull(_, target)
            | Goto(target)
            | Jsr(target) => vec![*target],
            TableSwitch {
                default, targets, ..
            } => {
                let mut all = vec![*default];
                for target in targets {
                    if !all.contains(target) {
                        all.push(*target);
                    }
                }
                all
            }
            LookupSwitch { default, targets } => {
                let mut all = vec![*default];
                for (_, target) in targets {
                    if !all.contains(target) {
                        all.push(*target);
                    }
                }
                all
            }
            _ => vec![],
        }
    }
}

/// Constant loaded by `ldc`
#[derive(Clone, Debug, PartialEq)]
pub enum Constant {
    Integer(i32),
    Float(f32),
    Long(i64),
    Double(f64),
    String(String),
    Class(RefType),
    MethodType(MethodDescriptor),
    MethodHandle,
}

/// Resolved field reference
#[derive(Clone, Debug, PartialEq)]
pub struct FieldRef {
    pub owner: BinaryName,
    pub name: UnqualifiedName,
    pub descriptor: FieldType,

    /// Value of a `static final` field initialized from a `ConstantValue` attribute
    pub constant_value: Option<Constant>,
}

/// Resolved method reference
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct MethodRef {
    pub owner: BinaryName,
    pub name: UnqualifiedName,
    pub descriptor: MethodDescriptor,
}

/// Resolved `invokedynamic` call site (the bootstrap method is irrelevant to simulation)
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CallSite {
    pub name: UnqualifiedName,
    pub descriptor: MethodDescriptor,
}

/// Possible bit shifts
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum ShiftType {
    Left,
    LogicalRight,
    ArithmeticRight,
}

/// Comparison modes for floating point
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum CompareMode {
    /// -1 on NaN
    L,

    /// 1 on NaN
    G,
}

/// Binary comparison operators available for `int` branches
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum OrdComparison {
    EQ,
    GE,
    GT,
    LE,
    LT,
    NE,
}

/// Equality/inequality comparison operators
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum EqComparison {
    EQ,
    NE,
}

/// Type of method to invoke
///
/// Note: `InvokeDynamic` is kept separate because its operand is a call site, not a method.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum InvokeType {
    Virtual,
    Special,
    Static,
    Interface,
}

impl InvokeType {
    pub fn has_receiver(&self) -> bool {
        !matches!(self, InvokeType::Static)
    }
}

#[cfg(test)]
mod test {
    use super::Instruction::*;
    use super::*;

    #[test]
    fn jump_targets() {
        assert_eq!(If(OrdComparison::LT, 7).jump_targets(), vec![7]);
        assert_eq!(Goto(3).jump_targets(), vec![3]);

        let switch = TableSwitch {
            default: 9,
            low: 0,
            targets: vec![4, 9, 6, 4],
        };
        assert_eq!(switch.jump_targets(), vec![9, 4, 6]);
        assert!(IAdd.jump_targets().is_empty());
    }
}
