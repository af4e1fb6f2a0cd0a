use super::{Constant, Instruction};
use crate::util::Width;

/// Static shape of an instruction's effect on the operand stack
///
/// Counts are in slots, so a `long` or `double` operand counts for two. This is what a verifier
/// would know without looking at any values.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct StackEffect {
    /// Slots consumed from the top of the stack
    pub pops: usize,

    /// Slots produced onto the stack
    pub pushes: usize,
}

impl StackEffect {
    const fn new(pops: usize, pushes: usize) -> StackEffect {
        StackEffect { pops, pushes }
    }

    /// Net change in stack size
    pub fn delta(&self) -> isize {
        self.pushes as isize - self.pops as isize
    }
}

impl Width for Constant {
    fn width(&self) -> usize {
        match self {
            Constant::Long(_) | Constant::Double(_) => 2,
            _ => 1,
        }
    }
}

impl Instruction {
    /// How many slots the instruction pops and pushes
    pub fn stack_effect(&self) -> StackEffect {
        use Instruction::*;

        match self {
            Nop | IInc(_, _) | Goto(_) | Ret(_) | Return => StackEffect::new(0, 0),

            AConstNull | IConstM1 | IConst0 | IConst1 | IConst2 | IConst3 | IConst4 | IConst5
            | FConst0 | FConst1 | FConst2 | BiPush(_) | SiPush(_) | New(_) | Jsr(_) => {
                StackEffect::new(0, 1)
            }
            LConst0 | LConst1 | DConst0 | DConst1 => StackEffect::new(0, 2),
            Ldc(constant) => StackEffect::new(0, constant.width()),

            ILoad(_) | FLoad(_) | ALoad(_) => StackEffect::new(0, 1),
            LLoad(_) | DLoad(_) => StackEffect::new(0, 2),
            IStore(_) | FStore(_) | AStore(_) => StackEffect::new(1, 0),
            LStore(_) | DStore(_) => StackEffect::new(2, 0),

            IALoad | FALoad | AALoad | BALoad | CALoad | SALoad => StackEffect::new(2, 1),
            LALoad | DALoad => StackEffect::new(2, 2),
            IAStore | FAStore | AAStore | BAStore | CAStore | SAStore => StackEffect::new(3, 0),
            LAStore | DAStore => StackEffect::new(4, 0),

            Pop => StackEffect::new(1, 0),
            Pop2 => StackEffect::new(2, 0),
            Dup => StackEffect::new(1, 2),
            DupX1 => StackEffect::new(2, 3),
            DupX2 => StackEffect::new(3, 4),
            Dup2 => StackEffect::new(2, 4),
            Dup2X1 => StackEffect::new(3, 5),
            Dup2X2 => StackEffect::new(4, 6),
            Swap => StackEffect::new(2, 2),

            IAdd | ISub | IMul | IDiv | IRem | IAnd | IOr | IXor | ISh(_) | FAdd | FSub | FMul
            | FDiv | FRem => StackEffect::new(2, 1),
            LAdd | LSub | LMul | LDiv | LRem | LAnd | LOr | LXor | DAdd | DSub | DMul | DDiv
            | DRem => StackEffect::new(4, 2),
            LSh(_) => StackEffect::new(3, 2),
            INeg | FNeg => StackEffect::new(1, 1),
            LNeg | DNeg => StackEffect::new(2, 2),

            I2F | F2I | I2B | I2C | I2S => StackEffect::new(1, 1),
            I2L | I2D | F2L | F2D => StackEffect::new(1, 2),
            L2I | L2F | D2I | D2F => StackEffect::new(2, 1),
            L2D | D2L => StackEffect::new(2, 2),
            LCmp | DCmp(_) => StackEffect::new(4, 1),
            FCmp(_) => StackEffect::new(2, 1),

            If(_, _) | IfNull(_, _) | TableSwitch { .. } | LookupSwitch { .. } => {
                StackEffect::new(1, 0)
            }
            IfICmp(_, _) | IfACmp(_, _) => StackEffect::new(2, 0),
            IReturn | FReturn | AReturn | AThrow | MonitorEnter | MonitorExit => {
                StackEffect::new(1, 0)
            }
            LReturn | DReturn => StackEffect::new(2, 0),

            GetStatic(field) => StackEffect::new(0, field.descriptor.width()),
            PutStatic(field) => StackEffect::new(field.descriptor.width(), 0),
            GetField(field) => StackEffect::new(1, field.descriptor.width()),
            PutField(field) => StackEffect::new(1 + field.descriptor.width(), 0),
            Invoke(invoke_type, method) => StackEffect::new(
                method
                    .descriptor
                    .parameter_length(invoke_type.has_receiver()),
                method.descriptor.return_width(),
            ),
            InvokeDynamic(call_site) => StackEffect::new(
                call_site.descriptor.parameter_length(false),
                call_site.descriptor.return_width(),
            ),

            NewArray(_) | ANewArray(_) | ArrayLength | CheckCast(_) | InstanceOf(_) => {
                StackEffect::new(1, 1)
            }
            MultiANewArray(_, dimensions) => StackEffect::new(*dimensions as usize, 1),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::code::{InvokeType, MethodRef};
    use crate::jvm::{BinaryName, MethodDescriptor, Name, ParseDescriptor, UnqualifiedName};

    #[test]
    fn wide_operands_count_twice() {
        assert_eq!(Instruction::LAdd.stack_effect(), StackEffect::new(4, 2));
        assert_eq!(Instruction::Ldc(Constant::Double(1.0)).stack_effect().delta(), 2);
        assert_eq!(Instruction::Ldc(Constant::Integer(1)).stack_effect().delta(), 1);
        assert_eq!(Instruction::LCmp.stack_effect().delta(), -3);
        assert_eq!(Instruction::Dup2X2.stack_effect().delta(), 2);
    }

    #[test]
    fn invoke_effect_follows_descriptor() {
        let method = MethodRef {
            owner: BinaryName::from_string(String::from("me/Foo")).unwrap(),
            name: UnqualifiedName::from_string(String::from("bar")).unwrap(),
            descriptor: MethodDescriptor::parse("(IJLjava/lang/String;)D").unwrap(),
        };
        let virt = Instruction::Invoke(InvokeType::Virtual, method.clone());
        assert_eq!(virt.stack_effect(), StackEffect::new(5, 2));
        let stat = Instruction::Invoke(InvokeType::Static, method);
        assert_eq!(stat.stack_effect(), StackEffect::new(4, 2));
    }
}
