use std::ops::Not;

/// Normalized JVM instructions
///
/// Families of opcodes which only differ in how their operand is encoded are folded together
/// (`iload_0` and `wide iload 300` are both `ILoad`, `goto_w` is `Goto`, etc.). Branch and switch
/// targets are signed byte offsets relative to the `pc` of the instruction itself, and constant
/// pool operands are raw indices.
///
/// The verifier rewrites some instructions in place, so a handful of variants never appear in
/// class files (see the bottom of the enum).
#[derive(Clone, PartialEq, Debug)]
pub enum Instruction {
    Nop,
    AConstNull,
    IConst(i32), // covers `iconst_<n>`, `bipush`, and `sipush`
    LConst(i64),
    FConst(f32),
    DConst(f64),
    Ldc(u16),  // covers `ldc` and `ldc_w`
    Ldc2(u16), // `ldc2_w`

    ILoad(u16),
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

    IStore(u16),
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
    ISh(ShiftType),
    LSh(ShiftType),
    IAnd,
    LAnd,
    IOr,
    LOr,
    IXor,
    LXor,
    IInc(u16, i16),

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
    FCmp(CompareMode),
    DCmp(CompareMode),

    If(OrdComparison, i32),
    IfICmp(OrdComparison, i32),
    IfACmp(EqComparison, i32),
    IfNull(EqComparison, i32),
    Goto(i32), // covers `goto_w`
    Jsr(i32),  // covers `jsr_w`
    Ret(u16),
    TableSwitch {
        default: i32,
        low: i32,
        targets: Vec<i32>,
    },
    LookupSwitch {
        default: i32,
        targets: Vec<(i32, i32)>,
    },

    IReturn,
    LReturn,
    FReturn,
    DReturn,
    AReturn,
    Return,

    GetStatic(u16),
    PutStatic(u16),
    GetField(u16),
    PutField(u16),
    Invoke(InvokeType, u16),

    New(u16),
    NewArray(u8), // raw `atype` code
    ANewArray(u16),
    ArrayLength,
    AThrow,
    CheckCast(u16),
    InstanceOf(u16),
    MonitorEnter,
    MonitorExit,
    MultiANewArray(u16, u8),

    /// `fstore` of an extended precision value, which must be narrowed first
    FStoreConv(u16),
    /// `dstore` of an extended precision value, which must be narrowed first
    DStoreConv(u16),
    FAStoreConv,
    DAStoreConv,

    /// `Object.clone()` on an array
    CloneArray,

    /// Member accesses which must be bound at runtime, since their class cannot be loaded now
    DynamicInvoke(InvokeType, u16),
    DynamicGetStatic(u16),
    DynamicPutStatic(u16),
    DynamicGetField(u16),
    DynamicPutField(u16),
}

/// Direction of shift operators
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum ShiftType {
    Left,
    ArithmeticRight,
    LogicalRight,
}

/// How to order `NaN` in floating point comparisons
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum CompareMode {
    L,
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

impl Not for OrdComparison {
    type Output = Self;

    fn not(self) -> Self::Output {
        match self {
            OrdComparison::EQ => OrdComparison::NE,
            OrdComparison::GE => OrdComparison::LT,
            OrdComparison::GT => OrdComparison::LE,
            OrdComparison::LE => OrdComparison::GT,
            OrdComparison::LT => OrdComparison::GE,
            OrdComparison::NE => OrdComparison::EQ,
        }
    }
}

/// Equality/inequality comparison operators
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum EqComparison {
    EQ,
    NE,
}

impl Not for EqComparison {
    type Output = Self;

    fn not(self) -> Self::Output {
        match self {
            EqComparison::EQ => EqComparison::NE,
            EqComparison::NE => EqComparison::EQ,
        }
    }
}

/// Type of method to invoke
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum InvokeType {
    Virtual,
    Special,
    Static,
    Interface(u8), // `count` is of total arguments, where `long`/`double` count for 2
}

/// Encoded size of a local variable operand, accounting for the `_<n>` and `wide` forms
fn local_len(index: u16, has_short_form: bool) -> usize {
    if has_short_form && index <= 3 {
        1
    } else if index <= 0xFF {
        2
    } else {
        4
    }
}

fn branch_len(offset: i32) -> usize {
    if i16::try_from(offset).is_ok() {
        3
    } else {
        5
    }
}

/// Padding after a switch opcode, so that its operands are 4-byte aligned
fn switch_padding(pc: usize) -> usize {
    (4 - (pc + 1) % 4) % 4
}

impl Instruction {
    /// Number of bytes the instruction takes up when encoded at the given `pc`
    pub fn encoded_len(&self, pc: usize) -> usize {
        use Instruction::*;

        match self {
            IConst(-1..=5) | LConst(0 | 1) => 1,
            IConst(value) if i8::try_from(*value).is_ok() => 2,
            IConst(_) => 3,

            Ldc(index) if *index <= 0xFF => 2,
            Ldc(_) | Ldc2(_) => 3,

            ILoad(idx) | LLoad(idx) | FLoad(idx) | DLoad(idx) | ALoad(idx) | IStore(idx)
            | LStore(idx) | FStore(idx) | DStore(idx) | AStore(idx) | FStoreConv(idx)
            | DStoreConv(idx) => local_len(*idx, true),
            Ret(idx) => local_len(*idx, false),
            IInc(idx, delta) => {
                if *idx <= 0xFF && i8::try_from(*delta).is_ok() {
                    3
                } else {
                    6
                }
            }

            If(_, _) | IfICmp(_, _) | IfACmp(_, _) | IfNull(_, _) => 3,
            Goto(offset) | Jsr(offset) => branch_len(*offset),
            TableSwitch { targets, .. } => 1 + switch_padding(pc) + 12 + 4 * targets.len(),
            LookupSwitch { targets, .. } => 1 + switch_padding(pc) + 8 + 8 * targets.len(),

            GetStatic(_) | PutStatic(_) | GetField(_) | PutField(_) | DynamicGetStatic(_)
            | DynamicPutStatic(_) | DynamicGetField(_) | DynamicPutField(_) => 3,
            Invoke(InvokeType::Interface(_), _) | DynamicInvoke(InvokeType::Interface(_), _) => 5,
            Invoke(_, _) | DynamicInvoke(_, _) | CloneArray => 3,

            New(_) | ANewArray(_) | CheckCast(_) | InstanceOf(_) => 3,
            NewArray(_) => 2,
            MultiANewArray(_, _) => 4,

            _ => 1,
        }
    }

    /// Mnemonic of the opcode family, as used in error messages
    pub fn mnemonic(&self) -> &'static str {
        use Instruction::*;

        match self {
            Nop => "nop",
            AConstNull => "aconst_null",
            IConst(_) => "iconst",
            LConst(_) => "lconst",
            FConst(_) => "fconst",
            DConst(_) => "dconst",
            Ldc(_) | Ldc2(_) => "ldc",
            ILoad(_) => "iload",
            LLoad(_) => "lload",
            FLoad(_) => "fload",
            DLoad(_) => "dload",
            ALoad(_) => "aload",
            IALoad => "iaload",
            LALoad => "laload",
            FALoad => "faload",
            DALoad => "daload",
            AALoad => "aaload",
            BALoad => "baload",
            CALoad => "caload",
            SALoad => "saload",
            IStore(_) => "istore",
            LStore(_) => "lstore",
            FStore(_) => "fstore",
            DStore(_) => "dstore",
            AStore(_) => "astore",
            IAStore => "iastore",
            LAStore => "lastore",
            FAStore => "fastore",
            DAStore => "dastore",
            AAStore => "aastore",
            BAStore => "bastore",
            CAStore => "castore",
            SAStore => "sastore",
            Pop => "pop",
            Pop2 => "pop2",
            Dup => "dup",
            DupX1 => "dup_x1",
            DupX2 => "dup_x2",
            Dup2 => "dup2",
            Dup2X1 => "dup2_x1",
            Dup2X2 => "dup2_x2",
            Swap => "swap",
            IAdd => "iadd",
            LAdd => "ladd",
            FAdd => "fadd",
            DAdd => "dadd",
            ISub => "isub",
            LSub => "lsub",
            FSub => "fsub",
            DSub => "dsub",
            IMul => "imul",
            LMul => "lmul",
            FMul => "fmul",
            DMul => "dmul",
            IDiv => "idiv",
            LDiv => "ldiv",
            FDiv => "fdiv",
            DDiv => "ddiv",
            IRem => "irem",
            LRem => "lrem",
            FRem => "frem",
            DRem => "drem",
            INeg => "ineg",
            LNeg => "lneg",
            FNeg => "fneg",
            DNeg => "dneg",
            ISh(ShiftType::Left) => "ishl",
            ISh(ShiftType::ArithmeticRight) => "ishr",
            ISh(ShiftType::LogicalRight) => "iushr",
            LSh(ShiftType::Left) => "lshl",
            LSh(ShiftType::ArithmeticRight) => "lshr",
            LSh(ShiftType::LogicalRight) => "lushr",
            IAnd => "iand",
            LAnd => "land",
            IOr => "ior",
            LOr => "lor",
            IXor => "ixor",
            LXor => "lxor",
            IInc(_, _) => "iinc",
            I2L => "i2l",
            I2F => "i2f",
            I2D => "i2d",
            L2I => "l2i",
            L2F => "l2f",
            L2D => "l2d",
            F2I => "f2i",
            F2L => "f2l",
            F2D => "f2d",
            D2I => "d2i",
            D2L => "d2l",
            D2F => "d2f",
            I2B => "i2b",
            I2C => "i2c",
            I2S => "i2s",
            LCmp => "lcmp",
            FCmp(CompareMode::L) => "fcmpl",
            FCmp(CompareMode::G) => "fcmpg",
            DCmp(CompareMode::L) => "dcmpl",
            DCmp(CompareMode::G) => "dcmpg",
            If(OrdComparison::EQ, _) => "ifeq",
            If(OrdComparison::NE, _) => "ifne",
            If(OrdComparison::LT, _) => "iflt",
            If(OrdComparison::GE, _) => "ifge",
            If(OrdComparison::GT, _) => "ifgt",
            If(OrdComparison::LE, _) => "ifle",
            IfICmp(OrdComparison::EQ, _) => "if_icmpeq",
            IfICmp(OrdComparison::NE, _) => "if_icmpne",
            IfICmp(OrdComparison::LT, _) => "if_icmplt",
            IfICmp(OrdComparison::GE, _) => "if_icmpge",
            IfICmp(OrdComparison::GT, _) => "if_icmpgt",
            IfICmp(OrdComparison::LE, _) => "if_icmple",
            IfACmp(EqComparison::EQ, _) => "if_acmpeq",
            IfACmp(EqComparison::NE, _) => "if_acmpne",
            IfNull(EqComparison::EQ, _) => "ifnull",
            IfNull(EqComparison::NE, _) => "ifnonnull",
            Goto(_) => "goto",
            Jsr(_) => "jsr",
            Ret(_) => "ret",
            TableSwitch { .. } => "tableswitch",
            LookupSwitch { .. } => "lookupswitch",
            IReturn => "ireturn",
            LReturn => "lreturn",
            FReturn => "freturn",
            DReturn => "dreturn",
            AReturn => "areturn",
            Return => "return",
            GetStatic(_) => "getstatic",
            PutStatic(_) => "putstatic",
            GetField(_) => "getfield",
            PutField(_) => "putfield",
            Invoke(InvokeType::Virtual, _) => "invokevirtual",
            Invoke(InvokeType::Special, _) => "invokespecial",
            Invoke(InvokeType::Static, _) => "invokestatic",
            Invoke(InvokeType::Interface(_), _) => "invokeinterface",
            New(_) => "new",
            NewArray(_) => "newarray",
            ANewArray(_) => "anewarray",
            ArrayLength => "arraylength",
            AThrow => "athrow",
            CheckCast(_) => "checkcast",
            InstanceOf(_) => "instanceof",
            MonitorEnter => "monitorenter",
            MonitorExit => "monitorexit",
            MultiANewArray(_, _) => "multianewarray",
            FStoreConv(_) => "fstore_conv",
            DStoreConv(_) => "dstore_conv",
            FAStoreConv => "fastore_conv",
            DAStoreConv => "dastore_conv",
            CloneArray => "clone_array",
            DynamicInvoke(InvokeType::Virtual, _) => "dynamic_invokevirtual",
            DynamicInvoke(InvokeType::Special, _) => "dynamic_invokespecial",
            DynamicInvoke(InvokeType::Static, _) => "dynamic_invokestatic",
            DynamicInvoke(InvokeType::Interface(_), _) => "dynamic_invokeinterface",
            DynamicGetStatic(_) => "dynamic_getstatic",
            DynamicPutStatic(_) => "dynamic_putstatic",
            DynamicGetField(_) => "dynamic_getfield",
            DynamicPutField(_) => "dynamic_putfield",
        }
    }

    /// Branch and switch targets, as offsets relative to the instruction
    ///
    /// This does not include the next instruction, even for conditional branches.
    pub fn branch_offsets(&self) -> Vec<i32> {
        use Instruction::*;

        match self {
            If(_, offset) | IfICmp(_, offset) | IfACmp(_, offset) | IfNull(_, offset)
            | Goto(offset) | Jsr(offset) => vec![*offset],
            TableSwitch {
                default, targets, ..
            } => targets.iter().copied().chain(Some(*default)).collect(),
            LookupSwitch { default, targets } => targets
                .iter()
                .map(|(_, offset)| *offset)
                .chain(Some(*default))
                .collect(),
            _ => vec![],
        }
    }

    /// Does control (sometimes) continue on to the next instruction?
    ///
    /// `jsr` only does so once the subroutine returns, so it doesn't count.
    pub fn falls_through(&self) -> bool {
        use Instruction::*;

        !matches!(
            self,
            Goto(_)
                | Jsr(_)
                | Ret(_)
                | TableSwitch { .. }
                | LookupSwitch { .. }
                | IReturn
                | LReturn
                | FReturn
                | DReturn
                | AReturn
                | Return
                | AThrow
        )
    }

    /// Local variable read by the instruction (if any)
    pub fn loaded_local(&self) -> Option<u16> {
        use Instruction::*;

        match self {
            ILoad(idx) | LLoad(idx) | FLoad(idx) | DLoad(idx) | ALoad(idx) | IInc(idx, _)
            | Ret(idx) => Some(*idx),
            _ => None,
        }
    }

    /// Local variable written by the instruction (if any)
    pub fn stored_local(&self) -> Option<u16> {
        use Instruction::*;

        match self {
            IStore(idx) | LStore(idx) | FStore(idx) | DStore(idx) | AStore(idx)
            | FStoreConv(idx) | DStoreConv(idx) => Some(*idx),
            _ => None,
        }
    }
}

#[cfg(test)]
mod test {
    use super::Instruction::*;
    use super::*;

    #[test]
    fn operand_encodings() {
        assert_eq!(ILoad(2).encoded_len(0), 1);
        assert_eq!(ILoad(4).encoded_len(0), 2);
        assert_eq!(ILoad(300).encoded_len(0), 4);
        assert_eq!(Ret(2).encoded_len(0), 2);
        assert_eq!(IConst(5).encoded_len(0), 1);
        assert_eq!(IConst(100).encoded_len(0), 2);
        assert_eq!(IConst(1000).encoded_len(0), 3);
        assert_eq!(IInc(1, 1).encoded_len(0), 3);
        assert_eq!(IInc(1, 1000).encoded_len(0), 6);
        assert_eq!(Goto(-4).encoded_len(0), 3);
        assert_eq!(Goto(1 << 20).encoded_len(0), 5);
        assert_eq!(Invoke(InvokeType::Interface(2), 1).encoded_len(0), 5);
    }

    #[test]
    fn switch_alignment() {
        let switch = TableSwitch {
            default: 20,
            low: 0,
            targets: vec![20, 24],
        };
        // opcode at 0, operands start at 4
        assert_eq!(switch.encoded_len(0), 1 + 3 + 12 + 8);
        // opcode at 3, operands start at 4
        assert_eq!(switch.encoded_len(3), 1 + 12 + 8);

        let lookup = LookupSwitch {
            default: 20,
            targets: vec![(7, 20)],
        };
        assert_eq!(lookup.encoded_len(1), 1 + 2 + 8 + 8);
    }

    #[test]
    fn local_accesses() {
        assert_eq!(IInc(3, 1).loaded_local(), Some(3));
        assert_eq!(Ret(1).loaded_local(), Some(1));
        assert_eq!(DStoreConv(4).stored_local(), Some(4));
        assert_eq!(IAStore.stored_local(), None);
        assert_eq!(IfICmp(!OrdComparison::LT, 8).mnemonic(), "if_icmpge");
    }

    #[test]
    fn control_flow() {
        let lookup = LookupSwitch {
            default: 20,
            targets: vec![(7, 12), (9, -4)],
        };
        assert_eq!(lookup.branch_offsets(), vec![12, -4, 20]);
        assert!(!lookup.falls_through());

        assert_eq!(IfNull(EqComparison::NE, -6).branch_offsets(), vec![-6]);
        assert!(IfNull(EqComparison::NE, -6).falls_through());
        assert!(!Jsr(5).falls_through());
        assert!(IAdd.branch_offsets().is_empty());
        assert!(!AThrow.falls_through());
    }
}
