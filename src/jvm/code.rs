use super::{HardErrorKind, Instruction};

/// Method body
#[derive(Clone, Debug)]
pub struct Code {
    /// Maximum operand stack size, where `long` and `double` count for 2
    pub max_stack: u16,

    /// Number of local variable slots, where `long` and `double` count for 2
    pub max_locals: u16,

    /// Instructions, sorted by `pc`
    pub instructions: Vec<CodeInstruction>,

    /// Length of the bytecode (one past the `pc` of the last byte)
    pub code_length: usize,

    pub exception_table: Vec<ExceptionHandler>,

    /// Debug information about source-level local variables, if the class file has any
    pub local_variable_table: Option<Vec<LocalVariableEntry>>,
}

/// Instruction at a specific offset in the code
#[derive(Clone, Debug, PartialEq)]
pub struct CodeInstruction {
    pub pc: usize,
    pub op: Op,
}

/// Operation performed by an instruction
///
/// Verification may determine that an otherwise well-typed instruction can only fail at runtime.
/// Those get rewritten into `Deferred`, remembering the replaced instruction and which error to
/// throw when control reaches them.
#[derive(Clone, Debug, PartialEq)]
pub enum Op {
    Resolved(Instruction),
    Deferred {
        instruction: Instruction,
        kind: HardErrorKind,

        /// Index into the verifier's error messages
        message_id: usize,
    },
}

impl Op {
    pub fn instruction(&self) -> &Instruction {
        match self {
            Op::Resolved(instruction) => instruction,
            Op::Deferred { instruction, .. } => instruction,
        }
    }

    pub fn is_deferred(&self) -> bool {
        matches!(self, Op::Deferred { .. })
    }
}

/// Entry in the exception table
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ExceptionHandler {
    /// Start of the protected range (inclusive)
    pub start_pc: usize,

    /// End of the protected range (exclusive)
    pub end_pc: usize,

    pub handler_pc: usize,

    /// Constant pool index of the caught class, or `0` to catch everything
    pub catch_type: u16,
}

/// Entry in the `LocalVariableTable` attribute
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LocalVariableEntry {
    pub start_pc: usize,
    pub length: usize,
    pub name: String,
    pub descriptor: String,
    pub index: u16,
}

impl Code {
    /// Lay out instructions one after another, computing their offsets from their encodings
    pub fn new(max_stack: u16, max_locals: u16, instructions: Vec<Instruction>) -> Code {
        let mut pc = 0;
        let instructions = instructions
            .into_iter()
            .map(|instruction| {
                let at = pc;
                pc += instruction.encoded_len(at);
                CodeInstruction {
                    pc: at,
                    op: Op::Resolved(instruction),
                }
            })
            .collect();

        Code {
            max_stack,
            max_locals,
            instructions,
            code_length: pc,
            exception_table: vec![],
            local_variable_table: None,
        }
    }

    /// Find the index of the instruction starting at `pc`
    ///
    /// The end of the code also counts as a boundary, and maps to one past the last index.
    pub fn index_of(&self, pc: usize) -> Option<usize> {
        if pc == self.code_length {
            return Some(self.instructions.len());
        }
        self.instructions
            .binary_search_by_key(&pc, |instruction| instruction.pc)
            .ok()
    }

    /// Offset of the instruction after the one at `index`
    pub fn next_pc(&self, index: usize) -> usize {
        self.instructions
            .get(index + 1)
            .map_or(self.code_length, |instruction| instruction.pc)
    }
}
