//! Bytecode buffer.
//!
//! Instructions are 16-bit words: an opcode followed by zero or more
//! operand words. Jump targets are absolute offsets encoded as an `i32`
//! split over two consecutive words. Line numbers are stored run-length
//! encoded alongside the code, one entry per run of words from the same
//! source line.

/// A single 16-bit code word.
pub type Instruction = u16;

/// All opcodes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u16)]
pub enum Opcode {
    Assert,
    Add,
    Call,
    ClearLocal,
    Compare,
    Concat,
    DecrementLocal,
    DefineLocal,
    GetField,
    GetFieldArg,
    GetFieldRef,
    GetGlobal,
    GetGlobalArg,
    GetGlobalRef,
    GetIndex,
    GetIndexArg,
    GetIndexRef,
    GetLocal,
    GetLocalArg,
    GetLocalRef,
    GetUniqueGlobal,
    GetUniqueLocal,
    GetUniqueUpvalue,
    GetUpvalue,
    GetUpvalueArg,
    GetUpvalueRef,
    Divide,
    Equal,
    Greater,
    GreaterEqual,
    IncrementLocal,
    Jump,
    JumpFalse,
    JumpFalseAnd,
    JumpTrue,
    JumpTrueOr,
    Less,
    LessEqual,
    Modulus,
    Multiply,
    Negate,
    NewArray,
    NewClosure,
    NewFrame,
    NewIterator,
    NewList,
    NewSet,
    NewTable,
    NextKey,
    NextValue,
    Not,
    NotEqual,
    Pop,
    Power,
    Precall,
    Print,
    PrintLine,
    PushBoolean,
    PushFalse,
    PushFloat,
    PushInteger,
    PushNan,
    PushNull,
    PushSmallInt,
    PushString,
    PushTrue,
    Return,
    SetField,
    SetGlobal,
    SetIndex,
    SetLocal,
    SetUpvalue,
    Subtract,
    TestIterator,
    Throw,
}

pub const OPCODE_COUNT: usize = 75;

/// Opcodes indexed by their raw value.
pub const OPCODES: [Opcode; OPCODE_COUNT] = [
    Opcode::Assert,
    Opcode::Add,
    Opcode::Call,
    Opcode::ClearLocal,
    Opcode::Compare,
    Opcode::Concat,
    Opcode::DecrementLocal,
    Opcode::DefineLocal,
    Opcode::GetField,
    Opcode::GetFieldArg,
    Opcode::GetFieldRef,
    Opcode::GetGlobal,
    Opcode::GetGlobalArg,
    Opcode::GetGlobalRef,
    Opcode::GetIndex,
    Opcode::GetIndexArg,
    Opcode::GetIndexRef,
    Opcode::GetLocal,
    Opcode::GetLocalArg,
    Opcode::GetLocalRef,
    Opcode::GetUniqueGlobal,
    Opcode::GetUniqueLocal,
    Opcode::GetUniqueUpvalue,
    Opcode::GetUpvalue,
    Opcode::GetUpvalueArg,
    Opcode::GetUpvalueRef,
    Opcode::Divide,
    Opcode::Equal,
    Opcode::Greater,
    Opcode::GreaterEqual,
    Opcode::IncrementLocal,
    Opcode::Jump,
    Opcode::JumpFalse,
    Opcode::JumpFalseAnd,
    Opcode::JumpTrue,
    Opcode::JumpTrueOr,
    Opcode::Less,
    Opcode::LessEqual,
    Opcode::Modulus,
    Opcode::Multiply,
    Opcode::Negate,
    Opcode::NewArray,
    Opcode::NewClosure,
    Opcode::NewFrame,
    Opcode::NewIterator,
    Opcode::NewList,
    Opcode::NewSet,
    Opcode::NewTable,
    Opcode::NextKey,
    Opcode::NextValue,
    Opcode::Not,
    Opcode::NotEqual,
    Opcode::Pop,
    Opcode::Power,
    Opcode::Precall,
    Opcode::Print,
    Opcode::PrintLine,
    Opcode::PushBoolean,
    Opcode::PushFalse,
    Opcode::PushFloat,
    Opcode::PushInteger,
    Opcode::PushNan,
    Opcode::PushNull,
    Opcode::PushSmallInt,
    Opcode::PushString,
    Opcode::PushTrue,
    Opcode::Return,
    Opcode::SetField,
    Opcode::SetGlobal,
    Opcode::SetIndex,
    Opcode::SetLocal,
    Opcode::SetUpvalue,
    Opcode::Subtract,
    Opcode::TestIterator,
    Opcode::Throw,
];

pub const OPCODE_NAMES: [&str; OPCODE_COUNT] = [
    "Assert",
    "Add",
    "Call",
    "ClearLocal",
    "Compare",
    "Concat",
    "DecrementLocal",
    "DefineLocal",
    "GetField",
    "GetFieldArg",
    "GetFieldRef",
    "GetGlobal",
    "GetGlobalArg",
    "GetGlobalRef",
    "GetIndex",
    "GetIndexArg",
    "GetIndexRef",
    "GetLocal",
    "GetLocalArg",
    "GetLocalRef",
    "GetUniqueGlobal",
    "GetUniqueLocal",
    "GetUniqueUpvalue",
    "GetUpvalue",
    "GetUpvalueArg",
    "GetUpvalueRef",
    "Divide",
    "Equal",
    "Greater",
    "GreaterEqual",
    "IncrementLocal",
    "Jump",
    "JumpFalse",
    "JumpFalseAnd",
    "JumpTrue",
    "JumpTrueOr",
    "Less",
    "LessEqual",
    "Modulus",
    "Multiply",
    "Negate",
    "NewArray",
    "NewClosure",
    "NewFrame",
    "NewIterator",
    "NewList",
    "NewSet",
    "NewTable",
    "NextKey",
    "NextValue",
    "Not",
    "NotEqual",
    "Pop",
    "Power",
    "Precall",
    "Print",
    "PrintLine",
    "PushBoolean",
    "PushFalse",
    "PushFloat",
    "PushInteger",
    "PushNan",
    "PushNull",
    "PushSmallInt",
    "PushString",
    "PushTrue",
    "Return",
    "SetField",
    "SetGlobal",
    "SetIndex",
    "SetLocal",
    "SetUpvalue",
    "Subtract",
    "TestIterator",
    "Throw",
];

impl Opcode {
    pub fn from_raw(i: Instruction) -> Option<Opcode> {
        OPCODES.get(i as usize).copied()
    }

    pub fn name(self) -> &'static str {
        OPCODE_NAMES[self as usize]
    }

    /// Number of operand words following the opcode.
    pub fn operand_count(self) -> usize {
        use Opcode::*;
        match self {
            // jumps carry a 32-bit target split over two words
            Jump | JumpFalse | JumpFalseAnd | JumpTrue | JumpTrueOr => 2,
            GetLocalArg | GetGlobalArg | GetUpvalueArg | GetIndexArg | NewClosure | NewArray => 2,
            Assert | Call | ClearLocal | Concat | DecrementLocal | DefineLocal | GetFieldArg
            | GetGlobal | GetGlobalRef | GetUniqueGlobal | GetIndex | GetIndexRef | GetLocal
            | GetLocalRef | GetUniqueLocal | GetUniqueUpvalue | GetUpvalue | GetUpvalueRef
            | IncrementLocal | NewFrame | NewIterator | NewList | NewSet | NewTable | Print
            | PrintLine | PushBoolean | PushFloat | PushInteger | PushSmallInt | PushString
            | SetGlobal | SetIndex | SetLocal | SetUpvalue => 1,
            _ => 0,
        }
    }
}

/// Split a jump offset into two code words.
pub fn encode_i32(value: i32) -> [Instruction; 2] {
    let bits = value as u32;
    [(bits & 0xFFFF) as u16, (bits >> 16) as u16]
}

pub fn decode_i32(lo: Instruction, hi: Instruction) -> i32 {
    ((hi as u32) << 16 | lo as u32) as i32
}

#[derive(Debug, Default)]
pub struct Code {
    code: Vec<Instruction>,
    /// Run-length encoded line numbers: (line, word count).
    lines: Vec<(u16, u16)>,
}

impl Code {
    pub fn new() -> Self {
        Code::default()
    }

    pub fn as_slice(&self) -> &[Instruction] {
        &self.code
    }

    pub fn len(&self) -> usize {
        self.code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }

    pub fn current_offset(&self) -> usize {
        self.code.len()
    }

    fn add_line(&mut self, line: u32) -> Result<(), String> {
        if line > u16::MAX as u32 {
            return Err(format!(
                "Source file too long: a file can contain at most {} lines",
                u16::MAX
            ));
        }
        let line = line as u16;
        match self.lines.last_mut() {
            Some((l, count)) if *l == line => *count += 1,
            _ => self.lines.push((line, 1)),
        }
        Ok(())
    }

    /// Source line for the word at `offset`.
    ///
    /// Panics if `offset` is past the end of the code: the line table
    /// covers every emitted word, so this indicates a compiler bug.
    pub fn get_line(&self, offset: usize) -> u16 {
        let mut count = 0;
        for &(line, n) in &self.lines {
            count += n as usize;
            if offset < count {
                return line;
            }
        }
        panic!("[Internal error] Cannot determine line number: invalid offset {offset}");
    }

    pub fn emit(&mut self, line: u32, op: Opcode) -> Result<(), String> {
        self.add_line(line)?;
        self.code.push(op as Instruction);
        Ok(())
    }

    pub fn emit_raw(&mut self, line: u32, word: Instruction) -> Result<(), String> {
        self.add_line(line)?;
        self.code.push(word);
        Ok(())
    }

    /// Emit a jump with a placeholder (or known) target. Returns the offset
    /// of the operand for later backpatching.
    pub fn emit_jump(&mut self, line: u32, op: Opcode, target: i32) -> Result<usize, String> {
        self.emit(line, op)?;
        let at = self.current_offset();
        let [lo, hi] = encode_i32(target);
        self.emit_raw(line, lo)?;
        self.emit_raw(line, hi)?;
        Ok(at)
    }

    /// Point the jump operand at `at` to the current end of code.
    pub fn backpatch(&mut self, at: usize) {
        self.backpatch_to(at, self.current_offset() as i32);
    }

    pub fn backpatch_to(&mut self, at: usize, value: i32) {
        let [lo, hi] = encode_i32(value);
        self.code[at] = lo;
        self.code[at + 1] = hi;
    }

    pub fn backpatch_instruction(&mut self, at: usize, value: Instruction) {
        self.code[at] = value;
    }

    /// Terminate the routine, reusing the last recorded line.
    pub fn emit_return(&mut self) -> Result<(), String> {
        let line = self.lines.last().map_or(0, |&(l, _)| l as u32);
        self.emit(line, Opcode::Return)
    }
}
