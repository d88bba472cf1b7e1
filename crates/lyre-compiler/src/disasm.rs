//! Bytecode listing, for the `--disasm` flag and for debugging the
//! compiler itself.

use crate::code::{decode_i32, Opcode};
use crate::routine::Routine;
use std::fmt::Write;

/// Render a routine's code as one instruction per line, followed by the
/// listings of its nested routines.
pub fn disassemble(routine: &Routine) -> String {
    let mut out = String::new();
    write_routine(&mut out, routine);
    out
}

fn write_routine(out: &mut String, routine: &Routine) {
    let _ = writeln!(out, "routine {} ({} params)", routine.name, routine.nparam);
    let words = routine.code.as_slice();
    let mut offset = 0;
    while offset < words.len() {
        let op = match Opcode::from_raw(words[offset]) {
            Some(op) => op,
            None => {
                let _ = writeln!(out, "{offset:6}  ?? {:#06x}", words[offset]);
                offset += 1;
                continue;
            }
        };
        let line = routine.code.get_line(offset);
        let _ = write!(out, "{offset:6}  [{line:4}]  {:<18}", op.name());
        let operands = &words[offset + 1..offset + 1 + op.operand_count()];
        write_operands(out, routine, op, operands);
        let _ = writeln!(out);
        offset += 1 + op.operand_count();
    }
    for inner in &routine.routine_pool {
        let _ = writeln!(out);
        write_routine(out, inner);
    }
}

fn write_operands(out: &mut String, routine: &Routine, op: Opcode, operands: &[u16]) {
    use Opcode::*;
    match op {
        Jump | JumpFalse | JumpFalseAnd | JumpTrue | JumpTrueOr => {
            let target = decode_i32(operands[0], operands[1]);
            let _ = write!(out, "-> {target}");
        }
        PushSmallInt => {
            let _ = write!(out, "{}", operands[0] as i16);
        }
        PushInteger => {
            let _ = write!(out, "{} ; {}", operands[0], routine.integer_pool[operands[0] as usize]);
        }
        PushFloat => {
            let _ = write!(out, "{} ; {}", operands[0], routine.float_pool[operands[0] as usize]);
        }
        PushString | GetGlobal | GetGlobalRef | GetUniqueGlobal | SetGlobal => {
            let _ = write!(
                out,
                "{} ; {:?}",
                operands[0], routine.string_pool[operands[0] as usize]
            );
        }
        GetGlobalArg => {
            let _ = write!(
                out,
                "{} {} ; {:?}",
                operands[0], operands[1], routine.string_pool[operands[0] as usize]
            );
        }
        GetLocal | GetLocalRef | GetUniqueLocal | SetLocal | DefineLocal | ClearLocal
        | IncrementLocal | DecrementLocal => {
            let name = routine
                .locals
                .get(operands[0] as usize)
                .map(|l| l.name.as_str())
                .unwrap_or("?");
            let _ = write!(out, "{} ; {name}", operands[0]);
        }
        NewClosure => {
            let inner = &routine.routine_pool[operands[0] as usize];
            let _ = write!(out, "{} {} ; {}", operands[0], operands[1], inner.name);
        }
        Call => {
            let narg = operands[0] & 0x1FF;
            let by_ref = operands[0] >> 9 != 0;
            let _ = write!(out, "{narg}");
            if by_ref {
                let _ = write!(out, " ref");
            }
        }
        _ => {
            for word in operands {
                let _ = write!(out, "{word} ");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::Compiler;
    use crate::parser::Parser;

    fn listing(src: &str) -> String {
        let program = Parser::new(src).parse().unwrap();
        let routine = Compiler::new().compile(&program).unwrap();
        disassemble(&routine)
    }

    #[test]
    fn test_listing_names_locals_and_globals() {
        let out = listing("local x = 1\nprint x\n");
        assert!(out.contains("PushSmallInt"));
        assert!(out.contains("DefineLocal"));
        assert!(out.contains("; x"));
        assert!(out.contains("PrintLine"));
    }

    #[test]
    fn test_listing_includes_nested_routines() {
        let out = listing("function f()\nreturn 1\nend\n");
        assert!(out.contains("routine <main>"));
        assert!(out.contains("routine f"));
        assert!(out.contains("NewClosure"));
    }

    #[test]
    fn test_jump_targets_are_absolute() {
        let out = listing("if true then\npass\nend\n");
        assert!(out.contains("JumpFalse"));
        assert!(out.contains("-> "));
    }
}
