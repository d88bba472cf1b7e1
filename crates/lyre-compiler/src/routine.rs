//! Compiled routines: bytecode plus constant pools, local slots and
//! upvalue descriptors.

use crate::code::{Code, Instruction};
use std::rc::Rc;

/// A local variable slot, tagged with the scope it was declared in.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Local {
    pub name: String,
    /// Unique id of the declaring scope.
    pub scope: u32,
    /// Nesting depth of the declaring scope.
    pub depth: u32,
}

/// A non-local variable referenced by an inner routine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Upvalue {
    /// Slot in the enclosing routine: a local index when `is_local`,
    /// otherwise an upvalue index.
    pub index: Instruction,
    pub is_local: bool,
}

/// Maximum number of parameters; bounded by the reference bitset width.
pub const MAX_PARAMS: usize = 64;

#[derive(Debug, Default)]
pub struct Routine {
    pub name: String,
    pub nparam: usize,
    /// Bit `i` set means parameter `i` is passed by reference.
    pub ref_flags: u64,
    pub integer_pool: Vec<i64>,
    pub float_pool: Vec<f64>,
    pub string_pool: Vec<String>,
    pub routine_pool: Vec<Rc<Routine>>,
    pub locals: Vec<Local>,
    pub upvalues: Vec<Upvalue>,
    pub code: Code,
}

fn pool_index(len: usize) -> Result<Instruction, String> {
    if len > Instruction::MAX as usize {
        Err("[Compiler error] Too many constants in routine".to_string())
    } else {
        Ok(len as Instruction)
    }
}

impl Routine {
    pub fn new(name: impl Into<String>) -> Self {
        Routine {
            name: name.into(),
            ..Routine::default()
        }
    }

    pub fn add_integer_constant(&mut self, value: i64) -> Result<Instruction, String> {
        if let Some(i) = self.integer_pool.iter().position(|&x| x == value) {
            return Ok(i as Instruction);
        }
        let idx = pool_index(self.integer_pool.len())?;
        self.integer_pool.push(value);
        Ok(idx)
    }

    pub fn add_float_constant(&mut self, value: f64) -> Result<Instruction, String> {
        if let Some(i) = self
            .float_pool
            .iter()
            .position(|x| x.to_bits() == value.to_bits())
        {
            return Ok(i as Instruction);
        }
        let idx = pool_index(self.float_pool.len())?;
        self.float_pool.push(value);
        Ok(idx)
    }

    pub fn add_string_constant(&mut self, value: &str) -> Result<Instruction, String> {
        if let Some(i) = self.string_pool.iter().position(|x| x == value) {
            return Ok(i as Instruction);
        }
        let idx = pool_index(self.string_pool.len())?;
        self.string_pool.push(value.to_string());
        Ok(idx)
    }

    pub fn add_routine(&mut self, r: Rc<Routine>) -> Result<Instruction, String> {
        let idx = pool_index(self.routine_pool.len())?;
        self.routine_pool.push(r);
        Ok(idx)
    }

    /// Declare a local in `scope`. Shadowing an outer scope is allowed;
    /// redeclaring in the same scope is an error.
    pub fn add_local(&mut self, name: &str, scope: u32, depth: u32) -> Result<Instruction, String> {
        for local in self.locals.iter().rev() {
            if local.scope != scope {
                break;
            }
            if local.name == name {
                return Err(format!(
                    "[Name error] Variable \"{name}\" is already defined in this scope"
                ));
            }
        }
        let idx = pool_index(self.locals.len())?;
        self.locals.push(Local {
            name: name.to_string(),
            scope,
            depth,
        });
        Ok(idx)
    }

    /// Find the innermost visible local named `name`, scanning from the
    /// most recent declaration.
    pub fn find_local(&self, name: &str, scope_depth: u32) -> Option<Instruction> {
        for (i, local) in self.locals.iter().enumerate().rev() {
            if local.depth <= scope_depth && local.name == name {
                return Some(i as Instruction);
            }
        }
        None
    }

    pub fn add_upvalue(&mut self, index: Instruction, is_local: bool) -> Result<Instruction, String> {
        let upvalue = Upvalue { index, is_local };
        if let Some(i) = self.upvalues.iter().position(|u| *u == upvalue) {
            return Ok(i as Instruction);
        }
        if self.upvalues.len() > Instruction::MAX as usize {
            return Err(
                "[Compiler error] Maximum number of upvalues exceeded in the current function"
                    .to_string(),
            );
        }
        self.upvalues.push(upvalue);
        Ok(self.upvalues.len() as Instruction - 1)
    }

    pub fn local_count(&self) -> usize {
        self.locals.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_dedup() {
        let mut r = Routine::new("test");
        assert_eq!(r.add_integer_constant(7).unwrap(), 0);
        assert_eq!(r.add_integer_constant(8).unwrap(), 1);
        assert_eq!(r.add_integer_constant(7).unwrap(), 0);
        assert_eq!(r.add_string_constant("a").unwrap(), 0);
        assert_eq!(r.add_string_constant("a").unwrap(), 0);
        assert_eq!(r.add_float_constant(1.5).unwrap(), 0);
        assert_eq!(r.add_float_constant(1.5).unwrap(), 0);
    }

    #[test]
    fn test_duplicate_local_in_scope() {
        let mut r = Routine::new("test");
        r.add_local("x", 1, 1).unwrap();
        assert!(r.add_local("x", 1, 1).is_err());
        // shadowing in an inner scope is fine
        assert!(r.add_local("x", 2, 2).is_ok());
    }

    #[test]
    fn test_find_local_prefers_innermost() {
        let mut r = Routine::new("test");
        let outer = r.add_local("x", 1, 1).unwrap();
        let inner = r.add_local("x", 2, 2).unwrap();
        assert_eq!(r.find_local("x", 2), Some(inner));
        // an inner declaration is invisible at lower depth
        assert_eq!(r.find_local("x", 1), Some(outer));
        assert_eq!(r.find_local("y", 2), None);
    }

    #[test]
    fn test_upvalue_dedup() {
        let mut r = Routine::new("test");
        assert_eq!(r.add_upvalue(3, true).unwrap(), 0);
        assert_eq!(r.add_upvalue(3, true).unwrap(), 0);
        assert_eq!(r.add_upvalue(3, false).unwrap(), 1);
    }
}
