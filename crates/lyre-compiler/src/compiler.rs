//! AST to bytecode compiler.
//!
//! The compiler walks the AST once, emitting into the current routine's
//! code buffer. Forward jumps are emitted with a placeholder operand and
//! backpatched when the target is known. Nested routine definitions are
//! compiled on a stack of routines; upvalue resolution walks that stack.

use crate::ast::{AssignOp, BinOp, Expr, ExprKind, Param, Stmt, StmtKind};
use crate::code::{Instruction, Opcode};
use crate::parser::{ParseError, Parser, Program};
use crate::routine::{Routine, MAX_PARAMS};
use std::fmt;
use std::rc::Rc;

/// Compilation error.
#[derive(Clone, Debug, PartialEq)]
pub struct CompileError {
    pub message: String,
    pub line: u32,
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "At line {}: {}", self.line, self.message)
    }
}

impl std::error::Error for CompileError {}

impl From<ParseError> for CompileError {
    fn from(e: ParseError) -> Self {
        CompileError {
            message: e.message,
            line: e.line,
        }
    }
}

/// Parse and compile a source string into its top-level routine.
pub fn compile(source: &str) -> Result<Rc<Routine>, CompileError> {
    let program = Parser::new(source).parse()?;
    Compiler::new().compile(&program)
}

pub struct Compiler {
    /// Routines being compiled; the last entry is the current one.
    routines: Vec<Routine>,
    scope_id: u32,
    current_scope: u32,
    scope_depth: u32,
    break_jumps: Vec<usize>,
    break_count: usize,
    continue_jumps: Vec<usize>,
    continue_count: usize,
    /// Number of enclosing loops in the current routine.
    loop_depth: usize,
    /// Index of the argument being compiled, or -1 outside argument lists.
    /// Arguments use dedicated opcodes so the runtime can pass them by
    /// reference when the callee asks for it.
    visit_arg: i32,
    visiting_reference: bool,
    visiting_indexed_lhs: bool,
    visiting_assigned_lhs: bool,
    debug_mode: bool,
}

impl Compiler {
    pub fn new() -> Self {
        Compiler {
            routines: Vec::new(),
            scope_id: 0,
            current_scope: 0,
            scope_depth: 0,
            break_jumps: Vec::new(),
            break_count: 0,
            continue_jumps: Vec::new(),
            continue_count: 0,
            loop_depth: 0,
            visit_arg: -1,
            visiting_reference: false,
            visiting_indexed_lhs: false,
            visiting_assigned_lhs: false,
            debug_mode: false,
        }
    }

    /// Compile a whole program into its top-level routine.
    pub fn compile(mut self, program: &Program) -> Result<Rc<Routine>, CompileError> {
        self.debug_mode = program.debug;
        self.routines.push(Routine::new("<main>"));
        let line = program.stmts.first().map_or(1, |s| s.line);
        // dummy value filling the callee slot, popped on return
        self.emit(line, Opcode::PushNull)?;
        self.emit_op(line, Opcode::NewFrame, 0)?;
        let frame_offset = self.routine().code.current_offset() - 1;
        let previous = self.open_scope();
        for stmt in &program.stmts {
            self.compile_stmt(stmt)?;
        }
        self.close_scope(previous);
        let nlocals = self.routine().local_count() as Instruction;
        self.routine().code.backpatch_instruction(frame_offset, nlocals);
        self.routine()
            .code
            .emit_return()
            .map_err(|e| CompileError { message: e, line })?;
        match self.routines.pop() {
            Some(routine) => Ok(Rc::new(routine)),
            None => unreachable!("routine stack is never empty"),
        }
    }

    // ---- plumbing ----

    fn routine(&mut self) -> &mut Routine {
        match self.routines.last_mut() {
            Some(r) => r,
            None => unreachable!("routine stack is never empty"),
        }
    }

    fn err(&self, line: u32, message: impl Into<String>) -> CompileError {
        CompileError {
            message: message.into(),
            line,
        }
    }

    fn emit(&mut self, line: u32, op: Opcode) -> Result<(), CompileError> {
        self.routine()
            .code
            .emit(line, op)
            .map_err(|e| self.err(line, e))
    }

    fn emit_op(&mut self, line: u32, op: Opcode, a: Instruction) -> Result<(), CompileError> {
        self.emit(line, op)?;
        self.routine()
            .code
            .emit_raw(line, a)
            .map_err(|e| self.err(line, e))
    }

    fn emit_op2(
        &mut self,
        line: u32,
        op: Opcode,
        a: Instruction,
        b: Instruction,
    ) -> Result<(), CompileError> {
        self.emit_op(line, op, a)?;
        self.routine()
            .code
            .emit_raw(line, b)
            .map_err(|e| self.err(line, e))
    }

    fn emit_jump(&mut self, line: u32, op: Opcode) -> Result<usize, CompileError> {
        self.emit_jump_to(line, op, 0)
    }

    fn emit_jump_to(&mut self, line: u32, op: Opcode, target: i32) -> Result<usize, CompileError> {
        self.routine()
            .code
            .emit_jump(line, op, target)
            .map_err(|e| self.err(line, e))
    }

    fn open_scope(&mut self) -> u32 {
        let previous = self.current_scope;
        self.scope_id += 1;
        self.current_scope = self.scope_id;
        self.scope_depth += 1;
        previous
    }

    fn close_scope(&mut self, previous: u32) {
        self.scope_depth -= 1;
        self.current_scope = previous;
    }

    fn add_local(&mut self, line: u32, name: &str) -> Result<Instruction, CompileError> {
        let scope = self.current_scope;
        let depth = self.scope_depth;
        self.routine()
            .add_local(name, scope, depth)
            .map_err(|e| self.err(line, e))
    }

    fn parsing_argument(&self) -> bool {
        self.visit_arg >= 0
    }

    /// Resolve `name` as an upvalue of the current routine, walking the
    /// routine stack outward and threading the capture through every
    /// intermediate routine.
    fn resolve_upvalue(&mut self, name: &str, line: u32) -> Result<Option<Instruction>, CompileError> {
        let level = self.routines.len() - 1;
        self.resolve_upvalue_at(level, name, line)
    }

    fn resolve_upvalue_at(
        &mut self,
        level: usize,
        name: &str,
        line: u32,
    ) -> Result<Option<Instruction>, CompileError> {
        if level == 0 {
            return Ok(None);
        }
        let parent = level - 1;
        if let Some(index) = self.routines[parent].find_local(name, self.scope_depth) {
            let idx = self.routines[level]
                .add_upvalue(index, true)
                .map_err(|e| self.err(line, e))?;
            return Ok(Some(idx));
        }
        if let Some(index) = self.resolve_upvalue_at(parent, name, line)? {
            let idx = self.routines[level]
                .add_upvalue(index, false)
                .map_err(|e| self.err(line, e))?;
            return Ok(Some(idx));
        }
        Ok(None)
    }

    // ---- statements ----

    fn compile_stmt(&mut self, stmt: &Stmt) -> Result<(), CompileError> {
        let line = stmt.line;
        match &stmt.kind {
            StmtKind::Expression(e) => {
                self.compile_expr(e)?;
                // expression statements discard their value
                self.emit(line, Opcode::Pop)
            }
            StmtKind::Assign { lhs, rhs, op } => self.compile_assignment(line, lhs, rhs, *op),
            StmtKind::Print { args, newline } => {
                for arg in args {
                    self.compile_expr(arg)?;
                }
                let op = if *newline {
                    Opcode::PrintLine
                } else {
                    Opcode::Print
                };
                self.emit_op(line, op, args.len() as Instruction)
            }
            StmtKind::Local { names, values } => {
                if values.is_empty() {
                    // null-initialized by NewFrame, no code needed
                    for name in names {
                        self.add_local(line, name)?;
                    }
                    Ok(())
                } else {
                    // evaluate every value before any name becomes visible
                    for value in values {
                        self.compile_expr(value)?;
                    }
                    let mut indexes = Vec::with_capacity(names.len());
                    for name in names {
                        indexes.push(self.add_local(line, name)?);
                    }
                    for &index in indexes.iter().rev() {
                        self.emit_op(line, Opcode::DefineLocal, index)?;
                    }
                    Ok(())
                }
            }
            StmtKind::If {
                branches,
                else_block,
            } => {
                let mut exit_jumps = Vec::with_capacity(branches.len());
                for (cond, block) in branches {
                    self.compile_expr(cond)?;
                    let next_branch = self.emit_jump(line, Opcode::JumpFalse)?;
                    self.compile_scoped_block(block)?;
                    exit_jumps.push(self.emit_jump(line, Opcode::Jump)?);
                    self.routine().code.backpatch(next_branch);
                }
                if let Some(block) = else_block {
                    self.compile_scoped_block(block)?;
                }
                for at in exit_jumps {
                    self.routine().code.backpatch(at);
                }
                Ok(())
            }
            StmtKind::While { cond, body } => {
                let previous_breaks = self.break_count;
                let previous_continues = self.continue_count;
                self.break_count = 0;
                self.continue_count = 0;
                let loop_start = self.routine().code.current_offset();
                self.compile_expr(cond)?;
                let exit_jump = self.emit_jump(line, Opcode::JumpFalse)?;
                self.loop_depth += 1;
                self.compile_scoped_block(body)?;
                self.loop_depth -= 1;
                self.backpatch_continues(previous_continues, None);
                self.emit_jump_to(line, Opcode::Jump, loop_start as i32)?;
                self.routine().code.backpatch(exit_jump);
                self.backpatch_breaks(previous_breaks);
                Ok(())
            }
            StmtKind::Repeat { body, cond } => {
                let scope = self.open_scope();
                let previous_breaks = self.break_count;
                let previous_continues = self.continue_count;
                self.break_count = 0;
                self.continue_count = 0;
                let loop_start = self.routine().code.current_offset();
                self.loop_depth += 1;
                for stmt in body {
                    self.compile_stmt(stmt)?;
                }
                self.loop_depth -= 1;
                self.compile_expr(cond)?;
                self.emit_jump_to(line, Opcode::JumpFalse, loop_start as i32)?;
                self.backpatch_breaks(previous_breaks);
                self.backpatch_continues(previous_continues, Some(loop_start));
                self.close_scope(scope);
                Ok(())
            }
            StmtKind::For {
                var,
                start,
                end,
                step,
                down,
                body,
            } => self.compile_for(line, var, start, end, step.as_ref(), *down, body),
            StmtKind::Foreach {
                key,
                value,
                by_ref,
                coll,
                body,
            } => self.compile_foreach(line, key.as_deref(), value, *by_ref, coll, body),
            StmtKind::Function {
                local,
                name,
                params,
                body,
            } => self.compile_routine(line, Some((name.as_str(), *local)), params, body),
            StmtKind::Return(value) => {
                match value {
                    Some(e) => self.compile_expr(e)?,
                    None => self.emit(line, Opcode::PushNull)?,
                }
                self.emit(line, Opcode::Return)
            }
            StmtKind::Break => {
                if self.loop_depth == 0 {
                    return Err(self.err(line, "[Syntax error] \"break\" outside of a loop"));
                }
                let at = self.emit_jump(line, Opcode::Jump)?;
                self.break_jumps.push(at);
                self.break_count += 1;
                Ok(())
            }
            StmtKind::Continue => {
                if self.loop_depth == 0 {
                    return Err(self.err(line, "[Syntax error] \"continue\" outside of a loop"));
                }
                let at = self.emit_jump(line, Opcode::Jump)?;
                self.continue_jumps.push(at);
                self.continue_count += 1;
                Ok(())
            }
            StmtKind::Assert { cond, msg } => {
                self.compile_expr(cond)?;
                let mut narg = 1;
                if let Some(msg) = msg {
                    self.compile_expr(msg)?;
                    narg = 2;
                }
                self.emit_op(line, Opcode::Assert, narg)
            }
            StmtKind::Throw(e) => {
                self.compile_expr(e)?;
                self.emit(line, Opcode::Throw)
            }
            StmtKind::Do(block) => self.compile_scoped_block(block),
            StmtKind::Debug(block) => {
                if self.debug_mode {
                    self.compile_scoped_block(block)?;
                }
                Ok(())
            }
            StmtKind::Pass => Ok(()),
        }
    }

    fn compile_scoped_block(&mut self, block: &[Stmt]) -> Result<(), CompileError> {
        let scope = self.open_scope();
        for stmt in block {
            self.compile_stmt(stmt)?;
        }
        self.close_scope(scope);
        Ok(())
    }

    fn backpatch_breaks(&mut self, previous: usize) {
        for _ in 0..self.break_count {
            if let Some(at) = self.break_jumps.pop() {
                self.routine().code.backpatch(at);
            }
        }
        self.break_count = previous;
    }

    /// Backpatch pending continues to the current offset, or to
    /// `target` (the loop start, for `repeat` loops).
    fn backpatch_continues(&mut self, previous: usize, target: Option<usize>) {
        for _ in 0..self.continue_count {
            if let Some(at) = self.continue_jumps.pop() {
                match target {
                    Some(t) => self.routine().code.backpatch_to(at, t as i32),
                    None => self.routine().code.backpatch(at),
                }
            }
        }
        self.continue_count = previous;
    }

    fn compile_for(
        &mut self,
        line: u32,
        var: &str,
        start: &Expr,
        end: &Expr,
        step: Option<&Expr>,
        down: bool,
        body: &[Stmt],
    ) -> Result<(), CompileError> {
        let scope = self.open_scope();
        let previous_breaks = self.break_count;
        let previous_continues = self.continue_count;
        self.break_count = 0;
        self.continue_count = 0;

        // loop variable
        self.compile_expr(start)?;
        let var_index = self.add_local(line, var)?;
        self.emit_op(line, Opcode::DefineLocal, var_index)?;

        // the end bound is evaluated once, into a hidden local
        self.compile_expr(end)?;
        let end_index = self.add_local(line, "$end")?;
        self.emit_op(line, Opcode::DefineLocal, end_index)?;

        // the step too, when present; otherwise dedicated increment and
        // decrement instructions update the counter
        let step_index = match step {
            Some(step) => {
                self.compile_expr(step)?;
                let idx = self.add_local(line, "$step")?;
                self.emit_op(line, Opcode::DefineLocal, idx)?;
                Some(idx)
            }
            None => None,
        };

        let loop_start = self.routine().code.current_offset();

        // exit when the counter passes the (inclusive) bound
        self.emit_op(line, Opcode::GetLocal, var_index)?;
        self.emit_op(line, Opcode::GetLocal, end_index)?;
        let cmp = if down { Opcode::Less } else { Opcode::Greater };
        self.emit(line, cmp)?;
        let jump_end = self.emit_jump(line, Opcode::JumpTrue)?;

        self.loop_depth += 1;
        self.compile_scoped_block(body)?;
        self.loop_depth -= 1;
        self.backpatch_continues(previous_continues, None);

        match step_index {
            Some(step_index) => {
                self.emit_op(line, Opcode::GetLocal, var_index)?;
                self.emit_op(line, Opcode::GetLocal, step_index)?;
                let op = if down { Opcode::Subtract } else { Opcode::Add };
                self.emit(line, op)?;
                self.emit_op(line, Opcode::SetLocal, var_index)?;
            }
            None => {
                let op = if down {
                    Opcode::DecrementLocal
                } else {
                    Opcode::IncrementLocal
                };
                self.emit_op(line, op, var_index)?;
            }
        }

        self.emit_jump_to(line, Opcode::Jump, loop_start as i32)?;
        self.routine().code.backpatch(jump_end);
        self.backpatch_breaks(previous_breaks);
        self.close_scope(scope);
        Ok(())
    }

    fn compile_foreach(
        &mut self,
        line: u32,
        key: Option<&str>,
        value: &str,
        by_ref: bool,
        coll: &Expr,
        body: &[Stmt],
    ) -> Result<(), CompileError> {
        let scope = self.open_scope();
        let previous_breaks = self.break_count;
        let previous_continues = self.continue_count;
        self.break_count = 0;
        self.continue_count = 0;

        let key_index = match key {
            Some(name) => Some(self.add_local(line, name)?),
            None => None,
        };
        let val_index = self.add_local(line, value)?;
        let iter_index = self.add_local(line, "$iter")?;

        // the iterator grabs the collection by reference
        self.compile_expr(coll)?;
        self.emit_op(line, Opcode::NewIterator, by_ref as Instruction)?;
        self.emit_op(line, Opcode::DefineLocal, iter_index)?;

        let loop_start = self.routine().code.current_offset();
        self.emit_op(line, Opcode::GetLocal, iter_index)?;
        self.emit(line, Opcode::TestIterator)?;
        let jump_end = self.emit_jump(line, Opcode::JumpFalse)?;

        // clear the loop variables in case they hold a reference
        if let Some(key_index) = key_index {
            self.emit_op(line, Opcode::ClearLocal, key_index)?;
        }
        self.emit_op(line, Opcode::ClearLocal, val_index)?;
        if let Some(key_index) = key_index {
            self.emit_op(line, Opcode::GetLocal, iter_index)?;
            self.emit(line, Opcode::NextKey)?;
            self.emit_op(line, Opcode::SetLocal, key_index)?;
        }
        self.emit_op(line, Opcode::GetLocal, iter_index)?;
        self.emit(line, Opcode::NextValue)?;
        self.emit_op(line, Opcode::SetLocal, val_index)?;

        self.loop_depth += 1;
        self.compile_scoped_block(body)?;
        self.loop_depth -= 1;
        self.backpatch_continues(previous_continues, None);
        self.emit_jump_to(line, Opcode::Jump, loop_start as i32)?;
        self.routine().code.backpatch(jump_end);
        self.backpatch_breaks(previous_breaks);
        self.close_scope(scope);
        Ok(())
    }

    fn compile_routine(
        &mut self,
        line: u32,
        decl: Option<(&str, bool)>,
        params: &[Param],
        body: &[Stmt],
    ) -> Result<(), CompileError> {
        if params.len() > MAX_PARAMS {
            return Err(self.err(
                line,
                format!("[Syntax error] Maximum number of parameters exceeded (limit is {MAX_PARAMS})"),
            ));
        }
        let name = decl.map(|(n, _)| n).unwrap_or("<anonymous>");

        let previous_scope = self.open_scope();
        self.routines.push(Routine::new(name));
        self.emit_op(line, Opcode::NewFrame, 0)?;
        let frame_offset = self.routine().code.current_offset() - 1;

        // parameters are the routine's first locals
        for (i, param) in params.iter().enumerate() {
            if param.by_ref {
                self.routine().ref_flags |= 1u64 << i;
            }
            self.add_local(line, &param.name)?;
        }
        self.routine().nparam = params.len();

        // a break in the body must not bind to a loop in the enclosing routine
        let previous_loop_depth = self.loop_depth;
        self.loop_depth = 0;
        for stmt in body {
            self.compile_stmt(stmt)?;
        }
        self.loop_depth = previous_loop_depth;
        self.emit(line, Opcode::Return)?;
        let nlocals = self.routine().local_count() as Instruction;
        self.routine().code.backpatch_instruction(frame_offset, nlocals);
        self.close_scope(previous_scope);

        let inner = match self.routines.pop() {
            Some(r) => Rc::new(r),
            None => unreachable!("routine stack is never empty"),
        };
        let routine_index = self
            .routine()
            .add_routine(inner)
            .map_err(|e| self.err(line, e))?;

        // parameter types are evaluated in the enclosing routine when the
        // closure is created; untyped parameters default to Object
        for param in params {
            match &param.ty {
                Some(ty) => self.compile_expr(ty)?,
                None => {
                    let id = self
                        .routine()
                        .add_string_constant("Object")
                        .map_err(|e| self.err(line, e))?;
                    self.emit_op(line, Opcode::GetGlobal, id)?;
                }
            }
        }
        self.emit_op2(
            line,
            Opcode::NewClosure,
            routine_index,
            params.len() as Instruction,
        )?;

        let (name, local) = match decl {
            Some((name, local)) => (name, local),
            None => return Ok(()), // function expression leaves the value
        };
        if local || self.scope_depth > 1 {
            // this may add an overload to an existing local function
            let depth = self.scope_depth;
            let index = match self.routine().find_local(name, depth) {
                Some(i) => i,
                None => self.add_local(line, name)?,
            };
            self.emit_op(line, Opcode::SetLocal, index)
        } else {
            let index = self
                .routine()
                .add_string_constant(name)
                .map_err(|e| self.err(line, e))?;
            // SetGlobal merges with an existing function's overloads
            self.emit_op(line, Opcode::SetGlobal, index)
        }
    }

    // ---- assignment ----

    fn compile_assignment(
        &mut self,
        line: u32,
        lhs: &Expr,
        rhs: &Expr,
        op: Option<AssignOp>,
    ) -> Result<(), CompileError> {
        match &lhs.kind {
            ExprKind::Ident(name) => {
                // a compound assignment `x += y` compiles as `x = x + y`
                match op {
                    None => self.compile_expr(rhs)?,
                    Some(op) => {
                        self.compile_expr(lhs)?;
                        self.compile_expr(rhs)?;
                        self.emit_assign_op(line, op)?;
                    }
                }
                let name = name.clone();
                let depth = self.scope_depth;
                if let Some(index) = self.routine().find_local(&name, depth) {
                    self.emit_op(line, Opcode::SetLocal, index)
                } else if let Some(index) = self.resolve_upvalue(&name, line)? {
                    self.emit_op(line, Opcode::SetUpvalue, index)
                } else {
                    let index = self
                        .routine()
                        .add_string_constant(&name)
                        .map_err(|e| self.err(line, e))?;
                    self.emit_op(line, Opcode::SetGlobal, index)
                }
            }
            ExprKind::Index { target, indexes } => {
                self.visiting_assigned_lhs = true;
                self.visiting_indexed_lhs = true;
                self.compile_expr(target)?;
                self.visiting_indexed_lhs = false;
                for index in indexes {
                    self.compile_expr(index)?;
                }
                self.visiting_assigned_lhs = false;
                match op {
                    None => self.compile_expr(rhs)?,
                    Some(op) => {
                        self.compile_expr(lhs)?;
                        self.compile_expr(rhs)?;
                        self.emit_assign_op(line, op)?;
                    }
                }
                self.emit_op(line, Opcode::SetIndex, indexes.len() as Instruction)
            }
            ExprKind::Field { target, name } => {
                self.visiting_assigned_lhs = true;
                self.compile_expr(target)?;
                let index = self
                    .routine()
                    .add_string_constant(name)
                    .map_err(|e| self.err(line, e))?;
                self.emit_op(line, Opcode::PushString, index)?;
                self.visiting_assigned_lhs = false;
                match op {
                    None => self.compile_expr(rhs)?,
                    Some(op) => {
                        self.compile_expr(lhs)?;
                        self.compile_expr(rhs)?;
                        self.emit_assign_op(line, op)?;
                    }
                }
                self.emit(line, Opcode::SetField)
            }
            _ => Err(self.err(
                line,
                "[Syntax error] Expected a variable name or an indexed expression \
                 on the left hand side in assignment",
            )),
        }
    }

    fn emit_assign_op(&mut self, line: u32, op: AssignOp) -> Result<(), CompileError> {
        match op {
            AssignOp::Concat => self.emit_op(line, Opcode::Concat, 2),
            AssignOp::Add => self.emit(line, Opcode::Add),
            AssignOp::Sub => self.emit(line, Opcode::Subtract),
            AssignOp::Mul => self.emit(line, Opcode::Multiply),
            AssignOp::Div => self.emit(line, Opcode::Divide),
            AssignOp::Pow => self.emit(line, Opcode::Power),
            AssignOp::Mod => self.emit(line, Opcode::Modulus),
        }
    }

    // ---- expressions ----

    fn compile_expr(&mut self, e: &Expr) -> Result<(), CompileError> {
        let line = e.line;
        match &e.kind {
            ExprKind::Null => self.emit(line, Opcode::PushNull),
            ExprKind::True => self.emit(line, Opcode::PushTrue),
            ExprKind::False => self.emit(line, Opcode::PushFalse),
            ExprKind::Nan => self.emit(line, Opcode::PushNan),
            ExprKind::Integer(value) => self.compile_integer(line, *value),
            ExprKind::Float(value) => {
                let index = self
                    .routine()
                    .add_float_constant(*value)
                    .map_err(|e| self.err(line, e))?;
                self.emit_op(line, Opcode::PushFloat, index)
            }
            ExprKind::Str(s) => {
                let index = self
                    .routine()
                    .add_string_constant(s)
                    .map_err(|e| self.err(line, e))?;
                self.emit_op(line, Opcode::PushString, index)
            }
            ExprKind::Ident(name) => self.compile_variable(line, name),
            ExprKind::Neg(operand) => {
                // fold negated numeric literals in place
                match &operand.kind {
                    ExprKind::Integer(v) => {
                        let value = v.checked_neg().ok_or_else(|| {
                            self.err(line, "[Math error] Invalid negative integer literal")
                        })?;
                        self.compile_integer(line, value)
                    }
                    ExprKind::Float(v) => {
                        let index = self
                            .routine()
                            .add_float_constant(-v)
                            .map_err(|e| self.err(line, e))?;
                        self.emit_op(line, Opcode::PushFloat, index)
                    }
                    _ => {
                        self.compile_expr(operand)?;
                        self.emit(line, Opcode::Negate)
                    }
                }
            }
            ExprKind::Not(operand) => {
                self.compile_expr(operand)?;
                self.emit(line, Opcode::Not)
            }
            ExprKind::Binary { op, lhs, rhs } => {
                self.compile_expr(lhs)?;
                self.compile_expr(rhs)?;
                let opcode = match op {
                    BinOp::Add => Opcode::Add,
                    BinOp::Sub => Opcode::Subtract,
                    BinOp::Mul => Opcode::Multiply,
                    BinOp::Div => Opcode::Divide,
                    BinOp::Pow => Opcode::Power,
                    BinOp::Mod => Opcode::Modulus,
                    BinOp::Eq => Opcode::Equal,
                    BinOp::Ne => Opcode::NotEqual,
                    BinOp::Lt => Opcode::Less,
                    BinOp::Le => Opcode::LessEqual,
                    BinOp::Gt => Opcode::Greater,
                    BinOp::Ge => Opcode::GreaterEqual,
                    BinOp::Compare => Opcode::Compare,
                };
                self.emit(line, opcode)
            }
            ExprKind::And { lhs, rhs } => {
                // skip the right operand when the left is false
                self.compile_expr(lhs)?;
                let jmp = self.emit_jump(line, Opcode::JumpFalseAnd)?;
                self.compile_expr(rhs)?;
                self.routine().code.backpatch(jmp);
                Ok(())
            }
            ExprKind::Or { lhs, rhs } => {
                self.compile_expr(lhs)?;
                let jmp = self.emit_jump(line, Opcode::JumpTrueOr)?;
                self.compile_expr(rhs)?;
                self.routine().code.backpatch(jmp);
                Ok(())
            }
            ExprKind::Concat(parts) => {
                for part in parts {
                    self.compile_expr(part)?;
                }
                self.emit_op(line, Opcode::Concat, parts.len() as Instruction)
            }
            ExprKind::Conditional {
                cond,
                then_val,
                else_val,
            } => {
                self.compile_expr(cond)?;
                let to_else = self.emit_jump(line, Opcode::JumpFalse)?;
                self.compile_expr(then_val)?;
                let to_end = self.emit_jump(line, Opcode::Jump)?;
                self.routine().code.backpatch(to_else);
                self.compile_expr(else_val)?;
                self.routine().code.backpatch(to_end);
                Ok(())
            }
            ExprKind::List(items) => {
                for item in items {
                    self.compile_expr(item)?;
                }
                self.emit_op(line, Opcode::NewList, items.len() as Instruction)
            }
            ExprKind::Table(pairs) => {
                for (key, value) in pairs {
                    self.compile_expr(key)?;
                    self.compile_expr(value)?;
                }
                self.emit_op(line, Opcode::NewTable, pairs.len() as Instruction)
            }
            ExprKind::Set(items) => {
                for item in items {
                    self.compile_expr(item)?;
                }
                self.emit_op(line, Opcode::NewSet, items.len() as Instruction)
            }
            ExprKind::Array { items, nrow, ncol } => {
                if *nrow > Instruction::MAX as usize || *ncol > Instruction::MAX as usize {
                    return Err(self.err(
                        line,
                        format!(
                            "Array literal can have at most {} rows and {} columns",
                            Instruction::MAX,
                            Instruction::MAX
                        ),
                    ));
                }
                for item in items {
                    self.compile_expr(item)?;
                }
                self.emit_op2(line, Opcode::NewArray, *nrow as Instruction, *ncol as Instruction)
            }
            ExprKind::Call { callee, args } => self.compile_call(line, callee, args, false),
            ExprKind::Index { target, indexes } => {
                self.visiting_indexed_lhs = true;
                self.compile_expr(target)?;
                self.visiting_indexed_lhs = false;
                for index in indexes {
                    self.compile_expr(index)?;
                }
                let count = indexes.len() as Instruction;
                if self.visiting_reference {
                    self.emit_op(line, Opcode::GetIndexRef, count)
                } else if self.parsing_argument() {
                    self.emit_op2(line, Opcode::GetIndexArg, count, self.visit_arg as Instruction)
                } else {
                    self.emit_op(line, Opcode::GetIndex, count)
                }
            }
            ExprKind::Field { target, name } => {
                self.compile_expr(target)?;
                let index = self
                    .routine()
                    .add_string_constant(name)
                    .map_err(|e| self.err(line, e))?;
                self.emit_op(line, Opcode::PushString, index)?;
                if self.visiting_reference {
                    self.emit(line, Opcode::GetFieldRef)
                } else if self.parsing_argument() {
                    self.emit_op(line, Opcode::GetFieldArg, self.visit_arg as Instruction)
                } else {
                    self.emit(line, Opcode::GetField)
                }
            }
            ExprKind::Ref(inner) => {
                if let ExprKind::Call { callee, args } = &inner.kind {
                    // `ref f(...)` asks the call to return a reference
                    self.compile_call(inner.line, callee, args, true)
                } else {
                    let saved = self.visiting_reference;
                    self.visiting_reference = true;
                    self.compile_expr(inner)?;
                    self.visiting_reference = saved;
                    Ok(())
                }
            }
            ExprKind::Closure { params, body } => {
                self.compile_routine(line, None, params, body)
            }
        }
    }

    fn compile_integer(&mut self, line: u32, value: i64) -> Result<(), CompileError> {
        // small integers fit in a single operand word
        if value >= i16::MIN as i64 && value <= i16::MAX as i64 {
            self.emit_op(line, Opcode::PushSmallInt, value as i16 as u16)
        } else {
            let index = self
                .routine()
                .add_integer_constant(value)
                .map_err(|e| self.err(line, e))?;
            self.emit_op(line, Opcode::PushInteger, index)
        }
    }

    fn compile_variable(&mut self, line: u32, name: &str) -> Result<(), CompileError> {
        let depth = self.scope_depth;
        if let Some(index) = self.routine().find_local(name, depth) {
            if self.parsing_argument() {
                self.emit_op2(line, Opcode::GetLocalArg, index, self.visit_arg as Instruction)
            } else if self.visiting_reference || self.visiting_assigned_lhs {
                if self.visiting_indexed_lhs || self.visiting_assigned_lhs {
                    self.emit_op(line, Opcode::GetUniqueLocal, index)
                } else {
                    self.emit_op(line, Opcode::GetLocalRef, index)
                }
            } else {
                self.emit_op(line, Opcode::GetLocal, index)
            }
        } else if let Some(index) = self.resolve_upvalue(name, line)? {
            if self.parsing_argument() {
                self.emit_op2(line, Opcode::GetUpvalueArg, index, self.visit_arg as Instruction)
            } else if self.visiting_reference || self.visiting_assigned_lhs {
                if self.visiting_indexed_lhs || self.visiting_assigned_lhs {
                    self.emit_op(line, Opcode::GetUniqueUpvalue, index)
                } else {
                    self.emit_op(line, Opcode::GetUpvalueRef, index)
                }
            } else {
                self.emit_op(line, Opcode::GetUpvalue, index)
            }
        } else {
            let index = self
                .routine()
                .add_string_constant(name)
                .map_err(|e| self.err(line, e))?;
            if self.parsing_argument() {
                self.emit_op2(line, Opcode::GetGlobalArg, index, self.visit_arg as Instruction)
            } else if self.visiting_reference || self.visiting_assigned_lhs {
                if self.visiting_indexed_lhs || self.visiting_assigned_lhs {
                    self.emit_op(line, Opcode::GetUniqueGlobal, index)
                } else {
                    self.emit_op(line, Opcode::GetGlobalRef, index)
                }
            } else {
                self.emit_op(line, Opcode::GetGlobal, index)
            }
        }
    }

    fn compile_call(
        &mut self,
        line: u32,
        callee: &Expr,
        args: &[Expr],
        ref_return: bool,
    ) -> Result<(), CompileError> {
        self.compile_expr(callee)?;
        // leave the function on the stack while arguments are evaluated
        self.emit(line, Opcode::Precall)?;

        let saved = self.visit_arg;
        self.visit_arg = 0;
        for arg in args {
            self.compile_expr(arg)?;
            self.visit_arg += 1;
        }
        self.visit_arg = saved;

        // low bits carry the argument count, bit 9 the reference-return flag
        let flag = if ref_return { 1 << 9 } else { 0 };
        self.emit_op(line, Opcode::Call, args.len() as Instruction | flag)
    }
}

impl Default for Compiler {
    fn default() -> Self {
        Compiler::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::code::{decode_i32, OPCODES};
    use crate::parser::Parser;

    fn compile(src: &str) -> Rc<Routine> {
        let program = Parser::new(src).parse().unwrap();
        Compiler::new().compile(&program).unwrap()
    }

    /// Decode a routine's code into (opcode, operands) tuples.
    fn decode(routine: &Routine) -> Vec<(Opcode, Vec<u16>)> {
        let words = routine.code.as_slice();
        let mut out = Vec::new();
        let mut i = 0;
        while i < words.len() {
            let op = OPCODES[words[i] as usize];
            i += 1;
            let n = op.operand_count();
            let operands = words[i..i + n].to_vec();
            i += n;
            out.push((op, operands));
        }
        out
    }

    fn opcodes(routine: &Routine) -> Vec<Opcode> {
        decode(routine).into_iter().map(|(op, _)| op).collect()
    }

    #[test]
    fn test_prologue_and_locals() {
        let r = compile("local x = 1\n");
        let ops = decode(&r);
        assert_eq!(ops[0].0, Opcode::PushNull);
        assert_eq!(ops[1], (Opcode::NewFrame, vec![1]));
        assert_eq!(ops[2], (Opcode::PushSmallInt, vec![1]));
        assert_eq!(ops[3], (Opcode::DefineLocal, vec![0]));
        assert_eq!(ops[4].0, Opcode::Return);
    }

    #[test]
    fn test_small_int_fast_path() {
        let r = compile("x = 100000\ny = 12\n");
        let ops = decode(&r);
        assert!(ops.iter().any(|(op, _)| *op == Opcode::PushInteger));
        assert!(ops
            .iter()
            .any(|(op, a)| *op == Opcode::PushSmallInt && a == &[12]));
        assert_eq!(r.integer_pool, vec![100000]);
    }

    #[test]
    fn test_negative_literal_folding() {
        let r = compile("x = -5\n");
        let ops = decode(&r);
        assert!(ops
            .iter()
            .any(|(op, a)| *op == Opcode::PushSmallInt && a == &[(-5i16) as u16]));
        assert!(!opcodes(&r).contains(&Opcode::Negate));
    }

    #[test]
    fn test_compound_assignment_expands() {
        let r = compile("local x = 1\nx += 2\n");
        let ops = opcodes(&r);
        assert!(ops.contains(&Opcode::GetLocal));
        assert!(ops.contains(&Opcode::Add));
        assert!(ops.contains(&Opcode::SetLocal));
    }

    #[test]
    fn test_if_backpatches_jump_over_else() {
        let r = compile("if true then\nprint 1\nelse\nprint 2\nend\n");
        let words = r.code.as_slice();
        // find the JumpFalse and check its target is past the Jump
        let mut i = 0;
        let mut jump_false_target = None;
        while i < words.len() {
            if words[i] == Opcode::JumpFalse as u16 {
                jump_false_target = Some(decode_i32(words[i + 1], words[i + 2]));
                break;
            }
            i += 1;
        }
        let target = jump_false_target.expect("no JumpFalse emitted") as usize;
        assert!(target < words.len());
        // the false branch starts right after the unconditional exit jump
        assert_eq!(words[target - 3], Opcode::Jump as u16);
    }

    #[test]
    fn test_for_without_step_uses_increment() {
        let r = compile("for i = 1 to 3 do\npass\nend\n");
        let ops = opcodes(&r);
        assert!(ops.contains(&Opcode::IncrementLocal));
        assert!(ops.contains(&Opcode::Greater));
        // hidden end bound local
        assert!(r.locals.iter().any(|l| l.name == "$end"));
        assert!(!r.locals.iter().any(|l| l.name == "$step"));
    }

    #[test]
    fn test_for_downto_with_step() {
        let r = compile("for i = 10 downto 1 step 2 do\npass\nend\n");
        let ops = opcodes(&r);
        assert!(ops.contains(&Opcode::Less));
        assert!(ops.contains(&Opcode::Subtract));
        assert!(!ops.contains(&Opcode::DecrementLocal));
        assert!(r.locals.iter().any(|l| l.name == "$step"));
    }

    #[test]
    fn test_foreach_hidden_iterator() {
        let r = compile("foreach k, v in {1, 2} do\npass\nend\n");
        let ops = opcodes(&r);
        assert!(ops.contains(&Opcode::NewIterator));
        assert!(ops.contains(&Opcode::TestIterator));
        assert!(ops.contains(&Opcode::NextKey));
        assert!(ops.contains(&Opcode::NextValue));
        assert!(ops.contains(&Opcode::ClearLocal));
        assert!(r.locals.iter().any(|l| l.name == "$iter"));
    }

    #[test]
    fn test_function_declaration_makes_closure() {
        let r = compile("function f(x as Integer, ref y)\nreturn x\nend\n");
        let ops = decode(&r);
        assert!(ops
            .iter()
            .any(|(op, a)| *op == Opcode::NewClosure && a[1] == 2));
        // global function binds with SetGlobal so overloads can merge
        assert!(ops.iter().any(|(op, _)| *op == Opcode::SetGlobal));
        assert_eq!(r.routine_pool.len(), 1);
        let inner = &r.routine_pool[0];
        assert_eq!(inner.nparam, 2);
        assert_eq!(inner.ref_flags, 0b10);
    }

    #[test]
    fn test_upvalue_capture() {
        let r = compile(
            "function outer()\nlocal x = 1\nfunction inner()\nreturn x\nend\nreturn inner\nend\n",
        );
        let outer = &r.routine_pool[0];
        let inner = &outer.routine_pool[0];
        assert_eq!(inner.upvalues.len(), 1);
        assert!(inner.upvalues[0].is_local);
        assert!(opcodes(inner).contains(&Opcode::GetUpvalue));
    }

    #[test]
    fn test_argument_opcodes() {
        let r = compile("local x = 1\nf(x)\n");
        let ops = decode(&r);
        assert!(ops.iter().any(|(op, _)| *op == Opcode::Precall));
        // the argument uses the Arg form with its position
        assert!(ops
            .iter()
            .any(|(op, a)| *op == Opcode::GetLocalArg && a[1] == 0));
        assert!(ops.iter().any(|(op, a)| *op == Opcode::Call && a == &[1]));
    }

    #[test]
    fn test_ref_call_sets_flag() {
        let r = compile("x = ref f(1)\n");
        let ops = decode(&r);
        assert!(ops
            .iter()
            .any(|(op, a)| *op == Opcode::Call && a == &[1 | (1 << 9)]));
    }

    #[test]
    fn test_indexed_assignment() {
        let r = compile("local t = {}\nt[\"k\"] = 1\n");
        let ops = decode(&r);
        assert!(ops.iter().any(|(op, _)| *op == Opcode::GetUniqueLocal));
        assert!(ops.iter().any(|(op, a)| *op == Opcode::SetIndex && a == &[1]));
    }

    #[test]
    fn test_field_assignment() {
        let r = compile("o.name = \"x\"\n");
        let ops = opcodes(&r);
        assert!(ops.contains(&Opcode::SetField));
        assert!(ops.contains(&Opcode::GetUniqueGlobal));
    }

    #[test]
    fn test_concat_operand_count() {
        let r = compile("x = a & b & c\n");
        let ops = decode(&r);
        assert!(ops.iter().any(|(op, a)| *op == Opcode::Concat && a == &[3]));
    }

    #[test]
    fn test_and_or_short_circuit() {
        let r = compile("x = a and b or c\n");
        let ops = opcodes(&r);
        assert!(ops.contains(&Opcode::JumpFalseAnd));
        assert!(ops.contains(&Opcode::JumpTrueOr));
    }

    #[test]
    fn test_debug_block_skipped_without_option() {
        let r = compile("debug\nprint 1\nend\n");
        assert!(!opcodes(&r).contains(&Opcode::PrintLine));
        let r = compile("option debug\ndebug\nprint 1\nend\n");
        assert!(opcodes(&r).contains(&Opcode::PrintLine));
    }

    #[test]
    fn test_duplicate_local_rejected() {
        let program = Parser::new("local x = 1\nlocal x = 2\n").parse().unwrap();
        let err = Compiler::new().compile(&program).unwrap_err();
        assert!(err.message.contains("already defined"));
    }

    fn compile_err(src: &str) -> CompileError {
        let program = Parser::new(src).parse().unwrap();
        Compiler::new().compile(&program).unwrap_err()
    }

    #[test]
    fn test_break_outside_loop_rejected() {
        let err = compile_err("break\n");
        assert!(err.message.contains("\"break\" outside of a loop"));
        let err = compile_err("if true then\nbreak\nend\n");
        assert!(err.message.contains("\"break\" outside of a loop"));
    }

    #[test]
    fn test_continue_outside_loop_rejected() {
        let err = compile_err("continue\n");
        assert!(err.message.contains("\"continue\" outside of a loop"));
    }

    #[test]
    fn test_break_does_not_cross_function_boundary() {
        let err = compile_err("while true do\nfunction f()\nbreak\nend\nend\n");
        assert!(err.message.contains("\"break\" outside of a loop"));
    }

    #[test]
    fn test_break_and_continue_jumps() {
        let r = compile("while true do\nbreak\ncontinue\nend\n");
        let words = r.code.as_slice();
        // every Jump operand lands inside the code
        let ops = decode(&r);
        let mut offset = 0;
        for (op, operands) in &ops {
            offset += 1 + operands.len();
            if matches!(op, Opcode::Jump | Opcode::JumpFalse) {
                let target = decode_i32(operands[0], operands[1]);
                assert!(target >= 0 && (target as usize) <= words.len());
            }
        }
        assert_eq!(offset, words.len());
    }

    #[test]
    fn test_multi_declaration() {
        let r = compile("local x, y = 1, 2\n");
        assert!(r.locals.iter().any(|l| l.name == "x"));
        assert!(r.locals.iter().any(|l| l.name == "y"));
        let defines = decode(&r)
            .iter()
            .filter(|(op, _)| *op == Opcode::DefineLocal)
            .count();
        assert_eq!(defines, 2);
    }
}
