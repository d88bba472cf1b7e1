//! The bytecode interpreter.
//!
//! Values on the operand stack and in local slots each own one reference
//! to the heap object they designate; every push retains and every pop
//! releases (or hands the reference over). Local slots that have been
//! captured by a closure or bound by reference hold an `Alias` cell, and
//! reads and writes go through the cell so every binding sees the same
//! storage.

use crate::error::RuntimeError;
use crate::runtime::Runtime;
use lyre_compiler::code::{decode_i32, Opcode};
use lyre_compiler::routine::Routine;
use lyre_core::class::ClassId;
use lyre_core::gc::{Callable, Closure, Function, NativeContext, Payload};
use lyre_core::value::{Handle, Key, Variant};
use std::rc::Rc;

const MAX_CALL_DEPTH: usize = 256;

pub(crate) struct Frame {
    routine: Rc<Routine>,
    ip: usize,
    locals: Vec<Variant>,
    upvalues: Vec<Handle>,
    /// Bound arguments, consumed by `NewFrame`.
    args: Vec<Variant>,
    /// Operand stack height at entry.
    base: usize,
    /// Whether the caller asked for a reference result.
    ref_return: bool,
}

enum Flow {
    Continue,
    Finished(Variant),
}

impl Runtime {
    /// Run a compiled routine to completion.
    pub(crate) fn execute(&mut self, routine: Rc<Routine>) -> Result<Variant, RuntimeError> {
        let mut frames = vec![Frame {
            routine,
            ip: 0,
            locals: Vec::new(),
            upvalues: Vec::new(),
            args: Vec::new(),
            base: 0,
            ref_return: false,
        }];
        let mut stack: Vec<Variant> = Vec::new();
        let mut pending: Vec<Variant> = Vec::new();

        loop {
            let depth = frames.len();
            let frame = top(&mut frames);
            let offset = frame.ip;
            let code = frame.routine.code.as_slice();
            if offset >= code.len() {
                // a routine always ends in Return; getting here is a bug
                self.teardown(&mut frames, &mut stack, &mut pending);
                return Err(RuntimeError::internal("instruction pointer out of bounds"));
            }
            let word = code[offset];
            let op = match Opcode::from_raw(word) {
                Some(op) => op,
                None => {
                    self.teardown(&mut frames, &mut stack, &mut pending);
                    return Err(RuntimeError::internal(format!("invalid opcode {word}")));
                }
            };
            let n = op.operand_count();
            let a = if n >= 1 { code[offset + 1] } else { 0 };
            let b = if n >= 2 { code[offset + 2] } else { 0 };
            frame.ip = offset + 1 + n;

            match self.step(op, a, b, &mut frames, &mut stack, &mut pending) {
                Ok(Flow::Continue) => {}
                Ok(Flow::Finished(result)) => {
                    self.teardown(&mut frames, &mut stack, &mut pending);
                    return Ok(result);
                }
                Err(e) => {
                    // the line is looked up only on this cold path; the
                    // dispatching frame, when still present, sits at the
                    // depth captured before the step
                    let e = match frames.get(depth - 1) {
                        Some(f) => e.with_line(f.routine.code.get_line(offset) as u32),
                        None => e,
                    };
                    self.teardown(&mut frames, &mut stack, &mut pending);
                    return Err(e);
                }
            }
        }
    }

    fn teardown(
        &mut self,
        frames: &mut Vec<Frame>,
        stack: &mut Vec<Variant>,
        pending: &mut Vec<Variant>,
    ) {
        for v in stack.drain(..) {
            self.heap.release(&v);
        }
        for v in pending.drain(..) {
            self.heap.release(&v);
        }
        for frame in frames.drain(..) {
            for v in &frame.locals {
                self.heap.release(v);
            }
            for h in &frame.upvalues {
                self.heap.release_handle(*h);
            }
            for v in &frame.args {
                self.heap.release(v);
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn step(
        &mut self,
        op: Opcode,
        a: u16,
        b: u16,
        frames: &mut Vec<Frame>,
        stack: &mut Vec<Variant>,
        pending: &mut Vec<Variant>,
    ) -> Result<Flow, RuntimeError> {
        match op {
            // ----- constants -----
            Opcode::PushNull => stack.push(Variant::Null),
            Opcode::PushTrue => stack.push(Variant::Boolean(true)),
            Opcode::PushFalse => stack.push(Variant::Boolean(false)),
            Opcode::PushBoolean => stack.push(Variant::Boolean(a != 0)),
            Opcode::PushNan => stack.push(Variant::Float(f64::NAN)),
            Opcode::PushSmallInt => stack.push(Variant::Integer(a as i16 as i64)),
            Opcode::PushInteger => {
                let v = top(frames).routine.integer_pool[a as usize];
                stack.push(Variant::Integer(v));
            }
            Opcode::PushFloat => {
                let v = top(frames).routine.float_pool[a as usize];
                stack.push(Variant::Float(v));
            }
            Opcode::PushString => {
                let s = top(frames).routine.string_pool[a as usize].clone();
                let v = self.heap.new_string(s);
                stack.push(v);
            }

            // ----- stack -----
            Opcode::Pop => {
                let v = pop(stack)?;
                self.heap.release(&v);
            }

            // ----- arithmetic and logic -----
            Opcode::Add => self.binary_arith(stack, "+")?,
            Opcode::Subtract => self.binary_arith(stack, "-")?,
            Opcode::Multiply => self.binary_arith(stack, "*")?,
            Opcode::Divide => self.binary_arith(stack, "/")?,
            Opcode::Power => self.binary_arith(stack, "^")?,
            Opcode::Modulus => self.binary_arith(stack, "%")?,
            Opcode::Negate => {
                let v = pop(stack)?;
                let result = match self.heap.deref(v) {
                    Variant::Integer(i) => i.checked_neg().map(Variant::Integer),
                    Variant::Float(f) => Some(Variant::Float(-f)),
                    other => {
                        let t = self.heap.type_name(&other);
                        self.heap.release(&v);
                        return Err(RuntimeError::new(format!(
                            "[Type error] Cannot negate value of type {t}"
                        )));
                    }
                };
                self.heap.release(&v);
                let result =
                    result.ok_or_else(|| RuntimeError::new("[Math error] Integer overflow"))?;
                stack.push(result);
            }
            Opcode::Not => {
                let v = pop(stack)?;
                let cond = self.expect_boolean(&v);
                self.heap.release(&v);
                stack.push(Variant::Boolean(!cond?));
            }
            Opcode::Equal | Opcode::NotEqual => {
                let rhs = pop(stack)?;
                let lhs = pop(stack)?;
                let eq = self.heap.equal(&lhs, &rhs);
                self.heap.release(&lhs);
                self.heap.release(&rhs);
                stack.push(Variant::Boolean(if op == Opcode::Equal { eq } else { !eq }));
            }
            Opcode::Less | Opcode::LessEqual | Opcode::Greater | Opcode::GreaterEqual => {
                let rhs = pop(stack)?;
                let lhs = pop(stack)?;
                let ord = self.compare_values(&lhs, &rhs).map_err(RuntimeError::new);
                self.heap.release(&lhs);
                self.heap.release(&rhs);
                let ord = ord?;
                let result = match op {
                    Opcode::Less => ord.is_lt(),
                    Opcode::LessEqual => ord.is_le(),
                    Opcode::Greater => ord.is_gt(),
                    _ => ord.is_ge(),
                };
                stack.push(Variant::Boolean(result));
            }
            Opcode::Compare => {
                let rhs = pop(stack)?;
                let lhs = pop(stack)?;
                let ord = self.compare_values(&lhs, &rhs).map_err(RuntimeError::new);
                self.heap.release(&lhs);
                self.heap.release(&rhs);
                stack.push(Variant::Integer(match ord? {
                    std::cmp::Ordering::Less => -1,
                    std::cmp::Ordering::Equal => 0,
                    std::cmp::Ordering::Greater => 1,
                }));
            }
            Opcode::Concat => {
                let items = split_off(stack, a as usize)?;
                let mut out = String::new();
                for item in &items {
                    out.push_str(&self.heap.stringify(item));
                    self.heap.release(item);
                }
                let v = self.heap.new_string(out);
                stack.push(v);
            }

            // ----- jumps -----
            Opcode::Jump => {
                top(frames).ip = decode_i32(a, b) as usize;
            }
            Opcode::JumpFalse | Opcode::JumpTrue => {
                let v = pop(stack)?;
                let cond = self.expect_boolean(&v);
                self.heap.release(&v);
                let cond = cond?;
                let jump_on = op == Opcode::JumpTrue;
                if cond == jump_on {
                    top(frames).ip = decode_i32(a, b) as usize;
                }
            }
            Opcode::JumpFalseAnd | Opcode::JumpTrueOr => {
                let v = pop(stack)?;
                let cond = self.expect_boolean(&v);
                self.heap.release(&v);
                let cond = cond?;
                let jump_on = op == Opcode::JumpTrueOr;
                if cond == jump_on {
                    // short-circuit: the left operand is the result
                    stack.push(Variant::Boolean(cond));
                    top(frames).ip = decode_i32(a, b) as usize;
                }
            }

            // ----- locals -----
            Opcode::DefineLocal => {
                let v = pop(stack)?;
                let frame = top(frames);
                let old = std::mem::replace(&mut frame.locals[a as usize], v);
                self.heap.release(&old);
            }
            Opcode::ClearLocal => {
                let frame = top(frames);
                let old = std::mem::replace(&mut frame.locals[a as usize], Variant::Null);
                self.heap.release(&old);
            }
            Opcode::GetLocal => {
                let slot = top(frames).locals[a as usize];
                let v = self.heap.deref(slot);
                self.heap.retain(&v);
                stack.push(v);
            }
            Opcode::GetLocalRef => {
                let cell = self.box_local(top(frames), a as usize);
                self.heap.retain_handle(cell);
                stack.push(Variant::Alias(cell));
            }
            Opcode::GetUniqueLocal => {
                let slot = top(frames).locals[a as usize];
                let fresh = self.unshare_slot(slot)?;
                if let Variant::Alias(_) = slot {
                    // write-through happened inside the cell
                } else {
                    top(frames).locals[a as usize] = fresh;
                }
                let v = self.heap.deref(fresh);
                self.heap.retain(&v);
                stack.push(v);
            }
            Opcode::GetLocalArg => {
                if self.needs_ref(pending, b as usize) {
                    let cell = self.box_local(top(frames), a as usize);
                    self.heap.retain_handle(cell);
                    stack.push(Variant::Alias(cell));
                } else {
                    let slot = top(frames).locals[a as usize];
                    let v = self.heap.deref(slot);
                    self.heap.retain(&v);
                    stack.push(v);
                }
            }
            Opcode::SetLocal => {
                let v = pop(stack)?;
                self.set_local(top(frames), a as usize, v)?;
            }
            Opcode::IncrementLocal => self.step_local(top(frames), a as usize, 1)?,
            Opcode::DecrementLocal => self.step_local(top(frames), a as usize, -1)?,

            // ----- upvalues -----
            Opcode::GetUpvalue => {
                let h = top(frames).upvalues[a as usize];
                let v = self.heap.deref(Variant::Alias(h));
                self.heap.retain(&v);
                stack.push(v);
            }
            Opcode::GetUpvalueRef => {
                let h = top(frames).upvalues[a as usize];
                self.heap.retain_handle(h);
                stack.push(Variant::Alias(h));
            }
            Opcode::GetUniqueUpvalue => {
                let h = top(frames).upvalues[a as usize];
                let fresh = self.unshare_slot(Variant::Alias(h))?;
                let v = self.heap.deref(fresh);
                self.heap.retain(&v);
                stack.push(v);
            }
            Opcode::GetUpvalueArg => {
                let h = top(frames).upvalues[a as usize];
                if self.needs_ref(pending, b as usize) {
                    self.heap.retain_handle(h);
                    stack.push(Variant::Alias(h));
                } else {
                    let v = self.heap.deref(Variant::Alias(h));
                    self.heap.retain(&v);
                    stack.push(v);
                }
            }
            Opcode::SetUpvalue => {
                let v = pop(stack)?;
                let h = top(frames).upvalues[a as usize];
                self.store_cell(h, v)?;
            }

            // ----- globals -----
            Opcode::GetGlobal => {
                let name = top(frames).routine.string_pool[a as usize].clone();
                let v = self.read_global(&name)?;
                self.heap.retain(&v);
                stack.push(v);
            }
            Opcode::GetGlobalRef => {
                let name = top(frames).routine.string_pool[a as usize].clone();
                let cell = self.box_global(&name)?;
                self.heap.retain_handle(cell);
                stack.push(Variant::Alias(cell));
            }
            Opcode::GetUniqueGlobal => {
                let name = top(frames).routine.string_pool[a as usize].clone();
                let slot = *self
                    .globals
                    .get(&name)
                    .ok_or_else(|| undefined_variable(&name))?;
                let fresh = self.unshare_slot(slot)?;
                if !matches!(slot, Variant::Alias(_)) {
                    self.globals.insert(name, fresh);
                }
                let v = self.heap.deref(fresh);
                self.heap.retain(&v);
                stack.push(v);
            }
            Opcode::GetGlobalArg => {
                let name = top(frames).routine.string_pool[a as usize].clone();
                if self.needs_ref(pending, b as usize) {
                    let cell = self.box_global(&name)?;
                    self.heap.retain_handle(cell);
                    stack.push(Variant::Alias(cell));
                } else {
                    let v = self.read_global(&name)?;
                    self.heap.retain(&v);
                    stack.push(v);
                }
            }
            Opcode::SetGlobal => {
                let v = pop(stack)?;
                let name = top(frames).routine.string_pool[a as usize].clone();
                self.set_global_value(&name, v)?;
            }

            // ----- containers -----
            Opcode::NewList => {
                let items = split_off(stack, a as usize)?;
                let v = self.heap.new_list(items);
                stack.push(v);
            }
            Opcode::NewTable => {
                let items = split_off(stack, 2 * a as usize)?;
                let mut map = indexmap::IndexMap::with_capacity(a as usize);
                for (i, pair) in items.chunks(2).enumerate() {
                    match self.key_of(&pair[0]) {
                        Ok(key) => {
                            self.heap.release(&pair[0]);
                            if let Some(old) = map.insert(key, pair[1]) {
                                self.heap.release(&old);
                            }
                        }
                        Err(e) => {
                            // give back everything still owned: entries
                            // already moved into the map and the pairs
                            // not yet consumed
                            for v in map.values() {
                                self.heap.release(v);
                            }
                            for v in &items[2 * i..] {
                                self.heap.release(v);
                            }
                            return Err(RuntimeError::new(e));
                        }
                    }
                }
                let v = Variant::Ref(self.heap.alloc(Payload::Table(map)));
                stack.push(v);
            }
            Opcode::NewSet => {
                let items = split_off(stack, a as usize)?;
                let mut set = indexmap::IndexSet::with_capacity(a as usize);
                for (i, item) in items.iter().enumerate() {
                    match self.key_of(item) {
                        Ok(key) => {
                            self.heap.release(item);
                            set.insert(key);
                        }
                        Err(e) => {
                            for v in &items[i..] {
                                self.heap.release(v);
                            }
                            return Err(RuntimeError::new(e));
                        }
                    }
                }
                let v = Variant::Ref(self.heap.alloc(Payload::Set(set)));
                stack.push(v);
            }
            Opcode::NewArray => {
                let (nrow, ncol) = (a as usize, b as usize);
                let items = split_off(stack, nrow * ncol)?;
                let mut data = Vec::with_capacity(items.len());
                for (i, item) in items.iter().enumerate() {
                    match self.heap.deref(*item).as_float() {
                        Some(x) => {
                            self.heap.release(item);
                            data.push(x);
                        }
                        None => {
                            for v in &items[i..] {
                                self.heap.release(v);
                            }
                            return Err(RuntimeError::new(
                                "[Type error] Array elements must be numbers",
                            ));
                        }
                    }
                }
                let array = if nrow == 1 {
                    lyre_core::array::Array::from_vec(data)
                } else {
                    let mut m = lyre_core::array::Array::new_matrix(nrow, ncol);
                    m.data_mut().copy_from_slice(&data);
                    m
                };
                let v = self.heap.new_array(array);
                stack.push(v);
            }

            // ----- indexing -----
            Opcode::GetIndex => {
                let indexes = split_off(stack, a as usize)?;
                let target = pop(stack)?;
                let result = self.get_index(&target, &indexes);
                self.heap.release(&target);
                for i in &indexes {
                    self.heap.release(i);
                }
                stack.push(result?);
            }
            Opcode::GetIndexArg => {
                let indexes = split_off(stack, a as usize)?;
                let target = pop(stack)?;
                let result = if self.needs_ref(pending, b as usize) {
                    self.get_index_ref(&target, &indexes)
                } else {
                    self.get_index(&target, &indexes)
                };
                self.heap.release(&target);
                for i in &indexes {
                    self.heap.release(i);
                }
                stack.push(result?);
            }
            Opcode::GetIndexRef => {
                let indexes = split_off(stack, a as usize)?;
                let target = pop(stack)?;
                let result = self.get_index_ref(&target, &indexes);
                self.heap.release(&target);
                for i in &indexes {
                    self.heap.release(i);
                }
                stack.push(result?);
            }
            Opcode::SetIndex => {
                let value = pop(stack)?;
                let indexes = split_off(stack, a as usize)?;
                let target = pop(stack)?;
                let result = self.set_index(&target, &indexes, value);
                self.heap.release(&target);
                for i in &indexes {
                    self.heap.release(i);
                }
                result?;
            }

            // ----- fields -----
            Opcode::GetField => {
                let name_v = pop(stack)?;
                let target = pop(stack)?;
                let name = self.heap.stringify(&name_v);
                let result = self.get_field(&target, &name);
                self.heap.release(&name_v);
                self.heap.release(&target);
                stack.push(result?);
            }
            Opcode::GetFieldArg => {
                let name_v = pop(stack)?;
                let target = pop(stack)?;
                let name = self.heap.stringify(&name_v);
                let result = if self.needs_ref(pending, a as usize) {
                    self.get_field_ref(&target, &name)
                } else {
                    self.get_field(&target, &name)
                };
                self.heap.release(&name_v);
                self.heap.release(&target);
                stack.push(result?);
            }
            Opcode::GetFieldRef => {
                let name_v = pop(stack)?;
                let target = pop(stack)?;
                let name = self.heap.stringify(&name_v);
                let result = self.get_field_ref(&target, &name);
                self.heap.release(&name_v);
                self.heap.release(&target);
                stack.push(result?);
            }
            Opcode::SetField => {
                let value = pop(stack)?;
                let name_v = pop(stack)?;
                let target = pop(stack)?;
                let name = self.heap.stringify(&name_v);
                let result = self.set_field(&target, &name, value);
                self.heap.release(&name_v);
                self.heap.release(&target);
                result?;
            }

            // ----- calls -----
            Opcode::Precall => {
                let v = pop(stack)?;
                pending.push(v);
            }
            Opcode::Call => {
                if frames.len() >= MAX_CALL_DEPTH {
                    return Err(RuntimeError::new("[Runtime error] Call stack overflow"));
                }
                let narg = (a & 0x1FF) as usize;
                let ref_return = a & (1 << 9) != 0;
                let args = split_off(stack, narg)?;
                let func = pending
                    .pop()
                    .ok_or_else(|| RuntimeError::internal("call without pending function"))?;
                self.call_value(func, args, ref_return, frames, stack)?;
            }
            Opcode::NewFrame => {
                let frame = top(frames);
                let mut locals = std::mem::take(&mut frame.args);
                locals.resize(a as usize, Variant::Null);
                frame.locals = locals;
            }
            Opcode::NewClosure => {
                self.make_closure(a as usize, b as usize, frames, stack)?;
            }
            Opcode::Return => {
                let frame = match frames.pop() {
                    Some(f) => f,
                    None => return Err(RuntimeError::internal("return without a frame")),
                };
                let mut result = if stack.len() > frame.base {
                    pop(stack)?
                } else {
                    Variant::Null
                };
                while stack.len() > frame.base {
                    let v = pop(stack)?;
                    self.heap.release(&v);
                }
                for v in &frame.locals {
                    self.heap.release(v);
                }
                for h in &frame.upvalues {
                    self.heap.release_handle(*h);
                }
                for v in &frame.args {
                    self.heap.release(v);
                }
                if !frame.ref_return {
                    result = self.deref_owned(result);
                }
                if frames.is_empty() {
                    return Ok(Flow::Finished(result));
                }
                stack.push(result);
            }

            // ----- iterators -----
            Opcode::NewIterator => {
                let target = pop(stack)?;
                let result = self.make_iterator(target, a != 0);
                stack.push(result?);
            }
            Opcode::TestIterator => {
                let iter = pop(stack)?;
                let result = self.iter_test(&iter);
                self.heap.release(&iter);
                stack.push(Variant::Boolean(result?));
            }
            Opcode::NextKey => {
                let iter = pop(stack)?;
                let result = self.iter_key(&iter);
                self.heap.release(&iter);
                stack.push(result?);
            }
            Opcode::NextValue => {
                let iter = pop(stack)?;
                let result = self.iter_value(&iter);
                self.heap.release(&iter);
                stack.push(result?);
            }

            // ----- statements -----
            Opcode::Print | Opcode::PrintLine => {
                let items = split_off(stack, a as usize)?;
                let mut out = String::new();
                for item in &items {
                    out.push_str(&self.heap.stringify(item));
                    self.heap.release(item);
                }
                if op == Opcode::PrintLine {
                    out.push('\n');
                }
                self.write_output(&out);
            }
            Opcode::Assert => {
                let msg = if a >= 2 { Some(pop(stack)?) } else { None };
                let cond = pop(stack)?;
                let ok = self.expect_boolean(&cond);
                self.heap.release(&cond);
                let ok = ok?;
                let text = msg.map(|m| {
                    let s = self.heap.stringify(&m);
                    self.heap.release(&m);
                    s
                });
                if !ok {
                    return Err(RuntimeError::new(match text {
                        Some(t) => format!("[Assertion error] {t}"),
                        None => "[Assertion error] Assertion failed".to_string(),
                    }));
                }
            }
            Opcode::Throw => {
                let v = pop(stack)?;
                let msg = self.heap.stringify(&v);
                self.heap.release(&v);
                return Err(RuntimeError::new(msg));
            }
        }
        Ok(Flow::Continue)
    }

    // ----- value helpers -----

    fn expect_boolean(&self, v: &Variant) -> Result<bool, RuntimeError> {
        self.heap.deref(*v).as_boolean().ok_or_else(|| {
            RuntimeError::new(format!(
                "[Type error] Expected a Boolean value, got {}",
                self.heap.type_name(v)
            ))
        })
    }

    fn binary_arith(&mut self, stack: &mut Vec<Variant>, sym: &str) -> Result<(), RuntimeError> {
        let rhs = pop(stack)?;
        let lhs = pop(stack)?;
        let x = self.heap.deref(lhs);
        let y = self.heap.deref(rhs);
        let result = match (x, y, sym) {
            // division and exponentiation always yield a Float
            (x, y, "/") | (x, y, "^") if x.is_number() && y.is_number() => {
                let (fx, fy) = match (x.as_float(), y.as_float()) {
                    (Some(fx), Some(fy)) => (fx, fy),
                    _ => unreachable!(),
                };
                Ok(Variant::Float(if sym == "/" { fx / fy } else { fx.powf(fy) }))
            }
            (Variant::Integer(ix), Variant::Integer(iy), _) => self.int_arith(ix, iy, sym),
            (x, y, _) if x.is_number() && y.is_number() => {
                let (fx, fy) = match (x.as_float(), y.as_float()) {
                    (Some(fx), Some(fy)) => (fx, fy),
                    _ => unreachable!(),
                };
                Ok(Variant::Float(match sym {
                    "+" => fx + fy,
                    "-" => fx - fy,
                    "*" => fx * fy,
                    "%" => fx % fy,
                    _ => unreachable!(),
                }))
            }
            _ => Err(RuntimeError::new(format!(
                "[Type error] Cannot apply '{sym}' to {} and {}",
                self.heap.type_name(&x),
                self.heap.type_name(&y)
            ))),
        };
        self.heap.release(&lhs);
        self.heap.release(&rhs);
        stack.push(result?);
        Ok(())
    }

    fn int_arith(&self, x: i64, y: i64, sym: &str) -> Result<Variant, RuntimeError> {
        let overflow = || RuntimeError::new("[Math error] Integer overflow");
        match sym {
            "+" => x.checked_add(y).map(Variant::Integer).ok_or_else(overflow),
            "-" => x.checked_sub(y).map(Variant::Integer).ok_or_else(overflow),
            "*" => x.checked_mul(y).map(Variant::Integer).ok_or_else(overflow),
            "%" => {
                if y == 0 {
                    Err(RuntimeError::new("[Math error] Division by zero"))
                } else {
                    Ok(Variant::Integer(x % y))
                }
            }
            _ => unreachable!(),
        }
    }

    /// Drop one level of aliasing from an owned value.
    fn deref_owned(&mut self, v: Variant) -> Variant {
        match v {
            Variant::Alias(_) => {
                let inner = self.heap.deref(v);
                self.heap.retain(&inner);
                self.heap.release(&v);
                inner
            }
            _ => v,
        }
    }

    // ----- locals and cells -----

    /// Ensure the local slot holds an alias cell, boxing the current value
    /// if necessary, and return the cell.
    fn box_local(&mut self, frame: &mut Frame, index: usize) -> Handle {
        match frame.locals[index] {
            Variant::Alias(h) => h,
            v => {
                // the cell takes over the slot's reference to `v`
                let h = self.heap.new_alias(v);
                frame.locals[index] = Variant::Alias(h);
                h
            }
        }
    }

    /// Store into an alias cell, releasing the previous value.
    fn store_cell(&mut self, cell: Handle, v: Variant) -> Result<(), RuntimeError> {
        let old = match &mut self.heap.get_mut(cell).payload {
            Payload::Alias(inner) => std::mem::replace(inner, v),
            _ => return Err(RuntimeError::internal("expected an alias cell")),
        };
        self.heap.release(&old);
        Ok(())
    }

    fn set_local(
        &mut self,
        frame: &mut Frame,
        index: usize,
        v: Variant,
    ) -> Result<(), RuntimeError> {
        // a function declaration merges with the overloads already bound
        // to the same name
        let name = frame
            .routine
            .locals
            .get(index)
            .map(|l| l.name.clone())
            .unwrap_or_default();
        let slot = frame.locals[index];
        if self.try_merge_function(slot, &v, &name)? {
            return Ok(());
        }
        match slot {
            Variant::Alias(h) => self.store_cell(h, v),
            old => {
                frame.locals[index] = v;
                self.heap.release(&old);
                Ok(())
            }
        }
    }

    /// If `slot` and `v` are both function objects and `v` was declared
    /// under `name`, move `v`'s overloads into the existing function.
    /// Returns true when the merge consumed `v`.
    fn try_merge_function(
        &mut self,
        slot: Variant,
        v: &Variant,
        name: &str,
    ) -> Result<bool, RuntimeError> {
        let old = self.heap.deref(slot);
        let new = self.heap.deref(*v);
        let (Variant::Ref(oh), Variant::Ref(nh)) = (old, new) else {
            return Ok(false);
        };
        if oh == nh {
            return Ok(false);
        }
        if self.heap.as_function(oh).is_none() {
            return Ok(false);
        }
        match self.heap.as_function(nh) {
            Some(f) if f.name == name => {}
            _ => return Ok(false),
        }
        let moved = match &mut self.heap.get_mut(nh).payload {
            Payload::Function(f) => std::mem::take(&mut f.closures),
            _ => return Ok(false),
        };
        match &mut self.heap.get_mut(oh).payload {
            Payload::Function(f) => f.closures.extend(moved),
            _ => return Err(RuntimeError::internal("function vanished during merge")),
        }
        self.heap.release(v);
        Ok(true)
    }

    fn step_local(
        &mut self,
        frame: &mut Frame,
        index: usize,
        delta: i64,
    ) -> Result<(), RuntimeError> {
        let slot = frame.locals[index];
        let cur = self.heap.deref(slot);
        let next = match cur {
            Variant::Integer(i) => Variant::Integer(
                i.checked_add(delta)
                    .ok_or_else(|| RuntimeError::new("[Math error] Integer overflow"))?,
            ),
            Variant::Float(f) => Variant::Float(f + delta as f64),
            other => {
                return Err(RuntimeError::new(format!(
                    "[Type error] Loop counter must be a Number, got {}",
                    self.heap.type_name(&other)
                )))
            }
        };
        match slot {
            Variant::Alias(h) => self.store_cell(h, next),
            _ => {
                frame.locals[index] = next;
                Ok(())
            }
        }
    }

    /// Copy-on-write unsharing for value-semantics types. Takes the slot's
    /// owned value and returns the (possibly fresh) value the slot should
    /// hold; alias cells are unshared in place.
    fn unshare_slot(&mut self, slot: Variant) -> Result<Variant, RuntimeError> {
        match slot {
            Variant::Alias(cell) => {
                let inner = self.heap.deref(slot);
                let fresh = self.unshare_value(inner)?;
                if !same_variant(&fresh, &inner) {
                    self.store_cell(cell, fresh)?;
                }
                Ok(slot)
            }
            v => self.unshare_value(v),
        }
    }

    fn unshare_value(&mut self, v: Variant) -> Result<Variant, RuntimeError> {
        let Variant::Ref(h) = v else { return Ok(v) };
        let obj = self.heap.get(h);
        if obj.ref_count <= 1 {
            return Ok(v);
        }
        match obj.payload {
            Payload::Str(_)
            | Payload::List(_)
            | Payload::Table(_)
            | Payload::Set(_)
            | Payload::Array(_) => {
                let clone = self.clone_value(&v).map_err(RuntimeError::new)?;
                self.heap.release(&v);
                Ok(clone)
            }
            _ => Ok(v),
        }
    }

    // ----- globals -----

    fn read_global(&self, name: &str) -> Result<Variant, RuntimeError> {
        let v = self
            .globals
            .get(name)
            .ok_or_else(|| undefined_variable(name))?;
        Ok(self.heap.deref(*v))
    }

    fn box_global(&mut self, name: &str) -> Result<Handle, RuntimeError> {
        let cur = *self
            .globals
            .get(name)
            .ok_or_else(|| undefined_variable(name))?;
        match cur {
            Variant::Alias(h) => Ok(h),
            v => {
                let h = self.heap.new_alias(v);
                self.globals.insert(name.to_string(), Variant::Alias(h));
                Ok(h)
            }
        }
    }

    fn set_global_value(&mut self, name: &str, v: Variant) -> Result<(), RuntimeError> {
        match self.globals.get(name).copied() {
            Some(slot) => {
                if self.try_merge_function(slot, &v, name)? {
                    return Ok(());
                }
                match slot {
                    Variant::Alias(h) => self.store_cell(h, v),
                    old => {
                        self.globals.insert(name.to_string(), v);
                        self.heap.release(&old);
                        Ok(())
                    }
                }
            }
            None => {
                self.globals.insert(name.to_string(), v);
                Ok(())
            }
        }
    }

    // ----- argument passing -----

    /// Whether the pending call wants its argument at `pos` by reference.
    /// Bound methods shift visible argument positions by one because the
    /// receiver is inserted in front at call time.
    fn needs_ref(&self, pending: &[Variant], pos: usize) -> bool {
        let Some(v) = pending.last() else { return false };
        let Variant::Ref(h) = self.heap.deref(*v) else {
            return false;
        };
        match &self.heap.get(h).payload {
            Payload::Function(f) => f.closures.iter().any(|c| c.by_ref(pos)),
            Payload::Bound { func, .. } => {
                let Variant::Ref(fh) = self.heap.deref(*func) else {
                    return false;
                };
                match self.heap.as_function(fh) {
                    Some(f) => f.closures.iter().any(|c| c.by_ref(pos + 1)),
                    None => false,
                }
            }
            Payload::ClassRef { id, .. } => match &self.classes.get(*id).initializer {
                Some(Variant::Ref(ih)) => match self.heap.as_function(*ih) {
                    Some(f) => f.closures.iter().any(|c| c.by_ref(pos)),
                    None => false,
                },
                _ => false,
            },
            _ => false,
        }
    }

    // ----- calls -----

    fn call_value(
        &mut self,
        func: Variant,
        mut args: Vec<Variant>,
        ref_return: bool,
        frames: &mut Vec<Frame>,
        stack: &mut Vec<Variant>,
    ) -> Result<(), RuntimeError> {
        let release_all = |rt: &mut Self, args: &[Variant], func: &Variant| {
            for a in args {
                rt.heap.release(a);
            }
            rt.heap.release(func);
        };

        let callee = self.heap.deref(func);
        let func_handle = match callee {
            Variant::Ref(h) => h,
            other => {
                let t = self.heap.type_name(&other).to_string();
                release_all(self, &args, &func);
                return Err(RuntimeError::new(format!(
                    "[Type error] Value of type {t} is not callable"
                )));
            }
        };
        let (target, this) = match &self.heap.get(func_handle).payload {
            Payload::Function(_) => (func_handle, None),
            Payload::Bound { func: f, this } => {
                let (f, t) = (*f, *this);
                match self.heap.deref(f) {
                    Variant::Ref(fh) => (fh, Some(t)),
                    _ => {
                        release_all(self, &args, &func);
                        return Err(RuntimeError::internal("bound method without a function"));
                    }
                }
            }
            Payload::ClassRef { id, name } => {
                let name = name.clone();
                match self.classes.get(*id).initializer {
                    Some(Variant::Ref(ih)) => (ih, None),
                    _ => {
                        release_all(self, &args, &func);
                        return Err(RuntimeError::new(format!(
                            "[Type error] Class {name} is not callable"
                        )));
                    }
                }
            }
            _ => {
                let t = self.heap.type_name(&callee).to_string();
                release_all(self, &args, &func);
                return Err(RuntimeError::new(format!(
                    "[Type error] Value of type {t} is not callable"
                )));
            }
        };
        if let Some(t) = this {
            self.heap.retain(&t);
            args.insert(0, t);
        }

        let arg_classes: Vec<ClassId> = args.iter().map(|v| self.heap.class_of(v)).collect();
        let (name, resolved) = {
            let f = match self.heap.as_function(target) {
                Some(f) => f,
                None => {
                    release_all(self, &args, &func);
                    return Err(RuntimeError::internal("callee is not a function"));
                }
            };
            (f.name.clone(), f.resolve(&arg_classes, &self.classes))
        };
        let idx = match resolved {
            Some(idx) => idx,
            None => {
                let types: Vec<&str> = args.iter().map(|v| self.heap.type_name(v)).collect();
                let msg = format!(
                    "[Type error] Cannot resolve call to function \"{name}\" with arguments ({})",
                    types.join(", ")
                );
                release_all(self, &args, &func);
                return Err(RuntimeError::new(msg));
            }
        };
        let (callable, ref_flags, upvalues) = {
            let f = match self.heap.as_function(target) {
                Some(f) => f,
                None => return Err(RuntimeError::internal("callee vanished")),
            };
            let c = &f.closures[idx];
            (c.callable, c.ref_flags, c.upvalues.clone())
        };

        // bind arguments: reference parameters must receive aliases, and
        // value parameters strip any alias the caller pushed
        for (i, arg) in args.iter_mut().enumerate() {
            let wants_ref = i < 64 && ref_flags & (1u64 << i) != 0;
            match (wants_ref, matches!(arg, Variant::Alias(_))) {
                (true, false) => {
                    let msg = format!(
                        "[Reference error] Argument {} to \"{name}\" must be passed by reference",
                        i + 1
                    );
                    release_all(self, &args, &func);
                    return Err(RuntimeError::new(msg));
                }
                (false, true) => {
                    let inner = self.heap.deref(*arg);
                    self.heap.retain(&inner);
                    self.heap.release(arg);
                    *arg = inner;
                }
                _ => {}
            }
        }

        match callable {
            Callable::Native { func: native } => {
                let result = {
                    let mut ctx = NativeContext {
                        heap: &mut self.heap,
                        classes: &mut self.classes,
                        rng: &mut self.rng,
                    };
                    native(&mut ctx, &mut args)
                };
                let result = match result {
                    Ok(v) => v,
                    Err(msg) => {
                        release_all(self, &args, &func);
                        return Err(RuntimeError::new(msg));
                    }
                };
                release_all(self, &args, &func);
                let result = if ref_return {
                    result
                } else {
                    self.deref_owned(result)
                };
                stack.push(result);
            }
            Callable::Script { routine } => {
                let routine = match self.routines.get(routine) {
                    Some(r) => r.clone(),
                    None => {
                        release_all(self, &args, &func);
                        return Err(RuntimeError::internal("unknown routine"));
                    }
                };
                for h in &upvalues {
                    self.heap.retain_handle(*h);
                }
                self.heap.release(&func);
                frames.push(Frame {
                    routine,
                    ip: 0,
                    locals: Vec::new(),
                    upvalues,
                    args,
                    base: stack.len(),
                    ref_return,
                });
            }
        }
        Ok(())
    }

    fn make_closure(
        &mut self,
        routine_index: usize,
        nparams: usize,
        frames: &mut Vec<Frame>,
        stack: &mut Vec<Variant>,
    ) -> Result<(), RuntimeError> {
        let types = split_off(stack, nparams)?;
        let mut sig = Vec::with_capacity(nparams);
        for t in &types {
            let id = match self.heap.deref(*t) {
                Variant::Ref(h) => match &self.heap.get(h).payload {
                    Payload::ClassRef { id, .. } => Some(*id),
                    _ => None,
                },
                _ => None,
            };
            let id = id.ok_or_else(|| {
                RuntimeError::new(format!(
                    "[Type error] Expected a Class in parameter type, got {}",
                    self.heap.type_name(t)
                ))
            })?;
            self.heap.release(t);
            sig.push(id);
        }

        let child = {
            let frame = top(frames);
            frame
                .routine
                .routine_pool
                .get(routine_index)
                .cloned()
                .ok_or_else(|| RuntimeError::internal("invalid routine index"))?
        };
        let store_index = self.intern_routine(child.clone());

        let mut upvalues = Vec::with_capacity(child.upvalues.len());
        for uv in &child.upvalues {
            let h = if uv.is_local {
                self.box_local(top(frames), uv.index as usize)
            } else {
                top(frames).upvalues[uv.index as usize]
            };
            self.heap.retain_handle(h);
            upvalues.push(h);
        }

        let mut f = Function::new(child.name.clone());
        f.add_closure(Closure {
            callable: Callable::Script {
                routine: store_index,
            },
            sig,
            variadic: false,
            ref_flags: child.ref_flags,
            upvalues,
        });
        let v = self.heap.new_function(f);
        stack.push(v);
        Ok(())
    }

    fn intern_routine(&mut self, routine: Rc<Routine>) -> usize {
        for (i, r) in self.routines.iter().enumerate() {
            if Rc::ptr_eq(r, &routine) {
                return i;
            }
        }
        self.routines.push(routine);
        self.routines.len() - 1
    }
}

// ----- free helpers -----

fn top(frames: &mut [Frame]) -> &mut Frame {
    match frames.last_mut() {
        Some(f) => f,
        None => unreachable!("frame stack is never empty while running"),
    }
}

fn pop(stack: &mut Vec<Variant>) -> Result<Variant, RuntimeError> {
    stack
        .pop()
        .ok_or_else(|| RuntimeError::internal("operand stack underflow"))
}

fn split_off(stack: &mut Vec<Variant>, n: usize) -> Result<Vec<Variant>, RuntimeError> {
    if stack.len() < n {
        return Err(RuntimeError::internal("operand stack underflow"));
    }
    Ok(stack.split_off(stack.len() - n))
}

fn undefined_variable(name: &str) -> RuntimeError {
    RuntimeError::new(format!("[Name error] Undefined variable \"{name}\""))
}

fn same_variant(a: &Variant, b: &Variant) -> bool {
    match (a, b) {
        (Variant::Ref(x), Variant::Ref(y)) => x == y,
        (Variant::Alias(x), Variant::Alias(y)) => x == y,
        _ => false,
    }
}

// indexing and field access live here too; iteration is in iterator.rs

impl Runtime {
    fn resolve_position(len: usize, index: i64) -> Option<usize> {
        if index > 0 && (index as usize) <= len {
            Some(index as usize - 1)
        } else if index < 0 && (-index as usize) <= len {
            Some(len - (-index as usize))
        } else {
            None
        }
    }

    fn index_as_integer(&self, v: &Variant) -> Result<i64, RuntimeError> {
        self.heap.deref(*v).as_integer().ok_or_else(|| {
            RuntimeError::new(format!(
                "[Index error] Expected an Integer index, got {}",
                self.heap.type_name(v)
            ))
        })
    }

    fn get_index(&mut self, target: &Variant, indexes: &[Variant]) -> Result<Variant, RuntimeError> {
        let t = self.heap.deref(*target);
        let Variant::Ref(h) = t else {
            return Err(RuntimeError::new(format!(
                "[Type error] Type {} cannot be indexed",
                self.heap.type_name(&t)
            )));
        };
        match &self.heap.get(h).payload {
            Payload::List(items) => {
                let idx = self.index_as_integer(&indexes[0])?;
                let pos = Self::resolve_position(items.len(), idx)
                    .ok_or_else(|| index_out_of_range(idx))?;
                let v = self.heap.deref(items[pos]);
                self.heap.retain(&v);
                Ok(v)
            }
            Payload::Str(s) => {
                use unicode_segmentation::UnicodeSegmentation;
                let idx = self.index_as_integer(&indexes[0])?;
                let count = s.graphemes(true).count();
                let pos =
                    Self::resolve_position(count, idx).ok_or_else(|| index_out_of_range(idx))?;
                let g = s
                    .graphemes(true)
                    .nth(pos)
                    .map(str::to_string)
                    .unwrap_or_default();
                Ok(self.heap.new_string(g))
            }
            Payload::Table(map) => {
                let key = self.key_of(&indexes[0]).map_err(RuntimeError::new)?;
                match map.get(&key) {
                    Some(v) => {
                        let v = self.heap.deref(*v);
                        self.heap.retain(&v);
                        Ok(v)
                    }
                    None => Err(RuntimeError::new(format!(
                        "[Index error] Missing key in table: {key}"
                    ))),
                }
            }
            Payload::Array(arr) => match indexes.len() {
                1 => {
                    let idx = self.index_as_integer(&indexes[0])?;
                    arr.get(idx)
                        .map(Variant::Float)
                        .ok_or_else(|| index_out_of_range(idx))
                }
                2 => {
                    let row = self.index_as_integer(&indexes[0])?;
                    let col = self.index_as_integer(&indexes[1])?;
                    arr.get2(row, col)
                        .map(Variant::Float)
                        .ok_or_else(|| RuntimeError::new("[Index error] Index out of range"))
                }
                n => Err(RuntimeError::new(format!(
                    "[Index error] Arrays take 1 or 2 indexes, got {n}"
                ))),
            },
            Payload::Regex(re) => {
                let idx = self.index_as_integer(&indexes[0])?;
                if idx < 0 || idx as usize >= re.captures.len().max(1) {
                    return Err(RuntimeError::new(format!(
                        "[Index error] Invalid group index {idx}"
                    )));
                }
                match re.captures.get(idx as usize).cloned().flatten() {
                    Some(s) => Ok(self.heap.new_string(s)),
                    None => Ok(Variant::Null),
                }
            }
            other => Err(RuntimeError::new(format!(
                "[Type error] Type {} cannot be indexed",
                type_of_payload(other)
            ))),
        }
    }

    fn get_index_ref(
        &mut self,
        target: &Variant,
        indexes: &[Variant],
    ) -> Result<Variant, RuntimeError> {
        let t = self.heap.deref(*target);
        let Variant::Ref(h) = t else {
            return Err(RuntimeError::new(
                "[Reference error] Cannot take a reference into this value",
            ));
        };
        match &self.heap.get(h).payload {
            Payload::List(items) => {
                let idx = self.index_as_integer(&indexes[0])?;
                let pos = Self::resolve_position(items.len(), idx)
                    .ok_or_else(|| index_out_of_range(idx))?;
                let cell = self.box_list_element(h, pos)?;
                self.heap.retain_handle(cell);
                Ok(Variant::Alias(cell))
            }
            Payload::Table(map) => {
                let key = self.key_of(&indexes[0]).map_err(RuntimeError::new)?;
                if !map.contains_key(&key) {
                    return Err(RuntimeError::new(format!(
                        "[Index error] Missing key in table: {key}"
                    )));
                }
                let cell = self.box_table_value(h, &key)?;
                self.heap.retain_handle(cell);
                Ok(Variant::Alias(cell))
            }
            other => Err(RuntimeError::new(format!(
                "[Reference error] Cannot take a reference into a {}",
                type_of_payload(other)
            ))),
        }
    }

    pub(crate) fn box_list_element(
        &mut self,
        list: Handle,
        pos: usize,
    ) -> Result<Handle, RuntimeError> {
        let elem = match self.heap.as_list(list) {
            Some(items) => items[pos],
            None => return Err(RuntimeError::internal("expected a list")),
        };
        if let Variant::Alias(c) = elem {
            return Ok(c);
        }
        let cell = self.heap.new_alias(elem);
        match self.heap.as_list_mut(list) {
            Some(items) => items[pos] = Variant::Alias(cell),
            None => return Err(RuntimeError::internal("expected a list")),
        }
        Ok(cell)
    }

    pub(crate) fn box_table_value(
        &mut self,
        table: Handle,
        key: &Key,
    ) -> Result<Handle, RuntimeError> {
        let elem = match self.heap.as_table(table).and_then(|m| m.get(key)) {
            Some(v) => *v,
            None => return Err(RuntimeError::internal("expected a table entry")),
        };
        if let Variant::Alias(c) = elem {
            return Ok(c);
        }
        let cell = self.heap.new_alias(elem);
        match self.heap.as_table_mut(table) {
            Some(map) => {
                map.insert(key.clone(), Variant::Alias(cell));
            }
            None => return Err(RuntimeError::internal("expected a table")),
        }
        Ok(cell)
    }

    fn set_index(
        &mut self,
        target: &Variant,
        indexes: &[Variant],
        value: Variant,
    ) -> Result<(), RuntimeError> {
        let t = self.heap.deref(*target);
        let Variant::Ref(h) = t else {
            self.heap.release(&value);
            return Err(RuntimeError::new(format!(
                "[Type error] Type {} cannot be indexed",
                self.heap.type_name(&t)
            )));
        };
        enum Kind {
            List,
            Table,
            Array,
            Other(&'static str),
        }
        let kind = match &self.heap.get(h).payload {
            Payload::List(_) => Kind::List,
            Payload::Table(_) => Kind::Table,
            Payload::Array(_) => Kind::Array,
            other => Kind::Other(type_of_payload(other)),
        };
        match kind {
            Kind::List => {
                let idx = self.index_as_integer(&indexes[0])?;
                let len = match self.heap.as_list(h) {
                    Some(items) => items.len(),
                    None => 0,
                };
                let pos = match Self::resolve_position(len, idx) {
                    Some(p) => p,
                    None => {
                        self.heap.release(&value);
                        return Err(index_out_of_range(idx));
                    }
                };
                let slot = match self.heap.as_list(h) {
                    Some(items) => items[pos],
                    None => Variant::Null,
                };
                match slot {
                    Variant::Alias(cell) => self.store_cell(cell, value)?,
                    old => {
                        if let Some(items) = self.heap.as_list_mut(h) {
                            items[pos] = value;
                        }
                        self.heap.release(&old);
                    }
                }
                Ok(())
            }
            Kind::Table => {
                let key = match self.key_of(&indexes[0]) {
                    Ok(k) => k,
                    Err(e) => {
                        self.heap.release(&value);
                        return Err(RuntimeError::new(e));
                    }
                };
                let slot = self.heap.as_table(h).and_then(|m| m.get(&key)).copied();
                match slot {
                    Some(Variant::Alias(cell)) => self.store_cell(cell, value)?,
                    Some(old) => {
                        if let Some(map) = self.heap.as_table_mut(h) {
                            map.insert(key, value);
                        }
                        self.heap.release(&old);
                    }
                    None => {
                        if let Some(map) = self.heap.as_table_mut(h) {
                            map.insert(key, value);
                        }
                    }
                }
                Ok(())
            }
            Kind::Array => {
                let x = match self.heap.deref(value).as_float() {
                    Some(x) => x,
                    None => {
                        self.heap.release(&value);
                        return Err(RuntimeError::new(
                            "[Type error] Array elements must be numbers",
                        ));
                    }
                };
                self.heap.release(&value);
                let ok = match indexes.len() {
                    1 => {
                        let idx = self.index_as_integer(&indexes[0])?;
                        match &mut self.heap.get_mut(h).payload {
                            Payload::Array(arr) => arr.set(idx, x),
                            _ => false,
                        }
                    }
                    2 => {
                        let row = self.index_as_integer(&indexes[0])?;
                        let col = self.index_as_integer(&indexes[1])?;
                        match &mut self.heap.get_mut(h).payload {
                            Payload::Array(arr) => arr.set2(row, col, x),
                            _ => false,
                        }
                    }
                    _ => false,
                };
                if ok {
                    Ok(())
                } else {
                    Err(RuntimeError::new("[Index error] Index out of range"))
                }
            }
            Kind::Other(t) => {
                self.heap.release(&value);
                Err(RuntimeError::new(format!(
                    "[Type error] Type {t} cannot be indexed"
                )))
            }
        }
    }

    // ----- fields -----

    /// Find a method or accessor, walking up the inheritance chain.
    fn find_member(&self, class: ClassId, name: &str) -> Option<(Variant, bool)> {
        let mut current = class;
        loop {
            let c = self.classes.get(current);
            if let Some(m) = c.methods.get(name) {
                return Some((*m, false));
            }
            if let Some(a) = c.accessors.get(name) {
                return Some((*a, true));
            }
            match c.base() {
                Some(base) if base != current => current = base,
                _ => return None,
            }
        }
    }

    fn get_field(&mut self, target: &Variant, name: &str) -> Result<Variant, RuntimeError> {
        let t = self.heap.deref(*target);
        let class = self.heap.class_of(&t);
        if let Some((member, is_accessor)) = self.find_member(class, name) {
            if is_accessor {
                return self.call_accessor(member, t);
            }
            self.heap.retain(&member);
            self.heap.retain(&t);
            return Ok(Variant::Ref(self.heap.alloc(Payload::Bound {
                func: member,
                this: t,
            })));
        }
        if let Variant::Ref(h) = t {
            if let Payload::Table(map) = &self.heap.get(h).payload {
                let key = Key::Str(name.to_string());
                if let Some(v) = map.get(&key) {
                    let v = self.heap.deref(*v);
                    self.heap.retain(&v);
                    return Ok(v);
                }
            }
        }
        Err(RuntimeError::new(format!(
            "[Index error] Cannot get field \"{name}\" in type {}",
            self.heap.type_name(&t)
        )))
    }

    fn call_accessor(&mut self, member: Variant, this: Variant) -> Result<Variant, RuntimeError> {
        let Variant::Ref(fh) = self.heap.deref(member) else {
            return Err(RuntimeError::internal("accessor is not a function"));
        };
        let native = match self.heap.as_function(fh) {
            Some(f) => f.closures.iter().find_map(|c| match c.callable {
                Callable::Native { func } => Some(func),
                _ => None,
            }),
            None => None,
        };
        let native =
            native.ok_or_else(|| RuntimeError::internal("accessor is not a native function"))?;
        self.heap.retain(&this);
        let mut args = vec![this];
        let result = {
            let mut ctx = NativeContext {
                heap: &mut self.heap,
                classes: &mut self.classes,
                rng: &mut self.rng,
            };
            native(&mut ctx, &mut args)
        };
        for a in &args {
            self.heap.release(a);
        }
        result.map_err(RuntimeError::new)
    }

    fn get_field_ref(&mut self, target: &Variant, name: &str) -> Result<Variant, RuntimeError> {
        let t = self.heap.deref(*target);
        if let Variant::Ref(h) = t {
            if matches!(&self.heap.get(h).payload, Payload::Table(_)) {
                let key = Key::Str(name.to_string());
                let exists = self
                    .heap
                    .as_table(h)
                    .map(|m| m.contains_key(&key))
                    .unwrap_or(false);
                if exists {
                    let cell = self.box_table_value(h, &key)?;
                    self.heap.retain_handle(cell);
                    return Ok(Variant::Alias(cell));
                }
            }
        }
        Err(RuntimeError::new(format!(
            "[Reference error] Cannot get a reference to field \"{name}\""
        )))
    }

    fn set_field(
        &mut self,
        target: &Variant,
        name: &str,
        value: Variant,
    ) -> Result<(), RuntimeError> {
        let t = self.heap.deref(*target);
        if let Variant::Ref(h) = t {
            if matches!(&self.heap.get(h).payload, Payload::Table(_)) {
                let key = Key::Str(name.to_string());
                let slot = self.heap.as_table(h).and_then(|m| m.get(&key)).copied();
                match slot {
                    Some(Variant::Alias(cell)) => return self.store_cell(cell, value),
                    Some(old) => {
                        if let Some(map) = self.heap.as_table_mut(h) {
                            map.insert(key, value);
                        }
                        self.heap.release(&old);
                        return Ok(());
                    }
                    None => {
                        if let Some(map) = self.heap.as_table_mut(h) {
                            map.insert(key, value);
                        }
                        return Ok(());
                    }
                }
            }
        }
        self.heap.release(&value);
        Err(RuntimeError::new(format!(
            "[Type error] Cannot set field \"{name}\" in type {}",
            self.heap.type_name(&t)
        )))
    }
}

fn index_out_of_range(index: i64) -> RuntimeError {
    RuntimeError::new(format!("[Index error] Index {index} out of range"))
}

fn type_of_payload(p: &Payload) -> &'static str {
    match p {
        Payload::Str(_) => "String",
        Payload::Regex(_) => "Regex",
        Payload::File(_) => "File",
        Payload::Array(_) => "Array",
        Payload::List(_) => "List",
        Payload::Table(_) => "Table",
        Payload::Set(_) => "Set",
        Payload::Function(_) | Payload::Bound { .. } => "Function",
        Payload::Alias(_) => "Reference",
        Payload::Iter(_) => "Iterator",
        Payload::ClassRef { .. } => "Class",
    }
}
