//! Iteration over containers, strings, regex captures and files.
//!
//! An iterator object holds the target value, a cursor, and whether the
//! loop asked for aliased values. Keys come out before values, and the
//! cursor only advances when the value is produced.

use crate::error::RuntimeError;
use crate::runtime::Runtime;
use lyre_core::gc::{FileMode, IterObj, Payload};
use lyre_core::value::{Handle, Key, Variant};
use std::io::BufRead;
use unicode_segmentation::UnicodeSegmentation;

impl Runtime {
    pub(crate) fn make_iterator(
        &mut self,
        target: Variant,
        with_ref: bool,
    ) -> Result<Variant, RuntimeError> {
        let inner = self.heap.deref(target);
        let Variant::Ref(h) = inner else {
            let t = self.heap.type_name(&inner).to_string();
            self.heap.release(&target);
            return Err(RuntimeError::new(format!(
                "[Type error] Type {t} is not iterable"
            )));
        };
        let iterable = matches!(
            &self.heap.get(h).payload,
            Payload::List(_)
                | Payload::Table(_)
                | Payload::Set(_)
                | Payload::Str(_)
                | Payload::Regex(_)
                | Payload::File(_)
                | Payload::Array(_)
        );
        if !iterable {
            let t = self.heap.type_name(&inner).to_string();
            self.heap.release(&target);
            return Err(RuntimeError::new(format!(
                "[Type error] Type {t} is not iterable"
            )));
        }
        if with_ref {
            // only list elements and table values have addressable storage
            let aliasable = matches!(
                &self.heap.get(h).payload,
                Payload::List(_) | Payload::Table(_)
            );
            if !aliasable {
                let t = self.heap.type_name(&inner).to_string();
                self.heap.release(&target);
                return Err(RuntimeError::new(format!(
                    "[Reference error] Cannot iterate {t} values by reference"
                )));
            }
        }
        self.heap.retain(&inner);
        self.heap.release(&target);
        let iter = self.heap.alloc(Payload::Iter(IterObj {
            target: inner,
            with_ref,
            pos: 0,
        }));
        Ok(Variant::Ref(iter))
    }

    fn iter_state(&self, iter: &Variant) -> Result<(Handle, bool, usize), RuntimeError> {
        let Variant::Ref(h) = iter else {
            return Err(RuntimeError::internal("expected an iterator"));
        };
        match &self.heap.get(*h).payload {
            Payload::Iter(it) => match it.target {
                Variant::Ref(th) => Ok((th, it.with_ref, it.pos)),
                _ => Err(RuntimeError::internal("iterator lost its target")),
            },
            _ => Err(RuntimeError::internal("expected an iterator")),
        }
    }

    fn advance(&mut self, iter: &Variant) {
        if let Variant::Ref(h) = iter {
            if let Payload::Iter(it) = &mut self.heap.get_mut(*h).payload {
                it.pos += 1;
            }
        }
    }

    pub(crate) fn iter_test(&mut self, iter: &Variant) -> Result<bool, RuntimeError> {
        let (target, _, pos) = self.iter_state(iter)?;
        match &self.heap.get(target).payload {
            Payload::List(items) => Ok(pos < items.len()),
            Payload::Table(map) => Ok(pos < map.len()),
            Payload::Set(set) => Ok(pos < set.len()),
            Payload::Str(s) => Ok(pos < s.graphemes(true).count()),
            Payload::Array(arr) => Ok(pos < arr.len()),
            Payload::Regex(re) => Ok(pos + 1 < re.captures.len().max(1)),
            Payload::File(_) => self.file_has_more(target),
            _ => Err(RuntimeError::internal("iterator target is not iterable")),
        }
    }

    pub(crate) fn iter_key(&mut self, iter: &Variant) -> Result<Variant, RuntimeError> {
        let (target, _, pos) = self.iter_state(iter)?;
        let key = match &self.heap.get(target).payload {
            // 1-based positions for sequences, line numbers for files
            Payload::List(_)
            | Payload::Str(_)
            | Payload::Array(_)
            | Payload::Regex(_)
            | Payload::File(_) => return Ok(Variant::Integer(pos as i64 + 1)),
            Payload::Table(map) => map
                .get_index(pos)
                .map(|(k, _)| k.clone())
                .ok_or_else(|| RuntimeError::internal("iterator past the end"))?,
            Payload::Set(set) => set
                .get_index(pos)
                .cloned()
                .ok_or_else(|| RuntimeError::internal("iterator past the end"))?,
            _ => return Err(RuntimeError::internal("iterator target is not iterable")),
        };
        Ok(self.heap.key_to_variant(&key))
    }

    pub(crate) fn iter_value(&mut self, iter: &Variant) -> Result<Variant, RuntimeError> {
        let (target, with_ref, pos) = self.iter_state(iter)?;
        enum Step {
            Done(Variant),
            ListElem,
            TableValue(Key),
            ReadLine,
        }
        let step = match &self.heap.get(target).payload {
            Payload::List(items) => {
                let v = *items
                    .get(pos)
                    .ok_or_else(|| RuntimeError::internal("iterator past the end"))?;
                if with_ref {
                    Step::ListElem
                } else {
                    let v = self.heap.deref(v);
                    self.heap.retain(&v);
                    Step::Done(v)
                }
            }
            Payload::Table(map) => {
                let (k, v) = map
                    .get_index(pos)
                    .ok_or_else(|| RuntimeError::internal("iterator past the end"))?;
                if with_ref {
                    Step::TableValue(k.clone())
                } else {
                    let v = self.heap.deref(*v);
                    self.heap.retain(&v);
                    Step::Done(v)
                }
            }
            Payload::Set(set) => {
                let k = set
                    .get_index(pos)
                    .cloned()
                    .ok_or_else(|| RuntimeError::internal("iterator past the end"))?;
                self.advance(iter);
                return Ok(self.heap.key_to_variant(&k));
            }
            Payload::Str(s) => {
                let g = s
                    .graphemes(true)
                    .nth(pos)
                    .map(str::to_string)
                    .ok_or_else(|| RuntimeError::internal("iterator past the end"))?;
                self.advance(iter);
                return Ok(self.heap.new_string(g));
            }
            Payload::Array(arr) => {
                let x = arr
                    .data()
                    .get(pos)
                    .copied()
                    .ok_or_else(|| RuntimeError::internal("iterator past the end"))?;
                Step::Done(Variant::Float(x))
            }
            Payload::Regex(re) => {
                let group = re
                    .captures
                    .get(pos + 1)
                    .cloned()
                    .ok_or_else(|| RuntimeError::internal("iterator past the end"))?;
                self.advance(iter);
                return Ok(match group {
                    Some(s) => self.heap.new_string(s),
                    None => Variant::Null,
                });
            }
            Payload::File(_) => Step::ReadLine,
            _ => return Err(RuntimeError::internal("iterator target is not iterable")),
        };
        let result = match step {
            Step::Done(v) => v,
            Step::ListElem => {
                let cell = self.box_list_element(target, pos)?;
                self.heap.retain_handle(cell);
                Variant::Alias(cell)
            }
            Step::TableValue(key) => {
                let cell = self.box_table_value(target, &key)?;
                self.heap.retain_handle(cell);
                Variant::Alias(cell)
            }
            Step::ReadLine => {
                let line = self.file_read_line(target)?;
                self.heap.new_string(line)
            }
        };
        self.advance(iter);
        Ok(result)
    }

    // ----- file helpers, shared with the standard library -----

    pub(crate) fn file_has_more(&mut self, file: Handle) -> Result<bool, RuntimeError> {
        match &mut self.heap.get_mut(file).payload {
            Payload::File(f) => match &mut f.mode {
                FileMode::Read(reader) => Ok(reader.fill_buf().map(|b| !b.is_empty()).map_err(
                    |e| RuntimeError::new(format!("[Input/Output error] Cannot read file: {e}")),
                )?),
                FileMode::Write(_) => Err(RuntimeError::new(
                    "[Input/Output error] File is not open for reading",
                )),
                FileMode::Closed => Err(RuntimeError::new("[Input/Output error] File is closed")),
            },
            _ => Err(RuntimeError::internal("expected a file")),
        }
    }

    /// Read one line, without the trailing newline.
    pub(crate) fn file_read_line(&mut self, file: Handle) -> Result<String, RuntimeError> {
        match &mut self.heap.get_mut(file).payload {
            Payload::File(f) => match &mut f.mode {
                FileMode::Read(reader) => {
                    let mut line = String::new();
                    reader.read_line(&mut line).map_err(|e| {
                        RuntimeError::new(format!("[Input/Output error] Cannot read file: {e}"))
                    })?;
                    if line.ends_with('\n') {
                        line.pop();
                        if line.ends_with('\r') {
                            line.pop();
                        }
                    }
                    Ok(line)
                }
                FileMode::Write(_) => Err(RuntimeError::new(
                    "[Input/Output error] File is not open for reading",
                )),
                FileMode::Closed => Err(RuntimeError::new("[Input/Output error] File is closed")),
            },
            _ => Err(RuntimeError::internal("expected a file")),
        }
    }
}
