//! The runtime: heap, class registry, globals and embedding API.

use crate::error::RuntimeError;
use indexmap::IndexMap;
use lyre_compiler::compiler;
use lyre_compiler::routine::Routine;
use lyre_core::class::{ClassId, ClassRegistry, Traits};
use lyre_core::gc::{Callable, Closure, Function, NativeFn, Payload};
use lyre_core::gc::Heap;
use lyre_core::rng::Xorshift;
use lyre_core::value::{Key, Variant};
use std::cmp::Ordering;
use std::rc::Rc;
use std::time::{SystemTime, UNIX_EPOCH};

/// How many cycle candidates accumulate before a run triggers a
/// collection on its way out.
const GC_THRESHOLD: usize = 1024;

pub struct Runtime {
    pub heap: Heap,
    pub classes: ClassRegistry,
    pub rng: Xorshift,
    pub(crate) globals: IndexMap<String, Variant>,
    /// Routines referenced by script closures, interned by identity.
    pub(crate) routines: Vec<Rc<Routine>>,
    /// When set, `print` appends here instead of writing to stdout.
    capture: Option<String>,
}

impl Default for Runtime {
    fn default() -> Self {
        Runtime::new()
    }
}

impl Runtime {
    pub fn new() -> Self {
        let seed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(1);
        let mut rt = Runtime {
            heap: Heap::new(),
            classes: ClassRegistry::new(),
            rng: Xorshift::new(seed),
            globals: IndexMap::new(),
            routines: Vec::new(),
            capture: None,
        };
        rt.register_class_globals();
        rt
    }

    /// Expose every registered class as a global so scripts can use class
    /// names in parameter type positions.
    fn register_class_globals(&mut self) {
        for i in 0..self.classes.len() {
            let id = ClassId(i);
            let name = self.classes.get(id).name.clone();
            let value = self.heap.new_class(id, name.clone());
            self.globals.insert(name, value);
        }
    }

    // ----- embedding API -----

    /// Compile and run a source string, returning the program's value.
    pub fn do_string(&mut self, source: &str) -> Result<Variant, RuntimeError> {
        let routine = compiler::compile(source)?;
        let result = self.execute(routine)?;
        if self.heap.candidate_count() > GC_THRESHOLD {
            // the result is live even though nothing roots it yet
            self.collect_extra(&[result]);
        }
        Ok(result)
    }

    /// Run a script file.
    pub fn do_file(&mut self, path: &str) -> Result<Variant, RuntimeError> {
        let source = std::fs::read_to_string(path)
            .map_err(|e| RuntimeError::new(format!("[Input/Output error] Cannot read \"{path}\": {e}")))?;
        self.do_string(&source)
    }

    /// Register `func` as a global function overload. `sig` gives the
    /// expected parameter classes.
    pub fn add_global_function(&mut self, name: &str, func: NativeFn, sig: &[ClassId]) {
        self.add_global_overload(name, func, sig, 0);
    }

    /// Like [`add_global_function`], with a by-reference parameter bitset.
    ///
    /// [`add_global_function`]: Runtime::add_global_function
    pub fn add_global_overload(&mut self, name: &str, func: NativeFn, sig: &[ClassId], ref_flags: u64) {
        let closure = Closure {
            callable: Callable::Native { func },
            sig: sig.to_vec(),
            variadic: false,
            ref_flags,
            upvalues: Vec::new(),
        };
        match self.globals.get(name).copied() {
            Some(Variant::Ref(h)) => {
                if let Payload::Function(f) = &mut self.heap.get_mut(h).payload {
                    f.add_closure(closure);
                    return;
                }
                let fresh = self.new_native(name, closure);
                self.heap.release_handle(h);
                self.globals.insert(name.to_string(), fresh);
            }
            _ => {
                let fresh = self.new_native(name, closure);
                self.globals.insert(name.to_string(), fresh);
            }
        }
    }

    fn new_native(&mut self, name: &str, closure: Closure) -> Variant {
        let mut f = Function::new(name);
        f.add_closure(closure);
        self.heap.new_function(f)
    }

    /// Register a method on a class. The receiver is the implicit first
    /// argument, so `sig` must start with the receiver's class.
    pub fn add_method(&mut self, class: ClassId, name: &str, func: NativeFn, sig: &[ClassId]) {
        let closure = Closure {
            callable: Callable::Native { func },
            sig: sig.to_vec(),
            variadic: false,
            ref_flags: 0,
            upvalues: Vec::new(),
        };
        let existing = self.classes.get(class).methods.get(name).copied();
        match existing {
            Some(Variant::Ref(h)) => {
                if let Payload::Function(f) = &mut self.heap.get_mut(h).payload {
                    f.add_closure(closure);
                }
            }
            _ => {
                let f = self.new_native(name, closure);
                self.classes
                    .get_mut(class)
                    .methods
                    .insert(name.to_string(), f);
            }
        }
    }

    /// Register a read accessor (a computed field) on a class.
    pub fn add_accessor(&mut self, class: ClassId, name: &str, func: NativeFn) {
        let closure = Closure {
            callable: Callable::Native { func },
            sig: vec![class],
            variadic: false,
            ref_flags: 0,
            upvalues: Vec::new(),
        };
        let f = self.new_native(name, closure);
        self.classes
            .get_mut(class)
            .accessors
            .insert(name.to_string(), f);
    }

    /// Attach a constructor to an existing class, so that calling the
    /// class value creates instances.
    pub fn add_initializer(&mut self, class: ClassId, ctor: NativeFn, sig: &[ClassId]) {
        let closure = Closure {
            callable: Callable::Native { func: ctor },
            sig: sig.to_vec(),
            variadic: false,
            ref_flags: 0,
            upvalues: Vec::new(),
        };
        let name = self.classes.get(class).name.clone();
        let existing = self.classes.get(class).initializer;
        match existing {
            Some(Variant::Ref(h)) => {
                if let Payload::Function(f) = &mut self.heap.get_mut(h).payload {
                    f.add_closure(closure);
                }
            }
            _ => {
                let init = self.new_native(&name, closure);
                self.classes.get_mut(class).initializer = Some(init);
            }
        }
    }

    /// Register a native class with a constructor, and expose it as a
    /// global. Returns the new class id.
    pub fn new_native_constructor(
        &mut self,
        name: &str,
        base: Option<ClassId>,
        ctor: NativeFn,
        sig: &[ClassId],
    ) -> ClassId {
        let id = self.classes.add_class(name, base, Traits::container());
        let closure = Closure {
            callable: Callable::Native { func: ctor },
            sig: sig.to_vec(),
            variadic: false,
            ref_flags: 0,
            upvalues: Vec::new(),
        };
        let init = self.new_native(name, closure);
        self.classes.get_mut(id).initializer = Some(init);
        let value = self.heap.new_class(id, name);
        self.globals.insert(name.to_string(), value);
        id
    }

    pub fn get_global(&self, name: &str) -> Option<Variant> {
        self.globals.get(name).map(|v| self.heap.deref(*v))
    }

    pub fn set_global(&mut self, name: &str, value: Variant) {
        if let Some(old) = self.globals.insert(name.to_string(), value) {
            self.heap.release(&old);
        }
    }

    /// Run a cycle collection with the runtime's roots. Returns the number
    /// of objects reclaimed.
    pub fn collect(&mut self) -> usize {
        self.collect_extra(&[])
    }

    fn collect_extra(&mut self, extra: &[Variant]) -> usize {
        let mut roots: Vec<Variant> = self.globals.values().copied().collect();
        roots.extend_from_slice(extra);
        for i in 0..self.classes.len() {
            let class = self.classes.get(ClassId(i));
            roots.extend(class.methods.values().copied());
            roots.extend(class.accessors.values().copied());
            roots.extend(class.initializer.iter().copied());
        }
        self.heap.collect(&roots)
    }

    // ----- output -----

    /// Redirect `print` into an internal buffer (used by tests and the
    /// embedding host).
    pub fn capture_output(&mut self, on: bool) {
        self.capture = if on { Some(String::new()) } else { None };
    }

    pub fn take_output(&mut self) -> String {
        match &mut self.capture {
            Some(buf) => std::mem::take(buf),
            None => String::new(),
        }
    }

    pub(crate) fn write_output(&mut self, text: &str) {
        match &mut self.capture {
            Some(buf) => buf.push_str(text),
            None => print!("{text}"),
        }
    }

    // ----- marshalling helpers for native code -----

    pub fn to_string_value(&self, v: &Variant) -> String {
        self.heap.stringify(v)
    }

    pub fn to_integer(&self, v: &Variant) -> Result<i64, RuntimeError> {
        self.heap
            .deref(*v)
            .as_integer()
            .ok_or_else(|| RuntimeError::new("[Type error] Expected an Integer"))
    }

    pub fn to_float(&self, v: &Variant) -> Result<f64, RuntimeError> {
        self.heap
            .deref(*v)
            .as_float()
            .ok_or_else(|| RuntimeError::new("[Type error] Expected a Number"))
    }

    pub fn to_boolean(&self, v: &Variant) -> Result<bool, RuntimeError> {
        self.heap
            .deref(*v)
            .as_boolean()
            .ok_or_else(|| RuntimeError::new("[Type error] Expected a Boolean"))
    }

    /// The class id of any value, for dispatch from native code.
    pub fn class_of(&self, v: &Variant) -> ClassId {
        self.heap.class_of(v)
    }

    /// Normalize a value into a table/set key. The value's class must
    /// carry the hashable trait.
    pub fn key_of(&self, v: &Variant) -> Result<Key, String> {
        if !self.classes.hashable(self.class_of(v)) {
            return Err(format!(
                "[Type error] {} is not hashable",
                self.heap.type_name(v)
            ));
        }
        self.heap.to_key(v)
    }

    /// Three-way comparison, gated on both classes carrying the
    /// comparable trait.
    pub fn compare_values(&self, a: &Variant, b: &Variant) -> Result<Ordering, String> {
        if !self.classes.comparable(self.class_of(a))
            || !self.classes.comparable(self.class_of(b))
        {
            return Err(format!(
                "[Type error] Cannot compare {} and {}",
                self.heap.type_name(a),
                self.heap.type_name(b)
            ));
        }
        self.heap.compare(a, b)
    }

    /// Deep copy, gated on the class carrying the clonable trait.
    pub fn clone_value(&mut self, v: &Variant) -> Result<Variant, String> {
        if !self.classes.clonable(self.class_of(v)) {
            return Err(format!(
                "[Type error] Cannot copy value of type {}",
                self.heap.type_name(v)
            ));
        }
        self.heap.deep_clone(v)
    }
}

/// Shorthand for builtin class ids, re-exported for embedders.
pub mod builtin {
    pub use lyre_core::class::{
        CLASS_ARRAY, CLASS_BOOLEAN, CLASS_CLASS, CLASS_FILE, CLASS_FLOAT, CLASS_FUNCTION,
        CLASS_INTEGER, CLASS_ITERATOR, CLASS_LIST, CLASS_MODULE, CLASS_NULL, CLASS_NUMBER,
        CLASS_OBJECT, CLASS_REGEX, CLASS_SET, CLASS_STRING, CLASS_TABLE,
    };
}
