//! The GC heap: a slot arena with reference counting and a tracing cycle
//! collector.
//!
//! Every heap object carries a reference count and is destroyed
//! deterministically when the count drops to zero. Objects that can own
//! other objects (lists, tables, functions, aliases) are additionally
//! tracked as cycle candidates: when a release leaves such an object alive
//! it is buffered as a potential cycle root, and `collect` traces the
//! runtime's roots to reclaim unreachable cycles.

use std::cmp::Ordering;
use std::fs;
use std::io::{BufReader, BufWriter};

use indexmap::{IndexMap, IndexSet};

use crate::array::Array;
use crate::class::{self, ClassId, ClassRegistry};
use crate::rng::Xorshift;
use crate::value::{Handle, Key, Variant};

/// Garbage collector colors. `Green` objects cannot participate in cycles
/// and are never buffered; `Purple` marks a live object that lost a
/// reference and may be a cycle root.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum GcColor {
    Green,
    Black,
    Purple,
}

/// A native (Rust) function callable from scripts.
pub type NativeFn = fn(&mut NativeContext, &mut [Variant]) -> Result<Variant, String>;

/// Context passed to native functions.
pub struct NativeContext<'a> {
    pub heap: &'a mut Heap,
    pub classes: &'a mut ClassRegistry,
    pub rng: &'a mut Xorshift,
}

impl NativeContext<'_> {
    /// Normalize a value into a table/set key. The value's class must
    /// carry the hashable trait.
    pub fn key_of(&self, v: &Variant) -> Result<Key, String> {
        if !self.classes.hashable(self.heap.class_of(v)) {
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
        if !self.classes.comparable(self.heap.class_of(a))
            || !self.classes.comparable(self.heap.class_of(b))
        {
            return Err(format!(
                "[Type error] Cannot compare {} and {}",
                self.heap.type_name(a),
                self.heap.type_name(b)
            ));
        }
        self.heap.compare(a, b)
    }
}

/// One callable implementation behind a function object.
#[derive(Clone, Copy)]
pub enum Callable {
    Native { func: NativeFn },
    /// Index into the VM's routine store.
    Script { routine: usize },
}

/// A closure: a callable plus its captured upvalues and signature.
///
/// Upvalue handles point at `Alias` cells, shared with the local slots
/// they were captured from.
pub struct Closure {
    pub callable: Callable,
    /// Expected parameter classes, used for overload resolution. Arguments
    /// beyond the signature are accepted when `variadic` is set.
    pub sig: Vec<ClassId>,
    pub variadic: bool,
    /// Bit `i` set means parameter `i` is passed by reference.
    pub ref_flags: u64,
    pub upvalues: Vec<Handle>,
}

impl Closure {
    pub fn by_ref(&self, param: usize) -> bool {
        param < 64 && self.ref_flags & (1u64 << param) != 0
    }
}

/// A function object: a named set of overloads.
pub struct Function {
    pub name: String,
    pub closures: Vec<Closure>,
}

impl Function {
    pub fn new(name: impl Into<String>) -> Self {
        Function {
            name: name.into(),
            closures: Vec::new(),
        }
    }

    pub fn add_closure(&mut self, closure: Closure) {
        self.closures.push(closure);
    }

    pub fn max_argc(&self) -> usize {
        self.closures
            .iter()
            .map(|c| if c.variadic { usize::MAX } else { c.sig.len() })
            .max()
            .unwrap_or(0)
    }

    /// Pick the overload whose signature is closest to the argument
    /// classes. Later registrations win ties.
    pub fn resolve(&self, arg_classes: &[ClassId], registry: &ClassRegistry) -> Option<usize> {
        let mut best: Option<(usize, usize)> = None;
        for (idx, closure) in self.closures.iter().enumerate().rev() {
            if arg_classes.len() < closure.sig.len()
                || (arg_classes.len() > closure.sig.len() && !closure.variadic)
            {
                continue;
            }
            let mut cost = 0usize;
            let mut ok = true;
            for (i, arg) in arg_classes.iter().enumerate() {
                let want = closure.sig.get(i).copied().unwrap_or(class::CLASS_OBJECT);
                match registry.get_distance(*arg, want) {
                    Some(d) => cost += d,
                    None => {
                        ok = false;
                        break;
                    }
                }
            }
            if !ok {
                continue;
            }
            match best {
                Some((_, best_cost)) if best_cost <= cost => {}
                _ => best = Some((idx, cost)),
            }
        }
        best.map(|(idx, _)| idx)
    }
}

/// Compiled regular expression plus the captures of its last match.
pub struct RegexObj {
    pub pattern: String,
    pub re: regex::Regex,
    /// Group 0 is the whole match.
    pub captures: Vec<Option<String>>,
}

pub enum FileMode {
    Read(BufReader<fs::File>),
    Write(BufWriter<fs::File>),
    Closed,
}

pub struct FileObj {
    pub path: String,
    pub mode: FileMode,
}

/// Iteration state over a container, string, regex or file.
pub struct IterObj {
    pub target: Variant,
    /// Whether values are produced as aliases into the container.
    pub with_ref: bool,
    pub pos: usize,
}

/// The data owned by a heap object.
pub enum Payload {
    Str(String),
    Regex(RegexObj),
    File(FileObj),
    Array(Array),
    List(Vec<Variant>),
    Table(IndexMap<Key, Variant>),
    Set(IndexSet<Key>),
    Function(Function),
    /// A shared variant cell, the target of by-reference bindings.
    Alias(Variant),
    /// A method bound to its receiver.
    Bound { func: Variant, this: Variant },
    Iter(IterObj),
    /// A class as a first-class value, e.g. in parameter type positions.
    ClassRef { id: ClassId, name: String },
}

impl Payload {
    /// Whether this payload may own references to other heap objects.
    pub fn collectable(&self) -> bool {
        matches!(
            self,
            Payload::List(_)
                | Payload::Table(_)
                | Payload::Function(_)
                | Payload::Alias(_)
                | Payload::Bound { .. }
                | Payload::Iter(_)
        )
    }

    /// Push the handles of every child object onto `out`.
    pub fn trace(&self, out: &mut Vec<Handle>) {
        let mut push = |v: &Variant| {
            if let Some(h) = v.handle() {
                out.push(h);
            }
        };
        match self {
            Payload::List(items) => items.iter().for_each(push),
            Payload::Table(map) => map.values().for_each(push),
            Payload::Function(f) => {
                for c in &f.closures {
                    out.extend_from_slice(&c.upvalues);
                }
            }
            Payload::Alias(v) => push(v),
            Payload::Bound { func, this } => {
                push(func);
                push(this);
            }
            Payload::Iter(it) => push(&it.target),
            _ => {}
        }
    }

    pub fn class(&self) -> ClassId {
        match self {
            Payload::Str(_) => class::CLASS_STRING,
            Payload::Regex(_) => class::CLASS_REGEX,
            Payload::File(_) => class::CLASS_FILE,
            Payload::Array(_) => class::CLASS_ARRAY,
            Payload::List(_) => class::CLASS_LIST,
            Payload::Table(_) => class::CLASS_TABLE,
            Payload::Set(_) => class::CLASS_SET,
            Payload::Function(_) | Payload::Bound { .. } => class::CLASS_FUNCTION,
            Payload::Alias(_) => class::CLASS_OBJECT,
            Payload::Iter(_) => class::CLASS_ITERATOR,
            Payload::ClassRef { .. } => class::CLASS_CLASS,
        }
    }
}

pub struct HeapObject {
    pub class: ClassId,
    pub ref_count: u32,
    pub color: GcColor,
    /// Trace mark, alternating between 1 and 2 across collections.
    mark: u8,
    /// Whether this object is in the cycle candidate buffer.
    buffered: bool,
    pub payload: Payload,
}

/// The slot arena.
pub struct Heap {
    slots: Vec<Option<HeapObject>>,
    free: Vec<u32>,
    candidates: Vec<Handle>,
    /// When set, `collect` is a no-op. Used while native code holds raw
    /// borrows into the heap.
    pub gc_paused: bool,
    mark: u8,
    destroyed: u64,
    allocated: u64,
}

impl Default for Heap {
    fn default() -> Self {
        Self::new()
    }
}

impl Heap {
    pub fn new() -> Self {
        Heap {
            slots: Vec::new(),
            free: Vec::new(),
            candidates: Vec::new(),
            gc_paused: false,
            mark: 2,
            destroyed: 0,
            allocated: 0,
        }
    }

    /// Allocate a new object with a reference count of 1.
    pub fn alloc(&mut self, payload: Payload) -> Handle {
        self.alloc_as(payload.class(), payload)
    }

    /// Allocate with an explicit class, for instances of user classes.
    pub fn alloc_as(&mut self, class: ClassId, payload: Payload) -> Handle {
        let color = if payload.collectable() {
            GcColor::Black
        } else {
            GcColor::Green
        };
        let obj = HeapObject {
            class,
            ref_count: 1,
            color,
            mark: 0,
            buffered: false,
            payload,
        };
        self.allocated += 1;
        match self.free.pop() {
            Some(idx) => {
                self.slots[idx as usize] = Some(obj);
                Handle(idx)
            }
            None => {
                let idx = self.slots.len() as u32;
                self.slots.push(Some(obj));
                Handle(idx)
            }
        }
    }

    pub fn get(&self, h: Handle) -> &HeapObject {
        self.slots[h.index()]
            .as_ref()
            .unwrap_or_else(|| panic!("access to freed heap slot {}", h.0))
    }

    pub fn get_mut(&mut self, h: Handle) -> &mut HeapObject {
        self.slots[h.index()]
            .as_mut()
            .unwrap_or_else(|| panic!("access to freed heap slot {}", h.0))
    }

    /// Increment the reference count of the object behind `v`, if any.
    pub fn retain(&mut self, v: &Variant) {
        if let Some(h) = v.handle() {
            self.retain_handle(h);
        }
    }

    pub fn retain_handle(&mut self, h: Handle) {
        let obj = self.get_mut(h);
        obj.ref_count += 1;
        if obj.color == GcColor::Purple {
            obj.color = GcColor::Black;
        }
    }

    /// Decrement the reference count of the object behind `v`. A count of
    /// zero destroys the object and releases everything it owns.
    pub fn release(&mut self, v: &Variant) {
        if let Some(h) = v.handle() {
            self.release_handle(h);
        }
    }

    pub fn release_handle(&mut self, h: Handle) {
        let mut stack = vec![h];
        while let Some(h) = stack.pop() {
            let Some(obj) = self.slots[h.index()].as_mut() else {
                continue;
            };
            debug_assert!(obj.ref_count > 0, "release of dead object");
            obj.ref_count -= 1;
            if obj.ref_count == 0 {
                let obj = self.slots[h.index()].take().unwrap_or_else(|| unreachable!());
                obj.payload.trace(&mut stack);
                self.free.push(h.0);
                self.destroyed += 1;
            } else if obj.payload.collectable() {
                obj.color = GcColor::Purple;
                if !obj.buffered {
                    obj.buffered = true;
                    self.candidates.push(h);
                }
            }
        }
    }

    /// Run a cycle collection, treating `roots` as the live set. Returns
    /// the number of objects reclaimed.
    pub fn collect(&mut self, roots: &[Variant]) -> usize {
        if self.gc_paused {
            return 0;
        }
        self.mark = if self.mark == 1 { 2 } else { 1 };
        let mark = self.mark;

        let mut work: Vec<Handle> = roots.iter().filter_map(|v| v.handle()).collect();
        while let Some(h) = work.pop() {
            let Some(obj) = self.slots[h.index()].as_mut() else {
                continue;
            };
            if obj.mark == mark {
                continue;
            }
            obj.mark = mark;
            obj.payload.trace(&mut work);
        }

        // Two-phase sweep: gather the dead set first, then fix up the
        // counts of survivors referenced from dead objects, then free.
        let mut dead = Vec::new();
        for (i, slot) in self.slots.iter().enumerate() {
            if let Some(obj) = slot {
                if obj.mark != mark {
                    dead.push(i);
                }
            }
        }
        let mut survivors = Vec::new();
        for &i in &dead {
            if let Some(obj) = &self.slots[i] {
                let mut children = Vec::new();
                obj.payload.trace(&mut children);
                for child in children {
                    if let Some(c) = self.slots[child.index()].as_ref() {
                        if c.mark == mark {
                            survivors.push(child);
                        }
                    }
                }
            }
        }
        for &i in &dead {
            self.slots[i] = None;
            self.free.push(i as u32);
            self.destroyed += 1;
        }
        for h in survivors {
            self.release_handle(h);
        }
        // surviving candidates must be re-bufferable on their next release
        for h in std::mem::take(&mut self.candidates) {
            if let Some(obj) = self.slots[h.index()].as_mut() {
                obj.buffered = false;
            }
        }
        dead.len()
    }

    /// Number of live objects.
    pub fn live_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn destroyed_count(&self) -> u64 {
        self.destroyed
    }

    pub fn allocated_count(&self) -> u64 {
        self.allocated
    }

    /// Number of buffered cycle candidates, used by the runtime to decide
    /// when to collect.
    pub fn candidate_count(&self) -> usize {
        self.candidates.len()
    }

    // ----- typed allocation helpers -----

    pub fn new_string(&mut self, s: impl Into<String>) -> Variant {
        Variant::Ref(self.alloc(Payload::Str(s.into())))
    }

    pub fn new_list(&mut self, items: Vec<Variant>) -> Variant {
        Variant::Ref(self.alloc(Payload::List(items)))
    }

    pub fn new_table(&mut self) -> Variant {
        Variant::Ref(self.alloc(Payload::Table(IndexMap::new())))
    }

    pub fn new_set(&mut self) -> Variant {
        Variant::Ref(self.alloc(Payload::Set(IndexSet::new())))
    }

    pub fn new_array(&mut self, a: Array) -> Variant {
        Variant::Ref(self.alloc(Payload::Array(a)))
    }

    pub fn new_function(&mut self, f: Function) -> Variant {
        Variant::Ref(self.alloc(Payload::Function(f)))
    }

    pub fn new_class(&mut self, id: ClassId, name: impl Into<String>) -> Variant {
        Variant::Ref(self.alloc(Payload::ClassRef {
            id,
            name: name.into(),
        }))
    }

    /// Box `value` into a fresh alias cell. The cell takes over the
    /// caller's reference to `value`.
    pub fn new_alias(&mut self, value: Variant) -> Handle {
        self.alloc(Payload::Alias(value))
    }

    // ----- typed accessors -----

    pub fn as_str(&self, h: Handle) -> Option<&str> {
        match &self.get(h).payload {
            Payload::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self, h: Handle) -> Option<&Vec<Variant>> {
        match &self.get(h).payload {
            Payload::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_list_mut(&mut self, h: Handle) -> Option<&mut Vec<Variant>> {
        match &mut self.get_mut(h).payload {
            Payload::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_table(&self, h: Handle) -> Option<&IndexMap<Key, Variant>> {
        match &self.get(h).payload {
            Payload::Table(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_table_mut(&mut self, h: Handle) -> Option<&mut IndexMap<Key, Variant>> {
        match &mut self.get_mut(h).payload {
            Payload::Table(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_function(&self, h: Handle) -> Option<&Function> {
        match &self.get(h).payload {
            Payload::Function(f) => Some(f),
            _ => None,
        }
    }

    // ----- value semantics -----

    /// The class of any value.
    pub fn class_of(&self, v: &Variant) -> ClassId {
        match v {
            Variant::Null => class::CLASS_NULL,
            Variant::Boolean(_) => class::CLASS_BOOLEAN,
            Variant::Integer(_) => class::CLASS_INTEGER,
            Variant::Float(_) => class::CLASS_FLOAT,
            Variant::Ref(h) => self.get(*h).class,
            Variant::Alias(h) => match &self.get(*h).payload {
                Payload::Alias(inner) => self.class_of(inner),
                _ => self.get(*h).class,
            },
        }
    }

    /// Resolve aliases to the value they hold. Does not touch counts.
    pub fn deref(&self, v: Variant) -> Variant {
        match v {
            Variant::Alias(h) => match &self.get(h).payload {
                Payload::Alias(inner) => *inner,
                _ => v,
            },
            _ => v,
        }
    }

    /// Normalize a value into a table/set key. Containers and functions
    /// are not hashable.
    pub fn to_key(&self, v: &Variant) -> Result<Key, String> {
        let v = self.deref(*v);
        match v {
            Variant::Boolean(b) => Ok(Key::Boolean(b)),
            Variant::Integer(i) => Ok(Key::Integer(i)),
            Variant::Float(f) => Ok(Key::Float(f.to_bits())),
            Variant::Ref(h) => match &self.get(h).payload {
                Payload::Str(s) => Ok(Key::Str(s.clone())),
                _ => Err("[Type error] Value is not hashable".to_string()),
            },
            Variant::Null => Err("[Type error] Null value is not hashable".to_string()),
            Variant::Alias(_) => Err("[Type error] Value is not hashable".to_string()),
        }
    }

    /// Turn a key back into a value, allocating for string keys.
    pub fn key_to_variant(&mut self, k: &Key) -> Variant {
        match k.scalar() {
            Some(v) => v,
            None => match k {
                Key::Str(s) => self.new_string(s.clone()),
                _ => Variant::Null,
            },
        }
    }

    /// Structural equality. Numbers compare across integer and float,
    /// strings by content, lists and tables element-wise; other references
    /// compare by identity.
    pub fn equal(&self, a: &Variant, b: &Variant) -> bool {
        let a = self.deref(*a);
        let b = self.deref(*b);
        match (a, b) {
            (Variant::Null, Variant::Null) => true,
            (Variant::Boolean(x), Variant::Boolean(y)) => x == y,
            (Variant::Integer(x), Variant::Integer(y)) => x == y,
            (x, y) if x.is_number() && y.is_number() => {
                // as_float is Some for both by the guard
                x.as_float() == y.as_float()
            }
            (Variant::Ref(ha), Variant::Ref(hb)) => {
                if ha == hb {
                    return true;
                }
                match (&self.get(ha).payload, &self.get(hb).payload) {
                    (Payload::Str(x), Payload::Str(y)) => x == y,
                    (Payload::List(x), Payload::List(y)) => {
                        x.len() == y.len()
                            && x.iter().zip(y.iter()).all(|(u, v)| self.equal(u, v))
                    }
                    (Payload::Table(x), Payload::Table(y)) => {
                        x.len() == y.len()
                            && x.iter().all(|(k, v)| {
                                y.get(k).is_some_and(|w| self.equal(v, w))
                            })
                    }
                    (Payload::Set(x), Payload::Set(y)) => {
                        x.len() == y.len() && x.iter().all(|k| y.contains(k))
                    }
                    (Payload::Array(x), Payload::Array(y)) => x == y,
                    (
                        Payload::ClassRef { id: x, .. },
                        Payload::ClassRef { id: y, .. },
                    ) => x == y,
                    _ => false,
                }
            }
            _ => false,
        }
    }

    /// Three-way comparison for numbers and strings.
    pub fn compare(&self, a: &Variant, b: &Variant) -> Result<Ordering, String> {
        let a = self.deref(*a);
        let b = self.deref(*b);
        if let (Some(x), Some(y)) = (a.as_float(), b.as_float()) {
            return Ok(x.partial_cmp(&y).unwrap_or(Ordering::Equal));
        }
        if let (Variant::Ref(ha), Variant::Ref(hb)) = (a, b) {
            if let (Payload::Str(x), Payload::Str(y)) =
                (&self.get(ha).payload, &self.get(hb).payload)
            {
                return Ok(x.cmp(y));
            }
        }
        Err(format!(
            "[Type error] Cannot compare {} and {}",
            self.type_name(&a),
            self.type_name(&b)
        ))
    }

    pub fn type_name(&self, v: &Variant) -> &'static str {
        match self.deref(*v) {
            Variant::Null => "Null",
            Variant::Boolean(_) => "Boolean",
            Variant::Integer(_) => "Integer",
            Variant::Float(_) => "Float",
            Variant::Ref(h) => match &self.get(h).payload {
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
            },
            Variant::Alias(_) => "Reference",
        }
    }

    /// Render a value for `print` and string conversion. Strings at top
    /// level are unquoted; strings inside containers are quoted.
    pub fn stringify(&self, v: &Variant) -> String {
        let mut seen = Vec::new();
        self.stringify_inner(v, false, &mut seen)
    }

    fn stringify_inner(&self, v: &Variant, quoted: bool, seen: &mut Vec<Handle>) -> String {
        let v = self.deref(*v);
        match v {
            Variant::Ref(h) => {
                if seen.contains(&h) {
                    return "...".to_string();
                }
                match &self.get(h).payload {
                    Payload::Str(s) => {
                        if quoted {
                            format!("\"{s}\"")
                        } else {
                            s.clone()
                        }
                    }
                    Payload::Regex(r) => r.pattern.clone(),
                    Payload::File(f) => format!("<File {}>", f.path),
                    Payload::Array(a) => a.to_string(),
                    Payload::List(items) => {
                        seen.push(h);
                        let body: Vec<String> = items
                            .iter()
                            .map(|x| self.stringify_inner(x, true, seen))
                            .collect();
                        seen.pop();
                        format!("[{}]", body.join(", "))
                    }
                    Payload::Table(map) => {
                        seen.push(h);
                        let body: Vec<String> = map
                            .iter()
                            .map(|(k, x)| {
                                format!("{}: {}", k, self.stringify_inner(x, true, seen))
                            })
                            .collect();
                        seen.pop();
                        format!("{{{}}}", body.join(", "))
                    }
                    Payload::Set(set) => {
                        let body: Vec<String> =
                            set.iter().map(|k| k.to_string()).collect();
                        format!("{{{}}}", body.join(", "))
                    }
                    Payload::Function(f) => format!("<function {}>", f.name),
                    Payload::Bound { func, .. } => self.stringify_inner(func, quoted, seen),
                    Payload::Alias(_) => "<reference>".to_string(),
                    Payload::Iter(_) => "<iterator>".to_string(),
                    Payload::ClassRef { name, .. } => format!("<class {name}>"),
                }
            }
            other => other.to_string(),
        }
    }

    /// Deep copy for clonable types.
    pub fn deep_clone(&mut self, v: &Variant) -> Result<Variant, String> {
        let v = self.deref(*v);
        match v {
            Variant::Ref(h) => match &self.get(h).payload {
                Payload::Str(s) => {
                    let s = s.clone();
                    Ok(self.new_string(s))
                }
                Payload::Array(a) => {
                    let a = a.clone();
                    Ok(self.new_array(a))
                }
                Payload::Set(s) => {
                    let s = s.clone();
                    Ok(Variant::Ref(self.alloc(Payload::Set(s))))
                }
                Payload::List(items) => {
                    let items = items.clone();
                    let mut out = Vec::with_capacity(items.len());
                    for item in items {
                        out.push(self.deep_clone(&item)?);
                    }
                    Ok(self.new_list(out))
                }
                Payload::Table(map) => {
                    let pairs: Vec<(Key, Variant)> =
                        map.iter().map(|(k, v)| (k.clone(), *v)).collect();
                    let mut out = IndexMap::with_capacity(pairs.len());
                    for (k, v) in pairs {
                        out.insert(k, self.deep_clone(&v)?);
                    }
                    Ok(Variant::Ref(self.alloc(Payload::Table(out))))
                }
                _ => Err(format!(
                    "[Type error] Cannot copy value of type {}",
                    self.type_name(&v)
                )),
            },
            scalar => Ok(scalar),
        }
    }
}
