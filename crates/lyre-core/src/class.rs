//! Class registry: every runtime value belongs to a class, and classes form
//! a single-inheritance tree rooted at `Object`.
//!
//! A class stores its full ancestor chain, so `inherits` and
//! `get_distance` are constant-time: `a` inherits from `b` iff
//! `a.bases[b.depth] == b`.

use indexmap::IndexMap;

use crate::value::Variant;

/// Index of a class in the registry.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct ClassId(pub usize);

// Builtin classes are registered in a fixed order so their ids are known
// constants.
pub const CLASS_OBJECT: ClassId = ClassId(0);
pub const CLASS_CLASS: ClassId = ClassId(1);
pub const CLASS_NULL: ClassId = ClassId(2);
pub const CLASS_BOOLEAN: ClassId = ClassId(3);
pub const CLASS_NUMBER: ClassId = ClassId(4);
pub const CLASS_INTEGER: ClassId = ClassId(5);
pub const CLASS_FLOAT: ClassId = ClassId(6);
pub const CLASS_STRING: ClassId = ClassId(7);
pub const CLASS_REGEX: ClassId = ClassId(8);
pub const CLASS_LIST: ClassId = ClassId(9);
pub const CLASS_ARRAY: ClassId = ClassId(10);
pub const CLASS_TABLE: ClassId = ClassId(11);
pub const CLASS_SET: ClassId = ClassId(12);
pub const CLASS_FILE: ClassId = ClassId(13);
pub const CLASS_FUNCTION: ClassId = ClassId(14);
pub const CLASS_ITERATOR: ClassId = ClassId(15);
pub const CLASS_MODULE: ClassId = ClassId(16);

/// Type-level capabilities, consulted before hashing, comparing or cloning
/// a value of this class.
#[derive(Clone, Copy, Debug)]
pub struct Traits {
    pub hashable: bool,
    pub comparable: bool,
    pub clonable: bool,
    /// Whether instances may own references to other heap objects, and
    /// therefore participate in cycle detection.
    pub collectable: bool,
}

impl Traits {
    pub const fn scalar() -> Self {
        Traits {
            hashable: true,
            comparable: true,
            clonable: true,
            collectable: false,
        }
    }

    pub const fn container() -> Self {
        Traits {
            hashable: false,
            comparable: false,
            clonable: true,
            collectable: true,
        }
    }
}

pub struct Class {
    pub name: String,
    /// Ancestor chain from `Object` down to this class (inclusive).
    bases: Vec<ClassId>,
    pub traits: Traits,
    /// Methods bound to this class. The value is a `Function` object which
    /// may hold several overloads.
    pub methods: IndexMap<String, Variant>,
    /// Read-only field accessors, looked up when a method is not found.
    pub accessors: IndexMap<String, Variant>,
    /// Constructor called by `new_native_constructor`.
    pub initializer: Option<Variant>,
}

impl Class {
    /// Depth in the inheritance tree. `Object` is at depth 0.
    pub fn depth(&self) -> usize {
        self.bases.len() - 1
    }

    pub fn base(&self) -> Option<ClassId> {
        let d = self.depth();
        if d == 0 {
            None
        } else {
            Some(self.bases[d - 1])
        }
    }
}

/// The runtime's class table.
pub struct ClassRegistry {
    classes: Vec<Class>,
}

impl Default for ClassRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ClassRegistry {
    /// Create a registry pre-populated with the builtin classes.
    pub fn new() -> Self {
        let mut reg = ClassRegistry { classes: Vec::new() };
        let object = reg.add_class("Object", None, Traits::scalar());
        debug_assert_eq!(object, CLASS_OBJECT);
        reg.add_class("Class", Some(object), Traits::scalar());
        reg.add_class("Null", Some(object), Traits::scalar());
        reg.add_class("Boolean", Some(object), Traits::scalar());
        let number = reg.add_class("Number", Some(object), Traits::scalar());
        reg.add_class("Integer", Some(number), Traits::scalar());
        reg.add_class("Float", Some(number), Traits::scalar());
        reg.add_class(
            "String",
            Some(object),
            Traits {
                hashable: true,
                comparable: true,
                clonable: true,
                collectable: false,
            },
        );
        reg.add_class(
            "Regex",
            Some(object),
            Traits {
                hashable: false,
                comparable: false,
                clonable: false,
                collectable: false,
            },
        );
        reg.add_class("List", Some(object), Traits::container());
        reg.add_class(
            "Array",
            Some(object),
            Traits {
                hashable: false,
                comparable: false,
                clonable: true,
                collectable: false,
            },
        );
        reg.add_class("Table", Some(object), Traits::container());
        // Set keys are self-contained scalars, so sets cannot form cycles.
        reg.add_class(
            "Set",
            Some(object),
            Traits {
                hashable: false,
                comparable: false,
                clonable: true,
                collectable: false,
            },
        );
        reg.add_class(
            "File",
            Some(object),
            Traits {
                hashable: false,
                comparable: false,
                clonable: false,
                collectable: false,
            },
        );
        reg.add_class("Function", Some(object), {
            Traits {
                hashable: false,
                comparable: false,
                clonable: false,
                collectable: true,
            }
        });
        reg.add_class(
            "Iterator",
            Some(object),
            Traits {
                hashable: false,
                comparable: false,
                clonable: false,
                collectable: true,
            },
        );
        reg.add_class("Module", Some(object), Traits::container());
        reg
    }

    pub fn hashable(&self, id: ClassId) -> bool {
        self.get(id).traits.hashable
    }

    pub fn comparable(&self, id: ClassId) -> bool {
        self.get(id).traits.comparable
    }

    pub fn clonable(&self, id: ClassId) -> bool {
        self.get(id).traits.clonable
    }

    pub fn add_class(&mut self, name: &str, base: Option<ClassId>, traits: Traits) -> ClassId {
        let id = ClassId(self.classes.len());
        let mut bases = match base {
            Some(b) => self.classes[b.0].bases.clone(),
            None => Vec::new(),
        };
        bases.push(id);
        self.classes.push(Class {
            name: name.to_string(),
            bases,
            traits,
            methods: IndexMap::new(),
            accessors: IndexMap::new(),
            initializer: None,
        });
        id
    }

    pub fn get(&self, id: ClassId) -> &Class {
        &self.classes[id.0]
    }

    pub fn get_mut(&mut self, id: ClassId) -> &mut Class {
        &mut self.classes[id.0]
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    pub fn find(&self, name: &str) -> Option<ClassId> {
        self.classes
            .iter()
            .position(|c| c.name == name)
            .map(ClassId)
    }

    /// True if `derived` is `base` or a (transitive) subclass of it.
    pub fn inherits(&self, derived: ClassId, base: ClassId) -> bool {
        let d = &self.classes[derived.0];
        let b = &self.classes[base.0];
        b.depth() <= d.depth() && d.bases[b.depth()] == base
    }

    /// Number of inheritance steps from `derived` up to `base`, if related.
    pub fn get_distance(&self, derived: ClassId, base: ClassId) -> Option<usize> {
        if self.inherits(derived, base) {
            Some(self.classes[derived.0].depth() - self.classes[base.0].depth())
        } else {
            None
        }
    }

    /// Look up a method on `class`, walking up the inheritance chain.
    pub fn get_method(&self, class: ClassId, name: &str) -> Option<Variant> {
        let mut cur = class;
        loop {
            let c = &self.classes[cur.0];
            if let Some(v) = c.methods.get(name) {
                return Some(*v);
            }
            if let Some(v) = c.accessors.get(name) {
                return Some(*v);
            }
            cur = c.base()?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_ids_are_stable() {
        let reg = ClassRegistry::new();
        assert_eq!(reg.get(CLASS_OBJECT).name, "Object");
        assert_eq!(reg.get(CLASS_INTEGER).name, "Integer");
        assert_eq!(reg.get(CLASS_MODULE).name, "Module");
        assert_eq!(reg.len(), 17);
    }

    #[test]
    fn test_inheritance() {
        let reg = ClassRegistry::new();
        assert!(reg.inherits(CLASS_INTEGER, CLASS_NUMBER));
        assert!(reg.inherits(CLASS_INTEGER, CLASS_OBJECT));
        assert!(!reg.inherits(CLASS_NUMBER, CLASS_INTEGER));
        assert_eq!(reg.get_distance(CLASS_INTEGER, CLASS_OBJECT), Some(2));
        assert_eq!(reg.get_distance(CLASS_STRING, CLASS_NUMBER), None);
    }

    #[test]
    fn test_capability_predicates() {
        let reg = ClassRegistry::new();
        assert!(reg.hashable(CLASS_STRING));
        assert!(!reg.hashable(CLASS_LIST));
        assert!(reg.comparable(CLASS_INTEGER));
        assert!(!reg.comparable(CLASS_TABLE));
        assert!(reg.clonable(CLASS_LIST));
        assert!(!reg.clonable(CLASS_FUNCTION));
    }

    #[test]
    fn test_user_class() {
        let mut reg = ClassRegistry::new();
        let animal = reg.add_class("Animal", Some(CLASS_OBJECT), Traits::container());
        let dog = reg.add_class("Dog", Some(animal), Traits::container());
        assert!(reg.inherits(dog, animal));
        assert_eq!(reg.get_distance(dog, CLASS_OBJECT), Some(2));
        assert_eq!(reg.find("Dog"), Some(dog));
    }
}
