//! Error classes and the registry used to resolve them by name.
//!
//! Rollback rules match on an error's *class*: a named node in a single
//! inheritance hierarchy declared with statics.
//!
//! ```
//! use globaltx::rollback::{Classify, ErrorClass};
//!
//! static IO_ERROR: ErrorClass = ErrorClass::root("IoError");
//! static FILE_NOT_FOUND: ErrorClass = ErrorClass::extends("FileNotFound", &IO_ERROR);
//!
//! assert!(FILE_NOT_FOUND.is_subclass_of(&IO_ERROR));
//! ```

use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};

/// A node in the error class hierarchy.
///
/// Classes are identified by name: two classes with the same name are the
/// same class.
#[derive(Debug)]
pub struct ErrorClass {
    name: &'static str,
    parent: Option<&'static ErrorClass>,
}

impl ErrorClass {
    /// Declare a class with no parent.
    pub const fn root(name: &'static str) -> Self {
        Self { name, parent: None }
    }

    /// Declare a class deriving from `parent`.
    pub const fn extends(name: &'static str, parent: &'static ErrorClass) -> Self {
        Self {
            name,
            parent: Some(parent),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn parent(&self) -> Option<&'static ErrorClass> {
        self.parent
    }

    /// Iterate from this class up to its root, most specific first.
    pub fn ancestry(&'static self) -> Ancestry {
        Ancestry { next: Some(self) }
    }

    /// Whether `self` is `other` or derives from it.
    pub fn is_subclass_of(&self, other: &ErrorClass) -> bool {
        if self == other {
            return true;
        }
        let mut current = self.parent;
        while let Some(class) = current {
            if class == other {
                return true;
            }
            current = class.parent;
        }
        false
    }
}

impl PartialEq for ErrorClass {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for ErrorClass {}

impl Hash for ErrorClass {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Iterator over a class and its ancestors.
#[derive(Debug, Clone)]
pub struct Ancestry {
    next: Option<&'static ErrorClass>,
}

impl Iterator for Ancestry {
    type Item = &'static ErrorClass;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;
        self.next = current.parent;
        Some(current)
    }
}

/// Errors that can report their class to the rollback rule evaluator.
pub trait Classify {
    fn error_class(&self) -> &'static ErrorClass;
}

impl<T: Classify + ?Sized> Classify for Box<T> {
    fn error_class(&self) -> &'static ErrorClass {
        (**self).error_class()
    }
}

/// Name-to-class lookup for rules declared by class name.
///
/// Registering a class also registers all of its ancestors.
#[derive(Debug, Clone, Default)]
pub struct ErrorClassRegistry {
    classes: HashMap<&'static str, &'static ErrorClass>,
}

impl ErrorClassRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a class and its ancestors.
    pub fn register(&mut self, class: &'static ErrorClass) -> &mut Self {
        for c in class.ancestry() {
            self.classes.insert(c.name, c);
        }
        self
    }

    /// Builder form of [`register`](Self::register).
    pub fn with(mut self, class: &'static ErrorClass) -> Self {
        self.register(class);
        self
    }

    /// Look up a class by its name.
    pub fn resolve(&self, name: &str) -> Option<&'static ErrorClass> {
        self.classes.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.classes.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}
