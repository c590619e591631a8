//! Lexical bindings.
//!
//! A scope is an immutable frame of names chained to its parent. Entering a
//! scope never mutates the outer one; `extend` returns a new handle and the
//! outer handle keeps seeing the old names.

use indexmap::IndexMap;
use std::sync::Arc;

use crate::node::Node;

/// A bound value.
#[derive(Debug, Clone, PartialEq)]
pub enum Bound {
    /// Imported node, evaluated on reference in the scope that imported it.
    Raw(Node, Bindings),
    /// Already evaluated value (literals, loop variables, `!$let`, template parameters).
    Value(Node),
}

impl Bound {
    pub fn node(&self) -> &Node {
        match self {
            Bound::Raw(n, _) | Bound::Value(n) => n,
        }
    }
}

#[derive(Debug)]
struct Frame {
    vars: IndexMap<String, Bound>,
    parent: Bindings,
}

#[derive(Debug, Clone, Default)]
pub struct Bindings(Option<Arc<Frame>>);

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return a child scope holding `vars` on top of this one.
    pub fn extend<I>(&self, vars: I) -> Self
    where
        I: IntoIterator<Item = (String, Bound)>,
    {
        let vars: IndexMap<String, Bound> = vars.into_iter().collect();
        if vars.is_empty() {
            return self.clone();
        }
        Self(Some(Arc::new(Frame {
            vars,
            parent: self.clone(),
        })))
    }

    /// Look up a name, innermost scope first.
    pub fn get(&self, name: &str) -> Option<&Bound> {
        let mut current = &self.0;
        while let Some(frame) = current {
            if let Some(bound) = frame.vars.get(name) {
                return Some(bound);
            }
            current = &frame.parent.0;
        }
        None
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_none()
    }
}

impl PartialEq for Bindings {
    fn eq(&self, other: &Self) -> bool {
        match (&self.0, &other.0) {
            (None, None) => true,
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn value(s: &str) -> Bound {
        Bound::Value(Node::string(s))
    }

    #[test]
    fn test_inner_scope_shadows_outer() {
        let outer = Bindings::new().extend([("a".to_string(), value("outer"))]);
        let inner = outer.extend([("a".to_string(), value("inner"))]);

        assert_eq!(inner.get("a"), Some(&value("inner")));
        assert_eq!(outer.get("a"), Some(&value("outer")));
    }

    #[test]
    fn test_extend_does_not_leak_into_parent() {
        let outer = Bindings::new().extend([("a".to_string(), value("1"))]);
        let inner = outer.extend([("b".to_string(), value("2"))]);

        assert!(inner.contains("a"));
        assert!(inner.contains("b"));
        assert!(!outer.contains("b"));
    }

    #[test]
    fn test_empty_extend_reuses_scope() {
        let outer = Bindings::new().extend([("a".to_string(), value("1"))]);
        assert_eq!(outer.extend(std::iter::empty()), outer);
    }
}
