//! Scoped symbol table used while compiling.
//!
//! Scopes form a strict stack: each one owns its entries and a back-link to
//! the enclosing scope. Only the innermost chain is ever alive, so lookups
//! walk from the current scope outwards to the global one.

use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    Variable,
    Function,
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryKind::Variable => f.write_str("variable"),
            EntryKind::Function => f.write_str("function"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub name: String,
    pub kind: EntryKind,
    /// Frame-relative slot for variables, label id for functions.
    pub slot: usize,
    /// Parameter count; always 0 for variables.
    pub arity: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScopeError {
    #[error("redeclaration of {kind} '{name}'")]
    Redeclared { name: String, kind: EntryKind },
    #[error("{kind} '{name}' hasn't been declared")]
    Undeclared { name: String, kind: EntryKind },
}

#[derive(Debug, Default)]
struct Scope {
    entries: Vec<Entry>,
    parent: Option<Box<Scope>>,
}

impl Scope {
    /// Newest entry with a matching name and kind.
    fn find(&self, name: &str, kind: EntryKind) -> Option<&Entry> {
        self.entries
            .iter()
            .rev()
            .find(|e| e.kind == kind && e.name == name)
    }
}

/// The active scope chain, innermost scope first.
#[derive(Debug, Default)]
pub struct ScopeChain {
    current: Option<Box<Scope>>,
}

impl ScopeChain {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    fn depth(&self) -> usize {
        let mut depth = 0;
        let mut scope = self.current.as_deref();
        while let Some(s) = scope {
            depth += 1;
            scope = s.parent.as_deref();
        }
        depth
    }

    /// Opens an empty scope nested in the current one.
    pub fn push_scope(&mut self) {
        let parent = self.current.take();
        self.current = Some(Box::new(Scope {
            entries: Vec::new(),
            parent,
        }));
    }

    /// Closes the innermost scope and returns the entries it owned.
    ///
    /// # Panics
    ///
    /// Panics when no scope is active; every pop must pair with a push.
    pub fn pop_scope(&mut self) -> Vec<Entry> {
        let Some(scope) = self.current.take() else {
            panic!("unable to pop: no scope on the stack");
        };
        let Scope { entries, parent } = *scope;
        self.current = parent;
        entries
    }

    /// Appends an entry to the innermost scope.
    ///
    /// A name already declared with the same kind in that scope is reported as
    /// `Redeclared`, but the new entry is stored anyway and shadows the old one.
    ///
    /// # Panics
    ///
    /// Panics when no scope is active.
    pub fn declare(
        &mut self,
        name: &str,
        kind: EntryKind,
        slot: usize,
        arity: usize,
    ) -> Result<(), ScopeError> {
        let Some(scope) = self.current.as_deref_mut() else {
            panic!("unable to declare '{name}': no scope on the stack");
        };
        let redeclared = scope.find(name, kind).is_some();
        scope.entries.push(Entry {
            name: name.to_string(),
            kind,
            slot,
            arity,
        });
        if redeclared {
            return Err(ScopeError::Redeclared {
                name: name.to_string(),
                kind,
            });
        }
        Ok(())
    }

    pub fn lookup(&self, name: &str, kind: EntryKind) -> Result<&Entry, ScopeError> {
        let mut scope = self.current.as_deref();
        while let Some(s) = scope {
            if let Some(entry) = s.find(name, kind) {
                return Ok(entry);
            }
            scope = s.parent.as_deref();
        }
        Err(ScopeError::Undeclared {
            name: name.to_string(),
            kind,
        })
    }
}
