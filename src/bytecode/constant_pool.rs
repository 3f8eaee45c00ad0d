//! Constant-pool lookup.
//!
//! The class-file reader is an external collaborator; the backend only needs
//! resolved entries by index. [`ConstantPool`] is that seam. [`ConstantTable`]
//! is a plain in-memory implementation for callers that already hold resolved
//! entries (tests, the command line tool).

use crate::core::error::{CompileError, CompileResult};
use crate::core::session::CompilationSession;
use hashbrown::HashMap;
use std::fmt;

/// A resolved constant-pool entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoolEntry {
    Class(String),
    Field { owner: String, name: String, descriptor: String },
    Method { owner: String, name: String, descriptor: String },
    String(String),
    Integer(i32),
}

/// Resolved constant-pool access.
pub trait ConstantPool {
    /// Entry at `index`, if present.
    fn entry(&self, index: u16) -> Option<&PoolEntry>;

    /// Entry at `index`, or `MissingConstant`.
    fn lookup(&self, index: u16) -> CompileResult<&PoolEntry> {
        self.entry(index).ok_or(CompileError::MissingConstant { index })
    }
}

/// In-memory constant pool keyed by index.
#[derive(Debug, Default, Clone)]
pub struct ConstantTable {
    entries: HashMap<u16, PoolEntry>,
}

impl ConstantTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, index: u16, entry: PoolEntry) -> &mut Self {
        self.entries.insert(index, entry);
        self
    }

    pub fn field(&mut self, index: u16, owner: &str, name: &str, descriptor: &str) -> &mut Self {
        self.insert(
            index,
            PoolEntry::Field {
                owner: owner.to_string(),
                name: name.to_string(),
                descriptor: descriptor.to_string(),
            },
        )
    }

    pub fn method(&mut self, index: u16, owner: &str, name: &str, descriptor: &str) -> &mut Self {
        self.insert(
            index,
            PoolEntry::Method {
                owner: owner.to_string(),
                name: name.to_string(),
                descriptor: descriptor.to_string(),
            },
        )
    }

    pub fn string(&mut self, index: u16, value: &str) -> &mut Self {
        self.insert(index, PoolEntry::String(value.to_string()))
    }

    pub fn integer(&mut self, index: u16, value: i32) -> &mut Self {
        self.insert(index, PoolEntry::Integer(value))
    }
}

impl ConstantPool for ConstantTable {
    fn entry(&self, index: u16) -> Option<&PoolEntry> {
        self.entries.get(&index)
    }
}

/// A field or method reference with arena-interned names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MemberRef<'arena> {
    pub owner: &'arena str,
    pub name: &'arena str,
    pub descriptor: &'arena str,
}

impl<'arena> MemberRef<'arena> {
    /// Resolve a field reference and intern its names.
    pub fn field(
        pool: &dyn ConstantPool,
        session: &CompilationSession<'arena>,
        index: u16,
    ) -> CompileResult<Self> {
        match pool.lookup(index)? {
            PoolEntry::Field { owner, name, descriptor } => Ok(Self::intern(session, owner, name, descriptor)),
            _ => Err(CompileError::UnexpectedConstant { index, expected: "field reference" }),
        }
    }

    /// Resolve a method reference and intern its names.
    pub fn method(
        pool: &dyn ConstantPool,
        session: &CompilationSession<'arena>,
        index: u16,
    ) -> CompileResult<Self> {
        match pool.lookup(index)? {
            PoolEntry::Method { owner, name, descriptor } => Ok(Self::intern(session, owner, name, descriptor)),
            _ => Err(CompileError::UnexpectedConstant { index, expected: "method reference" }),
        }
    }

    fn intern(session: &CompilationSession<'arena>, owner: &str, name: &str, descriptor: &str) -> Self {
        Self {
            owner: session.intern_str(owner),
            name: session.intern_str(name),
            descriptor: session.intern_str(descriptor),
        }
    }
}

impl fmt::Display for MemberRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}:{}", self.owner, self.name, self.descriptor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bumpalo::Bump;

    #[test]
    fn test_member_resolution() {
        let arena = Bump::new();
        let session = CompilationSession::new(&arena);
        let mut pool = ConstantTable::new();
        pool.field(3, "Main", "counter", "I").method(4, "Main", "run", "()V").integer(5, 9);

        let field = MemberRef::field(&pool, &session, 3).unwrap();
        assert_eq!(field.to_string(), "Main.counter:I");

        let method = MemberRef::method(&pool, &session, 4).unwrap();
        assert_eq!(method.name, "run");
        assert_eq!(field.owner.as_ptr(), method.owner.as_ptr());

        assert_eq!(
            MemberRef::method(&pool, &session, 5).unwrap_err(),
            CompileError::UnexpectedConstant { index: 5, expected: "method reference" }
        );
        assert_eq!(
            MemberRef::field(&pool, &session, 6).unwrap_err(),
            CompileError::MissingConstant { index: 6 }
        );
    }
}
