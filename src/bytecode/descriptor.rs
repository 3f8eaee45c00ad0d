// This module parses field and method descriptor strings using the standard grammar: single
// letters for primitives (B C D F I J S Z, and V for a void return), `L<class>;` for references and
// `[` prefixes for arrays, which are references as far as the backend is concerned. The parsed
// MethodDescriptor gives the HIR builder the argument count an invocation pops, the argument types
// that seed formal-parameter slots (long and double take two slots) and the return type that decides
// whether an invocation pushes a result. ValueType is also the type tag carried by every HIR node.

//! Field and method descriptor parsing.

use crate::core::error::{CompileError, CompileResult};
use std::fmt;

/// Value type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    Void,
    Boolean,
    Byte,
    Char,
    Short,
    Int,
    Long,
    Float,
    Double,
    Reference,
}

impl ValueType {
    /// Single-letter tag.
    pub fn short_tag(self) -> char {
        match self {
            ValueType::Void => 'V',
            ValueType::Boolean => 'Z',
            ValueType::Byte => 'B',
            ValueType::Char => 'C',
            ValueType::Short => 'S',
            ValueType::Int => 'I',
            ValueType::Long => 'J',
            ValueType::Float => 'F',
            ValueType::Double => 'D',
            ValueType::Reference => 'L',
        }
    }

    /// Readable type name.
    pub fn long_tag(self) -> &'static str {
        match self {
            ValueType::Void => "void",
            ValueType::Boolean => "boolean",
            ValueType::Byte => "byte",
            ValueType::Char => "char",
            ValueType::Short => "short",
            ValueType::Int => "int",
            ValueType::Long => "long",
            ValueType::Float => "float",
            ValueType::Double => "double",
            ValueType::Reference => "reference",
        }
    }

    /// Local-variable slots a value of this type occupies.
    pub fn slot_size(self) -> u16 {
        match self {
            ValueType::Void => 0,
            ValueType::Long | ValueType::Double => 2,
            _ => 1,
        }
    }

    /// Type of a value on the operand stack; sub-int primitives widen to int.
    pub fn stack_type(self) -> ValueType {
        match self {
            ValueType::Boolean | ValueType::Byte | ValueType::Char | ValueType::Short => {
                ValueType::Int
            }
            other => other,
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.long_tag())
    }
}

/// Parsed method descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodDescriptor {
    pub params: Vec<ValueType>,
    pub ret: ValueType,
}

impl MethodDescriptor {
    /// Parse a descriptor such as `(ILjava/lang/String;[I)V`.
    pub fn parse(descriptor: &str) -> CompileResult<Self> {
        let invalid = |reason: &str| CompileError::InvalidDescriptor {
            descriptor: descriptor.to_string(),
            reason: reason.to_string(),
        };

        let bytes = descriptor.as_bytes();
        if bytes.first() != Some(&b'(') {
            return Err(invalid("missing '('"));
        }

        let mut pos = 1;
        let mut params = Vec::new();
        loop {
            match bytes.get(pos) {
                Some(b')') => {
                    pos += 1;
                    break;
                }
                Some(_) => {
                    let (ty, next) = parse_field_type(bytes, pos).ok_or_else(|| invalid("bad parameter type"))?;
                    params.push(ty);
                    pos = next;
                }
                None => return Err(invalid("missing ')'")),
            }
        }

        let ret = if bytes.get(pos) == Some(&b'V') && pos + 1 == bytes.len() {
            ValueType::Void
        } else {
            match parse_field_type(bytes, pos) {
                Some((ty, next)) if next == bytes.len() => ty,
                _ => return Err(invalid("bad return type")),
            }
        };

        Ok(Self { params, ret })
    }

    /// Number of arguments an invocation pops, not counting a receiver.
    pub fn arg_count(&self) -> usize {
        self.params.len()
    }

    pub fn returns_value(&self) -> bool {
        self.ret != ValueType::Void
    }

    /// Local-variable slots occupied by the parameters.
    pub fn param_slots(&self) -> u16 {
        self.params.iter().map(|ty| ty.slot_size()).sum()
    }
}

/// Parse a field descriptor.
pub fn parse_field_descriptor(descriptor: &str) -> CompileResult<ValueType> {
    match parse_field_type(descriptor.as_bytes(), 0) {
        Some((ty, next)) if next == descriptor.len() => Ok(ty),
        _ => Err(CompileError::InvalidDescriptor {
            descriptor: descriptor.to_string(),
            reason: "bad field type".to_string(),
        }),
    }
}

/// Parse one field type at `pos`, returning the type and the position after it.
fn parse_field_type(bytes: &[u8], pos: usize) -> Option<(ValueType, usize)> {
    let ty = match *bytes.get(pos)? {
        b'Z' => ValueType::Boolean,
        b'B' => ValueType::Byte,
        b'C' => ValueType::Char,
        b'S' => ValueType::Short,
        b'I' => ValueType::Int,
        b'J' => ValueType::Long,
        b'F' => ValueType::Float,
        b'D' => ValueType::Double,
        b'L' => {
            let end = bytes[pos..].iter().position(|&b| b == b';')?;
            if end < 2 {
                return None;
            }
            return Some((ValueType::Reference, pos + end + 1));
        }
        b'[' => {
            let (_, next) = parse_field_type(bytes, pos + 1)?;
            return Some((ValueType::Reference, next));
        }
        _ => return None,
    };
    Some((ty, pos + 1))
}
