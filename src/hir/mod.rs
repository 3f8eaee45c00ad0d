//! High-level IR.
//!
//! One [`HirNode`] per value or effect, in SSA-like form: the operand stack is
//! gone and every operand names the node that defines it. Nodes live in the
//! graph's arena and are addressed by [`HirId`]; merge nodes removed by the phi
//! optimizer stay in the arena behind an alias.

pub mod builder;
pub mod phi;

use crate::bytecode::constant_pool::MemberRef;
use crate::bytecode::descriptor::ValueType;
use crate::bytecode::opcodes;
use crate::cfg::BlockId;
use std::fmt;

pub use builder::HirBuilder;
pub use phi::{PhiOptimizer, PhiSummary};

/// HIR node identifier; strictly increasing within a method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HirId(pub u32);

impl fmt::Display for HirId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "h{}", self.0)
    }
}

/// Frame slot a merge node stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameSlot {
    Local(u16),
    Stack(u16),
}

impl fmt::Display for FrameSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameSlot::Local(index) => write!(f, "local {}", index),
            FrameSlot::Stack(depth) => write!(f, "stack {}", depth),
        }
    }
}

/// Integer arithmetic operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Shl,
    Shr,
    UShr,
    And,
    Or,
    Xor,
}

impl ArithOp {
    /// Operation of a binary arithmetic opcode.
    pub fn from_opcode(opcode: u8) -> Option<Self> {
        Some(match opcode {
            opcodes::IADD => ArithOp::Add,
            opcodes::ISUB => ArithOp::Sub,
            opcodes::IMUL => ArithOp::Mul,
            opcodes::IDIV => ArithOp::Div,
            opcodes::IREM => ArithOp::Rem,
            opcodes::ISHL => ArithOp::Shl,
            opcodes::ISHR => ArithOp::Shr,
            opcodes::IUSHR => ArithOp::UShr,
            opcodes::IAND => ArithOp::And,
            opcodes::IOR => ArithOp::Or,
            opcodes::IXOR => ArithOp::Xor,
            _ => return None,
        })
    }

    pub fn mnemonic(self) -> &'static str {
        match self {
            ArithOp::Add => "add",
            ArithOp::Sub => "sub",
            ArithOp::Mul => "mul",
            ArithOp::Div => "div",
            ArithOp::Rem => "rem",
            ArithOp::Shl => "shl",
            ArithOp::Shr => "shr",
            ArithOp::UShr => "ushr",
            ArithOp::And => "and",
            ArithOp::Or => "or",
            ArithOp::Xor => "xor",
        }
    }
}

/// Branch condition, comparing the left operand against the right.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Condition {
    Eq,
    Ne,
    Lt,
    Ge,
    Gt,
    Le,
}

impl Condition {
    /// Condition of a conditional-branch opcode.
    pub fn from_opcode(opcode: u8) -> Option<Self> {
        use opcodes::*;
        Some(match opcode {
            IFEQ | IF_ICMPEQ | IF_ACMPEQ | IFNULL => Condition::Eq,
            IFNE | IF_ICMPNE | IF_ACMPNE | IFNONNULL => Condition::Ne,
            IFLT | IF_ICMPLT => Condition::Lt,
            IFGE | IF_ICMPGE => Condition::Ge,
            IFGT | IF_ICMPGT => Condition::Gt,
            IFLE | IF_ICMPLE => Condition::Le,
            _ => return None,
        })
    }

    pub fn mnemonic(self) -> &'static str {
        match self {
            Condition::Eq => "eq",
            Condition::Ne => "ne",
            Condition::Lt => "lt",
            Condition::Ge => "ge",
            Condition::Gt => "gt",
            Condition::Le => "le",
        }
    }
}

/// Invocation flavour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvokeKind {
    Static,
    /// Receiver is the first argument.
    Special,
}

/// Node payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HirKind<'a> {
    /// Formal parameter; the receiver of an instance method is index 0.
    Param { index: u16 },
    /// Placeholder for a local slot read before any store.
    Undefined { slot: u16 },
    IntConstant(i32),
    NullConstant,
    StringConstant(&'a str),
    Arithmetic {
        op: ArithOp,
        /// Opcode the node was translated from.
        opcode: u8,
        lhs: HirId,
        rhs: HirId,
    },
    Negate { value: HirId },
    GetStatic { field: MemberRef<'a> },
    PutStatic { field: MemberRef<'a>, value: HirId },
    Invoke {
        kind: InvokeKind,
        method: MemberRef<'a>,
        args: Vec<HirId>,
    },
    /// Load from `base + offset`, both already computed.
    ArrayLoad { base: HirId, offset: HirId },
    ArrayStore { base: HirId, offset: HirId, value: HirId },
    ConditionalJump {
        condition: Condition,
        lhs: HirId,
        rhs: HirId,
        taken: BlockId,
        fallthrough: BlockId,
    },
    Goto { target: BlockId },
    Switch {
        value: HirId,
        default: BlockId,
        cases: Vec<(i32, BlockId)>,
    },
    Return { value: Option<HirId> },
    Throw { value: HirId },
    /// Merge node; one argument per predecessor, in predecessor order.
    Phi { slot: FrameSlot, args: Vec<HirId> },
}

impl HirKind<'_> {
    /// Short kind name used in listings and statistics.
    pub fn name(&self) -> &'static str {
        match self {
            HirKind::Param { .. } => "param",
            HirKind::Undefined { .. } => "undefined",
            HirKind::IntConstant(_) => "const",
            HirKind::NullConstant => "null",
            HirKind::StringConstant(_) => "string",
            HirKind::Arithmetic { .. } => "arith",
            HirKind::Negate { .. } => "neg",
            HirKind::GetStatic { .. } => "getstatic",
            HirKind::PutStatic { .. } => "putstatic",
            HirKind::Invoke { .. } => "invoke",
            HirKind::ArrayLoad { .. } => "aload",
            HirKind::ArrayStore { .. } => "astore",
            HirKind::ConditionalJump { .. } => "if",
            HirKind::Goto { .. } => "goto",
            HirKind::Switch { .. } => "switch",
            HirKind::Return { .. } => "return",
            HirKind::Throw { .. } => "throw",
            HirKind::Phi { .. } => "phi",
        }
    }
}

/// A HIR node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HirNode<'a> {
    pub id: HirId,
    /// Block the node was emitted into.
    pub block: BlockId,
    /// Result type; `Void` for effects and control.
    pub ty: ValueType,
    pub kind: HirKind<'a>,
}

impl<'a> HirNode<'a> {
    /// Single-letter type tag.
    pub fn short_tag(&self) -> char {
        self.ty.short_tag()
    }

    /// Readable type tag.
    pub fn long_tag(&self) -> &'static str {
        self.ty.long_tag()
    }

    /// Whether lowering gives the node a result register.
    pub fn produces_value(&self) -> bool {
        match self.kind {
            HirKind::Undefined { .. } | HirKind::Phi { .. } => true,
            _ => self.ty != ValueType::Void,
        }
    }

    pub fn is_phi(&self) -> bool {
        matches!(self.kind, HirKind::Phi { .. })
    }

    /// Whether the node ends its block.
    pub fn is_control(&self) -> bool {
        matches!(
            self.kind,
            HirKind::ConditionalJump { .. }
                | HirKind::Goto { .. }
                | HirKind::Switch { .. }
                | HirKind::Return { .. }
                | HirKind::Throw { .. }
        )
    }

    /// Value operands in evaluation order. Merge arguments are included.
    pub fn operands(&self) -> Vec<HirId> {
        match &self.kind {
            HirKind::Param { .. }
            | HirKind::Undefined { .. }
            | HirKind::IntConstant(_)
            | HirKind::NullConstant
            | HirKind::StringConstant(_)
            | HirKind::GetStatic { .. }
            | HirKind::Goto { .. } => Vec::new(),
            HirKind::Arithmetic { lhs, rhs, .. } | HirKind::ConditionalJump { lhs, rhs, .. } => {
                vec![*lhs, *rhs]
            }
            HirKind::Negate { value }
            | HirKind::PutStatic { value, .. }
            | HirKind::Switch { value, .. }
            | HirKind::Throw { value } => vec![*value],
            HirKind::Invoke { args, .. } | HirKind::Phi { args, .. } => args.clone(),
            HirKind::ArrayLoad { base, offset } => vec![*base, *offset],
            HirKind::ArrayStore { base, offset, value } => vec![*base, *offset, *value],
            HirKind::Return { value } => value.iter().copied().collect(),
        }
    }
}

fn join(ids: &[HirId]) -> String {
    ids.iter().map(|id| id.to_string()).collect::<Vec<_>>().join(", ")
}

impl fmt::Display for HirNode<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.produces_value() {
            write!(f, "{} = ", self.id)?;
        } else {
            write!(f, "{}: ", self.id)?;
        }

        let tag = self.short_tag();
        match &self.kind {
            HirKind::Param { index } => write!(f, "param.{} {}", tag, index),
            HirKind::Undefined { slot } => write!(f, "undefined local {}", slot),
            HirKind::IntConstant(value) => write!(f, "const.I {}", value),
            HirKind::NullConstant => write!(f, "const.L null"),
            HirKind::StringConstant(value) => write!(f, "const.L {:?}", value),
            HirKind::Arithmetic { op, lhs, rhs, .. } => {
                write!(f, "{}.{} {}, {}", op.mnemonic(), tag, lhs, rhs)
            }
            HirKind::Negate { value } => write!(f, "neg.{} {}", tag, value),
            HirKind::GetStatic { field } => write!(f, "getstatic.{} {}", tag, field),
            HirKind::PutStatic { field, value } => write!(f, "putstatic {} {}", field, value),
            HirKind::Invoke { kind, method, args } => {
                let kind = match kind {
                    InvokeKind::Static => "invokestatic",
                    InvokeKind::Special => "invokespecial",
                };
                write!(f, "{} {}({})", kind, method, join(args))
            }
            HirKind::ArrayLoad { base, offset } => write!(f, "load.{} [{} + {}]", tag, base, offset),
            HirKind::ArrayStore { base, offset, value } => {
                write!(f, "store [{} + {}], {}", base, offset, value)
            }
            HirKind::ConditionalJump { condition, lhs, rhs, taken, fallthrough } => write!(
                f,
                "if_{} {}, {} -> {} else {}",
                condition.mnemonic(),
                lhs,
                rhs,
                taken,
                fallthrough
            ),
            HirKind::Goto { target } => write!(f, "goto {}", target),
            HirKind::Switch { value, default, cases } => {
                write!(f, "switch {} default {}", value, default)?;
                for (key, target) in cases {
                    write!(f, ", {} => {}", key, target)?;
                }
                Ok(())
            }
            HirKind::Return { value: Some(value) } => write!(f, "return {}", value),
            HirKind::Return { value: None } => write!(f, "return"),
            HirKind::Throw { value } => write!(f, "throw {}", value),
            HirKind::Phi { slot, args } => write!(f, "phi.{} [{}] ({})", tag, join(args), slot),
        }
    }
}
