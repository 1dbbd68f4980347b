//! Opcodes.
//!
//! Instructions carry either a generic opcode or a target opcode.
//! Both expose the same capability surface (`is_call`, `is_copy`,
//! `is_sink`, ...) so passes and the register allocator never need to
//! know which kind they are looking at.

use core::fmt;
use core::hash::{Hash, Hasher};

use bitflags::bitflags;
use strum::{Display, EnumString};

bitflags! {
    /// Capability flags shared by generic and target opcodes.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct OpFlags: u16 {
        const SINK = 1 << 0;
        const COMPARE = 1 << 1;
        const CONST = 1 << 2;
        const COPY = 1 << 3;
        const COMMUTATIVE = 1 << 4;
        const BRANCH = 1 << 5;
        const CLOBBERS = 1 << 6;
        const CALL = 1 << 7;
    }
}

/// Generic (target-independent) opcodes. A closed enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum GenOp {
    Const,
    Copy,
    Call,
    Reg,
    Func,
    Global,

    Add,
    Sub,
    Mul,
    Div,
    Rem,
    And,
    Or,
    Xor,
    ShiftLeft,
    ShiftRight,
    AndNot,
    Not,
    Negate,

    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,

    Load,
    Store,
    Field,
    FieldAddr,
    Index,
    IndexAddr,

    Jump,
    If,
    Return,
    Panic,
}

impl GenOp {
    pub fn flags(self) -> OpFlags {
        use GenOp::*;
        match self {
            Const | Func | Global => OpFlags::CONST,
            Copy | Reg => OpFlags::COPY,
            Call => OpFlags::CALL,
            Add | Mul | And | Or | Xor => OpFlags::COMMUTATIVE,
            Equal | NotEqual => OpFlags::COMPARE | OpFlags::COMMUTATIVE,
            Less | LessEqual | Greater | GreaterEqual => OpFlags::COMPARE,
            Store | Panic => OpFlags::SINK,
            Jump | If | Return => OpFlags::SINK | OpFlags::BRANCH,
            _ => OpFlags::empty(),
        }
    }

    /// The comparison computing the negated condition, for branch
    /// direction swaps. Non-compares are returned unchanged.
    pub fn opposite(self) -> GenOp {
        match self {
            GenOp::Equal => GenOp::NotEqual,
            GenOp::NotEqual => GenOp::Equal,
            GenOp::Less => GenOp::GreaterEqual,
            GenOp::LessEqual => GenOp::Greater,
            GenOp::Greater => GenOp::LessEqual,
            GenOp::GreaterEqual => GenOp::Less,
            other => other,
        }
    }
}

/// The capability surface a target opcode must provide.
///
/// Target crates implement this on their opcode enums and hand out
/// `'static` references from a constant table, so `Op` stays `Copy`.
pub trait TargetOpInfo: fmt::Debug + Sync {
    /// snake_case mnemonic, also used by the textual IR.
    fn name(&self) -> &'static str;

    fn flags(&self) -> OpFlags;

    /// The branch with the negated condition, if there is one.
    fn opposite(&self) -> Option<TargetOp> {
        None
    }
}

/// A target opcode: a pinned reference into the target's op table.
#[derive(Debug, Clone, Copy)]
pub struct TargetOp(pub &'static dyn TargetOpInfo);

impl PartialEq for TargetOp {
    fn eq(&self, other: &Self) -> bool {
        core::ptr::eq(
            self.0 as *const dyn TargetOpInfo as *const (),
            other.0 as *const dyn TargetOpInfo as *const (),
        )
    }
}

impl Eq for TargetOp {}

impl Hash for TargetOp {
    fn hash<H: Hasher>(&self, state: &mut H) {
        (self.0 as *const dyn TargetOpInfo as *const () as usize).hash(state);
    }
}

impl fmt::Display for TargetOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0.name())
    }
}

/// An instruction opcode, generic or target-specific.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Gen(GenOp),
    Target(TargetOp),
}

impl Op {
    pub fn flags(self) -> OpFlags {
        match self {
            Op::Gen(op) => op.flags(),
            Op::Target(op) => op.0.flags(),
        }
    }

    pub fn is_call(self) -> bool {
        self.flags().contains(OpFlags::CALL)
    }

    pub fn is_compare(self) -> bool {
        self.flags().contains(OpFlags::COMPARE)
    }

    pub fn is_copy(self) -> bool {
        self.flags().contains(OpFlags::COPY)
    }

    pub fn is_sink(self) -> bool {
        self.flags().contains(OpFlags::SINK)
    }

    pub fn is_const(self) -> bool {
        self.flags().contains(OpFlags::CONST)
    }

    pub fn is_commutative(self) -> bool {
        self.flags().contains(OpFlags::COMMUTATIVE)
    }

    pub fn is_branch(self) -> bool {
        self.flags().contains(OpFlags::BRANCH)
    }

    pub fn clobbers_arg(self) -> bool {
        self.flags().contains(OpFlags::CLOBBERS)
    }

    pub fn as_gen(self) -> Option<GenOp> {
        match self {
            Op::Gen(op) => Some(op),
            Op::Target(_) => None,
        }
    }

    pub fn opposite(self) -> Option<Op> {
        match self {
            Op::Gen(op) if op.is_compare_gen() => Some(Op::Gen(op.opposite())),
            Op::Gen(_) => None,
            Op::Target(op) => op.0.opposite().map(Op::Target),
        }
    }
}

impl GenOp {
    fn is_compare_gen(self) -> bool {
        self.flags().contains(OpFlags::COMPARE)
    }
}

impl From<GenOp> for Op {
    fn from(op: GenOp) -> Self {
        Op::Gen(op)
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Op::Gen(op) => write!(f, "{}", op),
            Op::Target(op) => write!(f, "{}", op),
        }
    }
}

/// A physical register id, an index the target's register file gives
/// meaning to. Rendered with a neutral `r<N>` spelling in IR dumps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Reg(pub u16);

impl fmt::Display for Reg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::str::FromStr;

    #[test]
    fn gen_op_names_round_trip() {
        assert_eq!(GenOp::ShiftLeft.to_string(), "shift_left");
        assert_eq!(GenOp::from_str("shift_left").unwrap(), GenOp::ShiftLeft);
        assert_eq!(GenOp::from_str("index_addr").unwrap(), GenOp::IndexAddr);
        assert!(GenOp::from_str("bogus").is_err());
    }

    #[test]
    fn capability_flags() {
        assert!(Op::Gen(GenOp::Call).is_call());
        assert!(Op::Gen(GenOp::Copy).is_copy());
        assert!(Op::Gen(GenOp::Store).is_sink());
        assert!(Op::Gen(GenOp::Jump).is_branch());
        assert!(Op::Gen(GenOp::Equal).is_compare());
        assert!(Op::Gen(GenOp::Add).is_commutative());
        assert!(!Op::Gen(GenOp::Sub).is_commutative());
        assert!(Op::Gen(GenOp::Const).is_const());
    }

    #[test]
    fn opposites() {
        assert_eq!(GenOp::Less.opposite(), GenOp::GreaterEqual);
        assert_eq!(GenOp::Equal.opposite(), GenOp::NotEqual);
        assert_eq!(Op::Gen(GenOp::Greater).opposite(), Some(Op::Gen(GenOp::LessEqual)));
        assert_eq!(Op::Gen(GenOp::Add).opposite(), None);
    }

    #[derive(Debug)]
    struct FakeOp(&'static str);

    impl TargetOpInfo for FakeOp {
        fn name(&self) -> &'static str {
            self.0
        }

        fn flags(&self) -> OpFlags {
            OpFlags::COPY
        }
    }

    static FAKE_A: FakeOp = FakeOp("mov");
    static FAKE_B: FakeOp = FakeOp("mov2");

    #[test]
    fn target_op_identity() {
        let a = Op::Target(TargetOp(&FAKE_A));
        let a2 = Op::Target(TargetOp(&FAKE_A));
        let b = Op::Target(TargetOp(&FAKE_B));
        assert_eq!(a, a2);
        assert_ne!(a, b);
        assert!(a.is_copy());
        assert_eq!(a.to_string(), "mov");
    }
}
