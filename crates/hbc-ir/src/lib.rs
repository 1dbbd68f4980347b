//! SSA intermediate representation for the hbc compiler back-end.
//!
//! A program is a set of packages; packages hold globals, typedefs
//! and functions; functions own arenas of blocks, instructions and
//! values referenced by stable ids. Instructions may define several
//! values (calls, parallel copies), which removes the need for tuple
//! unpacking. Block parameters and block arguments stand in for phi
//! nodes.
//!
//! The mutation surface lives on [`Func`]; transformation passes walk
//! functions through [`FuncCursor`].

mod block;
mod con;
mod cursor;
mod entity;
mod error;
mod func;
mod instr;
mod op;
pub mod parse;
pub mod print;
mod program;
mod typ;
mod value;

pub use block::Block;
pub use con::{Const, ConstKind};
pub use cursor::{BlockCursor, FuncCursor};
pub use entity::{BlockId, EntityRef, InstrId, PrimaryMap, UserId, ValueId};
pub use error::IrError;
pub use func::{Func, Signature};
pub use instr::{Instr, Pos};
pub use op::{GenOp, Op, OpFlags, Reg, TargetOp, TargetOpInfo};
pub use program::{Global, Package, Program, TypeDef};
pub use typ::{Basic, Type};
pub use value::{Loc, Value};
