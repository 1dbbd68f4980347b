//! Values and their locations.

use crate::con::Const;
use crate::entity::UserId;
use crate::op::Reg;
use crate::typ::Type;

/// Where a value lives.
///
/// Exactly one of these at any time. `Temp` means no assignment has
/// been made yet; the register allocator turns every `Temp` that needs
/// a register into a `Reg`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Loc {
    Temp,
    Const(Const),
    Reg(Reg),
    /// Incoming parameter spilled to the stack, by slot index.
    ParamSlot(u32),
    /// Outgoing call argument on the stack, by slot index.
    ArgSlot(u32),
    SpillSlot(u32),
}

/// A single SSA value.
///
/// The definer is an instruction or a block (for block parameters);
/// the use list mirrors every argument list that mentions this value,
/// one entry per occurrence.
#[derive(Debug, Clone)]
pub struct Value {
    pub typ: Type,
    pub loc: Loc,
    pub(crate) def: Option<UserId>,
    pub(crate) uses: Vec<UserId>,
}

impl Value {
    pub(crate) fn new(typ: Type) -> Self {
        Value {
            typ,
            loc: Loc::Temp,
            def: None,
            uses: Vec::new(),
        }
    }

    pub fn def(&self) -> Option<UserId> {
        self.def
    }

    pub fn uses(&self) -> &[UserId] {
        &self.uses
    }

    pub fn num_uses(&self) -> usize {
        self.uses.len()
    }

    pub fn is_const(&self) -> bool {
        matches!(self.loc, Loc::Const(_))
    }

    pub fn constant(&self) -> Option<&Const> {
        match &self.loc {
            Loc::Const(c) => Some(c),
            _ => None,
        }
    }

    pub fn in_reg(&self) -> bool {
        matches!(self.loc, Loc::Reg(_))
    }

    pub fn reg(&self) -> Option<Reg> {
        match self.loc {
            Loc::Reg(r) => Some(r),
            _ => None,
        }
    }

    /// Whether the register allocator must assign this value a
    /// register. Constants and stack-slot values are already placed.
    pub fn needs_reg(&self) -> bool {
        matches!(self.loc, Loc::Temp | Loc::Reg(_))
    }

    pub fn set_reg(&mut self, reg: Reg) {
        self.loc = Loc::Reg(reg);
    }

    pub fn set_arg_slot(&mut self, slot: u32) {
        self.loc = Loc::ArgSlot(slot);
    }

    pub fn set_param_slot(&mut self, slot: u32) {
        self.loc = Loc::ParamSlot(slot);
    }

    pub(crate) fn add_use(&mut self, user: UserId) {
        self.uses.push(user);
    }

    pub(crate) fn remove_use(&mut self, user: UserId) {
        let index = self
            .uses
            .iter()
            .position(|u| *u == user)
            .unwrap_or_else(|| panic!("value does not have use {}", user));
        self.uses.remove(index);
    }
}
