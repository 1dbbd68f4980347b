//! Mutating instruction cursors.
//!
//! Transformation passes walk a function through a cursor that can
//! read the current instruction, insert around it, remove it, or
//! rewrite it in place. Every mutation sets the `changed` flag; the
//! pass driver polls it for fixpoint detection.

use crate::entity::{BlockId, InstrId, ValueId};
use crate::func::Func;
use crate::op::Op;
use crate::typ::Type;

/// Cursor over every instruction in a function, in block order.
pub struct FuncCursor<'f> {
    func: &'f mut Func,
    blk_pos: usize,
    ins_idx: usize,
    changed: bool,
}

impl<'f> FuncCursor<'f> {
    pub fn new(func: &'f mut Func) -> Self {
        let mut cur = FuncCursor {
            func,
            blk_pos: 0,
            ins_idx: 0,
            changed: false,
        };
        cur.skip_empty_blocks();
        cur
    }

    fn skip_empty_blocks(&mut self) {
        while self.blk_pos < self.func.num_blocks()
            && self.ins_idx >= self.cur_block_len()
        {
            self.blk_pos += 1;
            self.ins_idx = 0;
        }
    }

    fn cur_block_len(&self) -> usize {
        self.func.block(self.func.block_at(self.blk_pos)).num_instrs()
    }

    pub fn func(&mut self) -> &mut Func {
        self.func
    }

    pub fn func_ref(&self) -> &Func {
        self.func
    }

    /// The current instruction, or `None` when exhausted.
    pub fn instr(&self) -> Option<InstrId> {
        if self.blk_pos < self.func.num_blocks() && self.ins_idx < self.cur_block_len() {
            Some(self.func.block(self.func.block_at(self.blk_pos)).instr(self.ins_idx))
        } else {
            None
        }
    }

    pub fn block(&self) -> BlockId {
        let pos = self.blk_pos.min(self.func.num_blocks().saturating_sub(1));
        self.func.block_at(pos)
    }

    pub fn instr_index(&self) -> usize {
        self.ins_idx
    }

    pub fn block_index(&self) -> usize {
        self.blk_pos
    }

    pub fn has_next(&self) -> bool {
        self.instr().is_some()
    }

    pub fn has_prev(&self) -> bool {
        self.ins_idx > 0 || self.blk_pos > 0
    }

    /// Advance to the next instruction, skipping empty blocks.
    pub fn next(&mut self) -> bool {
        if self.blk_pos >= self.func.num_blocks() {
            return false;
        }
        self.ins_idx += 1;
        self.skip_empty_blocks();
        self.instr().is_some()
    }

    pub fn prev(&mut self) -> bool {
        if self.ins_idx > 0 {
            self.ins_idx -= 1;
            return true;
        }
        while self.blk_pos > 0 {
            self.blk_pos -= 1;
            let len = self.cur_block_len();
            if len > 0 {
                self.ins_idx = len - 1;
                return true;
            }
        }
        false
    }

    /// Fast-forward to the last instruction of the function.
    pub fn last(&mut self) -> bool {
        self.blk_pos = self.func.num_blocks();
        self.ins_idx = 0;
        self.prev()
    }

    pub fn has_changed(&self) -> bool {
        self.changed
    }

    pub fn set_changed(&mut self) {
        self.changed = true;
    }

    /// Create and insert an instruction before the cursor; the cursor
    /// stays on the instruction it was on.
    pub fn insert(&mut self, op: Op, typ: Option<Type>, args: &[ValueId]) -> InstrId {
        let blk = self.func.block_at(self.blk_pos);
        let id = self.func.new_instr(op, typ, args);
        self.func.insert_instr(blk, self.ins_idx as isize, id);
        self.ins_idx += 1;
        self.changed = true;
        id
    }

    /// Create and insert an instruction after the current one without
    /// moving the cursor.
    pub fn insert_after(&mut self, op: Op, typ: Option<Type>, args: &[ValueId]) -> InstrId {
        let blk = self.func.block_at(self.blk_pos);
        let id = self.func.new_instr(op, typ, args);
        let at = (self.ins_idx + 1).min(self.cur_block_len());
        self.func.insert_instr(blk, at as isize, id);
        self.changed = true;
        id
    }

    /// Remove the current instruction. The cursor backs up so the
    /// following `next` lands on the instruction after the removed
    /// one.
    pub fn remove(&mut self) -> InstrId {
        let id = self.instr().expect("remove past the end");
        self.func.remove_instr(id);
        if self.ins_idx > 0 {
            self.ins_idx -= 1;
        }
        self.changed = true;
        id
    }

    /// Remove any instruction, adjusting the cursor when it sits in
    /// the current block before or at the cursor position.
    pub fn remove_instr(&mut self, id: InstrId) {
        let blk = self.func.block_at(self.blk_pos);
        let same_block = self.func.instr(id).block() == Some(blk);
        let idx = self.func.instr(id).index();
        self.func.remove_instr(id);
        if same_block && idx <= self.ins_idx && self.ins_idx > 0 {
            self.ins_idx -= 1;
        }
        self.changed = true;
    }

    /// Rewrite the current instruction in place.
    pub fn update(&mut self, op: Op, typ: Option<Type>, args: &[ValueId]) -> InstrId {
        let id = self.instr().expect("update past the end");
        self.func.update_instr(id, op, typ, args);
        self.changed = true;
        id
    }
}

/// Cursor confined to a single block.
pub struct BlockCursor<'f> {
    func: &'f mut Func,
    blk: BlockId,
    ins_idx: usize,
    changed: bool,
}

impl<'f> BlockCursor<'f> {
    pub fn new(func: &'f mut Func, blk: BlockId) -> Self {
        BlockCursor {
            func,
            blk,
            ins_idx: 0,
            changed: false,
        }
    }

    pub fn func(&mut self) -> &mut Func {
        self.func
    }

    pub fn block(&self) -> BlockId {
        self.blk
    }

    pub fn instr(&self) -> Option<InstrId> {
        let block = self.func.block(self.blk);
        (self.ins_idx < block.num_instrs()).then(|| block.instr(self.ins_idx))
    }

    pub fn instr_index(&self) -> usize {
        self.ins_idx
    }

    pub fn has_next(&self) -> bool {
        self.instr().is_some()
    }

    pub fn has_prev(&self) -> bool {
        self.ins_idx > 0
    }

    pub fn next(&mut self) -> bool {
        if self.ins_idx < self.func.block(self.blk).num_instrs() {
            self.ins_idx += 1;
        }
        self.instr().is_some()
    }

    pub fn prev(&mut self) -> bool {
        if self.ins_idx == 0 {
            return false;
        }
        self.ins_idx -= 1;
        true
    }

    pub fn last(&mut self) -> bool {
        let len = self.func.block(self.blk).num_instrs();
        if len == 0 {
            return false;
        }
        self.ins_idx = len - 1;
        true
    }

    pub fn has_changed(&self) -> bool {
        self.changed
    }

    pub fn set_changed(&mut self) {
        self.changed = true;
    }

    pub fn insert(&mut self, op: Op, typ: Option<Type>, args: &[ValueId]) -> InstrId {
        let id = self.func.new_instr(op, typ, args);
        self.func.insert_instr(self.blk, self.ins_idx as isize, id);
        self.ins_idx += 1;
        self.changed = true;
        id
    }

    pub fn remove(&mut self) -> InstrId {
        let id = self.instr().expect("remove past the end");
        self.func.remove_instr(id);
        if self.ins_idx > 0 {
            self.ins_idx -= 1;
        }
        self.changed = true;
        id
    }

    pub fn update(&mut self, op: Op, typ: Option<Type>, args: &[ValueId]) -> InstrId {
        let id = self.instr().expect("update past the end");
        self.func.update_instr(id, op, typ, args);
        self.changed = true;
        id
    }
}
