//! Functions: the arena owner and the IR mutation surface.
//!
//! A function owns dense arenas for its blocks, instructions and
//! values; everything cross-references through stable ids. All
//! mutators maintain use-list consistency. Misuse of the structural
//! API (removing an argument that is not there, re-adding a def) is a
//! programmer error and panics; the checks that guard against
//! malformed *input* return errors instead.

use std::collections::HashMap;

use crate::block::Block;
use crate::con::Const;
use crate::entity::{BlockId, InstrId, PrimaryMap, UserId, ValueId};
use crate::error::IrError;
use crate::instr::Instr;
use crate::op::{GenOp, Op};
use crate::typ::Type;
use crate::value::{Loc, Value};

/// A function signature: parameter and result types.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Signature {
    pub params: Vec<Type>,
    pub results: Vec<Type>,
}

impl Signature {
    pub fn new(params: Vec<Type>, results: Vec<Type>) -> Self {
        Signature { params, results }
    }
}

/// A function under compilation.
#[derive(Debug, Clone)]
pub struct Func {
    pub name: String,
    pub full_name: String,
    pub sig: Signature,
    pub referenced: bool,

    block_order: Vec<BlockId>,

    blocks: PrimaryMap<BlockId, Block>,
    instrs: PrimaryMap<InstrId, Instr>,
    values: PrimaryMap<ValueId, Value>,

    consts: HashMap<Const, ValueId>,
    placeholders: HashMap<String, ValueId>,
}

impl Func {
    pub fn new(name: impl Into<String>, full_name: impl Into<String>, sig: Signature) -> Self {
        Func {
            name: name.into(),
            full_name: full_name.into(),
            sig,
            referenced: false,
            block_order: Vec::new(),
            blocks: PrimaryMap::new(),
            instrs: PrimaryMap::new(),
            values: PrimaryMap::new(),
            consts: HashMap::new(),
            placeholders: HashMap::new(),
        }
    }

    // ---- entity access ----

    pub fn value(&self, id: ValueId) -> &Value {
        &self.values[id]
    }

    pub fn value_mut(&mut self, id: ValueId) -> &mut Value {
        &mut self.values[id]
    }

    pub fn instr(&self, id: InstrId) -> &Instr {
        &self.instrs[id]
    }

    pub fn instr_mut(&mut self, id: InstrId) -> &mut Instr {
        &mut self.instrs[id]
    }

    pub fn block(&self, id: BlockId) -> &Block {
        &self.blocks[id]
    }

    pub fn block_mut(&mut self, id: BlockId) -> &mut Block {
        &mut self.blocks[id]
    }

    pub fn num_values(&self) -> usize {
        self.values.len()
    }

    pub fn value_ids(&self) -> impl Iterator<Item = ValueId> {
        self.values.keys()
    }

    /// Blocks in layout order.
    pub fn block_ids(&self) -> impl Iterator<Item = BlockId> + '_ {
        self.block_order.iter().copied()
    }

    pub fn num_blocks(&self) -> usize {
        self.block_order.len()
    }

    pub fn block_at(&self, index: usize) -> BlockId {
        self.block_order[index]
    }

    pub fn entry_block(&self) -> Option<BlockId> {
        self.block_order.first().copied()
    }

    pub fn block_index(&self, blk: BlockId) -> usize {
        self.block_order
            .iter()
            .position(|b| *b == blk)
            .unwrap_or_else(|| panic!("{} not in layout of {}", blk, self.full_name))
    }

    /// All instructions in block order, then instruction order.
    pub fn instr_ids(&self) -> impl Iterator<Item = InstrId> + '_ {
        self.block_order
            .iter()
            .flat_map(move |b| self.blocks[*b].instrs.iter().copied())
    }

    /// Defs and args of a user, whichever kind it is.
    pub fn user_defs(&self, user: UserId) -> &[ValueId] {
        match user {
            UserId::Instr(id) => &self.instrs[id].defs,
            UserId::Block(id) => &self.blocks[id].defs,
        }
    }

    pub fn user_args(&self, user: UserId) -> &[ValueId] {
        match user {
            UserId::Instr(id) => &self.instrs[id].args,
            UserId::Block(id) => &self.blocks[id].args,
        }
    }

    fn user_args_mut(&mut self, user: UserId) -> &mut Vec<ValueId> {
        match user {
            UserId::Instr(id) => &mut self.instrs[id].args,
            UserId::Block(id) => &mut self.blocks[id].args,
        }
    }

    fn user_defs_mut(&mut self, user: UserId) -> &mut Vec<ValueId> {
        match user {
            UserId::Instr(id) => &mut self.instrs[id].defs,
            UserId::Block(id) => &mut self.blocks[id].defs,
        }
    }

    // ---- creation ----

    pub fn new_value(&mut self, typ: Type) -> ValueId {
        self.values.push(Value::new(typ))
    }

    /// Create an instruction defining values per `typ` (`None` for a
    /// sink, a tuple for a multi-def) and using `args`. The
    /// instruction is not inserted into any block yet.
    pub fn new_instr(&mut self, op: Op, typ: Option<Type>, args: &[ValueId]) -> InstrId {
        let id = self.instrs.push(Instr::new(op));
        for &arg in args {
            self.insert_arg(id.into(), -1, arg);
        }
        if let Some(typ) = typ {
            for t in typ.flatten() {
                let val = self.new_value(t);
                self.add_def(id.into(), val);
            }
        }
        id
    }

    pub fn new_block(&mut self) -> BlockId {
        self.blocks.push(Block::new())
    }

    /// Insert a block into the layout at `pos`, or append for -1.
    pub fn insert_block(&mut self, pos: isize, blk: BlockId) {
        if pos < 0 || pos as usize >= self.block_order.len() {
            self.block_order.push(blk);
        } else {
            self.block_order.insert(pos as usize, blk);
        }
    }

    // ---- constants & placeholders ----

    /// The canonical deduplicated value for a constant.
    pub fn value_for(&mut self, typ: Type, con: Const) -> ValueId {
        if let Some(&id) = self.consts.get(&con) {
            return id;
        }
        let id = self.values.push(Value::new(typ));
        self.values[id].loc = Loc::Const(con.clone());
        self.consts.insert(con, id);
        id
    }

    /// A sentinel value standing in for a forward reference while
    /// parsing. Its location carries the label.
    pub fn placeholder_for(&mut self, label: &str) -> ValueId {
        if let Some(&id) = self.placeholders.get(label) {
            return id;
        }
        let id = self.values.push(Value::new(Type::UNTYPED_INT));
        self.values[id].loc = Loc::Const(Const::Str(label.to_string()));
        self.placeholders.insert(label.to_string(), id);
        id
    }

    /// Re-point every use of the placeholder at the resolved value and
    /// drop the sentinel.
    pub fn resolve_placeholder(&mut self, label: &str, value: ValueId) -> Result<(), IrError> {
        let ph = self
            .placeholders
            .remove(label)
            .ok_or_else(|| IrError::Invariant {
                func: self.full_name.clone(),
                detail: format!("no placeholder {label}"),
            })?;
        self.replace_uses_with(ph, value)
    }

    pub fn has_placeholders(&self) -> bool {
        !self.placeholders.is_empty()
    }

    pub fn placeholder_labels(&self) -> impl Iterator<Item = &str> {
        self.placeholders.keys().map(|s| s.as_str())
    }

    // ---- def/arg mutation ----

    /// Insert `arg` into the user's argument list at `i` (-1 appends),
    /// recording the use.
    pub fn insert_arg(&mut self, user: UserId, i: isize, arg: ValueId) {
        self.values[arg].add_use(user);
        let args = self.user_args_mut(user);
        if i < 0 || i as usize >= args.len() {
            args.push(arg);
        } else {
            args.insert(i as usize, arg);
        }
    }

    /// Replace the user's `i`th argument, appending when `i` is one
    /// past the end.
    pub fn replace_arg(&mut self, user: UserId, i: usize, arg: ValueId) {
        let args = self.user_args(user);
        if i == args.len() {
            self.insert_arg(user, i as isize, arg);
            return;
        }
        let old = args[i];
        self.values[old].remove_use(user);
        self.values[arg].add_use(user);
        self.user_args_mut(user)[i] = arg;
    }

    /// Remove one occurrence of `arg` from the user's argument list.
    pub fn remove_arg(&mut self, user: UserId, arg: ValueId) {
        let i = self
            .user_args(user)
            .iter()
            .position(|a| *a == arg)
            .unwrap_or_else(|| panic!("{} is not an arg of {}", arg, user));
        self.remove_arg_at(user, i);
    }

    /// Remove the `i`th argument. Safe with duplicated argument
    /// values, unlike [`Func::remove_arg`].
    pub fn remove_arg_at(&mut self, user: UserId, i: usize) {
        let arg = self.user_args(user)[i];
        self.values[arg].remove_use(user);
        self.user_args_mut(user).remove(i);
    }

    /// Remove the `i`th def.
    pub fn remove_def_at(&mut self, user: UserId, i: usize) {
        let def = self.user_defs(user)[i];
        self.values[def].def = None;
        self.user_defs_mut(user).remove(i);
    }

    pub fn add_def(&mut self, user: UserId, val: ValueId) -> ValueId {
        assert!(
            self.values[val].def.is_none(),
            "{} already has a definer",
            val
        );
        self.values[val].def = Some(user);
        self.user_defs_mut(user).push(val);
        val
    }

    pub fn remove_def(&mut self, user: UserId, def: ValueId) {
        let i = self
            .user_defs(user)
            .iter()
            .position(|d| *d == def)
            .unwrap_or_else(|| panic!("{} is not a def of {}", def, user));
        self.values[def].def = None;
        self.user_defs_mut(user).remove(i);
    }

    /// Rewrite an instruction in place: new opcode and arguments, and
    /// when `typ` is given, new def types. Existing def values are
    /// kept (their uses stay valid); extra def slots are created as
    /// needed.
    pub fn update_instr(&mut self, id: InstrId, op: Op, typ: Option<Type>, args: &[ValueId]) {
        self.instrs[id].op = op;
        let old_args = self.instrs[id].args.clone();
        for arg in old_args {
            self.values[arg].remove_use(id.into());
        }
        self.instrs[id].args.clear();
        for &arg in args {
            self.insert_arg(id.into(), -1, arg);
        }
        if let Some(typ) = typ {
            for (i, t) in typ.flatten().into_iter().enumerate() {
                if i < self.instrs[id].defs.len() {
                    let def = self.instrs[id].defs[i];
                    self.values[def].typ = t;
                } else {
                    let val = self.new_value(t);
                    self.add_def(id.into(), val);
                }
            }
        }
    }

    /// Walk the use list of `value` and re-point every argument at
    /// `other`. Bounded: a use list that keeps growing (self-use, or a
    /// buggy rewrite feeding the list) fails instead of spinning.
    pub fn replace_uses_with(&mut self, value: ValueId, other: ValueId) -> Result<(), IrError> {
        if value == other {
            return Ok(());
        }
        let budget = self.values[value].uses.len() * 2 + 100;
        let mut steps = 0;
        while let Some(&user) = self.values[value].uses.first() {
            steps += 1;
            if steps > budget {
                return Err(IrError::ReplaceLoop {
                    func: self.full_name.clone(),
                    value: value.to_string(),
                });
            }
            let i = self
                .user_args(user)
                .iter()
                .position(|a| *a == value)
                .ok_or_else(|| IrError::Invariant {
                    func: self.full_name.clone(),
                    detail: format!("use list of {value} names {user}, which has no such arg"),
                })?;
            self.values[value].remove_use(user);
            self.values[other].add_use(user);
            self.user_args_mut(user)[i] = other;
        }
        Ok(())
    }

    // ---- block layout & CFG mutation ----

    /// Insert an instruction into a block at `pos` (-1 appends).
    pub fn insert_instr(&mut self, blk: BlockId, pos: isize, instr: InstrId) {
        let cur = self.instrs[instr].blk;
        assert!(
            cur.is_none(),
            "remove {} from {} before reinserting",
            instr,
            cur.unwrap()
        );
        self.instrs[instr].blk = Some(blk);
        let list = &mut self.blocks[blk].instrs;
        let at = if pos < 0 || pos as usize >= list.len() {
            list.push(instr);
            list.len() - 1
        } else {
            list.insert(pos as usize, instr);
            pos as usize
        };
        self.instrs[instr].index = at;
        for j in at + 1..self.blocks[blk].instrs.len() {
            let id = self.blocks[blk].instrs[j];
            self.instrs[id].index = j;
        }
    }

    /// Remove an instruction from its block; the arena entry remains
    /// addressable.
    pub fn remove_instr(&mut self, instr: InstrId) {
        let blk = self.instrs[instr]
            .blk
            .unwrap_or_else(|| panic!("{} already removed", instr));
        let i = self.instrs[instr].index;
        self.instrs[instr].blk = None;
        self.blocks[blk].instrs.remove(i);
        for j in i..self.blocks[blk].instrs.len() {
            let id = self.blocks[blk].instrs[j];
            self.instrs[id].index = j;
        }
    }

    pub fn swap_instrs(&mut self, a: InstrId, b: InstrId) {
        let blk = self.instrs[a].blk.expect("swap of removed instr");
        assert_eq!(Some(blk), self.instrs[b].blk, "cross-block swap");
        let (i, j) = (self.instrs[a].index, self.instrs[b].index);
        self.blocks[blk].instrs.swap(i, j);
        self.instrs[a].index = j;
        self.instrs[b].index = i;
    }

    pub fn add_block_def(&mut self, blk: BlockId, val: ValueId) -> ValueId {
        self.add_def(blk.into(), val)
    }

    pub fn add_succ(&mut self, blk: BlockId, succ: BlockId) {
        self.blocks[blk].succs.push(succ);
        self.blocks[succ].preds.push(blk);
    }

    /// Swap the first two successors, along with their outgoing
    /// argument ranges.
    pub fn swap_succs(&mut self, blk: BlockId) {
        assert_eq!(self.blocks[blk].succs.len(), 2, "swap_succs needs 2 succs");
        let s0 = self.blocks[blk].succs[0];
        let s1 = self.blocks[blk].succs[1];
        let n0 = self.blocks[s0].defs.len();
        let n1 = self.blocks[s1].defs.len();
        self.blocks[blk].succs.swap(0, 1);
        let args = &mut self.blocks[blk].args;
        assert_eq!(args.len(), n0 + n1, "block args out of sync with succs");
        let mut swapped = Vec::with_capacity(args.len());
        swapped.extend_from_slice(&args[n0..]);
        swapped.extend_from_slice(&args[..n0]);
        *args = swapped;
    }

    /// Detach a single-pred, single-succ block from the CFG, linking
    /// its predecessor directly to its successor.
    pub fn unlink_block(&mut self, blk: BlockId) {
        assert_eq!(self.blocks[blk].preds.len(), 1, "unlink needs 1 pred");
        assert_eq!(self.blocks[blk].succs.len(), 1, "unlink needs 1 succ");
        let pred = self.blocks[blk].preds[0];
        let succ = self.blocks[blk].succs[0];
        for s in self.blocks[pred].succs.iter_mut() {
            if *s == blk {
                *s = succ;
            }
        }
        for p in self.blocks[succ].preds.iter_mut() {
            if *p == blk {
                *p = pred;
            }
        }
        let i = self.block_index(blk);
        self.block_order.remove(i);
    }

    /// The argument range of `blk` feeding successor index `s`.
    pub fn succ_arg_range(&self, blk: BlockId, s: usize) -> std::ops::Range<usize> {
        let block = &self.blocks[blk];
        let mut offset = 0;
        for i in 0..s {
            offset += self.blocks[block.succs[i]].defs.len();
        }
        offset..offset + self.blocks[block.succs[s]].defs.len()
    }

    // ---- validation ----

    /// Check def/use cross-linking and block-argument arity. Run at
    /// pass boundaries in tests and debug builds.
    pub fn check_invariants(&self) -> Result<(), IrError> {
        let fail = |detail: String| {
            Err(IrError::Invariant {
                func: self.full_name.clone(),
                detail,
            })
        };

        for &blk in &self.block_order {
            let block = &self.blocks[blk];
            let users: Vec<UserId> = block
                .instrs
                .iter()
                .map(|&i| UserId::Instr(i))
                .chain([UserId::Block(blk)])
                .collect();
            for user in users {
                for &def in self.user_defs(user) {
                    if self.values[def].def != Some(user) {
                        return fail(format!("{def} in defs of {user} but definer differs"));
                    }
                }
                for &arg in self.user_args(user) {
                    if !self.values[arg].uses.contains(&user) {
                        return fail(format!("{arg} used by {user} but use list disagrees"));
                    }
                }
            }

            let expected: usize = block
                .succs
                .iter()
                .map(|&s| self.blocks[s].defs.len())
                .sum();
            if block.args.len() != expected {
                return fail(format!(
                    "{blk} passes {} args but successors declare {expected} params",
                    block.args.len()
                ));
            }
        }

        for (id, value) in self.values.iter() {
            for &user in &value.uses {
                if !self.user_args(user).contains(&id) {
                    return fail(format!("{id} lists use {user} but it has no such arg"));
                }
            }
            if let Some(def) = value.def {
                if !self.user_defs(def).contains(&id) {
                    return fail(format!("{id} claims definer {def} which does not define it"));
                }
            }
        }

        Ok(())
    }

    /// Whether any block ends in a critical edge: more than one
    /// successor into a block with more than one predecessor.
    pub fn has_critical_edges(&self) -> bool {
        for &blk in &self.block_order {
            let block = &self.blocks[blk];
            if block.instrs.is_empty() {
                continue;
            }
            // a return has an implicit successor (the caller)
            let term = self.instrs[block.control()].op;
            let extra_succ = usize::from(term == Op::Gen(GenOp::Return));
            if block.succs.len() + extra_succ > 1 {
                for &succ in &block.succs {
                    // the entry block has an implicit predecessor
                    let extra_pred = usize::from(self.block_index(succ) == 0);
                    if self.blocks[succ].preds.len() + extra_pred > 1 {
                        return true;
                    }
                }
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int_func() -> Func {
        Func::new(
            "f",
            "test__f",
            Signature::new(vec![Type::INT], vec![Type::INT]),
        )
    }

    #[test]
    fn new_instr_defs_and_uses() {
        let mut f = int_func();
        let a = f.new_value(Type::INT);
        let b = f.new_value(Type::INT);
        let add = f.new_instr(Op::Gen(GenOp::Add), Some(Type::INT), &[a, b]);
        assert_eq!(f.instr(add).num_defs(), 1);
        assert_eq!(f.instr(add).num_args(), 2);
        let d = f.instr(add).def(0);
        assert_eq!(f.value(d).def(), Some(UserId::Instr(add)));
        assert_eq!(f.value(a).uses(), &[UserId::Instr(add)]);
    }

    #[test]
    fn multi_def_from_tuple() {
        let mut f = int_func();
        let callee = f.value_for(
            Type::Func(vec![], vec![Type::INT, Type::INT]),
            Const::Func("test__g".into()),
        );
        let call = f.new_instr(
            Op::Gen(GenOp::Call),
            Some(Type::Tuple(vec![Type::INT, Type::INT])),
            &[callee],
        );
        assert_eq!(f.instr(call).num_defs(), 2);
    }

    #[test]
    fn const_dedup() {
        let mut f = int_func();
        let a = f.value_for(Type::INT, Const::Int(4));
        let b = f.value_for(Type::INT, Const::Int(4));
        let c = f.value_for(Type::INT, Const::Int(5));
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(f.value(a).is_const());
    }

    #[test]
    fn replace_uses() {
        let mut f = int_func();
        let a = f.new_value(Type::INT);
        let b = f.new_value(Type::INT);
        let i1 = f.new_instr(Op::Gen(GenOp::Not), Some(Type::INT), &[a]);
        let i2 = f.new_instr(Op::Gen(GenOp::Negate), Some(Type::INT), &[a]);
        f.replace_uses_with(a, b).unwrap();
        assert_eq!(f.value(a).num_uses(), 0);
        assert_eq!(f.value(b).num_uses(), 2);
        assert_eq!(f.instr(i1).arg(0), b);
        assert_eq!(f.instr(i2).arg(0), b);
        // replacing a value with itself is a no-op, not a loop
        f.replace_uses_with(b, b).unwrap();
        assert_eq!(f.value(b).num_uses(), 2);
    }

    #[test]
    fn placeholders_resolve() {
        let mut f = int_func();
        let ph = f.placeholder_for("v9");
        assert!(f.has_placeholders());
        let i = f.new_instr(Op::Gen(GenOp::Not), Some(Type::INT), &[ph]);
        let real = f.new_value(Type::INT);
        f.resolve_placeholder("v9", real).unwrap();
        assert!(!f.has_placeholders());
        assert_eq!(f.instr(i).arg(0), real);
    }

    #[test]
    fn insert_and_remove_instr_reindexes() {
        let mut f = int_func();
        let blk = f.new_block();
        f.insert_block(-1, blk);
        let i0 = f.new_instr(Op::Gen(GenOp::Const), Some(Type::INT), &[]);
        let i1 = f.new_instr(Op::Gen(GenOp::Return), None, &[]);
        f.insert_instr(blk, -1, i0);
        f.insert_instr(blk, -1, i1);
        let mid = f.new_instr(Op::Gen(GenOp::Const), Some(Type::INT), &[]);
        f.insert_instr(blk, 1, mid);
        assert_eq!(f.block(blk).instrs(), &[i0, mid, i1]);
        assert_eq!(f.instr(i1).index(), 2);
        f.remove_instr(mid);
        assert_eq!(f.block(blk).instrs(), &[i0, i1]);
        assert_eq!(f.instr(i1).index(), 1);
        assert_eq!(f.instr(mid).block(), None);
    }

    #[test]
    fn swap_succs_swaps_arg_ranges() {
        let mut f = int_func();
        let b0 = f.new_block();
        let b1 = f.new_block();
        let b2 = f.new_block();
        for b in [b0, b1, b2] {
            f.insert_block(-1, b);
        }
        let p1 = f.new_value(Type::INT);
        f.add_block_def(b1, p1);
        let a = f.new_value(Type::INT);
        f.add_succ(b0, b1);
        f.add_succ(b0, b2);
        f.insert_arg(b0.into(), -1, a);
        f.swap_succs(b0);
        assert_eq!(f.block(b0).succs(), &[b2, b1]);
        // b2 takes no params, so the arg for b1 now sits after its range
        assert_eq!(f.succ_arg_range(b0, 1), 0..1);
        assert_eq!(f.block(b0).args(), &[a]);
    }

    #[test]
    fn check_invariants_catches_arity() {
        let mut f = int_func();
        let b0 = f.new_block();
        let b1 = f.new_block();
        f.insert_block(-1, b0);
        f.insert_block(-1, b1);
        let p = f.new_value(Type::INT);
        f.add_block_def(b1, p);
        f.add_succ(b0, b1);
        assert!(f.check_invariants().is_err());
        let a = f.new_value(Type::INT);
        f.insert_arg(b0.into(), -1, a);
        assert!(f.check_invariants().is_ok());
    }

    #[test]
    fn critical_edge_detection() {
        let mut f = int_func();
        let b0 = f.new_block();
        let b1 = f.new_block();
        let b2 = f.new_block();
        for b in [b0, b1, b2] {
            f.insert_block(-1, b);
        }
        let cond = f.value_for(Type::BOOL, Const::Bool(true));
        let br = f.new_instr(Op::Gen(GenOp::If), None, &[cond]);
        f.insert_instr(b0, -1, br);
        f.add_succ(b0, b1);
        f.add_succ(b0, b2);
        let j1 = f.new_instr(Op::Gen(GenOp::Jump), None, &[]);
        f.insert_instr(b1, -1, j1);
        f.add_succ(b1, b2);
        let r = f.new_instr(Op::Gen(GenOp::Return), None, &[]);
        f.insert_instr(b2, -1, r);
        // b0 has two succs and b2 has two preds: b0 -> b2 is critical
        assert!(f.has_critical_edges());
    }
}
