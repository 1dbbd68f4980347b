//! The pass driver.

use std::collections::{HashMap, HashSet};

use hbc_ir::{Func, FuncCursor, Op};
use tracing::{debug, trace};

use crate::{Registry, Stage, Tag, XformCtx, XformDesc, XformError};

const FIXPOINT_BUDGET: usize = 1000;

/// Run one stage over one function to a local fixpoint.
///
/// The active transform set is the registered transforms whose stage
/// list contains `stage` and whose required tags are all present.
/// Per-opcode transforms run before the always-on ones at each
/// instruction. A sweep that changed anything triggers another sweep,
/// up to the fixpoint budget; exhausting the budget means a rewrite
/// rule keeps firing and is a fatal rule bug.
pub fn run_stage(
    stage: Stage,
    func: &mut Func,
    registry: &Registry,
    active_tags: &HashSet<Tag>,
    ctx: &XformCtx,
) -> Result<(), XformError> {
    let active: Vec<&XformDesc> = registry
        .descs()
        .iter()
        .filter(|d| d.stages.contains(&stage))
        .filter(|d| d.tags.iter().all(|t| active_tags.contains(t)))
        .collect();

    debug!(
        ?stage,
        func = %func.full_name,
        transforms = active.len(),
        "running stage"
    );

    let mut once_done: HashSet<&'static str> = HashSet::new();
    let mut tries = 0;

    loop {
        let mut op_xforms: HashMap<Op, Vec<&XformDesc>> = HashMap::new();
        let mut always: Vec<&XformDesc> = Vec::new();
        for &desc in &active {
            if desc.once && once_done.contains(desc.name) {
                continue;
            }
            match desc.op {
                Some(op) => op_xforms.entry(op).or_default().push(desc),
                None => always.push(desc),
            }
        }
        if op_xforms.is_empty() && always.is_empty() {
            return Ok(());
        }

        let mut cursor = FuncCursor::new(func);
        while let Some(id) = cursor.instr() {
            let op = cursor.func_ref().instr(id).op;
            if let Some(descs) = op_xforms.get(&op) {
                for desc in descs {
                    trace!(rule = desc.name, instr = %id, "applying");
                    (desc.run)(&mut cursor, ctx)?;
                }
            }
            for desc in &always {
                (desc.run)(&mut cursor, ctx)?;
            }
            cursor.next();
        }

        let changed = cursor.has_changed();
        for desc in &active {
            if desc.once {
                once_done.insert(desc.name);
            }
        }

        if !changed {
            return Ok(());
        }

        tries += 1;
        if tries > FIXPOINT_BUDGET {
            return Err(XformError::NonTerminating {
                stage,
                func: func.full_name.clone(),
            });
        }
    }
}
