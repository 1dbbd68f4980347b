//! The compilation pipeline.
//!
//! One function is fully compiled before the next is started:
//! Elaboration, Simplification and Lowering shape the IR, the
//! register allocator assigns locations, the verifier independently
//! checks them, then Legalization translates to target opcodes and
//! CleanUp removes the scaffolding.

use hbc_ir::{parse::ParseError, IrError, Program};
use hbc_regalloc::{verify::VerifyError, RegAlloc, RegAllocError};
use hbc_target::{Target, TargetUnknown, Targets};
use hbc_xform::{
    eliminate_empty_blocks, run_stage, Registry, Stage, XformCtx, XformError,
};
use thiserror::Error;
use tracing::{debug, info};

/// Compiler output modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Dump the IR after parsing, without compiling.
    Ir,
    /// Emit assembly.
    Asm,
}

#[derive(Debug, Error)]
pub enum CompileError {
    #[error("parse failed:\n{}", render_lines(.0))]
    Parse(Vec<ParseError>),

    #[error(transparent)]
    Ir(#[from] IrError),

    #[error(transparent)]
    Xform(#[from] XformError),

    #[error(transparent)]
    RegAlloc(#[from] RegAllocError),

    #[error("register verification failed:\n{}", render_lines(.0))]
    Verify(Vec<VerifyError>),

    #[error(transparent)]
    Target(#[from] TargetUnknown),
}

fn render_lines<T: std::fmt::Display>(items: &[T]) -> String {
    items
        .iter()
        .map(|e| format!("  {e}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// All built-in targets.
pub fn targets() -> Targets {
    let mut targets = Targets::new();
    targets.register(Box::new(hbc_rj32::Rj32::new()));
    targets.register(Box::new(hbc_a32::A32::new()));
    targets
}

/// Compile every function of the program in place for the given
/// target.
pub fn compile_program(prog: &mut Program, target: &dyn Target) -> Result<(), CompileError> {
    let mut registry = Registry::standard();
    registry.extend(target.xforms());
    let active_tags = target.xform_tags().into_iter().collect();

    let regs = target.registers();
    let ctx = XformCtx {
        arg_regs: regs.arg_regs(),
        scratch_reg: regs.scratch,
        sizes: target.sizes(),
    };

    for func in prog.funcs_mut() {
        if func.has_placeholders() {
            let label = func
                .placeholder_labels()
                .next()
                .unwrap_or_default()
                .to_string();
            return Err(CompileError::Ir(IrError::UnresolvedPlaceholder {
                func: func.full_name.clone(),
                label,
            }));
        }

        info!(func = %func.full_name, target = target.name(), "compiling");

        for stage in [Stage::Elaboration, Stage::Simplification, Stage::Lowering] {
            run_stage(stage, func, &registry, &active_tags, &ctx)?;
            debug_check(func)?;
        }

        let mut ra = RegAlloc::new(func, regs).coalesce_clobbers(target.is_two_operand());
        ra.allocate()?;

        let errors = hbc_regalloc::verify::verify(func, regs);
        if !errors.is_empty() {
            return Err(CompileError::Verify(errors));
        }

        for stage in [Stage::Legalization, Stage::CleanUp] {
            run_stage(stage, func, &registry, &active_tags, &ctx)?;
            debug_check(func)?;
        }

        eliminate_empty_blocks(func);
        debug_check(func)?;
        debug!(func = %func.full_name, "compiled");
    }

    Ok(())
}

fn debug_check(func: &hbc_ir::Func) -> Result<(), CompileError> {
    if cfg!(debug_assertions) {
        func.check_invariants()?;
    }
    Ok(())
}

/// Parse textual IR, compile it for the named target, and return the
/// requested output.
pub fn compile_text(input: &str, target_name: &str, mode: Mode) -> Result<String, CompileError> {
    let mut prog = hbc_ir::parse::parse_program(input).map_err(CompileError::Parse)?;

    if mode == Mode::Ir {
        return Ok(hbc_ir::print::emit_program(&prog));
    }

    let targets = targets();
    let target = targets.get(target_name)?;
    compile_program(&mut prog, target)?;

    let fmter = hbc_asm::CustomAsm::new(*target.sizes());
    Ok(hbc_asm::emit(&mut prog, target, &fmter))
}
