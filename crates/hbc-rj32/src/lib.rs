//! The rj32 target: a 16-bit, word-addressable, two-operand hobby
//! CPU with 16 registers.

mod opcodes;
mod translate;

use std::collections::HashMap;
use std::str::FromStr;

use hbc_ir::{GenOp, Op, Reg};
use hbc_target::{RegisterSet, Sizes, Target};
use hbc_xform::{Stage, Tag, XformDesc};

pub use opcodes::{Fmt, Opcode};

pub const SIZES: Sizes = Sizes {
    word_bytes: 2,
    min_addressable_bits: 16,
};

pub struct Rj32 {
    regs: RegisterSet,
}

impl Rj32 {
    pub fn new() -> Self {
        let names = HashMap::from([
            (Reg(0), "ra"),
            (Reg(13), "fp"),
            (Reg(14), "sp"),
            (Reg(15), "at"),
        ]);
        let regs = RegisterSet::new(
            vec![Reg(1), Reg(2), Reg(3), Reg(4)],
            vec![Reg(5), Reg(6), Reg(7)],
            vec![Reg(8), Reg(9), Reg(10), Reg(11), Reg(12)],
            Reg(14),
            Reg(13),
            Reg(0),
            Reg(15),
            names,
        );
        Rj32 { regs }
    }
}

impl Default for Rj32 {
    fn default() -> Self {
        Rj32::new()
    }
}

impl Target for Rj32 {
    fn name(&self) -> &'static str {
        "rj32"
    }

    fn xform_tags(&self) -> Vec<Tag> {
        vec![Tag::LoadStoreOffset, Tag::TwoOperand]
    }

    fn xforms(&self) -> Vec<XformDesc> {
        vec![XformDesc::new("rj32_translate", translate::translate).stage(Stage::Legalization)]
    }

    fn registers(&self) -> &RegisterSet {
        &self.regs
    }

    fn sizes(&self) -> &Sizes {
        &SIZES
    }

    fn is_two_operand(&self) -> bool {
        true
    }

    fn asm_format(&self) -> &'static str {
        "customasm"
    }

    fn emulator_cmd(&self) -> &'static str {
        "emurj"
    }

    fn emulator_args(&self) -> Vec<String> {
        vec!["-run".to_string()]
    }

    fn render(&self, op: Op, defs: &[String], args: &[String]) -> String {
        let opc = match op {
            Op::Gen(GenOp::Copy) => Some(Opcode::Move),
            Op::Gen(GenOp::Jump) => Some(Opcode::Jump),
            Op::Gen(GenOp::Return) => Some(Opcode::Return),
            Op::Gen(GenOp::Call) => Some(Opcode::Call),
            Op::Gen(g) => return render_generic(&g.to_string(), defs, args),
            Op::Target(t) => Opcode::from_str(t.0.name()).ok(),
        };
        let Some(opc) = opc else {
            return render_generic(&op.to_string(), defs, args);
        };

        let mnemonic = opc.mnemonic();
        match opc.fmt() {
            Fmt::LoadFmt => format!("{} {}, [{}, {}]", mnemonic, defs[0], args[0], args[1]),
            Fmt::StoreFmt => format!("{} [{}, {}], {}", mnemonic, args[0], args[1], args[2]),
            Fmt::NoFmt => mnemonic,
            Fmt::CallFmt => format!("{} {}", mnemonic, args[0]),
            Fmt::MoveFmt => format!("{} {}, {}", mnemonic, defs[0], args[0]),
            Fmt::CompareFmt => format!("{} {}", mnemonic, args.join(", ")),
            Fmt::BinaryFmt | Fmt::UnaryFmt => {
                // two-operand: the destination repeats the first
                // source; drop it from the rendering
                let args = if opc.op().clobbers_arg() && !args.is_empty() {
                    &args[1..]
                } else {
                    args
                };
                render_generic(&mnemonic, defs, args)
            }
        }
    }
}

fn render_generic(mnemonic: &str, defs: &[String], args: &[String]) -> String {
    match (defs.is_empty(), args.is_empty()) {
        (false, false) => format!("{} {}, {}", mnemonic, defs.join(", "), args.join(", ")),
        (false, true) => format!("{} {}", mnemonic, defs.join(", ")),
        (true, false) => format!("{} {}", mnemonic, args.join(", ")),
        (true, true) => mnemonic.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(v: &[&str]) -> Vec<String> {
        v.iter().map(|x| x.to_string()).collect()
    }

    #[test]
    fn register_file_shape() {
        let t = Rj32::new();
        let regs = t.registers();
        assert_eq!(regs.canonical().len(), 12);
        assert_eq!(regs.saved_start(), 8);
        assert_eq!(regs.name(Reg(14)), "sp");
        assert_eq!(regs.name(Reg(3)), "r3");
        assert!(regs.index_of(regs.scratch).is_none());
    }

    #[test]
    fn renders_memory_ops() {
        let t = Rj32::new();
        assert_eq!(
            t.render(Opcode::Load.op(), &s(&["r1"]), &s(&["r2", "0"])),
            "load r1, [r2, 0]"
        );
        assert_eq!(
            t.render(Opcode::Store.op(), &[], &s(&["r2", "4", "r1"])),
            "store [r2, 4], r1"
        );
    }

    #[test]
    fn renders_two_operand_alu() {
        let t = Rj32::new();
        // destination repeats the first operand; rendering drops it
        assert_eq!(
            t.render(Opcode::Add.op(), &s(&["r1"]), &s(&["r1", "r2"])),
            "add r1, r2"
        );
        assert_eq!(
            t.render(Opcode::Shl.op(), &s(&["r5"]), &s(&["r5", "1"])),
            "shl r5, 1"
        );
    }

    #[test]
    fn renders_branches_and_moves() {
        let t = Rj32::new();
        assert_eq!(
            t.render(Opcode::IfUlt.op(), &[], &s(&["r1", "r2", ".b2"])),
            "if.ult r1, r2, .b2"
        );
        assert_eq!(
            t.render(Op::Gen(GenOp::Copy), &s(&["r3"]), &s(&["r4"])),
            "move r3, r4"
        );
        assert_eq!(t.render(Opcode::Return.op(), &[], &[]), "return");
        assert_eq!(
            t.render(Opcode::Call.op(), &[], &s(&["main__print"])),
            "call main__print"
        );
    }
}
