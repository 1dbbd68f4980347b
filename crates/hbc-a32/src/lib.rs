//! The a32 target: a 32-bit, byte-addressable, three-operand hobby
//! CPU with 32 registers.

mod opcodes;
mod translate;

use std::collections::HashMap;

use hbc_ir::{GenOp, Op, Reg};
use hbc_target::{RegisterSet, Sizes, Target};
use hbc_xform::{Stage, Tag, XformDesc};

pub use opcodes::Opcode;

pub const SIZES: Sizes = Sizes {
    word_bytes: 4,
    min_addressable_bits: 8,
};

pub struct A32 {
    regs: RegisterSet,
}

impl A32 {
    pub fn new() -> Self {
        let names = HashMap::from([
            (Reg(28), "fp"),
            (Reg(29), "sp"),
            (Reg(30), "lr"),
            (Reg(31), "at"),
        ]);
        let regs = RegisterSet::new(
            (1..=6).map(Reg).collect(),
            (7..=14).map(Reg).collect(),
            (15..=27).map(Reg).collect(),
            Reg(29),
            Reg(28),
            Reg(30),
            Reg(31),
            names,
        );
        A32 { regs }
    }
}

impl Default for A32 {
    fn default() -> Self {
        A32::new()
    }
}

impl Target for A32 {
    fn name(&self) -> &'static str {
        "a32"
    }

    fn xform_tags(&self) -> Vec<Tag> {
        vec![Tag::LoadStoreOffset]
    }

    fn xforms(&self) -> Vec<XformDesc> {
        vec![XformDesc::new("a32_translate", translate::translate).stage(Stage::Legalization)]
    }

    fn registers(&self) -> &RegisterSet {
        &self.regs
    }

    fn sizes(&self) -> &Sizes {
        &SIZES
    }

    fn is_two_operand(&self) -> bool {
        false
    }

    fn asm_format(&self) -> &'static str {
        "customasm"
    }

    fn emulator_cmd(&self) -> &'static str {
        "emua32"
    }

    fn emulator_args(&self) -> Vec<String> {
        Vec::new()
    }

    fn render(&self, op: Op, defs: &[String], args: &[String]) -> String {
        let name = match op {
            Op::Gen(GenOp::Copy) => "move",
            Op::Gen(GenOp::Jump) => "jump",
            Op::Gen(GenOp::Return) => "ret",
            Op::Gen(GenOp::Call) => "call",
            Op::Gen(g) => return render_generic(&g.to_string(), defs, args),
            Op::Target(t) => t.0.name(),
        };

        match name {
            "ldw" | "ldb" => format!("{} {}, [{}, {}]", name, defs[0], args[0], args[1]),
            "stw" | "stb" => format!("{} [{}, {}], {}", name, args[0], args[1], args[2]),
            "ret" => "ret".to_string(),
            "call" => format!("call {}", args[0]),
            "jump" => format!("jump {}", args[0]),
            "move" => format!("move {}, {}", defs[0], args[0]),
            _ => render_generic(&name.replace('_', "."), defs, args),
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
        let t = A32::new();
        let regs = t.registers();
        assert_eq!(regs.canonical().len(), 27);
        assert_eq!(regs.saved_start(), 15);
        assert_eq!(regs.name(Reg(29)), "sp");
        assert!(!t.is_two_operand());
    }

    #[test]
    fn renders_three_operand_alu() {
        let t = A32::new();
        assert_eq!(
            t.render(Opcode::Add.op(), &s(&["r3"]), &s(&["r1", "r2"])),
            "add r3, r1, r2"
        );
        assert_eq!(
            t.render(Opcode::Ldw.op(), &s(&["r1"]), &s(&["r2", "8"])),
            "ldw r1, [r2, 8]"
        );
        assert_eq!(
            t.render(Opcode::Stw.op(), &[], &s(&["r2", "0", "r1"])),
            "stw [r2, 0], r1"
        );
        assert_eq!(
            t.render(Opcode::IfGe.op(), &[], &s(&["r1", "r2", ".b3"])),
            "if.ge r1, r2, .b3"
        );
    }
}
