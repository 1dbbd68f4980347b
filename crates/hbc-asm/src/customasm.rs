//! Formatter producing customasm-compatible output.

use hbc_ir::Global;
use hbc_target::Sizes;

use crate::{Formatter, Section};

/// Text suitable for the customasm assembler.
pub struct CustomAsm {
    sizes: Sizes,
}

impl CustomAsm {
    pub fn new(sizes: Sizes) -> Self {
        CustomAsm { sizes }
    }
}

impl Formatter for CustomAsm {
    fn section(&self, section: Section) -> String {
        match section {
            Section::Code => "#bank code".to_string(),
            Section::Data => "#bank data".to_string(),
            Section::Bss => "#bank bss".to_string(),
        }
    }

    fn global_label(&self, global: &Global) -> String {
        global.full_name.clone()
    }

    fn block_label(&self, id: &str) -> String {
        format!(".{id}")
    }

    fn pc_rel_address(&self, offset_units: u32) -> String {
        format!("$ + {offset_units}")
    }

    fn word(&self, value: &str) -> String {
        let bits = self.sizes.word_bytes * 8;
        format!("#d{bits} le({value})")
    }

    fn string(&self, value: &str) -> String {
        match self.sizes.min_addressable_bits {
            8 => format!("#d8 {value:?}"),
            16 => format!("#d16 utf16le({value:?})"),
            32 => format!("#d32 utf32le({value:?})"),
            bits => format!("; unsupported byte size {bits}"),
        }
    }

    fn reserve(&self, bytes: u32) -> String {
        format!("#res {bytes}")
    }

    fn comment(&self, comment: &str) -> String {
        format!("; {comment}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fmt16() -> CustomAsm {
        CustomAsm::new(Sizes {
            word_bytes: 2,
            min_addressable_bits: 16,
        })
    }

    #[test]
    fn directives() {
        let f = fmt16();
        assert_eq!(f.section(Section::Code), "#bank code");
        assert_eq!(f.word("42"), "#d16 le(42)");
        assert_eq!(f.string("Hi"), "#d16 utf16le(\"Hi\")");
        assert_eq!(f.reserve(6), "#res 6");
        assert_eq!(f.comment("x"), "; x");
        assert_eq!(f.block_label("b2"), ".b2");
        assert_eq!(f.pc_rel_address(2), "$ + 2");
    }
}
