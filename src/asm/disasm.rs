//! Disassembler.
//!
//! Converts instruction words back to readable assembly.

use crate::cpu::decode::{decode, Instruction};

/// Disassemble a single word to text.
pub fn disassemble_instruction(word: u16) -> String {
    match decode(word) {
        Ok(decoded) => decoded.to_string(),
        Err(_) => format!("??? ; {:#06x}", word),
    }
}

/// Disassemble a slice of words, one addressed line each.
pub fn disassemble(words: &[u16]) -> String {
    let mut output = String::new();
    output.push_str("; bit16 disassembly\n");
    output.push_str("; -----------------\n\n");

    for (addr, &word) in words.iter().enumerate() {
        let line = disassemble_instruction(word);
        output.push_str(&format!("{:04x}: {:04x}  {}\n", addr, word, line));
    }

    output
}

/// Clean listing: one mnemonic per line, nothing else.
pub fn listing(instructions: &[Instruction]) -> String {
    instructions
        .iter()
        .map(|instr| format!("{}\n", instr))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::decode::{encode, Operand};
    use crate::isa::Register;

    #[test]
    fn test_disassemble_halt() {
        let halt = encode(&Instruction::Halt);
        assert_eq!(disassemble_instruction(halt), "HALT");
    }

    #[test]
    fn test_disassemble_operands() {
        let add = encode(&Instruction::Add {
            dst: Register::B,
            src: Operand::Immediate(10),
        });
        assert_eq!(disassemble_instruction(add), "ADD B, 10");

        let sw = encode(&Instruction::Sw {
            addr: Operand::Register(Register::Hl),
            src: Register::A,
        });
        assert_eq!(disassemble_instruction(sw), "SW HL, A");
    }

    #[test]
    fn test_disassemble_invalid_word() {
        assert_eq!(disassemble_instruction(0x1001), "??? ; 0x1001");
    }

    #[test]
    fn test_disassembly_and_listing_layout() {
        let text = disassemble(&[0x0000, 0x2805]);
        assert!(text.contains("0000: 0000  NOP\n"));
        assert!(text.contains("0001: 2805  MW A, 5\n"));

        let clean = listing(&[Instruction::Mwh { imm: 0 }, Instruction::Halt]);
        assert_eq!(clean, "MWH 0\nHALT\n");
    }
}
