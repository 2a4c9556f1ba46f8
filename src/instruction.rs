//! Types for representing instruction encodings and the encoding registry.
//!
//! The registry is the single source of truth shared by the
//! [assembler](crate::assembler) and the [emulator](crate::emulator): the
//! [ENCODINGS] table maps a mnemonic and its operand shape to an [OpCode],
//! and [OpCode::from_word] is the inverse map used when decoding a fetched
//! word.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use lazy_static::lazy_static;

/// Number of registers in the register file.
pub const REGISTER_COUNT: usize = 11;

/// The named registers of the machine.
///
/// `r0`-`r7` are general purpose. `ip`, `sp` and `cr` are ordinary registers
/// as far as the encoding is concerned and can be named as operands.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Register {
    R0,
    R1,
    R2,
    R3,
    R4,
    R5,
    R6,
    R7,

    /// The instruction pointer: address of the next opcode word.
    Ip,

    /// The stack pointer. The stack begins right after the assembled program
    /// and grows toward higher addresses.
    Sp,

    /// The comparison register, written by `cmp` and read by the
    /// conditional jumps.
    Cr,
}

impl Register {
    /// Every register, in register-file order.
    pub const ALL: [Register; REGISTER_COUNT] = [
        Register::R0,
        Register::R1,
        Register::R2,
        Register::R3,
        Register::R4,
        Register::R5,
        Register::R6,
        Register::R7,
        Register::Ip,
        Register::Sp,
        Register::Cr,
    ];

    /// The register's index in the register file, which is also its
    /// operand encoding.
    pub const fn index(self) -> usize {
        match self {
            Register::R0 => 0,
            Register::R1 => 1,
            Register::R2 => 2,
            Register::R3 => 3,
            Register::R4 => 4,
            Register::R5 => 5,
            Register::R6 => 6,
            Register::R7 => 7,
            Register::Ip => 8,
            Register::Sp => 9,
            Register::Cr => 10,
        }
    }

    /// The operand encoding as a memory word.
    pub const fn code(self) -> u16 {
        self.index() as u16
    }
}

impl FromStr for Register {
    type Err = ();

    fn from_str(name: &str) -> Result<Register, ()> {
        match name {
            "r0" => Ok(Register::R0),
            "r1" => Ok(Register::R1),
            "r2" => Ok(Register::R2),
            "r3" => Ok(Register::R3),
            "r4" => Ok(Register::R4),
            "r5" => Ok(Register::R5),
            "r6" => Ok(Register::R6),
            "r7" => Ok(Register::R7),
            "ip" => Ok(Register::Ip),
            "sp" => Ok(Register::Sp),
            "cr" => Ok(Register::Cr),
            _ => Err(()),
        }
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Register::R0 => write!(f, "r0"),
            Register::R1 => write!(f, "r1"),
            Register::R2 => write!(f, "r2"),
            Register::R3 => write!(f, "r3"),
            Register::R4 => write!(f, "r4"),
            Register::R5 => write!(f, "r5"),
            Register::R6 => write!(f, "r6"),
            Register::R7 => write!(f, "r7"),
            Register::Ip => write!(f, "ip"),
            Register::Sp => write!(f, "sp"),
            Register::Cr => write!(f, "cr"),
        }
    }
}

/// Describes the predicate of a conditional jump instruction.
///
/// Every predicate examines the value the last `cmp` left in `cr`. That
/// value is the *unsigned* wrapped difference of the compared operands, so
/// the below-zero predicates can never hold and the at-least-zero predicate
/// always does; see [JumpCondition::satisfied_by].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum JumpCondition {
    /// Unconditional jump. (`jump`)
    Unconditional,

    /// Jump if the comparison result is below zero. (`jumplt`)
    Less,

    /// Jump if the comparison result is at most zero. (`jumple`)
    LessOrEqual,

    /// Jump if the comparison result is zero. (`jumpeq`)
    Equal,

    /// Jump if the comparison result is nonzero. (`jumpne`)
    NotEqual,

    /// Jump if the comparison result is above zero. (`jumpgt`)
    Greater,

    /// Jump if the comparison result is at least zero. (`jumpge`)
    GreaterOrEqual,
}

impl JumpCondition {
    /// Whether the predicate holds for the value stored in `cr`.
    ///
    /// The stored value is an unsigned word: a "negative" comparison result
    /// is its wrapped two's-complement magnitude, which is a large positive
    /// number here. Below-zero therefore never holds, and at-most-zero
    /// collapses to equality.
    pub fn satisfied_by(self, value: u16) -> bool {
        match self {
            JumpCondition::Unconditional => true,
            JumpCondition::Less => false,
            JumpCondition::LessOrEqual => value == 0,
            JumpCondition::Equal => value == 0,
            JumpCondition::NotEqual => value != 0,
            JumpCondition::Greater => value > 0,
            JumpCondition::GreaterOrEqual => true,
        }
    }
}

/// The fully resolved instruction encodings of the TM16 machine.
///
/// Mnemonics are overloaded by operand shape in source text; each variant
/// here is one concrete (mnemonic, shape) combination with its own opcode
/// word. The word values are listed in [OpCode::as_word].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum OpCode {
    /// Signals the machine to stop.
    Halt,

    /// Copies a register into a register.
    MoveRegReg,
    /// Copies the memory cell a register points at into a register.
    MoveRegDreg,
    /// Copies a register into the memory cell a register points at.
    MoveDregReg,
    /// Copies between two register-addressed memory cells.
    MoveDregDreg,
    /// Copies a literal into a register.
    MoveRegLit,
    /// Copies a literal into the memory cell a register points at.
    MoveDregLit,

    /// Adds a register into a register.
    AddReg,
    /// Adds a literal into a register.
    AddLit,
    MulReg,
    MulLit,
    /// Divides a register by a register, flooring the unsigned quotient.
    DivReg,
    DivLit,
    /// Negates a register in place (wrapped magnitude).
    Neg,
    ModReg,
    ModLit,

    /// Bitwise complement of a register, in place.
    Not,
    AndReg,
    AndLit,
    OrReg,
    OrLit,
    XorReg,
    XorLit,

    /// `cr` = register - register, stored wrapped.
    CmpRegReg,
    /// `cr` = register - literal, stored wrapped.
    CmpRegLit,
    /// `cr` = literal - register, stored wrapped.
    CmpLitReg,

    /// Changes `ip` to the embedded target, unconditionally or if the
    /// condition holds for `cr`.
    Jump {
        /// The predicate that decides whether the jump is taken.
        condition: JumpCondition,
    },

    /// Writes a register at `memory[sp]`, then increments `sp`.
    PushReg,
    /// Writes a literal at `memory[sp]`, then increments `sp`.
    PushLit,
    /// Decrements `sp`, then reads `memory[sp]` into a register.
    PopReg,

    /// Pushes the return address and jumps to the embedded procedure.
    Call,
    /// Pops an address into `ip`.
    Ret,
}

impl OpCode {
    /// The opcode word written into memory for this encoding.
    pub fn as_word(self) -> u16 {
        match self {
            OpCode::Halt => 0x00,

            OpCode::MoveRegReg => 0x01,
            OpCode::MoveRegDreg => 0x02,
            OpCode::MoveDregReg => 0x03,
            OpCode::MoveDregDreg => 0x04,
            OpCode::MoveRegLit => 0x05,
            OpCode::MoveDregLit => 0x06,

            OpCode::AddReg => 0x07,
            OpCode::AddLit => 0x08,
            OpCode::MulReg => 0x09,
            OpCode::MulLit => 0x0A,
            OpCode::DivReg => 0x0B,
            OpCode::DivLit => 0x0C,
            OpCode::Neg => 0x0D,
            OpCode::ModReg => 0x0E,
            OpCode::ModLit => 0x0F,

            OpCode::Not => 0x10,
            OpCode::AndReg => 0x11,
            OpCode::AndLit => 0x12,
            OpCode::OrReg => 0x13,
            OpCode::OrLit => 0x14,
            OpCode::XorReg => 0x15,
            OpCode::XorLit => 0x16,

            OpCode::CmpRegReg => 0x17,
            OpCode::CmpRegLit => 0x18,
            OpCode::CmpLitReg => 0x19,

            OpCode::Jump { condition: JumpCondition::Less } => 0x1A,
            OpCode::Jump { condition: JumpCondition::LessOrEqual } => 0x1B,
            OpCode::Jump { condition: JumpCondition::Equal } => 0x1C,
            OpCode::Jump { condition: JumpCondition::NotEqual } => 0x1D,
            OpCode::Jump { condition: JumpCondition::Greater } => 0x1E,
            OpCode::Jump { condition: JumpCondition::GreaterOrEqual } => 0x1F,

            OpCode::PushReg => 0x20,
            OpCode::PushLit => 0x21,
            OpCode::PopReg => 0x22,

            OpCode::Call => 0x23,
            OpCode::Ret => 0x24,

            OpCode::Jump { condition: JumpCondition::Unconditional } => 0x25,
        }
    }

    /// Decodes an opcode word. Returns `None` for words with no encoding,
    /// which the emulator treats as a fatal fault.
    pub fn from_word(word: u16) -> Option<OpCode> {
        let opcode = match word {
            0x00 => OpCode::Halt,

            0x01 => OpCode::MoveRegReg,
            0x02 => OpCode::MoveRegDreg,
            0x03 => OpCode::MoveDregReg,
            0x04 => OpCode::MoveDregDreg,
            0x05 => OpCode::MoveRegLit,
            0x06 => OpCode::MoveDregLit,

            0x07 => OpCode::AddReg,
            0x08 => OpCode::AddLit,
            0x09 => OpCode::MulReg,
            0x0A => OpCode::MulLit,
            0x0B => OpCode::DivReg,
            0x0C => OpCode::DivLit,
            0x0D => OpCode::Neg,
            0x0E => OpCode::ModReg,
            0x0F => OpCode::ModLit,

            0x10 => OpCode::Not,
            0x11 => OpCode::AndReg,
            0x12 => OpCode::AndLit,
            0x13 => OpCode::OrReg,
            0x14 => OpCode::OrLit,
            0x15 => OpCode::XorReg,
            0x16 => OpCode::XorLit,

            0x17 => OpCode::CmpRegReg,
            0x18 => OpCode::CmpRegLit,
            0x19 => OpCode::CmpLitReg,

            0x1A => OpCode::Jump { condition: JumpCondition::Less },
            0x1B => OpCode::Jump { condition: JumpCondition::LessOrEqual },
            0x1C => OpCode::Jump { condition: JumpCondition::Equal },
            0x1D => OpCode::Jump { condition: JumpCondition::NotEqual },
            0x1E => OpCode::Jump { condition: JumpCondition::Greater },
            0x1F => OpCode::Jump { condition: JumpCondition::GreaterOrEqual },

            0x20 => OpCode::PushReg,
            0x21 => OpCode::PushLit,
            0x22 => OpCode::PopReg,

            0x23 => OpCode::Call,
            0x24 => OpCode::Ret,

            0x25 => OpCode::Jump { condition: JumpCondition::Unconditional },

            _ => return None,
        };

        Some(opcode)
    }
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            OpCode::Halt => "halt",

            OpCode::MoveRegReg => "move_reg_reg",
            OpCode::MoveRegDreg => "move_reg_dreg",
            OpCode::MoveDregReg => "move_dreg_reg",
            OpCode::MoveDregDreg => "move_dreg_dreg",
            OpCode::MoveRegLit => "move_reg_lit",
            OpCode::MoveDregLit => "move_dreg_lit",

            OpCode::AddReg => "add_reg",
            OpCode::AddLit => "add_lit",
            OpCode::MulReg => "mul_reg",
            OpCode::MulLit => "mul_lit",
            OpCode::DivReg => "div_reg",
            OpCode::DivLit => "div_lit",
            OpCode::Neg => "neg",
            OpCode::ModReg => "mod_reg",
            OpCode::ModLit => "mod_lit",

            OpCode::Not => "not",
            OpCode::AndReg => "and_reg",
            OpCode::AndLit => "and_lit",
            OpCode::OrReg => "or_reg",
            OpCode::OrLit => "or_lit",
            OpCode::XorReg => "xor_reg",
            OpCode::XorLit => "xor_lit",

            OpCode::CmpRegReg => "cmp_reg_reg",
            OpCode::CmpRegLit => "cmp_reg_lit",
            OpCode::CmpLitReg => "cmp_lit_reg",

            OpCode::Jump { condition } => match condition {
                JumpCondition::Unconditional => "jump",
                JumpCondition::Less => "jumplt",
                JumpCondition::LessOrEqual => "jumple",
                JumpCondition::Equal => "jumpeq",
                JumpCondition::NotEqual => "jumpne",
                JumpCondition::Greater => "jumpgt",
                JumpCondition::GreaterOrEqual => "jumpge",
            },

            OpCode::PushReg => "push_reg",
            OpCode::PushLit => "push_lit",
            OpCode::PopReg => "pop_reg",

            OpCode::Call => "call",
            OpCode::Ret => "ret",
        };

        write!(f, "{}", name)
    }
}

/// The category of a token used as an instruction operand.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum OperandKind {
    Register,
    Dereferenced,
    Literal,
    Label,
    Procedure,
}

/// One row of the encoding registry: a mnemonic, the ordered operand kinds
/// it takes in this overload, and the opcode the combination encodes to.
#[derive(Debug, Clone, Copy)]
pub struct Encoding {
    pub mnemonic: &'static str,
    pub operands: &'static [OperandKind],
    pub opcode: OpCode,
}

macro_rules! encoding {
    ( $mnemonic:literal, [ $($kind:ident),* ], $opcode:expr ) => {
        Encoding {
            mnemonic: $mnemonic,
            operands: &[ $(OperandKind::$kind),* ],
            opcode: $opcode,
        }
    };
}

/// The full encoding table. Exhaustive and unambiguous: no two rows share
/// a (mnemonic, operand kinds) pair.
pub static ENCODINGS: &[Encoding] = &[
    encoding!("halt", [], OpCode::Halt),

    encoding!("move", [Register, Register], OpCode::MoveRegReg),
    encoding!("move", [Register, Dereferenced], OpCode::MoveRegDreg),
    encoding!("move", [Dereferenced, Register], OpCode::MoveDregReg),
    encoding!("move", [Dereferenced, Dereferenced], OpCode::MoveDregDreg),
    encoding!("move", [Register, Literal], OpCode::MoveRegLit),
    encoding!("move", [Dereferenced, Literal], OpCode::MoveDregLit),

    encoding!("add", [Register, Register], OpCode::AddReg),
    encoding!("add", [Register, Literal], OpCode::AddLit),
    encoding!("mul", [Register, Register], OpCode::MulReg),
    encoding!("mul", [Register, Literal], OpCode::MulLit),
    encoding!("div", [Register, Register], OpCode::DivReg),
    encoding!("div", [Register, Literal], OpCode::DivLit),
    encoding!("neg", [Register], OpCode::Neg),
    encoding!("mod", [Register, Register], OpCode::ModReg),
    encoding!("mod", [Register, Literal], OpCode::ModLit),

    encoding!("not", [Register], OpCode::Not),
    encoding!("and", [Register, Register], OpCode::AndReg),
    encoding!("and", [Register, Literal], OpCode::AndLit),
    encoding!("or", [Register, Register], OpCode::OrReg),
    encoding!("or", [Register, Literal], OpCode::OrLit),
    encoding!("xor", [Register, Register], OpCode::XorReg),
    encoding!("xor", [Register, Literal], OpCode::XorLit),

    encoding!("cmp", [Register, Register], OpCode::CmpRegReg),
    encoding!("cmp", [Register, Literal], OpCode::CmpRegLit),
    encoding!("cmp", [Literal, Register], OpCode::CmpLitReg),

    encoding!("jumplt", [Label], OpCode::Jump { condition: JumpCondition::Less }),
    encoding!("jumple", [Label], OpCode::Jump { condition: JumpCondition::LessOrEqual }),
    encoding!("jumpeq", [Label], OpCode::Jump { condition: JumpCondition::Equal }),
    encoding!("jumpne", [Label], OpCode::Jump { condition: JumpCondition::NotEqual }),
    encoding!("jumpgt", [Label], OpCode::Jump { condition: JumpCondition::Greater }),
    encoding!("jumpge", [Label], OpCode::Jump { condition: JumpCondition::GreaterOrEqual }),
    encoding!("jump", [Label], OpCode::Jump { condition: JumpCondition::Unconditional }),

    encoding!("push", [Register], OpCode::PushReg),
    encoding!("push", [Literal], OpCode::PushLit),
    encoding!("pop", [Register], OpCode::PopReg),

    encoding!("call", [Procedure], OpCode::Call),
    encoding!("ret", [], OpCode::Ret),
];

lazy_static! {
    /// Every known mnemonic, for classifying words during lexing.
    pub static ref MNEMONICS: HashSet<&'static str> =
        ENCODINGS.iter().map(|encoding| encoding.mnemonic).collect();
}

/// Looks up the encoding for a mnemonic and an exact ordered operand shape.
pub fn find_encoding(mnemonic: &str, operands: &[OperandKind]) -> Option<&'static Encoding> {
    ENCODINGS
        .iter()
        .find(|encoding| encoding.mnemonic == mnemonic && encoding.operands == operands)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encoding_table_is_unambiguous() {
        for (i, a) in ENCODINGS.iter().enumerate() {
            for b in &ENCODINGS[i + 1..] {
                assert!(
                    a.mnemonic != b.mnemonic || a.operands != b.operands,
                    "duplicate encoding for {} {:?}",
                    a.mnemonic,
                    a.operands,
                );
            }
        }
    }

    #[test]
    fn every_encoding_decodes_back() {
        for encoding in ENCODINGS {
            assert_eq!(OpCode::from_word(encoding.opcode.as_word()), Some(encoding.opcode));
        }
    }

    #[test]
    fn overload_resolution_is_exact() {
        let encoding = find_encoding(
            "move",
            &[OperandKind::Dereferenced, OperandKind::Literal],
        );
        assert_eq!(encoding.map(|e| e.opcode), Some(OpCode::MoveDregLit));

        assert!(find_encoding("move", &[OperandKind::Literal, OperandKind::Register]).is_none());
        assert!(find_encoding("add", &[OperandKind::Register]).is_none());
        assert!(find_encoding("frobnicate", &[]).is_none());
    }

    #[test]
    fn unknown_words_do_not_decode() {
        assert_eq!(OpCode::from_word(0x26), None);
        assert_eq!(OpCode::from_word(0xFFFF), None);
    }

    #[test]
    fn register_names_round_trip() {
        for name in &["r0", "r5", "r7", "ip", "sp", "cr"] {
            let register: Register = name.parse().expect("known register name");
            assert_eq!(&register.to_string(), name);
        }

        assert!("r8".parse::<Register>().is_err());
        assert!("R0".parse::<Register>().is_err());
    }

    #[test]
    fn special_registers_follow_the_general_purpose_block() {
        assert_eq!(Register::Ip.index(), 8);
        assert_eq!(Register::Sp.index(), 9);
        assert_eq!(Register::Cr.index(), 10);
    }

    #[test]
    fn below_zero_predicates_never_hold_for_wrapped_results() {
        // 3 - 5 stores the wrapped magnitude of -2.
        let wrapped = 3u16.wrapping_sub(5);

        assert!(!JumpCondition::Less.satisfied_by(wrapped));
        assert!(!JumpCondition::LessOrEqual.satisfied_by(wrapped));
        assert!(JumpCondition::NotEqual.satisfied_by(wrapped));
        assert!(JumpCondition::Greater.satisfied_by(wrapped));
        assert!(JumpCondition::GreaterOrEqual.satisfied_by(wrapped));

        assert!(JumpCondition::Equal.satisfied_by(0));
        assert!(JumpCondition::LessOrEqual.satisfied_by(0));
        assert!(!JumpCondition::Greater.satisfied_by(0));
    }
}
