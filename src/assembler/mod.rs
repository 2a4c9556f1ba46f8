//! Two-pass assembly from source text to a memory image.
//!
//! Pass 1 walks the token sequences of every line in source order, emitting
//! opcode and operand words and recording where label and procedure names
//! are defined and used. Uses are not resolved on the spot: each one leaves
//! a zero placeholder word and an injection record behind, so names can be
//! referenced before their definition. Pass 2 patches every placeholder from
//! the finished address tables.
//!
//! Failure is staged: lexical errors across all lines are reported first,
//! then pass 1 errors, and resolution runs only when pass 1 was clean. Each
//! stage collects every error it can find instead of stopping at the first.

pub mod token;

use std::collections::HashMap;

use slog::{o, trace, Discard, Logger};

use crate::error::{CompileError, CompileErrorKind};
use crate::instruction::find_encoding;
use crate::program::{Program, MEMORY_WORDS};
use crate::source_map::SourceMap;

use self::token::{tokenize_line, Token};

/// A deferred reference: the memory slot at `address` must receive the
/// address of `name` once every definition has been seen.
#[derive(Debug, Clone)]
struct Injection {
    address: u16,
    name: String,
    line: usize,
}

/// Accumulated state of one assembly run.
///
/// Labels and procedures live in disjoint namespaces, each with its own
/// address table and pending injection list.
struct Assembler {
    pointer: u16,
    memory: Vec<u16>,
    label_addresses: HashMap<String, u16>,
    procedure_addresses: HashMap<String, u16>,
    label_injections: Vec<Injection>,
    procedure_injections: Vec<Injection>,
    source_map: SourceMap,
    errors: Vec<CompileError>,
    logger: Logger,
}

impl Assembler {
    fn new(logger: Logger) -> Assembler {
        Assembler {
            pointer: 0,
            memory: vec![0; MEMORY_WORDS],
            label_addresses: HashMap::new(),
            procedure_addresses: HashMap::new(),
            label_injections: Vec::new(),
            procedure_injections: Vec::new(),
            source_map: SourceMap::default(),
            errors: Vec::new(),
            logger,
        }
    }

    fn error(&mut self, line: usize, kind: CompileErrorKind) {
        self.errors.push(CompileError::new(line, kind));
    }

    /// Writes `value` at the write pointer and advances it. Stores past the
    /// end of memory are dropped; the pointer advances regardless.
    fn push_word(&mut self, value: u16) {
        self.set_word(self.pointer, value);
        self.pointer = self.pointer.wrapping_add(1);
    }

    fn set_word(&mut self, address: u16, value: u16) {
        if let Some(word) = self.memory.get_mut(address as usize) {
            *word = value;
        }
    }

    fn assemble_line(&mut self, line: usize, tokens: &[Token]) {
        let (first, rest) = match tokens.split_first() {
            Some(split) => split,
            None => return,
        };

        match first {
            Token::LabelDefinition(name) => {
                if self.label_addresses.contains_key(name) {
                    self.error(line, CompileErrorKind::DuplicateLabel(name.clone()));
                }

                if !rest.is_empty() {
                    self.error(line, CompileErrorKind::MisplacedLabel(name.clone()));
                }

                trace!(self.logger, "define label";
                       "name" => %name, "address" => self.pointer);

                // The definition takes effect even when flagged above, and a
                // later definition always overwrites an earlier one.
                self.label_addresses.insert(name.clone(), self.pointer);
            }

            Token::ProcedureDefinition(name) => {
                if self.procedure_addresses.contains_key(name) {
                    self.error(line, CompileErrorKind::DuplicateProcedure(name.clone()));
                }

                if !rest.is_empty() {
                    self.error(line, CompileErrorKind::MisplacedProcedure(name.clone()));
                }

                trace!(self.logger, "define procedure";
                       "name" => %name, "address" => self.pointer);

                self.procedure_addresses.insert(name.clone(), self.pointer);
            }

            first => self.assemble_instruction(line, first, rest),
        }
    }

    fn assemble_instruction(&mut self, line: usize, first: &Token, operands: &[Token]) {
        let mnemonic = match first {
            Token::Action(mnemonic) => Some(mnemonic.as_str()),
            _ => None,
        };

        let kinds: Option<Vec<_>> = operands.iter().map(Token::operand_kind).collect();

        let encoding = match (mnemonic, kinds) {
            (Some(mnemonic), Some(kinds)) => find_encoding(mnemonic, &kinds),
            _ => None,
        };

        let encoding = match encoding {
            Some(encoding) => encoding,
            None => {
                self.error(line, CompileErrorKind::InvalidInstruction(first.to_string()));
                return;
            }
        };

        trace!(self.logger, "append instruction";
               "encoding" => %encoding.opcode, "address" => self.pointer, "line" => line);

        self.source_map.insert(self.pointer, line);
        self.push_word(encoding.opcode.as_word());

        for operand in operands {
            match operand {
                Token::Label(name) => {
                    self.label_injections.push(Injection {
                        address: self.pointer,
                        name: name.clone(),
                        line,
                    });
                    // The zero placeholder stays until pass 2.
                    self.pointer = self.pointer.wrapping_add(1);
                }

                Token::Procedure(name) => {
                    self.procedure_injections.push(Injection {
                        address: self.pointer,
                        name: name.clone(),
                        line,
                    });
                    self.pointer = self.pointer.wrapping_add(1);
                }

                Token::Register(register) | Token::Dereferenced(register) => {
                    self.push_word(register.code());
                }

                Token::Literal(value) => self.push_word(*value),

                Token::Action(_) | Token::LabelDefinition(_) | Token::ProcedureDefinition(_) => {}
            }
        }
    }

    /// Pass 2: patches every recorded injection from the address tables.
    fn resolve_references(&mut self) {
        let logger = self.logger.new(o!("stage" => "resolution"));

        for injection in std::mem::take(&mut self.label_injections) {
            match self.label_addresses.get(&injection.name) {
                Some(&address) => {
                    trace!(logger, "patch label reference";
                           "name" => %injection.name, "slot" => injection.address,
                           "target" => address);
                    self.set_word(injection.address, address);
                }
                None => {
                    self.errors.push(CompileError::new(
                        injection.line,
                        CompileErrorKind::UnknownLabel(injection.name),
                    ));
                }
            }
        }

        for injection in std::mem::take(&mut self.procedure_injections) {
            match self.procedure_addresses.get(&injection.name) {
                Some(&address) => {
                    trace!(logger, "patch procedure reference";
                           "name" => %injection.name, "slot" => injection.address,
                           "target" => address);
                    self.set_word(injection.address, address);
                }
                None => {
                    self.errors.push(CompileError::new(
                        injection.line,
                        CompileErrorKind::UnknownProcedure(injection.name),
                    ));
                }
            }
        }
    }

    fn finish(self) -> Program {
        let entrypoint = self.procedure_addresses.get("main").copied().unwrap_or(0);

        Program {
            memory: self.memory,
            entrypoint,
            size: self.pointer,
            source_map: self.source_map,
        }
    }
}

/// Assembles a source program into a [Program] image.
///
/// Returns every error the source contains, staged as described in the
/// module documentation. An artifact is returned only when the source is
/// entirely clean; there is no partial success.
pub fn compile(source: &str) -> Result<Program, Vec<CompileError>> {
    compile_with_logger(source, None)
}

/// Like [compile], but traces its work to the given logger.
pub fn compile_with_logger<L>(source: &str, logger: L) -> Result<Program, Vec<CompileError>>
where
    L: Into<Option<Logger>>,
{
    let logger = logger
        .into()
        .unwrap_or_else(|| Logger::root(Discard, o!()))
        .new(o!("stage" => "assembly"));

    let mut lines = Vec::new();
    let mut errors = Vec::new();

    for (index, line) in source.lines().enumerate() {
        match tokenize_line(line.trim(), index + 1) {
            Ok(tokens) => lines.push((index + 1, tokens)),
            Err(mut line_errors) => errors.append(&mut line_errors),
        }
    }

    if !errors.is_empty() {
        return Err(errors);
    }

    let mut assembler = Assembler::new(logger);

    for (line, tokens) in &lines {
        assembler.assemble_line(*line, tokens);
    }

    if !assembler.errors.is_empty() {
        return Err(assembler.errors);
    }

    assembler.resolve_references();

    if !assembler.errors.is_empty() {
        return Err(assembler.errors);
    }

    Ok(assembler.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruction::{JumpCondition, OpCode, Register};

    fn discard() -> Logger {
        Logger::root(Discard, o!())
    }

    fn kinds(source: &str) -> Vec<CompileErrorKind> {
        match compile(source) {
            Ok(_) => panic!("expected errors for {:?}", source),
            Err(errors) => errors.into_iter().map(|error| error.kind).collect(),
        }
    }

    #[test]
    fn encodes_a_register_register_move() {
        let program = compile("move r0 r1").unwrap();

        assert_eq!(program.words(), &[OpCode::MoveRegReg.as_word(), 0, 1]);
        assert_eq!(program.size, 3);
        assert_eq!(program.entrypoint, 0);
    }

    #[test]
    fn encodes_literal_and_dereference_overloads() {
        let program = compile("move r0 101").unwrap();
        assert_eq!(program.words(), &[OpCode::MoveRegLit.as_word(), 0, 5]);

        let program = compile("move r0 *r1").unwrap();
        assert_eq!(program.words(), &[OpCode::MoveRegDreg.as_word(), 0, 1]);
    }

    #[test]
    fn emits_instructions_in_source_order() {
        let program = compile("move r0 1011\nmove r1 1010\nadd r0 r1").unwrap();

        assert_eq!(
            program.words(),
            &[
                OpCode::MoveRegLit.as_word(), 0, 11,
                OpCode::MoveRegLit.as_word(), 1, 10,
                OpCode::AddReg.as_word(), 0, 1,
            ],
        );
    }

    #[test]
    fn resolves_forward_label_references() {
        let source = "\
!main
move r0 1
jumpeq @end
!end
halt";

        let program = compile(source).unwrap();

        // move occupies 0-2, jumpeq 3-4, halt 5; `end` is defined at 5.
        assert_eq!(
            program.words()[3],
            OpCode::Jump { condition: JumpCondition::Equal }.as_word(),
        );
        assert_eq!(program.words()[4], 5);
        assert_eq!(program.words()[5], OpCode::Halt.as_word());
        assert_eq!(program.size, 6);
    }

    #[test]
    fn resolves_backward_label_references() {
        let program = compile("move r0 1\n!loop\nadd r0 1\njump @loop").unwrap();

        assert_eq!(program.words()[7], 3);
    }

    #[test]
    fn entrypoint_is_the_main_procedure() {
        let program = compile("halt\n>main\nhalt").unwrap();
        assert_eq!(program.entrypoint, 1);

        // A label named `main` does not qualify.
        let program = compile("halt\n!main\nhalt").unwrap();
        assert_eq!(program.entrypoint, 0);
    }

    #[test]
    fn records_source_lines_for_instructions() {
        let source = "\
!main
move r0 1
jumpeq @end
!end
halt";

        let program = compile(source).unwrap();

        assert_eq!(program.source_map.source_line(0), Some(2));
        assert_eq!(program.source_map.source_line(3), Some(3));
        assert_eq!(program.source_map.source_line(5), Some(5));
        assert_eq!(program.source_map.source_line(1), None);
    }

    #[test]
    fn duplicate_definitions_error_but_the_later_address_wins() {
        let mut assembler = Assembler::new(discard());

        assembler.assemble_line(1, &[Token::LabelDefinition("x".to_string())]);
        assembler.assemble_line(2, &[
            Token::Action("halt".to_string()),
        ]);
        assembler.assemble_line(3, &[Token::LabelDefinition("x".to_string())]);

        assert_eq!(
            assembler.errors,
            vec![CompileError::new(3, CompileErrorKind::DuplicateLabel("x".to_string()))],
        );
        assert_eq!(assembler.label_addresses.get("x"), Some(&1));
    }

    #[test]
    fn misplaced_definition_errors_but_still_takes_effect() {
        let mut assembler = Assembler::new(discard());

        assembler.assemble_line(1, &[
            Token::LabelDefinition("x".to_string()),
            Token::Action("halt".to_string()),
        ]);

        assert_eq!(
            assembler.errors,
            vec![CompileError::new(1, CompileErrorKind::MisplacedLabel("x".to_string()))],
        );
        assert_eq!(assembler.label_addresses.get("x"), Some(&0));
        // The rest of the line is discarded: nothing was assembled.
        assert_eq!(assembler.pointer, 0);
    }

    #[test]
    fn unmatched_overloads_are_invalid_instructions() {
        assert_eq!(
            kinds("move r0"),
            vec![CompileErrorKind::InvalidInstruction("move".to_string())],
        );
        assert_eq!(
            kinds("add r0 @loop\n!loop"),
            vec![CompileErrorKind::InvalidInstruction("add".to_string())],
        );
        // A line that starts with an operand has no mnemonic to resolve.
        assert_eq!(
            kinds("r0 r1"),
            vec![CompileErrorKind::InvalidInstruction("r0".to_string())],
        );
    }

    #[test]
    fn unresolved_references_fail_compilation() {
        assert_eq!(
            kinds("jump @nowhere"),
            vec![CompileErrorKind::UnknownLabel("nowhere".to_string())],
        );
        assert_eq!(
            kinds("call <missing"),
            vec![CompileErrorKind::UnknownProcedure("missing".to_string())],
        );
    }

    #[test]
    fn lexical_errors_suppress_assembly_errors() {
        // Line 1 fails to lex; the invalid instruction on line 2 is not
        // reported until the source lexes cleanly.
        assert_eq!(
            kinds("bogus\nmove r0"),
            vec![CompileErrorKind::UnknownToken("bogus".to_string())],
        );
    }

    #[test]
    fn assembly_errors_are_collected_across_lines() {
        assert_eq!(
            kinds("move r0\nadd r1"),
            vec![
                CompileErrorKind::InvalidInstruction("move".to_string()),
                CompileErrorKind::InvalidInstruction("add".to_string()),
            ],
        );
    }

    #[test]
    fn comments_and_blank_lines_produce_no_words() {
        let program = compile("# a comment\n\n   \nhalt\n# trailing").unwrap();

        assert_eq!(program.words(), &[OpCode::Halt.as_word()]);
        assert_eq!(program.source_map.source_line(0), Some(4));
    }

    #[test]
    fn operands_follow_their_opcode_in_declared_order() {
        let program = compile("cmp 110 r3").unwrap();

        assert_eq!(
            program.words(),
            &[OpCode::CmpLitReg.as_word(), 6, Register::R3.code()],
        );
    }
}
