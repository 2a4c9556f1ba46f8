//! [Machine] for executing compiled [Program] images.
//!
//! The machine is fully synchronous: [Machine::step] fetches, decodes and
//! executes exactly one instruction and returns. The caller drives the loop
//! and stops once a result reports [InstructionResult::should_halt], or uses
//! [Machine::run] to loop until then. Every arithmetic result is stored as a
//! wrapped unsigned 16-bit word.

use slog::{o, trace, Discard, Logger};

use crate::error::Fault;
use crate::instruction::{JumpCondition, OpCode, Register, REGISTER_COUNT};
use crate::program::Program;
use crate::source_map::SourceMap;

const IP: usize = Register::Ip.index();
const SP: usize = Register::Sp.index();
const CR: usize = Register::Cr.index();

/// Describes the side effects of a single executed instruction.
///
/// Purely observational: execution is correct without ever looking at one of
/// these. Tracing and debugging tools use them to know which register (or
/// register-addressed memory cell) an instruction touched, identified by the
/// register's operand code.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct InstructionResult {
    /// A register the instruction read.
    pub register_read: Option<u16>,

    /// A register the instruction overwrote.
    pub register_modified: Option<u16>,

    /// A register whose pointed-at memory cell was read.
    pub register_dereferenced_read: Option<u16>,

    /// A register whose pointed-at memory cell was overwritten.
    pub register_dereferenced_modified: Option<u16>,

    /// True once the machine has reached `halt`. The driving loop must not
    /// step the machine further.
    pub should_halt: bool,
}

/// The execution state of one loaded program: its memory image and the
/// register file.
///
/// Created from a compiled [Program] by [Machine::new], which takes over the
/// program's memory without copying it and points `ip` at the entrypoint and
/// `sp` at the first word after the program. Code and stack share the one
/// memory; nothing stops a program from overwriting itself.
pub struct Machine {
    /// The machine's memory.
    pub memory: Vec<u16>,

    /// The register file: `r0`-`r7`, `ip`, `sp`, `cr`, indexed by
    /// [Register::index](crate::instruction::Register::index).
    pub registers: [u16; REGISTER_COUNT],

    /// Address-to-source-line mapping, carried along for diagnostics.
    pub source_map: SourceMap,

    /// True once `halt` has been executed.
    pub halted: bool,

    logger: Logger,
}

impl Machine {
    /// Loads a compiled program into a fresh machine.
    pub fn new(program: Program) -> Machine {
        Machine::with_logger(program, None)
    }

    /// Like [Machine::new], but traces every executed instruction to the
    /// given logger.
    pub fn with_logger<L>(program: Program, logger: L) -> Machine
    where
        L: Into<Option<Logger>>,
    {
        let logger = logger
            .into()
            .unwrap_or_else(|| Logger::root(Discard, o!()))
            .new(o!("stage" => "execution"));

        let mut registers = [0; REGISTER_COUNT];
        registers[IP] = program.entrypoint;
        registers[SP] = program.size;

        Machine {
            memory: program.memory,
            registers,
            source_map: program.source_map,
            halted: false,
            logger,
        }
    }

    /// Executes a single instruction.
    ///
    /// Stepping a halted machine is a no-op that reports the halt again.
    ///
    /// # Errors
    /// Returns a [Fault] if the fetched word decodes to no instruction. The
    /// fault is unrecoverable: the image is corrupted or execution has
    /// jumped into non-code memory, and the machine must not be stepped
    /// past it.
    pub fn step(&mut self) -> Result<InstructionResult, Fault> {
        if self.halted {
            return Ok(InstructionResult {
                should_halt: true,
                ..Default::default()
            });
        }

        let ip = self.registers[IP];
        let word = self.mem(ip);

        let opcode = OpCode::from_word(word).ok_or(Fault::UnknownOpcode {
            address: ip,
            opcode: word,
        })?;

        trace!(self.logger, "execute";
               "address" => ip, "encoding" => %opcode,
               "line" => self.source_map.source_line(ip));

        let result = match opcode {
            OpCode::Halt => {
                self.halted = true;

                InstructionResult {
                    should_halt: true,
                    ..Default::default()
                }
            }

            OpCode::MoveRegReg => {
                let destination = self.mem(ip.wrapping_add(1));
                let source = self.mem(ip.wrapping_add(2));

                self.set_register(destination, self.register(source));
                self.advance(3);

                InstructionResult {
                    register_read: Some(source),
                    register_modified: Some(destination),
                    ..Default::default()
                }
            }

            OpCode::MoveRegDreg => {
                let destination = self.mem(ip.wrapping_add(1));
                let source = self.mem(ip.wrapping_add(2));
                let address = self.register(source);

                self.set_register(destination, self.mem(address));
                self.advance(3);

                InstructionResult {
                    register_dereferenced_read: Some(source),
                    register_modified: Some(destination),
                    ..Default::default()
                }
            }

            OpCode::MoveDregReg => {
                let destination = self.mem(ip.wrapping_add(1));
                let source = self.mem(ip.wrapping_add(2));
                let address = self.register(destination);

                self.set_mem(address, self.register(source));
                self.advance(3);

                InstructionResult {
                    register_read: Some(source),
                    register_dereferenced_modified: Some(destination),
                    ..Default::default()
                }
            }

            OpCode::MoveDregDreg => {
                let destination = self.mem(ip.wrapping_add(1));
                let source = self.mem(ip.wrapping_add(2));
                let destination_address = self.register(destination);
                let source_address = self.register(source);

                self.set_mem(destination_address, self.mem(source_address));
                self.advance(3);

                InstructionResult {
                    register_dereferenced_read: Some(source),
                    register_dereferenced_modified: Some(destination),
                    ..Default::default()
                }
            }

            OpCode::MoveRegLit => {
                let destination = self.mem(ip.wrapping_add(1));
                let literal = self.mem(ip.wrapping_add(2));

                self.set_register(destination, literal);
                self.advance(3);

                InstructionResult {
                    register_modified: Some(destination),
                    ..Default::default()
                }
            }

            OpCode::MoveDregLit => {
                let destination = self.mem(ip.wrapping_add(1));
                let literal = self.mem(ip.wrapping_add(2));
                let address = self.register(destination);

                self.set_mem(address, literal);
                self.advance(3);

                InstructionResult {
                    register_dereferenced_modified: Some(destination),
                    ..Default::default()
                }
            }

            OpCode::AddReg => self.binary_register(ip, u16::wrapping_add),
            OpCode::AddLit => self.binary_literal(ip, u16::wrapping_add),
            OpCode::MulReg => self.binary_register(ip, u16::wrapping_mul),
            OpCode::MulLit => self.binary_literal(ip, u16::wrapping_mul),

            // The unsigned quotient is already floored; division and
            // remainder by zero store zero.
            OpCode::DivReg => self.binary_register(ip, |a, b| a.checked_div(b).unwrap_or(0)),
            OpCode::DivLit => self.binary_literal(ip, |a, b| a.checked_div(b).unwrap_or(0)),
            OpCode::ModReg => self.binary_register(ip, |a, b| a.checked_rem(b).unwrap_or(0)),
            OpCode::ModLit => self.binary_literal(ip, |a, b| a.checked_rem(b).unwrap_or(0)),

            OpCode::Neg => {
                let destination = self.mem(ip.wrapping_add(1));

                self.set_register(destination, 0u16.wrapping_sub(self.register(destination)));
                self.advance(2);

                InstructionResult {
                    register_modified: Some(destination),
                    ..Default::default()
                }
            }

            OpCode::Not => {
                let destination = self.mem(ip.wrapping_add(1));

                self.set_register(destination, !self.register(destination));
                self.advance(2);

                InstructionResult {
                    register_modified: Some(destination),
                    ..Default::default()
                }
            }

            OpCode::AndReg => self.binary_register(ip, |a, b| a & b),
            OpCode::AndLit => self.binary_literal(ip, |a, b| a & b),
            OpCode::OrReg => self.binary_register(ip, |a, b| a | b),
            OpCode::OrLit => self.binary_literal(ip, |a, b| a | b),
            OpCode::XorReg => self.binary_register(ip, |a, b| a ^ b),
            OpCode::XorLit => self.binary_literal(ip, |a, b| a ^ b),

            OpCode::CmpRegReg => {
                let left = self.register(self.mem(ip.wrapping_add(1)));
                let right = self.register(self.mem(ip.wrapping_add(2)));

                self.compare(left, right)
            }

            OpCode::CmpRegLit => {
                let left = self.register(self.mem(ip.wrapping_add(1)));
                let right = self.mem(ip.wrapping_add(2));

                self.compare(left, right)
            }

            OpCode::CmpLitReg => {
                let left = self.mem(ip.wrapping_add(1));
                let right = self.register(self.mem(ip.wrapping_add(2)));

                self.compare(left, right)
            }

            OpCode::Jump { condition } => {
                let target = self.mem(ip.wrapping_add(1));

                if condition == JumpCondition::Unconditional {
                    self.registers[IP] = target;

                    InstructionResult::default()
                } else {
                    if condition.satisfied_by(self.registers[CR]) {
                        self.registers[IP] = target;
                    } else {
                        self.advance(2);
                    }

                    InstructionResult {
                        register_read: Some(CR as u16),
                        ..Default::default()
                    }
                }
            }

            OpCode::PushReg => {
                let source = self.mem(ip.wrapping_add(1));
                let value = self.register(source);

                self.push(value);
                self.advance(2);

                InstructionResult {
                    register_read: Some(source),
                    ..Default::default()
                }
            }

            OpCode::PushLit => {
                let literal = self.mem(ip.wrapping_add(1));

                self.push(literal);
                self.advance(2);

                InstructionResult::default()
            }

            OpCode::PopReg => {
                let destination = self.mem(ip.wrapping_add(1));
                let value = self.pop();

                self.set_register(destination, value);
                self.advance(2);

                InstructionResult {
                    register_modified: Some(destination),
                    ..Default::default()
                }
            }

            OpCode::Call => {
                let target = self.mem(ip.wrapping_add(1));

                // The return address is the word right after this call.
                self.push(ip.wrapping_add(2));
                self.registers[IP] = target;

                InstructionResult::default()
            }

            OpCode::Ret => {
                let address = self.pop();
                self.registers[IP] = address;

                InstructionResult::default()
            }
        };

        Ok(result)
    }

    /// Steps the machine until it halts.
    ///
    /// # Errors
    /// Returns the first [Fault] an instruction raises. A program that never
    /// halts keeps this looping; bounding execution is the caller's job.
    pub fn run(&mut self) -> Result<(), Fault> {
        while !self.halted {
            self.step()?;
        }

        Ok(())
    }

    /// The register-operand form shared by the arithmetic and bitwise
    /// families: combines the destination register with a source register
    /// and stores the result back in the destination.
    fn binary_register(&mut self, ip: u16, op: impl Fn(u16, u16) -> u16) -> InstructionResult {
        let destination = self.mem(ip.wrapping_add(1));
        let source = self.mem(ip.wrapping_add(2));
        let value = op(self.register(destination), self.register(source));

        self.set_register(destination, value);
        self.advance(3);

        InstructionResult {
            register_read: Some(source),
            register_modified: Some(destination),
            ..Default::default()
        }
    }

    /// The literal-operand form shared by the arithmetic and bitwise
    /// families.
    fn binary_literal(&mut self, ip: u16, op: impl Fn(u16, u16) -> u16) -> InstructionResult {
        let destination = self.mem(ip.wrapping_add(1));
        let literal = self.mem(ip.wrapping_add(2));
        let value = op(self.register(destination), literal);

        self.set_register(destination, value);
        self.advance(3);

        InstructionResult {
            register_modified: Some(destination),
            ..Default::default()
        }
    }

    /// Stores the wrapped difference of the operands in `cr`.
    fn compare(&mut self, left: u16, right: u16) -> InstructionResult {
        self.registers[CR] = left.wrapping_sub(right);
        self.advance(3);

        InstructionResult {
            register_modified: Some(CR as u16),
            ..Default::default()
        }
    }

    /// Writes at `memory[sp]`, then bumps `sp`: the stack grows toward
    /// higher addresses.
    fn push(&mut self, value: u16) {
        let sp = self.registers[SP];

        self.set_mem(sp, value);
        self.registers[SP] = sp.wrapping_add(1);
    }

    fn pop(&mut self) -> u16 {
        let sp = self.registers[SP].wrapping_sub(1);

        self.registers[SP] = sp;
        self.mem(sp)
    }

    /// Advances `ip` by the width of the executed instruction. Reads the
    /// register file rather than the fetch-time value, so an instruction
    /// that wrote `ip` itself still gets the ordinary advance on top.
    fn advance(&mut self, width: u16) {
        self.registers[IP] = self.registers[IP].wrapping_add(width);
    }

    /// Reads the register with operand code `code`. Codes outside the
    /// register file read as zero; a corrupted image executes without
    /// faulting, it just computes garbage.
    fn register(&self, code: u16) -> u16 {
        self.registers.get(code as usize).copied().unwrap_or(0)
    }

    fn set_register(&mut self, code: u16, value: u16) {
        if let Some(register) = self.registers.get_mut(code as usize) {
            *register = value;
        }
    }

    /// Reads the memory word at `address`. Addresses beyond the capacity
    /// read as zero, and stores to them are dropped.
    fn mem(&self, address: u16) -> u16 {
        self.memory.get(address as usize).copied().unwrap_or(0)
    }

    fn set_mem(&mut self, address: u16, value: u16) {
        if let Some(word) = self.memory.get_mut(address as usize) {
            *word = value;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::compile;

    macro_rules! assert_register {
        ($machine:expr, $register:expr, $value:expr) => {
            assert_eq!(
                $machine.registers[$register], $value,
                "register {} != {}",
                $register, $value,
            );
        };
    }

    fn run_source(source: &str) -> Machine {
        let program = compile(source).expect("could not compile the program");
        let mut machine = Machine::new(program);

        machine.run().expect("the program faulted");

        machine
    }

    #[test]
    fn loader_points_ip_and_sp_into_the_shared_memory() {
        let program = compile("halt\n>main\nhalt").unwrap();
        let machine = Machine::new(program);

        assert_register!(machine, IP, 1);
        assert_register!(machine, SP, 2);

        for general in 0..8 {
            assert_register!(machine, general, 0);
        }
    }

    #[test]
    fn addition_wraps_modulo_two_to_the_sixteenth() {
        let machine = run_source("\
move r0 1111111111111111
move r1 1
add r0 r1
halt");

        assert_register!(machine, 0, 0);
    }

    #[test]
    fn a_smaller_left_operand_never_takes_jumplt() {
        let machine = run_source("\
move r0 11
move r1 101
cmp r0 r1
jumplt @less
move r2 1
halt
!less
move r2 10
halt");

        // cr holds the wrapped magnitude of 3 - 5, which is not below zero.
        assert_register!(machine, CR, 0u16.wrapping_sub(2));
        assert_register!(machine, 2, 1);
    }

    #[test]
    fn jumpge_is_taken_for_wrapped_differences() {
        let machine = run_source("\
move r0 11
cmp r0 101
jumpge @skip
move r2 1
halt
!skip
move r2 10
halt");

        assert_register!(machine, 2, 2);
    }

    #[test]
    fn push_then_pop_restores_value_and_stack_pointer() {
        let machine = run_source("\
move r0 101
push r0
move r0 0
pop r1
halt");

        assert_register!(machine, 1, 5);
        // Net of the pair, sp is back at the end of the program.
        assert_register!(machine, SP, 11);
    }

    #[test]
    fn call_returns_to_the_instruction_after_it() {
        let machine = run_source("\
>main
move r0 101
call <triple
halt
>triple
move r1 r0
add r0 r1
add r0 r1
ret");

        assert_register!(machine, 0, 15);
        assert_register!(machine, SP, 16);
        assert!(machine.halted);
    }

    #[test]
    fn execution_starts_at_the_entrypoint() {
        let machine = run_source("halt\n>main\nmove r0 1\nhalt");

        assert_register!(machine, 0, 1);
    }

    #[test]
    fn dereferenced_moves_go_through_memory() {
        let machine = run_source("\
move r0 1100000000
move *r0 101
move r1 *r0
halt");

        assert_eq!(machine.memory[0b1100000000], 5);
        assert_register!(machine, 1, 5);
    }

    #[test]
    fn unsigned_division_floors_and_zero_divisors_yield_zero() {
        let machine = run_source("\
move r0 111
div r0 10
move r1 111
mod r1 10
move r2 101
div r2 0
halt");

        assert_register!(machine, 0, 3);
        assert_register!(machine, 1, 1);
        assert_register!(machine, 2, 0);
    }

    #[test]
    fn negation_stores_the_wrapped_magnitude() {
        let machine = run_source("\
move r0 1
neg r0
move r1 0
not r1
halt");

        assert_register!(machine, 0, 0xFFFF);
        assert_register!(machine, 1, 0xFFFF);
    }

    #[test]
    fn unconditional_jump_skips_over_code() {
        let machine = run_source("jump @end\nmove r0 1\n!end\nhalt");

        assert_register!(machine, 0, 0);
    }

    #[test]
    fn an_undecodable_word_is_a_fault() {
        let mut program = compile("halt").unwrap();
        program.memory[0] = 0x00FF;

        let mut machine = Machine::new(program);

        assert_eq!(
            machine.step(),
            Err(Fault::UnknownOpcode {
                address: 0,
                opcode: 0x00FF,
            }),
        );
    }

    #[test]
    fn stepping_a_halted_machine_is_a_no_op() {
        let program = compile("halt").unwrap();
        let mut machine = Machine::new(program);

        let result = machine.step().unwrap();
        assert!(result.should_halt);
        assert!(machine.halted);

        let registers = machine.registers;
        let result = machine.step().unwrap();

        assert!(result.should_halt);
        assert_eq!(machine.registers, registers);
    }

    #[test]
    fn results_report_the_registers_an_instruction_touched() {
        let program = compile("move r0 r1\ncmp r0 r1\npush r0\nhalt").unwrap();
        let mut machine = Machine::new(program);

        let result = machine.step().unwrap();
        assert_eq!(result.register_read, Some(1));
        assert_eq!(result.register_modified, Some(0));
        assert!(!result.should_halt);

        let result = machine.step().unwrap();
        assert_eq!(result.register_modified, Some(CR as u16));

        let result = machine.step().unwrap();
        assert_eq!(result.register_read, Some(0));
    }

    #[test]
    fn a_move_into_ip_still_gets_the_ordinary_advance() {
        let program = compile("move ip 101").unwrap();
        let mut machine = Machine::new(program);

        machine.step().unwrap();

        // ip was set to 5 by the copy, then advanced by the width.
        assert_register!(machine, IP, 8);
    }
}
