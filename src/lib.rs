//! A crate for assembling and executing programs for the TM16 toy register
//! machine: a 16-bit, word-addressed architecture with 1024 words of memory,
//! eight general purpose registers and an upward-growing stack that shares
//! the program's address space.
//!
//! Currently this crate provides the functionality to:
//! - Assemble TM16 source text into a fixed-size binary memory image.
//! - Execute an image one instruction at a time, or until it halts.
//!
//! # The source language
//!
//! One instruction per line, operands separated by spaces. Numeric literals
//! are binary digit strings of up to 16 digits. `!name` defines a label and
//! `@name` references it; `>name` defines a procedure and `<name` calls it;
//! `*reg` addresses memory through a register. Lines starting with `#` are
//! comments. Execution begins at the procedure named `main` when one is
//! defined, otherwise at address 0.
//!
//! # Example
//! ```
//! use tm16::{assembler::compile, emulator::Machine};
//!
//! // Add 5 and 3 and leave the sum in r0.
//! let source = "\
//! >main
//! move r0 101
//! move r1 11
//! add r0 r1
//! halt";
//!
//! let program = compile(source)
//!     .expect("could not compile the program");
//!
//! let mut machine = Machine::new(program);
//!
//! machine.run()
//!     .expect("an error occured while executing the program");
//!
//! assert_eq!(machine.registers[0], 0b1000);
//! ```
//!
//! # Executables
//!
//! ## `tm16run`
//!
//! Compiles and executes a source file, then prints the final register
//! file. Built with the `tm16run` feature. `--trace` logs every executed
//! instruction.
pub mod assembler;
pub mod emulator;
pub mod error;
pub mod instruction;
pub mod program;
pub mod source_map;

pub use assembler::compile;
pub use emulator::{InstructionResult, Machine};
pub use program::Program;
