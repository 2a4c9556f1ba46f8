use tm16::{assembler::compile, emulator::Machine, Program};

use slog::{o, Drain, Logger};
use slog_term::{FullFormat, TermDecorator};

fn compile_program() -> Program {
    let source_code = include_str!("countdown.t16");

    compile(source_code).expect("could not compile the source code")
}

#[test]
fn test_countdown() {
    let program = compile_program();

    let decorator = TermDecorator::new().build();
    let drain = FullFormat::new(decorator).build().fuse();
    let drain = slog_async::Async::new(drain).build().fuse();
    let logger = Logger::root(drain, o!());

    let mut machine = Machine::with_logger(program, logger);
    let mut cycles = 0;

    while !machine.halted && cycles < 100 {
        machine.step().expect("error while executing the program");
        cycles += 1;
    }

    assert!(machine.halted, "the countdown did not halt within {} cycles", cycles);
    assert_eq!(machine.registers[0], 0);
    assert_eq!(machine.registers[1], 0xFFFF);
}
