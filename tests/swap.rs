use tm16::{assembler::compile, emulator::Machine, instruction::Register};

#[test]
fn test_swap() {
    let program = compile(include_str!("swap.t16"))
        .expect("could not compile the source code");

    assert_eq!(program.entrypoint, 0);
    assert_eq!(program.size, 17);

    let mut machine = Machine::new(program);

    machine.run().expect("error while executing the program");

    assert_eq!(machine.registers[0], 0b10);
    assert_eq!(machine.registers[1], 0b1);

    // The call/ret and push/pop pairs cancel out.
    assert_eq!(machine.registers[Register::Sp.index()], 17);
}
