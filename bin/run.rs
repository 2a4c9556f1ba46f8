use tm16::{
    assembler,
    emulator::Machine,
    error::{CompileError, Fault},
    instruction::Register,
};

use clap::{App, Arg, ArgMatches};
use slog::{o, Discard, Drain, Logger};
use slog_term::{FullFormat, TermDecorator};

enum Error {
    Compile(Vec<CompileError>),
    Execution { fault: Fault, line: Option<usize> },
    Io(std::io::Error),
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Error {
        Error::Io(e)
    }
}

impl From<Vec<CompileError>> for Error {
    fn from(errors: Vec<CompileError>) -> Error {
        Error::Compile(errors)
    }
}

fn parse_arguments() -> ArgMatches<'static> {
    App::new("tm16run")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Utility for assembling and executing TM16 programs")
        .arg(Arg::with_name("source")
             .help("File containing assembly source")
             .value_name("SOURCE")
             .required(true)
             .index(1))
        .arg(Arg::with_name("trace")
             .help("Log every executed instruction")
             .short("t")
             .long("trace"))
        .get_matches()
}

fn main() {
    let args = parse_arguments();

    let file_path = args.value_of("source").unwrap();

    match run(file_path, args.is_present("trace")) {
        Ok(()) => (),
        Err(Error::Io(io)) => {
            eprintln!("IO error: {}", io);
            std::process::exit(1);
        }
        Err(Error::Compile(errors)) => {
            for error in errors {
                eprintln!("{}", error);
            }
            std::process::exit(1);
        }
        Err(Error::Execution { fault, line }) => {
            match line {
                Some(line) => eprintln!("fault: {} (line {})", fault, line),
                None => eprintln!("fault: {}", fault),
            }
            std::process::exit(1);
        }
    }
}

fn logger(trace: bool) -> Logger {
    if trace {
        let decorator = TermDecorator::new().build();
        let drain = FullFormat::new(decorator).build().fuse();
        let drain = slog_async::Async::new(drain).build().fuse();

        Logger::root(drain, o!())
    } else {
        Logger::root(Discard, o!())
    }
}

fn run(file_path: &str, trace: bool) -> Result<(), Error> {
    let source = std::fs::read_to_string(file_path)?;

    let logger = logger(trace);

    let program = assembler::compile_with_logger(&source, logger.clone())?;

    let mut machine = Machine::with_logger(program, logger);

    if let Err(fault) = machine.run() {
        let Fault::UnknownOpcode { address, .. } = fault;

        return Err(Error::Execution {
            fault,
            line: machine.source_map.source_line(address),
        });
    }

    for register in &Register::ALL {
        let value = machine.registers[register.index()];
        println!("{:<2} = {:5} ({:#018b})", register, value, value);
    }

    Ok(())
}
