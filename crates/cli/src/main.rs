use std::{env, io, process::ExitCode};

use taskrun::{Orchestrator, modules};
use taskrun_engine::catalog;

fn main() -> ExitCode {
    let args: Vec<String> = env::args().skip(1).collect();
    let orchestrator = Orchestrator::new(modules::shipped());
    let mut catalog = catalog::global();
    let outcome = orchestrator.run(&mut catalog, &args, &mut io::stdout(), &mut io::stderr());
    ExitCode::from(u8::try_from(outcome.exit_code).unwrap_or(1))
}
