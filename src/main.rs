use std::process::ExitCode;

fn main() -> ExitCode {
    env_logger::init();

    match arrowvm_rust::run() {
        Ok(outcome) => ExitCode::from(outcome.exit_code()),
        Err(e) => {
            eprintln!("arrowvm: {e:#}");
            ExitCode::from(3)
        }
    }
}
