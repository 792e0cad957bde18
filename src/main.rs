use phasegate::core::decision::EXIT_INTERNAL;
use std::process::exit;

fn main() {
    match phasegate::run() {
        Ok(code) => exit(code),
        Err(e) => {
            eprintln!("phasegate: {}", e);
            exit(EXIT_INTERNAL);
        }
    }
}
