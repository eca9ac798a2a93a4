//! services/api/src/bin/openapi.rs
//!
//! Publishes the OpenAPI document for the REST API.
//!
//! ```text
//! openapi [PATH]          write the document (default `openapi.json`)
//! openapi -               print it to stdout
//! openapi --check [PATH]  fail when the file no longer matches the routes
//! ```

use api_lib::error::ApiError;
use api_lib::web::rest::{document_is_current, render_document};

const DEFAULT_PATH: &str = "openapi.json";
const USAGE: &str = "usage: openapi [--check] [PATH|-]";

enum Command {
    Write(String),
    Print,
    Check(String),
}

fn parse_args(args: impl Iterator<Item = String>) -> Result<Command, ApiError> {
    let mut check = false;
    let mut path = None;
    for arg in args {
        if arg == "--check" {
            check = true;
        } else if arg == "-h" || arg == "--help" || path.is_some() {
            return Err(ApiError::BadRequest(USAGE.to_string()));
        } else if arg.starts_with("--") {
            return Err(ApiError::BadRequest(format!("unknown flag {arg}; {USAGE}")));
        } else {
            path = Some(arg);
        }
    }
    let stdout = path.as_deref() == Some("-");
    let path = path.unwrap_or_else(|| DEFAULT_PATH.to_string());
    match (check, stdout) {
        (true, true) => Err(ApiError::BadRequest(USAGE.to_string())),
        (false, true) => Ok(Command::Print),
        (true, false) => Ok(Command::Check(path)),
        (false, false) => Ok(Command::Write(path)),
    }
}

fn main() -> Result<(), ApiError> {
    match parse_args(std::env::args().skip(1))? {
        Command::Print => print!("{}", render_document()?),
        Command::Write(path) => {
            std::fs::write(&path, render_document()?)?;
            println!("OpenAPI document written to {path}");
        }
        Command::Check(path) => {
            let existing = std::fs::read_to_string(&path)?;
            if !document_is_current(&existing)? {
                return Err(ApiError::Internal(format!(
                    "{path} is out of date; regenerate it with `cargo run --bin openapi`"
                )));
            }
            println!("{path} is up to date");
        }
    }
    Ok(())
}
