//! `bson-pack`: encode Extended JSON (stdin) to a BSON document (stdout).
//!
//! Usage:
//!   bson-pack

use docpack::cli::{init_logging, pack};
use std::io::{self, Read, Write};

fn main() {
    init_logging();

    let mut buf = String::new();
    if let Err(e) = io::stdin().read_to_string(&mut buf) {
        eprintln!("{e}");
        std::process::exit(1);
    }

    let result = pack(&buf).and_then(|bytes| Ok(io::stdout().write_all(&bytes)?));
    if let Err(e) = result {
        eprintln!("{e}");
        std::process::exit(1);
    }
}
