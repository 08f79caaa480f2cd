//! `bson-unpack`: decode a BSON document (stdin) to Extended JSON (stdout).
//!
//! Usage:
//!   bson-unpack [--relaxed | --canonical] [--pretty]

use docpack::cli::{init_logging, unpack, UnpackFlags};
use std::io::{self, Read, Write};

fn main() {
    init_logging();

    let flags = match UnpackFlags::from_args(std::env::args().skip(1)) {
        Ok(flags) => flags,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(2);
        }
    };

    let mut buf = Vec::new();
    if let Err(e) = io::stdin().read_to_end(&mut buf) {
        eprintln!("{e}");
        std::process::exit(1);
    }

    let result = unpack(&buf, flags).and_then(|json| {
        let mut out = io::stdout();
        out.write_all(json.as_bytes())?;
        Ok(out.write_all(b"\n")?)
    });
    if let Err(e) = result {
        eprintln!("{e}");
        std::process::exit(1);
    }
}
