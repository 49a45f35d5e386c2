use std::path::PathBuf;

use gclog::runtime::{boot, report};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    boot::init_logging();
    let config = boot::boot()?;

    let path = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .ok_or("usage: gclog <gc-log-file>")?;
    report::report(&path, &config)
}
