use std::fs;

use anyhow::{Context, Result};
use clap::Parser;

mod codegen;
mod commandline;
mod listing;
mod tac;

fn main() -> Result<()> {
    let options = commandline::Options::parse();

    stderrlog::new().verbosity(options.verbose).init()?;

    let source = fs::read_to_string(&options.file)
        .with_context(|| format!("could not read '{}'", options.file))?;

    let program = tac::parse(&source)?;
    let assembly = codegen::generate(&program)?;
    print!("{}", assembly);

    Ok(())
}
