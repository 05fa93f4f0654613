use clap::Parser;

#[derive(Debug, Parser)]
#[clap(about = "A code generator turning three-address code into x86 assembly")]
pub struct Options {
    /// Path to the TAC input file
    pub file: String,
    #[clap(short, long, default_value_t = 1)]
    /// Logging verbosity; raise for allocator and liveness diagnostics
    pub verbose: usize,
}
