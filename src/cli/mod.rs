pub mod args;

use clap::Parser;
pub use args::{Arguments, PacbioModel};

pub fn parse() -> Arguments {
    Arguments::parse()
}
