//! CLI subcommands

pub mod lookup;
pub mod simulate;
