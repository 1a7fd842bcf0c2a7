//! CLI argument definitions

use clap::Parser;

use crate::domain::ToolError;

#[derive(Parser)]
#[command(
    name = "symscope",
    about = "Resolve addresses of this process to shared objects and source lines",
    after_help = "\
EXAMPLES:
    symscope 0x55d0c0a01234                       Resolve one address
    symscope --dlopen /usr/lib/libm.so.6 cos      Open a library, resolve a symbol in it
    symscope --dlopen ./libfoo.so --close --list  Open, close, then list all objects"
)]
pub struct Args {
    /// Addresses (0x...) or symbol names to resolve
    #[arg(value_name = "TARGET")]
    pub targets: Vec<String>,

    /// dlopen a library before resolving (repeatable)
    #[arg(long, value_name = "PATH")]
    pub dlopen: Vec<String>,

    /// Close the opened libraries again after resolving
    #[arg(long, requires = "dlopen")]
    pub close: bool,

    /// List tracked load-time, run-time and closed objects
    #[arg(short, long)]
    pub list: bool,

    /// Emit JSON instead of text
    #[arg(long)]
    pub json: bool,

    /// Additional object path pattern to skip (repeatable)
    #[arg(long, value_name = "PATTERN")]
    pub ignore: Vec<String>,

    /// Suppress non-essential output
    #[arg(short, long)]
    pub quiet: bool,
}

/// A resolution target given on the command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Address(usize),
    Symbol(String),
}

impl Target {
    /// `0x`-prefixed input is an address, anything else a symbol name.
    ///
    /// # Errors
    /// When the hex digits after `0x` do not parse.
    pub fn parse(raw: &str) -> Result<Self, ToolError> {
        match raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
            Some(hex) => usize::from_str_radix(hex, 16)
                .map(Target::Address)
                .map_err(|_| ToolError::InvalidTarget(raw.to_string())),
            None if raw.is_empty() => Err(ToolError::InvalidTarget(raw.to_string())),
            None => Ok(Target::Symbol(raw.to_string())),
        }
    }
}
