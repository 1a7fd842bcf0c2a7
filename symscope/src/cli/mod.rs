//! Command-line interface of the `symscope` binary

pub mod args;

pub use args::{Args, Target};
