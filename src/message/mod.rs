//! Decoding of the CLI's stream-json output

pub mod parser;

pub use parser::{parse_line, parse_message};
