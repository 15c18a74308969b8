// Output parsing and field extraction

pub mod extract;
pub mod parser;

pub use extract::apply_extraction;
pub use parser::{parse, ParsedOutput};
