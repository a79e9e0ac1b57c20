pub mod grammar;
pub mod node;
pub mod parser;
