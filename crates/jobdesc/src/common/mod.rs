pub mod arraydef;
pub mod arrayparser;
pub mod cli;
pub mod env;
pub mod error;
pub mod manager;
pub mod memory;
pub mod parser;
pub mod parser2;
pub mod placeholders;
pub mod setup;
pub mod utils;
