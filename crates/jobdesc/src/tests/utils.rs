use std::path::Path;

use crate::common::parser::{NomResult, consume_all};
use crate::common::parser2::CharParser;

pub fn check_parse_error<F: FnMut(&str) -> NomResult<O>, O>(
    parser: F,
    input: &str,
    expected_error: &str,
) {
    match consume_all(parser, input) {
        Err(e) => {
            let output = format!("{:?}", e);
            assert_eq!(output, expected_error);
        }
        _ => panic!("The parser should have failed"),
    }
}

/// Runs a `chumsky` parser on `input` and returns the formatted error message.
pub fn expect_parser_error<T: std::fmt::Debug>(parser: impl CharParser<T>, input: &str) -> String {
    match parser.parse_text(input) {
        Err(e) => e.to_string(),
        Ok(value) => panic!("The parser should have failed, but it returned {value:?}"),
    }
}

/// Reads a file that a test expects to exist.
pub fn read_file(path: &Path) -> String {
    std::fs::read_to_string(path)
        .unwrap_or_else(|e| panic!("Cannot read {}: {e}", path.display()))
}
