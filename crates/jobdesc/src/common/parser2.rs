use anyhow::anyhow;
use chumsky::Parser;
use chumsky::error::{Simple, SimpleReason};
use chumsky::primitive::{end, filter, just};
use colored::Color;

pub type ParseError = Simple<char>;

/// Parser over a stream of characters that reports errors with a pointer into the input.
pub trait CharParser<T>: Parser<char, T, Error = ParseError> + Sized {
    fn parse_text(&self, input: &str) -> anyhow::Result<T> {
        self.parse(input)
            .map_err(|errors| anyhow!("{}", format_errors_cli(input, errors)))
    }
}
impl<T, P> CharParser<T> for P where P: Parser<char, T, Error = ParseError> {}

#[cfg(not(test))]
fn color_string<S: AsRef<str>>(string: S, color: Color) -> colored::ColoredString {
    use colored::Colorize;
    string.as_ref().color(color)
}

#[cfg(test)]
fn color_string<S: AsRef<str>>(string: S, _color: Color) -> String {
    string.as_ref().to_string()
}

fn describe_expected(error: &ParseError) -> String {
    let mut expected = error
        .expected()
        .map(|expected| match expected {
            Some(c) => c.to_string(),
            None => "<end of input>".to_string(),
        })
        .collect::<Vec<_>>();
    if expected.is_empty() {
        return "something else".to_string();
    }
    expected.sort_unstable();
    expected
        .into_iter()
        .map(|item| color_string(item, Color::Blue).to_string())
        .collect::<Vec<_>>()
        .join(" or ")
}

/// Formats the first `chumsky` error into a (optionally colored) message that points
/// at the offending part of `input`.
pub fn format_errors_cli(input: &str, errors: Vec<ParseError>) -> String {
    use chumsky::Span;
    use std::fmt::Write;

    let Some(error) = errors.into_iter().next() else {
        return format!("Cannot parse `{input}`");
    };

    let mut output = String::new();
    let _ = writeln!(
        output,
        "{} found{}, expected {}:",
        if error.found().is_some() {
            "Unexpected token"
        } else {
            "Unexpected end of input"
        },
        error
            .label()
            .map(|label| format!(
                " while attempting to parse {}",
                color_string(label, Color::Yellow)
            ))
            .unwrap_or_default(),
        describe_expected(&error)
    );

    if input.is_empty() {
        output.push_str("(the input was empty)");
        return output;
    }

    let span = error.span();
    let (start, len) = (span.start(), span.end().saturating_sub(span.start()));
    let before: String = input.chars().take(start).collect();
    let marked: String = input.chars().skip(start).take(len).collect();
    let after: String = input.chars().skip(start + len).collect();
    let _ = writeln!(
        output,
        "  {before}{}{after}",
        color_string(marked, Color::Red)
    );

    let note = match error.reason() {
        SimpleReason::Custom(msg) => msg.clone(),
        _ => match error.found() {
            Some(c) => format!("Unexpected token `{c}`"),
            None => "Unexpected end of input".to_string(),
        },
    };
    let _ = writeln!(
        output,
        "{}{}",
        " ".repeat(2 + start),
        color_string(format!("^ {note}"), Color::Red)
    );
    output
}

fn parse_integer_string() -> impl CharParser<String> {
    let digit = filter(|c: &char| c.is_ascii_digit());
    let digit_or_underscore = just('_').or(digit).repeated();

    digit
        .chain(digit_or_underscore)
        .map(|chars| {
            chars
                .into_iter()
                .filter(|c| c.is_ascii_digit())
                .collect::<String>()
        })
        .labelled("number")
}

/// Parse 4-byte integer.
pub fn parse_u32() -> impl CharParser<u32> {
    parse_integer_string().try_map(|p, span| {
        p.parse::<u32>()
            .map_err(|_| Simple::custom(span, "Cannot parse as 4-byte unsigned integer"))
    })
}

/// Return a parser that will fail if there is any input following the text parsed by the
/// provided parser.
pub fn all_consuming<T>(parser: impl CharParser<T>) -> impl CharParser<T> {
    parser.then_ignore(end())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::utils::expect_parser_error;

    #[test]
    fn test_parse_u32() {
        assert_eq!(parse_u32().parse_text("0").unwrap(), 0);
        assert_eq!(parse_u32().parse_text("1019").unwrap(), 1019);
        assert_eq!(parse_u32().parse_text("1_000").unwrap(), 1000);
    }

    #[test]
    fn test_parse_u32_empty() {
        insta::assert_snapshot!(expect_parser_error(parse_u32(), ""), @r###"
        Unexpected end of input found while attempting to parse number, expected something else:
        (the input was empty)
        "###);
    }

    #[test]
    fn test_parse_u32_invalid() {
        insta::assert_snapshot!(expect_parser_error(parse_u32(), "x"), @r###"
        Unexpected token found while attempting to parse number, expected something else:
          x
          ^ Unexpected token `x`
        "###);
    }

    #[test]
    fn test_parse_u32_overflow() {
        assert!(parse_u32().parse_text("99999999999").is_err());
    }
}
