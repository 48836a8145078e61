use crate::common::arraydef::{IntArray, IntRange};
use crate::common::parser2::{CharParser, ParseError, all_consuming, parse_u32};
use chumsky::Parser;
use chumsky::primitive::just;
use chumsky::text::TextParser;

/// Parse integer range in the format n[-end][:step].
fn parse_range() -> impl CharParser<IntRange> {
    let start = parse_u32().labelled("start");
    let end = just("-").ignore_then(parse_u32()).labelled("end").or_not();
    let step = just(":").ignore_then(parse_u32()).labelled("step").or_not();

    let parser = start.then(end).then(step);
    parser
        .try_map(|((start, end), step), span| match (start, end, step) {
            (v, None, None) => Ok(IntRange::single(v)),
            (v, Some(w), None) if w >= v => Ok(IntRange::new(v, w, 1)),
            (v, Some(w), Some(x)) if w >= v && x <= w - v && x > 0 => Ok(IntRange::new(v, w, x)),
            _ => Err(ParseError::custom(span, "Invalid range")),
        })
        .labelled("Integer range")
}

/// Parses integer ranges separated by commas.
fn parse_ranges() -> impl CharParser<Vec<IntRange>> {
    parse_range().padded().separated_by(just(',')).at_least(1)
}

/// Parses a list of integer ranges separated by commas.
/// Checks that the ranges do not overlap.
fn parse_ranges_without_overlap() -> impl CharParser<IntArray> {
    parse_ranges().try_map(|ranges, span| {
        if is_overlapping(&ranges) {
            return Err(ParseError::custom(span, "Ranges overlap"));
        }
        let count: u64 = ranges.iter().map(|range| range.len()).sum();
        if count > u32::MAX as u64 {
            return Err(ParseError::custom(span, "Too many indices"));
        }
        Ok(IntArray::new(ranges))
    })
}

fn is_overlapping(ranges: &[IntRange]) -> bool {
    ranges
        .iter()
        .enumerate()
        .any(|(index, range)| ranges[index + 1..].iter().any(|other| range.intersects(other)))
}

fn parse_array_inner() -> impl CharParser<IntArray> {
    all_consuming(parse_ranges_without_overlap())
}

/// Parses integer ranges separated by commas.
/// Makes sure that the ranges do not overlap.
pub fn parse_array(input: &str) -> anyhow::Result<IntArray> {
    parse_array_inner().parse_text(input)
}

fn parse_throttled_array_inner() -> impl CharParser<(IntArray, Option<u32>)> {
    let limit = just('%')
        .ignore_then(parse_u32())
        .try_map(|limit, span| match limit {
            0 => Err(ParseError::custom(span, "Concurrency limit must be positive")),
            n => Ok(n),
        })
        .labelled("concurrency limit")
        .or_not();
    all_consuming(parse_ranges_without_overlap().then(limit))
}

/// Parses an array in the Slurm `--array` syntax, i.e. ranges optionally followed by
/// `%<limit>` that caps the number of simultaneously running tasks.
pub fn parse_throttled_array(input: &str) -> anyhow::Result<(IntArray, Option<u32>)> {
    parse_throttled_array_inner().parse_text(input)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::tests::utils::expect_parser_error;

    #[test]
    fn test_parse_array_def() {
        assert_eq!(
            parse_array("34").unwrap().iter().collect::<Vec<_>>(),
            vec![34]
        );
        assert_eq!(
            parse_array("34-40").unwrap().iter().collect::<Vec<_>>(),
            vec![34, 35, 36, 37, 38, 39, 40]
        );
        assert_eq!(
            parse_array("101-101").unwrap().iter().collect::<Vec<_>>(),
            vec![101]
        );
        assert!(parse_array("101-100").is_err());
    }

    #[test]
    fn test_parse_arrays_def() {
        assert_eq!(
            parse_array("34,35,36").unwrap().iter().collect::<Vec<_>>(),
            vec![34, 35, 36]
        );
        assert_eq!(
            parse_array("34-40,45").unwrap().iter().collect::<Vec<_>>(),
            vec![34, 35, 36, 37, 38, 39, 40, 45]
        );
        assert_eq!(
            parse_array("0-10:2").unwrap().iter().collect::<Vec<_>>(),
            vec![0, 2, 4, 6, 8, 10]
        );
        assert!(parse_array("0-10, 5").is_err());
    }

    #[test]
    fn test_parse_array_error() {
        insta::assert_snapshot!(expect_parser_error(parse_array_inner(), "12-x"), @r###"
        Unexpected token found while attempting to parse number, expected something else:
          12-x
             ^ Unexpected token `x`
        "###);
    }

    #[test]
    fn test_parse_throttled_array() {
        let (array, limit) = parse_throttled_array("0-9%2").unwrap();
        assert_eq!(array.id_count(), 10);
        assert_eq!(limit, Some(2));

        let (array, limit) = parse_throttled_array("1,3").unwrap();
        assert_eq!(array.iter().collect::<Vec<_>>(), vec![1, 3]);
        assert_eq!(limit, None);

        assert!(parse_throttled_array("0-9%0").is_err());
        assert!(parse_throttled_array("0-9%").is_err());
    }

    #[test]
    fn test_parse_array_overlap() {
        let error = parse_array("0-5,3").unwrap_err().to_string();
        assert!(error.contains("Ranges overlap"), "{error}");
        assert!(parse_array("6-10:2,0-12:3").is_err());
        assert!(parse_array("0-10:2,1-9:2").is_ok());
        assert!(parse_array("0-4000000000,4000000001-4000000002").is_ok());
        assert!(parse_array("0-4000000000:2,3999999999-4000000000").is_err());
    }

    #[test]
    fn test_parse_array_max_index() {
        let array = parse_array("4294967295").unwrap();
        assert_eq!(array.iter().collect::<Vec<_>>(), vec![u32::MAX]);
        assert_eq!(array.id_count(), 1);

        let array = parse_array("4294967290-4294967295:5").unwrap();
        assert_eq!(array.iter().collect::<Vec<_>>(), vec![4294967290, u32::MAX]);

        let array = parse_array("1-4294967295").unwrap();
        assert_eq!(array.id_count(), u32::MAX);
        let error = parse_array("0-4294967295").unwrap_err().to_string();
        assert!(error.contains("Too many indices"), "{error}");
    }
}
