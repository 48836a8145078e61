use nom::character::complete::{char, one_of, space0};
use nom::combinator::{map_res, opt};
use nom::sequence::tuple;
use nom_supreme::ParserExt;

use crate::common::parser::{NomResult, consume_all, p_u64};

pub const KIB: u64 = 1024;
pub const MIB: u64 = KIB * 1024;
pub const GIB: u64 = MIB * 1024;
pub const TIB: u64 = GIB * 1024;

fn unit_multiplier(unit: Option<char>) -> u64 {
    match unit.map(|c| c.to_ascii_uppercase()) {
        Some('K') => KIB,
        Some('M') => MIB,
        Some('G') => GIB,
        Some('T') => TIB,
        _ => 1,
    }
}

fn p_memory(input: &str) -> NomResult<u64> {
    map_res(
        tuple((
            p_u64,
            space0,
            opt(one_of("kKmMgGtT")),
            opt(char('i')),
            opt(one_of("bB")),
        ))
        .context("memory amount (e.g. 512M, 40G)"),
        |(amount, _, unit, _, _)| {
            amount
                .checked_mul(unit_multiplier(unit))
                .ok_or_else(|| anyhow::anyhow!("Memory amount is too large"))
        },
    )(input)
}

/// Parses a memory amount in bytes. Units are binary, `40G` is 40 GiB.
/// Amounts without a unit are bytes.
pub fn parse_memory(input: &str) -> anyhow::Result<u64> {
    consume_all(p_memory, input.trim())
}

/// Parses a memory amount where a plain number is a count of `default_unit`s
/// (Slurm treats `--mem-per-cpu=4000` as megabytes).
pub fn parse_memory_with_default_unit(input: &str, default_unit: u64) -> anyhow::Result<u64> {
    let input = input.trim();
    if !input.is_empty() && input.chars().all(|c| c.is_ascii_digit()) {
        let amount: u64 = input.parse()?;
        amount
            .checked_mul(default_unit)
            .ok_or_else(|| anyhow::anyhow!("Memory amount is too large"))
    } else {
        parse_memory(input)
    }
}

/// Splits `bytes` into an amount and the largest unit from `units` that divides it exactly.
/// Amounts that are not a multiple of the smallest unit are rounded up.
pub(crate) fn split_memory_units<'a>(bytes: u64, units: &[(u64, &'a str)]) -> (u64, &'a str) {
    for &(size, suffix) in units.iter().rev() {
        if bytes % size == 0 {
            return (bytes / size, suffix);
        }
    }
    let (size, suffix) = units[0];
    (bytes.div_ceil(size), suffix)
}

/// Formats memory in a human readable way for tables.
pub fn format_memory(bytes: u64) -> String {
    let units = [(TIB, "TiB"), (GIB, "GiB"), (MIB, "MiB"), (KIB, "KiB")];
    for (size, suffix) in units {
        if bytes >= size {
            let value = bytes as f64 / size as f64;
            return if bytes % size == 0 {
                format!("{} {suffix}", bytes / size)
            } else {
                format!("{value:.2} {suffix}")
            };
        }
    }
    format!("{bytes} B")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::utils::check_parse_error;

    #[test]
    fn parse_memory_units() {
        assert_eq!(parse_memory("100").unwrap(), 100);
        assert_eq!(parse_memory("4K").unwrap(), 4 * KIB);
        assert_eq!(parse_memory("512M").unwrap(), 512 * MIB);
        assert_eq!(parse_memory("40G").unwrap(), 40 * GIB);
        assert_eq!(parse_memory("40GB").unwrap(), 40 * GIB);
        assert_eq!(parse_memory("40 GiB").unwrap(), 40 * GIB);
        assert_eq!(parse_memory("1t").unwrap(), TIB);
    }

    #[test]
    fn parse_memory_invalid() {
        assert!(parse_memory("").is_err());
        assert!(parse_memory("G").is_err());
        assert!(parse_memory("10X").is_err());
        assert!(parse_memory("99999999999999999999T").is_err());
    }

    #[test]
    fn parse_memory_error_has_context() {
        check_parse_error(
            p_memory,
            "G",
            "Parse error\nexpected memory amount (e.g. 512M, 40G) at \"G\"\nParser error at \"G\": expecting Satisfy",
        );
    }

    #[test]
    fn parse_memory_default_unit() {
        assert_eq!(
            parse_memory_with_default_unit("4000", MIB).unwrap(),
            4000 * MIB
        );
        assert_eq!(parse_memory_with_default_unit("2G", MIB).unwrap(), 2 * GIB);
    }

    #[test]
    fn split_units() {
        let units = [(KIB, "K"), (MIB, "M"), (GIB, "G")];
        assert_eq!(split_memory_units(40 * GIB, &units), (40, "G"));
        assert_eq!(split_memory_units(1536 * MIB, &units), (1536, "M"));
        assert_eq!(split_memory_units(1000, &units), (1, "K"));
        assert_eq!(split_memory_units(1025, &units), (2, "K"));
    }

    #[test]
    fn format_memory_for_humans() {
        assert_eq!(format_memory(40 * GIB), "40 GiB");
        assert_eq!(format_memory(1536 * MIB), "1.50 GiB");
        assert_eq!(format_memory(12), "12 B");
    }
}
