use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::ArrayTaskId;
use crate::common::arrayparser::parse_array;

/// Arithmetic progression of array indices: every `step`-th value from `start` up to `end`.
/// `end` is inclusive and always a member of the range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntRange {
    pub start: u32,
    pub end: u32,
    pub step: u32,
}

impl IntRange {
    /// `end` is rounded down to the last member of the progression.
    pub fn new(start: u32, end: u32, step: u32) -> IntRange {
        let step = step.max(1);
        let end = start + (end.max(start) - start) / step * step;
        let step = if start == end { 1 } else { step };
        IntRange { start, end, step }
    }

    pub fn single(id: u32) -> IntRange {
        IntRange::new(id, id, 1)
    }

    pub fn is_single(&self) -> bool {
        self.start == self.end
    }

    pub fn iter(&self) -> impl Iterator<Item = u32> + use<> {
        (self.start..=self.end).step_by(self.step as usize)
    }

    pub fn contains(&self, value: u32) -> bool {
        self.start <= value && value <= self.end && (value - self.start) % self.step == 0
    }

    pub fn len(&self) -> u64 {
        ((self.end - self.start) / self.step) as u64 + 1
    }

    /// Checks whether the two progressions share at least one value.
    pub fn intersects(&self, other: &IntRange) -> bool {
        let lo = self.start.max(other.start) as i128;
        let hi = self.end.min(other.end) as i128;
        if lo > hi {
            return false;
        }
        let (a, s) = (self.start as i128, self.step as i128);
        let (b, t) = (other.start as i128, other.step as i128);
        let (gcd, p, _) = extended_gcd(s, t);
        if (b - a) % gcd != 0 {
            return false;
        }
        // Smallest common value is `x0` modulo `lcm`
        let lcm = s / gcd * t;
        let x0 = a + s * ((b - a) / gcd * p).rem_euclid(t / gcd);
        lo + (x0 - lo).rem_euclid(lcm) <= hi
    }
}

/// Returns `(gcd, x, y)` such that `a * x + b * y == gcd`.
fn extended_gcd(a: i128, b: i128) -> (i128, i128, i128) {
    if b == 0 {
        (a, 1, 0)
    } else {
        let (gcd, x, y) = extended_gcd(b, a % b);
        (gcd, y, x - (a / b) * y)
    }
}

/// Set of array indices, written as comma separated ranges (`0-10:2,15`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntArray {
    ranges: Vec<IntRange>,
}

impl IntArray {
    pub fn new(ranges: Vec<IntRange>) -> IntArray {
        IntArray { ranges }
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn from_sorted_ids(ids: impl Iterator<Item = ArrayTaskId>) -> IntArray {
        let mut ranges: Vec<IntRange> = Vec::new();
        for id in ids {
            match ranges.last_mut() {
                Some(last) if last.step == 1 && last.end.checked_add(1) == Some(id) => {
                    last.end = id
                }
                _ => ranges.push(IntRange::single(id)),
            }
        }
        IntArray { ranges }
    }

    pub fn from_id(id: ArrayTaskId) -> IntArray {
        IntArray {
            ranges: vec![IntRange::single(id)],
        }
    }

    /// Number of indices in the array. Parsed arrays always fit into `u32`.
    #[inline]
    pub fn id_count(&self) -> u32 {
        let count: u64 = self.ranges.iter().map(|x| x.len()).sum();
        u32::try_from(count).unwrap_or(u32::MAX)
    }

    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = ArrayTaskId> + '_ {
        self.ranges.iter().flat_map(|x| x.iter())
    }

    #[inline]
    pub fn contains(&self, id: ArrayTaskId) -> bool {
        self.ranges.iter().any(|range| range.contains(id))
    }

    /// Returns the array as one arithmetic progression, if it can be expressed that way.
    pub fn as_single_range(&self) -> Option<IntRange> {
        let mut ranges = self.ranges.clone();
        ranges.sort_unstable_by_key(|range| range.start);
        let mut ranges = ranges.into_iter();
        let mut merged = ranges.next()?;
        for range in ranges {
            let gap = range.start.checked_sub(merged.end).filter(|gap| *gap > 0)?;
            let step = match (merged.is_single(), range.is_single()) {
                (true, true) => gap,
                (true, false) => range.step,
                (false, true) => merged.step,
                (false, false) if merged.step == range.step => merged.step,
                (false, false) => return None,
            };
            if gap != step {
                return None;
            }
            merged = IntRange::new(merged.start, range.end, step);
        }
        Some(merged)
    }
}

impl FromStr for IntArray {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_array(s)
    }
}

impl fmt::Display for IntArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, x) in self.ranges.iter().enumerate() {
            if idx > 0 {
                write!(f, ",")?;
            }
            if x.is_single() {
                write!(f, "{}", x.start)?;
            } else if x.step == 1 {
                write!(f, "{}-{}", x.start, x.end)?;
            } else {
                write!(f, "{}-{}:{}", x.start, x.end, x.step)?;
            }
        }
        Ok(())
    }
}

impl Serialize for IntArray {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for IntArray {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum ArrayInput {
            Id(u32),
            Text(String),
        }

        match ArrayInput::deserialize(deserializer)? {
            ArrayInput::Id(id) => Ok(IntArray::from_id(id)),
            ArrayInput::Text(text) => parse_array(&text).map_err(serde::de::Error::custom),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::common::arraydef::{IntArray, IntRange};

    #[test]
    fn range_iterate() {
        assert_eq!(
            IntRange::new(1, 5, 1).iter().collect::<Vec<_>>(),
            vec![1, 2, 3, 4, 5]
        );
        assert_eq!(
            IntRange::new(2, 10, 3).iter().collect::<Vec<_>>(),
            vec![2, 5, 8]
        );
        assert_eq!(
            IntRange::new(2, 11, 3).iter().collect::<Vec<_>>(),
            vec![2, 5, 8, 11]
        );
    }

    #[test]
    fn range_end_is_last_member() {
        assert_eq!(IntRange::new(2, 10, 3).end, 8);
        assert_eq!(IntRange::new(4, 4, 7), IntRange::single(4));
    }

    #[test]
    fn range_len_matches_iteration() {
        for range in [
            IntRange::new(1, 5, 1),
            IntRange::new(2, 10, 3),
            IntRange::new(2, 11, 3),
            IntRange::new(0, 10, 2),
        ] {
            assert_eq!(range.len() as usize, range.iter().count());
        }
    }

    #[test]
    fn range_contains() {
        assert!(!IntRange::new(1, 5, 1).contains(0));
        assert!(IntRange::new(1, 5, 1).contains(1));
        assert!(IntRange::new(1, 5, 1).contains(5));
        assert!(!IntRange::new(1, 5, 1).contains(6));

        assert!(IntRange::new(1, 8, 3).contains(4));
        assert!(!IntRange::new(1, 8, 3).contains(5));
        assert!(IntRange::new(1, 8, 3).contains(7));
        assert!(!IntRange::new(1, 8, 3).contains(8));
    }

    #[test]
    fn range_at_max_index() {
        let range = IntRange::single(u32::MAX);
        assert_eq!(range.len(), 1);
        assert!(range.contains(u32::MAX));
        assert_eq!(range.iter().collect::<Vec<_>>(), vec![u32::MAX]);

        let range = IntRange::new(u32::MAX - 4, u32::MAX, 2);
        assert_eq!(
            range.iter().collect::<Vec<_>>(),
            vec![u32::MAX - 4, u32::MAX - 2, u32::MAX]
        );
    }

    #[test]
    fn range_intersections() {
        let check = |a: IntRange, b: IntRange| {
            let expected = a.iter().any(|x| b.contains(x));
            assert_eq!(a.intersects(&b), expected, "{a:?} {b:?}");
            assert_eq!(b.intersects(&a), expected, "{a:?} {b:?}");
        };
        check(IntRange::new(0, 10, 2), IntRange::new(1, 9, 2));
        check(IntRange::new(0, 10, 2), IntRange::new(3, 9, 3));
        check(IntRange::new(0, 20, 4), IntRange::new(2, 20, 6));
        check(IntRange::new(1, 40, 6), IntRange::new(5, 40, 10));
        check(IntRange::new(0, 5, 1), IntRange::new(6, 9, 1));
        check(IntRange::new(0, 5, 1), IntRange::single(5));
        check(IntRange::new(7, 100, 7), IntRange::new(3, 30, 5));
        check(IntRange::new(7, 30, 7), IntRange::new(3, 30, 5));
    }

    #[test]
    fn array_count_with_step() {
        let array: IntArray = "0-10:2,15".parse().unwrap();
        assert_eq!(array.id_count(), 7);
        assert!(array.contains(15));
        assert!(!array.contains(3));
    }

    #[test]
    fn array_display() {
        for input in ["0", "0-2", "0-10:2,15", "3,5,7-9"] {
            let array: IntArray = input.parse().unwrap();
            assert_eq!(array.to_string(), input);
        }
        let array: IntArray = "0-9:2".parse().unwrap();
        assert_eq!(array.to_string(), "0-8:2");
    }

    #[test]
    fn array_from_sorted_ids() {
        let array = IntArray::from_sorted_ids([0, 1, 2, 5, 7, 8].into_iter());
        assert_eq!(array.to_string(), "0-2,5,7-8");
        let array = IntArray::from_sorted_ids([u32::MAX - 1, u32::MAX].into_iter());
        assert_eq!(array.id_count(), 2);
    }

    #[test]
    fn array_single_range() {
        let single = |s: &str| s.parse::<IntArray>().unwrap().as_single_range();
        assert_eq!(single("4"), Some(IntRange::single(4)));
        assert_eq!(single("0-10:2"), Some(IntRange::new(0, 10, 2)));
        assert_eq!(single("0,1,2"), Some(IntRange::new(0, 2, 1)));
        assert_eq!(single("2,0-1"), Some(IntRange::new(0, 2, 1)));
        assert_eq!(single("0,2"), Some(IntRange::new(0, 2, 2)));
        assert_eq!(single("4,0,2"), Some(IntRange::new(0, 4, 2)));
        assert_eq!(single("0-4:2,6-10:2"), Some(IntRange::new(0, 10, 2)));
        assert_eq!(single("0,1,3"), None);
        assert_eq!(single("0-4:2,5"), None);
        assert_eq!(single("0-4:2,7-9:3"), None);
    }

    #[test]
    fn array_deserialize_from_number_or_string() {
        #[derive(serde::Deserialize)]
        struct Wrapper {
            array: IntArray,
        }

        let w: Wrapper = toml::from_str("array = 3").unwrap();
        assert_eq!(w.array.iter().collect::<Vec<_>>(), vec![3]);
        let w: Wrapper = toml::from_str("array = \"0-2\"").unwrap();
        assert_eq!(w.array.iter().collect::<Vec<_>>(), vec![0, 1, 2]);
        assert!(toml::from_str::<Wrapper>("array = \"2-1\"").is_err());
    }
}
