//! Rule ID space
//!
//! The integer ID space is split into one named range per category so that
//! independently generated batches never collide and a whole category can
//! be removed by range. Ranges are static configuration: sorted, disjoint,
//! and allocated from their floor at the start of every compilation.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Result, RuleSetError};
use crate::types::Category;

/// A half-open `[start, end)` band of rule IDs owned by one category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RuleIdRange {
    pub category: Category,
    pub start: u32,
    pub end: u32,
}

impl RuleIdRange {
    pub const fn new(category: Category, start: u32, end: u32) -> Self {
        Self { category, start, end }
    }

    #[inline]
    pub const fn width(&self) -> u32 {
        self.end - self.start
    }

    #[inline]
    pub const fn contains(&self, id: u32) -> bool {
        id >= self.start && id < self.end
    }
}

/// Built-in range table. Category lists first, then the user domain lists,
/// then custom rules and subscribed lists in far higher bands.
pub const DEFAULT_ID_RANGES: [RuleIdRange; 9] = [
    RuleIdRange::new(Category::Ads, 1_000, 6_000),
    RuleIdRange::new(Category::Trackers, 6_000, 11_000),
    RuleIdRange::new(Category::Social, 11_000, 16_000),
    RuleIdRange::new(Category::Cryptominers, 16_000, 21_000),
    RuleIdRange::new(Category::Malware, 21_000, 26_000),
    RuleIdRange::new(Category::Whitelist, 30_000, 35_000),
    RuleIdRange::new(Category::Blacklist, 35_000, 40_000),
    RuleIdRange::new(Category::Custom, 1_000_000, 1_100_000),
    RuleIdRange::new(Category::FilterLists, 2_000_000, 2_500_000),
];

/// A validated range table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<RuleIdRange>", into = "Vec<RuleIdRange>")]
pub struct IdSpace {
    ranges: Vec<RuleIdRange>,
}

impl IdSpace {
    /// Validate a range table: non-empty bands starting at 1 or above,
    /// sorted by start, pairwise disjoint, one band per category.
    pub fn new(ranges: Vec<RuleIdRange>) -> Result<Self> {
        if ranges.is_empty() {
            return Err(RuleSetError::InvalidIdRanges("no ranges declared".to_string()));
        }

        for (index, range) in ranges.iter().enumerate() {
            if range.start == 0 || range.start >= range.end {
                return Err(RuleSetError::InvalidIdRanges(format!(
                    "range for '{}' is empty or starts at zero: [{}, {})",
                    range.category, range.start, range.end
                )));
            }

            if ranges[..index].iter().any(|r| r.category == range.category) {
                return Err(RuleSetError::InvalidIdRanges(format!(
                    "category '{}' declared twice",
                    range.category
                )));
            }

            if let Some(prev) = index.checked_sub(1).map(|i| &ranges[i]) {
                if prev.end > range.start {
                    return Err(RuleSetError::InvalidIdRanges(format!(
                        "'{}' [{}, {}) overlaps or precedes '{}' [{}, {})",
                        range.category, range.start, range.end, prev.category, prev.start, prev.end
                    )));
                }
            }
        }

        Ok(Self { ranges })
    }

    pub fn ranges(&self) -> &[RuleIdRange] {
        &self.ranges
    }

    pub fn range(&self, category: Category) -> Option<&RuleIdRange> {
        self.ranges.iter().find(|r| r.category == category)
    }

    /// The category whose band contains `id`.
    pub fn category_of(&self, id: u32) -> Option<Category> {
        self.ranges.iter().find(|r| r.contains(id)).map(|r| r.category)
    }

    /// A fresh sequence starting at the floor of the category's band.
    pub fn allocate(&self, category: Category) -> Result<IdSequence> {
        let range = self.range(category).ok_or_else(|| {
            RuleSetError::InvalidIdRanges(format!("no range declared for '{}'", category))
        })?;
        Ok(IdSequence::new(*range))
    }

    /// An allocator for one compilation.
    pub fn allocator(&self) -> IdAllocator<'_> {
        IdAllocator {
            space: self,
            sequences: BTreeMap::new(),
        }
    }
}

impl Default for IdSpace {
    fn default() -> Self {
        Self {
            ranges: DEFAULT_ID_RANGES.to_vec(),
        }
    }
}

impl TryFrom<Vec<RuleIdRange>> for IdSpace {
    type Error = RuleSetError;

    fn try_from(ranges: Vec<RuleIdRange>) -> Result<Self> {
        Self::new(ranges)
    }
}

impl From<IdSpace> for Vec<RuleIdRange> {
    fn from(space: IdSpace) -> Self {
        space.ranges
    }
}

/// Lazy, exhaustible sequence of IDs within one band.
#[derive(Debug, Clone)]
pub struct IdSequence {
    range: RuleIdRange,
    next: u32,
}

impl IdSequence {
    fn new(range: RuleIdRange) -> Self {
        Self {
            next: range.start,
            range,
        }
    }

    /// Next ID, or `RangeExhausted` once the band is used up.
    pub fn next_id(&mut self) -> Result<u32> {
        self.next().ok_or(RuleSetError::RangeExhausted {
            category: self.range.category,
            width: self.range.width(),
        })
    }

    pub fn issued(&self) -> u32 {
        self.next - self.range.start
    }

    pub fn remaining(&self) -> u32 {
        self.range.end - self.next
    }

    pub fn range(&self) -> &RuleIdRange {
        &self.range
    }
}

impl Iterator for IdSequence {
    type Item = u32;

    fn next(&mut self) -> Option<u32> {
        if self.next >= self.range.end {
            return None;
        }
        let id = self.next;
        self.next += 1;
        Some(id)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.remaining() as usize;
        (remaining, Some(remaining))
    }
}

/// Hands out IDs per category for the duration of one compilation.
/// Dropping it is the only way to restart the sequences.
pub struct IdAllocator<'a> {
    space: &'a IdSpace,
    sequences: BTreeMap<Category, IdSequence>,
}

impl IdAllocator<'_> {
    pub fn next_id(&mut self, category: Category) -> Result<u32> {
        if !self.sequences.contains_key(&category) {
            let sequence = self.space.allocate(category)?;
            self.sequences.insert(category, sequence);
        }

        match self.sequences.get_mut(&category) {
            Some(sequence) => sequence.next_id(),
            None => Err(RuleSetError::InvalidIdRanges(format!(
                "no range declared for '{}'",
                category
            ))),
        }
    }

    /// Number of IDs issued so far for `category`.
    pub fn issued(&self, category: Category) -> u32 {
        self.sequences.get(&category).map_or(0, IdSequence::issued)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_ranges_are_valid() {
        let space = IdSpace::new(DEFAULT_ID_RANGES.to_vec()).expect("valid table");
        assert_eq!(space.ranges().len(), Category::ALL.len());
        for category in Category::ALL {
            assert!(space.range(category).is_some(), "{category} has no range");
        }

        let custom = space.range(Category::Custom).unwrap();
        let lists = space.range(Category::FilterLists).unwrap();
        let blacklist = space.range(Category::Blacklist).unwrap();
        assert!(custom.start > blacklist.end);
        assert!(lists.start > custom.end);
        assert!(lists.width() > custom.width());
    }

    #[test]
    fn rejects_overlap_and_disorder() {
        let overlap = vec![
            RuleIdRange::new(Category::Ads, 1, 100),
            RuleIdRange::new(Category::Trackers, 50, 200),
        ];
        assert!(matches!(IdSpace::new(overlap), Err(RuleSetError::InvalidIdRanges(_))));

        let unsorted = vec![
            RuleIdRange::new(Category::Ads, 100, 200),
            RuleIdRange::new(Category::Trackers, 1, 50),
        ];
        assert!(IdSpace::new(unsorted).is_err());

        let zero = vec![RuleIdRange::new(Category::Ads, 0, 10)];
        assert!(IdSpace::new(zero).is_err());

        let twice = vec![
            RuleIdRange::new(Category::Ads, 1, 10),
            RuleIdRange::new(Category::Ads, 10, 20),
        ];
        assert!(IdSpace::new(twice).is_err());
    }

    #[test]
    fn sequence_is_bounded_and_monotonic() {
        let space = IdSpace::new(vec![RuleIdRange::new(Category::Ads, 10, 13)]).unwrap();
        let mut seq = space.allocate(Category::Ads).unwrap();
        assert_eq!(seq.next_id(), Ok(10));
        assert_eq!(seq.next_id(), Ok(11));
        assert_eq!(seq.next_id(), Ok(12));
        assert_eq!(
            seq.next_id(),
            Err(RuleSetError::RangeExhausted { category: Category::Ads, width: 3 })
        );
        assert_eq!(seq.issued(), 3);

        let ids: Vec<u32> = space.allocate(Category::Ads).unwrap().collect();
        assert_eq!(ids, vec![10, 11, 12]);
    }

    #[test]
    fn allocator_keeps_categories_apart() {
        let space = IdSpace::default();
        let mut alloc = space.allocator();
        assert_eq!(alloc.next_id(Category::Ads), Ok(1_000));
        assert_eq!(alloc.next_id(Category::Custom), Ok(1_000_000));
        assert_eq!(alloc.next_id(Category::Ads), Ok(1_001));
        assert_eq!(alloc.issued(Category::Ads), 2);
        assert_eq!(alloc.issued(Category::Malware), 0);
        assert_eq!(space.category_of(1_001), Some(Category::Ads));
        assert_eq!(space.category_of(29_999), None);
    }

    #[test]
    fn missing_category_is_an_error() {
        let space = IdSpace::new(vec![RuleIdRange::new(Category::Ads, 1, 10)]).unwrap();
        let mut alloc = space.allocator();
        assert!(matches!(
            alloc.next_id(Category::Malware),
            Err(RuleSetError::InvalidIdRanges(_))
        ));
    }

    #[test]
    fn serde_validates() {
        let json = serde_json::to_string(&IdSpace::default()).unwrap();
        let back: IdSpace = serde_json::from_str(&json).unwrap();
        assert_eq!(back, IdSpace::default());

        let bad = r#"[{"category":"ads","start":5,"end":1}]"#;
        assert!(serde_json::from_str::<IdSpace>(bad).is_err());
    }
}
