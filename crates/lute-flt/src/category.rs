//! Character-to-category mapping used to build matchable strings.

use crate::error::CompileError;
use crate::syntax::Expr;

/// Maps character or glyph codes to single alphanumeric category letters.
///
/// Built once from `(from [to] category)` triples when a table is
/// loaded, then shared read-only between the stages that use it. A
/// later entry overlapping an earlier one wins for the overlapping
/// sub-range.
#[derive(Debug, Clone)]
pub struct CategoryTable {
    ranges: Vec<(u32, u32, u8)>,
    min_code: u32,
    max_code: u32,
}

impl CategoryTable {
    /// Build from explicit `(from, to, category)` ranges, `to` inclusive.
    pub fn from_ranges(
        entries: impl IntoIterator<Item = (u32, u32, u8)>,
    ) -> Result<Self, CompileError> {
        let mut ranges = Vec::new();
        let mut min_code = u32::MAX;
        let mut max_code = 0;
        for (from, to, category) in entries {
            if !category.is_ascii_alphanumeric() {
                return Err(CompileError::BadCategory(category as i64));
            }
            min_code = min_code.min(from);
            max_code = max_code.max(to);
            ranges.push((from, to, category));
        }
        if ranges.is_empty() {
            return Err(CompileError::BadDefinition("empty category table"));
        }
        Ok(Self {
            ranges,
            min_code,
            max_code,
        })
    }

    /// Build from the definition elements following the `category` keyword.
    pub fn from_exprs(items: &[Expr]) -> Result<Self, CompileError> {
        let mut entries = Vec::with_capacity(items.len());
        for item in items {
            let spec = item
                .as_list()
                .ok_or(CompileError::BadDefinition("category entry must be a list"))?;
            let ints: Vec<i64> = spec
                .iter()
                .map(|e| {
                    e.as_int()
                        .ok_or(CompileError::BadDefinition("category entry must hold integers"))
                })
                .collect::<Result<_, _>>()?;
            let (from, to, category) = match ints[..] {
                [from, category] => (from, from, category),
                [from, to, category] => (from, to, category),
                _ => {
                    return Err(CompileError::BadDefinition(
                        "category entry needs 2 or 3 integers",
                    ));
                }
            };
            if !(0..=0x7F).contains(&category) || !(category as u8).is_ascii_alphanumeric() {
                return Err(CompileError::BadCategory(category));
            }
            if from < 0 || to < from {
                return Err(CompileError::BadDefinition("bad category code range"));
            }
            entries.push((from as u32, to as u32, category as u8));
        }
        Self::from_ranges(entries)
    }

    /// Category letter for `code`, or `None` when uncovered.
    pub fn lookup(&self, code: u32) -> Option<u8> {
        // Later entries overwrite earlier ones, so scan from the end.
        self.ranges
            .iter()
            .rev()
            .find(|(from, to, _)| (*from..=*to).contains(&code))
            .map(|(_, _, category)| *category)
    }

    pub fn contains(&self, code: u32) -> bool {
        self.lookup(code).is_some()
    }

    /// Smallest code any entry covers.
    pub fn min_code(&self) -> u32 {
        self.min_code
    }

    /// Largest code any entry covers.
    pub fn max_code(&self) -> u32 {
        self.max_code
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax;

    fn table(src: &str) -> CategoryTable {
        let exprs = syntax::parse(src).unwrap();
        CategoryTable::from_exprs(&exprs).unwrap()
    }

    #[test]
    fn two_element_entry_covers_a_single_code() {
        let t = table("(0x093C ?N)");
        assert_eq!(t.lookup(0x093C), Some(b'N'));
        assert_eq!(t.lookup(0x093D), None);
    }

    #[test]
    fn later_overlapping_entry_wins() {
        let t = table("(0x0900 0x097F ?E) (0x093C ?N)");
        assert_eq!(t.lookup(0x0915), Some(b'E'));
        assert_eq!(t.lookup(0x093C), Some(b'N'));
        assert_eq!(t.min_code(), 0x0900);
        assert_eq!(t.max_code(), 0x097F);
    }

    #[test]
    fn non_alphanumeric_category_is_rejected() {
        let exprs = syntax::parse("(0x20 0x2E)").unwrap(); // '.' is not alnum
        assert!(matches!(
            CategoryTable::from_exprs(&exprs),
            Err(CompileError::BadCategory(_))
        ));
    }
}
