//! A named, filterable aggregate of shaping stages.

use std::sync::Arc;

use crate::category::CategoryTable;
use crate::compile::{self, Stage};
use crate::error::CompileError;
use crate::otf::OtfSpec;
use crate::syntax::Expr;

/// One compiled layout table: filters, coverage and the stage pipeline.
///
/// Read-only after compilation; shared across runs behind an `Arc`.
#[derive(Debug)]
pub struct LayoutTable {
    pub name: String,
    /// Font family this table is restricted to, if any.
    pub family: Option<String>,
    /// Registries the table declares itself for (e.g. `unicode-bmp`).
    pub registries: Vec<String>,
    /// Table-wide OTF probe; the font must realize it for the table to
    /// be eligible.
    pub otf: Option<OtfSpec>,
    /// Character coverage: the first category table of the definition.
    pub coverage: Arc<CategoryTable>,
    pub stages: Vec<Stage>,
}

/// Filters and coverage alone, read without compiling any stage.
#[derive(Debug)]
pub struct TableHeader {
    pub family: Option<String>,
    pub registries: Vec<String>,
    pub otf: Option<OtfSpec>,
    pub coverage: Arc<CategoryTable>,
}

/// Read the `(font …)` header and the first `(category …)` of a
/// definition. This is the cheap pass the registry runs over every
/// known table to answer coverage queries.
pub fn read_header(items: &[Expr]) -> Result<TableHeader, CompileError> {
    let mut family = None;
    let mut registries = Vec::new();
    let mut otf = None;
    let mut coverage = None;

    for item in items {
        if item.as_symbol() == Some("end") {
            break;
        }
        let Some(list) = item.as_list() else { continue };
        match list.first().and_then(Expr::as_symbol) {
            Some("font") => {
                let spec = list
                    .get(1)
                    .and_then(Expr::as_list)
                    .ok_or(CompileError::BadDefinition("bad font header"))?;
                // (FOUNDRY FAMILY REGISTRY… [:otf=SPEC]); `nil` means
                // no family restriction.
                family = spec
                    .get(1)
                    .and_then(Expr::as_symbol)
                    .filter(|s| *s != "nil")
                    .map(str::to_string);
                for extra in spec.iter().skip(2) {
                    let Some(sym) = extra.as_symbol() else { continue };
                    if let Some(stripped) = sym.strip_prefix(':') {
                        if stripped.starts_with("otf") {
                            otf = Some(OtfSpec::parse(sym)?);
                        }
                        break;
                    }
                    registries.push(sym.to_string());
                }
            }
            Some("category") if coverage.is_none() => {
                coverage = Some(Arc::new(CategoryTable::from_exprs(&list[1..])?));
            }
            _ => {}
        }
    }

    Ok(TableHeader {
        family,
        registries,
        otf,
        coverage: coverage.ok_or(CompileError::MissingCategory)?,
    })
}

impl LayoutTable {
    /// Compile a whole definition. Any failure drops the table; nothing
    /// partial is returned.
    pub fn from_exprs(name: impl Into<String>, items: &[Expr]) -> Result<Self, CompileError> {
        let header = read_header(items)?;
        let mut category: Option<Arc<CategoryTable>> = None;
        let mut stages = Vec::new();

        for item in items {
            if item.as_symbol() == Some("end") {
                break;
            }
            let Some(list) = item.as_list() else { continue };
            match list.first().and_then(Expr::as_symbol) {
                Some("category") => {
                    category = Some(Arc::new(CategoryTable::from_exprs(&list[1..])?));
                }
                Some("generator") => {
                    let cat = category.clone().ok_or(CompileError::MissingCategory)?;
                    stages.push(compile::compile_stage(cat, &list[1..])?);
                }
                _ => {}
            }
        }

        if stages.is_empty() {
            return Err(CompileError::NoStages);
        }

        Ok(LayoutTable {
            name: name.into(),
            family: header.family,
            registries: header.registries,
            otf: header.otf,
            coverage: header.coverage,
            stages,
        })
    }

    /// Whether this table declares coverage for `code`.
    pub fn covers(&self, code: u32) -> bool {
        self.coverage.contains(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax;

    const DEVA: &str = r#"
        (font (misc devafont unicode-bmp :otf=deva))
        (category (0x0900 0x097F ?E) (0x093C ?N))
        (generator ("EN?" < = * >))
        end
    "#;

    #[test]
    fn loads_header_and_one_stage() {
        let items = syntax::parse(DEVA).unwrap();
        let table = LayoutTable::from_exprs("deva", &items).unwrap();
        assert_eq!(table.family.as_deref(), Some("devafont"));
        assert_eq!(table.registries, vec!["unicode-bmp".to_string()]);
        assert!(table.otf.is_some());
        assert!(table.covers(0x0915));
        assert!(!table.covers(0x41));
        assert_eq!(table.stages.len(), 1);
    }

    #[test]
    fn generator_before_category_fails() {
        let items = syntax::parse(r#"(generator ("E" =))"#).unwrap();
        assert!(matches!(
            LayoutTable::from_exprs("bad", &items),
            Err(CompileError::MissingCategory)
        ));
    }

    #[test]
    fn later_category_applies_to_later_stages() {
        let src = r#"
            (category (0x30 0x39 ?D))
            (generator ("D+" = *))
            (category (0x100 0x1FF ?X))
            (generator ("X+" = *))
        "#;
        let items = syntax::parse(src).unwrap();
        let table = LayoutTable::from_exprs("two", &items).unwrap();
        assert_eq!(table.stages.len(), 2);
        // Coverage stays bound to the first category table.
        assert!(table.covers(0x35));
        assert!(!table.covers(0x150));
        assert_eq!(table.stages[1].category.lookup(0x150), Some(b'X'));
    }

    #[test]
    fn elements_after_end_are_ignored() {
        let src = r#"
            (category (0x30 0x39 ?D))
            (generator ("D+" = *))
            end
            (generator (broken))
        "#;
        let items = syntax::parse(src).unwrap();
        assert!(LayoutTable::from_exprs("t", &items).is_ok());
    }
}
