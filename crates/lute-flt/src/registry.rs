//! Loading, caching and selecting layout tables.

use std::path::PathBuf;
use std::sync::Arc;

use hashbrown::HashMap;
use tracing::{debug, warn};

use crate::font::FontAdapter;
use crate::syntax::{self, Expr};
use crate::table::{self, LayoutTable, TableHeader};

/// Where table definitions come from.
pub trait TableSource {
    /// Names of every table this source can provide.
    fn list(&self) -> Vec<String>;

    /// The parsed definition for `name`, or `None` when absent or
    /// unreadable.
    fn load(&self, name: &str) -> Option<Vec<Expr>>;
}

/// Definitions stored as `NAME.flt` files in one directory.
pub struct DirTableSource {
    dir: PathBuf,
}

impl DirTableSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl TableSource for DirTableSource {
    fn list(&self) -> Vec<String> {
        let Ok(entries) = std::fs::read_dir(&self.dir) else {
            warn!(dir = %self.dir.display(), "cannot read layout table directory");
            return Vec::new();
        };
        let mut names: Vec<String> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().is_some_and(|ext| ext == "flt"))
            .filter_map(|p| p.file_stem().map(|s| s.to_string_lossy().into_owned()))
            .collect();
        names.sort();
        names
    }

    fn load(&self, name: &str) -> Option<Vec<Expr>> {
        let path = self.dir.join(name).with_extension("flt");
        let text = std::fs::read_to_string(&path).ok()?;
        match syntax::parse(&text) {
            Ok(exprs) => Some(exprs),
            Err(err) => {
                warn!(table = name, error = %err, "unreadable layout table definition");
                None
            }
        }
    }
}

/// In-memory definitions, mainly for tests and embedding.
#[derive(Default)]
pub struct MemoryTableSource {
    tables: HashMap<String, String>,
}

impl MemoryTableSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, definition: impl Into<String>) {
        self.tables.insert(name.into(), definition.into());
    }
}

impl TableSource for MemoryTableSource {
    fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tables.keys().cloned().collect();
        names.sort();
        names
    }

    fn load(&self, name: &str) -> Option<Vec<Expr>> {
        let text = self.tables.get(name)?;
        syntax::parse(text).ok()
    }
}

struct Entry {
    name: String,
    header: TableHeader,
    def: Vec<Expr>,
    compiled: Option<Arc<LayoutTable>>,
    failed: bool,
}

/// Owns every known layout table and the coverage envelope across them.
///
/// Headers (filters + coverage) load on the first query; a table's
/// stages compile on its first selection and are memoized. A definition
/// that fails to parse or compile is simply absent — one bad table
/// never disables the engine. Lookups after caching are reads, but the
/// lazy paths mutate the cache, so share a registry across threads only
/// behind external synchronization.
pub struct Registry {
    source: Box<dyn TableSource>,
    entries: Option<Vec<Entry>>,
    initial_scale: usize,
}

impl Registry {
    pub fn new(source: Box<dyn TableSource>) -> Self {
        Self {
            source,
            entries: None,
            initial_scale: 4,
        }
    }

    /// Initial output-buffer allocation, as a multiple of the segment
    /// length (doubled on each capacity retry).
    pub fn with_initial_scale(mut self, scale: usize) -> Self {
        self.initial_scale = scale.max(1);
        self
    }

    pub(crate) fn initial_scale(&self) -> usize {
        self.initial_scale
    }

    fn ensure_listed(&mut self) {
        if self.entries.is_some() {
            return;
        }
        let mut entries = Vec::new();
        for name in self.source.list() {
            let Some(def) = self.source.load(&name) else {
                continue;
            };
            match table::read_header(&def) {
                Ok(header) => {
                    debug!(table = %name, "listed layout table");
                    entries.push(Entry {
                        name,
                        header,
                        def,
                        compiled: None,
                        failed: false,
                    });
                }
                Err(err) => {
                    warn!(table = %name, error = %err, "dropping layout table");
                }
            }
        }
        self.entries = Some(entries);
    }

    fn entries(&mut self) -> &mut Vec<Entry> {
        self.ensure_listed();
        self.entries.as_mut().expect("listed above")
    }

    fn compile_idx(&mut self, idx: usize) -> Option<Arc<LayoutTable>> {
        let entry = &mut self.entries()[idx];
        if entry.failed {
            return None;
        }
        if let Some(table) = &entry.compiled {
            return Some(table.clone());
        }
        match LayoutTable::from_exprs(entry.name.clone(), &entry.def) {
            Ok(table) => {
                let table = Arc::new(table);
                entry.compiled = Some(table.clone());
                Some(table)
            }
            Err(err) => {
                warn!(table = %entry.name, error = %err, "layout table failed to compile");
                entry.failed = true;
                None
            }
        }
    }

    /// Table by name, compiling it on first use. `None` when unknown or
    /// broken.
    pub fn get(&mut self, name: &str) -> Option<Arc<LayoutTable>> {
        let idx = self.entries().iter().position(|e| e.name == name)?;
        self.compile_idx(idx)
    }

    /// Most appropriate table for `code`, optionally constrained by a
    /// font: Unicode-registry tables only, family filters honored, and
    /// table-level OTF probes must be realizable. Probe-carrying tables
    /// win as soon as their probe passes; otherwise the last probe-less
    /// coverage match is used.
    pub fn find(
        &mut self,
        code: u32,
        mut font: Option<&mut dyn FontAdapter>,
    ) -> Option<Arc<LayoutTable>> {
        self.ensure_listed();
        let entries = self.entries.as_ref().expect("listed above");

        let idx = if let Some(font) = font.as_deref_mut() {
            let mut chosen = None;
            let mut best = None;
            for (idx, entry) in entries.iter().enumerate() {
                let unicode = entry
                    .header
                    .registries
                    .iter()
                    .any(|r| r == "unicode-bmp" || r == "unicode-full");
                if !unicode {
                    continue;
                }
                if let Some(family) = &entry.header.family {
                    if font.family() != Some(family.as_str()) {
                        continue;
                    }
                }
                if !entry.header.coverage.contains(code) {
                    continue;
                }
                if let Some(spec) = &entry.header.otf {
                    let pass = match font.check_otf(spec) {
                        Some(ok) => ok,
                        None => !spec.requires_concrete_features(),
                    };
                    if pass {
                        chosen = Some(idx);
                        break;
                    }
                } else {
                    best = Some(idx);
                }
            }
            chosen.or(best)?
        } else {
            entries
                .iter()
                .position(|e| e.header.coverage.contains(code))?
        };

        self.compile_idx(idx)
    }

    /// Min/max code covered by any known table, for the segmenter's
    /// fast rejection of codes no table can shape.
    pub fn coverage_envelope(&mut self) -> Option<(u32, u32)> {
        self.ensure_listed();
        let entries = self.entries.as_ref().expect("listed above");
        let min = entries.iter().map(|e| e.header.coverage.min_code()).min()?;
        let max = entries.iter().map(|e| e.header.coverage.max_code()).max()?;
        Some((min, max))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEVA: &str = r#"
        (font (misc nil unicode-bmp))
        (category (0x0900 0x097F ?E))
        (generator ("E+" = *))
    "#;

    const TIBT: &str = r#"
        (category (0x0F40 0x0F6A ?K))
        (generator ("K+" = *))
    "#;

    fn registry() -> Registry {
        let mut source = MemoryTableSource::new();
        source.insert("deva", DEVA);
        source.insert("tibt", TIBT);
        source.insert("broken", "(category (0x20 0x2E))");
        Registry::new(Box::new(source))
    }

    #[test]
    fn get_compiles_once_and_caches() {
        let mut reg = registry();
        let first = reg.get("deva").unwrap();
        let second = reg.get("deva").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn broken_tables_are_absent_not_fatal() {
        let mut reg = registry();
        assert!(reg.get("broken").is_none());
        assert!(reg.get("deva").is_some());
    }

    #[test]
    fn find_without_font_takes_first_coverage_match() {
        let mut reg = registry();
        let table = reg.find(0x0F45, None).unwrap();
        assert_eq!(table.name, "tibt");
        assert!(reg.find(0x41, None).is_none());
    }

    #[test]
    fn envelope_spans_all_tables() {
        let mut reg = registry();
        assert_eq!(reg.coverage_envelope(), Some((0x0900, 0x0F6A)));
    }
}
