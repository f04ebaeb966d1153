//! lute-flt: font layout tables for complex text shaping.
//!
//! A layout table is a small declarative program: category tables
//! classify character codes into a letter alphabet, generator stages
//! match rules (regexes over that alphabet, literal sequences, code
//! ranges, font probes) and emit glyphs, clusters, combining
//! placements and padding marks. The engine interprets the compiled
//! stages over a glyph run, chaining each stage's output into the
//! next, and splices the shaped result back into the caller's buffer.
//!
//! - [`Registry`] loads and caches tables from a [`TableSource`]
//! - [`Registry::run`] is the shaping entry point
//! - [`FontAdapter`] is the boundary to glyph ids, metrics and
//!   OpenType feature application

pub mod category;
pub mod combining;
pub mod compile;
mod engine;
pub mod error;
pub mod font;
pub mod glyph;
pub mod otf;
pub mod registry;
pub mod run;
pub mod syntax;
pub mod table;

pub use category::CategoryTable;
pub use combining::{CombiningCode, HPos, VPos};
pub use error::{AdapterError, CompileError, LayoutError};
pub use font::{FontAdapter, SwashFontAdapter};
pub use glyph::{Direction, Glyph, GlyphAdjustment, GlyphBuffer};
pub use otf::{FeatureSpec, OtfSpec, Tag};
pub use registry::{DirTableSource, MemoryTableSource, Registry, TableSource};
pub use syntax::Expr;
pub use table::LayoutTable;
