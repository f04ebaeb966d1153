//! The font adapter boundary.
//!
//! The engine never touches font files itself: glyph-id resolution,
//! metrics and optional OpenType feature application all go through
//! [`FontAdapter`]. A swash-backed implementation lives in
//! [`swash_adapter`]; tests script their own.

pub mod swash_adapter;

pub use swash_adapter::SwashFontAdapter;

use crate::error::AdapterError;
use crate::glyph::{Glyph, GlyphAdjustment, GlyphBuffer};
use crate::otf::OtfSpec;

/// Capabilities the engine consumes from a font.
///
/// `glyph_ids` and `metrics` operate in place: resolved glyphs get
/// their `encoded`/`measured` flags set, unresolvable ones are left
/// alone (which makes the corresponding rule fail softly). The two OTF
/// hooks are optional; returning `None` means the capability is absent,
/// and probes that require concrete features are then rejected.
pub trait FontAdapter {
    /// Family name used by layout-table family filters.
    fn family(&self) -> Option<&str> {
        None
    }

    /// Horizontal pixels per em.
    fn x_ppem(&self) -> i32;

    /// Vertical pixels per em.
    fn y_ppem(&self) -> i32;

    /// Resolve character codes into glyph ids for every unencoded glyph.
    fn glyph_ids(&mut self, glyphs: &mut [Glyph]) -> Result<(), AdapterError>;

    /// Fill metrics (26.6 fixed-point) for every unmeasured glyph.
    fn metrics(&mut self, glyphs: &mut [Glyph]) -> Result<(), AdapterError>;

    /// Whether this font can realize `spec`; `None` when probing is
    /// unsupported.
    fn check_otf(&mut self, _spec: &OtfSpec) -> Option<bool> {
        None
    }

    /// Apply the features named by `spec` to `input`, appending the
    /// result to `out` and one adjustment per produced glyph to
    /// `adjustments`. `None` when feature application is unsupported;
    /// capacity overflow of `out` surfaces as
    /// [`crate::LayoutError::Capacity`] and triggers the usual retry.
    fn drive_otf(
        &mut self,
        _spec: &OtfSpec,
        _input: &[Glyph],
        _out: &mut GlyphBuffer,
        _adjustments: &mut Vec<GlyphAdjustment>,
    ) -> Option<Result<(), crate::error::LayoutError>> {
        None
    }
}
