//! Font adapter backed by swash.

use std::path::Path;
use std::sync::Arc;

use swash::scale::ScaleContext;
use swash::{CacheKey, FontRef};

use crate::error::AdapterError;
use crate::font::FontAdapter;
use crate::glyph::Glyph;

/// [`FontAdapter`] over a loaded TTF/OTF face.
///
/// Owns the font bytes and a pixel size; glyph ids come from the
/// character map, advances from the glyph metrics table and ink extents
/// from scaled outlines. Metrics are reported in 26.6 fixed-point
/// pixels. Feature application is not implemented here, so tables that
/// probe for concrete OTF features will not select this adapter's font.
pub struct SwashFontAdapter {
    data: Arc<[u8]>,
    offset: u32,
    key: CacheKey,
    family: Option<String>,
    units_per_em: u16,
    /// Pixels per em.
    size: f32,
}

impl SwashFontAdapter {
    /// Create an adapter from raw font bytes and a face index.
    pub fn from_bytes(data: Arc<[u8]>, index: usize, size: f32) -> Result<Self, AdapterError> {
        let font = FontRef::from_index(&data, index).ok_or(AdapterError::InvalidFont)?;
        let units_per_em = font.metrics(&[]).units_per_em;
        let (offset, key) = (font.offset, font.key);
        Ok(Self {
            data,
            offset,
            key,
            family: None,
            units_per_em,
            size,
        })
    }

    pub fn from_vec(data: Vec<u8>, index: usize, size: f32) -> Result<Self, AdapterError> {
        Self::from_bytes(Arc::from(data), index, size)
    }

    pub fn from_path(
        path: impl AsRef<Path>,
        index: usize,
        size: f32,
    ) -> Result<Self, AdapterError> {
        let data = std::fs::read(path)?;
        Self::from_vec(data, index, size)
    }

    /// Set the family name reported to layout-table filters.
    pub fn with_family(mut self, family: impl Into<String>) -> Self {
        self.family = Some(family.into());
        self
    }

    fn as_swash_ref(&self) -> FontRef<'_> {
        FontRef {
            data: &self.data,
            offset: self.offset,
            key: self.key,
        }
    }

    fn scale(&self) -> f32 {
        if self.units_per_em != 0 {
            self.size / self.units_per_em as f32
        } else {
            1.0
        }
    }
}

fn to_26_6(px: f32) -> i32 {
    (px * 64.0).round() as i32
}

impl FontAdapter for SwashFontAdapter {
    fn family(&self) -> Option<&str> {
        self.family.as_deref()
    }

    fn x_ppem(&self) -> i32 {
        self.size.round() as i32
    }

    fn y_ppem(&self) -> i32 {
        self.size.round() as i32
    }

    fn glyph_ids(&mut self, glyphs: &mut [Glyph]) -> Result<(), AdapterError> {
        let font = self.as_swash_ref();
        let charmap = font.charmap();
        for g in glyphs.iter_mut().filter(|g| !g.encoded && !g.is_separator()) {
            let gid = charmap.map(g.code);
            if gid != 0 {
                g.code = gid as u32;
                g.encoded = true;
            }
        }
        Ok(())
    }

    fn metrics(&mut self, glyphs: &mut [Glyph]) -> Result<(), AdapterError> {
        let font = self.as_swash_ref();
        let glyph_metrics = font.glyph_metrics(&[]);
        let font_metrics = font.metrics(&[]);
        let scale = self.scale();
        let mut context = ScaleContext::new();
        let mut scaler = context.builder(font).size(self.size).build();
        for g in glyphs.iter_mut().filter(|g| !g.measured) {
            if g.is_separator() {
                g.measured = true;
                continue;
            }
            let gid = g.code as u16;
            g.xadv = to_26_6(glyph_metrics.advance_width(gid) * scale);
            g.yadv = 0;
            if let Some(outline) = scaler.scale_outline(gid) {
                let bounds = outline.bounds();
                g.lbearing = to_26_6(bounds.min.x);
                g.rbearing = to_26_6(bounds.max.x);
                g.ascent = to_26_6(bounds.max.y).max(0);
                g.descent = to_26_6(-bounds.min.y).max(0);
            } else {
                g.lbearing = 0;
                g.rbearing = g.xadv;
                g.ascent = to_26_6(font_metrics.ascent * scale);
                g.descent = to_26_6(font_metrics.descent * scale);
            }
            g.measured = true;
        }
        Ok(())
    }
}
