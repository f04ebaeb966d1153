//! Glyph data and the capacity-checked output buffer.

use core::ops::{Deref, DerefMut};

use crate::combining::CombiningCode;
use crate::error::LayoutError;

/// Logical direction of a run handed to the layouter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    LeftToRight,
    RightToLeft,
}

/// One glyph slot, carrying the source character, the resolved glyph
/// code, the half-open source character span `[from, to)` and metrics
/// in 26.6 fixed-point font units.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Glyph {
    /// Character code, or glyph id once `encoded` is set.
    pub code: u32,
    /// Source character, `-1` for structural separators.
    pub ch: i32,
    pub from: usize,
    pub to: usize,
    pub xadv: i32,
    pub yadv: i32,
    pub xoff: i32,
    pub yoff: i32,
    pub ascent: i32,
    pub descent: i32,
    pub lbearing: i32,
    pub rbearing: i32,
    /// `code` holds a resolved glyph id.
    pub encoded: bool,
    /// Metrics have been filled in.
    pub measured: bool,
    pub combining: Option<CombiningCode>,
    pub left_padding: bool,
    pub right_padding: bool,
}

impl Glyph {
    /// Fresh glyph for character `ch` at source position `pos`.
    pub fn from_char(ch: i32, pos: usize) -> Self {
        Glyph {
            code: ch.max(0) as u32,
            ch,
            from: pos,
            to: pos + 1,
            ..Glyph::default()
        }
    }

    /// Structural separator emitted by the `|` builtin.
    pub fn is_separator(&self) -> bool {
        self.ch < 0
    }
}

/// Positioning corrections reported by a font adapter's feature pass,
/// one per produced glyph. Offsets may chain back to an earlier glyph
/// through `back`.
#[derive(Debug, Clone, Copy, Default)]
pub struct GlyphAdjustment {
    pub set: bool,
    /// When set, `xadv`/`yadv` replace the measured advance instead of
    /// adding to it.
    pub advance_is_absolute: bool,
    pub xadv: i32,
    pub yadv: i32,
    pub xoff: i32,
    pub yoff: i32,
    /// Number of glyphs between this one and the base its offset is
    /// relative to.
    pub back: usize,
}

/// Growable glyph buffer with an explicit capacity ceiling.
///
/// The engine never reallocates mid-pass: a write that would exceed the
/// ceiling reports [`LayoutError::Capacity`] and the whole segment is
/// retried with a larger allocation.
#[derive(Debug, Clone, Default)]
pub struct GlyphBuffer {
    glyphs: Vec<Glyph>,
    capacity: usize,
}

impl GlyphBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            glyphs: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Wrap existing glyphs, keeping at least `capacity` slots usable.
    pub fn from_vec(glyphs: Vec<Glyph>, capacity: usize) -> Self {
        let capacity = capacity.max(glyphs.len());
        Self { glyphs, capacity }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn push(&mut self, glyph: Glyph) -> Result<(), LayoutError> {
        if self.glyphs.len() >= self.capacity {
            return Err(LayoutError::Capacity);
        }
        self.glyphs.push(glyph);
        Ok(())
    }

    pub fn extend_from_slice(&mut self, glyphs: &[Glyph]) -> Result<(), LayoutError> {
        if self.glyphs.len() + glyphs.len() > self.capacity {
            return Err(LayoutError::Capacity);
        }
        self.glyphs.extend_from_slice(glyphs);
        Ok(())
    }

    pub fn clear(&mut self) {
        self.glyphs.clear();
    }

    pub fn retain(&mut self, f: impl FnMut(&Glyph) -> bool) {
        self.glyphs.retain(f);
    }

    pub fn into_vec(self) -> Vec<Glyph> {
        self.glyphs
    }

    pub fn as_slice(&self) -> &[Glyph] {
        &self.glyphs
    }

    pub fn as_mut_slice(&mut self) -> &mut [Glyph] {
        &mut self.glyphs
    }
}

impl Deref for GlyphBuffer {
    type Target = [Glyph];

    fn deref(&self) -> &[Glyph] {
        &self.glyphs
    }
}

impl DerefMut for GlyphBuffer {
    fn deref_mut(&mut self) -> &mut [Glyph] {
        &mut self.glyphs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_stops_at_the_declared_capacity() {
        let mut buf = GlyphBuffer::with_capacity(2);
        buf.push(Glyph::from_char(0x41, 0)).unwrap();
        buf.push(Glyph::from_char(0x42, 1)).unwrap();
        assert!(matches!(
            buf.push(Glyph::from_char(0x43, 2)),
            Err(LayoutError::Capacity)
        ));
        assert_eq!(buf.len(), 2);
    }

    #[test]
    fn extend_checks_the_whole_slice_first() {
        let mut buf = GlyphBuffer::with_capacity(3);
        buf.push(Glyph::from_char(0x41, 0)).unwrap();
        let more = vec![Glyph::from_char(0x42, 1), Glyph::from_char(0x43, 2), Glyph::from_char(0x44, 3)];
        assert!(buf.extend_from_slice(&more).is_err());
        // Nothing was written by the failed extend.
        assert_eq!(buf.len(), 1);
    }
}
