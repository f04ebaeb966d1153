//! The caller-facing shaping entry point: segmentation, retries,
//! splicing and the final visual-order fixups.

use std::sync::Arc;

use tracing::debug;

use crate::engine;
use crate::error::LayoutError;
use crate::font::FontAdapter;
use crate::glyph::{Direction, Glyph};
use crate::registry::Registry;
use crate::table::LayoutTable;

/// Retries after a capacity signal, each with a doubled allocation.
const MAX_GROW_RETRIES: usize = 3;

fn ch(glyphs: &[Glyph], i: usize) -> u32 {
    glyphs[i].ch.max(0) as u32
}

impl Registry {
    /// Shape `glyphs[from..to]`, replacing the range with the shaped
    /// result (whose length may differ) and returning the new end
    /// index.
    ///
    /// Each glyph's `ch` field must hold its character; everything else
    /// is reset here. With `table` the whole range is laid out by that
    /// table wherever covered; without it, tables are chosen per
    /// segment via [`Registry::find`]. Uncovered stretches get plain
    /// glyph ids and metrics from the adapter.
    pub fn run(
        &mut self,
        glyphs: &mut Vec<Glyph>,
        from: usize,
        mut to: usize,
        font: &mut dyn FontAdapter,
        table: Option<Arc<LayoutTable>>,
        direction: Direction,
    ) -> Result<usize, LayoutError> {
        for i in from..to {
            let c = glyphs[i].ch;
            glyphs[i] = Glyph::from_char(c, i);
        }

        let auto = table.is_none();
        let envelope = if auto { self.coverage_envelope() } else { None };

        let mut this_from = from;
        while this_from < to {
            let mut current = table.clone();
            let mut this_to = this_from;

            if let Some(t) = &current {
                while this_to < to && !t.covers(ch(glyphs, this_to)) {
                    this_to += 1;
                }
            } else {
                let Some((min_cov, max_cov)) = envelope else {
                    // No table loads at all: the entire run passes
                    // through the adapter untouched.
                    let _ = font.glyph_ids(&mut glyphs[this_from..to]);
                    let _ = font.metrics(&mut glyphs[this_from..to]);
                    break;
                };
                while this_to < to {
                    let c = ch(glyphs, this_to);
                    if c >= min_cov && c <= max_cov {
                        break;
                    }
                    this_to += 1;
                }
                while this_to < to {
                    if let Some(t) = self.find(ch(glyphs, this_to), Some(&mut *font)) {
                        current = Some(t);
                        break;
                    }
                    this_to += 1;
                }
            }

            if this_from < this_to {
                let _ = font.glyph_ids(&mut glyphs[this_from..this_to]);
                let _ = font.metrics(&mut glyphs[this_from..this_to]);
                this_from = this_to;
            }
            if this_to == to {
                break;
            }
            let current = current.expect("a covered prefix implies a table");

            while this_to < to && current.covers(ch(glyphs, this_to)) {
                this_to += 1;
            }
            debug!(table = %current.name, from = this_from, to = this_to, "shaping segment");

            let seg_len = this_to - this_from;
            let mut allocated = seg_len * self.initial_scale();
            let mut shaped = None;
            for _ in 0..MAX_GROW_RETRIES {
                match engine::run_stages(&glyphs[this_from..this_to], font, &current, allocated) {
                    Ok(out) => {
                        shaped = Some(out);
                        break;
                    }
                    Err(LayoutError::Capacity) => allocated *= 2,
                    Err(other) => return Err(other),
                }
            }
            let out = shaped.ok_or(LayoutError::Capacity)?;
            let out_len = out.len();
            glyphs.splice(this_from..this_to, out);
            to = to - seg_len + out_len;
            this_from += out_len;
        }

        if direction == Direction::RightToLeft && to > from {
            reverse_visual(&mut glyphs[from..to]);
        }

        Ok(to)
    }
}

/// Reverse a run for right-to-left display, keeping each glyph's
/// zero-advance attachments (combining marks) immediately after it.
fn reverse_visual(glyphs: &mut [Glyph]) {
    let seg = glyphs.to_vec();
    let mut j = glyphs.len();
    let mut i = 0;
    while i < seg.len() {
        let mut k = i + 1;
        while k < seg.len() && seg[k].xadv == 0 {
            k += 1;
        }
        let group = k - i;
        j -= group;
        glyphs[j..j + group].clone_from_slice(&seg[i..k]);
        i = k;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn g(code: u32, xadv: i32) -> Glyph {
        Glyph {
            code,
            ch: code as i32,
            xadv,
            ..Glyph::default()
        }
    }

    #[test]
    fn reversal_keeps_marks_attached_to_their_base() {
        let mut glyphs = vec![g(1, 100), g(2, 0), g(3, 0), g(4, 100), g(5, 100)];
        reverse_visual(&mut glyphs);
        let codes: Vec<u32> = glyphs.iter().map(|g| g.code).collect();
        assert_eq!(codes, vec![5, 4, 1, 2, 3]);
    }

    #[test]
    fn reversal_of_plain_run_is_a_plain_reverse() {
        let mut glyphs = vec![g(1, 10), g(2, 10), g(3, 10)];
        reverse_visual(&mut glyphs);
        let codes: Vec<u32> = glyphs.iter().map(|g| g.code).collect();
        assert_eq!(codes, vec![3, 2, 1]);
    }
}
