//! Post passes over a finished stage pipeline: span repair, combining
//! placement and padding.

use crate::glyph::Glyph;

/// Make every source character position in `[from_pos, to_pos)` fall
/// inside some glyph's span. A leading gap widens the first covered
/// glyph (and the glyphs sharing its `from`) back to the segment start;
/// any other gap widens the glyph covering the previous position (and
/// the glyphs sharing its `to`) forward. Consecutive gaps chain.
pub(super) fn repair_coverage(glyphs: &mut [Glyph], from_pos: usize, to_pos: usize) {
    if glyphs.is_empty() || to_pos <= from_pos {
        return;
    }
    let len = to_pos - from_pos;
    let mut cover: Vec<Option<usize>> = vec![None; len];
    for (i, g) in glyphs.iter().enumerate() {
        for pos in g.from..g.to {
            if (from_pos..to_pos).contains(&pos) && cover[pos - from_pos].is_none() {
                cover[pos - from_pos] = Some(i);
            }
        }
    }

    let mut i = 0;
    while i < len {
        if cover[i].is_some() {
            i += 1;
            continue;
        }
        if i == 0 {
            let mut k = 0;
            while k < len && cover[k].is_none() {
                k += 1;
            }
            if k == len {
                return;
            }
            let j = cover[k].expect("first covered position");
            let shared_from = glyphs[j].from;
            let mut jj = j;
            while jj < glyphs.len() && glyphs[jj].from == shared_from {
                glyphs[jj].from = from_pos;
                jj += 1;
            }
            for slot in cover.iter_mut().take(k) {
                *slot = Some(j);
            }
            i = k;
        } else {
            let j = cover[i - 1].expect("previous position covered");
            let shared_to = glyphs[j].to;
            let mut jj = j as isize;
            while jj >= 0 && glyphs[jj as usize].to == shared_to {
                glyphs[jj as usize].to = from_pos + i + 1;
                jj -= 1;
            }
            cover[i] = Some(j);
            i += 1;
        }
    }
}

/// Position every combining glyph against its preceding base, fold its
/// ink extents into the base and zero its advance. Returns true when a
/// right-padding flag migrated onto a base glyph.
pub(super) fn apply_combining(glyphs: &mut [Glyph], x_ppem: i32, y_ppem: i32) -> bool {
    if glyphs.is_empty() {
        return false;
    }
    let mut padding_added = false;
    let mut base_idx = 0;
    // The base extent is captured when the base is chosen; marks folded
    // in later do not move the anchors of the ones that follow.
    let mut base_height = glyphs[0].ascent + glyphs[0].descent;
    for i in 1..glyphs.len() {
        let Some(cc) = glyphs[i].combining else {
            base_idx = i;
            base_height = glyphs[i].ascent + glyphs[i].descent;
            continue;
        };
        let (head, tail) = glyphs.split_at_mut(i);
        let base = &mut head[base_idx];
        let g = &mut tail[0];

        if base.from > g.from {
            base.from = g.from;
        } else if base.to < g.to {
            base.to = g.to;
        }

        let height = g.ascent + g.descent;
        let (bx, by) = (cc.base_h as i32, cc.base_v as i32);
        let (ax, ay) = (cc.add_h as i32, cc.add_v as i32);

        g.xoff = (base.xadv * bx - g.xadv * ax) / 2 + x_ppem * cc.off_x as i32 / 100 - base.xadv;
        g.yoff = if by < 3 {
            base_height * by / 2 - base.ascent
        } else {
            0
        };
        if ay < 3 {
            g.yoff -= height * ay / 2 - g.ascent;
        }
        g.yoff -= y_ppem * cc.off_y as i32 / 100;

        if base.lbearing > base.xadv + g.lbearing + g.xoff {
            base.lbearing = base.xadv + g.lbearing + g.xoff;
        }
        if base.rbearing < base.xadv + g.xadv + g.xoff {
            base.rbearing = base.xadv + g.xadv + g.xoff;
        }
        if base.ascent < g.ascent - g.yoff {
            base.ascent = g.ascent - g.yoff;
        }
        if base.descent < g.descent - g.yoff {
            base.descent = g.descent - g.yoff;
        }
        g.xadv = 0;
        g.yadv = 0;
        if g.right_padding {
            base.right_padding = true;
            padding_added = true;
        }
    }
    padding_added
}

/// Right padding widens the advance to the right bearing; left padding
/// shifts the origin so the left bearing becomes zero. Combining glyphs
/// were already folded into their base and are skipped.
pub(super) fn apply_padding(glyphs: &mut [Glyph]) {
    for g in glyphs.iter_mut().filter(|g| g.combining.is_none()) {
        if g.right_padding && g.rbearing > g.xadv {
            g.xadv = g.rbearing;
        }
        if g.left_padding && g.lbearing < 0 {
            g.xoff -= g.lbearing;
            g.xadv -= g.lbearing;
            g.rbearing -= g.lbearing;
            g.lbearing = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::combining;

    fn glyph(from: usize, to: usize) -> Glyph {
        Glyph {
            code: 1,
            ch: 1,
            from,
            to,
            ..Glyph::default()
        }
    }

    #[test]
    fn interior_gap_widens_the_previous_glyph() {
        let mut glyphs = vec![glyph(0, 1), glyph(2, 3)];
        repair_coverage(&mut glyphs, 0, 3);
        assert_eq!((glyphs[0].from, glyphs[0].to), (0, 2));
        assert_eq!((glyphs[1].from, glyphs[1].to), (2, 3));
    }

    #[test]
    fn consecutive_gaps_chain() {
        let mut glyphs = vec![glyph(0, 1), glyph(4, 5)];
        repair_coverage(&mut glyphs, 0, 5);
        assert_eq!((glyphs[0].from, glyphs[0].to), (0, 4));
    }

    #[test]
    fn leading_gap_widens_the_first_covered_glyph() {
        let mut glyphs = vec![glyph(2, 3), glyph(3, 4)];
        repair_coverage(&mut glyphs, 0, 4);
        assert_eq!((glyphs[0].from, glyphs[0].to), (0, 3));
    }

    #[test]
    fn padding_moves_the_origin_and_advance() {
        let mut g = glyph(0, 1);
        g.xadv = 400;
        g.lbearing = -64;
        g.rbearing = 500;
        g.left_padding = true;
        g.right_padding = true;
        let mut glyphs = vec![g];
        apply_padding(&mut glyphs);
        let g = &glyphs[0];
        // Right padding first: advance widens to the bearing; then the
        // left shift adds the (former) negative bearing everywhere.
        assert_eq!(g.xadv, 500 + 64);
        assert_eq!(g.xoff, 64);
        assert_eq!(g.lbearing, 0);
        assert_eq!(g.rbearing, 564);
    }

    #[test]
    fn combining_zeroes_the_mark_advance() {
        let mut base = glyph(0, 1);
        base.xadv = 600;
        base.ascent = 700;
        base.descent = 200;
        base.rbearing = 580;
        let mut mark = glyph(1, 2);
        mark.xadv = 100;
        mark.ascent = 50;
        mark.descent = 10;
        mark.combining = combining::parse("tc.bc");
        let mut glyphs = vec![base, mark];
        apply_combining(&mut glyphs, 10 << 6, 10 << 6);
        assert_eq!(glyphs[1].xadv, 0);
        // tc.bc: mark sits centered above the base's top edge.
        assert_eq!(glyphs[1].xoff, (600 - 100) / 2 - 600);
        // Mark baseline rides high enough that its bottom edge
        // (descent = 10) lands exactly on the base's top (-700).
        assert_eq!(glyphs[1].yoff, -710);
        // Base span swallowed the mark's.
        assert_eq!((glyphs[0].from, glyphs[0].to), (0, 2));
        // Base ascent grew by the mark's shifted extent.
        assert_eq!(glyphs[0].ascent, 50 + 710);
    }
}
