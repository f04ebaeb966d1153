//! The stage interpreter.
//!
//! Commands run over an input glyph range `[from, to)` and append to a
//! capacity-checked output buffer. A command resolves to
//! `Ok(Some(pos))` on success (with `pos` the new input position),
//! `Ok(None)` when it simply does not match, and `Err` when the run
//! must abort — with [`LayoutError::Capacity`] the recoverable variant
//! the caller retries on.

mod post;

use tracing::trace;

use crate::combining::CombiningCode;
use crate::compile::{CmdId, Command, Cond, Matcher, NMATCH, Rule, Stage};
use crate::error::LayoutError;
use crate::font::FontAdapter;
use crate::glyph::{Glyph, GlyphAdjustment, GlyphBuffer};
use crate::otf::{FeatureSpec, OtfSpec};
use crate::table::LayoutTable;

type Step = Result<Option<usize>, LayoutError>;

/// Mutable state of one pipeline pass over one segment.
struct LayoutContext<'a> {
    font: &'a mut dyn FontAdapter,
    in_buf: GlyphBuffer,
    out: GlyphBuffer,
    /// Category letter per input glyph index, rebuilt each stage.
    encoded: Vec<u8>,
    /// Capture spans of the innermost regex; slot 0 is the whole match.
    matches: [Option<(usize, usize)>; NMATCH],
    /// Pending offset a range matcher adds to the next direct code.
    code_offset: u32,
    cluster_begin_idx: Option<usize>,
    cluster_begin_pos: usize,
    cluster_end_pos: usize,
    /// Pending placement attached to the next emitted glyph.
    combining: Option<CombiningCode>,
    /// Pending left padding attached to the next emitted glyph.
    left_padding: bool,
    /// Dirty bits: which post passes have anything to do.
    saw_combining: bool,
    saw_padding: bool,
}

/// Run every stage of `table` over `seg`, then the post passes.
/// The output replaces the segment; its length may differ.
pub(crate) fn run_stages(
    seg: &[Glyph],
    font: &mut dyn FontAdapter,
    table: &LayoutTable,
    allocated: usize,
) -> Result<Vec<Glyph>, LayoutError> {
    if seg.is_empty() {
        return Ok(Vec::new());
    }
    let from_pos = seg[0].from;
    let to_pos = seg[seg.len() - 1].to;

    let mut ctx = LayoutContext {
        font,
        in_buf: GlyphBuffer::from_vec(seg.to_vec(), allocated),
        out: GlyphBuffer::with_capacity(allocated),
        encoded: Vec::new(),
        matches: [None; NMATCH],
        code_offset: 0,
        cluster_begin_idx: None,
        cluster_begin_pos: 0,
        cluster_end_pos: 0,
        combining: None,
        left_padding: false,
        saw_combining: false,
        saw_padding: false,
    };

    let mut from = 0;
    let mut to = seg.len();
    let last = table.stages.len() - 1;
    for (stage_idx, stage) in table.stages.iter().enumerate() {
        ctx.code_offset = 0;
        ctx.combining = None;
        ctx.left_padding = false;

        ctx.encoded.clear();
        ctx.encoded.resize(to, 0);
        let mut i = from;
        while i < to {
            let g = &ctx.in_buf[i];
            let enc = if g.encoded {
                if g.ch > 0 {
                    stage.category.lookup(g.ch as u32).unwrap_or(0)
                } else {
                    1
                }
            } else if g.code != 0 {
                stage.category.lookup(g.code).unwrap_or(0)
            } else {
                b' '
            };
            ctx.encoded[i] = enc;
            // Only the first stage sees raw characters; an uncovered one
            // truncates the runnable range there.
            if enc == 0 && stage_idx == 0 {
                to = i;
                break;
            }
            i += 1;
        }

        ctx.matches = [None; NMATCH];
        ctx.matches[0] = Some((from, to));
        trace!(
            stage = stage_idx,
            encoded = %String::from_utf8_lossy(&ctx.encoded[from..to]),
            "stage start"
        );
        ctx.run_command(stage, CmdId::Index(0), from, to)?;

        if stage_idx == last {
            break;
        }
        core::mem::swap(&mut ctx.in_buf, &mut ctx.out);
        ctx.out.clear();
        from = 0;
        to = ctx.in_buf.len();
    }

    if !ctx.out.is_empty() {
        ctx.out.retain(|g| !g.is_separator());
        let _ = ctx.font.glyph_ids(ctx.out.as_mut_slice());
        post::repair_coverage(ctx.out.as_mut_slice(), from_pos, to_pos);
        let _ = ctx.font.metrics(ctx.out.as_mut_slice());
        if ctx.saw_combining {
            let x_ppem = ctx.font.x_ppem() << 6;
            let y_ppem = ctx.font.y_ppem() << 6;
            if post::apply_combining(ctx.out.as_mut_slice(), x_ppem, y_ppem) {
                ctx.saw_padding = true;
            }
        }
        if ctx.saw_padding {
            post::apply_padding(ctx.out.as_mut_slice());
        }
    }

    Ok(ctx.out.into_vec())
}

impl<'a> LayoutContext<'a> {
    fn update_cluster(&mut self, gfrom: usize, gto: usize) {
        if self.cluster_begin_idx.is_some() {
            if self.cluster_begin_pos > gfrom {
                self.cluster_begin_pos = gfrom;
            }
            if self.cluster_end_pos < gto {
                self.cluster_end_pos = gto;
            }
        }
    }

    /// Template glyph for synthetic output: the one at `from`, or the
    /// previous one when the run is exhausted.
    fn template(&self, from: usize, to: usize) -> Glyph {
        let i = if from < to || from == 0 { from } else { from - 1 };
        self.in_buf.get(i).cloned().unwrap_or_default()
    }

    fn run_command(&mut self, stage: &Stage, id: CmdId, from: usize, to: usize) -> Step {
        match id {
            CmdId::Code(code) => {
                let mut g = self.template(from, to);
                g.code = self.code_offset + code;
                g.encoded = false;
                g.measured = false;
                if let Some(cc) = self.combining {
                    g.combining = Some(cc);
                    self.saw_combining = true;
                }
                if self.left_padding {
                    g.left_padding = true;
                    self.saw_padding = true;
                }
                // A synthetic code stands for everything it was derived
                // from: widen its span over the whole current run.
                for tmp in &self.in_buf[from..to] {
                    if g.from > tmp.from {
                        g.from = tmp.from;
                    } else if g.to < tmp.to {
                        g.to = tmp.to;
                    }
                }
                trace!(code = g.code, "direct");
                self.update_cluster(g.from, g.to);
                self.out.push(g)?;
                self.code_offset = 0;
                self.combining = None;
                self.left_padding = false;
                Ok(Some(from))
            }
            CmdId::Index(idx) => {
                let cmd = stage.cmds.get(idx).ok_or(LayoutError::BadCommand(idx))?;
                match cmd {
                    Command::Rule(rule) => self.run_rule(stage, rule, from, to),
                    Command::Cond(cond) => self.run_cond(stage, cond, from, to),
                    Command::Otf(spec) => self.run_otf(spec, from, to),
                }
            }
            CmdId::Combining(code) => {
                self.combining = Some(code);
                Ok(Some(from))
            }
            CmdId::Copy => {
                if from >= to {
                    return Ok(Some(from));
                }
                let mut g = self.in_buf[from].clone();
                if let Some(cc) = self.combining {
                    g.combining = Some(cc);
                    self.saw_combining = true;
                }
                if self.left_padding {
                    g.left_padding = true;
                    self.saw_padding = true;
                }
                self.update_cluster(g.from, g.to);
                self.out.push(g)?;
                self.code_offset = 0;
                self.combining = None;
                self.left_padding = false;
                Ok(Some(from + 1))
            }
            CmdId::ClusterBegin => {
                if self.cluster_begin_idx.is_none() {
                    let (bp, ep) = self
                        .in_buf
                        .get(from)
                        .map(|g| (g.from, g.to))
                        .unwrap_or((0, 0));
                    self.cluster_begin_idx = Some(self.out.len());
                    self.cluster_begin_pos = bp;
                    self.cluster_end_pos = ep;
                }
                Ok(Some(from))
            }
            CmdId::ClusterEnd => {
                // Lenient: closing with no open cluster, or before the
                // cluster produced any glyph, is a no-op.
                if let Some(begin) = self.cluster_begin_idx {
                    if begin < self.out.len() {
                        let (bp, ep) = (self.cluster_begin_pos, self.cluster_end_pos);
                        for g in &mut self.out.as_mut_slice()[begin..] {
                            g.from = bp;
                            g.to = ep;
                        }
                        self.cluster_begin_idx = None;
                    }
                }
                Ok(Some(from))
            }
            CmdId::Separator => {
                let mut g = self.template(from, to);
                g.ch = -1;
                g.code = 0;
                g.xadv = 0;
                g.yadv = 0;
                g.encoded = false;
                g.measured = false;
                self.out.push(g)?;
                Ok(Some(from))
            }
            CmdId::LeftPadding => {
                self.left_padding = true;
                Ok(Some(from))
            }
            CmdId::RightPadding => {
                if let Some(g) = self.out.as_mut_slice().last_mut() {
                    g.right_padding = true;
                    self.saw_padding = true;
                }
                Ok(Some(from))
            }
            CmdId::Repeat => Err(LayoutError::Malformed("`*` outside a rule body")),
        }
    }

    /// Capture slots are saved around every rule: a regex in a sub-rule
    /// must not clobber the groups its caller still refers to.
    fn run_rule(&mut self, stage: &Stage, rule: &Rule, from: usize, to: usize) -> Step {
        let saved = self.matches;
        let result = self.run_rule_body(stage, rule, from, to);
        self.matches = saved;
        result
    }

    fn run_rule_body(&mut self, stage: &Stage, rule: &Rule, from: usize, to: usize) -> Step {
        let orig_from = from;
        let mut from = from;
        let mut to = to;

        match &rule.matcher {
            Matcher::Seq(codes) => {
                if codes.len() > to.saturating_sub(from) {
                    return Ok(None);
                }
                for (i, &code) in codes.iter().enumerate() {
                    if self.in_buf[from + i].code != code {
                        return Ok(None);
                    }
                }
                to = from + codes.len();
                trace!(first = codes[0], "seq");
            }
            Matcher::Range { from: rf, to: rt } => {
                if from >= to {
                    return Ok(None);
                }
                let head = self.in_buf[from].code;
                if head < *rf || head > *rt {
                    return Ok(None);
                }
                self.code_offset = head - rf;
                to = from + 1;
                trace!(head, offset = self.code_offset, "range");
            }
            Matcher::Regex { pattern, re } => {
                if from > to {
                    return Ok(None);
                }
                let Some(caps) = re.captures(&self.encoded[from..to]) else {
                    return Ok(None);
                };
                let whole = caps.get(0).expect("group 0 of a match");
                // The compiled pattern is anchored, so the match starts
                // at the head of the remaining string.
                debug_assert_eq!(whole.start(), 0);
                let mut matches = [None; NMATCH];
                for (i, slot) in matches.iter_mut().enumerate().take(caps.len()) {
                    *slot = caps.get(i).map(|m| (from + m.start(), from + m.end()));
                }
                let end = from + whole.end();
                trace!(pattern = %pattern, end, "regex");
                self.matches = matches;
                to = end;
            }
            Matcher::MatchIndex(idx) => {
                let Some((f, t)) = self.matches[*idx] else {
                    return Ok(None);
                };
                from = f;
                to = t;
                trace!(idx, from, to, "match-index");
            }
            Matcher::HasGlyph(probe) => {
                let (code, already_encoded) = match probe {
                    None => {
                        if from >= to {
                            return Ok(None);
                        }
                        let g = &self.in_buf[from];
                        let probed = (g.code, g.encoded);
                        to = from + 1;
                        probed
                    }
                    Some(code) => {
                        to = from;
                        (*code, false)
                    }
                };
                if !already_encoded {
                    let mut probe_glyph = Glyph {
                        code,
                        ch: code as i32,
                        ..Glyph::default()
                    };
                    let supported = self
                        .font
                        .glyph_ids(core::slice::from_mut(&mut probe_glyph))
                        .is_ok()
                        && probe_glyph.encoded;
                    if !supported {
                        return Ok(None);
                    }
                }
            }
            Matcher::OtfProbe(spec) => {
                let pass = match self.font.check_otf(spec) {
                    Some(ok) => ok,
                    // Without probing support, only wildcard specs pass.
                    None => !spec.requires_concrete_features(),
                };
                if !pass {
                    return Ok(None);
                }
            }
        }

        let mut consumed = false;
        let mut i = 0;
        while i < rule.cmds.len() {
            let id = rule.cmds[i];
            if id == CmdId::Repeat {
                if consumed && i > 0 {
                    let prev = rule.cmds[i - 1];
                    loop {
                        match self.run_command(stage, prev, from, to)? {
                            Some(pos) if pos > from => from = pos,
                            _ => break,
                        }
                    }
                    consumed = false;
                }
                i += 1;
                continue;
            }
            match self.run_command(stage, id, from, to)? {
                Some(pos) if pos > from => {
                    from = pos;
                    consumed = true;
                }
                _ => consumed = false,
            }
            i += 1;
        }

        // A match-index rule consumes nothing; everything else consumes
        // its matched span.
        Ok(Some(match rule.matcher {
            Matcher::MatchIndex(_) => orig_from,
            _ => to,
        }))
    }

    fn run_cond(&mut self, stage: &Stage, cond: &Cond, from: usize, to: usize) -> Step {
        for &id in &cond.cmds {
            if let Some(pos) = self.run_command(stage, id, from, to)? {
                return Ok(Some(pos));
            }
        }
        Ok(None)
    }

    fn run_otf(&mut self, spec: &OtfSpec, from: usize, to: usize) -> Step {
        let from_idx = self.out.len();
        trace!(spec = %spec.sym, from, to, "otf");
        let _ = self.font.glyph_ids(&mut self.in_buf.as_mut_slice()[from..to]);

        let mut adjustments: Vec<GlyphAdjustment> = Vec::new();
        let drove = self.font.drive_otf(
            spec,
            &self.in_buf.as_slice()[from..to],
            &mut self.out,
            &mut adjustments,
        );
        match drove {
            None => {
                // No feature support: plain glyph ids and metrics.
                if self.out.len() + (to - from) > self.out.capacity() {
                    return Err(LayoutError::Capacity);
                }
                let _ = self.font.metrics(&mut self.in_buf.as_mut_slice()[from..to]);
                let input = self.in_buf.as_slice()[from..to].to_vec();
                self.out.extend_from_slice(&input)?;
            }
            Some(result) => {
                result?;
                let out_len = self.out.len() - from_idx;
                let wants_positioning = !matches!(spec.gpos, FeatureSpec::None);
                if wants_positioning && adjustments.iter().take(out_len).any(|a| a.set) {
                    let _ = self.font.metrics(&mut self.out.as_mut_slice()[from_idx..]);
                    for i in 0..out_len {
                        let adj = adjustments.get(i).copied().unwrap_or_default();
                        {
                            let g = &mut self.out.as_mut_slice()[from_idx + i];
                            g.measured = true;
                            if adj.advance_is_absolute {
                                g.xadv = adj.xadv;
                                g.yadv = adj.yadv;
                            } else if adj.xadv != 0 || adj.yadv != 0 {
                                g.xadv += adj.xadv;
                                g.yadv += adj.yadv;
                            }
                        }
                        if adj.xoff != 0 || adj.yoff != 0 {
                            // Offsets may be relative to a glyph further
                            // back; accumulate along the chain.
                            let (mut xoff, mut yoff) = (adj.xoff, adj.yoff);
                            let mut gi = i;
                            let mut ai = i;
                            while adjustments[ai].back > 0 {
                                let back = adjustments[ai].back;
                                if back > gi || back > ai {
                                    break;
                                }
                                for _ in 0..back {
                                    gi -= 1;
                                    xoff -= self.out[from_idx + gi].xadv;
                                }
                                ai -= back;
                                xoff += adjustments[ai].xoff;
                                yoff += adjustments[ai].yoff;
                            }
                            let g = &mut self.out.as_mut_slice()[from_idx + i];
                            g.xoff = xoff;
                            g.yoff = yoff;
                        }
                    }
                }
            }
        }

        if self.cluster_begin_idx.is_some() {
            for idx in from_idx..self.out.len() {
                let (gf, gt) = (self.out[idx].from, self.out[idx].to);
                self.update_cluster(gf, gt);
            }
        }
        Ok(Some(to))
    }
}
