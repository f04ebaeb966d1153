//! Compiles `generator` blocks into executable stages.
//!
//! A stage is an array of commands addressed by index; index 0 is the
//! entry rule. Macros occupy the slots after the entry and compile
//! lazily, memoized on first reference. Builtins, direct codes and
//! combining placements compile to ids of their own rather than slots.

use std::sync::Arc;

use crate::category::CategoryTable;
use crate::combining::{self, CombiningCode};
use crate::error::CompileError;
use crate::otf::OtfSpec;
use crate::syntax::Expr;

/// Capture slots available to regex rules and match-index references.
pub const NMATCH: usize = 20;

/// Identifier of one executable command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmdId {
    /// Emit `pending_offset + code` without consuming input.
    Code(u32),
    /// `=` copy the current glyph.
    Copy,
    /// `*` repeat the previous sub-command while it consumes input.
    Repeat,
    /// `<` open a cluster.
    ClusterBegin,
    /// `>` close a cluster. Closing with none open is a lenient no-op.
    ClusterEnd,
    /// `|` emit a structural separator.
    Separator,
    /// `[` arm left padding for the next emitted glyph.
    LeftPadding,
    /// `]` mark the last emitted glyph for right padding.
    RightPadding,
    /// Attach this placement to the next emitted glyph.
    Combining(CombiningCode),
    /// A compiled command in the stage's array.
    Index(usize),
}

/// How a rule decides whether it applies.
#[derive(Debug)]
pub enum Matcher {
    /// Anchored pattern over the category string.
    Regex { pattern: String, re: regex::bytes::Regex },
    /// Back-reference to a capture group of the last regex.
    MatchIndex(usize),
    /// Fixed code sequence.
    Seq(Vec<u32>),
    /// First code within an inclusive range; sets the pending offset.
    Range { from: u32, to: u32 },
    /// Probe the adapter for a glyph (`None` probes the current one).
    HasGlyph(Option<u32>),
    /// Probe the adapter for an OTF spec.
    OtfProbe(OtfSpec),
}

#[derive(Debug)]
pub struct Rule {
    pub matcher: Matcher,
    pub cmds: Vec<CmdId>,
}

/// Optimization hint on a `cond`: the contiguous run of sequence rules
/// among its alternatives and the range of their first codes. Dispatch
/// does not consult it; semantics never depend on it.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SeqHint {
    pub beg: Option<usize>,
    pub end: Option<usize>,
    pub from: u32,
    pub to: u32,
}

#[derive(Debug)]
pub struct Cond {
    pub cmds: Vec<CmdId>,
    pub hint: SeqHint,
}

#[derive(Debug)]
pub enum Command {
    Rule(Rule),
    Cond(Cond),
    Otf(OtfSpec),
}

/// One pass of the pipeline: a category table and its command array.
#[derive(Debug)]
pub struct Stage {
    pub category: Arc<CategoryTable>,
    pub cmds: Vec<Command>,
}

enum Slot {
    Empty,
    Loading,
    Done(Command),
}

enum MacroState {
    Unresolved,
    Resolving,
    Resolved(CmdId),
}

struct StageBuilder<'a> {
    slots: Vec<Slot>,
    macros: Vec<(&'a str, &'a Expr)>,
    macro_states: Vec<MacroState>,
}

/// Compile the elements of a `generator` block (entry rule followed by
/// macro definitions) against `category`.
pub fn compile_stage(
    category: Arc<CategoryTable>,
    items: &[Expr],
) -> Result<Stage, CompileError> {
    let entry = items
        .first()
        .ok_or(CompileError::BadDefinition("generator block is empty"))?;

    let mut macros = Vec::new();
    for def in &items[1..] {
        let list = def
            .as_list()
            .ok_or(CompileError::BadDefinition("macro definition must be a list"))?;
        let name = list
            .first()
            .and_then(Expr::as_symbol)
            .ok_or(CompileError::BadDefinition("macro definition needs a name"))?;
        let body = list
            .get(1)
            .ok_or(CompileError::BadDefinition("macro definition needs a rule"))?;
        macros.push((name, body));
    }

    let mut builder = StageBuilder {
        slots: Vec::with_capacity(1 + macros.len()),
        macro_states: macros.iter().map(|_| MacroState::Unresolved).collect(),
        macros,
    };
    for _ in 0..=builder.macros.len() {
        builder.slots.push(Slot::Empty);
    }

    let entry_id = builder.load(entry, Some(0))?;
    if entry_id != CmdId::Index(0) {
        // Entries that compile to a bare builtin or code still need a
        // dispatchable slot 0; a single-alternative cond wraps them.
        builder.slots[0] = Slot::Done(Command::Cond(Cond {
            cmds: vec![entry_id],
            hint: SeqHint::default(),
        }));
    }

    let cmds = builder
        .slots
        .into_iter()
        .map(|slot| match slot {
            Slot::Done(cmd) => cmd,
            // Unreferenced macro slots stay as never-matching conds.
            _ => Command::Cond(Cond {
                cmds: Vec::new(),
                hint: SeqHint::default(),
            }),
        })
        .collect();

    Ok(Stage { category, cmds })
}

impl<'a> StageBuilder<'a> {
    /// Compile one rule expression. `slot` pins the result into a
    /// preallocated command slot (entry rule or macro body); list rules
    /// without a slot allocate a fresh one.
    fn load(&mut self, expr: &Expr, slot: Option<usize>) -> Result<CmdId, CompileError> {
        match expr {
            Expr::Int(code) => {
                if *code < 0 {
                    return Err(CompileError::NegativeCode(*code));
                }
                Ok(CmdId::Code(*code as u32))
            }
            Expr::List(items) => self.load_list(items, slot),
            Expr::Symbol(name) => self.load_symbol(name, slot),
            Expr::Str(_) => Err(CompileError::BadDefinition(
                "pattern string outside a rule list",
            )),
        }
    }

    fn claim_slot(&mut self, slot: Option<usize>) -> usize {
        match slot {
            Some(idx) => {
                self.slots[idx] = Slot::Loading;
                idx
            }
            None => {
                self.slots.push(Slot::Loading);
                self.slots.len() - 1
            }
        }
    }

    fn load_list(&mut self, items: &[Expr], slot: Option<usize>) -> Result<CmdId, CompileError> {
        let head = items
            .first()
            .ok_or(CompileError::BadDefinition("empty rule list"))?;

        if head.as_symbol() == Some("cond") {
            let idx = self.claim_slot(slot);
            let mut cmds = Vec::with_capacity(items.len() - 1);
            let mut hint = SeqHint::default();
            for (i, alt) in items[1..].iter().enumerate() {
                let id = self.load(alt, None)?;
                cmds.push(id);
                self.note_seq_hint(&mut hint, i, id);
            }
            if hint.beg.is_some() && hint.end.is_none() {
                hint.end = Some(cmds.len());
            }
            self.slots[idx] = Slot::Done(Command::Cond(Cond { cmds, hint }));
            return Ok(CmdId::Index(idx));
        }

        let idx = self.claim_slot(slot);
        let matcher = self.load_matcher(head)?;
        let mut cmds = Vec::with_capacity(items.len() - 1);
        for sub in &items[1..] {
            cmds.push(self.load(sub, None)?);
        }
        self.slots[idx] = Slot::Done(Command::Rule(Rule { matcher, cmds }));
        Ok(CmdId::Index(idx))
    }

    fn load_matcher(&mut self, head: &Expr) -> Result<Matcher, CompileError> {
        match head {
            Expr::Str(pattern) => {
                // Matching must start at the head of the remaining
                // category string.
                let anchored = if pattern.starts_with('^') {
                    pattern.clone()
                } else {
                    format!("^{pattern}")
                };
                let re = regex::bytes::Regex::new(&anchored)?;
                Ok(Matcher::Regex {
                    pattern: anchored,
                    re,
                })
            }
            Expr::Int(idx) => {
                if !(0..NMATCH as i64).contains(idx) {
                    return Err(CompileError::BadMatchIndex(*idx));
                }
                Ok(Matcher::MatchIndex(*idx as usize))
            }
            Expr::List(spec) => self.load_list_matcher(spec),
            Expr::Symbol(_) => Err(CompileError::BadDefinition("bad rule matcher")),
        }
    }

    fn load_list_matcher(&mut self, spec: &[Expr]) -> Result<Matcher, CompileError> {
        match spec.first() {
            Some(Expr::Int(_)) => {
                let codes = spec
                    .iter()
                    .map(|e| match e.as_int() {
                        Some(n) if n >= 0 => Ok(n as u32),
                        Some(n) => Err(CompileError::NegativeCode(n)),
                        None => Err(CompileError::BadDefinition("sequence must hold integers")),
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Matcher::Seq(codes))
            }
            Some(Expr::Symbol(sym)) if sym == "range" && spec.len() == 3 => {
                let from = spec[1]
                    .as_int()
                    .filter(|n| *n >= 0)
                    .ok_or(CompileError::BadDefinition("bad range bound"))?;
                let to = spec[2]
                    .as_int()
                    .filter(|n| *n >= from)
                    .ok_or(CompileError::BadDefinition("bad range bound"))?;
                Ok(Matcher::Range {
                    from: from as u32,
                    to: to as u32,
                })
            }
            Some(Expr::Symbol(sym)) if sym == "font-facility" && spec.len() <= 2 => {
                match spec.get(1) {
                    None => Ok(Matcher::HasGlyph(None)),
                    Some(Expr::Int(code)) if *code >= 0 => {
                        Ok(Matcher::HasGlyph(Some(*code as u32)))
                    }
                    Some(Expr::Int(code)) => Err(CompileError::NegativeCode(*code)),
                    Some(Expr::Symbol(otf)) if otf.starts_with(":otf") => {
                        Ok(Matcher::OtfProbe(OtfSpec::parse(otf)?))
                    }
                    _ => Err(CompileError::BadDefinition("bad font-facility probe")),
                }
            }
            _ => Err(CompileError::BadDefinition("bad rule matcher")),
        }
    }

    fn load_symbol(&mut self, name: &str, slot: Option<usize>) -> Result<CmdId, CompileError> {
        if OtfSpec::is_otf_symbol(name) {
            let spec = OtfSpec::parse(name)?;
            let idx = self.claim_slot(slot);
            self.slots[idx] = Slot::Done(Command::Otf(spec));
            return Ok(CmdId::Index(idx));
        }

        if name.len() == 1 {
            match name.as_bytes()[0] {
                b'=' => return Ok(CmdId::Copy),
                b'*' => return Ok(CmdId::Repeat),
                b'<' => return Ok(CmdId::ClusterBegin),
                b'>' => return Ok(CmdId::ClusterEnd),
                b'|' => return Ok(CmdId::Separator),
                b'[' => return Ok(CmdId::LeftPadding),
                b']' => return Ok(CmdId::RightPadding),
                _ => {}
            }
        } else if let Some(code) = combining::parse(name) {
            return Ok(CmdId::Combining(code));
        }

        let Some(pos) = self.macros.iter().position(|(n, _)| *n == name) else {
            return Err(CompileError::UnknownSymbol(name.to_string()));
        };
        match self.macro_states[pos] {
            MacroState::Resolved(id) => Ok(id),
            MacroState::Resolving => Err(CompileError::MacroCycle(name.to_string())),
            MacroState::Unresolved => {
                self.macro_states[pos] = MacroState::Resolving;
                let body = self.macros[pos].1;
                let id = self.load(body, Some(1 + pos))?;
                self.macro_states[pos] = MacroState::Resolved(id);
                Ok(id)
            }
        }
    }

    fn note_seq_hint(&self, hint: &mut SeqHint, i: usize, id: CmdId) {
        let first_code = match id {
            CmdId::Index(idx) => match &self.slots[idx] {
                Slot::Done(Command::Rule(Rule {
                    matcher: Matcher::Seq(codes),
                    ..
                })) => codes.first().copied(),
                _ => None,
            },
            _ => None,
        };
        match first_code {
            Some(code) => {
                if hint.beg.is_none() {
                    hint.beg = Some(i);
                    hint.from = code;
                    hint.to = code;
                } else if hint.end.is_none() {
                    hint.from = hint.from.min(code);
                    hint.to = hint.to.max(code);
                }
            }
            None => {
                if hint.beg.is_some() && hint.end.is_none() {
                    hint.end = Some(i);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax;

    fn stage(src: &str) -> Result<Stage, CompileError> {
        let items = syntax::parse(src).unwrap();
        let category =
            Arc::new(CategoryTable::from_ranges([(0u32, 0x10FFFF, b'E')]).unwrap());
        compile_stage(category, &items)
    }

    #[test]
    fn entry_rule_lands_in_slot_zero() {
        let s = stage(r#"("E+" = *)"#).unwrap();
        let Command::Rule(rule) = &s.cmds[0] else {
            panic!("entry should be a rule");
        };
        assert!(matches!(rule.matcher, Matcher::Regex { .. }));
        assert_eq!(rule.cmds, vec![CmdId::Copy, CmdId::Repeat]);
    }

    #[test]
    fn patterns_get_an_implicit_anchor() {
        let s = stage(r#"("EN?" =)"#).unwrap();
        let Command::Rule(Rule {
            matcher: Matcher::Regex { pattern, .. },
            ..
        }) = &s.cmds[0]
        else {
            panic!();
        };
        assert_eq!(pattern, "^EN?");
    }

    #[test]
    fn builtin_symbols_compile_to_their_ids() {
        let s = stage(r#"("E" < | = * | > [ ] tc.bc)"#).unwrap();
        let Command::Rule(rule) = &s.cmds[0] else { panic!() };
        assert_eq!(rule.cmds[0], CmdId::ClusterBegin);
        assert_eq!(rule.cmds[1], CmdId::Separator);
        assert_eq!(rule.cmds[5], CmdId::ClusterEnd);
        assert_eq!(rule.cmds[6], CmdId::LeftPadding);
        assert_eq!(rule.cmds[7], CmdId::RightPadding);
        assert!(matches!(rule.cmds[8], CmdId::Combining(_)));
    }

    #[test]
    fn macros_memoize_into_their_slot() {
        let s = stage(r#"("E+" dup dup) (dup ("E" = =))"#).unwrap();
        let Command::Rule(entry) = &s.cmds[0] else { panic!() };
        assert_eq!(entry.cmds, vec![CmdId::Index(1), CmdId::Index(1)]);
        assert!(matches!(s.cmds[1], Command::Rule(_)));
    }

    #[test]
    fn self_referential_macros_are_rejected() {
        let err = stage(r#"("E" loop) (loop ("E" loop))"#).unwrap_err();
        assert!(matches!(err, CompileError::MacroCycle(_)));
    }

    #[test]
    fn unknown_symbols_are_rejected() {
        let err = stage(r#"("E" nonsense)"#).unwrap_err();
        assert!(matches!(err, CompileError::UnknownSymbol(_)));
    }

    #[test]
    fn match_index_must_be_in_range() {
        let err = stage(r#"(21 =)"#).unwrap_err();
        assert!(matches!(err, CompileError::BadMatchIndex(21)));
    }

    #[test]
    fn cond_records_its_sequence_hint() {
        let s = stage(
            r#"(cond ((0x41 0x42) 0x100) ((0x45) 0x101) ("E" =) ((0x46) 0x102))"#,
        )
        .unwrap();
        let Command::Cond(cond) = &s.cmds[0] else { panic!() };
        assert_eq!(cond.hint.beg, Some(0));
        assert_eq!(cond.hint.end, Some(2));
        assert_eq!(cond.hint.from, 0x41);
        assert_eq!(cond.hint.to, 0x45);
    }

    #[test]
    fn font_facility_forms() {
        let s = stage(r#"(cond ((font-facility) =) ((font-facility 0x20) =) ((font-facility :otf=deva) =))"#)
            .unwrap();
        let Command::Cond(cond) = &s.cmds[0] else { panic!() };
        let kinds: Vec<_> = cond
            .cmds
            .iter()
            .map(|id| match id {
                CmdId::Index(i) => match &s.cmds[*i] {
                    Command::Rule(r) => match &r.matcher {
                        Matcher::HasGlyph(None) => "probe-current",
                        Matcher::HasGlyph(Some(_)) => "probe-code",
                        Matcher::OtfProbe(_) => "probe-otf",
                        _ => "other",
                    },
                    _ => "other",
                },
                _ => "other",
            })
            .collect();
        assert_eq!(kinds, vec!["probe-current", "probe-code", "probe-otf"]);
    }
}
