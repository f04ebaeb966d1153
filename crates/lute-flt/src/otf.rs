//! OpenType feature specifications embedded in layout rules.
//!
//! A spec names a script, an optional language system and the GSUB/GPOS
//! feature sets to apply, written as `:otf=SCRIPT[/LANGSYS][=GSUB[+GPOS]]`.
//! An absent feature part means "apply all", an empty list means "apply
//! none", and `~tag` entries exclude tags from the wildcard set. The
//! legacy `otf:…` spelling is accepted and parsed through the same
//! grammar.

use core::fmt;

use crate::error::CompileError;

/// Four-byte OpenType tag, space padded.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Tag(pub u32);

impl Tag {
    pub fn parse(s: &str) -> Self {
        let mut value: u32 = 0;
        let mut taken = 0;
        for b in s.bytes().take(4) {
            value = (value << 8) | b as u32;
            taken += 1;
        }
        for _ in taken..4 {
            value = (value << 8) | 0x20;
        }
        Tag(value)
    }
}

impl fmt::Debug for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bytes = self.0.to_be_bytes();
        for b in bytes {
            if b.is_ascii_graphic() || b == b' ' {
                write!(f, "{}", b as char)?;
            } else {
                write!(f, "\\x{b:02x}")?;
            }
        }
        Ok(())
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// One GSUB or GPOS feature selection.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FeatureSpec {
    /// Apply every feature the font offers (unmarked list).
    #[default]
    All,
    /// Apply no features at all (explicitly empty list).
    None,
    /// Apply exactly these features.
    Only(Vec<Tag>),
    /// Apply everything except these features.
    Except(Vec<Tag>),
}

impl FeatureSpec {
    /// True when satisfying this selection needs the font to expose
    /// specific feature tags (as opposed to a wildcard or nothing).
    pub fn requires_concrete_features(&self) -> bool {
        matches!(self, FeatureSpec::Only(_))
    }
}

/// A parsed OTF command or probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OtfSpec {
    /// The source spelling, kept for diagnostics.
    pub sym: String,
    pub script: Tag,
    pub langsys: Option<Tag>,
    pub gsub: FeatureSpec,
    pub gpos: FeatureSpec,
}

impl OtfSpec {
    /// Whether `name` is spelled like an OTF command at all.
    pub fn is_otf_symbol(name: &str) -> bool {
        name.starts_with("otf:") || name.starts_with(":otf=")
    }

    pub fn parse(name: &str) -> Result<Self, CompileError> {
        let body = if let Some(rest) = name.strip_prefix("otf:") {
            rest
        } else if let Some(rest) = name.strip_prefix(":otf=") {
            rest
        } else {
            return Err(CompileError::BadOtfSpec(name.to_string()));
        };

        let bad = || CompileError::BadOtfSpec(name.to_string());

        let mut rest = body;
        // Tags are four letters; anything longer (the legacy
        // colon-delimited tail included) is cut off there.
        let script_len = rest
            .find(|c| c == '/' || c == '=' || c == '+')
            .unwrap_or(rest.len())
            .min(4);
        if script_len == 0 {
            return Err(bad());
        }
        let script = Tag::parse(&rest[..script_len]);
        rest = &rest[script_len..];

        let langsys = if let Some(after) = rest.strip_prefix('/') {
            let len = after
                .find(|c| c == '=' || c == '+')
                .unwrap_or(after.len())
                .min(4);
            if len == 0 {
                return Err(bad());
            }
            rest = &after[len..];
            Some(Tag::parse(&after[..len]))
        } else {
            None
        };

        let gsub = if let Some(after) = rest.strip_prefix('=') {
            let len = after.find('+').unwrap_or(after.len());
            let spec = parse_features(&after[..len]).ok_or_else(bad)?;
            rest = &after[len..];
            spec
        } else {
            // Legacy colon-separated feature lists land here and degrade
            // to the wildcard, as the original loader's rewrite did.
            FeatureSpec::All
        };

        let gpos = if let Some(after) = rest.strip_prefix('+') {
            parse_features(after).ok_or_else(bad)?
        } else {
            FeatureSpec::All
        };

        Ok(OtfSpec {
            sym: name.to_string(),
            script,
            langsys,
            gsub,
            gpos,
        })
    }

    /// True when realizing this spec needs `check_otf` support from the
    /// adapter; wildcard-only specs pass without probing.
    pub fn requires_concrete_features(&self) -> bool {
        self.gsub.requires_concrete_features() || self.gpos.requires_concrete_features()
    }
}

fn parse_features(list: &str) -> Option<FeatureSpec> {
    let trimmed = list.trim();
    if trimmed.is_empty() {
        return Some(FeatureSpec::None);
    }
    let mut plain = Vec::new();
    let mut negated = Vec::new();
    let mut wildcard = false;
    for token in trimmed.split(',') {
        let token = token.trim();
        if token == "*" {
            wildcard = true;
        } else if let Some(tag) = token.strip_prefix('~') {
            if tag.is_empty() || tag.len() > 4 {
                return None;
            }
            negated.push(Tag::parse(tag));
        } else {
            if token.is_empty() || token.len() > 4 {
                return None;
            }
            plain.push(Tag::parse(token));
        }
    }
    if !negated.is_empty() {
        Some(FeatureSpec::Except(negated))
    } else if wildcard {
        Some(FeatureSpec::All)
    } else {
        Some(FeatureSpec::Only(plain))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_script_applies_everything() {
        let spec = OtfSpec::parse(":otf=deva").unwrap();
        assert_eq!(spec.script, Tag::parse("deva"));
        assert_eq!(spec.langsys, None);
        assert_eq!(spec.gsub, FeatureSpec::All);
        assert_eq!(spec.gpos, FeatureSpec::All);
        assert!(!spec.requires_concrete_features());
    }

    #[test]
    fn explicit_lists_and_empty_lists() {
        let spec = OtfSpec::parse(":otf=deva/dflt=nukt,haln+").unwrap();
        assert_eq!(spec.langsys, Some(Tag::parse("dflt")));
        assert_eq!(
            spec.gsub,
            FeatureSpec::Only(vec![Tag::parse("nukt"), Tag::parse("haln")])
        );
        assert_eq!(spec.gpos, FeatureSpec::None);
        assert!(spec.requires_concrete_features());
    }

    #[test]
    fn negation_excludes_from_the_wildcard() {
        let spec = OtfSpec::parse(":otf=arab=~liga+*").unwrap();
        assert_eq!(spec.gsub, FeatureSpec::Except(vec![Tag::parse("liga")]));
        assert_eq!(spec.gpos, FeatureSpec::All);
        assert!(!spec.requires_concrete_features());
    }

    #[test]
    fn legacy_spelling_is_accepted() {
        let spec = OtfSpec::parse("otf:deva::nukt:haln").unwrap();
        assert_eq!(spec.script, Tag::parse("deva"));
        // Colon-delimited feature lists degrade to the wildcard.
        assert_eq!(spec.gsub, FeatureSpec::All);
        assert_eq!(spec.gpos, FeatureSpec::All);
    }

    #[test]
    fn short_tags_are_space_padded() {
        assert_eq!(Tag::parse("kn"), Tag(u32::from_be_bytes(*b"kn  ")));
        assert_eq!(format!("{}", Tag::parse("deva")), "deva");
    }
}
