use thiserror::Error;

/// Errors raised while compiling a layout table definition.
///
/// A compile error drops the whole table; no partially built stage is
/// ever registered.
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("syntax error: {0}")]
    Syntax(String),

    #[error("invalid category {0:#x}: must be ASCII alphanumeric")]
    BadCategory(i64),

    #[error("invalid regular expression")]
    BadPattern(#[from] regex::Error),

    #[error("match index {0} out of range 0..20")]
    BadMatchIndex(i64),

    #[error("negative code {0} in rule")]
    NegativeCode(i64),

    #[error("unresolvable symbol `{0}`")]
    UnknownSymbol(String),

    #[error("macro `{0}` refers to itself")]
    MacroCycle(String),

    #[error("malformed OTF spec `{0}`")]
    BadOtfSpec(String),

    #[error("malformed table definition: {0}")]
    BadDefinition(&'static str),

    #[error("generator stage has no category table in scope")]
    MissingCategory,

    #[error("table defines no generator stage")]
    NoStages,
}

/// Errors raised while running the layout pipeline.
#[derive(Debug, Error)]
pub enum LayoutError {
    /// The output buffer cannot hold another glyph. Recoverable: the
    /// caller retries the segment with a doubled allocation.
    #[error("output buffer capacity exhausted")]
    Capacity,

    #[error("malformed glyph state: {0}")]
    Malformed(&'static str),

    #[error("reference to unknown command {0}")]
    BadCommand(usize),

    #[error("font adapter failure")]
    Adapter(#[from] AdapterError),
}

/// Errors reported by a font adapter.
///
/// Outside of feature application these are soft failures: a probe that
/// errors simply fails its rule, and unresolved glyphs stay unencoded.
#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("invalid font data")]
    InvalidFont,

    #[error("glyph id lookup failed")]
    GlyphId,

    #[error("metrics lookup failed")]
    Metrics,

    #[error("font I/O error: {0}")]
    Io(#[from] std::io::Error),
}
