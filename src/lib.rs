//! Lute: font layout tables for complex text shaping.
//!
//! This façade re-exports the engine crate and wires it to the
//! workspace configuration; see `lute-flt` for the API.

use anyhow::Context;

pub use lute_config::LuteConfig;
pub use lute_flt::*;

/// Build a [`Registry`] over the table directory named by `config`.
pub fn registry_from_config(config: &LuteConfig) -> anyhow::Result<Registry> {
    let dir = config
        .tables
        .dir
        .as_ref()
        .context("no [tables] dir configured")?;
    let source = DirTableSource::new(dir);
    Ok(Registry::new(Box::new(source)).with_initial_scale(config.engine.initial_buffer_scale))
}
