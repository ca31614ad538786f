//! Application runtime composition modules.

pub(crate) mod input;
pub(crate) mod runtime;
pub(crate) mod terminal;
