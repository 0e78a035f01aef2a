//! Prompt module for generative completion.
//!
//! Prompt text lives here so it can be reviewed apart from the code that
//! sends it.

pub mod backfill;

pub use backfill::*;
