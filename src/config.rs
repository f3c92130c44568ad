//! Configuration loading.
//!
//! Runtime options are clap structs with environment fallbacks (see the crate
//! root); this module supplies the pieces underneath them: the `KEY=VALUE`
//! environment file that seeds the process environment at startup, and the
//! duration syntax used by interval/timeout options.

pub mod duration;
pub mod env_file;

pub use duration::parse_duration;
