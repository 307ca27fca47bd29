//! Jinja rendering of SQL templates
//!
//! This crate handles:
//! - Resolving template identifiers under a templates root (never outside it)
//! - Rendering with strict undefined-variable semantics
//! - Error handling with detailed diagnostics

pub mod renderer;

pub use renderer::{SqlRenderer, RenderedQuery, RenderError};
