//! # Formats Module
//!
//! Binary snapshot format for organizations.
//!
//! This module only converts between `Organization` and bytes. Where the
//! bytes live is the concern of [`crate::storage`] and the app layer.

mod persistence;

pub use persistence::*;
