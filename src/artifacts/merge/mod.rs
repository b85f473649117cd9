//! Merge-base queries over the commit graph
//!
//! - `bca_finder`: best common ancestors and ancestry checks

pub mod bca_finder;
