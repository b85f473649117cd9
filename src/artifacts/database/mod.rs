//! Storage backends for the object database
//!
//! A backend stores framed objects (`<type> <size>\0<body>`) keyed by their id.
//! The object database composes several backends into a prioritized chain:
//!
//! - `loose`: one zlib-compressed file per object under `objects/xx/yyyy…`
//! - `pack`: read-only git pack files (version 2), including delta entries
//! - `memory`: a map held in memory, mostly for tests and scratch stores

pub mod backend;
pub mod delta;
pub mod loose;
pub mod memory;
pub mod pack;
