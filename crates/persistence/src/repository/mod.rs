//! Repository implementations for database operations

pub mod calls;

pub use calls::*;
