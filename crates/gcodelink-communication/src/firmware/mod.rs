//! Controller firmware dialects
//!
//! Only the GRBL line protocol is spoken today.

pub mod grbl;
