//! Utility types shared across the crate.

mod handle_table;

pub use handle_table::{HandleTable, SocketId};
