//! Byte-ring storage: the double-mapped region and its cursors.

pub(crate) mod cursors;
pub(crate) mod virtual_memory;

pub(crate) use cursors::{Cursor, Occupancy};
pub(crate) use virtual_memory::DoubleMapped;
