pub mod entry;
pub mod record_set;

pub use entry::*;
pub use record_set::*;
