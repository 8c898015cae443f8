pub mod blocking;
pub mod locks;

pub use blocking::run_blocking;
pub use locks::{lock_mutex, read_lock, write_lock};
