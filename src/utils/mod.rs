pub mod config;
pub mod fd_limit;
pub mod logger;
pub mod trapscan_toml;

pub use config::*;
pub use fd_limit::{FDS_PER_IO_WORKER, cap_io_workers, max_open_fds, max_workers_by_fd_limit};
pub use logger::setup_logging;
