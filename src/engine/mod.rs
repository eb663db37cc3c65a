//! Engine: index store, scanning, decoding, progress and the CLI handlers.

pub mod arg_parser;
pub mod db_ops;
pub mod decode;
pub mod handlers;
pub mod progress;
pub mod scan;
pub mod tools;

// Re-export commonly used functions
pub use arg_parser::{Cli, Commands, CommonArgs};
pub use db_ops::{
    SqliteTransaction, add_files, file_count, load_files, open_db, open_db_in_memory,
};
pub use decode::{Decoder, ExifTool, FsDecoder, MetadataReader, Probe};
pub use handlers::{handle_run, handle_scan, run_job};
pub use progress::{ProgressObserver, ProgressSnapshot};
pub use scan::{ScanResult, scan_dir};
