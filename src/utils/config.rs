//! Application configuration constants.
//! Tuning and thresholds in one place.

use std::sync::OnceLock;
use std::time::Duration;

// ---- Package / paths (from CARGO_PKG_NAME, cached) ----

/// Package-derived paths: built once from `CARGO_PKG_NAME`, then cached.
pub struct PackagePaths {
    db_filename: String,
    config_filename: String,
}

static PACKAGE_PATHS: OnceLock<PackagePaths> = OnceLock::new();

impl PackagePaths {
    /// Build and cache paths from `CARGO_PKG_NAME`. Called once on first use.
    pub fn get() -> &'static PackagePaths {
        PACKAGE_PATHS.get_or_init(|| {
            let pkg = env!("CARGO_PKG_NAME");
            PackagePaths {
                db_filename: format!(".{pkg}.db"),
                config_filename: format!(".{pkg}.toml"),
            }
        })
    }

    /// Default store filename inside the image set root.
    pub fn db_filename(&self) -> &str {
        &self.db_filename
    }

    /// Optional per-directory settings file (CLI only).
    pub fn config_filename(&self) -> &str {
        &self.config_filename
    }
}

// ---- Worker threads ----

/// Thread limits for sizing the two worker pools.
/// Use [`WorkerThreadLimits::current()`] to fill `all_threads` from rayon; the rest are const.
#[derive(Clone, Copy, Debug)]
pub struct WorkerThreadLimits {
    /// Available threads (from rayon); set by [`WorkerThreadLimits::current()`].
    pub all_threads: usize,
    /// Default I/O (decode) workers. Independent of CPU count.
    pub io_default: usize,
    /// Floor for either pool.
    pub floor: usize,
}

impl Default for WorkerThreadLimits {
    fn default() -> Self {
        Self {
            all_threads: 0, // use current() to set from rayon
            io_default: Self::IO_THREADS,
            floor: Self::FLOOR_THREADS,
        }
    }
}

impl WorkerThreadLimits {
    pub const IO_THREADS: usize = 4;
    pub const FLOOR_THREADS: usize = 1;

    /// Build limits with `all_threads` set from `rayon::current_num_threads()`.
    pub fn current() -> Self {
        Self {
            all_threads: rayon::current_num_threads(),
            ..Self::default()
        }
    }

    /// Compute workers: one per available thread.
    pub fn compute_threads(&self) -> usize {
        self.all_threads.max(self.floor)
    }
}

// ---- Pipeline ----

/// Batching, channel and throttle defaults for the pipeline.
pub struct PipelineConsts;

impl PipelineConsts {
    /// Records per persistence transaction (balance transaction size vs round-trips).
    pub const DEFAULT_BATCH_SIZE: usize = 1000;
    /// Files per atom.
    pub const DEFAULT_ATOM_SIZE: usize = 2;
    /// Channel slots per worker for the atom and decoded-atom channels.
    pub const ATOMS_IN_FLIGHT_PER_WORKER: usize = 2;
    /// Minimum gap between two status publishes.
    pub const STATUS_INTERVAL: Duration = Duration::from_millis(250);
    /// Minimum gap between two preview compositions.
    pub const PREVIEW_INTERVAL: Duration = Duration::from_secs(2);
    /// Minimum gap between two hand-offs of a worker's changed records to the sink.
    pub const FLUSH_INTERVAL: Duration = Duration::from_secs(1);
    /// Status updates buffered towards the reporter before senders start coalescing.
    pub const STATUS_CHANNEL_CAP: usize = 64;
    /// Longest side of a preview thumbnail, in pixels.
    pub const PREVIEW_MAX_SIDE: u32 = 160;
}

// ---- Classification ----

/// Defaults for luminosity/color classification (pixel values on a 0..=255 scale).
pub struct ClassifyConsts;

impl ClassifyConsts {
    /// Pixels at or below this luminance count as dark.
    pub const LUMINANCE_THRESHOLD: u8 = 60;
    /// Fraction of dark pixels at or above which an image is dark.
    pub const DARK_PIXEL_RATIO: f64 = 0.9;
    /// Channel spread above which a pixel counts as colored.
    pub const COLOR_TOLERANCE: u8 = 40;
    /// Fraction of colored pixels above which an image is a color image.
    pub const COLOR_PIXEL_RATIO: f64 = 0.1;
    /// Sample every n-th pixel in both directions.
    pub const SAMPLE_STRIDE: u32 = 4;
}

// ---- Media types ----

/// Lower-case extensions treated as still images.
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "tif", "tiff", "gif", "webp"];

/// Lower-case extensions treated as video containers.
pub const VIDEO_EXTENSIONS: &[&str] = &["avi", "mp4", "mov", "m4v", "wmv", "mkv", "asf", "3gp"];
