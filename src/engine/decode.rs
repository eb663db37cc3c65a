//! Probe/decode surface used by the pipeline stages.
//!
//! The decode stage calls [`Decoder::probe`] (and [`Decoder::metadata`] when a job asks for it);
//! the compute stage turns an [`EncodedImage`] into pixels. Pixel decoding is done by the
//! `image` crate, embedded metadata by an external `exiftool` process.

use anyhow::{Context, Result};
use image::{ImageFormat, RgbImage};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::engine::tools::{MediaKind, media_kind};

/// Embedded metadata as `Group:Tag` → value.
pub type MetadataMap = BTreeMap<String, String>;

/// What the compute stage of a job will need from the decode stage.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DecodeNeeds {
    pub pixels: bool,
    pub metadata: bool,
}

/// Encoded image bytes with a sniffed container format.
#[derive(Clone, Debug)]
pub struct EncodedImage {
    pub bytes: Vec<u8>,
    pub format: ImageFormat,
}

impl EncodedImage {
    /// Full pixel decode. Fails for truncated or corrupt data.
    pub fn decode_rgb(&self) -> Result<RgbImage> {
        let img = image::load_from_memory_with_format(&self.bytes, self.format)
            .context("decode image")?;
        Ok(img.to_rgb8())
    }
}

/// Result of the lightweight container probe done by the decode stage.
#[derive(Clone, Debug)]
pub enum Probe {
    /// The file no longer exists.
    Missing,
    /// Video container; no pixel access.
    Video,
    /// File exists but its container could not be read or recognised.
    Corrupt(String),
    /// Image bytes loaded and format recognised.
    Image(EncodedImage),
    /// File exists; pixels were not requested.
    Present,
}

/// Reads embedded metadata from a file.
pub trait MetadataReader: Send + Sync {
    fn read(&self, path: &Path) -> Result<MetadataMap>;
}

/// Probe/decode capability the pipeline needs from a decoding library.
pub trait Decoder: Send + Sync {
    /// Open `path` and do the cheapest container work that satisfies `needs`.
    /// Never fails: unreadable files are reported through [`Probe`].
    fn probe(&self, path: &Path, needs: DecodeNeeds) -> Probe;

    /// Embedded metadata, or `None` when the file has none or it could not be read.
    fn metadata(&self, path: &Path) -> Option<MetadataMap>;
}

/// Decoder backed by the filesystem, the `image` crate, and an optional metadata reader.
#[derive(Default)]
pub struct FsDecoder {
    metadata: Option<Box<dyn MetadataReader>>,
}

impl FsDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_metadata_reader(reader: Box<dyn MetadataReader>) -> Self {
        Self {
            metadata: Some(reader),
        }
    }
}

impl Decoder for FsDecoder {
    fn probe(&self, path: &Path, needs: DecodeNeeds) -> Probe {
        let meta = match std::fs::metadata(path) {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Probe::Missing,
            Err(e) => return Probe::Corrupt(e.to_string()),
        };
        if !meta.is_file() {
            return Probe::Missing;
        }
        if media_kind(path) == MediaKind::Video {
            return Probe::Video;
        }
        if !needs.pixels {
            return Probe::Present;
        }
        let bytes = match std::fs::read(path) {
            Ok(b) => b,
            Err(e) => return Probe::Corrupt(e.to_string()),
        };
        match image::guess_format(&bytes) {
            Ok(format) => Probe::Image(EncodedImage { bytes, format }),
            Err(e) => Probe::Corrupt(e.to_string()),
        }
    }

    fn metadata(&self, path: &Path) -> Option<MetadataMap> {
        let reader = self.metadata.as_ref()?;
        match reader.read(path) {
            Ok(map) if !map.is_empty() => Some(map),
            Ok(_) => None,
            Err(e) => {
                log::debug!("metadata read failed for {}: {:#}", path.display(), e);
                None
            }
        }
    }
}

/// `exiftool -j -G` wrapper.
pub struct ExifTool {
    program: PathBuf,
}

impl Default for ExifTool {
    fn default() -> Self {
        Self {
            program: PathBuf::from("exiftool"),
        }
    }
}

impl ExifTool {
    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// True when the program can be started.
    pub fn is_available(&self) -> bool {
        Command::new(&self.program)
            .arg("-ver")
            .output()
            .is_ok_and(|o| o.status.success())
    }
}

impl MetadataReader for ExifTool {
    fn read(&self, path: &Path) -> Result<MetadataMap> {
        let output = Command::new(&self.program)
            .args(["-j", "-G"])
            .arg(path)
            .output()
            .with_context(|| format!("run {}", self.program.display()))?;
        if !output.status.success() {
            anyhow::bail!(
                "exiftool exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        parse_exiftool_json(&output.stdout)
    }
}

/// Flatten exiftool's JSON array output (first element) into a [`MetadataMap`].
pub fn parse_exiftool_json(stdout: &[u8]) -> Result<MetadataMap> {
    let value: serde_json::Value =
        serde_json::from_slice(stdout).context("parse exiftool JSON")?;
    let mut map = MetadataMap::new();
    let Some(obj) = value
        .as_array()
        .and_then(|a| a.first())
        .and_then(|v| v.as_object())
    else {
        return Ok(map);
    };
    for (key, val) in obj {
        if key == "SourceFile" || key.starts_with("File:") || key.starts_with("ExifTool:") {
            continue;
        }
        let text = match val {
            serde_json::Value::String(s) if !s.is_empty() => s.clone(),
            serde_json::Value::Number(n) => n.to_string(),
            serde_json::Value::Bool(b) => b.to_string(),
            _ => continue,
        };
        map.insert(key.clone(), text);
    }
    Ok(map)
}

/// Look up `tag` in `map`: an exact key first, then the `EXIF:` group, then any `Group:tag`.
pub fn find_tag<'a>(map: &'a MetadataMap, tag: &str) -> Option<&'a str> {
    if let Some(v) = map.get(tag) {
        return Some(v.as_str());
    }
    if let Some(v) = map.get(&format!("EXIF:{}", tag)) {
        return Some(v.as_str());
    }
    let suffix = format!(":{}", tag);
    map.iter()
        .find(|(k, _)| k.ends_with(&suffix))
        .map(|(_, v)| v.as_str())
}
