//! Byte-level artifact handling: checksums and gzip compression

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::Path;

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use sha2::{Digest, Sha256};

use crate::error::{GuardError, GuardResult};

/// Extension of uncompressed artifacts
pub const RAW_EXTENSION: &str = ".sql";
/// Extension of compressed artifacts
pub const COMPRESSED_EXTENSION: &str = ".sql.gz";
/// Suffix of in-progress dump intermediates
pub const PARTIAL_SUFFIX: &str = ".partial";

/// Whether a filename looks like a finished artifact
///
/// Hidden files are restore scratch space, never artifacts.
pub fn is_artifact_name(name: &str) -> bool {
    !name.starts_with('.') && (name.ends_with(RAW_EXTENSION) || name.ends_with(COMPRESSED_EXTENSION))
}

/// SHA-256 of a file's bytes as lowercase hex
pub fn sha256_file(path: &Path) -> GuardResult<String> {
    let file = File::open(path).map_err(|e| {
        GuardError::Io(format!("Failed to open {} for checksum: {}", path.display(), e))
    })?;

    let mut hasher = Sha256::new();
    io::copy(&mut BufReader::new(file), &mut hasher).map_err(|e| {
        GuardError::Io(format!("Failed to read {} for checksum: {}", path.display(), e))
    })?;

    Ok(hex::encode(hasher.finalize()))
}

/// Gzip `source` into `destination`, returning the compressed size
pub fn compress_file(source: &Path, destination: &Path) -> GuardResult<u64> {
    let input = File::open(source)
        .map_err(|e| GuardError::Compression(format!("Failed to open raw dump: {}", e)))?;
    let output = File::create(destination).map_err(|e| {
        GuardError::Compression(format!(
            "Failed to create {}: {}",
            destination.display(),
            e
        ))
    })?;

    let mut encoder = GzEncoder::new(BufWriter::new(output), Compression::default());
    io::copy(&mut BufReader::new(input), &mut encoder)
        .map_err(|e| GuardError::Compression(format!("Failed to compress dump: {}", e)))?;

    let mut writer = encoder
        .finish()
        .map_err(|e| GuardError::Compression(format!("Failed to finish gzip stream: {}", e)))?;
    writer
        .flush()
        .map_err(|e| GuardError::Compression(format!("Failed to flush compressed dump: {}", e)))?;
    writer
        .get_ref()
        .sync_all()
        .map_err(|e| GuardError::Compression(format!("Failed to sync compressed dump: {}", e)))?;

    Ok(fs::metadata(destination)?.len())
}

/// Decompress a gzip artifact into an already-open writer
pub fn decompress_into<W: Write>(source: &Path, destination: &mut W) -> GuardResult<u64> {
    let input = File::open(source)
        .map_err(|e| GuardError::Compression(format!("Failed to open artifact: {}", e)))?;

    let mut decoder = GzDecoder::new(BufReader::new(input));
    let written = io::copy(&mut decoder, destination)
        .map_err(|e| GuardError::Compression(format!("Failed to decompress artifact: {}", e)))?;
    destination
        .flush()
        .map_err(|e| GuardError::Compression(format!("Failed to flush artifact: {}", e)))?;

    Ok(written)
}
