//! Model artifact validation
//!
//! Checks a GGUF file on disk before handing it to the native loader, so a
//! missing or corrupt artifact fails fast with a readable error.

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use thiserror::Error;

/// Magic number at the start of every GGUF file ("GGUF" read as little-endian u32)
pub const GGUF_MAGIC: u32 = 0x4655_4747;

/// GGUF container versions the loader understands
const SUPPORTED_VERSIONS: [u32; 2] = [2, 3];

/// Size of the fixed GGUF header: magic, version, tensor count, kv count
const HEADER_LEN: usize = 4 + 4 + 8 + 8;

/// Errors raised while validating a model artifact
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Model file not found: {0}")]
    NotFound(String),

    #[error("Model path is not a file: {0}")]
    NotAFile(String),

    #[error("File is too small to be a GGUF model ({0} bytes)")]
    Truncated(usize),

    #[error("Invalid GGUF magic: {0:#010x}")]
    InvalidMagic(u32),

    #[error("Unsupported GGUF version: {0}")]
    UnsupportedVersion(u32),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Header fields read from a GGUF file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GgufMetadata {
    pub version: u32,
    pub tensor_count: u64,
    pub metadata_kv_count: u64,
    pub file_size: u64,
}

/// Validates that `path` points at a readable GGUF file and returns its header
pub fn validate_gguf<P: AsRef<Path>>(path: P) -> Result<GgufMetadata, ModelError> {
    let path = path.as_ref();
    let display = path.display().to_string();

    if !path.exists() {
        return Err(ModelError::NotFound(display));
    }
    if !path.is_file() {
        return Err(ModelError::NotAFile(display));
    }

    let mut file = File::open(path)?;
    let file_size = file.metadata()?.len();

    let mut header = Vec::with_capacity(HEADER_LEN);
    file.by_ref()
        .take(HEADER_LEN as u64)
        .read_to_end(&mut header)?;
    if header.len() < HEADER_LEN {
        return Err(ModelError::Truncated(header.len()));
    }

    let magic = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
    if magic != GGUF_MAGIC {
        return Err(ModelError::InvalidMagic(magic));
    }

    let version = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);
    if !SUPPORTED_VERSIONS.contains(&version) {
        return Err(ModelError::UnsupportedVersion(version));
    }

    let mut count = [0u8; 8];
    count.copy_from_slice(&header[8..16]);
    let tensor_count = u64::from_le_bytes(count);
    count.copy_from_slice(&header[16..24]);
    let metadata_kv_count = u64::from_le_bytes(count);

    Ok(GgufMetadata {
        version,
        tensor_count,
        metadata_kv_count,
        file_size,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_header(file: &mut File, magic: u32, version: u32) {
        file.write_all(&magic.to_le_bytes()).unwrap();
        file.write_all(&version.to_le_bytes()).unwrap();
        file.write_all(&7u64.to_le_bytes()).unwrap();
        file.write_all(&3u64.to_le_bytes()).unwrap();
    }

    #[test]
    fn test_valid_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.gguf");
        let mut file = File::create(&path).unwrap();
        write_header(&mut file, GGUF_MAGIC, 3);
        drop(file);

        let meta = validate_gguf(&path).unwrap();
        assert_eq!(meta.version, 3);
        assert_eq!(meta.tensor_count, 7);
        assert_eq!(meta.metadata_kv_count, 3);
        assert_eq!(meta.file_size, HEADER_LEN as u64);
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = validate_gguf(dir.path().join("absent.gguf")).unwrap_err();
        assert!(matches!(err, ModelError::NotFound(_)));
    }

    #[test]
    fn test_directory_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let err = validate_gguf(dir.path()).unwrap_err();
        assert!(matches!(err, ModelError::NotAFile(_)));
    }

    #[test]
    fn test_bad_magic() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.rkllm");
        let mut file = File::create(&path).unwrap();
        write_header(&mut file, 0xDEAD_BEEF, 3);
        drop(file);

        let err = validate_gguf(&path).unwrap_err();
        assert!(matches!(err, ModelError::InvalidMagic(0xDEAD_BEEF)));
    }

    #[test]
    fn test_unsupported_version() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("old.gguf");
        let mut file = File::create(&path).unwrap();
        write_header(&mut file, GGUF_MAGIC, 1);
        drop(file);

        let err = validate_gguf(&path).unwrap_err();
        assert!(matches!(err, ModelError::UnsupportedVersion(1)));
    }

    #[test]
    fn test_truncated_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("short.gguf");
        std::fs::write(&path, b"GGUF").unwrap();

        let err = validate_gguf(&path).unwrap_err();
        assert!(matches!(err, ModelError::Truncated(4)));
    }
}
