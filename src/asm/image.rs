//! Binary image format.
//!
//! An image is a bare sequence of 16-bit little-endian words: no header,
//! no length prefix. It is loaded into ROM starting at word 0, so it may
//! hold at most [`ROM_SIZE`] words.

use std::path::Path;
use thiserror::Error;
use crate::cpu::bus::ROM_SIZE;

/// Words in one KiB of image.
pub const WORDS_PER_KIB: usize = 1024 * 8 / 16;

/// Pad `words` with NOPs to exactly `size_kib` KiB.
///
/// The padded image must still fit in ROM.
pub fn pad_to_kib(mut words: Vec<u16>, size_kib: u32) -> Result<Vec<u16>, ImageError> {
    let required = size_kib as usize * WORDS_PER_KIB;
    if required > ROM_SIZE {
        return Err(ImageError::TooLarge {
            words: required,
            capacity: ROM_SIZE,
        });
    }
    if required < words.len() {
        return Err(ImageError::TooSmall {
            requested: required,
            program: words.len(),
        });
    }

    words.resize(required, 0x0000);
    Ok(words)
}

/// Serialize words as little-endian bytes.
pub fn to_bytes(words: &[u16]) -> Vec<u8> {
    words.iter().flat_map(|word| word.to_le_bytes()).collect()
}

/// Parse little-endian bytes into words.
pub fn from_bytes(bytes: &[u8]) -> Result<Vec<u16>, ImageError> {
    if bytes.len() % 2 != 0 {
        return Err(ImageError::OddLength(bytes.len()));
    }

    let words: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect();

    if words.len() > ROM_SIZE {
        return Err(ImageError::TooLarge {
            words: words.len(),
            capacity: ROM_SIZE,
        });
    }

    Ok(words)
}

/// Load an image from disk.
pub fn load_image<P: AsRef<Path>>(path: P) -> Result<Vec<u16>, ImageError> {
    let bytes = std::fs::read(path.as_ref())
        .map_err(|e| ImageError::IoError(format!("{}: {}", path.as_ref().display(), e)))?;
    from_bytes(&bytes)
}

/// Save an image to disk.
pub fn save_image<P: AsRef<Path>>(path: P, words: &[u16]) -> Result<(), ImageError> {
    std::fs::write(path.as_ref(), to_bytes(words))
        .map_err(|e| ImageError::IoError(format!("{}: {}", path.as_ref().display(), e)))
}

/// Errors that can occur during image operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ImageError {
    #[error("I/O error: {0}")]
    IoError(String),

    #[error("image has an odd number of bytes ({0})")]
    OddLength(usize),

    #[error("image of {words} words exceeds ROM capacity of {capacity} words")]
    TooLarge { words: usize, capacity: usize },

    #[error("requested image size of {requested} words is smaller than the {program}-word program")]
    TooSmall { requested: usize, program: usize },
}
