use md5::{Digest, Md5};

use crate::errors::FileError;
use crate::storage::StorageBackend;

/// Default read size when hashing file contents.
pub const DEFAULT_CHUNK_SIZE: usize = 4096;

/// MD5 of a file's contents as lowercase hex, streamed in `chunk_size`
/// pieces so large files never sit in memory.
pub fn md5_hex(
    backend: &dyn StorageBackend,
    path: &str,
    chunk_size: usize,
) -> Result<String, FileError> {
    let mut hasher = Md5::new();
    backend.read_streamed(path, chunk_size, &mut |chunk: &[u8]| hasher.update(chunk))?;
    Ok(format!("{:x}", hasher.finalize()))
}
