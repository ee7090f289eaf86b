use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

const READ_BUFFER: usize = 64 * 1024;

/// Tier-2 digest: BLAKE3 over the whole file, streamed, hex encoded.
///
/// This is the only hash allowed to decide that two files are identical,
/// and it doubles as the pre-state checksum in the operation log.
pub fn hash_file(file: &Path) -> io::Result<String> {
    let mut reader = BufReader::with_capacity(READ_BUFFER, File::open(file)?);
    let mut hasher = blake3::Hasher::new();
    let mut buffer = vec![0u8; READ_BUFFER];
    loop {
        let n = reader.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }
    Ok(hasher.finalize().to_hex().to_string())
}
