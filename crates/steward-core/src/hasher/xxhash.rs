use std::fs::File;
use std::hash::Hasher as _;
use std::io::{self, Read};
use std::path::Path;
use twox_hash::XxHash64;

pub const SAMPLE_LENGTH: usize = 4096; // 4KB

/// Tier-1 digest: XxHash64 over the first 4KB of the file.
///
/// Only ever used to split size buckets further. Equal sample digests say
/// nothing about equality on their own.
pub fn sample_digest(file: &Path) -> io::Result<u64> {
    let data = read_portion(file)?;
    Ok(hash_data(&data))
}

fn read_portion(file: &Path) -> io::Result<Vec<u8>> {
    let f = File::open(file)?;
    let mut buffer = Vec::with_capacity(SAMPLE_LENGTH);
    f.take(SAMPLE_LENGTH as u64).read_to_end(&mut buffer)?;
    Ok(buffer)
}

pub fn hash_data(data: &[u8]) -> u64 {
    let mut hasher = XxHash64::with_seed(0);
    hasher.write(data);
    hasher.finish()
}
