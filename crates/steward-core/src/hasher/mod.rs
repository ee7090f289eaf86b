pub mod content;
pub mod xxhash;
