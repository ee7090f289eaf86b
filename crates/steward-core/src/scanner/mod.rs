pub mod context;
pub mod record;
pub mod walk;

pub use context::{DirectoryContext, DirectoryStats};
pub use record::{FileRecord, FileSource};
pub use walk::WalkSource;
