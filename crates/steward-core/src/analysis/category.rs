use serde::{Deserialize, Serialize};
use std::fmt;

/// Coarse file kind, derived from the extension. Drives the Type feature and
/// the destination folder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    Documents,
    Images,
    Audio,
    Video,
    Archives,
    Spreadsheets,
    Presentations,
    Code,
    Executables,
    System,
    Other,
}

impl Category {
    pub fn from_extension(ext: &str) -> Self {
        match ext {
            "pdf" | "doc" | "docx" | "odt" | "rtf" | "txt" | "md" | "epub" | "pages" => {
                Category::Documents
            }
            "jpg" | "jpeg" | "png" | "gif" | "bmp" | "heic" | "webp" | "tif" | "tiff" | "svg"
            | "raw" => Category::Images,
            "mp3" | "wav" | "flac" | "aac" | "ogg" | "m4a" | "opus" => Category::Audio,
            "mp4" | "mov" | "avi" | "mkv" | "webm" | "wmv" | "m4v" => Category::Video,
            "zip" | "tar" | "gz" | "tgz" | "rar" | "7z" | "bz2" | "xz" => Category::Archives,
            "xls" | "xlsx" | "csv" | "ods" | "numbers" => Category::Spreadsheets,
            "ppt" | "pptx" | "odp" | "key" => Category::Presentations,
            "rs" | "py" | "js" | "ts" | "c" | "h" | "cpp" | "java" | "go" | "rb" | "json"
            | "yaml" | "yml" | "toml" | "xml" | "html" | "css" => Category::Code,
            "exe" | "msi" | "dmg" | "pkg" | "deb" | "rpm" | "appimage" | "sh" | "bat" | "cmd"
            | "ps1" | "bin" => Category::Executables,
            "dll" | "so" | "dylib" | "sys" | "ini" | "plist" | "lock" | "db" | "sqlite" | "cfg"
            | "conf" | "lnk" => Category::System,
            _ => Category::Other,
        }
    }

    /// Type feature value. Higher means safer to move without asking.
    pub fn type_score(&self) -> f64 {
        match self {
            Category::Images | Category::Audio => 0.85,
            Category::Documents | Category::Video => 0.8,
            Category::Presentations => 0.75,
            Category::Archives | Category::Spreadsheets => 0.7,
            Category::Other => 0.5,
            Category::Code => 0.35,
            Category::Executables => 0.3,
            Category::System => 0.1,
        }
    }

    pub fn folder_name(&self) -> &'static str {
        match self {
            Category::Documents => "Documents",
            Category::Images => "Images",
            Category::Audio => "Audio",
            Category::Video => "Video",
            Category::Archives => "Archives",
            Category::Spreadsheets => "Spreadsheets",
            Category::Presentations => "Presentations",
            Category::Code => "Code",
            Category::Executables => "Executables",
            Category::System => "System",
            Category::Other => "Other",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.folder_name())
    }
}
