use crate::error::{Error, Result};
use log::debug;
use std::path::PathBuf;
use walkdir::WalkDir;

/// File scanner for a single Go package directory.
///
/// A Go package is exactly the set of `.go` files directly inside one
/// directory, so the `FileScanner` does not descend into subdirectories. Test
/// files (`_test.go`) are skipped since they never declare service types.
///
/// # Example
///
/// ```no_run
/// use go_service_gen::scanner::FileScanner;
/// use std::path::PathBuf;
///
/// let scanner = FileScanner::new(PathBuf::from("./pkg/service"));
/// let result = scanner.scan().unwrap();
/// println!("Found {} Go files", result.go_files.len());
/// ```
pub struct FileScanner {
    root_path: PathBuf,
}

/// Result of a package scan.
pub struct ScanResult {
    /// Paths of the package's `.go` files, sorted by file name
    pub go_files: Vec<PathBuf>,
    /// Warning messages for entries that could not be read
    pub warnings: Vec<String>,
}

impl FileScanner {
    /// Creates a new `FileScanner` for the specified package directory.
    pub fn new(root_path: PathBuf) -> Self {
        Self { root_path }
    }

    /// Collects the `.go` files of the package.
    ///
    /// Entries that cannot be accessed are recorded as warnings and skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory itself cannot be read.
    pub fn scan(&self) -> Result<ScanResult> {
        let mut go_files = Vec::new();
        let mut warnings = Vec::new();

        if !self.root_path.is_dir() {
            return Err(Error::IoError(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("not a package directory: {}", self.root_path.display()),
            )));
        }

        for entry in WalkDir::new(&self.root_path)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
        {
            match entry {
                Ok(entry) => {
                    let path = entry.path();
                    let file_name = entry.file_name().to_string_lossy();

                    let is_go = path.extension().and_then(|s| s.to_str()) == Some("go");
                    let is_test = file_name.ends_with("_test.go");

                    if path.is_file() && is_go && !is_test {
                        go_files.push(path.to_path_buf());
                    }
                }
                Err(e) => warnings.push(format!("Failed to access path: {}", e)),
            }
        }

        debug!(
            "Found {} Go files in {}",
            go_files.len(),
            self.root_path.display()
        );

        Ok(ScanResult { go_files, warnings })
    }
}
