//! Declaration lookup across package and module boundaries.
//!
//! There is no Go toolchain behind the generator, so a type named in some
//! package has to be found on disk by convention. [`Locator::locate`] tries a
//! fixed sequence of [`SearchStep`]s and stops at the first directory that
//! declares the name:
//!
//! 1. the package path taken as a directory under the project root
//! 2. the path mapped through `go.mod` (root module, local replacements, then
//!    the module cache for required modules)
//! 3. the vendored copy under the vendor directory
//! 4. the path with the root module's leading segments dropped
//!
//! Parsed files are cached for the lifetime of the `Locator`, so every file is
//! parsed at most once per run.

use crate::error::{Error, Result};
use crate::parser::{AstParser, ParsedFile};
use crate::scanner::FileScanner;
use log::{debug, warn};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::rc::Rc;

pub use crate::parser::Declaration;

/// One stage of the fallback search, in the order they are tried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SearchStep {
    PackageDir,
    ModuleMapping,
    Vendor,
    LocalPrefix,
}

impl SearchStep {
    pub const ORDER: [SearchStep; 4] = [
        SearchStep::PackageDir,
        SearchStep::ModuleMapping,
        SearchStep::Vendor,
        SearchStep::LocalPrefix,
    ];
}

impl fmt::Display for SearchStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SearchStep::PackageDir => "package directory",
            SearchStep::ModuleMapping => "module mapping",
            SearchStep::Vendor => "vendor",
            SearchStep::LocalPrefix => "local prefix",
        };
        write!(f, "{}", label)
    }
}

/// A successful lookup.
#[derive(Debug, Clone)]
pub struct Located {
    pub declaration: Declaration,
    /// File that declares the name
    pub file: PathBuf,
    /// Step that produced the match
    pub step: SearchStep,
    /// Steps tried, in order, including the winning one
    pub attempted: Vec<SearchStep>,
}

/// A `require` entry of `go.mod`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requirement {
    pub path: String,
    pub version: String,
}

/// On-disk layout of the Go module being processed.
#[derive(Debug, Clone)]
pub struct ProjectLayout {
    /// Directory containing `go.mod`
    pub root: PathBuf,
    /// Root module path from the `module` line
    pub module: Option<String>,
    pub requires: Vec<Requirement>,
    /// `replace` directives that point at local directories
    pub replaces: Vec<(String, PathBuf)>,
    pub vendor_dir: PathBuf,
    pub module_cache: Option<PathBuf>,
}

impl ProjectLayout {
    /// A layout without module information.
    pub fn new(root: PathBuf) -> Self {
        let vendor_dir = root.join("vendor");
        Self {
            root,
            module: None,
            requires: Vec::new(),
            replaces: Vec::new(),
            vendor_dir,
            module_cache: default_module_cache(),
        }
    }

    /// Reads `go.mod` from `root`, if there is one.
    ///
    /// # Errors
    ///
    /// Returns an error if `go.mod` exists but cannot be read.
    pub fn discover(root: &Path) -> Result<Self> {
        let mut layout = Self::new(root.to_path_buf());
        let go_mod = root.join("go.mod");

        if go_mod.is_file() {
            let content = fs::read_to_string(&go_mod)?;
            layout.apply_go_mod(&content);
            debug!(
                "Module {} with {} requirements",
                layout.module.as_deref().unwrap_or("<none>"),
                layout.requires.len()
            );
        } else {
            warn!("No go.mod found in {}", root.display());
        }

        Ok(layout)
    }

    pub fn with_vendor_dir(mut self, vendor_dir: PathBuf) -> Self {
        self.vendor_dir = vendor_dir;
        self
    }

    pub fn with_module_cache(mut self, module_cache: Option<PathBuf>) -> Self {
        self.module_cache = module_cache;
        self
    }

    /// Nearest ancestor of `start` (inclusive) holding a `go.mod`.
    pub fn find_root(start: &Path) -> Option<PathBuf> {
        let start = fs::canonicalize(start).unwrap_or_else(|_| start.to_path_buf());
        start
            .ancestors()
            .find(|dir| dir.join("go.mod").is_file())
            .map(Path::to_path_buf)
    }

    /// Import path of a package directory.
    ///
    /// Directories outside the module fall back to their path relative to the
    /// vendor directory, then to the root, then to the path itself.
    pub fn import_path_for(&self, dir: &Path) -> String {
        let dir = fs::canonicalize(dir).unwrap_or_else(|_| dir.to_path_buf());
        let root = fs::canonicalize(&self.root).unwrap_or_else(|_| self.root.clone());
        let vendor =
            fs::canonicalize(&self.vendor_dir).unwrap_or_else(|_| self.vendor_dir.clone());

        if let Ok(rel) = dir.strip_prefix(&vendor) {
            return slash_path(rel);
        }
        if let Ok(rel) = dir.strip_prefix(&root) {
            let rel = slash_path(rel);
            return match (&self.module, rel.is_empty()) {
                (Some(module), true) => module.clone(),
                (Some(module), false) => format!("{}/{}", module, rel),
                (None, _) => rel,
            };
        }
        slash_path(&dir)
    }

    fn apply_go_mod(&mut self, content: &str) {
        let mut block: Option<&str> = None;

        for line in content.lines() {
            let line = strip_line_comment(line).trim();
            if line.is_empty() {
                continue;
            }

            if let Some(directive) = block {
                if line == ")" {
                    block = None;
                } else {
                    self.apply_directive(directive, line);
                }
                continue;
            }

            let (directive, rest) = match line.split_once(char::is_whitespace) {
                Some((directive, rest)) => (directive, rest.trim()),
                None => (line, ""),
            };
            if rest == "(" {
                block = Some(match directive {
                    "require" => "require",
                    "replace" => "replace",
                    _ => "other",
                });
                continue;
            }
            match directive {
                "module" => self.module = Some(rest.trim_matches('"').to_string()),
                "require" | "replace" => self.apply_directive(directive, rest),
                _ => {}
            }
        }
    }

    fn apply_directive(&mut self, directive: &str, spec: &str) {
        match directive {
            "require" => {
                let mut parts = spec.split_whitespace();
                if let (Some(path), Some(version)) = (parts.next(), parts.next()) {
                    self.requires.push(Requirement {
                        path: path.trim_matches('"').to_string(),
                        version: version.to_string(),
                    });
                }
            }
            "replace" => {
                let Some((old, new)) = spec.split_once("=>") else {
                    return;
                };
                let old = old.split_whitespace().next().unwrap_or_default();
                let new = new.split_whitespace().next().unwrap_or_default();
                // Only local replacements can be followed without downloading
                if new.starts_with("./") || new.starts_with("../") || new.starts_with('/') {
                    self.replaces
                        .push((old.trim_matches('"').to_string(), self.root.join(new)));
                }
            }
            _ => {}
        }
    }

    fn package_dir(&self, package: &str) -> Option<PathBuf> {
        let path = Path::new(package);
        if path.is_absolute() {
            Some(path.to_path_buf())
        } else {
            Some(join_relative(&self.root, package))
        }
    }

    fn module_dir(&self, package: &str) -> Option<PathBuf> {
        if let Some(module) = &self.module {
            if let Some(rest) = strip_module(package, module) {
                return Some(join_relative(&self.root, rest));
            }
        }

        if let Some((module, dir)) = self
            .replaces
            .iter()
            .filter(|(module, _)| strip_module(package, module).is_some())
            .max_by_key(|(module, _)| module.len())
        {
            let rest = strip_module(package, module)?;
            return Some(join_relative(dir, rest));
        }

        let requirement = self
            .requires
            .iter()
            .filter(|r| strip_module(package, &r.path).is_some())
            .max_by_key(|r| r.path.len())?;
        let cache = self.module_cache.as_ref()?;
        let rest = strip_module(package, &requirement.path)?;
        let module_root = cache.join(format!(
            "{}@{}",
            escape_module_path(&requirement.path),
            requirement.version
        ));
        Some(join_relative(&module_root, rest))
    }

    fn vendor_package_dir(&self, package: &str) -> Option<PathBuf> {
        Some(join_relative(&self.vendor_dir, package))
    }

    fn local_prefix_dir(&self, package: &str) -> Option<PathBuf> {
        let module = self.module.as_ref()?;
        let skip = module.split('/').filter(|s| !s.is_empty()).count();
        let segments: Vec<&str> = package.split('/').filter(|s| !s.is_empty()).collect();
        if segments.len() <= skip {
            return None;
        }
        Some(join_relative(&self.root, &segments[skip..].join("/")))
    }

    /// Directory a step maps `package` to, if the step applies at all.
    pub fn candidate_dir(&self, step: SearchStep, package: &str) -> Option<PathBuf> {
        match step {
            SearchStep::PackageDir => self.package_dir(package),
            SearchStep::ModuleMapping => self.module_dir(package),
            SearchStep::Vendor => self.vendor_package_dir(package),
            SearchStep::LocalPrefix => self.local_prefix_dir(package),
        }
    }
}

/// Finds declarations on disk and caches parsed files for one run.
pub struct Locator {
    layout: ProjectLayout,
    files: HashMap<PathBuf, Rc<ParsedFile>>,
    packages: HashMap<PathBuf, Vec<PathBuf>>,
}

impl Locator {
    pub fn new(layout: ProjectLayout) -> Self {
        Self {
            layout,
            files: HashMap::new(),
            packages: HashMap::new(),
        }
    }

    pub fn layout(&self) -> &ProjectLayout {
        &self.layout
    }

    /// Number of distinct files parsed so far.
    pub fn parsed_file_count(&self) -> usize {
        self.files.len()
    }

    /// Looks up `name` starting from `package`.
    ///
    /// Returns `Ok(None)` when no step finds the name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::LocateError`] if a file in a searched directory cannot
    /// be read or parsed.
    pub fn locate(&mut self, name: &str, package: &str) -> Result<Option<Located>> {
        debug!("Locating {} in {}", name, package);
        let mut attempted = Vec::new();

        for step in SearchStep::ORDER {
            attempted.push(step);
            let Some(dir) = self.layout.candidate_dir(step, package) else {
                debug!("Step {} does not apply to {}", step, package);
                continue;
            };

            let found = self
                .search_dir(&dir, name)
                .map_err(|err| Error::LocateError {
                    package: package.to_string(),
                    name: name.to_string(),
                    source: Box::new(err),
                })?;

            if let Some((declaration, file)) = found {
                debug!(
                    "Found {} in {} via {} ({})",
                    name,
                    package,
                    step,
                    file.display()
                );
                return Ok(Some(Located {
                    declaration,
                    file,
                    step,
                    attempted,
                }));
            }
        }

        warn!("Declaration {} not found in {}", name, package);
        Ok(None)
    }

    /// Parsed `.go` files of a package directory, in file-name order.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be listed or any file fails to
    /// parse.
    pub fn package_files(&mut self, dir: &Path) -> Result<Vec<Rc<ParsedFile>>> {
        let paths = self.package_paths(dir)?;
        paths.iter().map(|path| self.parsed(path)).collect()
    }

    fn package_paths(&mut self, dir: &Path) -> Result<Vec<PathBuf>> {
        if let Some(paths) = self.packages.get(dir) {
            return Ok(paths.clone());
        }
        let scan = FileScanner::new(dir.to_path_buf()).scan()?;
        for warning in &scan.warnings {
            warn!("{}", warning);
        }
        self.packages.insert(dir.to_path_buf(), scan.go_files.clone());
        Ok(scan.go_files)
    }

    fn parsed(&mut self, path: &Path) -> Result<Rc<ParsedFile>> {
        if let Some(parsed) = self.files.get(path) {
            return Ok(Rc::clone(parsed));
        }
        let parsed = Rc::new(AstParser::parse_file(path)?);
        self.files.insert(path.to_path_buf(), Rc::clone(&parsed));
        Ok(parsed)
    }

    /// Files are parsed in name order until one declares `name`; files after
    /// the match are left unread.
    fn search_dir(&mut self, dir: &Path, name: &str) -> Result<Option<(Declaration, PathBuf)>> {
        if !dir.is_dir() {
            debug!("No directory at {}", dir.display());
            return Ok(None);
        }

        for path in self.package_paths(dir)? {
            let file = self.parsed(&path)?;
            if let Some(declaration) = file.find_declaration(name) {
                return Ok(Some((declaration, path)));
            }
        }
        Ok(None)
    }
}

fn default_module_cache() -> Option<PathBuf> {
    if let Some(cache) = std::env::var_os("GOMODCACHE").filter(|v| !v.is_empty()) {
        return Some(PathBuf::from(cache));
    }
    if let Some(gopath) = std::env::var_os("GOPATH").filter(|v| !v.is_empty()) {
        if let Some(first) = std::env::split_paths(&gopath).next() {
            return Some(first.join("pkg").join("mod"));
        }
    }
    std::env::var_os("HOME").map(|home| PathBuf::from(home).join("go").join("pkg").join("mod"))
}

/// Module cache escaping: every upper-case letter becomes `!` plus its lower case.
fn escape_module_path(path: &str) -> String {
    let mut escaped = String::with_capacity(path.len());
    for c in path.chars() {
        if c.is_ascii_uppercase() {
            escaped.push('!');
            escaped.push(c.to_ascii_lowercase());
        } else {
            escaped.push(c);
        }
    }
    escaped
}

fn strip_module<'a>(package: &'a str, module: &str) -> Option<&'a str> {
    if package == module {
        return Some("");
    }
    package.strip_prefix(module)?.strip_prefix('/')
}

fn join_relative(base: &Path, rel: &str) -> PathBuf {
    rel.split('/')
        .filter(|s| !s.is_empty())
        .fold(base.to_path_buf(), |acc, segment| acc.join(segment))
}

fn strip_line_comment(line: &str) -> &str {
    match line.find("//") {
        Some(pos) => &line[..pos],
        None => line,
    }
}

fn slash_path(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s.to_string_lossy().to_string()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn layout(root: &Path) -> ProjectLayout {
        ProjectLayout::discover(root)
            .unwrap()
            .with_module_cache(Some(root.join("modcache")))
    }

    const GO_MOD: &str = r#"module github.com/acme/app

go 1.21

require (
	github.com/Shopify/sarama v1.38.0 // indirect
	github.com/google/uuid v1.3.0
)

replace github.com/acme/shared => ./shared
"#;

    #[test]
    fn test_discover_reads_go_mod() {
        let temp_dir = TempDir::new().unwrap();
        write(temp_dir.path(), "go.mod", GO_MOD);

        let layout = ProjectLayout::discover(temp_dir.path()).unwrap();

        assert_eq!(layout.module.as_deref(), Some("github.com/acme/app"));
        assert_eq!(
            layout.requires,
            vec![
                Requirement {
                    path: "github.com/Shopify/sarama".to_string(),
                    version: "v1.38.0".to_string(),
                },
                Requirement {
                    path: "github.com/google/uuid".to_string(),
                    version: "v1.3.0".to_string(),
                },
            ]
        );
        assert_eq!(layout.replaces.len(), 1);
        assert_eq!(layout.vendor_dir, temp_dir.path().join("vendor"));
    }

    #[test]
    fn test_candidate_dirs() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        write(root, "go.mod", GO_MOD);
        let layout = layout(root);

        let package = "github.com/acme/app/models";
        assert_eq!(
            layout.candidate_dir(SearchStep::PackageDir, package),
            Some(root.join("github.com/acme/app/models"))
        );
        assert_eq!(
            layout.candidate_dir(SearchStep::ModuleMapping, package),
            Some(root.join("models"))
        );
        assert_eq!(
            layout.candidate_dir(SearchStep::Vendor, package),
            Some(root.join("vendor/github.com/acme/app/models"))
        );
        assert_eq!(
            layout.candidate_dir(SearchStep::LocalPrefix, "example.org/other/pkg/models"),
            Some(root.join("models"))
        );
        assert_eq!(layout.candidate_dir(SearchStep::LocalPrefix, "models"), None);
    }

    #[test]
    fn test_module_mapping_into_cache_and_replacements() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        write(root, "go.mod", GO_MOD);
        let layout = layout(root);

        assert_eq!(
            layout.candidate_dir(SearchStep::ModuleMapping, "github.com/Shopify/sarama/mocks"),
            Some(root.join("modcache/github.com/!shopify/sarama@v1.38.0/mocks"))
        );
        assert_eq!(
            layout.candidate_dir(SearchStep::ModuleMapping, "github.com/acme/shared/errors"),
            Some(root.join("./shared").join("errors"))
        );
        assert_eq!(
            layout.candidate_dir(SearchStep::ModuleMapping, "github.com/unknown/lib"),
            None
        );
    }

    #[test]
    fn test_import_path_for() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        write(root, "go.mod", GO_MOD);
        write(root, "pkg/service/service.go", "package service\n");
        write(root, "vendor/github.com/x/y/y.go", "package y\n");
        let layout = layout(root);

        assert_eq!(layout.import_path_for(root), "github.com/acme/app");
        assert_eq!(
            layout.import_path_for(&root.join("pkg/service")),
            "github.com/acme/app/pkg/service"
        );
        assert_eq!(
            layout.import_path_for(&root.join("vendor/github.com/x/y")),
            "github.com/x/y"
        );
    }

    #[test]
    fn test_find_root_walks_upwards() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        write(root, "go.mod", GO_MOD);
        write(root, "pkg/service/service.go", "package service\n");

        let found = ProjectLayout::find_root(&root.join("pkg/service")).unwrap();
        assert_eq!(found, fs::canonicalize(root).unwrap());
    }

    #[test]
    fn test_escape_module_path() {
        assert_eq!(escape_module_path("github.com/Shopify/Sarama"), "github.com/!shopify/!sarama");
        assert_eq!(escape_module_path("golang.org/x/net"), "golang.org/x/net");
    }

    #[test]
    fn test_locate_in_root_module() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        write(root, "go.mod", GO_MOD);
        write(
            root,
            "models/user.go",
            "package models\n\ntype User struct {\n\tID string `json:\"id\"`\n}\n",
        );

        let mut locator = Locator::new(layout(root));
        let located = locator
            .locate("User", "github.com/acme/app/models")
            .unwrap()
            .unwrap();

        assert_eq!(located.step, SearchStep::ModuleMapping);
        assert_eq!(
            located.attempted,
            vec![SearchStep::PackageDir, SearchStep::ModuleMapping]
        );
        assert_eq!(located.declaration.name(), "User");
        assert!(located.file.ends_with("models/user.go"));
    }

    #[test]
    fn test_locate_vendor_fallback_stops_before_local_prefix() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        write(root, "go.mod", GO_MOD);
        // Same package path under the local prefix would also match
        write(root, "types/other.go", "package types\n\ntype Money struct{}\n");
        write(
            root,
            "vendor/github.com/vendored/lib/types/money.go",
            "package types\n\ntype Money struct {\n\tAmount int64\n}\n",
        );

        let mut locator = Locator::new(layout(root));
        let located = locator
            .locate("Money", "github.com/vendored/lib/types")
            .unwrap()
            .unwrap();

        assert_eq!(located.step, SearchStep::Vendor);
        assert_eq!(
            located.attempted,
            vec![
                SearchStep::PackageDir,
                SearchStep::ModuleMapping,
                SearchStep::Vendor
            ]
        );
        assert!(located.file.starts_with(root.join("vendor")));
    }

    #[test]
    fn test_locate_local_prefix() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        write(root, "go.mod", GO_MOD);
        write(root, "types/money.go", "package types\n\ntype Money struct{}\n");

        let mut locator = Locator::new(layout(root));
        let located = locator
            .locate("Money", "github.com/vendored/lib/types")
            .unwrap()
            .unwrap();

        assert_eq!(located.step, SearchStep::LocalPrefix);
        assert_eq!(located.attempted, SearchStep::ORDER.to_vec());
    }

    #[test]
    fn test_locate_not_found_is_soft() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        write(root, "go.mod", GO_MOD);
        write(root, "models/user.go", "package models\n\ntype User struct{}\n");

        let mut locator = Locator::new(layout(root));
        let located = locator.locate("Missing", "github.com/acme/app/models").unwrap();

        assert!(located.is_none());
    }

    #[test]
    fn test_locate_parse_failure_is_wrapped() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        write(root, "go.mod", GO_MOD);
        write(root, "models/user.go", "package models\n\ntype User struct{}\n");
        write(root, "models/a_broken.go", "package models\n\ntype Broken struct {\n");

        let mut locator = Locator::new(layout(root));
        let err = locator
            .locate("User", "github.com/acme/app/models")
            .unwrap_err();

        match err {
            Error::LocateError {
                package,
                name,
                source,
            } => {
                assert_eq!(package, "github.com/acme/app/models");
                assert_eq!(name, "User");
                assert!(matches!(*source, Error::ParseError { .. }));
            }
            other => panic!("Expected LocateError, got {:?}", other),
        }
    }

    #[test]
    fn test_locate_stops_at_first_match() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        write(root, "go.mod", GO_MOD);
        write(root, "models/a.go", "package models\n\ntype User struct{}\n");
        write(root, "models/z.go", "package models\n\ntype Broken struct {\n");

        let mut locator = Locator::new(layout(root));
        let located = locator
            .locate("User", "github.com/acme/app/models")
            .unwrap()
            .expect("User not found");

        assert!(located.file.ends_with("models/a.go"));
        assert_eq!(locator.parsed_file_count(), 1);

        // A miss has to read the rest of the package
        assert!(locator.locate("Other", "github.com/acme/app/models").is_err());
    }

    #[test]
    fn test_files_are_parsed_once() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        write(root, "go.mod", GO_MOD);
        write(root, "models/a.go", "package models\n\ntype A struct{}\n");
        write(root, "models/b.go", "package models\n\ntype B struct{}\n");

        let mut locator = Locator::new(layout(root));
        locator.locate("A", "github.com/acme/app/models").unwrap();
        locator.locate("B", "github.com/acme/app/models").unwrap();

        assert_eq!(locator.parsed_file_count(), 2);
    }
}
