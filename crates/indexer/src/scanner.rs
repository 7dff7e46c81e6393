use ignore::WalkBuilder;
use repolens_chunker::Document;
use std::path::{Component, Path, PathBuf};

/// Text-like extensions indexed by default
pub const DEFAULT_EXTENSIONS: &[&str] = &["py", "js", "ts", "java", "md", "txt", "html", "css"];

/// Directory names skipped anywhere below the root
pub const DEFAULT_IGNORED_DIRS: &[&str] = &[
    // VCS
    ".git",
    // dependencies / virtualenvs
    "node_modules",
    "venv",
    ".venv",
    "env",
    // caches / builds
    "__pycache__",
    "dist",
    "build",
];

/// Filtering rules for a scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanOptions {
    /// Allowed extensions, with or without a leading dot (case-insensitive)
    pub allowed_extensions: Vec<String>,

    /// Directory names that prune the walk (case-insensitive)
    pub ignored_dirs: Vec<String>,

    /// Also honour `.gitignore` / `.ignore` files
    pub respect_gitignore: bool,

    /// Skip files larger than this many bytes
    pub max_file_bytes: Option<u64>,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            allowed_extensions: DEFAULT_EXTENSIONS.iter().map(ToString::to_string).collect(),
            ignored_dirs: DEFAULT_IGNORED_DIRS.iter().map(ToString::to_string).collect(),
            respect_gitignore: false,
            max_file_bytes: None,
        }
    }
}

/// Documents read from a scan plus the number of eligible files dropped
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadedDocuments {
    pub documents: Vec<Document>,
    pub skipped: usize,
}

/// Scanner for finding readable text files in a repository
pub struct FileScanner {
    root: PathBuf,
    extensions: Vec<String>,
    ignored_dirs: Vec<String>,
    respect_gitignore: bool,
    max_file_bytes: Option<u64>,
}

impl FileScanner {
    pub fn new(root: impl AsRef<Path>, options: &ScanOptions) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            extensions: options
                .allowed_extensions
                .iter()
                .map(|ext| ext.trim().trim_start_matches('.').to_lowercase())
                .filter(|ext| !ext.is_empty())
                .collect(),
            ignored_dirs: options
                .ignored_dirs
                .iter()
                .map(|dir| dir.trim().to_lowercase())
                .collect(),
            respect_gitignore: options.respect_gitignore,
            max_file_bytes: options.max_file_bytes,
        }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Paths of every eligible file, in sorted traversal order
    #[must_use]
    pub fn scan(&self) -> Vec<PathBuf> {
        let mut files = Vec::new();

        let root = self.root.clone();
        let ignored = self.ignored_dirs.clone();
        let mut builder = WalkBuilder::new(&self.root);
        builder
            .standard_filters(false)
            .follow_links(false)
            .git_ignore(self.respect_gitignore)
            .git_exclude(self.respect_gitignore)
            .ignore(self.respect_gitignore)
            .require_git(false)
            .sort_by_file_name(|a, b| a.cmp(b));
        builder.filter_entry(move |entry| !is_ignored_scope(entry.path(), &root, &ignored));

        for result in builder.build() {
            match result {
                Ok(entry) => {
                    let Some(file_type) = entry.file_type() else {
                        continue;
                    };
                    if !file_type.is_file() {
                        continue;
                    }

                    let path = entry.path();
                    if !self.is_allowed_extension(path) {
                        continue;
                    }

                    files.push(path.to_path_buf());
                }
                Err(e) => log::warn!("Failed to read entry: {e}"),
            }
        }

        log::info!("Found {} candidate files", files.len());
        files
    }

    /// Scan and decode every eligible file.
    ///
    /// Unreadable or oversized files are logged and counted in `skipped`;
    /// files that are blank once decoded are dropped silently.
    #[must_use]
    pub fn load_documents(&self) -> LoadedDocuments {
        let mut loaded = LoadedDocuments::default();

        for path in self.scan() {
            if let Some(limit) = self.max_file_bytes {
                if let Ok(meta) = std::fs::metadata(&path) {
                    if meta.len() > limit {
                        log::warn!(
                            "Skipping large file {} ({} bytes > {limit})",
                            path.display(),
                            meta.len()
                        );
                        loaded.skipped += 1;
                        continue;
                    }
                }
            }

            let bytes = match std::fs::read(&path) {
                Ok(bytes) => bytes,
                Err(err) => {
                    log::warn!("Skipping unreadable file {}: {err}", path.display());
                    loaded.skipped += 1;
                    continue;
                }
            };

            let content = String::from_utf8_lossy(&bytes);
            if content.trim().is_empty() {
                log::debug!("Skipping blank file {}", path.display());
                continue;
            }

            loaded.documents.push(Document::new(
                normalize_path(&self.root, &path),
                content.into_owned(),
            ));
        }

        loaded
    }

    fn is_allowed_extension(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| {
                let ext = ext.to_lowercase();
                self.extensions.iter().any(|candidate| candidate == &ext)
            })
    }
}

fn is_ignored_scope(path: &Path, root: &Path, ignored: &[String]) -> bool {
    if let Ok(relative) = path.strip_prefix(root) {
        for component in relative.components() {
            if let Component::Normal(name) = component {
                let lowered = name.to_string_lossy().to_lowercase();
                if ignored.iter().any(|dir| dir == &lowered) {
                    return true;
                }
            }
        }
    }
    false
}

/// Root-relative path with `/` separators
fn normalize_path(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}
