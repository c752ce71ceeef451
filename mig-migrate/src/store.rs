//! In-memory migration sources loaded from disk.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::MigrateOptions;
use crate::error::{MigrateResult, MigrationError};

/// Suffix of files the runner applies.
pub const UP_SUFFIX: &str = ".up.sql";

/// Smallest file the runner considers, the length of a bare `--` comment.
const MIN_CONTENT_LEN: usize = 2;

/// The migration files of one project, keyed by base name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationFs {
    files: BTreeMap<String, String>,
}

impl MigrationFs {
    /// Create an empty file set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a file.
    pub fn insert(&mut self, name: impl Into<String>, contents: impl Into<String>) {
        self.files.insert(name.into(), contents.into());
    }

    /// Add or replace a file, builder style.
    pub fn with_file(mut self, name: impl Into<String>, contents: impl Into<String>) -> Self {
        self.insert(name, contents);
        self
    }

    /// Names of the files to apply, in ascending order.
    ///
    /// Only `*.up.sql` names at the top level qualify, and files shorter than
    /// two bytes are treated as empty and skipped.
    pub fn migrations(&self) -> Vec<String> {
        self.files
            .iter()
            .filter(|(name, contents)| {
                contents.len() >= MIN_CONTENT_LEN && is_up_migration(name)
            })
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Contents of one file.
    pub fn read_file(&self, name: &str) -> MigrateResult<&str> {
        self.files
            .get(name)
            .map(String::as_str)
            .ok_or_else(|| MigrationError::NotFound(name.to_string()))
    }

    /// Number of files, eligible or not.
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Whether no files are loaded.
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

fn is_up_migration(name: &str) -> bool {
    !name.contains('/') && name.len() > UP_SUFFIX.len() && name.ends_with(UP_SUFFIX)
}

/// Loaded migrations for every known project.
///
/// The store is a plain value: load into it, then hand it to a
/// [`Runner`](crate::Runner).
#[derive(Debug, Clone, Default)]
pub struct MigrationStore {
    projects: BTreeMap<String, MigrationFs>,
}

impl MigrationStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load migrations according to `options`.
    ///
    /// A configured `filename` selects single-file mode under
    /// `options.project`; otherwise `options.path` is scanned.
    pub async fn load(&mut self, options: &MigrateOptions) -> MigrateResult<()> {
        match &options.filename {
            Some(filename) => {
                if options.project.is_empty() {
                    return Err(MigrationError::config(
                        "a project name is required when loading a single file",
                    ));
                }
                self.load_file(&options.project, filename).await
            }
            None => self.load_dir(&options.path).await,
        }
    }

    /// Load a single file as the only migration of `project`.
    pub async fn load_file(&mut self, project: &str, path: impl AsRef<Path>) -> MigrateResult<()> {
        let path = path.as_ref();
        let name = base_name(path)?;
        let contents = read_sql(path).await?;
        debug!(project = %project, file = %name, "Loaded migration file");

        self.projects
            .insert(project.to_string(), MigrationFs::new().with_file(name, contents));
        Ok(())
    }

    /// Load every project below `root`.
    ///
    /// Each immediate subdirectory is a project named after the directory.
    /// SQL files directly in `root` form a project named after `root` itself.
    pub async fn load_dir(&mut self, root: impl AsRef<Path>) -> MigrateResult<()> {
        let root = root.as_ref();
        let metadata = tokio::fs::metadata(root)
            .await
            .map_err(|err| MigrationError::config(format!("path: '{}': {err}", root.display())))?;
        if !metadata.is_dir() {
            return Err(MigrationError::config(format!(
                "path is not a directory: '{}'",
                root.display()
            )));
        }

        let mut subdirs = Vec::new();
        let mut entries = tokio::fs::read_dir(root).await?;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                subdirs.push(entry.path());
            }
        }
        subdirs.sort();

        for dir in subdirs {
            let fs = read_sql_files(&dir).await?;
            self.projects.insert(base_name(&dir)?, fs);
        }

        let top_level = read_sql_files(root).await?;
        if !top_level.is_empty() {
            self.projects.insert(base_name(root)?, top_level);
        }

        debug!(path = %root.display(), projects = self.projects.len(), "Loaded migrations");
        Ok(())
    }

    /// Register an already built file set.
    pub fn insert(&mut self, project: impl Into<String>, fs: MigrationFs) {
        self.projects.insert(project.into(), fs);
    }

    /// Loaded project names, sorted.
    pub fn projects(&self) -> Vec<String> {
        self.projects.keys().cloned().collect()
    }

    /// File set of one project.
    pub fn get(&self, project: &str) -> MigrateResult<&MigrationFs> {
        self.projects
            .get(project)
            .ok_or_else(|| MigrationError::UnknownProject(project.to_string()))
    }
}

/// Read the `*.sql` files directly inside `dir`.
async fn read_sql_files(dir: &Path) -> MigrateResult<MigrationFs> {
    let mut paths: Vec<PathBuf> = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let is_sql = path.extension().is_some_and(|ext| ext == "sql");
        if is_sql && entry.file_type().await?.is_file() {
            paths.push(path);
        }
    }

    let mut fs = MigrationFs::new();
    for path in paths {
        let contents = read_sql(&path).await?;
        fs.insert(base_name(&path)?, contents);
    }
    Ok(fs)
}

/// Read one migration file, which must be UTF-8.
async fn read_sql(path: &Path) -> MigrateResult<String> {
    let bytes = tokio::fs::read(path).await?;
    String::from_utf8(bytes).map_err(|err| {
        MigrationError::config(format!(
            "migration file is not valid UTF-8: '{}': {}",
            path.display(),
            err.utf8_error()
        ))
    })
}

fn base_name(path: &Path) -> MigrateResult<String> {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| MigrationError::config(format!("path has no file name: '{}'", path.display())))
}
