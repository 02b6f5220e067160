//! Where OLX files are read from and written to.
//!
//! Paths are `/`-separated and relative to the course root.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::{fs, io};

use olx_core::BackcompatRule;
use tracing::debug;

use crate::error::{Error, Result};

/// A tree of text files.
pub trait ResourceFs: Send + Sync {
    fn exists(&self, path: &str) -> bool;

    /// Read a whole file. Fails with `ResourceNotFound` if it is missing.
    fn read(&self, path: &str) -> Result<String>;

    /// Create or replace a file, creating parent directories as needed.
    fn write(&mut self, path: &str, contents: &str) -> Result<()>;

    /// Every file path, sorted.
    fn list(&self) -> Result<Vec<String>>;
}

impl<T: ResourceFs + ?Sized> ResourceFs for &mut T {
    fn exists(&self, path: &str) -> bool {
        (**self).exists(path)
    }

    fn read(&self, path: &str) -> Result<String> {
        (**self).read(path)
    }

    fn write(&mut self, path: &str, contents: &str) -> Result<()> {
        (**self).write(path, contents)
    }

    fn list(&self) -> Result<Vec<String>> {
        (**self).list()
    }
}

impl<T: ResourceFs + ?Sized> ResourceFs for Box<T> {
    fn exists(&self, path: &str) -> bool {
        self.as_ref().exists(path)
    }

    fn read(&self, path: &str) -> Result<String> {
        self.as_ref().read(path)
    }

    fn write(&mut self, path: &str, contents: &str) -> Result<()> {
        self.as_mut().write(path, contents)
    }

    fn list(&self) -> Result<Vec<String>> {
        self.as_ref().list()
    }
}

/// Files held in memory.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct InMemoryFs {
    files: BTreeMap<String, String>,
}

impl InMemoryFs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a filesystem with initial files.
    pub fn with_files<K, V>(files: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        InMemoryFs {
            files: files
                .into_iter()
                .map(|(path, contents)| (path.into(), contents.into()))
                .collect(),
        }
    }

    pub fn files(&self) -> &BTreeMap<String, String> {
        &self.files
    }
}

impl ResourceFs for InMemoryFs {
    fn exists(&self, path: &str) -> bool {
        self.files.contains_key(path)
    }

    fn read(&self, path: &str) -> Result<String> {
        self.files
            .get(path)
            .cloned()
            .ok_or_else(|| Error::ResourceNotFound {
                path: path.to_string(),
            })
    }

    fn write(&mut self, path: &str, contents: &str) -> Result<()> {
        self.files.insert(path.to_string(), contents.to_string());
        Ok(())
    }

    fn list(&self) -> Result<Vec<String>> {
        Ok(self.files.keys().cloned().collect())
    }
}

/// Files under a directory on local disk.
pub struct LocalDiskFs {
    root: PathBuf,
}

impl LocalDiskFs {
    /// Open a course directory. The directory must exist.
    pub fn new(root: impl Into<PathBuf>) -> Result<LocalDiskFs> {
        let root = root.into();
        let attr = fs::metadata(&root).map_err(|source| Error::Io {
            path: root.clone(),
            source,
        })?;
        if !attr.is_dir() {
            return Err(Error::Io {
                path: root,
                source: io::Error::other("course root must be a directory"),
            });
        }
        Ok(LocalDiskFs { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `None` for paths that would leave the root.
    fn file_path(&self, path: &str) -> Option<PathBuf> {
        let mut file_path = self.root.clone();
        for part in path.split('/').filter(|part| !part.is_empty()) {
            if part == "." || part == ".." || part.contains('\\') || Path::new(part).is_absolute() {
                return None;
            }
            file_path.push(part);
        }
        Some(file_path)
    }

    fn checked_path(&self, path: &str) -> Result<PathBuf> {
        self.file_path(path).ok_or_else(|| Error::InvalidPath {
            path: path.to_string(),
        })
    }
}

impl ResourceFs for LocalDiskFs {
    fn exists(&self, path: &str) -> bool {
        self.file_path(path).is_some_and(|file_path| file_path.is_file())
    }

    fn read(&self, path: &str) -> Result<String> {
        let file_path = self.checked_path(path)?;
        debug!("Reading {}...", file_path.display());
        fs::read_to_string(&file_path).map_err(|source| match source.kind() {
            io::ErrorKind::NotFound => Error::ResourceNotFound {
                path: path.to_string(),
            },
            _ => Error::Io {
                path: file_path,
                source,
            },
        })
    }

    fn write(&mut self, path: &str, contents: &str) -> Result<()> {
        let file_path = self.checked_path(path)?;
        debug!("Writing {}...", file_path.display());
        if let Some(parent) = file_path.parent() {
            fs::create_dir_all(parent).map_err(|source| Error::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        fs::write(&file_path, contents).map_err(|source| Error::Io {
            path: file_path,
            source,
        })
    }

    fn list(&self) -> Result<Vec<String>> {
        let mut paths = Vec::new();
        for entry in walkdir::WalkDir::new(&self.root).sort_by_file_name() {
            let entry = entry.map_err(|e| Error::Io {
                path: self.root.clone(),
                source: io::Error::other(e.to_string()),
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            if let Ok(relative) = entry.path().strip_prefix(&self.root) {
                let parts: Vec<_> = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy().into_owned())
                    .collect();
                paths.push(parts.join("/"));
            }
        }
        paths.sort();
        Ok(paths)
    }
}

/// The file a definition lives in: `{category}/{url_name}.{ext}`, with `:`
/// in the url name mapped to a directory separator.
pub fn definition_path(category: &str, url_name: &str, extension: &str) -> String {
    format!("{}/{}.{}", category, url_name.replace(':', "/"), extension)
}

/// Every path a definition may be found at, primary first.
pub fn candidate_paths(primary: &str, rules: &[BackcompatRule]) -> Vec<String> {
    let mut candidates = vec![primary.to_string()];
    for rule in rules {
        let mut added = Vec::new();
        match rule {
            BackcompatRule::RenameSuffix { from, to } => {
                for candidate in &candidates {
                    if let Some(stem) = candidate.strip_suffix(from.as_str()) {
                        added.push(format!("{}{}", stem, to));
                    }
                }
            }
            BackcompatRule::StripLeadingDirectories => {
                for candidate in &candidates {
                    let mut rest = candidate.as_str();
                    while let Some((_, tail)) = rest.split_once('/') {
                        if !tail.contains('/') {
                            break;
                        }
                        added.push(tail.to_string());
                        rest = tail;
                    }
                }
            }
        }
        for path in added {
            if !candidates.contains(&path) {
                candidates.push(path);
            }
        }
    }
    candidates
}

/// The first candidate that exists.
pub fn find_first(fs: &dyn ResourceFs, candidates: &[String]) -> Option<String> {
    let found = candidates.iter().find(|path| fs.exists(path)).cloned();
    if let Some(path) = &found {
        if Some(path) != candidates.first() {
            debug!(path = %path, "definition found at a fallback location");
        }
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use olx_core::SchemaRegistry;

    #[test]
    fn definition_paths() {
        assert_eq!(definition_path("problem", "q1", "xml"), "problem/q1.xml");
        assert_eq!(
            definition_path("html", "week1:intro", "html"),
            "html/week1/intro.html"
        );
    }

    #[test]
    fn no_rules_means_primary_only() {
        assert_eq!(candidate_paths("vertical/u.xml", &[]), vec!["vertical/u.xml"]);
    }

    #[test]
    fn html_candidates() {
        let rules = &SchemaRegistry::builtin().schema("html").unwrap().backcompat;
        assert_eq!(
            candidate_paths("html/week1/intro.html", rules),
            vec![
                "html/week1/intro.html",
                "week1/intro.html",
                "html/week1/intro.xml",
                "week1/intro.xml",
            ]
        );
        assert_eq!(
            candidate_paths("html/intro.html.html", rules),
            vec![
                "html/intro.html.html",
                "html/intro.html",
                "html/intro.html.xml",
                "html/intro.xml",
            ]
        );
    }

    #[test]
    fn find_first_in_order() {
        let fs = InMemoryFs::with_files([("b.xml", "<b/>"), ("c.xml", "<c/>")]);
        let candidates: Vec<String> = ["a.xml", "c.xml", "b.xml"].map(String::from).to_vec();
        assert_eq!(find_first(&fs, &candidates), Some("c.xml".to_string()));
        assert_eq!(find_first(&fs, &["z.xml".to_string()]), None);
    }

    #[test]
    fn in_memory_read_write() {
        let mut fs = InMemoryFs::new();
        assert!(matches!(fs.read("a.xml"), Err(Error::ResourceNotFound { .. })));
        fs.write("a.xml", "<a/>").unwrap();
        assert!(fs.exists("a.xml"));
        assert_eq!(fs.read("a.xml").unwrap(), "<a/>");
        assert_eq!(fs.list().unwrap(), vec!["a.xml"]);
    }

    #[test]
    fn local_disk_read_write_list() {
        let dir = tempfile::tempdir().unwrap();
        let mut fs = LocalDiskFs::new(dir.path()).unwrap();

        fs.write("problem/week1/q1.xml", "<problem/>").unwrap();
        fs.write("course.xml", "<course/>").unwrap();

        assert!(fs.exists("problem/week1/q1.xml"));
        assert!(!fs.exists("problem/week1"));
        assert_eq!(fs.read("course.xml").unwrap(), "<course/>");
        assert!(matches!(
            fs.read("missing.xml"),
            Err(Error::ResourceNotFound { .. })
        ));
        assert_eq!(
            fs.list().unwrap(),
            vec!["course.xml", "problem/week1/q1.xml"]
        );
    }

    #[test]
    fn local_disk_stays_inside_root() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("outside.xml"), "<problem/>").unwrap();
        let root = dir.path().join("course");
        fs::create_dir(&root).unwrap();
        let mut disk = LocalDiskFs::new(&root).unwrap();

        let escaping = definition_path("problem", "..:..:outside", "xml");
        assert_eq!(escaping, "problem/../../outside.xml");
        assert!(!disk.exists(&escaping));
        assert!(!disk.exists("./course.xml"));
        assert!(matches!(disk.read(&escaping), Err(Error::InvalidPath { .. })));
        assert!(matches!(
            disk.write("../written.xml", "<x/>"),
            Err(Error::InvalidPath { .. })
        ));
        assert!(!dir.path().join("written.xml").exists());
    }

    #[test]
    fn local_disk_root_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        assert!(LocalDiskFs::new(dir.path().join("nope")).is_err());
    }
}
