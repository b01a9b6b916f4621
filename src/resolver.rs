//! Locating the map file requested by the caller.

use std::path::{Component, Path, PathBuf};

use tracing::debug;

use crate::{resource_manager::ResourceManager, Error, Result};

/// Where the main document of a load lives.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct ResolvedDocument {
    /// Directory the map file is in. Relative references of the map start here.
    pub base_dir: PathBuf,
    /// Absolute, normalized location of the map file.
    pub url: PathBuf,
}

/// Find the map file `filename`.
///
/// An existing absolute path is used as is. Otherwise the file is searched
/// relative to `search_dir` (if that is an existing directory) or relative to
/// the resource root joined with `search_dir`. Filenames without extension
/// are assumed to be `.tmx` files.
pub fn resolve_document(resources: &ResourceManager, filename: &str, search_dir: Option<&Path>) -> Result<ResolvedDocument> {
    let mut requested = PathBuf::from(filename);
    if requested.extension().is_none() {
        requested.set_extension("tmx");
    }

    if requested.is_absolute() && resources.exists(&requested) {
        return Ok(document_at(&requested));
    }

    let mut base = absolute(resources.root());
    if let Some(dir) = search_dir {
        if resources.is_dir(dir) {
            base = absolute(dir);
        } else {
            base = normalize(&base.join(dir));
        }
    }

    let candidate = normalize(&base.join(&requested));
    if resources.exists(&candidate) {
        debug!(url = %candidate.display(), "resolved map");
        Ok(document_at(&candidate))
    } else {
        Err(Error::MissingResource(candidate))
    }
}

fn document_at(url: &Path) -> ResolvedDocument {
    let url = normalize(url);
    let base_dir = url.parent().map(Path::to_path_buf).unwrap_or_default();
    ResolvedDocument { base_dir, url }
}

/// Resolve `reference` relative to the directory of the file that mentions it.
pub(crate) fn resolve_reference(base_dir: &Path, reference: &str) -> PathBuf {
    normalize(&base_dir.join(reference))
}

fn absolute(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return normalize(path);
    }
    match std::env::current_dir() {
        Ok(cwd) => normalize(&cwd.join(path)),
        Err(_) => normalize(path),
    }
}

/// Remove `.` and `..` components without touching the file system.
pub(crate) fn normalize(path: &Path) -> PathBuf {
    let mut result = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                let last_is_normal = matches!(result.components().next_back(), Some(Component::Normal(_)));
                if last_is_normal {
                    result.pop();
                } else if !result.has_root() {
                    result.push("..");
                }
            }
            other => result.push(other.as_os_str()),
        }
    }
    result
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::resource_manager::{LazyLoader, Provider};
    use std::collections::HashSet;

    struct Listing {
        files: HashSet<PathBuf>,
        dirs: HashSet<PathBuf>,
    }

    impl Provider for Listing {
        fn exists(&self, path: &Path) -> bool {
            self.files.contains(path) || self.dirs.contains(path)
        }
        fn is_dir(&self, path: &Path) -> bool {
            self.dirs.contains(path)
        }
        fn read(&mut self, path: &Path) -> Result<Vec<u8>> {
            Err(Error::MissingResource(path.to_path_buf()))
        }
    }

    fn resources() -> ResourceManager {
        let listing = Listing {
            files: ["/game/maps/level1.tmx", "/game/assets/dungeon/level2.tmx"]
                .iter().map(PathBuf::from).collect(),
            dirs: ["/game/maps", "/game/assets", "/game/assets/dungeon"]
                .iter().map(PathBuf::from).collect(),
        };
        let mut rm = ResourceManager::new(LazyLoader{}, listing);
        rm.set_root("/game/assets");
        rm
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize(Path::new("/a/b/../c/./d.tsx")), PathBuf::from("/a/c/d.tsx"));
        assert_eq!(normalize(Path::new("a/../../b")), PathBuf::from("../b"));
        assert_eq!(normalize(Path::new("/../x")), PathBuf::from("/x"));
    }

    #[test]
    fn test_absolute_path() -> Result<()> {
        let doc = resolve_document(&resources(), "/game/maps/level1.tmx", None)?;
        assert_eq!(doc.url, PathBuf::from("/game/maps/level1.tmx"));
        assert_eq!(doc.base_dir, PathBuf::from("/game/maps"));
        Ok(())
    }

    #[test]
    fn test_search_directory() -> Result<()> {
        let doc = resolve_document(&resources(), "level1", Some(Path::new("/game/maps")))?;
        assert_eq!(doc.url, PathBuf::from("/game/maps/level1.tmx"));
        Ok(())
    }

    #[test]
    fn test_search_fragment_relative_to_root() -> Result<()> {
        let doc = resolve_document(&resources(), "level2.tmx", Some(Path::new("dungeon")))?;
        assert_eq!(doc.url, PathBuf::from("/game/assets/dungeon/level2.tmx"));
        assert_eq!(doc.base_dir, PathBuf::from("/game/assets/dungeon"));
        Ok(())
    }

    #[test]
    fn test_relative_path_with_directories() -> Result<()> {
        let doc = resolve_document(&resources(), "dungeon/level2.tmx", None)?;
        assert_eq!(doc.base_dir, PathBuf::from("/game/assets/dungeon"));
        Ok(())
    }

    #[test]
    fn test_missing_map() {
        let err = resolve_document(&resources(), "level3.tmx", None).unwrap_err();
        assert!(matches!(err, Error::MissingResource(p) if p == Path::new("/game/assets/level3.tmx")));
    }
}
