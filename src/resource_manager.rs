use std::{any::Any, collections::HashMap, io::Read, path::{Path, PathBuf}, sync::Arc};

use tracing::warn;

use crate::{Error, Result};

/// Opaque handle to a loaded image, shared between all tiles that use it.
pub type ImageHandle = Arc<dyn Any + Send + Sync>;

/// Gives access to map files and images.
///
/// Everything the loader reads goes through a resource manager,
/// so maps can be loaded from archives or memory as well as from disk.
pub struct ResourceManager {
    root: PathBuf,
    image_loader: Box<dyn ImageLoader>,
    file_provider: Box<dyn Provider>,
    image_cache: HashMap<PathBuf, ImageHandle>
}

impl ResourceManager {
    /// Create a new resource manager with a given image loader and data provider.
    /// Defaults the resource root to the current directory (`.`).
    pub fn new<L: ImageLoader + 'static, P: Provider + 'static>(image_loader: L, file_provider: P) -> Self {
        Self {
            root: ".".into(),
            image_loader: Box::new(image_loader),
            file_provider: Box::new(file_provider),
            image_cache: HashMap::new(),
        }
    }

    /// Directory used to look up maps that are neither absolute nor found in a search directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn set_root(&mut self, root: impl Into<PathBuf>) {
        self.root = root.into();
    }

    pub fn exists(&self, path: &Path) -> bool {
        self.file_provider.exists(path)
    }

    pub fn is_dir(&self, path: &Path) -> bool {
        self.file_provider.is_dir(path)
    }

    /// Read the text of a map, tileset or template file.
    pub fn load_text(&mut self, path: &Path) -> Result<String> {
        if !self.file_provider.exists(path) {
            return Err(Error::MissingResource(path.to_path_buf()));
        }
        let data = self.file_provider.read(path)?;
        String::from_utf8(data).map_err(|e| Error::ParseError(Box::new(e)))
    }

    /// Register the image at `path`.
    ///
    /// Images are only checked for existence before they are handed to the [ImageLoader].
    /// A missing or unloadable image is logged and yields None.
    pub fn load_image(&mut self, path: &Path) -> Option<ImageHandle> {
        if let Some(handle) = self.image_cache.get(path) {
            return Some(handle.clone());
        }
        if !self.file_provider.exists(path) {
            warn!(path = %path.display(), "image does not exist");
            return None;
        }
        match self.image_loader.load(path) {
            Ok(data) => {
                let handle: ImageHandle = data.into();
                self.image_cache.insert(path.to_path_buf(), handle.clone());
                Some(handle)
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "image could not be loaded");
                None
            }
        }
    }
}

impl Default for ResourceManager {
    fn default() -> Self {
        ResourceManager::new(LazyLoader{},  FileProvider{})
    }
}

pub trait ImageLoader {
    fn load(&mut self, path: &Path) -> Result<Box<dyn Any + Send + Sync>>;
}

/// Trait to provide external data.
pub trait Provider {
    /// Whether a file or directory exists at `path`.
    fn exists(&self, path: &Path) -> bool;

    fn is_dir(&self, path: &Path) -> bool;

    /// Return the contents of the file at `path`.
    fn read(&mut self, path: &Path) -> Result<Vec<u8>>;
}

/// Trivial Image loader implementation that only stores paths for manual loading later.
/// It does not actually load any image data or touches any files.
pub struct LazyLoader {}

impl ImageLoader for LazyLoader {
    fn load(&mut self, path: &Path) -> Result<Box<dyn Any + Send + Sync>> {
        Ok(Box::new(path.to_path_buf()))
    }
}

/// [Provider] that reads the data from files on the file system.
pub struct FileProvider {}

impl Provider for FileProvider {
    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn read(&mut self, path: &Path) -> Result<Vec<u8>> {
        let mut file = std::fs::File::open(path)?;
        let mut content = Vec::new();
        file.read_to_end(&mut content)?;
        Ok(content)
    }
}
