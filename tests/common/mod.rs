#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tessera::{Error, LazyLoader, Layer, Loader, Map, Provider, ResourceManager, Result, TileSet, TilemapDelegate};

/// Files kept in memory, keyed by absolute path.
#[derive(Default, Clone)]
pub struct MemoryProvider {
    files: HashMap<PathBuf, Vec<u8>>,
}

impl MemoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, path: &str, content: impl Into<Vec<u8>>) -> Self {
        self.files.insert(PathBuf::from(path), content.into());
        self
    }
}

impl Provider for MemoryProvider {
    fn exists(&self, path: &Path) -> bool {
        self.files.contains_key(path) || self.is_dir(path)
    }

    fn is_dir(&self, path: &Path) -> bool {
        self.files.keys().any(|f| f != path && f.starts_with(path))
    }

    fn read(&mut self, path: &Path) -> Result<Vec<u8>> {
        self.files.get(path).cloned().ok_or_else(|| Error::MissingResource(path.to_path_buf()))
    }
}

pub fn loader(provider: MemoryProvider) -> Loader {
    Loader::default().with_resources(ResourceManager::new(LazyLoader{}, provider))
}

/// Map element with a 2x2 grid of 16px tiles, without the closing tag.
pub fn map_header(extra: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<map version="1.10" tiledversion="1.10.2" orientation="orthogonal" renderorder="right-down"
     width="2" height="2" tilewidth="16" tileheight="16" {}>"#,
        extra
    )
}

pub const TILES_TSX: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<tileset version="1.10" name="tiles" tilewidth="16" tileheight="16" tilecount="8" columns="4">
 <image source="tiles.png" width="64" height="32"/>
</tileset>"#;

/// Records every delegate call as a short string.
#[derive(Default)]
pub struct Recorder {
    events: Mutex<Vec<String>>,
}

impl Recorder {
    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    fn push(&self, event: String) {
        self.events.lock().unwrap().push(event);
    }
}

impl TilemapDelegate for Recorder {
    fn on_document_parsing_began(&self, _map: &Map) {
        self.push("began".into());
    }

    fn on_document_read(&self, _map: &Map) {
        self.push("read".into());
    }

    fn on_tileset_added(&self, tileset: &TileSet) {
        self.push(format!("tileset:{}", tileset.name));
    }

    fn on_layer_added(&self, layer: &Layer) {
        self.push(format!("added:{}", layer.name));
    }

    fn on_layer_rendered(&self, layer: &Layer) {
        self.push(format!("rendered:{}", layer.name));
    }

    fn on_document_rendered(&self, _map: &Map) {
        self.push("rendered".into());
    }
}
