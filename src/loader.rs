//! Loading a map together with all the files it references.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::{
    builder::DocumentBuilder,
    delegate::TilemapDelegate,
    layer::LayerKind,
    map::Map,
    render::render_document,
    resolver::resolve_document,
    resource_manager::ResourceManager,
    worklist::{DocumentKind, DocumentReference, Worklist},
    Result,
};

/// Settings of a [Loader].
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Overrides the root of the [ResourceManager] used to look up maps.
    pub asset_root: Option<PathBuf>,
    /// Do not attach custom properties to the loaded nodes.
    pub ignore_properties: bool,
    /// Pool that resolves the layer data, the global rayon pool if None.
    pub thread_pool: Option<Arc<rayon::ThreadPool>>,
}

impl LoadOptions {
    pub fn asset_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.asset_root = Some(root.into());
        self
    }

    pub fn ignore_properties(mut self, ignore: bool) -> Self {
        self.ignore_properties = ignore;
        self
    }

    pub fn thread_pool(mut self, pool: Arc<rayon::ThreadPool>) -> Self {
        self.thread_pool = Some(pool);
        self
    }
}

/// Loads maps, their external tilesets and object templates.
///
/// ```no_run
/// use tessera::{Loader, LoadOptions, NoDelegate};
///
/// let mut loader = Loader::new(LoadOptions::default().asset_root("assets"));
/// let map = loader.load("dungeon", Some("maps".as_ref()), &NoDelegate)?;
/// println!("{} layers", map.layers.len());
/// # Ok::<(),tessera::Error>(())
/// ```
#[derive(Default)]
pub struct Loader {
    options: LoadOptions,
    resources: ResourceManager,
}

impl Loader {
    pub fn new(options: LoadOptions) -> Self {
        Self { options, resources: ResourceManager::default() }
    }

    /// Use `resources` to access files and images instead of the file system.
    pub fn with_resources(mut self, resources: ResourceManager) -> Self {
        self.resources = resources;
        self
    }

    pub fn options(&self) -> &LoadOptions {
        &self.options
    }

    pub fn resources(&mut self) -> &mut ResourceManager {
        &mut self.resources
    }

    /// Load the map `filename`, see [resolve_document] for how the file is found.
    ///
    /// Referenced tilesets and templates are read in the order they are found.
    /// Errors inside a single file only skip the rest of that file,
    /// a missing file, an IO error or an unusable `map` element fail the whole load.
    pub fn load(&mut self, filename: &str, search_dir: Option<&Path>, delegate: &dyn TilemapDelegate) -> Result<Map> {
        if let Some(root) = &self.options.asset_root {
            self.resources.set_root(root.clone());
        }
        let document = resolve_document(&self.resources, filename, search_dir)?;
        info!(url = %document.url.display(), base_dir = %document.base_dir.display(), "loading map");

        let mut worklist = Worklist::new();
        worklist.push(DocumentReference::new(document.url, DocumentKind::Map));

        let mut builder = DocumentBuilder::new(&mut self.resources, delegate, self.options.ignore_properties);
        while let Some(mut reference) = worklist.pop() {
            let text = builder.load_text(&reference.url)?;
            match builder.parse_document(&reference, &text, &mut worklist) {
                Ok(()) => {
                    reference.resolved = true;
                    debug!(url = %reference.url.display(), "document parsed");
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => warn!(url = %reference.url.display(), error = %e, "document aborted"),
            }
            worklist.complete(reference);
        }

        let (mut map, mut buffer, mut registry) = builder.finish()?;
        warn_uninitialized(&map);
        map.documents = worklist.into_completed();
        debug!(documents = map.documents.len(), tilesets = registry.len(), "all documents read");

        delegate.on_document_read(&map);
        render_document(&mut map, &mut buffer, &mut registry, self.options.thread_pool.as_deref(), delegate);

        info!(url = %map.url.display(), layers = map.layers.len(), "map loaded");
        Ok(map)
    }
}

fn warn_uninitialized(map: &Map) {
    let objects = map.layers.iter().filter_map(|l| match &l.kind {
        LayerKind::Object(objects) => Some(&objects.objects),
        _ => None,
    });
    for object in objects.flatten().filter(|o| !o.initialized) {
        let template = object.template.as_deref().unwrap_or(Path::new(""));
        warn!(object = object.id, template = %template.display(), "object template was never applied");
    }
}
