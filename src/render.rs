//! Assigning the decoded tile ids to their layers once all files are read.
//!
//! Every layer is handled by its own task on a rayon thread pool.
//! Layer callbacks are delivered from a single thread, so the delegate never
//! sees two of them at the same time.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Sender};
use std::sync::{Condvar, Mutex, PoisonError};

use tracing::{debug, warn};

use crate::{
    builder::{LayerTileBuffer, TileDataKey, TilesetRegistry},
    delegate::TilemapDelegate,
    layer::{Layer, LayerIndex, LayerKind, Tile},
    map::{Map, TileResolver},
};

/// Counts down the outstanding tasks of a render pass.
///
/// Tasks call [arrive](CompletionBarrier::arrive) when done, in any order and from any thread.
/// [wait](CompletionBarrier::wait) blocks until the count reaches zero.
/// Inside the loader the rayon scope already joins the layer tasks, the barrier
/// then guards the one time teardown of the parse caches.
#[derive(Debug)]
pub struct CompletionBarrier {
    remaining: Mutex<usize>,
    done: Condvar,
    finalized: AtomicBool,
}

impl CompletionBarrier {
    pub fn new(tasks: usize) -> Self {
        Self {
            remaining: Mutex::new(tasks),
            done: Condvar::new(),
            finalized: AtomicBool::new(false),
        }
    }

    /// Mark one task as finished. Returns true for the last one.
    pub fn arrive(&self) -> bool {
        let mut remaining = self.remaining.lock().unwrap_or_else(PoisonError::into_inner);
        *remaining = remaining.saturating_sub(1);
        let last = *remaining == 0;
        if last {
            self.done.notify_all();
        }
        last
    }

    pub fn remaining(&self) -> usize {
        *self.remaining.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Block until every task has arrived.
    pub fn wait(&self) {
        let remaining = self.remaining.lock().unwrap_or_else(PoisonError::into_inner);
        let _done = self.done
            .wait_while(remaining, |remaining| *remaining > 0)
            .unwrap_or_else(PoisonError::into_inner);
    }

    /// Run `finalize` if no one did before. Returns whether it ran.
    pub fn finalize_once(&self, finalize: impl FnOnce()) -> bool {
        if self.finalized.swap(true, Ordering::AcqRel) {
            return false;
        }
        finalize();
        true
    }
}

/// Shared, read only state of a render pass.
struct RenderContext<'a> {
    resolver: TileResolver<'a>,
    buffer: &'a LayerTileBuffer,
    barrier: &'a CompletionBarrier,
}

fn resolve_cells(ids: &[u32], resolver: TileResolver, layer: LayerIndex) -> Vec<Option<Tile>> {
    ids.iter()
        .map(|&raw| match resolver.resolve(raw) {
            Ok(tile) => tile,
            Err(id) => {
                warn!(layer, gid = id, "tile id is not covered by any tileset");
                None
            }
        })
        .collect()
}

fn render_layer(layer: &mut Layer, ctx: &RenderContext) {
    let index = layer.index;
    match &mut layer.kind {
        LayerKind::Tile(tiles) => {
            if let Some(ids) = ctx.buffer.get(TileDataKey{ layer: index, chunk: None }) {
                let expected = tiles.cell_count();
                if ids.len() != expected {
                    warn!(layer = index, expected, found = ids.len(), "tile data does not match the layer size");
                }
                tiles.tiles = resolve_cells(ids, ctx.resolver, index);
            }
            for (i, chunk) in tiles.chunks.iter_mut().enumerate() {
                if let Some(ids) = ctx.buffer.get(TileDataKey{ layer: index, chunk: Some(i) }) {
                    chunk.tiles = resolve_cells(ids, ctx.resolver, index);
                }
            }
        }
        LayerKind::Object(objects) => {
            for object in &mut objects.objects {
                let Some(gid) = object.tile_id else { continue };
                object.tile = match ctx.resolver.resolve(gid.as_raw()) {
                    Ok(tile) => tile,
                    Err(id) => {
                        warn!(layer = index, object = object.id, gid = id, "tile object uses an unknown tile");
                        None
                    }
                };
            }
        }
        LayerKind::Group(_) | LayerKind::Image(_) => {}
    }
}

fn spawn_layers<'scope>(
    scope: &rayon::Scope<'scope>,
    layers: &'scope mut [Layer],
    ctx: &'scope RenderContext<'scope>,
    rendered: Sender<&'scope Layer>,
) {
    for layer in layers {
        let rendered = rendered.clone();
        scope.spawn(move |_| {
            render_layer(layer, ctx);
            let layer: &Layer = layer;
            // receiver outlives all tasks
            rendered.send(layer).ok();
            ctx.barrier.arrive();
        });
    }
}

/// Resolve the tile data of all layers and fire the render callbacks.
///
/// Runs on `pool` if given, on the global rayon pool otherwise.
/// Returns after [on_document_rendered](TilemapDelegate::on_document_rendered) was called,
/// the parse caches are empty by then.
pub(crate) fn render_document(
    map: &mut Map,
    buffer: &mut LayerTileBuffer,
    registry: &mut TilesetRegistry,
    pool: Option<&rayon::ThreadPool>,
    delegate: &dyn TilemapDelegate,
) {
    let barrier = CompletionBarrier::new(map.layers.len());
    debug!(layers = map.layers.len(), "rendering layers");

    {
        let Map{ layers, tilesets, tileset_refs, .. } = &mut *map;
        let ctx = RenderContext {
            resolver: TileResolver::new(tilesets, tileset_refs),
            buffer,
            barrier: &barrier,
        };

        std::thread::scope(|threads| {
            let (tx, rx) = mpsc::channel::<&Layer>();
            threads.spawn(move || {
                for layer in rx {
                    delegate.on_layer_rendered(layer);
                }
            });

            match pool {
                Some(pool) => pool.scope(|s| spawn_layers(s, layers, &ctx, tx)),
                None => rayon::scope(|s| spawn_layers(s, layers, &ctx, tx)),
            }
        });
    }

    // Both scopes above join all of their tasks before returning, so by now every
    // layer has arrived and this wait only confirms the count reached zero.
    barrier.wait();
    barrier.finalize_once(|| {
        buffer.clear();
        registry.clear();
        debug!(url = %map.url.display(), "document rendered");
        delegate.on_document_rendered(map);
    });
}
