use std::path::{Path, PathBuf};

use tessera::*;

fn maps_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/maps")
}

#[test]
fn load_basic_map() -> Result<()> {
    let map = Map::from_file(&maps_dir().join("basic.tmx"))?;

    assert_eq!(map.version, Version(1, 10, None));
    assert_eq!(map.renderorder, Renderorder::LeftUp);
    assert_eq!(map.backgroundcolor, Color::from_argb(255, 0x20, 0x30, 0x40));
    assert_eq!(map.next_object_id, Some(3));
    assert_eq!(map.properties.get("title").and_then(|v| v.as_str()), Some("Basic"));

    let tileset = map.tileset_by_name("tiles").unwrap();
    assert_eq!(tileset.offset, math::ivec2::new(0, 4));
    assert_eq!(tileset.tile_rect(4), Some(math::Rect::new(math::ivec2::new(18, 18), math::ivec2::new(16, 16))));

    let water = &tileset.tiles[&1];
    assert_eq!(water.type_, "water");
    assert_eq!(water.probability, 0.5);
    assert_eq!(water.properties.get("depth"), Some(&PropertyValue::Float(2.5)));
    assert_eq!(water.collision.len(), 1);
    assert_eq!(water.collision[0].size, math::fvec2::new(16., 8.));
    let durations: Vec<_> = water.animation.iter().map(|f| f.duration).collect();
    assert_eq!(durations, vec![100, 150]);
    assert!(water.animation.iter().all(|f| f.rect.is_some()));

    let ground = map.layer_by_name("ground").unwrap();
    assert_eq!(ground.opacity, 0.5);
    let tiles = ground.as_tile_layer().unwrap();
    let first = tiles.tiles_in_renderorder(map.renderorder).next().unwrap();
    assert_eq!(first.0, math::ivec2::new(2, 1));
    assert_eq!(first.1.map(|t| t.local_id), Some(5));
    assert_eq!(tiles.tiles[4], None);

    let spawns = map.layer_by_name("spawns").unwrap().as_object_layer().unwrap();
    assert_eq!(spawns.draworder, DrawOrder::Index);
    assert_eq!(spawns.objects[0].kind, ObjectKind::Point);
    match &spawns.objects[1].kind {
        ObjectKind::Polyline{ points } => assert_eq!(points.len(), 3),
        other => panic!("expected a polyline, got {:?}", other),
    }
    Ok(())
}

#[test]
fn load_by_name_from_asset_root() -> Result<()> {
    let root = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests");
    let mut loader = Loader::new(LoadOptions::default().asset_root(root));
    let map = loader.load("basic", Some(Path::new("maps")), &NoDelegate)?;

    assert_eq!(map.url, maps_dir().join("basic.tmx"));
    assert_eq!(map.tilesets[0].source, Some(maps_dir().join("tiles.tsx")));
    assert!(map.documents.iter().all(|d| d.resolved));
    Ok(())
}
