use std::fs;
use std::path::Path;
use std::sync::Arc;

use gamevault_core::config::ScanConfig;
use gamevault_core::{
    CatalogStore, EnrichmentQueue, InMemoryCatalog, ManifestBuilder, ScanCoordinator, TaskPriority,
};
use tempfile::TempDir;

struct Harness {
    library: TempDir,
    catalog: Arc<InMemoryCatalog>,
    queue: Arc<EnrichmentQueue>,
    coordinator: ScanCoordinator,
}

fn harness() -> Harness {
    let library = tempfile::tempdir().expect("tempdir");
    let catalog = Arc::new(InMemoryCatalog::new());
    let queue = Arc::new(EnrichmentQueue::new());
    let coordinator = ScanCoordinator::new(
        catalog.clone(),
        ManifestBuilder::default(),
        Arc::clone(&queue),
        &ScanConfig::default(),
    );
    Harness {
        library,
        catalog,
        queue,
        coordinator,
    }
}

fn write_bytes(path: &Path, len: usize) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, vec![0xAB; len]).unwrap();
}

#[tokio::test]
async fn versioned_folder_gets_clean_title_and_totals() {
    let h = harness();
    let dir = h.library.path().join("MyGame_v1.2_GOTY");
    write_bytes(&dir.join("game.exe"), 10);
    write_bytes(&dir.join("data").join("level1.pak"), 20);
    write_bytes(&dir.join("data").join("level2.pak"), 30);

    let report = h
        .coordinator
        .scan_roots(&[h.library.path().to_path_buf()], false)
        .await;
    assert_eq!(report.created(), 1);
    assert_eq!(report.regenerated(), 1);
    assert_eq!(report.failures(), 0);

    let entities = h.catalog.entities();
    assert_eq!(entities.len(), 1);
    let entity = &entities[0];
    assert_eq!(entity.name, "MyGame");
    assert_eq!(entity.total_size, 60);
    assert!(entity.indexing_at.is_some());

    let manifest = h
        .coordinator
        .builder()
        .load(&dir)
        .await
        .unwrap()
        .expect("manifest persisted");
    assert_eq!(manifest.file_count, 3);
    assert_eq!(manifest.total_size, 60);
    assert_eq!(manifest.entity_id, entity.id);
    assert!(manifest.files.contains_key("data/level1.pak"));

    let recorded = entity.manifest_hash.clone().expect("hash recorded");
    let current = h.coordinator.builder().quick_hash(&dir).await.unwrap();
    assert_eq!(Some(recorded), current);
}

#[tokio::test]
async fn unchanged_manifest_is_reused_on_next_pass() {
    let h = harness();
    let dir = h.library.path().join("Hollow Knight");
    write_bytes(&dir.join("hollow_knight.exe"), 64);
    let roots = [h.library.path().to_path_buf()];

    let first = h.coordinator.scan_roots(&roots, false).await;
    assert_eq!(first.regenerated(), 1);
    let before = fs::read(dir.join("manifest.json")).unwrap();

    let second = h.coordinator.scan_roots(&roots, false).await;
    assert_eq!(second.created(), 0);
    assert_eq!(second.reused(), 1);
    assert_eq!(second.regenerated(), 0);
    assert_eq!(fs::read(dir.join("manifest.json")).unwrap(), before);
}

#[tokio::test]
async fn tampered_manifest_forces_regeneration() {
    let h = harness();
    let dir = h.library.path().join("Outer Wilds");
    write_bytes(&dir.join("OuterWilds.exe"), 32);
    let roots = [h.library.path().to_path_buf()];
    h.coordinator.scan_roots(&roots, false).await;

    let manifest_path = dir.join("manifest.json");
    let mut raw = fs::read(&manifest_path).unwrap();
    raw.push(b'\n');
    fs::write(&manifest_path, raw).unwrap();

    let report = h.coordinator.scan_roots(&roots, false).await;
    assert_eq!(report.regenerated(), 1);

    let entity = &h.catalog.entities()[0];
    let current = h.coordinator.builder().quick_hash(&dir).await.unwrap();
    assert_eq!(entity.manifest_hash, current);
}

#[tokio::test]
async fn new_entities_are_queued_once_for_enrichment() {
    let h = harness();
    write_bytes(&h.library.path().join("Celeste").join("Celeste.exe"), 8);
    write_bytes(&h.library.path().join("Braid").join("braid.exe"), 8);
    let roots = [h.library.path().to_path_buf()];

    let first = h.coordinator.scan_roots(&roots, false).await;
    assert_eq!(first.enrichment_submitted(), 2);
    assert_eq!(h.queue.queued_len().await, 2);

    // Still queued from the first pass.
    let second = h.coordinator.scan_roots(&roots, false).await;
    assert_eq!(second.enrichment_submitted(), 0);
    assert_eq!(h.queue.queued_len().await, 2);

    let task = h.queue.next().await;
    assert_eq!(task.priority, TaskPriority::Normal);
}

#[tokio::test]
async fn one_broken_directory_does_not_block_the_rest() {
    let h = harness();
    write_bytes(&h.library.path().join("Tunic").join("tunic.exe"), 16);
    // Folder name made only of noise yields no slug.
    fs::create_dir_all(h.library.path().join("___")).unwrap();

    let report = h
        .coordinator
        .scan_roots(&[h.library.path().to_path_buf()], false)
        .await;
    assert_eq!(report.created(), 1);
    assert_eq!(report.failures(), 1);

    let tunic = h
        .catalog
        .find_by_path(&h.library.path().join("Tunic"))
        .await
        .unwrap();
    assert!(tunic.is_some());
}

#[tokio::test]
async fn colliding_folder_names_get_separate_entities() {
    let h = harness();
    let hyphen = h.library.path().join("Half-Life");
    let spaced = h.library.path().join("Half Life");
    write_bytes(&hyphen.join("hl.exe"), 10);
    write_bytes(&spaced.join("hl.exe"), 99);
    let roots = [h.library.path().to_path_buf()];

    let first = h.coordinator.scan_roots(&roots, false).await;
    assert_eq!(first.created(), 2);
    assert_eq!(first.regenerated(), 2);

    for _ in 0..2 {
        let again = h.coordinator.scan_roots(&roots, false).await;
        assert_eq!(again.created(), 0);
        assert_eq!(again.reused(), 2);
        assert_eq!(again.regenerated(), 0);
    }

    let mut slugs: Vec<String> = h.catalog.entities().into_iter().map(|e| e.slug).collect();
    slugs.sort();
    assert_eq!(slugs, ["half-life", "half-life-2"]);

    let hyphen_entity = h.catalog.find_by_path(&hyphen).await.unwrap().unwrap();
    let spaced_entity = h.catalog.find_by_path(&spaced).await.unwrap().unwrap();
    assert_ne!(hyphen_entity.id, spaced_entity.id);
    assert_eq!(hyphen_entity.total_size, 10);
    assert_eq!(spaced_entity.total_size, 99);

    let builder = h.coordinator.builder();
    let hyphen_manifest = builder.load(&hyphen).await.unwrap().unwrap();
    let spaced_manifest = builder.load(&spaced).await.unwrap().unwrap();
    assert_eq!(hyphen_manifest.entity_id, hyphen_entity.id);
    assert_eq!(spaced_manifest.entity_id, spaced_entity.id);
}
