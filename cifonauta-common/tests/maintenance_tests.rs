//! Counter and tour position maintenance through the Catalog API

use cifonauta_common::db::entities::load_entity;
use cifonauta_common::db::init::init_memory_database;
use cifonauta_common::db::models::{CountedKind, EntityRef, MediaKind, MediaLinks, NewMedia, NewTour};
use cifonauta_common::db::tours::{load_tour, load_tour_positions, tour_media_ids};
use cifonauta_common::events::{CatalogEvent, EventBus};
use cifonauta_common::maintenance::{
    recount, recount_all, reassign_tour_positions, MaintenanceTarget,
};
use cifonauta_common::{Catalog, Error};

async fn catalog() -> Catalog {
    let pool = init_memory_database().await.unwrap();
    Catalog::new(pool, EventBus::new(64))
}

async fn add_media(catalog: &Catalog, path: &str, kind: MediaKind) -> i64 {
    catalog
        .create_media(&NewMedia::new(path, kind))
        .await
        .unwrap()
        .0
}

async fn stored_counts(catalog: &Catalog, entity: EntityRef) -> (i64, i64) {
    let e = load_entity(catalog.pool(), entity).await.unwrap();
    (e.counts.image_count, e.counts.video_count)
}

#[tokio::test]
async fn test_author_with_three_images_and_one_video() {
    let catalog = catalog().await;
    let jane = catalog
        .create_entity(CountedKind::Author, "Jane")
        .await
        .unwrap()
        .entity_ref();

    let mut images = Vec::new();
    for i in 0..3 {
        let id = add_media(&catalog, &format!("img{}.jpg", i), MediaKind::Photo).await;
        catalog.associate(jane, id).await.unwrap();
        images.push(id);
    }
    let video = add_media(&catalog, "clip.mp4", MediaKind::Video).await;
    catalog.associate(jane, video).await.unwrap();

    let counts = recount(catalog.pool(), jane).await.unwrap();
    assert_eq!((counts.image_count, counts.video_count), (3, 1));
    assert_eq!(stored_counts(&catalog, jane).await, (3, 1));

    let report = catalog.delete_media(images[0]).await.unwrap();
    assert!(report.is_clean());
    assert_eq!(stored_counts(&catalog, jane).await, (2, 1));

    let counts = recount(catalog.pool(), jane).await.unwrap();
    assert_eq!(counts.image_count, 2);
}

#[tokio::test]
async fn test_recount_is_idempotent() {
    let catalog = catalog().await;
    let tag = catalog
        .create_entity(CountedKind::Tag, "bentos")
        .await
        .unwrap()
        .entity_ref();
    let media_id = add_media(&catalog, "a.jpg", MediaKind::Photo).await;
    catalog.associate(tag, media_id).await.unwrap();

    let first = recount(catalog.pool(), tag).await.unwrap();
    let second = recount(catalog.pool(), tag).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(stored_counts(&catalog, tag).await, (1, 0));
}

#[tokio::test]
async fn test_recount_repairs_drift() {
    let catalog = catalog().await;
    let source = catalog
        .create_entity(CountedKind::Source, "CEBIMar")
        .await
        .unwrap()
        .entity_ref();
    let media_id = add_media(&catalog, "a.jpg", MediaKind::Photo).await;
    catalog.associate(source, media_id).await.unwrap();

    sqlx::query("UPDATE sources SET image_count = 40, video_count = 2")
        .execute(catalog.pool())
        .await
        .unwrap();

    let results = recount_all(catalog.pool(), CountedKind::Source).await.unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(stored_counts(&catalog, source).await, (1, 0));
}

#[tokio::test]
async fn test_recount_missing_entity_is_not_found() {
    let catalog = catalog().await;
    let result = recount(catalog.pool(), EntityRef::new(CountedKind::Author, 77)).await;
    assert!(matches!(result, Err(Error::NotFound(_))));
}

#[tokio::test]
async fn test_foreign_key_counters_follow_media() {
    let catalog = catalog().await;
    let country = catalog
        .create_entity(CountedKind::Country, "Brasil")
        .await
        .unwrap()
        .entity_ref();
    let links = MediaLinks {
        country_id: Some(country.id),
        ..Default::default()
    };

    let (photo, _) = catalog
        .create_media(&NewMedia::new("p.jpg", MediaKind::Photo).with_links(links))
        .await
        .unwrap();
    catalog
        .create_media(&NewMedia::new("v.mp4", MediaKind::Video).with_links(links))
        .await
        .unwrap();
    assert_eq!(stored_counts(&catalog, country).await, (1, 1));

    catalog
        .update_media_links(photo, &MediaLinks::default())
        .await
        .unwrap();
    assert_eq!(stored_counts(&catalog, country).await, (0, 1));
}

#[tokio::test]
async fn test_tour_positions_are_contiguous() {
    let catalog = catalog().await;
    let mut ids = Vec::new();
    for i in 0..4 {
        ids.push(add_media(&catalog, &format!("t{}.jpg", i), MediaKind::Photo).await);
    }

    let (tour_id, report) = catalog
        .create_tour(&NewTour {
            name: "Costão rochoso".to_string(),
            media_ids: vec![ids[2], ids[0], ids[3]],
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(report.repositioned, vec![(tour_id, 3)]);

    let positions = load_tour_positions(catalog.pool(), tour_id).await.unwrap();
    let order: Vec<(i64, i64)> = positions.iter().map(|p| (p.media_id, p.position)).collect();
    assert_eq!(order, vec![(ids[2], 0), (ids[0], 1), (ids[3], 2)]);

    catalog.remove_media_from_tour(tour_id, ids[0]).await.unwrap();
    catalog.add_media_to_tour(tour_id, ids[1]).await.unwrap();

    let positions = load_tour_positions(catalog.pool(), tour_id).await.unwrap();
    let order: Vec<(i64, i64)> = positions.iter().map(|p| (p.media_id, p.position)).collect();
    assert_eq!(order, vec![(ids[2], 0), (ids[3], 1), (ids[1], 2)]);

    let tour = load_tour(catalog.pool(), tour_id).await.unwrap();
    assert_eq!(tour.counts.image_count, 3);
}

#[tokio::test]
async fn test_reassign_positions_is_idempotent() {
    let catalog = catalog().await;
    let a = add_media(&catalog, "a.jpg", MediaKind::Photo).await;
    let b = add_media(&catalog, "b.mp4", MediaKind::Video).await;
    let (tour_id, _) = catalog
        .create_tour(&NewTour {
            name: "Plâncton".to_string(),
            media_ids: vec![b, a],
            ..Default::default()
        })
        .await
        .unwrap();

    let before = load_tour_positions(catalog.pool(), tour_id).await.unwrap();
    assert_eq!(reassign_tour_positions(catalog.pool(), tour_id).await.unwrap(), 2);
    let after = load_tour_positions(catalog.pool(), tour_id).await.unwrap();

    assert_eq!(before, after);
    assert_eq!(tour_media_ids(catalog.pool(), tour_id).await.unwrap(), vec![b, a]);
}

#[tokio::test]
async fn test_save_tour_reassigns_positions() {
    let catalog = catalog().await;
    let a = add_media(&catalog, "a.jpg", MediaKind::Photo).await;
    let (tour_id, _) = catalog
        .create_tour(&NewTour {
            name: "Tour".to_string(),
            media_ids: vec![a],
            ..Default::default()
        })
        .await
        .unwrap();

    sqlx::query("DELETE FROM tour_positions")
        .execute(catalog.pool())
        .await
        .unwrap();

    let mut tour = load_tour(catalog.pool(), tour_id).await.unwrap();
    tour.name = "Tour renomeado".to_string();
    let report = catalog.save_tour(&tour).await.unwrap();

    assert_eq!(report.repositioned, vec![(tour_id, 1)]);
    assert_eq!(load_tour(catalog.pool(), tour_id).await.unwrap().slug, "tour-renomeado");
}

#[tokio::test]
async fn test_reassign_missing_tour_is_not_found() {
    let catalog = catalog().await;
    let result = reassign_tour_positions(catalog.pool(), 404).await;
    assert!(matches!(result, Err(Error::NotFound(_))));
}

#[tokio::test]
async fn test_failed_maintenance_keeps_mutation() {
    let catalog = catalog().await;
    let mut rx = catalog.events().subscribe();
    let author = catalog
        .create_entity(CountedKind::Author, "Jane")
        .await
        .unwrap()
        .entity_ref();
    let media_id = add_media(&catalog, "a.jpg", MediaKind::Photo).await;
    let _ = rx.try_recv(); // MediaCreated

    // Counter writes fail, the link itself does not
    sqlx::query(
        "CREATE TRIGGER block_author_counts BEFORE UPDATE OF image_count ON authors \
         BEGIN SELECT RAISE(ABORT, 'counter writes blocked'); END",
    )
    .execute(catalog.pool())
    .await
    .unwrap();

    let report = catalog.associate(author, media_id).await.unwrap();

    assert_eq!(report.failures.len(), 1);
    let (target, error) = &report.failures[0];
    assert_eq!(*target, MaintenanceTarget::Counter { entity: author });
    assert!(matches!(error, Error::PersistenceFailure { .. }));

    let linked: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM author_media")
        .fetch_one(catalog.pool())
        .await
        .unwrap();
    assert_eq!(linked, 1, "association must survive the failed recount");

    match rx.try_recv().unwrap() {
        CatalogEvent::MaintenanceFailed { target: t, .. } => assert_eq!(t, *target),
        other => panic!("unexpected event {}", other.event_type()),
    }
    assert_eq!(rx.try_recv().unwrap().event_type(), "AssociationChanged");

    sqlx::query("DROP TRIGGER block_author_counts")
        .execute(catalog.pool())
        .await
        .unwrap();
    catalog.retry_maintenance(&report).await.unwrap();
    assert_eq!(stored_counts(&catalog, author).await, (1, 0));
}
