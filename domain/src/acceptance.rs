//! Acceptance test that every repository implementation should pass.
//!
//! Call it from a test in each backend crate against an empty table:
//!
//! ```ignore
//! #[test]
//! fn repo_acceptance() {
//!     let ctx = Context::background(); // or a namespaced context
//!     let repo = new_repo();
//!     repo_domain::acceptance::acceptance_test(&ctx, &repo);
//! }
//! ```
//!
//! Panics on the first violated property.

use chrono::{DateTime, TimeZone, Utc};
use uuid::Uuid;

use crate::mocks::Model;
use crate::repo::ReadWriteRepo;
use crate::{Context, ErrorKind};

fn created_at() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2009, 11, 10, 23, 0, 0)
        .single()
        .expect("valid fixed timestamp")
}

pub fn acceptance_test<R>(ctx: &Context, repo: &R)
where
    R: ReadWriteRepo<Model> + ?Sized,
{
    // Find non-existing item.
    match repo.find(ctx, Uuid::new_v4()) {
        Err(err) => assert_eq!(
            err.kind(),
            ErrorKind::EntityNotFound,
            "there should be an EntityNotFound error: {err}"
        ),
        Ok(entity) => panic!("there should be no entity: {entity:?}"),
    }

    // FindAll with no items.
    let result = repo.find_all(ctx).expect("there should be no error");
    assert!(result.is_empty(), "there should be no items: {}", result.len());

    // Save model without ID.
    let missing_id = Model {
        content: "entity1".into(),
        created_at: created_at(),
        ..Model::default()
    };
    let err = repo
        .save(ctx, &missing_id)
        .expect_err("there should be a MissingEntityID error");
    assert_eq!(err.kind(), ErrorKind::CouldNotSaveEntity, "{err}");
    assert_eq!(
        err.base_kind(),
        Some(ErrorKind::MissingEntityID),
        "there should be a MissingEntityID error: {err}"
    );
    assert_eq!(err.namespace(), ctx.namespace());

    // Save and find one item.
    let entity1 = Model {
        id: Uuid::new_v4(),
        content: "entity1".into(),
        created_at: created_at(),
        ..Model::default()
    };
    repo.save(ctx, &entity1).expect("there should be no error");
    let found = repo.find(ctx, entity1.id).expect("there should be no error");
    assert_eq!(found, entity1, "the item should be correct");

    // FindAll with one item.
    let result = repo.find_all(ctx).expect("there should be no error");
    assert_eq!(result, vec![entity1.clone()], "there should be one item");

    // Save and overwrite with same ID.
    let entity1_alt = Model {
        id: entity1.id,
        content: "entity1Alt".into(),
        created_at: created_at(),
        ..Model::default()
    };
    repo.save(ctx, &entity1_alt).expect("there should be no error");
    let found = repo.find(ctx, entity1_alt.id).expect("there should be no error");
    assert_eq!(found, entity1_alt, "the item should be overwritten");

    // Save with another ID.
    let entity2 = Model {
        id: Uuid::new_v4(),
        content: "entity2".into(),
        created_at: created_at(),
        ..Model::default()
    };
    repo.save(ctx, &entity2).expect("there should be no error");
    let found = repo.find(ctx, entity2.id).expect("there should be no error");
    assert_eq!(found, entity2, "the item should be correct");

    // FindAll with two items; retrieval in any order is accepted.
    let result = repo.find_all(ctx).expect("there should be no error");
    assert_eq!(result.len(), 2, "there should be two items");
    assert!(
        result == vec![entity1_alt.clone(), entity2.clone()]
            || result == vec![entity2.clone(), entity1_alt.clone()],
        "the items should be correct: {result:?}"
    );

    // Remove item.
    repo.remove(ctx, entity1_alt.id)
        .expect("there should be no error");
    match repo.find(ctx, entity1_alt.id) {
        Err(err) => assert_eq!(
            err.kind(),
            ErrorKind::EntityNotFound,
            "there should be an EntityNotFound error: {err}"
        ),
        Ok(entity) => panic!("there should be no entity: {entity:?}"),
    }

    // Remove non-existing item.
    let err = repo
        .remove(ctx, entity1_alt.id)
        .expect_err("there should be an EntityNotFound error");
    assert_eq!(err.kind(), ErrorKind::EntityNotFound, "{err}");
}
