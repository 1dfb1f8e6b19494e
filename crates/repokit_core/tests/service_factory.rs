mod common;

use common::{memory_context, Widget, MIGRATIONS};
use repokit_core::{
    FilterSet, OrderSpec, PageRequest, RepoError, Repository, ServiceFactory,
    SqliteEntityService, StatelessEntityService, StoreConfig, TransactionMode,
};

#[test]
fn bound_service_shares_the_caller_context() {
    let context = memory_context();
    let service: SqliteEntityService<'_, Widget> = ServiceFactory::get(&context).unwrap();

    let mut widget = Widget::new("a", 10);
    service.create(&mut widget).unwrap();
    widget.weight = 12;
    service.modify(&mut widget).unwrap();

    context.flush().unwrap();
    assert_eq!(service.require(&1).unwrap().weight, 12);
    assert!(service.exists(&1).unwrap());
    assert_eq!(service.count(None).unwrap(), 1);

    let err = service.require(&2).unwrap_err();
    assert!(matches!(err, RepoError::NotFound { entity: "Widget", .. }));
}

#[test]
fn bound_service_lists_and_pages_through_repository() {
    let context = memory_context();
    let service: SqliteEntityService<'_, Widget> = ServiceFactory::get(&context).unwrap();
    for (name, weight) in [("c", 1), ("a", 1), ("b", 2)] {
        service.store(&mut Widget::new(name, weight)).unwrap();
    }

    let light = FilterSet::new().with("weight", 1);
    let listed = service
        .list(Some(&light), OrderSpec::asc("name").as_ref())
        .unwrap();
    assert_eq!(common::names(&listed), vec!["a", "c"]);

    let page = service
        .page(None, OrderSpec::desc("name").as_ref(), PageRequest::first(2).unwrap())
        .unwrap();
    assert_eq!(common::names(page.items()), vec!["c", "b"]);
    assert_eq!(page.total_pages(), 2);

    let found = service.repository().get_by_column("name", "b").unwrap();
    assert_eq!(found.map(|widget| widget.weight), Some(2));
}

#[test]
fn stateless_services_own_separate_contexts_over_one_file() {
    let dir = tempfile::tempdir().unwrap();
    let factory = ServiceFactory::new(StoreConfig::file(dir.path().join("svc.db")), MIGRATIONS);

    let writer: StatelessEntityService<Widget> = factory.get_stateless().unwrap();
    let mut widget = Widget::new("shared", 1);
    writer.create(&mut widget).unwrap();
    widget.weight = 2;
    writer.modify(&mut widget).unwrap();

    let reader: StatelessEntityService<Widget> = factory.get_stateless().unwrap();
    assert_eq!(reader.find(&1).unwrap().unwrap().weight, 2);

    writer.remove(&widget).unwrap();
    assert_eq!(reader.count(None).unwrap(), 0);
}

#[test]
fn stateless_transaction_rolls_back_on_error() {
    let factory = ServiceFactory::new(StoreConfig::in_memory(), MIGRATIONS);
    let service: StatelessEntityService<Widget> = factory.get_stateless().unwrap();

    let err = service
        .with_transaction(TransactionMode::Immediate, |repo| {
            repo.save(&mut Widget::new("temp", 1))?;
            repo.save(&mut Widget::new("temp", 2))
        })
        .unwrap_err();
    assert!(matches!(err, RepoError::Persistence(_)));
    assert_eq!(service.count(None).unwrap(), 0);
    assert!(service.list(None, None).unwrap().is_empty());
}

#[test]
fn stateless_service_requires_schema() {
    let factory = ServiceFactory::new(StoreConfig::in_memory(), &[]);
    let result = factory.get_stateless::<StatelessEntityService<Widget>>();
    assert!(matches!(result, Err(RepoError::MissingRequiredTable("widgets"))));
}
