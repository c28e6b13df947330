//! Tests for list, radix tree and per-CPU traversals

mod common;

use common::{page, task};
use kinsight_core::prelude::*;

fn pids(entries: ListEntries<'_>) -> Vec<i64>
{
    entries
        .map(|entry| entry.unwrap().member("pid").unwrap().value().unwrap().as_i64().unwrap())
        .collect()
}

#[test]
fn test_task_list_yields_every_entry_once()
{
    for n in [0, 1, 5] {
        let inspector = common::inspector(n);
        let init = inspector.symbol_instance("init_task").unwrap();
        let entries = list::entries_along(init, &["tasks"]).unwrap();
        let expected: Vec<i64> = (1..=n as i64).collect();
        assert_eq!(pids(entries), expected, "list of {n} tasks");
    }
}

#[test]
fn test_list_entries_are_owner_instances()
{
    let inspector = common::inspector(2);
    let head = inspector.symbol_instance("init_task").unwrap().member("tasks").unwrap();
    let owner = common::type_id(&inspector, "task_struct");

    let mut entries = list::entries(head, owner, &["tasks"]).unwrap();
    let first = entries.next().unwrap().unwrap();
    assert_eq!(first.address(), Address::new(task(1)));
    assert_eq!(first.type_name(), "task_struct");
    assert_eq!(entries.next().unwrap().unwrap().address(), Address::new(task(2)));
    assert!(entries.next().is_none());
    assert!(entries.next().is_none());
    assert_eq!(entries.yielded(), 2);
}

#[test]
fn test_list_with_cycle_aborts()
{
    let inspector = common::inspector(0);
    let head = inspector.symbol_instance("broken_list").unwrap();
    let owner = common::type_id(&inspector, "task_struct");

    let results: Vec<_> = list::entries(head, owner, &["tasks"]).unwrap().collect();
    assert_eq!(results.len(), 3);
    assert_eq!(results[0].as_ref().unwrap().address(), Address::new(common::CYCLE_A));
    assert_eq!(results[1].as_ref().unwrap().address(), Address::new(common::CYCLE_B));
    assert!(matches!(results[2], Err(InsightError::InconsistentStructure(_))));
}

#[test]
fn test_list_with_null_link_aborts()
{
    let inspector = common::inspector(0);
    let head = inspector.symbol_instance("null_list").unwrap();
    let owner = common::type_id(&inspector, "task_struct");

    let results: Vec<_> = list::entries(head, owner, &["tasks"]).unwrap().collect();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].as_ref().unwrap().member("pid").unwrap().value().unwrap().as_i64(), Some(102));
    match &results[1] {
        Err(InsightError::InconsistentStructure(inconsistency)) => {
            assert_eq!(inconsistency.address, Address::new(common::DANGLING + common::TASKS_OFFSET));
        }
        other => panic!("expected an inconsistency, got {other:?}"),
    }
}

#[test]
fn test_list_entry_limit()
{
    let inspector = common::inspector_with(5, EngineConfig::default().with_max_list_entries(2));
    let init = inspector.symbol_instance("init_task").unwrap();
    let results: Vec<_> = list::entries_along(init, &["tasks"]).unwrap().collect();
    assert_eq!(results.len(), 3);
    assert!(results[..2].iter().all(Result::is_ok));
    assert!(results[2].is_err());
}

#[test]
fn test_list_with_unknown_link()
{
    let inspector = common::inspector(0);
    let init = inspector.symbol_instance("init_task").unwrap();
    assert!(list::entries_along(init, &["children"]).is_err());
    let head = init.member("tasks").unwrap();
    assert!(list::entries(head, TypeId(9999), &["tasks"]).is_err());
}

#[test]
fn test_hlist()
{
    for n in [0, 1, 5] {
        let inspector = common::inspector(n);
        let head = inspector.symbol_instance("pid_hash").unwrap();
        let owner = common::type_id(&inspector, "task_struct");
        let entries = list::hlist_entries(head, owner, &["pid_link", "next"]).unwrap();
        assert_eq!(pids(entries), (1..=n as i64).collect::<Vec<_>>(), "hlist of {n} tasks");
    }
}

#[test]
fn test_hlist_only_walks_forward()
{
    let inspector = common::inspector(2);
    let head = inspector.symbol_instance("pid_hash").unwrap();
    let owner = common::type_id(&inspector, "task_struct");
    assert!(matches!(
        list::hlist_entries(head, owner, &["pid_link", "pprev"]),
        Err(InsightError::InvalidArgument(_))
    ));
    assert!(list::hlist_entries(head, owner, &[]).is_err());
}

#[test]
fn test_hlist_nulls()
{
    for n in [0, 1, 5] {
        let inspector = common::inspector(n);
        let head = inspector.symbol_instance("nulls_head").unwrap();
        let owner = common::type_id(&inspector, "task_struct");
        let entries = list::hlist_nulls_entries(head, owner, &["nulls_link", "next"]).unwrap();
        assert_eq!(pids(entries), (1..=n as i64).collect::<Vec<_>>(), "nulls list of {n} tasks");
    }
}

#[test]
fn test_radix_tree_walk()
{
    let inspector = common::inspector(0);
    let root = inspector.symbol_instance("page_tree").unwrap();
    let walk = radix::walk(root, None).unwrap();

    let addresses: Vec<Address> = walk.items.iter().map(TypedInstance::address).collect();
    assert_eq!(addresses, vec![Address::new(page(0)), Address::new(page(1)), Address::new(page(2))]);
    assert!(walk.items.iter().all(|item| item.type_name() == "page"));
    assert!(walk.diagnostics.is_empty(), "{:?}", walk.diagnostics);

    let indices: Vec<u64> = walk
        .items
        .iter()
        .map(|item| item.member("index").unwrap().value().unwrap().as_u64().unwrap())
        .collect();
    assert_eq!(indices, vec![0, 1, 2]);
}

#[test]
fn test_radix_root_node_clears_indirect_flag()
{
    let inspector = common::inspector(0);
    let root = inspector.symbol_instance("page_tree").unwrap();
    let mut diagnostics = Vec::new();
    let top = radix::root_node(root, &mut diagnostics).unwrap().unwrap();
    assert_eq!(top.address(), Address::new(common::NODE_TOP));
    assert_eq!(top.type_name(), "radix_tree_node");

    let leaf = inspector.catalog().type_by_name("page").unwrap();
    let children = radix::node_slots(top, leaf, &mut diagnostics).unwrap();
    let addresses: Vec<Address> = children.iter().map(TypedInstance::address).collect();
    assert_eq!(addresses, vec![Address::new(common::NODE_LEFT), Address::new(common::NODE_RIGHT)]);
    assert!(diagnostics.is_empty());
}

#[test]
fn test_radix_tree_inconsistencies()
{
    let inspector = common::inspector(0);
    let root = inspector.symbol_instance("bad_tree").unwrap();
    let walk = radix::walk(root, None).unwrap();

    let addresses: Vec<Address> = walk.items.iter().map(TypedInstance::address).collect();
    assert_eq!(addresses, vec![Address::new(page(0)), Address::new(page(1))]);
    assert_eq!(walk.diagnostics.len(), 2);
    assert_eq!(walk.diagnostics[0].address, Address::new(common::NODE_BAD_CHILD));
    assert_eq!(walk.diagnostics[1].address, Address::new(common::NODE_BAD_TOP));
}

#[test]
fn test_radix_empty_and_invalid_roots()
{
    let inspector = common::inspector(0);
    let empty = radix::walk(inspector.symbol_instance("empty_tree").unwrap(), None).unwrap();
    assert!(empty.items.is_empty());
    assert!(empty.diagnostics.is_empty());

    let tall = radix::walk(inspector.symbol_instance("tall_tree").unwrap(), None).unwrap();
    assert!(tall.items.is_empty());
    assert_eq!(tall.diagnostics.len(), 1);
    assert_eq!(tall.diagnostics[0].address, Address::new(common::TALL_TREE));
}

#[test]
fn test_radix_tree_pointing_back_at_itself()
{
    let inspector = common::inspector(0);
    let root = inspector.symbol_instance("loop_tree").unwrap();
    let walk = radix::walk(root, None).unwrap();

    let addresses: Vec<Address> = walk.items.iter().map(TypedInstance::address).collect();
    assert_eq!(addresses, vec![Address::new(page(0)), Address::new(page(1))]);
    let reported: Vec<Address> = walk.diagnostics.iter().map(|diagnostic| diagnostic.address).collect();
    assert_eq!(reported, vec![Address::new(common::NODE_LOOP), Address::new(common::NODE_LEFT)]);
}

#[test]
fn test_radix_custom_leaf_type()
{
    let inspector = common::inspector(0);
    let root = inspector.symbol_instance("page_tree").unwrap();
    let leaf = common::type_id(&inspector, "task_struct");
    let walk = radix::walk(root, Some(leaf)).unwrap();
    assert_eq!(walk.items.len(), 3);
    assert!(walk.items.iter().all(|item| item.type_name() == "task_struct"));

    let missing = common::inspector_with(0, EngineConfig::default().with_radix_leaf_type("folio"));
    let root = missing.symbol_instance("page_tree").unwrap();
    assert!(matches!(radix::walk(root, None), Err(InsightError::NotFound { .. })));
}

#[test]
fn test_per_cpu_resolution()
{
    let inspector = common::inspector(0);
    let runqueues = inspector.symbol_instance("runqueues").unwrap();
    assert_eq!(runqueues.address(), Address::new(common::RUNQUEUES_TEMPLATE));

    let cpu0 = percpu::resolve(runqueues).unwrap();
    assert_eq!(cpu0.address(), Address::new(common::CPU0_AREA));
    assert_eq!(cpu0.value().unwrap().as_i64(), Some(7));

    let cpu1 = percpu::resolve_for_cpu(runqueues, 1).unwrap();
    assert_eq!(cpu1.value().unwrap().as_i64(), Some(8));
    assert!(matches!(percpu::resolve_for_cpu(runqueues, 2), Err(InsightError::NotFound { .. })));

    let offsets = percpu::offsets(&inspector, 0).unwrap();
    assert_eq!(
        offsets,
        vec![
            Some(common::CPU0_AREA - common::RUNQUEUES_TEMPLATE),
            Some(common::CPU1_AREA - common::RUNQUEUES_TEMPLATE),
        ]
    );
}

#[test]
fn test_per_cpu_without_offset_table()
{
    let mut builder = CatalogBuilder::new(Architecture::X86_64);
    let int = builder.base("int", 4, BaseEncoding::Signed);
    builder.symbol("runqueues", int, Address::new(0x1000));
    let catalog = builder.build().unwrap();
    let image = SnapshotImage::new("up").with_region(Address::new(0x1000), vec![3, 0, 0, 0]);
    let inspector = Inspector::new(catalog, MemorySpace::new().with_image(image));

    let runqueues = inspector.symbol_instance("runqueues").unwrap();
    let resolved = percpu::resolve(runqueues).unwrap();
    assert_eq!(resolved.address(), runqueues.address());
    assert_eq!(resolved.value().unwrap().as_i64(), Some(3));
    assert!(percpu::offsets(&inspector, 0).unwrap().is_empty());
    assert!(percpu::resolve_for_cpu(runqueues, 0).is_ok());
    assert!(percpu::resolve_for_cpu(runqueues, 1).is_err());
}
