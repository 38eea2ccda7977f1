use pagoda::{
    executor::predicate::ComparisonOp,
    storage::bplus_tree::BPlusTree,
    types::{
        LEAF_NODE_MAX_CELLS, TABLE_MAX_PAGES,
        error::DatabaseError,
        page::{NodeBody, NodeType},
        row::Row,
    },
    utils::mock::{TempDatabase, sample_row},
};

fn keys(rows: &[Row]) -> Vec<i32> {
    rows.iter().map(|r| r.id).collect()
}

fn tree_with(db: &TempDatabase, ids: impl IntoIterator<Item = i32>) -> Result<BPlusTree, DatabaseError> {
    let mut tree = db.open_tree("tree")?;
    for id in ids {
        tree.insert(&sample_row(id))?;
    }
    Ok(tree)
}

#[test]
fn test_new_tree_has_empty_root_leaf() -> Result<(), DatabaseError> {
    let db = TempDatabase::new()?;
    let mut tree = db.open_tree("tree")?;
    let root = tree.pager.get_page(0)?;
    assert!(root.is_root);
    assert_eq!(root.node_type(), NodeType::Leaf);
    assert_eq!(root.num_entries(), 0);
    assert!(tree.scan()?.is_empty());
    assert_eq!(tree.print_tree()?, "- leaf (size 0)\n");
    Ok(())
}

#[test]
fn test_insert_out_of_order_is_sorted() -> Result<(), DatabaseError> {
    let db = TempDatabase::new()?;
    let mut tree = tree_with(&db, [3, 1, 2])?;
    assert_eq!(keys(&tree.scan()?), vec![1, 2, 3]);
    assert_eq!(tree.print_tree()?, "- leaf (size 3)\n  - 1\n  - 2\n  - 3\n");
    Ok(())
}

#[test]
fn test_duplicate_key_leaves_tree_unchanged() -> Result<(), DatabaseError> {
    let db = TempDatabase::new()?;
    let mut tree = tree_with(&db, [1])?;
    let clash = Row::new(1, "other", "other@example.com");
    assert!(matches!(tree.insert(&clash), Err(DatabaseError::DuplicateKey { key: 1 })));
    let rows = tree.scan()?;
    assert_eq!(rows, vec![sample_row(1)]);
    Ok(())
}

#[test]
fn test_leaf_split_into_two_halves() -> Result<(), DatabaseError> {
    let db = TempDatabase::new()?;
    let mut tree = tree_with(&db, 1..=14)?;

    let mut expected = String::from("- internal (size 1)\n  - leaf (size 7)\n");
    for k in 1..=7 {
        expected.push_str(&format!("    - {}\n", k));
    }
    expected.push_str("  - key 7\n  - leaf (size 7)\n");
    for k in 8..=14 {
        expected.push_str(&format!("    - {}\n", k));
    }
    assert_eq!(tree.print_tree()?, expected);

    let root = tree.pager.get_page(0)?;
    assert!(root.is_root);
    match &root.body {
        NodeBody::Internal { keys, children } => {
            assert_eq!(keys, &vec![7]);
            assert_eq!(children.len(), 2);
        }
        other => panic!("expected internal root, got {:?}", other),
    }
    Ok(())
}

#[test]
fn test_split_children_point_at_root() -> Result<(), DatabaseError> {
    let db = TempDatabase::new()?;
    let mut tree = tree_with(&db, 1..=LEAF_NODE_MAX_CELLS as i32 + 1)?;
    let children = match &tree.pager.get_page(0)?.body {
        NodeBody::Internal { children, .. } => children.clone(),
        _ => panic!("root should be internal"),
    };
    for child in children {
        let page = tree.pager.get_page(child)?;
        assert_eq!(page.parent, 0);
        assert!(!page.is_root);
    }
    Ok(())
}

#[test]
fn test_internal_splits_keep_order() -> Result<(), DatabaseError> {
    let db = TempDatabase::new()?;
    // Descending and interleaved inserts force splits on both sides.
    let ids: Vec<i32> = (1..=100)
        .rev()
        .chain((101..=200).step_by(2))
        .chain((102..=200).step_by(2))
        .collect();
    let mut tree = tree_with(&db, ids)?;
    let rows = tree.scan()?;
    assert_eq!(keys(&rows), (1..=200).collect::<Vec<_>>());
    for id in [1, 77, 100, 101, 102, 199, 200] {
        assert_eq!(tree.get(id as u32)?, Some(sample_row(id)));
    }
    assert!(tree.print_tree()?.matches("- internal").count() > 1);
    Ok(())
}

#[test]
fn test_find_returns_insertion_point() -> Result<(), DatabaseError> {
    let db = TempDatabase::new()?;
    let mut tree = tree_with(&db, [10, 20, 30])?;
    let cursor = tree.find(20)?;
    assert_eq!((cursor.page_num, cursor.cell_num), (0, 1));
    let cursor = tree.find(25)?;
    assert_eq!(cursor.cell_num, 2);
    assert_eq!(tree.get(25)?, None);
    Ok(())
}

#[test]
fn test_update_rewrites_only_the_row() -> Result<(), DatabaseError> {
    let db = TempDatabase::new()?;
    let mut tree = tree_with(&db, 1..=20)?;
    let previous = tree.update(15, |row| {
        row.email = "new@example.com".to_string();
        Ok(())
    })?;
    assert_eq!(previous, sample_row(15));
    let updated = tree.get(15)?.unwrap();
    assert_eq!(updated.username, "user15");
    assert_eq!(updated.email, "new@example.com");
    assert_eq!(tree.scan()?.len(), 20);
    Ok(())
}

#[test]
fn test_update_rejects_missing_key_and_key_change() -> Result<(), DatabaseError> {
    let db = TempDatabase::new()?;
    let mut tree = tree_with(&db, [1])?;
    assert!(matches!(
        tree.update(2, |_| Ok(())),
        Err(DatabaseError::RecordNotFound { key: 2 })
    ));
    assert!(tree.update(1, |row| {
        row.id = 9;
        Ok(())
    })
    .is_err());
    assert!(tree.update(1, |row| {
        row.username = "x".repeat(40);
        Ok(())
    })
    .is_err());
    assert_eq!(tree.get(1)?, Some(sample_row(1)));
    Ok(())
}

#[test]
fn test_delete_without_rebalance() -> Result<(), DatabaseError> {
    let db = TempDatabase::new()?;
    let mut tree = tree_with(&db, 1..=14)?;
    for id in 1..=7 {
        assert_eq!(tree.delete(id)?, sample_row(id as i32));
    }
    assert!(matches!(tree.delete(3), Err(DatabaseError::RecordNotFound { key: 3 })));
    // The emptied left leaf stays in place and scans skip it.
    assert!(tree.print_tree()?.contains("- leaf (size 0)"));
    assert_eq!(keys(&tree.scan()?), (8..=14).collect::<Vec<_>>());
    tree.insert(&sample_row(3))?;
    assert_eq!(keys(&tree.scan()?), vec![3, 8, 9, 10, 11, 12, 13, 14]);
    Ok(())
}

#[test]
fn test_scan_from_ranges() -> Result<(), DatabaseError> {
    let db = TempDatabase::new()?;
    let mut tree = tree_with(&db, 1..=40)?;
    assert_eq!(keys(&tree.scan_from(20, ComparisonOp::Equal)?), vec![20]);
    assert!(tree.scan_from(99, ComparisonOp::Equal)?.is_empty());
    assert_eq!(keys(&tree.scan_from(37, ComparisonOp::GreaterThan)?), vec![38, 39, 40]);
    assert_eq!(keys(&tree.scan_from(38, ComparisonOp::GreaterThanOrEqual)?), vec![38, 39, 40]);
    assert_eq!(keys(&tree.scan_from(4, ComparisonOp::LessThan)?), vec![1, 2, 3]);
    assert_eq!(keys(&tree.scan_from(3, ComparisonOp::LessThanOrEqual)?), vec![1, 2, 3]);
    Ok(())
}

#[test]
fn test_tree_persists_across_reopen() -> Result<(), DatabaseError> {
    let db = TempDatabase::new()?;
    {
        let mut tree = tree_with(&db, (1..=50).rev())?;
        tree.flush()?;
    }
    let mut tree = db.open_tree("tree")?;
    assert_eq!(keys(&tree.scan()?), (1..=50).collect::<Vec<_>>());
    assert_eq!(tree.pager.file_length() % 4096, 0);
    Ok(())
}

#[test]
fn test_table_full_is_deterministic() -> Result<(), DatabaseError> {
    let db = TempDatabase::new()?;
    let mut tree = db.open_tree("tree")?;
    let mut accepted = Vec::new();
    let mut rejected_at = None;
    for id in 1..=1401 {
        match tree.insert(&sample_row(id)) {
            Ok(()) => accepted.push(id),
            Err(DatabaseError::TableFull) => {
                rejected_at = Some(id);
                break;
            }
            Err(e) => return Err(e),
        }
    }
    let rejected_at = rejected_at.expect("a 100-page table cannot hold 1401 rows");
    assert!(tree.pager.num_pages() <= TABLE_MAX_PAGES);
    assert_eq!(keys(&tree.scan()?), accepted);
    // The same insert keeps failing without touching the tree.
    assert!(matches!(tree.insert(&sample_row(rejected_at)), Err(DatabaseError::TableFull)));
    assert_eq!(tree.scan()?.len(), accepted.len());
    Ok(())
}
