use super::*;
use crate::error::CoreError;

#[test]
fn insert_and_read_round_trips_keys_and_values() {
    let mut table = SlotTable::new();
    {
        let mut w = table.open_writer().unwrap();
        w.begin_insert();
        w.start_group(10, None, false, None).unwrap();
        w.append_value(Box::new(1i32));
        w.append_value(Box::new(2i32));
        w.end_group().unwrap();
        w.end_insert();
    }
    assert_eq!(table.group_count(), 1);

    let mut r = table.open_reader();
    assert_eq!(r.group_key(0).unwrap(), 10);
    assert_eq!(r.group_size(0).unwrap(), 1);
    r.start_group().unwrap();
    match r.next_slot().unwrap() {
        ReadValue::Value(v) => assert_eq!(v.downcast_ref::<i32>(), Some(&1)),
        _ => panic!("expected the first appended value"),
    }
    match r.next_slot().unwrap() {
        ReadValue::Value(v) => assert_eq!(v.downcast_ref::<i32>(), Some(&2)),
        _ => panic!("expected the second appended value"),
    }
    r.end_group().unwrap();
}

#[test]
fn nested_group_parent_and_size_are_consistent() {
    let mut table = SlotTable::new();
    {
        let mut w = table.open_writer().unwrap();
        w.begin_insert();
        w.start_group(1, None, false, None).unwrap();
        w.start_group(2, None, false, None).unwrap();
        w.end_group().unwrap();
        w.end_group().unwrap();
        w.end_insert();
    }
    assert_eq!(table.group_count(), 2);

    let r = table.open_reader();
    assert_eq!(r.group_size(0).unwrap(), 2);
    assert_eq!(r.group_size(1).unwrap(), 1);
    assert_eq!(r.parent(1).unwrap(), Some(0));
    assert_eq!(r.parent(0).unwrap(), None);
}

#[test]
fn node_group_records_its_node_id() {
    let mut table = SlotTable::new();
    {
        let mut w = table.open_writer().unwrap();
        w.begin_insert();
        w.start_group(1, None, true, None).unwrap();
        w.record_node(7);
        w.end_group().unwrap();
        w.end_insert();
    }
    let r = table.open_reader();
    assert!(r.is_node(0).unwrap());
    assert_eq!(r.node(0).unwrap(), Some(7));
}

#[test]
fn non_node_group_reports_no_node() {
    let mut table = SlotTable::new();
    {
        let mut w = table.open_writer().unwrap();
        w.begin_insert();
        w.start_group(1, None, false, None).unwrap();
        w.end_group().unwrap();
        w.end_insert();
    }
    let r = table.open_reader();
    assert!(!r.is_node(0).unwrap());
    assert_eq!(r.node(0).unwrap(), None);
}

#[test]
fn object_key_and_aux_occupy_reserved_slots_ahead_of_appended_values() {
    let mut table = SlotTable::new();
    {
        let mut w = table.open_writer().unwrap();
        w.begin_insert();
        w.start_group(1, Some(Box::new("key".to_string())), false, Some(Box::new(99i32)))
            .unwrap();
        w.append_value(Box::new(5i32));
        w.end_group().unwrap();
        w.end_insert();
    }
    let mut r = table.open_reader();
    let aux = r.group_aux(0).unwrap().unwrap();
    assert_eq!(aux.downcast_ref::<i32>(), Some(&99));

    r.start_group().unwrap();
    match r.next_slot().unwrap() {
        ReadValue::Value(v) => assert_eq!(v.downcast_ref::<i32>(), Some(&5)),
        _ => panic!("reserved cells must be skipped by next_slot"),
    }
}

#[test]
fn group_with_no_aux_reports_none() {
    let mut table = SlotTable::new();
    {
        let mut w = table.open_writer().unwrap();
        w.begin_insert();
        w.start_group(1, None, false, None).unwrap();
        w.end_group().unwrap();
        w.end_insert();
    }
    let r = table.open_reader();
    assert!(r.group_aux(0).unwrap().is_none());
}

#[test]
fn mark_group_propagates_contains_mark_to_every_ancestor() {
    let mut table = SlotTable::new();
    {
        let mut w = table.open_writer().unwrap();
        w.begin_insert();
        w.start_group(1, None, false, None).unwrap(); // 0: root
        w.start_group(2, None, false, None).unwrap(); // 1: child
        w.mark_group(1);
        w.end_group().unwrap();
        w.end_group().unwrap();
        w.end_insert();
    }
    assert!(bits::mark(table.group(1).info));
    assert!(!bits::mark(table.group(0).info));
    assert!(bits::contains_mark(table.group(0).info));
}

#[test]
fn invalidate_groups_with_key_collects_every_matching_and_bashed_group() {
    let mut table = SlotTable::new();
    {
        let mut w = table.open_writer().unwrap();
        w.begin_insert();
        w.start_group(1, None, false, None).unwrap(); // 0
        w.start_group(2, None, false, None).unwrap(); // 1
        w.end_group().unwrap();
        w.start_group(2, None, false, None).unwrap(); // 2
        w.end_group().unwrap();
        w.end_group().unwrap();
        w.end_insert();
    }
    let w = table.open_writer().unwrap();
    let matches = w.invalidate_groups_with_key(2).unwrap();
    assert_eq!(matches, vec![1, 2]);
    drop(w);

    let mut w2 = table.open_writer().unwrap();
    w2.bash_current_group(); // cursor is 0 on a fresh writer
    drop(w2);
    assert_eq!(table.group(0).key, LIVE_EDIT_INVALID_KEY);

    let w3 = table.open_writer().unwrap();
    let matches_after_bash = w3.invalidate_groups_with_key(2).unwrap();
    assert!(matches_after_bash.contains(&0));
}

#[test]
fn verify_well_formed_accepts_a_well_nested_table() {
    let mut table = SlotTable::new();
    {
        let mut w = table.open_writer().unwrap();
        w.begin_insert();
        w.start_group(1, None, false, None).unwrap();
        w.start_group(2, None, false, None).unwrap();
        w.end_group().unwrap();
        w.end_group().unwrap();
        w.end_insert();
    }
    assert!(table.verify_well_formed().is_ok());
}

#[test]
fn empty_table_is_well_formed_and_empty() {
    let table = SlotTable::new();
    assert!(table.verify_well_formed().is_ok());
    assert!(table.is_empty());
    assert_eq!(table.group_count(), 0);
}

#[test]
fn end_group_without_start_group_is_a_structural_error() {
    let mut table = SlotTable::new();
    let mut w = table.open_writer().unwrap();
    let err = w.end_group().unwrap_err();
    assert!(matches!(err, CoreError::StructuralInvariant(_)));
}

#[test]
fn closing_a_non_inserting_group_at_the_wrong_cursor_is_rejected() {
    let mut table = SlotTable::new();
    {
        let mut w = table.open_writer().unwrap();
        w.begin_insert();
        w.start_group(1, None, false, None).unwrap();
        w.start_group(2, None, false, None).unwrap();
        w.end_group().unwrap();
        w.end_group().unwrap();
        w.end_insert();
    }
    let mut w = table.open_writer().unwrap();
    w.start_group(0, None, false, None).unwrap();
    // Displace the cursor so it no longer lands on the group's real end.
    w.cursor = 0;
    let err = w.end_group().unwrap_err();
    assert!(matches!(err, CoreError::StructuralInvariant(_)));
}

#[test]
fn remove_group_repeated_at_a_fixed_cursor_empties_the_table() {
    let mut table = SlotTable::new();
    {
        let mut w = table.open_writer().unwrap();
        w.begin_insert();
        w.start_group(1, None, false, None).unwrap();
        w.end_group().unwrap();
        w.start_group(2, None, false, None).unwrap();
        w.end_group().unwrap();
        w.end_insert();
    }
    assert_eq!(table.group_count(), 2);

    {
        let mut w = table.open_writer().unwrap();
        while w.table().group_count() > 0 {
            w.remove_group().unwrap();
        }
    }
    assert_eq!(table.group_count(), 0);
    assert!(table.verify_well_formed().is_ok());
}

#[test]
fn remove_group_rejects_being_called_while_inserting() {
    let mut table = SlotTable::new();
    let mut w = table.open_writer().unwrap();
    w.begin_insert();
    w.start_group(1, None, false, None).unwrap();
    let err = w.remove_group().unwrap_err();
    assert!(matches!(err, CoreError::ConcurrentMisuse(_)));
}

#[test]
fn deferred_slot_write_is_flushed_at_end_group() {
    let mut table = SlotTable::new();
    {
        let mut w = table.open_writer().unwrap();
        w.begin_insert();
        w.start_group(1, None, false, None).unwrap();
        w.append_value(Box::new(1i32));
        w.append_value(Box::new(2i32));
        // Cursor now sits past both values; writing back to the first one
        // must queue rather than write through immediately.
        w.update_value(0, Box::new(100i32));
        assert_eq!(table.group(0).key, 1); // group untouched by the deferral
        w.end_group().unwrap();
        w.end_insert();
    }

    let mut r = table.open_reader();
    r.start_group().unwrap();
    match r.next_slot().unwrap() {
        ReadValue::Value(v) => assert_eq!(v.downcast_ref::<i32>(), Some(&100)),
        _ => panic!("deferred write should have replaced the first slot"),
    }
    match r.next_slot().unwrap() {
        ReadValue::Value(v) => assert_eq!(v.downcast_ref::<i32>(), Some(&2)),
        _ => panic!("second slot should be untouched"),
    }
    r.end_group().unwrap();
}

#[test]
fn move_group_relocates_owning_anchors_and_rebases_descendant_parents() {
    let mut table = SlotTable::new();
    {
        let mut w = table.open_writer().unwrap();
        w.begin_insert();
        w.start_group(1, None, false, None).unwrap(); // 0: A
        w.end_group().unwrap();
        w.start_group(5, None, false, None).unwrap(); // 1: X
        w.end_group().unwrap();
        w.start_group(2, None, false, None).unwrap(); // 2: B
        w.start_group(20, None, false, None).unwrap(); // 3: B's child
        w.end_group().unwrap();
        w.end_group().unwrap();
        w.end_insert();
    }
    assert_eq!(table.group_count(), 4);

    let anchor_a = table.anchor_for(0);
    let anchor_x = table.anchor_for(1);
    let anchor_b = table.anchor_for(2);
    let anchor_child = table.anchor_for(3);

    {
        // Cursor starts at 0 on a fresh writer; walking 2 siblings forward
        // (A, then X) lands on B, the group to move before the cursor.
        let mut w = table.open_writer().unwrap();
        w.move_group(2).unwrap();
    }

    // B (+ its child) now leads, pushing A and X back by B's size (2).
    assert_eq!(table.index_for_anchor(&anchor_b), 0);
    assert_eq!(table.index_for_anchor(&anchor_child), 1);
    assert_eq!(table.index_for_anchor(&anchor_a), 2);
    assert_eq!(table.index_for_anchor(&anchor_x), 3);

    let r = table.open_reader();
    assert_eq!(r.group_key(0).unwrap(), 2);
    assert_eq!(r.group_key(1).unwrap(), 20);
    assert_eq!(r.group_key(2).unwrap(), 1);
    assert_eq!(r.group_key(3).unwrap(), 5);
    assert_eq!(r.parent(1).unwrap(), Some(0));
    assert_eq!(r.parent(2).unwrap(), None);
    drop(r);

    assert!(table.verify_well_formed().is_ok());
}

#[test]
fn advancing_the_reader_cursor_skips_a_whole_subtree() {
    let mut table = SlotTable::new();
    {
        let mut w = table.open_writer().unwrap();
        w.begin_insert();
        w.start_group(1, None, false, None).unwrap(); // 0
        w.start_group(2, None, false, None).unwrap(); // 1
        w.end_group().unwrap();
        w.end_group().unwrap(); // closes 0, size 2
        w.start_group(3, None, false, None).unwrap(); // 2
        w.end_group().unwrap();
        w.end_insert();
    }
    let mut r = table.open_reader();
    let skipped = r.skip_group().unwrap();
    assert_eq!(skipped, 2);
    assert_eq!(r.group_key(2).unwrap(), 3);
}
