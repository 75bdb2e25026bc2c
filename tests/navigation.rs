use thread_engine::test_support::{built_engine, display_ids, index_of, message, test_config};
use thread_engine::threading::{ThreadCount, TraverseOp, TraverseOutcome};
use thread_engine::{MessageFlag, MessageIndex, RecordId, ThreadEngine, ThreadError};

// Two threads, in date order:
//   t1 ─┬─ t1.a ── t1.a.x
//       └─ t1.b
//   t2 ── t2.a
fn mailbox() -> MessageIndex {
    index_of([
        message("t1", &[], 0).with_flag(MessageFlag::Read, true),
        message("t1.a", &["t1"], 1).with_flag(MessageFlag::Read, true),
        message("t1.a.x", &["t1", "t1.a"], 2).with_flag(MessageFlag::Read, true),
        message("t1.b", &["t1"], 3).with_flag(MessageFlag::Read, true),
        message("t2", &[], 4).with_flag(MessageFlag::Read, true),
        message("t2.a", &["t2"], 5).with_flag(MessageFlag::Read, true),
    ])
}

fn node(engine: &ThreadEngine, slot: usize) -> thread_engine::NodeId {
    engine.node_for_record(RecordId(slot)).unwrap()
}

#[test]
fn thread_and_subthread_moves() {
    let index = mailbox();
    let engine = built_engine(test_config(), &index);

    assert_eq!(engine.next_thread(node(&engine, 2)).unwrap(), Some(node(&engine, 4)));
    assert_eq!(engine.previous_thread(node(&engine, 5)).unwrap(), Some(node(&engine, 0)));
    assert_eq!(engine.previous_thread(node(&engine, 0)).unwrap(), None);
    assert_eq!(engine.next_thread(node(&engine, 4)).unwrap(), None);

    assert_eq!(engine.next_subthread(node(&engine, 2)).unwrap(), Some(node(&engine, 3)));
    assert_eq!(engine.previous_subthread(node(&engine, 3)).unwrap(), Some(node(&engine, 1)));
}

#[test]
fn subthread_moves_stop_at_thread_edges() {
    let index = mailbox();
    let engine = built_engine(test_config(), &index);

    // Last and first subthreads of t1 have nowhere to go inside t1
    assert_eq!(engine.next_subthread(node(&engine, 3)).unwrap(), None);
    assert_eq!(engine.previous_subthread(node(&engine, 1)).unwrap(), None);
    assert_eq!(engine.previous_subthread(node(&engine, 2)).unwrap(), None);
    assert_eq!(engine.next_subthread(node(&engine, 5)).unwrap(), None);
    assert_eq!(engine.previous_subthread(node(&engine, 5)).unwrap(), None);
}

#[test]
fn thread_move_skips_fully_limited_threads() {
    let mut index = mailbox();
    index.push(message("t3", &[], 6));
    index.set_visible(RecordId(4), false).unwrap();
    index.set_visible(RecordId(5), false).unwrap();
    let engine = built_engine(test_config(), &index);

    assert_eq!(engine.next_thread(node(&engine, 0)).unwrap(), Some(node(&engine, 6)));
}

#[test]
fn collapse_hides_descendants_and_counts_them() {
    let index = mailbox();
    let mut engine = built_engine(test_config(), &index);
    let t1 = node(&engine, 0);
    let t1a = node(&engine, 1);

    assert_eq!(
        engine.traverse(&index, t1a, TraverseOp::Collapse).unwrap(),
        TraverseOutcome::Changed(true)
    );
    assert_eq!(engine.hidden_count(&index, t1a).unwrap(), 1);
    assert_eq!(display_ids(&engine, &index), vec!["t1", "t1.a", "t1.b", "t2", "t2.a"]);

    engine.collapse(&index, t1).unwrap();
    assert_eq!(
        engine.traverse(&index, t1, TraverseOp::GetHidden).unwrap(),
        TraverseOutcome::Hidden(3)
    );
    assert_eq!(display_ids(&engine, &index), vec!["t1", "t2", "t2.a"]);

    // Expanding the root leaves the inner collapse in place
    engine.uncollapse(&index, t1).unwrap();
    assert_eq!(engine.hidden_count(&index, t1).unwrap(), 1);
    assert_eq!(engine.virtual_len(), 5);

    assert_eq!(
        engine.traverse(&index, t1a, TraverseOp::Uncollapse).unwrap(),
        TraverseOutcome::Changed(true)
    );
    assert_eq!(engine.virtual_len(), 6);
}

#[test]
fn collapse_all_and_expand_all() {
    let index = mailbox();
    let mut engine = built_engine(test_config(), &index);

    assert_eq!(engine.collapse_all(&index, true), 2);
    assert_eq!(display_ids(&engine, &index), vec!["t1", "t2"]);
    assert_eq!(engine.collapse_state().len(), 2);

    assert_eq!(engine.collapse_all(&index, false), 2);
    assert_eq!(engine.virtual_len(), 6);
    assert!(engine.collapse_state().is_empty());
}

#[test]
fn collapse_refused_for_unread_when_configured() {
    let mut index = mailbox();
    index.set_flag(RecordId(5), MessageFlag::Read, false).unwrap();
    let mut engine = built_engine(test_config().with_collapse_unread(false), &index);

    assert_eq!(engine.collapse_all(&index, true), 1);
    let t2 = node(&engine, 4);
    assert_eq!(
        engine.traverse(&index, t2, TraverseOp::Collapse).unwrap(),
        TraverseOutcome::Changed(false)
    );
    assert_eq!(display_ids(&engine, &index), vec!["t1", "t2", "t2.a"]);
}

#[test]
fn next_unread_wraps_within_subtree() {
    let mut index = mailbox();
    index.set_flag(RecordId(1), MessageFlag::Read, false).unwrap();
    index.set_flag(RecordId(5), MessageFlag::Read, false).unwrap();
    let mut engine = built_engine(test_config(), &index);

    // t1.a is unread but sits outside t1.b's subtree
    let t1b = node(&engine, 3);
    assert_eq!(
        engine.traverse(&index, t1b, TraverseOp::NextUnread).unwrap(),
        TraverseOutcome::Next(None)
    );
    assert_eq!(engine.next_unread(&index, node(&engine, 2)).unwrap(), None);
    assert_eq!(engine.next_unread(&index, node(&engine, 0)).unwrap(), Some(node(&engine, 1)));
    assert_eq!(engine.next_unread(&index, node(&engine, 1)).unwrap(), Some(node(&engine, 1)));
    assert_eq!(engine.next_unread(&index, node(&engine, 4)).unwrap(), Some(node(&engine, 5)));
    assert_eq!(
        engine.traverse(&index, node(&engine, 0), TraverseOp::ContainsFlagged).unwrap(),
        TraverseOutcome::Contains(false)
    );
}

#[test]
fn next_unread_under_collapsed_thread_lands_on_a_row() {
    let mut index = mailbox();
    index.set_flag(RecordId(2), MessageFlag::Read, false).unwrap();
    let mut engine = built_engine(test_config(), &index);

    let t1 = node(&engine, 0);
    engine.collapse(&index, t1).unwrap();
    assert_eq!(engine.node(node(&engine, 2)).unwrap().virtual_index(), None);

    let target = engine.next_unread(&index, t1).unwrap().unwrap();
    assert_eq!(target, t1);
    assert!(engine.node(target).unwrap().virtual_index().is_some());
}

#[test]
fn parent_and_root_lookup() {
    let mut index = mailbox();
    let engine = built_engine(test_config(), &index);
    let leaf = node(&engine, 2);

    assert_eq!(engine.parent_message(&index, leaf, false).unwrap(), node(&engine, 1));
    assert_eq!(engine.parent_message(&index, leaf, true).unwrap(), node(&engine, 0));
    assert!(matches!(
        engine.parent_message(&index, node(&engine, 0), false),
        Err(ThreadError::NoParent)
    ));

    index.set_visible(RecordId(0), false).unwrap();
    assert!(matches!(
        engine.parent_message(&index, leaf, true),
        Err(ThreadError::ParentNotVisible)
    ));
}

#[test]
fn thread_counts() {
    let index = mailbox();
    let engine = built_engine(test_config(), &index);

    assert_eq!(engine.messages_in_thread(node(&engine, 3), ThreadCount::Total).unwrap(), 4);
    assert_eq!(engine.messages_in_thread(node(&engine, 3), ThreadCount::Position).unwrap(), 4);
    assert_eq!(engine.messages_in_thread(node(&engine, 5), ThreadCount::Total).unwrap(), 2);
}

#[test]
fn thread_wide_flags() {
    let mut index = mailbox();
    let engine = built_engine(test_config(), &index);

    let changed = engine
        .set_thread_flag(&mut index, node(&engine, 2), MessageFlag::Read, false, false)
        .unwrap();
    assert_eq!(changed, 4);
    assert!(engine.contains_unread(&index, node(&engine, 0)).unwrap());
    assert!(!engine.contains_unread(&index, node(&engine, 4)).unwrap());

    let changed = engine
        .set_thread_flag(&mut index, node(&engine, 1), MessageFlag::Flagged, true, true)
        .unwrap();
    assert_eq!(changed, 2);
    assert!(engine.contains_flagged(&index, node(&engine, 0)).unwrap());
    assert!(!index.get(RecordId(3)).unwrap().flags.flagged);
}

#[test]
fn handles_survive_sort_but_not_rebuild() {
    let index = mailbox();
    let mut engine = built_engine(test_config(), &index);
    let leaf = node(&engine, 2);

    engine.set_sort("reverse-date".parse().unwrap());
    engine.sort(&index, false);
    assert_eq!(display_ids(&engine, &index)[0], "t2");
    assert!(engine.node(leaf).is_ok());

    engine.build(&index);
    assert!(matches!(
        engine.next_thread(leaf),
        Err(ThreadError::StaleHandle { .. })
    ));
}

#[test]
fn link_and_break_threads() {
    let mut index = mailbox();
    let mut engine = built_engine(test_config(), &index);

    // Move t2 under t1.b
    index.link_threads(RecordId(3), &[RecordId(4)]).unwrap();
    engine.build(&index);
    assert_eq!(engine.roots().len(), 1);
    assert_eq!(
        engine.messages_in_thread(node(&engine, 5), ThreadCount::Total).unwrap(),
        6
    );

    // Split t1.a off again
    index.break_thread(RecordId(1)).unwrap();
    engine.build(&index);
    assert_eq!(engine.roots().len(), 2);
    let t1a = node(&engine, 1);
    assert_eq!(engine.node(t1a).unwrap().parent(), None);
    assert_eq!(
        engine.messages_in_thread(t1a, ThreadCount::Total).unwrap(),
        2
    );
}
