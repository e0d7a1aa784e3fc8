mod common;

use common::Forum;
use forum::boards;
use forum::messages::{self, DeleteOutcome};
use forum::topics;
use forum::Viewer;

#[test]
fn topic_pointers_track_min_and_max_through_creates_and_deletes() {
    let mut f = Forum::new();
    let board = f.board("Chat", None, vec![]);
    let (topic, _) = f.topic(&board, "Pointers", 1, 10);
    let mut ids = vec![];
    for at in [20, 30, 40] {
        ids.push(f.reply(&topic, 1, at).id);
    }
    let t = f.topic_by_id(topic.id);
    assert_eq!((f.time_of(t.first_message_id), f.time_of(t.last_message_id)), (Some(10), Some(40)));

    messages::delete_message(&mut f.conn, &Viewer::new(1, vec![]), ids[2]).unwrap();
    let t = f.topic_by_id(topic.id);
    assert_eq!(f.time_of(t.last_message_id), Some(30));

    messages::delete_message(&mut f.conn, &Viewer::new(1, vec![]), ids[0]).unwrap();
    let t = f.topic_by_id(topic.id);
    assert_eq!((f.time_of(t.first_message_id), f.time_of(t.last_message_id)), (Some(10), Some(30)));
}

#[test]
fn newest_message_in_child_board_propagates_to_parent() {
    let mut f = Forum::new();
    let parent = f.board("Parent", None, vec![]);
    let child = f.board("Child", Some(parent.id), vec![]);
    let (parent_topic, _) = f.topic(&parent, "Up here", 1, 5);
    let (child_topic, child_first) = f.topic(&child, "Down there", 1, 7);
    let newest = f.reply(&child_topic, 2, 9);

    let child = f.board_by_id(child.id);
    let parent = f.board_by_id(parent.id);
    assert_eq!(child.last_message_id, Some(newest.id));
    assert_eq!(parent.last_message_id, Some(newest.id));
    // first pointer is the opener of the topic holding the newest post
    assert_eq!(parent.first_message_id, Some(child_first.id));

    let latest = f.reply(&parent_topic, 2, 11);
    assert_eq!(f.board_by_id(parent.id).last_message_id, Some(latest.id));
    assert_eq!(f.board_by_id(child.id).last_message_id, Some(newest.id));
}

#[test]
fn deleting_board_boundary_messages_recomputes_board() {
    let mut f = Forum::new();
    let board = f.board("Chat", None, vec![]);
    let (older, _) = f.topic(&board, "Older", 1, 1);
    let (topic, _) = f.topic(&board, "Boundary", 1, 2);
    let m3 = f.reply(&topic, 1, 3);
    assert_eq!(f.board_by_id(board.id).last_message_id, Some(m3.id));

    messages::delete_message(&mut f.conn, &Viewer::new(1, vec![]), m3.id).unwrap();
    let b = f.board_by_id(board.id);
    assert_eq!(f.time_of(b.last_message_id), Some(2));

    let outcome = messages::delete_message(&mut f.conn, &Viewer::manager(9), topic.first_message_id.unwrap()).unwrap();
    assert!(matches!(outcome, DeleteOutcome::Topic { .. }));
    let b = f.board_by_id(board.id);
    assert_eq!(b.last_message_id, f.topic_by_id(older.id).last_message_id);
    assert_eq!(f.time_of(b.first_message_id), Some(1));
}

#[test]
fn deleting_last_topic_clears_board_pointers() {
    let mut f = Forum::new();
    let parent = f.board("Parent", None, vec![]);
    let child = f.board("Child", Some(parent.id), vec![]);
    let (topic, _) = f.topic(&child, "Only", 1, 4);
    topics::delete_topic(&mut f.conn, &Viewer::manager(9), topic.id).unwrap();
    for id in [child.id, parent.id] {
        let b = f.board_by_id(id);
        assert_eq!((b.first_message_id, b.last_message_id), (None, None));
    }
}

#[test]
fn backdated_message_does_not_become_last() {
    let mut f = Forum::new();
    let board = f.board("Chat", None, vec![]);
    let (topic, _) = f.topic(&board, "Fixtures", 1, 50);
    let early = f.reply(&topic, 1, 5);
    let t = f.topic_by_id(topic.id);
    assert_eq!(t.first_message_id, Some(early.id));
    assert_eq!(f.time_of(t.last_message_id), Some(50));
    assert_eq!(f.time_of(f.board_by_id(board.id).last_message_id), Some(50));
}

#[test]
fn deleting_child_board_recomputes_parent_from_remaining_boards() {
    let mut f = Forum::new();
    let parent = f.board("Parent", None, vec![]);
    let child = f.board("Child", Some(parent.id), vec![]);
    let (_, parent_first) = f.topic(&parent, "Up here", 1, 2);
    let (_, child_first) = f.topic(&child, "Down there", 1, 3);
    let p = f.board_by_id(parent.id);
    assert_eq!((p.first_message_id, p.last_message_id), (Some(child_first.id), Some(child_first.id)));

    boards::delete_board(&mut f.conn, child.id).unwrap();
    let p = f.board_by_id(parent.id);
    assert_eq!((p.first_message_id, p.last_message_id), (Some(parent_first.id), Some(parent_first.id)));
}

#[test]
fn grandparent_aggregates_only_its_direct_children() {
    let mut f = Forum::new();
    let grand = f.board("Grand", None, vec![]);
    let parent = f.board("Parent", Some(grand.id), vec![]);
    let child = f.board("Child", Some(parent.id), vec![]);
    f.topic(&grand, "Top", 1, 1);
    f.topic(&parent, "Middle", 1, 2);
    let (_, deepest) = f.topic(&child, "Bottom", 1, 3);

    assert_eq!(f.board_by_id(child.id).last_message_id, Some(deepest.id));
    assert_eq!(f.board_by_id(parent.id).last_message_id, Some(deepest.id));
    // the grandchild's post is two levels down
    let g = f.board_by_id(grand.id);
    assert_eq!((f.time_of(g.first_message_id), f.time_of(g.last_message_id)), (Some(2), Some(2)));

    boards::delete_board(&mut f.conn, child.id).unwrap();
    let p = f.board_by_id(parent.id);
    assert_eq!((f.time_of(p.first_message_id), f.time_of(p.last_message_id)), (Some(2), Some(2)));
    let g = f.board_by_id(grand.id);
    assert_eq!(f.time_of(g.last_message_id), Some(2));
}
