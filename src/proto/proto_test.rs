use super::common::ClientCommand;
use super::common::Entry;
use super::replication::AppendEntriesResponse;
use super::replication::ConflictHint;

#[test]
fn test_entry_is_request_of() {
    let entry = Entry::command(
        3,
        2,
        ClientCommand {
            client_id: "c1".to_string(),
            sequence: 7,
            data: b"x".to_vec(),
        },
    );
    assert!(entry.is_request_of("c1", 7));
    assert!(!entry.is_request_of("c1", 8));
    assert!(!entry.is_request_of("c2", 7));
    assert!(!Entry::noop(4, 2).is_request_of("c1", 7));
}

#[test]
fn test_entry_survives_bincode() {
    let entry = Entry::noop(9, 4);
    let bytes = bincode::serialize(&entry).unwrap();
    let decoded: Entry = bincode::deserialize(&bytes).unwrap();
    assert_eq!(decoded, entry);
    assert!(decoded.is_noop());
}

#[test]
fn test_append_response_constructors() {
    let ok = AppendEntriesResponse::success(2, 5, 10);
    assert!(ok.success);
    assert!(!ok.is_conflict());

    let conflict = AppendEntriesResponse::conflict(
        2,
        5,
        ConflictHint {
            conflict_index: 4,
            conflict_term: Some(3),
        },
    );
    assert!(conflict.is_conflict());

    let higher = AppendEntriesResponse::higher_term(2, 9);
    assert!(!higher.success);
    assert!(!higher.is_conflict());
}
