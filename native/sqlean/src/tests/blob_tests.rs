//! Tests for blob.rs - Incremental blob reads, writes and seeking

// Allow unwrap() in tests for cleaner test code
#![allow(clippy::unwrap_used)]

use super::test_utils::{autocommit_conn, memory_conn};
use crate::{Connection, Error, ErrorKind, TransactionState, Value};
use std::io::{Read, Seek, SeekFrom, Write};

const PAYLOAD: &[u8] = b"0123456789abcdef";

fn blob_conn() -> Connection {
    let conn = memory_conn();
    conn.execute("CREATE TABLE files (name TEXT, data BLOB)", ()).unwrap();
    conn.execute(
        "INSERT INTO files VALUES ('one', ?)",
        crate::params![PAYLOAD.to_vec()],
    )
    .unwrap();
    conn.commit().unwrap();
    conn
}

fn stored(conn: &Connection) -> Vec<u8> {
    let row = conn
        .execute("SELECT data FROM files WHERE rowid = 1", ())
        .unwrap()
        .fetch_one()
        .unwrap()
        .unwrap();
    row[0].as_blob().unwrap().to_vec()
}

// ============================================================================
// OPEN
// ============================================================================

#[test]
fn test_open_reports_length() {
    let conn = blob_conn();
    let blob = conn.blob_open("files", "data", 1, true).unwrap();
    assert_eq!(blob.len(), PAYLOAD.len() as u64);
    assert!(!blob.is_empty());
    assert_eq!(blob.tell(), 0);
    assert!(!blob.is_closed());
}

#[test]
fn test_open_missing_row() {
    let conn = blob_conn();
    let err = conn.blob_open("files", "data", 42, true).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Sql);
    assert!(err.to_string().contains("no such rowid: 42"));
}

#[test]
fn test_open_non_blob_value() {
    let conn = blob_conn();
    let err = conn.blob_open("files", "name", 1, true).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Sql);
    assert!(err.to_string().contains("cannot open value of type text"));
}

#[test]
fn test_open_missing_column_or_table() {
    let conn = blob_conn();
    assert_eq!(
        conn.blob_open("files", "nope", 1, true).unwrap_err().kind(),
        ErrorKind::Sql
    );
    assert_eq!(
        conn.blob_open("nope", "data", 1, true).unwrap_err().kind(),
        ErrorKind::Sql
    );
}

#[test]
fn test_open_null_value_is_empty() {
    let conn = memory_conn();
    conn.execute("CREATE TABLE files (data BLOB)", ()).unwrap();
    conn.execute("INSERT INTO files VALUES (NULL)", ()).unwrap();
    let mut blob = conn.blob_open("files", "data", 1, true).unwrap();
    assert!(blob.is_empty());
    assert!(blob.read_chunk(10).unwrap().is_empty());
}

// ============================================================================
// READ AND SEEK
// ============================================================================

#[test]
fn test_sequential_reads_advance() {
    let conn = blob_conn();
    let mut blob = conn.blob_open("files", "data", 1, true).unwrap();

    assert_eq!(&blob.read_chunk(4).unwrap()[..], b"0123");
    assert_eq!(blob.tell(), 4);
    assert_eq!(&blob.read_chunk(4).unwrap()[..], b"4567");
    // A read past the end is clipped.
    assert_eq!(&blob.read_chunk(100).unwrap()[..], b"89abcdef");
    assert_eq!(blob.tell(), 16);
    assert!(blob.read_chunk(1).unwrap().is_empty());
}

#[test]
fn test_seek_whences() {
    let conn = blob_conn();
    let mut blob = conn.blob_open("files", "data", 1, true).unwrap();

    assert_eq!(blob.seek(SeekFrom::Start(10)).unwrap(), 10);
    assert_eq!(&blob.read_chunk(2).unwrap()[..], b"ab");
    assert_eq!(blob.seek(SeekFrom::Current(-4)).unwrap(), 8);
    assert_eq!(&blob.read_chunk(1).unwrap()[..], b"8");
    assert_eq!(blob.seek(SeekFrom::End(-1)).unwrap(), 15);
    assert_eq!(&blob.read_chunk(5).unwrap()[..], b"f");
}

#[test]
fn test_seek_before_start_is_rejected() {
    let conn = blob_conn();
    let mut blob = conn.blob_open("files", "data", 1, true).unwrap();
    blob.seek(SeekFrom::Start(3)).unwrap();

    let err = blob.seek(SeekFrom::Current(-4)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Sequencing);
    // Position is unchanged after a rejected seek.
    assert_eq!(blob.tell(), 3);
    assert!(blob.seek(SeekFrom::End(-17)).is_err());
}

#[test]
fn test_seek_past_end_then_read_is_empty() {
    let conn = blob_conn();
    let mut blob = conn.blob_open("files", "data", 1, true).unwrap();
    assert_eq!(blob.seek(SeekFrom::End(4)).unwrap(), 20);
    assert!(blob.read_chunk(4).unwrap().is_empty());
}

#[test]
fn test_io_read_and_seek_traits() {
    let conn = blob_conn();
    let mut blob = conn.blob_open("files", "data", 1, true).unwrap();

    let mut all = Vec::new();
    blob.read_to_end(&mut all).unwrap();
    assert_eq!(all, PAYLOAD);

    Seek::seek(&mut blob, SeekFrom::Start(12)).unwrap();
    let mut buf = [0_u8; 8];
    let n = blob.read(&mut buf).unwrap();
    assert_eq!(&buf[..n], b"cdef");
}

// ============================================================================
// WRITE
// ============================================================================

#[test]
fn test_write_in_place() {
    let conn = blob_conn();
    let mut blob = conn.blob_open("files", "data", 1, false).unwrap();
    blob.seek(SeekFrom::Start(2)).unwrap();
    blob.write_chunk(b"XY").unwrap();
    assert_eq!(blob.tell(), 4);
    blob.write_chunk(b"Z").unwrap();

    blob.seek(SeekFrom::Start(0)).unwrap();
    assert_eq!(&blob.read_chunk(6).unwrap()[..], b"01XYZ5");
    blob.close().unwrap();

    assert_eq!(stored(&conn), b"01XYZ56789abcdef");
    // Length never changes.
    assert_eq!(stored(&conn).len(), PAYLOAD.len());
}

#[test]
fn test_write_whole_blob_and_tail() {
    let conn = blob_conn();
    let mut blob = conn.blob_open("files", "data", 1, false).unwrap();
    blob.write_chunk(b"ABCDEFGHIJKLMNOP").unwrap();
    blob.close().unwrap();
    assert_eq!(stored(&conn), b"ABCDEFGHIJKLMNOP");

    let mut blob = conn.blob_open("files", "data", 1, false).unwrap();
    blob.seek(SeekFrom::End(-1)).unwrap();
    blob.write_chunk(b"!").unwrap();
    blob.close().unwrap();
    assert_eq!(stored(&conn), b"ABCDEFGHIJKLMNO!");
}

#[test]
fn test_write_preserves_zero_bytes() {
    let conn = memory_conn();
    conn.execute("CREATE TABLE files (data BLOB)", ()).unwrap();
    conn.execute("INSERT INTO files VALUES (zeroblob(6))", ()).unwrap();

    let mut blob = conn.blob_open("files", "data", 1, false).unwrap();
    blob.seek(SeekFrom::Start(1)).unwrap();
    blob.write_chunk(&[0xff, 0x00, 0x7f]).unwrap();
    blob.close().unwrap();

    let row = conn.execute("SELECT data FROM files", ()).unwrap().fetch_one().unwrap().unwrap();
    assert_eq!(row[0], Value::Blob(vec![0, 0xff, 0, 0x7f, 0, 0]));
}

#[test]
fn test_write_past_end_is_rejected() {
    let conn = blob_conn();
    let mut blob = conn.blob_open("files", "data", 1, false).unwrap();
    blob.seek(SeekFrom::Start(14)).unwrap();

    let err = blob.write_chunk(b"xyz").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Sql);
    assert_eq!(blob.tell(), 14);
    blob.close().unwrap();
    assert_eq!(stored(&conn), PAYLOAD);
}

#[test]
fn test_write_to_read_only_blob() {
    let conn = blob_conn();
    let mut blob = conn.blob_open("files", "data", 1, true).unwrap();
    match blob.write_chunk(b"no").unwrap_err() {
        Error::Sql { code, .. } => assert_eq!(code, Some(crate::constants::SQLITE_READONLY)),
        other => panic!("expected an SQL error, got {other:?}"),
    }
}

#[test]
fn test_write_opens_implicit_transaction() {
    let conn = blob_conn();
    assert_eq!(conn.transaction_state().unwrap(), TransactionState::Idle);

    let mut blob = conn.blob_open("files", "data", 1, false).unwrap();
    blob.write_chunk(b"__").unwrap();
    assert_eq!(conn.transaction_state().unwrap(), TransactionState::Active);

    // Closing then rolling back undoes the write.
    blob.close().unwrap();
    conn.rollback().unwrap();
    assert_eq!(stored(&conn), PAYLOAD);
}

#[test]
fn test_write_in_autocommit_mode_is_immediate() {
    let conn = autocommit_conn();
    conn.execute("CREATE TABLE files (data BLOB)", ()).unwrap();
    conn.execute("INSERT INTO files VALUES (x'000000')", ()).unwrap();

    let mut blob = conn.blob_open("files", "data", 1, false).unwrap();
    blob.write_all(&[1, 2, 3]).unwrap();
    blob.flush().unwrap();
    assert_eq!(conn.transaction_state().unwrap(), TransactionState::Idle);
    conn.rollback().unwrap();

    let row = conn.execute("SELECT data FROM files", ()).unwrap().fetch_one().unwrap().unwrap();
    assert_eq!(row[0], Value::Blob(vec![1, 2, 3]));
}

// ============================================================================
// INVALIDATION
// ============================================================================

#[test]
fn test_close_invalidates_handle() {
    let conn = blob_conn();
    let mut blob = conn.blob_open("files", "data", 1, true).unwrap();
    blob.close().unwrap();
    assert!(blob.is_closed());

    assert_eq!(blob.read_chunk(1).unwrap_err().kind(), ErrorKind::UseAfterClose);
    assert_eq!(
        blob.seek(SeekFrom::Start(0)).unwrap_err().kind(),
        ErrorKind::UseAfterClose
    );
    // Closing twice does nothing.
    blob.close().unwrap();
}

#[test]
fn test_rollback_invalidates_open_blobs() {
    let conn = blob_conn();
    let mut blob = conn.blob_open("files", "data", 1, false).unwrap();
    blob.write_chunk(b"?").unwrap();
    conn.rollback().unwrap();

    assert!(blob.is_closed());
    assert_eq!(blob.write_chunk(b"?").unwrap_err().kind(), ErrorKind::UseAfterClose);
    assert_eq!(stored(&conn), PAYLOAD);
}

#[test]
fn test_dropped_blob_releases_commit() {
    let conn = blob_conn();
    {
        let mut blob = conn.blob_open("files", "data", 1, false).unwrap();
        blob.write_chunk(b"#").unwrap();
    }
    conn.commit().unwrap();
    assert_eq!(stored(&conn)[0], b'#');
}

#[test]
fn test_quoted_identifiers() {
    let conn = memory_conn();
    conn.execute("CREATE TABLE \"odd \"\"name\" (\"my col\" BLOB)", ()).unwrap();
    conn.execute("INSERT INTO \"odd \"\"name\" VALUES (x'AABB')", ()).unwrap();

    let mut blob = conn.blob_open("odd \"name", "my col", 1, true).unwrap();
    assert_eq!(&blob.read_chunk(2).unwrap()[..], b"\xaa\xbb");
}
