//! Tests for the Write-Ahead Log
//!
//! These tests verify:
//! - Appending commit records and LSN sequencing
//! - Sync strategies (EveryCommit, EveryNCommits)
//! - Reading records back, including torn-tail detection
//! - Recovery semantics: strict recover vs. best-effort salvage
//! - The compaction rewrite

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use vellum::config::SyncStrategy;
use vellum::wal::{Mutation, NextRecord, Record, WalReader, WalRecovery, WalWriter, HEADER_SIZE};

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_wal() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let wal_path = temp_dir.path().join("test.wal");
    (temp_dir, wal_path)
}

fn put(key: &str, value: &str) -> Mutation {
    Mutation::Put {
        key: key.as_bytes().to_vec(),
        value: value.as_bytes().to_vec(),
    }
}

/// Write `count` single-put commits through the writer (well-formed log)
fn write_commits(path: &Path, count: usize) {
    let mut writer = WalWriter::open(path, SyncStrategy::EveryCommit, 1).unwrap();
    for i in 0..count {
        writer
            .append(&[put(&format!("key{}", i), &format!("value{}", i))])
            .unwrap();
    }
}

/// Raw frame bytes for one record (for crafting damaged logs by hand)
fn raw_frame(lsn: u64, mutations: Vec<Mutation>) -> Vec<u8> {
    Record::new(lsn, mutations).encode().unwrap()
}

fn write_raw(path: &Path, chunks: &[&[u8]]) {
    let mut file = File::create(path).unwrap();
    for chunk in chunks {
        file.write_all(chunk).unwrap();
    }
    file.sync_all().unwrap();
}

// =============================================================================
// Basic Writing Tests
// =============================================================================

#[test]
fn test_append_assigns_sequential_lsns() {
    let (_temp, wal_path) = setup_temp_wal();

    let mut writer = WalWriter::open(&wal_path, SyncStrategy::EveryCommit, 1).unwrap();

    let lsn1 = writer.append(&[put("a", "1")]).unwrap();
    let lsn2 = writer.append(&[put("b", "2")]).unwrap();
    let lsn3 = writer.append(&[Mutation::Delete { key: b"a".to_vec() }]).unwrap();

    assert_eq!(lsn1, 1);
    assert_eq!(lsn2, 2);
    assert_eq!(lsn3, 3);
    assert_eq!(writer.next_lsn(), 4);
}

#[test]
fn test_append_starts_at_given_lsn() {
    let (_temp, wal_path) = setup_temp_wal();

    // A writer opened after recovery continues from where the log left off
    let mut writer = WalWriter::open(&wal_path, SyncStrategy::EveryCommit, 42).unwrap();
    assert_eq!(writer.append(&[put("k", "v")]).unwrap(), 42);
    assert_eq!(writer.next_lsn(), 43);
}

#[test]
fn test_one_commit_is_one_record() {
    let (_temp, wal_path) = setup_temp_wal();

    {
        let mut writer = WalWriter::open(&wal_path, SyncStrategy::EveryCommit, 1).unwrap();
        writer
            .append(&[put("a", "1"), put("b", "2"), Mutation::Delete { key: b"a".to_vec() }])
            .unwrap();
    }

    let mut reader = WalReader::open(&wal_path).unwrap();
    match reader.next_record().unwrap() {
        NextRecord::Record(record) => {
            assert_eq!(record.lsn, 1);
            assert_eq!(record.mutations.len(), 3);
            assert!(matches!(record.mutations[2], Mutation::Delete { .. }));
        }
        other => panic!("expected a record, got {:?}", other),
    }
    assert!(matches!(reader.next_record().unwrap(), NextRecord::End));
}

#[test]
fn test_len_bytes_tracks_file() {
    let (_temp, wal_path) = setup_temp_wal();

    let mut writer = WalWriter::open(&wal_path, SyncStrategy::EveryCommit, 1).unwrap();
    writer.append(&[put("key", "value")]).unwrap();
    writer.append(&[put("key2", "value2")]).unwrap();

    let on_disk = std::fs::metadata(&wal_path).unwrap().len();
    assert_eq!(writer.len_bytes(), on_disk);
}

#[test]
#[cfg(target_os = "linux")]
fn test_failed_append_advances_nothing_and_goes_offline() {
    use vellum::Error;

    // /dev/full accepts the open but fails every write with ENOSPC, and it
    // rejects ftruncate too, so the rollback itself cannot succeed
    let mut writer =
        WalWriter::open(Path::new("/dev/full"), SyncStrategy::EveryCommit, 1).unwrap();

    let err = writer.append(&[put("k", "v")]).unwrap_err();
    assert!(matches!(err, Error::Io(_)));
    assert_eq!(writer.next_lsn(), 1);
    assert_eq!(writer.len_bytes(), 0);
    assert_eq!(writer.unsynced_commits(), 0);

    // With the rollback impossible, the writer refuses to append after the
    // leftover bytes rather than bury them mid-log
    let err = writer.append(&[put("k2", "v2")]).unwrap_err();
    assert!(matches!(err, Error::Storage(_)));
}

// =============================================================================
// Sync Strategy Tests
// =============================================================================

#[test]
fn test_sync_every_commit() {
    let (_temp, wal_path) = setup_temp_wal();

    let mut writer = WalWriter::open(&wal_path, SyncStrategy::EveryCommit, 1).unwrap();

    writer.append(&[put("k1", "v1")]).unwrap();
    assert_eq!(writer.unsynced_commits(), 0);

    writer.append(&[put("k2", "v2")]).unwrap();
    assert_eq!(writer.unsynced_commits(), 0);
}

#[test]
fn test_sync_every_n_commits() {
    let (_temp, wal_path) = setup_temp_wal();

    let mut writer =
        WalWriter::open(&wal_path, SyncStrategy::EveryNCommits { count: 5 }, 1).unwrap();

    // 4 commits stay buffered
    for i in 0..4 {
        writer.append(&[put(&format!("k{}", i), "v")]).unwrap();
    }
    assert_eq!(writer.unsynced_commits(), 4);

    // The 5th triggers a sync
    writer.append(&[put("k5", "v")]).unwrap();
    assert_eq!(writer.unsynced_commits(), 0);

    writer.append(&[put("k6", "v")]).unwrap();
    assert_eq!(writer.unsynced_commits(), 1);
}

#[test]
fn test_manual_sync() {
    let (_temp, wal_path) = setup_temp_wal();

    let mut writer =
        WalWriter::open(&wal_path, SyncStrategy::EveryNCommits { count: 100 }, 1).unwrap();

    for i in 0..10 {
        writer.append(&[put(&format!("k{}", i), "v")]).unwrap();
    }
    assert_eq!(writer.unsynced_commits(), 10);

    writer.sync().unwrap();
    assert_eq!(writer.unsynced_commits(), 0);
}

// =============================================================================
// Reader Tests
// =============================================================================

#[test]
fn test_reader_empty_file_is_end() {
    let (_temp, wal_path) = setup_temp_wal();
    File::create(&wal_path).unwrap();

    let mut reader = WalReader::open(&wal_path).unwrap();
    assert!(matches!(reader.next_record().unwrap(), NextRecord::End));
}

#[test]
fn test_reader_reports_torn_header() {
    let (_temp, wal_path) = setup_temp_wal();

    let good = raw_frame(1, vec![put("k", "v")]);
    write_raw(&wal_path, &[&good, &[0u8; 8]]); // 8 bytes < HEADER_SIZE

    let mut reader = WalReader::open(&wal_path).unwrap();
    assert!(matches!(reader.next_record().unwrap(), NextRecord::Record(_)));
    match reader.next_record().unwrap() {
        NextRecord::Torn { offset } => assert_eq!(offset, good.len() as u64),
        other => panic!("expected torn tail, got {:?}", other),
    }
}

#[test]
fn test_reader_reports_torn_payload() {
    let (_temp, wal_path) = setup_temp_wal();

    let good = raw_frame(1, vec![put("k", "v")]);
    let mut partial = raw_frame(2, vec![put("k2", "v2")]);
    partial.truncate(HEADER_SIZE + 4); // complete header, payload cut short

    write_raw(&wal_path, &[&good, &partial]);

    let mut reader = WalReader::open(&wal_path).unwrap();
    assert!(matches!(reader.next_record().unwrap(), NextRecord::Record(_)));
    assert!(matches!(
        reader.next_record().unwrap(),
        NextRecord::Torn { .. }
    ));
}

#[test]
fn test_reader_rejects_flipped_byte_mid_log() {
    let (_temp, wal_path) = setup_temp_wal();

    let mut bad = raw_frame(1, vec![put("k", "v")]);
    *bad.last_mut().unwrap() ^= 0xFF;
    let after = raw_frame(2, vec![put("k2", "v2")]);
    write_raw(&wal_path, &[&bad, &after]);

    // Readable data after the damage rules out a torn tail
    let mut reader = WalReader::open(&wal_path).unwrap();
    let err = reader.next_record().unwrap_err();
    assert!(err.is_corruption());
}

#[test]
fn test_reader_reports_flipped_byte_at_tail_as_torn() {
    let (_temp, wal_path) = setup_temp_wal();

    let good = raw_frame(1, vec![put("k", "v")]);
    let mut bad = raw_frame(2, vec![put("k2", "v2")]);
    *bad.last_mut().unwrap() ^= 0xFF;
    write_raw(&wal_path, &[&good, &bad]);

    // A final frame that fails its checksum is indistinguishable from an
    // interrupted append, so it reads as a torn tail, not corruption
    let mut reader = WalReader::open(&wal_path).unwrap();
    assert!(matches!(reader.next_record().unwrap(), NextRecord::Record(_)));
    match reader.next_record().unwrap() {
        NextRecord::Torn { offset } => assert_eq!(offset, good.len() as u64),
        other => panic!("expected torn tail, got {:?}", other),
    }
}

#[test]
fn test_reader_treats_absurd_length_at_tail_as_torn() {
    let (_temp, wal_path) = setup_temp_wal();

    let good = raw_frame(1, vec![put("k", "v")]);
    // Hand-built header claiming a payload far beyond the cap. The claim
    // swallows the rest of the file, so there is nothing left to verify
    // and the frame counts as the tail.
    let mut header = Vec::new();
    header.extend_from_slice(&2u64.to_le_bytes());
    header.extend_from_slice(&0u32.to_le_bytes());
    header.extend_from_slice(&u32::MAX.to_le_bytes());
    write_raw(&wal_path, &[&good, &header]);

    let mut reader = WalReader::open(&wal_path).unwrap();
    assert!(matches!(reader.next_record().unwrap(), NextRecord::Record(_)));
    assert!(matches!(
        reader.next_record().unwrap(),
        NextRecord::Torn { .. }
    ));
}

// =============================================================================
// Recovery Tests: Clean Logs
// =============================================================================

#[test]
fn test_recover_empty_file() {
    let (_temp, wal_path) = setup_temp_wal();
    File::create(&wal_path).unwrap();

    let (records, report) = WalRecovery::recover(&wal_path).unwrap();

    assert_eq!(records.len(), 0);
    assert_eq!(report.records_recovered, 0);
    assert_eq!(report.last_lsn, 0);
    assert_eq!(report.bytes_dropped, 0);
    assert!(!report.truncated);
}

#[test]
fn test_recover_clean_log() {
    let (_temp, wal_path) = setup_temp_wal();
    write_commits(&wal_path, 10);

    let (records, report) = WalRecovery::recover(&wal_path).unwrap();

    assert_eq!(records.len(), 10);
    assert_eq!(report.records_recovered, 10);
    assert_eq!(report.last_lsn, 10);
    assert!(!report.truncated);

    for (i, record) in records.iter().enumerate() {
        assert_eq!(record.lsn, (i + 1) as u64);
    }
}

// =============================================================================
// Recovery Tests: Torn Tails
// =============================================================================

#[test]
fn test_recover_drops_torn_header() {
    let (_temp, wal_path) = setup_temp_wal();

    let good = raw_frame(1, vec![put("k", "v")]);
    write_raw(&wal_path, &[&good, &[0xAB; 8]]);

    let (records, report) = WalRecovery::recover(&wal_path).unwrap();

    assert_eq!(records.len(), 1);
    assert_eq!(report.last_lsn, 1);
    assert!(report.truncated);
    assert_eq!(report.bytes_dropped, 8);
}

#[test]
fn test_recover_drops_torn_payload() {
    let (_temp, wal_path) = setup_temp_wal();

    let good = raw_frame(1, vec![put("k", "v")]);
    let mut partial = raw_frame(2, vec![put("k2", "v2")]);
    partial.truncate(HEADER_SIZE + 4);
    let partial_len = partial.len() as u64;

    write_raw(&wal_path, &[&good, &partial]);

    let (records, report) = WalRecovery::recover(&wal_path).unwrap();

    assert_eq!(records.len(), 1);
    assert!(report.truncated);
    assert_eq!(report.bytes_dropped, partial_len);
}

// =============================================================================
// Recovery Tests: Corruption Is an Error, Salvage Is Not
// =============================================================================

#[test]
fn test_recover_fails_on_corrupt_frame() {
    let (_temp, wal_path) = setup_temp_wal();

    let good = raw_frame(1, vec![put("k1", "v1")]);
    let mut bad = raw_frame(2, vec![put("k2", "v2")]);
    *bad.last_mut().unwrap() ^= 0xFF;
    let after = raw_frame(3, vec![put("k3", "v3")]);
    write_raw(&wal_path, &[&good, &bad, &after]);

    let err = WalRecovery::recover(&wal_path).unwrap_err();
    assert!(err.is_corruption());
}

#[test]
fn test_recover_drops_damaged_tail_record() {
    let (_temp, wal_path) = setup_temp_wal();

    let good = raw_frame(1, vec![put("k1", "v1")]);
    let mut bad = raw_frame(2, vec![put("k2", "v2")]);
    *bad.last_mut().unwrap() ^= 0xFF;
    let bad_len = bad.len() as u64;
    write_raw(&wal_path, &[&good, &bad]);

    // Damage confined to the final record is recovered from, not escalated
    let (records, report) = WalRecovery::recover(&wal_path).unwrap();

    assert_eq!(records.len(), 1);
    assert_eq!(report.last_lsn, 1);
    assert!(report.truncated);
    assert_eq!(report.bytes_dropped, bad_len);
}

#[test]
fn test_recover_fails_on_lsn_going_backward() {
    let (_temp, wal_path) = setup_temp_wal();

    let first = raw_frame(5, vec![put("a", "1")]);
    let second = raw_frame(3, vec![put("b", "2")]);
    write_raw(&wal_path, &[&first, &second]);

    let err = WalRecovery::recover(&wal_path).unwrap_err();
    assert!(err.is_corruption());
}

#[test]
fn test_salvage_keeps_prefix_before_damage() {
    let (_temp, wal_path) = setup_temp_wal();

    let good = raw_frame(1, vec![put("k1", "v1")]);
    let mut bad = raw_frame(2, vec![put("k2", "v2")]);
    *bad.last_mut().unwrap() ^= 0xFF;
    let after = raw_frame(3, vec![put("k3", "v3")]);
    let dropped = (bad.len() + after.len()) as u64;

    write_raw(&wal_path, &[&good, &bad, &after]);

    let (records, report) = WalRecovery::salvage(&wal_path).unwrap();

    // Everything from the first bad frame onward is gone, including the
    // valid frame behind it
    assert_eq!(records.len(), 1);
    assert_eq!(report.last_lsn, 1);
    assert!(report.truncated);
    assert_eq!(report.bytes_dropped, dropped);
}

#[test]
fn test_salvage_stops_at_repeated_lsn() {
    let (_temp, wal_path) = setup_temp_wal();

    let first = raw_frame(1, vec![put("a", "1")]);
    let dup = raw_frame(1, vec![put("b", "2")]);
    write_raw(&wal_path, &[&first, &dup]);

    let (records, report) = WalRecovery::salvage(&wal_path).unwrap();

    assert_eq!(records.len(), 1);
    assert!(report.truncated);
}

#[test]
fn test_salvage_clean_log_is_lossless() {
    let (_temp, wal_path) = setup_temp_wal();
    write_commits(&wal_path, 5);

    let (records, report) = WalRecovery::salvage(&wal_path).unwrap();

    assert_eq!(records.len(), 5);
    assert!(!report.truncated);
    assert_eq!(report.bytes_dropped, 0);
}

// =============================================================================
// Compaction Rewrite Tests
// =============================================================================

#[test]
fn test_rewrite_compacted_collapses_to_one_record() {
    let (_temp, wal_path) = setup_temp_wal();
    write_commits(&wal_path, 20);

    let mut live = std::collections::BTreeMap::new();
    live.insert(
        bytes::Bytes::from_static(b"alpha"),
        bytes::Bytes::from_static(b"1"),
    );
    live.insert(
        bytes::Bytes::from_static(b"beta"),
        bytes::Bytes::from_static(b"2"),
    );

    let writer = WalWriter::rewrite_compacted(&wal_path, SyncStrategy::EveryCommit, 21, &live).unwrap();
    assert_eq!(writer.next_lsn(), 22); // the rewrite consumed one LSN
    drop(writer);

    let (records, report) = WalRecovery::recover(&wal_path).unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].lsn, 21);
    assert_eq!(records[0].mutations.len(), 2);
    assert!(!report.truncated);
}

#[test]
fn test_rewrite_compacted_empty_map_empty_log() {
    let (_temp, wal_path) = setup_temp_wal();
    write_commits(&wal_path, 5);

    let live = std::collections::BTreeMap::new();
    let writer = WalWriter::rewrite_compacted(&wal_path, SyncStrategy::EveryCommit, 6, &live).unwrap();
    assert_eq!(writer.next_lsn(), 6); // nothing written, no LSN consumed
    assert_eq!(writer.len_bytes(), 0);
    drop(writer);

    let (records, _report) = WalRecovery::recover(&wal_path).unwrap();
    assert!(records.is_empty());
}

#[test]
fn test_rewrite_keeps_appends_in_the_renamed_file() {
    let (_temp, wal_path) = setup_temp_wal();
    write_commits(&wal_path, 10);

    let mut live = std::collections::BTreeMap::new();
    live.insert(
        bytes::Bytes::from_static(b"kept"),
        bytes::Bytes::from_static(b"1"),
    );

    // The writer handed back by the rewrite must be appending to the file
    // now at `path`, not to the unlinked pre-rewrite inode
    let mut writer =
        WalWriter::rewrite_compacted(&wal_path, SyncStrategy::EveryCommit, 11, &live).unwrap();
    let lsn = writer.append(&[put("after", "2")]).unwrap();
    assert_eq!(lsn, 12);
    drop(writer);

    let (records, report) = WalRecovery::recover(&wal_path).unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].lsn, 11);
    assert_eq!(records[1].lsn, 12);
    assert!(!report.truncated);
}

#[test]
fn test_rewrite_leaves_no_temp_file() {
    let (temp, wal_path) = setup_temp_wal();
    write_commits(&wal_path, 3);

    let live = std::collections::BTreeMap::new();
    WalWriter::rewrite_compacted(&wal_path, SyncStrategy::EveryCommit, 4, &live).unwrap();

    let leftovers: Vec<_> = std::fs::read_dir(temp.path())
        .unwrap()
        .map(|e| e.unwrap().file_name())
        .filter(|name| name.to_string_lossy().ends_with(".tmp"))
        .collect();
    assert!(leftovers.is_empty(), "temp file left behind: {:?}", leftovers);
}

// =============================================================================
// Append After Recovery
// =============================================================================

#[test]
fn test_append_resumes_after_recovery() {
    let (_temp, wal_path) = setup_temp_wal();
    write_commits(&wal_path, 3);

    let (_, report) = WalRecovery::recover(&wal_path).unwrap();
    let mut writer =
        WalWriter::open(&wal_path, SyncStrategy::EveryCommit, report.last_lsn + 1).unwrap();
    let lsn = writer.append(&[put("later", "v")]).unwrap();
    assert_eq!(lsn, 4);
    drop(writer);

    let (records, report) = WalRecovery::recover(&wal_path).unwrap();
    assert_eq!(records.len(), 4);
    assert_eq!(report.last_lsn, 4);
}
