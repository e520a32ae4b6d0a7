use imgflow::BackendError;
use imgflow::backend::{
    BlobStore, DirectorySource, ImageSource, ImageTransform, MemoryQueue, MemoryStore,
    MessageQueue, Passthrough, SqliteBackend, content_type_for, new_blob_id,
};
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

const SHORT: Duration = Duration::from_millis(20);

/// Behavior every queue implementation must share.
fn check_queue_contract(queue: &dyn MessageQueue) {
    assert!(queue.receive(SHORT).unwrap().is_none());
    queue.send("first").unwrap();
    queue.send("second").unwrap();
    assert_eq!(queue.approximate_len().unwrap(), 2);

    let a = queue.receive(SHORT).unwrap().unwrap();
    assert_eq!(a.payload, "first");
    assert_eq!(a.delivery_count, 1);
    let b = queue.receive(SHORT).unwrap().unwrap();
    assert_eq!(b.payload, "second");
    // Both are hidden now.
    assert!(queue.receive(SHORT).unwrap().is_none());

    queue.delete(&a).unwrap();
    queue.delete(&a).unwrap();
    queue.delete(&b).unwrap();
    assert_eq!(queue.approximate_len().unwrap(), 0);
}

/// With zero visibility every receive is a redelivery; only the latest receipt deletes.
fn check_redelivery(queue: &dyn MessageQueue) {
    queue.send("again").unwrap();
    let first = queue.receive(SHORT).unwrap().unwrap();
    let second = queue.receive(SHORT).unwrap().unwrap();
    assert_eq!(first.id, second.id);
    assert_eq!(second.delivery_count, 2);
    assert_ne!(first.receipt, second.receipt);

    queue.delete(&first).unwrap();
    assert_eq!(queue.approximate_len().unwrap(), 1, "stale receipt must not delete");
    let third = queue.receive(SHORT).unwrap().unwrap();
    assert_eq!(third.delivery_count, 3);
    queue.delete(&third).unwrap();
    assert_eq!(queue.approximate_len().unwrap(), 0);
}

fn check_store_contract(store: &dyn BlobStore) {
    assert!(matches!(store.download("missing"), Err(BackendError::NotFound(_))));
    store.upload("b.png", "image/png", b"bbb").unwrap();
    store.upload("a.jpg", "image/jpeg", b"aaa").unwrap();
    store.upload("a.jpg", "image/jpeg", b"AAA").unwrap();
    let blob = store.download("a.jpg").unwrap();
    assert_eq!(blob.content_type, "image/jpeg");
    assert_eq!(blob.bytes, b"AAA");
    assert_eq!(store.list_ids().unwrap(), vec!["a.jpg", "b.png"]);
}

fn write(dir: &Path, name: &str, bytes: &[u8]) {
    std::fs::write(dir.join(name), bytes).unwrap();
}

// --- memory queue ---

#[test]
fn test_memory_queue_contract() {
    check_queue_contract(&MemoryQueue::new("q"));
}

#[test]
fn test_memory_queue_redelivery() {
    check_redelivery(&MemoryQueue::new("q").with_visibility(Duration::ZERO));
}

#[test]
fn test_memory_queue_message_reappears_after_visibility() {
    let queue = MemoryQueue::new("q").with_visibility(Duration::from_millis(50));
    queue.send("x").unwrap();
    let first = queue.receive(SHORT).unwrap().unwrap();
    assert!(queue.receive(SHORT).unwrap().is_none());
    let again = queue.receive(Duration::from_secs(2)).unwrap().unwrap();
    assert_eq!(again.id, first.id);
    assert_eq!(again.delivery_count, 2);
}

#[test]
fn test_memory_queue_receive_wakes_on_send() {
    let queue = std::sync::Arc::new(MemoryQueue::new("q"));
    let receiver = {
        let queue = std::sync::Arc::clone(&queue);
        thread::spawn(move || {
            let start = Instant::now();
            let msg = queue.receive(Duration::from_secs(5)).unwrap();
            (msg, start.elapsed())
        })
    };
    thread::sleep(Duration::from_millis(30));
    queue.send("hello").unwrap();
    let (msg, waited) = receiver.join().unwrap();
    assert_eq!(msg.unwrap().payload, "hello");
    assert!(waited < Duration::from_secs(2));
}

// --- memory store ---

#[test]
fn test_memory_store_contract() {
    let store = MemoryStore::new("blobs");
    check_store_contract(&store);
    assert_eq!(store.len(), 2);
}

// --- sqlite ---

#[test]
fn test_sqlite_queue_contract() {
    let db = SqliteBackend::open_in_memory().unwrap();
    check_queue_contract(&db.queue("q"));
}

#[test]
fn test_sqlite_queue_redelivery() {
    let db = SqliteBackend::open_in_memory()
        .unwrap()
        .with_visibility(Duration::ZERO);
    check_redelivery(&db.queue("q"));
}

#[test]
fn test_sqlite_queues_are_separate() {
    let db = SqliteBackend::open_in_memory().unwrap();
    let a = db.queue("a");
    let b = db.queue("b");
    a.send("for-a").unwrap();
    assert!(b.receive(SHORT).unwrap().is_none());
    assert_eq!(b.approximate_len().unwrap(), 0);
    assert_eq!(a.receive(SHORT).unwrap().unwrap().payload, "for-a");
}

#[test]
fn test_sqlite_store_contract() {
    let db = SqliteBackend::open_in_memory().unwrap();
    check_store_contract(&db.store("blobs"));
    assert!(db.store("other").list_ids().unwrap().is_empty());
}

#[test]
fn test_sqlite_persists_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("q.db");
    {
        let db = SqliteBackend::open(&path).unwrap();
        db.queue("keywords").send("cats").unwrap();
        db.store("originals")
            .upload("1.png", "image/png", b"png")
            .unwrap();
    }
    let db = SqliteBackend::open(&path).unwrap();
    let msg = db.queue("keywords").receive(SHORT).unwrap().unwrap();
    assert_eq!(msg.payload, "cats");
    assert_eq!(db.store("originals").download("1.png").unwrap().bytes, b"png");
}

#[test]
fn test_sqlite_detects_corrupt_blob() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("blobs.db");
    let db = SqliteBackend::open(&path).unwrap();
    db.store("c").upload("x.png", "image/png", b"good").unwrap();

    let conn = rusqlite::Connection::open(&path).unwrap();
    conn.execute("UPDATE blobs SET bytes = x'00' WHERE id = 'x.png'", [])
        .unwrap();
    drop(conn);

    assert!(matches!(
        db.store("c").download("x.png"),
        Err(BackendError::Corrupt(_))
    ));
}

#[test]
fn test_sqlite_delete_with_unknown_id_is_noop() {
    let db = SqliteBackend::open_in_memory().unwrap();
    let queue = db.queue("q");
    queue.send("x").unwrap();
    let mut msg = queue.receive(SHORT).unwrap().unwrap();
    msg.id = "not-a-number".to_string();
    queue.delete(&msg).unwrap();
    assert_eq!(queue.approximate_len().unwrap(), 1);
}

// --- directory source ---

#[test]
fn test_directory_source_matches_stem_case_insensitive() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "Cat-1.PNG", b"1");
    write(dir.path(), "cat-2.jpg", b"2");
    write(dir.path(), "dog.png", b"3");
    write(dir.path(), "cat-notes.txt", b"4");
    std::fs::create_dir(dir.path().join("nested")).unwrap();
    write(&dir.path().join("nested"), "tomcat.gif", b"5");

    let source = DirectorySource::new(dir.path());
    let found = source.search("  CAT ", 10).unwrap();
    let names: Vec<_> = found.iter().map(|i| i.name.as_str()).collect();
    assert_eq!(names, vec!["Cat-1.PNG", "cat-2.jpg", "tomcat.gif"]);
    assert_eq!(found[0].content_type, "image/png");
    assert_eq!(found[2].bytes, b"5");
}

#[cfg(unix)]
#[test]
fn test_directory_source_skips_unreadable_match() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "cat-ok.png", b"ok");
    std::os::unix::fs::symlink(dir.path().join("gone.png"), dir.path().join("cat-missing.png"))
        .unwrap();

    let found = DirectorySource::new(dir.path()).search("cat", 10).unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].name, "cat-ok.png");
    assert_eq!(found[0].bytes, b"ok");
}

#[test]
fn test_directory_source_respects_limit() {
    let dir = tempfile::tempdir().unwrap();
    for i in 0..5 {
        write(dir.path(), &format!("sun-{i}.png"), b"x");
    }
    let found = DirectorySource::new(dir.path()).search("sun", 2).unwrap();
    assert_eq!(found.len(), 2);
}

#[test]
fn test_directory_source_missing_root_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let err = DirectorySource::new(dir.path().join("nope"))
        .search("x", 1)
        .unwrap_err();
    assert!(err.is_fatal());
}

// --- helpers ---

#[test]
fn test_content_type_for_extensions() {
    assert_eq!(content_type_for(Path::new("a.JPEG")), Some("image/jpeg"));
    assert_eq!(content_type_for(Path::new("a.webp")), Some("image/webp"));
    assert_eq!(content_type_for(Path::new("a.txt")), None);
    assert_eq!(content_type_for(Path::new("noext")), None);
}

#[test]
fn test_new_blob_id_is_fresh_and_keeps_extension() {
    let a = new_blob_id("photo.png");
    let b = new_blob_id("photo.png");
    assert_ne!(a, b);
    assert!(a.ends_with(".png"));
    assert!(!new_blob_id("raw").contains('.'));
}

#[test]
fn test_closure_and_passthrough_transforms() {
    let invert = |bytes: &[u8]| -> Result<Vec<u8>, BackendError> {
        Ok(bytes.iter().map(|b| !b).collect())
    };
    assert_eq!(invert.apply(&[0x00, 0xff]).unwrap(), vec![0xff, 0x00]);
    assert_eq!(Passthrough.apply(b"same").unwrap(), b"same");
}
