// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn write_creates_service_contact_and_drop_removes_it() {
    let dir = tempfile::tempdir().unwrap();
    let contact = ContactFile::new("uuid-1".to_string());

    let guard = contact.write(dir.path()).unwrap();
    let path = ContactFile::path(dir.path());
    assert!(path.exists());

    let read_back = ContactFile::read(dir.path()).unwrap();
    assert_eq!(read_back.uuid, "uuid-1");
    assert_eq!(read_back.pid, std::process::id());
    assert_eq!(read_back.port, 0);

    drop(guard);
    assert!(!path.exists(), "contact file removed on shutdown");
}

#[test]
fn read_returns_none_without_contact() {
    let dir = tempfile::tempdir().unwrap();
    assert!(ContactFile::read(dir.path()).is_none());
}

#[test]
fn second_writer_fails_while_locked() {
    let dir = tempfile::tempdir().unwrap();
    let first = ContactFile::new("uuid-1".to_string());
    let _guard = first.write(dir.path()).unwrap();

    let second = ContactFile::new("uuid-2".to_string());
    assert!(second.write(dir.path()).is_err());
}
