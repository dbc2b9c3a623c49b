//! Black-box `Command` construction tests against the public surface.
//! Framing encode/decode round trips (including NUL-preservation and
//! malformed-frame rejection) are covered by the unit tests living next to
//! the codec in `src/wire/decoder.rs` and `src/wire/encoder.rs`; a live
//! socket round trip is covered by `tests/live_client_worker.rs`.

use std::collections::BTreeMap;

use bytes::Bytes;
use gearman_rs::catalog::CATALOG;
use gearman_rs::{Command, GearmanError, Magic};

#[test]
fn create_rejects_unknown_command_name() {
    let err = Command::create("NOT_A_REAL_COMMAND", Magic::Request, BTreeMap::new()).unwrap_err();
    assert!(matches!(err, GearmanError::UnknownCommand(name) if name == "NOT_A_REAL_COMMAND"));
}

#[test]
fn create_rejects_missing_field() {
    let mut args: BTreeMap<&str, Bytes> = BTreeMap::new();
    args.insert("function_name", Bytes::from_static(b"f"));
    // SUBMIT_JOB also needs "id" and "data".
    let err = Command::create("SUBMIT_JOB", Magic::Request, args).unwrap_err();
    assert!(matches!(err, GearmanError::ArgumentMismatch { command: "SUBMIT_JOB", .. }));
}

#[test]
fn create_rejects_unknown_field() {
    let mut args: BTreeMap<&str, Bytes> = BTreeMap::new();
    args.insert("data", Bytes::new());
    assert!(Command::create("ECHO_REQ", Magic::Request, args.clone()).is_ok(), "ECHO_REQ only needs `data`");

    args.insert("bogus", Bytes::new());
    let err = Command::create("ECHO_REQ", Magic::Request, args).unwrap_err();
    assert!(matches!(err, GearmanError::ArgumentMismatch { command: "ECHO_REQ", .. }));
}

#[test]
fn every_catalog_entry_builds_with_exactly_its_schema() {
    for kind in CATALOG {
        let mut args: BTreeMap<&str, Bytes> = BTreeMap::new();
        for field in kind.fields {
            args.insert(field.name, Bytes::from_static(b"v"));
        }
        Command::create(kind.name, Magic::Request, args)
            .unwrap_or_else(|e| panic!("{} failed to build from its own schema: {e}", kind.name));
    }
}
