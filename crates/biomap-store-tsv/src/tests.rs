//! Integration tests for `TsvStore` against a temporary directory.

use std::{fs, sync::Arc, thread, time::Duration};

use biomap_core::{
  CurationEngine, Decision, EntityRef, MappingRecord, MappingStore, Predicate, RowRef, StoreKind,
  check::{self, ViolationKind},
  record::{Confidence, MalformedRecord},
  registry::PatternRegistry,
  store::Changeset,
};
use tempfile::TempDir;

use crate::{DirectoryLock, Error, TsvStore, atomic::Staged, codec::header_line, read_table};

const CURATOR: &str = "orcid:0000-0000-0000-0001";

const FOO_BAR: &str =
  "mesh\tD001\tFoo\tskos:exactMatch\tchebi\tC001\tBar\tpredicted\t0.92\tscript:gen.py";

fn store() -> (TempDir, TsvStore) {
  let dir = TempDir::new().expect("tempdir");
  let store = TsvStore::open(dir.path()).expect("open store");
  (dir, store)
}

fn write_rows(store: &TsvStore, kind: StoreKind, rows: &[&str]) {
  fs::write(store.path(kind), file_text(rows)).unwrap();
}

fn file_text(rows: &[&str]) -> String {
  let mut text = format!("{}\n", header_line());
  for row in rows {
    text.push_str(row);
    text.push('\n');
  }
  text
}

fn read(store: &TsvStore, kind: StoreKind) -> String { fs::read_to_string(store.path(kind)).unwrap() }

fn foo_bar() -> MappingRecord {
  MappingRecord::prediction(
    EntityRef::new("mesh", "D001", "Foo"),
    Predicate::ExactMatch,
    EntityRef::new("chebi", "C001", "Bar"),
    Confidence::from_f64(0.92).unwrap(),
    "script:gen.py",
  )
}

fn prediction(subject: &str, name: &str) -> MappingRecord {
  MappingRecord {
    subject: EntityRef::new("mesh", subject, name),
    ..foo_bar()
  }
}

fn foo_bar_ref() -> RowRef { RowRef::at(0, foo_bar().identity_key()) }

fn tsv_error(err: &biomap_core::Error) -> &Error {
  match err {
    biomap_core::Error::Store(inner) => inner.downcast_ref::<Error>().expect("a TSV store error"),
    other => panic!("expected a store error, got {other}"),
  }
}

// ─── Opening ─────────────────────────────────────────────────────────────────

#[test]
fn open_creates_header_only_files() {
  let (_dir, store) = store();
  for kind in StoreKind::ALL {
    assert_eq!(read(&store, kind), format!("{}\n", header_line()));
    assert!(store.load(kind).unwrap().is_empty());
  }
}

#[test]
fn open_leaves_existing_files_alone() {
  let (dir, store) = store();
  write_rows(&store, StoreKind::Predicted, &[FOO_BAR]);
  let reopened = TsvStore::open(dir.path()).unwrap();
  assert_eq!(reopened.load(StoreKind::Predicted).unwrap(), vec![foo_bar()]);
}

// ─── Scenarios ───────────────────────────────────────────────────────────────

#[test]
fn confirm_correct_moves_prediction_to_positive() {
  let (_dir, store) = store();
  write_rows(&store, StoreKind::Predicted, &[FOO_BAR]);
  let engine = CurationEngine::new(store.clone());

  let outcome = engine.apply_decision(&foo_bar_ref(), Decision::ConfirmCorrect, CURATOR).unwrap();
  assert_eq!(outcome.changed, vec![StoreKind::Positive, StoreKind::Predicted]);

  assert_eq!(read(&store, StoreKind::Predicted), file_text(&[]));
  assert_eq!(
    read(&store, StoreKind::Positive),
    file_text(&[
      "mesh\tD001\tFoo\tskos:exactMatch\tchebi\tC001\tBar\tmanually_reviewed\t\t\
       orcid:0000-0000-0000-0001\tsemapv:ManualMappingCuration"
    ])
  );
  let positive = store.load(StoreKind::Positive).unwrap();
  assert_eq!(positive[0].confidence, None);
}

#[test]
fn confirm_incorrect_moves_prediction_to_negative_as_not_related() {
  let (_dir, store) = store();
  write_rows(&store, StoreKind::Predicted, &[FOO_BAR]);
  let engine = CurationEngine::new(store.clone());

  engine.apply_decision(&foo_bar_ref(), Decision::ConfirmIncorrect, CURATOR).unwrap();

  let negative = store.load(StoreKind::Negative).unwrap();
  assert_eq!(negative.len(), 1);
  assert_eq!(negative[0].predicate, Predicate::NotRelated);
  assert_eq!(negative[0].source, CURATOR);
  assert_eq!(negative[0].confidence, None);
  assert!(store.load(StoreKind::Predicted).unwrap().is_empty());
  assert!(check::is_clean(&engine.check().unwrap()));
}

#[test]
fn novel_mapping_matching_inverse_order_is_a_duplicate() {
  let (_dir, store) = store();
  let existing = "chebi\tC001\tBar\tskos:exactMatch\tmesh\tD001\tFoo\tmanually_reviewed\t\torcid:0000-0000-0000-0002";
  write_rows(&store, StoreKind::Positive, &[existing]);
  let engine = CurationEngine::new(store.clone());

  let err = engine
    .add_novel_mapping(
      EntityRef::new("mesh", "D001", "Foo"),
      Predicate::ExactMatch,
      EntityRef::new("chebi", "C001", "Bar"),
      CURATOR,
    )
    .unwrap_err();
  assert!(matches!(err, biomap_core::Error::DuplicateMapping { .. }));
  assert_eq!(read(&store, StoreKind::Positive), file_text(&[existing]));
}

#[test]
fn second_session_on_same_row_gets_stale_record() {
  let (dir, store) = store();
  write_rows(&store, StoreKind::Predicted, &[FOO_BAR]);
  let first = CurationEngine::new(store);
  let second = CurationEngine::new(TsvStore::open(dir.path()).unwrap());

  // Both sessions listed the same page before either decided.
  let row = first.page(&Default::default()).unwrap().items[0].clone();
  assert_eq!(second.page(&Default::default()).unwrap().items[0], row);
  let row = RowRef::at(row.position, row.record.identity_key());

  first.apply_decision(&row, Decision::ConfirmCorrect, CURATOR).unwrap();
  let err = second.apply_decision(&row, Decision::ConfirmIncorrect, CURATOR).unwrap_err();
  assert!(matches!(err, biomap_core::Error::StaleRecord { .. }));
  assert!(first.store().load(StoreKind::Negative).unwrap().is_empty());
}

#[test]
fn concurrent_decisions_apply_exactly_once() {
  let (_dir, store) = store();
  write_rows(&store, StoreKind::Predicted, &[FOO_BAR]);
  let engine = Arc::new(CurationEngine::new(store.clone()));

  let handles: Vec<_> = [Decision::ConfirmCorrect, Decision::MarkUnsure]
    .into_iter()
    .map(|decision| {
      let engine = Arc::clone(&engine);
      thread::spawn(move || engine.apply_decision(&foo_bar_ref(), decision, CURATOR))
    })
    .collect();
  let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

  assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
  assert!(results.iter().any(|r| matches!(r, Err(biomap_core::Error::StaleRecord { .. }))));
  let curated = store.load(StoreKind::Positive).unwrap().len() + store.load(StoreKind::Unsure).unwrap().len();
  assert_eq!(curated, 1);
}

#[test]
fn unknown_predicate_fails_whole_load_with_line_number() {
  let (_dir, store) = store();
  let bad = "mesh\tD002\tBaz\tskos:relatedMatch\tchebi\tC002\tQux\tpredicted\t0.50\tscript:gen.py";
  write_rows(&store, StoreKind::Predicted, &[FOO_BAR, bad]);

  let err = store.load(StoreKind::Predicted).unwrap_err();
  match err {
    Error::Corrupt { line, source, .. } => {
      assert_eq!(line, 3);
      assert_eq!(source, MalformedRecord::UnknownPredicate("skos:relatedMatch".into()));
    }
    other => panic!("expected a corrupt store, got {other}"),
  }
}

#[test]
fn decision_on_corrupt_store_writes_nothing() {
  let (_dir, store) = store();
  write_rows(&store, StoreKind::Predicted, &[FOO_BAR]);
  write_rows(&store, StoreKind::Unsure, &[FOO_BAR]);
  let engine = CurationEngine::new(store.clone());

  let err = engine.apply_decision(&foo_bar_ref(), Decision::ConfirmCorrect, CURATOR).unwrap_err();
  assert!(matches!(tsv_error(&err), Error::Corrupt { line: 2, .. }));
  assert_eq!(read(&store, StoreKind::Predicted), file_text(&[FOO_BAR]));
  assert_eq!(read(&store, StoreKind::Positive), file_text(&[]));
}

// ─── Atomicity ───────────────────────────────────────────────────────────────

#[test]
fn crash_between_staging_and_rename_leaves_original() {
  let (dir, store) = store();
  store.save(StoreKind::Predicted, &[foo_bar()]).unwrap();
  let before = read(&store, StoreKind::Predicted);

  let staged = Staged::write(&store.path(StoreKind::Predicted), "half a ro").unwrap();
  drop(staged);

  assert_eq!(read(&store, StoreKind::Predicted), before);
  assert_eq!(store.load(StoreKind::Predicted).unwrap(), vec![foo_bar()]);
  let leftovers: Vec<_> = fs::read_dir(dir.path())
    .unwrap()
    .filter_map(|e| e.ok())
    .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
    .collect();
  assert!(leftovers.is_empty());
}

#[test]
fn failing_changeset_touches_no_store() {
  let (_dir, store) = store();
  write_rows(&store, StoreKind::Predicted, &[FOO_BAR]);
  let reviewed = foo_bar().into_reviewed(Predicate::ExactMatch, CURATOR);

  let mut changes = Changeset::new();
  changes
    .append(StoreKind::Negative, reviewed.clone())
    .remove(StoreKind::Positive, reviewed.identity_key());
  let err = store.apply(&changes).unwrap_err();

  assert!(matches!(err, Error::MissingRow { kind: StoreKind::Positive, .. }));
  assert_eq!(read(&store, StoreKind::Negative), file_text(&[]));
}

#[test]
fn interrupted_relocation_leaves_a_duplicate_not_a_loss() {
  let (_dir, store) = store();
  let reviewed = foo_bar().into_reviewed(Predicate::ExactMatch, CURATOR);
  store.save(StoreKind::Positive, &[reviewed.clone()]).unwrap();

  let mut changes = Changeset::new();
  changes
    .remove(StoreKind::Positive, reviewed.identity_key())
    .append(StoreKind::Unsure, reviewed.clone());
  let mut staged = store.stage(&changes).unwrap().into_iter();
  staged.next().unwrap().commit().unwrap();
  // Process dies before the second rename.
  drop(staged);

  assert_eq!(store.load(StoreKind::Unsure).unwrap(), vec![reviewed.clone()]);
  assert_eq!(store.load(StoreKind::Positive).unwrap(), vec![reviewed]);
  let engine = CurationEngine::new(store);
  let violations = engine.check().unwrap();
  assert!(violations.iter().any(|v| v.kind == ViolationKind::CrossStoreCollision));
  assert!(!check::is_clean(&violations));
}

#[test]
fn save_refuses_records_of_the_wrong_type() {
  let (_dir, store) = store();
  let err = store.save(StoreKind::Positive, &[foo_bar()]).unwrap_err();
  assert!(matches!(err, Error::Rejected { kind: StoreKind::Positive, .. }));
  assert_eq!(read(&store, StoreKind::Positive), file_text(&[]));
}

#[test]
fn save_drops_repeated_identities() {
  let (_dir, store) = store();
  store.save(StoreKind::Predicted, &[foo_bar(), foo_bar()]).unwrap();
  assert_eq!(store.load(StoreKind::Predicted).unwrap().len(), 1);
}

// ─── Formatting stability ────────────────────────────────────────────────────

#[test]
fn untouched_rows_keep_their_text_and_order() {
  let (_dir, store) = store();
  // Legacy ten-column rows with non-canonical confidence text.
  let first = "mesh\tD002\tBaz\tskos:exactMatch\tchebi\tC002\tQux\tpredicted\t.5\tscript:old.py";
  let last = "mesh\tD003\tZap\tskos:closeMatch\tchebi\tC003\tZip\tpredicted\t1\tscript:old.py";
  write_rows(&store, StoreKind::Predicted, &[first, FOO_BAR, last]);
  let engine = CurationEngine::new(store.clone());

  engine
    .apply_decision(&RowRef::at(1, foo_bar().identity_key()), Decision::MarkBroader, CURATOR)
    .unwrap();

  assert_eq!(read(&store, StoreKind::Predicted), file_text(&[first, last]));
  let positive = store.load(StoreKind::Positive).unwrap();
  assert_eq!(positive[0].predicate, Predicate::BroaderThan);
}

#[test]
fn revise_in_place_rewrites_only_that_line() {
  let (_dir, store) = store();
  let a = "mesh\tD002\tBaz\tskos:exactMatch\tchebi\tC002\tQux\tmanually_reviewed\t\torcid:1";
  let b = "mesh\tD001\tFoo\tskos:exactMatch\tchebi\tC001\tBar\tmanually_reviewed\t\torcid:1";
  write_rows(&store, StoreKind::Positive, &[a, b]);
  let engine = CurationEngine::new(store.clone());
  let key = store.load(StoreKind::Positive).unwrap()[1].identity_key();

  engine.revise(StoreKind::Positive, &key, Decision::MarkNarrower, CURATOR).unwrap();

  let text = read(&store, StoreKind::Positive);
  let lines: Vec<&str> = text.lines().collect();
  assert_eq!(lines[1], a);
  assert!(lines[2].contains("skos:broadMatch"));
  assert!(lines[2].contains(CURATOR));
}

// ─── Pruning ─────────────────────────────────────────────────────────────────

#[test]
fn prune_unblocks_a_prediction_curated_by_hand() {
  let (_dir, store) = store();
  let baz = prediction("D002", "Baz");
  store.save(StoreKind::Predicted, &[baz.clone(), foo_bar()]).unwrap();
  // Someone confirmed the pair directly in the file, and repeated a row.
  let confirmed = "mesh\tD001\tFoo\tskos:exactMatch\tchebi\tC001\tBar\tmanually_reviewed\t\torcid:1";
  write_rows(&store, StoreKind::Positive, &[confirmed]);
  store.append(StoreKind::Predicted, &[prediction("D003", "Qux")]).unwrap();
  let mut text = read(&store, StoreKind::Predicted);
  let first_row = text.lines().nth(1).unwrap().to_owned();
  text.push_str(&first_row);
  text.push('\n');
  fs::write(store.path(StoreKind::Predicted), text).unwrap();

  let engine = CurationEngine::new(store.clone());
  let err = engine
    .apply_decision(&RowRef::at(1, foo_bar().identity_key()), Decision::ConfirmCorrect, CURATOR)
    .unwrap_err();
  assert!(matches!(err, biomap_core::Error::DuplicateMapping { .. }));

  let report = engine.prune_predictions().unwrap();
  assert_eq!((report.kept, report.curated, report.duplicates), (2, 1, 1));
  assert_eq!(
    store.load(StoreKind::Predicted).unwrap(),
    vec![baz, prediction("D003", "Qux")]
  );
  assert!(check::is_clean(&engine.check().unwrap()));
  assert!(!store.dir().join(crate::lock::LOCK_FILE).exists());
}

// ─── Append / import ─────────────────────────────────────────────────────────

#[test]
fn append_skips_identities_already_present() {
  let (_dir, store) = store();
  write_rows(&store, StoreKind::Predicted, &[FOO_BAR]);
  let added = store
    .append(StoreKind::Predicted, &[foo_bar(), prediction("D002", "Baz")])
    .unwrap();
  assert_eq!(added, 1);
  let text = read(&store, StoreKind::Predicted);
  assert!(text.starts_with(&file_text(&[FOO_BAR])));
  assert_eq!(store.load(StoreKind::Predicted).unwrap().len(), 2);
}

#[test]
fn import_from_generator_file_deduplicates() {
  let (dir, store) = store();
  write_rows(&store, StoreKind::Predicted, &[FOO_BAR]);
  let batch = dir.path().join("batch.tsv");
  let other = "mesh\tD002\tBaz\tskos:exactMatch\tchebi\tC002\tQux\tpredicted\t0.70\tscript:gen.py";
  fs::write(&batch, file_text(&[FOO_BAR, other, other])).unwrap();

  let engine = CurationEngine::new(store.clone());
  let report = engine.import_predictions(read_table(&batch).unwrap()).unwrap();
  assert_eq!((report.added, report.skipped), (1, 2));
  let text = read(&store, StoreKind::Predicted);
  let lines: Vec<&str> = text.lines().collect();
  assert_eq!(lines.len(), 3);
  assert_eq!(lines[1], FOO_BAR);
  assert!(lines[2].starts_with(other));
}

// ─── Locking ─────────────────────────────────────────────────────────────────

#[test]
fn held_lock_times_out_other_writers() {
  let (_dir, store) = store();
  let store = store.with_lock_timeout(Duration::from_millis(100));
  let guard = store.lock().unwrap();
  assert!(guard.path().exists());

  let err = store.lock().unwrap_err();
  assert!(matches!(err, Error::LockTimeout { .. }));

  let path = guard.path().to_owned();
  drop(guard);
  assert!(!path.exists());
  assert!(store.lock().is_ok());
}

#[test]
fn lock_file_records_owner_pid() {
  let (dir, _store) = store();
  let lock = DirectoryLock::acquire(dir.path(), Duration::from_millis(10)).unwrap();
  let pid = fs::read_to_string(lock.path()).unwrap();
  assert_eq!(pid.trim(), std::process::id().to_string());
}

// ─── Registry ────────────────────────────────────────────────────────────────

#[test]
fn registry_warnings_do_not_block_loading() {
  let (_dir, store) = store();
  let registry = PatternRegistry::from_json(r#"{ "mesh": "^[CD]\\d+$" }"#).unwrap();
  let store = store.with_registry(Arc::new(registry));
  write_rows(&store, StoreKind::Predicted, &[FOO_BAR]);
  assert_eq!(store.load(StoreKind::Predicted).unwrap().len(), 1);
}
