//! Content-addressed, deduplicating record store.
//!
//! Every record lives in a slot named by its [`RecordIdentity`]. A slot moves through
//! `Absent -> Claimed -> Written`; the first transition is a single create-if-absent call on the
//! storage substrate, so exactly one of any number of concurrent writers (threads or separate
//! processes) wins it. Slots are never removed or overwritten.

use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::fs::{self, File, OpenOptions};
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use rating_kernel_core::{Record, RecordIdentity};
use serde::{Serialize, Serializer};
use tempfile::NamedTempFile;

pub const SLOT_EXTENSION: &str = "json";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("record {identity} already exists")]
    DuplicateRecord { identity: RecordIdentity },
    /// The slot was claimed but its payload could not be made durable. The slot stays
    /// claimed and must be inspected by an operator.
    #[error("storage fault after claiming slot {identity} at {location}: {source}")]
    StorageFault {
        identity: RecordIdentity,
        location: Location,
        #[source]
        source: io::Error,
    },
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },
}

impl StoreError {
    fn io(context: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    #[must_use]
    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::DuplicateRecord { .. })
    }
}

/// Where a written record can be found.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub enum Location {
    File(PathBuf),
    Memory(RecordIdentity),
}

impl Display for Location {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::File(path) => write!(f, "{}", path.display()),
            Self::Memory(identity) => write!(f, "memory://{identity}"),
        }
    }
}

impl Serialize for Location {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SlotState {
    Absent,
    Claimed,
    Written,
}

/// Storage substrate offering an atomic create-if-absent primitive keyed by identity.
///
/// `claim_slot` must be indivisible with respect to every other caller that can reach the same
/// namespace, including other processes when the backend is shared across them.
pub trait SlotBackend: Send + Sync {
    /// Claim the slot for `identity`. Returns `false` when it was already taken.
    ///
    /// # Errors
    /// Returns [`StoreError::Io`] when the substrate fails; no slot is claimed in that case.
    fn claim_slot(&self, identity: &RecordIdentity) -> Result<bool, StoreError>;

    /// Fill a slot this caller has just claimed.
    ///
    /// # Errors
    /// Returns [`StoreError::StorageFault`] when the payload cannot be written durably.
    fn write_slot(
        &self,
        identity: &RecordIdentity,
        payload: &[u8],
    ) -> Result<Location, StoreError>;

    /// # Errors
    /// Returns [`StoreError::Io`] when the substrate cannot be inspected.
    fn slot_state(&self, identity: &RecordIdentity) -> Result<SlotState, StoreError>;

    /// # Errors
    /// Returns [`StoreError::Io`] when the substrate cannot be read.
    fn read_slot(&self, identity: &RecordIdentity) -> Result<Option<Vec<u8>>, StoreError>;

    /// Every non-absent slot, ordered by identity.
    ///
    /// # Errors
    /// Returns [`StoreError::Io`] when the substrate cannot be listed.
    fn list_slots(&self) -> Result<Vec<(RecordIdentity, SlotState)>, StoreError>;
}

/// One directory, one `<identity>.json` file per slot.
///
/// A claim creates the slot file empty. The payload is staged in a temporary file in the same
/// directory and renamed over the slot, so a slot file is either empty or complete. Any slot
/// file that does not hold a whole JSON object is reported as claimed.
#[derive(Debug, Clone)]
pub struct DirectoryBackend {
    root: PathBuf,
}

impl DirectoryBackend {
    /// Open (and create if needed) the slot directory.
    ///
    /// # Errors
    /// Returns [`StoreError::Io`] when the directory cannot be created.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|err| {
            StoreError::io(
                format!("failed to create data directory {}", root.display()),
                err,
            )
        })?;
        Ok(Self { root })
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn slot_path(&self, identity: &RecordIdentity) -> PathBuf {
        self.root.join(format!("{identity}.{SLOT_EXTENSION}"))
    }
}

fn write_durably(dir: &Path, path: &Path, payload: &[u8]) -> io::Result<()> {
    let mut staged = NamedTempFile::new_in(dir)?;
    staged.write_all(payload)?;
    staged.as_file().sync_all()?;
    staged.persist(path).map_err(|err| err.error)?;
    Ok(())
}

/// Only a complete JSON object counts as a written payload.
fn is_complete_payload(bytes: &[u8]) -> bool {
    serde_json::from_slice::<serde_json::Map<String, serde_json::Value>>(bytes).is_ok()
}

#[cfg(unix)]
fn sync_directory(dir: &Path) -> io::Result<()> {
    File::open(dir)?.sync_all()
}

#[cfg(not(unix))]
fn sync_directory(_dir: &Path) -> io::Result<()> {
    Ok(())
}

impl SlotBackend for DirectoryBackend {
    fn claim_slot(&self, identity: &RecordIdentity) -> Result<bool, StoreError> {
        let path = self.slot_path(identity);
        // create_new is O_CREAT|O_EXCL: the filesystem picks a single winner per name.
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(_file) => Ok(true),
            Err(err) if err.kind() == ErrorKind::AlreadyExists => Ok(false),
            Err(err) => Err(StoreError::io(
                format!("failed to claim slot {}", path.display()),
                err,
            )),
        }
    }

    fn write_slot(
        &self,
        identity: &RecordIdentity,
        payload: &[u8],
    ) -> Result<Location, StoreError> {
        let path = self.slot_path(identity);
        write_durably(&self.root, &path, payload)
            .and_then(|()| sync_directory(&self.root))
            .map_err(|source| StoreError::StorageFault {
                identity: identity.clone(),
                location: Location::File(path.clone()),
                source,
            })?;
        Ok(Location::File(path))
    }

    fn slot_state(&self, identity: &RecordIdentity) -> Result<SlotState, StoreError> {
        let path = self.slot_path(identity);
        match fs::read(&path) {
            Ok(bytes) if is_complete_payload(&bytes) => Ok(SlotState::Written),
            Ok(_) => Ok(SlotState::Claimed),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(SlotState::Absent),
            Err(err) => Err(StoreError::io(
                format!("failed to inspect slot {}", path.display()),
                err,
            )),
        }
    }

    fn read_slot(&self, identity: &RecordIdentity) -> Result<Option<Vec<u8>>, StoreError> {
        let path = self.slot_path(identity);
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(StoreError::io(
                format!("failed to read slot {}", path.display()),
                err,
            )),
        }
    }

    fn list_slots(&self) -> Result<Vec<(RecordIdentity, SlotState)>, StoreError> {
        let context = || format!("failed to list data directory {}", self.root.display());
        let mut slots = Vec::new();
        for entry in fs::read_dir(&self.root).map_err(|err| StoreError::io(context(), err))? {
            let entry = entry.map_err(|err| StoreError::io(context(), err))?;
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(SLOT_EXTENSION) {
                continue;
            }
            let Some(identity) = path
                .file_stem()
                .and_then(|stem| stem.to_str())
                .and_then(|stem| RecordIdentity::parse(stem).ok())
            else {
                continue;
            };
            let state = self.slot_state(&identity)?;
            if state != SlotState::Absent {
                slots.push((identity, state));
            }
        }
        slots.sort();
        Ok(slots)
    }
}

/// Process-local backend. Its mutex is the create-if-absent primitive, so it only
/// deduplicates between callers sharing the same instance.
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    slots: Mutex<BTreeMap<RecordIdentity, Option<Vec<u8>>>>,
}

impl InMemoryBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn with_slots<T>(
        &self,
        f: impl FnOnce(&mut BTreeMap<RecordIdentity, Option<Vec<u8>>>) -> T,
    ) -> T {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut slots)
    }
}

impl SlotBackend for InMemoryBackend {
    fn claim_slot(&self, identity: &RecordIdentity) -> Result<bool, StoreError> {
        Ok(self.with_slots(|slots| {
            if slots.contains_key(identity) {
                false
            } else {
                slots.insert(identity.clone(), None);
                true
            }
        }))
    }

    fn write_slot(
        &self,
        identity: &RecordIdentity,
        payload: &[u8],
    ) -> Result<Location, StoreError> {
        self.with_slots(|slots| slots.insert(identity.clone(), Some(payload.to_vec())));
        Ok(Location::Memory(identity.clone()))
    }

    fn slot_state(&self, identity: &RecordIdentity) -> Result<SlotState, StoreError> {
        Ok(self.with_slots(|slots| match slots.get(identity) {
            None => SlotState::Absent,
            Some(None) => SlotState::Claimed,
            Some(Some(_)) => SlotState::Written,
        }))
    }

    fn read_slot(&self, identity: &RecordIdentity) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.with_slots(|slots| match slots.get(identity) {
            None => None,
            Some(payload) => Some(payload.clone().unwrap_or_default()),
        }))
    }

    fn list_slots(&self) -> Result<Vec<(RecordIdentity, SlotState)>, StoreError> {
        Ok(self.with_slots(|slots| {
            slots
                .iter()
                .map(|(identity, payload)| {
                    let state = if payload.is_some() {
                        SlotState::Written
                    } else {
                        SlotState::Claimed
                    };
                    (identity.clone(), state)
                })
                .collect()
        }))
    }
}

/// Summary of the slot namespace for operators.
#[derive(Debug, Clone, Serialize, Eq, PartialEq)]
pub struct SlotReport {
    pub written: usize,
    /// Slots claimed but never filled: in-flight writes or failed ones needing attention.
    pub claimed: Vec<RecordIdentity>,
}

#[derive(Debug)]
pub struct RecordStore<B = DirectoryBackend> {
    backend: B,
}

impl RecordStore<DirectoryBackend> {
    /// Open a directory-backed store rooted at `root`.
    ///
    /// # Errors
    /// Returns [`StoreError::Io`] when the directory cannot be created.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        Ok(Self::with_backend(DirectoryBackend::open(root)?))
    }
}

impl<B: SlotBackend> RecordStore<B> {
    #[must_use]
    pub fn with_backend(backend: B) -> Self {
        Self { backend }
    }

    #[must_use]
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Persist `record` unless a record with identical content already exists.
    ///
    /// # Errors
    /// - [`StoreError::DuplicateRecord`] when the slot was already claimed; nothing is written.
    /// - [`StoreError::StorageFault`] when the payload write fails after a successful claim.
    ///   The slot stays claimed and the call must not be retried.
    /// - [`StoreError::Io`] when the claim itself could not be attempted.
    pub fn save(&self, record: &Record) -> Result<Location, StoreError> {
        let identity = record.identity();
        if !self.backend.claim_slot(&identity)? {
            tracing::info!(identity = %identity, "duplicate record rejected");
            return Err(StoreError::DuplicateRecord { identity });
        }

        let payload = record.canonical_json();
        match self.backend.write_slot(&identity, payload.as_bytes()) {
            Ok(location) => {
                tracing::info!(identity = %identity, location = %location, "record saved");
                Ok(location)
            }
            Err(err) => {
                tracing::error!(
                    identity = %identity,
                    error = %err,
                    "slot claimed but payload not written; operator intervention required"
                );
                Err(err)
            }
        }
    }

    /// Whether a slot for `identity` has been claimed (written or not).
    ///
    /// # Errors
    /// Returns [`StoreError::Io`] when the backend cannot be inspected.
    pub fn exists(&self, identity: &RecordIdentity) -> Result<bool, StoreError> {
        Ok(self.backend.slot_state(identity)? != SlotState::Absent)
    }

    /// # Errors
    /// Returns [`StoreError::Io`] when the backend cannot be inspected.
    pub fn slot_state(&self, identity: &RecordIdentity) -> Result<SlotState, StoreError> {
        self.backend.slot_state(identity)
    }

    /// Raw stored payload for `identity`, if the slot exists.
    ///
    /// # Errors
    /// Returns [`StoreError::Io`] when the backend cannot be read.
    pub fn read_payload(&self, identity: &RecordIdentity) -> Result<Option<Vec<u8>>, StoreError> {
        self.backend.read_slot(identity)
    }

    /// # Errors
    /// Returns [`StoreError::Io`] when the backend cannot be listed.
    pub fn scan(&self) -> Result<SlotReport, StoreError> {
        let slots = self.backend.list_slots()?;
        let written = slots.iter().filter(|(_, state)| *state == SlotState::Written).count();
        let claimed = slots
            .into_iter()
            .filter(|(_, state)| *state == SlotState::Claimed)
            .map(|(identity, _)| identity)
            .collect();
        Ok(SlotReport { written, claimed })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Barrier;
    use std::thread;

    use super::*;

    fn temp_dir() -> tempfile::TempDir {
        tempfile::tempdir().unwrap_or_else(|err| panic!("failed to create temp dir: {err}"))
    }

    fn open_store(dir: &Path) -> RecordStore {
        RecordStore::open(dir).unwrap_or_else(|err| panic!("failed to open store: {err}"))
    }

    fn fixture_record() -> Record {
        Record::new().with("ggg", 111_i64)
    }

    fn slot_files(dir: &Path) -> Vec<PathBuf> {
        let mut files = fs::read_dir(dir)
            .unwrap_or_else(|err| panic!("failed to list {}: {err}", dir.display()))
            .map(|entry| match entry {
                Ok(entry) => entry.path(),
                Err(err) => panic!("failed to read dir entry: {err}"),
            })
            .collect::<Vec<_>>();
        files.sort();
        files
    }

    /// Backend whose payload writes always fail after a successful claim.
    #[derive(Debug, Default)]
    struct FailingWrites {
        inner: InMemoryBackend,
    }

    impl SlotBackend for FailingWrites {
        fn claim_slot(&self, identity: &RecordIdentity) -> Result<bool, StoreError> {
            self.inner.claim_slot(identity)
        }

        fn write_slot(
            &self,
            identity: &RecordIdentity,
            _payload: &[u8],
        ) -> Result<Location, StoreError> {
            Err(StoreError::StorageFault {
                identity: identity.clone(),
                location: Location::Memory(identity.clone()),
                source: io::Error::other("no space left on device"),
            })
        }

        fn slot_state(&self, identity: &RecordIdentity) -> Result<SlotState, StoreError> {
            self.inner.slot_state(identity)
        }

        fn read_slot(&self, identity: &RecordIdentity) -> Result<Option<Vec<u8>>, StoreError> {
            self.inner.read_slot(identity)
        }

        fn list_slots(&self) -> Result<Vec<(RecordIdentity, SlotState)>, StoreError> {
            self.inner.list_slots()
        }
    }

    // Test IDs: TSTORE-001
    #[test]
    fn save_writes_canonical_payload_named_by_identity() -> Result<(), StoreError> {
        let dir = temp_dir();
        let store = open_store(dir.path());
        let record = fixture_record();

        assert_eq!(store.backend().root(), dir.path());
        let location = store.save(&record)?;
        let expected_path = dir.path().join("67dd37871074b0101f7c44ada112de72.json");
        assert_eq!(location, Location::File(expected_path.clone()));

        let written = fs::read_to_string(&expected_path)
            .unwrap_or_else(|err| panic!("slot file should be readable: {err}"));
        assert_eq!(written, r#"{"ggg": 111}"#);
        assert_eq!(store.slot_state(&record.identity())?, SlotState::Written);
        assert!(store.exists(&record.identity())?);
        Ok(())
    }

    // Test IDs: TSTORE-002
    #[test]
    fn second_save_is_rejected_and_payload_is_unchanged() -> Result<(), StoreError> {
        let dir = temp_dir();
        let store = open_store(dir.path());
        let record = fixture_record();

        store.save(&record)?;
        let before = store.read_payload(&record.identity())?;

        match store.save(&record) {
            Err(StoreError::DuplicateRecord { identity }) => {
                assert_eq!(identity, record.identity());
            }
            other => panic!("expected duplicate rejection, got {other:?}"),
        }

        assert_eq!(store.read_payload(&record.identity())?, before);
        assert_eq!(slot_files(dir.path()).len(), 1);
        Ok(())
    }

    // Test IDs: TSTORE-003
    #[test]
    fn concurrent_identical_saves_have_exactly_one_winner() {
        const WRITERS: usize = 64;
        let dir = temp_dir();
        let record = Record::new().with("text", "fff").with("languageCode", "en");
        let barrier = Barrier::new(WRITERS);

        let outcomes = thread::scope(|scope| {
            let handles = (0..WRITERS)
                .map(|_| {
                    scope.spawn(|| {
                        // Each writer opens its own store: nothing in-process is shared.
                        let store = open_store(dir.path());
                        barrier.wait();
                        store.save(&record)
                    })
                })
                .collect::<Vec<_>>();
            handles
                .into_iter()
                .map(|handle| match handle.join() {
                    Ok(outcome) => outcome,
                    Err(_) => panic!("writer thread panicked"),
                })
                .collect::<Vec<_>>()
        });

        let successes = outcomes.iter().filter(|outcome| outcome.is_ok()).count();
        let duplicates = outcomes
            .iter()
            .filter(|outcome| matches!(outcome, Err(err) if err.is_duplicate()))
            .count();
        assert_eq!(successes, 1);
        assert_eq!(duplicates, WRITERS - 1);

        let files = slot_files(dir.path());
        assert_eq!(files, vec![dir.path().join(format!("{}.json", record.identity()))]);
        let written = fs::read_to_string(&files[0])
            .unwrap_or_else(|err| panic!("slot file should be readable: {err}"));
        assert_eq!(written, record.canonical_json());
    }

    // Test IDs: TSTORE-004
    #[test]
    fn concurrent_distinct_saves_are_independent() {
        const WRITERS: i64 = 50;
        let dir = temp_dir();
        let store = open_store(dir.path());

        let outcomes = thread::scope(|scope| {
            let handles = (0..WRITERS)
                .map(|index| {
                    let store = &store;
                    scope.spawn(move || store.save(&Record::new().with("n", index)))
                })
                .collect::<Vec<_>>();
            handles
                .into_iter()
                .map(|handle| match handle.join() {
                    Ok(outcome) => outcome,
                    Err(_) => panic!("writer thread panicked"),
                })
                .collect::<Vec<_>>()
        });

        assert!(outcomes.iter().all(Result::is_ok), "outcomes: {outcomes:?}");
        assert_eq!(slot_files(dir.path()).len(), 50);
    }

    // Test IDs: TSTORE-005
    #[test]
    fn empty_record_is_stored_like_any_other() -> Result<(), StoreError> {
        let dir = temp_dir();
        let store = open_store(dir.path());

        let location = store.save(&Record::new())?;
        assert_eq!(
            location,
            Location::File(dir.path().join("99914b932bd37a50b983c5e7c90ae93b.json"))
        );
        assert!(store.save(&Record::new()).is_err_and(|err| err.is_duplicate()));
        Ok(())
    }

    // Test IDs: TSTORE-006
    #[test]
    fn write_failure_leaves_slot_claimed_and_blocks_resave() {
        let store = RecordStore::with_backend(FailingWrites::default());
        let record = fixture_record();

        match store.save(&record) {
            Err(StoreError::StorageFault { identity, .. }) => {
                assert_eq!(identity, record.identity());
            }
            other => panic!("expected storage fault, got {other:?}"),
        }
        assert!(matches!(store.slot_state(&record.identity()), Ok(SlotState::Claimed)));
        assert!(store.save(&record).is_err_and(|err| err.is_duplicate()));

        let report = store.scan().unwrap_or_else(|err| panic!("scan failed: {err}"));
        assert_eq!(
            report,
            SlotReport {
                written: 0,
                claimed: vec![record.identity()],
            }
        );
    }

    // Test IDs: TSTORE-007
    #[test]
    fn scan_reports_claimed_slots_and_ignores_foreign_files() -> Result<(), StoreError> {
        let dir = temp_dir();
        let store = open_store(dir.path());
        store.save(&fixture_record())?;

        let stranded = Record::new().with("stranded", true).identity();
        File::create(store.backend().slot_path(&stranded))
            .unwrap_or_else(|err| panic!("failed to create stranded slot: {err}"));
        fs::write(dir.path().join("notes.txt"), "operator notes")
            .unwrap_or_else(|err| panic!("failed to write foreign file: {err}"));
        fs::write(dir.path().join("not-an-identity.json"), "{}")
            .unwrap_or_else(|err| panic!("failed to write foreign file: {err}"));

        let report = store.scan()?;
        assert_eq!(
            report,
            SlotReport {
                written: 1,
                claimed: vec![stranded.clone()],
            }
        );
        assert_eq!(store.slot_state(&stranded)?, SlotState::Claimed);
        assert!(store.exists(&stranded)?);
        Ok(())
    }

    // Test IDs: TSTORE-008
    #[test]
    fn unknown_identity_is_absent() -> Result<(), StoreError> {
        let dir = temp_dir();
        let store = open_store(dir.path());
        let identity = fixture_record().identity();

        assert_eq!(store.slot_state(&identity)?, SlotState::Absent);
        assert!(!store.exists(&identity)?);
        assert_eq!(store.read_payload(&identity)?, None);
        Ok(())
    }

    // Test IDs: TSTORE-009
    #[test]
    fn in_memory_backend_deduplicates_concurrent_callers() {
        const WRITERS: usize = 50;
        let store = RecordStore::with_backend(InMemoryBackend::new());
        let record = fixture_record();
        let barrier = Barrier::new(WRITERS);

        let successes = thread::scope(|scope| {
            let handles = (0..WRITERS)
                .map(|_| {
                    scope.spawn(|| {
                        barrier.wait();
                        store.save(&record).is_ok()
                    })
                })
                .collect::<Vec<_>>();
            handles
                .into_iter()
                .map(|handle| handle.join())
                .filter(|joined| matches!(joined, Ok(true)))
                .count()
        });

        assert_eq!(successes, 1);
        assert!(matches!(
            store.read_payload(&record.identity()),
            Ok(Some(payload)) if payload == record.canonical_json().into_bytes()
        ));
    }

    // Test IDs: TSTORE-010
    #[test]
    fn truncated_payload_is_reported_as_claimed() -> Result<(), StoreError> {
        let dir = temp_dir();
        let store = open_store(dir.path());
        let record = fixture_record();

        fs::write(store.backend().slot_path(&record.identity()), r#"{"ggg": 1"#)
            .unwrap_or_else(|err| panic!("failed to write truncated slot: {err}"));

        assert_eq!(store.slot_state(&record.identity())?, SlotState::Claimed);
        assert_eq!(
            store.scan()?,
            SlotReport {
                written: 0,
                claimed: vec![record.identity()],
            }
        );
        assert!(store.save(&record).is_err_and(|err| err.is_duplicate()));
        Ok(())
    }

    // Test IDs: TSTORE-011
    #[test]
    fn staged_writes_leave_only_the_slot_file() -> Result<(), StoreError> {
        let dir = temp_dir();
        let store = open_store(dir.path());
        let record = Record::new().with("text", "x".repeat(100_000));

        let slot = store.backend().slot_path(&record.identity());
        let location = store.save(&record)?;
        assert_eq!(slot_files(dir.path()), vec![slot.clone()]);
        assert_eq!(location, Location::File(slot));
        assert_eq!(store.slot_state(&record.identity())?, SlotState::Written);
        Ok(())
    }
}
