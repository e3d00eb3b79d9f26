//! Document enumeration.
//!
//! An enumerator captures the documents visible to the creating thread when
//! it is created and then walks them one [`DocEnumerator::advance`] at a
//! time, applying the enumeration flags and an optional
//! [`DocumentFilter`]. Enumerators are reference counted like handles and
//! keep their database alive.

use crate::database::Database;
use crate::document::{doc_key, Document, DocumentFlags};
use crate::error::{CoreError, CoreResult};
use crate::lifecycle::{RefCount, RefCounted, Retained};
use crate::sync::{lock, Lock};
use crate::types::{SequenceNumber, TransactionId};
use arbordb_storage::{KeyRange, Record};
use bytes::Bytes;
use std::fmt;
use std::ops::{BitOr, Bound};
use tracing::debug;

/// Options controlling which documents an enumerator yields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EnumFlags(u16);

impl EnumFlags {
    /// No flags.
    pub const NONE: Self = Self(0);
    /// Walk keys from high to low. The range start is then the upper bound.
    pub const DESCENDING: Self = Self(0x01);
    /// Include a document whose ID equals the range start.
    pub const INCLUSIVE_START: Self = Self(0x02);
    /// Include a document whose ID equals the range end.
    pub const INCLUSIVE_END: Self = Self(0x04);
    /// Include documents whose current revision is a deletion.
    pub const INCLUDE_DELETED: Self = Self(0x08);
    /// Include documents without conflicts. Without it only conflicted
    /// documents are yielded.
    pub const INCLUDE_NON_CONFLICTED: Self = Self(0x10);
    /// Load document bodies.
    pub const INCLUDE_BODIES: Self = Self(0x20);

    /// Purged documents. Only settable through [`crate::internal`].
    pub(crate) const INCLUDE_PURGED: Self = Self(0x8000);

    const PUBLIC_MASK: u16 = 0x3f;

    /// The flags used when none are given.
    pub const DEFAULT: Self = Self(
        Self::INCLUSIVE_START.0
            | Self::INCLUSIVE_END.0
            | Self::INCLUDE_NON_CONFLICTED.0
            | Self::INCLUDE_BODIES.0,
    );

    /// Creates flags from raw bits, dropping unknown and privileged bits.
    #[must_use]
    pub const fn from_bits_truncate(bits: u16) -> Self {
        Self(bits & Self::PUBLIC_MASK)
    }

    /// Returns true if `bits` asks for something only privileged callers may.
    #[must_use]
    pub const fn has_privileged_bits(bits: u16) -> bool {
        bits & Self::INCLUDE_PURGED.0 != 0
    }

    /// Returns the raw bits.
    #[must_use]
    pub const fn bits(self) -> u16 {
        self.0
    }

    /// Returns true if every flag in `other` is set.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub(crate) const fn with_purged(self) -> Self {
        Self(self.0 | Self::INCLUDE_PURGED.0)
    }
}

impl Default for EnumFlags {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl BitOr for EnumFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Enumeration options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EnumeratorOptions {
    /// Number of matching documents to skip before the first one yielded.
    pub skip: u64,
    /// Enumeration flags.
    pub flags: EnumFlags,
}

impl EnumeratorOptions {
    /// Options with the given flags and no skip.
    #[must_use]
    pub const fn with_flags(flags: EnumFlags) -> Self {
        Self { skip: 0, flags }
    }

    /// Sets the number of documents to skip.
    #[must_use]
    pub const fn skip(mut self, skip: u64) -> Self {
        self.skip = skip;
        self
    }
}

/// A range of document IDs. `None` leaves that side open.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DocRange {
    /// First document ID, in enumeration order.
    pub start: Option<String>,
    /// Last document ID, in enumeration order.
    pub end: Option<String>,
}

impl DocRange {
    /// Every document.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Documents between `start` and `end`.
    pub fn new(start: Option<impl Into<String>>, end: Option<impl Into<String>>) -> Self {
        Self {
            start: start.map(Into::into),
            end: end.map(Into::into),
        }
    }

    fn to_key_range(&self, flags: EnumFlags) -> CoreResult<KeyRange> {
        let bound = |doc_id: &Option<String>, inclusive: bool| -> CoreResult<Bound<Bytes>> {
            Ok(match doc_id {
                None => Bound::Unbounded,
                Some(doc_id) if inclusive => Bound::Included(doc_key(doc_id)?.to_bytes()),
                Some(doc_id) => Bound::Excluded(doc_key(doc_id)?.to_bytes()),
            })
        };
        let start = bound(&self.start, flags.contains(EnumFlags::INCLUSIVE_START))?;
        let end = bound(&self.end, flags.contains(EnumFlags::INCLUSIVE_END))?;
        Ok(if flags.contains(EnumFlags::DESCENDING) {
            KeyRange::new(end, start)
        } else {
            KeyRange::new(start, end)
        })
    }
}

/// Decides which documents an enumerator yields.
///
/// Closures with the same signature implement this trait.
pub trait DocumentFilter: Send {
    /// Returns true to yield `doc`.
    fn accept(&mut self, doc: &Document, flags: DocumentFlags, doc_type: Option<&str>) -> bool;
}

impl<F> DocumentFilter for F
where
    F: FnMut(&Document, DocumentFlags, Option<&str>) -> bool + Send,
{
    fn accept(&mut self, doc: &Document, flags: DocumentFlags, doc_type: Option<&str>) -> bool {
        self(doc, flags, doc_type)
    }
}

/// Where an enumerator is in its life.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnumeratorPhase {
    /// Nothing yielded yet.
    Created,
    /// At least one document yielded.
    Positioned,
    /// No more documents.
    Exhausted,
    /// Closed by the caller; the filter and cursor are released.
    Closed,
}

struct EnumState {
    records: std::vec::IntoIter<Record>,
    filter: Option<Box<dyn DocumentFilter>>,
    skip_remaining: u64,
    phase: EnumeratorPhase,
}

/// A reference-counted cursor over documents.
///
/// # Example
///
/// ```rust
/// use arbordb_core::{Database, DocEnumerator, DocRange, DocumentFlags, DocumentMeta};
///
/// let db = Database::open_in_memory().unwrap();
/// db.begin_transaction().unwrap();
/// for id in ["a", "b", "c"] {
///     db.put(id, &DocumentMeta::new(DocumentFlags::NONE, &b"1-x"[..]), &b"{}"[..])
///         .unwrap();
/// }
/// db.end_transaction(true).unwrap();
///
/// let e = DocEnumerator::new(&db, &DocRange::all(), Default::default(), None).unwrap();
/// let ids: Vec<String> = e.iter().map(|d| d.unwrap().doc_id).collect();
/// assert_eq!(ids, ["a", "b", "c"]);
/// ```
pub struct DocEnumerator {
    refs: RefCount,
    db: Retained<Database>,
    state: Lock<EnumState>,
    flags: EnumFlags,
    created_in: Option<TransactionId>,
}

impl RefCounted for DocEnumerator {
    fn ref_count(&self) -> &RefCount {
        &self.refs
    }
}

impl DocEnumerator {
    /// Enumerates documents by ID.
    ///
    /// Inside a transaction the calling thread's uncommitted writes are
    /// included, and the enumerator becomes invalid once that transaction
    /// ends.
    ///
    /// # Errors
    ///
    /// Returns an error if the handle is closed or a range bound cannot be
    /// encoded.
    pub fn new(
        db: &Retained<Database>,
        range: &DocRange,
        options: EnumeratorOptions,
        filter: Option<Box<dyn DocumentFilter>>,
    ) -> CoreResult<Retained<Self>> {
        let flags = EnumFlags::from_bits_truncate(options.flags.bits());
        Self::by_id(db, range, EnumeratorOptions { flags, ..options }, filter)
    }

    pub(crate) fn by_id(
        db: &Retained<Database>,
        range: &DocRange,
        options: EnumeratorOptions,
        filter: Option<Box<dyn DocumentFilter>>,
    ) -> CoreResult<Retained<Self>> {
        let result = range.to_key_range(options.flags).and_then(|keys| {
            db.visible_records(&keys, options.flags.contains(EnumFlags::INCLUDE_PURGED))
        });
        let (mut records, created_in) = match result {
            Ok(found) => found,
            Err(e) => {
                db.record_failure();
                return Err(e);
            }
        };
        if options.flags.contains(EnumFlags::DESCENDING) {
            records.reverse();
        }
        debug!(
            count = records.len(),
            flags = options.flags.bits(),
            "created document enumerator"
        );
        Ok(Self::build(db, records, created_in, options, filter))
    }

    /// Enumerates committed documents changed after `since`, oldest change
    /// first (newest first with [`EnumFlags::DESCENDING`]).
    ///
    /// # Errors
    ///
    /// Returns an error if the handle is closed.
    pub fn changes(
        db: &Retained<Database>,
        since: SequenceNumber,
        options: EnumeratorOptions,
        filter: Option<Box<dyn DocumentFilter>>,
    ) -> CoreResult<Retained<Self>> {
        let flags = EnumFlags::from_bits_truncate(options.flags.bits());
        let mut records = match db.changed_records(since) {
            Ok(records) => records,
            Err(e) => {
                db.record_failure();
                return Err(e);
            }
        };
        if flags.contains(EnumFlags::DESCENDING) {
            records.reverse();
        }
        debug!(since = %since, count = records.len(), "created changes enumerator");
        Ok(Self::build(
            db,
            records,
            None,
            EnumeratorOptions { flags, ..options },
            filter,
        ))
    }

    fn build(
        db: &Retained<Database>,
        records: Vec<Record>,
        created_in: Option<TransactionId>,
        options: EnumeratorOptions,
        filter: Option<Box<dyn DocumentFilter>>,
    ) -> Retained<Self> {
        db.record_enumeration();
        Retained::new(Self {
            refs: RefCount::new(),
            db: db.retain(),
            state: Lock::new(EnumState {
                records: records.into_iter(),
                filter,
                skip_remaining: options.skip,
                phase: EnumeratorPhase::Created,
            }),
            flags: options.flags,
            created_in,
        })
    }

    /// The flags in effect.
    #[must_use]
    pub fn flags(&self) -> EnumFlags {
        self.flags
    }

    /// Current phase.
    pub fn phase(&self) -> EnumeratorPhase {
        lock(&self.state).phase
    }

    /// The database this enumerator reads.
    pub fn database(&self) -> &Retained<Database> {
        &self.db
    }

    /// Moves to the next matching document.
    ///
    /// Returns `Ok(None)` once there are no more documents, and keeps doing
    /// so on every later call. A closed enumerator also returns `Ok(None)`.
    ///
    /// # Errors
    ///
    /// - `NotOpen` if the database was closed
    /// - `EnumeratorInvalidated` if the transaction the enumerator was created
    ///   in has ended
    /// - metadata errors for unreadable stored documents
    pub fn advance(&self) -> CoreResult<Option<Document>> {
        let result = self.advance_inner();
        if result.is_err() {
            self.db.record_failure();
        }
        result
    }

    fn advance_inner(&self) -> CoreResult<Option<Document>> {
        let mut state = lock(&self.state);
        if matches!(
            state.phase,
            EnumeratorPhase::Exhausted | EnumeratorPhase::Closed
        ) {
            return Ok(None);
        }
        self.check_valid()?;

        let with_body = self.flags.contains(EnumFlags::INCLUDE_BODIES);
        while let Some(record) = state.records.next() {
            let doc = Document::from_record(&record, with_body)?;
            if !self.flags_admit(&doc) {
                continue;
            }
            let accepted = match state.filter.as_mut() {
                Some(filter) => filter.accept(&doc, doc.flags(), doc.doc_type()),
                None => true,
            };
            if !accepted {
                continue;
            }
            if state.skip_remaining > 0 {
                state.skip_remaining -= 1;
                continue;
            }
            state.phase = EnumeratorPhase::Positioned;
            return Ok(Some(doc));
        }

        state.phase = EnumeratorPhase::Exhausted;
        Ok(None)
    }

    fn check_valid(&self) -> CoreResult<()> {
        if !self.db.is_open() {
            return Err(CoreError::NotOpen);
        }
        if let Some(created_in) = self.created_in {
            if self.db.current_transaction_id() != Some(created_in) {
                return Err(CoreError::enumerator_invalidated(format!(
                    "{created_in} has ended"
                )));
            }
        }
        Ok(())
    }

    fn flags_admit(&self, doc: &Document) -> bool {
        if doc.purged && !self.flags.contains(EnumFlags::INCLUDE_PURGED) {
            return false;
        }
        if doc.is_deleted() && !self.flags.contains(EnumFlags::INCLUDE_DELETED) {
            return false;
        }
        if !doc.is_conflicted() && !self.flags.contains(EnumFlags::INCLUDE_NON_CONFLICTED) {
            return false;
        }
        true
    }

    /// Releases the filter and the remaining documents. Later calls to
    /// [`advance`](Self::advance) return `Ok(None)`.
    pub fn close(&self) {
        let mut state = lock(&self.state);
        state.filter = None;
        state.records = Vec::new().into_iter();
        state.phase = EnumeratorPhase::Closed;
    }

    /// Iterates over the remaining documents.
    pub fn iter(&self) -> impl Iterator<Item = CoreResult<Document>> + '_ {
        std::iter::from_fn(move || self.advance().transpose())
    }
}

impl fmt::Debug for DocEnumerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocEnumerator")
            .field("refs", &self.refs)
            .field("flags", &self.flags)
            .field("created_in", &self.created_in)
            .finish_non_exhaustive()
    }
}
