//! Version and identifier generation.
//!
//! Three generators, all pure and infallible:
//! - [`next_version`] — process-monotonic version numbers derived from
//!   wall-clock milliseconds
//! - [`next_id`] — globally unique random identifiers (short string or UUID)
//! - [`next_sortable_id`] — time-prefixed identifiers whose lexicographic
//!   order matches creation order
//!
//! # Version Structure
//!
//! ```text
//! | 53 bits: timestamp (ms since Unix epoch) | 10 bits: sequence |
//! ```
//!
//! - **Timestamp**: milliseconds since the Unix epoch
//! - **Sequence**: counter within each millisecond (1024 versions/ms before
//!   the counter spills into the timestamp field, which stays monotonic)
//!
//! # Thread Safety
//!
//! The generator state is a single `AtomicI64` updated through a
//! compare-and-swap loop, so concurrent callers across threads always
//! observe a strictly increasing sequence. A clock that stalls or moves
//! backwards never produces a duplicate: the candidate value is always at
//! least one greater than the last issued version.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use rand::Rng;
use uuid::Uuid;

/// Number of bits reserved for the within-millisecond sequence.
const SEQUENCE_BITS: u32 = 10;

/// Default length of a short random identifier.
const SHORT_ID_LENGTH: usize = 21;

/// Length of the random suffix appended to sortable identifiers.
const SORTABLE_SUFFIX_LENGTH: usize = 8;

/// URL-safe 64-symbol alphabet for short identifiers.
const SHORT_ID_ALPHABET: &[u8] =
    b"useandom-26T198340PX75pxJACKVERYMINDBUSHWOLF_GQZbfghjklqvwyzrict";

/// Last issued version, packed as `(millis << SEQUENCE_BITS) | sequence`.
static LAST_VERSION: AtomicI64 = AtomicI64::new(0);

/// Kind of identifier produced by [`next_id`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IdKind {
    /// Short URL-safe random string (21 characters, 64-symbol alphabet).
    #[default]
    Short,
    /// Standard random (v4) UUID in hyphenated form.
    Uuid,
}

/// Wall-clock milliseconds since the Unix epoch.
///
/// A clock before the epoch reads as zero; monotonicity of the issued
/// versions is preserved by the CAS loop regardless.
fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Returns the next version number for this process.
///
/// Versions are derived from wall-clock milliseconds and are strictly
/// greater than every prior value returned in this process, including calls
/// within the same millisecond and calls racing across threads. When the
/// clock has not advanced (or has regressed), the within-millisecond
/// sequence advances instead.
///
/// # Example
///
/// ```
/// use sediment_types::ids::next_version;
///
/// let a = next_version();
/// let b = next_version();
/// assert!(b > a);
/// ```
pub fn next_version() -> i64 {
    loop {
        let floor = now_millis() << SEQUENCE_BITS;
        let last = LAST_VERSION.load(Ordering::Acquire);
        let candidate = if floor > last { floor } else { last + 1 };
        if LAST_VERSION
            .compare_exchange_weak(last, candidate, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            return candidate;
        }
    }
}

/// Extracts the millisecond timestamp from a version number.
#[must_use]
pub fn version_millis(version: i64) -> i64 {
    version >> SEQUENCE_BITS
}

/// Returns a new globally unique identifier of the requested kind.
///
/// `IdKind::Short` draws 21 characters from a 64-symbol URL-safe alphabet,
/// giving the same collision resistance as a 126-bit random value.
/// `IdKind::Uuid` returns a standard hyphenated random UUID.
#[must_use]
pub fn next_id(kind: IdKind) -> String {
    match kind {
        IdKind::Short => {
            let mut rng = rand::rng();
            (0..SHORT_ID_LENGTH)
                .map(|_| SHORT_ID_ALPHABET[rng.random_range(0..SHORT_ID_ALPHABET.len())] as char)
                .collect()
        }
        IdKind::Uuid => Uuid::new_v4().to_string(),
    }
}

/// Returns a time-prefixed random identifier.
///
/// The prefix is the fixed-width hex encoding of [`next_version`], so the
/// lexicographic order of sortable identifiers from one process equals their
/// creation order exactly. The random suffix keeps identifiers from
/// different processes distinct. Intended for log-like records (transaction
/// ids, event ids) where sort order must be recoverable from the id alone.
#[must_use]
pub fn next_sortable_id() -> String {
    let mut rng = rand::rng();
    let suffix: String = (0..SORTABLE_SUFFIX_LENGTH)
        .map(|_| char::from_digit(rng.random_range(0..16u32), 16).unwrap_or('0'))
        .collect();
    format!("{:016x}{suffix}", next_version())
}
