use core::fmt;

/// A packed 64-bit Snowflake-style identifier.
///
/// The value is always non-negative: the sign bit is reserved and never set,
/// so ids order correctly both as `i64` and as unsigned bytes.
///
/// ## Bit layout
///
/// The id is packed from **MSB to LSB**:
///
/// ```text
///  Bit Index:  high bits                                  low bits
///              +----------+----------------+-------------+---------------+
///  Field:      | sign (1) | timestamp (41) | worker (12) | sequence (10) |
///              +----------+----------------+-------------+---------------+
///              |<------------- MSB -- 64 bits -- LSB ------------------->|
/// ```
///
/// - `timestamp`: milliseconds since a custom epoch (41 bits, ~69 years)
/// - `worker`: the process's leased worker slot (12 bits)
/// - `sequence`: per-millisecond counter (10 bits, 1024 ids/ms/worker)
///
/// Note that the declared worker field (12 bits, 4096 workers) is wider than
/// the slot range any lease backend ever scans (`0..32`, see
/// [`SLOT_RANGE`]). This mirrors the reference layout; see the repository
/// design notes before changing either side.
///
/// [`SLOT_RANGE`]: crate::lease::SLOT_RANGE
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SnowflakeId {
    id: i64,
}

const _: () = {
    // Compile-time check: fields plus the sign bit _must_ fill the backing
    // type. This is to avoid aliasing surprises.
    assert!(
        1 + SnowflakeId::TIMESTAMP_BITS + SnowflakeId::WORKER_ID_BITS + SnowflakeId::SEQUENCE_BITS
            == i64::BITS,
        "Snowflake layout must fill exactly 63 value bits"
    );
};

impl SnowflakeId {
    pub const TIMESTAMP_BITS: u32 = 41;
    pub const WORKER_ID_BITS: u32 = 12;
    pub const SEQUENCE_BITS: u32 = 10;

    pub const SEQUENCE_SHIFT: u32 = 0;
    pub const WORKER_ID_SHIFT: u32 = Self::SEQUENCE_SHIFT + Self::SEQUENCE_BITS;
    pub const TIMESTAMP_SHIFT: u32 = Self::WORKER_ID_SHIFT + Self::WORKER_ID_BITS;

    pub const TIMESTAMP_MASK: i64 = (1 << Self::TIMESTAMP_BITS) - 1;
    pub const WORKER_ID_MASK: i64 = (1 << Self::WORKER_ID_BITS) - 1;
    pub const SEQUENCE_MASK: i64 = (1 << Self::SEQUENCE_BITS) - 1;

    /// Packs the three components into an id.
    ///
    /// Components are masked to their declared widths; callers are expected
    /// to pass in-range values (the generator enforces this upstream).
    pub const fn from_components(timestamp: i64, worker_id: i64, sequence: i64) -> Self {
        let t = (timestamp & Self::TIMESTAMP_MASK) << Self::TIMESTAMP_SHIFT;
        let w = (worker_id & Self::WORKER_ID_MASK) << Self::WORKER_ID_SHIFT;
        let s = (sequence & Self::SEQUENCE_MASK) << Self::SEQUENCE_SHIFT;
        Self { id: t | w | s }
    }

    /// Extracts the timestamp delta (milliseconds since the custom epoch).
    pub const fn timestamp(&self) -> i64 {
        (self.id >> Self::TIMESTAMP_SHIFT) & Self::TIMESTAMP_MASK
    }

    /// Extracts the worker id.
    pub const fn worker_id(&self) -> i64 {
        (self.id >> Self::WORKER_ID_SHIFT) & Self::WORKER_ID_MASK
    }

    /// Extracts the sequence number.
    pub const fn sequence(&self) -> i64 {
        (self.id >> Self::SEQUENCE_SHIFT) & Self::SEQUENCE_MASK
    }

    /// Returns the maximum representable timestamp delta.
    pub const fn max_timestamp() -> i64 {
        Self::TIMESTAMP_MASK
    }

    /// Returns the maximum representable worker id.
    pub const fn max_worker_id() -> i64 {
        Self::WORKER_ID_MASK
    }

    /// Returns the maximum representable sequence value.
    pub const fn max_sequence() -> i64 {
        Self::SEQUENCE_MASK
    }

    /// Converts this id into its raw `i64` representation.
    pub const fn to_raw(&self) -> i64 {
        self.id
    }

    /// Converts a raw `i64` into an id.
    pub const fn from_raw(raw: i64) -> Self {
        Self { id: raw }
    }
}

impl fmt::Display for SnowflakeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id)
    }
}

impl fmt::Debug for SnowflakeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SnowflakeId")
            .field("timestamp", &self.timestamp())
            .field("worker_id", &self.worker_id())
            .field("sequence", &self.sequence())
            .finish()
    }
}

impl From<SnowflakeId> for i64 {
    fn from(id: SnowflakeId) -> Self {
        id.to_raw()
    }
}
