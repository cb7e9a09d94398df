//! Binary layout of a distinct exception record.
//!
//! ```text
//!  0               4                               12
//!  +---------------+-------------------------------+
//!  | obs. count    | first observation timestamp   |
//!  +---------------+---------------+---------------+---------------+
//!  12                              20              24
//!  | last observation timestamp    | encoded len   | encoded bytes ...
//!  +-------------------------------+---------------+----------------
//! ```
//!
//! Records start on [`RECORD_ALIGNMENT`] boundaries. The region places its
//! byte 0 four bytes past an 8-byte boundary, so with this stride every
//! header field sits at its natural alignment for atomic access.
//!
//! The padding is part of the format: the next record starts at
//! `record_stride(len)`, not at `24 + len`. Images written with an unpadded
//! layout cannot be read with this one, and the reverse. Only the last record
//! in a region may end short of a full stride, when `24 + len` fits the
//! capacity but the padded stride does not.

/// Offset of the `u32` observation counter.
pub const OBSERVATION_COUNT_OFFSET: usize = 0;

/// Offset of the `i64` first observation timestamp.
pub const FIRST_OBSERVATION_TIMESTAMP_OFFSET: usize = 4;

/// Offset of the `i64` last observation timestamp.
pub const LAST_OBSERVATION_TIMESTAMP_OFFSET: usize = 12;

/// Offset of the `u32` encoded length. Zero means the slot is unpublished.
pub const ENCODED_LENGTH_OFFSET: usize = 20;

/// Offset of the encoded description bytes.
pub const ENCODED_BYTES_OFFSET: usize = 24;

/// Size of the fixed record header in bytes.
pub const HEADER_LENGTH: usize = ENCODED_BYTES_OFFSET;

/// Every record starts on a multiple of this many bytes.
pub const RECORD_ALIGNMENT: usize = 8;

/// Rounds `value` up to the next multiple of `alignment` (a power of two).
#[inline]
pub const fn align_up(value: usize, alignment: usize) -> usize {
    (value + alignment - 1) & !(alignment - 1)
}

/// Distance from the start of a record to the start of the next one.
#[inline]
pub const fn record_stride(encoded_length: usize) -> usize {
    align_up(HEADER_LENGTH + encoded_length, RECORD_ALIGNMENT)
}

/// Returns true if a header starting at `offset` fits inside `capacity`.
#[inline]
pub const fn header_fits(offset: usize, capacity: usize) -> bool {
    offset + HEADER_LENGTH <= capacity
}
