//! Fixed-capacity byte buffers
//!
//! Every buffer a session owns has its size fixed at compile time. Formatting
//! goes through a bounded writer that keeps counting after the buffer is full,
//! so an oversized result is reported with the length it would have needed
//! instead of being silently truncated.

use crate::{Error, Result};
use core::fmt;
use heapless::Vec;

/// Byte buffer with capacity `N`, never grown and never written past `N`.
///
/// Content lengths are kept strictly below `N`, leaving the last slot free the
/// same way a C string buffer reserves room for its terminator.
pub struct FixedBuffer<const N: usize> {
    bytes: Vec<u8, N>,
}

impl<const N: usize> FixedBuffer<N> {
    /// Create an empty buffer
    pub const fn new() -> Self {
        Self { bytes: Vec::new() }
    }

    /// Total capacity in bytes
    #[inline]
    pub const fn capacity(&self) -> usize {
        N
    }

    /// Number of valid bytes
    #[inline]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Valid content
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn clear(&mut self) {
        self.bytes.clear();
    }

    /// Replace the content with a prefix of `src`, at most `N - 1` bytes.
    ///
    /// Returns the number of bytes copied.
    pub fn copy_from(&mut self, src: &[u8]) -> usize {
        self.bytes.clear();
        let take = src.len().min(N.saturating_sub(1));
        // `take < N`, cannot fail
        let _ = self.bytes.extend_from_slice(&src[..take]);
        take
    }

    /// Replace the content with formatted output.
    ///
    /// Returns the formatted length, or `BufferTooSmall` carrying the length
    /// the output would have required. On failure the buffer is left empty.
    pub fn format(&mut self, args: fmt::Arguments<'_>) -> Result<usize> {
        self.bytes.clear();
        let mut writer = BoundedWriter {
            bytes: &mut self.bytes,
            required: 0,
            overflowed: false,
        };
        // BoundedWriter never reports an error itself; a Display impl that
        // fails leaves `required` short, which the check below still covers.
        let _ = fmt::write(&mut writer, args);
        let required = writer.required;

        if required >= N {
            self.bytes.clear();
            return Err(Error::BufferTooSmall {
                required,
                capacity: N,
            });
        }
        Ok(required)
    }
}

impl<const N: usize> Default for FixedBuffer<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> fmt::Debug for FixedBuffer<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FixedBuffer")
            .field("len", &self.len())
            .field("capacity", &N)
            .finish()
    }
}

/// `fmt::Write` adapter that copies while there is room and counts always
struct BoundedWriter<'a, const N: usize> {
    bytes: &'a mut Vec<u8, N>,
    required: usize,
    overflowed: bool,
}

impl<const N: usize> fmt::Write for BoundedWriter<'_, N> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.required += s.len();
        if !self.overflowed && self.bytes.extend_from_slice(s.as_bytes()).is_err() {
            self.overflowed = true;
        }
        Ok(())
    }
}
