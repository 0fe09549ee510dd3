//! The byte channel to the chip.

use std::time::Duration;

/// A half-duplex byte channel to the companion chip.
///
/// Implementations never fail loudly: a failed write reports fewer bytes and a
/// read that times out returns whatever arrived, possibly nothing.
pub trait Transport {
    /// Write bytes, returning how many were accepted.
    fn write(&mut self, data: &[u8]) -> usize;

    /// Number of bytes that can be read without waiting.
    fn pending(&mut self) -> usize;

    /// Read up to `max` bytes, waiting at most `timeout` for the first one.
    fn read(&mut self, max: usize, timeout: Duration) -> Vec<u8>;
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn write(&mut self, data: &[u8]) -> usize {
        (**self).write(data)
    }

    fn pending(&mut self) -> usize {
        (**self).pending()
    }

    fn read(&mut self, max: usize, timeout: Duration) -> Vec<u8> {
        (**self).read(max, timeout)
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn write(&mut self, data: &[u8]) -> usize {
        (**self).write(data)
    }

    fn pending(&mut self) -> usize {
        (**self).pending()
    }

    fn read(&mut self, max: usize, timeout: Duration) -> Vec<u8> {
        (**self).read(max, timeout)
    }
}
