//! Register transport abstraction.
//!
//! The device driver (opening a connection, resolving a handle, issuing
//! named register accesses) lives outside this crate. Consumers inject it by
//! implementing [`RegisterChannel`] for their handle type. All methods are
//! **synchronous** and take `&mut self`: one channel is one device handle, and
//! the multi-step sequences built on top of it must not interleave.

use crate::errors::ChannelError;

/// Named register access against a connected device handle.
///
/// Scalar registers carry `f64` values, matching how the device driver
/// reports every numeric register regardless of its native width.
pub trait RegisterChannel: Send {
    /// Read a single named register.
    fn read_named(&mut self, name: &str) -> Result<f64, ChannelError>;

    /// Write a single named register.
    fn write_named(&mut self, name: &str, value: f64) -> Result<(), ChannelError>;

    /// Read exactly `len` bytes from a named byte-array register.
    fn read_named_array(&mut self, name: &str, len: usize) -> Result<Vec<u8>, ChannelError>;

    /// Write `data` to a named byte-array register. `data.len()` is the
    /// length announced to the device.
    fn write_named_array(&mut self, name: &str, data: &[u8]) -> Result<(), ChannelError>;

    /// Read several named registers in one batch.
    ///
    /// The default issues one [`read_named`](Self::read_named) per name;
    /// transports with a native multi-read should override it.
    fn read_names(&mut self, names: &[&str]) -> Result<Vec<f64>, ChannelError> {
        names.iter().map(|name| self.read_named(name)).collect()
    }
}

impl<C: RegisterChannel + ?Sized> RegisterChannel for Box<C> {
    fn read_named(&mut self, name: &str) -> Result<f64, ChannelError> {
        (**self).read_named(name)
    }

    fn write_named(&mut self, name: &str, value: f64) -> Result<(), ChannelError> {
        (**self).write_named(name, value)
    }

    fn read_named_array(&mut self, name: &str, len: usize) -> Result<Vec<u8>, ChannelError> {
        (**self).read_named_array(name, len)
    }

    fn write_named_array(&mut self, name: &str, data: &[u8]) -> Result<(), ChannelError> {
        (**self).write_named_array(name, data)
    }

    fn read_names(&mut self, names: &[&str]) -> Result<Vec<f64>, ChannelError> {
        (**self).read_names(names)
    }
}

/// Coerce a register value to a non-negative integer.
///
/// NaN and negative values become 0; values past `u64::MAX` saturate.
pub fn register_to_u64(value: f64) -> u64 {
    if value.is_nan() || value <= 0.0 {
        0
    } else {
        value as u64
    }
}

/// Like [`register_to_u64`] but saturating at `u32::MAX`.
pub fn register_to_u32(value: f64) -> u32 {
    register_to_u64(value).min(u64::from(u32::MAX)) as u32
}
