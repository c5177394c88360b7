//! Message queues of fixed-size items.
//!
//! The item size is read back from the kernel on every transfer and never stored in the control
//! block. Waiting in interrupt context is the caller's responsibility, as with mutexes.

use crate::{
    Error, bound_kernel, creation_failure,
    handle::{self, Handle, QueueCategory},
    kernel::{Kernel, NativeId},
    kernel_failure,
    time::wait_ticks,
};

/// Control block of a queue.
#[derive(Debug, Default)]
pub struct Queue {
    handle: Handle<QueueCategory>,
}

impl Queue {
    pub const fn new() -> Self {
        Self {
            handle: Handle::INVALID,
        }
    }

    /// Creates a queue holding up to `len` items of `item_size` bytes each.
    ///
    /// Both values are limited to 16 bits.
    pub fn create(&mut self, len: u32, item_size: u32) -> Result<(), Error> {
        handle::require_unused(&self.handle)?;

        let (Ok(len), Ok(item_size)) = (u16::try_from(len), u16::try_from(item_size)) else {
            crate::error!("Queue length {} or item size {} too large", len, item_size);
            return Err(Error::InvalidArgument);
        };

        let id = bound_kernel()?
            .queue_create(len, item_size)
            .map_err(|err| creation_failure(err, "queue", "queue limit"))?;
        self.handle = handle::wrap(id)?;

        crate::debug!("Queue #{} created ({} x {} bytes)", id, len, item_size);

        Ok(())
    }

    pub fn delete(&mut self) -> Result<(), Error> {
        let id = handle::require_valid(&self.handle)?;
        bound_kernel()?.queue_delete(id).map_err(kernel_failure)?;
        self.handle.invalidate();

        crate::debug!("Queue #{} deleted", id);

        Ok(())
    }

    /// Copies one item from the front of `item` into the queue, blocking for up to `wait_ms`
    /// milliseconds while it is full.
    pub fn send(&self, item: &[u8], wait_ms: u32) -> Result<(), Error> {
        let id = handle::require_valid(&self.handle)?;
        let kernel = bound_kernel()?;

        let size = live_item_size(kernel, id)?;
        let Some(item) = item.get(..size) else {
            crate::error!("Item of {} bytes is shorter than {}", item.len(), size);
            return Err(Error::InvalidArgument);
        };

        kernel
            .queue_write(id, item, wait_ticks(wait_ms, kernel.tick_frequency()))
            .map_err(kernel_failure)
    }

    /// Moves the oldest item into the front of `buf`, blocking for up to `wait_ms` milliseconds
    /// while the queue is empty.
    pub fn receive(&self, buf: &mut [u8], wait_ms: u32) -> Result<(), Error> {
        let id = handle::require_valid(&self.handle)?;
        let kernel = bound_kernel()?;

        let size = live_item_size(kernel, id)?;
        let buf_len = buf.len();
        let Some(buf) = buf.get_mut(..size) else {
            crate::error!("Buffer of {} bytes is shorter than {}", buf_len, size);
            return Err(Error::InvalidArgument);
        };

        kernel
            .queue_read(id, buf, wait_ticks(wait_ms, kernel.tick_frequency()))
            .map_err(kernel_failure)?;

        Ok(())
    }

    /// Size of one item, as recorded by the kernel.
    pub fn item_size(&self) -> Result<usize, Error> {
        let id = handle::require_valid(&self.handle)?;
        live_item_size(bound_kernel()?, id)
    }

    pub fn is_valid(&self) -> bool {
        self.handle.is_valid()
    }

    pub fn set_invalid(&mut self) {
        self.handle.invalidate();
    }
}

fn live_item_size(kernel: &dyn Kernel, id: NativeId) -> Result<usize, Error> {
    kernel
        .queue_item_size(id)
        .map(usize::from)
        .map_err(kernel_failure)
}
