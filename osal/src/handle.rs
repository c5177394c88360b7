//! Typed handles to kernel objects.
//!
//! A handle stores the kernel-native identifier shifted by a per-category magic offset, so that a
//! zero-initialized control block (the [`Handle::INVALID`] sentinel) can never be confused with
//! the object the kernel numbered 0.

use core::marker::PhantomData;

use crate::{Error, kernel::NativeId};

/// Category of kernel object a handle refers to.
pub trait Category: Copy {
    /// Offset added to native identifiers. Must be larger than the pool size of the category.
    const MAGIC: u32;
    const NAME: &'static str;
}

macro_rules! category {
    ( $name:ident, $magic:expr, $label:expr ) => {
        #[derive(Clone, Copy, Debug, PartialEq, Eq)]
        pub enum $name {}

        impl Category for $name {
            const MAGIC: u32 = $magic;
            const NAME: &'static str = $label;
        }
    };
}

category!(ThreadCategory, 0x20, "thread");
category!(MutexCategory, 0x20, "mutex");
category!(SemaphoreCategory, 0x20, "semaphore");
category!(QueueCategory, 0x20, "queue");
category!(TimerCategory, 0x20, "timer");

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Handle<C: Category> {
    raw: u32,
    _category: PhantomData<C>,
}

/// Identity of a thread, as returned by [`crate::thread::current`] and [`crate::mutex::Mutex::owner`].
pub type ThreadHandle = Handle<ThreadCategory>;

impl<C: Category> Handle<C> {
    pub const INVALID: Self = Self {
        raw: 0,
        _category: PhantomData,
    };

    /// Wraps a native identifier. Returns `None` if the identifier is too large to be encoded.
    pub fn encode(id: NativeId) -> Option<Self> {
        id.checked_add(C::MAGIC).map(|raw| Self {
            raw,
            _category: PhantomData,
        })
    }

    /// Native identifier of a valid handle.
    pub fn decode(&self) -> Option<NativeId> {
        if self.is_valid() {
            self.raw.checked_sub(C::MAGIC)
        } else {
            None
        }
    }

    pub fn is_valid(&self) -> bool {
        self.raw != Self::INVALID.raw
    }

    pub fn invalidate(&mut self) {
        *self = Self::INVALID;
    }

    /// Native identifier, or `None` for the invalid handle.
    pub fn id(&self) -> Option<NativeId> {
        self.decode()
    }
}

impl<C: Category> Default for Handle<C> {
    fn default() -> Self {
        Self::INVALID
    }
}

/// Native identifier of a handle that operations other than `create` require to be valid.
pub(crate) fn require_valid<C: Category>(handle: &Handle<C>) -> Result<NativeId, Error> {
    handle.decode().ok_or_else(|| misuse::<C>("invalid"))
}

/// Checks that `create` is not called on a control block that still owns a kernel object.
pub(crate) fn require_unused<C: Category>(handle: &Handle<C>) -> Result<(), Error> {
    if handle.is_valid() {
        Err(misuse::<C>("live"))
    } else {
        Ok(())
    }
}

/// Encodes an identifier just returned by the kernel.
pub(crate) fn wrap<C: Category>(id: NativeId) -> Result<Handle<C>, Error> {
    Handle::encode(id).ok_or_else(|| {
        crate::error!("Kernel returned an unencodable {} id {}", C::NAME, id);
        Error::Failed
    })
}

fn misuse<C: Category>(state: &'static str) -> Error {
    #[cfg(feature = "handle-assert")]
    panic!("Operation on {} {} handle", state, C::NAME);

    #[cfg(not(feature = "handle-assert"))]
    {
        crate::error!("Operation on {} {} handle", state, C::NAME);
        Error::InvalidHandle
    }
}
