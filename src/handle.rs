//! Exclusive ownership over paired-construct/destruct engine resources.

use core::mem;
use core::ptr;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::Status;

static LIVE_RESOURCES: AtomicUsize = AtomicUsize::new(0);

/// Number of resource storages currently held by any [`ResourceHandle`].
///
/// Returns to its previous value once every handle has been cleared or
/// discarded; leak tests compare against a baseline taken up front.
pub fn live_resources() -> usize {
    LIVE_RESOURCES.load(Ordering::SeqCst)
}

/// An engine-side resource with a paired teardown step.
///
/// `Default` provides the blank storage that the paired construct step
/// fills in; [`Resource::destruct`] releases whatever engine state the
/// construct step acquired. The handle guarantees `destruct` runs exactly
/// once per constructed resource.
pub trait Resource: Default {
    /// Tear down engine-side state.
    ///
    /// Runs on a control thread, never on the audio thread.
    fn destruct(&mut self);
}

/// Exclusive-ownership wrapper around a heap-allocated resource.
///
/// Holds zero or one resource. Moving the handle transfers the resource;
/// the moved-from handle observed through [`ResourceHandle::take`] is
/// empty. There is no `Clone`: resource identity is unique.
///
/// A failed construct leaves the partially-built storage held so the
/// caller can inspect it; the caller must then [`ResourceHandle::discard`]
/// it rather than leave it live (the handle does not roll back on its own).
///
/// None of these operations may be called from the audio callback.
pub struct ResourceHandle<R: Resource> {
    raw: *mut R,
}

unsafe impl<R: Resource + Send> Send for ResourceHandle<R> {}

impl<R: Resource> ResourceHandle<R> {
    /// An empty handle. Does not allocate.
    pub const fn empty() -> Self {
        Self {
            raw: ptr::null_mut(),
        }
    }

    /// Destroys any held resource, allocates fresh storage, and runs
    /// `construct` against it. The construct status is returned as-is;
    /// on failure the storage stays held for the caller to `discard`.
    pub fn emplace<F>(&mut self, construct: F) -> Status
    where
        F: FnOnce(&mut R) -> Status,
    {
        self.clear();
        let raw = Box::into_raw(Box::new(R::default()));
        LIVE_RESOURCES.fetch_add(1, Ordering::SeqCst);
        self.raw = raw;
        // Unique: the pointer was created just above and is not shared yet.
        construct(unsafe { &mut *raw })
    }

    /// Replaces the held resource with an already-constructed pointer,
    /// destroying the previous one. `ptr` must be null or originate from
    /// [`ResourceHandle::release`] on a handle of the same resource type.
    pub fn reset(&mut self, ptr: *mut R) {
        self.clear();
        self.raw = ptr;
    }

    /// Relinquishes ownership without destruction, leaving the handle empty.
    pub fn release(&mut self) -> *mut R {
        mem::replace(&mut self.raw, ptr::null_mut())
    }

    /// Frees the storage of a resource whose construct step failed,
    /// skipping `destruct`. No-op when empty.
    pub fn discard(&mut self) {
        let raw = self.release();
        if !raw.is_null() {
            // Reclaims the Box from emplace; field drops still run.
            unsafe { drop(Box::from_raw(raw)) };
            LIVE_RESOURCES.fetch_sub(1, Ordering::SeqCst);
        }
    }

    /// Runs `destruct`, then frees the storage. No-op when empty.
    pub fn clear(&mut self) {
        let raw = self.release();
        if !raw.is_null() {
            unsafe {
                (*raw).destruct();
                drop(Box::from_raw(raw));
            }
            LIVE_RESOURCES.fetch_sub(1, Ordering::SeqCst);
        }
    }

    /// Moves the resource into a fresh handle, leaving `self` empty.
    pub fn take(&mut self) -> Self {
        Self {
            raw: self.release(),
        }
    }

    pub fn get(&self) -> Option<&R> {
        // Held resources are only mutated through `get_mut` or backend
        // audio-thread access serialized by the graph lock.
        unsafe { self.raw.as_ref() }
    }

    pub fn get_mut(&mut self) -> Option<&mut R> {
        unsafe { self.raw.as_mut() }
    }

    /// Raw storage pointer; null when empty. Identity comparison between
    /// handles is done through this pointer.
    pub fn as_ptr(&self) -> *mut R {
        self.raw
    }

    pub fn is_empty(&self) -> bool {
        self.raw.is_null()
    }
}

impl<R: Resource> Default for ResourceHandle<R> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<R: Resource> Drop for ResourceHandle<R> {
    fn drop(&mut self) {
        self.clear();
    }
}
