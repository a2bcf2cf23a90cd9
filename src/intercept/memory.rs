//! Allocation family dispatch: `malloc`, `calloc`, `realloc`, `free`.
//!
//! Every monitored call is counted, its parameters snapshotted, and one
//! slot of its failure schedule consumed before anything else happens.
//! Blocks that come back non-null are logged in the allocation ledger and
//! their bytes added to `stats.memory.used`; releases do the reverse.
//! Scheduled failures set errno to `ENOMEM`, as the real allocator does.

use libc::c_void;
use tracing::debug;

use super::context::TestContext;
use super::error::Violation;
use super::op::Op;
use super::real;
use super::record::{CallocParams, FreeOutcome, MallocParams, ReallocParams};

impl TestContext {
    pub fn malloc(&mut self, size: usize) -> *mut c_void {
        if !self.is_monitored(Op::Malloc) {
            return real::malloc(size);
        }
        self.stats.malloc.enter(MallocParams { size });
        if let Some(scripted) = self.failures.malloc.next() {
            debug!(size, "malloc: scheduled failure");
            real::set_errno(libc::ENOMEM);
            self.stats.malloc.fail(scripted as usize, Some(libc::ENOMEM));
            return scripted;
        }
        let ptr = real::malloc(size);
        self.stats.malloc.finish(ptr as usize);
        if !ptr.is_null() {
            self.track_block(Op::Malloc, ptr as usize, size);
        }
        ptr
    }

    /// `calloc`. The logged size is `nmemb * size`; an overflowing product
    /// is handed to the real implementation, which refuses it.
    pub fn calloc(&mut self, nmemb: usize, size: usize) -> *mut c_void {
        if !self.is_monitored(Op::Calloc) {
            return real::calloc(nmemb, size);
        }
        self.stats.calloc.enter(CallocParams { nmemb, size });
        if let Some(scripted) = self.failures.calloc.next() {
            debug!(nmemb, size, "calloc: scheduled failure");
            real::set_errno(libc::ENOMEM);
            self.stats.calloc.fail(scripted as usize, Some(libc::ENOMEM));
            return scripted;
        }
        let ptr = real::calloc(nmemb, size);
        self.stats.calloc.finish(ptr as usize);
        if let (false, Some(total)) = (ptr.is_null(), nmemb.checked_mul(size)) {
            self.track_block(Op::Calloc, ptr as usize, total);
        }
        ptr
    }

    /// `realloc`.
    ///
    /// A failed call (scheduled or real) leaves the old block live. A real
    /// `realloc(p, 0)` that returns null has released `p`.
    ///
    /// # Safety
    /// `ptr` must be null or a block obtained from this allocator.
    pub unsafe fn realloc(&mut self, ptr: *mut c_void, size: usize) -> *mut c_void {
        if !self.is_monitored(Op::Realloc) {
            return real::realloc(ptr, size);
        }
        let address = ptr as usize;
        self.stats.realloc.enter(ReallocParams { address, size });
        if let Some(scripted) = self.failures.realloc.next() {
            debug!(address, size, "realloc: scheduled failure");
            real::set_errno(libc::ENOMEM);
            self.stats.realloc.fail(scripted as usize, Some(libc::ENOMEM));
            return scripted;
        }
        let new = real::realloc(ptr, size);
        self.stats.realloc.finish(new as usize);
        if new.is_null() {
            if size == 0 && !ptr.is_null() {
                self.release_for_realloc(address);
            }
            return new;
        }
        if !ptr.is_null() {
            self.release_for_realloc(address);
        }
        self.track_block(Op::Realloc, new as usize, size);
        new
    }

    fn release_for_realloc(&mut self, address: usize) {
        if !self.untrack_block(address) && !self.forget_overflowed(address) {
            self.report(Violation::InvalidRealloc { address });
        }
    }

    /// `free`.
    ///
    /// Null is a no-op. A scheduled failure skips the release entirely. A
    /// block the full ledger could not log is released as untracked. Any
    /// other pointer that is not live is reported and still forwarded.
    ///
    /// # Safety
    /// `ptr` must be null or a live block obtained from this allocator.
    pub unsafe fn free(&mut self, ptr: *mut c_void) {
        if !self.is_monitored(Op::Free) {
            return real::free(ptr);
        }
        let address = ptr as usize;
        self.stats.free.enter(address);
        let injected = self.failures.free.next().is_some();
        if ptr.is_null() {
            self.stats.free.finish(FreeOutcome::Null);
            return;
        }
        if injected {
            debug!(address, "free: scheduled failure, block kept");
            self.stats.free.finish(FreeOutcome::Injected);
            return;
        }
        let outcome = if self.untrack_block(address) {
            FreeOutcome::Released
        } else if self.forget_overflowed(address) {
            debug!(address, "free: block was never logged, ledger was full");
            FreeOutcome::Untracked
        } else {
            self.report(Violation::InvalidFree { address });
            FreeOutcome::Invalid
        };
        self.stats.free.finish(outcome);
        real::free(ptr);
    }
}
