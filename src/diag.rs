//! Diagnostics through the [`log`] facade.
//!
//! A logger is free to allocate, and when this crate is the global allocator that
//! allocation lands right back here. Each thread carries a flag while it is inside a log
//! call; anything logged while the flag is set is dropped instead of recursing.

use std::cell::Cell;

thread_local! {
    static LOGGING: Cell<bool> = const { Cell::new(false) };
}

/// Runs `emit` unless this thread is already emitting a diagnostic.
pub(crate) fn guarded(emit: impl FnOnce()) {
    // Fails only while the thread is being torn down; we just stay quiet then.
    let _ = LOGGING.try_with(|logging| {
        if logging.replace(true) {
            return;
        }
        emit();
        logging.set(false);
    });
}

/// `log::log!` behind the re-entrancy guard. Never call it with the free list locked.
macro_rules! diag {
    ($level:expr, $($arg:tt)+) => {
        if ::log::log_enabled!($level) {
            $crate::diag::guarded(|| ::log::log!($level, $($arg)+));
        }
    };
}

pub(crate) use diag;
