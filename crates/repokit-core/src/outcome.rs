//! Propagation helpers for `Outcome`-returning async code.
//!
//! `Outcome` has four variants and no `?` support; these macros unwrap the
//! success value or return the other variants unchanged.

/// Unwrap `Outcome::Ok` or return the `Err`/`Cancelled`/`Panicked` variant.
#[macro_export]
macro_rules! try_outcome {
    ($expr:expr) => {
        match $expr {
            $crate::Outcome::Ok(v) => v,
            $crate::Outcome::Err(e) => return $crate::Outcome::Err(e),
            $crate::Outcome::Cancelled(r) => return $crate::Outcome::Cancelled(r),
            $crate::Outcome::Panicked(p) => return $crate::Outcome::Panicked(p),
        }
    };
}

/// Unwrap a `Result` inside a function returning `Outcome`.
#[macro_export]
macro_rules! try_result {
    ($expr:expr) => {
        match $expr {
            Ok(v) => v,
            Err(e) => return $crate::Outcome::Err(e.into()),
        }
    };
}

/// Return `Outcome::Cancelled` if cancellation was requested on `cx`.
///
/// A request raised without a reason is reported as a user cancellation.
#[macro_export]
macro_rules! check_cancelled {
    ($cx:expr) => {
        if $cx.is_cancel_requested() {
            let reason = $cx
                .cancel_reason()
                .unwrap_or_else(|| $crate::CancelReason::new($crate::CancelKind::User));
            return $crate::Outcome::Cancelled(reason);
        }
    };
}
