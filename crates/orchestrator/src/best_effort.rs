//! Explicit discard policy for side effects that must not fail their caller.

use std::fmt::Display;
use tracing::warn;

pub trait BestEffort<T> {
    /// Log a failure at `warn` and continue without the value.
    ///
    /// `what` names the operation in the log line, e.g. `"audit append"`.
    fn log_discard(self, what: &str) -> Option<T>;
}

impl<T, E: Display> BestEffort<T> for std::result::Result<T, E> {
    fn log_discard(self, what: &str) -> Option<T> {
        match self {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(operation = what, error = %e, "Best-effort operation failed");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ok_passes_through() {
        let result: Result<u32, String> = Ok(7);
        assert_eq!(result.log_discard("lookup"), Some(7));
    }

    #[test]
    fn test_err_is_discarded() {
        let result: Result<u32, std::io::Error> = Err(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "read-only",
        ));
        assert_eq!(result.log_discard("write"), None);
    }
}
