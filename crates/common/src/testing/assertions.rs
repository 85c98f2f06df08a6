//! Assertion macros for error-heavy client code.

/// Assert that a `Result` is an error whose display text contains a substring
///
/// ```ignore
/// let result: Result<(), String> = Err("Error 401: token expired".to_string());
/// ledgerlink_common::assert_error_contains!(result, "401");
/// ```
#[macro_export]
macro_rules! assert_error_contains {
    ($result:expr, $substring:expr) => {
        match &$result {
            Ok(_) => panic!("Expected error but got Ok"),
            Err(e) => {
                let error_msg = format!("{}", e);
                assert!(
                    error_msg.contains($substring),
                    "Error message '{}' does not contain '{}'",
                    error_msg,
                    $substring
                );
            }
        }
    };
}

/// Assert that a `Result` is an error matching a pattern
///
/// ```ignore
/// #[derive(Debug)]
/// enum E { Busy(u32), Gone }
/// let result: Result<(), E> = Err(E::Busy(3));
/// ledgerlink_common::assert_error_matches!(result, E::Busy(n) if n == 3);
/// ```
#[macro_export]
macro_rules! assert_error_matches {
    ($result:expr, $pattern:pat $(if $guard:expr)?) => {
        match $result {
            Ok(_) => panic!("Expected error but got Ok"),
            Err(e) => {
                assert!(
                    matches!(e, $pattern $(if $guard)?),
                    "Error {:?} does not match {}",
                    e,
                    stringify!($pattern)
                );
            }
        }
    };
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_assert_error_contains_passes_on_substring() {
        let result: Result<(), String> = Err("lock held by pid 42".to_string());
        crate::assert_error_contains!(result, "pid 42");
    }

    #[test]
    #[should_panic(expected = "Expected error but got Ok")]
    fn test_assert_error_contains_panics_on_ok() {
        let result: Result<(), String> = Ok(());
        crate::assert_error_contains!(result, "anything");
    }

    #[test]
    fn test_assert_error_matches_with_guard() {
        let result: Result<(), std::io::ErrorKind> = Err(std::io::ErrorKind::AlreadyExists);
        crate::assert_error_matches!(result, std::io::ErrorKind::AlreadyExists);
    }
}
