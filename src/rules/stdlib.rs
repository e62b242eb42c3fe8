//! Standard library classification of function names.

/// Whether `function` belongs to the Go standard library
///
/// Without a `/`, a function is library code unless it lives in the
/// application's top-level package. With a `/`, it is library code iff the
/// first path element has no `.` (domain-qualified paths never are).
///
/// # Example
/// ```ignore
/// assert!(is_stdlib("fmt.Println", "main"));
/// assert!(is_stdlib("net/http.(*Server).Serve", "main"));
/// assert!(!is_stdlib("main.main", "main"));
/// assert!(!is_stdlib("github.com/x/y.F", "main"));
/// ```
pub fn is_stdlib(function: &str, app_package: &str) -> bool {
    match function.find('/') {
        Some(slash) => !function[..slash].contains('.'),
        None => !in_package(function, app_package),
    }
}

fn in_package(function: &str, package: &str) -> bool {
    !package.is_empty()
        && function
            .strip_prefix(package)
            .is_some_and(|rest| rest.is_empty() || rest.starts_with('.'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_stdlib_table() {
        let cases = [
            ("fmt.Println", true),
            ("main.main", false),
            ("main.(*server).run.func1", false),
            ("mainline.Run", true),
            ("github.com/x/y.F", false),
            ("net/http.F", true),
            ("internal/poll.(*FD).Read", true),
            ("example.com/pkg.F", false),
        ];
        for (function, expected) in cases {
            assert_eq!(is_stdlib(function, "main"), expected, "{}", function);
        }
    }
}
