//! The viaduct error type.
//!

use std::fmt::Display;

/// Viaduct's error type.
///
/// Configuration-time variants (`InvalidPattern`, `DuplicateRoute`,
/// `ParameterNameConflict`) are raised synchronously by [`Router`
/// ](../http/router/struct.Router.html) mutators.  Request-time variants are
/// converted to HTTP responses by the outermost [error catcher
/// ](../http/middleware/fn.catcher.html).
///
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Error {
    /// A second read of a single-shot request or response body.
    ///
    BodyAlreadyConsumed,

    /// The peer went away and the request future was canceled.  Never
    /// converted to a response; adapters drop the connection.
    ///
    Canceled(String),

    /// The same pattern and method registered twice.
    ///
    DuplicateRoute(String),

    /// A handler failed for any reason not covered by the other variants.
    /// The text is logged, never sent to the client.
    ///
    Handler(String),

    /// A typed header accessor was used and the raw value did not parse.
    ///
    InvalidHeader(String),

    /// The input cannot be accepted.
    ///
    InvalidInput(String),

    /// A raw request path that cannot be normalized, e.g. attempted
    /// traversal above the root.
    ///
    InvalidPath(String),

    /// A malformed route pattern, rejected when the route is added.
    ///
    InvalidPattern(String),

    /// Two patterns with differently named parameters at the same depth.
    ///
    ParameterNameConflict(String),

    /// Unspecified error.
    ///
    Other(String),

    /// An unexplainable bug, stop execution as graceful as possible.
    ///
    ThisCannotHappen(String),
}

impl Error {
    /// Create an `Error::Canceled`.
    ///
    pub fn canceled<T: Display>(text: T) -> Self {
        Self::Canceled(text.to_string())
    }

    /// Create an `Error::DuplicateRoute`.
    ///
    pub fn duplicate_route<T: Display>(text: T) -> Self {
        Self::DuplicateRoute(text.to_string())
    }

    /// Create an `Error::Handler`.
    ///
    pub fn handler<T: Display>(text: T) -> Self {
        Self::Handler(text.to_string())
    }

    /// Create an `Error::InvalidHeader`.
    ///
    pub fn invalid_header<T: Display>(text: T) -> Self {
        Self::InvalidHeader(text.to_string())
    }

    /// Create an `Error::InvalidInput`.
    ///
    pub fn invalid_input<T: Display>(text: T) -> Self {
        Self::InvalidInput(text.to_string())
    }

    /// Create an `Error::InvalidPath`.
    ///
    pub fn invalid_path<T: Display>(text: T) -> Self {
        Self::InvalidPath(text.to_string())
    }

    /// Create an `Error::InvalidPattern`.
    ///
    pub fn invalid_pattern<T: Display>(text: T) -> Self {
        Self::InvalidPattern(text.to_string())
    }

    /// The variant is [`Canceled`](#variant.Canceled).
    ///
    pub fn is_canceled(&self) -> bool {
        matches!(self, Error::Canceled(_))
    }

    /// The variant is one of the configuration-time errors raised by
    /// [`Router`](../http/router/struct.Router.html) mutators.
    ///
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Error::DuplicateRoute(_)
                | Error::InvalidPattern(_)
                | Error::ParameterNameConflict(_)
        )
    }

    /// Create an `Error::Other`.
    ///
    pub fn other<T: Display>(text: T) -> Self {
        Self::Other(text.to_string())
    }

    /// Create an `Error::ParameterNameConflict`.
    ///
    pub fn parameter_name_conflict<T: Display>(text: T) -> Self {
        Self::ParameterNameConflict(text.to_string())
    }

    /// Create an `Error::ThisCannotHappen`.
    ///
    pub fn this_cannot_happen<T: Display>(text: T) -> Self {
        Self::ThisCannotHappen(text.to_string())
    }
}

/// Map the error of a `Result` to the given [`Error`](enum.Error.html)
/// variant, `to_string()`-ing the original error.
///
#[macro_export]
macro_rules! map_error {
    ($variant: ident, $result: expr $( , )? ) => {
        ($result).map_err(|e| $crate::Error::$variant(e.to_string()))
    };
}

impl std::error::Error for Error {}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::BodyAlreadyConsumed => {
                write!(f, "body already consumed")
            }
            Error::Canceled(s) => write!(f, "canceled: {}", s),
            Error::DuplicateRoute(s) => write!(f, "duplicate route: {}", s),
            Error::Handler(s) => write!(f, "handler error: {}", s),
            Error::InvalidHeader(s) => write!(f, "invalid header: {}", s),
            Error::InvalidInput(s) => write!(f, "invalid input: {}", s),
            Error::InvalidPath(s) => write!(f, "invalid path: {}", s),
            Error::InvalidPattern(s) => write!(f, "invalid pattern: {}", s),
            Error::Other(s) => write!(f, "{}", s),
            Error::ParameterNameConflict(s) => {
                write!(f, "parameter name conflict: {}", s)
            }
            Error::ThisCannotHappen(s) => {
                write!(f, "this cannot happen: {}", s)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_the_problem() {
        assert_eq!(
            Error::invalid_path("/..").to_string(),
            "invalid path: /..",
        );
        assert_eq!(
            Error::BodyAlreadyConsumed.to_string(),
            "body already consumed",
        );
    }

    #[test]
    fn configuration_errors_are_recognized() {
        assert!(Error::duplicate_route("GET /a").is_configuration());
        assert!(Error::invalid_pattern("/**/x").is_configuration());
        assert!(Error::parameter_name_conflict(":a/:b").is_configuration());
        assert!(!Error::handler("boom").is_configuration());
        assert!(!Error::canceled("gone").is_configuration());
    }

    #[test]
    fn map_error_converts_foreign_errors() {
        let parsed: Result<u32, _> =
            map_error!(InvalidHeader, "nope".parse::<u32>());
        assert!(matches!(parsed, Err(Error::InvalidHeader(_))));
    }
}
