use thiserror::Error;

/// Message-carrying error for crates without a richer failure taxonomy.
///
/// The ledger and scheduler define their own structured enums; this type
/// backs config loading and the [`impl_context!`] helpers.
#[derive(Error, Debug)]
#[error("{message}")]
pub struct Error {
    message: String,
}

impl Error {
    #[must_use]
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl FromMessage for Error {
    fn from_message(message: String) -> Self {
        Self { message }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Constructing an error from a plain message string.
///
/// Implemented by any crate error that wants the `Context` helpers
/// generated by [`impl_context!`].
pub trait FromMessage: Sized {
    fn from_message(message: String) -> Self;
}

/// Generate a crate-local `Context` trait adding `.context()` and
/// `.with_context()` to `Result`, prefixing a message onto the source
/// error's text.
///
/// Invoke in a module that defines `Error: FromMessage` and
/// `type Result<T> = std::result::Result<T, Error>`.
#[macro_export]
macro_rules! impl_context {
    () => {
        pub trait Context<T> {
            fn context(self, context: impl Into<String>) -> Result<T>;
            fn with_context<C, F>(self, f: F) -> Result<T>
            where
                C: Into<String>,
                F: FnOnce() -> C;
        }

        impl<T, E: std::fmt::Display> Context<T> for std::result::Result<T, E> {
            fn context(self, context: impl Into<String>) -> Result<T> {
                let context = context.into();
                self.with_context(|| context)
            }

            fn with_context<C, F>(self, f: F) -> Result<T>
            where
                C: Into<String>,
                F: FnOnce() -> C,
            {
                self.map_err(|source| {
                    <Error as $crate::FromMessage>::from_message(format!(
                        "{}: {source}",
                        f().into()
                    ))
                })
            }
        }
    };
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    crate::impl_context!();

    #[test]
    fn test_context_prefixes_source_text() {
        let read: std::result::Result<(), std::io::Error> =
            Err(std::io::Error::other("disk gone"));
        let err = read.context("loading vigil.toml").unwrap_err();
        assert_eq!(err.to_string(), "loading vigil.toml: disk gone");
    }

    #[test]
    fn test_with_context_not_evaluated_on_ok() {
        let called = std::cell::Cell::new(false);
        let ok: std::result::Result<u32, std::io::Error> = Ok(7);
        let value = ok
            .with_context(|| {
                called.set(true);
                "unused"
            })
            .unwrap();
        assert_eq!(value, 7);
        assert!(!called.get());
    }

    #[test]
    fn test_message_displays_verbatim() {
        assert_eq!(Error::message("bad port").to_string(), "bad port");
    }
}
