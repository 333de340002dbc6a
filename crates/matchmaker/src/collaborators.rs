//! Seams for external collaborators: crash reporting and identity verification.

use crate::error::ServiceError;
use async_trait::async_trait;
use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use tracing::error;

/// Receives failures caught at a handler boundary.
pub trait CrashReporter: Send + Sync {
    fn capture_error(&self, context: &str, error: &ServiceError);
    fn capture_panic(&self, context: &str, message: &str);
}

/// Records crashes to the error log. Used when no external reporter is wired.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingCrashReporter;

impl CrashReporter for TracingCrashReporter {
    fn capture_error(&self, context: &str, error: &ServiceError) {
        error!(context, error = %error, "💥 Unexpected handler failure");
    }

    fn capture_panic(&self, context: &str, message: &str) {
        error!(context, panic = message, "💥 Handler panicked");
    }
}

/// Resolves an identity token to a subject id.
#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    /// Returns the subject id, or `None` if the token is not valid.
    async fn verify(&self, token: &str) -> Option<String>;
}

/// Rejects every token. Stands in until an identity provider is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct RejectAllVerifier;

#[async_trait]
impl IdentityVerifier for RejectAllVerifier {
    async fn verify(&self, _token: &str) -> Option<String> {
        None
    }
}

/// Runs `fut`, converting a panic into [`ServiceError::Unexpected`].
///
/// Unexpected errors, whether returned or caught as panics, are handed to the
/// crash reporter before being returned.
pub async fn guarded<F, T>(
    reporter: &dyn CrashReporter,
    context: &str,
    fut: F,
) -> Result<T, ServiceError>
where
    F: Future<Output = Result<T, ServiceError>>,
{
    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(error)) => {
            if error.is_unexpected() {
                reporter.capture_error(context, &error);
            }
            Err(error)
        }
        Err(panic) => {
            let message = panic_message(panic.as_ref());
            reporter.capture_panic(context, &message);
            Err(ServiceError::Unexpected(message))
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingReporter {
        events: Mutex<Vec<String>>,
    }

    impl CrashReporter for RecordingReporter {
        fn capture_error(&self, context: &str, error: &ServiceError) {
            self.events.lock().unwrap().push(format!("{context}: {error}"));
        }

        fn capture_panic(&self, context: &str, message: &str) {
            self.events.lock().unwrap().push(format!("{context} panic: {message}"));
        }
    }

    #[tokio::test]
    async fn panics_become_unexpected_errors() {
        let reporter = RecordingReporter::default();
        let result: Result<(), _> = guarded(&reporter, "RequestGame", async {
            if reporter.events.lock().unwrap().is_empty() {
                panic!("boom");
            }
            Ok(())
        })
        .await;

        assert_eq!(result, Err(ServiceError::Unexpected("boom".into())));
        assert_eq!(reporter.events.lock().unwrap().as_slice(), ["RequestGame panic: boom"]);
    }

    #[tokio::test]
    async fn expected_errors_are_not_reported() {
        let reporter = RecordingReporter::default();
        let result: Result<(), _> = guarded(&reporter, "RequestGame", async {
            Err(ServiceError::Capacity("servers full".into()))
        })
        .await;

        assert!(result.is_err());
        assert!(reporter.events.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn reject_all_verifier_rejects() {
        assert_eq!(RejectAllVerifier.verify("token").await, None);
    }
}
