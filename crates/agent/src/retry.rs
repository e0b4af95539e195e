use std::future::Future;

use tracing::warn;

use hostline_core::errors::ApplicationError;

pub const MAX_ATTEMPTS: u32 = 3;

/// Re-runs a unit of work that lost a unique-index race. Any other error is returned as is.
pub async fn retry_on_conflict<T, F, Fut>(operation: &str, mut unit: F) -> Result<T, ApplicationError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ApplicationError>>,
{
    let mut attempt = 1;
    loop {
        match unit().await {
            Err(ApplicationError::Conflict(detail)) if attempt < MAX_ATTEMPTS => {
                warn!(
                    event_name = "unit_of_work.retry",
                    operation,
                    attempt,
                    detail = %detail,
                    "unit of work hit a conflicting write, retrying"
                );
                attempt += 1;
            }
            result => return result,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use hostline_core::errors::ApplicationError;

    use super::{retry_on_conflict, MAX_ATTEMPTS};

    #[tokio::test]
    async fn conflicts_are_retried_up_to_the_limit() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = retry_on_conflict("test", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(ApplicationError::Conflict("idx".to_string()))
        })
        .await;
        assert!(matches!(result, Err(ApplicationError::Conflict(_))));
        assert_eq!(calls.load(Ordering::SeqCst), MAX_ATTEMPTS);
    }

    #[tokio::test]
    async fn other_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let result = retry_on_conflict("test", || async {
            let seen = calls.fetch_add(1, Ordering::SeqCst);
            if seen == 0 {
                Err(ApplicationError::Conflict("idx".to_string()))
            } else {
                Err::<u8, _>(ApplicationError::Persistence("disk".to_string()))
            }
        })
        .await;
        assert!(matches!(result, Err(ApplicationError::Persistence(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
