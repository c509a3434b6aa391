//! Concurrent fan-out across backends with cancellation and per-task deadlines.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::error::{GatewayError, Result};

/// A fan-out task: takes the shared cancellation token, returns a boxed future so a
/// single `Vec` can hold tasks of differing captures.
pub type Task<T> = Box<dyn FnOnce(CancellationToken) -> Pin<Box<dyn Future<Output = Result<T>> + Send>> + Send>;

/// Boxes an async closure into a [`Task`].
pub fn task<T, F, Fut>(f: F) -> Task<T>
where
    F: FnOnce(CancellationToken) -> Fut + Send + 'static,
    Fut: Future<Output = Result<T>> + Send + 'static,
{
    Box::new(move |tok| Box::pin(f(tok)))
}

/// Runs `tasks` concurrently under a shared deadline, returning results in the same
/// order the tasks were submitted, regardless of completion order. If
/// `cancel_on_first_error` is set and any task fails, remaining tasks are cancelled and
/// their slots become errors.
pub async fn fan_out<T>(
    tasks: Vec<Task<T>>,
    deadline: Duration,
    cancel_on_first_error: bool,
) -> Vec<Result<T>>
where
    T: Send + 'static,
{
    let token = CancellationToken::new();
    let mut set = JoinSet::new();
    for (index, task) in tasks.into_iter().enumerate() {
        let task_token = token.clone();
        set.spawn(async move {
            let result = tokio::time::timeout(deadline, task(task_token)).await;
            let result = match result {
                Ok(inner) => inner,
                Err(_) => Err(GatewayError::unavailable("backend call exceeded its deadline")),
            };
            (index, result)
        });
    }

    let mut slots: Vec<Option<Result<T>>> = (0..set.len()).map(|_| None).collect();
    while let Some(joined) = set.join_next().await {
        let (index, result) = match joined {
            Ok(pair) => pair,
            Err(e) => {
                warn!(error = %e, "fan-out task panicked");
                continue;
            }
        };
        let failed = result.is_err();
        slots[index] = Some(result);
        if failed && cancel_on_first_error {
            token.cancel();
        }
    }

    slots
        .into_iter()
        .map(|slot| slot.unwrap_or_else(|| Err(GatewayError::unavailable("backend task was cancelled before completion"))))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn results_preserve_submission_order_regardless_of_completion_order() {
        let results = fan_out(
            vec![
                task(|_tok: CancellationToken| async move {
                    tokio::time::sleep(Duration::from_millis(30)).await;
                    Ok::<_, GatewayError>(1)
                }),
                task(|_tok: CancellationToken| async move { Ok::<_, GatewayError>(2) }),
            ],
            Duration::from_secs(1),
            false,
        )
        .await;

        let values: Vec<i32> = results.into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(values, vec![1, 2]);
    }

    #[tokio::test]
    async fn deadline_exceeded_yields_unavailable_for_that_slot_only() {
        let results = fan_out(
            vec![
                task(|_tok: CancellationToken| async move {
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    Ok::<_, GatewayError>(1)
                }),
                task(|_tok: CancellationToken| async move { Ok::<_, GatewayError>(2) }),
            ],
            Duration::from_millis(20),
            false,
        )
        .await;

        assert!(results[0].is_err());
        assert_eq!(*results[1].as_ref().unwrap(), 2);
    }

    #[tokio::test]
    async fn cancel_on_first_error_signals_remaining_tasks() {
        let results: Vec<Result<i32>> = fan_out(
            vec![
                task(|_tok: CancellationToken| async move { Err(GatewayError::unavailable("boom")) }),
                task(|tok: CancellationToken| async move {
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    if tok.is_cancelled() {
                        Err(GatewayError::unavailable("cancelled"))
                    } else {
                        Ok(2)
                    }
                }),
            ],
            Duration::from_secs(1),
            true,
        )
        .await;

        assert!(results[0].is_err());
        assert!(results[1].is_err());
    }
}
