use futures::StreamExt;
use futures::stream;
use std::future::Future;

/// 以有限的并发度执行一组异步任务，结果按输入顺序返回
pub async fn do_parallel_with_limit<F, T>(futures: Vec<F>, max_parallels: usize) -> Vec<T>
where
    F: Future<Output = T>,
{
    stream::iter(futures)
        .buffered(max_parallels.max(1))
        .collect()
        .await
}

#[cfg(test)]
mod tests {
    use super::do_parallel_with_limit;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_order_and_limit() {
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let futures: Vec<_> = (0..6u64)
            .map(|i| {
                let running = running.clone();
                let peak = peak.clone();
                Box::pin(async move {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(20 - i * 3)).await;
                    running.fetch_sub(1, Ordering::SeqCst);
                    i
                })
            })
            .collect();

        let results = do_parallel_with_limit(futures, 2).await;
        assert_eq!(results, vec![0, 1, 2, 3, 4, 5]);
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_zero_limit_still_runs() {
        let futures = vec![std::future::ready(1), std::future::ready(2)];
        assert_eq!(do_parallel_with_limit(futures, 0).await, vec![1, 2]);
    }
}
