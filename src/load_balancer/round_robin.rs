//! Round-robin selection with liveness skip.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use crate::load_balancer::backend::Backend;

/// Why no backend could be selected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SelectError {
    #[error("no backends configured")]
    NoBackendsConfigured,
    #[error("none of {checked} backends is alive")]
    NoHealthyBackend { checked: usize },
}

/// Round-robin selector.
///
/// The cursor advances once per selection, so the starting point rotates
/// even when some backends are skipped.
#[derive(Debug, Default)]
pub struct RoundRobin {
    cursor: AtomicUsize,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of selections started so far.
    pub fn cursor(&self) -> usize {
        self.cursor.load(Ordering::Relaxed)
    }

    /// Pick the first live backend at or after the cursor position.
    ///
    /// Each `is_alive` along the way may probe synchronously when that
    /// backend's cache has expired.
    pub async fn next_server(&self, backends: &[Arc<Backend>]) -> Result<Arc<Backend>, SelectError> {
        if backends.is_empty() {
            return Err(SelectError::NoBackendsConfigured);
        }

        let len = backends.len();
        let start = self.cursor.fetch_add(1, Ordering::Relaxed) % len;

        for offset in 0..len {
            let backend = &backends[(start + offset) % len];
            if backend.is_alive().await {
                return Ok(backend.clone());
            }
        }
        Err(SelectError::NoHealthyBackend { checked: len })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use url::Url;
    use crate::http::forward::DemotionPolicy;
    use crate::load_balancer::testing::{RecordingForwarder, ScriptedProbe};

    const WINDOW: Duration = Duration::from_secs(2);

    fn backends(n: usize) -> (Vec<Arc<Backend>>, Vec<Arc<ScriptedProbe>>) {
        (0..n)
            .map(|i| {
                let probe = ScriptedProbe::healthy();
                let backend = Arc::new(Backend::new(
                    Url::parse(&format!("http://127.0.0.1:{}", 8080 + i)).unwrap(),
                    WINDOW,
                    probe.clone(),
                    RecordingForwarder::ok(),
                    DemotionPolicy::AnyError,
                ));
                (backend, probe)
            })
            .unzip()
    }

    fn index_of(backends: &[Arc<Backend>], picked: &Arc<Backend>) -> usize {
        backends.iter().position(|b| Arc::ptr_eq(b, picked)).unwrap()
    }

    #[tokio::test]
    async fn test_round_robin() {
        let lb = RoundRobin::new();
        let (pool, _) = backends(2);

        let s1 = lb.next_server(&pool).await.unwrap();
        assert_eq!(s1.url(), pool[0].url());

        let s2 = lb.next_server(&pool).await.unwrap();
        assert_eq!(s2.url(), pool[1].url());

        let s3 = lb.next_server(&pool).await.unwrap();
        assert_eq!(s3.url(), pool[0].url());
    }

    #[tokio::test]
    async fn test_all_alive_visits_each_once_per_cycle() {
        for n in 1..=7 {
            let lb = RoundRobin::new();
            let (pool, _) = backends(n);

            // Start from an arbitrary cursor value.
            for _ in 0..n / 2 + 1 {
                lb.next_server(&pool).await.unwrap();
            }

            let mut seen = vec![0; n];
            for _ in 0..n {
                let picked = lb.next_server(&pool).await.unwrap();
                seen[index_of(&pool, &picked)] += 1;
            }
            assert!(seen.iter().all(|&c| c == 1), "n={n}: {seen:?}");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_survivor_always_selected() {
        let lb = RoundRobin::new();
        let (pool, probes) = backends(5);
        for (i, backend) in pool.iter().enumerate() {
            if i != 3 {
                backend.set_alive(false);
                probes[i].set_healthy(false);
            }
        }

        for _ in 0..12 {
            let picked = lb.next_server(&pool).await.unwrap();
            assert_eq!(index_of(&pool, &picked), 3);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_none_alive_sweeps_everything() {
        let lb = RoundRobin::new();
        let (pool, probes) = backends(3);
        for probe in &probes {
            probe.set_healthy(false);
        }

        // Let every cache entry expire so each is_alive probes.
        tokio::time::advance(WINDOW).await;

        assert_eq!(
            lb.next_server(&pool).await.unwrap_err(),
            SelectError::NoHealthyBackend { checked: 3 }
        );
        assert!(probes.iter().all(|p| p.calls() == 1));
    }

    #[tokio::test]
    async fn test_empty_pool_does_not_advance_cursor() {
        let lb = RoundRobin::new();
        assert_eq!(
            lb.next_server(&[]).await.unwrap_err(),
            SelectError::NoBackendsConfigured
        );
        assert_eq!(lb.cursor(), 0);
    }

    #[tokio::test]
    async fn test_cursor_advances_once_per_selection_despite_skips() {
        let lb = RoundRobin::new();
        let (pool, _) = backends(3);
        pool[0].set_alive(false);

        // Cursor 0 lands on a dead backend and falls through to index 1.
        let picked = lb.next_server(&pool).await.unwrap();
        assert_eq!(index_of(&pool, &picked), 1);
        assert_eq!(lb.cursor(), 1);

        let picked = lb.next_server(&pool).await.unwrap();
        assert_eq!(index_of(&pool, &picked), 1);
        let picked = lb.next_server(&pool).await.unwrap();
        assert_eq!(index_of(&pool, &picked), 2);
        assert_eq!(lb.cursor(), 3);
    }
}
