//! External recording sentinel
//!
//! Polls for capture processes this program did not start and reports when
//! that activity appears or disappears.

pub mod process;

pub use process::ProcessTableLister;

use std::collections::BTreeSet;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Enumerates capture processes running outside this session
pub trait CaptureProcessLister: Send + Sync + 'static {
    fn list_active_capture_processes(&self) -> io::Result<BTreeSet<u32>>;
}

/// Reported when external capture activity starts or stops
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentinelChange {
    pub active: bool,
    pub pids: BTreeSet<u32>,
}

/// Change detector over successive polls
pub struct ExternalRecordingSentinel<L> {
    lister: Arc<L>,
    active: bool,
    pids: BTreeSet<u32>,
}

impl<L: CaptureProcessLister> ExternalRecordingSentinel<L> {
    pub fn new(lister: L) -> Self {
        Self {
            lister: Arc::new(lister),
            active: false,
            pids: BTreeSet::new(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn pids(&self) -> &BTreeSet<u32> {
        &self.pids
    }

    /// Poll once on the calling thread
    pub fn poll(&mut self) -> Option<SentinelChange> {
        let result = self.lister.list_active_capture_processes();
        self.observe(result)
    }

    /// Fold one enumeration result into the detector.
    ///
    /// Returns a change only when the active flag flips. A failed
    /// enumeration counts as no external recording.
    pub fn observe(&mut self, result: io::Result<BTreeSet<u32>>) -> Option<SentinelChange> {
        let pids = result.unwrap_or_else(|e| {
            tracing::debug!("Failed to list capture processes: {}", e);
            BTreeSet::new()
        });
        let active = !pids.is_empty();
        let flipped = active != self.active;
        self.active = active;
        self.pids = pids;

        if !flipped {
            return None;
        }
        tracing::info!(
            "External recording {} (pids: {:?})",
            if active { "detected" } else { "ended" },
            self.pids
        );
        Some(SentinelChange {
            active,
            pids: self.pids.clone(),
        })
    }

    /// Poll every `interval` until the receiving side of `notify` closes
    pub fn spawn<M>(mut self, interval: Duration, notify: mpsc::Sender<M>) -> JoinHandle<()>
    where
        M: From<SentinelChange> + Send + 'static,
    {
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                if notify.is_closed() {
                    break;
                }

                let lister = self.lister.clone();
                let result =
                    tokio::task::spawn_blocking(move || lister.list_active_capture_processes())
                        .await
                        .unwrap_or_else(|e| Err(io::Error::new(io::ErrorKind::Other, e)));

                if let Some(change) = self.observe(result) {
                    if notify.send(change.into()).await.is_err() {
                        break;
                    }
                }
            }
            tracing::debug!("External recording sentinel stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::VecDeque;

    /// Replays scripted poll results
    struct ScriptedLister {
        polls: Mutex<VecDeque<io::Result<BTreeSet<u32>>>>,
    }

    impl ScriptedLister {
        fn new(polls: Vec<io::Result<BTreeSet<u32>>>) -> Self {
            Self {
                polls: Mutex::new(polls.into()),
            }
        }
    }

    impl CaptureProcessLister for ScriptedLister {
        fn list_active_capture_processes(&self) -> io::Result<BTreeSet<u32>> {
            self.polls.lock().pop_front().unwrap_or_else(|| Ok(BTreeSet::new()))
        }
    }

    fn pids(ids: &[u32]) -> io::Result<BTreeSet<u32>> {
        Ok(ids.iter().copied().collect())
    }

    #[test]
    fn test_notifies_only_on_flips() {
        let mut sentinel = ExternalRecordingSentinel::new(ScriptedLister::new(vec![
            pids(&[]),
            pids(&[]),
            pids(&[4242]),
            pids(&[4242]),
            pids(&[]),
        ]));

        let notified: Vec<usize> = (0..5)
            .filter_map(|i| sentinel.poll().map(|_| i))
            .collect();
        assert_eq!(notified, vec![2, 4]);
        assert!(!sentinel.is_active());
    }

    #[test]
    fn test_pid_changes_without_flip_are_silent() {
        let mut sentinel =
            ExternalRecordingSentinel::new(ScriptedLister::new(vec![pids(&[1]), pids(&[1, 2])]));
        let first = sentinel.poll().unwrap();
        assert!(first.active);
        assert!(sentinel.poll().is_none());
        assert_eq!(sentinel.pids().len(), 2);
    }

    #[test]
    fn test_enumeration_failure_counts_as_inactive() {
        let mut sentinel = ExternalRecordingSentinel::new(ScriptedLister::new(vec![
            pids(&[7]),
            Err(io::Error::new(io::ErrorKind::NotFound, "ps missing")),
        ]));
        assert!(sentinel.poll().unwrap().active);

        let change = sentinel.poll().unwrap();
        assert!(!change.active);
        assert!(change.pids.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_spawned_sentinel_reports_changes() {
        let sentinel = ExternalRecordingSentinel::new(ScriptedLister::new(vec![
            pids(&[]),
            pids(&[99]),
            pids(&[99]),
            pids(&[]),
        ]));
        let (tx, mut rx) = mpsc::channel::<SentinelChange>(8);
        let handle = sentinel.spawn(Duration::from_millis(100), tx);

        let first = rx.recv().await.unwrap();
        assert!(first.active);
        assert_eq!(first.pids, [99].into_iter().collect());

        let second = rx.recv().await.unwrap();
        assert!(!second.active);

        drop(rx);
        handle.await.unwrap();
    }
}
