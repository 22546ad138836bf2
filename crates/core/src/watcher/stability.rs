//! Per-path size tracking for the stability check.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Last observed size of a watched path.
#[derive(Debug, Clone, Copy)]
struct PathState {
    size: u64,
    changed_at: Instant,
}

/// Decides when a file has stopped being written.
///
/// A path is ready once its size has been unchanged for at least one full
/// interval. Ready and vanished paths are forgotten, so a later
/// modification tracks the path again from scratch.
#[derive(Debug)]
pub struct StabilityTracker {
    interval: Duration,
    paths: HashMap<PathBuf, PathState>,
}

impl StabilityTracker {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            paths: HashMap::new(),
        }
    }

    /// Record a change event for `path` with its current size.
    pub fn touch(&mut self, path: PathBuf, size: u64, now: Instant) {
        match self.paths.get_mut(&path) {
            Some(state) if state.size == size => {}
            Some(state) => {
                state.size = size;
                state.changed_at = now;
            }
            None => {
                self.paths.insert(
                    path,
                    PathState {
                        size,
                        changed_at: now,
                    },
                );
            }
        }
    }

    pub fn remove(&mut self, path: &Path) -> bool {
        self.paths.remove(path).is_some()
    }

    /// Re-stat every tracked path. Returns the paths that became ready with
    /// their sizes, in path order.
    pub fn poll<F>(&mut self, now: Instant, mut stat: F) -> Vec<(PathBuf, u64)>
    where
        F: FnMut(&Path) -> Option<u64>,
    {
        let mut ready = Vec::new();
        let interval = self.interval;

        self.paths.retain(|path, state| match stat(path) {
            None => false,
            Some(size) if size != state.size => {
                state.size = size;
                state.changed_at = now;
                true
            }
            Some(size) => {
                if now.duration_since(state.changed_at) >= interval {
                    ready.push((path.clone(), size));
                    false
                } else {
                    true
                }
            }
        });

        ready.sort();
        ready
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    const INTERVAL: Duration = Duration::from_secs(5);

    #[test]
    fn test_growing_file_waits_until_size_settles() {
        let start = Instant::now();
        let at = |n: u32| start + INTERVAL * n;
        let path = PathBuf::from("/inbox/big.mp4");
        let size = Cell::new(0u64);
        let stat = |_: &Path| Some(size.get());

        let mut tracker = StabilityTracker::new(INTERVAL);
        let mut enqueued = Vec::new();

        // 10 MB arrives in three chunks; every check sees growth.
        for (tick, chunk) in [(0u32, 1u64), (1, 2), (2, 3)] {
            size.set(chunk * 10 * 1024 * 1024 / 3);
            tracker.touch(path.clone(), size.get(), at(tick));
            enqueued.extend(tracker.poll(at(tick), stat));
        }
        assert!(enqueued.is_empty());

        enqueued.extend(tracker.poll(at(3), stat));
        assert_eq!(enqueued.len(), 1);
        assert_eq!(enqueued[0].0, path);

        // Nothing is left to report afterwards.
        assert!(tracker.poll(at(4), stat).is_empty());
        assert!(tracker.is_empty());
    }

    #[test]
    fn test_growth_between_events_resets_the_clock() {
        let start = Instant::now();
        let path = PathBuf::from("/inbox/a.mkv");
        let mut tracker = StabilityTracker::new(INTERVAL);

        tracker.touch(path.clone(), 100, start);
        // Grew without a change event being delivered.
        assert!(tracker.poll(start + INTERVAL, |_| Some(200)).is_empty());
        assert!(tracker
            .poll(start + INTERVAL + Duration::from_secs(1), |_| Some(200))
            .is_empty());
        assert_eq!(tracker.poll(start + INTERVAL * 2, |_| Some(200)).len(), 1);
    }

    #[test]
    fn test_vanished_path_is_forgotten() {
        let start = Instant::now();
        let mut tracker = StabilityTracker::new(INTERVAL);
        tracker.touch(PathBuf::from("/inbox/gone.mp4"), 10, start);
        assert!(tracker.poll(start + INTERVAL, |_| None).is_empty());
        assert!(tracker.is_empty());
    }

    #[test]
    fn test_touch_with_same_size_keeps_clock() {
        let start = Instant::now();
        let path = PathBuf::from("/inbox/a.mp4");
        let mut tracker = StabilityTracker::new(INTERVAL);
        tracker.touch(path.clone(), 10, start);
        tracker.touch(path.clone(), 10, start + Duration::from_secs(4));
        assert_eq!(tracker.poll(start + INTERVAL, |_| Some(10)).len(), 1);
    }

    #[test]
    fn test_remove() {
        let mut tracker = StabilityTracker::new(INTERVAL);
        tracker.touch(PathBuf::from("/a.mp4"), 1, Instant::now());
        assert!(tracker.remove(Path::new("/a.mp4")));
        assert!(!tracker.remove(Path::new("/a.mp4")));
    }
}
