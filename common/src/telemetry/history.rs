// Copyright © SixtyFPS GmbH <info@slint.dev>
// SPDX-License-Identifier: MIT

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::telemetry::Sample;

const PREALLOCATED: usize = 4096;

/// Bounded, arrival-ordered history of samples shared between the ingestion side and the
/// presenter.
///
/// Cloning a `History` yields another handle to the same buffer. Every operation takes the
/// internal lock once, so an append is atomic no matter which connection delivers it.
#[derive(Clone, Debug)]
pub struct History {
    samples: Arc<Mutex<VecDeque<Sample>>>,
    capacity: usize,
}

impl History {
    /// Creates an empty history keeping at most `capacity` samples.
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: Arc::new(Mutex::new(VecDeque::with_capacity(capacity.min(PREALLOCATED)))),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Appends `sample` at the tail, evicting the oldest samples once the capacity is exceeded.
    pub fn append(&self, sample: Sample) {
        let mut samples = self.lock();
        samples.push_back(sample);
        while samples.len() > self.capacity {
            samples.pop_front();
        }
    }

    /// The most recent `n` samples, oldest first. Returns fewer if the history is shorter.
    pub fn window(&self, n: usize) -> Vec<Sample> {
        let samples = self.lock();
        let skip = samples.len().saturating_sub(n);
        samples.iter().skip(skip).cloned().collect()
    }

    /// The most recently appended sample.
    pub fn latest(&self) -> Option<Sample> {
        self.lock().back().cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    // The deque is valid after every push/pop, so a panic elsewhere cannot leave it half-updated.
    fn lock(&self) -> MutexGuard<'_, VecDeque<Sample>> {
        self.samples.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
fn labelled(label: &str) -> Sample {
    Sample {
        timestamp: label.into(),
        ..Default::default()
    }
}

#[cfg(test)]
fn labels(samples: &[Sample]) -> Vec<&str> {
    samples.iter().map(|s| s.timestamp.as_str()).collect()
}

#[test]
fn test_history_evicts_oldest_first() {
    let history = History::new(3);
    for label in ["A", "B", "C", "D"] {
        history.append(labelled(label));
    }

    assert_eq!(history.len(), 3);
    assert_eq!(labels(&history.window(10)), ["B", "C", "D"]);
    assert_eq!(history.latest(), Some(labelled("D")));
}

#[test]
fn test_history_keeps_last_capacity_samples() {
    let history = History::new(50);
    for i in 0..1234 {
        history.append(labelled(&i.to_string()));
    }

    let kept = history.window(usize::MAX);
    let expected: Vec<String> = (1184..1234).map(|i| i.to_string()).collect();
    assert_eq!(labels(&kept), expected);
    assert_eq!(history.len(), history.capacity());
}

#[test]
fn test_history_window() {
    let history = History::new(10);
    assert!(history.window(5).is_empty());
    assert_eq!(history.latest(), None);

    for label in ["A", "B", "C"] {
        history.append(labelled(label));
    }

    assert_eq!(labels(&history.window(5)), ["A", "B", "C"]);
    assert_eq!(labels(&history.window(2)), ["B", "C"]);
    assert!(history.window(0).is_empty());
    // Reading never mutates the store.
    assert_eq!(history.len(), 3);
}

#[test]
fn test_history_zero_capacity_stays_empty() {
    let history = History::new(0);
    history.append(labelled("A"));

    assert!(history.is_empty());
    assert_eq!(history.latest(), None);
}

#[test]
fn test_history_concurrent_appends() {
    let history = History::new(100);

    let writers: Vec<_> = (0..4)
        .map(|writer| {
            let history = history.clone();
            std::thread::spawn(move || {
                for i in 0..250 {
                    history.append(labelled(&format!("{writer}-{i}")));
                    let _ = history.window(20);
                }
            })
        })
        .collect();

    for writer in writers {
        writer.join().unwrap();
    }

    assert_eq!(history.len(), 100);
}
