// Copyright © SixtyFPS GmbH <info@slint.dev>
// SPDX-License-Identifier: MIT

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::config::DisplaySettings;
use crate::telemetry::{DashboardView, History, Presenter};
use crate::ValueStore;

/// Longest uninterrupted sleep, so a stop request is noticed quickly.
const SLEEP_SLICE: Duration = Duration::from_millis(50);

/// Shared flag asking a [`RefreshLoop`] to exit.
#[derive(Clone, Debug, Default)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Periodically snapshots the history and hands the resulting view to a renderer.
///
/// Each cycle reads the display settings anew, so a changed window or interval applies from
/// the next cycle on.
pub struct RefreshLoop {
    history: History,
    settings: ValueStore<DisplaySettings>,
    stop: StopFlag,
}

impl RefreshLoop {
    pub fn new(history: History, settings: ValueStore<DisplaySettings>, stop: StopFlag) -> Self {
        Self {
            history,
            settings,
            stop,
        }
    }

    /// Runs until the stop flag is set: present, render, sleep, repeat.
    pub fn run<F>(self, mut render: F)
    where
        F: FnMut(DashboardView),
    {
        let mut presenter = Presenter::default();

        while !self.stop.is_stopped() {
            let settings = self.settings.get().unwrap_or_default();
            let view = presenter.refresh(&self.history, settings.window());
            render(view);
            self.sleep(settings.refresh_interval());
        }

        log::debug!("Refresh loop stopped");
    }

    /// Runs the loop on a thread of its own.
    pub fn spawn<F>(self, render: F) -> std::io::Result<JoinHandle<()>>
    where
        F: FnMut(DashboardView) + Send + 'static,
    {
        std::thread::Builder::new()
            .name("refresh".into())
            .spawn(move || self.run(render))
    }

    fn sleep(&self, interval: Duration) {
        let deadline = Instant::now() + interval;
        while !self.stop.is_stopped() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            std::thread::sleep(remaining.min(SLEEP_SLICE));
        }
    }
}

#[test]
fn test_refresh_loop_renders_until_stopped() {
    use crate::telemetry::Sample;
    use std::sync::mpsc;

    let history = History::new(10);
    let settings = ValueStore::new(DisplaySettings::new(50, 1).unwrap());
    let stop = StopFlag::new();
    let (views_tx, views_rx) = mpsc::channel();

    let worker = RefreshLoop::new(history.clone(), settings, stop.clone())
        .spawn(move |view| {
            let _ = views_tx.send(view);
        })
        .unwrap();

    assert_eq!(
        views_rx.recv_timeout(Duration::from_secs(5)).unwrap(),
        DashboardView::Empty
    );

    history.append(Sample {
        timestamp: "2024-05-01T12:00:00Z".into(),
        temperature_c: Some(21.5),
        ..Default::default()
    });

    let view = views_rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert!(matches!(view, DashboardView::Data { sample_count: 1, .. }));

    let stopped_at = Instant::now();
    stop.stop();
    worker.join().unwrap();
    assert!(stopped_at.elapsed() < Duration::from_millis(500));
}
