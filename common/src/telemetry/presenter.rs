// Copyright © SixtyFPS GmbH <info@slint.dev>
// SPDX-License-Identifier: MIT

use chrono::{DateTime, Utc};
use std::cmp::Ordering;

use crate::telemetry::{History, Sample};

/// The charted readings of a sample.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Series {
    Temperature,
    Humidity,
    AqiProxy,
}

impl Series {
    pub const ALL: [Series; 3] = [Series::Temperature, Series::Humidity, Series::AqiProxy];

    pub fn label(self) -> &'static str {
        match self {
            Series::Temperature => "Temperature (°C)",
            Series::Humidity => "Humidity (%)",
            Series::AqiProxy => "AQI Proxy",
        }
    }

    pub fn value(self, sample: &Sample) -> Option<f64> {
        match self {
            Series::Temperature => sample.temperature_c,
            Series::Humidity => sample.humidity_pct,
            Series::AqiProxy => sample.aqi_proxy,
        }
    }

    fn precision(self) -> usize {
        match self {
            Series::Temperature | Series::Humidity => 1,
            Series::AqiProxy => 0,
        }
    }

    /// Formats a reading of this series for a metric tile. Missing readings show as `n/a`.
    pub fn format(self, value: Option<f64>) -> String {
        match value {
            Some(value) => format!("{:.*}", self.precision(), value),
            None => "n/a".into(),
        }
    }
}

/// Latest-value summary shown above the chart.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct Metrics {
    pub timestamp: String,
    pub temperature_c: Option<f64>,
    pub humidity_pct: Option<f64>,
    pub aqi_proxy: Option<f64>,
}

impl From<&Sample> for Metrics {
    fn from(sample: &Sample) -> Self {
        Self {
            timestamp: sample.timestamp.clone(),
            temperature_c: sample.temperature_c,
            humidity_pct: sample.humidity_pct,
            aqi_proxy: sample.aqi_proxy,
        }
    }
}

impl Metrics {
    pub fn value(&self, series: Series) -> Option<f64> {
        match series {
            Series::Temperature => self.temperature_c,
            Series::Humidity => self.humidity_pct,
            Series::AqiProxy => self.aqi_proxy,
        }
    }
}

/// One point in time of the chart, with a value per [`Series`] in [`Series::ALL`] order.
#[derive(Clone, Debug, PartialEq)]
pub struct ChartRow {
    pub time: DateTime<Utc>,
    pub values: [Option<f64>; 3],
}

/// What the dashboard shows for one refresh cycle.
#[derive(Clone, Debug, PartialEq)]
pub enum DashboardView {
    /// Nothing received yet.
    Empty,
    Data {
        latest: Metrics,
        /// Chronologically sorted rows, samples without a valid time left out.
        rows: Vec<ChartRow>,
        sample_count: usize,
    },
}

/// Renderer state. Moves from `Empty` to `HasData` once and stays there.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum RenderState {
    #[default]
    Empty,
    HasData,
}

/// Builds the view for a window of samples.
///
/// Samples are sorted by their parsed timestamp. Timestamps that fail to parse sort last, in
/// arrival order, and the latest metrics are taken from the last sample after sorting.
pub fn present(window: &[Sample]) -> DashboardView {
    let mut timed: Vec<(Option<DateTime<Utc>>, &Sample)> =
        window.iter().map(|sample| (sample.time(), sample)).collect();

    timed.sort_by(|(a, _), (b, _)| match (a, b) {
        (Some(a), Some(b)) => a.cmp(b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    });

    let Some((_, last)) = timed.last() else {
        return DashboardView::Empty;
    };
    let latest = Metrics::from(*last);

    let rows = timed
        .iter()
        .filter_map(|(time, sample)| {
            time.map(|time| ChartRow {
                time,
                values: Series::ALL.map(|series| series.value(sample)),
            })
        })
        .collect();

    DashboardView::Data {
        latest,
        rows,
        sample_count: window.len(),
    }
}

/// Turns the history into views, one refresh cycle at a time.
#[derive(Debug, Default)]
pub struct Presenter {
    state: RenderState,
}

impl Presenter {
    pub fn state(&self) -> RenderState {
        self.state
    }

    /// Snapshots the last `window` samples of `history` and presents them.
    pub fn refresh(&mut self, history: &History, window: usize) -> DashboardView {
        let view = present(&history.window(window));
        if let DashboardView::Data { .. } = view {
            if self.state == RenderState::Empty {
                log::debug!("First telemetry sample observed");
            }
            self.state = RenderState::HasData;
        }
        view
    }
}

#[cfg(test)]
fn reading(timestamp: &str, temperature_c: f64) -> Sample {
    Sample {
        timestamp: timestamp.into(),
        temperature_c: Some(temperature_c),
        ..Default::default()
    }
}

#[test]
fn test_present_empty_window() {
    assert_eq!(present(&[]), DashboardView::Empty);
}

#[test]
fn test_present_sorts_chronologically() {
    let window = [
        reading("2024-05-01T12:00:02Z", 22.0),
        reading("2024-05-01T12:00:00Z", 20.0),
        reading("2024-05-01T12:00:01Z", 21.0),
    ];

    let DashboardView::Data { latest, rows, sample_count } = present(&window) else {
        panic!("expected data");
    };

    assert_eq!(sample_count, 3);
    assert_eq!(latest.temperature_c, Some(22.0));
    let temperatures: Vec<_> = rows.iter().map(|row| row.values[0]).collect();
    assert_eq!(temperatures, [Some(20.0), Some(21.0), Some(22.0)]);
}

#[test]
fn test_present_tolerates_bad_timestamps() {
    let window = [
        reading("garbage", 99.0),
        reading("2024-05-01T12:00:00Z", 20.0),
        reading("2024-05-01T12:00:01Z", 21.0),
    ];

    let DashboardView::Data { latest, rows, sample_count } = present(&window) else {
        panic!("expected data");
    };

    assert_eq!(sample_count, 3);
    assert_eq!(rows.len(), 2);
    // Unparseable times sort last.
    assert_eq!(latest.temperature_c, Some(99.0));
    assert_eq!(latest.timestamp, "garbage");
}

#[test]
fn test_presenter_state_machine() {
    let history = History::new(3);
    let mut presenter = Presenter::default();

    assert_eq!(presenter.refresh(&history, 300), DashboardView::Empty);
    assert_eq!(presenter.state(), RenderState::Empty);

    history.append(reading("2024-05-01T12:00:00Z", 20.0));
    assert!(matches!(presenter.refresh(&history, 300), DashboardView::Data { .. }));
    assert_eq!(presenter.state(), RenderState::HasData);

    for i in 1..10 {
        history.append(reading(&format!("2024-05-01T12:00:0{i}Z"), 20.0 + i as f64));
        presenter.refresh(&history, 300);
        assert_eq!(presenter.state(), RenderState::HasData);
    }
}

#[test]
fn test_series_format() {
    assert_eq!(Series::Temperature.format(Some(21.54)), "21.5");
    assert_eq!(Series::Humidity.format(Some(40.0)), "40.0");
    assert_eq!(Series::AqiProxy.format(Some(87.4)), "87");
    assert_eq!(Series::AqiProxy.format(None), "n/a");
}
