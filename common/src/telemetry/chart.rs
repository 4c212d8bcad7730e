// Copyright © SixtyFPS GmbH <info@slint.dev>
// SPDX-License-Identifier: MIT

use chrono::{DateTime, Utc};
use std::fmt::Write;

use crate::telemetry::presenter::{ChartRow, Series};

/// Width of the chart viewbox the path commands are expressed in.
pub const VIEWBOX_WIDTH: f64 = 1000.0;
/// Height of the chart viewbox the path commands are expressed in.
pub const VIEWBOX_HEIGHT: f64 = 100.0;
/// Half width of the tick drawn for a reading without neighbours.
const POINT_TICK: f64 = 5.0;

/// Line chart geometry for the presented rows.
///
/// All series share one y-axis. Each series becomes an SVG-style path command string
/// (`M x y L x y ...`) in a [`VIEWBOX_WIDTH`] x [`VIEWBOX_HEIGHT`] viewbox, with the time axis
/// running left to right. A missing reading lifts the pen, so gaps stay visible.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct ChartGeometry {
    pub paths: [String; 3],
    pub y_min: f64,
    pub y_max: f64,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl ChartGeometry {
    /// Lays out `rows`, which must already be in chronological order.
    pub fn from_rows(rows: &[ChartRow]) -> Self {
        let (Some(first), Some(last)) = (rows.first(), rows.last()) else {
            return Self::default();
        };

        let mut values = rows.iter().flat_map(|row| row.values.iter().flatten());
        let Some(&initial) = values.next() else {
            return Self {
                start: Some(first.time),
                end: Some(last.time),
                ..Self::default()
            };
        };
        let (mut y_min, mut y_max) = values.fold((initial, initial), |(min, max), &value| {
            (min.min(value), max.max(value))
        });
        if y_min == y_max {
            y_min -= 1.0;
            y_max += 1.0;
        }

        let span_ms = (last.time - first.time).num_milliseconds() as f64;
        let x = |index: usize, row: &ChartRow| -> f64 {
            if span_ms > 0.0 {
                (row.time - first.time).num_milliseconds() as f64 / span_ms * VIEWBOX_WIDTH
            } else if rows.len() > 1 {
                index as f64 / (rows.len() - 1) as f64 * VIEWBOX_WIDTH
            } else {
                VIEWBOX_WIDTH
            }
        };
        let y = |value: f64| VIEWBOX_HEIGHT - (value - y_min) / (y_max - y_min) * VIEWBOX_HEIGHT;

        let paths = std::array::from_fn(|column| {
            let mut segments: Vec<Vec<(f64, f64)>> = Vec::new();
            let mut pen_down = false;
            for (index, row) in rows.iter().enumerate() {
                match row.values[column] {
                    Some(value) => {
                        if !pen_down {
                            segments.push(Vec::new());
                        }
                        if let Some(segment) = segments.last_mut() {
                            segment.push((x(index, row), y(value)));
                        }
                        pen_down = true;
                    }
                    None => pen_down = false,
                }
            }
            path_commands(&segments)
        });

        Self {
            paths,
            y_min,
            y_max,
            start: Some(first.time),
            end: Some(last.time),
        }
    }

    pub fn path(&self, series: Series) -> &str {
        let column = Series::ALL
            .iter()
            .position(|candidate| *candidate == series)
            .unwrap_or_default();
        &self.paths[column]
    }
}

/// Renders polyline segments as path commands. A lone point becomes a short horizontal tick so
/// it stays visible.
fn path_commands(segments: &[Vec<(f64, f64)>]) -> String {
    let mut commands = String::new();
    for segment in segments {
        let ticked;
        let points = match segment.as_slice() {
            [(x, y)] => {
                ticked = [
                    ((x - POINT_TICK).max(0.0), *y),
                    ((x + POINT_TICK).min(VIEWBOX_WIDTH), *y),
                ];
                &ticked[..]
            }
            points => points,
        };
        for (index, (x, y)) in points.iter().enumerate() {
            if !commands.is_empty() {
                commands.push(' ');
            }
            let verb = if index == 0 { 'M' } else { 'L' };
            let _ = write!(commands, "{verb} {x:.1} {y:.1}");
        }
    }
    commands
}

#[cfg(test)]
fn row(second: u32, values: [Option<f64>; 3]) -> ChartRow {
    use chrono::TimeZone;

    ChartRow {
        time: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, second).unwrap(),
        values,
    }
}

#[test]
fn test_chart_geometry_empty() {
    assert_eq!(ChartGeometry::from_rows(&[]), ChartGeometry::default());
}

#[test]
fn test_chart_geometry_shared_axis() {
    let rows = [
        row(0, [Some(20.0), Some(40.0), None]),
        row(5, [Some(30.0), Some(60.0), None]),
        row(10, [Some(20.0), Some(40.0), None]),
    ];

    let chart = ChartGeometry::from_rows(&rows);

    assert_eq!(chart.y_min, 20.0);
    assert_eq!(chart.y_max, 60.0);
    assert_eq!(chart.path(Series::Temperature), "M 0.0 100.0 L 500.0 75.0 L 1000.0 100.0");
    assert_eq!(chart.path(Series::Humidity), "M 0.0 50.0 L 500.0 0.0 L 1000.0 50.0");
    assert_eq!(chart.path(Series::AqiProxy), "");
    assert_eq!(chart.start, Some(rows[0].time));
    assert_eq!(chart.end, Some(rows[2].time));
}

#[test]
fn test_chart_geometry_gap_lifts_pen() {
    let rows = [
        row(0, [Some(0.0), None, None]),
        row(1, [None, None, None]),
        row(2, [Some(10.0), None, None]),
        row(4, [Some(0.0), None, None]),
    ];

    let chart = ChartGeometry::from_rows(&rows);

    assert_eq!(
        chart.path(Series::Temperature),
        "M 0.0 100.0 L 5.0 100.0 M 500.0 0.0 L 1000.0 100.0"
    );
}

#[test]
fn test_chart_geometry_flat_and_instant() {
    let rows = [row(0, [None, None, Some(50.0)]), row(0, [None, None, Some(50.0)])];

    let chart = ChartGeometry::from_rows(&rows);

    assert_eq!((chart.y_min, chart.y_max), (49.0, 51.0));
    assert_eq!(chart.path(Series::AqiProxy), "M 0.0 50.0 L 1000.0 50.0");
}

#[test]
fn test_chart_geometry_single_reading_is_visible() {
    let rows = [row(0, [Some(21.5), Some(40.0), None])];

    let chart = ChartGeometry::from_rows(&rows);

    assert_eq!((chart.y_min, chart.y_max), (21.5, 40.0));
    assert_eq!(chart.path(Series::Temperature), "M 995.0 100.0 L 1000.0 100.0");
    assert_eq!(chart.path(Series::Humidity), "M 995.0 0.0 L 1000.0 0.0");
    assert_eq!(chart.path(Series::AqiProxy), "");
    assert_eq!(chart.start, chart.end);
}
