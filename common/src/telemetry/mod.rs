// Copyright © SixtyFPS GmbH <info@slint.dev>
// SPDX-License-Identifier: MIT

mod sample;
mod history;

pub mod chart;
pub mod presenter;

pub use sample::{format_timestamp, parse_timestamp, DecodeError, Sample};

pub use history::History;

pub use chart::ChartGeometry;
pub use presenter::{present, DashboardView, Metrics, Presenter, RenderState, Series};
