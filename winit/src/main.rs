// Prevent console window in addition to Slint window in Windows release builds when, e.g., starting the app via file manager. Ignored on other platforms.
#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")]

slint::include_modules!();

use airq_dashboard_common::subscription::MqttTransport;
use airq_dashboard_common::telemetry::{ChartGeometry, DashboardView, Series};
use airq_dashboard_common::{
    AppContext, ConnectionParams, DashboardConfig, DisplaySettings, StopFlag,
};
use chrono::{DateTime, Local, Utc};
use std::cell::RefCell;
use std::rc::Rc;

/// Our App struct that holds the UI, the application context and the status timer.
///
/// The context owns the sample history and the MQTT subscription. A refresh loop running on its
/// own thread snapshots the history and pushes each view into the UI event loop, while the
/// sidebar applies edited settings back onto the context.
struct App {
    ui: AppWindow,
    context: Rc<RefCell<AppContext>>,
    status_timer: slint::Timer,
    stop: StopFlag,
}

impl App {
    const STATUS_INTERVAL: std::time::Duration = std::time::Duration::from_secs(1);

    /// Create a new App struct with the settings form filled from `config`.
    fn new(config: DashboardConfig) -> anyhow::Result<Self> {
        let ui = AppWindow::new()?;

        let settings = ui.global::<Settings>();
        settings.set_host(config.connection.host.as_str().into());
        settings.set_port(config.connection.port.to_string().into());
        settings.set_device_id(config.connection.device_id.as_str().into());
        settings.set_history_size(config.display.window() as i32);
        settings.set_refresh(config.display.refresh_secs() as i32);
        ui.global::<ViewModel>()
            .set_refresh_secs(config.display.refresh_secs() as i32);

        let context = AppContext::new(&config, Box::new(MqttTransport::new()));

        Ok(Self {
            ui,
            context: Rc::new(RefCell::new(context)),
            status_timer: slint::Timer::default(),
            stop: StopFlag::new(),
        })
    }

    /// Connect, start the refresh loop and run the UI until the window is closed.
    fn run(&mut self) -> anyhow::Result<()> {
        self.context.borrow_mut().start();
        self.ui
            .global::<ViewModel>()
            .set_status(self.context.borrow().status().to_string().into());

        let ui_handle = self.ui.as_weak();
        let context = self.context.clone();
        self.ui.global::<Settings>().on_apply(move || {
            if let Some(ui) = ui_handle.upgrade() {
                apply_settings(&ui, &mut context.borrow_mut());
            }
        });

        // The connection can drop at any time, so poll its status.
        let ui_handle = self.ui.as_weak();
        let context = self.context.clone();
        self.status_timer.start(
            slint::TimerMode::Repeated,
            Self::STATUS_INTERVAL,
            move || {
                if let Some(ui) = ui_handle.upgrade() {
                    let status = context.borrow().status().to_string();
                    ui.global::<ViewModel>().set_status(status.into());
                }
            },
        );

        let ui_handle = self.ui.as_weak();
        let refresh = self
            .context
            .borrow()
            .refresh_loop(self.stop.clone())
            .spawn(move |view| {
                let chart = match &view {
                    DashboardView::Data { rows, .. } => ChartGeometry::from_rows(rows),
                    DashboardView::Empty => ChartGeometry::default(),
                };
                if let Err(e) = ui_handle.upgrade_in_event_loop(move |ui| show_view(&ui, &view, &chart)) {
                    log::debug!("Dropping refresh, the UI is gone: {e}");
                }
            })?;

        // Run the UI (and map an error to an anyhow::Error).
        let result = self.ui.run().map_err(|e| e.into());

        self.stop.stop();
        if refresh.join().is_err() {
            log::warn!("Refresh loop panicked");
        }
        self.context.borrow_mut().shutdown();

        result
    }
}

/// Validates the sidebar form and applies it. Rejected values are shown next to the form.
fn apply_settings(ui: &AppWindow, context: &mut AppContext) {
    let settings = ui.global::<Settings>();

    let connection = ConnectionParams::parse(
        &settings.get_host(),
        &settings.get_port(),
        &settings.get_device_id(),
    );
    let display = DisplaySettings::new(
        usize::try_from(settings.get_history_size()).unwrap_or_default(),
        u64::try_from(settings.get_refresh()).unwrap_or_default(),
    );

    let (connection, display) = match (connection, display) {
        (Ok(connection), Ok(display)) => (connection, display),
        (Err(e), _) | (_, Err(e)) => {
            log::warn!("Rejected settings: {e}");
            settings.set_error(e.to_string().into());
            return;
        }
    };
    settings.set_error(Default::default());

    let model = ui.global::<ViewModel>();
    model.set_refresh_secs(display.refresh_secs() as i32);

    if let Err(e) = context.apply(connection, display) {
        log::warn!("Settings applied without a subscription: {e}");
    }
    model.set_status(context.status().to_string().into());
}

/// Copies a presented view into the view model.
fn show_view(ui: &AppWindow, view: &DashboardView, chart: &ChartGeometry) {
    let model = ui.global::<ViewModel>();

    let DashboardView::Data {
        latest,
        sample_count,
        ..
    } = view
    else {
        model.set_have_data(false);
        model.set_sample_count(0);
        return;
    };

    model.set_have_data(true);
    model.set_temperature(Series::Temperature.format(latest.temperature_c).into());
    model.set_humidity(Series::Humidity.format(latest.humidity_pct).into());
    model.set_aqi(Series::AqiProxy.format(latest.aqi_proxy).into());
    model.set_last_update(latest.timestamp.as_str().into());
    model.set_sample_count(i32::try_from(*sample_count).unwrap_or(i32::MAX));

    model.set_temperature_path(chart.path(Series::Temperature).into());
    model.set_humidity_path(chart.path(Series::Humidity).into());
    model.set_aqi_path(chart.path(Series::AqiProxy).into());
    model.set_y_min(format!("{:.1}", chart.y_min).into());
    model.set_y_max(format!("{:.1}", chart.y_max).into());
    model.set_time_start(axis_time(chart.start).into());
    model.set_time_end(axis_time(chart.end).into());
}

fn axis_time(time: Option<DateTime<Utc>>) -> String {
    time.map(|time| time.with_timezone(&Local).format("%H:%M:%S").to_string())
        .unwrap_or_default()
}

/// Loads variables from a `.env` file in the working directory or its parents. Variables already
/// set in the environment win. A missing file is not an error.
fn load_env_file() {
    match dotenvy::dotenv() {
        Ok(path) => log::info!("Loaded settings from {}", path.display()),
        Err(e) => log::debug!("No .env file loaded: {e}"),
    }
}

/// A minimal main function that reads the configuration, initializes the App and runs it.
fn main() -> anyhow::Result<()> {
    env_logger::init();
    load_env_file();

    let config = DashboardConfig::from_env()?;
    log::info!(
        "Dashboard for {} on {}:{}",
        config.connection.topic(),
        config.connection.host,
        config.connection.port
    );

    let mut app = App::new(config)?;

    app.run()
}

#[test]
fn test_env_file_feeds_dashboard_config() {
    use std::collections::HashMap;

    let path = std::env::temp_dir().join(format!("airq-dashboard-{}.env", std::process::id()));
    std::fs::write(
        &path,
        "# broker on the lab network\nMQTT_BROKER_HOST=broker.lab\nMQTT_BROKER_PORT=1884\nDEVICE_ID=\"esp32-lab-3\"\n",
    )
    .unwrap();

    let variables: HashMap<String, String> = dotenvy::from_path_iter(&path)
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    std::fs::remove_file(&path).unwrap();

    let config = DashboardConfig::from_lookup(|key| variables.get(key).cloned()).unwrap();

    assert_eq!(config.connection.host, "broker.lab");
    assert_eq!(config.connection.port, 1884);
    assert_eq!(config.connection.topic(), "iot/air/esp32-lab-3/telemetry");
    assert_eq!(config.display, DisplaySettings::default());
}
