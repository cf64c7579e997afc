use anyhow::Result;
use std::sync::{Arc, Mutex};
use tokio::time::{Duration, interval};
use tracing::{error, info};
use triton::controls::EssControls;
use triton::serial::Rs485Port;
use triton::vebus::definition::{RamVariable, WinmonCommand};
use triton::vebus::{ResponseValue, VeBus};
use triton::{Config, logging};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load().map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))?;
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid configuration: {}", e))?;
    logging::init_logging(&config.logging)
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    info!("Triton {} starting up", env!("APP_VERSION"));

    let serial = Rs485Port::open(&config.serial)
        .map_err(|e| anyhow::anyhow!("Failed to open serial port: {}", e))?;

    let bus = VeBus::new(config.vebus.clone());

    // Track the battery state of charge for the control loop; it arrives
    // through the response callback as ChargeState readings complete.
    let latest_soc: Arc<Mutex<Option<f32>>> = Arc::new(Mutex::new(None));
    {
        let latest_soc = latest_soc.clone();
        bus.register_response_cb(move |response| {
            if response.command == WinmonCommand::ReadRamVar as u8
                && response.address == RamVariable::ChargeState as u8
                && let ResponseValue::F32(fraction) = response.value
                && let Ok(mut soc) = latest_soc.lock()
            {
                *soc = Some(fraction * 100.0);
            }
        });
    }

    // The engine loop owns the serial port; run it off the async runtime
    let engine = bus.engine(Box::new(serial));
    let engine_task = tokio::task::spawn_blocking(move || engine.run());

    bus.start_communication();
    bus.set_switch(config.controls.mode.switch_state());

    // Maintainer context: retire timeouts, deliver responses and raw frames
    let maintainer_bus = bus.clone();
    let maintainer_task = tokio::spawn(async move {
        let mut tick = interval(Duration::from_millis(10));
        loop {
            tick.tick().await;
            maintainer_bus.maintain();
        }
    });

    // Control loop: poll the state of charge and steer the power setpoint
    let control_bus = bus.clone();
    let control_config = config.controls.clone();
    let control_task = tokio::spawn(async move {
        let controls = EssControls::new();
        let logger = logging::get_logger("control_loop");
        let mut tick = interval(Duration::from_millis(control_config.update_interval_ms));
        let mut last_setpoint: Option<i16> = None;
        loop {
            tick.tick().await;

            let result = control_bus.read_ram(RamVariable::ChargeState);
            if !result.is_success() {
                logger.warn(&format!("SoC poll not queued: {:?}", result.status));
            }

            let soc = latest_soc.lock().ok().and_then(|guard| *guard);
            let status = control_bus.get_multi_plus_status();
            let dc_info = control_bus.get_dc_info();
            let Some(setpoint) =
                controls.compute_power_setpoint(soc, &status, &dc_info, &control_config)
            else {
                continue;
            };

            if last_setpoint != Some(setpoint) {
                let status_line = serde_json::json!({
                    "timestamp": chrono::Utc::now().to_rfc3339(),
                    "setpoint_w": setpoint,
                    "soc_percent": soc,
                    "dc": serde_json::to_value(dc_info).unwrap_or_default(),
                    "dc_level_allows_inverting": status.dc_level_allows_inverting,
                });
                logger.info(&format!("Applying power setpoint: {}", status_line));
            }
            let result = control_bus.set_power(setpoint);
            if result.is_success() {
                last_setpoint = Some(setpoint);
            } else {
                logger.warn(&format!("Setpoint not queued: {:?}", result.status));
            }
        }
    });

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    control_task.abort();
    maintainer_task.abort();
    bus.shutdown();
    if let Err(e) = engine_task.await {
        error!("Engine task failed: {}", e);
    }

    info!("Triton shutdown complete");
    Ok(())
}
