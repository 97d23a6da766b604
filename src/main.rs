use feeder_gate::api;
use feeder_gate::bay::AccessController;
use feeder_gate::config::{self, Config};
use feeder_gate::coordinator::{self, Coordinator, Vision};
use feeder_gate::identify::SubjectIdentifier;
use feeder_gate::sensor::xshut::XshutController;
use feeder_gate::error::AppError;
use feeder_gate::state::{StationState, log_bay_changes};
use feeder_gate::vision::{Disabled, LogNotifier, RegionColorSampler};
use std::error::Error;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

fn init_tracing(level: tracing::Level) {
    let subscriber = tracing_subscriber::fmt()
        .with_target(false)
        .with_max_level(level)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

/// Bays plus the hardware that has to stay claimed while they run.
struct Station {
    bays: Vec<AccessController>,
    _xshut: Option<Box<dyn XshutController>>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let config_path = config::path_from_args();
    let config = config::load_from_path(&config_path)?;
    init_tracing(config.log_level());
    tracing::info!(
        config_path = %config_path.display(),
        app = %config.app.name,
        bays = config.subjects.len(),
        "feeder-gate starting"
    );

    let state = Arc::new(RwLock::new(StationState::new()));
    let bay_updates = state.read().map_err(|_| AppError::StateLock)?.subscribe_bays();
    tokio::spawn(log_bay_changes(bay_updates));
    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port()));
    let listener = tokio::net::TcpListener::bind(addr).await?;

    let station = build_station(&config, &state)?;
    let subjects = config.subjects();
    let identifier =
        SubjectIdentifier::new(&subjects, config.identification.max_color_distance);
    tracing::warn!("No camera or detection model attached, bays open on manual override only");
    let vision = Vision {
        frames: Box::new(Disabled),
        classifier: Box::new(Disabled),
        sampler: Box::new(RegionColorSampler::new(
            config.identification.white_threshold,
        )),
        notifier: Box::new(LogNotifier),
    };
    let coordinator = Coordinator::new(
        subjects,
        station.bays,
        config.tracker_config(),
        identifier,
        vision,
    )
    .with_state(Arc::clone(&state));

    let stop = Arc::new(AtomicBool::new(false));
    let control = coordinator::spawn_control_thread(
        coordinator,
        config.tick_interval(),
        Arc::clone(&stop),
    );

    let app = api::router(Arc::clone(&state));
    tracing::info!(%addr, "API server listening");
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    tracing::info!("Stopping control loop");
    stop.store(true, Ordering::Relaxed);
    if control.join().is_err() {
        tracing::error!("Control thread panicked");
    }
    served?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "Failed to listen for Ctrl-C");
    }
}

#[cfg(target_os = "linux")]
fn build_station(
    config: &Config,
    state: &Arc<RwLock<StationState>>,
) -> Result<Station, Box<dyn Error>> {
    use feeder_gate::actuator::ActuatorController;
    use feeder_gate::actuator::servo::RppalServo;
    use feeder_gate::button::ManualOverride;
    use feeder_gate::button::gpio::{GpioButton, GpioLed};
    use feeder_gate::presence::PresenceDebouncer;
    use rppal::gpio::Gpio;

    let gpio = Gpio::new().map_err(|err| AppError::Gpio(err.to_string()))?;
    let (mut sensors, xshut) = discover_sensors(&gpio, config, state);
    let pulses = config.pulse_map();

    let mut bays = Vec::with_capacity(config.subjects.len());
    for (index, subject) in config.subjects.iter().enumerate() {
        let actuator_config = config
            .actuator_config(index)
            .ok_or_else(|| AppError::Actuator(format!("no actuator settings for bay {index}")))?;
        let servo = RppalServo::new(&gpio, subject.servo_pin, pulses)?;
        let actuator = ActuatorController::new(index, actuator_config, Box::new(servo))?;
        let button = ManualOverride::new(
            index,
            Box::new(GpioButton::new(&gpio, subject.button_pin)?),
            Box::new(GpioLed::new(&gpio, subject.led_pin)?),
            config.button_policy(),
        );
        let presence = PresenceDebouncer::new(index, config.presence_config());
        let sensor = sensors.get_mut(index).and_then(Option::take);
        if sensor.is_none() {
            tracing::warn!(bay = index, subject = %subject.name, "No presence sensor, assuming presence");
        }
        bays.push(AccessController::new(
            index, index, actuator, button, presence, sensor,
        ));
        tracing::info!(bay = index, subject = %subject.name, "Bay ready");
    }

    Ok(Station {
        bays,
        _xshut: xshut.map(|xshut| Box::new(xshut) as Box<dyn XshutController>),
    })
}

/// Bring up every configured VL53L1X and hand back one ranging handle per
/// bay. Bays whose sensor failed get `None`.
#[cfg(target_os = "linux")]
fn discover_sensors(
    gpio: &rppal::gpio::Gpio,
    config: &Config,
    state: &Arc<RwLock<StationState>>,
) -> (
    Vec<Option<feeder_gate::sensor::BaySensor>>,
    Option<feeder_gate::sensor::xshut::RppalXshutController>,
) {
    use feeder_gate::sensor::vl53l1x::Vl53l1xFactory;
    use feeder_gate::sensor::xshut::{RppalXshutController, discover_bay_sensors};
    use feeder_gate::sensor::{BaySensor, SensorDriverFactory, SensorStatus};

    let mut sensors: Vec<Option<BaySensor>> = config.subjects.iter().map(|_| None).collect();
    let sensor_configs = config.sensor_configs();
    if sensor_configs.is_empty() {
        tracing::warn!("No xshut_pin configured for any bay");
        return (sensors, None);
    }

    let pins: Vec<u8> = sensor_configs.iter().map(|s| s.xshut_pin).collect();
    tracing::info!(count = pins.len(), pins = ?pins, "Starting sensor discovery");
    let mut xshut = match RppalXshutController::new(gpio, &pins) {
        Ok(xshut) => xshut,
        Err(err) => {
            tracing::error!(error = %err, "Failed to initialize GPIO for XSHUT");
            return (sensors, None);
        }
    };

    let mut factory = Vl53l1xFactory::default();
    let infos = match discover_bay_sensors(&mut xshut, &mut factory, &sensor_configs) {
        Ok(infos) => infos,
        Err(err) => {
            tracing::error!(error = %err, "Sensor discovery failed");
            return (sensors, Some(xshut));
        }
    };

    for info in &infos {
        if info.status != SensorStatus::Ready {
            continue;
        }
        match factory.create_for_address(info.i2c_address) {
            Ok(driver) => {
                if let Some(slot) = sensors.get_mut(info.bay) {
                    *slot = Some(Box::new(driver));
                }
            }
            Err(err) => {
                tracing::warn!(bay = info.bay, error = %err, "Failed to open ranging handle");
            }
        }
    }

    match state.write() {
        Ok(mut guard) => guard.set_sensors(infos),
        Err(_) => tracing::warn!("State lock poisoned while storing sensors"),
    }
    (sensors, Some(xshut))
}

#[cfg(not(target_os = "linux"))]
fn build_station(
    config: &Config,
    state: &Arc<RwLock<StationState>>,
) -> Result<Station, Box<dyn Error>> {
    let _ = (config, state);
    Err("bay hardware requires Linux on a Raspberry Pi".into())
}
