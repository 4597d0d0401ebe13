//! Streams every active channel and prints the published readings once per update interval.
//!
//! Usage: `tc08-monitor [CHANNEL-NAMES] [UPDATE-SECONDS] [CYCLES] [--mock]`, where
//! CHANNEL-NAMES is a comma-separated list such as `CJ,TC1,_,_,TC4` (`_` skips a channel).

use tc08::{AcquisitionStatus, DeviceConfiguration, Readings};
use tc08::sys::Driver;

fn monitor<D: Driver>(mut device: tc08::device::Device<D>, config: &DeviceConfiguration,
        update_secs: f64, cycles: Option<u64>) -> tc08::Result<()> {
    device.update_interval().set_secs(update_secs);
    let readings = device.connect(config)?;
    log::info!("monitoring {} channels", readings.iter().count());

    let mut printed = 0;
    let result = loop {
        std::thread::sleep(device.update_interval().get());
        match readings.status() {
            AcquisitionStatus::Faulted(error) => break Err(error),
            _ => print_readings(&readings),
        }
        printed += 1;
        if cycles.is_some_and(|cycles| printed >= cycles) {
            break Ok(())
        }
    };
    device.disconnect();
    result
}

fn print_readings(readings: &Readings) {
    let line = readings.iter().map(|(_, name, reading)| match reading {
        Some(reading) if reading.overflow =>
            format!("{}: {:.2} °C (overflow)", name, reading.temperature),
        Some(reading) =>
            format!("{}: {:.2} °C", name, reading.temperature),
        None =>
            format!("{}: -", name),
    }).collect::<Vec<_>>().join("  ");
    println!("[cycle {}] {}", readings.cycles(), line);
}

#[cfg(feature = "mock")]
fn simulated_unit(config: &DeviceConfiguration) -> tc08::sys::mock::MockDriver {
    let mock = tc08::sys::mock::MockDriver::new();
    let feeder = mock.clone();
    let channels = config.active_channels().map(|(index, _)| index).collect::<Vec<_>>();
    std::thread::spawn(move || {
        let mut time_ms = 0;
        loop {
            std::thread::sleep(std::time::Duration::from_millis(100));
            time_ms += 100;
            for &channel in &channels {
                let phase = time_ms as f32 / 10_000.0 + channel as f32;
                feeder.push_samples(channel, &[(time_ms, 20.0 + channel as f32 + phase.sin())]);
            }
        }
    });
    mock
}

fn main() -> tc08::Result<()> {
    env_logger::init();

    let mut args = std::env::args().skip(1).collect::<Vec<_>>();
    let use_mock = args.iter().any(|arg| arg == "--mock");
    args.retain(|arg| arg != "--mock");
    let mut args = args.into_iter();
    let config: DeviceConfiguration = match args.next() {
        Some(names) => names.parse()?,
        None => DeviceConfiguration::default(),
    };
    let update_secs = args.next().and_then(|arg| arg.parse().ok()).unwrap_or(1.0);
    let cycles = args.next().and_then(|arg| arg.parse().ok());

    if use_mock {
        #[cfg(feature = "mock")]
        return monitor(tc08::device::Device::with_driver(simulated_unit(&config)),
            &config, update_secs, cycles);
        #[cfg(not(feature = "mock"))]
        log::warn!("built without the `mock` feature; using the driver library");
    }
    monitor(tc08::Device::new(), &config, update_secs, cycles)
}
