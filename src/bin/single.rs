//! Opens the first unit, registers every channel as type K and reads all of them once.

use tc08::{DeviceConfiguration, MainsFrequency, OverflowFlags};

fn main() -> tc08::Result<()> {
    env_logger::init();

    let mains = match std::env::args().nth(1).as_deref() {
        Some("50") => MainsFrequency::Hz50,
        _ => MainsFrequency::Hz60,
    };
    let config = DeviceConfiguration::default().with_mains(mains);

    let mut device = tc08::Device::new();
    device.open()?;
    device.configure(&config)?;
    let reading = device.read_single()?;
    device.close();

    for (index, channel) in config.active_channels() {
        let overflow = reading.overflow.contains(OverflowFlags::channel(index));
        println!("{:>4}: {:8.3} °C{}", channel.name, reading.temperatures[index],
            if overflow { " (overflow)" } else { "" });
    }
    Ok(())
}
