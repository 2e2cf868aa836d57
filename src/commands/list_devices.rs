//! List available audio input devices.

use crate::capture::list_input_devices;

/// Prints every input device with the ID accepted by `--device` and the
/// `audio.device` setting.
///
/// # Errors
/// - If the audio host cannot enumerate devices
pub fn handle_list_devices() -> Result<(), anyhow::Error> {
    let devices = list_input_devices()?;

    if devices.is_empty() {
        println!("No audio input devices found on this system.");
        return Ok(());
    }

    println!();
    println!("Available audio input devices:");
    println!();

    for device in &devices {
        let default_indicator = if device.is_default { " [DEFAULT]" } else { "" };
        let config_info = match device.native {
            Some((rate, channels)) => format!("{rate}Hz, {channels} channels"),
            None => "configuration unavailable".to_string(),
        };

        println!("  ID: {}", device.index);
        println!("    Name: {}{}", device.name, default_indicator);
        println!("    Native: {config_info}");
        println!();
    }

    Ok(())
}
