use midibusrs::midi::{ClockMode, DEFAULT_CLOCK_MOD, DEFAULT_PPQN};
use midibusrs::PortSettings;
use std::io::Write;
use std::path::Path;
use std::time::Duration;

fn write_settings(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(".toml")
        .tempfile()
        .unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

#[test]
fn test_load_without_file_uses_defaults() {
    let settings = PortSettings::load(None).unwrap();
    assert_eq!(settings.ppqn, DEFAULT_PPQN);
    assert_eq!(settings.clock_mod, DEFAULT_CLOCK_MOD);
    assert!(settings.outputs.is_empty());
    assert!(settings.inputs.is_empty());
    assert_eq!(settings.clock_for("anything"), ClockMode::Off);
    assert!(!settings.input_enabled("anything"));
}

#[test]
fn test_load_port_settings_from_file() {
    let file = write_settings(
        r#"
client_name = "studio"
ppqn = 96
manual_ports = true
watch_interval_ms = 250

[[outputs]]
port = "Synth Out"
clock = "pos"

[[outputs]]
port = "Drums"
clock = "on"

[[outputs]]
port = "Muted"
clock = "disabled"

[[inputs]]
port = "Keys"
enabled = true

[[inputs]]
port = "Pads"
"#,
    );

    let settings = PortSettings::load(Some(file.path())).unwrap();
    assert_eq!(settings.client_name, "studio");
    assert_eq!(settings.ppqn, 96);
    assert_eq!(settings.clock_mod, DEFAULT_CLOCK_MOD);
    assert!(settings.manual_ports);
    assert_eq!(settings.watch_interval(), Duration::from_millis(250));

    assert_eq!(settings.clock_for("Synth Out"), ClockMode::Pos);
    assert_eq!(settings.clock_for("Drums"), ClockMode::Mod);
    assert_eq!(settings.clock_for("Muted"), ClockMode::Disabled);
    assert_eq!(settings.clock_for("Unknown"), ClockMode::Off);
    assert!(settings.input_enabled("Keys"));
    assert!(!settings.input_enabled("Pads"));

    let options = settings.port_options();
    assert_eq!(options.client_name, "studio");
    assert_eq!(options.ppqn, 96);
}

#[test]
fn test_load_rejects_unknown_clock_mode() {
    let file = write_settings(
        r#"
[[outputs]]
port = "Synth"
clock = "sometimes"
"#,
    );
    assert!(PortSettings::load(Some(file.path())).is_err());
}

#[test]
fn test_load_missing_file_is_an_error() {
    let result = PortSettings::load(Some(Path::new("/nonexistent/midibusrs/ports.toml")));
    assert!(result.is_err());
}

#[test]
fn test_watch_interval_has_a_floor() {
    let settings = PortSettings {
        watch_interval_ms: 0,
        ..PortSettings::default()
    };
    assert_eq!(settings.watch_interval(), Duration::from_millis(10));
}
