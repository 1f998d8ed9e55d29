// src/main.rs
// Demo runner: executes one pulse measurement against the simulated
// instrument. Pass a JSON recipe path to override the default waveform.
use anyhow::{Context, Result};
use pulseprobe::{
    MeasurementConfig, PulseMeasurement, PulseWaveformSpec, SimulatedInstrument,
};

fn load_spec() -> Result<PulseWaveformSpec> {
    match std::env::args().nth(1) {
        Some(path) => {
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read recipe {path}"))?;
            serde_json::from_str(&text).with_context(|| format!("failed to parse recipe {path}"))
        }
        None => Ok(PulseWaveformSpec {
            repeat_count: 3,
            ..Default::default()
        }),
    }
}

fn main() -> Result<()> {
    env_logger::init();
    let spec = load_spec()?;
    let instrument = SimulatedInstrument::new().with_noise(1e-4);
    let config = MeasurementConfig {
        load_ohms: 1e3,
        ..Default::default()
    };
    let mut runner = PulseMeasurement::new(instrument, config);
    let outcome = runner.run(&spec).context("measurement run failed")?;

    println!(
        "captured {} samples at {:.3e} Hz ({:?} detection)",
        outcome.raw.len(),
        outcome.budget.chosen_rate,
        outcome.strategy
    );
    for (idx, probe) in outcome.probes.iter().enumerate() {
        println!(
            "probe {idx}: t={:.4e} s  V={:.6} V  I={:.4e} A  R={:.3} ohm",
            probe.center_timestamp, probe.voltage, probe.current, probe.resistance
        );
    }
    for dropped in &outcome.dropped {
        eprintln!("probe {} dropped: {}", dropped.index, dropped.reason);
    }
    Ok(())
}
