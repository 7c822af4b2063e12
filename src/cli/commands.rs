//! CLI Command Implementations
//!
//! Implements the actual logic for each CLI command.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Serialize;
use tracing::{info, warn};

use super::ProtocolSource;
use crate::config::EngineConfig;
use crate::dsp::NoiseType;
use crate::engine::{EngineSnapshot, EntrainmentEngine, ManualClock, SessionClock, WavOutput};
use crate::protocol::{builtin_protocols, InMemoryProtocolRepository, Protocol, ProtocolRepository};
use crate::session::{SessionState, TickOutcome};
use crate::state::{JsonFileStore, Spool};

/// Load the engine configuration, or the defaults
pub fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    match path {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("cannot load config {}", path.display())),
        None => Ok(EngineConfig::default()),
    }
}

fn resolve_protocol(source: &ProtocolSource) -> Result<(Arc<Protocol>, f64)> {
    let mut repository = InMemoryProtocolRepository::with_builtins()?;
    let protocol = match (&source.protocol, &source.file) {
        (_, Some(file)) => repository
            .load_file(file)
            .with_context(|| format!("cannot load protocol {}", file.display()))?,
        (Some(id), None) => repository.get(id)?,
        (None, None) => bail!("pass --protocol <id> or --file <path>"),
    };
    let duration = source
        .duration
        .unwrap_or_else(|| protocol.total_duration_seconds());
    Ok((protocol, duration))
}

/// List the built-in protocols.
pub fn list_protocols(json: bool) -> Result<()> {
    let protocols = builtin_protocols()?;
    if json {
        println!("{}", serde_json::to_string_pretty(&protocols)?);
        return Ok(());
    }
    for protocol in &protocols {
        println!(
            "{:<18} {:<20} {:>6.0}s  {} phases",
            protocol.id(),
            protocol.name(),
            protocol.total_duration_seconds(),
            protocol.len()
        );
    }
    Ok(())
}

/// Validate a protocol file and print its phases.
pub fn validate_protocol(path: &Path) -> Result<()> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read {}", path.display()))?;
    let protocol = Protocol::from_json(&content)?;
    println!("Protocol valid: {} ({})", protocol.name(), protocol.id());
    for (index, phase) in protocol.phases().iter().enumerate() {
        println!(
            "  {}. {:<16} {:>5.1}%  {:?}",
            index + 1,
            phase.name,
            phase.duration * 100.0,
            phase.frequency
        );
    }
    Ok(())
}

/// Optional sound settings for an offline render
#[derive(Debug, Clone, Default)]
pub struct RenderOptions {
    pub preset: Option<String>,
    pub noise: Option<String>,
    pub noise_volume: f32,
    pub isochronic: Option<f32>,
}

/// Render a full session to a WAV file.
///
/// The session clock follows the audio clock: it advances by each rendered
/// block, and the sequencer ticks at the configured interval of audio time.
pub fn render(
    config: EngineConfig,
    source: &ProtocolSource,
    output: &Path,
    options: &RenderOptions,
) -> Result<()> {
    let (protocol, duration) = resolve_protocol(source)?;
    let sample_rate = config.sample_rate;
    let block_size = config.block_size;
    let tick_interval = config.tick_interval_ms as f64 / 1000.0;
    let tail = config.pause_fade_seconds;

    let clock = Arc::new(ManualClock::new());
    let device = WavOutput::create(output, sample_rate)
        .with_context(|| format!("cannot create {}", output.display()))?;
    let engine = EntrainmentEngine::builder(config)
        .with_clock(clock.clone())
        .with_output(Box::new(device))
        .build()?;

    apply_options(&engine, options)?;
    engine.activate_output();
    engine.start(protocol.clone(), duration)?;
    info!(protocol = protocol.id(), duration, output = %output.display(), "rendering");

    let total_frames = ((duration + tail) * sample_rate as f64).ceil() as u64;
    let mut rendered: u64 = 0;
    let mut next_tick = 0.0;
    while rendered < total_frames {
        if clock.now_secs() >= next_tick {
            engine.tick()?;
            next_tick += tick_interval;
        }
        let frames = block_size.min((total_frames - rendered) as usize);
        engine.render_block(frames)?;
        rendered += frames as u64;
        clock.advance(Duration::from_secs_f64(frames as f64 / sample_rate as f64));
    }
    engine.finish_output()?;

    println!(
        "Rendered {:.1}s of '{}' to {}",
        rendered as f64 / sample_rate as f64,
        protocol.name(),
        output.display()
    );
    Ok(())
}

fn apply_options(engine: &EntrainmentEngine, options: &RenderOptions) -> Result<()> {
    if let Some(preset) = &options.preset {
        engine.set_preset(preset)?;
    }
    if let Some(intensity) = options.isochronic {
        engine.set_isochronic_pulse(true, intensity)?;
    }
    if let Some(noise) = &options.noise {
        let noise_type = NoiseType::from_name(noise)
            .with_context(|| format!("unknown noise type '{}'", noise))?;
        engine.start_ambient_noise(noise_type, options.noise_volume)?;
    }
    Ok(())
}

#[derive(Debug, Serialize)]
struct SimulationLine {
    t: f64,
    #[serde(flatten)]
    snapshot: EngineSnapshot,
}

/// Step a session on a manual clock, printing one JSON snapshot per step.
pub fn simulate(
    config: EngineConfig,
    source: &ProtocolSource,
    step: f64,
    store: Option<&Path>,
) -> Result<()> {
    if !(step.is_finite() && step > 0.0) {
        bail!("--step must be a positive number of seconds");
    }
    let (protocol, duration) = resolve_protocol(source)?;
    let clock = Arc::new(ManualClock::new());
    let mut builder = EntrainmentEngine::builder(config).with_clock(clock.clone());
    if let Some(dir) = store {
        builder = builder.with_store(Arc::new(JsonFileStore::new(dir)));
    }
    let engine = builder.build()?;

    engine.start(protocol, duration)?;
    loop {
        let outcome = engine.tick()?;
        let line = SimulationLine {
            t: clock.now_secs(),
            snapshot: engine.get_state(),
        };
        println!("{}", serde_json::to_string(&line)?);
        match outcome {
            TickOutcome::Completed(_) => break,
            TickOutcome::Inactive(state) if state != SessionState::Paused => break,
            _ => clock.advance_secs(step),
        }
    }
    engine.flush_persistence();
    Ok(())
}

/// List the records waiting in a spool directory.
pub fn spool_list(dir: &Path) -> Result<()> {
    let spool = Spool::new(dir);
    let pending = spool.pending()?;
    if pending.is_empty() {
        println!("Spool is empty");
    }
    for path in pending {
        println!("{}", path.display());
    }
    Ok(())
}

/// Deliver spooled records into a JSON file store.
pub fn spool_retry(spool_dir: &Path, store_dir: &Path) -> Result<()> {
    let spool = Spool::new(spool_dir);
    let store = JsonFileStore::new(store_dir);
    let report = spool.retry_spooled(&store)?;
    if report.corrupt > 0 {
        warn!(corrupt = report.corrupt, "corrupt spool entries quarantined");
    }
    println!(
        "Delivered {}, failed {}, corrupt {}",
        report.delivered, report.failed, report.corrupt
    );
    Ok(())
}

/// Write the default configuration to a file.
pub fn init_config(path: &Path) -> Result<()> {
    EngineConfig::default().save(path)?;
    println!("Configuration written: {}", path.display());
    Ok(())
}
