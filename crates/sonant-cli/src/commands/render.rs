//! Offline rendering command.

use std::path::PathBuf;

use clap::Args;
use hound::{SampleFormat, WavSpec, WavWriter};
use sonant_core::TransportInfo;
use sonant_synth::{EngineConfig, MidiEvent, Synth};

use super::common::{parse_key_val, resolve_param};

#[derive(Args)]
pub struct RenderArgs {
    /// Output WAV file
    #[arg(value_name = "OUTPUT")]
    output: PathBuf,

    /// MIDI note number; repeat for a chord
    #[arg(short, long = "note", default_value = "60")]
    notes: Vec<u8>,

    /// Note velocity (1-127)
    #[arg(long, default_value = "100", value_parser = clap::value_parser!(u8).range(1..=127))]
    velocity: u8,

    /// Seconds the notes are held
    #[arg(long, default_value = "1.0")]
    duration: f32,

    /// Seconds rendered after the note-off
    #[arg(long, default_value = "1.0")]
    tail: f32,

    /// Sample rate
    #[arg(long, default_value = "48000")]
    sample_rate: u32,

    /// Frames per render call
    #[arg(long, default_value = "256")]
    block_size: usize,

    /// Engine config file (TOML)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Parameter in plain units (e.g., filter_cutoff=800)
    #[arg(long = "set", value_parser = parse_key_val)]
    params: Vec<(String, String)>,
}

pub fn run(args: RenderArgs) -> anyhow::Result<()> {
    if !(args.duration >= 0.0 && args.tail >= 0.0) {
        anyhow::bail!("--duration and --tail must be non-negative");
    }
    if let Some(&note) = args.notes.iter().find(|&&n| n > 127) {
        anyhow::bail!("Note {note} is outside 0-127");
    }

    let config = match &args.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };
    let (mut synth, mut handle) = Synth::new(&config)?;
    synth.initialize(args.sample_rate as f32, args.block_size)?;

    for (name, value) in &args.params {
        let (param, normalized) = resolve_param(name, value)?;
        handle.set_parameter(param.id(), normalized, 0);
        tracing::debug!(param = name.as_str(), normalized, "parameter set");
    }

    let sample_rate = args.sample_rate as f32;
    let held = (args.duration * sample_rate).round() as usize;
    let total = held + (args.tail * sample_rate).round() as usize;

    let spec = WavSpec {
        channels: 2,
        sample_rate: args.sample_rate,
        bits_per_sample: 32,
        sample_format: SampleFormat::Float,
    };
    let mut writer = WavWriter::create(&args.output, spec)?;

    for &note in &args.notes {
        handle.deliver_midi(
            MidiEvent::NoteOn {
                channel: 0,
                note,
                velocity: args.velocity,
            },
            0,
        );
    }

    let mut left = vec![0.0f32; args.block_size];
    let mut right = vec![0.0f32; args.block_size];
    let mut rendered = 0;
    let mut released = false;
    let mut peak = 0.0f32;

    while rendered < total {
        if !released && held < rendered + args.block_size {
            // Offsets past the current call carry over into later calls.
            let offset = (held.saturating_sub(rendered)) as u32;
            for &note in &args.notes {
                handle.deliver_midi(MidiEvent::NoteOff { channel: 0, note }, offset);
            }
            released = true;
        }

        let frames = args.block_size.min(total - rendered);
        let position = rendered as f64 / f64::from(args.sample_rate);
        synth.render(
            &mut left[..frames],
            &mut right[..frames],
            &TransportInfo::playing(TransportInfo::DEFAULT_BPM, position),
        );

        for (&l, &r) in left[..frames].iter().zip(&right[..frames]) {
            writer.write_sample(l)?;
            writer.write_sample(r)?;
            peak = peak.max(l.abs()).max(r.abs());
        }
        rendered += frames;
    }

    writer.finalize()?;
    handle.log_overflow();

    tracing::info!(
        output = %args.output.display(),
        frames = total,
        peak,
        "render complete"
    );
    Ok(())
}
