//! Integration tests for sonant-core.
//!
//! Exercises the producer contract across modules: controllers feeding
//! parameters through the block context, macros chained into parameters,
//! envelopes driven from a control thread, and block-size independence of
//! event-segmented rendering.

use std::thread;

use sonant_core::{
    BlockContext, ControllerBank, Envelope, EnvelopeSettings, Event, EventTag, FloatParam, Follower,
    Lfo, LfoWaveform, Macro, MacroInput, MidiController, ParamDescriptor, ProducerCore, Round,
    RoundCounter, SampleBuffer, SignalProducer, produce,
};

const SAMPLE_RATE: f32 = 48000.0;

/// Multiplies two children sample by sample.
struct Product<A, B> {
    core: ProducerCore,
    a: A,
    b: B,
}

impl<A: SignalProducer, B: SignalProducer> Product<A, B> {
    fn new(a: A, b: B) -> Self {
        Self {
            core: ProducerCore::new(1),
            a,
            b,
        }
    }
}

impl<A: SignalProducer, B: SignalProducer> SignalProducer for Product<A, B> {
    fn core(&self) -> &ProducerCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ProducerCore {
        &mut self.core
    }

    fn initialize_rendering(&mut self, ctx: &BlockContext<'_>) {
        produce(&mut self.a, ctx);
        produce(&mut self.b, ctx);
    }

    fn render(&mut self, _ctx: &BlockContext<'_>, first: usize, last: usize, out: &mut SampleBuffer) {
        let a = self.a.output().channel(0);
        let b = self.b.output().channel(0);
        for i in first..last {
            out.channel_mut(0)[i] = a[i] * b[i];
        }
    }

    fn for_each_child(&mut self, visit: &mut dyn FnMut(&mut dyn SignalProducer)) {
        visit(&mut self.a);
        visit(&mut self.b);
    }
}

fn unit(name: &'static str, default: f32) -> FloatParam {
    FloatParam::new(ParamDescriptor::new(name, name, 0.0, 1.0, default))
}

fn attack_only(attack_seconds: f32) -> EnvelopeSettings {
    EnvelopeSettings {
        attack: attack_seconds,
        hold: 0.0,
        decay: 0.0,
        sustain: 1.0,
        release: 0.01,
    }
}

// ============================================================================
// 1. Composition and memoization
// ============================================================================

#[test]
fn configure_reaches_every_descendant() {
    let mut graph = Product::new(Envelope::default(), Product::new(unit("a", 1.0), unit("b", 1.0)));
    graph.configure(SAMPLE_RATE, 256).unwrap();

    assert_eq!(graph.a.core().block_size(), 256);
    assert_eq!(graph.b.a.core().sample_rate(), SAMPLE_RATE);
    assert_eq!(graph.b.b.output().block_size(), 256);
}

#[test]
fn children_rendered_before_their_parent_are_not_rendered_again() {
    let mut graph = Product::new(unit("a", 0.5), unit("b", 0.5));
    graph.configure(SAMPLE_RATE, 64).unwrap();
    let ctx = BlockContext::new(Round(1), 64, SAMPLE_RATE);

    produce(&mut graph.a, &ctx);
    let out = produce(&mut graph, &ctx).channel(0)[0];

    assert_eq!(out, 0.25);
    assert_eq!(graph.a.core().render_count(), 1);
    assert_eq!(graph.b.core().render_count(), 1);
}

#[test]
fn round_counter_drives_fresh_renders() {
    let mut graph = Product::new(unit("a", 1.0), unit("b", 1.0));
    graph.configure(SAMPLE_RATE, 32).unwrap();
    let mut rounds = RoundCounter::new();

    for _ in 0..5 {
        let round = rounds.advance();
        produce(&mut graph, &BlockContext::new(round, 32, SAMPLE_RATE));
        produce(&mut graph, &BlockContext::new(round, 32, SAMPLE_RATE));
    }
    assert_eq!(graph.core().render_count(), 5);
    assert_eq!(graph.a.core().render_count(), 5);
}

#[test]
fn reset_clears_the_whole_subtree() {
    let mut graph = Product::new(Envelope::new(attack_only(0.0)), unit("gain", 1.0));
    graph.configure(SAMPLE_RATE, 32).unwrap();
    graph.a.start(0);
    produce(&mut graph, &BlockContext::new(Round(1), 32, SAMPLE_RATE));
    assert!(!graph.a.is_dormant());

    graph.reset();
    assert!(graph.a.is_dormant());
    let out = produce(&mut graph, &BlockContext::new(Round(2), 32, SAMPLE_RATE));
    assert!(out.channel(0).iter().all(|&s| s == 0.0));
}

// ============================================================================
// 2. Controllers, parameters and macros
// ============================================================================

#[test]
fn sample_accurate_controller_automation_through_the_context() {
    let mut bank = ControllerBank::new();
    let cutoff = bank.add(MidiController::new(0.0));
    bank.configure(SAMPLE_RATE, 128).unwrap();

    let mut param = unit("cutoff", 0.0);
    param.configure(SAMPLE_RATE, 128).unwrap();
    param.follow(Some(cutoff));

    bank.get_mut(cutoff).unwrap().change_at(64, 1.0);
    bank.render(Round(1), 128, SAMPLE_RATE);
    let ctx = BlockContext::new(Round(1), 128, SAMPLE_RATE).with_controllers(bank.as_slice());
    let out = produce(&mut param, &ctx).channel(0).to_vec();

    assert!(out[..64].iter().all(|&s| s == 0.0));
    assert!(out[64..].iter().all(|&s| s == 1.0));
}

#[test]
fn macro_output_drives_a_parameter() {
    let mut bank = ControllerBank::new();
    let input = bank.add(MidiController::new(0.0));
    let amount = bank.add(MidiController::new(0.5));
    let output = bank.add(MidiController::default());
    bank.configure(SAMPLE_RATE, 32).unwrap();

    let mut macro_source = Macro::new(output)
        .with_input(MacroInput::Input, input)
        .with_input(MacroInput::Amount, amount);
    let mut param = unit("depth", 0.0);
    param.configure(SAMPLE_RATE, 32).unwrap();
    param.follow(Some(output));

    bank.get_mut(input).unwrap().change(1.0);
    bank.render(Round(1), 32, SAMPLE_RATE);
    macro_source.update(&mut bank);
    let ctx = BlockContext::new(Round(1), 32, SAMPLE_RATE).with_controllers(bank.as_slice());
    produce(&mut param, &ctx);

    assert!((param.value() - 0.5).abs() < 1e-6);
}

#[test]
fn controller_clear_keeps_value_and_version() {
    let mut controller = MidiController::new(0.0);
    controller.configure(SAMPLE_RATE, 128).unwrap();
    let mut handle = controller.handle();

    for t in 0..4 {
        handle.change_at(t * 8, 0.25 * t as f32);
    }
    let value = handle.value();
    let index = handle.change_index();
    handle.clear();

    produce(&mut controller, &BlockContext::new(Round(1), 128, SAMPLE_RATE));
    assert!(controller.block_events().is_empty());
    assert_eq!(controller.value(), value);
    assert_eq!(controller.change_index(), index);
}

// ============================================================================
// 3. Cross-thread scheduling
// ============================================================================

#[test]
fn envelope_events_from_a_control_thread() {
    let mut envelope = Envelope::new(attack_only(1024.0 / SAMPLE_RATE));
    envelope.configure(SAMPLE_RATE, 1024).unwrap();
    let mut sender = envelope.core_mut().sender();

    thread::spawn(move || {
        assert!(sender.push(Event::new(Envelope::START, 0)));
    })
    .join()
    .unwrap();

    let out = produce(&mut envelope, &BlockContext::new(Round(1), 1024, SAMPLE_RATE))
        .channel(0)
        .to_vec();
    assert_eq!(out[0], 0.0);
    assert!(out[1023] > 0.99);
    assert!(out.windows(2).all(|w| w[1] >= w[0]));
}

#[test]
fn controller_handle_changes_are_visible_across_threads() {
    let mut controller = MidiController::new(0.0);
    controller.configure(SAMPLE_RATE, 64).unwrap();
    let mut handle = controller.handle();
    let before = controller.change_index();

    thread::spawn(move || handle.change(0.5)).join().unwrap();

    assert_eq!(controller.value(), 0.5);
    assert_eq!(controller.change_index(), before.next());
}

// ============================================================================
// 4. Block-size independence
// ============================================================================

fn modulated_graph() -> Product<Envelope, Lfo> {
    let mut lfo = Lfo::new();
    lfo.set_waveform(LfoWaveform::Triangle);
    lfo.frequency_mut().set_value(3.0);
    let mut graph = Product::new(Envelope::new(attack_only(0.01)), lfo);
    graph.configure(SAMPLE_RATE, 512).unwrap();
    graph
}

fn render_in_chunks(graph: &mut Product<Envelope, Lfo>, chunks: &[usize]) -> Vec<f32> {
    let mut rendered = Vec::new();
    let mut start = 0;
    for (round, &size) in chunks.iter().enumerate() {
        // Events are scheduled relative to the block they fall into.
        if (start..start + size).contains(&100) {
            graph.a.start((100 - start) as u32);
        }
        if (start..start + size).contains(&700) {
            graph.a.end((700 - start) as u32);
        }
        let ctx = BlockContext::new(Round(round as u64 + 1), size, SAMPLE_RATE);
        rendered.extend_from_slice(&produce(graph, &ctx).channel(0)[..size]);
        start += size;
    }
    rendered
}

#[test]
fn one_block_equals_many_small_blocks() {
    let whole = render_in_chunks(&mut modulated_graph(), &[512, 512]);
    let split = render_in_chunks(&mut modulated_graph(), &[100, 37, 300, 75, 1, 199, 312]);
    assert_eq!(whole.len(), split.len());
    assert_eq!(whole, split);
}

#[test]
fn follower_meters_a_rendered_graph() {
    let mut follower = Follower::new(Envelope::new(attack_only(0.0)));
    follower.configure(SAMPLE_RATE, 4800).unwrap();
    follower.source_mut().start(0);

    produce(&mut follower, &BlockContext::new(Round(1), 4800, SAMPLE_RATE));
    assert!(follower.level() > 0.99);
}

#[test]
fn cancel_tag_is_shared_by_every_producer() {
    let mut envelope = Envelope::new(attack_only(0.0));
    envelope.configure(SAMPLE_RATE, 16).unwrap();
    envelope.start(0);
    envelope.core_mut().schedule(Event::new(EventTag::CANCEL, 8));

    let out = produce(&mut envelope, &BlockContext::new(Round(1), 16, SAMPLE_RATE));
    assert_eq!(out.channel(0)[7], 1.0);
    assert_eq!(out.channel(0)[8], 0.0);
}
