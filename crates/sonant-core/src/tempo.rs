//! Host transport information and tempo-sync helpers.
//!
//! The host hands a [`TransportInfo`] to every render call. Producers that
//! depend on tempo read it from the block context; the synth root watches it
//! with a [`TransportTracker`] to detect jumps in host time.

/// Musical note divisions for tempo sync.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum NoteDivision {
    /// Whole note (4 beats)
    Whole,
    /// Half note (2 beats)
    Half,
    /// Quarter note (1 beat)
    #[default]
    Quarter,
    /// Eighth note (1/2 beat)
    Eighth,
    /// Sixteenth note (1/4 beat)
    Sixteenth,
    /// Dotted quarter note (1.5 beats)
    DottedQuarter,
    /// Dotted eighth note (3/4 beat)
    DottedEighth,
    /// Triplet quarter note (2/3 beat)
    TripletQuarter,
    /// Triplet eighth note (1/3 beat)
    TripletEighth,
}

impl NoteDivision {
    /// All divisions in parameter order.
    pub const ALL: [NoteDivision; 9] = [
        NoteDivision::Whole,
        NoteDivision::Half,
        NoteDivision::Quarter,
        NoteDivision::Eighth,
        NoteDivision::Sixteenth,
        NoteDivision::DottedQuarter,
        NoteDivision::DottedEighth,
        NoteDivision::TripletQuarter,
        NoteDivision::TripletEighth,
    ];

    /// Picks a division from a normalized `[0, 1]` parameter value.
    pub fn from_ratio(ratio: f32) -> Self {
        let last = Self::ALL.len() - 1;
        let index = (ratio.clamp(0.0, 1.0) * last as f32 + 0.5) as usize;
        Self::ALL[index.min(last)]
    }

    /// Frequency of one division per cycle at `bpm`.
    ///
    /// ```rust
    /// use sonant_core::NoteDivision;
    ///
    /// assert!((NoteDivision::Quarter.to_hz(120.0) - 2.0).abs() < 1e-6);
    /// assert!((NoteDivision::Eighth.to_hz(120.0) - 4.0).abs() < 1e-6);
    /// ```
    pub fn to_hz(&self, bpm: f64) -> f32 {
        let beats_per_second = bpm.max(1.0) / 60.0;
        (beats_per_second / self.beats()) as f32
    }

    /// Length in seconds at `bpm`.
    pub fn to_seconds(&self, bpm: f64) -> f32 {
        (self.beats() * 60.0 / bpm.max(1.0)) as f32
    }

    /// Number of beats this division spans.
    pub fn beats(&self) -> f64 {
        match self {
            NoteDivision::Whole => 4.0,
            NoteDivision::Half => 2.0,
            NoteDivision::Quarter => 1.0,
            NoteDivision::Eighth => 0.5,
            NoteDivision::Sixteenth => 0.25,
            NoteDivision::DottedQuarter => 1.5,
            NoteDivision::DottedEighth => 0.75,
            NoteDivision::TripletQuarter => 2.0 / 3.0,
            NoteDivision::TripletEighth => 1.0 / 3.0,
        }
    }
}

/// Host transport state for one render call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransportInfo {
    /// Tempo in beats per minute.
    pub tempo_bpm: f64,
    /// Time signature numerator.
    pub time_sig_numerator: u8,
    /// Time signature denominator.
    pub time_sig_denominator: u8,
    /// Position of the first sample of the block, in seconds of host time.
    pub position_seconds: f64,
    /// Whether the host transport is running.
    pub playing: bool,
}

impl TransportInfo {
    /// Default tempo when the host provides none.
    pub const DEFAULT_BPM: f64 = 120.0;

    /// A stopped transport at 120 BPM, 4/4, position zero.
    pub const fn stopped() -> Self {
        Self {
            tempo_bpm: Self::DEFAULT_BPM,
            time_sig_numerator: 4,
            time_sig_denominator: 4,
            position_seconds: 0.0,
            playing: false,
        }
    }

    /// A running transport at `tempo_bpm` starting at `position_seconds`.
    pub const fn playing(tempo_bpm: f64, position_seconds: f64) -> Self {
        Self {
            tempo_bpm,
            position_seconds,
            playing: true,
            ..Self::stopped()
        }
    }

    /// Position in beats.
    pub fn position_beats(&self) -> f64 {
        self.position_seconds * self.tempo_bpm / 60.0
    }
}

impl Default for TransportInfo {
    fn default() -> Self {
        Self::stopped()
    }
}

/// Detects discontinuities in host time between consecutive blocks.
///
/// A discontinuity is a transport start, or a playing transport whose
/// position differs from where the previous block ended by more than one
/// sample.
#[derive(Debug, Clone, Default)]
pub struct TransportTracker {
    expected_position: Option<f64>,
}

impl TransportTracker {
    /// Creates a tracker that has not seen any block yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one block. Returns `true` if time-dependent state should reset.
    pub fn observe(&mut self, transport: &TransportInfo, sample_count: usize, sample_rate: f32) -> bool {
        if !transport.playing {
            self.expected_position = None;
            return false;
        }

        let sampling_period = 1.0 / f64::from(sample_rate);
        let jumped = match self.expected_position {
            Some(expected) => (transport.position_seconds - expected).abs() > sampling_period,
            None => true,
        };
        self.expected_position =
            Some(transport.position_seconds + sample_count as f64 * sampling_period);
        jumped
    }

    /// Forgets the previous block.
    pub fn reset(&mut self) {
        self.expected_position = None;
    }
}
