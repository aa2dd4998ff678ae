use std::fmt::{self, Display};

use machine_learning::arch::Mode;

/// Either portion of an epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Train,
    Test,
}

impl Phase {
    /// Every phase, in the order they run within an epoch.
    pub const ALL: [Phase; 2] = [Phase::Train, Phase::Test];

    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Train => "Train",
            Phase::Test => "Test",
        }
    }

    /// The mode the model runs in during this phase.
    pub fn mode(&self) -> Mode {
        match self {
            Phase::Train => Mode::Train,
            Phase::Test => Mode::Eval,
        }
    }

    /// Prefixes a metric name with this phase, as in `Test_spectrum_score`.
    pub fn field(&self, name: &str) -> String {
        format!("{}_{name}", self.as_str())
    }
}

impl Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The data sources of both phases.
#[derive(Debug, Clone)]
pub struct Dataloaders<D> {
    pub train: D,
    pub test: D,
}

impl<D> Dataloaders<D> {
    pub fn new(train: D, test: D) -> Self {
        Self { train, test }
    }

    pub fn get_mut(&mut self, phase: Phase) -> &mut D {
        match phase {
            Phase::Train => &mut self.train,
            Phase::Test => &mut self.test,
        }
    }
}
