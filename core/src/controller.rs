use tracing::debug;

use crate::config::BatchingConfig;

/// Additive-increase / multiplicative-decrease control of the batch size.
///
/// The target probes upward by `increase_step` after every committed batch
/// and halves after every batch that exhausted the resource ladder. It always
/// stays within `[floor, ceiling]`, where `ceiling` is the initial size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchSizeController {
    target: usize,
    floor: usize,
    ceiling: usize,
    increase_step: usize,
}

impl BatchSizeController {
    pub fn new(initial: usize, floor: usize, increase_step: usize) -> Self {
        let floor = floor.max(1);
        let ceiling = initial.max(floor);
        Self {
            target: ceiling,
            floor,
            ceiling,
            increase_step,
        }
    }

    pub fn from_config(config: &BatchingConfig) -> Self {
        Self::new(
            config.initial_batch_size,
            config.floor_batch_size,
            config.increase_step,
        )
    }

    pub fn target(&self) -> usize {
        self.target
    }

    pub fn floor(&self) -> usize {
        self.floor
    }

    pub fn ceiling(&self) -> usize {
        self.ceiling
    }

    pub fn on_success(&mut self) {
        let next = self
            .target
            .saturating_add(self.increase_step)
            .min(self.ceiling);
        if next != self.target {
            debug!(from = self.target, to = next, "increasing batch size");
        }
        self.target = next;
    }

    pub fn on_exhausted(&mut self) {
        let next = (self.target / 2).max(self.floor);
        if next != self.target {
            debug!(from = self.target, to = next, "reducing batch size");
        }
        self.target = next;
    }
}
