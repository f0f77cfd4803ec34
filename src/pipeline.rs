//! Decode followed by suppression with one shared configuration.

use crate::bbox::Detection;
use crate::config::Config;
use crate::decode::GridDecoder;
use crate::grid::OffsetCache;
use crate::suppress::{SuppressionStrategy, Suppressor};
use crate::tensor::{PredictionBatch, PredictionTensor};
use crate::util::YoloPostResult;

/// End-to-end postprocessor: raw tensor in, detections out.
#[derive(Clone, Debug)]
pub struct Pipeline {
    decoder: GridDecoder,
    suppressor: Suppressor,
    strategy: SuppressionStrategy,
}

impl Pipeline {
    /// Creates a pipeline using the default (per-class) strategy.
    pub fn new(cfg: Config) -> Self {
        Self {
            suppressor: Suppressor::new(cfg.clone()),
            decoder: GridDecoder::new(cfg),
            strategy: SuppressionStrategy::default(),
        }
    }

    /// Creates a pipeline that takes its grid offsets from `cache`.
    pub fn with_cache(cfg: Config, cache: &OffsetCache) -> Self {
        Self {
            suppressor: Suppressor::new(cfg.clone()),
            decoder: GridDecoder::with_cache(cfg, cache),
            strategy: SuppressionStrategy::default(),
        }
    }

    /// Replaces the suppression strategy.
    pub fn with_strategy(mut self, strategy: SuppressionStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Returns the suppression strategy.
    pub fn strategy(&self) -> SuppressionStrategy {
        self.strategy
    }

    /// Returns the decode stage.
    pub fn decoder(&self) -> &GridDecoder {
        &self.decoder
    }

    /// Returns the suppression stage.
    pub fn suppressor(&self) -> &Suppressor {
        &self.suppressor
    }

    /// Runs decode and suppression on one image.
    pub fn run(&self, tensor: PredictionTensor<'_>) -> YoloPostResult<Vec<Detection>> {
        let candidates = self.decoder.decode(tensor)?;
        Ok(self.suppressor.suppress(&candidates, self.strategy))
    }

    /// Runs decode and suppression on every image of a batch.
    pub fn run_batch(&self, batch: PredictionBatch<'_>) -> YoloPostResult<Vec<Vec<Detection>>> {
        let decoded = self.decoder.decode_batch(batch)?;
        Ok(decoded
            .iter()
            .map(|candidates| self.suppressor.suppress(candidates, self.strategy))
            .collect())
    }
}
