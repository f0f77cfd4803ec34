//! Non-maximum suppression over decoded candidates.
//!
//! Two strategies share one greedy NMS routine:
//!
//! - [`SuppressionStrategy::Global`] ignores class labels, so two overlapping
//!   objects of different classes can suppress each other.
//! - [`SuppressionStrategy::PerClass`] runs NMS independently inside every
//!   class partition and concatenates the survivors in class order. This is
//!   the default.
//!
//! Candidates at or below the detection threshold never enter NMS, and the
//! survivors are checked against the threshold once more before returning.

use crate::bbox::Detection;
use crate::candidate::nms::greedy_nms;
use crate::candidate::{sort_indices_desc, Candidates};
use crate::config::Config;
use crate::trace::{trace_debug, trace_event, trace_span};
#[cfg(feature = "rayon")]
use rayon::prelude::*;
use std::collections::BTreeMap;

/// Selects how overlapping candidates are suppressed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SuppressionStrategy {
    /// Class-agnostic NMS over all candidates.
    Global,
    /// Independent NMS per class index.
    #[default]
    PerClass,
}

/// Applies NMS and the final score check with the thresholds of a [`Config`].
#[derive(Clone, Debug)]
pub struct Suppressor {
    cfg: Config,
}

impl Suppressor {
    /// Creates a suppressor using the thresholds and cap of `cfg`.
    pub fn new(cfg: Config) -> Self {
        Self { cfg }
    }

    /// Returns the suppressor configuration.
    pub fn config(&self) -> &Config {
        &self.cfg
    }

    /// Returns the surviving detections.
    ///
    /// `Global` yields detections in descending score order. `PerClass`
    /// yields them grouped by ascending class, each group in descending score
    /// order. Never more than `max_detections` are returned.
    pub fn suppress(
        &self,
        candidates: &Candidates,
        strategy: SuppressionStrategy,
    ) -> Vec<Detection> {
        self.suppress_indices(candidates, strategy)
            .into_iter()
            .filter_map(|idx| candidates.get(idx))
            .collect()
    }

    /// Like [`Suppressor::suppress`] but returns indices into `candidates`.
    pub fn suppress_indices(
        &self,
        candidates: &Candidates,
        strategy: SuppressionStrategy,
    ) -> Vec<usize> {
        let _span = trace_span!("suppress", candidates = candidates.len()).entered();
        let threshold = self.cfg.detection_threshold();
        let scores = candidates.scores();

        let eligible: Vec<usize> = (0..candidates.len())
            .filter(|&idx| scores[idx] > threshold)
            .collect();
        if eligible.is_empty() {
            trace_event!("suppressed", eligible = 0usize, kept = 0usize);
            return Vec::new();
        }
        let eligible_count = eligible.len();

        let mut kept = match strategy {
            SuppressionStrategy::Global => self.global(candidates, eligible),
            SuppressionStrategy::PerClass => self.per_class(candidates, eligible),
        };
        kept.retain(|&idx| scores[idx] > threshold);

        trace_event!("suppressed", eligible = eligible_count, kept = kept.len());
        kept
    }

    fn global(&self, candidates: &Candidates, mut eligible: Vec<usize>) -> Vec<usize> {
        greedy_nms(
            candidates.boxes(),
            candidates.scores(),
            &mut eligible,
            self.cfg.nms_iou_threshold(),
            self.cfg.max_detections(),
        )
    }

    fn per_class(&self, candidates: &Candidates, eligible: Vec<usize>) -> Vec<usize> {
        let classes = candidates.classes();
        let mut partitions: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for idx in eligible {
            partitions.entry(classes[idx]).or_default().push(idx);
        }
        let mut partitions: Vec<(usize, Vec<usize>)> = partitions.into_iter().collect();

        let per_class = self.run_partitions(candidates, &mut partitions);

        let mut kept: Vec<usize> = per_class.into_iter().flatten().collect();
        self.cap_by_score(candidates, &mut kept);
        kept
    }

    #[cfg(feature = "rayon")]
    fn run_partitions(
        &self,
        candidates: &Candidates,
        partitions: &mut [(usize, Vec<usize>)],
    ) -> Vec<Vec<usize>> {
        if self.cfg.parallel() {
            return partitions
                .par_iter_mut()
                .map(|(class, indices)| self.run_partition(candidates, *class, indices))
                .collect();
        }
        partitions
            .iter_mut()
            .map(|(class, indices)| self.run_partition(candidates, *class, indices))
            .collect()
    }

    #[cfg(not(feature = "rayon"))]
    fn run_partitions(
        &self,
        candidates: &Candidates,
        partitions: &mut [(usize, Vec<usize>)],
    ) -> Vec<Vec<usize>> {
        partitions
            .iter_mut()
            .map(|(class, indices)| self.run_partition(candidates, *class, indices))
            .collect()
    }

    fn run_partition(
        &self,
        candidates: &Candidates,
        class: usize,
        indices: &mut [usize],
    ) -> Vec<usize> {
        let kept = greedy_nms(
            candidates.boxes(),
            candidates.scores(),
            indices,
            self.cfg.nms_iou_threshold(),
            self.cfg.max_detections(),
        );
        trace_debug!(
            "class_partition",
            class = class,
            candidates = indices.len(),
            kept = kept.len()
        );
        kept
    }

    /// Drops the lowest scoring entries beyond `max_detections`, keeping order.
    fn cap_by_score(&self, candidates: &Candidates, kept: &mut Vec<usize>) {
        let max = self.cfg.max_detections();
        if kept.len() <= max {
            return;
        }
        let mut ranked = kept.clone();
        sort_indices_desc(candidates.scores(), &mut ranked);
        let mut selected = vec![false; candidates.len()];
        for &idx in ranked.iter().take(max) {
            selected[idx] = true;
        }
        kept.retain(|&idx| selected[idx]);
    }
}
