//! Top-1/top-5 accuracy metrics, accumulated batch by batch.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::Label;

/// Number of ranked labels kept per image
pub const TOP_K: usize = 5;

/// Ranks class indices by descending score and returns the best `k`.
///
/// Equal scores keep ascending class index order; NaN ranks below every number.
pub fn top_k_classes(scores: &[f32], k: usize) -> Vec<usize> {
    let key = |i: usize| {
        let s = scores[i];
        if s.is_nan() {
            f32::NEG_INFINITY
        } else {
            s
        }
    };
    let mut indices: Vec<usize> = (0..scores.len()).collect();
    // Stable sort, so ties stay in index order.
    indices.sort_by(|&a, &b| key(b).total_cmp(&key(a)));
    indices.truncate(k);
    indices
}

/// Outcome of classifying a single image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageOutcome {
    /// Best label
    pub predicted: Label,
    /// Up to five labels, best first
    pub top_labels: Vec<Label>,
    pub top1_correct: bool,
    pub top5_correct: bool,
}

/// Scores one prediction against its ground-truth label.
///
/// With `postprocess` disabled the engine output already is the label: its
/// first element is taken as the prediction and top-5 equals top-1.
pub fn score_prediction(
    prediction: &[f32],
    label: Label,
    postprocess: bool,
) -> Result<ImageOutcome> {
    if prediction.is_empty() {
        return Err(Error::Inference("Engine returned an empty prediction".to_string()));
    }

    if !postprocess {
        let value = prediction[0];
        let predicted = value as Label;
        let correct = value.fract() == 0.0 && predicted == label;
        return Ok(ImageOutcome {
            predicted,
            top_labels: vec![predicted],
            top1_correct: correct,
            top5_correct: correct,
        });
    }

    let top_labels: Vec<Label> = top_k_classes(prediction, TOP_K)
        .into_iter()
        .map(|class| class as Label)
        .collect();
    let predicted = top_labels[0];

    Ok(ImageOutcome {
        predicted,
        top1_correct: predicted == label,
        top5_correct: top_labels.contains(&label),
        top_labels,
    })
}

/// Metrics of one batch plus the running totals as of its end
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchMetrics {
    pub batch_id: usize,
    pub num_images: usize,
    /// Ground-truth labels, offset already applied
    pub gtlabels: Vec<Label>,
    /// Ranked labels per image, best first
    pub top_5_labels: Vec<Vec<Label>>,
    /// Whether each image's top-1 prediction matched its label
    #[serde(default)]
    pub top_1_correct: Vec<bool>,
    pub true_positives: usize,
    pub top_5_true_positives: usize,
    pub accuracy: f64,
    pub top_5_accuracy: f64,
    pub cumulative_true_positives: usize,
    pub cumulative_top_5_true_positives: usize,
    pub cumulative_images: usize,
    pub cumulative_accuracy: f64,
    pub cumulative_top_5_accuracy: f64,
}

impl BatchMetrics {
    /// Best label of each image
    pub fn predicted_labels(&self) -> impl Iterator<Item = Label> + '_ {
        self.top_5_labels.iter().map(|labels| labels[0])
    }

    /// Looks up a numeric field by name, as used when charting a series
    pub fn field(&self, name: &str) -> Option<f64> {
        let value = match name {
            "batch_id" => self.batch_id as f64,
            "num_images" => self.num_images as f64,
            "true_positives" => self.true_positives as f64,
            "top_5_true_positives" => self.top_5_true_positives as f64,
            "accuracy" => self.accuracy,
            "top_5_accuracy" => self.top_5_accuracy,
            "cumulative_true_positives" => self.cumulative_true_positives as f64,
            "cumulative_top_5_true_positives" => self.cumulative_top_5_true_positives as f64,
            "cumulative_images" => self.cumulative_images as f64,
            "cumulative_accuracy" => self.cumulative_accuracy,
            "cumulative_top_5_accuracy" => self.cumulative_top_5_accuracy,
            _ => return None,
        };
        Some(value)
    }
}

/// Running totals over every batch seen so far
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CumulativeMetrics {
    pub true_positives: usize,
    pub top_5_true_positives: usize,
    pub total_images: usize,
}

impl CumulativeMetrics {
    pub fn accuracy(&self) -> f64 {
        ratio(self.true_positives, self.total_images)
    }

    pub fn top_5_accuracy(&self) -> f64 {
        ratio(self.top_5_true_positives, self.total_images)
    }
}

fn ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

/// Accumulates top-1/top-5 true positives across sequential batches
#[derive(Debug, Clone)]
pub struct MetricsAccumulator {
    postprocess: bool,
    totals: CumulativeMetrics,
}

impl MetricsAccumulator {
    pub fn new(postprocess: bool) -> Self {
        Self {
            postprocess,
            totals: CumulativeMetrics::default(),
        }
    }

    pub fn totals(&self) -> CumulativeMetrics {
        self.totals
    }

    /// Scores a batch, folds it into the running totals and returns its record
    pub fn update(
        &mut self,
        batch_id: usize,
        predictions: &[Vec<f32>],
        labels: &[Label],
    ) -> Result<BatchMetrics> {
        if predictions.is_empty() {
            return Err(Error::InvalidArgument(format!("Batch {batch_id} is empty")));
        }
        if predictions.len() != labels.len() {
            return Err(Error::InvalidArgument(format!(
                "Batch {batch_id}: {} predictions for {} labels",
                predictions.len(),
                labels.len()
            )));
        }

        let mut top_5_labels = Vec::with_capacity(labels.len());
        let mut top_1_correct = Vec::with_capacity(labels.len());
        let mut true_positives = 0;
        let mut top_5_true_positives = 0;
        for (prediction, &label) in predictions.iter().zip(labels) {
            let outcome = score_prediction(prediction, label, self.postprocess)?;
            true_positives += outcome.top1_correct as usize;
            top_5_true_positives += outcome.top5_correct as usize;
            top_1_correct.push(outcome.top1_correct);
            top_5_labels.push(outcome.top_labels);
        }

        let num_images = labels.len();
        self.totals.true_positives += true_positives;
        self.totals.top_5_true_positives += top_5_true_positives;
        self.totals.total_images += num_images;

        Ok(BatchMetrics {
            batch_id,
            num_images,
            gtlabels: labels.to_vec(),
            top_5_labels,
            top_1_correct,
            true_positives,
            top_5_true_positives,
            accuracy: ratio(true_positives, num_images),
            top_5_accuracy: ratio(top_5_true_positives, num_images),
            cumulative_true_positives: self.totals.true_positives,
            cumulative_top_5_true_positives: self.totals.top_5_true_positives,
            cumulative_images: self.totals.total_images,
            cumulative_accuracy: self.totals.accuracy(),
            cumulative_top_5_accuracy: self.totals.top_5_accuracy(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn one_hot(num_classes: usize, class: usize) -> Vec<f32> {
        let mut scores = vec![0.0; num_classes];
        scores[class] = 1.0;
        scores
    }

    #[test]
    fn test_top_k_orders_by_score() {
        let scores = [0.1, 0.7, 0.05, 0.9, 0.3, 0.2, 0.0];
        assert_eq!(top_k_classes(&scores, 5), vec![3, 1, 4, 5, 0]);
        assert_eq!(top_k_classes(&scores[..2], 5), vec![1, 0]);
    }

    #[test]
    fn test_top_k_ties_prefer_lowest_index() {
        let scores = [0.5, 0.9, 0.5, 0.5, 0.5, 0.5, 0.5];
        assert_eq!(top_k_classes(&scores, 5), vec![1, 0, 2, 3, 4]);
    }

    #[test]
    fn test_top_k_nan_ranks_last() {
        let scores = [f32::NAN, 0.2, 0.1];
        assert_eq!(top_k_classes(&scores, 3), vec![1, 2, 0]);
    }

    #[test]
    fn test_sixth_ranked_label_misses_top5() {
        let scores = [0.9, 0.8, 0.7, 0.6, 0.5, 0.4];
        let outcome = score_prediction(&scores, 5, true).unwrap();
        assert!(!outcome.top5_correct);
        assert!(!outcome.top1_correct);
        assert_eq!(outcome.top_labels, vec![0, 1, 2, 3, 4]);

        let outcome = score_prediction(&scores, 4, true).unwrap();
        assert!(outcome.top5_correct);
    }

    #[test]
    fn test_raw_label_predictions() {
        let outcome = score_prediction(&[3.0], 3, false).unwrap();
        assert!(outcome.top1_correct && outcome.top5_correct);
        assert_eq!(outcome.top_labels, vec![3]);

        let outcome = score_prediction(&[3.5], 3, false).unwrap();
        assert!(!outcome.top1_correct);
    }

    #[test]
    fn test_batch_records_per_image_correctness() {
        let mut acc = MetricsAccumulator::new(false);
        let record = acc
            .update(0, &[vec![3.5], vec![2.0], vec![1.0]], &[3, 2, 4])
            .unwrap();
        assert_eq!(record.top_1_correct, vec![false, true, false]);
        assert_eq!(
            record.top_1_correct.iter().filter(|&&c| c).count(),
            record.true_positives
        );
    }

    #[test]
    fn test_empty_prediction_is_inference_error() {
        assert!(matches!(
            score_prediction(&[], 0, true),
            Err(Error::Inference(_))
        ));
    }

    #[test]
    fn test_cumulative_equals_sum_of_batches() {
        let mut acc = MetricsAccumulator::new(true);
        let batches: Vec<(Vec<Vec<f32>>, Vec<Label>)> = vec![
            (vec![one_hot(10, 1), one_hot(10, 2)], vec![1, 3]),
            (vec![one_hot(10, 4), one_hot(10, 5), one_hot(10, 6)], vec![4, 5, 6]),
            (vec![one_hot(10, 0)], vec![9]),
        ];

        let mut tp_sum = 0;
        let mut seen = 0;
        let mut last_cumulative = 0;
        for (batch_id, (predictions, labels)) in batches.iter().enumerate() {
            let record = acc.update(batch_id, predictions, labels).unwrap();
            tp_sum += record.true_positives;
            seen += record.num_images;
            assert_eq!(record.cumulative_true_positives, tp_sum);
            assert_eq!(record.cumulative_images, seen);
            assert!(record.cumulative_true_positives >= last_cumulative);
            assert!((record.cumulative_accuracy - tp_sum as f64 / seen as f64).abs() < 1e-12);
            last_cumulative = record.cumulative_true_positives;
        }

        assert_eq!(acc.totals().true_positives, 4);
        assert_eq!(acc.totals().total_images, 6);
    }

    #[test]
    fn test_batch_accuracy_values() {
        let mut acc = MetricsAccumulator::new(true);
        let record = acc
            .update(0, &[one_hot(6, 0), one_hot(6, 1)], &[0, 2])
            .unwrap();
        assert_eq!(record.true_positives, 1);
        assert_eq!(record.accuracy, 0.5);
        // Label 2 sits among the zero scores, which rank 1, 0, 2, ...
        assert_eq!(record.top_5_true_positives, 2);
        assert_eq!(record.predicted_labels().collect::<Vec<_>>(), vec![0, 1]);
    }

    #[test]
    fn test_update_rejects_mismatched_batch() {
        let mut acc = MetricsAccumulator::new(true);
        assert!(acc.update(0, &[], &[]).is_err());
        assert!(acc.update(0, &[one_hot(3, 0)], &[0, 1]).is_err());
    }

    #[test]
    fn test_field_lookup() {
        let mut acc = MetricsAccumulator::new(true);
        let record = acc.update(0, &[one_hot(3, 2)], &[2]).unwrap();
        assert_eq!(record.field("accuracy"), Some(1.0));
        assert_eq!(record.field("cumulative_top_5_accuracy"), Some(1.0));
        assert_eq!(record.field("loss"), None);
    }
}
