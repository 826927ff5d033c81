//! Core data types for DNN Desktop.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of leading predictions that count towards the top-5 metric.
pub const TOP5_WINDOW: usize = 5;

/// Classification program package in the tool's registry.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Program {
    /// UOA of the program package
    pub uoa: String,
    /// Human readable name shown in listings
    pub title: String,
    /// Name of the classifier binary the tool launches
    pub exe: String,
    /// File the classifier writes its per-image results to
    pub output_file: String,
}

/// Trained model package.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Model {
    pub uoa: String,
    pub title: String,
}

/// Validation dataset, split into the auxiliary package and the images package.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Dataset {
    pub aux_uoa: String,
    pub val_uoa: String,
    pub title: String,
}

/// One candidate label for an image.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PredictionResult {
    /// Probability reported by the classifier
    pub accuracy: f64,
    /// Always 0 in the current output format
    pub index: i32,
    pub label: String,
    /// True iff `label` equals the image's correct label
    pub is_correct: bool,
}

impl fmt::Display for PredictionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2} - \"{}\"", self.accuracy, self.label)
    }
}

/// Everything the classifier reported about a single image.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ImageResult {
    pub image_file: String,
    /// Seconds spent classifying the image
    pub duration: f64,
    pub correct_label: String,
    /// Predictions in the order they were reported, best first
    pub predictions: Vec<PredictionResult>,
}

impl ImageResult {
    /// True when no field has been set yet.
    pub fn is_empty(&self) -> bool {
        self.image_file.is_empty()
            && self.duration == 0.0
            && self.correct_label.is_empty()
            && self.predictions.is_empty()
    }

    /// First prediction, if any.
    pub fn top1(&self) -> Option<&PredictionResult> {
        self.predictions.first()
    }

    pub fn is_correct_top1(&self) -> bool {
        self.top1().map_or(false, |p| p.is_correct)
    }

    pub fn is_correct_top5(&self) -> bool {
        self.predictions
            .iter()
            .take(TOP5_WINDOW)
            .any(|p| p.is_correct)
    }

    /// Prediction for the correct label, or a zero-accuracy placeholder when
    /// the classifier did not list it.
    pub fn correct_prediction(&self) -> PredictionResult {
        self.predictions
            .iter()
            .find(|p| p.is_correct)
            .cloned()
            .unwrap_or_else(|| PredictionResult {
                accuracy: 0.0,
                index: 0,
                label: self.correct_label.clone(),
                is_correct: true,
            })
    }
}

/// The most confidently misclassified image seen so far.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorstPrediction {
    pub image_file: String,
    pub top1: PredictionResult,
    pub correct: PredictionResult,
}

impl WorstPrediction {
    /// How much more the classifier believed in its wrong answer.
    pub fn gap(&self) -> f64 {
        self.top1.accuracy - self.correct.accuracy
    }
}

/// Running metrics of one experiment.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ExperimentResult {
    pub images_count: u64,
    pub total_time: f64,
    pub time_per_image: f64,
    pub images_per_second: f64,
    pub top1_count: u64,
    pub top5_count: u64,
    pub top1_metric: f64,
    pub top5_metric: f64,
    pub worst_prediction: Option<WorstPrediction>,
}

impl ExperimentResult {
    pub fn reset(&mut self) {
        *self = ExperimentResult::default();
    }

    /// Fold one image into the running metrics.
    pub fn accumulate(&mut self, image: &ImageResult) {
        self.images_count += 1;
        self.total_time += image.duration;
        self.time_per_image = self.total_time / self.images_count as f64;
        self.images_per_second = if self.time_per_image > 0.0 {
            1.0 / self.time_per_image
        } else {
            0.0
        };

        if image.is_correct_top1() {
            self.top1_count += 1;
        }
        if image.is_correct_top5() {
            self.top5_count += 1;
        }
        self.top1_metric = self.top1_count as f64 / self.images_count as f64;
        self.top5_metric = self.top5_count as f64 / self.images_count as f64;

        if let Some(top1) = image.top1() {
            if !top1.is_correct {
                let candidate = WorstPrediction {
                    image_file: image.image_file.clone(),
                    top1: top1.clone(),
                    correct: image.correct_prediction(),
                };
                let replace = match &self.worst_prediction {
                    Some(worst) => candidate.gap() >= worst.gap(),
                    None => true,
                };
                if replace {
                    self.worst_prediction = Some(candidate);
                }
            }
        }
    }

    pub fn has_results(&self) -> bool {
        self.images_count > 0
    }
}
