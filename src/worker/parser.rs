//! Line protocol parser for the classifier's output file.
//!
//! The classifier appends one block per image:
//!
//! ```text
//! File: ILSVRC2012_val_00000001.JPEG
//! Duration: 0.734 sec
//! Correct label: n01751748 sea snake
//! Predictions: 2
//! 0.2739 - "n01751748 sea snake"
//! 0.1431 - "n09256479 coral reef"
//!
//! ```
//!
//! Blocks are separated by blank lines. The parser is a small state machine
//! over a single in-progress record; it knows nothing about files or
//! processes and is fed one line at a time.

use crate::models::{ImageResult, PredictionResult};
use once_cell::sync::Lazy;
use regex::Regex;

const FILE_PREFIX: &str = "File: ";
const DURATION_PREFIX: &str = "Duration: ";
const DURATION_SUFFIX: &str = " sec";
const CORRECT_LABEL_PREFIX: &str = "Correct label: ";
const PREDICTIONS_PREFIX: &str = "Predictions: ";

static PREDICTION_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"^([0-9]*\.?[0-9]+) - "([^"]+)"$"#).expect("valid regex"));

#[derive(Debug, Default)]
pub struct RecordParser {
    current: ImageResult,
    /// Prediction lines still expected for the current record
    pending_predictions: u32,
    /// Prediction lines dropped because they did not match the pattern
    malformed_lines: u64,
}

impl RecordParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one line (with or without its line terminator).
    ///
    /// Returns a finished record when the line is the blank delimiter and
    /// the record collected so far is non-empty.
    pub fn feed(&mut self, raw: &str) -> Option<ImageResult> {
        let line = raw.trim();

        if line.is_empty() {
            return self.finish();
        }

        if let Some(rest) = line.strip_prefix(FILE_PREFIX) {
            self.current.image_file = rest.to_string();
        } else if let Some(rest) = line.strip_prefix(DURATION_PREFIX) {
            self.current.duration = parse_duration(rest);
        } else if let Some(rest) = line.strip_prefix(CORRECT_LABEL_PREFIX) {
            self.current.correct_label = rest.trim().to_string();
        } else if let Some(rest) = line.strip_prefix(PREDICTIONS_PREFIX) {
            self.pending_predictions = rest.trim().parse::<u32>().unwrap_or(0);
        } else if self.pending_predictions > 0 {
            self.pending_predictions -= 1;
            match parse_prediction(line, &self.current.correct_label) {
                Some(prediction) => self.current.predictions.push(prediction),
                None => {
                    self.malformed_lines += 1;
                    log::warn!("Failed to parse prediction result line: {:?}", line);
                }
            }
        }

        None
    }

    /// Close the in-progress record. Returns it if any field was set; the
    /// parser is ready for the next record either way.
    pub fn finish(&mut self) -> Option<ImageResult> {
        let record = std::mem::take(&mut self.current);
        if record.is_empty() {
            None
        } else {
            Some(record)
        }
    }

    pub fn pending_predictions(&self) -> u32 {
        self.pending_predictions
    }

    pub fn malformed_lines(&self) -> u64 {
        self.malformed_lines
    }
}

fn parse_duration(rest: &str) -> f64 {
    let value = rest.strip_suffix(DURATION_SUFFIX).unwrap_or(rest).trim();
    match value.parse::<f64>() {
        Ok(v) => v,
        Err(_) => {
            log::warn!("Failed to parse duration: {:?}", rest);
            0.0
        }
    }
}

fn parse_prediction(line: &str, correct_label: &str) -> Option<PredictionResult> {
    let caps = PREDICTION_REGEX.captures(line)?;
    let accuracy = caps[1].parse::<f64>().ok()?;
    let label = caps[2].trim().to_string();
    let is_correct = label == correct_label;
    Some(PredictionResult {
        accuracy,
        index: 0,
        label,
        is_correct,
    })
}
