//! Text rendering of the results panel.

use crate::models::ExperimentResult;

const NOT_AVAILABLE: &str = "N/A";

pub struct ResultsPanel;

impl ResultsPanel {
    /// Render the panel. Before the first result every metric reads `N/A`.
    pub fn render(result: &ExperimentResult) -> String {
        let mut out = String::new();

        if result.has_results() {
            out.push_str(&format!(
                "TIME PER IMAGE (FPS): {:.2} ({:.2})\n",
                result.time_per_image, result.images_per_second
            ));
            out.push_str(&format!("TOP-1: {:.2}\n", result.top1_metric));
            out.push_str(&format!("TOP-5: {:.2}\n", result.top5_metric));
        } else {
            out.push_str(&format!("TIME PER IMAGE (FPS): {}\n", NOT_AVAILABLE));
            out.push_str(&format!("TOP-1: {}\n", NOT_AVAILABLE));
            out.push_str(&format!("TOP-5: {}\n", NOT_AVAILABLE));
        }

        match &result.worst_prediction {
            Some(worst) => {
                out.push_str(&format!("WORST PREDICTION: {}\n", worst.image_file));
                out.push_str(&format!("  Top1: {}\n", worst.top1));
                out.push_str(&format!("  Correct: {}\n", worst.correct));
            }
            None => out.push_str(&format!("WORST PREDICTION: {}\n", NOT_AVAILABLE)),
        }

        out
    }

    /// Single-line form for progress output.
    pub fn status_line(result: &ExperimentResult) -> String {
        if !result.has_results() {
            return format!("images: 0, top-1: {}, top-5: {}", NOT_AVAILABLE, NOT_AVAILABLE);
        }
        format!(
            "images: {}, {:.2} s/img ({:.2} img/s), top-1: {:.2}, top-5: {:.2}",
            result.images_count,
            result.time_per_image,
            result.images_per_second,
            result.top1_metric,
            result.top5_metric
        )
    }
}
