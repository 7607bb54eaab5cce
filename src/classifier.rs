//! Intent classifier
//!
//! A bag-of-tokens naive Bayes model trained from labeled example texts.
//! Predictions below the configured threshold come back as the unsure
//! sentinel rather than an error.

pub mod metrics;
mod naive_bayes;

pub use metrics::Scores;
pub use naive_bayes::NaiveBayes;

use crate::pipeline::{normalize, PipelineConfig};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Confidence reported alongside the empty label
pub const UNSURE_CONFIDENCE: f64 = -1.0;

/// Example texts for one command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataClass {
    #[serde(alias = "label")]
    pub command: String,
    #[serde(alias = "examples")]
    pub texts: Vec<String>,
}

impl DataClass {
    pub fn new(command: impl Into<String>, texts: &[&str]) -> Self {
        Self {
            command: command.into(),
            texts: texts.iter().map(|t| (*t).to_string()).collect(),
        }
    }
}

/// Ordered training data
pub type Dataset = Vec<DataClass>;

/// Result of classifying one text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    /// Predicted command, empty when unsure
    pub label: String,
    pub confidence: f64,
}

impl Prediction {
    pub fn unsure() -> Self {
        Self {
            label: String::new(),
            confidence: UNSURE_CONFIDENCE,
        }
    }

    pub fn is_unsure(&self) -> bool {
        self.label.is_empty()
    }
}

#[derive(Error, Debug)]
pub enum ClassifierError {
    #[error("Model file error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Model encoding error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Model options fixed at training time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ModelParams {
    /// Weight tokens by TF-IDF instead of raw counts
    #[serde(default)]
    pub tfidf: bool,
}

/// Trained classifier together with the pipeline it was trained with
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Classifier {
    model: NaiveBayes,
    pipeline: PipelineConfig,
}

impl Classifier {
    /// Train a count model from `dataset`. Deterministic for a given dataset order.
    pub fn train(dataset: &[DataClass], pipeline: PipelineConfig) -> Self {
        Self::train_with(dataset, pipeline, ModelParams::default())
    }

    pub fn train_with(dataset: &[DataClass], pipeline: PipelineConfig, params: ModelParams) -> Self {
        let mut model = if params.tfidf {
            NaiveBayes::with_tfidf()
        } else {
            NaiveBayes::new()
        };
        for class in dataset {
            if class.texts.is_empty() {
                // Keep the label known even without examples
                model.learn(&class.command, &[]);
            }
            for text in &class.texts {
                model.learn(&class.command, &normalize(text, &pipeline));
            }
        }
        model.apply_tfidf();
        Self { model, pipeline }
    }

    /// Predict the command for `text`.
    ///
    /// Returns [`Prediction::unsure`] when the best score is below the threshold.
    pub fn predict(&self, text: &str) -> Prediction {
        let tokens = normalize(text, &self.pipeline);
        let Some((index, confidence)) = self.model.most_likely(&tokens) else {
            return Prediction::unsure();
        };
        let label = &self.model.labels()[index];

        tracing::debug!(
            text = %text,
            command = %label,
            confidence,
            "Classified text"
        );

        if confidence < self.pipeline.threshold {
            return Prediction::unsure();
        }

        Prediction {
            label: label.clone(),
            confidence,
        }
    }

    /// Fraction of training examples whose most likely label is their own,
    /// ignoring the threshold.
    #[allow(clippy::cast_precision_loss)]
    pub fn training_accuracy(&self, dataset: &[DataClass]) -> f64 {
        let mut total = 0usize;
        let mut correct = 0usize;
        for class in dataset {
            for text in &class.texts {
                total += 1;
                let tokens = normalize(text, &self.pipeline);
                if let Some((index, _)) = self.model.most_likely(&tokens) {
                    if self.model.labels()[index] == class.command {
                        correct += 1;
                    }
                }
            }
        }
        if total == 0 {
            return 0.0;
        }
        correct as f64 / total as f64
    }

    pub fn labels(&self) -> &[String] {
        self.model.labels()
    }

    pub fn pipeline(&self) -> &PipelineConfig {
        &self.pipeline
    }

    pub fn params(&self) -> ModelParams {
        ModelParams {
            tfidf: self.model.is_tfidf(),
        }
    }

    /// Persist the trained model as JSON
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ClassifierError> {
        let json = serde_json::to_string(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load a model previously written by [`Classifier::save`]
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ClassifierError> {
        let json = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }
}
