//! Multinomial naive Bayes over token counts, optionally reweighted by TF-IDF

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Likelihood assigned to a token never seen for a label
const UNSEEN_TOKEN_PROB: f64 = 1e-11;

/// Token statistics for one label
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct LabelStats {
    freqs: HashMap<String, u64>,
    total: u64,
    /// TF-IDF weight per token, replacing `freqs` once computed
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    weights: HashMap<String, f64>,
    /// Term frequency of each token in every example that contained it
    #[serde(skip)]
    term_freqs: HashMap<String, Vec<f64>>,
}

impl LabelStats {
    #[allow(clippy::cast_precision_loss)]
    fn log_likelihood(&self, token: &str, weighted: bool) -> f64 {
        let count = if weighted {
            self.weights.get(token).copied()
        } else {
            self.freqs.get(token).map(|&c| c as f64)
        };
        match count {
            Some(count) if self.total > 0 && count > 0.0 => (count / self.total as f64).ln(),
            _ => UNSEEN_TOKEN_PROB.ln(),
        }
    }
}

/// Trained model: labels in first-seen order plus their token statistics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NaiveBayes {
    labels: Vec<String>,
    stats: Vec<LabelStats>,
    #[serde(default)]
    tfidf: bool,
    /// Examples learned, across all labels
    #[serde(default)]
    documents: u64,
    /// Likelihoods come from TF-IDF weights instead of raw counts
    #[serde(default)]
    weighted: bool,
}

impl NaiveBayes {
    pub fn new() -> Self {
        Self::default()
    }

    /// A model that records term frequencies so [`NaiveBayes::apply_tfidf`]
    /// can reweight token counts after training
    pub fn with_tfidf() -> Self {
        Self {
            tfidf: true,
            ..Self::default()
        }
    }

    pub fn is_tfidf(&self) -> bool {
        self.tfidf
    }

    /// Replace raw token counts with summed TF-IDF weights.
    ///
    /// Each example contributes `ln(1 + tf) * ln(1 + documents / label_tokens)`
    /// for every token it contains. Does nothing for a plain count model.
    #[allow(clippy::cast_precision_loss)]
    pub fn apply_tfidf(&mut self) {
        if !self.tfidf {
            return;
        }
        let documents = self.documents as f64;
        for stats in &mut self.stats {
            if stats.total == 0 {
                continue;
            }
            let idf = (documents / stats.total as f64).ln_1p();
            stats.weights = stats
                .term_freqs
                .iter()
                .map(|(token, tfs)| {
                    let weight: f64 = tfs.iter().map(|tf| tf.ln_1p() * idf).sum();
                    (token.clone(), weight)
                })
                .collect();
        }
        self.weighted = true;
    }

    /// Accumulate the tokens of one example under `label`
    pub fn learn(&mut self, label: &str, tokens: &[String]) {
        let index = match self.labels.iter().position(|l| l == label) {
            Some(i) => i,
            None => {
                self.labels.push(label.to_string());
                self.stats.push(LabelStats::default());
                self.labels.len() - 1
            }
        };
        let stats = &mut self.stats[index];
        for token in tokens {
            *stats.freqs.entry(token.clone()).or_insert(0) += 1;
            stats.total += 1;
        }
        if tokens.is_empty() {
            return;
        }
        self.documents += 1;

        if self.tfidf {
            let mut counts: HashMap<&str, u32> = HashMap::new();
            for token in tokens {
                *counts.entry(token.as_str()).or_insert(0) += 1;
            }
            let len = f64::from(u32::try_from(tokens.len()).unwrap_or(u32::MAX));
            for (token, count) in counts {
                stats
                    .term_freqs
                    .entry(token.to_string())
                    .or_default()
                    .push(f64::from(count) / len);
            }
        }
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Posterior probability of every label, in label order, summing to 1.
    ///
    /// Empty for an untrained model.
    #[allow(clippy::cast_precision_loss)]
    pub fn posteriors(&self, tokens: &[String]) -> Vec<f64> {
        if self.labels.is_empty() {
            return vec![];
        }

        let grand_total: u64 = self.stats.iter().map(|s| s.total).sum();
        let log_scores: Vec<f64> = self
            .stats
            .iter()
            .map(|stats| {
                let prior = if grand_total == 0 {
                    1.0
                } else {
                    stats.total as f64 / grand_total as f64
                };
                prior.ln()
                    + tokens
                        .iter()
                        .map(|t| stats.log_likelihood(t, self.weighted))
                        .sum::<f64>()
            })
            .collect();

        let max = log_scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        if !max.is_finite() {
            let uniform = 1.0 / log_scores.len() as f64;
            return vec![uniform; log_scores.len()];
        }

        let exps: Vec<f64> = log_scores.iter().map(|s| (s - max).exp()).collect();
        let sum: f64 = exps.iter().sum();
        exps.into_iter().map(|e| e / sum).collect()
    }

    /// Index and posterior of the most likely label; ties go to the label seen first.
    pub fn most_likely(&self, tokens: &[String]) -> Option<(usize, f64)> {
        let mut best: Option<(usize, f64)> = None;
        for (i, p) in self.posteriors(tokens).into_iter().enumerate() {
            match best {
                Some((_, best_p)) if p <= best_p => {}
                _ => best = Some((i, p)),
            }
        }
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(text: &str) -> Vec<String> {
        text.split_whitespace().map(String::from).collect()
    }

    #[test]
    fn test_untrained_model_has_no_posteriors() {
        let model = NaiveBayes::new();
        assert!(model.posteriors(&tokens("anything")).is_empty());
        assert!(model.most_likely(&tokens("anything")).is_none());
    }

    #[test]
    fn test_posteriors_sum_to_one() {
        let mut model = NaiveBayes::new();
        model.learn("greet", &tokens("hello there"));
        model.learn("bye", &tokens("goodbye friend"));
        let post = model.posteriors(&tokens("hello friend unknown"));
        let sum: f64 = post.iter().sum();
        assert!((sum - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_known_tokens_win() {
        let mut model = NaiveBayes::new();
        model.learn("greet", &tokens("hello hi hey"));
        model.learn("bye", &tokens("goodbye bye later"));
        let (index, p) = model.most_likely(&tokens("hey")).unwrap();
        assert_eq!(model.labels()[index], "greet");
        assert!(p > 0.99);
    }

    #[test]
    fn test_repeated_label_merges() {
        let mut model = NaiveBayes::new();
        model.learn("greet", &tokens("hello"));
        model.learn("bye", &tokens("bye"));
        model.learn("greet", &tokens("hi"));
        assert_eq!(model.labels(), ["greet".to_string(), "bye".to_string()]);
    }

    #[test]
    fn test_tie_goes_to_first_label() {
        let mut model = NaiveBayes::new();
        model.learn("first", &tokens("a"));
        model.learn("second", &tokens("b"));
        // No evidence either way, equal priors
        let (index, p) = model.most_likely(&tokens("zzz")).unwrap();
        assert_eq!(index, 0);
        assert!((p - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_labels_without_tokens_get_uniform_posteriors() {
        let mut model = NaiveBayes::new();
        model.learn("a", &[]);
        model.learn("b", &[]);
        let post = model.posteriors(&tokens("x"));
        assert!((post[0] - 0.5).abs() < 1e-9);
        assert!((post[1] - 0.5).abs() < 1e-9);
    }

    fn skewed(mut model: NaiveBayes) -> NaiveBayes {
        model.learn("greet", &tokens("hello hello hello hello hello there"));
        model.learn("bye", &tokens("hello"));
        model.learn("bye", &tokens("goodbye"));
        model.learn("bye", &tokens("see you later friend"));
        model.apply_tfidf();
        model
    }

    #[test]
    fn test_tfidf_dampens_repeated_tokens() {
        let counts = skewed(NaiveBayes::new());
        let (index, p) = counts.most_likely(&tokens("hello")).unwrap();
        assert_eq!(counts.labels()[index], "greet");
        assert!((p - 5.0 / 6.0).abs() < 1e-9);

        // One example repeating a token weighs less than several examples
        let weighted = skewed(NaiveBayes::with_tfidf());
        let (index, p) = weighted.most_likely(&tokens("hello")).unwrap();
        assert_eq!(weighted.labels()[index], "bye");
        assert!(p > 0.5 && p < 0.6, "posterior {p}");
    }

    #[test]
    fn test_tfidf_weights_survive_serialization() {
        let model = skewed(NaiveBayes::with_tfidf());
        let json = serde_json::to_string(&model).unwrap();
        let loaded: NaiveBayes = serde_json::from_str(&json).unwrap();
        assert!(loaded.is_tfidf());
        assert_eq!(
            loaded.posteriors(&tokens("hello")),
            model.posteriors(&tokens("hello"))
        );
    }

    #[test]
    fn test_apply_tfidf_ignored_for_count_model() {
        let mut model = NaiveBayes::new();
        model.learn("greet", &tokens("hello hello"));
        model.learn("bye", &tokens("bye"));
        let before = model.posteriors(&tokens("hello"));
        model.apply_tfidf();
        assert_eq!(model.posteriors(&tokens("hello")), before);
    }
}
