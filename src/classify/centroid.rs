// Nearest-centroid classifier
// One mean vector per class; probabilities from a softmax over negative distances

use serde::{Deserialize, Serialize};

use crate::classify::backend::{
    check_training_set, check_width, Classifier, ClassifierError, ClassifierKind, SavedModel,
    Standardizer,
};
use crate::labels::LabelId;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NearestCentroidClassifier {
    num_classes: usize,
    scaler: Option<Standardizer>,
    /// Per-class centroid; `None` for classes absent from training
    centroids: Vec<Option<Vec<f64>>>,
}

impl NearestCentroidClassifier {
    pub fn new(num_classes: usize) -> Self {
        NearestCentroidClassifier {
            num_classes,
            scaler: None,
            centroids: vec![None; num_classes],
        }
    }

    pub fn centroid(&self, class: LabelId) -> Option<&[f64]> {
        self.centroids
            .get(usize::try_from(class).ok()?)?
            .as_deref()
    }

    fn scores(&self, scaler: &Standardizer, row: &[f64]) -> Vec<f64> {
        let query = scaler.transform(row);
        let neg_dist: Vec<Option<f64>> = self
            .centroids
            .iter()
            .map(|c| {
                c.as_ref().map(|c| {
                    -query
                        .iter()
                        .zip(c)
                        .map(|(x, y)| (x - y).powi(2))
                        .sum::<f64>()
                        .sqrt()
                })
            })
            .collect();

        let max = neg_dist
            .iter()
            .flatten()
            .copied()
            .fold(f64::NEG_INFINITY, f64::max);
        let exp: Vec<f64> = neg_dist
            .iter()
            .map(|d| d.map_or(0.0, |d| (d - max).exp()))
            .collect();
        let total: f64 = exp.iter().sum();
        exp.into_iter().map(|e| e / total).collect()
    }
}

impl Classifier for NearestCentroidClassifier {
    fn kind(&self) -> ClassifierKind {
        ClassifierKind::NearestCentroid
    }

    fn num_classes(&self) -> usize {
        self.num_classes
    }

    fn fit(&mut self, features: &[Vec<f64>], labels: &[LabelId]) -> Result<(), ClassifierError> {
        let width = check_training_set(features, labels, self.num_classes)?;
        let scaler = Standardizer::fit(features);

        let mut sums = vec![vec![0.0; width]; self.num_classes];
        let mut counts = vec![0usize; self.num_classes];
        for (row, &label) in features.iter().zip(labels) {
            let scaled = scaler.transform(row);
            let class = label as usize;
            for (s, v) in sums[class].iter_mut().zip(&scaled) {
                *s += v;
            }
            counts[class] += 1;
        }

        self.centroids = sums
            .into_iter()
            .zip(counts)
            .map(|(sum, count)| {
                (count > 0).then(|| sum.into_iter().map(|s| s / count as f64).collect())
            })
            .collect();
        self.scaler = Some(scaler);

        log::debug!(
            "Fitted nearest-centroid on {} windows, {} of {} classes present",
            features.len(),
            self.centroids.iter().filter(|c| c.is_some()).count(),
            self.num_classes
        );
        Ok(())
    }

    fn predict_proba(&self, features: &[Vec<f64>]) -> Result<Vec<Vec<f64>>, ClassifierError> {
        let scaler = self.scaler.as_ref().ok_or(ClassifierError::NotFitted)?;
        check_width(features, scaler.width())?;
        Ok(features.iter().map(|row| self.scores(scaler, row)).collect())
    }

    fn to_saved(&self) -> SavedModel {
        SavedModel::NearestCentroid(self.clone())
    }
}
