// K-nearest-neighbour classifier
// Keeps the standardized training windows and votes among the k closest ones

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::classify::backend::{
    check_training_set, check_width, Classifier, ClassifierError, ClassifierKind, SavedModel,
    Standardizer,
};
use crate::labels::LabelId;

/// One stored training window
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnnSample {
    pub label: LabelId,
    pub features: Vec<f64>,
}

/// K-Nearest Neighbors classifier over feature rows
///
/// Class probabilities are the vote fractions of the `k` nearest training
/// windows (Euclidean distance after z-scoring).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnnClassifier {
    num_classes: usize,
    k: usize,
    scaler: Option<Standardizer>,
    samples: Vec<KnnSample>,
}

impl KnnClassifier {
    /// k: number of nearest neighbours to consider (default: 5)
    pub fn new(num_classes: usize, k: usize) -> Self {
        KnnClassifier {
            num_classes,
            k: k.max(1),
            scaler: None,
            samples: Vec::new(),
        }
    }

    pub fn k(&self) -> usize {
        self.k
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    fn vote(&self, scaler: &Standardizer, row: &[f64]) -> Vec<f64> {
        let query = scaler.transform(row);

        let mut distances: Vec<(f64, LabelId)> = self
            .samples
            .iter()
            .map(|s| (squared_distance(&query, &s.features), s.label))
            .collect();

        // stable sort keeps training order among equal distances
        distances.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(Ordering::Equal));

        let neighbours = self.k.min(distances.len());
        let mut votes = vec![0.0; self.num_classes];
        for (_, label) in distances.iter().take(neighbours) {
            votes[*label as usize] += 1.0;
        }
        for v in votes.iter_mut() {
            *v /= neighbours as f64;
        }
        votes
    }
}

fn squared_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum()
}

impl Classifier for KnnClassifier {
    fn kind(&self) -> ClassifierKind {
        ClassifierKind::Knn
    }

    fn num_classes(&self) -> usize {
        self.num_classes
    }

    fn fit(&mut self, features: &[Vec<f64>], labels: &[LabelId]) -> Result<(), ClassifierError> {
        check_training_set(features, labels, self.num_classes)?;

        let scaler = Standardizer::fit(features);
        self.samples = features
            .iter()
            .zip(labels)
            .map(|(row, &label)| KnnSample {
                label,
                features: scaler.transform(row),
            })
            .collect();
        self.scaler = Some(scaler);

        log::debug!(
            "Fitted KNN (k={}) on {} windows, {} classes",
            self.k,
            self.samples.len(),
            self.num_classes
        );
        Ok(())
    }

    fn predict_proba(&self, features: &[Vec<f64>]) -> Result<Vec<Vec<f64>>, ClassifierError> {
        let scaler = self.scaler.as_ref().ok_or(ClassifierError::NotFitted)?;
        check_width(features, scaler.width())?;
        Ok(features.iter().map(|row| self.vote(scaler, row)).collect())
    }

    fn to_saved(&self) -> SavedModel {
        SavedModel::Knn(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clusters() -> (Vec<Vec<f64>>, Vec<LabelId>) {
        let features = vec![
            vec![0.0, 0.0],
            vec![0.2, 0.1],
            vec![0.1, 0.3],
            vec![10.0, 10.0],
            vec![10.2, 9.8],
            vec![9.9, 10.1],
        ];
        (features, vec![1, 1, 1, 2, 2, 2])
    }

    #[test]
    fn test_predict_before_fit() {
        let knn = KnnClassifier::new(3, 3);
        assert!(matches!(
            knn.predict_proba(&[vec![0.0, 0.0]]),
            Err(ClassifierError::NotFitted)
        ));
    }

    #[test]
    fn test_knn_separates_clusters() {
        let (features, labels) = clusters();
        let mut knn = KnnClassifier::new(3, 3);
        knn.fit(&features, &labels).unwrap();

        let preds = knn.predict(&[vec![0.05, 0.05], vec![10.1, 10.0]]).unwrap();
        assert_eq!(preds, vec![1, 2]);

        let proba = knn.predict_proba(&[vec![0.05, 0.05]]).unwrap();
        assert_eq!(proba[0].len(), 3);
        assert!((proba[0][1] - 1.0).abs() < 1e-12);
        assert_eq!(proba[0][0], 0.0);
    }

    #[test]
    fn test_probabilities_sum_to_one() {
        let (features, labels) = clusters();
        let mut knn = KnnClassifier::new(3, 4);
        knn.fit(&features, &labels).unwrap();

        for row in knn.predict_proba(&[vec![5.0, 5.0], vec![0.0, 1.0]]).unwrap() {
            let total: f64 = row.iter().sum();
            assert!((total - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_k_larger_than_training_set() {
        let mut knn = KnnClassifier::new(2, 50);
        knn.fit(&[vec![0.0], vec![1.0]], &[0, 1]).unwrap();
        let proba = knn.predict_proba(&[vec![0.0]]).unwrap();
        assert_eq!(proba[0], vec![0.5, 0.5]);
        // even split resolves to the lowest class id
        assert_eq!(knn.predict(&[vec![0.0]]).unwrap(), vec![0]);
    }

    #[test]
    fn test_feature_width_checked() {
        let (features, labels) = clusters();
        let mut knn = KnnClassifier::new(3, 3);
        knn.fit(&features, &labels).unwrap();
        assert!(matches!(
            knn.predict_proba(&[vec![1.0]]),
            Err(ClassifierError::FeatureWidth { expected: 2, found: 1 })
        ));
    }
}
