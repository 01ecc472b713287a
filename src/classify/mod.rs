// Classification module
// Pluggable classifier backends behind a common trait

pub mod backend;
pub mod centroid;
pub mod knn;

pub use backend::{
    create_classifier, load_classifier, Classifier, ClassifierError, ClassifierKind, SavedModel,
    Standardizer,
};
pub use centroid::NearestCentroidClassifier;
pub use knn::{KnnClassifier, KnnSample};
