// Feature module
// Sliding-window statistics and persisted feature datasets

pub mod dataset;
pub mod featurizer;

pub use dataset::{
    dataset_path, list_datasets, load_split, schema_fingerprint, DataSplit, DatasetError,
    FeatureDataset,
};
pub use featurizer::{
    majority_label, window_statistics, FeatureError, FeatureRow, FeaturizerConfig, Statistic,
    WindowFeaturizer, LABEL_COLUMN,
};
