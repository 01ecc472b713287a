// Labels module
// Label catalog and time-interval annotations

pub mod annotation;
pub mod label_set;

pub use annotation::{load_annotations, parse_annotations, AnnotationError, LabelInterval};
pub use label_set::{
    LabelError, LabelGroup, LabelId, LabelSet, DEFAULT_OTHER_LABEL, DEFAULT_UNUSED_LABEL,
    OTHER_ID,
};
