// Motion capture action recognition
// Module declarations

pub mod app;
pub mod classify;
pub mod correction;
pub mod evaluation;
pub mod features;
pub mod labels;
pub mod motion;
pub mod pipeline;
pub mod report;
pub mod segment;
pub mod smoothing;
pub mod state;
