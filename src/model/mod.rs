pub mod volume;

pub use volume::{PredictionSet, VolumeError, MODALITIES};
