use std::sync::Arc;

use crate::model::PredictionSet;

#[derive(Debug, Clone)]
pub enum Message {
    PickArchive,
    /// `None` means the file dialog was cancelled.
    ArchiveUploaded(Option<Result<(), String>>),
    DownloadSample,
    /// `Ok` carries the saved file name; `None` means the dialog was cancelled.
    SampleSaved(Option<Result<String, String>>),
    RunPrediction,
    PredictionLoaded(Result<Arc<PredictionSet>, String>),
    SelectSlice(usize),
}
