use ndarray::{ArrayD, ArrayView2, ArrayViewD, Axis, Ix2};
use thiserror::Error;

/// MRI acquisition channels, in the order the service emits them.
pub const MODALITIES: [&str; 4] = ["T1", "T1ce", "T2", "FLAIR"];

#[derive(Debug, Clone, Error)]
pub enum VolumeError {
    #[error(
        "prediction volumes are misaligned: images={images}, true_masks={true_masks}, pred_masks={pred_masks}"
    )]
    MisalignedLengths {
        images: usize,
        true_masks: usize,
        pred_masks: usize,
    },
    #[error("expected images shaped (slices, 4, height, width), got {0}")]
    ImageShape(String),
    #[error("mask volume is not squeezable to per-slice 2D arrays: shape {0}")]
    MaskShape(String),
    #[error("prediction set contains no slices")]
    Empty,
    #[error("slice index {index} out of range ({len} slices)")]
    IndexOutOfRange { index: usize, len: usize },
}

/// One prediction cycle's worth of decoded volumes.
///
/// Index `i` across images and both masks refers to the same physical slice.
/// Immutable once constructed.
#[derive(Debug, Clone)]
pub struct PredictionSet {
    images: ArrayD<f32>,
    true_masks: ArrayD<f32>,
    pred_masks: ArrayD<f32>,
}

impl PredictionSet {
    pub fn new(
        images: ArrayD<f32>,
        true_masks: ArrayD<f32>,
        pred_masks: ArrayD<f32>,
    ) -> Result<Self, VolumeError> {
        if images.ndim() != 4 || images.shape()[1] != MODALITIES.len() {
            return Err(VolumeError::ImageShape(format!("{:?}", images.shape())));
        }
        for masks in [&true_masks, &pred_masks] {
            if masks.ndim() < 3 {
                return Err(VolumeError::MaskShape(format!("{:?}", masks.shape())));
            }
        }

        let (image_len, true_len, pred_len) = (
            images.shape()[0],
            true_masks.shape()[0],
            pred_masks.shape()[0],
        );
        if image_len != true_len || image_len != pred_len {
            return Err(VolumeError::MisalignedLengths {
                images: image_len,
                true_masks: true_len,
                pred_masks: pred_len,
            });
        }
        if image_len == 0 {
            return Err(VolumeError::Empty);
        }

        Ok(Self {
            images,
            true_masks,
            pred_masks,
        })
    }

    /// Number of slices shared by all three volumes.
    pub fn len(&self) -> usize {
        self.images.shape()[0]
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 2D view of one modality channel of the selected slice.
    pub fn modality_slice(
        &self,
        index: usize,
        channel: usize,
    ) -> Result<ArrayView2<'_, f32>, VolumeError> {
        self.check_index(index)?;
        if channel >= MODALITIES.len() {
            return Err(VolumeError::ImageShape(format!("channel {channel}")));
        }
        let view = self
            .images
            .index_axis(Axis(0), index)
            .index_axis_move(Axis(0), channel);
        view.into_dimensionality::<Ix2>()
            .map_err(|err| VolumeError::ImageShape(err.to_string()))
    }

    pub fn true_mask_slice(&self, index: usize) -> Result<ArrayView2<'_, f32>, VolumeError> {
        self.check_index(index)?;
        squeeze_to_2d(self.true_masks.index_axis(Axis(0), index))
    }

    pub fn pred_mask_slice(&self, index: usize) -> Result<ArrayView2<'_, f32>, VolumeError> {
        self.check_index(index)?;
        squeeze_to_2d(self.pred_masks.index_axis(Axis(0), index))
    }

    fn check_index(&self, index: usize) -> Result<(), VolumeError> {
        if index >= self.len() {
            return Err(VolumeError::IndexOutOfRange {
                index,
                len: self.len(),
            });
        }
        Ok(())
    }
}

/// Drop length-1 axes until the view is 2D. Masks arrive as (H, W) or (1, H, W).
fn squeeze_to_2d(mut view: ArrayViewD<'_, f32>) -> Result<ArrayView2<'_, f32>, VolumeError> {
    while view.ndim() > 2 {
        let axis = (0..view.ndim())
            .find(|&axis| view.len_of(Axis(axis)) == 1)
            .ok_or_else(|| VolumeError::MaskShape(format!("{:?}", view.shape())))?;
        view = view.index_axis_move(Axis(axis), 0);
    }
    view.into_dimensionality::<Ix2>()
        .map_err(|err| VolumeError::MaskShape(err.to_string()))
}
