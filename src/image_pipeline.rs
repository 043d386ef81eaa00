use iced::widget::image::Handle;
use ndarray::ArrayView2;

use crate::model::{PredictionSet, VolumeError};

/// Rendered panels for one slice: four modality channels plus both masks.
#[derive(Debug, Clone)]
pub struct SlicePanels {
    pub modalities: [Handle; 4],
    pub true_mask: Handle,
    pub pred_mask: Handle,
}

pub struct SliceImagePipeline;

impl SliceImagePipeline {
    /// Build the six grayscale panels for the slice at `index`.
    pub fn render_slice(set: &PredictionSet, index: usize) -> Result<SlicePanels, VolumeError> {
        let modalities = [
            Self::grayscale_handle(set.modality_slice(index, 0)?),
            Self::grayscale_handle(set.modality_slice(index, 1)?),
            Self::grayscale_handle(set.modality_slice(index, 2)?),
            Self::grayscale_handle(set.modality_slice(index, 3)?),
        ];

        Ok(SlicePanels {
            modalities,
            true_mask: Self::grayscale_handle(set.true_mask_slice(index)?),
            pred_mask: Self::grayscale_handle(set.pred_mask_slice(index)?),
        })
    }

    /// Min/max-normalize a 2D view into a grayscale RGBA image handle.
    pub fn grayscale_handle(view: ArrayView2<'_, f32>) -> Handle {
        let (rows, cols) = view.dim();
        let (min, max) = min_max_f32(view.iter().copied()).unwrap_or((0.0, 0.0));

        let mut rgba = Vec::with_capacity(rows * cols * 4);
        for row in view.outer_iter() {
            for &value in row.iter() {
                let gray = normalize_f32(value, min, max);
                rgba.extend_from_slice(&[gray, gray, gray, 255]);
            }
        }
        Handle::from_rgba(cols as u32, rows as u32, rgba)
    }
}

fn min_max_f32(values: impl Iterator<Item = f32>) -> Option<(f32, f32)> {
    values
        .filter(|value| !value.is_nan())
        .fold(None, |acc, value| match acc {
            None => Some((value, value)),
            Some((min, max)) => Some((min.min(value), max.max(value))),
        })
}

fn normalize_f32(value: f32, min: f32, max: f32) -> u8 {
    if value.is_nan() || max <= min {
        return 0;
    }

    let normalized = (value - min) / (max - min);
    (normalized * 255.0).clamp(0.0, 255.0).round() as u8
}
