use iced::widget::image::Handle;
use iced::widget::{column, container, row, slider, text, Image, Space};
use iced::{Alignment, Element, Length};

use crate::image_pipeline::SlicePanels;
use crate::message::Message;
use crate::model::MODALITIES;

/// Slider plus the fixed 2x4 result grid: four modality channels on top,
/// the two masks centered below with blank outer cells.
pub fn slice_viewer<'a>(
    slice_count: usize,
    index: usize,
    panels: Option<&'a SlicePanels>,
) -> Element<'a, Message> {
    let max_index = slice_count.saturating_sub(1);

    let slider_row = row![
        text("Select Image Slice").size(14),
        slider(0..=max_index as u32, index as u32, |value| {
            Message::SelectSlice(value as usize)
        })
        .width(Length::Fill),
        text(format!("{index} / {max_index}")).size(14),
    ]
    .spacing(12)
    .align_y(Alignment::Center);

    let mut content = column![text("View Prediction Results").size(20), slider_row].spacing(12);

    if let Some(panels) = panels {
        let mut modality_row = row![].spacing(12);
        for (title, handle) in MODALITIES.iter().copied().zip(&panels.modalities) {
            modality_row = modality_row.push(panel_cell(title, handle));
        }

        let mask_row = row![
            Space::with_width(Length::FillPortion(1)),
            panel_cell("True Mask", &panels.true_mask),
            panel_cell("Predicted Mask", &panels.pred_mask),
            Space::with_width(Length::FillPortion(1)),
        ]
        .spacing(12);

        content = content.push(modality_row).push(mask_row);
    }

    content.into()
}

fn panel_cell<'a>(title: &'a str, handle: &Handle) -> Element<'a, Message> {
    container(
        column![
            text(title).size(14),
            Image::new(handle.clone()).width(Length::Fill),
        ]
        .spacing(4)
        .align_x(Alignment::Center),
    )
    .width(Length::FillPortion(1))
    .into()
}
