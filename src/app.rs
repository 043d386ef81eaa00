use std::sync::Arc;

use iced::widget::text::Wrapping;
use iced::widget::{button, column, scrollable, text};
use iced::{application, Alignment, Element, Length, Task, Theme};
use rfd::AsyncFileDialog;

use crate::api::{ServiceClient, SAMPLE_FILE_NAME};
use crate::config::ViewerConfig;
use crate::image_pipeline::{SliceImagePipeline, SlicePanels};
use crate::message::Message;
use crate::model::PredictionSet;
use crate::views::slice_viewer;

const APP_TITLE: &str = "Brain Tumor Segmentation Viewer";

pub fn run() -> iced::Result {
    let _ = env_logger::Builder::from_default_env()
        .format_timestamp_secs()
        .try_init();

    application(APP_TITLE, App::update, App::view)
        .theme(App::theme)
        .run()
}

#[derive(Debug, Clone)]
enum Banner {
    Success(String),
    Error(String),
}

pub struct App {
    client: Arc<ServiceClient>,
    predictions: Option<Arc<PredictionSet>>,
    slice_index: usize,
    current_slice: Option<SlicePanels>,
    upload_banner: Option<Banner>,
    sample_banner: Option<Banner>,
    prediction_banner: Option<Banner>,
}

impl Default for App {
    fn default() -> Self {
        let config = ViewerConfig::from_env();
        log::info!("segmentation service at {}", config.service_url);
        Self {
            client: Arc::new(ServiceClient::new(&config)),
            predictions: None,
            slice_index: 0,
            current_slice: None,
            upload_banner: None,
            sample_banner: None,
            prediction_banner: None,
        }
    }
}

impl App {
    pub fn update(&mut self, message: Message) -> Task<Message> {
        match message {
            Message::PickArchive => {
                let client = Arc::clone(&self.client);
                Task::perform(
                    async move {
                        let handle = AsyncFileDialog::new()
                            .add_filter("ZIP archive", &["zip"])
                            .pick_file()
                            .await?;
                        let data = handle.read().await;
                        Some(client.upload_archive(data).await.map_err(|err| err.to_string()))
                    },
                    Message::ArchiveUploaded,
                )
            }
            Message::ArchiveUploaded(result) => {
                self.upload_banner = match result {
                    None => None,
                    Some(Ok(())) => Some(Banner::Success(
                        "File uploaded and processed successfully!".to_string(),
                    )),
                    Some(Err(err)) => Some(Banner::Error(format!("Error uploading file: {err}"))),
                };
                Task::none()
            }
            Message::DownloadSample => {
                let client = Arc::clone(&self.client);
                Task::perform(
                    async move {
                        let bytes = match client.download_sample().await {
                            Ok(bytes) => bytes,
                            Err(err) => return Some(Err(err.to_string())),
                        };
                        // The save dialog is only offered once the fetch has
                        // succeeded; a failed fetch never yields a file.
                        let handle = AsyncFileDialog::new()
                            .set_file_name(SAMPLE_FILE_NAME)
                            .save_file()
                            .await?;
                        match handle.write(&bytes).await {
                            Ok(()) => Some(Ok(handle.file_name())),
                            Err(err) => {
                                Some(Err(format!("failed to write sample archive: {err}")))
                            }
                        }
                    },
                    Message::SampleSaved,
                )
            }
            Message::SampleSaved(result) => {
                self.sample_banner = match result {
                    None => None,
                    Some(Ok(name)) => Some(Banner::Success(format!("Sample data saved as {name}"))),
                    Some(Err(err)) => {
                        Some(Banner::Error(format!("Error downloading sample dataset: {err}")))
                    }
                };
                Task::none()
            }
            Message::RunPrediction => {
                let client = Arc::clone(&self.client);
                Task::perform(
                    async move { client.fetch_predictions().await.map_err(|err| err.to_string()) },
                    Message::PredictionLoaded,
                )
            }
            Message::PredictionLoaded(result) => {
                match result {
                    Ok(set) => {
                        self.predictions = Some(set);
                        self.slice_index = 0;
                        self.prediction_banner = None;
                        self.refresh_slice();
                    }
                    Err(err) => {
                        self.prediction_banner = Some(Banner::Error(err));
                    }
                }
                Task::none()
            }
            Message::SelectSlice(index) => {
                if let Some(set) = &self.predictions {
                    let clamped = index.min(set.len().saturating_sub(1));
                    if clamped != self.slice_index {
                        self.slice_index = clamped;
                        self.refresh_slice();
                    }
                }
                Task::none()
            }
        }
    }

    pub fn view(&self) -> Element<'_, Message> {
        let mut upload_section = column![
            text("Upload Brain Tumor Slices").size(20),
            button("Upload ZIP Archive").on_press(Message::PickArchive),
        ]
        .spacing(8);
        if let Some(banner) = &self.upload_banner {
            upload_section = upload_section.push(banner_text(banner));
        }

        let mut sample_section = column![
            text("Try with Sample Data").size(20),
            button("Download Sample Data").on_press(Message::DownloadSample),
        ]
        .spacing(8);
        if let Some(banner) = &self.sample_banner {
            sample_section = sample_section.push(banner_text(banner));
        }

        let mut predict_section = column![
            text("Run Model Prediction").size(20),
            button("Get Predictions").on_press(Message::RunPrediction),
        ]
        .spacing(8);
        if let Some(banner) = &self.prediction_banner {
            predict_section = predict_section.push(banner_text(banner));
        }

        let mut content = column![
            text(APP_TITLE).size(28),
            upload_section,
            sample_section,
            predict_section,
        ]
        .padding(20)
        .spacing(20)
        .align_x(Alignment::Start);

        if let Some(set) = &self.predictions {
            content = content.push(slice_viewer(
                set.len(),
                self.slice_index,
                self.current_slice.as_ref(),
            ));
        }

        scrollable(content.width(Length::Fill)).into()
    }

    pub fn theme(&self) -> Theme {
        Theme::Dark
    }

    fn refresh_slice(&mut self) {
        self.current_slice = match &self.predictions {
            Some(set) => match SliceImagePipeline::render_slice(set, self.slice_index) {
                Ok(panels) => Some(panels),
                Err(err) => {
                    log::error!("failed to render slice {}: {err}", self.slice_index);
                    self.prediction_banner =
                        Some(Banner::Error(format!("Failed to render slice: {err}")));
                    None
                }
            },
            None => None,
        };
    }
}

fn banner_text(banner: &Banner) -> Element<'_, Message> {
    match banner {
        Banner::Success(message) => text(message)
            .size(14)
            .wrapping(Wrapping::Word)
            .style(text::success)
            .into(),
        Banner::Error(message) => text(message)
            .size(14)
            .wrapping(Wrapping::Word)
            .style(text::danger)
            .into(),
    }
}
