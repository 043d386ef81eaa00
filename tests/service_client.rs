use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::extract::Multipart;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde_json::json;
use tokio::net::TcpListener;

use brats_viewer::api::{ApiError, ServiceClient, UPLOAD_FILE_NAME};
use brats_viewer::config::ViewerConfig;

async fn start_server(router: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

fn client_for(addr: SocketAddr) -> ServiceClient {
    ServiceClient::new(&ViewerConfig {
        service_url: format!("http://{addr}"),
    })
}

/// Serialize an f32 slice as an NPY v1 container.
fn npy_f32(shape: &[usize], values: &[f32]) -> Vec<u8> {
    assert_eq!(shape.iter().product::<usize>(), values.len());
    let shape_text = if shape.len() == 1 {
        format!("({},)", shape[0])
    } else {
        let dims: Vec<String> = shape.iter().map(ToString::to_string).collect();
        format!("({})", dims.join(", "))
    };
    let header = format!("{{'descr': '<f4', 'fortran_order': False, 'shape': {shape_text}, }}\n");

    let mut bytes = Vec::new();
    bytes.extend_from_slice(b"\x93NUMPY");
    bytes.extend_from_slice(&[1, 0]);
    bytes.extend_from_slice(&(header.len() as u16).to_le_bytes());
    bytes.extend_from_slice(header.as_bytes());
    for value in values {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

fn b64_npy(shape: &[usize], values: &[f32]) -> String {
    BASE64.encode(npy_f32(shape, values))
}

/// Two slices of 2x2 four-channel images; voxel value encodes its coordinates.
fn prediction_body() -> serde_json::Value {
    let images: Vec<f32> = (0..2 * 4 * 2 * 2).map(|i| i as f32).collect();
    let true_masks: Vec<f32> = (0..2 * 2 * 2).map(|i| (i % 2) as f32).collect();
    let pred_masks: Vec<f32> = (0..2 * 2 * 2).map(|i| ((i + 1) % 2) as f32).collect();
    json!({
        "images": b64_npy(&[2, 4, 2, 2], &images),
        "true_masks": b64_npy(&[2, 1, 2, 2], &true_masks),
        "pred_masks": b64_npy(&[2, 2, 2], &pred_masks),
    })
}

fn counted_predict_router(hits: Arc<AtomicUsize>) -> Router {
    Router::new().route(
        "/predict",
        post(move || {
            let hits = hits.clone();
            async move {
                hits.fetch_add(1, Ordering::SeqCst);
                Json(prediction_body())
            }
        }),
    )
}

#[tokio::test]
async fn predictions_decode_into_aligned_volumes() {
    let addr = start_server(counted_predict_router(Arc::default())).await;
    let client = client_for(addr);

    let set = client.fetch_predictions().await.unwrap();

    assert_eq!(set.len(), 2);

    // Slice 1, channel 2 starts at flat offset (1*4 + 2) * 4 = 24.
    let slice = set.modality_slice(1, 2).unwrap();
    assert_eq!(slice.dim(), (2, 2));
    assert_eq!(slice[[0, 0]], 24.0);
    assert_eq!(slice[[1, 1]], 27.0);

    let true_mask = set.true_mask_slice(0).unwrap();
    assert_eq!(true_mask.dim(), (2, 2));
    assert_eq!(true_mask[[0, 0]], 0.0);
    assert_eq!(true_mask[[0, 1]], 1.0);

    let pred_mask = set.pred_mask_slice(1).unwrap();
    assert_eq!(pred_mask.dim(), (2, 2));
    assert_eq!(pred_mask[[0, 0]], 1.0);
}

#[tokio::test]
async fn repeated_prediction_calls_hit_the_network_once() {
    let hits = Arc::new(AtomicUsize::new(0));
    let addr = start_server(counted_predict_router(hits.clone())).await;
    let client = client_for(addr);

    let first = client.fetch_predictions().await.unwrap();
    let second = client.fetch_predictions().await.unwrap();

    assert_eq!(hits.load(Ordering::SeqCst), 1);
    assert!(Arc::ptr_eq(&first, &second));
}

#[tokio::test]
async fn prediction_failures_are_not_memoized() {
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();
    let router = Router::new().route(
        "/predict",
        post(move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                StatusCode::SERVICE_UNAVAILABLE
            }
        }),
    );
    let addr = start_server(router).await;
    let client = client_for(addr);

    let first = client.fetch_predictions().await.unwrap_err();
    let second = client.fetch_predictions().await.unwrap_err();

    assert!(matches!(first, ApiError::Status(503)));
    assert!(matches!(second, ApiError::Status(503)));
    assert_eq!(hits.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn precondition_detail_is_surfaced_verbatim() {
    let router = Router::new().route(
        "/predict",
        post(|| async {
            (
                StatusCode::BAD_REQUEST,
                Json(json!({"detail": "No data uploaded"})),
            )
        }),
    );
    let addr = start_server(router).await;
    let client = client_for(addr);

    let err = client.fetch_predictions().await.unwrap_err();

    assert!(matches!(err, ApiError::Precondition(ref detail) if detail == "No data uploaded"));
    assert_eq!(err.to_string(), "No data uploaded");
}

#[tokio::test]
async fn malformed_payload_is_a_decode_error() {
    let router = Router::new().route(
        "/predict",
        post(|| async {
            Json(json!({
                "images": "bm90IGFuIG5weSBmaWxl",
                "true_masks": "bm90IGFuIG5weSBmaWxl",
                "pred_masks": "bm90IGFuIG5weSBmaWxl",
            }))
        }),
    );
    let addr = start_server(router).await;
    let client = client_for(addr);

    let err = client.fetch_predictions().await.unwrap_err();
    assert!(matches!(err, ApiError::Decode(_)));
}

#[tokio::test]
async fn misaligned_volumes_are_a_decode_error() {
    let router = Router::new().route(
        "/predict",
        post(|| async {
            let images: Vec<f32> = vec![0.0; 2 * 4 * 2 * 2];
            let masks: Vec<f32> = vec![0.0; 3 * 2 * 2];
            Json(json!({
                "images": b64_npy(&[2, 4, 2, 2], &images),
                "true_masks": b64_npy(&[3, 2, 2], &masks),
                "pred_masks": b64_npy(&[3, 2, 2], &masks),
            }))
        }),
    );
    let addr = start_server(router).await;
    let client = client_for(addr);

    let err = client.fetch_predictions().await.unwrap_err();
    assert!(matches!(err, ApiError::Decode(_)));
}

#[tokio::test]
async fn upload_sends_the_archive_as_a_multipart_file_field() {
    let payload = b"PK\x03\x04 pretend zip".to_vec();
    let expected = payload.clone();
    let router = Router::new().route(
        "/upload",
        post(move |mut multipart: Multipart| {
            let expected = expected.clone();
            async move {
                let Some(field) = multipart.next_field().await.unwrap() else {
                    return StatusCode::INTERNAL_SERVER_ERROR;
                };
                let name_ok = field.name() == Some("file");
                let file_name_ok = field.file_name() == Some(UPLOAD_FILE_NAME);
                let bytes = field.bytes().await.unwrap();
                if name_ok && file_name_ok && bytes.as_ref() == expected.as_slice() {
                    StatusCode::OK
                } else {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            }
        }),
    );
    let addr = start_server(router).await;
    let client = client_for(addr);

    client.upload_archive(payload).await.unwrap();
}

#[tokio::test]
async fn upload_rejection_is_a_status_error() {
    let router = Router::new().route("/upload", post(|| async { StatusCode::INTERNAL_SERVER_ERROR }));
    let addr = start_server(router).await;
    let client = client_for(addr);

    let err = client.upload_archive(vec![1, 2, 3]).await.unwrap_err();
    assert!(matches!(err, ApiError::Status(500)));
}

#[tokio::test]
async fn sample_download_returns_the_raw_archive_bytes() {
    let router = Router::new().route(
        "/download_sample",
        get(|| async { b"PK\x03\x04 sample".to_vec() }),
    );
    let addr = start_server(router).await;
    let client = client_for(addr);

    let bytes = client.download_sample().await.unwrap();
    assert_eq!(bytes.as_ref(), b"PK\x03\x04 sample");
}

#[tokio::test]
async fn sample_download_failure_is_a_status_error() {
    let router =
        Router::new().route("/download_sample", get(|| async { StatusCode::NOT_FOUND }));
    let addr = start_server(router).await;
    let client = client_for(addr);

    let err = client.download_sample().await.unwrap_err();
    assert!(matches!(err, ApiError::Status(404)));
}

#[tokio::test]
async fn trailing_slash_in_base_url_is_tolerated() {
    let addr = start_server(counted_predict_router(Arc::default())).await;
    let client = ServiceClient::new(&ViewerConfig {
        service_url: format!("http://{addr}/"),
    });

    let set = client.fetch_predictions().await.unwrap();
    assert_eq!(set.len(), 2);
}
