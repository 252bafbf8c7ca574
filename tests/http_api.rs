use std::io::Cursor;
use std::sync::Arc;

use actix_web::http::{StatusCode, header};
use actix_web::{App, test, web};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use ndarray::{Array2, ArrayView4, Axis};
use serde_json::Value;

use lesion_classifier::{
    AppState, Classifier, Device, InferenceError, InferenceService, PreprocessConfig, Processor,
    cors, default_class_names, http,
};

const BOUNDARY: &str = "----lesionboundary7MA4YWxkTrZu0gW";
const ORIGIN: &str = "http://localhost:5173";

/// Benign for bright images, malignant for dark ones.
struct Brightness;

impl Classifier for Brightness {
    fn num_classes(&self) -> usize {
        2
    }

    fn device(&self) -> Device {
        Device::Cpu
    }

    fn forward(&self, batch: ArrayView4<'_, f32>) -> Result<Array2<f32>, InferenceError> {
        let mut out = Array2::zeros((batch.shape()[0], 2));
        for (i, image) in batch.axis_iter(Axis(0)).enumerate() {
            let mean = image.mean().unwrap_or(0.0);
            out[[i, 0]] = mean;
            out[[i, 1]] = -mean;
        }
        Ok(out)
    }
}

fn state(max_upload_bytes: usize) -> web::Data<AppState> {
    let service = InferenceService::new(
        Arc::new(Brightness),
        Processor::new(PreprocessConfig::default()),
        default_class_names(),
    )
    .unwrap();
    web::Data::new(AppState {
        service,
        max_upload_bytes,
    })
}

fn png(width: u32, height: u32, value: u8) -> Vec<u8> {
    let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([value; 3])));
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png).unwrap();
    buf
}

fn multipart(name: &str, filename: Option<&str>, data: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
    match filename {
        Some(f) => body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"{name}\"; filename=\"{f}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
            )
            .as_bytes(),
        ),
        None => body.extend_from_slice(
            format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
        ),
    }
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
    body
}

fn predict_request(body: Vec<u8>) -> test::TestRequest {
    test::TestRequest::post()
        .uri("/predict")
        .insert_header((
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        ))
        .set_payload(body)
}

macro_rules! app {
    ($limit:expr) => {
        test::init_service(
            App::new()
                .wrap(cors(Some(ORIGIN)))
                .app_data(state($limit))
                .configure(http::configure),
        )
        .await
    };
}

#[actix_web::test]
async fn ping_is_alive() {
    let app = app!(1024);
    let resp = test::call_service(&app, test::TestRequest::get().uri("/ping").to_request()).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body, serde_json::json!({"message": "Hello, I am alive!"}));
}

#[actix_web::test]
async fn white_image_prediction() {
    let app = app!(10 * 1024 * 1024);
    let body = multipart("file", Some("white.png"), &png(300, 400, 255));
    let resp = test::call_service(&app, predict_request(body).to_request()).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["class"], "benign");
    let confidence = body["confidence"].as_f64().unwrap();
    assert!((0.5..=1.0).contains(&confidence), "confidence {confidence}");
    assert_eq!(body.as_object().unwrap().len(), 2);
}

#[actix_web::test]
async fn dark_image_is_malignant() {
    let app = app!(10 * 1024 * 1024);
    let body = multipart("file", Some("dark.png"), &png(1, 1, 0));
    let resp = test::call_service(&app, predict_request(body).to_request()).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["class"], "malignant");
}

#[actix_web::test]
async fn garbage_upload_is_a_client_error() {
    let app = app!(1024);
    let body = multipart("file", Some("notes.txt"), b"this is not an image");
    let resp = test::call_service(&app, predict_request(body).to_request()).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert!(body["detail"].as_str().unwrap().contains("invalid image"));
}

fn jpeg(width: u32, height: u32) -> Vec<u8> {
    let img = DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x * 3) as u8, (y * 5) as u8, ((x + y) * 11) as u8])
    }));
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Jpeg).unwrap();
    buf
}

#[actix_web::test]
async fn truncated_jpeg_upload_is_a_client_error() {
    let app = app!(10 * 1024 * 1024);
    let full = jpeg(256, 256);

    let body = multipart("file", Some("whole.jpg"), &full);
    let resp = test::call_service(&app, predict_request(body).to_request()).await;
    assert_eq!(resp.status(), StatusCode::OK);

    for cut in [full.len() / 2, full.len() - 2] {
        let body = multipart("file", Some("cut.jpg"), &full[..cut]);
        let resp = test::call_service(&app, predict_request(body).to_request()).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "cut at {cut}");
        let body: Value = test::read_body_json(resp).await;
        assert!(body["detail"].as_str().unwrap().contains("truncated"));
    }
}

#[actix_web::test]
async fn empty_upload_is_a_client_error() {
    let app = app!(1024);
    let body = multipart("file", Some("empty.png"), b"");
    let resp = test::call_service(&app, predict_request(body).to_request()).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn missing_file_part_is_rejected() {
    let app = app!(1024);
    let body = multipart("comment", None, b"hello");
    let resp = test::call_service(&app, predict_request(body).to_request()).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert!(body["detail"].as_str().unwrap().contains("file"));
}

#[actix_web::test]
async fn differently_named_file_part_is_used() {
    let app = app!(10 * 1024 * 1024);
    let body = multipart("image", Some("white.png"), &png(20, 20, 255));
    let resp = test::call_service(&app, predict_request(body).to_request()).await;
    assert_eq!(resp.status(), StatusCode::OK);
}

#[actix_web::test]
async fn oversized_upload_is_rejected() {
    // smaller than any PNG header
    let app = app!(32);
    let body = multipart("file", Some("big.png"), &png(100, 100, 7));
    let resp = test::call_service(&app, predict_request(body).to_request()).await;
    assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
}

#[actix_web::test]
async fn configured_origin_gets_cors_headers() {
    let app = app!(1024);
    let req = test::TestRequest::get()
        .uri("/ping")
        .insert_header((header::ORIGIN, ORIGIN))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        resp.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
        ORIGIN
    );
    assert_eq!(
        resp.headers().get(header::ACCESS_CONTROL_ALLOW_CREDENTIALS).unwrap(),
        "true"
    );
}

#[actix_web::test]
async fn other_origins_get_no_cors_headers() {
    let app = app!(1024);
    let req = test::TestRequest::get()
        .uri("/ping")
        .insert_header((header::ORIGIN, "https://evil.example.com"))
        .to_request();
    match test::try_call_service(&app, req).await {
        Ok(resp) => assert!(resp.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).is_none()),
        Err(e) => assert!(e.as_response_error().status_code().is_client_error()),
    }
}
