//! Integration tests for request handling.
//!
//! Tests cover:
//! - Data URL and bare base64 payloads
//! - Response shape and the annotated JPEG
//! - Status codes for missing, malformed and undecodable input
//! - Health and info reporting

mod common;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use common::*;
use garment_detect::service::decode_base64_image;
use garment_detect::{DetectRequest, ServiceError};
use std::sync::Arc;

fn color_service() -> anyhow::Result<DetectionService> {
    Ok(DetectionService::from_config(&ServiceConfig::default())?)
}

fn decode_annotated(data_url: &str) -> anyhow::Result<image::DynamicImage> {
    let payload = data_url
        .strip_prefix("data:image/jpeg;base64,")
        .ok_or_else(|| anyhow::anyhow!("not a JPEG data URL: {}", &data_url[..data_url.len().min(32)]))?;
    Ok(image::load_from_memory(&STANDARD.decode(payload)?)?)
}

#[tokio::test]
async fn test_detect_from_data_url() -> anyhow::Result<()> {
    let service = color_service()?;
    let img = image_with_rect((320, 240), (40, 40, 120, 80), PURE_YELLOW);

    let response = service
        .detect(DetectRequest {
            image: Some(png_data_url(&img)),
        })
        .await?;

    assert!(response.success);
    assert_eq!(response.method, "color_detection");
    assert_eq!(response.detections.len(), 1);
    let detection = &response.detections[0];
    assert_eq!(detection.class, GarmentClass::HasGarment);
    assert_eq!(detection.bbox, [40, 40, 160, 120]);
    assert!(detection.confidence > 0.4 && detection.confidence <= 0.95);

    let annotated = decode_annotated(&response.annotated_image)?;
    assert_eq!((annotated.width(), annotated.height()), (320, 240));

    Ok(())
}

#[tokio::test]
async fn test_detect_from_bare_base64() -> anyhow::Result<()> {
    let service = color_service()?;
    let img = image_with_rect((200, 100), (0, 0, 10, 10), PURE_BLUE);
    let bare = STANDARD.encode(encode_png(&img));

    let response = service.detect(DetectRequest { image: Some(bare) }).await?;

    assert_eq!(response.detections.len(), 1);
    assert_eq!(response.detections[0].class, GarmentClass::NoGarment);
    assert_eq!(response.detections[0].bbox, [0, 0, 200, 100]);
    assert!((response.detections[0].confidence - 0.6).abs() < 1e-6);

    Ok(())
}

#[tokio::test]
async fn test_wide_upload_is_reported_in_processed_frame() -> anyhow::Result<()> {
    let service = color_service()?;
    let img = image_with_rect((1600, 800), (400, 200, 400, 200), PURE_ORANGE);

    let response = service
        .detect(DetectRequest {
            image: Some(png_data_url(&img)),
        })
        .await?;

    let annotated = decode_annotated(&response.annotated_image)?;
    assert_eq!((annotated.width(), annotated.height()), (800, 400));
    assert_eq!(response.detections.len(), 1);
    let [x1, y1, x2, y2] = response.detections[0].bbox;
    assert_close(x1, 200, 2, "x1");
    assert_close(y1, 100, 2, "y1");
    assert_close(x2, 400, 2, "x2");
    assert_close(y2, 200, 2, "y2");

    Ok(())
}

#[tokio::test]
async fn test_missing_image_is_bad_request() -> anyhow::Result<()> {
    let service = color_service()?;

    let err = service
        .detect(DetectRequest { image: None })
        .await
        .err()
        .ok_or_else(|| anyhow::anyhow!("expected an error"))?;
    assert!(matches!(err, ServiceError::MissingImage));
    assert_eq!(err.status_code(), 400);

    let (status, body) = service.handle_json("{}").await;
    assert_eq!(status, 400);
    assert_eq!(body["success"], false);
    assert!(body["error"].as_str().unwrap_or_default().contains("no image"));

    let (status, _) = service.handle_json(r#"{"image": "   "}"#).await;
    assert_eq!(status, 400);

    Ok(())
}

#[tokio::test]
async fn test_malformed_json_is_bad_request() -> anyhow::Result<()> {
    let service = color_service()?;

    let (status, body) = service.handle_json("this is not json").await;
    assert_eq!(status, 400);
    assert_eq!(body["success"], false);

    let (status, _) = service.handle_json(r#"{"image": 42}"#).await;
    assert_eq!(status, 400);

    Ok(())
}

#[tokio::test]
async fn test_undecodable_image_is_unprocessable() -> anyhow::Result<()> {
    let service = color_service()?;

    let (status, body) = service
        .handle_json(r#"{"image": "data:image/png;base64,!!!not-base64!!!"}"#)
        .await;
    assert_eq!(status, 422);
    assert_eq!(body["success"], false);

    let not_an_image = STANDARD.encode(b"plain text, not pixels");
    let body = serde_json::json!({ "image": not_an_image }).to_string();
    let (status, _) = service.handle_json(&body).await;
    assert_eq!(status, 422);

    let (status, _) = service.handle_json(r#"{"image": "data:image/png;base64,"}"#).await;
    assert_eq!(status, 422);

    Ok(())
}

#[tokio::test]
async fn test_success_response_shape() -> anyhow::Result<()> {
    let service = color_service()?;
    let img = image_with_rect((160, 120), (20, 20, 100, 60), PURE_GREEN);
    let body = serde_json::json!({ "image": png_data_url(&img) }).to_string();

    let (status, response) = service.handle_json(&body).await;

    assert_eq!(status, 200);
    assert_eq!(response["success"], true);
    assert_eq!(response["method"], "color_detection");
    let detection = &response["detections"][0];
    assert_eq!(detection["class"], "has-garment");
    assert_eq!(detection["bbox"], serde_json::json!([20, 20, 120, 80]));
    assert!(detection["confidence"].is_f64());
    assert!(
        response["annotated_image"]
            .as_str()
            .unwrap_or_default()
            .starts_with("data:image/jpeg;base64,")
    );

    Ok(())
}

#[tokio::test]
async fn test_concurrent_requests_share_detector() -> anyhow::Result<()> {
    let service = color_service()?;
    let img = image_with_rect((200, 150), (30, 30, 80, 60), PURE_YELLOW);
    let url = png_data_url(&img);

    let mut handles = Vec::new();
    for _ in 0..4 {
        let service = service.clone();
        let url = url.clone();
        handles.push(tokio::spawn(async move {
            service.detect(DetectRequest { image: Some(url) }).await
        }));
    }

    let mut responses = Vec::new();
    for handle in handles {
        responses.push(handle.await??);
    }
    assert!(responses.windows(2).all(|w| w[0].detections == w[1].detections));

    Ok(())
}

#[tokio::test]
async fn test_health_and_info_for_color_strategy() -> anyhow::Result<()> {
    let service = color_service()?;
    service.warm_up().await?;

    let health = service.health();
    assert_eq!(health.status, "healthy");
    assert!(health.model_loaded);

    let info = service.info();
    assert_eq!(info.name, "Garment Detection");
    assert_eq!(info.method, "color_detection");
    assert!(info.model_loaded);
    assert!(!info.version.is_empty());

    Ok(())
}

#[test]
fn test_base64_prefix_is_optional() -> anyhow::Result<()> {
    let raw = b"\x89PNG fake".to_vec();
    let encoded = STANDARD.encode(&raw);

    assert_eq!(decode_base64_image(&encoded)?, raw);
    assert_eq!(
        decode_base64_image(&format!("data:image/png;base64,{}", encoded))?,
        raw
    );
    assert!(decode_base64_image("data:image/png;base64,").is_err());

    Ok(())
}

#[tokio::test]
async fn test_line_wrapped_base64_is_accepted() -> anyhow::Result<()> {
    let service = color_service()?;
    let img = image_with_rect((120, 90), (20, 20, 60, 40), PURE_YELLOW);
    let encoded = STANDARD.encode(encode_png(&img));
    let wrapped = encoded
        .as_bytes()
        .chunks(76)
        .map(|line| std::str::from_utf8(line).unwrap_or_default())
        .collect::<Vec<_>>()
        .join("\r\n");
    assert!(wrapped.len() > encoded.len());

    assert_eq!(decode_base64_image(&wrapped)?, encode_png(&img));

    let response = service
        .detect(DetectRequest {
            image: Some(format!("data:image/png;base64,{}\n", wrapped)),
        })
        .await?;
    assert_eq!(response.detections.len(), 1);
    assert_eq!(response.detections[0].bbox, [20, 20, 80, 60]);

    Ok(())
}

#[tokio::test]
async fn test_injected_detector_is_used() -> anyhow::Result<()> {
    let detector = ColorThresholdDetector::new(DetectionConfig::simple())?;
    let service = DetectionService::new(Arc::new(detector)).with_jpeg_quality(50);
    let img = image_with_rect((100, 100), (0, 0, 5, 5), PURE_BLUE);

    let response = service
        .detect(DetectRequest {
            image: Some(png_data_url(&img)),
        })
        .await?;

    assert!((response.detections[0].confidence - 0.7).abs() < 1e-6);
    assert_eq!(service.detector().method(), "color_detection");

    Ok(())
}
