//! Client for the external object-detection service.
//!
//! The service itself is opaque; this module only knows its JSON shapes:
//! `POST /upload` (multipart image in, detections out), `POST /start_stream`,
//! `POST /stop_stream` and `GET /detections` for the live camera feed.

use crate::avatar::image_mime;
use crate::config::DetectionConfig;
use anyhow::{anyhow, bail, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct BoundingBox {
    pub x: i64,
    pub y: i64,
    pub width: i64,
    pub height: i64,
}

/// One object found in an uploaded image
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Detection {
    pub label: String,
    pub confidence: f64,
    pub bounding_box: BoundingBox,
    pub image_width: u32,
    pub image_height: u32,
}

/// One object in the current live frame
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct LiveDetection {
    pub label: String,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct StreamStatus {
    pub status: String,
}

/// Aggregate view of a detection result
#[derive(Debug, Clone, PartialEq)]
pub struct Summary {
    pub total: usize,
    /// Label counts, most frequent first, ties by label
    pub labels: Vec<(String, usize)>,
    pub most_common: Option<String>,
    pub mean_confidence: f64,
}

/// Trait for detection backends to allow mocking
pub trait DetectionClient {
    fn upload(&self, image: &Path) -> Result<Vec<Detection>>;
    fn start_stream(&self) -> Result<StreamStatus>;
    fn stop_stream(&self) -> Result<StreamStatus>;
    fn poll(&self) -> Result<Vec<LiveDetection>>;
}

pub struct HttpDetector {
    base_url: String,
    max_upload_bytes: u64,
    agent: ureq::Agent,
}

impl HttpDetector {
    pub fn new(config: &DetectionConfig) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build();
        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            max_upload_bytes: config.max_upload_bytes,
            agent,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }
}

fn into_result(resp: std::result::Result<ureq::Response, ureq::Error>) -> Result<ureq::Response> {
    match resp {
        Ok(r) => Ok(r),
        Err(ureq::Error::Status(code, resp)) => {
            let body = resp.into_string().unwrap_or_default();
            Err(anyhow!("Server error: {} {}", code, body.trim()))
        }
        Err(e) => Err(anyhow!("Detection service unreachable: {}", e)),
    }
}

impl DetectionClient for HttpDetector {
    fn upload(&self, image: &Path) -> Result<Vec<Detection>> {
        let mime = check_upload(image, self.max_upload_bytes)?;
        let data = std::fs::read(image)?;
        let file_name = image
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "upload".to_string());

        let boundary = format!("spotter-{}", uuid::Uuid::new_v4().simple());
        let body = multipart_body(&boundary, "file", &file_name, mime, &data);

        let resp = self
            .agent
            .post(&self.url("upload"))
            .set(
                "Content-Type",
                &format!("multipart/form-data; boundary={}", boundary),
            )
            .send_bytes(&body);

        Ok(into_result(resp)?.into_json()?)
    }

    fn start_stream(&self) -> Result<StreamStatus> {
        let resp = self.agent.post(&self.url("start_stream")).call();
        Ok(into_result(resp)?.into_json()?)
    }

    fn stop_stream(&self) -> Result<StreamStatus> {
        let resp = self.agent.post(&self.url("stop_stream")).call();
        Ok(into_result(resp)?.into_json()?)
    }

    fn poll(&self) -> Result<Vec<LiveDetection>> {
        let resp = self.agent.get(&self.url("detections")).call();
        Ok(into_result(resp)?.into_json()?)
    }
}

/// Refuse non-image files and oversize uploads before touching the network
pub fn check_upload(image: &Path, max_bytes: u64) -> Result<&'static str> {
    let mime = image_mime(image)
        .ok_or_else(|| anyhow!("Please select an image file (jpg, png or webp)"))?;
    let size = std::fs::metadata(image)?.len();
    if size > max_bytes {
        bail!(
            "{} is {:.1} KB, limit is {:.1} KB",
            image.display(),
            size as f64 / 1024.0,
            max_bytes as f64 / 1024.0
        );
    }
    Ok(mime)
}

/// Build a single-file `multipart/form-data` body
pub fn multipart_body(
    boundary: &str,
    field: &str,
    file_name: &str,
    mime: &str,
    data: &[u8],
) -> Vec<u8> {
    let mut body = Vec::with_capacity(data.len() + 256);
    body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
            field,
            file_name.replace('"', "")
        )
        .as_bytes(),
    );
    body.extend_from_slice(format!("Content-Type: {}\r\n\r\n", mime).as_bytes());
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{}--\r\n", boundary).as_bytes());
    body
}

pub fn summarize<'d, I>(detections: I) -> Summary
where
    I: IntoIterator<Item = (&'d str, f64)>,
{
    let mut counts: HashMap<&str, usize> = HashMap::new();
    let mut total = 0;
    let mut confidence_sum = 0.0;
    for (label, confidence) in detections {
        *counts.entry(label).or_default() += 1;
        total += 1;
        confidence_sum += confidence;
    }

    let mut labels: Vec<(String, usize)> = counts
        .into_iter()
        .map(|(label, n)| (label.to_string(), n))
        .collect();
    labels.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

    Summary {
        total,
        most_common: labels.first().map(|(l, _)| l.clone()),
        labels,
        mean_confidence: if total == 0 {
            0.0
        } else {
            confidence_sum / total as f64
        },
    }
}

pub fn summarize_upload(detections: &[Detection]) -> Summary {
    summarize(detections.iter().map(|d| (d.label.as_str(), d.confidence)))
}

pub fn summarize_live(detections: &[LiveDetection]) -> Summary {
    summarize(detections.iter().map(|d| (d.label.as_str(), d.confidence)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_upload_response() {
        let raw = r#"[
            {"label":"person","confidence":0.91,
             "boundingBox":{"x":10,"y":20,"width":100,"height":200},
             "imageWidth":640,"imageHeight":480},
            {"label":"dog","confidence":0.5,
             "boundingBox":{"x":0,"y":0,"width":5,"height":5},
             "imageWidth":640,"imageHeight":480}
        ]"#;
        let detections: Vec<Detection> = serde_json::from_str(raw).unwrap();
        assert_eq!(detections.len(), 2);
        assert_eq!(detections[0].bounding_box.height, 200);
        assert_eq!(detections[1].image_width, 640);
    }

    #[test]
    fn test_summarize() {
        let live = vec![
            LiveDetection {
                label: "person".into(),
                confidence: 0.9,
            },
            LiveDetection {
                label: "car".into(),
                confidence: 0.5,
            },
            LiveDetection {
                label: "person".into(),
                confidence: 0.7,
            },
        ];
        let summary = summarize_live(&live);
        assert_eq!(summary.total, 3);
        assert_eq!(summary.most_common.as_deref(), Some("person"));
        assert_eq!(summary.labels[0], ("person".to_string(), 2));
        assert!((summary.mean_confidence - 0.7).abs() < 1e-9);

        let empty = summarize_live(&[]);
        assert_eq!(empty.total, 0);
        assert_eq!(empty.most_common, None);
        assert_eq!(empty.mean_confidence, 0.0);
    }

    #[test]
    fn test_check_upload() {
        let dir = TempDir::new().unwrap();
        let jpg = dir.path().join("photo.jpg");
        std::fs::write(&jpg, vec![0u8; 2048]).unwrap();
        assert_eq!(check_upload(&jpg, 4096).unwrap(), "image/jpeg");

        let err = check_upload(&jpg, 1024).unwrap_err();
        assert!(err.to_string().contains("limit"));

        let gif = dir.path().join("anim.gif");
        std::fs::write(&gif, b"GIF89a").unwrap();
        assert!(check_upload(&gif, 4096).is_err());
    }

    #[test]
    fn test_multipart_body_layout() {
        let body = multipart_body("XYZ", "file", "a.png", "image/png", b"DATA");
        let text = String::from_utf8(body).unwrap();
        assert!(text.starts_with("--XYZ\r\n"));
        assert!(text.contains("name=\"file\"; filename=\"a.png\""));
        assert!(text.contains("Content-Type: image/png\r\n\r\nDATA\r\n"));
        assert!(text.ends_with("--XYZ--\r\n"));
    }

    #[test]
    fn test_unreachable_service_is_error() {
        // a port that was free a moment ago and has nothing listening now
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let config = DetectionConfig {
            base_url: format!("http://127.0.0.1:{}", port),
            timeout_ms: 500,
            ..DetectionConfig::default()
        };
        let client = HttpDetector::new(&config);
        let err = client.poll().unwrap_err();
        assert!(err.to_string().contains("unreachable"));
    }
}
