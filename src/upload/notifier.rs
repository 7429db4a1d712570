use anyhow::{anyhow, Context, Result};
use serde_json::Value;
use std::time::Duration;
use url::Url;

pub const DEFAULT_UPLOAD_TIMEOUT: Duration = Duration::from_secs(10);
pub const UPLOAD_FIELD: &str = "image0";
pub const UPLOAD_FILENAME: &str = "fall_capture.jpg";

/// Accepted delivery.
#[derive(Clone, Debug, PartialEq)]
pub struct Delivery {
    pub status: u16,
    pub body: Value,
}

/// Remote sink for evidence images.
///
/// Any `Err` is a delivery failure. The caller logs it and moves on; there is
/// no retry.
pub trait Notifier: Send {
    /// Where deliveries go, for log lines.
    fn endpoint(&self) -> &str;

    fn deliver(&mut self, image: &[u8], content_type: &str) -> Result<Delivery>;
}

/// Multipart HTTP POST with a single file field.
///
/// Success is HTTP 200 with a JSON body. Other statuses, unparseable bodies
/// and transport errors are failures.
pub struct HttpNotifier {
    agent: ureq::Agent,
    url: String,
}

impl HttpNotifier {
    pub fn new(url: &str, timeout: Duration) -> Result<Self> {
        let parsed = Url::parse(url).with_context(|| format!("parse upload url '{}'", url))?;
        match parsed.scheme() {
            "http" | "https" => {}
            other => {
                return Err(anyhow!(
                    "unsupported upload scheme '{}'; expected http(s)",
                    other
                ))
            }
        }
        let agent = ureq::AgentBuilder::new().timeout(timeout).build();
        Ok(Self {
            agent,
            url: parsed.to_string(),
        })
    }
}

impl Notifier for HttpNotifier {
    fn endpoint(&self) -> &str {
        &self.url
    }

    fn deliver(&mut self, image: &[u8], content_type: &str) -> Result<Delivery> {
        let boundary = format!("fall-sentinel-{:016x}", rand::random::<u64>());
        let body = multipart_body(&boundary, UPLOAD_FIELD, UPLOAD_FILENAME, content_type, image);

        let response = match self
            .agent
            .post(&self.url)
            .set(
                "Content-Type",
                &format!("multipart/form-data; boundary={}", boundary),
            )
            .send_bytes(&body)
        {
            Ok(response) => response,
            Err(ureq::Error::Status(code, _)) => {
                return Err(anyhow!("server returned status {}", code))
            }
            Err(ureq::Error::Transport(err)) => {
                return Err(anyhow!("server connection error: {}", err))
            }
        };

        let status = response.status();
        if status != 200 {
            return Err(anyhow!("server returned status {}", status));
        }
        let text = response.into_string().context("read upload response")?;
        let body: Value =
            serde_json::from_str(&text).map_err(|e| anyhow!("response is not JSON: {}", e))?;
        Ok(Delivery { status, body })
    }
}

/// `multipart/form-data` body carrying one file part.
pub fn multipart_body(
    boundary: &str,
    field: &str,
    filename: &str,
    content_type: &str,
    payload: &[u8],
) -> Vec<u8> {
    let head = format!(
        "--{boundary}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\nContent-Type: {content_type}\r\n\r\n"
    );
    let tail = format!("\r\n--{boundary}--\r\n");
    let mut body = Vec::with_capacity(head.len() + payload.len() + tail.len());
    body.extend_from_slice(head.as_bytes());
    body.extend_from_slice(payload);
    body.extend_from_slice(tail.as_bytes());
    body
}
