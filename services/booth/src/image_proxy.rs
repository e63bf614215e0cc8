use crate::error::{BoothError, BoothResult};
use anyhow::Context;
use base64::{engine::general_purpose::STANDARD, Engine};
use reqwest::header::CONTENT_TYPE;
use reqwest::redirect::Policy;
use reqwest::{Client, Url};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::time::Duration;
use tracing::{debug, instrument};

const MAX_REDIRECTS: usize = 5;

/// Fetches remote images and hands them back as `data:` URLs, so the
/// frontend can draw generated images onto a canvas without CORS issues.
pub struct ImageProxy {
    client: Client,
    max_bytes: usize,
}

impl ImageProxy {
    /// `max_bytes` caps the upstream body that will be buffered
    pub fn new(timeout: Duration, max_bytes: usize) -> anyhow::Result<Self> {
        // Every redirect hop must pass the same host check as the request itself
        let redirects = Policy::custom(|attempt| {
            if attempt.previous().len() >= MAX_REDIRECTS {
                attempt.error("too many redirects")
            } else if parse_image_url(attempt.url().as_str()).is_err() {
                attempt.error("redirect to disallowed host")
            } else {
                attempt.follow()
            }
        });

        let client = Client::builder()
            .timeout(timeout)
            .redirect(redirects)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self { client, max_bytes })
    }

    #[instrument(skip(self))]
    pub async fn fetch_data_url(&self, url: &str) -> BoothResult<String> {
        let url = parse_image_url(url)?;

        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .context("Image request failed")
            .map_err(BoothError::upstream("Failed to fetch image"))?;

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        check_declared_length(response.content_length(), self.max_bytes)?;

        let mut body = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .context("Failed to read image body")
            .map_err(BoothError::upstream("Failed to fetch image"))?
        {
            append_capped(&mut body, &chunk, self.max_bytes)?;
        }

        debug!(size_bytes = body.len(), content_type = ?content_type, "Image fetched");

        Ok(to_data_url(content_type.as_deref(), &body))
    }
}

fn parse_image_url(raw: &str) -> BoothResult<Url> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(BoothError::bad_request("Missing image URL"));
    }

    let url = Url::parse(raw).map_err(|_| BoothError::bad_request("Invalid image URL"))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(BoothError::bad_request("Invalid image URL"));
    }

    let host = url
        .host_str()
        .unwrap_or_default()
        .trim_start_matches('[')
        .trim_end_matches(']');
    let public = match host.parse::<IpAddr>() {
        Ok(ip) => is_public_ip(ip),
        Err(_) => {
            let domain = host.trim_end_matches('.').to_ascii_lowercase();
            !domain.is_empty() && domain != "localhost" && !domain.ends_with(".localhost")
        }
    };
    if !public {
        return Err(BoothError::bad_request("Image host not allowed"));
    }

    Ok(url)
}

fn is_public_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(ip) => is_public_ipv4(ip),
        IpAddr::V6(ip) => match ip.to_ipv4_mapped() {
            Some(mapped) => is_public_ipv4(mapped),
            None => is_public_ipv6(ip),
        },
    }
}

fn is_public_ipv4(ip: Ipv4Addr) -> bool {
    let [a, b, ..] = ip.octets();
    !(ip.is_unspecified()
        || ip.is_loopback()
        || ip.is_private()
        || ip.is_link_local()
        || ip.is_broadcast()
        || ip.is_documentation()
        // 100.64.0.0/10 carrier-grade NAT
        || (a == 100 && (b & 0xc0) == 64)
        || a == 0
        || a >= 240)
}

fn is_public_ipv6(ip: Ipv6Addr) -> bool {
    let first = ip.segments()[0];
    !(ip.is_unspecified()
        || ip.is_loopback()
        || ip.is_multicast()
        // fc00::/7 unique local, fe80::/10 link local
        || (first & 0xfe00) == 0xfc00
        || (first & 0xffc0) == 0xfe80)
}

fn too_large() -> BoothError {
    BoothError::bad_request("Image too large")
}

fn check_declared_length(declared: Option<u64>, max_bytes: usize) -> BoothResult<()> {
    match declared {
        Some(len) if len > max_bytes as u64 => Err(too_large()),
        _ => Ok(()),
    }
}

fn append_capped(body: &mut Vec<u8>, chunk: &[u8], max_bytes: usize) -> BoothResult<()> {
    if body.len() + chunk.len() > max_bytes {
        return Err(too_large());
    }
    body.extend_from_slice(chunk);
    Ok(())
}

/// Encode bytes as a `data:` URL
pub fn to_data_url(content_type: Option<&str>, bytes: &[u8]) -> String {
    format!(
        "data:{};base64,{}",
        content_type.unwrap_or("application/octet-stream"),
        STANDARD.encode(bytes)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_data_url() {
        assert_eq!(to_data_url(Some("image/png"), b"Hello"), "data:image/png;base64,SGVsbG8=");
        assert_eq!(
            to_data_url(None, b"Hello"),
            "data:application/octet-stream;base64,SGVsbG8="
        );
    }

    #[test]
    fn test_parse_image_url() {
        assert!(parse_image_url("https://cdn.example.com/x.png").is_ok());
        assert!(matches!(parse_image_url(""), Err(BoothError::BadRequest(_))));
        assert!(matches!(
            parse_image_url("file:///etc/passwd"),
            Err(BoothError::BadRequest(_))
        ));
        assert!(matches!(
            parse_image_url("not a url"),
            Err(BoothError::BadRequest(_))
        ));
    }

    #[test]
    fn test_rejects_non_public_hosts() {
        for url in [
            "http://169.254.169.254/latest/meta-data/",
            "http://127.0.0.1:5432/",
            "http://10.0.0.7/x.png",
            "http://192.168.1.20/x.png",
            "http://100.64.0.1/x.png",
            "http://0.0.0.0/x.png",
            "http://[::1]/x.png",
            "http://[fd00::1]/x.png",
            "http://[fe80::1]/x.png",
            "http://[::ffff:127.0.0.1]/x.png",
            "http://localhost:3000/x.png",
            "http://api.localhost/x.png",
        ] {
            assert!(
                matches!(parse_image_url(url), Err(BoothError::BadRequest(_))),
                "{} accepted",
                url
            );
        }

        assert!(parse_image_url("https://93.184.216.34/x.png").is_ok());
        assert!(parse_image_url("https://[2606:4700::1111]/x.png").is_ok());
    }

    #[test]
    fn test_body_size_cap() {
        assert!(check_declared_length(None, 10).is_ok());
        assert!(check_declared_length(Some(10), 10).is_ok());
        assert!(matches!(
            check_declared_length(Some(11), 10),
            Err(BoothError::BadRequest(_))
        ));

        let mut body = Vec::new();
        assert!(append_capped(&mut body, &[0u8; 6], 10).is_ok());
        assert!(append_capped(&mut body, &[0u8; 4], 10).is_ok());
        assert!(matches!(
            append_capped(&mut body, &[0u8; 1], 10),
            Err(BoothError::BadRequest(_))
        ));
        assert_eq!(body.len(), 10);
    }
}
