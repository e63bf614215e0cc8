use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine};
use image::{DynamicImage, ImageFormat, Luma};
use qrcode::{EcLevel, QrCode};
use std::io::Cursor;

const PNG_DATA_URL_PREFIX: &str = "data:image/png;base64,";

/// Renders download links as PNG QR codes
#[derive(Debug, Clone)]
pub struct QrEncoder {
    download_base_url: String,
    /// Minimum edge length of the rendered image, in pixels
    min_dimension: u32,
}

impl QrEncoder {
    pub fn new(download_base_url: impl Into<String>) -> Self {
        Self {
            download_base_url: download_base_url.into().trim_end_matches('/').to_string(),
            min_dimension: 200,
        }
    }

    /// Page a download code resolves to
    pub fn download_url(&self, download_code: &str) -> String {
        format!("{}/download/{}", self.download_base_url, download_code)
    }

    /// QR code for the download page of `download_code`, as a PNG data URL
    pub fn download_qr(&self, download_code: &str) -> Result<String> {
        self.to_data_url(&self.download_url(download_code))
    }

    pub fn to_data_url(&self, text: &str) -> Result<String> {
        let code = QrCode::with_error_correction_level(text.as_bytes(), EcLevel::M)
            .context("Failed to encode QR code")?;

        let rendered = code
            .render::<Luma<u8>>()
            .min_dimensions(self.min_dimension, self.min_dimension)
            .build();

        let mut png = Cursor::new(Vec::new());
        DynamicImage::ImageLuma8(rendered)
            .write_to(&mut png, ImageFormat::Png)
            .context("Failed to write QR code PNG")?;

        Ok(format!("{}{}", PNG_DATA_URL_PREFIX, STANDARD.encode(png.into_inner())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_download_url_trims_trailing_slash() {
        let encoder = QrEncoder::new("https://booth.example.com/");
        assert_eq!(
            encoder.download_url("1a2b3c4d"),
            "https://booth.example.com/download/1a2b3c4d"
        );
    }

    #[test]
    fn test_data_url_is_png() {
        let encoder = QrEncoder::new("http://localhost:5173");
        let data_url = encoder.download_qr("1a2b3c4d").unwrap();

        assert!(data_url.starts_with("data:image/png;base64,"));

        let bytes = STANDARD
            .decode(&data_url[PNG_DATA_URL_PREFIX.len()..])
            .unwrap();
        // PNG signature
        assert_eq!(&bytes[..8], &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]);
    }

    #[test]
    fn test_rejects_oversized_payload() {
        let encoder = QrEncoder::new("http://localhost:5173");
        let huge = "x".repeat(8_000);
        assert!(encoder.to_data_url(&huge).is_err());
    }
}
