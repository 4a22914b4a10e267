use image::codecs::png::PngEncoder;
use image::{ImageEncoder, Luma};
use qrcode::{EcLevel, QrCode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::err::Error;

/// Wire contract between issuance and verification: the serialized JSON of
/// this struct is the QR content, the persisted `qr_payload` column, and the
/// body a scanner posts back. Field names and order are fixed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QrPayload {
    pub id: String,
    #[serde(rename = "studentId")]
    pub student_id: Uuid,
    pub name: String,
    pub email: String,
    #[serde(rename = "rollNumber")]
    pub roll_number: String,
}

const QR_MIN_DIMENSIONS: u32 = 500;

pub fn render_png(data: &str) -> Result<Vec<u8>, Error> {
    let code = QrCode::with_error_correction_level(data.as_bytes(), EcLevel::H).map_err(|e| {
        Error::InternalError {
            kind: "QrError",
            message: format!("QR generation failed: {}", e),
        }
    })?;
    let img = code
        .render::<Luma<u8>>()
        .min_dimensions(QR_MIN_DIMENSIONS, QR_MIN_DIMENSIONS)
        .build();
    let mut png = Vec::new();
    PngEncoder::new(&mut png)
        .write_image(img.as_raw(), img.width(), img.height(), image::ColorType::L8)
        .map_err(|e| Error::InternalError {
            kind: "QrError",
            message: format!("QR rendering failed: {}", e),
        })?;
    Ok(png)
}
