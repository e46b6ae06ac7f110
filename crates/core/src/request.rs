//! Upscale request shape, defaults, and validation.
//!
//! Validation is pure logic: the HTTP layer collects the multipart form
//! into an [`UpscaleRequest`] and calls [`UpscaleRequest::validate`] before
//! anything is sent to the provider.

use std::sync::LazyLock;

use image::ImageFormat;
use regex::Regex;

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Limits and accepted values
// ---------------------------------------------------------------------------

/// Maximum number of uploaded files per request.
pub const MAX_FILES_PER_REQUEST: usize = 3;
/// Maximum number of source URLs per request.
pub const MAX_URLS_PER_REQUEST: usize = 3;

/// Declared content types accepted for uploads.
pub const ALLOWED_CONTENT_TYPES: &[&str] = &["image/jpeg", "image/jpg", "image/png", "image/webp"];

/// Scale factors the provider accepts.
pub const VALID_SCALES: &[u8] = &[2, 4, 8];

pub const OUTPUT_FORMAT_JPG: &str = "jpg";
pub const OUTPUT_FORMAT_PNG: &str = "png";
/// Output formats the provider accepts.
pub const VALID_OUTPUT_FORMATS: &[&str] = &[OUTPUT_FORMAT_JPG, OUTPUT_FORMAT_PNG];

pub const DEFAULT_MODEL: &str = "upscayl-standard-4x";
pub const DEFAULT_SCALE: u8 = 4;

const MODEL_PATTERN: &str = r"^[a-z0-9][a-z0-9._-]{0,63}$";
const URL_PATTERN: &str = r"^https?://[^\s/?#]+([/?#]\S*)?$";

static MODEL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(MODEL_PATTERN).expect("valid regex"));
static URL_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(URL_PATTERN).expect("valid regex"));

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// A single uploaded image, as received from the client.
#[derive(Debug, Clone)]
pub struct UploadedImage {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// Provider parameters for an upscale run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpscaleOptions {
    pub model: String,
    pub scale: u8,
    pub save_image_as: String,
    pub enhance_face: bool,
    /// Remote images for the provider to fetch itself.
    pub urls: Vec<String>,
}

impl Default for UpscaleOptions {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            scale: DEFAULT_SCALE,
            save_image_as: OUTPUT_FORMAT_JPG.to_string(),
            enhance_face: true,
            urls: Vec::new(),
        }
    }
}

/// Everything needed to start one provider task.
#[derive(Debug, Clone, Default)]
pub struct UpscaleRequest {
    pub images: Vec<UploadedImage>,
    pub options: UpscaleOptions,
}

impl UpscaleRequest {
    /// Check the request against provider limits and normalise it.
    ///
    /// Returns the request with `save_image_as` lowercased and `model`
    /// trimmed, or the first violation as [`CoreError::Validation`].
    pub fn validate(mut self) -> Result<Self, CoreError> {
        if self.images.is_empty() && self.options.urls.is_empty() {
            return Err(CoreError::Validation(
                "At least one image file or URL is required".to_string(),
            ));
        }
        if self.images.len() > MAX_FILES_PER_REQUEST {
            return Err(CoreError::Validation(format!(
                "Maximum {MAX_FILES_PER_REQUEST} files allowed per request"
            )));
        }
        for image in &self.images {
            validate_image(image)?;
        }

        self.options.model = self.options.model.trim().to_string();
        validate_model(&self.options.model)?;
        validate_scale(self.options.scale)?;
        self.options.save_image_as = self.options.save_image_as.trim().to_lowercase();
        validate_output_format(&self.options.save_image_as)?;
        validate_urls(&self.options.urls)?;

        Ok(self)
    }
}

// ---------------------------------------------------------------------------
// Field validators
// ---------------------------------------------------------------------------

/// Validate one uploaded file: non-empty, allowed declared type, and
/// magic bytes that actually look like a JPEG, PNG or WebP image.
pub fn validate_image(image: &UploadedImage) -> Result<(), CoreError> {
    if image.bytes.is_empty() {
        return Err(CoreError::Validation(format!(
            "File '{}' is empty",
            image.file_name
        )));
    }

    let content_type = image.content_type.to_ascii_lowercase();
    if !ALLOWED_CONTENT_TYPES.contains(&content_type.as_str()) {
        return Err(CoreError::Validation(format!(
            "Invalid file type: {}. Allowed: {}",
            image.content_type,
            ALLOWED_CONTENT_TYPES.join(", ")
        )));
    }

    match image::guess_format(&image.bytes) {
        Ok(ImageFormat::Jpeg | ImageFormat::Png | ImageFormat::WebP) => Ok(()),
        _ => Err(CoreError::Validation(format!(
            "File '{}' is not a valid JPEG, PNG or WebP image",
            image.file_name
        ))),
    }
}

pub fn validate_model(model: &str) -> Result<(), CoreError> {
    if MODEL_RE.is_match(model) {
        Ok(())
    } else {
        Err(CoreError::Validation(format!(
            "Invalid model '{model}'. Expected lowercase letters, digits, '.', '_' or '-'"
        )))
    }
}

pub fn validate_scale(scale: u8) -> Result<(), CoreError> {
    if VALID_SCALES.contains(&scale) {
        Ok(())
    } else {
        Err(CoreError::Validation(format!(
            "Invalid scale '{scale}'. Must be one of: 2, 4, 8"
        )))
    }
}

pub fn validate_output_format(format: &str) -> Result<(), CoreError> {
    if VALID_OUTPUT_FORMATS.contains(&format) {
        Ok(())
    } else {
        Err(CoreError::Validation(format!(
            "Invalid saveImageAs '{format}'. Must be one of: {}",
            VALID_OUTPUT_FORMATS.join(", ")
        )))
    }
}

pub fn validate_urls(urls: &[String]) -> Result<(), CoreError> {
    if urls.len() > MAX_URLS_PER_REQUEST {
        return Err(CoreError::Validation(format!(
            "Maximum {MAX_URLS_PER_REQUEST} URLs allowed per request"
        )));
    }
    match urls.iter().find(|u| !URL_RE.is_match(u)) {
        Some(bad) => Err(CoreError::Validation(format!(
            "Invalid URL '{bad}'. Only absolute http(s) URLs are accepted"
        ))),
        None => Ok(()),
    }
}

/// Parse a scale form value such as `"4"` or `"4x"`.
pub fn parse_scale(raw: &str) -> Result<u8, CoreError> {
    let trimmed = raw.trim();
    let digits = trimmed
        .strip_suffix('x')
        .or_else(|| trimmed.strip_suffix('X'))
        .unwrap_or(trimmed);
    digits
        .parse::<u8>()
        .map_err(|_| CoreError::Validation(format!("Invalid scale '{raw}'. Must be one of: 2, 4, 8")))
}

/// Parse a boolean form value. Accepts the usual HTML-form spellings.
pub fn parse_flag(field: &str, raw: &str) -> Result<bool, CoreError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(CoreError::Validation(format!(
            "Invalid {field} '{raw}'. Expected true or false"
        ))),
    }
}

/// Parse a `urls` form value: either a JSON array of strings or a
/// comma-separated list. Blank entries are dropped.
pub fn parse_urls(raw: &str) -> Result<Vec<String>, CoreError> {
    let trimmed = raw.trim();
    let urls: Vec<String> = if trimmed.starts_with('[') {
        serde_json::from_str(trimmed).map_err(|e| {
            CoreError::Validation(format!("urls must be a JSON array of strings: {e}"))
        })?
    } else {
        trimmed.split(',').map(str::to_string).collect()
    };
    Ok(urls
        .into_iter()
        .map(|u| u.trim().to_string())
        .filter(|u| !u.is_empty())
        .collect())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    const PNG_MAGIC: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0];
    const JPEG_MAGIC: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0, 0x10, b'J', b'F', b'I', b'F'];

    fn png(name: &str) -> UploadedImage {
        UploadedImage {
            file_name: name.to_string(),
            content_type: "image/png".to_string(),
            bytes: PNG_MAGIC.to_vec(),
        }
    }

    fn request_with(images: Vec<UploadedImage>) -> UpscaleRequest {
        UpscaleRequest {
            images,
            options: UpscaleOptions::default(),
        }
    }

    #[test]
    fn defaults_match_provider_defaults() {
        let opts = UpscaleOptions::default();
        assert_eq!(opts.model, "upscayl-standard-4x");
        assert_eq!(opts.scale, 4);
        assert_eq!(opts.save_image_as, "jpg");
        assert!(opts.enhance_face);
        assert!(opts.urls.is_empty());
    }

    #[test]
    fn valid_single_png_passes() {
        assert!(request_with(vec![png("a.png")]).validate().is_ok());
    }

    #[test]
    fn jpeg_bytes_with_jpg_content_type_pass() {
        let img = UploadedImage {
            file_name: "a.jpg".into(),
            content_type: "image/jpg".into(),
            bytes: JPEG_MAGIC.to_vec(),
        };
        assert!(validate_image(&img).is_ok());
    }

    #[test]
    fn empty_payload_is_rejected() {
        let err = UpscaleRequest::default().validate().unwrap_err();
        assert_matches!(err, CoreError::Validation(msg) if msg.contains("At least one"));
    }

    #[test]
    fn url_only_request_passes() {
        let mut req = UpscaleRequest::default();
        req.options.urls = vec!["https://example.com/cat.png".into()];
        assert!(req.validate().is_ok());
    }

    #[test]
    fn too_many_files_are_rejected() {
        let req = request_with(vec![png("1"), png("2"), png("3"), png("4")]);
        assert_matches!(req.validate(), Err(CoreError::Validation(msg)) if msg.contains("Maximum 3"));
    }

    #[test]
    fn empty_file_is_rejected() {
        let mut img = png("empty.png");
        img.bytes.clear();
        assert_matches!(validate_image(&img), Err(CoreError::Validation(msg)) if msg.contains("empty"));
    }

    #[test]
    fn disallowed_content_type_is_rejected() {
        let mut img = png("a.gif");
        img.content_type = "image/gif".into();
        assert_matches!(
            validate_image(&img),
            Err(CoreError::Validation(msg)) if msg.contains("Invalid file type: image/gif")
        );
    }

    #[test]
    fn non_image_bytes_are_rejected() {
        let mut img = png("fake.png");
        img.bytes = b"definitely not an image".to_vec();
        assert_matches!(validate_image(&img), Err(CoreError::Validation(_)));
    }

    #[test]
    fn scale_outside_range_is_rejected() {
        let mut req = request_with(vec![png("a.png")]);
        req.options.scale = 3;
        assert_matches!(req.validate(), Err(CoreError::Validation(msg)) if msg.contains("scale"));
    }

    #[test]
    fn output_format_is_normalised() {
        let mut req = request_with(vec![png("a.png")]);
        req.options.save_image_as = " PNG ".into();
        let req = req.validate().unwrap();
        assert_eq!(req.options.save_image_as, "png");
    }

    #[test]
    fn webp_output_is_rejected() {
        assert_matches!(validate_output_format("webp"), Err(CoreError::Validation(_)));
    }

    #[test]
    fn model_names_are_checked() {
        assert!(validate_model("upscayl-lite-4x").is_ok());
        assert!(validate_model("remacri_4x.v2").is_ok());
        assert!(validate_model("").is_err());
        assert!(validate_model("Bad Model").is_err());
        assert!(validate_model("../etc/passwd").is_err());
    }

    #[test]
    fn non_http_urls_are_rejected() {
        let urls = vec!["ftp://example.com/a.png".to_string()];
        assert_matches!(validate_urls(&urls), Err(CoreError::Validation(msg)) if msg.contains("ftp://"));
        assert!(validate_urls(&["http://localhost:9000/x".to_string()]).is_ok());
    }

    #[test]
    fn parse_scale_accepts_suffix() {
        assert_eq!(parse_scale("4").unwrap(), 4);
        assert_eq!(parse_scale(" 8x ").unwrap(), 8);
        assert!(parse_scale("four").is_err());
    }

    #[test]
    fn parse_flag_accepts_form_spellings() {
        assert!(parse_flag("enhanceFace", "True").unwrap());
        assert!(parse_flag("enhanceFace", "on").unwrap());
        assert!(!parse_flag("enhanceFace", "0").unwrap());
        assert!(parse_flag("enhanceFace", "maybe").is_err());
    }

    #[test]
    fn parse_urls_accepts_json_and_csv() {
        assert_eq!(
            parse_urls(r#"["https://a.test/1.png", " https://a.test/2.png "]"#).unwrap(),
            vec!["https://a.test/1.png", "https://a.test/2.png"]
        );
        assert_eq!(
            parse_urls("https://a.test/1.png, ,https://a.test/2.png").unwrap(),
            vec!["https://a.test/1.png", "https://a.test/2.png"]
        );
        assert!(parse_urls("[not json").is_err());
    }
}
