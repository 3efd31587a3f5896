use thiserror::Error;
use uuid::Uuid;

pub const DEFAULT_MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;
pub const DEFAULT_MAX_FILES: usize = 5;
pub const DEFAULT_MAX_FIELDS: usize = 10;
pub const DEFAULT_MAX_FIELD_BYTES: usize = 1024 * 1024;

/// Image extensions and the single MIME type each must be declared with.
const MIME_BY_EXTENSION: &[(&str, &str)] = &[
    (".jpg", "image/jpeg"),
    (".jpeg", "image/jpeg"),
    (".png", "image/png"),
    (".gif", "image/gif"),
];

pub fn mime_for_extension(ext: &str) -> Option<&'static str> {
    MIME_BY_EXTENSION
        .iter()
        .find(|(e, _)| *e == ext)
        .map(|(_, mime)| *mime)
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UploadError {
    #[error("File size must be less than {}MB", mebibytes(*max_bytes))]
    FileTooLarge { max_bytes: u64 },
    #[error("Maximum {max} files allowed per request")]
    TooManyFiles { max: usize },
    #[error("File type {ext} is not allowed. Allowed types: {}", allowed.join(", "))]
    ExtensionNotAllowed { ext: String, allowed: Vec<String> },
    #[error("Invalid file type. File extension {ext} does not match MIME type {mime}")]
    MimeMismatch { ext: String, mime: String },
    #[error("Unexpected file in upload")]
    UnexpectedFile { field: String },
    #[error("Maximum {max} form fields allowed per request")]
    TooManyFields { max: usize },
    #[error("Form field {field} exceeds {max_bytes} bytes")]
    FieldTooLarge { field: String, max_bytes: usize },
}

impl UploadError {
    /// Short title used as the `error` field of the JSON response.
    pub fn title(&self) -> &'static str {
        match self {
            UploadError::FileTooLarge { .. } => "File too large",
            UploadError::TooManyFiles { .. } => "Too many files",
            UploadError::ExtensionNotAllowed { .. } | UploadError::MimeMismatch { .. } => {
                "Upload failed"
            }
            UploadError::UnexpectedFile { .. } => "Unexpected file field",
            UploadError::TooManyFields { .. } | UploadError::FieldTooLarge { .. } => {
                "Upload error"
            }
        }
    }

    /// Size and count violations are 413s; everything else is a 400.
    pub fn is_payload_too_large(&self) -> bool {
        matches!(
            self,
            UploadError::FileTooLarge { .. }
                | UploadError::TooManyFiles { .. }
                | UploadError::FieldTooLarge { .. }
        )
    }
}

fn mebibytes(bytes: u64) -> u64 {
    ((bytes as f64) / 1024.0 / 1024.0).round() as u64
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadPolicy {
    pub max_file_size: u64,
    pub max_files: usize,
    pub max_fields: usize,
    pub max_field_bytes: usize,
    pub allowed_extensions: Vec<String>,
}

impl Default for UploadPolicy {
    fn default() -> Self {
        Self {
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            max_files: DEFAULT_MAX_FILES,
            max_fields: DEFAULT_MAX_FIELDS,
            max_field_bytes: DEFAULT_MAX_FIELD_BYTES,
            allowed_extensions: MIME_BY_EXTENSION.iter().map(|(e, _)| e.to_string()).collect(),
        }
    }
}

impl UploadPolicy {
    /// Parses a comma-separated override such as `.jpg, .PNG`.
    pub fn with_allowed_extensions(mut self, raw: &str) -> Self {
        let parsed: Vec<String> = raw
            .split(',')
            .map(|ext| ext.trim().to_ascii_lowercase())
            .filter(|ext| !ext.is_empty())
            .collect();
        if !parsed.is_empty() {
            self.allowed_extensions = parsed;
        }
        self
    }

    /// Checks a file's name and declared content type before any byte of it
    /// is stored. Returns the lowercased extension on success.
    pub fn check_file(&self, original_name: &str, content_type: &str) -> Result<String, UploadError> {
        let (_, ext) = split_extension(base_name(original_name));
        let ext = ext.to_ascii_lowercase();
        let mime = content_type.trim().to_ascii_lowercase();

        if !self.allowed_extensions.iter().any(|allowed| *allowed == ext) {
            return Err(UploadError::ExtensionNotAllowed {
                ext,
                allowed: self.allowed_extensions.clone(),
            });
        }

        match mime_for_extension(&ext) {
            Some(expected) if expected == mime => Ok(ext),
            _ => Err(UploadError::MimeMismatch { ext, mime }),
        }
    }

    pub fn check_size(&self, received: u64) -> Result<(), UploadError> {
        if received > self.max_file_size {
            return Err(UploadError::FileTooLarge {
                max_bytes: self.max_file_size,
            });
        }
        Ok(())
    }

    pub fn check_file_count(&self, count: usize) -> Result<(), UploadError> {
        if count > self.max_files {
            return Err(UploadError::TooManyFiles { max: self.max_files });
        }
        Ok(())
    }
}

/// Builds the on-disk name `<sanitized base>-<32 hex chars><ext>`.
pub fn stored_file_name(original_name: &str) -> String {
    let (stem, ext) = split_extension(base_name(original_name));
    let safe: String = stem
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!(
        "{}-{}{}",
        safe,
        Uuid::new_v4().simple(),
        ext.to_ascii_lowercase()
    )
}

fn base_name(name: &str) -> &str {
    name.rsplit(['/', '\\']).next().unwrap_or(name)
}

/// Splits `photo.final.JPG` into (`photo.final`, `.JPG`). A leading dot does
/// not start an extension, so `.env` has none.
fn split_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(idx) if idx > 0 => (&name[..idx], &name[idx..]),
        _ => (name, ""),
    }
}
