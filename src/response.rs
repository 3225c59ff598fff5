use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde::Serialize;
use thiserror::Error;

/// Единый конверт ответа для всех эндпоинтов
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub status: u16,
    pub message: String,
    pub body: T,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(message: impl Into<String>, body: T) -> Self {
        Self {
            status: StatusCode::OK.as_u16(),
            message: message.into(),
            body,
        }
    }

    pub fn into_http(self) -> HttpResponse {
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        HttpResponse::build(status).json(self)
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("No file uploaded")]
    NoFile,

    #[error("Invalid file type")]
    InvalidFileType(String),

    #[error("File too large")]
    FileTooLarge(usize),

    #[error("Malformed upload")]
    MalformedUpload(String),

    #[error("No QR code found in the image")]
    NoQrCode,

    #[error("Invalid KHQR code")]
    InvalidKhqr,

    #[error("Please enter a valid text")]
    InvalidText,

    #[error("Error decoding QR code")]
    ImageDecode(String),

    #[error("Error creating QR code")]
    QrEncode(String),

    #[error("Not found")]
    NotFound,

    #[error("{0}")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::NoFile => "NO_FILE",
            ApiError::InvalidFileType(_) => "INVALID_FILE_TYPE",
            ApiError::FileTooLarge(_) => "LIMIT_FILE_SIZE",
            ApiError::MalformedUpload(_) => "MALFORMED_UPLOAD",
            ApiError::NoQrCode => "NO_QR_CODE",
            ApiError::InvalidKhqr => "INVALID_KHQR",
            ApiError::InvalidText => "INVALID_TEXT",
            ApiError::ImageDecode(_) => "DECODE_ERROR",
            ApiError::QrEncode(_) => "ENCODE_ERROR",
            ApiError::NotFound => "NOT_FOUND",
            ApiError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Детали, которые можно показать клиенту
    fn detail(&self) -> Option<String> {
        match self {
            ApiError::InvalidFileType(mime) => Some(format!("unsupported type: {}", mime)),
            ApiError::FileTooLarge(limit) => Some(format!("limit is {} bytes", limit)),
            ApiError::MalformedUpload(e) | ApiError::ImageDecode(e) | ApiError::QrEncode(e) => {
                Some(e.clone())
            }
            ApiError::Internal(e) => Some(e.to_string()),
            _ => None,
        }
    }

    pub fn to_envelope(&self) -> ApiResponse<ErrorBody> {
        ApiResponse {
            status: self.status_code().as_u16(),
            message: self.to_string(),
            body: ErrorBody {
                code: self.code(),
                error: self.detail(),
            },
        }
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::NoFile
            | ApiError::InvalidFileType(_)
            | ApiError::FileTooLarge(_)
            | ApiError::MalformedUpload(_)
            | ApiError::NoQrCode
            | ApiError::InvalidKhqr
            | ApiError::InvalidText => StatusCode::BAD_REQUEST,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::ImageDecode(_) | ApiError::QrEncode(_) | ApiError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        match self {
            // Полная цепочка ошибки только в лог
            ApiError::Internal(e) => log::error!("Unhandled error: {:?}", e),
            _ if status.is_server_error() => {
                log::error!("{}: {}", self, self.detail().unwrap_or_default())
            }
            _ => log::warn!("Request rejected: {} ({})", self, self.code()),
        }

        HttpResponse::build(status).json(self.to_envelope())
    }
}
