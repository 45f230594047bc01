//! 统一 API 响应格式与错误码

use actix_web::HttpResponse;
use actix_web::http::StatusCode;
use serde::{Deserialize, Serialize};
use serde_repr::{Deserialize_repr, Serialize_repr};

use crate::errors::AttributorError;

/// API 错误码
///
/// 使用 serde_repr 序列化为数字，按千位分域：
/// - 0: 成功
/// - 1000-1099: 通用错误
/// - 2000-2099: 认证错误
/// - 3000-3099: 点击与宏参数错误
/// - 4000-4099: 回传错误
/// - 5000-5099: 存储错误
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize_repr, Deserialize_repr)]
#[repr(i32)]
pub enum ErrorCode {
    Success = 0,

    BadRequest = 1000,
    Unauthorized = 1001,
    NotFound = 1004,
    InternalServerError = 1005,
    ServiceUnavailable = 1030,

    AuthFailed = 2000,
    AdminDisabled = 2001,

    DuplicateClick = 3000,
    UnknownClick = 3001,
    InvalidMacroKey = 3002,

    DispatchNotConfigured = 4000,
    PlatformRejected = 4001,
    PlatformUnavailable = 4002,

    DatabaseError = 5000,
}

impl From<&AttributorError> for ErrorCode {
    fn from(err: &AttributorError) -> Self {
        match err {
            AttributorError::DuplicateClick(_) => ErrorCode::DuplicateClick,
            AttributorError::UnknownClick(_) => ErrorCode::UnknownClick,
            AttributorError::InvalidMacroKey(_) => ErrorCode::InvalidMacroKey,
            AttributorError::Validation(_) => ErrorCode::BadRequest,
            AttributorError::NotFound(_) => ErrorCode::NotFound,
            AttributorError::Configuration(_) => ErrorCode::DispatchNotConfigured,
            AttributorError::PlatformRejected(_) => ErrorCode::PlatformRejected,
            AttributorError::PlatformUnavailable(_) => ErrorCode::PlatformUnavailable,
            AttributorError::DatabaseConfig(_)
            | AttributorError::DatabaseConnection(_)
            | AttributorError::DatabaseOperation(_) => ErrorCode::DatabaseError,
            AttributorError::Serialization(_) | AttributorError::FileOperation(_) => {
                ErrorCode::InternalServerError
            }
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ApiResponse<T> {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

/// 构建 JSON 响应
pub fn json_response<T: Serialize>(
    status: StatusCode,
    code: ErrorCode,
    message: impl Into<String>,
    data: Option<T>,
) -> HttpResponse {
    HttpResponse::build(status)
        .append_header(("Content-Type", "application/json; charset=utf-8"))
        .json(ApiResponse {
            code: code as i32,
            message: message.into(),
            data,
        })
}

pub fn success_response<T: Serialize>(data: T) -> HttpResponse {
    json_response(StatusCode::OK, ErrorCode::Success, "OK", Some(data))
}

pub fn error_response(status: StatusCode, error_code: ErrorCode, message: &str) -> HttpResponse {
    json_response::<()>(status, error_code, message, None)
}

/// 从 AttributorError 构建错误响应（自动映射 HTTP 状态码和 ErrorCode）
pub fn error_from_attributor(err: &AttributorError) -> HttpResponse {
    error_response(err.http_status(), ErrorCode::from(err), err.message())
}

/// 统一 Result → HttpResponse 转换
pub fn api_result<T: Serialize>(result: crate::errors::Result<T>) -> HttpResponse {
    match result {
        Ok(data) => success_response(data),
        Err(e) => error_from_attributor(&e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_serializes_as_number() {
        let body = serde_json::to_value(ApiResponse::<()> {
            code: ErrorCode::UnknownClick as i32,
            message: "x".into(),
            data: None,
        })
        .unwrap();
        assert_eq!(body["code"], 3001);
        assert!(body.get("data").is_none());
        assert_eq!(serde_json::to_string(&ErrorCode::Success).unwrap(), "0");
    }

    #[test]
    fn test_error_mapping() {
        let err = AttributorError::duplicate_click("c1");
        assert_eq!(ErrorCode::from(&err), ErrorCode::DuplicateClick);
        let resp = error_from_attributor(&err);
        assert_eq!(resp.status(), StatusCode::CONFLICT);
    }
}
