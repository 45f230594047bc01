use std::fmt;

use actix_web::http::StatusCode;

#[derive(Debug, Clone)]
pub enum AttributorError {
    DuplicateClick(String),
    UnknownClick(String),
    InvalidMacroKey(String),
    Validation(String),
    NotFound(String),
    Configuration(String),
    PlatformRejected(String),
    PlatformUnavailable(String),
    DatabaseConfig(String),
    DatabaseConnection(String),
    DatabaseOperation(String),
    Serialization(String),
    FileOperation(String),
}

impl AttributorError {
    /// 获取错误代码
    pub fn code(&self) -> &'static str {
        match self {
            AttributorError::DuplicateClick(_) => "E001",
            AttributorError::UnknownClick(_) => "E002",
            AttributorError::InvalidMacroKey(_) => "E003",
            AttributorError::Validation(_) => "E004",
            AttributorError::NotFound(_) => "E005",
            AttributorError::Configuration(_) => "E006",
            AttributorError::PlatformRejected(_) => "E007",
            AttributorError::PlatformUnavailable(_) => "E008",
            AttributorError::DatabaseConfig(_) => "E009",
            AttributorError::DatabaseConnection(_) => "E010",
            AttributorError::DatabaseOperation(_) => "E011",
            AttributorError::Serialization(_) => "E012",
            AttributorError::FileOperation(_) => "E013",
        }
    }

    /// 获取错误类型名称
    pub fn error_type(&self) -> &'static str {
        match self {
            AttributorError::DuplicateClick(_) => "Duplicate Click",
            AttributorError::UnknownClick(_) => "Unknown Click",
            AttributorError::InvalidMacroKey(_) => "Invalid Macro Key",
            AttributorError::Validation(_) => "Validation Error",
            AttributorError::NotFound(_) => "Resource Not Found",
            AttributorError::Configuration(_) => "Configuration Error",
            AttributorError::PlatformRejected(_) => "Platform Rejected",
            AttributorError::PlatformUnavailable(_) => "Platform Unavailable",
            AttributorError::DatabaseConfig(_) => "Database Configuration Error",
            AttributorError::DatabaseConnection(_) => "Database Connection Error",
            AttributorError::DatabaseOperation(_) => "Database Operation Error",
            AttributorError::Serialization(_) => "Serialization Error",
            AttributorError::FileOperation(_) => "File Operation Error",
        }
    }

    /// 获取错误详情
    pub fn message(&self) -> &str {
        match self {
            AttributorError::DuplicateClick(msg)
            | AttributorError::UnknownClick(msg)
            | AttributorError::InvalidMacroKey(msg)
            | AttributorError::Validation(msg)
            | AttributorError::NotFound(msg)
            | AttributorError::Configuration(msg)
            | AttributorError::PlatformRejected(msg)
            | AttributorError::PlatformUnavailable(msg)
            | AttributorError::DatabaseConfig(msg)
            | AttributorError::DatabaseConnection(msg)
            | AttributorError::DatabaseOperation(msg)
            | AttributorError::Serialization(msg)
            | AttributorError::FileOperation(msg) => msg,
        }
    }

    /// HTTP status used when the error reaches an API boundary
    pub fn http_status(&self) -> StatusCode {
        match self {
            AttributorError::DuplicateClick(_) => StatusCode::CONFLICT,
            AttributorError::UnknownClick(_) | AttributorError::NotFound(_) => {
                StatusCode::NOT_FOUND
            }
            AttributorError::InvalidMacroKey(_) | AttributorError::Validation(_) => {
                StatusCode::BAD_REQUEST
            }
            AttributorError::Configuration(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AttributorError::PlatformRejected(_) | AttributorError::PlatformUnavailable(_) => {
                StatusCode::BAD_GATEWAY
            }
            AttributorError::DatabaseConnection(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// 格式化为彩色输出（用于 Server 模式）
    pub fn format_colored(&self) -> String {
        use colored::Colorize;
        format!(
            "{} {} {}\n  {}",
            "[ERROR]".red().bold(),
            self.code().yellow(),
            self.error_type().red(),
            self.message().white()
        )
    }

    /// 格式化为简洁输出（用于 CLI 模式）
    pub fn format_simple(&self) -> String {
        format!("{}: {}", self.error_type(), self.message())
    }
}

impl fmt::Display for AttributorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format_simple())
    }
}

impl std::error::Error for AttributorError {}

// 便捷的构造函数
impl AttributorError {
    pub fn duplicate_click<T: Into<String>>(msg: T) -> Self {
        AttributorError::DuplicateClick(msg.into())
    }

    pub fn unknown_click<T: Into<String>>(msg: T) -> Self {
        AttributorError::UnknownClick(msg.into())
    }

    pub fn invalid_macro_key<T: Into<String>>(msg: T) -> Self {
        AttributorError::InvalidMacroKey(msg.into())
    }

    pub fn validation<T: Into<String>>(msg: T) -> Self {
        AttributorError::Validation(msg.into())
    }

    pub fn not_found<T: Into<String>>(msg: T) -> Self {
        AttributorError::NotFound(msg.into())
    }

    pub fn configuration<T: Into<String>>(msg: T) -> Self {
        AttributorError::Configuration(msg.into())
    }

    pub fn platform_rejected<T: Into<String>>(msg: T) -> Self {
        AttributorError::PlatformRejected(msg.into())
    }

    pub fn platform_unavailable<T: Into<String>>(msg: T) -> Self {
        AttributorError::PlatformUnavailable(msg.into())
    }

    pub fn database_config<T: Into<String>>(msg: T) -> Self {
        AttributorError::DatabaseConfig(msg.into())
    }

    pub fn database_connection<T: Into<String>>(msg: T) -> Self {
        AttributorError::DatabaseConnection(msg.into())
    }

    pub fn database_operation<T: Into<String>>(msg: T) -> Self {
        AttributorError::DatabaseOperation(msg.into())
    }

    pub fn serialization<T: Into<String>>(msg: T) -> Self {
        AttributorError::Serialization(msg.into())
    }

    pub fn file_operation<T: Into<String>>(msg: T) -> Self {
        AttributorError::FileOperation(msg.into())
    }
}

// 为常见的错误类型实现 From trait
impl From<sea_orm::DbErr> for AttributorError {
    fn from(err: sea_orm::DbErr) -> Self {
        AttributorError::DatabaseOperation(err.to_string())
    }
}

impl From<std::io::Error> for AttributorError {
    fn from(err: std::io::Error) -> Self {
        AttributorError::FileOperation(err.to_string())
    }
}

impl From<serde_json::Error> for AttributorError {
    fn from(err: serde_json::Error) -> Self {
        AttributorError::Serialization(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AttributorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_unique() {
        let all = [
            AttributorError::duplicate_click(""),
            AttributorError::unknown_click(""),
            AttributorError::invalid_macro_key(""),
            AttributorError::validation(""),
            AttributorError::not_found(""),
            AttributorError::configuration(""),
            AttributorError::platform_rejected(""),
            AttributorError::platform_unavailable(""),
            AttributorError::database_config(""),
            AttributorError::database_connection(""),
            AttributorError::database_operation(""),
            AttributorError::serialization(""),
            AttributorError::file_operation(""),
        ];
        let mut codes: Vec<&str> = all.iter().map(|e| e.code()).collect();
        codes.sort();
        codes.dedup();
        assert_eq!(codes.len(), all.len());
    }

    #[test]
    fn test_format_simple() {
        let err = AttributorError::unknown_click("click abc not found");
        assert_eq!(err.format_simple(), "Unknown Click: click abc not found");
        assert_eq!(err.to_string(), err.format_simple());
    }

    #[test]
    fn test_http_status_mapping() {
        assert_eq!(
            AttributorError::duplicate_click("x").http_status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            AttributorError::invalid_macro_key("sub99").http_status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AttributorError::database_operation("boom").http_status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
