// errors.rs
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Некорректные входные данные: {0}")]
    Validation(String),

    #[error("Ошибка сети: {0}")]
    Network(String),

    #[error("Превышено время ожидания ответа: {0}")]
    Timeout(String),

    #[error("Ошибка авторизации: {0}")]
    Auth(String),

    #[error("Доступ запрещён: {0}")]
    Forbidden(String),

    #[error("Не найдено: {0}")]
    NotFound(String),

    #[error("Ошибка сервера {status}: {message}")]
    Server { status: u16, message: String },

    #[error("API вернул ошибку {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Операция уже выполняется: {0}")]
    Busy(String),

    #[error("Ошибка парсинга JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Ошибка записи CSV: {0}")]
    CsvError(#[from] csv::Error),

    #[error("Ошибка ввода-вывода: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Ошибка конфигурации: {0}")]
    ConfigError(#[from] config::ConfigError),

    #[error("Ошибка regex: {0}")]
    RegexError(#[from] regex::Error),

    #[error("Неизвестная ошибка: {0}")]
    Unknown(String),
}

/// Категория ошибки, по которой выбирается сообщение для пользователя.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Validation,
    Network,
    Timeout,
    Auth,
    Forbidden,
    NotFound,
    Server,
    Busy,
    Unknown,
}

impl ClientError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            ClientError::Validation(_) => ErrorCategory::Validation,
            ClientError::Network(_) => ErrorCategory::Network,
            ClientError::Timeout(_) => ErrorCategory::Timeout,
            ClientError::Auth(_) => ErrorCategory::Auth,
            ClientError::Forbidden(_) => ErrorCategory::Forbidden,
            ClientError::NotFound(_) => ErrorCategory::NotFound,
            ClientError::Server { .. } => ErrorCategory::Server,
            ClientError::Busy(_) => ErrorCategory::Busy,
            ClientError::Api { .. }
            | ClientError::JsonError(_)
            | ClientError::CsvError(_)
            | ClientError::IoError(_)
            | ClientError::ConfigError(_)
            | ClientError::RegexError(_)
            | ClientError::Unknown(_) => ErrorCategory::Unknown,
        }
    }

    /// Сообщение для показа пользователю, своё для каждой категории.
    pub fn user_message(&self) -> String {
        match self {
            ClientError::Validation(msg) => msg.clone(),
            ClientError::Auth(msg) => msg.clone(),
            _ => self.category().user_message().to_string(),
        }
    }

    /// Сетевые ошибки, таймауты и 5xx можно повторить.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::Network | ErrorCategory::Timeout | ErrorCategory::Server
        )
    }

    /// Построение ошибки по HTTP статусу ответа бэкенда.
    pub fn from_status(status: u16, message: String) -> Self {
        match status {
            400 | 422 => ClientError::Validation(message),
            401 => ClientError::Auth(message),
            403 => ClientError::Forbidden(message),
            404 => ClientError::NotFound(message),
            500..=599 => ClientError::Server { status, message },
            _ => ClientError::Api { status, message },
        }
    }
}

impl ErrorCategory {
    pub fn user_message(&self) -> &'static str {
        match self {
            ErrorCategory::Validation => "Please check your input and try again.",
            ErrorCategory::Network => "Network error. Please check your connection and try again.",
            ErrorCategory::Timeout => {
                "The request is taking longer than expected. Please try again in a moment."
            }
            ErrorCategory::Auth => "Your session has ended. Please sign in again.",
            ErrorCategory::Forbidden => "Access denied. Please check your permissions and try again.",
            ErrorCategory::NotFound => {
                "No analysis data found for the selected products. Please run analyses first."
            }
            ErrorCategory::Server => "Server error occurred. Please try again in a few moments.",
            ErrorCategory::Busy => "This action is already in progress.",
            ErrorCategory::Unknown => "Something went wrong. Please try again.",
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ClientError::Timeout(err.to_string())
        } else if let Some(status) = err.status() {
            ClientError::from_status(status.as_u16(), err.to_string())
        } else if err.is_connect() || err.is_request() {
            ClientError::Network(err.to_string())
        } else if err.is_decode() || err.is_body() {
            ClientError::Unknown(err.to_string())
        } else {
            ClientError::Network(err.to_string())
        }
    }
}

// Определяем псевдоним Result с фиксированным типом ошибки
pub type Result<T> = std::result::Result<T, ClientError>;
