//! 데이터 모듈 오류 타입.
//!
//! 재시도 여부는 에러 메시지가 아니라 variant와 SQLSTATE 코드로 판단합니다.

use thiserror::Error;

/// PostgreSQL serialization_failure
const SQLSTATE_SERIALIZATION_FAILURE: &str = "40001";
/// PostgreSQL deadlock_detected
const SQLSTATE_DEADLOCK_DETECTED: &str = "40P01";
/// PostgreSQL unique_violation
const SQLSTATE_UNIQUE_VIOLATION: &str = "23505";

/// 데이터 관련 오류.
#[derive(Debug, Error)]
pub enum DataError {
    /// 데이터베이스 연결 오류
    #[error("Database connection error: {0}")]
    ConnectionError(String),

    /// 쿼리 실행 오류
    #[error("Query error: {0}")]
    QueryError(String),

    /// 중복 레코드
    #[error("Duplicate record: {0}")]
    DuplicateError(String),

    /// 동시 쓰기 충돌 (직렬화 실패, 교착 상태)
    #[error("Write conflict: {0}")]
    WriteConflict(String),

    /// 연결 풀 소진
    #[error("Connection pool exhausted")]
    PoolExhausted,

    /// 직렬화/역직렬화 오류
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// 스냅샷 캐시 오류
    #[error("Cache error: {0}")]
    CacheError(String),

    /// 설정 오류
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// 마이그레이션 오류
    #[error("Migration error: {0}")]
    MigrationError(String),

    /// 요청 한도 초과 (HTTP 429)
    #[error("Rate limit exceeded: {0}")]
    RateLimited(String),

    /// 일시적 제공자/네트워크 오류 (타임아웃, 5xx)
    #[error("Transient fetch error: {0}")]
    Transient(String),

    /// 권한 없음 (HTTP 401/403)
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// 그 외 HTTP 오류
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    /// 데이터 가져오기 오류 (재시도 소진 등)
    #[error("Fetch error: {0}")]
    FetchError(String),

    /// 잘못된 데이터 형식
    #[error("Invalid data: {0}")]
    InvalidData(String),
}

/// 재시도 가능한 오류의 종류.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryKind {
    /// 같은 구간을 커서 이동 없이 재요청
    RateLimit,
    /// 지수 백오프 후 재요청
    Transient,
    /// 쓰기 트랜잭션 전체를 처음부터 재실행
    WriteConflict,
}

impl DataError {
    /// 재시도 가능한 오류라면 그 종류를, 치명적 오류라면 `None`을 반환합니다.
    pub fn retry_kind(&self) -> Option<RetryKind> {
        match self {
            DataError::RateLimited(_) => Some(RetryKind::RateLimit),
            DataError::Transient(_) | DataError::PoolExhausted => Some(RetryKind::Transient),
            DataError::WriteConflict(_) => Some(RetryKind::WriteConflict),
            _ => None,
        }
    }

    /// 재시도 가능한 오류인지 확인.
    pub fn is_retryable(&self) -> bool {
        self.retry_kind().is_some()
    }

    /// 인증/권한 오류인지 확인.
    pub fn is_forbidden(&self) -> bool {
        matches!(self, DataError::Forbidden(_))
    }

    /// HTTP 상태 코드를 분류합니다. 성공 코드는 `None`.
    pub fn from_status(status: u16, message: impl Into<String>) -> Option<Self> {
        let message = message.into();
        match status {
            200..=299 => None,
            429 => Some(DataError::RateLimited(message)),
            500 | 502 | 503 | 504 => Some(DataError::Transient(format!("HTTP {}: {}", status, message))),
            401 | 403 => Some(DataError::Forbidden(message)),
            _ => Some(DataError::Http { status, message }),
        }
    }
}

impl From<sqlx::Error> for DataError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut => DataError::PoolExhausted,
            sqlx::Error::Io(e) => DataError::ConnectionError(e.to_string()),
            sqlx::Error::Database(db_err) => {
                let code = db_err.code().unwrap_or_default();
                match code.as_ref() {
                    SQLSTATE_SERIALIZATION_FAILURE | SQLSTATE_DEADLOCK_DETECTED => {
                        DataError::WriteConflict(db_err.message().to_string())
                    }
                    SQLSTATE_UNIQUE_VIOLATION => {
                        DataError::DuplicateError(db_err.message().to_string())
                    }
                    _ => DataError::QueryError(db_err.message().to_string()),
                }
            }
            _ => DataError::QueryError(err.to_string()),
        }
    }
}

impl From<reqwest::Error> for DataError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() || err.is_request() {
            DataError::Transient(err.to_string())
        } else if let Some(status) = err.status() {
            DataError::from_status(status.as_u16(), err.to_string())
                .unwrap_or_else(|| DataError::FetchError(err.to_string()))
        } else {
            DataError::FetchError(err.to_string())
        }
    }
}

impl From<serde_json::Error> for DataError {
    fn from(err: serde_json::Error) -> Self {
        DataError::SerializationError(err.to_string())
    }
}

impl From<std::io::Error> for DataError {
    fn from(err: std::io::Error) -> Self {
        DataError::CacheError(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, DataError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert!(DataError::from_status(200, "").is_none());
        assert_eq!(
            DataError::from_status(429, "slow down").unwrap().retry_kind(),
            Some(RetryKind::RateLimit)
        );
        for status in [500, 502, 503, 504] {
            assert_eq!(
                DataError::from_status(status, "").unwrap().retry_kind(),
                Some(RetryKind::Transient)
            );
        }
        let forbidden = DataError::from_status(403, "plan").unwrap();
        assert!(forbidden.is_forbidden());
        assert!(!forbidden.is_retryable());

        let not_found = DataError::from_status(404, "missing").unwrap();
        assert!(matches!(not_found, DataError::Http { status: 404, .. }));
        assert!(!not_found.is_retryable());
    }

    #[test]
    fn test_write_conflict_is_retryable() {
        let err = DataError::WriteConflict("deadlock detected".to_string());
        assert_eq!(err.retry_kind(), Some(RetryKind::WriteConflict));

        let err = DataError::QueryError("syntax error".to_string());
        assert_eq!(err.retry_kind(), None);
    }
}
