//! Database error mapping.

#[derive(Debug, Clone, thiserror::Error)]
pub enum DatabaseError {
    #[error("connection pool exhausted")]
    PoolExhausted,

    #[error("{entity} with id '{id}' not found")]
    NotFound { entity: &'static str, id: String },

    #[error("duplicate value violates a unique constraint: {message}")]
    UniqueViolation { message: String },

    #[error("referenced row does not exist: {message}")]
    ForeignKeyViolation { message: String },

    #[error("query failed: {message}")]
    Query { message: String },

    #[error("transaction failed: {message}")]
    Transaction { message: String },

    #[error("connection error: {message}")]
    Connection { message: String },

    #[error("database configuration error: {message}")]
    Config { message: String },

    #[error("unknown database error: {message}")]
    Unknown { message: String },
}

impl DatabaseError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        DatabaseError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Map an SQLx error to our custom error type.
    pub fn from_sqlx(error: sqlx::Error) -> Self {
        match error {
            sqlx::Error::RowNotFound => DatabaseError::not_found("Record", "unknown"),
            sqlx::Error::PoolTimedOut => DatabaseError::PoolExhausted,
            sqlx::Error::PoolClosed => DatabaseError::Connection {
                message: "connection pool is closed".to_string(),
            },
            sqlx::Error::Configuration(msg) => DatabaseError::Config {
                message: msg.to_string(),
            },
            sqlx::Error::Database(db_err) => match db_err.code().as_deref() {
                // Postgres constraint violation codes
                Some("23505") => DatabaseError::UniqueViolation {
                    message: db_err.message().to_string(),
                },
                Some("23503") => DatabaseError::ForeignKeyViolation {
                    message: db_err.message().to_string(),
                },
                _ => DatabaseError::Query {
                    message: db_err.message().to_string(),
                },
            },
            sqlx::Error::Io(io_err) => DatabaseError::Connection {
                message: io_err.to_string(),
            },
            _ => DatabaseError::Unknown {
                message: error.to_string(),
            },
        }
    }
}
