pub mod manager;
pub mod mysql;
pub mod queries;
pub mod sqlite;

pub use manager::{DatabaseManager, DatabasePool};

use adaptor_core::AdaptorError;

/// 插入时的唯一约束冲突转换为带名称的 `NameConflict`
pub(crate) fn insert_error(err: sqlx::Error, name: &str) -> AdaptorError {
    match AdaptorError::from(err) {
        AdaptorError::NameConflict(_) => AdaptorError::NameConflict(name.to_string()),
        other => other,
    }
}
