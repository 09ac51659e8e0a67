pub mod note;
pub mod tenant;
pub mod user;

pub use note::{NewNote, Note, NoteChanges, NOTE_COLUMNS};
pub use tenant::{NewTenant, Tenant};
pub use user::{NewAdmin, NewUser, User, USER_COLUMNS};

use std::str::FromStr;

use sqlx::{postgres::PgRow, Row};

/// Text columns holding closed variant sets (role, plan)
fn decode_enum<T>(row: &PgRow, column: &str) -> Result<T, sqlx::Error>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: String = row.try_get(column)?;
    raw.parse::<T>().map_err(|e| sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: Box::new(e),
    })
}
