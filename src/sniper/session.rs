use async_trait::async_trait;
use sqlx::mysql::MySqlRow;
use sqlx::Row;

use super::SniperError;

/// A processlist row returned by the long running query hunter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QuerySession {
    pub id: i64,
    pub user: Option<String>,
    pub schema: Option<String>,
    pub command: String,
    /// Seconds the current command has been running.
    pub time: i64,
    /// Digested statement text with literals stripped.
    pub digest_text: Option<String>,
}

/// An open InnoDB transaction returned by the long running transaction hunter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransactionSession {
    pub trx_id: i64,
    /// Processlist id of the thread holding the transaction; this is what gets killed.
    pub process_id: i64,
    pub state: Option<String>,
    pub time: i64,
    pub user: Option<String>,
    pub schema: Option<String>,
    pub digest_text: Option<String>,
}

impl QuerySession {
    /// Columns: id, user, current_schema, command, time, digest_text.
    pub fn from_row(row: &MySqlRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: get_int(row, 0)?,
            user: row.try_get(1)?,
            schema: row.try_get(2)?,
            command: row.try_get(3)?,
            time: get_int(row, 4)?,
            digest_text: row.try_get(5)?,
        })
    }
}

impl TransactionSession {
    /// Columns: trx_id, process_id, trx_state, time, user, current_schema, digest_text.
    pub fn from_row(row: &MySqlRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            trx_id: get_int(row, 0)?,
            process_id: get_int(row, 1)?,
            state: row.try_get(2)?,
            time: get_int(row, 3)?,
            user: row.try_get(4)?,
            schema: row.try_get(5)?,
            digest_text: row.try_get(6)?,
        })
    }
}

/// Integer columns differ in signedness across server versions (and `trx_id`
/// is a VARCHAR on 5.7), so accept signed, unsigned or numeric text.
fn get_int(row: &MySqlRow, index: usize) -> Result<i64, sqlx::Error> {
    decode_int(
        index,
        || row.try_get::<i64, _>(index),
        || row.try_get::<u64, _>(index),
        || row.try_get::<String, _>(index),
    )
}

fn decode_int(
    index: usize,
    signed: impl FnOnce() -> Result<i64, sqlx::Error>,
    unsigned: impl FnOnce() -> Result<u64, sqlx::Error>,
    text: impl FnOnce() -> Result<String, sqlx::Error>,
) -> Result<i64, sqlx::Error> {
    if let Ok(v) = signed() {
        return Ok(v);
    }
    if let Ok(v) = unsigned() {
        return i64::try_from(v).map_err(|e| sqlx::Error::ColumnDecode {
            index: index.to_string(),
            source: Box::new(e),
        });
    }
    let raw = text()?;
    raw.trim()
        .parse::<i64>()
        .map_err(|e| sqlx::Error::ColumnDecode {
            index: index.to_string(),
            source: Box::new(e),
        })
}

/// Where sessions are found and killed. One implementation talks to MySQL;
/// tests substitute an in-memory one.
#[async_trait]
pub trait SessionSource: Send + Sync {
    async fn long_running_queries(&self, sql: &str) -> Result<Vec<QuerySession>, SniperError>;

    async fn long_running_transactions(
        &self,
        sql: &str,
    ) -> Result<Vec<TransactionSession>, SniperError>;

    /// Terminate the thread with the given processlist id.
    async fn kill(&self, id: i64) -> Result<(), SniperError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mismatch<T>() -> Result<T, sqlx::Error> {
        Err(sqlx::Error::ColumnNotFound("0".to_string()))
    }

    #[test]
    fn signed_value_is_used_first() {
        let v = decode_int(0, || Ok(-3), || Ok(9), || Ok("12".to_string()));
        assert_eq!(v.expect("int"), -3);
    }

    #[test]
    fn unsigned_value_is_used_when_signed_fails() {
        let v = decode_int(1, mismatch, || Ok(4_242), mismatch);
        assert_eq!(v.expect("int"), 4_242);
    }

    #[test]
    fn unsigned_overflow_is_decode_error() {
        let v = decode_int(1, mismatch, || Ok(u64::MAX), mismatch);
        assert!(matches!(v, Err(sqlx::Error::ColumnDecode { index, .. }) if index == "1"));
    }

    #[test]
    fn numeric_text_is_parsed() {
        let v = decode_int(0, mismatch, mismatch, || Ok(" 281479271677960 ".to_string()));
        assert_eq!(v.expect("int"), 281_479_271_677_960);
    }

    #[test]
    fn non_numeric_text_is_decode_error() {
        let v = decode_int(2, mismatch, mismatch, || Ok("abc".to_string()));
        assert!(matches!(v, Err(sqlx::Error::ColumnDecode { .. })));
    }

    #[test]
    fn text_fetch_error_is_passed_through() {
        let v = decode_int(3, mismatch, mismatch, mismatch);
        assert!(matches!(v, Err(sqlx::Error::ColumnNotFound(_))));
    }
}
