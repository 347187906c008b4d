//! Detection statements for long running queries and transactions.
//!
//! Thresholds and the schema filter come from trusted configuration and are
//! rendered straight into the statement text once, when a monitor is built.

use std::time::Duration;

use super::SniperError;

/// Long running query hunter. Joins the processlist to the current statement
/// events so the digest (literal-free) text is available for logging.
const LONG_QUERY_TEMPLATE: &str = "
    SELECT pl.id, pl.user, pl.db as current_schema, pl.command, pl.time, es.digest_text
    FROM performance_schema.processlist pl
    INNER JOIN performance_schema.threads t ON t.processlist_id = pl.id
    INNER JOIN performance_schema.events_statements_current es ON es.thread_id = t.thread_id
    WHERE pl.command NOT IN ('sleep', 'killed')
    AND pl.info NOT LIKE '%processlist%'
        {{query_time_limit}}
        {{db_filter}}
    ORDER BY pl.time DESC";

/// Long running transaction hunter.
const LONG_TRANSACTION_TEMPLATE: &str = "
    SELECT trx.trx_id, pl.id as process_id, trx.trx_state, TIMESTAMPDIFF(SECOND, trx.trx_started, NOW()) AS time, pl.user, pl.db as current_schema, es.digest_text
    FROM INFORMATION_SCHEMA.INNODB_TRX trx
    INNER JOIN performance_schema.processlist pl ON trx.trx_mysql_thread_id = pl.id
    INNER JOIN performance_schema.threads t ON t.processlist_id = pl.id
    INNER JOIN performance_schema.events_statements_current es ON es.thread_id = t.thread_id
    WHERE TIMESTAMPDIFF(SECOND, trx.trx_started, NOW()) >= {{txn_time_limit}}
        {{db_filter}}
    ORDER BY time DESC";

/// The pair of compiled detection statements owned by one monitor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HunterQueries {
    pub long_query: String,
    pub long_transaction: String,
}

impl HunterQueries {
    pub fn build(
        query_limit: Duration,
        transaction_limit: Duration,
        schema: &str,
    ) -> Result<Self, SniperError> {
        let query_time_limit = format!("AND pl.time >= {}", query_limit.as_secs());
        let txn_time_limit = transaction_limit.as_secs().to_string();
        let db_filter = if schema.is_empty() {
            String::new()
        } else {
            format!("AND pl.db IN ('{schema}')")
        };

        let long_query = render(
            LONG_QUERY_TEMPLATE,
            &[
                ("query_time_limit", query_time_limit.as_str()),
                ("db_filter", db_filter.as_str()),
            ],
        )?;
        let long_transaction = render(
            LONG_TRANSACTION_TEMPLATE,
            &[
                ("txn_time_limit", txn_time_limit.as_str()),
                ("db_filter", db_filter.as_str()),
            ],
        )?;

        Ok(Self {
            long_query: normalize_whitespace(&long_query),
            long_transaction: normalize_whitespace(&long_transaction),
        })
    }
}

/// Collapse every run of whitespace (newlines and tabs included) to a single space.
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn render(template: &str, params: &[(&str, &str)]) -> Result<String, SniperError> {
    let mut out = template.to_string();
    for (key, value) in params {
        let placeholder = format!("{{{{{key}}}}}");
        if !out.contains(&placeholder) {
            return Err(SniperError::QueryTemplate(format!(
                "placeholder {placeholder} not found in template"
            )));
        }
        out = out.replace(&placeholder, value);
    }

    if let Some(start) = out.find("{{") {
        let rest = &out[start..];
        let end = rest.find("}}").map_or(rest.len(), |i| i + 2);
        return Err(SniperError::QueryTemplate(format!(
            "unresolved placeholder {}",
            &rest[..end]
        )));
    }

    Ok(out)
}
