//! Filters change events and flattens them into fixed-shape records.

use serde_json::Value;
use tracing::{debug, warn};

use crate::formats::decimal;
use crate::formats::envelope::{CdcEnvelope, RowSnapshot};

pub const ID_FIELD: &str = "id";
pub const NAME_FIELD: &str = "name";
pub const DESCRIPTION_FIELD: &str = "description";
pub const PRICE_FIELD: &str = "price";

/// One staged row. `id` is always present; rows without one never become records.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedRecord {
    pub id: i64,
    pub name: Option<String>,
    pub description: Option<String>,
    pub price: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Snapshot reads and unsupported operations. Expected, never logged.
    Noise,
    /// The row image selected by the operation is absent.
    MissingSnapshot,
    MissingIdentifier,
    /// The identifier is present but is not a 64-bit integer.
    InvalidIdentifier,
}

impl SkipReason {
    /// Whether the skip is a data-quality problem that was reported as a diagnostic.
    pub fn is_diagnostic(self) -> bool {
        matches!(
            self,
            SkipReason::MissingIdentifier | SkipReason::InvalidIdentifier
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Normalized {
    Record(NormalizedRecord),
    Skip(SkipReason),
}

impl Normalized {
    pub fn into_record(self) -> Option<NormalizedRecord> {
        match self {
            Normalized::Record(record) => Some(record),
            Normalized::Skip(_) => None,
        }
    }
}

/// Per-batch tally of what the normalizer did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NormalizeReport {
    pub envelopes: usize,
    pub records: usize,
    pub noise: usize,
    pub missing_snapshots: usize,
    pub diagnostics: usize,
    pub price_decode_failures: usize,
}

impl NormalizeReport {
    pub fn skipped(&self) -> usize {
        self.envelopes - self.records
    }

    fn record_skip(&mut self, reason: SkipReason) {
        match reason {
            SkipReason::Noise => self.noise += 1,
            SkipReason::MissingSnapshot => self.missing_snapshots += 1,
            SkipReason::MissingIdentifier | SkipReason::InvalidIdentifier => {
                self.diagnostics += 1
            }
        }
    }
}

pub fn normalize(envelope: &CdcEnvelope) -> Normalized {
    normalize_with(envelope, &mut NormalizeReport::default())
}

/// Normalizes every envelope in order. Skips never abort the batch.
pub fn normalize_batch<'a, I>(envelopes: I) -> (Vec<NormalizedRecord>, NormalizeReport)
where
    I: IntoIterator<Item = &'a CdcEnvelope>,
{
    let mut report = NormalizeReport::default();
    let records = envelopes
        .into_iter()
        .filter_map(|envelope| normalize_with(envelope, &mut report).into_record())
        .collect();
    (records, report)
}

fn normalize_with(envelope: &CdcEnvelope, report: &mut NormalizeReport) -> Normalized {
    report.envelopes += 1;
    let outcome = match select_row(envelope) {
        Ok(row) => match extract_record(row, report) {
            Ok(record) => Normalized::Record(record),
            Err(reason) => Normalized::Skip(reason),
        },
        Err(reason) => Normalized::Skip(reason),
    };
    match &outcome {
        Normalized::Record(_) => report.records += 1,
        Normalized::Skip(reason) => report.record_skip(*reason),
    }
    outcome
}

fn select_row(envelope: &CdcEnvelope) -> Result<&RowSnapshot, SkipReason> {
    if !envelope.operation.is_row_change() {
        return Err(SkipReason::Noise);
    }
    match envelope.snapshot() {
        Some(row) if !row.is_empty() => Ok(row),
        _ => {
            debug!(operation = ?envelope.operation, "skipping envelope without a row image");
            Err(SkipReason::MissingSnapshot)
        }
    }
}

fn extract_record(
    row: &RowSnapshot,
    report: &mut NormalizeReport,
) -> Result<NormalizedRecord, SkipReason> {
    let id = match row.get(ID_FIELD) {
        None | Some(Value::Null) => {
            warn!(?row, "Skipped row with null id");
            return Err(SkipReason::MissingIdentifier);
        }
        Some(value) => value.as_i64().ok_or_else(|| {
            warn!(?row, "Skipped row with non-integer id");
            SkipReason::InvalidIdentifier
        })?,
    };

    let token = row.get(PRICE_FIELD);
    let price = decimal::decode_or_null(token);
    if price.is_none() && !matches!(token, None | Some(Value::Null)) {
        report.price_decode_failures += 1;
    }
    let price = price.as_ref().and_then(decimal::to_f64);

    Ok(NormalizedRecord {
        id,
        name: text_field(row, NAME_FIELD),
        description: text_field(row, DESCRIPTION_FIELD),
        price,
    })
}

/// Strings pass through untouched. Other non-null scalars keep their JSON text.
fn text_field(row: &RowSnapshot, field: &str) -> Option<String> {
    match row.get(field)? {
        Value::Null => None,
        Value::String(text) => Some(text.clone()),
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formats::decimal::encode;
    use crate::formats::envelope::Operation;
    use rust_decimal::Decimal;
    use serde_json::json;
    use std::str::FromStr;

    fn envelope(value: Value) -> CdcEnvelope {
        CdcEnvelope::from_value(value).unwrap()
    }

    fn price(text: &str) -> String {
        encode(&Decimal::from_str(text).unwrap())
    }

    #[test]
    fn test_create_produces_record() {
        let result = normalize(&envelope(json!({
            "op": "c",
            "before": null,
            "after": {"id": 1, "name": "Widget", "description": "A widget", "price": price("19.99")}
        })));
        assert_eq!(
            result,
            Normalized::Record(NormalizedRecord {
                id: 1,
                name: Some("Widget".to_string()),
                description: Some("A widget".to_string()),
                price: Some(19.99),
            })
        );
    }

    #[test]
    fn test_update_uses_after() {
        let result = normalize(&envelope(json!({
            "op": "u",
            "before": {"id": 1, "name": "Old"},
            "after": {"id": 1, "name": "New"}
        })));
        let record = result.into_record().unwrap();
        assert_eq!(record.name.as_deref(), Some("New"));
    }

    #[test]
    fn test_delete_uses_before() {
        let result = normalize(&envelope(json!({
            "op": "d",
            "before": {"id": 2, "name": "Gadget", "description": null, "price": price("5")},
            "after": null
        })));
        assert_eq!(
            result,
            Normalized::Record(NormalizedRecord {
                id: 2,
                name: Some("Gadget".to_string()),
                description: None,
                price: Some(5.0),
            })
        );
    }

    #[test]
    fn test_delete_ignores_after() {
        let result = normalize(&envelope(json!({
            "op": "d",
            "before": null,
            "after": {"id": 3}
        })));
        assert_eq!(result, Normalized::Skip(SkipReason::MissingSnapshot));
    }

    #[test]
    fn test_empty_row_image_is_missing_snapshot() {
        let (records, report) =
            normalize_batch([&envelope(json!({"op": "u", "before": null, "after": {}}))]);
        assert!(records.is_empty());
        assert_eq!(report.missing_snapshots, 1);
        assert_eq!(report.diagnostics, 0);
    }

    #[test]
    fn test_snapshot_reads_are_noise() {
        let read = envelope(json!({"op": "r", "after": {"id": 1, "name": "Widget"}}));
        assert_eq!(normalize(&read), Normalized::Skip(SkipReason::Noise));

        let (records, report) = normalize_batch([&read]);
        assert!(records.is_empty());
        assert_eq!(report.noise, 1);
        assert_eq!(report.diagnostics, 0);
    }

    #[test]
    fn test_unsupported_operation_is_noise() {
        let truncate = CdcEnvelope::new(Operation::Unsupported, None, None);
        assert_eq!(normalize(&truncate), Normalized::Skip(SkipReason::Noise));
    }

    #[test]
    fn test_null_or_missing_id_is_diagnostic() {
        for after in [
            json!({"id": null, "name": "Widget"}),
            json!({"name": "Widget"}),
        ] {
            let (records, report) =
                normalize_batch([&envelope(json!({"op": "c", "after": after}))]);
            assert!(records.is_empty());
            assert_eq!(report.diagnostics, 1);
            assert_eq!(report.noise, 0);
        }
    }

    #[test]
    fn test_non_integer_id_is_diagnostic() {
        let result = normalize(&envelope(json!({"op": "c", "after": {"id": "seven"}})));
        assert_eq!(result, Normalized::Skip(SkipReason::InvalidIdentifier));
        assert!(SkipReason::InvalidIdentifier.is_diagnostic());
        assert!(!SkipReason::Noise.is_diagnostic());
    }

    #[test]
    fn test_bad_price_keeps_row() {
        let (records, report) = normalize_batch([&envelope(json!({
            "op": "c",
            "after": {"id": 4, "name": "Thing", "price": "@@@"}
        }))]);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, 4);
        assert_eq!(records[0].price, None);
        assert_eq!(report.price_decode_failures, 1);
        assert_eq!(report.diagnostics, 0);
    }

    #[test]
    fn test_missing_optional_fields() {
        let record = normalize(&envelope(json!({"op": "c", "after": {"id": 5}})))
            .into_record()
            .unwrap();
        assert_eq!(
            record,
            NormalizedRecord {
                id: 5,
                name: None,
                description: None,
                price: None,
            }
        );
    }

    #[test]
    fn test_strings_pass_through_unmodified() {
        let record = normalize(&envelope(json!({
            "op": "c",
            "after": {"id": 6, "name": "  padded  ", "description": ""}
        })))
        .into_record()
        .unwrap();
        assert_eq!(record.name.as_deref(), Some("  padded  "));
        assert_eq!(record.description.as_deref(), Some(""));
    }

    #[test]
    fn test_batch_preserves_order_and_counts() {
        let envelopes = vec![
            envelope(json!({"op": "c", "after": {"id": 1}})),
            envelope(json!({"op": "r", "after": {"id": 2}})),
            envelope(json!({"op": "u", "after": {"id": null}})),
            envelope(json!({"op": "d", "before": {"id": 3}})),
            envelope(json!({"op": "c", "after": null})),
            envelope(json!({"op": "u", "after": {"id": 4}})),
        ];
        let (records, report) = normalize_batch(&envelopes);
        let ids: Vec<i64> = records.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![1, 3, 4]);
        assert_eq!(
            report,
            NormalizeReport {
                envelopes: 6,
                records: 3,
                noise: 1,
                missing_snapshots: 1,
                diagnostics: 1,
                price_decode_failures: 0,
            }
        );
        assert_eq!(report.skipped(), 3);
    }
}
