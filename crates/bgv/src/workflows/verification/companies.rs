use std::collections::BTreeMap;

use serde::Serialize;

use super::domain::{
    CustomerId, OutcomeStatus, RecordId, RecordKind, SubmissionRecord, VerificationStatus,
};

/// Per-company roll-up of document collection records.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompanySummary {
    pub customer_id: CustomerId,
    pub company_name: String,
    pub total: usize,
    pub pending: usize,
    pub approved: usize,
    pub rejected: usize,
    pub completed: usize,
    pub not_initiated: usize,
}

impl CompanySummary {
    fn absorb(&mut self, record: &SubmissionRecord) {
        self.total += 1;
        match record.status {
            OutcomeStatus::Approved => self.approved += 1,
            OutcomeStatus::Rejected => self.rejected += 1,
            _ => self.pending += 1,
        }
        match record.verification_status {
            VerificationStatus::Completed => self.completed += 1,
            VerificationStatus::NotInitiated => self.not_initiated += 1,
            _ => {}
        }
    }
}

/// Group document collection records by customer. `search` matches company names
/// case-insensitively. Output is ordered by company name, then customer id.
pub fn summarize<'a, I>(records: I, search: Option<&str>) -> Vec<CompanySummary>
where
    I: IntoIterator<Item = &'a SubmissionRecord>,
{
    let needle = search
        .map(|value| value.trim().to_lowercase())
        .filter(|value| !value.is_empty());

    let mut grouped: BTreeMap<CustomerId, CompanySummary> = BTreeMap::new();
    for record in records {
        if record.kind != RecordKind::DocumentCollection {
            continue;
        }
        if let Some(needle) = &needle {
            if !record.company_name.to_lowercase().contains(needle.as_str()) {
                continue;
            }
        }

        grouped
            .entry(record.customer_id.clone())
            .or_insert_with(|| CompanySummary {
                customer_id: record.customer_id.clone(),
                company_name: record.company_name.clone(),
                ..CompanySummary::default()
            })
            .absorb(record);
    }

    let mut summaries: Vec<CompanySummary> = grouped.into_values().collect();
    summaries.sort_by(|a, b| {
        a.company_name
            .to_lowercase()
            .cmp(&b.company_name.to_lowercase())
            .then_with(|| a.customer_id.cmp(&b.customer_id))
    });
    summaries
}

/// Records a bulk "send all unsent links" run should issue tokens for.
pub fn unsent<'a, I>(records: I) -> Vec<&'a SubmissionRecord>
where
    I: IntoIterator<Item = &'a SubmissionRecord>,
{
    records
        .into_iter()
        .filter(|record| {
            record.kind == RecordKind::DocumentCollection
                && record.verification_status == VerificationStatus::NotInitiated
        })
        .collect()
}

/// Per-record failure inside a bulk run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkSendFailure {
    pub record_id: RecordId,
    pub code: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkSendReport {
    pub sent_count: usize,
    pub failed_count: usize,
    pub errors: Vec<BulkSendFailure>,
}

impl BulkSendReport {
    pub fn record_success(&mut self) {
        self.sent_count += 1;
    }

    pub fn record_failure(&mut self, record_id: RecordId, code: &str, reason: impl Into<String>) {
        self.failed_count += 1;
        self.errors.push(BulkSendFailure {
            record_id,
            code: code.to_string(),
            reason: reason.into(),
        });
    }
}
