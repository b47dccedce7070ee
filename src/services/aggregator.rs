//! Aggregator service for ordering and totaling cost records

use crate::types::CostRecord;
use std::collections::HashMap;

/// Aggregator for cost records, independent of provider origin
pub struct Aggregator;

impl Aggregator {
    /// Sort records by amount, largest first. Ties keep no particular order.
    pub fn sort_descending(mut records: Vec<CostRecord>) -> Vec<CostRecord> {
        records.sort_by(|a, b| b.amount.total_cmp(&a.amount));
        records
    }

    /// Sum of all amounts (0.0 for no records)
    pub fn total(records: &[CostRecord]) -> f64 {
        records.iter().map(|r| r.amount).sum()
    }

    /// Keep the first `n` records when `0 < n < len`
    pub fn top(mut records: Vec<CostRecord>, n: usize) -> Vec<CostRecord> {
        if n > 0 && n < records.len() {
            records.truncate(n);
        }
        records
    }

    /// Sum records sharing (service, unit), preserving first-seen order
    pub fn merge_by_service(records: Vec<CostRecord>) -> Vec<CostRecord> {
        if records.is_empty() {
            return records;
        }

        let mut index: HashMap<(String, String), usize> = HashMap::new();
        let mut merged: Vec<CostRecord> = Vec::with_capacity(records.len());

        for record in records {
            let key = (record.service.clone(), record.unit.clone());
            match index.get(&key) {
                Some(&i) => merged[i].amount += record.amount,
                None => {
                    index.insert(key, merged.len());
                    merged.push(record);
                }
            }
        }

        merged
    }
}
