//! Aggregate statistics over the store

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::engine::xml::Element;

/// Fixed gender buckets. Values other than `male`/`female` are silently
/// ignored — a known narrowing of the aggregation, kept for compatibility
/// with the statistics contract consumers already depend on.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenderBreakdown {
    pub male: u64,
    pub female: u64,
}

/// Summary computed in a single pass over all field nodes. Each metric is
/// independent: a record missing a field simply contributes nothing to
/// that field's metric.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Statistics {
    pub total_records: u64,
    pub diagnosis_breakdown: BTreeMap<String, u64>,
    pub gender_breakdown: GenderBreakdown,
    pub services_breakdown: BTreeMap<String, u64>,
    pub avg_waiting_time: f64,
}

impl Statistics {
    /// Aggregate over every record node in the tree.
    pub fn collect(root: &Element) -> Self {
        let mut stats = Statistics::default();
        let mut waiting_total = 0f64;
        let mut waiting_count = 0u64;

        for record in root.descendants_named("record") {
            stats.total_records += 1;

            for field in record.children_named("field") {
                let value = field.text.as_str();
                match field.attr("name") {
                    Some("primary-diagnosis") => {
                        *stats
                            .diagnosis_breakdown
                            .entry(value.to_string())
                            .or_insert(0) += 1;
                    }
                    Some("gender") => match value {
                        "male" => stats.gender_breakdown.male += 1,
                        "female" => stats.gender_breakdown.female += 1,
                        _ => {}
                    },
                    Some("services") => {
                        *stats
                            .services_breakdown
                            .entry(value.to_string())
                            .or_insert(0) += 1;
                    }
                    Some("waiting-days") => {
                        if !value.is_empty() {
                            if let Ok(days) = value.trim().parse::<f64>() {
                                if days.is_finite() {
                                    waiting_total += days;
                                    waiting_count += 1;
                                }
                            }
                        }
                    }
                    _ => {}
                }
            }
        }

        if waiting_count > 0 {
            let avg = waiting_total / waiting_count as f64;
            stats.avg_waiting_time = (avg * 10.0).round() / 10.0;
        }

        stats
    }
}
