//! Reputation aggregation over a member's received entries.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::db::models::ReputationKind;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct KindCounts {
    pub positive: i64,
    pub neutral: i64,
    pub negative: i64,
}

impl KindCounts {
    fn add(&mut self, kind: ReputationKind) {
        match kind {
            ReputationKind::Positive => self.positive += 1,
            ReputationKind::Neutral => self.neutral += 1,
            ReputationKind::Negative => self.negative += 1,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReputationSummary {
    /// Positive minus negative, all time.
    pub score: i64,
    pub all_time: KindCounts,
    pub last_7_days: KindCounts,
    pub last_30_days: KindCounts,
    pub last_180_days: KindCounts,
}

impl ReputationSummary {
    pub fn compute<I>(entries: I, now: DateTime<Utc>) -> Self
    where
        I: IntoIterator<Item = (ReputationKind, DateTime<Utc>)>,
    {
        let week = now - Duration::days(7);
        let month = now - Duration::days(30);
        let half_year = now - Duration::days(180);

        let mut summary = Self::default();
        for (kind, at) in entries {
            summary.all_time.add(kind);
            if at > half_year {
                summary.last_180_days.add(kind);
            }
            if at > month {
                summary.last_30_days.add(kind);
            }
            if at > week {
                summary.last_7_days.add(kind);
            }
        }
        summary.score = summary.all_time.positive - summary.all_time.negative;
        summary
    }
}
