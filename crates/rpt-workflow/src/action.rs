//! Action tokens: single-use, expiring links that trigger a workflow
use chrono::{DateTime, Duration, Utc};
use rpt_core::{ReportError, ReportResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionToken {
    pub guid: String,
    /// Code of the workflow run on redemption
    pub workflow: String,
    #[serde(default)]
    pub tag: Option<String>,
    pub expiry: DateTime<Utc>,
    #[serde(default)]
    pub used: bool,
    #[serde(default)]
    pub settings: Map<String, Value>,
    pub created: DateTime<Utc>,
}

impl ActionToken {
    /// Unused token with a fresh v4 guid
    pub fn new(
        workflow: impl Into<String>,
        tag: Option<String>,
        expiry: DateTime<Utc>,
        settings: Map<String, Value>,
    ) -> Self {
        Self {
            guid: uuid::Uuid::new_v4().to_string(),
            workflow: workflow.into(),
            tag,
            expiry,
            used: false,
            settings,
            created: Utc::now(),
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expiry < now
    }

    /// The token as the `Action` map handed to its workflow
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// `from` moved forward by the given offsets; negative offsets move back
pub fn expiry_after(from: DateTime<Utc>, days: i64, hours: i64, minutes: i64, seconds: i64) -> ReportResult<DateTime<Utc>> {
    let out_of_range = || ReportError::Execution("Action expiry is out of range".to_string());
    let total = days
        .checked_mul(86_400)
        .and_then(|d| d.checked_add(hours.checked_mul(3_600)?))
        .and_then(|t| t.checked_add(minutes.checked_mul(60)?))
        .and_then(|t| t.checked_add(seconds))
        .ok_or_else(out_of_range)?;
    let offset = Duration::try_seconds(total).ok_or_else(out_of_range)?;
    from.checked_add_signed(offset).ok_or_else(out_of_range)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_expiry_offsets() {
        let from = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let expiry = expiry_after(from, 1, 2, 3, 4).unwrap();
        assert_eq!(expiry, Utc.with_ymd_and_hms(2024, 3, 2, 14, 3, 4).unwrap());
        assert!(expiry_after(from, i64::MAX, 0, 0, 0).is_err());
    }

    #[test]
    fn test_new_token() {
        let now = Utc::now();
        let token = ActionToken::new("approve", Some("site-1".into()), now, Map::new());
        assert!(!token.used);
        assert_eq!(token.guid.len(), 36);
        assert!(token.is_expired(now + Duration::seconds(1)));
        assert!(!token.is_expired(now));

        let json = token.to_json();
        assert_eq!(json["workflow"], "approve");
        assert_eq!(json["tag"], "site-1");
    }
}
