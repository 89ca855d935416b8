//! Action redemption
use chrono::{DateTime, Utc};
use rpt_core::{ReportError, ReportResult, WorkflowResult};
use std::sync::Arc;

use crate::catalog::WorkflowCatalog;
use crate::store::ActionStore;

/// Turns an action guid into a workflow run, at most once per token
#[derive(Debug, Clone)]
pub struct ActionRedeemer {
    catalog: Arc<WorkflowCatalog>,
}

impl ActionRedeemer {
    pub fn new(catalog: Arc<WorkflowCatalog>) -> Self {
        Self { catalog }
    }

    fn store(&self) -> &Arc<dyn ActionStore> {
        self.catalog.executor().actions()
    }

    pub fn redeem(&self, guid: &str) -> ReportResult<WorkflowResult> {
        self.redeem_at(guid, Utc::now())
    }

    /// Claims the token before looking at its expiry, so an expired token
    /// is spent by the attempt too.
    pub fn redeem_at(&self, guid: &str, now: DateTime<Utc>) -> ReportResult<WorkflowResult> {
        let guid = guid.trim();
        if guid.is_empty() {
            tracing::warn!("blank action guid");
            return Err(ReportError::InvalidAction);
        }

        let Some(mut token) = self.store().get(guid)? else {
            tracing::warn!(guid = %guid, "unknown action");
            return Err(ReportError::InvalidAction);
        };
        if token.used || !self.store().claim(guid)? {
            tracing::warn!(guid = %guid, "action already used");
            return Err(ReportError::InvalidAction);
        }
        token.used = true;

        if token.is_expired(now) {
            tracing::warn!(guid = %guid, expiry = %token.expiry, "action expired");
            return Err(ReportError::InvalidAction);
        }

        let action = token.to_json();
        let mut settings = token.settings.clone();
        settings.insert("Action".to_string(), action.clone());

        let mut result = self.catalog.run(&token.workflow, &settings, true)?;
        result.put_data("Action", action);
        tracing::info!(guid = %guid, workflow = %token.workflow, error = result.in_error(), "action redeemed");
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::ActionToken;
    use crate::catalog::WorkflowDefinition;
    use crate::executor::WorkflowExecutor;
    use crate::store::MemoryActionStore;
    use chrono::Duration;
    use serde_json::{json, Map};

    fn setup() -> (ActionRedeemer, Arc<MemoryActionStore>) {
        let store = Arc::new(MemoryActionStore::new());
        let mut catalog = WorkflowCatalog::new(WorkflowExecutor::new("", store.clone()));
        catalog.register(WorkflowDefinition::new(
            "echo",
            "Echo",
            "print(`tag ${Action.tag}`);\nWorkflowResult.putData(\"n\", n);",
        ));
        (ActionRedeemer::new(Arc::new(catalog)), store)
    }

    fn token(store: &MemoryActionStore, expiry: DateTime<Utc>) -> String {
        let mut settings = Map::new();
        settings.insert("n".into(), json!(3));
        let token = ActionToken::new("echo", Some("t1".into()), expiry, settings);
        store.insert(&token).unwrap();
        token.guid
    }

    #[test]
    fn test_redeem_once() {
        let (redeemer, store) = setup();
        let guid = token(&store, Utc::now() + Duration::hours(1));

        let result = redeemer.redeem(&guid).unwrap();
        assert_eq!(result.error, None);
        assert_eq!(result.information.as_deref(), Some("tag t1\n"));
        assert_eq!(result.data["n"], json!(3));
        assert_eq!(result.data["Action"]["guid"], json!(guid));
        assert_eq!(result.data["Action"]["used"], json!(true));

        assert!(matches!(redeemer.redeem(&guid), Err(ReportError::InvalidAction)));
    }

    #[test]
    fn test_invalid_guids() {
        let (redeemer, _) = setup();
        for guid in ["", "   ", "no-such-action"] {
            let err = redeemer.redeem(guid).unwrap_err();
            assert_eq!(err.to_string(), "ACTION/Invalid action specified");
        }
    }

    #[test]
    fn test_expired_token_is_spent() {
        let (redeemer, store) = setup();
        let now = Utc::now();
        let guid = token(&store, now - Duration::minutes(1));

        assert!(matches!(redeemer.redeem_at(&guid, now), Err(ReportError::InvalidAction)));
        assert!(store.get(&guid).unwrap().unwrap().used);
    }

    #[test]
    fn test_missing_workflow() {
        let (redeemer, store) = setup();
        let token = ActionToken::new("gone", None, Utc::now() + Duration::hours(1), Map::new());
        store.insert(&token).unwrap();
        let err = redeemer.redeem(&token.guid).unwrap_err();
        assert_eq!(err.code(), "CONFIG");
    }
}
