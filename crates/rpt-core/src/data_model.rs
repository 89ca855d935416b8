//! Data Model: ReportDefinition, Recipient, Task, result sinks
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// Stored report: type discriminator, name and script body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportDefinition {
    pub name: String,
    /// Report type tag (ex: "Template", "SqlDump", "Script")
    #[serde(rename = "type")]
    pub report_type: String,
    #[serde(default)]
    pub script: String,
    #[serde(default)]
    pub description: Option<String>,
}

impl ReportDefinition {
    pub fn new(name: impl Into<String>, report_type: impl Into<String>, script: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            report_type: report_type.into(),
            script: script.into(),
            description: None,
        }
    }

    /// Name with whitespace removed, used for logger targets and file names
    pub fn compact_name(&self) -> String {
        self.name.chars().filter(|c| !c.is_whitespace()).collect()
    }
}

/// Someone a report is produced for. `values` always carries `name` and
/// `description` plus any columns of the recipient lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recipient {
    pub name: String,
    pub descriptive_name: Option<String>,
    pub values: IndexMap<String, String>,
}

impl Recipient {
    /// Accepts `addr` or `Desc <addr>`
    pub fn parse(text: &str) -> Self {
        let text = text.trim();
        let (name, descriptive) = match (text.find('<'), text.rfind('>')) {
            (Some(open), Some(close)) if open < close => {
                let desc = text[..open].trim().trim_matches('"').trim();
                let addr = text[open + 1..close].trim();
                (addr.to_string(), (!desc.is_empty()).then(|| desc.to_string()))
            }
            _ => (text.to_string(), None),
        };
        Self::new(name, descriptive)
    }

    pub fn new(name: impl Into<String>, descriptive_name: Option<String>) -> Self {
        let name = name.into();
        let mut values = IndexMap::new();
        values.insert("name".to_string(), name.clone());
        values.insert(
            "description".to_string(),
            descriptive_name.clone().unwrap_or_default(),
        );
        Self {
            name,
            descriptive_name,
            values,
        }
    }

    pub fn with_value(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    /// Case-insensitive column lookup
    pub fn value(&self, key: &str) -> Option<&str> {
        self.values
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    pub fn to_json(&self) -> Value {
        json!({
            "name": self.name,
            "descriptiveName": self.descriptive_name,
            "values": self.values,
        })
    }
}

/// Scheduled task a report or parameter is evaluated for
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub name: String,
    /// Datasource name used for `select` parameter lookups
    #[serde(default)]
    pub datasource: Option<String>,
    #[serde(default)]
    pub variables: IndexMap<String, String>,
}

impl Task {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn to_json(&self) -> Value {
        json!({
            "id": self.id,
            "name": self.name,
            "datasource": self.datasource,
            "variables": self.variables,
        })
    }
}

/// Side outputs of a run: free key/value pairs plus an error marker
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResults {
    pub values: IndexMap<String, String>,
    pub error: bool,
    pub message: Option<String>,
}

impl ExecutionResults {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_value(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn value(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn set_error(&mut self, message: impl Into<String>) {
        self.error = true;
        self.message = Some(message.into());
    }

    pub fn is_error(&self) -> bool {
        self.error
    }
}

/// JSON shaped outcome of a workflow run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowResult {
    pub error: Option<String>,
    pub information: Option<String>,
    pub data: Map<String, Value>,
}

impl WorkflowResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_error(&mut self, error: impl Into<String>) {
        self.error = Some(error.into());
    }

    pub fn set_information(&mut self, information: impl Into<String>) {
        self.information = Some(information.into());
    }

    pub fn put_data(&mut self, key: impl Into<String>, value: Value) {
        self.data.insert(key.into(), value);
    }

    pub fn in_error(&self) -> bool {
        self.error.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recipient_parse_with_description() {
        let r = Recipient::parse("Jane Smith <jane@example.org>");
        assert_eq!(r.name, "jane@example.org");
        assert_eq!(r.descriptive_name.as_deref(), Some("Jane Smith"));
        assert_eq!(r.value("NAME"), Some("jane@example.org"));
        assert_eq!(r.value("description"), Some("Jane Smith"));
    }

    #[test]
    fn test_recipient_plain_address() {
        let r = Recipient::parse("  ops@example.org ");
        assert_eq!(r.name, "ops@example.org");
        assert!(r.descriptive_name.is_none());
    }

    #[test]
    fn test_compact_name() {
        let def = ReportDefinition::new("Monthly Site Summary", "Template", "");
        assert_eq!(def.compact_name(), "MonthlySiteSummary");
    }

    #[test]
    fn test_execution_results_error() {
        let mut results = ExecutionResults::new();
        results.set_value("rows", "3");
        results.set_error("failed");
        assert!(results.is_error());
        assert_eq!(results.value("rows"), Some("3"));
    }

    #[test]
    fn test_workflow_result_json_shape() {
        let mut result = WorkflowResult::new();
        result.set_information("done");
        result.put_data("count", json!(2));
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value, json!({"error": null, "information": "done", "data": {"count": 2}}));
    }
}
