//! Declared parameter schema and resolved runtime parameters
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Display type whose default argument carries the choice list
pub const DROP_DOWN: &str = "drop_down";

/// Display type used when a declaration does not name one
pub const DEFAULT_DISPLAY_TYPE: &str = "string";

/// One `declareParameter` call recorded by the declaration pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterDeclaration {
    pub name: String,
    pub label: String,
    pub description: String,
    pub display_type: String,
    pub default_value: Option<String>,
    pub required: bool,
    /// Choice source for drop downs (`"key:value"` list text)
    pub choices: Option<String>,
}

impl ParameterDeclaration {
    /// Builds an entry the way the declare primitive does: for a drop down
    /// the default argument becomes the choice list.
    pub fn new(
        name: impl Into<String>,
        label: impl Into<String>,
        description: impl Into<String>,
        default_value: Option<String>,
        optional: bool,
        display_type: Option<&str>,
    ) -> Self {
        let display_type = display_type
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .unwrap_or(DEFAULT_DISPLAY_TYPE)
            .to_string();
        let (default_value, choices) = if display_type.eq_ignore_ascii_case(DROP_DOWN) {
            (None, default_value)
        } else {
            (default_value, None)
        };
        Self {
            name: name.into(),
            label: label.into(),
            description: description.into(),
            display_type,
            default_value,
            required: !optional,
            choices,
        }
    }

    pub fn is_drop_down(&self) -> bool {
        self.display_type.eq_ignore_ascii_case(DROP_DOWN)
    }

    /// Parses the `"key:value"` choice list of a drop down. Entries without a
    /// colon use the same text for key and label.
    pub fn choice_list(&self) -> Vec<(String, String)> {
        let Some(choices) = &self.choices else {
            return Vec::new();
        };
        split_quoted_list(choices)
            .into_iter()
            .map(|entry| match entry.split_once(':') {
                Some((k, v)) => (k.trim().to_string(), v.trim().to_string()),
                None => (entry.clone(), entry),
            })
            .collect()
    }
}

fn split_quoted_list(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    for c in text.chars() {
        match (quote, c) {
            (None, '"' | '\'') => quote = Some(c),
            (Some(q), c) if c == q => quote = None,
            (None, ',') => {
                out.push(std::mem::take(&mut current));
            }
            (_, c) => current.push(c),
        }
    }
    out.push(current);
    out.into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Parameter schema: insertion ordered, names compared case-insensitively.
/// Redeclaring a name replaces its attributes but keeps its position.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParameterSchema {
    entries: IndexMap<String, ParameterDeclaration>,
}

impl ParameterSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn declare(&mut self, declaration: ParameterDeclaration) {
        let key = declaration.name.to_lowercase();
        self.entries.insert(key, declaration);
    }

    pub fn get(&self, name: &str) -> Option<&ParameterDeclaration> {
        self.entries.get(&name.to_lowercase())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(&name.to_lowercase())
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.values().map(|d| d.name.as_str()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ParameterDeclaration> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A resolved name/value pair. `Value::Null` is a legitimate value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeParameter {
    pub name: String,
    pub value: Value,
}

impl RuntimeParameter {
    pub fn new(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    /// Text form of the value; `None` for null
    pub fn as_text(&self) -> Option<String> {
        match &self.value {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }
}

/// Runtime parameters of one execution, looked up case-insensitively.
/// A name that is absent was never supplied.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RuntimeParameters {
    entries: IndexMap<String, RuntimeParameter>,
}

impl RuntimeParameters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, parameter: RuntimeParameter) {
        self.entries.insert(parameter.name.to_lowercase(), parameter);
    }

    pub fn with(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.insert(RuntimeParameter::new(name, value));
        self
    }

    pub fn get(&self, name: &str) -> Option<&RuntimeParameter> {
        self.entries.get(&name.to_lowercase())
    }

    /// Text of a parameter, with null and missing both mapped to `None`
    pub fn text(&self, name: &str) -> Option<String> {
        self.get(name).and_then(RuntimeParameter::as_text)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(&name.to_lowercase())
    }

    pub fn iter(&self) -> impl Iterator<Item = &RuntimeParameter> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Copy keyed by the declared spelling: a supplied `TITLE` is bound as
    /// `title` when the schema declares `title`. Undeclared names keep theirs.
    pub fn aligned_to(&self, schema: &ParameterSchema) -> RuntimeParameters {
        self.entries
            .values()
            .map(|p| match schema.get(&p.name) {
                Some(declared) => RuntimeParameter::new(declared.name.as_str(), p.value.clone()),
                None => p.clone(),
            })
            .collect()
    }

    /// Names as supplied, mapped to their values
    pub fn to_json_map(&self) -> serde_json::Map<String, Value> {
        self.entries
            .values()
            .map(|p| (p.name.clone(), p.value.clone()))
            .collect()
    }
}

impl FromIterator<RuntimeParameter> for RuntimeParameters {
    fn from_iter<I: IntoIterator<Item = RuntimeParameter>>(iter: I) -> Self {
        let mut params = RuntimeParameters::new();
        for p in iter {
            params.insert(p);
        }
        params
    }
}
