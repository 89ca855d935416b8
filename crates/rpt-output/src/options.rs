//! Adapter options (`Header`, `Delimiter`, `Quote`, `Escape`, `LineEnd`)
use indexmap::IndexMap;
use rpt_core::RuntimeParameters;

/// Option names read from runtime parameters when not given explicitly
pub const OPTION_NAMES: [&str; 5] = ["Header", "Delimiter", "Quote", "Escape", "LineEnd"];

/// Case-insensitive option map. A present but empty value is meaningful
/// (an empty `Quote` turns quoting off).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OutputOptions {
    values: IndexMap<String, String>,
}

impl OutputOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &str, value: impl Into<String>) -> Self {
        self.set(name, value);
        self
    }

    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        self.values.insert(name.to_ascii_lowercase(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    /// Fills every option not already set from the runtime parameters
    pub fn merge_parameters(mut self, parameters: &RuntimeParameters) -> Self {
        for name in OPTION_NAMES {
            if self.get(name).is_none() {
                if let Some(value) = parameters.text(name) {
                    self.set(name, value);
                }
            }
        }
        self
    }

    /// Header rows are written unless `Header` is set to anything but `yes`
    pub fn header(&self) -> bool {
        self.get("Header")
            .map(|v| v.trim().eq_ignore_ascii_case("yes"))
            .unwrap_or(true)
    }
}
