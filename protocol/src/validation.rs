use serde::Deserialize;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Structured per-field rejection returned with a validation failure.
///
/// The server leaves the cart unchanged when it answers with one of these;
/// callers render `errors` next to the offending fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationErrors {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub errors: BTreeMap<String, Vec<String>>,
}

impl ValidationErrors {
    pub fn is_empty(&self) -> bool {
        self.message.is_empty() && self.errors.is_empty()
    }

    pub fn field(&self, name: &str) -> &[String] {
        self.errors.get(name).map(Vec::as_slice).unwrap_or(&[])
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.errors.is_empty() {
            return write!(f, "{}", self.message);
        }
        let fields: Vec<&str> = self.errors.keys().map(String::as_str).collect();
        write!(f, "{} [{}]", self.message, fields.join(", "))
    }
}
