//! Field-value observations and the value-reduction capability.

use serde::{Deserialize, Serialize};

/// Well-known field identifiers.
pub mod fields {
    pub const NAME_GIVEN: &str = "name-given";
    pub const NAME_MIDDLE: &str = "name-middle";
    pub const NAME_FAMILY: &str = "name-family";
    pub const GENDER: &str = "gender";
    pub const DOB: &str = "dob";
    pub const ADDRESS_STREET: &str = "address-street";
    pub const ADDRESS_CITY: &str = "address-city";
    pub const ADDRESS_STATE: &str = "address-state";
    pub const ADDRESS_ZIP: &str = "address-zip";
    pub const PHONE: &str = "phone";
}

/// Separator between the parts of a joint (context) key.
pub const JOINT_KEY_SEPARATOR: char = '|';

/// Join parent values (and optionally a field value) into one key.
pub fn joint_key<S: AsRef<str>>(parts: &[S]) -> String {
    let mut out = String::new();
    for (i, p) in parts.iter().enumerate() {
        if i > 0 {
            out.push(JOINT_KEY_SEPARATOR);
        }
        out.push_str(p.as_ref());
    }
    out
}

/// One observed value of one field, optionally under a parent context.
///
/// `context` is the joint key of the field's parents' values, in the order the
/// dependencies were declared.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Observation {
    pub field: String,
    pub value: String,
    #[serde(default)]
    pub context: Option<String>,
}

impl Observation {
    pub fn new(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
            context: None,
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }
}

/// Rewrites raw values before counting, e.g. collapsing house numbers into a
/// tagged placeholder. Injected into the builder; never discovered.
pub trait ValueReducer: Send + Sync {
    fn reduce(&self, field: &str, value: &str) -> String;
}

/// Keeps every value as observed.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityReducer;

impl ValueReducer for IdentityReducer {
    fn reduce(&self, _field: &str, value: &str) -> String {
        value.to_string()
    }
}
