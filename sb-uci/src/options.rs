//! Typed UCI option registry.
//!
//! Every option carries a schema (type, range, default). Out-of-range or
//! unparsable values are rejected at set time and the previous value sticks.

use rustc_hash::FxHashMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OptionsError {
    #[error("unknown option `{0}`")]
    Unknown(String),

    #[error("value `{value}` is not valid for option `{name}`")]
    BadValue { name: String, value: String },

    #[error("value `{value}` for option `{name}` is out of range [{min}, {max}]")]
    OutOfRange {
        name: String,
        value: String,
        min: String,
        max: String,
    },
}

#[derive(Clone, Debug)]
pub enum OptionKind {
    Int { min: i64, max: i64, default: i64 },
    Float { min: f32, max: f32, default: f32 },
    Bool { default: bool },
    Choice { choices: Vec<String>, default: String },
    Text { default: String },
}

#[derive(Clone, Debug, PartialEq)]
enum OptionValue {
    Int(i64),
    Float(f32),
    Bool(bool),
    Text(String),
}

struct OptionDef {
    name: &'static str,
    kind: OptionKind,
}

/// The registry: defs in advertisement order plus current values.
pub struct Options {
    defs: Vec<OptionDef>,
    values: FxHashMap<&'static str, OptionValue>,
}

impl Options {
    pub fn new() -> Self {
        Self {
            defs: Vec::new(),
            values: FxHashMap::default(),
        }
    }

    pub fn add(&mut self, name: &'static str, kind: OptionKind) {
        let value = match &kind {
            OptionKind::Int { default, .. } => OptionValue::Int(*default),
            OptionKind::Float { default, .. } => OptionValue::Float(*default),
            OptionKind::Bool { default } => OptionValue::Bool(*default),
            OptionKind::Choice { default, .. } => OptionValue::Text(default.clone()),
            OptionKind::Text { default } => OptionValue::Text(default.clone()),
        };
        self.values.insert(name, value);
        self.defs.push(OptionDef { name, kind });
    }

    fn def(&self, name: &str) -> Option<&OptionDef> {
        self.defs
            .iter()
            .find(|d| d.name.eq_ignore_ascii_case(name))
    }

    /// Parse and store `value`; rejects leave the previous value in place.
    pub fn set(&mut self, name: &str, value: &str) -> Result<(), OptionsError> {
        let def = self
            .def(name)
            .ok_or_else(|| OptionsError::Unknown(name.to_string()))?;
        let key = def.name;
        let parsed = match &def.kind {
            OptionKind::Int { min, max, .. } => {
                let v: i64 = value.trim().parse().map_err(|_| OptionsError::BadValue {
                    name: key.to_string(),
                    value: value.to_string(),
                })?;
                if v < *min || v > *max {
                    return Err(OptionsError::OutOfRange {
                        name: key.to_string(),
                        value: value.to_string(),
                        min: min.to_string(),
                        max: max.to_string(),
                    });
                }
                OptionValue::Int(v)
            }
            OptionKind::Float { min, max, .. } => {
                let v: f32 = value.trim().parse().map_err(|_| OptionsError::BadValue {
                    name: key.to_string(),
                    value: value.to_string(),
                })?;
                if !v.is_finite() || v < *min || v > *max {
                    return Err(OptionsError::OutOfRange {
                        name: key.to_string(),
                        value: value.to_string(),
                        min: min.to_string(),
                        max: max.to_string(),
                    });
                }
                OptionValue::Float(v)
            }
            OptionKind::Bool { .. } => match value.trim().to_ascii_lowercase().as_str() {
                "true" | "1" | "on" => OptionValue::Bool(true),
                "false" | "0" | "off" => OptionValue::Bool(false),
                _ => {
                    return Err(OptionsError::BadValue {
                        name: key.to_string(),
                        value: value.to_string(),
                    })
                }
            },
            OptionKind::Choice { choices, .. } => {
                let v = value.trim();
                let hit = choices.iter().find(|c| c.eq_ignore_ascii_case(v));
                match hit {
                    Some(c) => OptionValue::Text(c.clone()),
                    None => {
                        return Err(OptionsError::BadValue {
                            name: key.to_string(),
                            value: value.to_string(),
                        })
                    }
                }
            }
            OptionKind::Text { .. } => OptionValue::Text(value.to_string()),
        };
        self.values.insert(key, parsed);
        Ok(())
    }

    pub fn get_int(&self, name: &str) -> i64 {
        match self.values.get(name) {
            Some(OptionValue::Int(v)) => *v,
            _ => panic!("int option `{name}` not registered"),
        }
    }

    pub fn get_float(&self, name: &str) -> f32 {
        match self.values.get(name) {
            Some(OptionValue::Float(v)) => *v,
            _ => panic!("float option `{name}` not registered"),
        }
    }

    pub fn get_bool(&self, name: &str) -> bool {
        match self.values.get(name) {
            Some(OptionValue::Bool(v)) => *v,
            _ => panic!("bool option `{name}` not registered"),
        }
    }

    pub fn get_str(&self, name: &str) -> &str {
        match self.values.get(name) {
            Some(OptionValue::Text(v)) => v,
            _ => panic!("string option `{name}` not registered"),
        }
    }

    /// `option name ... type ...` advertisement lines, in registration order.
    /// Floats advertise as strings; UCI has no float type.
    pub fn uci_lines(&self) -> Vec<String> {
        self.defs
            .iter()
            .map(|d| match &d.kind {
                OptionKind::Int { min, max, default } => format!(
                    "option name {} type spin default {} min {} max {}",
                    d.name, default, min, max
                ),
                OptionKind::Float { default, .. } => {
                    format!("option name {} type string default {}", d.name, default)
                }
                OptionKind::Bool { default } => {
                    format!("option name {} type check default {}", d.name, default)
                }
                OptionKind::Choice { choices, default } => {
                    let mut line =
                        format!("option name {} type combo default {}", d.name, default);
                    for c in choices {
                        line.push_str(" var ");
                        line.push_str(c);
                    }
                    line
                }
                OptionKind::Text { default } => {
                    format!("option name {} type string default {}", d.name, default)
                }
            })
            .collect()
    }
}

impl Default for Options {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> Options {
        let mut o = Options::new();
        o.add(
            "threads",
            OptionKind::Int {
                min: 1,
                max: 128,
                default: 2,
            },
        );
        o.add(
            "cpuct",
            OptionKind::Float {
                min: 0.0,
                max: 100.0,
                default: 3.4,
            },
        );
        o.add("noise", OptionKind::Bool { default: false });
        o.add(
            "backend",
            OptionKind::Choice {
                choices: vec!["random".into(), "dense".into()],
                default: "random".into(),
            },
        );
        o
    }

    #[test]
    fn defaults_are_readable() {
        let o = registry();
        assert_eq!(o.get_int("threads"), 2);
        assert_eq!(o.get_float("cpuct"), 3.4);
        assert!(!o.get_bool("noise"));
        assert_eq!(o.get_str("backend"), "random");
    }

    #[test]
    fn set_parses_and_stores() {
        let mut o = registry();
        o.set("threads", "8").unwrap();
        assert_eq!(o.get_int("threads"), 8);
        o.set("noise", "true").unwrap();
        assert!(o.get_bool("noise"));
        o.set("backend", "dense").unwrap();
        assert_eq!(o.get_str("backend"), "dense");
    }

    #[test]
    fn out_of_range_keeps_the_previous_value() {
        let mut o = registry();
        o.set("threads", "8").unwrap();
        assert!(matches!(
            o.set("threads", "1000"),
            Err(OptionsError::OutOfRange { .. })
        ));
        assert_eq!(o.get_int("threads"), 8);
    }

    #[test]
    fn garbage_is_a_bad_value() {
        let mut o = registry();
        assert!(matches!(
            o.set("threads", "many"),
            Err(OptionsError::BadValue { .. })
        ));
        assert!(matches!(
            o.set("backend", "gpu"),
            Err(OptionsError::BadValue { .. })
        ));
    }

    #[test]
    fn names_match_case_insensitively() {
        let mut o = registry();
        o.set("Threads", "4").unwrap();
        assert_eq!(o.get_int("threads"), 4);
        assert!(matches!(
            o.set("does-not-exist", "1"),
            Err(OptionsError::Unknown(_))
        ));
    }

    #[test]
    fn advertisement_covers_every_option() {
        let o = registry();
        let lines = o.uci_lines();
        assert_eq!(lines.len(), 4);
        assert_eq!(
            lines[0],
            "option name threads type spin default 2 min 1 max 128"
        );
        assert!(lines[3].contains("type combo"));
        assert!(lines[3].contains("var dense"));
    }
}
