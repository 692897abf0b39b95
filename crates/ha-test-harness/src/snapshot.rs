//! JSON snapshots and structural comparison
//!
//! Snapshot files are stored and updated by `insta`. Volatile fields such
//! as timestamps are redacted before the comparison. [`compare_json`] walks
//! two live documents and reports every difference by path instead of
//! failing on the first byte that differs.

use std::collections::HashSet;
use std::fmt;
use std::path::Path;

use serde_json::Value;

/// Written in place of ignored fields in stored snapshots
pub const REDACTED_VOLATILE: &str = "[volatile]";

/// A specific difference between the stored and the actual document
#[derive(Debug, Clone, PartialEq)]
pub struct Difference {
    pub category: DiffCategory,
    pub path: String,
    pub expected: String,
    pub actual: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffCategory {
    /// Present in the snapshot, absent from the output
    Missing,
    /// Present in the output, absent from the snapshot
    Extra,
    /// Different JSON types, or arrays of different length
    Structure,
    Value,
}

impl fmt::Display for DiffCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiffCategory::Missing => write!(f, "MISSING"),
            DiffCategory::Extra => write!(f, "EXTRA"),
            DiffCategory::Structure => write!(f, "STRUCTURE"),
            DiffCategory::Value => write!(f, "VALUE"),
        }
    }
}

impl fmt::Display for Difference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{:>9}] {} : expected={} actual={}",
            self.category, self.path, self.expected, self.actual
        )
    }
}

/// Options for comparing documents
#[derive(Debug, Clone, Default)]
pub struct CompareOptions {
    /// Keys skipped wherever they appear, or full dotted paths
    pub ignore_fields: HashSet<String>,
}

impl CompareOptions {
    /// Ignores timestamps by default
    pub fn new() -> Self {
        let mut opts = Self::default();
        for field in ["last_changed", "last_updated", "created_at", "modified_at"] {
            opts.ignore_fields.insert(field.to_string());
        }
        opts
    }

    pub fn ignore_field(mut self, field: &str) -> Self {
        self.ignore_fields.insert(field.to_string());
        self
    }

    fn ignores(&self, key: &str, path: &str) -> bool {
        self.ignore_fields.contains(key) || self.ignore_fields.contains(path)
    }
}

fn child_path(path: &str, key: &str) -> String {
    if path.is_empty() {
        key.to_string()
    } else {
        format!("{}.{}", path, key)
    }
}

/// Every difference between `expected` and `actual`
pub fn compare_json(expected: &Value, actual: &Value, options: &CompareOptions) -> Vec<Difference> {
    let mut differences = Vec::new();
    compare_at("", expected, actual, options, &mut differences);
    differences
}

fn compare_at(
    path: &str,
    expected: &Value,
    actual: &Value,
    options: &CompareOptions,
    differences: &mut Vec<Difference>,
) {
    match (expected, actual) {
        (Value::Object(exp_obj), Value::Object(act_obj)) => {
            for (key, exp_value) in exp_obj {
                let new_path = child_path(path, key);
                if options.ignores(key, &new_path) {
                    continue;
                }
                match act_obj.get(key) {
                    Some(act_value) => {
                        compare_at(&new_path, exp_value, act_value, options, differences)
                    }
                    None => differences.push(Difference {
                        category: DiffCategory::Missing,
                        path: new_path,
                        expected: exp_value.to_string(),
                        actual: "(missing)".to_string(),
                    }),
                }
            }

            for (key, act_value) in act_obj {
                let new_path = child_path(path, key);
                if !exp_obj.contains_key(key) && !options.ignores(key, &new_path) {
                    differences.push(Difference {
                        category: DiffCategory::Extra,
                        path: new_path,
                        expected: "(not present)".to_string(),
                        actual: act_value.to_string(),
                    });
                }
            }
        }
        (Value::Array(exp_arr), Value::Array(act_arr)) => {
            if exp_arr.len() != act_arr.len() {
                differences.push(Difference {
                    category: DiffCategory::Structure,
                    path: format!("{}.length", path),
                    expected: exp_arr.len().to_string(),
                    actual: act_arr.len().to_string(),
                });
            }
            for (i, (exp_elem, act_elem)) in exp_arr.iter().zip(act_arr.iter()).enumerate() {
                let new_path = format!("{}[{}]", path, i);
                compare_at(&new_path, exp_elem, act_elem, options, differences);
            }
        }
        _ if std::mem::discriminant(expected) != std::mem::discriminant(actual) => {
            differences.push(Difference {
                category: DiffCategory::Structure,
                path: path.to_string(),
                expected: expected.to_string(),
                actual: actual.to_string(),
            });
        }
        _ => {
            if expected != actual {
                differences.push(Difference {
                    category: DiffCategory::Value,
                    path: path.to_string(),
                    expected: expected.to_string(),
                    actual: actual.to_string(),
                });
            }
        }
    }
}

/// Panic with every difference between two documents
pub fn assert_json_eq(expected: &Value, actual: &Value, options: &CompareOptions) {
    let differences = compare_json(expected, actual, options);
    if !differences.is_empty() {
        let report: Vec<String> = differences.iter().map(ToString::to_string).collect();
        panic!(
            "Documents differ ({} differences):\n{}",
            differences.len(),
            report.join("\n")
        );
    }
}

/// `insta` redaction selector for an ignored key or dotted path
fn selector(field: &str) -> String {
    if field.contains('.') || field.contains('[') {
        format!(".{field}")
    } else {
        format!(".**.{field}")
    }
}

/// Snapshot settings for a crate: files live in `<manifest_dir>/tests/snapshots`
/// as `<name>.snap`, and ignored fields are redacted wherever they appear
pub fn settings(manifest_dir: &str, options: &CompareOptions) -> insta::Settings {
    let mut settings = insta::Settings::clone_current();
    settings.set_snapshot_path(Path::new(manifest_dir).join("tests").join("snapshots"));
    settings.set_prepend_module_to_snapshot(false);
    settings.set_omit_expression(true);

    let mut fields: Vec<&String> = options.ignore_fields.iter().collect();
    fields.sort();
    for field in fields {
        settings.add_redaction(&selector(field), REDACTED_VOLATILE);
    }
    settings
}

/// Assert a JSON value against `tests/snapshots/<name>.snap` of the
/// calling crate. Review changes with `cargo insta review` or rerun with
/// `INSTA_UPDATE=always`.
#[macro_export]
macro_rules! assert_json_snapshot {
    ($name:expr, $value:expr) => {
        $crate::assert_json_snapshot!($name, $value, $crate::snapshot::CompareOptions::new())
    };
    ($name:expr, $value:expr, $options:expr) => {
        $crate::snapshot::settings(env!("CARGO_MANIFEST_DIR"), &$options).bind(|| {
            $crate::insta::assert_json_snapshot!($name, $value);
        })
    };
}
