// Report layout and field configuration, optionally loaded from TOML.
//
// Every key has a default, so an empty file (or no file) is a valid config.
use crate::columns::DEFAULT_DELIMITER;
use crate::error::{ReportError, Result};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FieldNames {
    pub category: String,
    pub count: String,
    pub duration: String,
    pub subjects: String,
    pub entity: String,
    pub label: String,
    pub date: String,
    pub contract: String,
    pub company: String,
}

impl Default for FieldNames {
    fn default() -> Self {
        Self {
            category: "category".into(),
            count: "count".into(),
            duration: "duration".into(),
            subjects: "subjects".into(),
            entity: "entity".into(),
            label: "label".into(),
            date: "date".into(),
            contract: "contract".into(),
            company: "company".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReportConfig {
    /// Separator between sub-labels in multi-valued label fields.
    pub label_delimiter: String,
    /// First column (0-based) given to allocated subject labels.
    pub subject_start_column: u32,
    /// Subjects that always get the first allocated columns, in order.
    pub seeded_subjects: Vec<String>,
    /// Plan transitions counted by the category report, as `[from, to]`.
    pub tracked_transitions: Vec<[String; 2]>,
    pub fields: FieldNames,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            label_delimiter: DEFAULT_DELIMITER.into(),
            subject_start_column: 2,
            seeded_subjects: Vec::new(),
            tracked_transitions: vec![
                ["Pepiniere".into(), "Coworking".into()],
                ["Coworking".into(), "CentreAffaires".into()],
                ["Pepiniere".into(), "CentreAffaires".into()],
            ],
            fields: FieldNames::default(),
        }
    }
}

impl ReportConfig {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: ReportConfig =
            toml::from_str(s).map_err(|e| ReportError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    fn validate(&self) -> Result<()> {
        if self.label_delimiter.is_empty() {
            return Err(ReportError::Config("label_delimiter must not be empty".into()));
        }
        // Column A holds the record label and B its duration.
        if self.subject_start_column < 2 {
            return Err(ReportError::Config(format!(
                "subject_start_column must be >= 2, got {}",
                self.subject_start_column
            )));
        }
        Ok(())
    }

    pub fn transitions(&self) -> BTreeSet<(String, String)> {
        self.tracked_transitions
            .iter()
            .map(|[from, to]| (from.clone(), to.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let config = ReportConfig::from_toml_str("").unwrap();
        assert_eq!(config, ReportConfig::default());
        assert_eq!(config.transitions().len(), 3);
    }

    #[test]
    fn partial_override() {
        let config = ReportConfig::from_toml_str(
            r#"
label_delimiter = ";"
tracked_transitions = [["A", "B"]]

[fields]
category = "formula"
"#,
        )
        .unwrap();
        assert_eq!(config.label_delimiter, ";");
        assert_eq!(config.fields.category, "formula");
        assert_eq!(config.fields.count, "count");
        assert!(config.transitions().contains(&("A".to_string(), "B".to_string())));
    }

    #[test]
    fn rejects_bad_values() {
        assert!(ReportConfig::from_toml_str("label_delimiter = \"\"").is_err());
        assert!(ReportConfig::from_toml_str("subject_start_column = 1").is_err());
        assert!(ReportConfig::from_toml_str("unknown_key = 1").is_err());
    }
}
