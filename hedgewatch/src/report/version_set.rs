use chrono::NaiveDate;
use serde::Serialize;

use crate::error::ConfigError;

const LABEL_FORMAT: &str = "%Y-%m-%d";

/// Imagery release tagged with its capture date
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DatedVersion {
    /// Human-readable label, `YYYY-MM-DD`
    pub label: String,
    pub date: NaiveDate,
    /// Opaque provider release id
    pub version: String,
}

/// The two captures compared by a scan
///
/// Chronology comes from the parsed label dates, never from the order the
/// entries were supplied in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VersionSet {
    before: DatedVersion,
    after: DatedVersion,
}

impl VersionSet {
    pub fn new<I, L, V>(entries: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (L, V)>,
        L: Into<String>,
        V: Into<String>,
    {
        let mut dated = entries
            .into_iter()
            .map(|(label, version)| {
                let label = label.into();
                let date = NaiveDate::parse_from_str(label.trim(), LABEL_FORMAT).map_err(|_| {
                    ConfigError::InvalidVersionSet(format!(
                        "label '{}' is not a YYYY-MM-DD date",
                        label
                    ))
                })?;
                Ok(DatedVersion {
                    label,
                    date,
                    version: version.into(),
                })
            })
            .collect::<Result<Vec<_>, ConfigError>>()?;

        if dated.len() != 2 {
            return Err(ConfigError::InvalidVersionSet(format!(
                "expected exactly 2 versions, got {}",
                dated.len()
            )));
        }

        dated.sort_by_key(|entry| entry.date);
        let after = dated.pop();
        let before = dated.pop();
        match (before, after) {
            (Some(before), Some(after)) if before.date != after.date => {
                Ok(VersionSet { before, after })
            }
            (Some(before), Some(_)) => Err(ConfigError::InvalidVersionSet(format!(
                "both versions are dated {}",
                before.label
            ))),
            _ => Err(ConfigError::InvalidVersionSet("missing version".to_string())),
        }
    }

    /// Earlier capture
    pub fn before(&self) -> &DatedVersion {
        &self.before
    }

    /// Later capture
    pub fn after(&self) -> &DatedVersion {
        &self.after
    }

}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_follows_dates_not_insertion() {
        let newest_first = VersionSet::new([("2024-03-07", "60013"), ("2023-02-23", "57965")]).unwrap();
        let oldest_first = VersionSet::new([("2023-02-23", "57965"), ("2024-03-07", "60013")]).unwrap();

        assert_eq!(newest_first, oldest_first);
        assert_eq!(newest_first.before().version, "57965");
        assert_eq!(newest_first.after().version, "60013");
        assert_eq!(newest_first.before().label, "2023-02-23");
        assert_eq!(newest_first.after().label, "2024-03-07");
    }

    #[test]
    fn test_rejects_wrong_cardinality() {
        assert!(VersionSet::new([("2024-03-07", "60013")]).is_err());
        assert!(VersionSet::new([
            ("2024-03-07", "1"),
            ("2023-02-23", "2"),
            ("2017-10-04", "3"),
        ])
        .is_err());
    }

    #[test]
    fn test_rejects_bad_or_duplicate_dates() {
        assert!(VersionSet::new([("yesterday", "1"), ("2023-02-23", "2")]).is_err());
        assert!(VersionSet::new([("2023-02-23", "1"), ("2023-02-23", "2")]).is_err());
    }
}
