//! Batch-import record normalization and matching policy
//!
//! Incoming rosters arrive as loosely formatted records. Before they
//! touch the pool, phones are reduced to digits (keeping a leading `+`)
//! and names are trimmed; matching against existing items goes by
//! normalized phone first, then case-insensitive exact name.

use serde::{Deserialize, Serialize};

use crate::models::Score;

/// One incoming roster record, as supplied by the caller
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImportRecord {
    #[serde(default)]
    pub name: String,
    pub phone: Option<String>,
    pub alt_phone: Option<String>,
    pub student_no: Option<String>,
    pub group_label: Option<String>,
    pub score: Option<Score>,
    pub attendance: Option<String>,
    pub homework: Option<String>,
}

/// A record that passed validation, with normalized fields
#[derive(Debug, Clone)]
pub struct NormalizedRecord {
    pub name: String,
    pub phone: Option<String>,
    pub alt_phone: Option<String>,
    pub student_no: Option<String>,
    pub group_label: Option<String>,
    pub score: Option<Score>,
    pub attendance: Option<String>,
    pub homework: Option<String>,
}

impl ImportRecord {
    /// Normalize the record, or None if it is unusable (blank name).
    /// Unusable records are skipped by the batch, never fatal.
    pub fn normalize(&self) -> Option<NormalizedRecord> {
        let name = normalize_name(&self.name)?;
        Some(NormalizedRecord {
            name,
            phone: self.phone.as_deref().and_then(normalize_phone),
            alt_phone: self.alt_phone.as_deref().and_then(normalize_phone),
            student_no: trimmed(&self.student_no),
            group_label: trimmed(&self.group_label),
            score: self.score.clone(),
            attendance: trimmed(&self.attendance),
            homework: trimmed(&self.homework),
        })
    }
}

/// Reduce a phone number to its digits, preserving a single leading `+`
/// country marker. Returns None when nothing usable remains.
pub fn normalize_phone(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let plus = trimmed.starts_with('+');
    let digits: String = trimmed.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return None;
    }
    if plus {
        Some(format!("+{}", digits))
    } else {
        Some(digits)
    }
}

/// Trim a name and collapse internal whitespace runs; None when blank
pub fn normalize_name(raw: &str) -> Option<String> {
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        None
    } else {
        Some(collapsed)
    }
}

fn trimmed(raw: &Option<String>) -> Option<String> {
    raw.as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_phone_strips_formatting() {
        assert_eq!(
            normalize_phone("(055) 123-45-67"),
            Some("0551234567".to_string())
        );
        assert_eq!(normalize_phone(" 055 123 45 67 "), Some("0551234567".to_string()));
    }

    #[test]
    fn test_normalize_phone_keeps_leading_plus() {
        assert_eq!(
            normalize_phone("+994 55 123 45 67"),
            Some("+994551234567".to_string())
        );
        // A plus anywhere else is just formatting noise
        assert_eq!(normalize_phone("055+123"), Some("055123".to_string()));
    }

    #[test]
    fn test_normalize_phone_empty() {
        assert_eq!(normalize_phone(""), None);
        assert_eq!(normalize_phone("   "), None);
        assert_eq!(normalize_phone("n/a"), None);
        assert_eq!(normalize_phone("+"), None);
    }

    #[test]
    fn test_normalize_name() {
        assert_eq!(normalize_name("  Ali   Veliyev "), Some("Ali Veliyev".to_string()));
        assert_eq!(normalize_name(""), None);
        assert_eq!(normalize_name("   "), None);
    }

    #[test]
    fn test_record_normalize() {
        let record = ImportRecord {
            name: " Ali  Veliyev ".to_string(),
            phone: Some("+994 (55) 123-45-67".to_string()),
            alt_phone: Some("garbage".to_string()),
            student_no: Some(" S-42 ".to_string()),
            group_label: Some("".to_string()),
            ..Default::default()
        };

        let norm = record.normalize().unwrap();
        assert_eq!(norm.name, "Ali Veliyev");
        assert_eq!(norm.phone, Some("+994551234567".to_string()));
        assert_eq!(norm.alt_phone, None);
        assert_eq!(norm.student_no, Some("S-42".to_string()));
        assert_eq!(norm.group_label, None);
    }

    #[test]
    fn test_record_normalize_rejects_blank_name() {
        let record = ImportRecord {
            name: "   ".to_string(),
            phone: Some("0551234567".to_string()),
            ..Default::default()
        };
        assert!(record.normalize().is_none());
    }
}
