//! Derived employment-gap questions.
//!
//! Gap keys are positional (`educationToEmp1`, `emp1ToEmp2`, ..., `emp{n}ToCurrent`) while the
//! labels carry company names. An answer survives a recomputation only when both the key and
//! the pair of timeline points it sits between are unchanged, so renaming a company keeps
//! answers and inserting or removing an employment resets every gap whose neighbours moved.

use serde::{Deserialize, Serialize};

use super::form::EmploymentEntry;

/// One end of a gap period.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "camelCase")]
pub enum GapAnchor {
    Education,
    Employment(String),
    #[default]
    Current,
}

/// Derived question with the candidate's answer attached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GapEntry {
    pub key: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub from: GapAnchor,
    #[serde(default)]
    pub to: GapAnchor,
    #[serde(default)]
    pub has_gap: Option<bool>,
    #[serde(default)]
    pub duration: String,
    #[serde(default)]
    pub reason: String,
}

impl GapEntry {
    fn blank(key: String, label: String, from: GapAnchor, to: GapAnchor) -> Self {
        Self {
            key,
            label,
            from,
            to,
            has_gap: None,
            duration: String::new(),
            reason: String::new(),
        }
    }

    pub fn is_answered(&self) -> bool {
        self.has_gap.is_some()
    }

    fn copy_answer_from(&mut self, other: &GapAnswer) {
        self.has_gap = other.has_gap;
        self.duration = other.duration.clone();
        self.reason = other.reason.clone();
    }
}

/// Client-supplied answer for a gap question, addressed by key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GapAnswer {
    pub key: String,
    #[serde(default)]
    pub has_gap: Option<bool>,
    #[serde(default)]
    pub duration: String,
    #[serde(default)]
    pub reason: String,
}

impl From<&GapEntry> for GapAnswer {
    fn from(entry: &GapEntry) -> Self {
        Self {
            key: entry.key.clone(),
            has_gap: entry.has_gap,
            duration: entry.duration.clone(),
            reason: entry.reason.clone(),
        }
    }
}

fn company_label(entry: &EmploymentEntry, position: usize) -> String {
    let name = entry.company_name.trim();
    if name.is_empty() {
        format!("Employment {position}")
    } else {
        name.to_string()
    }
}

fn anchor(entry: &EmploymentEntry) -> GapAnchor {
    GapAnchor::Employment(entry.id.clone())
}

/// Rebuild the gap list for `employments`, carrying over answers from `previous` where the
/// key and anchors still match. Always yields `employments.len() + 1` entries.
pub fn derive_gaps(employments: &[EmploymentEntry], previous: &[GapEntry]) -> Vec<GapEntry> {
    let mut derived = Vec::with_capacity(employments.len() + 1);

    match employments {
        [] => derived.push(GapEntry::blank(
            "educationToCurrent".to_string(),
            "Gap between education and current date".to_string(),
            GapAnchor::Education,
            GapAnchor::Current,
        )),
        [first, ..] => {
            derived.push(GapEntry::blank(
                "educationToEmp1".to_string(),
                format!("Gap between education and {}", company_label(first, 1)),
                GapAnchor::Education,
                anchor(first),
            ));

            for (index, pair) in employments.windows(2).enumerate() {
                let position = index + 1;
                derived.push(GapEntry::blank(
                    format!("emp{position}ToEmp{}", position + 1),
                    format!(
                        "Gap between {} and {}",
                        company_label(&pair[0], position),
                        company_label(&pair[1], position + 1)
                    ),
                    anchor(&pair[0]),
                    anchor(&pair[1]),
                ));
            }

            let count = employments.len();
            let last = &employments[count - 1];
            derived.push(GapEntry::blank(
                format!("emp{count}ToCurrent"),
                format!(
                    "Gap between {} and current date",
                    company_label(last, count)
                ),
                anchor(last),
                GapAnchor::Current,
            ));
        }
    }

    for entry in &mut derived {
        let carried = previous.iter().find(|old| {
            old.key == entry.key && old.from == entry.from && old.to == entry.to
        });
        if let Some(old) = carried {
            entry.copy_answer_from(&GapAnswer::from(old));
        }
    }

    derived
}

/// Copy client answers onto derived entries by key. Keys the timeline no longer produces are
/// ignored; keys and labels are never taken from the client.
pub fn apply_answers(gaps: &[GapEntry], answers: &[GapAnswer]) -> Vec<GapEntry> {
    gaps.iter()
        .map(|gap| {
            let mut updated = gap.clone();
            if let Some(answer) = answers.iter().find(|answer| answer.key == gap.key) {
                updated.copy_answer_from(answer);
            }
            updated
        })
        .collect()
}
