use std::collections::HashMap;
use sumgr_contracts::models::AppRecord;

/// Names the owner of a shared uid for display.
pub trait OwnerNaming: Send + Sync {
    fn owner_label(&self, uid: i32, members: &[AppRecord]) -> Option<String>;
}

const WELL_KNOWN_UIDS: [(i32, &str); 5] = [
    (1000, "Android System"),
    (1001, "Phone Services"),
    (1002, "Bluetooth"),
    (1027, "NFC Service"),
    (2000, "Shell"),
];

const GENERIC_SEGMENTS: [&str; 8] = [
    "com", "org", "net", "android", "app", "apps", "service", "provider",
];

#[derive(Debug, Clone)]
struct OwnerCandidate {
    value: String,
    confidence: u8,
}

/// Fixed names for the platform's shared uids, otherwise the best scoring
/// candidate between member labels and the members' common package prefix.
#[derive(Debug, Clone, Default)]
pub struct SharedUidNaming {
    overrides: HashMap<i32, String>,
}

impl SharedUidNaming {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_override(mut self, uid: i32, label: impl Into<String>) -> Self {
        self.overrides.insert(uid, label.into());
        self
    }
}

impl OwnerNaming for SharedUidNaming {
    fn owner_label(&self, uid: i32, members: &[AppRecord]) -> Option<String> {
        if let Some(label) = self.overrides.get(&uid) {
            return Some(label.clone());
        }
        let app_uid = uid % sumgr_contracts::models::PER_USER_RANGE;
        if let Some((_, label)) = WELL_KNOWN_UIDS.iter().find(|(known, _)| *known == app_uid) {
            return Some((*label).to_string());
        }

        let prefix = common_package_prefix(members);
        let prefix_tokens = prefix
            .as_deref()
            .map(meaningful_segments)
            .unwrap_or_default();

        let mut candidates = Vec::new();
        for (index, member) in members.iter().enumerate() {
            let confidence = if index == 0 { 5 } else { 2 };
            push_candidate(&mut candidates, Some(member.display_label.clone()), confidence);
        }
        if let Some(last) = prefix_tokens.last() {
            push_candidate(&mut candidates, Some(title_case(last)), 3);
        }

        candidates
            .into_iter()
            .map(|candidate| {
                let score = score_candidate(&candidate, &prefix_tokens);
                (score, candidate)
            })
            .max_by(|(left_score, left), (right_score, right)| {
                left_score
                    .cmp(right_score)
                    .then_with(|| right.value.cmp(&left.value))
            })
            .map(|(_, candidate)| candidate.value)
    }
}

fn push_candidate(candidates: &mut Vec<OwnerCandidate>, value: Option<String>, confidence: u8) {
    let Some(value) = value.as_deref().and_then(normalize_label) else {
        return;
    };
    if candidates
        .iter()
        .any(|candidate| candidate.value.eq_ignore_ascii_case(&value))
    {
        return;
    }
    candidates.push(OwnerCandidate { value, confidence });
}

fn normalize_label(value: &str) -> Option<String> {
    let normalized = value.split_whitespace().collect::<Vec<_>>().join(" ");
    if normalized.is_empty() {
        return None;
    }
    Some(normalized)
}

fn name_key(value: &str) -> Vec<String> {
    value
        .chars()
        .map(|ch| {
            if ch.is_alphanumeric() {
                ch.to_ascii_lowercase()
            } else {
                ' '
            }
        })
        .collect::<String>()
        .split_whitespace()
        .map(ToString::to_string)
        .collect()
}

fn score_candidate(candidate: &OwnerCandidate, prefix_tokens: &[String]) -> i32 {
    let mut score = i32::from(candidate.confidence) * 10;
    let tokens = name_key(&candidate.value);

    let shared = tokens
        .iter()
        .filter(|token| prefix_tokens.iter().any(|prefix| prefix == *token))
        .count();
    score += (shared as i32) * 18;

    // Labels that are just a package name read poorly.
    if candidate.value.contains('.') && !candidate.value.contains(' ') {
        score -= 40;
    }
    if tokens.len() == 1 && candidate.value.chars().count() <= 3 {
        score -= 30;
    }
    score
}

fn common_package_prefix(members: &[AppRecord]) -> Option<String> {
    let mut iter = members.iter();
    let first = iter.next()?;
    let mut prefix = first.package_name().split('.').collect::<Vec<_>>();
    for member in iter {
        let segments = member.package_name().split('.').collect::<Vec<_>>();
        let shared = prefix
            .iter()
            .zip(segments.iter())
            .take_while(|(left, right)| left == right)
            .count();
        prefix.truncate(shared);
    }
    if prefix.is_empty() {
        return None;
    }
    Some(prefix.join("."))
}

fn meaningful_segments(prefix: &str) -> Vec<String> {
    prefix
        .split('.')
        .map(str::to_ascii_lowercase)
        .filter(|segment| !segment.is_empty() && !GENERIC_SEGMENTS.contains(&segment.as_str()))
        .collect()
}

fn title_case(value: &str) -> String {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
#[path = "../tests/naming/naming_tests.rs"]
mod naming_tests;
