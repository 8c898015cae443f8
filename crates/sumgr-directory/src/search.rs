use pinyin::ToPinyin;
use std::collections::HashSet;
use sumgr_contracts::models::{AppRecord, GroupedEntry, SearchStatus, SearchView};

/// Label with every Han character spelled as toneless pinyin, e.g.
/// `微信` as `weixin`. Other characters are kept.
pub(crate) fn pinyin_label(label: &str) -> String {
    let mut spelled = String::with_capacity(label.len());
    for ch in label.chars() {
        match ch.to_pinyin() {
            Some(pinyin) => spelled.push_str(pinyin.plain()),
            None => spelled.push(ch),
        }
    }
    spelled.to_lowercase()
}

/// Case-insensitive substring match on label, the label's pinyin spelling or
/// package name over the visible records. `loading` reports an empty match as
/// still in progress.
pub fn build_search(
    text: &str,
    visible: &[AppRecord],
    groups: &[GroupedEntry],
    loading: bool,
) -> SearchView {
    let needle = text.trim().to_lowercase();
    if needle.is_empty() {
        return SearchView {
            text: text.to_string(),
            ..SearchView::default()
        };
    }

    let results = visible
        .iter()
        .filter(|record| {
            record.display_label.to_lowercase().contains(&needle)
                || record.package_name().to_lowercase().contains(&needle)
                || pinyin_label(&record.display_label).contains(&needle)
        })
        .cloned()
        .collect::<Vec<_>>();
    let matched_uids = results.iter().map(AppRecord::uid).collect::<HashSet<_>>();
    let matched_groups = groups
        .iter()
        .filter(|group| matched_uids.contains(&group.uid))
        .cloned()
        .collect::<Vec<_>>();

    let status = match (results.is_empty(), loading) {
        (false, _) => SearchStatus::Show,
        (true, true) => SearchStatus::Loading,
        (true, false) => SearchStatus::Empty,
    };
    SearchView {
        text: text.to_string(),
        status,
        results,
        matched_groups,
    }
}

#[cfg(test)]
#[path = "../tests/search/search_tests.rs"]
mod search_tests;
