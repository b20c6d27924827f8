// src/diff.rs
//! Human-readable change lines between two digests of the same page.

use std::collections::BTreeSet;

use crate::extract::PageDigest;

/// Max activity/status texts listed per direction before eliding.
const MAX_LISTED: usize = 5;

/// Describe what changed between `old` and `new`. Empty when the digests are equal.
pub fn summarize_changes(old: &PageDigest, new: &PageDigest) -> Vec<String> {
    let mut out = Vec::new();
    if old == new {
        return out;
    }

    if old.title != new.title {
        out.push(format!("Title changed: {:?} -> {:?}", old.title, new.title));
    }

    if old.forms != new.forms {
        if old.forms.len() != new.forms.len() {
            out.push(format!(
                "Form changes: {} form(s) before, {} now",
                old.forms.len(),
                new.forms.len()
            ));
        } else {
            let changed = old
                .forms
                .iter()
                .zip(&new.forms)
                .filter(|(a, b)| a != b)
                .count();
            out.push(format!("Form changes: {changed} form(s) modified"));
        }
    }

    let old_acts: BTreeSet<&str> = old.activities.iter().map(|a| a.text.as_str()).collect();
    let new_acts: BTreeSet<&str> = new.activities.iter().map(|a| a.text.as_str()).collect();
    push_set_delta(&mut out, "Activity", &old_acts, &new_acts);
    if old_acts == new_acts && old.activities != new.activities {
        out.push("Activity changes: links or classes changed".to_string());
    }

    let old_status: BTreeSet<&str> = old.status.iter().map(|s| s.text.as_str()).collect();
    let new_status: BTreeSet<&str> = new.status.iter().map(|s| s.text.as_str()).collect();
    push_set_delta(&mut out, "Status", &old_status, &new_status);

    if out.is_empty() {
        out.push("Page text changed".to_string());
    }
    out
}

fn push_set_delta(out: &mut Vec<String>, label: &str, old: &BTreeSet<&str>, new: &BTreeSet<&str>) {
    let added: Vec<&str> = new.difference(old).copied().collect();
    let removed: Vec<&str> = old.difference(new).copied().collect();
    if !added.is_empty() {
        out.push(format!("{label} added: {}", list(&added)));
    }
    if !removed.is_empty() {
        out.push(format!("{label} removed: {}", list(&removed)));
    }
}

fn list(items: &[&str]) -> String {
    let mut shown: Vec<String> = items
        .iter()
        .take(MAX_LISTED)
        .map(|s| format!("{s:?}"))
        .collect();
    if items.len() > MAX_LISTED {
        shown.push(format!("+{} more", items.len() - MAX_LISTED));
    }
    shown.join(", ")
}
