//! Chat text for change notifications.

use regex::Regex;
use std::sync::OnceLock;

use crate::contract::ProposalReport;

/// Summaries longer than this drop the slug list.
pub const SUMMARY_LIMIT: usize = 300;

fn size_suffix() -> &'static Regex {
    static SUFFIX: OnceLock<Regex> = OnceLock::new();
    SUFFIX.get_or_init(|| Regex::new(r"-\d{1,4}x\d{1,4}$").expect("static pattern compiles"))
}

fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// `wordpress/media/2020/07/img-150x150.jpg` -> `img`.
pub fn slug_from_filename(path: &str) -> String {
    let name = file_name(path);
    let stem = name.split('.').next().unwrap_or(name);
    size_suffix().replace(stem, "").into_owned()
}

/// `"{N} changes. _{slugs}_"` over every file of every proposal, or just
/// `"{N} changes."` when that would exceed [`SUMMARY_LIMIT`].
pub fn summary_message(proposals: &[ProposalReport]) -> String {
    let files = proposals.iter().flat_map(|p| p.files.iter());
    let count = files.clone().count();

    let mut slugs: Vec<String> = Vec::new();
    for file in files {
        let slug = slug_from_filename(&file.filename);
        if !slugs.contains(&slug) {
            slugs.push(slug);
        }
    }

    let message = format!("{count} changes. _{}_", slugs.join(", "));
    if message.chars().count() > SUMMARY_LIMIT {
        format!("{count} changes.")
    } else {
        message
    }
}

/// Per-proposal detail posted as a thread reply.
pub fn reply_message(proposal: &ProposalReport) -> String {
    let mut text = format!("<{}|{}>\n", proposal.commit.html_url, proposal.commit.message);
    if proposal.files.len() > 1 {
        text.push_str(&format!("{} changes\n", proposal.files.len()));
    }
    let lines: Vec<String> = proposal
        .files
        .iter()
        .map(|f| format!("• {} - _{}_", f.status, file_name(&f.filename)))
        .collect();
    text.push_str(&lines.join("\n"));
    text
}
