//! Chat rendering for build events, command replies and errors.
//!
//! Every outbound line is a [`ChatLine`]; private lines print with the `/r`
//! reply prefix.

use blockwright_core::{BuildError, GateReport, Reply};
use blockwright_types::{BuildEvent, CheckpointRecord, PlanSource, Requester, SessionSummary};

/// Deficit strings shown in one chat line.
const DEFICITS_SHOWN: usize = 5;

/// One outbound chat message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatLine {
    /// Message text.
    pub text: String,
    /// Deliver as a private reply.
    pub private: bool,
}

impl ChatLine {
    /// A line for global chat.
    pub fn public(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            private: false,
        }
    }

    /// A line addressed to `requester`, honouring their delivery mode.
    pub fn to(requester: &Requester, text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            private: requester.delivery_is_private,
        }
    }

    fn routed(requester: Option<&Requester>, text: impl Into<String>) -> Self {
        match requester {
            Some(r) => Self::to(r, text),
            None => Self::public(text),
        }
    }
}

impl core::fmt::Display for ChatLine {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        if self.private {
            write!(f, "/r {}", self.text)
        } else {
            f.write_str(&self.text)
        }
    }
}

/// Command reference printed by `!help`.
pub const HELP_LINES: &[&str] = &[
    "!build <file> [palette] [WIDTHxHEIGHT] [speed] - build an image from the images folder",
    "!url <url> [palette] [WIDTHxHEIGHT] [speed] - download an image and build it",
    "!schem <file> [speed 0.1-5.0] [chests:true|false] - build a schematic, restocking from chests",
    "!pause / !resume / !stop - control the current build",
    "!status - progress of the current build",
    "!inventory - materials still needed",
    "!list - buildable files, !history [n] - finished builds",
    "Palette: wool, concrete, basic, all",
];

/// Help text for `requester`.
pub fn help(requester: &Requester) -> Vec<ChatLine> {
    HELP_LINES
        .iter()
        .map(|line| ChatLine::to(requester, *line))
        .collect()
}

/// Chat lines for an event published by the executor.
pub fn event(event: &BuildEvent) -> Vec<ChatLine> {
    let to = |text: String| vec![ChatLine::routed(event.requester(), text)];
    match event {
        BuildEvent::Started {
            source,
            total,
            dimensions,
            deficits,
            requester,
            ..
        } => {
            let mut lines = vec![ChatLine::to(
                requester,
                format!("Building {source} ({dimensions}): {total} blocks"),
            )];
            if !deficits.is_empty() {
                lines.push(ChatLine::to(
                    requester,
                    format!("Missing materials: {}", shortlist(deficits)),
                ));
            }
            lines
        }
        BuildEvent::Progress {
            placed,
            total,
            percent,
            ..
        } => to(format!("Progress: {placed}/{total} blocks ({percent}%)")),
        BuildEvent::Paused {
            reason, placed, ..
        } => to(format!(
            "Build paused after {placed} blocks: {}. Use !resume to continue",
            reason.describe()
        )),
        BuildEvent::Resumed { placed, total, .. } => {
            to(format!("Resuming build at {placed}/{total} blocks"))
        }
        BuildEvent::Relocating { distance, .. } => to(format!(
            "Returning to the build site ({distance:.1} blocks away)"
        )),
        BuildEvent::Completed { summary, .. } => {
            let mut text = format!(
                "Build complete: {} blocks in {}",
                summary.total_placed,
                elapsed(summary.elapsed_seconds)
            );
            if summary.skipped > 0 {
                text.push_str(&format!(" ({} skipped)", summary.skipped));
            }
            to(text)
        }
        BuildEvent::Cancelled { placed, total, .. } => {
            to(format!("Build stopped at {placed}/{total} blocks"))
        }
        BuildEvent::Error { detail, .. } => to(format!("Error: {detail}")),
        BuildEvent::UnfinishedBuild {
            source,
            placed,
            total,
            percent,
            ..
        } => to(format!(
            "Found an unfinished build of {source} at {placed}/{total} ({percent}%). \
             Use !resume to continue or !stop to discard it"
        )),
    }
}

/// Chat lines answering a command.
///
/// Start, pause, resume and stop are announced by their events, so their
/// summaries render nothing here.
pub fn reply(requester: &Requester, reply: &Reply) -> Vec<ChatLine> {
    match reply {
        Reply::Summary(_) => Vec::new(),
        Reply::Status(None) => vec![ChatLine::to(requester, "No active build")],
        Reply::Status(Some(summary)) => vec![ChatLine::to(requester, status(summary))],
        Reply::Plans(plans) => vec![ChatLine::to(requester, plan_list(plans))],
        Reply::History(records) if records.is_empty() => {
            vec![ChatLine::to(requester, "No finished builds yet")]
        }
        Reply::History(records) => records
            .iter()
            .map(|record| ChatLine::to(requester, history_entry(record)))
            .collect(),
        Reply::Inventory(report) => vec![ChatLine::to(requester, inventory(report))],
    }
}

/// Chat line for a rejected command.
pub fn failure(requester: &Requester, error: &impl core::fmt::Display) -> ChatLine {
    ChatLine::to(requester, format!("Cannot do that: {error}"))
}

/// Chat line for a command rejected by the executor.
pub fn build_error(requester: &Requester, error: &BuildError) -> ChatLine {
    match error {
        BuildError::UnfinishedBuild { .. } => ChatLine::to(
            requester,
            "An unfinished build exists. Use !resume to continue or !stop to discard it",
        ),
        other => failure(requester, other),
    }
}

fn status(summary: &SessionSummary) -> String {
    let mut text = format!(
        "{} {}: {}/{} blocks ({}%), running {}",
        capitalized(summary.status.as_str()),
        summary.source,
        summary.placed,
        summary.total,
        summary.percent,
        elapsed(summary.elapsed_seconds)
    );
    if summary.skipped > 0 {
        text.push_str(&format!(", {} skipped", summary.skipped));
    }
    if let Some(distance) = summary.distance_to_origin {
        text.push_str(&format!(", {distance:.1} blocks from the site"));
    }
    if let Some(reason) = &summary.pause_reason {
        text.push_str(&format!(" [{}]", reason.describe()));
    }
    text
}

fn plan_list(plans: &[PlanSource]) -> String {
    if plans.is_empty() {
        return "No buildable files found".to_owned();
    }
    let files: Vec<&str> = plans.iter().map(PlanSource::file).collect();
    format!("Buildable files: {}", files.join(", "))
}

fn history_entry(record: &CheckpointRecord) -> String {
    format!(
        "{} {} {}: {}/{} blocks for {}",
        record.build_id.short(),
        record.plan_source,
        record.status,
        record.placed_count,
        record.total_count,
        record.requester
    )
}

fn inventory(report: &GateReport) -> String {
    if report.is_satisfied() {
        return format!("All {} materials are in the inventory", report.lines.len());
    }
    format!(
        "Missing {} blocks: {}",
        report.total_deficit(),
        shortlist(&report.deficits)
    )
}

fn shortlist(deficits: &[String]) -> String {
    let shown: Vec<&str> = deficits
        .iter()
        .take(DEFICITS_SHOWN)
        .map(String::as_str)
        .collect();
    let hidden = deficits.len().saturating_sub(DEFICITS_SHOWN);
    if hidden == 0 {
        shown.join(", ")
    } else {
        format!("{} and {hidden} more", shown.join(", "))
    }
}

fn elapsed(seconds: i64) -> String {
    let minutes = seconds.div_euclid(60);
    let rest = seconds.rem_euclid(60);
    if minutes == 0 {
        format!("{rest}s")
    } else {
        format!("{minutes}m {rest}s")
    }
}

fn capitalized(word: &str) -> String {
    let mut chars = word.chars();
    chars.next().map_or_else(String::new, |first| {
        first.to_uppercase().chain(chars).collect()
    })
}
