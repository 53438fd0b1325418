//! Phrase variation for acknowledgments and add-ons.
//!
//! Wording is picked deterministically from small pools, seeded by the
//! topic identity, so repeated deferrals of the same topic stay consistent
//! while different topics don't parrot one sentence.

use nela_shared::{MachineKind, ToolCandidate};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Generate a hash seed from a string
pub fn seed_from_str(s: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    s.hash(&mut hasher);
    hasher.finish()
}

fn topic_phrase(machine: MachineKind, target: Option<&str>) -> String {
    match target {
        Some(t) => format!("{} ({})", machine.label(), t),
        None => machine.label().to_string(),
    }
}

/// First time a topic gets parked behind a running machine
pub fn first_deferral_ack(machine: MachineKind, target: Option<&str>, seed: u64) -> String {
    let topic = topic_phrase(machine, target);
    let templates = [
        format!("Got it - I'll come back to {} once we finish here.", topic),
        format!("Noted. Let's wrap up what we're doing, then I'll pick up {}.", topic),
        format!("I've made a note about {} and will bring it up right after this.", topic),
    ];
    templates[(seed as usize) % templates.len()].clone()
}

/// The same topic raised again while still parked
pub fn repeat_deferral_ack(machine: MachineKind, target: Option<&str>, seed: u64) -> String {
    let topic = topic_phrase(machine, target);
    let templates = [
        format!("Still on my list - {} is up right after this.", topic),
        format!("I haven't forgotten about {}; one thing at a time.", topic),
        format!("{} is queued, I promise we'll get to it.", topic),
    ];
    templates[(seed as usize) % templates.len()].clone()
}

/// Auto-launch info line: tool A runs now, tool B right after
pub fn dual_tool_info(tool_a: &ToolCandidate, tool_b: &ToolCandidate, seed: u64) -> String {
    let a = tool_a.describe();
    let b = tool_b.describe();
    let templates = [
        format!("I'll {} now, and {} right after.", a, b),
        format!("Let's {} first; {} is next on the list.", a, b),
        format!("Starting with {}. Once that's done I'll {}.", a, b),
    ];
    templates[(seed as usize) % templates.len()].clone()
}

/// Confirmation question for an ambiguous dual-tool utterance
pub fn dual_tool_confirmation(tool_a: &ToolCandidate, tool_b: &ToolCandidate, seed: u64) -> String {
    let a = tool_a.describe();
    let b = tool_b.describe();
    let templates = [
        format!(
            "Just to be sure: should I {} and then {}, or only one of those?",
            a, b
        ),
        format!(
            "I heard two things - {} and {}. Do both, in that order, or just one?",
            a, b
        ),
        format!("Want me to {} first and {} after, or did you mean only one?", a, b),
    ];
    templates[(seed as usize) % templates.len()].clone()
}

/// Re-ask after an unclear answer to the confirmation question
pub fn dual_tool_reask(tool_a: &ToolCandidate, tool_b: &ToolCandidate) -> String {
    format!(
        "Sorry, I still need a quick answer: {} / {} / both / neither?",
        tool_a.describe(),
        tool_b.describe()
    )
}

/// Both tools parked because a machine already owns the conversation
pub fn dual_tool_notification(
    active: MachineKind,
    active_target: Option<&str>,
    tool_a: &ToolCandidate,
    tool_b: &ToolCandidate,
    seed: u64,
) -> String {
    let current = topic_phrase(active, active_target);
    let templates = [
        format!(
            "We're in the middle of {} - I'll handle {} and {} right afterwards.",
            current,
            tool_a.describe(),
            tool_b.describe()
        ),
        format!(
            "Let me finish {} first; then I'll take care of {} and {}.",
            current,
            tool_a.describe(),
            tool_b.describe()
        ),
    ];
    templates[(seed as usize) % templates.len()].clone()
}

/// Bringing a parked topic back once the conversation is free
pub fn resurface_note(machine: MachineKind, target: Option<&str>, seed: u64) -> String {
    let topic = topic_phrase(machine, target);
    let templates = [
        format!("Earlier you mentioned {} - let's do that now.", topic),
        format!("Picking up where we left off: {}.", topic),
        format!("Now that we're done, let's get to {}.", topic),
    ];
    templates[(seed as usize) % templates.len()].clone()
}
