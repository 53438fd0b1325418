//! Mother-signal priority filter.
//!
//! Collapses a turn's candidate signals into at most one primary signal
//! plus, for co-occurring tool intents, one secondary tool. Pure function
//! over the bundle; callers act on the result.

use nela_shared::{SignalBundle, SignalKind};

/// Result of filtering one turn's bundle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterOutcome {
    pub primary: Option<SignalKind>,
    /// Second tool intent, only when the primary is itself a tool intent
    pub secondary_tool: Option<SignalKind>,
    /// Candidates suppressed by priority
    pub filtered_out: Vec<SignalKind>,
}

impl FilterOutcome {
    fn empty() -> Self {
        Self {
            primary: None,
            secondary_tool: None,
            filtered_out: vec![],
        }
    }
}

/// Pick the winning signal(s) for this turn.
///
/// Tool intents are the ones that legitimately co-occur in one sentence
/// ("delete X and create Y"), so a tool primary may carry a tool
/// secondary. Mixing a tool intent with a conversational one suppresses
/// the lower-priority candidate instead.
pub fn filter_signals(bundle: &SignalBundle) -> FilterOutcome {
    let mut candidates = bundle.detected_kinds();
    if candidates.is_empty() {
        return FilterOutcome::empty();
    }
    if candidates.len() == 1 {
        return FilterOutcome {
            primary: Some(candidates[0]),
            secondary_tool: None,
            filtered_out: vec![],
        };
    }

    candidates.sort_by_key(|k| k.rank());
    let primary = candidates.remove(0);

    let secondary_tool = if primary.is_dual_eligible() {
        candidates
            .iter()
            .copied()
            .find(|k| k.is_dual_eligible())
    } else {
        None
    };

    let filtered_out = candidates
        .into_iter()
        .filter(|k| Some(*k) != secondary_tool)
        .collect();

    FilterOutcome {
        primary: Some(primary),
        secondary_tool,
        filtered_out,
    }
}
