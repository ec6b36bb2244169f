//! Caller-visible conversation view.

use std::collections::BTreeMap;

use lectern_types::transcript::{Annotation, TranscriptEntry, Turn};

/// Merge a transcript with its annotations.
///
/// Skipped turns are dropped, every other turn appears exactly once in
/// sequence order, and an annotation's media reference takes precedence over
/// one carried by the turn's own parts. Consecutive turns sharing a sequence
/// number collapse into the first. Annotations without a matching turn are
/// ignored.
pub fn build_transcript_view(
    turns: &[Turn],
    annotations: &BTreeMap<u32, Annotation>,
) -> Vec<TranscriptEntry> {
    let mut view: Vec<TranscriptEntry> = Vec::with_capacity(turns.len());
    let mut previous = None;

    for turn in turns {
        if previous == Some(turn.sequence_no) {
            continue;
        }
        previous = Some(turn.sequence_no);

        let annotation = annotations.get(&turn.sequence_no);
        if annotation.is_some_and(|a| a.skip) {
            continue;
        }
        let media_ref = annotation
            .and_then(|a| a.media_ref.clone())
            .or_else(|| turn.parts.iter().find_map(|p| p.media_ref.clone()));
        view.push(TranscriptEntry {
            sequence_no: turn.sequence_no,
            role: turn.role,
            text: turn.text(),
            media_ref,
        });
    }
    view
}
