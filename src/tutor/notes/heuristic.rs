//! Rule-based study notes used when the generative backend is unavailable.

use crate::tutor::types::{ConversationTurn, TurnRole};

/// Placeholder bullet for a section without source material.
pub const NONE_DISCUSSED: &str = "- None discussed";

/// Fixed next step suggested whenever the student spoke.
pub const PRACTICE_STEP: &str = "- Suggested next step: Review the main ideas from this conversation and practice with 1–2 example problems.";

/// Section headings, in output order.
pub const SECTION_HEADINGS: [&str; 3] = [
    "## Main Topics",
    "## Key Explanations & Insights",
    "## Action Items & Next Steps",
];

fn texts_by(turns: &[ConversationTurn], role: TurnRole) -> impl Iterator<Item = &str> {
    turns
        .iter()
        .filter(move |turn| turn.role() == role)
        .map(ConversationTurn::text)
}

/// Collapse multi-line turn text so it stays inside one bullet.
fn single_line(text: &str) -> String {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Summarize a transcript without a model.
///
/// The first student turn (or the first tutor turn when the student never
/// spoke) is the main topic, the last tutor turn is the key explanation.
#[must_use]
pub fn heuristic_notes(turns: &[ConversationTurn]) -> String {
    let first_user = texts_by(turns, TurnRole::User).next();
    let first_assistant = texts_by(turns, TurnRole::Assistant).next();
    let last_assistant = texts_by(turns, TurnRole::Assistant).last();

    let main_topic = first_user
        .or(first_assistant)
        .map_or_else(|| NONE_DISCUSSED.to_string(), |text| {
            format!("- Main question or topic: {}", single_line(text))
        });

    let key_explanation = last_assistant.map_or_else(
        || NONE_DISCUSSED.to_string(),
        |text| format!("- Key explanation from tutor: {}", single_line(text)),
    );

    let action_item = if first_user.is_some() {
        PRACTICE_STEP
    } else {
        NONE_DISCUSSED
    };

    let [topics, insights, actions] = SECTION_HEADINGS;
    [
        topics,
        &main_topic,
        "",
        insights,
        &key_explanation,
        "",
        actions,
        action_item,
    ]
    .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn turn(role: TurnRole, text: &str) -> ConversationTurn {
        ConversationTurn::new(role, text).expect("non-empty text")
    }

    fn headings(notes: &str) -> Vec<&str> {
        notes.lines().filter(|line| line.starts_with("## ")).collect()
    }

    #[test]
    fn test_photosynthesis_scenario() {
        let turns = vec![
            turn(TurnRole::User, "What is photosynthesis?"),
            turn(TurnRole::Assistant, "It's how plants convert light to energy."),
        ];

        let notes = heuristic_notes(&turns);
        assert!(notes.contains("- Main question or topic: What is photosynthesis?"));
        assert!(notes.contains("- Key explanation from tutor: It's how plants convert light to energy."));
        assert!(notes.contains(PRACTICE_STEP));
        assert_eq!(headings(&notes), SECTION_HEADINGS);
    }

    #[test]
    fn test_assistant_only_transcript() {
        let turns = vec![
            turn(TurnRole::Assistant, "Hi! What shall we learn today?"),
            turn(TurnRole::Assistant, "Are you still there?"),
        ];

        let notes = heuristic_notes(&turns);
        assert!(notes.contains("- Main question or topic: Hi! What shall we learn today?"));
        assert!(notes.contains("- Key explanation from tutor: Are you still there?"));
        assert!(!notes.contains(PRACTICE_STEP));
        assert_eq!(notes.matches(NONE_DISCUSSED).count(), 1);
    }

    #[test]
    fn test_user_only_transcript() {
        let turns = vec![
            turn(TurnRole::User, "Fractions are parts of a whole."),
            turn(TurnRole::User, "Like one half."),
        ];

        let notes = heuristic_notes(&turns);
        assert!(notes.contains("- Main question or topic: Fractions are parts of a whole."));
        assert!(notes.contains("## Key Explanations & Insights\n- None discussed"));
        assert!(notes.contains(PRACTICE_STEP));
    }

    #[test]
    fn test_multiline_turns_stay_in_one_bullet() {
        let turns = vec![
            turn(TurnRole::User, "Topic one\n## Sneaky heading\r\n- extra bullet"),
            turn(TurnRole::Assistant, "Line A\n\n## Another\nLine B"),
        ];

        let notes = heuristic_notes(&turns);
        assert_eq!(headings(&notes), SECTION_HEADINGS);
        assert!(notes.contains("- Main question or topic: Topic one ## Sneaky heading - extra bullet"));
        assert!(notes.contains("- Key explanation from tutor: Line A ## Another Line B"));
        let bullets = notes.lines().filter(|line| line.starts_with("- ")).count();
        assert_eq!(bullets, 3);
    }

    #[test]
    fn test_always_three_sections_in_order() {
        let cases: Vec<Vec<ConversationTurn>> = vec![
            vec![],
            vec![turn(TurnRole::User, "a")],
            vec![turn(TurnRole::Assistant, "b")],
            vec![turn(TurnRole::User, "a"), turn(TurnRole::Assistant, "b"), turn(TurnRole::User, "c")],
        ];

        for turns in cases {
            let notes = heuristic_notes(&turns);
            assert_eq!(headings(&notes), SECTION_HEADINGS);
            let bullets = notes.lines().filter(|line| line.starts_with("- ")).count();
            assert_eq!(bullets, 3, "each section has exactly one bullet: {notes}");
        }
    }
}
