//! Command matcher - separates spoken commands from dictated content
//!
//! Final transcripts are matched by literal prefix: a keyword only counts when
//! the transcript starts with it, so a command phrase in the middle of a
//! dictated sentence stays content. Interim transcripts are only checked for
//! whether they could still grow into a keyword.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;
use tracing::debug;

use super::table::{normalize, Command, CommandTable};
use crate::state::ListeningMode;

/// Default interval in which a repeated keyword is not dispatched again
pub const DEFAULT_DEDUPE_WINDOW: Duration = Duration::from_millis(1500);

/// A command recognized in a final transcript
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchedCommand {
    /// The normalized keyword that matched
    pub keyword: String,
    pub command: Command,
}

/// Result of classifying a final transcript
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum MatchResult {
    /// Recognized command to dispatch
    Execute(MatchedCommand),
    /// Recognized command repeated inside the dedupe window; consume, don't dispatch
    Suppressed(MatchedCommand),
    /// Not a command
    Unmatched,
}

/// Most recent dispatched match
#[derive(Debug)]
struct DedupeWindow {
    window: Duration,
    last: Option<(String, Instant)>,
}

impl DedupeWindow {
    fn new(window: Duration) -> Self {
        Self { window, last: None }
    }

    /// Returns true if `keyword` repeats the last match within the window,
    /// otherwise records it as the last match.
    fn is_repeat(&mut self, keyword: &str, now: Instant) -> bool {
        if let Some((last_keyword, at)) = &self.last {
            if last_keyword == keyword && now.saturating_duration_since(*at) < self.window {
                return true;
            }
        }
        self.last = Some((keyword.to_string(), now));
        false
    }
}

/// Classifies transcript fragments against a command table
pub struct CommandMatcher {
    table: Arc<CommandTable>,
    dedupe: DedupeWindow,
}

impl CommandMatcher {
    pub fn new(table: Arc<CommandTable>) -> Self {
        Self::with_dedupe_window(table, DEFAULT_DEDUPE_WINDOW)
    }

    pub fn with_dedupe_window(table: Arc<CommandTable>, window: Duration) -> Self {
        Self {
            table,
            dedupe: DedupeWindow::new(window),
        }
    }

    pub fn table(&self) -> &CommandTable {
        &self.table
    }

    /// Classify a final transcript in the given mode
    pub fn match_final(&mut self, transcript: &str, mode: ListeningMode) -> MatchResult {
        self.match_final_at(transcript, mode, Instant::now())
    }

    pub fn match_final_at(
        &mut self,
        transcript: &str,
        mode: ListeningMode,
        now: Instant,
    ) -> MatchResult {
        let normalized = normalize(transcript);
        if normalized.is_empty() {
            return MatchResult::Unmatched;
        }

        let best = self
            .table
            .commands()
            .iter()
            .filter(|descriptor| descriptor.command.scope().is_valid_in(mode))
            .flat_map(|descriptor| {
                descriptor
                    .keywords
                    .iter()
                    .map(move |keyword| (keyword, descriptor.command))
            })
            .filter(|(keyword, _)| normalized.starts_with(keyword.as_str()))
            .max_by_key(|(keyword, _)| keyword.len());

        let Some((keyword, command)) = best else {
            return MatchResult::Unmatched;
        };

        let matched = MatchedCommand {
            keyword: keyword.clone(),
            command,
        };

        if self.dedupe.is_repeat(keyword, now) {
            debug!(keyword = %keyword, "repeated command suppressed");
            MatchResult::Suppressed(matched)
        } else {
            debug!(keyword = %keyword, %mode, "command matched");
            MatchResult::Execute(matched)
        }
    }

    /// Whether an interim transcript might still be (or become) a command
    ///
    /// Compares word by word against the leading words of every keyword. The
    /// last interim word may be an unfinished prefix of the keyword's word.
    pub fn could_be_command_prefix(&self, interim: &str) -> bool {
        let normalized = normalize(interim);
        let words: Vec<&str> = normalized.split_whitespace().collect();
        if words.is_empty() {
            return false;
        }

        self.table.keywords().any(|keyword| {
            let keyword_words: Vec<&str> = keyword.split_whitespace().collect();
            let still_growing = words.len() <= keyword_words.len();
            words
                .iter()
                .zip(&keyword_words)
                .enumerate()
                .all(|(i, (word, keyword_word))| {
                    if still_growing && i == words.len() - 1 {
                        keyword_word.starts_with(word)
                    } else {
                        word == keyword_word
                    }
                })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::table::{AppAction, CommandDescriptor, EditorAction, WakePhrase};
    use crate::state::ActiveKind;

    fn matcher() -> CommandMatcher {
        CommandMatcher::new(Arc::new(CommandTable::builtin()))
    }

    fn executed(result: MatchResult) -> Command {
        match result {
            MatchResult::Execute(matched) => matched.command,
            other => panic!("Expected Execute, got {:?}", other),
        }
    }

    #[test]
    fn test_prefix_match_with_trailing_words() {
        let mut matcher = matcher();
        let result = matcher.match_final("Save note please", ListeningMode::ActiveCommand);
        assert_eq!(executed(result), Command::App(AppAction::SaveNote));
    }

    #[test]
    fn test_mid_sentence_phrase_does_not_match() {
        let mut matcher = matcher();
        let result = matcher.match_final("please stop dictating now", ListeningMode::ActiveDictation);
        assert_eq!(result, MatchResult::Unmatched);
    }

    #[test]
    fn test_editor_command_only_while_dictating() {
        let mut matcher = matcher();
        assert_eq!(
            matcher.match_final("new paragraph", ListeningMode::ActiveCommand),
            MatchResult::Unmatched
        );
        assert_eq!(
            executed(matcher.match_final("new paragraph", ListeningMode::ActiveDictation)),
            Command::Editor(EditorAction::NewParagraph)
        );
    }

    #[test]
    fn test_app_command_in_both_active_modes() {
        let mut matcher = matcher();
        assert_eq!(
            executed(matcher.match_final("open settings", ListeningMode::ActiveCommand)),
            Command::App(AppAction::OpenSettings)
        );
        assert_eq!(
            executed(matcher.match_final("new note", ListeningMode::ActiveDictation)),
            Command::App(AppAction::NewNote)
        );
    }

    #[test]
    fn test_nothing_matches_outside_active_modes() {
        let mut matcher = matcher();
        assert_eq!(
            matcher.match_final("new note", ListeningMode::AmbientListening),
            MatchResult::Unmatched
        );
        assert_eq!(matcher.match_final("new note", ListeningMode::Idle), MatchResult::Unmatched);
    }

    #[test]
    fn test_longest_keyword_wins() {
        let table = CommandTable::new(
            vec![WakePhrase::new("hey notes", ActiveKind::Command)],
            vec![
                CommandDescriptor::new(&["delete"], Command::App(AppAction::DeleteNote)),
                CommandDescriptor::new(&["delete last word"], Command::Editor(EditorAction::DeleteLastWord)),
            ],
        )
        .unwrap();
        let mut matcher = CommandMatcher::new(Arc::new(table));
        let result = matcher.match_final("delete last word", ListeningMode::ActiveDictation);
        assert_eq!(executed(result), Command::Editor(EditorAction::DeleteLastWord));
    }

    #[test]
    fn test_repeat_within_window_is_suppressed() {
        let mut matcher = matcher();
        let start = Instant::now();
        let mode = ListeningMode::ActiveDictation;

        assert!(matches!(
            matcher.match_final_at("save note", mode, start),
            MatchResult::Execute(_)
        ));
        assert!(matches!(
            matcher.match_final_at("save note", mode, start + Duration::from_millis(400)),
            MatchResult::Suppressed(_)
        ));
        assert!(matches!(
            matcher.match_final_at("save note", mode, start + Duration::from_millis(1600)),
            MatchResult::Execute(_)
        ));
    }

    #[test]
    fn test_different_keyword_is_not_suppressed() {
        let mut matcher = matcher();
        let now = Instant::now();
        let mode = ListeningMode::ActiveDictation;
        assert!(matches!(matcher.match_final_at("undo that", mode, now), MatchResult::Execute(_)));
        assert!(matches!(matcher.match_final_at("redo that", mode, now), MatchResult::Execute(_)));
        assert!(matches!(matcher.match_final_at("undo that", mode, now), MatchResult::Execute(_)));
    }

    #[test]
    fn test_interim_prefix_detection() {
        let matcher = matcher();
        assert!(matcher.could_be_command_prefix("add"));
        assert!(matcher.could_be_command_prefix("add a task"));
        assert!(matcher.could_be_command_prefix("new par"));
        assert!(matcher.could_be_command_prefix("stop dictating now"));
        assert!(!matcher.could_be_command_prefix("add a task for groceries"));
        assert!(!matcher.could_be_command_prefix("please stop"));
        assert!(!matcher.could_be_command_prefix("   "));
    }
}
