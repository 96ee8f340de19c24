//! Command table: the declarative list of voice commands and wake phrases
//!
//! Pure data. The built-in table covers the note app's own commands; a JSON
//! file with the same shape can replace it.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::TableError;
use crate::state::{ActiveKind, ListeningMode};

/// Actions the application itself handles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppAction {
    StartDictation,
    StopListening,
    NewNote,
    SaveNote,
    DeleteNote,
    SearchNotes,
    OpenSettings,
    SummarizeNote,
    ProofreadNote,
}

/// Actions forwarded to the note editor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EditorAction {
    NewLine,
    NewParagraph,
    InsertBulletList,
    InsertNumberedList,
    InsertTaskList,
    DeleteLastWord,
    DeleteLastSentence,
    Undo,
    Redo,
}

/// Where a command is valid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandScope {
    /// Valid in command and dictation sessions
    App,
    /// Valid only while dictating
    Editor,
}

impl CommandScope {
    pub fn is_valid_in(self, mode: ListeningMode) -> bool {
        match self {
            CommandScope::App => mode.is_active(),
            CommandScope::Editor => mode == ListeningMode::ActiveDictation,
        }
    }
}

/// What happens when a command matches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Command {
    App(AppAction),
    Editor(EditorAction),
}

impl Command {
    pub fn scope(self) -> CommandScope {
        match self {
            Command::App(_) => CommandScope::App,
            Command::Editor(_) => CommandScope::Editor,
        }
    }

    /// Whether running the command opens or closes a session
    pub fn changes_lifecycle(self) -> bool {
        matches!(
            self,
            Command::App(AppAction::StartDictation | AppAction::StopListening)
        )
    }
}

/// One command and the phrases that trigger it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandDescriptor {
    pub keywords: Vec<String>,
    pub command: Command,
}

impl CommandDescriptor {
    pub fn new(keywords: &[&str], command: Command) -> Self {
        Self {
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
            command,
        }
    }
}

/// Utterance that promotes ambient listening to an active mode
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WakePhrase {
    pub phrase: String,
    pub mode: ActiveKind,
}

impl WakePhrase {
    pub fn new(phrase: &str, mode: ActiveKind) -> Self {
        Self {
            phrase: phrase.to_string(),
            mode,
        }
    }
}

/// Validated set of wake phrases and command descriptors
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandTable {
    wake_phrases: Vec<WakePhrase>,
    commands: Vec<CommandDescriptor>,
}

/// Lowercase and trim, the only normalization applied to phrases
pub fn normalize(text: &str) -> String {
    text.trim().to_lowercase()
}

impl CommandTable {
    /// Build a table, normalizing phrases and rejecting invalid ones
    pub fn new(
        wake_phrases: Vec<WakePhrase>,
        commands: Vec<CommandDescriptor>,
    ) -> Result<Self, TableError> {
        let mut table = Self {
            wake_phrases,
            commands,
        };
        table.normalize_and_validate()?;
        Ok(table)
    }

    /// Parse a table from its JSON form
    pub fn from_json(json: &str) -> Result<Self, TableError> {
        let raw: CommandTable = serde_json::from_str(json)?;
        Self::new(raw.wake_phrases, raw.commands)
    }

    /// Load a table from a JSON file
    pub fn load(path: &Path) -> Result<Self, TableError> {
        let json = std::fs::read_to_string(path)?;
        let table = Self::from_json(&json)?;
        info!(
            ?path,
            commands = table.commands.len(),
            wake_phrases = table.wake_phrases.len(),
            "command table loaded"
        );
        Ok(table)
    }

    /// The table shipped with the application
    pub fn builtin() -> Self {
        use AppAction::*;
        use EditorAction::*;

        let wake_phrases = vec![
            WakePhrase::new("hey notes", ActiveKind::Command),
            WakePhrase::new("hey notes take a note", ActiveKind::Dictation),
            WakePhrase::new("hey notes start dictation", ActiveKind::Dictation),
        ];

        let commands = vec![
            CommandDescriptor::new(
                &["start dictation", "start dictating", "take a note"],
                Command::App(StartDictation),
            ),
            CommandDescriptor::new(
                &["stop dictating", "stop dictation", "stop listening"],
                Command::App(StopListening),
            ),
            CommandDescriptor::new(&["new note", "create a new note", "create note"], Command::App(NewNote)),
            CommandDescriptor::new(&["save note", "save this note"], Command::App(SaveNote)),
            CommandDescriptor::new(&["delete note", "delete this note"], Command::App(DeleteNote)),
            CommandDescriptor::new(&["search notes", "find note"], Command::App(SearchNotes)),
            CommandDescriptor::new(&["open settings"], Command::App(OpenSettings)),
            CommandDescriptor::new(&["summarize note", "summarize this note"], Command::App(SummarizeNote)),
            CommandDescriptor::new(&["proofread note", "proofread this note"], Command::App(ProofreadNote)),
            CommandDescriptor::new(&["new line"], Command::Editor(NewLine)),
            CommandDescriptor::new(&["new paragraph"], Command::Editor(NewParagraph)),
            CommandDescriptor::new(
                &["insert bullet list", "add a bullet list"],
                Command::Editor(InsertBulletList),
            ),
            CommandDescriptor::new(
                &["insert numbered list", "add a numbered list"],
                Command::Editor(InsertNumberedList),
            ),
            CommandDescriptor::new(
                &["insert task list", "add a task list"],
                Command::Editor(InsertTaskList),
            ),
            CommandDescriptor::new(&["delete last word", "delete that word"], Command::Editor(DeleteLastWord)),
            CommandDescriptor::new(&["delete last sentence"], Command::Editor(DeleteLastSentence)),
            CommandDescriptor::new(&["undo that", "undo last change"], Command::Editor(Undo)),
            CommandDescriptor::new(&["redo that"], Command::Editor(Redo)),
        ];

        Self {
            wake_phrases,
            commands,
        }
    }

    pub fn commands(&self) -> &[CommandDescriptor] {
        &self.commands
    }

    pub fn wake_phrases(&self) -> &[WakePhrase] {
        &self.wake_phrases
    }

    /// Every keyword of every descriptor
    pub fn keywords(&self) -> impl Iterator<Item = &str> {
        self.commands
            .iter()
            .flat_map(|c| c.keywords.iter().map(String::as_str))
    }

    /// Find the longest wake phrase contained in an ambient transcript
    pub fn match_wake_phrase(&self, transcript: &str) -> Option<&WakePhrase> {
        let normalized = normalize(transcript);
        self.wake_phrases
            .iter()
            .filter(|w| normalized.contains(w.phrase.as_str()))
            .max_by_key(|w| w.phrase.len())
    }

    fn normalize_and_validate(&mut self) -> Result<(), TableError> {
        if self.wake_phrases.is_empty() {
            return Err(TableError::NoWakePhrases);
        }
        for wake in &mut self.wake_phrases {
            wake.phrase = normalize(&wake.phrase);
            if wake.phrase.is_empty() {
                return Err(TableError::EmptyWakePhrase);
            }
        }

        let mut seen = HashSet::new();
        for (index, descriptor) in self.commands.iter_mut().enumerate() {
            for keyword in &mut descriptor.keywords {
                *keyword = normalize(keyword);
                if keyword.is_empty() {
                    return Err(TableError::EmptyKeyword { index });
                }
                if !seen.insert(keyword.clone()) {
                    return Err(TableError::DuplicateKeyword(keyword.clone()));
                }
            }
        }
        Ok(())
    }
}

impl Default for CommandTable {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_builtin_table_is_valid() {
        let builtin = CommandTable::builtin();
        let rebuilt = CommandTable::new(
            builtin.wake_phrases().to_vec(),
            builtin.commands().to_vec(),
        );
        assert!(rebuilt.is_ok());
    }

    #[test]
    fn test_scope_validity() {
        assert!(CommandScope::App.is_valid_in(ListeningMode::ActiveCommand));
        assert!(CommandScope::App.is_valid_in(ListeningMode::ActiveDictation));
        assert!(!CommandScope::Editor.is_valid_in(ListeningMode::ActiveCommand));
        assert!(CommandScope::Editor.is_valid_in(ListeningMode::ActiveDictation));
        assert!(!CommandScope::App.is_valid_in(ListeningMode::AmbientListening));
    }

    #[test]
    fn test_lifecycle_commands() {
        assert!(Command::App(AppAction::StartDictation).changes_lifecycle());
        assert!(Command::App(AppAction::StopListening).changes_lifecycle());
        assert!(!Command::App(AppAction::SaveNote).changes_lifecycle());
        assert!(!Command::Editor(EditorAction::Undo).changes_lifecycle());
    }

    #[test]
    fn test_from_json_normalizes_keywords() {
        let json = r#"{
            "wake_phrases": [{"phrase": "  Hey Notes ", "mode": "command"}],
            "commands": [
                {"keywords": ["New Note"], "command": {"app": "new_note"}},
                {"keywords": ["Undo That"], "command": {"editor": "undo"}}
            ]
        }"#;
        let table = CommandTable::from_json(json).unwrap();
        assert_eq!(table.wake_phrases()[0].phrase, "hey notes");
        assert_eq!(table.keywords().collect::<Vec<_>>(), vec!["new note", "undo that"]);
        assert_eq!(table.commands()[1].command.scope(), CommandScope::Editor);
    }

    #[test]
    fn test_duplicate_keyword_rejected() {
        let result = CommandTable::new(
            vec![WakePhrase::new("hey notes", ActiveKind::Command)],
            vec![
                CommandDescriptor::new(&["save note"], Command::App(AppAction::SaveNote)),
                CommandDescriptor::new(&["Save Note"], Command::App(AppAction::NewNote)),
            ],
        );
        assert!(matches!(result, Err(TableError::DuplicateKeyword(k)) if k == "save note"));
    }

    #[test]
    fn test_empty_keyword_and_missing_wake_rejected() {
        let result = CommandTable::new(
            vec![WakePhrase::new("hey notes", ActiveKind::Command)],
            vec![CommandDescriptor::new(&["  "], Command::App(AppAction::SaveNote))],
        );
        assert!(matches!(result, Err(TableError::EmptyKeyword { index: 0 })));

        let result = CommandTable::new(Vec::new(), Vec::new());
        assert!(matches!(result, Err(TableError::NoWakePhrases)));
    }

    #[test]
    fn test_longest_wake_phrase_wins() {
        let table = CommandTable::builtin();
        let wake = table.match_wake_phrase("OK hey notes take a note").unwrap();
        assert_eq!(wake.mode, ActiveKind::Dictation);

        let wake = table.match_wake_phrase("hey notes").unwrap();
        assert_eq!(wake.mode, ActiveKind::Command);

        assert!(table.match_wake_phrase("hello there").is_none());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let json = serde_json::to_string(&CommandTable::builtin()).unwrap();
        file.write_all(json.as_bytes()).unwrap();

        let table = CommandTable::load(file.path()).unwrap();
        assert_eq!(table, CommandTable::builtin());
    }

    #[test]
    fn test_load_missing_file_fails() {
        let result = CommandTable::load(Path::new("/nonexistent/commands.json"));
        assert!(matches!(result, Err(TableError::Io(_))));
    }
}
