//! Voice command table and matcher

mod matcher;
mod table;

pub use matcher::{CommandMatcher, MatchResult, MatchedCommand, DEFAULT_DEDUPE_WINDOW};
pub use table::{
    normalize, AppAction, Command, CommandDescriptor, CommandScope, CommandTable, EditorAction,
    WakePhrase,
};
