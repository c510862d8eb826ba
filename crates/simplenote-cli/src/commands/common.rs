use std::env;
use std::io::{self, IsTerminal, Read};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::Utc;
use serde::Serialize;
use simplenote_core::api::{HttpNoteClient, ReqwestTransport};
use simplenote_core::auth::AuthGateway;
use simplenote_core::config::ClientConfig;
use simplenote_core::db::{Database, SqliteNoteCache};
use simplenote_core::sync::SyncEngine;
use simplenote_core::{Note, NoteId};

use crate::config_profiles::CliProfilesConfig;
use crate::credentials::KeyringCredentialStore;
use crate::error::CliError;

pub const DB_PATH_ENV: &str = "SIMPLENOTE_DB_PATH";
const TITLE_MAX_CHARS: usize = 80;

/// Resolved profile: its name and the validated client config.
#[derive(Debug, Clone)]
pub struct ProfileContext {
    pub name: String,
    pub client_config: ClientConfig,
}

impl ProfileContext {
    pub fn load(explicit: Option<&str>) -> Result<Self, CliError> {
        let config = CliProfilesConfig::load().map_err(CliError::Config)?;
        let name = config.resolve_profile_name(explicit);
        let client_config = config
            .profile(&name)
            .cloned()
            .unwrap_or_default()
            .client_config()?;
        Ok(Self {
            name,
            client_config,
        })
    }

    pub fn credential_store(&self) -> KeyringCredentialStore {
        KeyringCredentialStore::new(&self.name)
    }

    pub fn gateway(&self) -> Result<AuthGateway, CliError> {
        let transport = ReqwestTransport::new(self.client_config.clone())?;
        Ok(AuthGateway::new(
            Arc::new(transport),
            Arc::new(self.credential_store()),
        ))
    }

    /// Engine over the profile's server and the local cache at `db_path`.
    pub fn open_engine(&self, db_path: &Path) -> Result<SyncEngine, CliError> {
        let remote = HttpNoteClient::new(self.gateway()?);
        let cache = SqliteNoteCache::new(Database::open(db_path)?);
        Ok(SyncEngine::new(Arc::new(remote), Arc::new(cache))?)
    }
}

#[derive(Debug, Serialize)]
pub struct NoteListItem {
    pub id: i64,
    pub title: String,
    pub content: String,
    pub created_at: i64,
    pub updated_at: i64,
    pub relative_time: String,
    /// The server has not acknowledged this note yet.
    pub pending: bool,
}

pub fn note_to_list_item(note: &Note) -> NoteListItem {
    let now_ms = Utc::now().timestamp_millis();
    NoteListItem {
        id: note.id.get(),
        title: note.title.clone(),
        content: note.content.clone(),
        created_at: note.created_at,
        updated_at: note.updated_at,
        relative_time: format_relative_time(note.updated_at, now_ms),
        pending: note.is_pending(),
    }
}

pub fn format_note_lines(notes: &[Note]) -> Vec<String> {
    let now_ms = Utc::now().timestamp_millis();
    notes
        .iter()
        .map(|note| {
            let id = note.id.to_string();
            let preview = note_preview(note, 40);
            let relative_time = format_relative_time(note.updated_at, now_ms);
            if note.is_pending() {
                format!("{id:>14}  {preview:<40}  {relative_time:<10}  (not synced)")
            } else {
                format!("{id:>14}  {preview:<40}  {relative_time}")
            }
        })
        .collect()
}

pub fn note_preview(note: &Note, max_chars: usize) -> String {
    let source = note.title_preview(usize::MAX);
    let collapsed = source.split_whitespace().collect::<Vec<_>>().join(" ");

    if collapsed.chars().count() <= max_chars {
        collapsed
    } else {
        let take_len = max_chars.saturating_sub(3);
        let mut truncated = collapsed.chars().take(take_len).collect::<String>();
        truncated.push_str("...");
        truncated
    }
}

pub fn format_sync_timestamp(timestamp_ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(timestamp_ms).map_or_else(
        || timestamp_ms.to_string(),
        |date_time| date_time.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    )
}

pub fn format_relative_time(timestamp_ms: i64, now_ms: i64) -> String {
    let diff = now_ms.saturating_sub(timestamp_ms);
    let minute = 60_000;
    let hour = 60 * minute;
    let day = 24 * hour;
    let week = 7 * day;
    let month = 30 * day;
    let year = 365 * day;

    if diff < minute {
        "just now".to_string()
    } else if diff < hour {
        format!("{}m ago", diff / minute)
    } else if diff < day {
        format!("{}h ago", diff / hour)
    } else if diff < week {
        format!("{}d ago", diff / day)
    } else if diff < month {
        format!("{}w ago", diff / week)
    } else if diff < year {
        format!("{}mo ago", diff / month)
    } else {
        format!("{}y ago", diff / year)
    }
}

/// Split free text into a title and a body.
///
/// An explicit title keeps the whole text as the body. Otherwise the first
/// line becomes the title and the remaining lines the body.
pub fn split_title(explicit_title: Option<&str>, text: &str) -> (String, String) {
    if let Some(title) = explicit_title.and_then(normalize_content) {
        return (title, text.to_string());
    }

    let mut lines = text.splitn(2, '\n');
    let first = lines.next().unwrap_or("").trim();
    let rest = lines.next().unwrap_or("").trim();
    let title = first.chars().take(TITLE_MAX_CHARS).collect::<String>();
    (title, rest.to_string())
}

pub fn resolve_note_content(content_parts: &[String]) -> Result<String, CliError> {
    if let Some(content) = normalize_content(&content_parts.join(" ")) {
        return Ok(content);
    }

    if let Some(content) = read_piped_stdin()? {
        return Ok(content);
    }

    if let Some(content) = capture_editor_input()? {
        return Ok(content);
    }

    Err(CliError::EmptyContent)
}

pub fn normalize_content(content: &str) -> Option<String> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

pub fn parse_note_id(id: &str) -> Result<NoteId, CliError> {
    let trimmed = id.trim();
    if trimmed.is_empty() {
        return Err(CliError::EmptyNoteId);
    }
    match trimmed.parse::<NoteId>() {
        Ok(note_id) if note_id.get() != 0 => Ok(note_id),
        _ => Err(CliError::InvalidNoteId(trimmed.to_string())),
    }
}

pub fn find_note(engine: &SyncEngine, id: &str) -> Result<Note, CliError> {
    let note_id = parse_note_id(id)?;
    engine
        .note(note_id)?
        .ok_or_else(|| CliError::NoteNotFound(note_id.to_string()))
}

pub fn read_piped_stdin() -> Result<Option<String>, CliError> {
    let stdin = io::stdin();
    if stdin.is_terminal() {
        return Ok(None);
    }

    let mut buffer = String::new();
    stdin.lock().read_to_string(&mut buffer)?;
    Ok(normalize_content(&buffer))
}

pub fn capture_editor_input() -> Result<Option<String>, CliError> {
    capture_editor_input_with_initial("")
}

pub fn capture_editor_input_with_initial(
    initial_content: &str,
) -> Result<Option<String>, CliError> {
    let editor = preferred_editor();
    let temp_file = create_temp_note_file_path();
    std::fs::write(&temp_file, initial_content)?;

    let launch_result = launch_editor(&editor, &temp_file);
    let note_content = std::fs::read_to_string(&temp_file)?;
    let _ = std::fs::remove_file(&temp_file);

    launch_result?;
    Ok(normalize_content(&note_content))
}

pub fn launch_editor(editor: &str, file_path: &Path) -> Result<(), CliError> {
    match Command::new(editor).arg(file_path).status() {
        Ok(status) if status.success() => Ok(()),
        Ok(status) => Err(CliError::EditorFailed(format!(
            "`{editor}` exited with status {status}"
        ))),
        // EDITOR may carry arguments, e.g. `code --wait`
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            let mut parts = editor.split_whitespace();
            let Some(program) = parts.next() else {
                return Err(CliError::EditorFailed("empty EDITOR command".into()));
            };

            let status = Command::new(program).args(parts).arg(file_path).status()?;
            if status.success() {
                Ok(())
            } else {
                Err(CliError::EditorFailed(format!(
                    "`{editor}` exited with status {status}"
                )))
            }
        }
        Err(err) => Err(CliError::Io(err)),
    }
}

pub fn preferred_editor() -> String {
    env::var("VISUAL")
        .or_else(|_| env::var("EDITOR"))
        .unwrap_or_else(|_| default_editor().to_string())
}

pub const fn default_editor() -> &'static str {
    if cfg!(windows) {
        "notepad"
    } else {
        "vi"
    }
}

pub fn create_temp_note_file_path() -> PathBuf {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |duration| duration.as_nanos());
    env::temp_dir().join(format!("simplenote-{}-{now}.md", std::process::id()))
}

/// `--db-path`, then `SIMPLENOTE_DB_PATH`, then a per-profile cache file.
pub fn resolve_db_path(cli_db_path: Option<PathBuf>, profile_name: &str) -> PathBuf {
    cli_db_path
        .or_else(|| env::var_os(DB_PATH_ENV).map(PathBuf::from))
        .unwrap_or_else(|| default_db_path(profile_name))
}

pub fn default_db_path(profile_name: &str) -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(env::temp_dir)
        .join("simplenote")
        .join(format!("{profile_name}.db"))
}
