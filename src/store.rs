// Task and label store backed by SQLite

use crate::config::Config;
use crate::error::{self, Result, StoreError};
use crate::models::{self, Label, NewLabel, NewTask, Priority, Task, TaskPatch};
use rusqlite::types::{FromSql, ToSql, ValueRef};
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{Span, debug, info, warn};
use uuid::Uuid;

/// Characters SQLite-backed paths may not contain
const DISALLOWED_PATH_CHARS: [char; 7] = ['<', '>', '"', '|', '?', '*', '&'];

// Text columns are cast so numeric-affinity columns from older schemas still read as strings
const TASK_COLUMNS: &str = "id, title, completed, CAST(deadline AS TEXT), CAST(category AS TEXT), \
                            CAST(notes AS TEXT), priority, created_at";

/// Persistent store for tasks, labels and the links between them
///
/// Mutating operations take `&mut self` and run in a single transaction that
/// rolls back on any error. Every operation runs inside the span handed to
/// [`Store::open_with`], so callers decide where its logs end up.
pub struct Store {
    path: PathBuf,
    db: Connection,
    reject_recompletion: bool,
    span: Span,
}

impl Store {
    /// Open or create a store at the given database file with default settings
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with(path, &Config::default(), Span::none())
    }

    /// Open or create a store at the given database file
    ///
    /// The parent directory is created if missing. Fails with `INVALID_PATH`
    /// when the path contains a disallowed character, the directory is not
    /// writable or SQLite cannot open a file at that path, and with
    /// `DB_CONN_ERROR` when the file is not a usable database.
    pub fn open_with<P: AsRef<Path>>(path: P, config: &Config, span: Span) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let db = span.in_scope(|| -> Result<Connection> {
            Self::prepare_directory(&path)?;
            let db = Connection::open(&path).map_err(|e| Self::open_failure(&path, e))?;
            Self::configure(&db, config.busy_timeout())?;
            Self::create_schema(&db)?;
            info!(path = %path.display(), "Opened task store");
            Ok(db)
        })?;

        Ok(Self {
            path,
            db,
            reject_recompletion: config.reject_recompletion,
            span,
        })
    }

    /// Open a throwaway store that lives only as long as the returned value
    pub fn open_in_memory() -> Result<Self> {
        let config = Config::default();
        let db = Connection::open_in_memory().map_err(StoreError::conn)?;
        Self::configure(&db, config.busy_timeout())?;
        Self::create_schema(&db)?;

        Ok(Self {
            path: PathBuf::from(":memory:"),
            db,
            reject_recompletion: config.reject_recompletion,
            span: Span::none(),
        })
    }

    /// Path of the backing database file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Release the connection. Close failures are logged, never returned.
    pub fn close(self) {
        let Store { path, db, span, .. } = self;
        let _guard = span.enter();

        match db.close() {
            Ok(()) => debug!(path = %path.display(), "Closed task store"),
            Err((_, e)) => warn!(path = %path.display(), error = %e, "Failed to close database connection"),
        }
    }

    fn prepare_directory(path: &Path) -> Result<()> {
        if path.as_os_str().is_empty() {
            return Err(StoreError::invalid_path(path, "path is empty"));
        }

        if let Some(c) = path.to_string_lossy().chars().find(|c| DISALLOWED_PATH_CHARS.contains(c)) {
            return Err(StoreError::invalid_path(
                path,
                format!("contains disallowed character {:?}", c),
            ));
        }

        let absolute = std::path::absolute(path).map_err(|e| StoreError::invalid_path(path, e.to_string()))?;
        let dir = absolute
            .parent()
            .ok_or_else(|| StoreError::invalid_path(path, "path has no parent directory"))?;

        if !dir.exists() {
            debug!(dir = %dir.display(), "Creating database directory");
            fs::create_dir_all(dir).map_err(|e| {
                StoreError::invalid_path(path, format!("failed to create directory {}: {}", dir.display(), e))
            })?;
        }

        let metadata = fs::metadata(dir).map_err(|e| StoreError::invalid_path(path, e.to_string()))?;
        if !metadata.is_dir() {
            return Err(StoreError::invalid_path(
                path,
                format!("{} is not a directory", dir.display()),
            ));
        }
        check_writable(dir).map_err(|e| {
            StoreError::invalid_path(path, format!("no write permission for directory {}: {}", dir.display(), e))
        })?;

        Ok(())
    }

    fn open_failure(path: &Path, err: rusqlite::Error) -> StoreError {
        match err.sqlite_error_code() {
            Some(rusqlite::ErrorCode::CannotOpen) => {
                StoreError::invalid_path(path, format!("cannot open database file: {}", err))
            }
            _ => StoreError::conn(err),
        }
    }

    fn configure(db: &Connection, busy_timeout: Duration) -> Result<()> {
        db.busy_timeout(busy_timeout).map_err(StoreError::conn)?;
        db.execute_batch("PRAGMA foreign_keys = ON;").map_err(StoreError::conn)?;
        Ok(())
    }

    /// Create tables that don't exist yet; existing tables are left as they are
    fn create_schema(db: &Connection) -> Result<()> {
        debug!("Creating database schema");

        db.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS tasks (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title TEXT NOT NULL,
                completed BOOLEAN NOT NULL DEFAULT FALSE,
                deadline TEXT,
                category TEXT,
                notes TEXT,
                priority TEXT CHECK (priority IN ('ASAP', '1', '2', '3', '4')),
                created_at TIMESTAMP NOT NULL DEFAULT (strftime('%Y-%m-%d %H:%M:%f', 'now'))
            );

            CREATE TABLE IF NOT EXISTS labels (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT UNIQUE NOT NULL,
                color TEXT
            );

            CREATE TABLE IF NOT EXISTS task_labels (
                task_id INTEGER NOT NULL,
                label_id INTEGER NOT NULL,
                PRIMARY KEY (task_id, label_id),
                FOREIGN KEY (task_id) REFERENCES tasks (id) ON DELETE CASCADE,
                FOREIGN KEY (label_id) REFERENCES labels (id) ON DELETE CASCADE
            );
            "#,
        )?;

        Ok(())
    }

    // ========================================================================
    // Tasks
    // ========================================================================

    /// Insert a new, uncompleted task and return its id
    pub fn add_task(&mut self, task: &NewTask) -> Result<i64> {
        let _guard = self.span.enter();

        let title = models::validate_title(task.title.as_deref())?;
        let priority = models::parse_priority(task.priority.as_deref())?;

        self.db.execute(
            "INSERT INTO tasks (title, completed, deadline, category, notes, priority)
             VALUES (?1, FALSE, ?2, ?3, ?4, ?5)",
            params![title, task.deadline, task.category, task.notes, priority],
        )?;

        let id = self.db.last_insert_rowid();
        info!(task_id = id, "Added task");
        Ok(id)
    }

    /// Get a task by id
    pub fn get_task(&self, id: i64) -> Result<Task> {
        let _guard = self.span.enter();
        fetch_task(&self.db, id)?.ok_or(StoreError::TaskNotFound(id))
    }

    /// All tasks, newest first
    pub fn get_all_tasks(&self) -> Result<Vec<Task>> {
        let _guard = self.span.enter();

        let sql = format!("SELECT {} FROM tasks ORDER BY created_at DESC, id DESC", TASK_COLUMNS);
        let mut stmt = self.db.prepare(&sql)?;
        let tasks = stmt.query_map([], task_from_row)?.collect::<rusqlite::Result<Vec<_>>>()?;

        debug!(count = tasks.len(), "Listed tasks");
        Ok(tasks)
    }

    /// Apply a partial update
    ///
    /// Every supplied field is validated before anything is written. Columns
    /// absent from the patch keep their current value.
    pub fn update_task(&mut self, id: i64, patch: &TaskPatch) -> Result<()> {
        let _guard = self.span.enter();

        if patch.is_empty() {
            return Err(StoreError::NoUpdates);
        }

        let mut columns: Vec<&'static str> = Vec::new();
        let mut values: Vec<Box<dyn ToSql>> = Vec::new();

        if let Some(title) = &patch.title {
            let title = models::validate_title(title.as_deref())?;
            columns.push("title");
            values.push(Box::new(title.to_string()));
        }
        if let Some(completed) = patch.completed {
            let completed = completed.ok_or_else(|| StoreError::InvalidValue("completed cannot be null".to_string()))?;
            columns.push("completed");
            values.push(Box::new(completed));
        }
        if let Some(deadline) = &patch.deadline {
            columns.push("deadline");
            values.push(Box::new(deadline.clone()));
        }
        if let Some(category) = &patch.category {
            columns.push("category");
            values.push(Box::new(category.clone()));
        }
        if let Some(notes) = &patch.notes {
            columns.push("notes");
            values.push(Box::new(notes.clone()));
        }
        if let Some(priority) = &patch.priority {
            let priority = models::parse_priority(priority.as_deref())?;
            columns.push("priority");
            values.push(Box::new(priority));
        }

        let assignments: Vec<String> = columns
            .iter()
            .enumerate()
            .map(|(i, column)| format!("{} = ?{}", column, i + 1))
            .collect();
        let sql = format!(
            "UPDATE tasks SET {} WHERE id = ?{}",
            assignments.join(", "),
            values.len() + 1
        );
        values.push(Box::new(id));

        let params_refs: Vec<&dyn ToSql> = values.iter().map(|p| p.as_ref()).collect();
        let changed = self.db.execute(&sql, params_refs.as_slice())?;

        if changed == 0 {
            return Err(StoreError::TaskNotFound(id));
        }

        info!(task_id = id, fields = ?columns, "Updated task");
        Ok(())
    }

    /// Mark a task as completed
    ///
    /// Completing an already-completed task is a no-op unless the store was
    /// opened with `reject_recompletion`, in which case it is an error.
    pub fn mark_completed(&mut self, id: i64) -> Result<()> {
        let _guard = self.span.enter();

        let tx = self.db.transaction()?;

        let current: Option<Option<bool>> = tx
            .query_row("SELECT completed FROM tasks WHERE id = ?1", [id], |row| row.get(0))
            .optional()?;

        let already_completed = match current {
            None => return Err(StoreError::TaskNotFound(id)),
            Some(completed) => completed.unwrap_or(false),
        };

        if already_completed {
            if self.reject_recompletion {
                warn!(task_id = id, "Task is already completed");
                return Err(StoreError::AlreadyCompleted(id));
            }
            debug!(task_id = id, "Task already completed, nothing to do");
            return Ok(());
        }

        tx.execute("UPDATE tasks SET completed = TRUE WHERE id = ?1", [id])?;
        tx.commit()?;

        info!(task_id = id, "Marked task completed");
        Ok(())
    }

    /// Delete a task together with its label links
    pub fn delete_task(&mut self, id: i64) -> Result<()> {
        let _guard = self.span.enter();

        let tx = self.db.transaction()?;

        // Databases created before the cascade existed still need this
        let unlinked = tx.execute("DELETE FROM task_labels WHERE task_id = ?1", [id])?;
        let deleted = tx.execute("DELETE FROM tasks WHERE id = ?1", [id])?;

        if deleted == 0 {
            return Err(StoreError::TaskNotFound(id));
        }

        tx.commit()?;

        info!(task_id = id, unlinked, "Deleted task");
        Ok(())
    }

    // ========================================================================
    // Labels
    // ========================================================================

    /// Create a label, or return the id of the label that already has this name
    pub fn add_label(&mut self, label: &NewLabel) -> Result<i64> {
        let _guard = self.span.enter();

        let name = models::validate_label_name(label.name.as_deref())?;

        let tx = self.db.transaction()?;

        let inserted = tx.execute(
            "INSERT OR IGNORE INTO labels (name, color) VALUES (?1, ?2)",
            params![name, label.color],
        )?;
        let id: i64 = tx.query_row("SELECT id FROM labels WHERE name = ?1", [name], |row| row.get(0))?;

        tx.commit()?;

        if inserted == 0 {
            debug!(label_id = id, name, "Label already exists");
        } else {
            info!(label_id = id, name, "Added label");
        }
        Ok(id)
    }

    /// Get a label by id
    pub fn get_label(&self, id: i64) -> Result<Label> {
        let _guard = self.span.enter();
        fetch_label(&self.db, id)?.ok_or(StoreError::LabelNotFound(id))
    }

    /// All labels, in creation order
    pub fn get_all_labels(&self) -> Result<Vec<Label>> {
        let _guard = self.span.enter();

        let mut stmt = self.db.prepare("SELECT id, name, color FROM labels ORDER BY id")?;
        let labels = stmt.query_map([], label_from_row)?.collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(labels)
    }

    /// Delete a label and every link to it
    pub fn delete_label(&mut self, id: i64) -> Result<()> {
        let _guard = self.span.enter();

        let tx = self.db.transaction()?;

        let unlinked = tx.execute("DELETE FROM task_labels WHERE label_id = ?1", [id])?;
        let deleted = tx.execute("DELETE FROM labels WHERE id = ?1", [id])?;

        if deleted == 0 {
            return Err(StoreError::LabelNotFound(id));
        }

        tx.commit()?;

        info!(label_id = id, unlinked, "Deleted label");
        Ok(())
    }

    // ========================================================================
    // Task/label links
    // ========================================================================

    /// Link a task to a label. Linking the same pair twice is an error.
    pub fn link_task_label(&mut self, task_id: i64, label_id: i64) -> Result<()> {
        let _guard = self.span.enter();

        let tx = self.db.transaction()?;

        if !task_exists(&tx, task_id)? {
            return Err(StoreError::TaskNotFound(task_id));
        }
        if !label_exists(&tx, label_id)? {
            return Err(StoreError::LabelNotFound(label_id));
        }

        let linked = tx
            .query_row(
                "SELECT 1 FROM task_labels WHERE task_id = ?1 AND label_id = ?2",
                [task_id, label_id],
                |_| Ok(()),
            )
            .optional()?
            .is_some();
        if linked {
            return Err(StoreError::LinkExists { task_id, label_id });
        }

        insert_link(&tx, task_id, label_id)?;
        tx.commit()?;

        info!(task_id, label_id, "Linked task to label");
        Ok(())
    }

    /// Labels linked to a task
    pub fn get_task_labels(&self, task_id: i64) -> Result<Vec<Label>> {
        let _guard = self.span.enter();

        if !task_exists(&self.db, task_id)? {
            return Err(StoreError::TaskNotFound(task_id));
        }

        let mut stmt = self.db.prepare(
            "SELECT l.id, l.name, l.color FROM labels l
             JOIN task_labels tl ON l.id = tl.label_id
             WHERE tl.task_id = ?1
             ORDER BY l.id",
        )?;
        let labels = stmt
            .query_map([task_id], label_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(labels)
    }

    /// Remove every label link of a task, returning how many were removed
    pub fn clear_task_labels(&mut self, task_id: i64) -> Result<usize> {
        let _guard = self.span.enter();

        let tx = self.db.transaction()?;

        // Zero deleted rows can't tell a missing task from an unlabelled one
        if !task_exists(&tx, task_id)? {
            return Err(StoreError::TaskNotFound(task_id));
        }

        let removed = tx.execute("DELETE FROM task_labels WHERE task_id = ?1", [task_id])?;
        tx.commit()?;

        info!(task_id, removed, "Cleared task labels");
        Ok(removed)
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Create and remove a uniquely named file in `dir`
fn check_writable(dir: &Path) -> std::io::Result<()> {
    let marker = dir.join(format!(".todostore-{}.tmp", Uuid::now_v7()));
    fs::OpenOptions::new().write(true).create_new(true).open(&marker)?;
    fs::remove_file(&marker)
}

/// Insert a link; a concurrent writer that got there first surfaces as `LinkExists`
fn insert_link(db: &Connection, task_id: i64, label_id: i64) -> Result<()> {
    db.execute(
        "INSERT INTO task_labels (task_id, label_id) VALUES (?1, ?2)",
        [task_id, label_id],
    )
    .map_err(|e| {
        if error::is_primary_key_violation(&e) {
            StoreError::LinkExists { task_id, label_id }
        } else {
            StoreError::from(e)
        }
    })?;
    Ok(())
}

fn task_from_row(row: &Row<'_>) -> rusqlite::Result<Task> {
    let id: i64 = row.get(0)?;
    Ok(Task {
        id,
        title: row.get(1)?,
        completed: row.get::<_, Option<bool>>(2)?.unwrap_or(false),
        deadline: row.get(3)?,
        category: row.get(4)?,
        notes: row.get(5)?,
        priority: priority_from_row(row, 6, id)?,
        created_at: row.get(7)?,
    })
}

// Older databases took any integer priority; values outside the fixed set read as none
fn priority_from_row(row: &Row<'_>, idx: usize, task_id: i64) -> rusqlite::Result<Option<Priority>> {
    let value = row.get_ref(idx)?;
    if matches!(value, ValueRef::Null) {
        return Ok(None);
    }

    match Priority::column_result(value) {
        Ok(priority) => Ok(Some(priority)),
        Err(e) => {
            warn!(task_id, value = ?value, error = %e, "Ignoring unrecognised priority");
            Ok(None)
        }
    }
}

fn label_from_row(row: &Row<'_>) -> rusqlite::Result<Label> {
    Ok(Label {
        id: row.get(0)?,
        name: row.get(1)?,
        color: row.get(2)?,
    })
}

fn fetch_task(db: &Connection, id: i64) -> Result<Option<Task>> {
    let sql = format!("SELECT {} FROM tasks WHERE id = ?1", TASK_COLUMNS);
    Ok(db.query_row(&sql, [id], task_from_row).optional()?)
}

fn fetch_label(db: &Connection, id: i64) -> Result<Option<Label>> {
    Ok(db
        .query_row("SELECT id, name, color FROM labels WHERE id = ?1", [id], label_from_row)
        .optional()?)
}

fn task_exists(db: &Connection, id: i64) -> Result<bool> {
    let found = db
        .query_row("SELECT 1 FROM tasks WHERE id = ?1", [id], |_| Ok(()))
        .optional()?;
    Ok(found.is_some())
}

fn label_exists(db: &Connection, id: i64) -> Result<bool> {
    let found = db
        .query_row("SELECT 1 FROM labels WHERE id = ?1", [id], |_| Ok(()))
        .optional()?;
    Ok(found.is_some())
}
