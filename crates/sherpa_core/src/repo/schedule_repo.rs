//! Schedule repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Persist habits/tasks with their recurrence rules.
//! - Persist materialized instances and expose day/range reads.
//! - Keep SQL details inside the core persistence boundary.
//!
//! # Invariants
//! - Write paths call `ScheduleItem::validate()` before SQL mutations.
//! - Read paths reject invalid persisted state instead of masking it, except
//!   rule values, which are clamped back into their invariants.
//! - `insert_instances` runs in one IMMEDIATE transaction and never creates a
//!   second row for an existing `(item_uuid, occurs_on)` pair.
//! - Writes issued inside `with_write_lock` join its transaction instead of
//!   opening their own.

use crate::calendar::{self, DateRange};
use crate::db::migrations::latest_version;
use crate::db::DbError;
use crate::model::instance::{CompletionState, Instance, InstanceId};
use crate::model::item::{ItemId, ItemKind, ItemValidationError, ScheduleItem};
use crate::model::recurrence::{RecurrenceFrequency, RecurrenceRule, Weekday};
use chrono::NaiveDate;
use rusqlite::{params, Connection, Row, Transaction, TransactionBehavior};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

const ITEM_SELECT_SQL: &str = "SELECT
    i.uuid,
    i.kind,
    i.title,
    i.detail,
    i.created_at,
    i.due_date,
    i.is_archived,
    r.frequency,
    r.repeat_interval,
    r.start_date,
    r.weekdays,
    r.day_of_month_override,
    r.end_date,
    r.occurrence_limit
FROM schedule_items i
LEFT JOIN recurrence_rules r ON r.item_uuid = i.uuid";

const INSTANCE_SELECT_SQL: &str = "SELECT
    uuid,
    item_uuid,
    occurs_on,
    status,
    note,
    completed_at
FROM schedule_instances";

pub type RepoResult<T> = Result<T, RepoError>;

/// Errors from schedule persistence and query operations.
#[derive(Debug)]
pub enum RepoError {
    /// Write rejected by item validation.
    Validation(ItemValidationError),
    /// Underlying SQLite/bootstrap error.
    Db(DbError),
    ItemNotFound(ItemId),
    InstanceNotFound(InstanceId),
    /// Persisted data cannot be converted to a valid read model.
    InvalidData(String),
    /// Connection schema is not at the expected migrated version.
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    MissingRequiredTable(&'static str),
    MissingRequiredColumn {
        table: &'static str,
        column: &'static str,
    },
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::ItemNotFound(id) => write!(f, "schedule item not found: {id}"),
            Self::InstanceNotFound(id) => write!(f, "instance not found: {id}"),
            Self::InvalidData(message) => write!(f, "invalid persisted schedule data: {message}"),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "connection schema version {actual_version} does not match expected {expected_version}"
            ),
            Self::MissingRequiredTable(table) => write!(f, "missing required table `{table}`"),
            Self::MissingRequiredColumn { table, column } => {
                write!(f, "missing required column `{table}.{column}`")
            }
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ItemValidationError> for RepoError {
    fn from(value: ItemValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Outcome of one batched instance insert.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InsertReport {
    /// Rows actually written.
    pub inserted: usize,
    /// Rows dropped because `(item_uuid, occurs_on)` already existed.
    pub skipped_conflicts: usize,
}

/// Persistence collaborator used by scheduling and item services.
pub trait ScheduleRepository {
    fn create_item(&self, item: &ScheduleItem) -> RepoResult<ItemId>;
    fn get_item(&self, id: ItemId) -> RepoResult<Option<ScheduleItem>>;
    fn archive_item(&self, id: ItemId) -> RepoResult<()>;
    /// Non-archived items ordered by `created_at ASC, uuid ASC`.
    fn fetch_active_items(&self) -> RepoResult<Vec<ScheduleItem>>;
    /// Instances of one item ordered by day; `None` means every day.
    fn fetch_instances(
        &self,
        item_id: ItemId,
        range: Option<DateRange>,
    ) -> RepoResult<Vec<Instance>>;
    /// Instances of every item within `range`, ordered by day.
    fn list_instances(&self, range: DateRange) -> RepoResult<Vec<Instance>>;
    fn get_instance(&self, id: InstanceId) -> RepoResult<Option<Instance>>;
    fn update_instance(&self, instance: &Instance) -> RepoResult<()>;
    /// Inserts a batch atomically, skipping `(item, day)` pairs that already exist.
    fn insert_instances(&self, instances: &[Instance]) -> RepoResult<InsertReport>;
    /// Runs `work` while holding the store's write lock.
    ///
    /// Everything `work` reads and writes through this repository is one
    /// atomic unit; an error from `work` discards its writes.
    fn with_write_lock<T>(&self, work: impl FnOnce() -> RepoResult<T>) -> RepoResult<T>;
}

/// SQLite-backed schedule repository.
#[derive(Clone, Copy)]
pub struct SqliteScheduleRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteScheduleRepository<'conn> {
    /// Wraps a migrated connection.
    ///
    /// # Errors
    /// - Returns `UninitializedConnection` when migrations were not applied.
    /// - Returns `MissingRequiredTable`/`MissingRequiredColumn` for foreign schemas.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_schedule_connection_ready(conn)?;
        Ok(Self { conn })
    }
}

impl ScheduleRepository for SqliteScheduleRepository<'_> {
    fn create_item(&self, item: &ScheduleItem) -> RepoResult<ItemId> {
        item.validate()?;

        let tx = begin_write(self.conn)?;
        self.conn.execute(
            "INSERT INTO schedule_items (
                uuid,
                kind,
                title,
                detail,
                created_at,
                due_date,
                is_archived
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7);",
            params![
                item.uuid.to_string(),
                item_kind_to_db(item.kind),
                item.title.as_str(),
                item.detail.as_deref(),
                item.created_at,
                item.due_date.map(calendar::format_day),
                bool_to_int(item.is_archived),
            ],
        )?;

        if let Some(rule) = &item.recurrence {
            self.conn.execute(
                "INSERT INTO recurrence_rules (
                    item_uuid,
                    frequency,
                    repeat_interval,
                    start_date,
                    weekdays,
                    day_of_month_override,
                    end_date,
                    occurrence_limit
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8);",
                params![
                    item.uuid.to_string(),
                    frequency_to_db(rule.frequency),
                    i64::from(rule.interval),
                    calendar::format_day(rule.start_date),
                    weekdays_to_db(&rule.weekdays),
                    rule.day_of_month_override.map(i64::from),
                    rule.end_date.map(calendar::format_day),
                    rule.occurrence_limit.map(i64::from),
                ],
            )?;
        }
        if let Some(tx) = tx {
            tx.commit()?;
        }

        Ok(item.uuid)
    }

    fn get_item(&self, id: ItemId) -> RepoResult<Option<ScheduleItem>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{ITEM_SELECT_SQL} WHERE i.uuid = ?1;"))?;
        let mut rows = stmt.query([id.to_string()])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_item_row(row)?));
        }
        Ok(None)
    }

    fn archive_item(&self, id: ItemId) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE schedule_items
             SET
                is_archived = 1,
                updated_at = (strftime('%s', 'now') * 1000)
             WHERE uuid = ?1;",
            [id.to_string()],
        )?;
        if changed == 0 {
            return Err(RepoError::ItemNotFound(id));
        }
        Ok(())
    }

    fn fetch_active_items(&self) -> RepoResult<Vec<ScheduleItem>> {
        let mut stmt = self.conn.prepare(&format!(
            "{ITEM_SELECT_SQL}
             WHERE i.is_archived = 0
             ORDER BY i.created_at ASC, i.uuid ASC;"
        ))?;
        let mut rows = stmt.query([])?;
        let mut items = Vec::new();
        while let Some(row) = rows.next()? {
            items.push(parse_item_row(row)?);
        }
        Ok(items)
    }

    fn fetch_instances(
        &self,
        item_id: ItemId,
        range: Option<DateRange>,
    ) -> RepoResult<Vec<Instance>> {
        let mut instances = Vec::new();
        match range {
            Some(range) => {
                let mut stmt = self.conn.prepare(&format!(
                    "{INSTANCE_SELECT_SQL}
                     WHERE item_uuid = ?1 AND occurs_on BETWEEN ?2 AND ?3
                     ORDER BY occurs_on ASC;"
                ))?;
                let mut rows = stmt.query(params![
                    item_id.to_string(),
                    calendar::format_day(range.start),
                    calendar::format_day(range.end),
                ])?;
                while let Some(row) = rows.next()? {
                    instances.push(parse_instance_row(row)?);
                }
            }
            None => {
                let mut stmt = self.conn.prepare(&format!(
                    "{INSTANCE_SELECT_SQL}
                     WHERE item_uuid = ?1
                     ORDER BY occurs_on ASC;"
                ))?;
                let mut rows = stmt.query([item_id.to_string()])?;
                while let Some(row) = rows.next()? {
                    instances.push(parse_instance_row(row)?);
                }
            }
        }
        Ok(instances)
    }

    fn list_instances(&self, range: DateRange) -> RepoResult<Vec<Instance>> {
        let mut stmt = self.conn.prepare(&format!(
            "{INSTANCE_SELECT_SQL}
             WHERE occurs_on BETWEEN ?1 AND ?2
             ORDER BY occurs_on ASC, item_uuid ASC;"
        ))?;
        let mut rows = stmt.query(params![
            calendar::format_day(range.start),
            calendar::format_day(range.end),
        ])?;
        let mut instances = Vec::new();
        while let Some(row) = rows.next()? {
            instances.push(parse_instance_row(row)?);
        }
        Ok(instances)
    }

    fn get_instance(&self, id: InstanceId) -> RepoResult<Option<Instance>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{INSTANCE_SELECT_SQL} WHERE uuid = ?1;"))?;
        let mut rows = stmt.query([id.to_string()])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_instance_row(row)?));
        }
        Ok(None)
    }

    fn update_instance(&self, instance: &Instance) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE schedule_instances
             SET
                status = ?1,
                note = ?2,
                completed_at = ?3,
                updated_at = (strftime('%s', 'now') * 1000)
             WHERE uuid = ?4;",
            params![
                status_to_db(instance.status),
                instance.note.as_deref(),
                instance.completed_at,
                instance.uuid.to_string(),
            ],
        )?;
        if changed == 0 {
            return Err(RepoError::InstanceNotFound(instance.uuid));
        }
        Ok(())
    }

    fn insert_instances(&self, instances: &[Instance]) -> RepoResult<InsertReport> {
        let mut report = InsertReport::default();
        if instances.is_empty() {
            return Ok(report);
        }

        let tx = begin_write(self.conn)?;
        {
            let mut stmt = self.conn.prepare(
                "INSERT INTO schedule_instances (
                    uuid,
                    item_uuid,
                    occurs_on,
                    status,
                    note,
                    completed_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                ON CONFLICT (item_uuid, occurs_on) DO NOTHING;",
            )?;
            for instance in instances {
                let changed = stmt.execute(params![
                    instance.uuid.to_string(),
                    instance.item_uuid.to_string(),
                    calendar::format_day(instance.occurs_on),
                    status_to_db(instance.status),
                    instance.note.as_deref(),
                    instance.completed_at,
                ])?;
                if changed == 0 {
                    report.skipped_conflicts += 1;
                } else {
                    report.inserted += changed;
                }
            }
        }
        if let Some(tx) = tx {
            tx.commit()?;
        }

        Ok(report)
    }

    fn with_write_lock<T>(&self, work: impl FnOnce() -> RepoResult<T>) -> RepoResult<T> {
        let tx = begin_write(self.conn)?;
        let value = work()?;
        if let Some(tx) = tx {
            tx.commit()?;
        }
        Ok(value)
    }
}

/// Starts an IMMEDIATE transaction, or joins the one already open on `conn`.
fn begin_write(conn: &Connection) -> RepoResult<Option<Transaction<'_>>> {
    if !conn.is_autocommit() {
        return Ok(None);
    }
    Ok(Some(Transaction::new_unchecked(
        conn,
        TransactionBehavior::Immediate,
    )?))
}

fn parse_item_row(row: &Row<'_>) -> RepoResult<ScheduleItem> {
    let uuid = parse_uuid(row.get("uuid")?, "schedule_items.uuid")?;

    let kind_text: String = row.get("kind")?;
    let kind = parse_item_kind(&kind_text).ok_or_else(|| {
        RepoError::InvalidData(format!("invalid item kind `{kind_text}` in schedule_items.kind"))
    })?;

    let due_date = parse_optional_day(row.get("due_date")?, "schedule_items.due_date")?;
    let is_archived = parse_bool(row.get("is_archived")?, "schedule_items.is_archived")?;

    let recurrence = match row.get::<_, Option<String>>("frequency")? {
        Some(frequency_text) => Some(parse_rule_columns(row, &frequency_text)?),
        None => None,
    };

    let item = ScheduleItem {
        uuid,
        kind,
        title: row.get("title")?,
        detail: row.get("detail")?,
        created_at: row.get("created_at")?,
        due_date,
        recurrence,
        is_archived,
    };
    item.validate()?;
    Ok(item)
}

fn parse_rule_columns(row: &Row<'_>, frequency_text: &str) -> RepoResult<RecurrenceRule> {
    let frequency = parse_frequency(frequency_text).ok_or_else(|| {
        RepoError::InvalidData(format!(
            "invalid frequency `{frequency_text}` in recurrence_rules.frequency"
        ))
    })?;

    let start_text: String = row.get("start_date")?;
    let start_date = parse_day_column(&start_text, "recurrence_rules.start_date")?;

    let weekdays_text: String = row.get("weekdays")?;
    let weekdays = parse_weekdays(&weekdays_text)?;

    let rule = RecurrenceRule {
        frequency,
        interval: clamp_to_u32(row.get("repeat_interval")?),
        start_date,
        weekdays,
        day_of_month_override: row
            .get::<_, Option<i64>>("day_of_month_override")?
            .map(clamp_to_u32),
        end_date: parse_optional_day(row.get("end_date")?, "recurrence_rules.end_date")?,
        occurrence_limit: row
            .get::<_, Option<i64>>("occurrence_limit")?
            .map(clamp_to_u32),
    };
    Ok(rule.normalized())
}

fn parse_instance_row(row: &Row<'_>) -> RepoResult<Instance> {
    let uuid = parse_uuid(row.get("uuid")?, "schedule_instances.uuid")?;
    let item_uuid = parse_uuid(row.get("item_uuid")?, "schedule_instances.item_uuid")?;

    let day_text: String = row.get("occurs_on")?;
    let occurs_on = parse_day_column(&day_text, "schedule_instances.occurs_on")?;

    let status_text: String = row.get("status")?;
    let status = parse_status(&status_text).ok_or_else(|| {
        RepoError::InvalidData(format!(
            "invalid status `{status_text}` in schedule_instances.status"
        ))
    })?;

    Ok(Instance {
        uuid,
        item_uuid,
        occurs_on,
        status,
        note: row.get("note")?,
        completed_at: row.get("completed_at")?,
    })
}

fn parse_uuid(value: String, column: &str) -> RepoResult<Uuid> {
    Uuid::parse_str(&value)
        .map_err(|_| RepoError::InvalidData(format!("invalid uuid value `{value}` in {column}")))
}

fn parse_day_column(value: &str, column: &str) -> RepoResult<NaiveDate> {
    calendar::parse_day(value)
        .ok_or_else(|| RepoError::InvalidData(format!("invalid day `{value}` in {column}")))
}

fn parse_optional_day(value: Option<String>, column: &str) -> RepoResult<Option<NaiveDate>> {
    value
        .map(|text| parse_day_column(&text, column))
        .transpose()
}

fn parse_bool(value: i64, column: &str) -> RepoResult<bool> {
    match value {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(RepoError::InvalidData(format!(
            "invalid boolean value `{other}` in {column}"
        ))),
    }
}

// Non-positive values clamp to 1 later via `RecurrenceRule::normalized`.
fn clamp_to_u32(value: i64) -> u32 {
    u32::try_from(value.max(0)).unwrap_or(u32::MAX)
}

fn weekdays_to_db(weekdays: &[Weekday]) -> String {
    weekdays
        .iter()
        .map(|day| day.index().to_string())
        .collect::<Vec<_>>()
        .join(",")
}

fn parse_weekdays(value: &str) -> RepoResult<Vec<Weekday>> {
    value
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            part.parse::<i64>()
                .ok()
                .and_then(Weekday::from_index)
                .ok_or_else(|| {
                    RepoError::InvalidData(format!(
                        "invalid weekday `{part}` in recurrence_rules.weekdays"
                    ))
                })
        })
        .collect()
}

fn item_kind_to_db(kind: ItemKind) -> &'static str {
    match kind {
        ItemKind::Habit => "habit",
        ItemKind::Task => "task",
    }
}

fn parse_item_kind(value: &str) -> Option<ItemKind> {
    match value {
        "habit" => Some(ItemKind::Habit),
        "task" => Some(ItemKind::Task),
        _ => None,
    }
}

fn frequency_to_db(frequency: RecurrenceFrequency) -> &'static str {
    match frequency {
        RecurrenceFrequency::Once => "once",
        RecurrenceFrequency::Daily => "daily",
        RecurrenceFrequency::Weekly => "weekly",
        RecurrenceFrequency::Monthly => "monthly",
    }
}

fn parse_frequency(value: &str) -> Option<RecurrenceFrequency> {
    match value {
        "once" => Some(RecurrenceFrequency::Once),
        "daily" => Some(RecurrenceFrequency::Daily),
        "weekly" => Some(RecurrenceFrequency::Weekly),
        "monthly" => Some(RecurrenceFrequency::Monthly),
        _ => None,
    }
}

fn status_to_db(status: CompletionState) -> &'static str {
    match status {
        CompletionState::Pending => "pending",
        CompletionState::Completed => "completed",
        CompletionState::Skipped => "skipped",
        CompletionState::SkippedWithNote => "skipped_with_note",
    }
}

fn parse_status(value: &str) -> Option<CompletionState> {
    match value {
        "pending" => Some(CompletionState::Pending),
        "completed" => Some(CompletionState::Completed),
        "skipped" => Some(CompletionState::Skipped),
        "skipped_with_note" => Some(CompletionState::SkippedWithNote),
        _ => None,
    }
}

fn bool_to_int(value: bool) -> i64 {
    if value {
        1
    } else {
        0
    }
}

fn ensure_schedule_connection_ready(conn: &Connection) -> RepoResult<()> {
    let expected_version = latest_version();
    let actual_version: u32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    if actual_version != expected_version {
        return Err(RepoError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }

    let required: [(&'static str, &[&'static str]); 3] = [
        (
            "schedule_items",
            &["uuid", "kind", "title", "created_at", "due_date", "is_archived"],
        ),
        (
            "recurrence_rules",
            &[
                "item_uuid",
                "frequency",
                "repeat_interval",
                "start_date",
                "weekdays",
                "day_of_month_override",
                "end_date",
                "occurrence_limit",
            ],
        ),
        (
            "schedule_instances",
            &["uuid", "item_uuid", "occurs_on", "status", "note", "completed_at"],
        ),
    ];

    for (table, columns) in required {
        if !table_exists(conn, table)? {
            return Err(RepoError::MissingRequiredTable(table));
        }
        for &column in columns {
            if !table_has_column(conn, table, column)? {
                return Err(RepoError::MissingRequiredColumn { table, column });
            }
        }
    }

    Ok(())
}

fn table_exists(conn: &Connection, table: &str) -> RepoResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM sqlite_master
            WHERE type = 'table' AND name = ?1
        );",
        [table],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> RepoResult<bool> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table});"))?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let current: String = row.get(1)?;
        if current == column {
            return Ok(true);
        }
    }
    Ok(false)
}
