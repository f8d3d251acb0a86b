//! FFI use-case API for Flutter-facing calls.
//!
//! # Responsibility
//! - Expose schedule use-cases (habit/task creation, window materialization,
//!   day agenda, status updates) to Dart via FRB.
//! - Translate string-typed UI input into core types at the boundary.
//!
//! # Invariants
//! - Exported functions must not panic across FFI boundary.
//! - Calendar days cross the boundary as `YYYY-MM-DD` strings.
//! - Failures are reported through `ok=false` envelopes, never by throwing.

use chrono::{Datelike, NaiveDate};
use log::warn;
use sherpa_core::calendar::{format_day, parse_day};
use sherpa_core::db::open_db;
use sherpa_core::{
    core_version as core_version_inner, init_logging as init_logging_inner, ping as ping_inner,
    CompletionState, Instance, ItemKind, ItemService, RecurrenceFrequency, RepeatConfiguration,
    RepeatEnd, RepeatPattern, ScheduleItem, ScheduleService, SqliteScheduleRepository, Weekday,
};
use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;
use std::sync::OnceLock;
use uuid::Uuid;

const SCHEDULE_DB_FILE_NAME: &str = "sherpa_schedule.sqlite3";
const DB_PATH_ENV: &str = "SHERPA_DB_PATH";
static SCHEDULE_DB_PATH: OnceLock<PathBuf> = OnceLock::new();

/// Minimal health-check API for FRB smoke integration.
///
/// # FFI contract
/// - Sync call, non-blocking.
/// - Never throws; always returns a UTF-8 string.
#[flutter_rust_bridge::frb(sync)]
pub fn ping() -> String {
    ping_inner().to_owned()
}

/// Expose core crate version through FFI.
#[flutter_rust_bridge::frb(sync)]
pub fn core_version() -> String {
    core_version_inner().to_owned()
}

/// Initializes Rust core logging once per process.
///
/// Input semantics:
/// - `level`: one of `trace|debug|info|warn|error` (case-insensitive).
/// - `log_dir`: absolute directory path where rolling logs are written.
///
/// # FFI contract
/// - Safe to call repeatedly with the same `level + log_dir` (idempotent).
/// - Returns empty string on success and error message on failure.
#[flutter_rust_bridge::frb(sync)]
pub fn init_logging(level: String, log_dir: String) -> String {
    match init_logging_inner(level.as_str(), log_dir.as_str()) {
        Ok(()) => String::new(),
        Err(err) => err,
    }
}

/// Generic action envelope for create/update calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleActionResponse {
    /// Whether operation succeeded.
    pub ok: bool,
    /// ID of the created item or updated instance.
    pub id: Option<String>,
    /// Human-readable response message for diagnostics/UI.
    pub message: String,
}

impl ScheduleActionResponse {
    fn success(message: impl Into<String>, id: Uuid) -> Self {
        Self {
            ok: true,
            id: Some(id.to_string()),
            message: message.into(),
        }
    }

    fn failure(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            id: None,
            message: message.into(),
        }
    }
}

/// Result envelope for [`schedule_ensure`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleEnsureResponse {
    pub ok: bool,
    /// Instances created by this call.
    pub inserted: u32,
    /// Planned instances another writer created first.
    pub skipped_conflicts: u32,
    pub message: String,
}

/// One row of a day agenda.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgendaEntry {
    pub instance_id: String,
    pub item_id: String,
    pub title: String,
    /// `habit|task`.
    pub kind: String,
    /// `pending|completed|skipped|skipped_with_note`.
    pub status: String,
    pub note: Option<String>,
}

/// Day agenda envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgendaResponse {
    pub ok: bool,
    pub day: String,
    pub entries: Vec<AgendaEntry>,
    /// Whether the day's habits earn streak credit.
    pub streak_qualified: bool,
    pub message: String,
}

/// Ensures instances exist for every due item in `[start_day, end_day]`.
///
/// # FFI contract
/// - Sync call, DB-backed execution.
/// - An inverted range succeeds with zero insertions.
/// - Never panics.
#[flutter_rust_bridge::frb(sync)]
pub fn schedule_ensure(start_day: String, end_day: String) -> ScheduleEnsureResponse {
    let result = parse_day_arg("start_day", &start_day)
        .and_then(|start| Ok((start, parse_day_arg("end_day", &end_day)?)))
        .and_then(|(start, end)| {
            with_repo(|repo| {
                ScheduleService::new(repo)
                    .ensure_schedule(start, end)
                    .map_err(|err| err.to_string())
            })
        });

    match result {
        Ok(outcome) => ScheduleEnsureResponse {
            ok: true,
            inserted: to_u32(outcome.inserted),
            skipped_conflicts: to_u32(outcome.skipped_conflicts),
            message: format!("Scheduled {} instance(s).", outcome.inserted),
        },
        Err(err) => ScheduleEnsureResponse {
            ok: false,
            inserted: 0,
            skipped_conflicts: 0,
            message: format!("schedule_ensure failed: {err}"),
        },
    }
}

/// Creates a habit from repeat picker input.
///
/// Input semantics:
/// - `frequency`: `once|daily|weekly|monthly`.
/// - `weekdays`: Sunday-first indexes `1..=7`, weekly only; empty means the
///   start day's weekday.
/// - `day_of_month`: monthly only; defaults to the start day's day-of-month.
///   The first occurrence is the next matching day on or after `start_day`.
/// - `end_day` and `occurrence_limit` are mutually exclusive.
///
/// # FFI contract
/// - Sync call, DB-backed execution.
/// - Never panics.
/// - Returns created item ID on success.
#[flutter_rust_bridge::frb(sync)]
#[allow(clippy::too_many_arguments)]
pub fn habit_create(
    title: String,
    start_day: String,
    frequency: String,
    interval: u32,
    weekdays: Vec<u8>,
    day_of_month: Option<u32>,
    end_day: Option<String>,
    occurrence_limit: Option<u32>,
) -> ScheduleActionResponse {
    let parsed = parse_day_arg("start_day", &start_day).and_then(|start| {
        let repeat = build_repeat(
            start,
            &frequency,
            interval,
            &weekdays,
            day_of_month,
            end_day.as_deref(),
            occurrence_limit,
        )?;
        Ok((start, repeat))
    });
    let (start, repeat) = match parsed {
        Ok(parsed) => parsed,
        Err(err) => return ScheduleActionResponse::failure(format!("habit_create failed: {err}")),
    };

    let result = with_repo(|repo| {
        ItemService::new(repo)
            .create_habit_from_repeat(&title, start, &repeat)
            .map_err(|err| err.to_string())
    });
    match result {
        Ok(item) => ScheduleActionResponse::success("Habit created.", item.uuid),
        Err(err) => ScheduleActionResponse::failure(format!("habit_create failed: {err}")),
    }
}

/// Creates a one-shot task with an optional due day.
///
/// # FFI contract
/// - Sync call, DB-backed execution.
/// - Never panics.
/// - Tasks without a due day are stored but never scheduled.
#[flutter_rust_bridge::frb(sync)]
pub fn task_create(title: String, due_day: Option<String>) -> ScheduleActionResponse {
    let due = match due_day.as_deref().map(|raw| parse_day_arg("due_day", raw)) {
        Some(Ok(day)) => Some(day),
        Some(Err(err)) => {
            return ScheduleActionResponse::failure(format!("task_create failed: {err}"))
        }
        None => None,
    };

    let result = with_repo(|repo| {
        ItemService::new(repo)
            .create_task(&title, due, None)
            .map_err(|err| err.to_string())
    });
    match result {
        Ok(item) => ScheduleActionResponse::success("Task created.", item.uuid),
        Err(err) => ScheduleActionResponse::failure(format!("task_create failed: {err}")),
    }
}

/// Materializes `day` and returns its instances with item titles.
///
/// # FFI contract
/// - Sync call, DB-backed execution.
/// - Instances of archived items are omitted.
/// - Never panics.
#[flutter_rust_bridge::frb(sync)]
pub fn agenda_for_day(day: String) -> AgendaResponse {
    let failure = |day: &str, err: String| AgendaResponse {
        ok: false,
        day: day.to_string(),
        entries: Vec::new(),
        streak_qualified: false,
        message: format!("agenda_for_day failed: {err}"),
    };

    let parsed = match parse_day_arg("day", &day) {
        Ok(parsed) => parsed,
        Err(err) => return failure(&day, err),
    };

    let result = with_repo(|repo| {
        let schedule = ScheduleService::new(repo);
        schedule
            .ensure_schedule(parsed, parsed)
            .map_err(|err| err.to_string())?;
        let instances = schedule.instances_on(parsed).map_err(|err| err.to_string())?;
        let streak = schedule
            .day_qualifies_for_streak(parsed)
            .map_err(|err| err.to_string())?;
        let items = ItemService::new(repo)
            .list_active_items()
            .map_err(|err| err.to_string())?;
        Ok((instances, items, streak))
    });

    match result {
        Ok((instances, items, streak_qualified)) => {
            let entries = build_agenda(instances, items);
            let message = if entries.is_empty() {
                "Nothing scheduled.".to_string()
            } else {
                format!("{} item(s) scheduled.", entries.len())
            };
            AgendaResponse {
                ok: true,
                day: format_day(parsed),
                entries,
                streak_qualified,
                message,
            }
        }
        Err(err) => failure(&day, err),
    }
}

/// Updates the completion state of one instance.
///
/// Input semantics:
/// - `status`: `pending|completed|skipped|skipped_with_note`.
/// - `note`: kept only for `skipped_with_note`.
///
/// # FFI contract
/// - Sync call, DB-backed execution.
/// - Never panics.
#[flutter_rust_bridge::frb(sync)]
pub fn instance_update_status(
    instance_id: String,
    status: String,
    note: Option<String>,
) -> ScheduleActionResponse {
    let parsed = Uuid::parse_str(instance_id.trim())
        .map_err(|err| format!("invalid instance_id `{instance_id}`: {err}"))
        .and_then(|id| Ok((id, parse_status(&status)?)));
    let (id, status) = match parsed {
        Ok(parsed) => parsed,
        Err(err) => {
            return ScheduleActionResponse::failure(format!(
                "instance_update_status failed: {err}"
            ))
        }
    };

    let result = with_repo(|repo| {
        ItemService::new(repo)
            .update_instance_status(id, status, note.as_deref())
            .map_err(|err| err.to_string())
    });
    match result {
        Ok(instance) => ScheduleActionResponse::success("Status updated.", instance.uuid),
        Err(err) => {
            ScheduleActionResponse::failure(format!("instance_update_status failed: {err}"))
        }
    }
}

fn build_repeat(
    start: NaiveDate,
    frequency: &str,
    interval: u32,
    weekdays: &[u8],
    day_of_month: Option<u32>,
    end_day: Option<&str>,
    occurrence_limit: Option<u32>,
) -> Result<RepeatConfiguration, String> {
    let pattern = match parse_frequency(frequency)? {
        RecurrenceFrequency::Once => RepeatPattern::None,
        RecurrenceFrequency::Daily => RepeatPattern::Daily { interval },
        RecurrenceFrequency::Weekly => RepeatPattern::Weekly {
            interval,
            weekdays: weekdays
                .iter()
                .map(|index| {
                    Weekday::from_index(i64::from(*index))
                        .ok_or_else(|| format!("weekday index must be 1..=7, got {index}"))
                })
                .collect::<Result<BTreeSet<_>, _>>()?,
        },
        RecurrenceFrequency::Monthly => RepeatPattern::Monthly {
            interval,
            day: day_of_month.unwrap_or_else(|| start.day()),
        },
    };

    let end = match (end_day, occurrence_limit) {
        (Some(_), Some(_)) => {
            return Err("end_day and occurrence_limit cannot both be set".to_string())
        }
        (Some(raw), None) => RepeatEnd::OnDate(parse_day_arg("end_day", raw)?),
        (None, Some(count)) => RepeatEnd::AfterOccurrences(count),
        (None, None) => RepeatEnd::Never,
    };
    Ok(RepeatConfiguration::new(pattern, end))
}

fn build_agenda(instances: Vec<Instance>, items: Vec<ScheduleItem>) -> Vec<AgendaEntry> {
    let items_by_id = items
        .into_iter()
        .map(|item| (item.uuid, item))
        .collect::<HashMap<_, _>>();

    instances
        .into_iter()
        .filter_map(|instance| {
            let item = items_by_id.get(&instance.item_uuid)?;
            Some(AgendaEntry {
                instance_id: instance.uuid.to_string(),
                item_id: item.uuid.to_string(),
                title: item.title.clone(),
                kind: kind_label(item.kind).to_string(),
                status: status_label(instance.status).to_string(),
                note: instance.note,
            })
        })
        .collect()
}

fn parse_day_arg(name: &str, raw: &str) -> Result<NaiveDate, String> {
    parse_day(raw.trim()).ok_or_else(|| format!("{name} must be YYYY-MM-DD, got `{raw}`"))
}

fn parse_frequency(raw: &str) -> Result<RecurrenceFrequency, String> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "once" => Ok(RecurrenceFrequency::Once),
        "daily" => Ok(RecurrenceFrequency::Daily),
        "weekly" => Ok(RecurrenceFrequency::Weekly),
        "monthly" => Ok(RecurrenceFrequency::Monthly),
        other => Err(format!(
            "unsupported frequency `{other}`; expected once|daily|weekly|monthly"
        )),
    }
}

fn parse_status(raw: &str) -> Result<CompletionState, String> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "pending" => Ok(CompletionState::Pending),
        "completed" => Ok(CompletionState::Completed),
        "skipped" => Ok(CompletionState::Skipped),
        "skipped_with_note" => Ok(CompletionState::SkippedWithNote),
        other => Err(format!(
            "unsupported status `{other}`; expected pending|completed|skipped|skipped_with_note"
        )),
    }
}

fn status_label(status: CompletionState) -> &'static str {
    match status {
        CompletionState::Pending => "pending",
        CompletionState::Completed => "completed",
        CompletionState::Skipped => "skipped",
        CompletionState::SkippedWithNote => "skipped_with_note",
    }
}

fn kind_label(kind: ItemKind) -> &'static str {
    match kind {
        ItemKind::Habit => "habit",
        ItemKind::Task => "task",
    }
}

fn to_u32(value: usize) -> u32 {
    u32::try_from(value).unwrap_or(u32::MAX)
}

fn resolve_db_path() -> PathBuf {
    SCHEDULE_DB_PATH
        .get_or_init(|| {
            if let Ok(raw) = std::env::var(DB_PATH_ENV) {
                let trimmed = raw.trim();
                if !trimmed.is_empty() {
                    return PathBuf::from(trimmed);
                }
            }
            std::env::temp_dir().join(SCHEDULE_DB_FILE_NAME)
        })
        .clone()
}

fn with_repo<T>(
    f: impl FnOnce(SqliteScheduleRepository<'_>) -> Result<T, String>,
) -> Result<T, String> {
    let db_path = resolve_db_path();
    let conn = open_db(&db_path).map_err(|err| {
        warn!("event=ffi_db_open module=ffi status=error error={err}");
        format!("schedule DB open failed: {err}")
    })?;
    let repo = SqliteScheduleRepository::try_new(&conn)
        .map_err(|err| format!("schedule repo init failed: {err}"))?;
    f(repo)
}
