use chrono::NaiveDate;
use sherpa_core::db::{open_db, open_db_in_memory};
use sherpa_core::{
    plan_schedule, CompletionState, DateRange, InsertReport, Instance, InstanceId, ItemId,
    ItemService, RecurrenceRule, RepoError, RepoResult, ScheduleItem, ScheduleRepository,
    ScheduleService, SqliteScheduleRepository, Weekday,
};
use std::collections::{HashMap, HashSet};
use std::thread;

fn day(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap()
}

fn all_instances(repo: &SqliteScheduleRepository<'_>) -> Vec<Instance> {
    repo.list_instances(DateRange::new(day(2000, 1, 1), day(2100, 1, 1)).unwrap())
        .unwrap()
}

#[test]
fn daily_habit_materializes_week_once() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteScheduleRepository::try_new(&conn).unwrap();
    ItemService::new(repo)
        .create_habit("Meditate", RecurrenceRule::daily(1, day(2024, 1, 1)))
        .unwrap();
    let service = ScheduleService::new(repo);

    let first = service.ensure_schedule(day(2024, 1, 1), day(2024, 1, 7)).unwrap();
    assert_eq!(first.inserted, 7);
    assert_eq!(first.range_days, 7);
    assert_eq!(first.items_considered, 1);

    let second = service.ensure_schedule(day(2024, 1, 1), day(2024, 1, 7)).unwrap();
    assert_eq!(second.inserted, 0);
    assert_eq!(all_instances(&repo).len(), 7);
    assert!(all_instances(&repo)
        .iter()
        .all(|instance| instance.status == CompletionState::Pending));
}

#[test]
fn overlapping_windows_never_duplicate() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteScheduleRepository::try_new(&conn).unwrap();
    let items = ItemService::new(repo);
    items
        .create_habit("Walk", RecurrenceRule::daily(1, day(2024, 3, 1)))
        .unwrap();
    items
        .create_habit(
            "Gym",
            RecurrenceRule::weekly(1, day(2024, 3, 1), [Weekday::Monday, Weekday::Thursday]),
        )
        .unwrap();
    let service = ScheduleService::new(repo);

    service.ensure_schedule(day(2024, 3, 1), day(2024, 3, 10)).unwrap();
    service.ensure_schedule(day(2024, 3, 5), day(2024, 3, 20)).unwrap();
    service.ensure_window(day(2024, 3, 12), 3, 14).unwrap();

    let instances = all_instances(&repo);
    let pairs = instances
        .iter()
        .map(|instance| (instance.item_uuid, instance.occurs_on))
        .collect::<HashSet<_>>();
    assert_eq!(pairs.len(), instances.len());
    // Walk covers 2024-03-01..=2024-03-26.
    assert_eq!(
        instances.iter().filter(|i| i.occurs_on <= day(2024, 3, 26)).count(),
        instances.len()
    );
}

#[test]
fn occurrence_limit_spans_calls() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteScheduleRepository::try_new(&conn).unwrap();
    let rule = RecurrenceRule::daily(1, day(2024, 1, 1)).with_occurrence_limit(Some(2));
    let habit = ItemService::new(repo).create_habit("Hydrate", rule).unwrap();
    let service = ScheduleService::new(repo);

    let outcome = service.ensure_schedule(day(2024, 1, 1), day(2024, 1, 6)).unwrap();
    assert_eq!(outcome.inserted, 2);
    let days = repo
        .fetch_instances(habit.uuid, None)
        .unwrap()
        .into_iter()
        .map(|instance| instance.occurs_on)
        .collect::<Vec<_>>();
    assert_eq!(days, vec![day(2024, 1, 1), day(2024, 1, 2)]);

    // A later window outside the first one must not exceed the limit.
    let later = service.ensure_schedule(day(2024, 2, 1), day(2024, 2, 10)).unwrap();
    assert_eq!(later.inserted, 0);
}

#[test]
fn archived_items_get_no_new_instances() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteScheduleRepository::try_new(&conn).unwrap();
    let items = ItemService::new(repo);
    let habit = items
        .create_habit("Old habit", RecurrenceRule::daily(1, day(2024, 1, 1)))
        .unwrap();
    let service = ScheduleService::new(repo);
    service.ensure_schedule(day(2024, 1, 1), day(2024, 1, 3)).unwrap();

    items.archive_item(habit.uuid).unwrap();
    let outcome = service.ensure_schedule(day(2024, 1, 1), day(2024, 1, 10)).unwrap();
    assert_eq!(outcome.items_considered, 0);
    assert_eq!(outcome.inserted, 0);
    assert_eq!(repo.fetch_instances(habit.uuid, None).unwrap().len(), 3);
}

#[test]
fn tasks_materialize_on_due_date_only() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteScheduleRepository::try_new(&conn).unwrap();
    let items = ItemService::new(repo);
    let task = items
        .create_task("Renew passport", Some(day(2024, 6, 10)), None)
        .unwrap();
    items.create_task("Someday", None, None).unwrap();
    let service = ScheduleService::new(repo);

    let outcome = service.ensure_schedule(day(2024, 6, 1), day(2024, 6, 30)).unwrap();
    assert_eq!(outcome.items_considered, 2);
    assert_eq!(outcome.inserted, 1);

    let on_due = service.instances_on(day(2024, 6, 10)).unwrap();
    assert_eq!(on_due.len(), 1);
    assert_eq!(on_due[0].item_uuid, task.uuid);
}

#[test]
fn inverted_range_is_a_no_op() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteScheduleRepository::try_new(&conn).unwrap();
    ItemService::new(repo)
        .create_habit("Read", RecurrenceRule::daily(1, day(2024, 1, 1)))
        .unwrap();

    let outcome = ScheduleService::new(repo)
        .ensure_schedule(day(2024, 1, 10), day(2024, 1, 1))
        .unwrap();
    assert_eq!(outcome, Default::default());
    assert!(all_instances(&repo).is_empty());
}

#[test]
fn stale_plan_from_second_connection_is_dropped_not_duplicated() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("race.db");
    let conn_a = open_db(&path).unwrap();
    let conn_b = open_db(&path).unwrap();
    let repo_a = SqliteScheduleRepository::try_new(&conn_a).unwrap();
    let repo_b = SqliteScheduleRepository::try_new(&conn_b).unwrap();

    ItemService::new(repo_a)
        .create_habit("Journal", RecurrenceRule::daily(1, day(2024, 1, 1)))
        .unwrap();

    // Writer A plans against an empty table, then writer B materializes first.
    let items = repo_a.fetch_active_items().unwrap();
    let stale_plan = plan_schedule(&items, &HashMap::new(), day(2024, 1, 1), day(2024, 1, 7));
    assert_eq!(stale_plan.len(), 7);

    let outcome_b = ScheduleService::new(repo_b)
        .ensure_schedule(day(2024, 1, 1), day(2024, 1, 7))
        .unwrap();
    assert_eq!(outcome_b.inserted, 7);

    let report = repo_a.insert_instances(&stale_plan).unwrap();
    assert_eq!(
        report,
        InsertReport {
            inserted: 0,
            skipped_conflicts: 7
        }
    );
    assert_eq!(all_instances(&repo_a).len(), 7);
}

#[test]
fn concurrent_ensure_calls_produce_one_instance_per_day() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("threads.db");
    {
        let conn = open_db(&path).unwrap();
        let repo = SqliteScheduleRepository::try_new(&conn).unwrap();
        ItemService::new(repo)
            .create_habit("Floss", RecurrenceRule::daily(1, day(2024, 1, 1)))
            .unwrap();
    }

    let handles = (0..4)
        .map(|_| {
            let path = path.clone();
            thread::spawn(move || {
                let conn = open_db(&path).unwrap();
                let repo = SqliteScheduleRepository::try_new(&conn).unwrap();
                ScheduleService::new(repo)
                    .ensure_schedule(day(2024, 1, 1), day(2024, 1, 14))
                    .unwrap()
                    .inserted
            })
        })
        .collect::<Vec<_>>();
    let inserted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
    assert_eq!(inserted, 14);

    let conn = open_db(&path).unwrap();
    let repo = SqliteScheduleRepository::try_new(&conn).unwrap();
    assert_eq!(all_instances(&repo).len(), 14);
}

#[test]
fn occurrence_limit_holds_across_racing_disjoint_windows() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("limit-race.db");
    let habit = {
        let conn = open_db(&path).unwrap();
        let repo = SqliteScheduleRepository::try_new(&conn).unwrap();
        let rule = RecurrenceRule::daily(1, day(2024, 1, 1)).with_occurrence_limit(Some(2));
        ItemService::new(repo).create_habit("Cold shower", rule).unwrap()
    };

    let windows = [
        (day(2024, 1, 1), day(2024, 1, 5)),
        (day(2024, 1, 3), day(2024, 1, 9)),
        (day(2024, 1, 10), day(2024, 1, 15)),
        (day(2024, 1, 20), day(2024, 1, 25)),
    ];
    let handles = windows
        .into_iter()
        .map(|(start, end)| {
            let path = path.clone();
            thread::spawn(move || {
                let conn = open_db(&path).unwrap();
                let repo = SqliteScheduleRepository::try_new(&conn).unwrap();
                ScheduleService::new(repo)
                    .ensure_schedule(start, end)
                    .unwrap()
                    .inserted
            })
        })
        .collect::<Vec<_>>();
    let inserted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
    assert_eq!(inserted, 2);

    let conn = open_db(&path).unwrap();
    let repo = SqliteScheduleRepository::try_new(&conn).unwrap();
    assert_eq!(repo.fetch_instances(habit.uuid, None).unwrap().len(), 2);
}

#[test]
fn write_lock_joins_nested_writes_and_discards_them_on_error() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteScheduleRepository::try_new(&conn).unwrap();
    let habit = ItemService::new(repo)
        .create_habit("Read", RecurrenceRule::daily(1, day(2024, 1, 1)))
        .unwrap();

    let err = repo
        .with_write_lock(|| {
            let report = repo.insert_instances(&[Instance::pending(habit.uuid, day(2024, 1, 1))])?;
            assert_eq!(report.inserted, 1);
            Err::<(), _>(RepoError::InvalidData("abort".to_string()))
        })
        .unwrap_err();
    assert!(matches!(err, RepoError::InvalidData(_)));
    assert!(all_instances(&repo).is_empty());

    let report = repo
        .with_write_lock(|| repo.insert_instances(&[Instance::pending(habit.uuid, day(2024, 1, 2))]))
        .unwrap();
    assert_eq!(report.inserted, 1);
    assert_eq!(all_instances(&repo).len(), 1);
}

#[test]
fn streak_uses_day_habits_only() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteScheduleRepository::try_new(&conn).unwrap();
    let items = ItemService::new(repo);
    items
        .create_habit("A", RecurrenceRule::daily(1, day(2024, 1, 1)))
        .unwrap();
    items
        .create_habit("B", RecurrenceRule::daily(1, day(2024, 1, 1)))
        .unwrap();
    items
        .create_task("Errand", Some(day(2024, 1, 1)), None)
        .unwrap();
    let service = ScheduleService::new(repo);
    service.ensure_schedule(day(2024, 1, 1), day(2024, 1, 1)).unwrap();
    assert!(!service.day_qualifies_for_streak(day(2024, 1, 1)).unwrap());

    let habits = repo
        .fetch_active_items()
        .unwrap()
        .into_iter()
        .filter(|item| item.title == "A")
        .map(|item| item.uuid)
        .collect::<HashSet<_>>();
    let first_habit = service
        .instances_on(day(2024, 1, 1))
        .unwrap()
        .into_iter()
        .find(|instance| habits.contains(&instance.item_uuid))
        .unwrap();
    items
        .update_instance_status(first_habit.uuid, CompletionState::Completed, None)
        .unwrap();
    assert!(service.day_qualifies_for_streak(day(2024, 1, 1)).unwrap());
}

/// Repository whose batch insert always fails.
struct FailingInsertRepo<'conn> {
    inner: SqliteScheduleRepository<'conn>,
}

impl ScheduleRepository for FailingInsertRepo<'_> {
    fn create_item(&self, item: &ScheduleItem) -> RepoResult<ItemId> {
        self.inner.create_item(item)
    }

    fn get_item(&self, id: ItemId) -> RepoResult<Option<ScheduleItem>> {
        self.inner.get_item(id)
    }

    fn archive_item(&self, id: ItemId) -> RepoResult<()> {
        self.inner.archive_item(id)
    }

    fn fetch_active_items(&self) -> RepoResult<Vec<ScheduleItem>> {
        self.inner.fetch_active_items()
    }

    fn fetch_instances(
        &self,
        item_id: ItemId,
        range: Option<DateRange>,
    ) -> RepoResult<Vec<Instance>> {
        self.inner.fetch_instances(item_id, range)
    }

    fn list_instances(&self, range: DateRange) -> RepoResult<Vec<Instance>> {
        self.inner.list_instances(range)
    }

    fn get_instance(&self, id: InstanceId) -> RepoResult<Option<Instance>> {
        self.inner.get_instance(id)
    }

    fn update_instance(&self, instance: &Instance) -> RepoResult<()> {
        self.inner.update_instance(instance)
    }

    fn insert_instances(&self, _instances: &[Instance]) -> RepoResult<InsertReport> {
        Err(RepoError::InvalidData("disk full".to_string()))
    }

    fn with_write_lock<T>(&self, work: impl FnOnce() -> RepoResult<T>) -> RepoResult<T> {
        self.inner.with_write_lock(work)
    }
}

#[test]
fn persistence_failure_propagates() {
    let conn = open_db_in_memory().unwrap();
    let inner = SqliteScheduleRepository::try_new(&conn).unwrap();
    ItemService::new(inner)
        .create_habit("Read", RecurrenceRule::daily(1, day(2024, 1, 1)))
        .unwrap();

    let service = ScheduleService::new(FailingInsertRepo { inner });
    let err = service
        .ensure_schedule(day(2024, 1, 1), day(2024, 1, 7))
        .unwrap_err();
    assert!(matches!(err, RepoError::InvalidData(_)));
    assert!(all_instances(&inner).is_empty());

    // An empty plan never reaches the failing write.
    let empty = service
        .ensure_schedule(day(2023, 1, 1), day(2023, 1, 7))
        .unwrap();
    assert_eq!(empty.inserted, 0);
}

#[test]
fn default_window_covers_recent_past_and_two_weeks_ahead() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteScheduleRepository::try_new(&conn).unwrap();
    ItemService::new(repo)
        .create_habit("Journal", RecurrenceRule::daily(1, day(2024, 1, 1)))
        .unwrap();
    let service = ScheduleService::new(repo);

    let outcome = service.ensure_default_window(day(2024, 1, 10)).unwrap();
    assert_eq!(outcome.range_days, 18);
    assert_eq!(outcome.inserted, 18);

    let days = all_instances(&repo)
        .into_iter()
        .map(|instance| instance.occurs_on)
        .collect::<Vec<_>>();
    assert_eq!(days.first(), Some(&day(2024, 1, 7)));
    assert_eq!(days.last(), Some(&day(2024, 1, 24)));

    let slice = service
        .instances_between(DateRange::new(day(2024, 1, 20), day(2024, 1, 22)).unwrap())
        .unwrap()
        .into_iter()
        .map(|instance| instance.occurs_on)
        .collect::<Vec<_>>();
    assert_eq!(slice, vec![day(2024, 1, 20), day(2024, 1, 21), day(2024, 1, 22)]);
}
