//! CLI smoke entry point.
//!
//! # Responsibility
//! - Verify `sherpa_core` linkage, fill the default schedule window and
//!   print a 7-day agenda.
//! - Keep output deterministic for quick local sanity checks.
//!
//! Usage: `sherpa_cli [DB_PATH] [--demo]`. Without `DB_PATH` an in-memory
//! database is used; `--demo` seeds two sample habits first.

use sherpa_core::calendar::{self, DateRange};
use sherpa_core::{
    open_db, open_db_in_memory, Instance, ItemService, RecurrenceRule, ScheduleService,
    SqliteScheduleRepository, Weekday,
};
use std::collections::{BTreeMap, HashMap};
use std::process::ExitCode;

const AGENDA_DAYS: u32 = 7;

fn main() -> ExitCode {
    println!("sherpa_core ping={}", sherpa_core::ping());
    println!("sherpa_core version={}", sherpa_core::core_version());

    match run(std::env::args().skip(1).collect()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Vec<String>) -> Result<(), Box<dyn std::error::Error>> {
    let demo = args.iter().any(|arg| arg == "--demo");
    let db_path = args.iter().find(|arg| !arg.starts_with("--"));

    let conn = match db_path {
        Some(path) => open_db(path)?,
        None => open_db_in_memory()?,
    };
    let repo = SqliteScheduleRepository::try_new(&conn)?;
    let today = calendar::today();

    let items = ItemService::new(repo);
    if demo {
        items.create_habit("Stretch", RecurrenceRule::daily(1, today))?;
        items.create_habit(
            "Long run",
            RecurrenceRule::weekly(1, today, [Weekday::Saturday, Weekday::Sunday]),
        )?;
    }

    let schedule = ScheduleService::new(repo);
    let outcome = schedule.ensure_default_window(today)?;
    println!(
        "schedule items={} inserted={}",
        outcome.items_considered, outcome.inserted
    );

    let titles = items
        .list_active_items()?
        .into_iter()
        .map(|item| (item.uuid, item.title))
        .collect::<HashMap<_, _>>();
    let agenda = DateRange::around(today, 0, AGENDA_DAYS - 1);
    let mut by_day = BTreeMap::<_, Vec<Instance>>::new();
    for instance in schedule.instances_between(agenda)? {
        by_day.entry(instance.occurs_on).or_default().push(instance);
    }
    for day in agenda.days() {
        println!("{} {}", calendar::format_day(day), Weekday::of(day).short_symbol());
        for instance in by_day.remove(&day).unwrap_or_default() {
            if let Some(title) = titles.get(&instance.item_uuid) {
                println!("  [{:?}] {title}", instance.status);
            }
        }
    }
    Ok(())
}
