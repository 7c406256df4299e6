//! Command surface for the performance tracker engine.
//!
//! Hosts embed the engine through:
//! - [`run_cli`] for full parsed CLI execution.
//! - [`run_command`] for a parsed [`Command`] against an already loaded snapshot.
//!
//! Every command takes its reference date as an argument; nothing here reads
//! the wall clock. JSON output is wrapped in a versioned [`Envelope`].

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use log::info;
use performance_tracker_core::{
    build_today_snapshot, build_window_report, compute_daily_metric, compute_metrics_range,
    format_day_key, normalize_sources, parse_calendar_date, plan_history, tasks_for_day,
    week_end, week_start, DailyMetric, DashboardSnapshot, PlanProgress, ScoringRuleset,
    SourceSnapshot, Task, TaskPriority, TimeRange, WindowReport,
};
use serde::Serialize;
use time::macros::format_description;
use time::{Date, UtcOffset};

#[derive(Debug, Parser)]
#[command(name = "pt")]
#[command(about = "Performance Tracker CLI")]
pub struct Cli {
    /// JSON snapshot of todos, dailyRatings, weeklyPlans, and negativeThoughts.
    #[arg(long)]
    snapshot: Option<PathBuf>,

    /// JSON scoring ruleset overriding the built-in v1 weights.
    #[arg(long)]
    ruleset: Option<PathBuf>,

    /// Local offset used to resolve timestamped records to calendar days.
    #[arg(long, default_value = "+00:00", allow_hyphen_values = true)]
    utc_offset: String,

    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

impl Cli {
    #[must_use]
    pub fn verbosity(&self) -> u8 {
        self.verbose
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    Week {
        #[command(subcommand)]
        command: Box<WeekCommand>,
    },
    Metrics {
        #[command(subcommand)]
        command: Box<MetricsCommand>,
    },
    Trend(TrendArgs),
    Dashboard(DashboardArgs),
    Plans {
        #[command(subcommand)]
        command: Box<PlansCommand>,
    },
    Tasks(TasksArgs),
}

#[derive(Debug, Subcommand)]
pub enum WeekCommand {
    Start(WeekStartArgs),
}

#[derive(Debug, Args)]
pub struct WeekStartArgs {
    #[arg(long)]
    date: String,
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Subcommand)]
pub enum MetricsCommand {
    Day(MetricsDayArgs),
    Range(MetricsRangeArgs),
}

#[derive(Debug, Args)]
pub struct MetricsDayArgs {
    #[arg(long)]
    date: String,
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Args)]
pub struct MetricsRangeArgs {
    #[arg(long)]
    from: String,
    #[arg(long)]
    to: String,
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Args)]
pub struct TrendArgs {
    /// One of week, month, year.
    #[arg(long)]
    range: String,
    #[arg(long)]
    as_of: String,
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Args)]
pub struct DashboardArgs {
    #[arg(long)]
    today: String,
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Subcommand)]
pub enum PlansCommand {
    History(PlansHistoryArgs),
}

#[derive(Debug, Args)]
pub struct PlansHistoryArgs {
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Args)]
pub struct TasksArgs {
    #[arg(long)]
    date: String,
    /// Only list tasks of this priority (low, medium, high).
    #[arg(long)]
    priority: Option<String>,
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Envelope<T>
where
    T: Serialize,
{
    contract_version: &'static str,
    data: T,
}

impl<T: Serialize> Envelope<T> {
    fn new(contract_version: &'static str, data: T) -> Self {
        Self {
            contract_version,
            data,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WeekBounds {
    date: String,
    week_start: String,
    week_end: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MetricRange {
    from: String,
    to: String,
    metrics: Vec<DailyMetric>,
}

/// Installs the stderr logger once; later calls are no-ops.
///
/// `PT_LOG` overrides the level derived from `verbosity`.
pub fn init_logging(verbosity: u8) {
    let default_level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let env = env_logger::Env::default().filter_or("PT_LOG", default_level);
    let _ = env_logger::Builder::from_env(env)
        .target(env_logger::Target::Stderr)
        .try_init();
}

/// Executes the parsed top-level CLI command graph.
///
/// # Errors
/// Returns an error when arguments are invalid, the snapshot or ruleset
/// cannot be loaded, or the engine rejects the input.
pub fn run_cli(cli: Cli) -> Result<()> {
    let offset = parse_utc_offset(&cli.utc_offset)?;
    match cli.command {
        Command::Week { command } => run_week(&command),
        command => {
            let Some(snapshot_path) = cli.snapshot.as_deref() else {
                return Err(anyhow!("--snapshot <path> is required for this command"));
            };
            let snapshot = load_snapshot(snapshot_path)?;
            let ruleset = load_ruleset(cli.ruleset.as_deref())?;
            run_command(command, &snapshot, offset, &ruleset)
        }
    }
}

/// Executes a parsed command against an already loaded snapshot.
///
/// # Errors
/// Returns an error when date arguments are invalid or normalization of the
/// snapshot fails.
pub fn run_command(
    command: Command,
    snapshot: &SourceSnapshot,
    offset: UtcOffset,
    ruleset: &ScoringRuleset,
) -> Result<()> {
    let sources = || normalize_sources(snapshot, offset, ruleset);
    match command {
        Command::Week { command } => run_week(&command),
        Command::Metrics { command } => match *command {
            MetricsCommand::Day(args) => {
                let day = parse_date_arg("--date", &args.date)?;
                let metric = compute_daily_metric(day, &sources()?, ruleset);
                if args.json {
                    print_json(&Envelope::new("daily_metric.v1", metric))
                } else {
                    print_metric_table(std::slice::from_ref(&metric));
                    Ok(())
                }
            }
            MetricsCommand::Range(args) => {
                let from = parse_date_arg("--from", &args.from)?;
                let to = parse_date_arg("--to", &args.to)?;
                let metrics = compute_metrics_range(from, to, &sources()?, ruleset)?;
                if args.json {
                    print_json(&Envelope::new(
                        "metric_range.v1",
                        MetricRange {
                            from: format_day_key(from),
                            to: format_day_key(to),
                            metrics,
                        },
                    ))
                } else {
                    print_metric_table(&metrics);
                    Ok(())
                }
            }
        },
        Command::Trend(args) => {
            let range: TimeRange = args
                .range
                .parse()
                .map_err(|err| anyhow!("invalid --range value: {err}"))?;
            let as_of = parse_date_arg("--as-of", &args.as_of)?;
            let report = build_window_report(range, as_of, &sources()?, ruleset)?;
            if args.json {
                print_json(&Envelope::new("window_report.v1", report))
            } else {
                print_window_report(&report);
                Ok(())
            }
        }
        Command::Dashboard(args) => {
            let today = parse_date_arg("--today", &args.today)?;
            let dashboard = build_today_snapshot(&sources()?, today, ruleset);
            if args.json {
                print_json(&Envelope::new("dashboard.v1", dashboard))
            } else {
                print_dashboard(&dashboard);
                Ok(())
            }
        }
        Command::Plans { command } => match *command {
            PlansCommand::History(args) => {
                let history = plan_history(&sources()?);
                if args.json {
                    print_json(&Envelope::new("plan_history.v1", history))
                } else {
                    print_plan_history(&history);
                    Ok(())
                }
            }
        },
        Command::Tasks(args) => {
            let day = parse_date_arg("--date", &args.date)?;
            let priority = args
                .priority
                .as_deref()
                .map(parse_priority_arg)
                .transpose()?;
            let sources = sources()?;
            let mut tasks = tasks_for_day(&sources, day);
            if let Some(priority) = priority {
                tasks.retain(|task| task.priority == priority);
            }
            if args.json {
                print_json(&Envelope::new("task_agenda.v1", tasks))
            } else {
                print_task_agenda(&tasks);
                Ok(())
            }
        }
    }
}

fn run_week(command: &WeekCommand) -> Result<()> {
    match command {
        WeekCommand::Start(args) => {
            let day = parse_date_arg("--date", &args.date)?;
            let bounds = week_bounds(day);
            if args.json {
                print_json(&Envelope::new("week_bounds.v1", bounds))
            } else {
                println!(
                    "date={} week_start={} week_end={}",
                    bounds.date, bounds.week_start, bounds.week_end
                );
                Ok(())
            }
        }
    }
}

fn week_bounds(day: Date) -> WeekBounds {
    let start = week_start(day);
    WeekBounds {
        date: format_day_key(day),
        week_start: format_day_key(start),
        week_end: format_day_key(week_end(start)),
    }
}

/// Reads and decodes a snapshot file.
///
/// # Errors
/// Returns an error when the file cannot be read or is not a valid snapshot.
pub fn load_snapshot(path: &Path) -> Result<SourceSnapshot> {
    let body = std::fs::read_to_string(path)
        .with_context(|| format!("failed reading snapshot from {}", path.display()))?;
    let value: serde_json::Value = serde_json::from_str(&body)
        .with_context(|| format!("snapshot must be valid JSON: {}", path.display()))?;
    let snapshot = SourceSnapshot::from_json(&value)?;
    info!(
        "event=snapshot_loaded module=cli tasks={} ratings={} plans={} thoughts={}",
        snapshot.tasks.len(),
        snapshot.daily_ratings.len(),
        snapshot.weekly_plans.len(),
        snapshot.negative_thoughts.len()
    );
    Ok(snapshot)
}

/// Loads a ruleset override, or the built-in v1 ruleset when `path` is `None`.
///
/// # Errors
/// Returns an error when the file cannot be read or fails ruleset validation.
pub fn load_ruleset(path: Option<&Path>) -> Result<ScoringRuleset> {
    let Some(path) = path else {
        return Ok(ScoringRuleset::v1());
    };
    let body = std::fs::read_to_string(path)
        .with_context(|| format!("failed reading ruleset from {}", path.display()))?;
    let value: serde_json::Value = serde_json::from_str(&body)
        .with_context(|| format!("ruleset must be valid JSON: {}", path.display()))?;
    let ruleset = ScoringRuleset::from_json(&value)?;
    info!(
        "event=ruleset_loaded module=cli ruleset_version={} path={}",
        ruleset.ruleset_version,
        path.display()
    );
    Ok(ruleset)
}

fn parse_utc_offset(raw: &str) -> Result<UtcOffset> {
    if raw.eq_ignore_ascii_case("z") {
        return Ok(UtcOffset::UTC);
    }
    UtcOffset::parse(
        raw,
        format_description!("[offset_hour sign:mandatory]:[offset_minute]"),
    )
    .map_err(|err| anyhow!("invalid --utc-offset value `{raw}`: {err}"))
}

fn parse_date_arg(flag: &str, raw: &str) -> Result<Date> {
    parse_calendar_date(raw).map_err(|err| anyhow!("invalid {flag} value: {err}"))
}

fn parse_priority_arg(raw: &str) -> Result<TaskPriority> {
    TaskPriority::parse(raw).ok_or_else(|| {
        anyhow!("invalid --priority value: `{raw}`; expected low, medium, or high")
    })
}

fn print_json<T: Serialize>(payload: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(payload)?);
    Ok(())
}

fn yes_no(value: bool) -> &'static str {
    if value {
        "yes"
    } else {
        "no"
    }
}

fn print_metric_table(metrics: &[DailyMetric]) {
    println!(
        "{:<12} {:<6} {:<11} {:<9} {:<12} rating",
        "date", "score", "completion", "planned", "weekly_plan"
    );
    println!("{}", "-".repeat(60));
    for metric in metrics {
        println!(
            "{:<12} {:<6.1} {:<11.2} {:<9} {:<12} {}",
            format_day_key(metric.date),
            metric.score,
            metric.todo_completion_rate,
            yes_no(metric.planned_next_day),
            yes_no(metric.weekly_plan_published),
            metric.manual_rating
        );
    }
}

fn print_window_report(report: &WindowReport) {
    println!(
        "range={} start={} end={} days={}",
        report.range,
        format_day_key(report.window.start),
        format_day_key(report.window.end),
        report.metrics.len()
    );
    println!(
        "average_score={:.1} direction={} completion={}% planning={}%",
        report.trend.average_score,
        report.trend.direction.as_str(),
        report.average_completion_percent,
        report.planning_rate_percent
    );
    print_metric_table(&report.metrics);
}

fn print_dashboard(dashboard: &DashboardSnapshot) {
    println!(
        "today_score={:.1} weekly_plan_published={} todos={}/{} avg_rating_7d={:.1} thoughts={} occurrences={}",
        dashboard.today_performance_score,
        yes_no(dashboard.current_week_plan_published),
        dashboard.completed_todos,
        dashboard.total_todos,
        dashboard.last7_day_average_rating,
        dashboard.total_thoughts_logged,
        dashboard.total_occurrences
    );
}

fn print_plan_history(history: &[PlanProgress]) {
    println!("{:<12} {:<12} {:<10} goals", "week_start", "week_end", "published");
    println!("{}", "-".repeat(48));
    for item in history {
        println!(
            "{:<12} {:<12} {:<10} {}/{}",
            format_day_key(item.week_start_date),
            format_day_key(item.week_end_date),
            yes_no(item.published),
            item.completed_goals,
            item.total_goals
        );
    }
}

fn print_task_agenda(tasks: &[&Task]) {
    println!("{:<6} {:<8} text", "done", "priority");
    println!("{}", "-".repeat(48));
    for task in tasks {
        println!(
            "{:<6} {:<8} {}",
            yes_no(task.completed),
            task.priority.as_str(),
            task.text
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs;
    use time::macros::{date, offset};
    use ulid::Ulid;

    fn must<T>(result: Result<T>) -> T {
        match result {
            Ok(value) => value,
            Err(err) => panic!("test failure: {err}"),
        }
    }

    fn execute_cli(args: &[&str]) -> Result<()> {
        let cli = Cli::try_parse_from(args.iter().copied())?;
        run_cli(cli)
    }

    fn write_temp_json(prefix: &str, value: &serde_json::Value) -> PathBuf {
        let path = std::env::temp_dir().join(format!("{prefix}-{}.json", Ulid::new()));
        let body = must(serde_json::to_string_pretty(value).map_err(Into::into));
        must(fs::write(&path, body).map_err(Into::into));
        path
    }

    fn fixture_snapshot() -> serde_json::Value {
        json!({
            "todos": [
                {"id": "t1", "text": "write report", "completed": true, "priority": "high", "date": "2024-01-01T09:00:00.000Z"},
                {"id": "t2", "text": "call bank", "completed": false, "priority": "low", "date": "2024-01-01T17:30:00.000Z"},
                {"id": "t3", "text": "plan sprint", "completed": false, "priority": "medium", "date": "2024-01-02"}
            ],
            "dailyRatings": [
                {"id": "r1", "date": "2024-01-01", "rating": 8, "wentWell": "", "wentWrong": "", "improvements": "", "journal": ""}
            ],
            "weeklyPlans": [
                {"id": "p1", "weekStartDate": "2024-01-01", "goals": [], "notes": "", "published": true}
            ],
            "negativeThoughts": []
        })
    }

    #[test]
    fn utc_offset_accepts_signed_and_zulu_forms() {
        assert_eq!(must(parse_utc_offset("+02:00")), offset!(+2));
        assert_eq!(must(parse_utc_offset("-05:30")), offset!(-5:30));
        assert_eq!(must(parse_utc_offset("Z")), UtcOffset::UTC);
    }

    #[test]
    fn utc_offset_rejects_unsigned_values() {
        assert!(parse_utc_offset("02:00").is_err());
        assert!(parse_utc_offset("local").is_err());
    }

    #[test]
    fn date_arguments_must_be_calendar_dates() {
        assert_eq!(must(parse_date_arg("--date", "2024-02-29")), date!(2024 - 02 - 29));
        assert!(parse_date_arg("--date", "2023-02-29").is_err());
        assert!(parse_date_arg("--date", "2024-01-01T00:00:00Z").is_err());
    }

    #[test]
    fn week_bounds_json_contract_is_stable_v1() {
        let payload = Envelope::new("week_bounds.v1", week_bounds(date!(2024 - 01 - 07)));
        let value = must(serde_json::to_value(payload).map_err(Into::into));
        assert_eq!(
            value,
            json!({
                "contract_version": "week_bounds.v1",
                "data": {
                    "date": "2024-01-07",
                    "weekStart": "2024-01-01",
                    "weekEnd": "2024-01-07"
                }
            })
        );
    }

    #[test]
    fn missing_ruleset_path_uses_v1() {
        assert_eq!(must(load_ruleset(None)), ScoringRuleset::v1());
    }

    #[test]
    fn invalid_ruleset_file_is_rejected() {
        let mut ruleset = must(serde_json::to_value(ScoringRuleset::v1()).map_err(Into::into));
        ruleset["completion_points"] = json!(9.0);
        let path = write_temp_json("pt-ruleset-invalid", &ruleset);

        let result = load_ruleset(Some(&path));
        assert!(result.is_err());

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn data_commands_require_a_snapshot() {
        let result = execute_cli(&["pt", "dashboard", "--today", "2024-01-01"]);
        let err = match result {
            Ok(()) => panic!("expected missing snapshot error"),
            Err(err) => err,
        };
        assert!(err.to_string().contains("--snapshot"));
    }

    #[test]
    fn week_command_runs_without_snapshot() {
        must(execute_cli(&["pt", "week", "start", "--date", "2024-01-07", "--json"]));
    }

    #[test]
    fn unrecognized_range_is_reported() {
        let path = write_temp_json("pt-snapshot-range", &fixture_snapshot());
        let path_str = path.to_string_lossy().to_string();

        let result = execute_cli(&[
            "pt",
            "--snapshot",
            &path_str,
            "trend",
            "--range",
            "quarter",
            "--as-of",
            "2024-01-07",
        ]);
        let err = match result {
            Ok(()) => panic!("expected unrecognized range error"),
            Err(err) => err,
        };
        assert!(err.to_string().contains("invalid --range value"));

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn cli_end_to_end_over_snapshot_file() {
        let path = write_temp_json("pt-snapshot-e2e", &fixture_snapshot());
        let path_str = path.to_string_lossy().to_string();

        for args in [
            vec!["metrics", "day", "--date", "2024-01-01", "--json"],
            vec!["metrics", "range", "--from", "2023-12-30", "--to", "2024-01-03"],
            vec!["trend", "--range", "week", "--as-of", "2024-01-07", "--json"],
            vec!["dashboard", "--today", "2024-01-01"],
            vec!["plans", "history", "--json"],
            vec!["tasks", "--date", "2024-01-01"],
        ] {
            let mut full = vec!["pt", "--snapshot", path_str.as_str(), "--utc-offset", "-03:00"];
            full.extend(args);
            must(execute_cli(&full));
        }

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn priority_filter_accepts_known_names_only() {
        assert_eq!(must(parse_priority_arg("high")), TaskPriority::High);
        let err = match parse_priority_arg("urgent") {
            Ok(_) => panic!("expected unknown priority error"),
            Err(err) => err,
        };
        assert!(err.to_string().contains("invalid --priority value"));

        let path = write_temp_json("pt-snapshot-priority", &fixture_snapshot());
        let path_str = path.to_string_lossy().to_string();
        must(execute_cli(&[
            "pt", "--snapshot", &path_str, "tasks", "--date", "2024-01-01", "--priority", "low",
        ]));
        assert!(execute_cli(&[
            "pt", "--snapshot", &path_str, "tasks", "--date", "2024-01-01", "--priority", "urgent",
        ])
        .is_err());

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn week_command_skips_snapshot_normalization() {
        let snapshot = must(
            SourceSnapshot::from_json(&json!({"todos": [{"id": "bad", "date": "someday"}]}))
                .map_err(Into::into),
        );
        let week = Command::Week {
            command: Box::new(WeekCommand::Start(WeekStartArgs {
                date: "2024-01-07".to_string(),
                json: true,
            })),
        };
        must(run_command(week, &snapshot, UtcOffset::UTC, &ScoringRuleset::v1()));

        let dashboard = Command::Dashboard(DashboardArgs {
            today: "2024-01-01".to_string(),
            json: true,
        });
        assert!(run_command(dashboard, &snapshot, UtcOffset::UTC, &ScoringRuleset::v1()).is_err());
    }

    #[test]
    fn run_command_rejects_inverted_metric_range() {
        let snapshot = must(SourceSnapshot::from_json(&fixture_snapshot()).map_err(Into::into));
        let result = run_command(
            Command::Metrics {
                command: Box::new(MetricsCommand::Range(MetricsRangeArgs {
                    from: "2024-01-05".to_string(),
                    to: "2024-01-01".to_string(),
                    json: true,
                })),
            },
            &snapshot,
            UtcOffset::UTC,
            &ScoringRuleset::v1(),
        );
        assert!(result.is_err());
    }
}
