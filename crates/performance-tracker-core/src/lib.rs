//! Derived-metrics aggregation over personal task, rating, and weekly plan records.
//!
//! Every entry point is a pure function of a read-only [`SourceSnapshot`] plus an
//! explicit reference date. Nothing here reads the wall clock or persists output.

use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{Date, Duration, OffsetDateTime, Time, UtcOffset};

/// Upper bound of the composite daily score.
pub const MAX_SCORE: f64 = 10.0;

const WEIGHT_SUM_TOLERANCE: f64 = 1e-9;

#[derive(Debug, Clone, thiserror::Error, Eq, PartialEq)]
pub enum PerformanceError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error("window error: {0}")]
    Window(String),
    #[error("configuration error: {0}")]
    Configuration(String),
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    Low,
    #[default]
    Medium,
    High,
}

impl TaskPriority {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            _ => None,
        }
    }

    fn agenda_rank(self) -> u8 {
        match self {
            Self::High => 0,
            Self::Medium => 1,
            Self::Low => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TimeRange {
    Week,
    Month,
    Year,
}

impl TimeRange {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Week => "week",
            Self::Month => "month",
            Self::Year => "year",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "week" => Some(Self::Week),
            "month" => Some(Self::Month),
            "year" => Some(Self::Year),
            _ => None,
        }
    }

    /// Days subtracted from the reference date to reach the window start.
    #[must_use]
    pub fn lookback_days(self) -> i64 {
        match self {
            Self::Week => 7,
            Self::Month => 30,
            Self::Year => 365,
        }
    }
}

impl FromStr for TimeRange {
    type Err = PerformanceError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value).ok_or_else(|| {
            PerformanceError::Window(format!(
                "unrecognized range `{value}`; expected week, month, or year"
            ))
        })
    }
}

impl Display for TimeRange {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Up,
    Down,
    Stable,
}

impl TrendDirection {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Up => "up",
            Self::Down => "down",
            Self::Stable => "stable",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub priority: TaskPriority,
    /// Scheduled day; either a calendar date or a full timestamp.
    pub date: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DailyRating {
    pub id: String,
    pub date: String,
    pub rating: u8,
    #[serde(default)]
    pub went_well: String,
    #[serde(default)]
    pub went_wrong: String,
    #[serde(default)]
    pub improvements: String,
    #[serde(default)]
    pub journal: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WeeklyGoal {
    pub id: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub category: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WeeklyPlan {
    pub id: String,
    pub week_start_date: String,
    #[serde(default)]
    pub goals: Vec<WeeklyGoal>,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub published: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NegativeThought {
    pub id: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub positive_reframe: String,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub count: Option<u32>,
}

impl NegativeThought {
    /// Occurrences recorded for this thought; a missing or zero count is one.
    #[must_use]
    pub fn occurrences(&self) -> u64 {
        match self.count {
            Some(count) if count > 0 => u64::from(count),
            _ => 1,
        }
    }
}

/// Read-only copy of the raw collections, as written by the persistence layer.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SourceSnapshot {
    #[serde(default, alias = "tasks", rename = "todos")]
    pub tasks: Vec<Task>,
    #[serde(default)]
    pub daily_ratings: Vec<DailyRating>,
    #[serde(default)]
    pub weekly_plans: Vec<WeeklyPlan>,
    #[serde(default)]
    pub negative_thoughts: Vec<NegativeThought>,
}

impl SourceSnapshot {
    /// Decodes a snapshot from JSON.
    ///
    /// # Errors
    /// Returns [`PerformanceError::Validation`] when the payload does not
    /// match the snapshot shape.
    pub fn from_json(value: &Value) -> Result<Self, PerformanceError> {
        serde_json::from_value(value.clone()).map_err(|err| {
            PerformanceError::Validation(format!("invalid snapshot JSON payload: {err}"))
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoringRuleset {
    pub ruleset_version: u32,
    pub planned_next_day_points: f64,
    pub completion_points: f64,
    pub weekly_plan_points: f64,
    pub rating_points: f64,
    pub max_rating: u8,
    pub trend_deadband: f64,
    pub rating_lookback_days: u16,
}

impl ScoringRuleset {
    #[must_use]
    pub fn v1() -> Self {
        Self {
            ruleset_version: 1,
            planned_next_day_points: 2.0,
            completion_points: 3.0,
            weekly_plan_points: 2.0,
            rating_points: 3.0,
            max_rating: 10,
            trend_deadband: 0.5,
            rating_lookback_days: 7,
        }
    }

    /// Validates weights, deadband, and lookback bounds.
    ///
    /// # Errors
    /// Returns [`PerformanceError::Configuration`] when a field is outside its
    /// allowed bounds or the weights do not sum to [`MAX_SCORE`].
    pub fn validate(&self) -> Result<(), PerformanceError> {
        if self.ruleset_version == 0 {
            return Err(PerformanceError::Configuration(
                "ruleset_version MUST be >= 1".to_string(),
            ));
        }

        for (name, value) in [
            ("planned_next_day_points", self.planned_next_day_points),
            ("completion_points", self.completion_points),
            ("weekly_plan_points", self.weekly_plan_points),
            ("rating_points", self.rating_points),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(PerformanceError::Configuration(format!(
                    "{name} MUST be a finite non-negative number"
                )));
            }
        }

        let total = self.planned_next_day_points
            + self.completion_points
            + self.weekly_plan_points
            + self.rating_points;
        if (total - MAX_SCORE).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(PerformanceError::Configuration(format!(
                "score weights MUST sum to {MAX_SCORE}, got {total}"
            )));
        }

        if self.max_rating == 0 {
            return Err(PerformanceError::Configuration(
                "max_rating MUST be >= 1".to_string(),
            ));
        }

        if !self.trend_deadband.is_finite() || self.trend_deadband < 0.0 {
            return Err(PerformanceError::Configuration(
                "trend_deadband MUST be a finite non-negative number".to_string(),
            ));
        }

        if self.rating_lookback_days == 0 {
            return Err(PerformanceError::Configuration(
                "rating_lookback_days MUST be >= 1".to_string(),
            ));
        }

        Ok(())
    }

    /// Decodes and validates a ruleset from JSON.
    ///
    /// # Errors
    /// Returns [`PerformanceError::Configuration`] when JSON decoding fails
    /// or decoded values violate ruleset constraints.
    pub fn from_json(value: &Value) -> Result<Self, PerformanceError> {
        let ruleset: Self = serde_json::from_value(value.clone()).map_err(|err| {
            PerformanceError::Configuration(format!("invalid ruleset JSON payload: {err}"))
        })?;
        ruleset.validate()?;
        Ok(ruleset)
    }
}

impl Default for ScoringRuleset {
    fn default() -> Self {
        Self::v1()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DailyMetric {
    #[serde(with = "day_key")]
    pub date: Date,
    pub score: f64,
    pub todo_completion_rate: f64,
    pub planned_next_day: bool,
    pub weekly_plan_published: bool,
    pub manual_rating: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TrendSummary {
    pub average_score: f64,
    pub direction: TrendDirection,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq)]
pub struct DateWindow {
    #[serde(with = "day_key")]
    pub start: Date,
    #[serde(with = "day_key")]
    pub end: Date,
}

impl DateWindow {
    #[must_use]
    pub fn contains(&self, date: Date) -> bool {
        self.start <= date && date <= self.end
    }

    /// Number of calendar days covered, both ends included.
    #[must_use]
    pub fn day_count(&self) -> i64 {
        (self.end - self.start).whole_days() + 1
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WindowReport {
    pub range: TimeRange,
    pub window: DateWindow,
    pub metrics: Vec<DailyMetric>,
    pub trend: TrendSummary,
    pub average_completion_percent: u32,
    pub planning_rate_percent: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSnapshot {
    pub total_thoughts_logged: usize,
    pub total_occurrences: u64,
    pub completed_todos: usize,
    pub total_todos: usize,
    pub last7_day_average_rating: f64,
    pub current_week_plan_published: bool,
    pub today_performance_score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PlanProgress {
    #[serde(with = "day_key")]
    pub week_start_date: Date,
    #[serde(with = "day_key")]
    pub week_end_date: Date,
    pub published: bool,
    pub completed_goals: usize,
    pub total_goals: usize,
}

/// Date-keyed lookup tables built once per query from a [`SourceSnapshot`].
#[derive(Debug, Clone)]
pub struct NormalizedSources<'a> {
    tasks: &'a [Task],
    thoughts: &'a [NegativeThought],
    tasks_by_day: HashMap<Date, Vec<&'a Task>>,
    ratings_by_day: HashMap<Date, &'a DailyRating>,
    plans_by_week: HashMap<Date, &'a WeeklyPlan>,
}

impl<'a> NormalizedSources<'a> {
    #[must_use]
    pub fn tasks_on(&self, date: Date) -> &[&'a Task] {
        match self.tasks_by_day.get(&date) {
            Some(tasks) => tasks.as_slice(),
            None => &[],
        }
    }

    #[must_use]
    pub fn rating_on(&self, date: Date) -> Option<&'a DailyRating> {
        self.ratings_by_day.get(&date).copied()
    }

    /// Plan indexed under the week containing `date`.
    #[must_use]
    pub fn plan_for_week_of(&self, date: Date) -> Option<&'a WeeklyPlan> {
        self.plans_by_week.get(&week_start(date)).copied()
    }

    #[must_use]
    pub fn all_tasks(&self) -> &'a [Task] {
        self.tasks
    }

    #[must_use]
    pub fn thoughts(&self) -> &'a [NegativeThought] {
        self.thoughts
    }
}

/// Maps a date to the Monday that starts its week.
///
/// Sunday counts as weekday 7, so it belongs to the week of the preceding Monday.
#[must_use]
pub fn week_start(date: Date) -> Date {
    let offset = i64::from(date.weekday().number_from_monday()) - 1;
    date.checked_sub(Duration::days(offset)).unwrap_or(date)
}

/// Sunday closing the week that begins at `week_start`.
#[must_use]
pub fn week_end(week_start: Date) -> Date {
    week_start
        .checked_add(Duration::days(6))
        .unwrap_or(week_start)
}

/// Parses a strict `YYYY-MM-DD` calendar date.
///
/// # Errors
/// Returns [`PerformanceError::Validation`] when `raw` is not a valid
/// calendar date in that form.
pub fn parse_calendar_date(raw: &str) -> Result<Date, PerformanceError> {
    Date::parse(raw.trim(), format_description!("[year]-[month]-[day]"))
        .map_err(|err| PerformanceError::Validation(format!("invalid date `{raw}`: {err}")))
}

/// Resolves a record date to its local calendar day.
///
/// Accepts `YYYY-MM-DD`, RFC3339 timestamps (shifted into `offset` before the
/// day is taken) and naive `YYYY-MM-DDTHH:MM[:SS]` timestamps.
///
/// # Errors
/// Returns [`PerformanceError::Validation`] when `raw` matches none of the
/// accepted forms.
pub fn parse_day_key(raw: &str, offset: UtcOffset) -> Result<Date, PerformanceError> {
    let trimmed = raw.trim();
    if trimmed.len() == 10 {
        return parse_calendar_date(trimmed);
    }

    if let Ok(timestamp) = OffsetDateTime::parse(trimmed, &Rfc3339) {
        return Ok(timestamp.to_offset(offset).date());
    }

    match (trimmed.get(..10), trimmed.get(10..11), trimmed.get(11..)) {
        (Some(day), Some("T" | " "), Some(clock)) if parse_naive_clock(clock).is_some() => {
            parse_calendar_date(day)
        }
        _ => Err(PerformanceError::Validation(format!(
            "invalid date `{raw}`: expected YYYY-MM-DD or an ISO-8601 timestamp"
        ))),
    }
}

fn parse_naive_clock(raw: &str) -> Option<Time> {
    Time::parse(raw, format_description!("[hour]:[minute]:[second].[subsecond]"))
        .or_else(|_| Time::parse(raw, format_description!("[hour]:[minute]:[second]")))
        .or_else(|_| Time::parse(raw, format_description!("[hour]:[minute]")))
        .ok()
}

/// Canonical `YYYY-MM-DD` rendering of a calendar day.
#[must_use]
pub fn format_day_key(date: Date) -> String {
    format!(
        "{:04}-{:02}-{:02}",
        date.year(),
        u8::from(date.month()),
        date.day()
    )
}

/// Indexes the snapshot by calendar day and by week start.
///
/// Duplicate ratings for one day and duplicate plans for one week resolve
/// last-write-wins in input order.
///
/// # Errors
/// Returns [`PerformanceError::Validation`] for malformed record dates and
/// ratings outside `1..=ruleset.max_rating`.
pub fn normalize_sources<'a>(
    snapshot: &'a SourceSnapshot,
    offset: UtcOffset,
    ruleset: &ScoringRuleset,
) -> Result<NormalizedSources<'a>, PerformanceError> {
    let mut tasks_by_day: HashMap<Date, Vec<&Task>> = HashMap::new();
    for task in &snapshot.tasks {
        let day = parse_day_key(&task.date, offset)
            .map_err(|err| record_error("task", &task.id, &err))?;
        tasks_by_day.entry(day).or_default().push(task);
    }

    let mut ratings_by_day = HashMap::new();
    for rating in &snapshot.daily_ratings {
        let day = parse_day_key(&rating.date, offset)
            .map_err(|err| record_error("rating", &rating.id, &err))?;
        if rating.rating == 0 || rating.rating > ruleset.max_rating {
            return Err(PerformanceError::Validation(format!(
                "rating {} MUST be in [1, {}], got {}",
                rating.id, ruleset.max_rating, rating.rating
            )));
        }
        if let Some(previous) = ratings_by_day.insert(day, rating) {
            debug!(
                "event=duplicate_rating module=normalize day={} replaced_id={} kept_id={}",
                format_day_key(day),
                previous.id,
                rating.id
            );
        }
    }

    let mut plans_by_week = HashMap::new();
    for plan in &snapshot.weekly_plans {
        let declared = parse_day_key(&plan.week_start_date, offset)
            .map_err(|err| record_error("plan", &plan.id, &err))?;
        let anchored = week_start(declared);
        if anchored != declared {
            warn!(
                "event=plan_reanchored module=normalize plan_id={} declared={} week_start={}",
                plan.id,
                format_day_key(declared),
                format_day_key(anchored)
            );
        }
        if let Some(previous) = plans_by_week.insert(anchored, plan) {
            debug!(
                "event=duplicate_plan module=normalize week_start={} replaced_id={} kept_id={}",
                format_day_key(anchored),
                previous.id,
                plan.id
            );
        }
    }

    debug!(
        "event=normalize module=normalize status=ok task_days={} rating_days={} plan_weeks={}",
        tasks_by_day.len(),
        ratings_by_day.len(),
        plans_by_week.len()
    );

    Ok(NormalizedSources {
        tasks: &snapshot.tasks,
        thoughts: &snapshot.negative_thoughts,
        tasks_by_day,
        ratings_by_day,
        plans_by_week,
    })
}

/// Joins the normalized sources for one day into a [`DailyMetric`].
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn compute_daily_metric(
    date: Date,
    sources: &NormalizedSources<'_>,
    ruleset: &ScoringRuleset,
) -> DailyMetric {
    let day_tasks = sources.tasks_on(date);
    let completed = day_tasks.iter().filter(|task| task.completed).count();
    let todo_completion_rate = if day_tasks.is_empty() {
        0.0
    } else {
        completed as f64 / day_tasks.len() as f64
    };

    let planned_next_day = date
        .next_day()
        .is_some_and(|next| !sources.tasks_on(next).is_empty());

    let weekly_plan_published = sources
        .plan_for_week_of(date)
        .is_some_and(|plan| plan.published);

    let manual_rating = sources.rating_on(date).map_or(0, |rating| rating.rating);

    let mut score = todo_completion_rate * ruleset.completion_points
        + (f64::from(manual_rating) / f64::from(ruleset.max_rating)) * ruleset.rating_points;
    if planned_next_day {
        score += ruleset.planned_next_day_points;
    }
    if weekly_plan_published {
        score += ruleset.weekly_plan_points;
    }

    DailyMetric {
        date,
        score: round_one_decimal(score).clamp(0.0, MAX_SCORE),
        todo_completion_rate,
        planned_next_day,
        weekly_plan_published,
        manual_rating,
    }
}

/// One metric per day of `start..=end`, ascending.
///
/// # Errors
/// Returns [`PerformanceError::Window`] when `start` is after `end`.
pub fn compute_metrics_range(
    start: Date,
    end: Date,
    sources: &NormalizedSources<'_>,
    ruleset: &ScoringRuleset,
) -> Result<Vec<DailyMetric>, PerformanceError> {
    if start > end {
        return Err(PerformanceError::Window(format!(
            "range start {} MUST NOT be after end {}",
            format_day_key(start),
            format_day_key(end)
        )));
    }

    let mut metrics = Vec::new();
    let mut cursor = Some(start);
    while let Some(day) = cursor {
        if day > end {
            break;
        }
        metrics.push(compute_daily_metric(day, sources, ruleset));
        cursor = day.next_day();
    }
    Ok(metrics)
}

#[must_use]
pub fn resolve_window(range: TimeRange, as_of: Date) -> DateWindow {
    let start = as_of
        .checked_sub(Duration::days(range.lookback_days()))
        .unwrap_or(Date::MIN);
    DateWindow { start, end: as_of }
}

#[must_use]
pub fn select_window(metrics: &[DailyMetric], window: DateWindow) -> Vec<DailyMetric> {
    metrics
        .iter()
        .filter(|metric| window.contains(metric.date))
        .cloned()
        .collect()
}

/// Computes every day of the resolved window.
///
/// # Errors
/// Propagates [`compute_metrics_range`] failures.
pub fn metrics_for_window(
    range: TimeRange,
    as_of: Date,
    sources: &NormalizedSources<'_>,
    ruleset: &ScoringRuleset,
) -> Result<Vec<DailyMetric>, PerformanceError> {
    let window = resolve_window(range, as_of);
    compute_metrics_range(window.start, window.end, sources, ruleset)
}

/// Average score plus a direction from comparing the means of both halves.
///
/// The halves split at `len / 2`; a shift within `trend_deadband` is stable.
#[must_use]
pub fn summarize(metrics: &[DailyMetric], ruleset: &ScoringRuleset) -> TrendSummary {
    let average_score = mean_score(metrics);
    if metrics.len() < 2 {
        return TrendSummary {
            average_score,
            direction: TrendDirection::Stable,
        };
    }

    let (first_half, second_half) = metrics.split_at(metrics.len() / 2);
    let first_mean = mean_score(first_half);
    let second_mean = mean_score(second_half);

    let direction = if second_mean > first_mean + ruleset.trend_deadband {
        TrendDirection::Up
    } else if second_mean < first_mean - ruleset.trend_deadband {
        TrendDirection::Down
    } else {
        TrendDirection::Stable
    };

    TrendSummary {
        average_score,
        direction,
    }
}

/// Window metrics with trend and rate summaries for one named range.
///
/// # Errors
/// Propagates [`compute_metrics_range`] failures.
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn build_window_report(
    range: TimeRange,
    as_of: Date,
    sources: &NormalizedSources<'_>,
    ruleset: &ScoringRuleset,
) -> Result<WindowReport, PerformanceError> {
    let window = resolve_window(range, as_of);
    let metrics = compute_metrics_range(window.start, window.end, sources, ruleset)?;
    let trend = summarize(&metrics, ruleset);

    let (average_completion_percent, planning_rate_percent) = if metrics.is_empty() {
        (0, 0)
    } else {
        let days = metrics.len() as f64;
        let completion_sum: f64 = metrics.iter().map(|metric| metric.todo_completion_rate).sum();
        let planned_days = metrics.iter().filter(|metric| metric.planned_next_day).count();
        (
            (completion_sum / days * 100.0).round() as u32,
            (planned_days as f64 / days * 100.0).round() as u32,
        )
    };

    debug!(
        "event=window_report module=trend range={} start={} end={} days={} direction={}",
        range,
        format_day_key(window.start),
        format_day_key(window.end),
        metrics.len(),
        trend.direction.as_str()
    );

    Ok(WindowReport {
        range,
        window,
        metrics,
        trend,
        average_completion_percent,
        planning_rate_percent,
    })
}

/// Single-point summary for `today` plus collection-wide counts.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn build_today_snapshot(
    sources: &NormalizedSources<'_>,
    today: Date,
    ruleset: &ScoringRuleset,
) -> DashboardSnapshot {
    let tasks = sources.all_tasks();
    let thoughts = sources.thoughts();

    let mut rating_total = 0_u32;
    let mut rating_count = 0_u32;
    let mut cursor = Some(today);
    for _ in 0..ruleset.rating_lookback_days {
        let Some(day) = cursor else {
            break;
        };
        if let Some(rating) = sources.rating_on(day) {
            rating_total += u32::from(rating.rating);
            rating_count += 1;
        }
        cursor = day.previous_day();
    }
    let last7_day_average_rating = if rating_count == 0 {
        0.0
    } else {
        round_one_decimal(f64::from(rating_total) / f64::from(rating_count))
    };

    DashboardSnapshot {
        total_thoughts_logged: thoughts.len(),
        total_occurrences: thoughts.iter().map(NegativeThought::occurrences).sum(),
        completed_todos: tasks.iter().filter(|task| task.completed).count(),
        total_todos: tasks.len(),
        last7_day_average_rating,
        current_week_plan_published: sources
            .plan_for_week_of(today)
            .is_some_and(|plan| plan.published),
        today_performance_score: compute_daily_metric(today, sources, ruleset).score,
    }
}

/// Goal progress per indexed plan, most recent week first.
#[must_use]
pub fn plan_history(sources: &NormalizedSources<'_>) -> Vec<PlanProgress> {
    let mut history = sources
        .plans_by_week
        .iter()
        .map(|(week, plan)| PlanProgress {
            week_start_date: *week,
            week_end_date: week_end(*week),
            published: plan.published,
            completed_goals: plan.goals.iter().filter(|goal| goal.completed).count(),
            total_goals: plan.goals.len(),
        })
        .collect::<Vec<_>>();
    history.sort_by(|lhs, rhs| rhs.week_start_date.cmp(&lhs.week_start_date));
    history
}

/// Tasks for `date`: open before completed, then high to low priority.
#[must_use]
pub fn tasks_for_day<'a>(sources: &NormalizedSources<'a>, date: Date) -> Vec<&'a Task> {
    let mut tasks = sources.tasks_on(date).to_vec();
    tasks.sort_by_key(|task| (task.completed, task.priority.agenda_rank()));
    tasks
}

fn record_error(kind: &str, id: &str, err: &PerformanceError) -> PerformanceError {
    match err {
        PerformanceError::Validation(message) => {
            PerformanceError::Validation(format!("{kind} {id}: {message}"))
        }
        other => other.clone(),
    }
}

#[allow(clippy::cast_precision_loss)]
fn mean_score(metrics: &[DailyMetric]) -> f64 {
    if metrics.is_empty() {
        return 0.0;
    }
    metrics.iter().map(|metric| metric.score).sum::<f64>() / metrics.len() as f64
}

fn round_one_decimal(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

mod day_key {
    use serde::{Deserialize, Deserializer, Serializer};
    use time::Date;

    pub fn serialize<S: Serializer>(date: &Date, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format_day_key(*date))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Date, D::Error> {
        let raw = String::deserialize(deserializer)?;
        super::parse_calendar_date(&raw).map_err(serde::de::Error::custom)
    }
}
