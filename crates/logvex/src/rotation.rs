//! 🕰️ The Rotation Scheduler: when the clock says so, everything moves house.
//!
//! 🎬 *[midnight. the events index is 41 GB. it has seen things.]*
//! *[a cron fires. the buffer is drained. new indices are born, empty and hopeful.]*
//! *[the old index is left standing, like a house after the kids move out.]*
//!
//! 🧠 Knowledge graph:
//! - [`RotationSchedule`] turns a config string into "when is the next rotation".
//!   Keywords ("hourly", "daily", "weekly", with or without a leading `@`) or a
//!   5-field cron: `*`, numbers, `a-b` ranges, `/step` and `,` lists. No names
//!   (`MON`, `JAN`), no `@reboot`. Sorry.
//! - [`IngestionBuffer::rotate`] is the rotation itself: drain, rename, create, journal.
//!   It takes the same lock as append and flush, so nothing slips in between.
//! - Suffixes have one-second resolution. Two rotations in the same second land on
//!   the same names and the second one empties what the first one just created.
//!   Known. Kept. Don't schedule rotations a second apart.

use anyhow::{Context, Result};
use chrono::{DateTime, Datelike, Duration as ChronoDuration, Local, TimeZone, Timelike, Weekday};
use tracing::{info, warn};

use crate::backends::IndexingClient;
use crate::buffer::IngestionBuffer;

/// 🏷️ `strftime` for the index suffix. Sorts lexically the same way it sorts in time.
pub const SUFFIX_FORMAT: &str = "%Y.%m.%d-%H%M%S";

/// 🏷️ The suffix a rotation at `now` would use, e.g. `2026.03.14-092653`.
pub fn rotation_suffix(now: DateTime<Local>) -> String {
    now.format(SUFFIX_FORMAT).to_string()
}

// ============================================================
// 📅 RotationSchedule
// ============================================================

/// 📅 When rotations happen. All times are local.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RotationSchedule {
    /// Every hour at `minute`.
    Hourly { minute: u32 },
    /// Every day at `hour:minute`. "daily" means midnight.
    Daily { hour: u32, minute: u32 },
    /// Every week on `weekday` at `hour:minute`. "weekly" means Sunday midnight.
    Weekly {
        weekday: Weekday,
        hour: u32,
        minute: u32,
    },
    Cron(CronSchedule),
}

/// 🦴 A 5-field cron, each field boiled down to a bitmask of allowed values.
/// `None` is a bare `*`, which matters for the day-of-month/day-of-week OR rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronSchedule {
    minute: Option<u64>,
    hour: Option<u64>,
    day_of_month: Option<u64>,
    month: Option<u64>,
    day_of_week: Option<u64>,
    raw: String,
}

impl RotationSchedule {
    /// 🔍 Parse a rotation spec.
    ///
    /// - `hourly` / `@hourly`: minute 0 of every local hour
    /// - `daily` / `@daily` / `@midnight`: local midnight
    /// - `weekly` / `@weekly`: Sunday 00:00
    /// - `@monthly`, `@yearly` / `@annually`: shorthand for the usual crons
    /// - `m h dom mon dow`, each field a `,` list of `*`, `n`, `a-b`, with an
    ///   optional `/step` (`*/15`, `1-5`, `0,12`, `10-50/20`). Day-of-week 0 and 7
    ///   are both Sunday.
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        let keyword = trimmed.strip_prefix('@').unwrap_or(trimmed).to_ascii_lowercase();
        match keyword.as_str() {
            "hourly" => return Ok(Self::Hourly { minute: 0 }),
            "daily" | "midnight" => return Ok(Self::Daily { hour: 0, minute: 0 }),
            "weekly" => {
                return Ok(Self::Weekly {
                    weekday: Weekday::Sun,
                    hour: 0,
                    minute: 0,
                });
            }
            "monthly" if trimmed.starts_with('@') => return Self::parse("0 0 1 * *"),
            "yearly" | "annually" if trimmed.starts_with('@') => return Self::parse("0 0 1 1 *"),
            _ => {}
        }

        let parts: Vec<&str> = trimmed.split_whitespace().collect();
        anyhow::ensure!(
            parts.len() == 5,
            "💀 rotation_spec '{}' is neither 'hourly', 'daily', 'weekly' nor a 5-field cron. \
             It is, at best, a haiku.",
            trimmed
        );

        Ok(Self::Cron(CronSchedule {
            minute: parse_cron_field(parts[0], 0, 59)?,
            hour: parse_cron_field(parts[1], 0, 23)?,
            day_of_month: parse_cron_field(parts[2], 1, 31)?,
            month: parse_cron_field(parts[3], 1, 12)?,
            // 🗓️ fold 7 onto 0: two names for Sunday, one bit
            day_of_week: parse_cron_field(parts[4], 0, 7)?
                .map(|mask| (mask | (mask >> 7)) & !(1 << 7)),
            raw: trimmed.to_string(),
        }))
    }

    /// 🪧 For log lines.
    pub fn display_label(&self) -> String {
        match self {
            Self::Hourly { .. } => "hourly".to_string(),
            Self::Daily { .. } => "daily".to_string(),
            Self::Weekly { .. } => "weekly".to_string(),
            Self::Cron(cron) => format!("cron: {}", cron.raw),
        }
    }

    /// ⏭️ The next fire time strictly after `now`.
    pub fn next_after(&self, now: DateTime<Local>) -> Result<DateTime<Local>> {
        match self {
            Self::Hourly { minute } => next_hourly(now, *minute),
            Self::Daily { hour, minute } => next_daily(now, *hour, *minute),
            Self::Weekly {
                weekday,
                hour,
                minute,
            } => next_weekly(now, *weekday, *hour, *minute),
            Self::Cron(cron) => next_cron(now, cron),
        }
    }
}

fn parse_cron_field(raw: &str, min: u32, max: u32) -> Result<Option<u64>> {
    if raw == "*" {
        return Ok(None);
    }
    let mut mask = 0u64;
    for item in raw.split(',') {
        let (range, step) = match item.split_once('/') {
            Some((range, step)) => {
                let step: u32 = step
                    .parse()
                    .with_context(|| format!("💀 cron step in '{}' is not a number", raw))?;
                anyhow::ensure!(step > 0, "💀 cron step in '{}' is zero. Stepping nowhere, forever.", raw);
                (range, Some(step))
            }
            None => (item, None),
        };
        let (low, high) = if range == "*" {
            (min, max)
        } else if let Some((low, high)) = range.split_once('-') {
            (
                parse_cron_value(low, raw, min, max)?,
                parse_cron_value(high, raw, min, max)?,
            )
        } else {
            let value = parse_cron_value(range, raw, min, max)?;
            // `5/15` means "from 5, every 15", cron's own dialect quirk
            (value, if step.is_some() { max } else { value })
        };
        anyhow::ensure!(
            low <= high,
            "💀 cron range in '{}' runs backwards ({}-{})",
            raw,
            low,
            high
        );
        for value in (low..=high).step_by(step.unwrap_or(1) as usize) {
            mask |= 1 << value;
        }
    }
    Ok(Some(mask))
}

fn parse_cron_value(value: &str, field: &str, min: u32, max: u32) -> Result<u32> {
    let value: u32 = value
        .parse()
        .with_context(|| format!("💀 cron field '{}' has '{}', which is not a number", field, value))?;
    anyhow::ensure!(
        (min..=max).contains(&value),
        "💀 cron field '{}' is out of range ({}-{})",
        field,
        min,
        max
    );
    Ok(value)
}

fn next_hourly(now: DateTime<Local>, minute: u32) -> Result<DateTime<Local>> {
    let at_minute = |base: DateTime<Local>| -> Option<DateTime<Local>> {
        base.with_minute(minute)
            .and_then(|t| t.with_second(0))
            .and_then(|t| t.with_nanosecond(0))
    };
    // 🕳️ local wall-clock minute, so half-hour zones get their own top of the hour.
    // A DST gap can swallow a slot; look a few hours ahead before giving up.
    (0..=3)
        .filter_map(|hours| at_minute(now + ChronoDuration::hours(hours)))
        .find(|candidate| *candidate > now)
        .context("💀 could not compute the next hourly rotation")
}

fn next_daily(now: DateTime<Local>, hour: u32, minute: u32) -> Result<DateTime<Local>> {
    let at_time_of_day = |base: DateTime<Local>| -> Option<DateTime<Local>> {
        base.with_hour(hour)
            .and_then(|t| t.with_minute(minute))
            .and_then(|t| t.with_second(0))
            .and_then(|t| t.with_nanosecond(0))
    };

    if let Some(candidate) = at_time_of_day(now).filter(|candidate| *candidate > now) {
        return Ok(candidate);
    }
    // 🌙 today's slot is gone (or swallowed by DST), so tomorrow
    at_time_of_day(now + ChronoDuration::days(1))
        .context("💀 could not compute the next daily rotation")
}

fn next_weekly(
    now: DateTime<Local>,
    weekday: Weekday,
    hour: u32,
    minute: u32,
) -> Result<DateTime<Local>> {
    let days_ahead = (i64::from(weekday.num_days_from_monday())
        - i64::from(now.weekday().num_days_from_monday()))
    .rem_euclid(7);

    let naive = now
        .date_naive()
        .and_hms_opt(hour, minute, 0)
        .context("💀 could not compute the next weekly rotation")?
        + ChronoDuration::days(days_ahead);
    // 🕳️ ambiguous fall-back times pick the first occurrence
    let candidate = Local
        .from_local_datetime(&naive)
        .earliest()
        .context("💀 the next weekly rotation falls into a DST gap")?;

    if candidate <= now {
        return Ok(candidate + ChronoDuration::days(7));
    }
    Ok(candidate)
}

fn next_cron(now: DateTime<Local>, cron: &CronSchedule) -> Result<DateTime<Local>> {
    // 🐢 minute-by-minute scan, a year and a day at most. Crude, bounded, fine.
    let start = now
        .with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(now);
    let max_minutes: i64 = 366 * 24 * 60;
    (1..=max_minutes)
        .map(|offset| start + ChronoDuration::minutes(offset))
        .find(|candidate| cron_matches(*candidate, cron))
        .with_context(|| {
            format!(
                "💀 cron '{}' never fires within a year. February 30th, perhaps?",
                cron.raw
            )
        })
}

fn allows(field: Option<u64>, value: u32) -> bool {
    field.is_none_or(|mask| mask & (1 << value) != 0)
}

fn cron_matches(candidate: DateTime<Local>, cron: &CronSchedule) -> bool {
    if !allows(cron.minute, candidate.minute())
        || !allows(cron.hour, candidate.hour())
        || !allows(cron.month, candidate.month())
    {
        return false;
    }

    let day_of_month_matches = allows(cron.day_of_month, candidate.day());
    let day_of_week_matches = allows(cron.day_of_week, candidate.weekday().num_days_from_sunday());

    // 🧮 classic cron: when both day fields are set, either one is enough
    match (cron.day_of_month.is_some(), cron.day_of_week.is_some()) {
        (true, true) => day_of_month_matches || day_of_week_matches,
        _ => day_of_month_matches && day_of_week_matches,
    }
}

// ============================================================
// 🔄 rotate
// ============================================================

impl IngestionBuffer {
    /// 🔄 Rotate now, by the local wall clock.
    pub async fn rotate(&self) -> Result<()> {
        self.rotate_at(Local::now()).await
    }

    /// 🔄 Rotate as if the clock read `now`.
    ///
    /// Under the buffer lock: ship whatever is queued to the indices it was
    /// queued for, then switch the suffix, (re)create both new indices empty,
    /// and journal their names. Appends that were waiting on the lock land in
    /// the new indices.
    ///
    /// # Errors
    /// 💀 A failed drain upload or a failed index creation. Both fatal upstream.
    pub async fn rotate_at(&self, now: DateTime<Local>) -> Result<()> {
        let inner = &self.inner;
        let mut state = inner.lock_state().await;

        let drained = inner
            .drain_queues(&mut state)
            .await
            .context("💀 Could not drain the buffer before rotating. The old indices keep their stragglers for now.")?;
        if drained > 0 {
            state
                .journal
                .reset()
                .await
                .context("💀 Drained before rotating but could not reset the journal.")?;
        }
        state.queues.clear();

        let suffix = rotation_suffix(now);
        if suffix == state.active_suffix {
            warn!(
                "⚠️ rotating onto the suffix we already have ('{}'); both indices are about to be emptied",
                suffix
            );
        }

        let (event_index, consumption_index) = inner.index_names(&suffix);
        for index_name in [&event_index, &consumption_index] {
            inner
                .client
                .ensure_empty_index(index_name)
                .await
                .with_context(|| {
                    format!(
                        "💀 Could not create the fresh index '{}'. Rotation is stuck halfway; refusing to write anywhere.",
                        index_name
                    )
                })?;
        }

        state
            .journal
            .set_index_names(&event_index, &consumption_index)
            .await
            .context("💀 Created the new indices but could not journal their names.")?;
        state.active_suffix = suffix;

        info!(
            "🔄 rotated: drained {} documents, now writing to '{}' and '{}'",
            drained, event_index, consumption_index
        );
        Ok(())
    }
}
