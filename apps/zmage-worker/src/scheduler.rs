//! When the two reconciliation jobs are due.
//!
//! Suggestions run once at startup and then every `suggestion_interval_hours`. Cleanup runs once a
//! day at `cleanup_hour:cleanup_minute` UTC.

use time::{Duration, OffsetDateTime, Time, UtcOffset};

use zmage_config::Reconciliation;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Job {
	Suggest,
	Cleanup,
}
impl Job {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Suggest => "suggest_albums",
			Self::Cleanup => "cleanup",
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schedule {
	suggestion_every: Duration,
	cleanup_hour: u8,
	cleanup_minute: u8,
	next_suggestion: OffsetDateTime,
	next_cleanup: OffsetDateTime,
}
impl Schedule {
	pub fn new(cfg: &Reconciliation, now: OffsetDateTime) -> Self {
		Self {
			suggestion_every: Duration::hours(i64::from(cfg.suggestion_interval_hours)),
			cleanup_hour: cfg.cleanup_hour,
			cleanup_minute: cfg.cleanup_minute,
			next_suggestion: now,
			next_cleanup: next_daily_run(now, cfg.cleanup_hour, cfg.cleanup_minute),
		}
	}

	/// The job that comes due first and when. Suggestions win a tie.
	pub fn next_job(&self) -> (Job, OffsetDateTime) {
		if self.next_suggestion <= self.next_cleanup {
			(Job::Suggest, self.next_suggestion)
		} else {
			(Job::Cleanup, self.next_cleanup)
		}
	}

	/// Books the following run of `job`, which just finished at `now`. A run that overran its
	/// interval is not caught up; the next one starts a full interval later.
	pub fn complete(&mut self, job: Job, now: OffsetDateTime) {
		match job {
			Job::Suggest => {
				let next = self.next_suggestion + self.suggestion_every;

				self.next_suggestion = if next > now { next } else { now + self.suggestion_every };
			},
			Job::Cleanup => {
				self.next_cleanup = next_daily_run(now, self.cleanup_hour, self.cleanup_minute);
			},
		}
	}
}

/// First instant strictly after `now` whose UTC wall clock reads `hour:minute`.
///
/// Out-of-range values wrap around the day; the config loader rejects them earlier.
pub fn next_daily_run(now: OffsetDateTime, hour: u8, minute: u8) -> OffsetDateTime {
	let midnight = now.to_offset(UtcOffset::UTC).replace_time(Time::MIDNIGHT);
	let offset = Duration::minutes((i64::from(hour) * 60 + i64::from(minute)) % (24 * 60));
	let today = midnight + offset;

	if today > now { today } else { today + Duration::days(1) }
}

pub fn until(at: OffsetDateTime, now: OffsetDateTime) -> std::time::Duration {
	let millis = (at - now).whole_milliseconds();

	if millis <= 0 {
		return std::time::Duration::from_millis(0);
	}

	std::time::Duration::from_millis(millis as u64)
}

#[cfg(test)]
mod tests {
	use time::macros::datetime;

	use super::*;

	fn reconciliation() -> Reconciliation {
		Reconciliation { suggestion_interval_hours: 6, ..Reconciliation::default() }
	}

	#[test]
	fn daily_run_is_later_today_or_tomorrow() {
		assert_eq!(
			next_daily_run(datetime!(2025-03-10 01:30 UTC), 3, 0),
			datetime!(2025-03-10 03:00 UTC)
		);
		assert_eq!(
			next_daily_run(datetime!(2025-03-10 03:00 UTC), 3, 0),
			datetime!(2025-03-11 03:00 UTC)
		);
		assert_eq!(
			next_daily_run(datetime!(2025-12-31 23:59 UTC), 23, 45),
			datetime!(2026-01-01 23:45 UTC)
		);
	}

	#[test]
	fn daily_run_is_computed_in_utc() {
		assert_eq!(
			next_daily_run(datetime!(2025-03-10 05:30 +02:00), 3, 0),
			datetime!(2025-03-11 03:00 UTC)
		);
	}

	#[test]
	fn suggestions_run_at_startup_then_on_interval() {
		let start = datetime!(2025-03-10 12:00 UTC);
		let mut schedule = Schedule::new(&reconciliation(), start);

		assert_eq!(schedule.next_job(), (Job::Suggest, start));

		schedule.complete(Job::Suggest, start + Duration::minutes(2));

		assert_eq!(schedule.next_job(), (Job::Suggest, datetime!(2025-03-10 18:00 UTC)));

		schedule.complete(Job::Suggest, datetime!(2025-03-10 18:01 UTC));

		assert_eq!(schedule.next_job(), (Job::Suggest, datetime!(2025-03-11 00:00 UTC)));

		schedule.complete(Job::Suggest, datetime!(2025-03-11 00:01 UTC));

		assert_eq!(schedule.next_job(), (Job::Cleanup, datetime!(2025-03-11 03:00 UTC)));

		schedule.complete(Job::Cleanup, datetime!(2025-03-11 03:04 UTC));

		assert_eq!(schedule.next_job(), (Job::Suggest, datetime!(2025-03-11 06:00 UTC)));
	}

	#[test]
	fn an_overrunning_job_is_not_replayed() {
		let start = datetime!(2025-03-10 12:00 UTC);
		let mut schedule = Schedule::new(&reconciliation(), start);
		let finished = datetime!(2025-03-10 19:30 UTC);

		schedule.complete(Job::Suggest, finished);

		assert_eq!(schedule.next_job(), (Job::Suggest, datetime!(2025-03-11 01:30 UTC)));
		assert_eq!(until(finished, finished + Duration::seconds(5)).as_millis(), 0);
	}
}
