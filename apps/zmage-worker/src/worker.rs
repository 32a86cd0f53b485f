use color_eyre::Result;
use time::OffsetDateTime;
use tokio::{signal, time as tokio_time};

use zmage_service::ZmageService;

use crate::scheduler::{self, Job, Schedule};

/// Runs the reconciliation jobs on their schedule until Ctrl-C.
///
/// A failing run is logged and retried on the next tick of its own schedule.
pub async fn run_worker(service: &ZmageService) -> Result<()> {
	let mut schedule = Schedule::new(&service.cfg.reconciliation, OffsetDateTime::now_utc());

	loop {
		let (job, at) = schedule.next_job();
		let wait = scheduler::until(at, OffsetDateTime::now_utc());

		tracing::debug!(job = job.as_str(), at = %at, "Waiting for the next reconciliation job.");

		tokio::select! {
			_ = tokio_time::sleep(wait) => {},
			res = signal::ctrl_c() => {
				res?;
				tracing::info!("Shutdown requested, stopping the worker.");

				return Ok(());
			},
		}

		run_job(service, job, OffsetDateTime::now_utc()).await;
		schedule.complete(job, OffsetDateTime::now_utc());
	}
}

/// Runs one job. Returns whether it finished without error.
pub async fn run_job(service: &ZmageService, job: Job, now: OffsetDateTime) -> bool {
	let outcome = match job {
		Job::Suggest => service.suggest_albums(now).await.map(|report| report.task_id),
		Job::Cleanup => service.cleanup(now).await.map(|report| report.task_id),
	};

	match outcome {
		Ok(task_id) => {
			tracing::debug!(job = job.as_str(), task_id, "Reconciliation job finished.");

			true
		},
		Err(err) => {
			tracing::error!(error = %err, job = job.as_str(), "Reconciliation job failed.");

			false
		},
	}
}
