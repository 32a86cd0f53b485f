use time::OffsetDateTime;

use zmage_domain::task::{TaskKind, TaskStatus, clamp_progress};

use crate::{
	Result,
	db::Db,
	models::{Task, TaskRow, TaskUpdate},
};

const ALL_STATUSES: [TaskStatus; 5] = [
	TaskStatus::Pending,
	TaskStatus::Running,
	TaskStatus::Completed,
	TaskStatus::Failed,
	TaskStatus::Cancelled,
];

pub async fn create_task(
	db: &Db,
	owner_id: Option<i64>,
	kind: TaskKind,
	now: OffsetDateTime,
) -> Result<Task> {
	let row = sqlx::query_as::<_, TaskRow>(
		"\
INSERT INTO tasks (owner_id, task_type, status, progress, created_at)
VALUES ($1, $2, $3, 0, $4)
RETURNING *",
	)
	.bind(owner_id)
	.bind(kind.as_str())
	.bind(TaskStatus::Pending.as_str())
	.bind(now)
	.fetch_one(&db.pool)
	.await?;

	Task::try_from(row)
}

pub async fn get_task(db: &Db, task_id: i64) -> Result<Option<Task>> {
	let row = sqlx::query_as::<_, TaskRow>("SELECT * FROM tasks WHERE id = $1")
		.bind(task_id)
		.fetch_optional(&db.pool)
		.await?;

	row.map(Task::try_from).transpose()
}

/// Applies a status change when the task's current status allows it. Terminal tasks are never
/// touched; an illegal transition yields `None`.
pub async fn update_task(db: &Db, task_id: i64, update: &TaskUpdate) -> Result<Option<Task>> {
	let sources = transition_sources(update.status);

	if sources.is_empty() {
		return Ok(None);
	}

	let row = sqlx::query_as::<_, TaskRow>(
		"\
UPDATE tasks
SET
	status = $1,
	progress = $2,
	result = COALESCE($3, result),
	error_message = $4,
	started_at = CASE WHEN $1 = 'running' THEN COALESCE(started_at, $5) ELSE started_at END,
	completed_at = CASE WHEN $1 IN ('completed', 'failed', 'cancelled') THEN $5 ELSE NULL END
WHERE id = $6 AND status = ANY($7)
RETURNING *",
	)
	.bind(update.status.as_str())
	.bind(clamp_progress(update.progress))
	.bind(update.result.as_ref())
	.bind(update.error_message.as_deref())
	.bind(update.now)
	.bind(task_id)
	.bind(sources)
	.fetch_optional(&db.pool)
	.await?;

	row.map(Task::try_from).transpose()
}

fn transition_sources(next: TaskStatus) -> Vec<String> {
	ALL_STATUSES
		.into_iter()
		.filter(|status| status.can_transition_to(next))
		.map(|status| status.as_str().to_string())
		.collect()
}
