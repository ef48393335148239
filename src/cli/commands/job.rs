//! Job register commands.

use anyhow::{anyhow, Result};
use serde::Serialize;
use uuid::Uuid;

use crate::cli::context::AppContext;
use crate::cli::output::{list_table, output, render_list, truncate, CommandOutput};
use crate::cli::types::JobCommands;
use crate::domain::models::{Job, JobKind, JobStatus};
use crate::domain::ports::JobFilter;
use crate::services::job_control::{JobControl, JobLiveness};

/// A job as shown to operators
#[derive(Debug, Serialize)]
pub struct JobOutput {
    /// Job id
    pub id: String,
    /// Category the job holds
    pub category_id: String,
    /// Operation kind
    pub kind: String,
    /// Status
    pub status: String,
    /// Liveness, for active jobs only
    pub liveness: Option<JobLiveness>,
    /// Units of work finished
    pub processed: u64,
    /// Units of work expected
    pub total: u64,
    /// Snapshot the job works on
    pub snapshot_id: Option<String>,
    /// Latest message
    pub message: Option<String>,
    /// Failure reason
    pub error: Option<String>,
    /// Creation time, RFC 3339
    pub created_at: String,
    /// Last heartbeat or progress write, RFC 3339
    pub updated_at: String,
    /// Completion time, RFC 3339
    pub completed_at: Option<String>,
}

impl JobOutput {
    fn new(job: &Job, jobs: &JobControl) -> Self {
        Self {
            id: job.id.to_string(),
            category_id: job.category_id.clone(),
            kind: job.kind.as_str().to_string(),
            status: job.status.as_str().to_string(),
            liveness: job.status.is_active().then(|| jobs.liveness(job)),
            processed: job.progress.processed,
            total: job.progress.total,
            snapshot_id: job.snapshot_id.clone(),
            message: job.message.clone(),
            error: job.error.clone(),
            created_at: job.created_at.to_rfc3339(),
            updated_at: job.updated_at.to_rfc3339(),
            completed_at: job.completed_at.map(|t| t.to_rfc3339()),
        }
    }

    fn status_label(&self) -> String {
        match self.liveness {
            Some(JobLiveness::Stale) => format!("{} (stale)", self.status),
            _ => self.status.clone(),
        }
    }
}

/// Job list
#[derive(Debug, Serialize)]
pub struct JobListOutput {
    /// Jobs, newest first
    pub jobs: Vec<JobOutput>,
    /// Number of jobs listed
    pub total: usize,
}

impl CommandOutput for JobListOutput {
    fn to_human(&self) -> String {
        let mut table = list_table(&["id", "category", "kind", "status", "progress", "message"]);
        for job in &self.jobs {
            table.add_row(vec![
                job.id[..8].to_string(),
                job.category_id.clone(),
                job.kind.clone(),
                job.status_label(),
                format!("{}/{}", job.processed, job.total),
                truncate(job.message.as_deref().unwrap_or(""), 48),
            ]);
        }
        render_list("job", &table, self.total)
    }
}

/// Single job detail
#[derive(Debug, Serialize)]
#[serde(transparent)]
pub struct JobDetailOutput(pub JobOutput);

impl CommandOutput for JobDetailOutput {
    fn to_human(&self) -> String {
        let job = &self.0;
        let mut lines = vec![
            format!("Job: {}", job.id),
            format!("Category: {}", job.category_id),
            format!("Kind: {}", job.kind),
            format!("Status: {}", job.status_label()),
            format!("Progress: {}/{}", job.processed, job.total),
            format!("Created: {}", job.created_at),
            format!("Updated: {}", job.updated_at),
        ];
        if let Some(snapshot) = &job.snapshot_id {
            lines.push(format!("Snapshot: {snapshot}"));
        }
        if let Some(completed) = &job.completed_at {
            lines.push(format!("Completed: {completed}"));
        }
        if let Some(message) = &job.message {
            lines.push(format!("Message: {message}"));
        }
        if let Some(error) = &job.error {
            lines.push(format!("Error: {error}"));
        }
        lines.join("\n")
    }
}

/// Result of a job-changing command
#[derive(Debug, Serialize)]
pub struct JobActionOutput {
    /// What happened
    pub message: String,
    /// The job afterwards
    pub job: JobOutput,
}

impl CommandOutput for JobActionOutput {
    fn to_human(&self) -> String {
        self.message.clone()
    }
}

/// Accepts a full UUID or a unique prefix of one listed job.
async fn resolve_job_id(jobs: &JobControl, id: &str) -> Result<Uuid> {
    if let Ok(uuid) = Uuid::parse_str(id) {
        return Ok(uuid);
    }
    let matches: Vec<Uuid> = jobs
        .list_jobs(JobFilter::default())
        .await?
        .into_iter()
        .map(|j| j.id)
        .filter(|uuid| uuid.to_string().starts_with(id))
        .collect();
    match matches.as_slice() {
        [uuid] => Ok(*uuid),
        [] => Err(anyhow!("Job not found: {id}")),
        _ => Err(anyhow!("Ambiguous job id prefix: {id} matches {} jobs", matches.len())),
    }
}

/// Run a job command
pub async fn execute(command: JobCommands, ctx: &AppContext, json_mode: bool) -> Result<()> {
    let jobs = ctx.pipeline.jobs();

    match command {
        JobCommands::List {
            category,
            status,
            kind,
            limit,
        } => {
            let filter = JobFilter {
                category_id: category,
                status: status
                    .map(|s| JobStatus::from_str(&s).ok_or_else(|| anyhow!("Invalid status: {s}")))
                    .transpose()?,
                kind: kind
                    .map(|k| JobKind::from_str(&k).ok_or_else(|| anyhow!("Invalid kind: {k}")))
                    .transpose()?,
                limit: Some(limit),
            };
            let list = jobs.list_jobs(filter).await?;
            let out = JobListOutput {
                total: list.len(),
                jobs: list.iter().map(|j| JobOutput::new(j, jobs)).collect(),
            };
            output(&out, json_mode);
        }

        JobCommands::Show { id } => {
            let uuid = resolve_job_id(jobs, &id).await?;
            let job = jobs
                .get_job(uuid)
                .await?
                .ok_or_else(|| anyhow!("Job not found: {id}"))?;
            output(&JobDetailOutput(JobOutput::new(&job, jobs)), json_mode);
        }

        JobCommands::Stop { id } => {
            let uuid = resolve_job_id(jobs, &id).await?;
            let job = jobs.request_stop(uuid).await?;
            let message = if job.status.is_terminal() {
                format!("Job {} already finished as {}", job.id, job.status)
            } else {
                format!("Stop requested for job {}", job.id)
            };
            let out = JobActionOutput {
                message,
                job: JobOutput::new(&job, jobs),
            };
            output(&out, json_mode);
        }
    }

    Ok(())
}
