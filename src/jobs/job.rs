use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::constants::JOB_ENVELOPE_VERSION;

/// Envelope every job travels in through the broker.
///
/// `message_id` carries the caller supplied job id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub message_id: String,
    pub version: String,
    pub timestamp: String,
    pub queue: String,
    pub data: Value,
}

impl Job {
    pub fn new(queue: impl Into<String>, job_id: impl Into<String>, data: Value) -> Self {
        Self {
            message_id: job_id.into(),
            version: JOB_ENVELOPE_VERSION.to_string(),
            timestamp: Utc::now().timestamp().to_string(),
            queue: queue.into(),
            data,
        }
    }
}

/// Acknowledgement returned by the broker for a submitted job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobHandle {
    pub job_id: String,
    pub queue: String,
    /// Broker-assigned task identifier.
    pub task_id: String,
}

/// What lifecycle callbacks and handlers see of a job.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobInfo {
    pub job_id: String,
    pub queue: String,
    pub task_id: String,
    /// Attempt number as reported by the broker.
    pub attempt: usize,
    pub enqueued_at: String,
    pub data: Value,
}

impl JobInfo {
    pub fn from_job(job: Job, task_id: impl Into<String>, attempt: usize) -> Self {
        Self {
            job_id: job.message_id,
            queue: job.queue,
            task_id: task_id.into(),
            attempt,
            enqueued_at: job.timestamp,
            data: job.data,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_job_new_uses_caller_id() {
        let job = Job::new("app:greet", "j1", json!({"name": "Ann"}));
        assert_eq!(job.message_id, "j1");
        assert_eq!(job.queue, "app:greet");
        assert_eq!(job.version, "1.0");
        assert!(job.timestamp.parse::<i64>().is_ok());
    }

    #[test]
    fn test_job_info_from_job() {
        let job = Job::new("greet", "j1", json!({"name": "Ann"}));
        let timestamp = job.timestamp.clone();
        let info = JobInfo::from_job(job, "task-1", 2);

        assert_eq!(info.job_id, "j1");
        assert_eq!(info.task_id, "task-1");
        assert_eq!(info.attempt, 2);
        assert_eq!(info.enqueued_at, timestamp);
        assert_eq!(info.data["name"], "Ann");
    }
}
