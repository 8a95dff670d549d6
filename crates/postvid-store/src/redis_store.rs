//! Redis-backed job store.
//!
//! Layout (with the default `postvid` prefix):
//! - `postvid:job:{id}`: hash holding one job row
//! - `postvid:jobs:pending`: sorted set of pending IDs scored by creation time (ms)
//! - `postvid:jobs:processing`: sorted set of processing IDs scored by lease expiry (ms)
//!
//! Every transition runs as one Lua script so the status check and the write
//! cannot interleave with another worker.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::Script;
use tracing::{debug, warn};

use postvid_models::{Job, JobId, JobInput, JobStatus, Lease, WorkerId};

use crate::config::StoreConfig;
use crate::error::{StoreError, StoreResult};
use crate::store::JobStore;

const CLAIM_SCRIPT: &str = r#"
if redis.call('HGET', KEYS[1], 'status') ~= 'pending' then
    return 0
end
redis.call('HSET', KEYS[1], 'status', 'processing', 'lease_owner', ARGV[2],
    'lease_expires_at', ARGV[3], 'updated_at', ARGV[4])
redis.call('HINCRBY', KEYS[1], 'attempts', 1)
redis.call('ZREM', KEYS[2], ARGV[1])
redis.call('ZADD', KEYS[3], ARGV[3], ARGV[1])
return 1
"#;

const FINISH_SCRIPT: &str = r#"
if redis.call('HGET', KEYS[1], 'status') ~= 'processing' then
    return 0
end
if redis.call('HGET', KEYS[1], 'lease_owner') ~= ARGV[2] then
    return 0
end
redis.call('HSET', KEYS[1], 'status', ARGV[3], ARGV[4], ARGV[5], 'updated_at', ARGV[6])
redis.call('HDEL', KEYS[1], 'lease_owner', 'lease_expires_at')
redis.call('ZREM', KEYS[2], ARGV[1])
return 1
"#;

const RENEW_SCRIPT: &str = r#"
if redis.call('HGET', KEYS[1], 'status') ~= 'processing' then
    return 0
end
if redis.call('HGET', KEYS[1], 'lease_owner') ~= ARGV[2] then
    return 0
end
redis.call('HSET', KEYS[1], 'lease_expires_at', ARGV[3], 'updated_at', ARGV[4])
redis.call('ZADD', KEYS[2], ARGV[3], ARGV[1])
return 1
"#;

const RECLAIM_SCRIPT: &str = r#"
if redis.call('HGET', KEYS[1], 'status') ~= 'processing' then
    return 0
end
local expires = tonumber(redis.call('HGET', KEYS[1], 'lease_expires_at'))
if expires and expires > tonumber(ARGV[3]) then
    return 0
end
redis.call('HSET', KEYS[1], 'lease_owner', ARGV[2], 'lease_expires_at', ARGV[4],
    'updated_at', ARGV[5])
redis.call('HINCRBY', KEYS[1], 'attempts', 1)
redis.call('ZADD', KEYS[2], ARGV[4], ARGV[1])
return 1
"#;

const EXPIRE_SCRIPT: &str = r#"
if redis.call('HGET', KEYS[1], 'status') ~= 'processing' then
    return 0
end
local expires = tonumber(redis.call('HGET', KEYS[1], 'lease_expires_at'))
if expires and expires > tonumber(ARGV[2]) then
    return 0
end
redis.call('HSET', KEYS[1], 'status', 'failed', 'error', ARGV[3], 'updated_at', ARGV[4])
redis.call('HDEL', KEYS[1], 'lease_owner', 'lease_expires_at')
redis.call('ZREM', KEYS[2], ARGV[1])
return 1
"#;

/// Key naming for one store prefix.
#[derive(Debug, Clone)]
struct StoreKeys {
    prefix: String,
}

impl StoreKeys {
    fn job(&self, job_id: &JobId) -> String {
        format!("{}:job:{}", self.prefix, job_id)
    }

    fn pending(&self) -> String {
        format!("{}:jobs:pending", self.prefix)
    }

    fn processing(&self) -> String {
        format!("{}:jobs:processing", self.prefix)
    }
}

/// Job store on Redis hashes and sorted sets.
pub struct RedisJobStore {
    client: redis::Client,
    keys: StoreKeys,
    lease_ttl: chrono::Duration,
    claim_script: Script,
    finish_script: Script,
    renew_script: Script,
    reclaim_script: Script,
    expire_script: Script,
}

impl RedisJobStore {
    /// Create a new store client. No connection is made until first use.
    pub fn new(config: &StoreConfig) -> StoreResult<Self> {
        let client = redis::Client::open(config.redis_url.as_str())?;
        Ok(Self {
            client,
            keys: StoreKeys {
                prefix: config.key_prefix.clone(),
            },
            lease_ttl: config.lease_ttl_chrono(),
            claim_script: Script::new(CLAIM_SCRIPT),
            finish_script: Script::new(FINISH_SCRIPT),
            renew_script: Script::new(RENEW_SCRIPT),
            reclaim_script: Script::new(RECLAIM_SCRIPT),
            expire_script: Script::new(EXPIRE_SCRIPT),
        })
    }

    /// Create from environment variables.
    pub fn from_env() -> StoreResult<Self> {
        Self::new(&StoreConfig::from_env())
    }

    async fn conn(&self) -> StoreResult<redis::aio::MultiplexedConnection> {
        Ok(self.client.get_multiplexed_async_connection().await?)
    }

    fn lease_expiry_ms(&self, now: DateTime<Utc>) -> i64 {
        (now + self.lease_ttl).timestamp_millis()
    }

    async fn finish(
        &self,
        job_id: &JobId,
        owner: &WorkerId,
        next: JobStatus,
        value: &str,
    ) -> StoreResult<bool> {
        let field = match next {
            JobStatus::Completed => "output_ref",
            _ => "error",
        };
        let mut conn = self.conn().await?;

        let updated: i32 = self
            .finish_script
            .key(self.keys.job(job_id))
            .key(self.keys.processing())
            .arg(job_id.as_str())
            .arg(owner.as_str())
            .arg(next.as_str())
            .arg(field)
            .arg(value)
            .arg(Utc::now().to_rfc3339())
            .invoke_async(&mut conn)
            .await?;

        if updated == 0 {
            warn!(
                job_id = %job_id,
                owner = %owner,
                status = %next,
                "Terminal write ignored: job not processing under this owner"
            );
        }
        Ok(updated == 1)
    }
}

/// Hash fields for a freshly submitted job.
fn encode_new(job: &Job) -> StoreResult<Vec<(&'static str, String)>> {
    Ok(vec![
        ("status", job.status.as_str().to_string()),
        ("input", serde_json::to_string(&job.input)?),
        ("attempts", job.attempts.to_string()),
        ("created_at", job.created_at.to_rfc3339()),
        ("updated_at", job.updated_at.to_rfc3339()),
    ])
}

fn parse_time(fields: &HashMap<String, String>, name: &str) -> StoreResult<DateTime<Utc>> {
    let raw = fields
        .get(name)
        .ok_or_else(|| StoreError::corrupt(format!("missing field {}", name)))?;
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StoreError::corrupt(format!("bad {}: {}", name, e)))
}

/// Rebuild a job from its hash and check its invariants.
fn decode(job_id: &JobId, fields: &HashMap<String, String>) -> StoreResult<Job> {
    let status = fields
        .get("status")
        .ok_or_else(|| StoreError::corrupt(format!("job {} has no status", job_id)))?;
    let status = JobStatus::parse(status)?;

    let input: JobInput = match fields.get("input") {
        Some(raw) => serde_json::from_str(raw)?,
        None => return Err(StoreError::corrupt(format!("job {} has no input", job_id))),
    };

    let lease = match (fields.get("lease_owner"), fields.get("lease_expires_at")) {
        (Some(owner), Some(expires)) => {
            let ms: i64 = expires
                .parse()
                .map_err(|_| StoreError::corrupt(format!("bad lease expiry: {}", expires)))?;
            let expires_at = DateTime::<Utc>::from_timestamp_millis(ms)
                .ok_or_else(|| StoreError::corrupt(format!("lease expiry out of range: {}", ms)))?;
            Some(Lease {
                owner: WorkerId::from(owner.as_str()),
                expires_at,
            })
        }
        (None, None) => None,
        _ => return Err(StoreError::corrupt(format!("job {} has a partial lease", job_id))),
    };

    let attempts = fields
        .get("attempts")
        .map(|a| a.parse::<u32>())
        .transpose()
        .map_err(|e| StoreError::corrupt(format!("bad attempts: {}", e)))?
        .unwrap_or(0);

    let job = Job {
        id: job_id.clone(),
        status,
        input,
        output_ref: fields.get("output_ref").cloned(),
        error: fields.get("error").cloned(),
        lease,
        attempts,
        created_at: parse_time(fields, "created_at")?,
        updated_at: parse_time(fields, "updated_at")?,
    };
    job.check_consistency()?;
    Ok(job)
}

#[async_trait]
impl JobStore for RedisJobStore {
    async fn submit(&self, input: JobInput) -> StoreResult<JobId> {
        let job = Job::new(input);
        let fields = encode_new(&job)?;
        let mut conn = self.conn().await?;

        redis::pipe()
            .atomic()
            .hset_multiple(self.keys.job(&job.id), &fields)
            .ignore()
            .zadd(
                self.keys.pending(),
                job.id.as_str(),
                job.created_at.timestamp_millis(),
            )
            .ignore()
            .query_async::<()>(&mut conn)
            .await?;

        debug!(job_id = %job.id, "Job submitted");
        Ok(job.id)
    }

    async fn claim(&self, job_id: &JobId, owner: &WorkerId) -> StoreResult<bool> {
        let now = Utc::now();
        let mut conn = self.conn().await?;

        let claimed: i32 = self
            .claim_script
            .key(self.keys.job(job_id))
            .key(self.keys.pending())
            .key(self.keys.processing())
            .arg(job_id.as_str())
            .arg(owner.as_str())
            .arg(self.lease_expiry_ms(now))
            .arg(now.to_rfc3339())
            .invoke_async(&mut conn)
            .await?;

        Ok(claimed == 1)
    }

    async fn complete(
        &self,
        job_id: &JobId,
        owner: &WorkerId,
        output_ref: &str,
    ) -> StoreResult<bool> {
        self.finish(job_id, owner, JobStatus::Completed, output_ref)
            .await
    }

    async fn fail(&self, job_id: &JobId, owner: &WorkerId, error: &str) -> StoreResult<bool> {
        self.finish(job_id, owner, JobStatus::Failed, error).await
    }

    async fn get(&self, job_id: &JobId) -> StoreResult<Job> {
        let mut conn = self.conn().await?;
        let fields: HashMap<String, String> = redis::cmd("HGETALL")
            .arg(self.keys.job(job_id))
            .query_async(&mut conn)
            .await?;

        if fields.is_empty() {
            return Err(StoreError::not_found(job_id));
        }
        decode(job_id, &fields)
    }

    async fn renew_lease(&self, job_id: &JobId, owner: &WorkerId) -> StoreResult<bool> {
        let now = Utc::now();
        let mut conn = self.conn().await?;

        let renewed: i32 = self
            .renew_script
            .key(self.keys.job(job_id))
            .key(self.keys.processing())
            .arg(job_id.as_str())
            .arg(owner.as_str())
            .arg(self.lease_expiry_ms(now))
            .arg(now.to_rfc3339())
            .invoke_async(&mut conn)
            .await?;

        Ok(renewed == 1)
    }

    async fn reclaim(&self, job_id: &JobId, owner: &WorkerId) -> StoreResult<bool> {
        let now = Utc::now();
        let mut conn = self.conn().await?;

        let reclaimed: i32 = self
            .reclaim_script
            .key(self.keys.job(job_id))
            .key(self.keys.processing())
            .arg(job_id.as_str())
            .arg(owner.as_str())
            .arg(now.timestamp_millis())
            .arg(self.lease_expiry_ms(now))
            .arg(now.to_rfc3339())
            .invoke_async(&mut conn)
            .await?;

        Ok(reclaimed == 1)
    }

    async fn expire(&self, job_id: &JobId, error: &str) -> StoreResult<bool> {
        let now = Utc::now();
        let mut conn = self.conn().await?;

        let expired: i32 = self
            .expire_script
            .key(self.keys.job(job_id))
            .key(self.keys.processing())
            .arg(job_id.as_str())
            .arg(now.timestamp_millis())
            .arg(error)
            .arg(now.to_rfc3339())
            .invoke_async(&mut conn)
            .await?;

        Ok(expired == 1)
    }

    async fn list_pending(&self, limit: usize) -> StoreResult<Vec<JobId>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let mut conn = self.conn().await?;
        let ids: Vec<String> = redis::cmd("ZRANGE")
            .arg(self.keys.pending())
            .arg(0)
            .arg(limit as isize - 1)
            .query_async(&mut conn)
            .await?;

        Ok(ids.into_iter().map(JobId::from).collect())
    }

    async fn list_expired(&self, limit: usize) -> StoreResult<Vec<Job>> {
        let mut conn = self.conn().await?;
        let ids: Vec<String> = redis::cmd("ZRANGEBYSCORE")
            .arg(self.keys.processing())
            .arg("-inf")
            .arg(Utc::now().timestamp_millis())
            .arg("LIMIT")
            .arg(0)
            .arg(limit)
            .query_async(&mut conn)
            .await?;

        let mut jobs = Vec::with_capacity(ids.len());
        for id in ids.into_iter().map(JobId::from) {
            match self.get(&id).await {
                Ok(job) if job.status == JobStatus::Processing => jobs.push(job),
                Ok(_) => {}
                Err(e) if e.is_not_found() => {
                    warn!(job_id = %id, "Processing index references a missing job");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(jobs)
    }

    async fn ping(&self) -> StoreResult<()> {
        let mut conn = self.conn().await?;
        redis::cmd("PING").query_async::<String>(&mut conn).await?;
        Ok(())
    }
}
