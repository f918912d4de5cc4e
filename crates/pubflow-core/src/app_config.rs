use std::net::SocketAddr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Test,
    Production,
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Test => write!(f, "test"),
            Environment::Production => write!(f, "production"),
        }
    }
}

#[derive(Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub env: Environment,
    pub bind_addr: SocketAddr,
    pub log_level: String,

    pub db_max_connections: u32,
    pub db_min_connections: u32,
    pub db_acquire_timeout_secs: u64,

    /// Daily cap on external collection requests (the `calls` quota).
    pub calls_per_day: i64,
    /// Daily cap on AI consumption units (the `tokens` quota).
    pub tokens_per_day: i64,

    /// Token-bucket capacity for the collection rate limiter.
    pub bucket_capacity: u32,
    /// Token-bucket refill rate, tokens per second.
    pub bucket_refill_per_sec: f64,

    /// Exponential backoff base for transient/timeout errors, in seconds.
    pub retry_base_secs: u64,
    /// Backoff base for rate-limited errors; materially longer than
    /// `retry_base_secs`.
    pub retry_rate_limited_base_secs: u64,
    pub retry_min_secs: u64,
    pub retry_max_secs: u64,
    pub max_attempts_collect: u32,
    pub max_attempts_process: u32,
    pub max_attempts_publish: u32,

    pub worker_poll_interval_ms: u64,
    /// How long a claimed task may sit without progress before the reclaim
    /// sweep returns it to pending (crashed-worker recovery).
    pub task_lease_secs: u64,
    pub http_request_timeout_secs: u64,

    pub reddit_client_id: String,
    pub reddit_client_secret: String,
    pub reddit_user_agent: String,
    pub subreddits: Vec<String>,
    pub reddit_page_size: u32,
    pub reddit_max_pages: u32,

    pub enrich_base_url: String,
    pub enrich_api_key: String,
    pub enrich_primary_model: String,
    pub enrich_fallback_model: String,

    pub ghost_base_url: String,
    pub ghost_admin_key: String,

    pub notify_webhook_url: Option<String>,

    /// Bearer tokens accepted by the HTTP gateway. Empty disables auth,
    /// which the loader only permits outside production.
    pub api_keys: Vec<String>,

    pub takedown_grace_hours: i64,
    /// Cron expression for the recurring collection trigger.
    pub collect_cron: String,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("env", &self.env)
            .field("bind_addr", &self.bind_addr)
            .field("log_level", &self.log_level)
            .field("database_url", &"[redacted]")
            .field("db_max_connections", &self.db_max_connections)
            .field("db_min_connections", &self.db_min_connections)
            .field("db_acquire_timeout_secs", &self.db_acquire_timeout_secs)
            .field("calls_per_day", &self.calls_per_day)
            .field("tokens_per_day", &self.tokens_per_day)
            .field("bucket_capacity", &self.bucket_capacity)
            .field("bucket_refill_per_sec", &self.bucket_refill_per_sec)
            .field("retry_base_secs", &self.retry_base_secs)
            .field(
                "retry_rate_limited_base_secs",
                &self.retry_rate_limited_base_secs,
            )
            .field("retry_min_secs", &self.retry_min_secs)
            .field("retry_max_secs", &self.retry_max_secs)
            .field("max_attempts_collect", &self.max_attempts_collect)
            .field("max_attempts_process", &self.max_attempts_process)
            .field("max_attempts_publish", &self.max_attempts_publish)
            .field("worker_poll_interval_ms", &self.worker_poll_interval_ms)
            .field("task_lease_secs", &self.task_lease_secs)
            .field(
                "http_request_timeout_secs",
                &self.http_request_timeout_secs,
            )
            .field("reddit_client_id", &"[redacted]")
            .field("reddit_client_secret", &"[redacted]")
            .field("reddit_user_agent", &self.reddit_user_agent)
            .field("subreddits", &self.subreddits)
            .field("reddit_page_size", &self.reddit_page_size)
            .field("reddit_max_pages", &self.reddit_max_pages)
            .field("enrich_base_url", &self.enrich_base_url)
            .field("enrich_api_key", &"[redacted]")
            .field("enrich_primary_model", &self.enrich_primary_model)
            .field("enrich_fallback_model", &self.enrich_fallback_model)
            .field("ghost_base_url", &self.ghost_base_url)
            .field("ghost_admin_key", &"[redacted]")
            .field(
                "notify_webhook_url",
                &self.notify_webhook_url.as_ref().map(|_| "[redacted]"),
            )
            .field("api_keys", &format_args!("[{} redacted]", self.api_keys.len()))
            .field("takedown_grace_hours", &self.takedown_grace_hours)
            .field("collect_cron", &self.collect_cron)
            .finish()
    }
}
