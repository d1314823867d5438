//! Structured logging schema and field name constants for quillbox.
//!
//! All crates use these constants for consistent structured logging fields,
//! so log aggregation tools can query by standardized field names across
//! every subsystem.
//!
//! ## Log Level Contract
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Degraded service, requires operator attention |
//! | WARN  | Recoverable issue, automatic fallback applied |
//! | INFO  | Lifecycle events (startup, shutdown), operation completions |
//! | DEBUG | Decision points, intermediate values, config choices |
//! | TRACE | Per-item iteration, high-volume data (candidates, deltas) |

// ─── Identity fields ───────────────────────────────────────────────────────

/// Correlation ID propagated across request → agent turn → sub-calls.
pub const REQUEST_ID: &str = "request_id";

/// Subsystem originating the log event.
/// Values: "api", "search", "db", "agent"
pub const SUBSYSTEM: &str = "subsystem";

/// Component within a subsystem.
/// Examples: "ranking_engine", "gateway", "session", "pool"
pub const COMPONENT: &str = "component";

/// Logical operation name.
/// Examples: "rank", "chat_stream", "dispatch_tool"
pub const OPERATION: &str = "op";

// ─── Entity fields ─────────────────────────────────────────────────────────

/// Authenticated caller (note owner) UUID.
pub const OWNER_ID: &str = "owner_id";

/// Note UUID being operated on.
pub const NOTE_ID: &str = "note_id";

/// Tool call identifier within one chat turn.
pub const CALL_ID: &str = "call_id";

/// Tool name being dispatched.
pub const TOOL_NAME: &str = "tool_name";

/// Search query text.
pub const QUERY: &str = "query";

// ─── Measurement fields ────────────────────────────────────────────────────

/// Wall-clock duration in milliseconds.
pub const DURATION_MS: &str = "duration_ms";

/// Number of results returned by a search or query.
pub const RESULT_COUNT: &str = "result_count";

/// Number of candidate rows scored before truncation.
pub const CANDIDATE_COUNT: &str = "candidate_count";

/// Number of source note ids collected during a turn.
pub const SOURCE_COUNT: &str = "source_count";

/// Agent round number within one turn (1-based).
pub const ROUND: &str = "round";

// ─── Search-specific fields ────────────────────────────────────────────────

/// Blend weight α used for score merging.
pub const ALPHA: &str = "alpha";

/// Whether a query embedding was supplied.
pub const HAS_EMBEDDING: &str = "has_embedding";

/// Effective (clamped) result limit.
pub const LIMIT: &str = "limit";

// ─── Database fields ───────────────────────────────────────────────────────

/// Number of active connections in the pool.
pub const POOL_SIZE: &str = "pool_size";

/// Number of idle connections in the pool.
pub const POOL_IDLE: &str = "pool_idle";

// ─── Inference fields ──────────────────────────────────────────────────────

/// Model name used for inference.
pub const MODEL: &str = "model";

/// Continuation token (previous response id) threading turns together.
pub const RESPONSE_ID: &str = "response_id";

// ─── Outcome fields ────────────────────────────────────────────────────────

/// Boolean success/failure indicator.
pub const SUCCESS: &str = "success";

/// Error message when an operation fails.
pub const ERROR_MSG: &str = "error";
