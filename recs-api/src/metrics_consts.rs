pub const SIMILARITY_UPDATES_RECEIVED: &str = "recs_similarity_updates_received";
pub const SIMILARITY_PARSE_ERRORS: &str = "recs_similarity_parse_errors";
pub const SIMILARITY_BATCH_ATTEMPT: &str = "recs_similarity_batch_write_attempts";
pub const SIMILARITY_ROWS_AFFECTED: &str = "recs_similarity_rows_affected";
pub const WEIGHT_UPDATES_RECEIVED: &str = "recs_weight_updates_received";
pub const WEIGHT_PARSE_ERRORS: &str = "recs_weight_parse_errors";
pub const WEIGHT_BATCH_ATTEMPT: &str = "recs_weight_batch_write_attempts";
pub const WEIGHT_ROWS_AFFECTED: &str = "recs_weight_rows_affected";
pub const INCOMPATIBLE_MESSAGES: &str = "recs_incompatible_messages";
pub const EMPTY_MESSAGES: &str = "recs_empty_messages";
pub const BATCH_WRITE_FAILED: &str = "recs_batch_write_failed";
