pub const ACTIONS_RECEIVED: &str = "similarity_actions_received";
pub const ACTIONS_APPLIED: &str = "similarity_actions_applied";
pub const ACTIONS_SKIPPED: &str = "similarity_actions_skipped";
pub const ACTIONS_DEAD_LETTERED: &str = "similarity_actions_dead_lettered";
pub const ACTION_PARSE_ERRORS: &str = "similarity_action_parse_errors";
pub const EMPTY_ACTIONS: &str = "similarity_empty_actions";
pub const PAIRS_UPDATED: &str = "similarity_pairs_updated";
pub const SCORES_EMITTED: &str = "similarity_scores_emitted";
pub const KAFKA_RECV_ERRORS: &str = "similarity_kafka_recv_errors";
