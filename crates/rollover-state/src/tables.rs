//! redb table definitions for the Rollover state store.

use redb::TableDefinition;

/// Raw KV documents keyed by path (`packer_manifest`, `rollover/groups/{account}/{name}`).
pub const KV: TableDefinition<&str, &[u8]> = TableDefinition::new("kv");

/// Queued messages keyed by `{group_key}:{sequence:020}`.
pub const QUEUE: TableDefinition<&str, &[u8]> = TableDefinition::new("queue");

/// Counters (queue sequence, refresh ids).
pub const COUNTERS: TableDefinition<&str, u64> = TableDefinition::new("counters");

/// Autoscaling groups keyed by group name.
pub const GROUPS: TableDefinition<&str, &[u8]> = TableDefinition::new("groups");

/// Launch templates (with all versions) keyed by template id.
pub const LAUNCH_TEMPLATES: TableDefinition<&str, &[u8]> =
    TableDefinition::new("launch_templates");

/// Instance refreshes keyed by `{group_name}:{refresh_id}`.
pub const REFRESHES: TableDefinition<&str, &[u8]> = TableDefinition::new("refreshes");

pub const QUEUE_SEQUENCE: &str = "queue_sequence";
pub const REFRESH_SEQUENCE: &str = "refresh_sequence";
