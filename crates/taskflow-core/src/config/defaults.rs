// --- Default value functions ---

pub(super) fn default_name() -> String {
    "TaskFlow".to_string()
}
pub(super) fn default_data_dir() -> String {
    "~/.taskflow".to_string()
}
pub(super) fn default_log_level() -> String {
    "info".to_string()
}
pub(super) fn default_true() -> bool {
    true
}
pub(super) fn default_memory_path() -> String {
    "~/.taskflow/data/user_memory.json".to_string()
}
pub(super) fn default_max_history() -> usize {
    50
}
pub(super) fn default_retention_days() -> u32 {
    7
}
pub(super) fn default_poll_interval() -> u64 {
    60
}
pub(super) fn default_max_requests() -> usize {
    10
}
pub(super) fn default_window_secs() -> u64 {
    60
}
pub(super) fn default_zone() -> String {
    "Asia/Kolkata".to_string()
}
