// Exit codes for CLI automation
pub const SUCCESS: i32 = 0;
pub const ERROR: i32 = 1;
pub const INVALID_INPUT: i32 = 3;
/// Downloader missing or not runnable
pub const TOOL_UNAVAILABLE: i32 = 4;
