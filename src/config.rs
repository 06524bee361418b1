/// Tunable limits for an [`crate::Rvm`] instance.
///
/// Mirrors the historical RVM constants (128-byte prefix/segment-name
/// ceiling, a log file named `rvm.log`) but leaves them overridable for
/// embedders that map this library into a differently-shaped deployment.
#[derive(Debug, Clone)]
pub struct RvmConfig {
    /// Maximum length, in bytes, of a directory path passed to `init` or a
    /// segment name passed to `map`.
    pub name_limit: usize,
    /// File name of the redo log, relative to the RVM prefix directory.
    pub log_file_name: String,
}

impl Default for RvmConfig {
    fn default() -> Self {
        Self {
            name_limit: 128,
            log_file_name: "rvm.log".to_string(),
        }
    }
}
