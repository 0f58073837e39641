pub mod doctor;
pub mod migrate;
pub mod seed;

/// Structured outcome printed by every subcommand: one line of status plus
/// a dedicated exit code per failure class so wrapper scripts can branch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

impl CommandResult {
    pub fn success(command: &str, detail: impl Into<String>) -> Self {
        Self { exit_code: 0, output: format!("{command}: ok — {}", detail.into()) }
    }

    pub fn failure(
        command: &str,
        error_class: &str,
        detail: impl Into<String>,
        exit_code: u8,
    ) -> Self {
        Self {
            exit_code,
            output: format!("{command}: failed ({error_class}) — {}", detail.into()),
        }
    }
}
