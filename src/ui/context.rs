//! Terminal detection for progress output

use std::io::IsTerminal;

/// Environment variables set by common CI systems
const CI_VARS: &[&str] = &[
    "CI",
    "GITHUB_ACTIONS",
    "GITLAB_CI",
    "CIRCLECI",
    "TRAVIS",
    "JENKINS_URL",
    "BUILDKITE",
    "TEAMCITY_VERSION",
    "TF_BUILD",
];

/// Forces plain progress lines even on a terminal
const PLAIN_PROGRESS_VAR: &str = "CAIRN_PLAIN_PROGRESS";

/// Decides how progress is drawn
#[derive(Debug, Clone, Copy)]
pub struct UiContext {
    fancy: bool,
}

impl UiContext {
    /// Inspect stdout and the environment
    pub fn detect() -> Self {
        Self::from_env(std::io::stdout().is_terminal(), |var| {
            std::env::var_os(var).is_some()
        })
    }

    /// Plain line output, for pipes and tests
    pub fn plain() -> Self {
        Self { fancy: false }
    }

    fn from_env(stdout_is_terminal: bool, is_set: impl Fn(&str) -> bool) -> Self {
        let fancy = stdout_is_terminal
            && !is_set(PLAIN_PROGRESS_VAR)
            && !CI_VARS.iter().any(|var| is_set(var));
        Self { fancy }
    }

    /// Whether to draw live spinners instead of plain lines
    pub fn use_fancy_output(&self) -> bool {
        self.fancy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_context() {
        assert!(!UiContext::plain().use_fancy_output());
    }

    #[test]
    fn terminal_without_ci_is_fancy() {
        assert!(UiContext::from_env(true, |_| false).use_fancy_output());
    }

    #[test]
    fn pipe_is_plain() {
        assert!(!UiContext::from_env(false, |_| false).use_fancy_output());
    }

    #[test]
    fn ci_forces_plain() {
        let ctx = UiContext::from_env(true, |var| var == "GITHUB_ACTIONS");
        assert!(!ctx.use_fancy_output());
    }

    #[test]
    fn override_forces_plain() {
        let ctx = UiContext::from_env(true, |var| var == PLAIN_PROGRESS_VAR);
        assert!(!ctx.use_fancy_output());
    }
}
