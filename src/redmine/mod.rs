//! Redmine "Awaiting answer" tracking.
//!
//! `client` talks to the REST API, `poller` owns the count and drives the
//! fetch-compare-notify-persist cycle.

pub mod client;
pub mod poller;

/// Redmine status id of "Awaiting answer"
pub const AWAITING_ANSWER_STATUS_ID: u32 = 10;

/// Page size requested from `issues.json`; only `total_count` is read
pub const ISSUE_PAGE_LIMIT: u32 = 100;

/// Message body for a count increase
pub fn new_issues_message(delta: u64) -> String {
    format!("{} new \"Awaiting answer\" issue(s)!", delta)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_issues_message() {
        assert_eq!(new_issues_message(3), "3 new \"Awaiting answer\" issue(s)!");
    }
}
