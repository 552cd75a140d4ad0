//! Extraction of TestRail and Applause case ids embedded in test case names.
//!
//! A test name such as `"TestRail-123 Applause-456 Login works"` carries two
//! cross-reference ids. Ids may appear anywhere in the name, including glued
//! together with no separating whitespace.

use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;
use tracing::warn;

pub const TEST_RAIL_CASE_ID_PREFIX: &str = "TestRail-";
pub const APPLAUSE_CASE_ID_PREFIX: &str = "Applause-";

// Digit runs are ASCII only and matched greedily, so `TestRail-1234` is one id.
static CASE_ID_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"TestRail-[0-9]+|Applause-[0-9]+").expect("case id pattern is valid")
});

/// A test case name with its embedded case ids pulled out.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedTestCaseName {
    /// Name with every id token removed and whitespace collapsed.
    pub test_case_name: String,
    pub test_rail_test_case_id: Option<String>,
    pub applause_test_case_id: Option<String>,
}

/// Parse a raw test case name.
///
/// The first id of each kind wins. Extra ids of the same kind are dropped with a
/// warning.
pub fn parse_test_case_name(raw: &str) -> ParsedTestCaseName {
    let mut test_rail_ids = Vec::new();
    let mut applause_ids = Vec::new();

    for m in CASE_ID_PATTERN.find_iter(raw) {
        let token = m.as_str();
        if let Some(id) = token.strip_prefix(TEST_RAIL_CASE_ID_PREFIX) {
            test_rail_ids.push(id);
        } else if let Some(id) = token.strip_prefix(APPLAUSE_CASE_ID_PREFIX) {
            applause_ids.push(id);
        }
    }

    if test_rail_ids.len() > 1 {
        warn!(
            ids = ?test_rail_ids,
            "Multiple TestRail case ids detected in testCase name"
        );
    }
    if applause_ids.len() > 1 {
        warn!(
            ids = ?applause_ids,
            "Multiple Applause case ids detected in testCase name"
        );
    }

    let stripped = CASE_ID_PATTERN.replace_all(raw, "");
    let test_case_name = stripped.split_whitespace().collect::<Vec<_>>().join(" ");

    ParsedTestCaseName {
        test_case_name,
        test_rail_test_case_id: test_rail_ids.first().map(|id| id.to_string()),
        applause_test_case_id: applause_ids.first().map(|id| id.to_string()),
    }
}
