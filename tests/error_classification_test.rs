//! Message-classification ruleset: driver error strings map onto the closed
//! code set, ordered so the most specific family wins.

use browser_relay::{ErrorCode, classify_message};

#[test]
fn driver_timeout_messages() {
    for message in [
        "operation timed out",
        "Timeout while waiting for response to command",
        "deadline has elapsed",
    ] {
        assert_eq!(classify_message(message), ErrorCode::Timeout, "{message}");
    }
}

#[test]
fn navigation_family() {
    for message in [
        "Execution context was destroyed, most likely because of a navigation",
        "Target closed",
        "frame was detached",
        "Session closed. Most likely the page has been closed",
        "net::ERR_ABORTED",
    ] {
        assert_eq!(classify_message(message), ErrorCode::Navigation, "{message}");
    }
}

#[test]
fn not_found_family() {
    for message in [
        "Could not find node with given id",
        "no element found for selector '#missing'",
        "No such file or directory",
    ] {
        assert_eq!(classify_message(message), ErrorCode::NotFound, "{message}");
    }
}

#[test]
fn permission_family() {
    for message in [
        "permission denied (os error 13)",
        "write path is outside the allowed directories",
        "origin is not allowed for script execution",
    ] {
        assert_eq!(classify_message(message), ErrorCode::Permission, "{message}");
    }
}

#[test]
fn mixed_messages_prefer_the_earlier_rule() {
    // Timeout phrasing beats the embedded "not found".
    assert_eq!(
        classify_message("waiting for selector `#x` timed out: element not found"),
        ErrorCode::Timeout
    );
    // Stale beats not-found as well.
    assert_eq!(
        classify_message("node is stale and was not found in the current document"),
        ErrorCode::StaleRef
    );
}

#[test]
fn everything_else_is_internal() {
    for message in ["", "unexpected EOF", "serde_json error: invalid type"] {
        assert_eq!(classify_message(message), ErrorCode::Internal, "{message}");
    }
}
