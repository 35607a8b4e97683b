//! crates/procurement_core/src/codes.rs
//!
//! Externally visible identifiers: purchase request codes and bid references.

use chrono::{DateTime, Utc};
use rand::Rng;
use uuid::Uuid;

use crate::error::{ProcurementError, ProcurementResult};
use crate::ports::{PurchaseRequestRepository, StoreTransaction};

/// How many candidate codes are tried before giving up.
pub const MAX_CODE_ATTEMPTS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeSpace {
    Request,
    Draft,
}

impl CodeSpace {
    fn prefix(&self) -> &'static str {
        match self {
            CodeSpace::Request => "PR",
            CodeSpace::Draft => "PR-DRAFT",
        }
    }
}

/// Formats `PR-<millis>-<suffix>` or `PR-DRAFT-<millis>-<suffix>`.
pub fn format_request_code(space: CodeSpace, at: DateTime<Utc>, suffix: u16) -> String {
    format!("{}-{}-{}", space.prefix(), at.timestamp_millis(), suffix)
}

/// A fresh candidate code. Not guaranteed unique on its own.
pub fn candidate_request_code(space: CodeSpace) -> String {
    let suffix = rand::thread_rng().gen_range(0..1000);
    format_request_code(space, Utc::now(), suffix)
}

pub fn bid_reference() -> String {
    format!("BID-{}", Uuid::new_v4())
}

/// Draws candidates until one is unused in the store, within `MAX_CODE_ATTEMPTS`.
pub async fn unique_request_code(
    tx: &mut dyn StoreTransaction,
    space: CodeSpace,
) -> ProcurementResult<String> {
    for _ in 0..MAX_CODE_ATTEMPTS {
        let code = candidate_request_code(space);
        if !tx.request_code_exists(&code).await? {
            return Ok(code);
        }
        tracing::debug!("Request code {} already taken, retrying", code);
    }
    Err(ProcurementError::internal(
        "Could not allocate a unique request code",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn draft_and_real_codes_are_distinguishable() {
        let at = Utc.timestamp_millis_opt(1_700_000_000_000).unwrap();
        assert_eq!(
            format_request_code(CodeSpace::Request, at, 42),
            "PR-1700000000000-42"
        );
        assert_eq!(
            format_request_code(CodeSpace::Draft, at, 42),
            "PR-DRAFT-1700000000000-42"
        );
    }

    #[test]
    fn candidates_carry_their_prefix() {
        assert!(candidate_request_code(CodeSpace::Request).starts_with("PR-"));
        assert!(!candidate_request_code(CodeSpace::Request).starts_with("PR-DRAFT-"));
        assert!(candidate_request_code(CodeSpace::Draft).starts_with("PR-DRAFT-"));
    }

    #[test]
    fn bid_references_are_prefixed_uuids() {
        let reference = bid_reference();
        let uuid = reference.strip_prefix("BID-").expect("prefix");
        assert!(Uuid::parse_str(uuid).is_ok());
        assert_ne!(reference, bid_reference());
    }
}
