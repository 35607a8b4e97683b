//! crates/procurement_core/src/eligibility.rs
//!
//! Decides whether a supplier company may act on a purchase request. Both the full
//! bid submission and the "show interest" path go through here.

use uuid::Uuid;

use crate::domain::{PurchaseRequest, Visibility};

/// A company may act on a public request, or on a private one it was invited to.
pub fn can_act(request: &PurchaseRequest, company_id: Uuid) -> bool {
    match request.visibility {
        Visibility::Public => true,
        Visibility::Private => request.is_invited(company_id),
    }
}

/// Whether the request currently accepts bids and interest markers.
pub fn is_open_for_bidding(request: &PurchaseRequest) -> bool {
    request.status.is_open_for_bidding()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::PurchaseRequestStatus;
    use chrono::Utc;

    fn request(visibility: Visibility, invited: Vec<Uuid>) -> PurchaseRequest {
        PurchaseRequest {
            id: Uuid::new_v4(),
            request_code: "PR-1".to_string(),
            title: "Steel pipes".to_string(),
            description: None,
            category: None,
            visibility,
            status: PurchaseRequestStatus::Published,
            owner_id: Uuid::new_v4(),
            department_id: None,
            delivery_date: None,
            delivery_address: None,
            bidding_deadline: None,
            bidding_date: None,
            bidding_address: None,
            invited_companies: invited,
            agents: Vec::new(),
            documents: Vec::new(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn public_requests_accept_any_company() {
        assert!(can_act(&request(Visibility::Public, Vec::new()), Uuid::new_v4()));
    }

    #[test]
    fn private_requests_require_an_invitation() {
        let invited = Uuid::new_v4();
        let pr = request(Visibility::Private, vec![invited]);
        assert!(can_act(&pr, invited));
        assert!(!can_act(&pr, Uuid::new_v4()));
    }

    #[test]
    fn scheduled_and_published_are_open() {
        let mut pr = request(Visibility::Public, Vec::new());
        for status in PurchaseRequestStatus::ALL {
            pr.status = *status;
            let expected = matches!(
                status,
                PurchaseRequestStatus::Published | PurchaseRequestStatus::Scheduled
            );
            assert_eq!(is_open_for_bidding(&pr), expected, "status {status}");
        }
    }
}
