//! RFQ visibility as a pure predicate, kept separate from storage so the
//! rules are testable without a database. `Storage::list_visible_rfqs`
//! mirrors this in SQL — keep the two in sync.

use crate::storage::RfqRow;

/// Whether `company_id` (operating in `company_sector`) may see `rfq`.
///
/// - The requester always sees its own RFQs, in any status.
/// - A targeted RFQ is visible to the companies on its target list.
/// - A public RFQ (empty target list) is visible while open to companies in
///   the matching sector; an RFQ with no sector is open to every sector.
pub fn is_visible_to(
    rfq: &RfqRow,
    targets: &[String],
    company_id: &str,
    company_sector: &str,
) -> bool {
    if rfq.requester_company_id == company_id {
        return true;
    }
    if !targets.is_empty() {
        return targets.iter().any(|t| t == company_id);
    }
    rfq.status == "open"
        && rfq
            .sector
            .as_deref()
            .map_or(true, |s| s == company_sector)
}
