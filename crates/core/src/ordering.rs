//! Dense `0..N-1` ordering of a survey's question links.

use chrono::{DateTime, Utc};

use crate::domain::survey::{LinkId, SurveyQuestionLink};
use crate::errors::DomainError;

/// Index for a link appended without an explicit position.
pub fn next_order_index(existing: &[SurveyQuestionLink]) -> i32 {
    existing.iter().map(|link| link.order_index).max().map_or(0, |max| max + 1)
}

/// Explicit positions are taken as-is; only negative values are refused.
pub fn validate_explicit_index(order_index: i32) -> Result<(), DomainError> {
    if order_index < 0 {
        return Err(DomainError::validation("Order index must be zero or greater"));
    }
    Ok(())
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OrderChange {
    pub link_id: LinkId,
    pub order_index: i32,
}

/// Renumbers `links` to `0..N-1`, keeping their relative order.
///
/// Ties (possible after explicit repositioning) are broken by creation time
/// and then by id, so running this twice yields the same sequence. Returns
/// only the links whose index actually changed.
pub fn redensify(links: &mut [SurveyQuestionLink], now: DateTime<Utc>) -> Vec<OrderChange> {
    links.sort_by(|left, right| {
        left.order_index
            .cmp(&right.order_index)
            .then(left.created_at.cmp(&right.created_at))
            .then(left.id.cmp(&right.id))
    });

    let mut changes = Vec::new();
    for (position, link) in links.iter_mut().enumerate() {
        let position = position as i32;
        if link.order_index != position {
            link.order_index = position;
            link.updated_at = now;
            changes.push(OrderChange { link_id: link.id, order_index: position });
        }
    }
    changes
}

pub fn is_dense(links: &[SurveyQuestionLink]) -> bool {
    let mut indices: Vec<i32> = links.iter().map(|link| link.order_index).collect();
    indices.sort_unstable();
    indices.iter().enumerate().all(|(position, index)| *index == position as i32)
}
